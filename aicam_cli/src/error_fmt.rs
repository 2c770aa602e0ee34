//! Human-readable error descriptions and structured JSON error formatting.

use aicam_core::error::{BuildError, CamError};

/// Map an eyre::Report to a human-readable explanation with likely causes
/// and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingSignalMap => {
                "What happened: No signal map was provided to the sequencer.\nLikely causes: The config's [signal] section is missing or was not wired into the builder.\nHow to fix: Define [[signal.map]] entries in the config, or pass a map via with_signal_map(...).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(ce) = err.downcast_ref::<CamError>() {
        return match ce {
            CamError::Busy(port) => format!(
                "What happened: The serial port {port} is already in use.\nLikely causes: Another process (or a previous run) holds the port open.\nHow to fix: Close the other reader, or unplug and replug the camera, then retry."
            ),
            CamError::DeviceLost => "What happened: The camera disconnected mid-session.\nLikely causes: Cable unplugged, power loss, or the USB adapter reset.\nHow to fix: Reconnect the camera and start again; the link is re-opened from scratch.".to_string(),
            CamError::Channel(msg) => format!(
                "What happened: The byte channel ended ({msg}).\nLikely causes: The device closed the stream or a read failed.\nHow to fix: Reconnect and retry; check the cable and the configured baud rate."
            ),
            CamError::RoundInProgress => "What happened: A round was started while another was still in flight.\nLikely causes: Overlapping start requests.\nHow to fix: Wait for the active round to finish, or cancel it first.".to_string(),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // Generic fallback
    let msg = err.to_string();
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes per error family; generic errors return 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(ce) = err.downcast_ref::<CamError>() {
        return match ce {
            CamError::Busy(_) => 2,
            CamError::DeviceLost | CamError::Channel(_) => 3,
            CamError::RoundInProgress | CamError::NoRound | CamError::State(_) => 4,
            CamError::Config(_) => 5,
            CamError::Io(_) => 6,
        };
    }
    1
}

fn reason_name(err: &eyre::Report) -> &'static str {
    match err.downcast_ref::<CamError>() {
        Some(CamError::Busy(_)) => "Busy",
        Some(CamError::DeviceLost) => "DeviceLost",
        Some(CamError::Channel(_)) => "Channel",
        Some(CamError::RoundInProgress) => "RoundInProgress",
        Some(CamError::NoRound) => "NoRound",
        Some(CamError::State(_)) => "State",
        Some(CamError::Config(_)) => "Config",
        Some(CamError::Io(_)) => "Io",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": reason_name(err),
        "message": humanize(err),
    })
    .to_string()
}
