#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas for the camera-game pipeline.
//!
//! Everything a deployment varies between games is data in one TOML file:
//! link settings, smoothing cadence, round timing, the command table
//! (set operations over membership flags) and the signal map (flag set →
//! expected camera id). `Config` is deserialized, then `validate()`d.

use serde::Deserialize;

/// Byte-channel settings.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LinkCfg {
    /// Serial device path; absent means the caller must pick one (or run
    /// the simulator).
    pub port: Option<String>,
    /// Baud rate; the stock camera talks 9600 8N1.
    pub baud_rate: u32,
    /// Per-read timeout for the byte source (ms).
    pub read_timeout_ms: u64,
}

impl Default for LinkCfg {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 9600,
            read_timeout_ms: 50,
        }
    }
}

/// Smoothing cadence and domain.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct SmoothingCfg {
    /// Sampling period for gated steps (ms).
    pub sample_period_ms: u64,
    /// Samples per evaluation window; window-full triggers early decision.
    pub window_samples: usize,
    /// Debounce timeout for live-control consumers (ms).
    pub debounce_timeout_ms: u64,
    /// Largest valid signal id; anything above it (except the 255
    /// no-detection sentinel) is ignored at the window boundary.
    pub max_id: u8,
}

impl Default for SmoothingCfg {
    fn default() -> Self {
        Self {
            sample_period_ms: 100,
            window_samples: 20,
            debounce_timeout_ms: 200,
            max_id: 3,
        }
    }
}

/// Set operation a command applies to the accumulated flag set.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Insert,
    Remove,
}

/// One entry of the command table.
///
/// The stock flag game has eight spoken commands but only two effects per
/// flag: "raise X" / "don't lower X" insert, "lower X" / "don't raise X"
/// remove.
#[derive(Debug, Deserialize, Clone)]
pub struct CommandCfg {
    pub label: String,
    pub op: OpKind,
    /// Membership flag the op targets (bit index, 0..8).
    pub flag: u8,
}

/// Round topology and timing.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RoundCfg {
    /// Duration of a step that announces or checks a command (ms).
    pub command_step_ms: u64,
    /// Duration of a rest ("-") step (ms).
    pub rest_step_ms: u64,
    /// Call slots per round; each slot becomes one announce step and one
    /// answer step.
    pub call_slots: usize,
    /// Bounds for how many slots actually carry a command.
    pub min_calls: usize,
    pub max_calls: usize,
    /// The command table itself.
    pub commands: Vec<CommandCfg>,
}

impl Default for RoundCfg {
    fn default() -> Self {
        let flag_cmds = |flag: u8, name: &str| {
            vec![
                CommandCfg {
                    label: format!("raise-{name}"),
                    op: OpKind::Insert,
                    flag,
                },
                CommandCfg {
                    label: format!("lower-{name}"),
                    op: OpKind::Remove,
                    flag,
                },
                CommandCfg {
                    label: format!("dont-raise-{name}"),
                    op: OpKind::Remove,
                    flag,
                },
                CommandCfg {
                    label: format!("dont-lower-{name}"),
                    op: OpKind::Insert,
                    flag,
                },
            ]
        };
        let mut commands = flag_cmds(0, "blue");
        commands.extend(flag_cmds(1, "white"));
        Self {
            command_step_ms: 2000,
            rest_step_ms: 500,
            call_slots: 4,
            min_calls: 2,
            max_calls: 3,
            commands,
        }
    }
}

/// One signal-map entry: the camera id expected while exactly `flags` are
/// set.
#[derive(Debug, Deserialize, Clone)]
pub struct MapEntry {
    pub flags: Vec<u8>,
    pub id: u8,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SignalCfg {
    pub map: Vec<MapEntry>,
}

impl Default for SignalCfg {
    fn default() -> Self {
        // Stock two-flag pose map: nothing raised -> 2, blue -> 0,
        // white -> 1, both -> 3.
        Self {
            map: vec![
                MapEntry {
                    flags: vec![],
                    id: 2,
                },
                MapEntry {
                    flags: vec![0],
                    id: 0,
                },
                MapEntry {
                    flags: vec![1],
                    id: 1,
                },
                MapEntry {
                    flags: vec![0, 1],
                    id: 3,
                },
            ],
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    /// Path to a .log file (JSON lines); stderr only when absent.
    pub file: Option<String>,
    /// "error" | "warn" | "info" | "debug" | "trace"
    pub level: Option<String>,
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub link: LinkCfg,
    pub smoothing: SmoothingCfg,
    pub round: RoundCfg,
    pub signal: SignalCfg,
    pub logging: Logging,
}

impl Config {
    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> eyre::Result<()> {
        if self.smoothing.sample_period_ms == 0 {
            eyre::bail!("smoothing.sample_period_ms must be >= 1");
        }
        if self.smoothing.window_samples == 0 {
            eyre::bail!("smoothing.window_samples must be >= 1");
        }
        if self.smoothing.debounce_timeout_ms == 0 {
            eyre::bail!("smoothing.debounce_timeout_ms must be >= 1");
        }
        if self.link.read_timeout_ms == 0 {
            eyre::bail!("link.read_timeout_ms must be >= 1");
        }
        if self.link.baud_rate == 0 {
            eyre::bail!("link.baud_rate must be >= 1");
        }
        if self.round.command_step_ms == 0 || self.round.rest_step_ms == 0 {
            eyre::bail!("round step durations must be >= 1 ms");
        }
        if self.round.call_slots == 0 {
            eyre::bail!("round.call_slots must be >= 1");
        }
        if self.round.min_calls > self.round.max_calls {
            eyre::bail!("round.min_calls must be <= round.max_calls");
        }
        if self.round.max_calls > self.round.call_slots {
            eyre::bail!("round.max_calls must be <= round.call_slots");
        }
        if self.round.commands.is_empty() {
            eyre::bail!("round.commands must not be empty");
        }
        for cmd in &self.round.commands {
            if cmd.flag >= 8 {
                eyre::bail!("command {:?}: flag must be < 8", cmd.label);
            }
        }
        if self.signal.map.is_empty() {
            eyre::bail!("signal.map must not be empty");
        }
        for entry in &self.signal.map {
            if entry.id > self.smoothing.max_id {
                eyre::bail!(
                    "signal.map id {} exceeds smoothing.max_id {}",
                    entry.id,
                    self.smoothing.max_id
                );
            }
            if entry.flags.iter().any(|&f| f >= 8) {
                eyre::bail!("signal.map flags must be < 8");
            }
        }
        Ok(())
    }
}

/// Parse a TOML string into a `Config` (unvalidated).
pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_config(path: &std::path::Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("failed to read config {}: {e}", path.display()))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("failed to parse config: {e}"))?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    #[test]
    fn empty_toml_loads_defaults() {
        let cfg = load_toml("").expect("defaults");
        assert_eq!(cfg.smoothing.sample_period_ms, 100);
        assert_eq!(cfg.smoothing.window_samples, 20);
        assert_eq!(cfg.round.commands.len(), 8);
        assert_eq!(cfg.signal.map.len(), 4);
        cfg.validate().expect("defaults are valid");
    }

    #[test]
    fn sections_override_defaults() {
        let cfg = load_toml(
            r#"
            [link]
            port = "/dev/ttyUSB0"
            baud_rate = 115200

            [smoothing]
            sample_period_ms = 50
            window_samples = 10
            max_id = 2

            [[signal.map]]
            flags = [0]
            id = 0
            "#,
        )
        .expect("parse");
        assert_eq!(cfg.link.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(cfg.link.baud_rate, 115200);
        assert_eq!(cfg.smoothing.window_samples, 10);
        // a [[signal.map]] entry replaces the default table
        assert_eq!(cfg.signal.map.len(), 1);
        cfg.validate().expect("valid");
    }

    #[rstest]
    #[case("[smoothing]\nsample_period_ms = 0", "sample_period_ms")]
    #[case("[smoothing]\nwindow_samples = 0", "window_samples")]
    #[case("[round]\ncall_slots = 0", "call_slots")]
    #[case("[round]\nmin_calls = 5\nmax_calls = 2", "min_calls")]
    #[case(
        "[[signal.map]]\nflags = [0]\nid = 9",
        "exceeds smoothing.max_id"
    )]
    fn validate_rejects_bad_values(#[case] toml_text: &str, #[case] needle: &str) {
        let cfg = load_toml(toml_text).expect("parse");
        let err = cfg.validate().expect_err("should be rejected");
        assert!(
            err.to_string().contains(needle),
            "unexpected message: {err}"
        );
    }

    #[test]
    fn command_flag_out_of_range_is_rejected() {
        let cfg = load_toml(
            r#"
            [[round.commands]]
            label = "bogus"
            op = "insert"
            flag = 8
            "#,
        )
        .expect("parse");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn load_config_reads_and_validates_file() {
        let mut f = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(f, "[smoothing]\nsample_period_ms = 100").expect("write");
        let cfg = load_config(f.path()).expect("load");
        assert_eq!(cfg.smoothing.sample_period_ms, 100);
    }

    #[test]
    fn load_config_surfaces_missing_file() {
        let err = load_config(std::path::Path::new("/nonexistent/aicam.toml"))
            .expect_err("missing file");
        assert!(err.to_string().contains("failed to read config"));
    }
}
