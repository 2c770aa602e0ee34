//! Command implementations: hardware assembly, plan generation, round
//! execution, live watch, self-check.

use aicam_config::{Config, RoundCfg};
use aicam_core::error::Result as CoreResult;
use aicam_core::reader::Reader;
use aicam_core::runner::{RoundReport, run_round};
use aicam_core::smoothing::Debouncer;
use aicam_core::{
    RoundEvent, RoundPlan, RoundStatus, Sequencer, SignalMap, SmoothingCfg, StateOp, StateSet,
};
use aicam_hardware::SimulatedCamera;
use aicam_traits::clock::MonotonicClock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Build the byte source and spawn the reader that owns it.
fn spawn_reader(
    cfg: &Config,
    port_override: Option<String>,
    sim: bool,
    sim_ids: Vec<u8>,
) -> eyre::Result<Reader> {
    let timeout = Duration::from_millis(cfg.link.read_timeout_ms);
    if sim {
        let camera = SimulatedCamera::new(sim_ids).with_frame_gap(Duration::from_millis(20));
        return Ok(Reader::spawn(camera, timeout, MonotonicClock::new()));
    }

    let port = port_override
        .or_else(|| cfg.link.port.clone())
        .ok_or_else(|| eyre::eyre!("no serial port configured; pass --port or use --sim"))?;

    #[cfg(feature = "hardware")]
    {
        let camera = aicam_hardware::SerialCamera::open(&port, cfg.link.baud_rate)
            .map_err(|e| eyre::Report::new(map_open_error(e, &port)))?;
        Ok(Reader::spawn(camera, timeout, MonotonicClock::new()))
    }
    #[cfg(not(feature = "hardware"))]
    {
        let _ = port;
        eyre::bail!("built without the `hardware` feature; use --sim")
    }
}

#[cfg(feature = "hardware")]
fn map_open_error(e: aicam_hardware::error::HwError, port: &str) -> aicam_core::error::CamError {
    use aicam_core::error::CamError;
    use aicam_hardware::error::HwError;
    match e {
        HwError::Busy(p) => CamError::Busy(p),
        HwError::Disconnected => CamError::DeviceLost,
        other => CamError::Channel(format!("{port}: {other}")),
    }
}

/// Pick which call slots carry a command and which command each carries,
/// within the configured min/max bounds.
pub fn generate_calls(round: &RoundCfg, rng: &mut StdRng) -> Vec<Option<StateOp>> {
    let mut calls = vec![None; round.call_slots];
    let n = rng.gen_range(round.min_calls..=round.max_calls);
    let mut slots: Vec<usize> = (0..round.call_slots).collect();
    for pick in 0..n {
        let j = rng.gen_range(pick..slots.len());
        slots.swap(pick, j);
    }
    for &slot in &slots[..n] {
        let command = &round.commands[rng.gen_range(0..round.commands.len())];
        calls[slot] = Some(StateOp::from(command));
    }
    calls
}

fn sim_script(cfg: &Config, sim_id: Option<u8>) -> Vec<u8> {
    match sim_id {
        Some(id) => vec![id],
        // Default script: sweep the configured poses in stretches long
        // enough for a majority window to settle on each.
        None => cfg
            .signal
            .map
            .iter()
            .flat_map(|entry| std::iter::repeat(entry.id).take(8))
            .collect(),
    }
}

fn build_sequencer(cfg: &Config) -> CoreResult<Sequencer> {
    let observer = move |event: RoundEvent| match event {
        RoundEvent::SignalUpdate { signal } => {
            tracing::debug!(?signal, "signal update");
        }
        RoundEvent::StepStarted { index, gated } => {
            tracing::info!(step = index, gated, "step started");
        }
        RoundEvent::StepPassed { index } => {
            tracing::info!(step = index, "step passed");
        }
        RoundEvent::StepFailed {
            index,
            resolved,
            expected,
        } => {
            tracing::info!(step = index, ?resolved, ?expected, "step failed");
        }
        RoundEvent::RoundComplete { ref outcomes } => {
            tracing::info!(steps = outcomes.len(), "round complete");
        }
    };
    Sequencer::builder()
        .with_signal_map(SignalMap::from(&cfg.signal))
        .with_smoothing(SmoothingCfg::from(&cfg.smoothing))
        .with_observer(observer)
        .build()
}

fn print_report(round: u32, report: &RoundReport, json: bool) {
    if json {
        let (status, failure) = match report.status {
            RoundStatus::Complete => ("complete", None),
            RoundStatus::Failed(f) => ("failed", Some(f)),
            RoundStatus::Running => ("running", None),
        };
        let mut obj = serde_json::json!({
            "round": round,
            "status": status,
            "passed": report.passed(),
            "total": report.outcomes.len(),
        });
        if let Some(f) = failure {
            obj["failed_step"] = serde_json::json!(f.step);
            obj["resolved"] = serde_json::json!(f.resolved);
            obj["expected"] = serde_json::json!(f.expected);
        }
        println!("{obj}");
    } else {
        match report.status {
            RoundStatus::Complete => println!(
                "round {round}: complete, {}/{} steps passed",
                report.passed(),
                report.outcomes.len()
            ),
            RoundStatus::Failed(f) => println!(
                "round {round}: failed at step {} (saw {:?}, expected {:?})",
                f.step, f.resolved, f.expected
            ),
            RoundStatus::Running => {}
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_run(
    cfg: &Config,
    rounds: u32,
    port: Option<String>,
    sim: bool,
    sim_id: Option<u8>,
    seed: Option<u64>,
    json: bool,
    shutdown: &Arc<AtomicBool>,
) -> eyre::Result<()> {
    let reader = spawn_reader(cfg, port, sim, sim_script(cfg, sim_id))?;
    let mut sequencer = build_sequencer(cfg)?;
    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };

    let command_step = Duration::from_millis(cfg.round.command_step_ms);
    let rest_step = Duration::from_millis(cfg.round.rest_step_ms);
    let stop_flag = shutdown.clone();
    let stop = move || stop_flag.load(Ordering::Relaxed);

    for round in 1..=rounds {
        if shutdown.load(Ordering::Relaxed) {
            tracing::info!("shutdown requested, stopping");
            break;
        }
        let calls = generate_calls(&cfg.round, &mut rng);
        let plan = RoundPlan::call_and_answer(&calls, command_step, rest_step);
        tracing::info!(round, steps = plan.len(), "starting round");

        match run_round(&reader, &mut sequencer, plan, Some(&stop)) {
            Ok(report) => print_report(round, &report, json),
            Err(e) if shutdown.load(Ordering::Relaxed) => {
                tracing::info!("round interrupted: {e}");
                break;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

pub fn cmd_watch(
    cfg: &Config,
    port: Option<String>,
    sim: bool,
    seconds: u64,
    json: bool,
    shutdown: &Arc<AtomicBool>,
) -> eyre::Result<()> {
    let reader = spawn_reader(cfg, port, sim, sim_script(cfg, None))?;
    let mut debouncer = Debouncer::new(cfg.smoothing.debounce_timeout_ms);
    let epoch = Instant::now();
    let deadline = epoch + Duration::from_secs(seconds);

    while Instant::now() < deadline && !shutdown.load(Ordering::Relaxed) {
        if reader.status().is_down() {
            tracing::warn!("link down, stopping watch");
            break;
        }
        let now_ms = epoch.elapsed().as_millis() as u64;
        let transition = match reader.latest() {
            Some(sample) => debouncer.observe(sample, now_ms),
            None => debouncer.tick(now_ms),
        };
        if let Some(signal) = transition {
            if json {
                println!("{}", serde_json::json!({ "t_ms": now_ms, "signal": signal }));
            } else {
                match signal {
                    Some(id) => println!("signal: {id}"),
                    None => println!("signal: none"),
                }
            }
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    Ok(())
}

pub fn cmd_self_check(cfg: &Config, json: bool) -> eyre::Result<()> {
    // Fast cadence: the check should take well under a second.
    let smoothing = SmoothingCfg {
        sample_period_ms: 20,
        window_samples: 5,
        ..SmoothingCfg::from(&cfg.smoothing)
    };
    let map = SignalMap::from(&cfg.signal);
    // Expect whatever the map assigns to the empty state; an op that
    // removes flag 0 from nothing keeps the state empty.
    let sim_id = map.expected(StateSet::EMPTY).unwrap_or(0);

    let camera =
        SimulatedCamera::new([sim_id]).with_frame_gap(Duration::from_millis(5));
    let reader = Reader::spawn(camera, Duration::from_millis(10), MonotonicClock::new());
    let mut sequencer = Sequencer::builder()
        .with_signal_map(map)
        .with_smoothing(smoothing)
        .build()?;

    let plan = RoundPlan::new(vec![
        aicam_core::StepSpec::rest(Duration::from_millis(100)),
        aicam_core::StepSpec::gated(StateOp::Remove(0), Duration::from_millis(800)),
    ]);
    let report = run_round(&reader, &mut sequencer, plan, None)?;
    if !report.is_complete() {
        eyre::bail!("self-check round did not complete: {:?}", report.status);
    }
    if json {
        println!("{}", serde_json::json!({ "self_check": "ok" }));
    } else {
        println!("self-check ok");
    }
    Ok(())
}
