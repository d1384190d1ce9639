mod config;
mod heartbeat;
mod signals;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use log::{info, warn};
use newengine_modules_logging::{ConsoleLogger, ConsoleLoggerConfig};
use newengine_tick::{Scheduler, SequenceId, TickUnit};

use crate::{
    config::DemoConfig,
    heartbeat::{HeartbeatClock, HeartbeatStats},
    signals::{ExitReason, ExitSignal},
};

const COUNTDOWN: SequenceId = SequenceId(1);
const PULSE: SequenceId = SequenceId(2);

fn load_config() -> Result<DemoConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            let cfg = DemoConfig::load_toml(&path)?;
            info!(target: "demo", "config loaded from '{path}'");
            Ok(cfg)
        }
        None => Ok(DemoConfig::default()),
    }
}

/// Countdown: three one-second steps, then a short frame-gated burst.
fn submit_countdown(sched: &Scheduler) -> Result<()> {
    let mut left = 3u32;
    let step = TickUnit::time_gated(1.0, move |_| {
        info!(target: "demo", "countdown {left}");
        left = left.saturating_sub(1);
    })?
    .with_max_fires(3);

    let frames = Arc::new(AtomicU32::new(0));
    let f = frames.clone();
    let burst = sched
        .frame_unit(move |_| {
            f.fetch_add(1, Ordering::Relaxed);
        })?
        .with_max_duration(0.5)
        .with_on_complete(move || {
            info!(target: "demo", "burst done frames={}", frames.load(Ordering::Relaxed));
        });

    let seq = sched.create(COUNTDOWN, step);
    sched.create(COUNTDOWN, burst);
    seq.set_on_complete(|| info!(target: "demo", "countdown complete"));
    seq.play();
    Ok(())
}

/// Pulse that stops itself after a number of beats and then hands over to a
/// one-shot follow-up submitted from its completion callback.
fn submit_pulse(sched: &Scheduler) -> Result<()> {
    let beats = Arc::new(AtomicU32::new(0));
    let b = beats.clone();
    let follow_up = sched.downgrade();

    let pulse = TickUnit::time_gated(0.5, move |_| {
        let n = b.fetch_add(1, Ordering::Relaxed) + 1;
        info!(target: "demo", "pulse {n}");
    })?
    .with_stop_predicate(move || beats.load(Ordering::Relaxed) >= 6)
    .with_on_complete(move || {
        let Some(sched) = follow_up.upgrade() else {
            return;
        };
        match TickUnit::time_gated(0.25, |_| info!(target: "demo", "follow-up fired")) {
            Ok(unit) => sched.create_anonymous(unit.with_max_fires(1)).play(),
            Err(e) => warn!(target: "demo", "follow-up rejected: {e}"),
        }
    });

    sched.create(PULSE, pulse).play();
    Ok(())
}

fn main() -> Result<()> {
    let mut logger = ConsoleLogger::new(ConsoleLoggerConfig::from_env());
    logger.init()?;

    let cfg = load_config()?;
    let exit = ExitSignal::new();
    if let Err(e) = exit.install_ctrlc_handler() {
        warn!(target: "demo", "ctrl-c handler not installed: {e}");
    }

    let sched = Scheduler::with_config(cfg.scheduler.clone());
    submit_countdown(&sched)?;
    submit_pulse(&sched)?;
    info!(
        target: "demo",
        "boot heartbeat_hz={} sequences={}",
        cfg.heartbeat_hz,
        sched.len()
    );

    let run_for = (cfg.run_for_ms > 0).then(|| Duration::from_millis(u64::from(cfg.run_for_ms)));
    let started = Instant::now();
    let mut clock = HeartbeatClock::new(cfg.heartbeat_hz);
    let mut stats = HeartbeatStats::new(Duration::from_secs(1));

    let reason = loop {
        if let Some(reason) = exit.reason() {
            break reason;
        }
        if run_for.is_some_and(|limit| started.elapsed() >= limit) {
            exit.request(ExitReason::TimeLimit);
            continue;
        }

        let dt = clock.tick();
        let report = sched.advance(dt);
        stats.record(&report, sched.len());

        if sched.is_empty() {
            exit.request(ExitReason::WorkDrained);
        }
    };

    info!(
        target: "demo",
        "shutdown reason='{}' beats={} t={:.2}s nominal_beat={:.4}s",
        reason.as_str(),
        clock.beat_index,
        clock.t_sec,
        cfg.heartbeat_sec()
    );
    Ok(())
}
