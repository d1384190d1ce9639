use std::thread;
use std::time::{Duration, Instant};

use log::info;
use newengine_tick::HeartbeatReport;

/// Fixed-rate heartbeat source: paces the host loop and measures real elapsed time.
pub struct HeartbeatClock {
    period: Duration,
    last: Instant,
    next_deadline: Instant,

    pub dt_sec: f32,
    pub t_sec: f64,
    pub beat_index: u64,
}

impl HeartbeatClock {
    pub fn new(hz: u32) -> Self {
        let period = Duration::from_secs_f64(1.0 / f64::from(hz.max(1)));
        let now = Instant::now();
        Self {
            period,
            last: now,
            next_deadline: now + period,
            dt_sec: 0.0,
            t_sec: 0.0,
            beat_index: 0,
        }
    }

    /// Sleeps until the next beat and returns the seconds elapsed since the previous one.
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        if self.next_deadline > now {
            thread::sleep(self.next_deadline - now);
        }

        let now = Instant::now();
        let raw_dt = now.duration_since(self.last);
        self.last = now;
        // Late beats do not try to catch up.
        self.next_deadline = (self.next_deadline + self.period).max(now);

        self.dt_sec = raw_dt.as_secs_f32();
        self.t_sec += raw_dt.as_secs_f64();
        self.beat_index += 1;
        self.dt_sec
    }
}

/// Periodic one-line summary of scheduler activity.
pub struct HeartbeatStats {
    period: Duration,
    window_start: Instant,
    beats: u32,
    advanced: usize,
    retired: usize,
}

impl HeartbeatStats {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            window_start: Instant::now(),
            beats: 0,
            advanced: 0,
            retired: 0,
        }
    }

    pub fn record(&mut self, report: &HeartbeatReport, sequences: usize) {
        self.beats += 1;
        self.advanced += report.advanced;
        self.retired += report.retired;

        let elapsed = self.window_start.elapsed();
        if elapsed < self.period {
            return;
        }

        let secs = elapsed.as_secs_f32().max(0.0001);
        info!(
            target: "demo",
            "beats/s={:.1} advanced={} retired={} sequences={}",
            self.beats as f32 / secs,
            self.advanced,
            self.retired,
            sequences
        );

        self.beats = 0;
        self.advanced = 0;
        self.retired = 0;
        self.window_start = Instant::now();
    }
}
