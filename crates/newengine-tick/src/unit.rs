use std::fmt;

use crate::error::{TickError, TickResult};

pub const DEFAULT_FRAMERATE: u32 = 30;

/// Fire callback. Receives the heartbeat delta (seconds) of the heartbeat it fired on.
pub type Executor = Box<dyn FnMut(f32) + Send + 'static>;
/// Evaluated right before a fire; `true` completes the unit instead of firing.
pub type StopPredicate = Box<dyn FnMut() -> bool + Send + 'static>;
pub type Completion = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cadence {
    /// Fires every `1 / framerate` seconds of accumulated heartbeat time.
    Frame { framerate: u32 },
    /// Fires every `seconds` of accumulated heartbeat time.
    Interval { seconds: f32 },
}

impl Cadence {
    #[inline]
    pub fn seconds(self) -> f32 {
        match self {
            Cadence::Frame { framerate } => 1.0 / framerate as f32,
            Cadence::Interval { seconds } => seconds,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TickState {
    Idle,
    Running,
    Complete,
}

impl TickState {
    pub fn as_str(self) -> &'static str {
        match self {
            TickState::Idle => "Idle",
            TickState::Running => "Running",
            TickState::Complete => "Complete",
        }
    }
}

/// Smallest schedulable item: a callback fired at a fixed cadence until a stop
/// predicate or one of the caps ends it.
pub struct TickUnit {
    cadence: Cadence,
    interval_sec: f32,

    accumulated_interval: f32,
    /// Summed in f64 so long-running units keep counting small deltas.
    accumulated_total: f64,
    fire_count: u32,

    max_duration: Option<f64>,
    max_fires: Option<u32>,

    executor: Executor,
    stop_predicate: Option<StopPredicate>,
    on_complete: Option<Completion>,

    state: TickState,
}

impl fmt::Debug for TickUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TickUnit")
            .field("cadence", &self.cadence)
            .field("accumulated_interval", &self.accumulated_interval)
            .field("accumulated_total", &self.accumulated_total)
            .field("fire_count", &self.fire_count)
            .field("max_duration", &self.max_duration)
            .field("max_fires", &self.max_fires)
            .field("has_stop_predicate", &self.stop_predicate.is_some())
            .field("state", &self.state)
            .finish()
    }
}

impl TickUnit {
    /// Unit firing every `1 / framerate` seconds.
    pub fn frame_gated<F>(framerate: u32, executor: F) -> TickResult<Self>
    where
        F: FnMut(f32) + Send + 'static,
    {
        if framerate == 0 {
            return Err(TickError::InvalidFramerate(framerate));
        }
        Ok(Self::with_cadence(Cadence::Frame { framerate }, Box::new(executor)))
    }

    /// Unit firing every `interval_sec` seconds.
    pub fn time_gated<F>(interval_sec: f32, executor: F) -> TickResult<Self>
    where
        F: FnMut(f32) + Send + 'static,
    {
        if !interval_sec.is_finite() || interval_sec <= 0.0 {
            return Err(TickError::InvalidInterval(interval_sec));
        }
        Ok(Self::with_cadence(
            Cadence::Interval { seconds: interval_sec },
            Box::new(executor),
        ))
    }

    fn with_cadence(cadence: Cadence, executor: Executor) -> Self {
        Self {
            cadence,
            interval_sec: cadence.seconds(),
            accumulated_interval: 0.0,
            accumulated_total: 0.0,
            fire_count: 0,
            max_duration: None,
            max_fires: None,
            executor,
            stop_predicate: None,
            on_complete: None,
            state: TickState::Idle,
        }
    }

    pub fn with_stop_predicate<P>(mut self, predicate: P) -> Self
    where
        P: FnMut() -> bool + Send + 'static,
    {
        self.stop_predicate = Some(Box::new(predicate));
        self
    }

    pub fn with_on_complete<C>(mut self, on_complete: C) -> Self
    where
        C: FnOnce() + Send + 'static,
    {
        self.on_complete = Some(Box::new(on_complete));
        self
    }

    /// Completes the unit once this much heartbeat time has accumulated.
    /// Non-positive (or non-finite) values mean unbounded.
    pub fn with_max_duration(mut self, seconds: f64) -> Self {
        self.max_duration = (seconds.is_finite() && seconds > 0.0).then_some(seconds);
        self
    }

    /// Completes the unit after `count` fires. `0` means unbounded.
    pub fn with_max_fires(mut self, count: u32) -> Self {
        self.max_fires = (count > 0).then_some(count);
        self
    }

    #[inline]
    pub fn state(&self) -> TickState {
        self.state
    }

    #[inline]
    pub fn cadence(&self) -> Cadence {
        self.cadence
    }

    #[inline]
    pub fn fire_count(&self) -> u32 {
        self.fire_count
    }

    #[inline]
    pub fn accumulated_interval(&self) -> f32 {
        self.accumulated_interval
    }

    #[inline]
    pub fn accumulated_total(&self) -> f64 {
        self.accumulated_total
    }

    #[inline]
    pub fn max_duration(&self) -> Option<f64> {
        self.max_duration
    }

    #[inline]
    pub fn max_fires(&self) -> Option<u32> {
        self.max_fires
    }

    /// Idle -> Running without waiting for the first heartbeat.
    #[inline]
    pub fn play(&mut self) {
        if self.state == TickState::Idle {
            self.state = TickState::Running;
        }
    }

    pub fn advance(&mut self, dt: f32) {
        if self.state == TickState::Complete {
            return;
        }
        self.state = TickState::Running;

        self.accumulated_interval += dt;
        self.accumulated_total += f64::from(dt);

        if self.accumulated_interval >= self.interval_sec {
            // Carry the remainder so uneven heartbeats do not drift the cadence.
            self.accumulated_interval -= self.interval_sec;

            let stop = match self.stop_predicate.as_mut() {
                Some(p) => p(),
                None => false,
            };
            if stop {
                self.complete();
                return;
            }

            (self.executor)(dt);
            self.fire_count = self.fire_count.saturating_add(1);
        }

        let out_of_time = self
            .max_duration
            .is_some_and(|max| self.accumulated_total >= max);
        let out_of_fires = self.max_fires.is_some_and(|max| self.fire_count >= max);

        if out_of_time || out_of_fires {
            self.complete();
        }
    }

    fn complete(&mut self) {
        self.state = TickState::Complete;
        if let Some(cb) = self.on_complete.take() {
            cb();
        }
    }
}
