//! NewEngine tick scheduler.
//!
//! Cooperative, heartbeat-driven scheduling of repeating work:
//! - [`TickUnit`]: one callback at a frame- or time-gated cadence, with optional
//!   stop predicate, duration cap and fire cap.
//! - [`Sequence`]: FIFO of units under one id, run one at a time.
//! - [`Scheduler`]: id registry plus the heartbeat entry point [`Scheduler::advance`].
//!
//! The host owns the [`Scheduler`] and calls `advance(dt)` once per tick.

pub mod config;
pub mod error;
pub mod id;
pub mod scheduler;
pub mod sequence;
pub mod unit;

pub use config::SchedulerConfig;
pub use error::{TickError, TickResult};
pub use id::SequenceId;
pub use scheduler::{HeartbeatReport, Scheduler, WeakScheduler};
pub use sequence::{Sequence, SequenceState};
pub use unit::{Cadence, TickState, TickUnit, DEFAULT_FRAMERATE};
