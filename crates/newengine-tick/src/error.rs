use thiserror::Error;

use crate::id::SequenceId;

#[derive(Debug, Error)]
pub enum TickError {
    #[error("framerate must be positive (got {0})")]
    InvalidFramerate(u32),

    #[error("interval must be a positive, finite number of seconds (got {0})")]
    InvalidInterval(f32),

    #[error("sequence {0} is disposed and no longer accepts units")]
    SequenceDisposed(SequenceId),

    #[error("config error: {0}")]
    Config(String),
}

pub type TickResult<T> = Result<T, TickError>;
