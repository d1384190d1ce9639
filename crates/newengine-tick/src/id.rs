use std::fmt;

/// Caller-chosen identifier of a [`Sequence`](crate::Sequence).
///
/// Reusing an id with [`Scheduler::create`](crate::Scheduler::create) appends work
/// to the sequence already registered under it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct SequenceId(pub u64);

impl SequenceId {
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn to_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for SequenceId {
    #[inline]
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
