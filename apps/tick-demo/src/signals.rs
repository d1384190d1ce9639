use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ExitReason {
    Interrupted,
    TimeLimit,
    WorkDrained,
}

impl ExitReason {
    const NONE: u8 = 0;

    fn to_raw(self) -> u8 {
        match self {
            ExitReason::Interrupted => 1,
            ExitReason::TimeLimit => 2,
            ExitReason::WorkDrained => 3,
        }
    }

    fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(ExitReason::Interrupted),
            2 => Some(ExitReason::TimeLimit),
            3 => Some(ExitReason::WorkDrained),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExitReason::Interrupted => "interrupted",
            ExitReason::TimeLimit => "time limit",
            ExitReason::WorkDrained => "work drained",
        }
    }
}

/// Exit request shared between the heartbeat loop and the ctrl-c handler.
/// The first reason recorded wins.
#[derive(Clone)]
pub struct ExitSignal {
    reason: Arc<AtomicU8>,
}

impl ExitSignal {
    pub fn new() -> Self {
        Self { reason: Arc::new(AtomicU8::new(ExitReason::NONE)) }
    }

    #[inline]
    pub fn request(&self, reason: ExitReason) {
        let _ = self.reason.compare_exchange(
            ExitReason::NONE,
            reason.to_raw(),
            Ordering::Relaxed,
            Ordering::Relaxed,
        );
    }

    #[inline]
    pub fn reason(&self) -> Option<ExitReason> {
        ExitReason::from_raw(self.reason.load(Ordering::Relaxed))
    }

    pub fn install_ctrlc_handler(&self) -> anyhow::Result<()> {
        let s = self.clone();
        ctrlc::set_handler(move || s.request(ExitReason::Interrupted))?;
        Ok(())
    }
}
