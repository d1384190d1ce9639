use log::debug;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Weak;

use crate::error::{TickError, TickResult};
use crate::id::SequenceId;
use crate::scheduler::SchedulerShared;
use crate::unit::{Completion, TickState, TickUnit};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SequenceState {
    Idle,
    Running,
    Paused,
    Stopped,
    Complete,
    Disposed,
}

impl SequenceState {
    pub fn as_str(self) -> &'static str {
        match self {
            SequenceState::Idle => "Idle",
            SequenceState::Running => "Running",
            SequenceState::Paused => "Paused",
            SequenceState::Stopped => "Stopped",
            SequenceState::Complete => "Complete",
            SequenceState::Disposed => "Disposed",
        }
    }

    /// Complete and Disposed are absorbing.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, SequenceState::Complete | SequenceState::Disposed)
    }
}

struct SequenceInner {
    state: SequenceState,
    units: VecDeque<TickUnit>,
    /// Head unit is currently out of `units`, ticking without the lock held.
    head_in_flight: bool,
    on_complete: Option<Completion>,
}

/// Clears `head_in_flight` if the head unit's callbacks unwind.
struct InFlight<'a>(&'a Mutex<SequenceInner>);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.lock().head_in_flight = false;
    }
}

/// FIFO queue of [`TickUnit`]s belonging to one schedule id.
///
/// Only the head unit receives heartbeats. The next unit is started on the
/// heartbeat after the head completes, so a completion and the following unit's
/// first tick never share a heartbeat.
///
/// User callbacks never run while the sequence (or its scheduler) is locked, so they
/// may freely call back into either.
pub struct Sequence {
    id: SequenceId,
    inner: Mutex<SequenceInner>,
    owner: Mutex<Weak<SchedulerShared>>,
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let g = self.inner.lock();
        f.debug_struct("Sequence")
            .field("id", &self.id)
            .field("state", &g.state)
            .field("units", &g.units.len())
            .field("head_in_flight", &g.head_in_flight)
            .finish()
    }
}

impl Sequence {
    pub fn new(id: SequenceId, initial: TickUnit) -> Self {
        let mut units = VecDeque::new();
        units.push_back(initial);
        Self {
            id,
            inner: Mutex::new(SequenceInner {
                state: SequenceState::Idle,
                units,
                head_in_flight: false,
                on_complete: None,
            }),
            owner: Mutex::new(Weak::new()),
        }
    }

    #[inline]
    pub fn id(&self) -> SequenceId {
        self.id
    }

    #[inline]
    pub fn state(&self) -> SequenceState {
        self.inner.lock().state
    }

    /// Number of units not yet completed, including the one currently ticking.
    #[inline]
    pub fn len(&self) -> usize {
        let g = self.inner.lock();
        g.units.len() + usize::from(g.head_in_flight)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Callback fired once when the queue drains.
    pub fn set_on_complete<C>(&self, on_complete: C)
    where
        C: FnOnce() + Send + 'static,
    {
        self.inner.lock().on_complete = Some(Box::new(on_complete));
    }

    pub(crate) fn bind(&self, owner: Weak<SchedulerShared>) {
        *self.owner.lock() = owner;
    }

    pub fn enqueue(&self, unit: TickUnit) -> TickResult<()> {
        let mut g = self.inner.lock();
        if g.state == SequenceState::Disposed {
            return Err(TickError::SequenceDisposed(self.id));
        }
        g.units.push_back(unit);
        Ok(())
    }

    /// Appends unless the sequence already finished (Complete or Disposed), in which
    /// case the unit is handed back. Returns the new unit count on success.
    pub(crate) fn try_append(&self, unit: TickUnit) -> Result<usize, TickUnit> {
        let mut g = self.inner.lock();
        if g.state.is_terminal() {
            return Err(unit);
        }
        g.units.push_back(unit);
        Ok(g.units.len() + usize::from(g.head_in_flight))
    }

    /// Marks the sequence Running and puts its id back into the owning scheduler's
    /// heartbeat rotation.
    pub fn play(&self) {
        {
            let mut g = self.inner.lock();
            if g.state.is_terminal() {
                return;
            }
            g.state = SequenceState::Running;
        }

        let owner = self.owner.lock().upgrade();
        if let Some(owner) = owner {
            owner.schedule(self.id);
        }
        debug!(target: "tick", "sequence.play id={}", self.id);
    }

    pub fn pause(&self) {
        self.set_state(SequenceState::Paused);
    }

    pub fn stop(&self) {
        self.set_state(SequenceState::Stopped);
    }

    /// Remaining units are dropped on the next `advance`, without completion callbacks.
    pub fn dispose(&self) {
        let mut g = self.inner.lock();
        if g.state == SequenceState::Disposed {
            return;
        }
        g.state = SequenceState::Disposed;
        g.on_complete = None;
        debug!(target: "tick", "sequence.dispose id={}", self.id);
    }

    fn set_state(&self, state: SequenceState) {
        let mut g = self.inner.lock();
        if g.state.is_terminal() {
            return;
        }
        g.state = state;
        debug!(target: "tick", "sequence.{} id={}", state.as_str().to_ascii_lowercase(), self.id);
    }

    /// Ticks the head unit. A call made while the head is already ticking (from one of
    /// its own callbacks) is ignored.
    ///
    /// A panicking callback propagates to the caller; the head unit it came from is
    /// dropped and the remaining units stay queued.
    pub fn advance(&self, dt: f32) {
        let mut unit = {
            let mut g = self.inner.lock();
            if g.head_in_flight {
                return;
            }
            match g.state {
                SequenceState::Disposed => {
                    g.units.clear();
                    return;
                }
                SequenceState::Complete => return,
                _ => {}
            }

            match g.units.pop_front() {
                Some(unit) => {
                    g.state = SequenceState::Running;
                    g.head_in_flight = true;
                    unit
                }
                None => {
                    g.state = SequenceState::Complete;
                    let cb = g.on_complete.take();
                    drop(g);
                    debug!(target: "tick", "sequence.complete id={}", self.id);
                    if let Some(cb) = cb {
                        cb();
                    }
                    return;
                }
            }
        };

        let in_flight = InFlight(&self.inner);
        if unit.state() == TickState::Idle {
            unit.play();
        }
        if unit.state() == TickState::Running {
            unit.advance(dt);
        }
        std::mem::forget(in_flight);

        let mut g = self.inner.lock();
        g.head_in_flight = false;
        if g.state == SequenceState::Disposed {
            g.units.clear();
            return;
        }
        if unit.state() != TickState::Complete {
            g.units.push_front(unit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    fn recorder() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn unit(log: &Arc<Mutex<Vec<String>>>, name: &'static str, fires: u32) -> TickUnit {
        let l = log.clone();
        let c = log.clone();
        TickUnit::time_gated(1.0, move |_| l.lock().push(format!("{name}.fire")))
            .unwrap()
            .with_max_fires(fires)
            .with_on_complete(move || c.lock().push(format!("{name}.done")))
    }

    #[test]
    fn starts_idle_with_one_unit() {
        let log = recorder();
        let seq = Sequence::new(SequenceId(1), unit(&log, "a", 1));
        assert_eq!(seq.state(), SequenceState::Idle);
        assert_eq!(seq.len(), 1);
    }

    #[test]
    fn units_run_in_fifo_order_with_one_heartbeat_gap() {
        let log = recorder();
        let seq = Sequence::new(SequenceId(1), unit(&log, "a", 1));
        seq.enqueue(unit(&log, "b", 2)).unwrap();
        seq.enqueue(unit(&log, "c", 1)).unwrap();

        let mut per_beat = Vec::new();
        for _ in 0..8 {
            let before = log.lock().len();
            seq.advance(1.0);
            per_beat.push(log.lock()[before..].join(","));
        }

        assert_eq!(
            per_beat,
            vec![
                "a.fire,a.done",
                "b.fire",
                "b.fire,b.done",
                "c.fire,c.done",
                "",
                "",
                "",
                "",
            ]
        );
        assert_eq!(seq.state(), SequenceState::Complete);
    }

    #[test]
    fn completion_fires_once_when_queue_drains() {
        let log = recorder();
        let seq = Sequence::new(SequenceId(7), unit(&log, "a", 1));
        let l = log.clone();
        seq.set_on_complete(move || l.lock().push("seq.done".into()));

        seq.advance(1.0);
        assert_eq!(seq.state(), SequenceState::Running);
        assert!(seq.is_empty());

        seq.advance(1.0);
        seq.advance(1.0);
        assert_eq!(seq.state(), SequenceState::Complete);
        assert_eq!(*log.lock(), vec!["a.fire", "a.done", "seq.done"]);
    }

    #[test]
    fn dispose_drops_units_without_callbacks() {
        let log = recorder();
        let seq = Sequence::new(SequenceId(2), unit(&log, "a", 3));
        seq.enqueue(unit(&log, "b", 1)).unwrap();
        let l = log.clone();
        seq.set_on_complete(move || l.lock().push("seq.done".into()));

        seq.advance(1.0);
        seq.dispose();
        assert_eq!(seq.len(), 2);

        seq.advance(1.0);
        seq.advance(1.0);
        assert_eq!(seq.state(), SequenceState::Disposed);
        assert!(seq.is_empty());
        assert_eq!(*log.lock(), vec!["a.fire"]);
    }

    #[test]
    fn enqueue_into_disposed_sequence_fails() {
        let log = recorder();
        let seq = Sequence::new(SequenceId(3), unit(&log, "a", 1));
        seq.dispose();
        let err = seq.enqueue(unit(&log, "b", 1)).unwrap_err();
        assert!(matches!(err, TickError::SequenceDisposed(SequenceId(3))));
    }

    #[test]
    fn terminal_states_ignore_lifecycle_calls() {
        let log = recorder();
        let seq = Sequence::new(SequenceId(4), unit(&log, "a", 1));
        seq.dispose();
        seq.play();
        seq.pause();
        seq.stop();
        assert_eq!(seq.state(), SequenceState::Disposed);
    }

    #[test]
    fn pause_and_stop_keep_queued_units() {
        let log = recorder();
        let seq = Sequence::new(SequenceId(5), unit(&log, "a", 1));
        seq.enqueue(unit(&log, "b", 1)).unwrap();
        seq.pause();
        assert_eq!(seq.state(), SequenceState::Paused);
        seq.stop();
        assert_eq!(seq.state(), SequenceState::Stopped);
        assert_eq!(seq.len(), 2);
    }

    #[test]
    fn dispose_from_inside_a_callback_drops_the_ticking_unit() {
        let log = recorder();
        let seq = Arc::new(Sequence::new(SequenceId(6), unit(&log, "a", 1)));
        let weak = Arc::downgrade(&seq);
        let l = log.clone();
        seq.enqueue(
            TickUnit::time_gated(1.0, move |_| {
                l.lock().push("disposer.fire".into());
                if let Some(s) = weak.upgrade() {
                    s.dispose();
                }
            })
            .unwrap(),
        )
        .unwrap();
        seq.enqueue(unit(&log, "b", 1)).unwrap();

        seq.advance(1.0);
        seq.advance(1.0);
        assert_eq!(seq.state(), SequenceState::Disposed);
        assert!(seq.is_empty());

        seq.advance(1.0);
        assert_eq!(*log.lock(), vec!["a.fire", "a.done", "disposer.fire"]);
    }

    #[test]
    fn nested_advance_from_a_callback_is_ignored() {
        let log = recorder();
        let l = log.clone();
        let seq = Arc::new_cyclic(|weak: &std::sync::Weak<Sequence>| {
            let weak = weak.clone();
            let head = TickUnit::time_gated(1.0, move |dt| {
                l.lock().push("a.fire".into());
                if let Some(s) = weak.upgrade() {
                    s.advance(dt);
                }
            })
            .unwrap()
            .with_max_fires(2);
            Sequence::new(SequenceId(8), head)
        });
        seq.enqueue(unit(&log, "b", 1)).unwrap();

        seq.advance(1.0);
        assert_eq!(*log.lock(), vec!["a.fire"]);
        assert_eq!(seq.len(), 2);
    }

    #[test]
    fn panicking_callback_propagates_and_releases_the_head() {
        let log = recorder();
        let seq = Sequence::new(
            SequenceId(9),
            TickUnit::time_gated(1.0, |_| panic!("executor failed")).unwrap(),
        );
        seq.enqueue(unit(&log, "b", 1)).unwrap();

        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| seq.advance(1.0)));
        assert!(res.is_err());
        assert_eq!(seq.len(), 1);

        seq.advance(1.0);
        assert_eq!(*log.lock(), vec!["b.fire", "b.done"]);
    }
}
