use log::{debug, trace, warn};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::config::SchedulerConfig;
use crate::error::TickResult;
use crate::id::SequenceId;
use crate::sequence::{Sequence, SequenceState};
use crate::unit::TickUnit;

/// Anonymous ids are handed out from the upper half of the id space so they stay
/// clear of small caller-chosen ids.
const ANONYMOUS_ID_BASE: u64 = 1 << 63;

/// What a single heartbeat did. Cheap to produce, intended for diagnostics and tests.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatReport {
    /// 1-based heartbeat counter of the scheduler.
    pub heartbeat: u64,
    /// Ids popped from the active queue (the snapshot length).
    pub dequeued: usize,
    /// Sequences that were Running and received `advance`.
    pub advanced: usize,
    /// Ids no longer present in the registry.
    pub dropped_missing: usize,
    /// Sequences removed after reaching Complete or Disposed.
    pub retired: usize,
    /// Ids put back for the next heartbeat.
    pub requeued: usize,
}

struct SchedulerInner {
    registry: HashMap<SequenceId, Arc<Sequence>>,
    active: VecDeque<SequenceId>,
    next_anonymous: u64,
}

impl SchedulerInner {
    /// At most one occurrence per id in the active queue.
    fn enqueue_active(&mut self, id: SequenceId) -> bool {
        if self.active.contains(&id) {
            return false;
        }
        self.active.push_back(id);
        true
    }
}

/// State shared between a [`Scheduler`] and the sequences registered with it.
pub(crate) struct SchedulerShared {
    config: SchedulerConfig,
    inner: Mutex<SchedulerInner>,
    heartbeats: AtomicU64,
}

impl SchedulerShared {
    /// Puts a registered id into the heartbeat rotation. Unknown ids are ignored.
    pub(crate) fn schedule(&self, id: SequenceId) -> bool {
        let mut g = self.inner.lock();
        if !g.registry.contains_key(&id) {
            return false;
        }
        g.enqueue_active(id)
    }
}

/// Puts an id back into rotation when a sequence's callbacks unwind out of a heartbeat.
struct Requeue<'a> {
    shared: &'a SchedulerShared,
    id: SequenceId,
}

impl Drop for Requeue<'_> {
    fn drop(&mut self) {
        self.shared.schedule(self.id);
    }
}

/// Registry of [`Sequence`]s driven by an external heartbeat.
///
/// Owned by the host's composition root and handed to submitters by clone; all
/// clones share one registry. Every heartbeat advances each active sequence at most
/// once, in FIFO round-robin order.
///
/// # Re-entrancy
///
/// No lock is held while user callbacks run. A callback may call [`create`],
/// [`schedule`], [`remove`] or [`Sequence::play`] on this scheduler; ids it puts into
/// the rotation are serviced on the next heartbeat, never twice in the current one.
///
/// A panic raised by a callback propagates out of [`advance`]. The sequence it came
/// from stays registered and in the rotation, minus the unit that panicked.
///
/// [`advance`]: Scheduler::advance
/// [`create`]: Scheduler::create
/// [`schedule`]: Scheduler::schedule
/// [`remove`]: Scheduler::remove
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<SchedulerShared>,
}

/// Non-owning scheduler handle, for callbacks that must not keep the registry alive.
#[derive(Clone)]
pub struct WeakScheduler {
    shared: Weak<SchedulerShared>,
}

impl WeakScheduler {
    #[inline]
    pub fn upgrade(&self) -> Option<Scheduler> {
        self.shared.upgrade().map(|shared| Scheduler { shared })
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    #[inline]
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            shared: Arc::new(SchedulerShared {
                config,
                inner: Mutex::new(SchedulerInner {
                    registry: HashMap::new(),
                    active: VecDeque::new(),
                    next_anonymous: ANONYMOUS_ID_BASE,
                }),
                heartbeats: AtomicU64::new(0),
            }),
        }
    }

    #[inline]
    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    #[inline]
    pub fn downgrade(&self) -> WeakScheduler {
        WeakScheduler { shared: Arc::downgrade(&self.shared) }
    }

    /// Frame-gated unit at the configured default framerate.
    pub fn frame_unit<F>(&self, executor: F) -> TickResult<TickUnit>
    where
        F: FnMut(f32) + Send + 'static,
    {
        TickUnit::frame_gated(self.shared.config.default_framerate, executor)
    }

    /* ============================
       Submission
       ============================ */

    /// Registers a new sequence for `id` wrapping `unit`, or appends `unit` to the
    /// sequence already registered under `id`.
    ///
    /// A registered sequence that already reached Complete or Disposed (and is only
    /// waiting for the heartbeat to collect it) is replaced by a fresh one.
    /// The returned sequence starts Idle; call [`Sequence::play`] to run it.
    pub fn create(&self, id: SequenceId, unit: TickUnit) -> Arc<Sequence> {
        let mut g = self.shared.inner.lock();

        let unit = match g.registry.get(&id) {
            Some(existing) => match existing.try_append(unit) {
                Ok(units) => {
                    debug!(target: "tick", "sequence.append id={} units={}", id, units);
                    return existing.clone();
                }
                Err(unit) => unit,
            },
            None => unit,
        };

        let seq = Arc::new(Sequence::new(id, unit));
        seq.bind(Arc::downgrade(&self.shared));
        if g.registry.insert(id, seq.clone()).is_some() {
            debug!(target: "tick", "sequence.replace id={}", id);
        } else {
            debug!(target: "tick", "sequence.create id={}", id);
        }
        seq
    }

    /// Like [`create`](Scheduler::create) under a freshly allocated, unused id.
    pub fn create_anonymous(&self, unit: TickUnit) -> Arc<Sequence> {
        let id = {
            let mut g = self.shared.inner.lock();
            loop {
                let candidate = SequenceId(g.next_anonymous);
                g.next_anonymous = g.next_anonymous.wrapping_add(1).max(ANONYMOUS_ID_BASE);
                if !g.registry.contains_key(&candidate) {
                    break candidate;
                }
            }
        };
        self.create(id, unit)
    }

    /// Registers an already built sequence under its own id.
    ///
    /// Returns `false` (and leaves the registry untouched) if the id is taken.
    pub fn add_sequence(&self, seq: Arc<Sequence>) -> bool {
        let id = seq.id();
        let mut g = self.shared.inner.lock();
        if g.registry.contains_key(&id) {
            return false;
        }
        seq.bind(Arc::downgrade(&self.shared));
        g.registry.insert(id, seq);
        debug!(target: "tick", "sequence.add id={}", id);
        true
    }

    /// [`add_sequence`](Scheduler::add_sequence) followed by [`schedule`](Scheduler::schedule).
    pub fn schedule_sequence(&self, seq: Arc<Sequence>) -> bool {
        let id = seq.id();
        let added = self.add_sequence(seq);
        self.schedule(id);
        added
    }

    /// Puts `id` into the heartbeat rotation if it is registered and not already queued.
    #[inline]
    pub fn schedule(&self, id: SequenceId) -> bool {
        self.shared.schedule(id)
    }

    /* ============================
       Control
       ============================ */

    /// Drops `id` from the registry right away. A queued id is discarded when the
    /// heartbeat reaches it.
    pub fn remove(&self, id: SequenceId) -> Option<Arc<Sequence>> {
        let removed = self.shared.inner.lock().registry.remove(&id);
        if let Some(seq) = removed.as_ref() {
            seq.bind(Weak::new());
            debug!(target: "tick", "sequence.remove id={}", id);
        }
        removed
    }

    #[inline]
    pub fn get_sequence(&self, id: SequenceId) -> Option<Arc<Sequence>> {
        self.shared.inner.lock().registry.get(&id).cloned()
    }

    /// Plays the sequence registered under `id`, putting it into the rotation.
    pub fn play(&self, id: SequenceId) {
        if let Some(seq) = self.get_sequence(id) {
            seq.play();
        }
    }

    pub fn pause(&self, id: SequenceId) {
        if let Some(seq) = self.get_sequence(id) {
            seq.pause();
        }
    }

    /// Plays every registered sequence and makes sure each id is in the rotation.
    pub fn play_all(&self) {
        for seq in self.snapshot() {
            seq.play();
            self.schedule(seq.id());
        }
    }

    /// Pauses every registered sequence. Their queued units are kept.
    pub fn pause_all(&self) {
        for seq in self.snapshot() {
            seq.pause();
        }
    }

    fn snapshot(&self) -> Vec<Arc<Sequence>> {
        self.shared.inner.lock().registry.values().cloned().collect()
    }

    /* ============================
       Diagnostics
       ============================ */

    #[inline]
    pub fn len(&self) -> usize {
        self.shared.inner.lock().registry.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn contains(&self, id: SequenceId) -> bool {
        self.shared.inner.lock().registry.contains_key(&id)
    }

    #[inline]
    pub fn active_len(&self) -> usize {
        self.shared.inner.lock().active.len()
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<SequenceId> {
        let mut out: Vec<SequenceId> = self.shared.inner.lock().registry.keys().copied().collect();
        out.sort_unstable();
        out
    }

    #[inline]
    pub fn heartbeats(&self) -> u64 {
        self.shared.heartbeats.load(Ordering::Relaxed)
    }

    /* ============================
       Heartbeat
       ============================ */

    /// Heartbeat entry point. Call once per host tick with the elapsed seconds.
    ///
    /// Exactly as many ids are dequeued as the active queue held on entry; ids
    /// enqueued while this runs wait for the next heartbeat.
    pub fn advance(&self, dt: f32) -> HeartbeatReport {
        let dt = self.sanitize_dt(dt);
        let heartbeat = self.shared.heartbeats.fetch_add(1, Ordering::Relaxed) + 1;
        let mut report = HeartbeatReport { heartbeat, ..HeartbeatReport::default() };

        let pending = self.shared.inner.lock().active.len();

        for _ in 0..pending {
            let (id, seq) = {
                let mut g = self.shared.inner.lock();
                let Some(id) = g.active.pop_front() else {
                    break;
                };
                report.dequeued += 1;
                match g.registry.get(&id) {
                    Some(seq) => (id, seq.clone()),
                    None => {
                        report.dropped_missing += 1;
                        continue;
                    }
                }
            };

            if seq.state() == SequenceState::Running {
                let requeue = Requeue { shared: &self.shared, id };
                seq.advance(dt);
                std::mem::forget(requeue);
                report.advanced += 1;
            }

            let state = seq.state();
            let mut g = self.shared.inner.lock();
            // A callback may have removed or replaced the entry while it ran.
            let still_registered = g
                .registry
                .get(&id)
                .is_some_and(|current| Arc::ptr_eq(current, &seq));

            if state.is_terminal() {
                if !still_registered {
                    continue;
                }
                g.registry.remove(&id);
                drop(g);
                seq.bind(Weak::new());
                report.retired += 1;
                debug!(target: "tick", "sequence.retire id={} state={}", id, state.as_str());
            } else if g.registry.contains_key(&id) && g.enqueue_active(id) {
                report.requeued += 1;
            }
        }

        if self.shared.config.log_heartbeats {
            debug!(target: "tick", "heartbeat {:?} dt={:.4}", report, dt);
        } else {
            trace!(target: "tick", "heartbeat {:?} dt={:.4}", report, dt);
        }
        report
    }

    fn sanitize_dt(&self, dt: f32) -> f32 {
        if !dt.is_finite() || dt < 0.0 {
            warn!(target: "tick", "heartbeat.dt invalid ({dt}), treated as 0");
            return 0.0;
        }
        match self.shared.config.max_dt_sec() {
            Some(max) => dt.min(max),
            None => dt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicU32;

    fn counting_unit(hits: &Arc<AtomicU32>) -> TickUnit {
        let h = hits.clone();
        TickUnit::time_gated(1.0, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap()
    }

    #[test]
    fn create_registers_idle_sequence_outside_rotation() {
        let sched = Scheduler::new();
        let hits = Arc::new(AtomicU32::new(0));
        let seq = sched.create(SequenceId(1), counting_unit(&hits));

        assert_eq!(seq.state(), SequenceState::Idle);
        assert_eq!(sched.len(), 1);
        assert_eq!(sched.active_len(), 0);

        let report = sched.advance(1.0);
        assert_eq!(report.dequeued, 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn play_enters_rotation_once() {
        let sched = Scheduler::new();
        let hits = Arc::new(AtomicU32::new(0));
        let seq = sched.create(SequenceId(1), counting_unit(&hits));
        seq.play();
        seq.play();
        assert_eq!(sched.active_len(), 1);

        let report = sched.advance(1.0);
        assert_eq!(report.advanced, 1);
        assert_eq!(report.requeued, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn schedule_ignores_unknown_ids() {
        let sched = Scheduler::new();
        assert!(!sched.schedule(SequenceId(42)));
        assert_eq!(sched.active_len(), 0);
    }

    #[test]
    fn add_sequence_does_not_overwrite() {
        let sched = Scheduler::new();
        let hits = Arc::new(AtomicU32::new(0));
        let first = Arc::new(Sequence::new(SequenceId(9), counting_unit(&hits)));
        let second = Arc::new(Sequence::new(SequenceId(9), counting_unit(&hits)));

        assert!(sched.add_sequence(first.clone()));
        assert!(!sched.add_sequence(second));
        let got = sched.get_sequence(SequenceId(9)).unwrap();
        assert!(Arc::ptr_eq(&got, &first));
    }

    #[test]
    fn schedule_sequence_registers_and_queues() {
        let sched = Scheduler::new();
        let hits = Arc::new(AtomicU32::new(0));
        let seq = Arc::new(Sequence::new(SequenceId(3), counting_unit(&hits)));
        assert!(sched.schedule_sequence(seq.clone()));
        assert_eq!(sched.active_len(), 1);

        // Not Running yet: dequeued and requeued without ticking.
        let report = sched.advance(1.0);
        assert_eq!(report.advanced, 0);
        assert_eq!(report.requeued, 1);

        seq.play();
        sched.advance(1.0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn anonymous_ids_are_unique_and_high() {
        let sched = Scheduler::new();
        let a = sched.create_anonymous(TickUnit::frame_gated(30, |_| {}).unwrap());
        let b = sched.create_anonymous(TickUnit::frame_gated(30, |_| {}).unwrap());
        assert_ne!(a.id(), b.id());
        assert!(a.id().to_u64() >= ANONYMOUS_ID_BASE);
        assert_eq!(sched.len(), 2);
    }

    #[test]
    fn create_replaces_a_disposed_sequence() {
        let sched = Scheduler::new();
        let hits = Arc::new(AtomicU32::new(0));
        let old = sched.create(SequenceId(5), counting_unit(&hits));
        old.dispose();

        let new = sched.create(SequenceId(5), counting_unit(&hits));
        assert!(!Arc::ptr_eq(&old, &new));
        assert_eq!(new.len(), 1);
        assert_eq!(sched.len(), 1);
    }

    #[test]
    fn negative_and_nan_deltas_count_as_zero() {
        let sched = Scheduler::new();
        let hits = Arc::new(AtomicU32::new(0));
        let seq = sched.create(SequenceId(1), counting_unit(&hits));
        seq.play();

        sched.advance(-5.0);
        sched.advance(f32::NAN);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(sched.heartbeats(), 2);
    }

    #[test]
    fn configured_spike_guard_clamps_delta() {
        let cfg = SchedulerConfig { max_dt_ms: 250, ..SchedulerConfig::default() };
        let sched = Scheduler::with_config(cfg);
        let hits = Arc::new(AtomicU32::new(0));
        let seq = sched.create(SequenceId(1), counting_unit(&hits));
        seq.play();

        sched.advance(10.0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        for _ in 0..3 {
            sched.advance(10.0);
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn frame_unit_uses_configured_framerate() {
        let cfg = SchedulerConfig { default_framerate: 60, ..SchedulerConfig::default() };
        let sched = Scheduler::with_config(cfg);
        let unit = sched.frame_unit(|_| {}).unwrap();
        assert_eq!(unit.cadence(), crate::unit::Cadence::Frame { framerate: 60 });
    }

    #[test]
    fn weak_handle_does_not_keep_scheduler_alive() {
        let sched = Scheduler::new();
        let weak = sched.downgrade();
        assert!(weak.upgrade().is_some());
        drop(sched);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn play_by_id_resumes_a_paused_sequence() {
        let sched = Scheduler::new();
        let hits = Arc::new(AtomicU32::new(0));
        let seq = sched.create(SequenceId(6), counting_unit(&hits));

        sched.play(SequenceId(6));
        assert_eq!(seq.state(), SequenceState::Running);
        assert_eq!(sched.active_len(), 1);

        sched.pause(SequenceId(6));
        sched.advance(1.0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        sched.play(SequenceId(6));
        sched.advance(1.0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        sched.play(SequenceId(99));
        assert!(!sched.contains(SequenceId(99)));
    }
}
