//! Fixed-window admission controller.
//!
//! One [`QuotaState`] is kept per (policy, partition). States live in a
//! sharded [`DashMap`] and each carries its own mutex, so callers on
//! different partitions never contend on a common lock.
//!
//! # Queueing
//!
//! When a window is exhausted and the policy allows it, the caller receives
//! a [`QueuedAdmission`] ticket instead of a rejection. Tickets are released
//! in `queue_order` once a later window frees capacity. A ticket is bounded
//! by one window: at its deadline the waiter itself drives any pending
//! rollover and then either gets the slot or a final rejection. Dropping a
//! ticket withdraws it, and a release that raced with the drop is refunded.

use ahash::RandomState;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::partition::PartitionKey;
use super::policy::{Policy, QueueOrder};

/// Outcome of an admission check.
#[derive(Debug)]
pub enum Decision {
    /// The request may proceed now.
    Allowed,
    /// The request waits for capacity; await [`QueuedAdmission::wait`].
    Queued(QueuedAdmission),
    /// The request must be refused.
    Rejected {
        /// Time until the current window ends.
        retry_after: Duration,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, Decision::Queued(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Decision::Rejected { .. })
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Decision::Rejected { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    /// Static label used for metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Allowed => "allowed",
            Decision::Queued(_) => "queued",
            Decision::Rejected { .. } => "rejected",
        }
    }
}

/// What a queued waiter is eventually told.
#[derive(Debug, Clone, Copy)]
enum Resolution {
    Allowed { window_start: Instant },
    Rejected { retry_after: Duration },
}

impl From<Resolution> for Decision {
    fn from(value: Resolution) -> Self {
        match value {
            Resolution::Allowed { .. } => Decision::Allowed,
            Resolution::Rejected { retry_after } => Decision::Rejected { retry_after },
        }
    }
}

#[derive(Debug)]
struct Waiter {
    ticket: u64,
    deadline: Instant,
    tx: oneshot::Sender<Resolution>,
}

/// Quota bookkeeping for one (policy, partition) pair.
#[derive(Debug)]
struct QuotaState {
    policy: Arc<Policy>,
    partition: PartitionKey,
    window_start: Instant,
    count: u32,
    queued: VecDeque<Waiter>,
    last_seen: Instant,
    evicted: bool,
}

impl QuotaState {
    fn new(policy: Arc<Policy>, partition: PartitionKey, now: Instant) -> Self {
        Self {
            policy,
            partition,
            window_start: now,
            count: 0,
            queued: VecDeque::new(),
            last_seen: now,
            evicted: false,
        }
    }

    fn window_end(&self) -> Instant {
        self.window_start + self.policy.window()
    }

    fn retry_after(&self, now: Instant) -> Duration {
        self.window_end().saturating_duration_since(now)
    }

    /// Roll the window if it has elapsed, hand free permits to queued
    /// waiters, and reject waiters whose deadline passed without capacity.
    fn pump(&mut self, now: Instant) {
        if now >= self.window_end() {
            self.window_start = now;
            self.count = 0;
        }

        while self.count < self.policy.permit_limit() {
            let next = match self.policy.queue_order() {
                QueueOrder::OldestFirst => self.queued.pop_front(),
                QueueOrder::NewestFirst => self.queued.pop_back(),
            };
            let Some(waiter) = next else { break };
            self.count += 1;
            let released = Resolution::Allowed { window_start: self.window_start };
            if waiter.tx.send(released).is_err() {
                // The waiter went away between enqueue and release.
                self.count -= 1;
            } else {
                trace!(partition = %self.partition, ticket = waiter.ticket, "released queued caller");
            }
        }

        if self.queued.iter().any(|w| w.deadline <= now) {
            let retry_after = self.retry_after(now);
            let (expired, pending): (VecDeque<_>, VecDeque<_>) =
                self.queued.drain(..).partition(|w| w.deadline <= now);
            self.queued = pending;
            for waiter in expired {
                let _ = waiter.tx.send(Resolution::Rejected { retry_after });
            }
        }
    }

    fn remove_ticket(&mut self, ticket: u64) -> bool {
        match self.queued.iter().position(|w| w.ticket == ticket) {
            Some(index) => {
                self.queued.remove(index);
                true
            }
            None => false,
        }
    }

    fn reject_all(&mut self, now: Instant) -> usize {
        let retry_after = self.retry_after(now);
        let drained = self.queued.len();
        for waiter in self.queued.drain(..) {
            let _ = waiter.tx.send(Resolution::Rejected { retry_after });
        }
        drained
    }
}

fn lock(state: &Mutex<QuotaState>) -> MutexGuard<'_, QuotaState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A caller waiting for capacity in a later window.
///
/// Dropping the ticket before [`wait`](Self::wait) resolves withdraws it
/// from the queue.
#[derive(Debug)]
pub struct QueuedAdmission {
    ticket: u64,
    deadline: Instant,
    rx: oneshot::Receiver<Resolution>,
    state: Arc<Mutex<QuotaState>>,
    settled: bool,
}

impl QueuedAdmission {
    /// Latest instant at which the ticket resolves.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Wait until the ticket is released or its deadline passes.
    ///
    /// Resolves to [`Decision::Allowed`] or [`Decision::Rejected`].
    pub async fn wait(mut self) -> Decision {
        let received = tokio::time::timeout_at(self.deadline, &mut self.rx).await;
        self.settled = true;
        match received {
            Ok(Ok(resolution)) => resolution.into(),
            Ok(Err(_)) => Decision::Rejected { retry_after: Duration::ZERO },
            Err(_) => self.settle_at_deadline(Instant::now()),
        }
    }

    fn settle_at_deadline(&mut self, now: Instant) -> Decision {
        let mut state = lock(&self.state);
        state.pump(now);
        if state.remove_ticket(self.ticket) {
            return Decision::Rejected { retry_after: state.retry_after(now) };
        }
        match self.rx.try_recv() {
            Ok(resolution) => resolution.into(),
            Err(_) => Decision::Rejected { retry_after: state.retry_after(now) },
        }
    }
}

impl Drop for QueuedAdmission {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = lock(&self.state);
        if state.remove_ticket(self.ticket) {
            debug!(partition = %state.partition, ticket = self.ticket, "queued caller withdrew");
            return;
        }
        // Released while being dropped: hand the permit back.
        if let Ok(Resolution::Allowed { window_start }) = self.rx.try_recv() {
            if state.window_start == window_start && state.count > 0 {
                state.count -= 1;
                state.pump(Instant::now());
            }
        }
    }
}

/// Point-in-time view of one quota state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaSnapshot {
    pub window_start: Instant,
    pub count: u32,
    pub queued: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SlotKey {
    policy: String,
    partition: PartitionKey,
}

/// Result of a maintenance pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub evicted: usize,
    pub retained: usize,
}

/// Fixed-window counters keyed by (policy, partition).
#[derive(Debug)]
pub struct AdmissionController {
    states: DashMap<SlotKey, Arc<Mutex<QuotaState>>, RandomState>,
    next_ticket: AtomicU64,
    idle_windows: u32,
    closed: AtomicBool,
}

impl Default for AdmissionController {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE_WINDOWS)
    }
}

/// Windows of inactivity after which a quota state may be evicted.
pub const DEFAULT_IDLE_WINDOWS: u32 = 10;

impl AdmissionController {
    pub fn new(idle_windows: u32) -> Self {
        Self {
            states: DashMap::with_hasher(RandomState::new()),
            next_ticket: AtomicU64::new(0),
            idle_windows: idle_windows.max(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Check `policy` for `key` at `now`, recording the request if admitted.
    pub fn try_acquire(&self, policy: &Arc<Policy>, key: &PartitionKey, now: Instant) -> Decision {
        let slot = SlotKey { policy: policy.name().to_string(), partition: key.clone() };
        loop {
            let state = self
                .states
                .entry(slot.clone())
                .or_insert_with(|| {
                    Arc::new(Mutex::new(QuotaState::new(Arc::clone(policy), key.clone(), now)))
                })
                .clone();

            let mut guard = lock(&state);
            if guard.evicted {
                // Lost a race with the sweeper; the map now holds (or will hold) a fresh state.
                continue;
            }
            guard.last_seen = guard.last_seen.max(now);
            guard.pump(now);

            if guard.count < policy.permit_limit() {
                guard.count += 1;
                return Decision::Allowed;
            }

            let queue_open = !self.closed.load(Ordering::Acquire);
            if queue_open && (guard.queued.len() as u64) < u64::from(policy.queue_limit()) {
                let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
                let deadline = now + policy.window();
                let (tx, rx) = oneshot::channel();
                guard.queued.push_back(Waiter { ticket, deadline, tx });
                drop(guard);
                return Decision::Queued(QueuedAdmission {
                    ticket,
                    deadline,
                    rx,
                    state,
                    settled: false,
                });
            }

            return Decision::Rejected { retry_after: guard.retry_after(now) };
        }
    }

    /// Roll windows, release or expire queued callers, and evict states idle
    /// for `idle_windows` windows with nobody queued.
    pub fn sweep(&self, now: Instant) -> SweepReport {
        let idle_windows = self.idle_windows;
        let mut report = SweepReport::default();
        self.states.retain(|_, state| {
            let mut guard = lock(state);
            guard.pump(now);
            let idle_for = now.saturating_duration_since(guard.last_seen);
            let idle = guard.queued.is_empty()
                && idle_for >= guard.policy.window().saturating_mul(idle_windows);
            if idle {
                guard.evicted = true;
                report.evicted += 1;
            } else {
                report.retained += 1;
            }
            !idle
        });
        report
    }

    /// Stop queueing and reject every waiting caller.
    ///
    /// Returns how many waiters were rejected.
    pub fn shutdown(&self, now: Instant) -> usize {
        self.closed.store(true, Ordering::Release);
        self.states.iter().map(|entry| lock(entry.value()).reject_all(now)).sum()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of tracked (policy, partition) pairs.
    pub fn partition_count(&self) -> usize {
        self.states.len()
    }

    pub fn snapshot(&self, policy: &str, key: &PartitionKey) -> Option<QuotaSnapshot> {
        let slot = SlotKey { policy: policy.to_string(), partition: key.clone() };
        let state = self.states.get(&slot).map(|entry| Arc::clone(entry.value()))?;
        let guard = lock(&state);
        Some(QuotaSnapshot {
            window_start: guard.window_start,
            count: guard.count,
            queued: guard.queued.len(),
        })
    }
}
