//! Deduplicating, rate-limited work queue.
//!
//! A key is delivered to at most one worker at a time. Adding a key that is
//! already waiting is a no-op, and adding a key that is being processed marks
//! it dirty so it is delivered again once the worker calls [`WorkQueue::done`].
//! Failed keys are re-added after a per-key exponential backoff.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;
use std::hash::Hash;
use std::pin::pin;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use priority_queue::PriorityQueue;
use tokio::select;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Per-key exponential backoff: `base * 2^failures`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub max: Duration,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(5),
            max: Duration::from_secs(1000),
        }
    }
}

impl ExponentialBackoff {
    pub fn delay(&self, failures: u32) -> Duration {
        let exponent = i32::try_from(failures).unwrap_or(i32::MAX);
        let backoff = self.base.as_secs_f64() * 2f64.powi(exponent);
        if !backoff.is_finite() || backoff >= self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(backoff)
        }
    }
}

struct QueueState<K> {
    queue: VecDeque<K>,
    dirty: HashSet<K>,
    processing: HashSet<K>,
    waiting: PriorityQueue<K, Reverse<Instant>>,
    failures: HashMap<K, u32>,
    shutting_down: bool,
}

impl<K: Clone + Eq + Hash> QueueState<K> {
    /// Returns true when the key became ready for delivery.
    fn insert_ready(&mut self, key: K) -> bool {
        if self.dirty.contains(&key) {
            return false;
        }
        self.dirty.insert(key.clone());
        if self.processing.contains(&key) {
            return false;
        }
        self.queue.push_back(key);
        true
    }

    fn promote_due(&mut self, now: Instant) {
        while self
            .waiting
            .peek()
            .is_some_and(|(_, Reverse(at))| *at <= now)
        {
            if let Some((key, _)) = self.waiting.pop() {
                self.insert_ready(key);
            }
        }
    }
}

pub struct WorkQueue<K> {
    state: Mutex<QueueState<K>>,
    ready: Notify,
    idle: Notify,
    backoff: ExponentialBackoff,
}

impl<K: Clone + Eq + Hash> WorkQueue<K> {
    pub fn new(backoff: ExponentialBackoff) -> Self {
        Self {
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                waiting: PriorityQueue::new(),
                failures: HashMap::new(),
                shutting_down: false,
            }),
            ready: Notify::new(),
            idle: Notify::new(),
            backoff,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<K>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Adds a key unless it is already waiting. Ignored after shutdown.
    pub fn add(&self, key: K) {
        let mut state = self.lock();
        if state.shutting_down {
            return;
        }
        if state.insert_ready(key) {
            drop(state);
            self.ready.notify_waiters();
        }
    }

    /// Adds a key once `delay` has elapsed. An earlier pending deadline wins.
    pub fn add_after(&self, key: K, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }
        let mut state = self.lock();
        if state.shutting_down {
            return;
        }
        state
            .waiting
            .push_increase(key, Reverse(Instant::now() + delay));
        drop(state);
        self.ready.notify_waiters();
    }

    /// Re-adds a key after its backoff and records one more failure.
    pub fn add_rate_limited(&self, key: K) {
        let delay = {
            let mut state = self.lock();
            let failures = state.failures.entry(key.clone()).or_insert(0);
            let delay = self.backoff.delay(*failures);
            *failures = failures.saturating_add(1);
            delay
        };
        self.add_after(key, delay);
    }

    /// Clears the failure history of a key.
    pub fn forget(&self, key: &K) {
        self.lock().failures.remove(key);
    }

    pub fn num_requeues(&self, key: &K) -> u32 {
        self.lock().failures.get(key).copied().unwrap_or(0)
    }

    /// Waits for the next key. Returns `None` once the queue is shutting down.
    pub async fn get(&self) -> Option<K> {
        loop {
            let mut notified = pin!(self.ready.notified());
            notified.as_mut().enable();

            let deadline = {
                let mut state = self.lock();
                if state.shutting_down {
                    return None;
                }
                state.promote_due(Instant::now());
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
                state.waiting.peek().map(|(_, Reverse(at))| *at)
            };

            match deadline {
                Some(at) => {
                    select! {
                        _ = notified => {}
                        _ = tokio::time::sleep_until(at) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Marks a key as processed, re-queueing it if it was added meanwhile.
    pub fn done(&self, key: &K) {
        let mut state = self.lock();
        state.processing.remove(key);
        let requeued = state.dirty.contains(key);
        if requeued {
            state.queue.push_back(key.clone());
        }
        let idle = state.processing.is_empty();
        drop(state);

        if requeued {
            self.ready.notify_waiters();
        }
        if idle {
            self.idle.notify_waiters();
        }
    }

    /// Stops delivering keys and wakes every waiting worker.
    pub fn shut_down(&self) {
        self.lock().shutting_down = true;
        self.ready.notify_waiters();
    }

    /// Shuts down, then waits until every in-flight key has been marked done.
    pub async fn shut_down_with_drain(&self) {
        self.shut_down();
        loop {
            let mut idle = pin!(self.idle.notified());
            idle.as_mut().enable();
            if self.lock().processing.is_empty() {
                return;
            }
            idle.await;
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    /// Number of keys ready for delivery.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
