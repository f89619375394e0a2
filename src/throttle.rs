//! Throttle - Coalesces bursts of work into one run after a quiet interval.
//!
//! Every data source funnels its reconciliations through a [`Throttling`]
//! implementation. The default [`Throttle`] is a debounce: each `schedule()`
//! replaces the pending task of its key and pushes the deadline back by
//! `interval`.
//!
//! # Pattern
//!
//! - Throttles never spawn timers. They live on the owner (render) thread.
//! - Every `Throttle` registers itself in a thread-local registry.
//! - The render loop calls [`run_due_throttles`] once per tick and uses
//!   [`next_throttle_deadline`] to decide how long it may sleep.
//!
//! # Pattern: Keys
//!
//! A throttle holds one pending task per [`ThrottleKey`]. Each data source
//! schedules under its own key, so sources sharing a throttle never replace or
//! cancel each other's work. They share the deadline: the whole group fires in
//! the same tick once every member has gone quiet.
//!
//! # Example
//!
//! ```ignore
//! use spark_sections::throttle::{run_due_throttles, next_throttle_deadline};
//!
//! loop {
//!     let timeout = next_throttle_deadline()
//!         .map(|at| at.saturating_duration_since(Instant::now()))
//!         .unwrap_or(Duration::from_millis(250));
//!     wait_for_input(timeout);
//!     run_due_throttles(Instant::now());
//! }
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use tracing::trace;

/// Deferred unit of work held by a throttle.
pub type Task = Box<dyn FnOnce()>;

// =============================================================================
// ThrottleKey
// =============================================================================

/// Identifies whose task a throttle is holding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThrottleKey(u64);

thread_local! {
    static NEXT_KEY: Cell<u64> = const { Cell::new(1) };
}

impl ThrottleKey {
    /// Key used by [`Throttle::on`]. Never handed out by `next()`.
    pub const DEFAULT: ThrottleKey = ThrottleKey(0);

    /// A key no other caller on this thread holds.
    pub fn next() -> Self {
        NEXT_KEY.with(|next| {
            let id = next.get();
            next.set(id + 1);
            ThrottleKey(id)
        })
    }
}

// =============================================================================
// Throttling contract
// =============================================================================

/// Scheduling primitive consumed by `SectionDataSource`.
///
/// Implementations must run at most the last task scheduled under each key, on
/// the owner thread, once a quiet interval has passed. Operations on one key
/// never touch the tasks of another.
pub trait Throttling {
    /// Submit a task, superseding the task still pending under `key`.
    fn schedule(&self, key: ThrottleKey, task: Task);

    /// Drop the task pending under `key`, if any, without running it.
    fn cancel(&self, key: ThrottleKey);

    /// Whether a task is waiting to run under `key`.
    fn is_pending(&self, key: ThrottleKey) -> bool;
}

// =============================================================================
// Throttle
// =============================================================================

struct ThrottleInner {
    interval: Duration,
    deadline: Cell<Option<Instant>>,
    /// Pending tasks in first-scheduled order.
    tasks: RefCell<Vec<(ThrottleKey, Task)>>,
}

impl ThrottleInner {
    /// Take every pending task if the deadline has passed.
    fn take_due(&self, now: Instant) -> Vec<Task> {
        match self.deadline.get() {
            Some(deadline) if deadline <= now => self.take_all(),
            _ => Vec::new(),
        }
    }

    fn take_all(&self) -> Vec<Task> {
        self.deadline.set(None);
        self.tasks
            .borrow_mut()
            .drain(..)
            .map(|(_, task)| task)
            .collect()
    }

    fn has_pending(&self) -> bool {
        !self.tasks.borrow().is_empty()
    }
}

/// Runs tasks taken out of a throttle. Returns how many ran.
fn run_tasks(tasks: Vec<Task>) -> usize {
    let count = tasks.len();
    for task in tasks {
        task();
    }
    count
}

/// Debouncing throttle driven by the owner's event loop.
///
/// Cloning yields another handle to the same throttle.
#[derive(Clone)]
pub struct Throttle {
    inner: Rc<ThrottleInner>,
}

impl Throttle {
    /// Create a throttle and register it with this thread's registry.
    pub fn new(interval: Duration) -> Self {
        let inner = Rc::new(ThrottleInner {
            interval,
            deadline: Cell::new(None),
            tasks: RefCell::new(Vec::new()),
        });

        THROTTLES.with(|throttles| {
            let mut throttles = throttles.borrow_mut();
            throttles.retain(|t| t.strong_count() > 0);
            throttles.push(Rc::downgrade(&inner));
        });

        Self { inner }
    }

    /// Quiet interval between the last `schedule()` and the run.
    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// When the pending tasks become due, if there are any.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline.get()
    }

    /// Whether any key has a task waiting.
    pub fn has_pending(&self) -> bool {
        self.inner.has_pending()
    }

    /// Submit a task under [`ThrottleKey::DEFAULT`].
    pub fn on(&self, task: impl FnOnce() + 'static) {
        self.schedule(ThrottleKey::DEFAULT, Box::new(task));
    }

    /// Run the pending tasks if the deadline is at or before `now`.
    ///
    /// Returns true if a task ran.
    pub fn fire_if_due(&self, now: Instant) -> bool {
        // Released before running so a task may schedule again.
        let tasks = self.inner.take_due(now);
        if tasks.is_empty() {
            return false;
        }
        trace!(interval = ?self.inner.interval, tasks = tasks.len(), "throttle fired");
        run_tasks(tasks) > 0
    }

    /// Run the pending tasks right now, ignoring the deadline.
    ///
    /// Returns true if a task ran.
    pub fn flush(&self) -> bool {
        let tasks = self.inner.take_all();
        if tasks.is_empty() {
            return false;
        }
        trace!(tasks = tasks.len(), "throttle flushed");
        run_tasks(tasks) > 0
    }
}

impl Throttling for Throttle {
    fn schedule(&self, key: ThrottleKey, task: Task) {
        let mut tasks = self.inner.tasks.borrow_mut();
        let superseded = match tasks.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => {
                entry.1 = task;
                true
            }
            None => {
                tasks.push((key, task));
                false
            }
        };
        self.inner.deadline.set(Some(Instant::now() + self.inner.interval));
        trace!(?key, superseded, pending = tasks.len(), "throttle scheduled");
    }

    fn cancel(&self, key: ThrottleKey) {
        let mut tasks = self.inner.tasks.borrow_mut();
        let before = tasks.len();
        tasks.retain(|(k, _)| *k != key);
        if tasks.len() < before {
            trace!(?key, "throttle cancelled");
        }
        if tasks.is_empty() {
            self.inner.deadline.set(None);
        }
    }

    fn is_pending(&self, key: ThrottleKey) -> bool {
        self.inner.tasks.borrow().iter().any(|(k, _)| *k == key)
    }
}

impl fmt::Debug for Throttle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Throttle")
            .field("interval", &self.inner.interval)
            .field("deadline", &self.deadline())
            .field("pending", &self.inner.tasks.borrow().len())
            .finish()
    }
}

// =============================================================================
// THROTTLE REGISTRY
// =============================================================================

thread_local! {
    /// Every live throttle created on this thread.
    static THROTTLES: RefCell<Vec<Weak<ThrottleInner>>> = RefCell::new(Vec::new());
}

/// Live throttles, pruning the dead ones.
fn live_throttles() -> Vec<Rc<ThrottleInner>> {
    THROTTLES.with(|throttles| {
        let mut throttles = throttles.borrow_mut();
        throttles.retain(|t| t.strong_count() > 0);
        throttles.iter().filter_map(Weak::upgrade).collect()
    })
}

/// Fire every throttle on this thread whose deadline is at or before `now`.
///
/// Returns how many tasks ran.
pub fn run_due_throttles(now: Instant) -> usize {
    // Registry borrow is released before any task runs.
    let due: Vec<Task> = live_throttles()
        .iter()
        .flat_map(|inner| inner.take_due(now))
        .collect();

    let count = run_tasks(due);
    if count > 0 {
        trace!(count, "ran due throttles");
    }
    count
}

/// Earliest pending deadline across this thread's throttles.
pub fn next_throttle_deadline() -> Option<Instant> {
    live_throttles()
        .iter()
        .filter_map(|inner| inner.deadline.get())
        .min()
}

/// Number of live throttles with a pending task.
pub fn pending_throttle_count() -> usize {
    live_throttles()
        .iter()
        .filter(|inner| inner.has_pending())
        .count()
}

/// Drop every pending task on this thread (for testing).
///
/// Live throttles stay registered, so data sources created before the reset
/// keep firing through [`run_due_throttles`].
pub fn reset_throttles() {
    for inner in live_throttles() {
        inner.take_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn later() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    #[test]
    fn test_throttle_runs_only_last_task() {
        reset_throttles();

        let throttle = Throttle::new(Duration::from_millis(10));
        let runs = Rc::new(RefCell::new(Vec::new()));

        for n in 1..=3 {
            let runs = runs.clone();
            throttle.on(move || runs.borrow_mut().push(n));
        }

        assert!(throttle.is_pending(ThrottleKey::DEFAULT));
        assert!(throttle.fire_if_due(later()));
        assert_eq!(*runs.borrow(), vec![3], "only the last task should run");
        assert!(!throttle.has_pending());
    }

    #[test]
    fn test_throttle_not_due_before_interval() {
        reset_throttles();

        let throttle = Throttle::new(Duration::from_secs(30));
        let ran = Rc::new(Cell::new(false));
        let ran_clone = ran.clone();
        throttle.on(move || ran_clone.set(true));

        assert!(!throttle.fire_if_due(Instant::now()));
        assert!(!ran.get(), "task should wait for the quiet interval");
        assert!(throttle.has_pending());
    }

    #[test]
    fn test_schedule_pushes_deadline_back() {
        reset_throttles();

        let throttle = Throttle::new(Duration::from_millis(50));
        throttle.on(|| {});
        let first = throttle.deadline();
        std::thread::sleep(Duration::from_millis(2));
        throttle.on(|| {});
        let second = throttle.deadline();

        assert!(second > first, "new submission should restart the quiet interval");
    }

    #[test]
    fn test_cancel_drops_pending_task() {
        reset_throttles();

        let throttle = Throttle::new(Duration::from_millis(10));
        let ran = Rc::new(Cell::new(false));
        let ran_clone = ran.clone();
        throttle.on(move || ran_clone.set(true));

        throttle.cancel(ThrottleKey::DEFAULT);

        assert!(!throttle.has_pending());
        assert_eq!(throttle.deadline(), None);
        assert!(!throttle.flush());
        assert!(!ran.get());
    }

    #[test]
    fn test_task_can_reschedule_itself() {
        reset_throttles();

        let throttle = Throttle::new(Duration::from_millis(10));
        let handle = throttle.clone();
        throttle.on(move || handle.on(|| {}));

        assert!(throttle.flush());
        assert!(throttle.has_pending(), "task scheduled from inside a run should stay pending");
    }

    // =========================================================================
    // Keys
    // =========================================================================

    #[test]
    fn test_keys_are_unique() {
        let a = ThrottleKey::next();
        let b = ThrottleKey::next();

        assert_ne!(a, b);
        assert_ne!(a, ThrottleKey::DEFAULT);
        assert_ne!(b, ThrottleKey::DEFAULT);
    }

    #[test]
    fn test_keys_keep_their_own_task() {
        reset_throttles();

        let throttle = Throttle::new(Duration::from_millis(10));
        let (a, b) = (ThrottleKey::next(), ThrottleKey::next());
        let runs = Rc::new(RefCell::new(Vec::new()));

        for (key, label) in [(a, "a1"), (b, "b1"), (a, "a2")] {
            let runs = runs.clone();
            throttle.schedule(key, Box::new(move || runs.borrow_mut().push(label)));
        }

        assert!(throttle.is_pending(a));
        assert!(throttle.is_pending(b));
        assert!(throttle.fire_if_due(later()));
        assert_eq!(*runs.borrow(), vec!["a2", "b1"], "each key keeps its last task");
    }

    #[test]
    fn test_cancel_only_touches_its_key() {
        reset_throttles();

        let throttle = Throttle::new(Duration::from_millis(10));
        let (a, b) = (ThrottleKey::next(), ThrottleKey::next());
        let ran = Rc::new(Cell::new(0));

        for key in [a, b] {
            let ran = ran.clone();
            throttle.schedule(key, Box::new(move || ran.set(ran.get() + 1)));
        }
        throttle.cancel(a);

        assert!(!throttle.is_pending(a));
        assert!(throttle.is_pending(b), "the other key should stay pending");
        assert!(throttle.deadline().is_some());
        assert_eq!(run_due_throttles(later()), 1);
        assert_eq!(ran.get(), 1);
    }

    // =========================================================================
    // Registry
    // =========================================================================

    #[test]
    fn test_registry_runs_due_throttles() {
        reset_throttles();

        let a = Throttle::new(Duration::from_millis(10));
        let b = Throttle::new(Duration::from_millis(10));
        let _idle = Throttle::new(Duration::from_millis(10));
        let count = Rc::new(Cell::new(0));

        for throttle in [&a, &b] {
            let count = count.clone();
            throttle.on(move || count.set(count.get() + 1));
        }

        assert_eq!(pending_throttle_count(), 2);
        assert!(next_throttle_deadline().is_some());
        assert_eq!(run_due_throttles(later()), 2);
        assert_eq!(count.get(), 2);
        assert_eq!(next_throttle_deadline(), None);
    }

    #[test]
    fn test_registry_forgets_dropped_throttles() {
        reset_throttles();

        let throttle = Throttle::new(Duration::from_millis(10));
        throttle.on(|| {});
        drop(throttle);

        assert_eq!(pending_throttle_count(), 0);
        assert_eq!(run_due_throttles(later()), 0);
    }

    #[test]
    fn test_reset_keeps_live_throttles_registered() {
        let throttle = Throttle::new(Duration::from_millis(10));
        throttle.on(|| {});

        reset_throttles();
        assert!(!throttle.has_pending(), "reset drops pending tasks");

        let ran = Rc::new(Cell::new(false));
        let ran_clone = ran.clone();
        throttle.on(move || ran_clone.set(true));

        assert_eq!(run_due_throttles(later()), 1, "the throttle should still be driven by the registry");
        assert!(ran.get());
    }
}
