//! SectionDataSource - Reconciles one section of a list view.
//!
//! A data source keeps two lists:
//!
//! - `items` - what the caller declared last. Replaced synchronously by
//!   `update()`.
//! - `snapshot` - what the view currently shows. Replaced only when a
//!   reconciliation runs, and by `reserve_moved()`.
//!
//! `update()` assigns `items` right away, then hands a reconciliation task to
//! the throttle. When the throttle fires, the task diffs the snapshot against
//! the latest items, so any intermediate update that never reached the view is
//! simply skipped.
//!
//! # Pattern: Weak reconciliation tasks
//!
//! Pending tasks hold a `Weak` to the data source state. A data source dropped
//! before its throttle fires reconciles nothing and its completion never runs.
//!
//! # Pattern: Reserved moves
//!
//! When the view itself reorders a row (drag and drop), the snapshot must
//! follow before the next diff:
//!
//! ```ignore
//! // 1. The view already moved the row
//! source.reserve_moved(from, to);
//! // 2. Reorder the model
//! let item = todos.remove(from.item);
//! todos.insert(to.item, item);
//! // 3. Reconcile. Nothing left to move.
//! source.update(todos, UpdateMode::Partial { animated: true }, false, || {});
//! ```
//!
//! Skipping step 1 makes the diff replay the move the view already did.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use spark_signals::{signal, Signal};
use tracing::trace;

use crate::erased::AnySectionDataSource;
use crate::throttle::{Task, Throttle, ThrottleKey, Throttling};
use crate::types::{
    Completion, EqualityChecker, IndexPath, SectionConfig, UpdateMode, UpdatePhase,
    DEFAULT_THROTTLE_INTERVAL,
};
use crate::updater::{SectionUpdater, UpdaterMode, Updating};

// =============================================================================
// Shared state
// =============================================================================

pub(crate) struct SectionState<T, A> {
    items: RefCell<Vec<T>>,
    snapshot: RefCell<Vec<T>>,
    displaying_section: Cell<usize>,
    is_equal: EqualityChecker<T>,
    updater: SectionUpdater<A>,
    throttle: Rc<dyn Throttling>,
    /// This data source's slot in `throttle`.
    key: ThrottleKey,
    /// Reconciliations whose completion has not fired yet.
    in_flight: Cell<usize>,
    /// Bumped on every snapshot change.
    revision: Signal<u64>,
}

impl<T: Clone + 'static, A: Updating + 'static> SectionState<T, A> {
    fn bump_revision(&self) {
        self.revision.set(self.revision.get() + 1);
    }

    fn to_index(&self, index_path: IndexPath) -> usize {
        let section = self.displaying_section.get();
        assert!(
            index_path.section == section,
            "IndexPath.section ({}) must be equal to displaying_section ({})",
            index_path.section,
            section
        );
        index_path.item
    }

    /// Reconcile the snapshot against the latest items.
    fn reconcile(state: &Rc<Self>, update_mode: UpdateMode, completion: Completion) {
        let new = state.items.borrow().clone();
        let old = state.snapshot.replace(new.clone());
        state.bump_revision();

        let mode = match update_mode {
            UpdateMode::Everything => UpdaterMode::Everything,
            UpdateMode::Partial { animated } => UpdaterMode::Partial {
                animated,
                is_equal: state.is_equal.clone(),
            },
        };

        state.in_flight.set(state.in_flight.get() + 1);
        let weak = Rc::downgrade(state);
        let completion: Completion = Box::new(move || {
            if let Some(state) = weak.upgrade() {
                state.in_flight.set(state.in_flight.get().saturating_sub(1));
            }
            completion();
        });

        let changes = state.updater.update(
            state.displaying_section.get(),
            &old,
            &new,
            mode,
            completion,
        );
        trace!(key = ?state.key, ?changes, "reconciled");
    }
}

// =============================================================================
// SectionDataSource
// =============================================================================

/// Data source for one section of a list view.
///
/// Cloning yields another handle to the same data source.
pub struct SectionDataSource<T, A> {
    pub(crate) state: Rc<SectionState<T, A>>,
}

impl<T, A> Clone for SectionDataSource<T, A> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T: Clone + PartialEq + 'static, A: Updating + 'static> SectionDataSource<T, A> {
    /// Create a data source comparing items with `==`.
    pub fn new(adapter: A, displaying_section: usize) -> Self {
        Self::with_equality(adapter, displaying_section, |a: &T, b: &T| a == b)
    }
}

impl<T: Clone + 'static, A: Updating + 'static> SectionDataSource<T, A> {
    /// Create a data source with a custom identity predicate.
    pub fn with_equality(
        adapter: A,
        displaying_section: usize,
        is_equal: impl Fn(&T, &T) -> bool + 'static,
    ) -> Self {
        Self::with_config(
            adapter,
            SectionConfig {
                displaying_section,
                throttle_interval: DEFAULT_THROTTLE_INTERVAL,
            },
            is_equal,
        )
    }

    /// Create a data source from a [`SectionConfig`].
    pub fn with_config(
        adapter: A,
        config: SectionConfig,
        is_equal: impl Fn(&T, &T) -> bool + 'static,
    ) -> Self {
        Self::with_throttle(
            adapter,
            config.displaying_section,
            is_equal,
            Rc::new(Throttle::new(config.throttle_interval)),
        )
    }

    /// Create a data source that schedules through `throttle`.
    ///
    /// The throttle may be shared with other data sources. Each source keeps
    /// its own pending reconciliation under its own key; the group fires in
    /// the same tick once every member has gone quiet.
    pub fn with_throttle(
        adapter: A,
        displaying_section: usize,
        is_equal: impl Fn(&T, &T) -> bool + 'static,
        throttle: Rc<dyn Throttling>,
    ) -> Self {
        Self {
            state: Rc::new(SectionState {
                items: RefCell::new(Vec::new()),
                snapshot: RefCell::new(Vec::new()),
                displaying_section: Cell::new(displaying_section),
                is_equal: Rc::new(is_equal),
                updater: SectionUpdater::new(adapter),
                throttle,
                key: ThrottleKey::next(),
                in_flight: Cell::new(0),
                revision: signal(0),
            }),
        }
    }

    // -------------------------------------------------------------------------
    // Reading
    // -------------------------------------------------------------------------

    /// Number of rows the view currently shows.
    pub fn number_of_items(&self) -> usize {
        self.state.snapshot.borrow().len()
    }

    /// Item shown at `index_path`.
    ///
    /// # Panics
    ///
    /// If `index_path.section` is not `displaying_section`, or the row is out
    /// of range.
    pub fn item(&self, index_path: IndexPath) -> T {
        let index = self.state.to_index(index_path);
        self.state.snapshot.borrow()[index].clone()
    }

    /// Items declared by the last `update()`.
    pub fn items(&self) -> Vec<T> {
        self.state.items.borrow().clone()
    }

    /// Items the view currently shows.
    pub fn snapshot(&self) -> Vec<T> {
        self.state.snapshot.borrow().clone()
    }

    pub fn displaying_section(&self) -> usize {
        self.state.displaying_section.get()
    }

    /// Relocate this data source to another section of the view.
    pub fn set_displaying_section(&self, section: usize) {
        self.state.displaying_section.set(section);
    }

    /// Signal bumped every time the snapshot changes.
    ///
    /// Read it inside a derived or effect to re-render when rows change.
    pub fn revision(&self) -> Signal<u64> {
        self.state.revision.clone()
    }

    /// The rendering adapter.
    pub fn adapter(&self) -> &A {
        self.state.updater.adapter()
    }

    /// Where this data source is in its update cycle.
    pub fn phase(&self) -> UpdatePhase {
        if self.state.throttle.is_pending(self.state.key) {
            UpdatePhase::Pending
        } else if self.state.in_flight.get() > 0 {
            UpdatePhase::Reconciling
        } else {
            UpdatePhase::Idle
        }
    }

    /// IndexPath for a row of this section.
    pub fn index_path(&self, item: usize) -> IndexPath {
        IndexPath::new(item, self.state.displaying_section.get())
    }

    /// IndexPath of the first declared item equal to `item`.
    ///
    /// Searches `items()`, not the snapshot.
    ///
    /// # Panics
    ///
    /// If no declared item is equal to `item`.
    pub fn index_path_of(&self, item: &T) -> IndexPath {
        self.find_index_path(item)
            .unwrap_or_else(|| panic!("item is not contained in SectionDataSource items"))
    }

    /// Like [`index_path_of`](Self::index_path_of), returning `None` when absent.
    pub fn find_index_path(&self, item: &T) -> Option<IndexPath> {
        let is_equal = &self.state.is_equal;
        self.state
            .items
            .borrow()
            .iter()
            .position(|candidate| is_equal(candidate, item))
            .map(|index| self.index_path(index))
    }

    // -------------------------------------------------------------------------
    // Mutation
    // -------------------------------------------------------------------------

    /// Record a move the view already performed.
    ///
    /// Call before reordering the model and calling `update()`. The adapter is
    /// not called and `items()` is untouched.
    ///
    /// # Panics
    ///
    /// If either index path names another section, or is out of range.
    pub fn reserve_moved(&self, source: IndexPath, destination: IndexPath) {
        let section = self.state.displaying_section.get();
        assert!(
            source.section == section,
            "source IndexPath.section ({}) must be equal to displaying_section ({})",
            source.section,
            section
        );
        assert!(
            destination.section == section,
            "destination IndexPath.section ({}) must be equal to displaying_section ({})",
            destination.section,
            section
        );

        {
            let mut snapshot = self.state.snapshot.borrow_mut();
            let moved = snapshot.remove(source.item);
            snapshot.insert(destination.item, moved);
        }
        trace!(%source, %destination, "reserved move");
        self.state.bump_revision();
    }

    /// Declare a new list and schedule its reconciliation.
    ///
    /// `items()` reflects the new list as soon as this returns. With
    /// `immediately`, any pending reconciliation is cancelled and the view is
    /// updated before returning. Otherwise the reconciliation waits for the
    /// throttle, and only the last update of a burst reaches the view.
    ///
    /// `completion` runs once the view has caught up. It never runs if this
    /// data source is dropped first.
    pub fn update(
        &self,
        items: Vec<T>,
        update_mode: UpdateMode,
        immediately: bool,
        completion: impl FnOnce() + 'static,
    ) {
        trace!(
            section = self.state.displaying_section.get(),
            items = items.len(),
            ?update_mode,
            immediately,
            "update"
        );
        *self.state.items.borrow_mut() = items;

        let weak = Rc::downgrade(&self.state);
        let completion: Completion = Box::new(completion);
        let task: Task = Box::new(move || match weak.upgrade() {
            Some(state) => SectionState::reconcile(&state, update_mode, completion),
            None => trace!("section dropped before reconciliation"),
        });

        if immediately {
            self.state.throttle.cancel(self.state.key);
            task();
        } else {
            self.state.throttle.schedule(self.state.key, task);
        }
    }

    /// Type-erased view of this data source.
    pub fn erase(&self) -> AnySectionDataSource<A> {
        AnySectionDataSource::new(self)
    }
}

impl<T: 'static, A: Updating + 'static> SectionDataSource<Rc<T>, A> {
    /// IndexPath of the declared item that is the very same allocation.
    ///
    /// # Panics
    ///
    /// If no declared item points to `item`.
    pub fn index_path_by_identity(&self, item: &Rc<T>) -> IndexPath {
        let index = self
            .state
            .items
            .borrow()
            .iter()
            .position(|candidate| Rc::ptr_eq(candidate, item))
            .unwrap_or_else(|| panic!("item is not contained in SectionDataSource items"));
        self.index_path(index)
    }
}

impl<T, A> fmt::Debug for SectionDataSource<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SectionDataSource")
            .field("displaying_section", &self.state.displaying_section.get())
            .field("items", &self.state.items.borrow().len())
            .field("snapshot", &self.state.snapshot.borrow().len())
            .field("in_flight", &self.state.in_flight.get())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// SectionDataSourceType
// =============================================================================

/// Anything that can present itself as a typed section data source.
pub trait SectionDataSourceType {
    type Item: Clone + 'static;
    type Adapter: Updating + 'static;

    fn update(
        &self,
        items: Vec<Self::Item>,
        update_mode: UpdateMode,
        immediately: bool,
        completion: impl FnOnce() + 'static,
    );

    fn as_section_data_source(&self) -> SectionDataSource<Self::Item, Self::Adapter>;
}

impl<T: Clone + 'static, A: Updating + 'static> SectionDataSourceType for SectionDataSource<T, A> {
    type Item = T;
    type Adapter = A;

    fn update(
        &self,
        items: Vec<T>,
        update_mode: UpdateMode,
        immediately: bool,
        completion: impl FnOnce() + 'static,
    ) {
        SectionDataSource::update(self, items, update_mode, immediately, completion);
    }

    fn as_section_data_source(&self) -> SectionDataSource<T, A> {
        self.clone()
    }
}
