//! Updater - Applies reconciliations to a rendering surface.
//!
//! The updater is the only code that talks to the view. It receives the
//! previously displayed items, the new items and an [`UpdaterMode`], and turns
//! them into calls on an [`Updating`] adapter:
//!
//! - `Everything` → one `reload_data`
//! - `Partial` → one `perform_batch` with deletes, inserts and moves, or no
//!   adapter call at all when nothing changed
//!
//! Adapters are called with no data source state borrowed, so they may read
//! items back from the data source while applying a batch.

mod changeset;

pub use changeset::{Changes, Changeset};

use std::fmt;

use tracing::debug;

use crate::types::{Completion, EqualityChecker, IndexPath};

// =============================================================================
// Updating - the rendering adapter capability
// =============================================================================

/// A list-style view that can apply structural changes.
///
/// `completion` must be called exactly once, after the change is visible
/// (after any animation).
pub trait Updating {
    /// Insert rows at the given (new) positions.
    fn insert_items(&self, index_paths: &[IndexPath]);

    /// Delete rows at the given (old) positions.
    fn delete_items(&self, index_paths: &[IndexPath]);

    /// Move one row from an old position to a new position.
    fn move_item(&self, from: IndexPath, to: IndexPath);

    /// Apply the structural calls made by `updates` as one batch.
    fn perform_batch(&self, animated: bool, updates: &mut dyn FnMut(), completion: Completion) {
        let _ = animated;
        updates();
        completion();
    }

    /// Throw away every row and redraw from the data source.
    fn reload_data(&self, completion: Completion);
}

// =============================================================================
// UpdaterMode
// =============================================================================

/// Resolved update mode: partial updates carry the equality checker.
pub enum UpdaterMode<T> {
    Everything,
    Partial {
        animated: bool,
        is_equal: EqualityChecker<T>,
    },
}

impl<T> Clone for UpdaterMode<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Everything => Self::Everything,
            Self::Partial { animated, is_equal } => Self::Partial {
                animated: *animated,
                is_equal: is_equal.clone(),
            },
        }
    }
}

impl<T> fmt::Debug for UpdaterMode<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Everything => f.write_str("Everything"),
            Self::Partial { animated, .. } => f
                .debug_struct("Partial")
                .field("animated", animated)
                .finish_non_exhaustive(),
        }
    }
}

// =============================================================================
// SectionUpdater
// =============================================================================

/// Drives an [`Updating`] adapter for one section at a time.
pub struct SectionUpdater<A> {
    adapter: A,
}

impl<A: Updating> SectionUpdater<A> {
    /// Wrap an adapter.
    pub fn new(adapter: A) -> Self {
        Self { adapter }
    }

    /// The wrapped adapter.
    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Bring `target_section` from `current_displaying_items` to `new_items`.
    ///
    /// Returns the kinds of change sent to the adapter.
    pub fn update<T>(
        &self,
        target_section: usize,
        current_displaying_items: &[T],
        new_items: &[T],
        update_mode: UpdaterMode<T>,
        completion: Completion,
    ) -> Changes {
        match update_mode {
            UpdaterMode::Everything => {
                debug!(
                    section = target_section,
                    old = current_displaying_items.len(),
                    new = new_items.len(),
                    "reloading section"
                );
                self.adapter.reload_data(completion);
                Changes::RELOAD
            }
            UpdaterMode::Partial { animated, is_equal } => {
                let changeset =
                    Changeset::compute(current_displaying_items, new_items, is_equal.as_ref());
                let changes = changeset.changes();

                debug!(
                    section = target_section,
                    old = current_displaying_items.len(),
                    new = new_items.len(),
                    animated,
                    ?changes,
                    operations = changeset.len(),
                    "reconciling section"
                );

                if changeset.is_empty() {
                    completion();
                    return changes;
                }

                let at = |item: usize| IndexPath::new(item, target_section);
                let adapter = &self.adapter;
                let mut updates = || {
                    if !changeset.deleted.is_empty() {
                        let paths: Vec<IndexPath> = changeset.deleted.iter().map(|&i| at(i)).collect();
                        adapter.delete_items(&paths);
                    }
                    if !changeset.inserted.is_empty() {
                        let paths: Vec<IndexPath> = changeset.inserted.iter().map(|&i| at(i)).collect();
                        adapter.insert_items(&paths);
                    }
                    for &(from, to) in &changeset.moved {
                        adapter.move_item(at(from), at(to));
                    }
                };
                adapter.perform_batch(animated, &mut updates, completion);
                changes
            }
        }
    }
}

impl<A: fmt::Debug> fmt::Debug for SectionUpdater<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SectionUpdater")
            .field("adapter", &self.adapter)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording adapter shared by the crate's tests.

    use std::cell::RefCell;
    use std::rc::Rc;

    use super::Updating;
    use crate::types::{Completion, IndexPath};

    /// One call received by the adapter.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Op {
        Insert(Vec<IndexPath>),
        Delete(Vec<IndexPath>),
        Move(IndexPath, IndexPath),
        BeginBatch { animated: bool },
        EndBatch,
        ReloadData,
    }

    /// Adapter that records calls. Clones share the log.
    #[derive(Clone, Default)]
    pub struct RecordingAdapter {
        pub ops: Rc<RefCell<Vec<Op>>>,
        /// Completions held back to simulate a running animation.
        pub held: Rc<RefCell<Vec<Completion>>>,
        pub hold_completions: Rc<std::cell::Cell<bool>>,
    }

    impl RecordingAdapter {
        pub fn ops(&self) -> Vec<Op> {
            self.ops.borrow().clone()
        }

        pub fn clear(&self) {
            self.ops.borrow_mut().clear();
        }

        pub fn batches(&self) -> usize {
            self.ops
                .borrow()
                .iter()
                .filter(|op| matches!(op, Op::BeginBatch { .. }))
                .count()
        }

        pub fn reloads(&self) -> usize {
            self.ops
                .borrow()
                .iter()
                .filter(|op| matches!(op, Op::ReloadData))
                .count()
        }

        /// Fire every held completion.
        pub fn finish_animations(&self) {
            let held: Vec<Completion> = self.held.borrow_mut().drain(..).collect();
            for completion in held {
                completion();
            }
        }

        fn complete(&self, completion: Completion) {
            if self.hold_completions.get() {
                self.held.borrow_mut().push(completion);
            } else {
                completion();
            }
        }
    }

    impl Updating for RecordingAdapter {
        fn insert_items(&self, index_paths: &[IndexPath]) {
            self.ops.borrow_mut().push(Op::Insert(index_paths.to_vec()));
        }

        fn delete_items(&self, index_paths: &[IndexPath]) {
            self.ops.borrow_mut().push(Op::Delete(index_paths.to_vec()));
        }

        fn move_item(&self, from: IndexPath, to: IndexPath) {
            self.ops.borrow_mut().push(Op::Move(from, to));
        }

        fn perform_batch(&self, animated: bool, updates: &mut dyn FnMut(), completion: Completion) {
            self.ops.borrow_mut().push(Op::BeginBatch { animated });
            updates();
            self.ops.borrow_mut().push(Op::EndBatch);
            self.complete(completion);
        }

        fn reload_data(&self, completion: Completion) {
            self.ops.borrow_mut().push(Op::ReloadData);
            self.complete(completion);
        }
    }
}
