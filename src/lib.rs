//! # spark-sections
//!
//! Section data sources for list views.
//!
//! A [`SectionDataSource`] sits between application state (a `Vec` of models)
//! and a view that can insert, delete and move rows. Instead of redrawing the
//! whole list on every change, it diffs what the view shows against what the
//! application declared and sends only the structural changes.
//!
//! ## Architecture
//!
//! ```text
//! update(items) → items (sync) → Throttle → reconcile → SectionUpdater → Updating (view)
//!                                              │
//!                                              └→ snapshot replaced, revision bumped
//! ```
//!
//! Everything runs on the owner (render) thread. Throttles fire when the
//! render loop calls [`run_due_throttles`].
//!
//! ## Modules
//!
//! - [`types`] - IndexPath, UpdateMode, SectionConfig
//! - [`throttle`] - Debounce primitive and thread-local registry
//! - [`updater`] - Rendering adapter trait, changeset computation
//! - [`section`] - SectionDataSource
//! - [`erased`] - AnySectionDataSource

pub mod erased;
pub mod section;
pub mod throttle;
pub mod types;
pub mod updater;

// Re-export commonly used items
pub use types::*;

pub use erased::AnySectionDataSource;

pub use section::{SectionDataSource, SectionDataSourceType};

pub use throttle::{
    next_throttle_deadline, pending_throttle_count, reset_throttles, run_due_throttles, Task,
    Throttle, ThrottleKey, Throttling,
};

pub use updater::{Changes, Changeset, SectionUpdater, UpdaterMode, Updating};
