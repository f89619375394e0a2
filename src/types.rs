//! Core types for spark-sections.
//!
//! These types are shared by the data source, the throttle and the updater.
//! They carry no behaviour of their own.

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

// =============================================================================
// IndexPath
// =============================================================================

/// Address of a row: which section, and which item inside that section.
///
/// Supplied by (and returned to) the view. A data source only accepts index
/// paths naming its own `displaying_section`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct IndexPath {
    pub section: usize,
    pub item: usize,
}

impl IndexPath {
    /// Create an index path.
    pub const fn new(item: usize, section: usize) -> Self {
        Self { section, item }
    }
}

impl fmt::Display for IndexPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.section, self.item)
    }
}

// =============================================================================
// Equality
// =============================================================================

/// Identity predicate used for diffing.
///
/// Must behave as an equivalence relation, otherwise the computed edit script
/// does not describe the transition between the two lists.
pub type EqualityChecker<T> = Rc<dyn Fn(&T, &T) -> bool>;

/// Callback fired once a reconciliation has reached the rendering surface.
pub type Completion = Box<dyn FnOnce()>;

// =============================================================================
// UpdateMode
// =============================================================================

/// How an `update()` should reach the rendering surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Reload the whole list. No per-item diff.
    Everything,
    /// Diff old vs new and apply inserts, deletes and moves.
    Partial { animated: bool },
}

impl Default for UpdateMode {
    fn default() -> Self {
        Self::Partial { animated: true }
    }
}

// =============================================================================
// UpdatePhase
// =============================================================================

/// Where a data source is in its update cycle.
///
/// ```text
/// Idle → Pending → Reconciling → Idle
/// ```
///
/// An immediate update goes straight from `Idle` to `Reconciling`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdatePhase {
    #[default]
    Idle,
    /// A reconciliation is waiting in the throttle.
    Pending,
    /// The updater has been called and its completion has not fired yet.
    Reconciling,
}

// =============================================================================
// SectionConfig
// =============================================================================

/// Quiet interval used by data sources that create their own throttle.
pub const DEFAULT_THROTTLE_INTERVAL: Duration = Duration::from_millis(100);

/// Construction settings for a `SectionDataSource`.
///
/// ```ignore
/// let config = SectionConfig {
///     displaying_section: 2,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionConfig {
    /// Section this data source renders into.
    pub displaying_section: usize,
    /// Quiet interval of the data source's own throttle.
    pub throttle_interval: Duration,
}

impl Default for SectionConfig {
    fn default() -> Self {
        Self {
            displaying_section: 0,
            throttle_interval: DEFAULT_THROTTLE_INTERVAL,
        }
    }
}
