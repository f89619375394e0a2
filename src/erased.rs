//! AnySectionDataSource - Item-type-erased view over a section data source.
//!
//! Lets a composite view hold sections of different item types side by side.
//! Reads go straight to the wrapped data source's live snapshot; nothing is
//! cached.
//!
//! ```ignore
//! let sections: Vec<AnySectionDataSource<ListView>> = vec![
//!     headers.erase(),   // SectionDataSource<Header, ListView>
//!     messages.erase(),  // SectionDataSource<Message, ListView>
//! ];
//!
//! let rows: usize = sections.iter().map(|s| s.number_of_items()).sum();
//!
//! // Back to the concrete type to push new items
//! sections[1].restore::<Message>().update(messages, mode, false, || {});
//! ```
//!
//! # Pattern: Non-owning
//!
//! The erased view holds a `Weak` to the data source state. A view adapter
//! can keep the erased sections it renders without keeping them alive:
//!
//! ```text
//! owner ──► SectionDataSource ──► SectionUpdater ──► adapter ──► AnySectionDataSource
//!                 ▲                                                     │
//!                 └──────────────────────── weak ───────────────────────┘
//! ```
//!
//! Reading through an erased view after its data source was dropped panics.

use std::any::{type_name, Any};
use std::fmt;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use crate::section::{SectionDataSource, SectionState};
use crate::types::IndexPath;
use crate::updater::Updating;

/// Upgrade an erased view's handle, panicking on a dropped data source.
fn upgrade<T, A>(state: &Weak<SectionState<T, A>>) -> SectionDataSource<T, A> {
    match state.upgrade() {
        Some(state) => SectionDataSource { state },
        None => panic!(
            "SectionDataSource<{}> has been dropped; its AnySectionDataSource is dangling",
            type_name::<T>()
        ),
    }
}

/// Type-erased [`SectionDataSource`] rendering through adapter type `A`.
pub struct AnySectionDataSource<A> {
    /// `Weak<SectionState<T, A>>` for the erased `T`.
    source: Rc<dyn Any>,
    item_type: &'static str,
    is_alive: Rc<dyn Fn() -> bool>,
    number_of_items: Rc<dyn Fn() -> usize>,
    item: Rc<dyn Fn(IndexPath) -> Box<dyn Any>>,
    _adapter: PhantomData<fn() -> A>,
}

impl<A: Updating + 'static> AnySectionDataSource<A> {
    /// Erase the item type of `source`.
    ///
    /// The erased view does not keep `source` alive.
    pub fn new<T: Clone + 'static>(source: &SectionDataSource<T, A>) -> Self {
        let state = Rc::downgrade(&source.state);
        let for_alive = state.clone();
        let for_count = state.clone();
        let for_item = state.clone();

        Self {
            source: Rc::new(state),
            item_type: type_name::<T>(),
            is_alive: Rc::new(move || for_alive.strong_count() > 0),
            number_of_items: Rc::new(move || upgrade(&for_count).number_of_items()),
            item: Rc::new(move |index_path| Box::new(upgrade(&for_item).item(index_path)) as Box<dyn Any>),
            _adapter: PhantomData,
        }
    }

    /// Whether the data source behind this view still exists.
    pub fn is_alive(&self) -> bool {
        (self.is_alive)()
    }

    /// Number of rows the view currently shows.
    ///
    /// # Panics
    ///
    /// If the data source has been dropped.
    pub fn number_of_items(&self) -> usize {
        (self.number_of_items)()
    }

    /// Item shown at `index_path`, boxed.
    ///
    /// # Panics
    ///
    /// If the data source has been dropped, or for the reasons of
    /// [`SectionDataSource::item`].
    pub fn item(&self, index_path: IndexPath) -> Box<dyn Any> {
        (self.item)(index_path)
    }

    /// Item shown at `index_path`, downcast to `T`.
    ///
    /// # Panics
    ///
    /// If `T` is not the item type, or for the reasons of
    /// [`item`](Self::item).
    pub fn item_as<T: 'static>(&self, index_path: IndexPath) -> T {
        match self.item(index_path).downcast::<T>() {
            Ok(item) => *item,
            Err(_) => panic!(
                "{} is different from SectionDataSource item type {}",
                type_name::<T>(),
                self.item_type
            ),
        }
    }

    /// Name of the erased item type.
    pub fn item_type_name(&self) -> &'static str {
        self.item_type
    }

    /// Whether the erased item type is `T`.
    pub fn holds<T: Clone + 'static>(&self) -> bool {
        self.source.is::<Weak<SectionState<T, A>>>()
    }

    /// Recover the typed data source.
    ///
    /// # Panics
    ///
    /// If `T` is not the item type the data source was created with. This is
    /// a programming error, not a runtime condition. Also panics if the data
    /// source has been dropped.
    pub fn restore<T: Clone + 'static>(&self) -> SectionDataSource<T, A> {
        match self.source.downcast_ref::<Weak<SectionState<T, A>>>() {
            Some(state) => upgrade(state),
            None => panic!(
                "itemType {} is different from SectionDataSource item type {}",
                type_name::<T>(),
                self.item_type
            ),
        }
    }
}

impl<A> Clone for AnySectionDataSource<A> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            item_type: self.item_type,
            is_alive: self.is_alive.clone(),
            number_of_items: self.number_of_items.clone(),
            item: self.item.clone(),
            _adapter: PhantomData,
        }
    }
}

impl<A> fmt::Debug for AnySectionDataSource<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("AnySectionDataSource");
        debug.field("item_type", &self.item_type);
        if (self.is_alive)() {
            debug.field("number_of_items", &(self.number_of_items)());
        } else {
            debug.field("dropped", &true);
        }
        debug.finish_non_exhaustive()
    }
}

impl<T: Clone + 'static, A: Updating + 'static> From<&SectionDataSource<T, A>> for AnySectionDataSource<A> {
    fn from(source: &SectionDataSource<T, A>) -> Self {
        Self::new(source)
    }
}
