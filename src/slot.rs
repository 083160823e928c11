//! Typed access to the current thread's payload slots.
//!
//! Every payload type `T` has its own thread-scoped stack of slot frames, one
//! per open scope that declared interest in `T` (see [`scope`]). The
//! functions in this module read the innermost frame of such a stack.
//!
//! All queries take the [`ErrorId`] of the failure being handled and only
//! report values tagged with that id. A frame may still hold a value of an
//! earlier failure; such a value is invisible to the queries here.
//!
//! The type-erased [`SlotKey`] and the ordered, deduplicated [`SlotKeys`] set
//! describe which stacks a scope opens.
//!
//! [`scope`]: crate::scope

use core::{any::TypeId, fmt};

use carrier_internals::{Closed, ScopeToken, registry};
use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;

use crate::id::ErrorId;

/// Returns `true` if some scope on this thread has `T` open.
///
/// # Examples
///
/// ```
/// use carrier::{Scope, slot};
///
/// struct Retries(u32);
///
/// assert!(!slot::is_open::<Retries>());
/// let scope = Scope::of::<(Retries,)>().activate();
/// assert!(slot::is_open::<Retries>());
/// drop(scope);
/// assert!(!slot::is_open::<Retries>());
/// ```
#[must_use]
pub fn is_open<T: 'static>() -> bool {
    registry::is_open::<T>()
}

/// Number of currently open scopes on this thread that declared interest in
/// `T`.
#[must_use]
pub fn depth<T: 'static>() -> usize {
    registry::depth::<T>()
}

/// Returns `true` if the innermost frame of `T` holds a value for `id`.
#[must_use]
pub fn has_value<T: 'static>(id: ErrorId) -> bool {
    registry::has_value::<T>(id.raw())
}

/// Returns a clone of the value of `T` recorded for `id`.
#[must_use]
pub fn value<T: Clone + 'static>(id: ErrorId) -> Option<T> {
    registry::with_value::<T, _>(id.raw(), T::clone)
}

/// Runs `f` on the value of `T` recorded for `id`.
///
/// The value stays in its slot. While `f` runs, the slot appears empty to
/// other queries.
pub fn with_value<T: 'static, R>(id: ErrorId, f: impl FnOnce(&T) -> R) -> Option<R> {
    registry::with_value::<T, R>(id.raw(), f)
}

/// Moves the value of `T` recorded for `id` out of its slot.
///
/// Once extracted, the value no longer propagates to enclosing scopes.
pub fn extract_value<T: 'static>(id: ErrorId) -> Option<T> {
    registry::extract::<T>(id.raw())
}

/// Opens the slot of `T` for `owner`.
fn open_slot<T: 'static>(owner: ScopeToken) {
    let depth = registry::open::<T>(owner);
    tracing::trace!(
        target: "carrier",
        payload = core::any::type_name::<T>(),
        depth,
        "opened payload slot"
    );
}

/// Closes the slot of `T` for `owner`, dropping whatever value leaves the
/// stack only after the registry has been released.
fn close_slot<T: 'static>(owner: ScopeToken) {
    match registry::close::<T>(owner) {
        Closed::Retained | Closed::Released | Closed::NotOpen => {}
        Closed::Propagated { id, replaced } => {
            tracing::trace!(
                target: "carrier",
                payload = core::any::type_name::<T>(),
                id = id.get(),
                "propagated payload to enclosing scope"
            );
            drop(replaced);
        }
        Closed::Discarded { id, value } => {
            tracing::trace!(
                target: "carrier",
                payload = core::any::type_name::<T>(),
                id = id.get(),
                "discarded payload, no enclosing scope"
            );
            drop(value);
        }
    }
}

/// Returns `true` if the innermost frame of `T` holds a value for `id`.
fn holds<T: 'static>(id: ErrorId) -> bool {
    has_value::<T>(id)
}

/// Type-erased handle to the slot stack of one payload type.
///
/// A key carries monomorphized functions to open, close and inspect the
/// stack of its type, so a scope can iterate over a list of keys without
/// knowing the types behind them.
#[derive(Copy, Clone)]
pub struct SlotKey {
    type_id: TypeId,
    type_name: &'static str,
    open: fn(ScopeToken),
    close: fn(ScopeToken),
    holds: fn(ErrorId) -> bool,
    enables_tally: bool,
}

impl SlotKey {
    /// The key of payload type `T`.
    #[must_use]
    pub fn of<T: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: core::any::type_name::<T>(),
            open: open_slot::<T>,
            close: close_slot::<T>,
            holds: holds::<T>,
            enables_tally: false,
        }
    }

    /// Marks the key as one whose scope wants dropped payloads tallied.
    pub(crate) const fn with_tally(mut self) -> Self {
        self.enables_tally = true;
        self
    }

    /// The [`TypeId`] of the payload type.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// The name of the payload type.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns `true` if the innermost frame of this type holds a value for
    /// `id`.
    #[must_use]
    pub fn holds(&self, id: ErrorId) -> bool {
        (self.holds)(id)
    }

    /// Whether opening this key enables the dropped-payload tally.
    pub(crate) fn enables_tally(&self) -> bool {
        self.enables_tally
    }

    pub(crate) fn open(&self, owner: ScopeToken) {
        (self.open)(owner);
    }

    pub(crate) fn close(&self, owner: ScopeToken) {
        (self.close)(owner);
    }
}

impl fmt::Debug for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SlotKey<{}>", self.type_name)
    }
}

impl PartialEq for SlotKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for SlotKey {}

/// Insertion-ordered set of [`SlotKey`]s, one per payload type.
#[derive(Clone, Default)]
pub struct SlotKeys {
    keys: IndexMap<TypeId, SlotKey, FxBuildHasher>,
}

impl SlotKeys {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `key`, keeping the position of an earlier key of the same type.
    pub fn insert(&mut self, key: SlotKey) {
        self.keys
            .entry(key.type_id)
            .and_modify(|existing| existing.enables_tally |= key.enables_tally)
            .or_insert(key);
    }

    /// Adds the key of `T`.
    pub fn insert_type<T: 'static>(&mut self) {
        self.insert(SlotKey::of::<T>());
    }

    /// Adds every key of `other`.
    pub fn merge(&mut self, other: &SlotKeys) {
        self.extend(other.iter().copied());
    }

    /// Returns `true` if the set contains the key of `T`.
    #[must_use]
    pub fn contains<T: 'static>(&self) -> bool {
        self.keys.contains_key(&TypeId::of::<T>())
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if there are no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Iterates over the keys in insertion order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &SlotKey> + '_ {
        self.keys.values()
    }

    /// Whether any key enables the dropped-payload tally.
    pub(crate) fn enables_tally(&self) -> bool {
        self.iter().any(SlotKey::enables_tally)
    }
}

impl Extend<SlotKey> for SlotKeys {
    fn extend<I: IntoIterator<Item = SlotKey>>(&mut self, iter: I) {
        for key in iter {
            self.insert(key);
        }
    }
}

impl FromIterator<SlotKey> for SlotKeys {
    fn from_iter<I: IntoIterator<Item = SlotKey>>(iter: I) -> Self {
        let mut keys = Self::new();
        keys.extend(iter);
        keys
    }
}

impl fmt::Debug for SlotKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
