//! Scope-bound interest in payload types.
//!
//! A payload is only retained if some scope on the current thread has its
//! type open when the payload is recorded. A [`Scope`] names a set of payload
//! types; [`Scope::activate`] opens a slot for each of them and returns an
//! [`ActiveScope`] guard, whose `Drop` closes the slots again in reverse
//! order, on every exit path including unwinding.
//!
//! When a slot closes, a value it still holds moves to the next enclosing
//! scope that has the same type open, or is discarded if there is none.
//!
//! The handling functions in [`dispatch`](crate::dispatch) activate scopes
//! automatically; manual activation is useful for capture, for tests, and
//! for building custom handling blocks.
//!
//! # Examples
//!
//! ```
//! use carrier::{ErrorId, Scope, put_payload, slot};
//!
//! #[derive(Clone, Debug, PartialEq)]
//! struct Code(i32);
//!
//! let outer = Scope::of::<(Code,)>().activate();
//! let id = ErrorId::new();
//! {
//!     let _inner = Scope::of::<(Code,)>().activate();
//!     assert!(put_payload(Code(5), id));
//! }
//! // The value recorded in the inner scope propagated outward.
//! assert_eq!(slot::value::<Code>(id), Some(Code(5)));
//! drop(outer);
//! assert!(!put_payload(Code(6), id));
//! ```

use core::marker::PhantomData;

use carrier_internals::ScopeToken;

use crate::{
    diagnostics,
    handler::Handler,
    slot::{SlotKey, SlotKeys},
};

/// A list of payload types, written as a tuple.
///
/// Implemented for tuples of up to eight `'static` types, including `()`.
pub trait SlotTypes {
    /// The keys of the listed types, in order.
    fn keys() -> SlotKeys;
}

macro_rules! impl_slot_types {
    ($($t:ident $i:tt),*) => {
        impl<$($t: 'static),*> SlotTypes for ($($t,)*) {
            #[allow(unused_mut)]
            fn keys() -> SlotKeys {
                let mut keys = SlotKeys::new();
                $(keys.insert(SlotKey::of::<$t>());)*
                keys
            }
        }
    };
}

for_each_tuple!(impl_slot_types);

/// A set of payload types a handling block is interested in, not yet active.
///
/// A `Scope` can be moved and stored freely. Nothing happens until it is
/// [activated](Self::activate).
#[derive(Clone, Debug, Default)]
pub struct Scope {
    keys: SlotKeys,
}

impl Scope {
    /// Creates a scope for the payload types in `keys`.
    #[must_use]
    pub fn new(keys: SlotKeys) -> Self {
        Self { keys }
    }

    /// Creates a scope for the payload types in the tuple `K`.
    #[must_use]
    pub fn of<K: SlotTypes>() -> Self {
        Self::new(K::keys())
    }

    /// Creates a scope for every payload type read by `handlers`.
    #[must_use]
    pub fn for_handlers<R>(handlers: &(impl AsRef<[Handler<R>]> + ?Sized)) -> Self {
        handlers
            .as_ref()
            .iter()
            .flat_map(|handler| handler.keys().iter().copied())
            .collect::<SlotKeys>()
            .into()
    }

    /// The payload types of this scope.
    #[must_use]
    pub fn keys(&self) -> &SlotKeys {
        &self.keys
    }

    /// Opens a slot for every payload type of the scope on the current
    /// thread.
    ///
    /// The slots stay open until the returned guard is dropped.
    #[must_use = "the scope closes again as soon as the guard is dropped"]
    pub fn activate(self) -> ActiveScope {
        let token = ScopeToken::next();
        for key in self.keys.iter() {
            key.open(token);
        }
        let tally = self.keys.enables_tally();
        if tally {
            diagnostics::enable_tally();
        }
        tracing::trace!(
            target: "carrier",
            scope = token.get(),
            types = self.keys.len(),
            "activated scope"
        );
        ActiveScope {
            keys: self.keys,
            token,
            tally,
            _thread_bound: PhantomData,
        }
    }
}

impl From<SlotKeys> for Scope {
    fn from(keys: SlotKeys) -> Self {
        Self::new(keys)
    }
}

/// Guard keeping the slots of an activated [`Scope`] open.
///
/// The slots live in the storage of the thread that activated the scope, so
/// the guard is neither `Send` nor `Sync`.
#[must_use = "the scope closes again as soon as the guard is dropped"]
pub struct ActiveScope {
    keys: SlotKeys,
    token: ScopeToken,
    tally: bool,
    _thread_bound: PhantomData<*const ()>,
}

impl ActiveScope {
    /// The payload types this scope holds open.
    #[must_use]
    pub fn keys(&self) -> &SlotKeys {
        &self.keys
    }

    /// The token owning this scope's slot frames.
    #[must_use]
    pub fn token(&self) -> ScopeToken {
        self.token
    }

    /// Closes the scope now. Equivalent to dropping the guard.
    pub fn close(self) {}
}

impl Drop for ActiveScope {
    fn drop(&mut self) {
        for key in self.keys.iter().rev() {
            key.close(self.token);
        }
        if self.tally {
            diagnostics::disable_tally();
        }
        tracing::trace!(target: "carrier", scope = self.token.get(), "closed scope");
    }
}

impl core::fmt::Debug for ActiveScope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ActiveScope")
            .field("token", &self.token)
            .field("keys", &self.keys)
            .finish()
    }
}
