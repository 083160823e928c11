//! Failure identities.
//!
//! Every failure is named by an [`ErrorId`]: a small, `Copy`, nonzero token.
//! Payloads recorded for a failure are tagged with its id, and handlers only
//! ever see payloads tagged with the id of the failure being handled.
//!
//! # Allocation
//!
//! Ids come from a single process-wide counter, so an id stays unique after
//! it (and its payloads, see [`capture`](crate::capture)) crosses to another
//! thread. The counter steps by four and every id has its two low bits set to
//! `0b01`. This keeps zero free to mean "no failure" and makes it unlikely
//! that a small foreign integer code is mistaken for an id at an FFI
//! boundary.
//!
//! Each thread additionally remembers
//! - the id it minted most recently ([`ErrorId::current`]), which deferred
//!   payload guards use to detect that a failure is in flight, and
//! - an id reserved by [`ErrorId::peek`], which the next [`ErrorId::new`] on
//!   that thread hands out.
//!
//! # Examples
//!
//! ```
//! use carrier::ErrorId;
//!
//! let upcoming = ErrorId::peek();
//! let id = ErrorId::new();
//! assert_eq!(upcoming, id);
//! assert_eq!(ErrorId::current(), Some(id));
//! assert_eq!(ErrorId::from_raw(id.into_raw()), Some(id));
//! ```

use core::{
    cell::Cell,
    fmt,
    num::NonZeroU32,
    sync::atomic::{AtomicU32, Ordering},
};

/// Low bits every minted id carries.
const TAG: u32 = 0b01;
/// Mask selecting the tag bits.
const TAG_MASK: u32 = 0b11;
/// Distance between consecutive ids.
const STEP: u32 = 4;

/// Shared by all threads so that ids survive being moved across threads.
static COUNTER: AtomicU32 = AtomicU32::new(0);

std::thread_local! {
    /// Id reserved by `peek`, or zero.
    static RESERVED: Cell<u32> = const { Cell::new(0) };
    /// Id minted most recently on this thread, or zero.
    static CURRENT: Cell<u32> = const { Cell::new(0) };
}

/// Draws a fresh tagged id from the shared counter.
fn generate() -> NonZeroU32 {
    let raw = COUNTER.fetch_add(STEP, Ordering::Relaxed).wrapping_add(STEP) | TAG;
    NonZeroU32::new(raw).unwrap_or(NonZeroU32::MIN)
}

/// Identity of one failure.
///
/// `Result<T, ErrorId>` is the value-returning way of signalling a failure:
/// the payloads describing it are not carried in the `Err` value but in the
/// slots of whichever scopes are interested in them.
///
/// # Examples
///
/// ```
/// use carrier::{ErrorId, new_error};
///
/// #[derive(Debug, PartialEq)]
/// struct Errno(i32);
///
/// fn open_config() -> Result<(), ErrorId> {
///     Err(new_error((Errno(2),)))
/// }
///
/// let id = open_config().unwrap_err();
/// assert_eq!(id.into_raw() & 0b11, 0b01);
/// ```
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ErrorId(NonZeroU32);

impl ErrorId {
    /// Mints the id of a new failure and makes it this thread's
    /// [current](Self::current) failure.
    ///
    /// If [`peek`](Self::peek) reserved an id on this thread, that id is
    /// returned and the reservation is cleared.
    #[must_use]
    #[allow(
        clippy::new_without_default,
        reason = "a fresh id is a side effect, not a default value"
    )]
    pub fn new() -> Self {
        let reserved = RESERVED.try_with(Cell::take).unwrap_or(0);
        let id = NonZeroU32::new(reserved).unwrap_or_else(generate);
        // Ignored during thread teardown; there is nothing left to defer to.
        let _ = CURRENT.try_with(|current| current.set(id.get()));
        Self(id)
    }

    /// Returns the id the next call to [`new`](Self::new) on this thread
    /// will return, without making it current.
    ///
    /// This lets diagnostic context be bound to a failure before it is
    /// formally raised, for example when a panic without an id is about to be
    /// caught.
    #[must_use]
    pub fn peek() -> Self {
        let raw = RESERVED
            .try_with(|reserved| {
                let raw = NonZeroU32::new(reserved.get()).unwrap_or_else(generate);
                reserved.set(raw.get());
                raw
            })
            .unwrap_or_else(|_| generate());
        Self(raw)
    }

    /// The id most recently minted on this thread, if any.
    #[must_use]
    pub fn current() -> Option<Self> {
        let raw = CURRENT.try_with(Cell::get).unwrap_or(0);
        NonZeroU32::new(raw).map(Self)
    }

    /// Reconstructs an id from its raw value.
    ///
    /// Returns `None` for zero and for values without the id tag bits, so a
    /// plain error code handed back through a foreign boundary is not taken
    /// for an id.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        if raw & TAG_MASK != TAG {
            return None;
        }
        match NonZeroU32::new(raw) {
            Some(raw) => Some(Self(raw)),
            None => None,
        }
    }

    /// Returns the raw value of the id.
    #[must_use]
    pub const fn into_raw(self) -> u32 {
        self.0.get()
    }

    /// The id in the representation used by `carrier-internals`.
    #[must_use]
    pub(crate) const fn raw(self) -> NonZeroU32 {
        self.0
    }
}

impl fmt::Debug for ErrorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ErrorId({})", self.0.get() >> 2)
    }
}

impl fmt::Display for ErrorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failure #{}", self.0.get() >> 2)
    }
}

impl core::error::Error for ErrorId {}

impl From<ErrorId> for u32 {
    fn from(id: ErrorId) -> Self {
        id.into_raw()
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::*;

    #[test]
    fn test_ids_are_tagged_and_increasing() {
        let a = ErrorId::new();
        let b = ErrorId::new();
        assert_eq!(a.into_raw() & TAG_MASK, TAG);
        assert_eq!(b.into_raw() & TAG_MASK, TAG);
        assert!(b > a);
        assert_eq!(ErrorId::current(), Some(b));
    }

    #[test]
    fn test_peek_reserves_next_id() {
        let peeked = ErrorId::peek();
        assert_eq!(ErrorId::peek(), peeked);
        assert_ne!(ErrorId::current(), Some(peeked));
        let minted = ErrorId::new();
        assert_eq!(minted, peeked);
        assert_ne!(ErrorId::new(), peeked);
    }

    #[test]
    fn test_from_raw_rejects_untagged_values() {
        assert_eq!(ErrorId::from_raw(0), None);
        assert_eq!(ErrorId::from_raw(2), None);
        assert_eq!(ErrorId::from_raw(4), None);
        assert_eq!(ErrorId::from_raw(5).map(ErrorId::into_raw), Some(5));
    }

    #[test]
    fn test_ids_unique_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| (0..256).map(|_| ErrorId::new()).collect::<Vec<_>>()))
            .collect();
        let mut all: Vec<ErrorId> = handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();
        let count = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), count);
    }

    #[test]
    fn test_current_is_per_thread() {
        let id = ErrorId::new();
        std::thread::spawn(move || assert_ne!(ErrorId::current(), Some(id)))
            .join()
            .unwrap();
    }

    #[test]
    fn test_error_id_traits() {
        static_assertions::assert_impl_all!(ErrorId: Copy, Send, Sync, core::error::Error);
        static_assertions::assert_eq_size!(ErrorId, Option<ErrorId>);
    }
}
