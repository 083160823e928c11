//! The boundary between value-returning and unwinding failures.
//!
//! A failure can travel up the stack as `Err(ErrorId)` or by unwinding. To
//! keep the payloads of an unwinding failure reachable, [`raise`] unwinds
//! with an [`Unwound`] panic payload that carries the failure's id. A handling
//! block that catches the unwinding recovers the id with [`unpack_identity`];
//! any other panic payload, such as the message of a plain `panic!`, gets a
//! freshly minted id instead.
//!
//! Unwinding started by [`raise`] goes through
//! [`std::panic::resume_unwind`], so the panic hook is not invoked and
//! nothing is printed.
//!
//! # Examples
//!
//! ```
//! use carrier::{ErrorId, raise, unwind::unpack_identity};
//!
//! struct Code(i32);
//!
//! let payload = std::panic::catch_unwind(|| raise((Code(7),))).unwrap_err();
//! let id = unpack_identity(&*payload);
//! assert_eq!(ErrorId::current(), Some(id));
//! ```

use alloc::boxed::Box;
use core::{any::Any, fmt};

use crate::{ErrorId, record::Payloads, new_error};

/// Panic payload of a failure signalled by unwinding.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Unwound(ErrorId);

impl Unwound {
    /// The failure being signalled.
    #[must_use]
    pub fn id(&self) -> ErrorId {
        self.0
    }
}

impl fmt::Display for Unwound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unwinding with {}", self.0)
    }
}

impl core::error::Error for Unwound {}

/// The object an unwinding failure was thrown with, kept in its own slot
/// while the failure is being handled.
pub(crate) struct Thrown(pub(crate) Box<dyn Any + Send>);

impl Thrown {
    /// The panic message, if the object is one.
    pub(crate) fn message(&self) -> Option<&str> {
        if let Some(message) = self.0.downcast_ref::<&'static str>() {
            Some(message)
        } else {
            self.0.downcast_ref::<alloc::string::String>().map(|message| message.as_str())
        }
    }
}

impl fmt::Debug for Thrown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Thrown").finish_non_exhaustive()
    }
}

impl ErrorId {
    /// Signals this failure by unwinding.
    ///
    /// # Examples
    ///
    /// ```
    /// use carrier::{ErrorId, unwind::unpack_identity};
    ///
    /// let id = ErrorId::new();
    /// let payload = std::panic::catch_unwind(|| id.raise()).unwrap_err();
    /// assert_eq!(unpack_identity(&*payload), id);
    /// ```
    pub fn raise(self) -> ! {
        tracing::trace!(target: "carrier", id = %self, "raising by unwinding");
        std::panic::resume_unwind(Box::new(Unwound(self)))
    }
}

/// Mints a new failure, records `payloads` for it, and signals it by
/// unwinding.
pub fn raise<P: Payloads>(payloads: P) -> ! {
    new_error(payloads).raise()
}

/// Returns the failure carried by a caught panic payload.
///
/// A payload raised by [`raise`] or [`ErrorId::raise`], or a bare `ErrorId`
/// passed to [`std::panic::panic_any`], yields its embedded id. Anything else
/// gets a fresh id, which is the id reserved by [`ErrorId::peek`] if context
/// was already bound to the unwinding.
#[must_use]
pub fn unpack_identity(payload: &(dyn Any + Send)) -> ErrorId {
    if let Some(unwound) = payload.downcast_ref::<Unwound>() {
        unwound.id()
    } else if let Some(id) = payload.downcast_ref::<ErrorId>() {
        *id
    } else {
        ErrorId::new()
    }
}
