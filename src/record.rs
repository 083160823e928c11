//! Recording payloads for a failure.
//!
//! A payload is any `'static` value. Recording it stores it in the innermost
//! open slot of its type, tagged with the failure's [`ErrorId`], where a
//! handler further up the stack can pick it up. If no scope on the thread has
//! the type open, the value is dropped on the spot: nobody asked for it.
//!
//! Besides the immediate forms ([`put_payload`], [`new_error`],
//! [`ErrorId::load`]) this module provides the deferred guards returned by
//! [`on_error`] and [`on_error_with`]. They attach context to whatever failure
//! passes through the frame that created them, without that frame having to
//! inspect its callees' results.
//!
//! # Examples
//!
//! ```
//! use carrier::{ErrorId, HandlerList, Payload, new_error, on_error, try_handle_all};
//!
//! struct FileName(&'static str);
//! struct Errno(i32);
//!
//! fn open(name: &'static str) -> Result<(), ErrorId> {
//!     let _context = on_error((FileName(name),));
//!     Err(new_error((Errno(2),)))
//! }
//!
//! let message = try_handle_all(
//!     || open("config.toml").map(|()| String::new()),
//!     HandlerList::new()
//!         .on(|name: Payload<FileName>, errno: Payload<Errno>| {
//!             format!("{}: errno {}", name.into_inner().0, errno.into_inner().0)
//!         })
//!         .otherwise(|| String::from("unknown failure")),
//! );
//! assert_eq!(message, "config.toml: errno 2");
//! ```

use core::{fmt, marker::PhantomData};

use carrier_internals::registry;

use crate::{ErrorId, diagnostics, slot};

/// Records `value` for the failure `id`.
///
/// Returns `true` if the value was stored in an open slot, and `false` if no
/// scope on this thread has `T` open, in which case the value is dropped.
/// A value of the same type recorded earlier in the same slot is replaced.
///
/// # Examples
///
/// ```
/// use carrier::{ErrorId, Scope, put_payload, slot};
///
/// #[derive(Clone, Debug, PartialEq)]
/// struct Attempt(u32);
///
/// let id = ErrorId::new();
/// assert!(!put_payload(Attempt(1), id));
///
/// let _scope = Scope::of::<(Attempt,)>().activate();
/// assert!(put_payload(Attempt(2), id));
/// assert!(put_payload(Attempt(3), id));
/// assert_eq!(slot::value::<Attempt>(id), Some(Attempt(3)));
/// ```
pub fn put_payload<T: 'static>(value: T, id: ErrorId) -> bool {
    match registry::put::<T>(id.raw(), value) {
        Ok(replaced) => {
            drop(replaced);
            true
        }
        Err(value) => {
            drop(value);
            diagnostics::record_dropped::<T>(id);
            false
        }
    }
}

/// A tuple of payload values recorded together.
///
/// Implemented for `()` and tuples of up to eight `'static` values. Every
/// element is recorded independently, so some may be captured while others
/// are dropped.
pub trait Payloads: 'static {
    /// Records every element for the failure `id`.
    fn record(self, id: ErrorId);
}

macro_rules! impl_payloads {
    ($($t:ident $i:tt),*) => {
        impl<$($t: 'static),*> Payloads for ($($t,)*) {
            #[allow(unused_variables)]
            fn record(self, id: ErrorId) {
                $(put_payload(self.$i, id);)*
            }
        }
    };
}

for_each_tuple!(impl_payloads);

/// Mints the id of a new failure and records `payloads` for it.
///
/// # Examples
///
/// ```
/// use carrier::{ErrorId, new_error};
///
/// struct Code(i32);
/// struct Detail(&'static str);
///
/// fn parse(input: &str) -> Result<i32, ErrorId> {
///     input
///         .parse()
///         .map_err(|_| new_error((Code(22), Detail("not a number"))))
/// }
///
/// assert!(parse("x").is_err());
/// ```
pub fn new_error<P: Payloads>(payloads: P) -> ErrorId {
    let id = ErrorId::new();
    payloads.record(id);
    id
}

impl ErrorId {
    /// Records one more payload for this failure and returns the id.
    ///
    /// # Examples
    ///
    /// ```
    /// use carrier::{ErrorId, Scope, slot};
    ///
    /// #[derive(Clone, Debug, PartialEq)]
    /// struct Step(&'static str);
    ///
    /// let _scope = Scope::of::<(Step,)>().activate();
    /// let id = ErrorId::new().load(Step("connect"));
    /// assert_eq!(slot::value::<Step>(id), Some(Step("connect")));
    /// ```
    #[must_use]
    pub fn load<T: 'static>(self, value: T) -> Self {
        put_payload(value, self);
        self
    }

    /// Records a tuple of payloads for this failure and returns the id.
    #[must_use]
    pub fn load_all<P: Payloads>(self, payloads: P) -> Self {
        payloads.record(self);
        self
    }
}

/// Context recorded by an [`OnError`] guard when it fires.
pub trait Deferred {
    /// Records the context for the failure `id`.
    fn record(self, id: ErrorId);
}

/// Payload values computed when the guard was created.
pub struct Preloaded<P>(P);

impl<P: Payloads> Deferred for Preloaded<P> {
    fn record(self, id: ErrorId) {
        self.0.record(id);
    }
}

/// A payload computed by a callback when the guard fires.
pub struct Lazy<F, T> {
    f: F,
    _payload: PhantomData<fn() -> T>,
}

impl<F, T> Deferred for Lazy<F, T>
where
    F: FnOnce() -> T,
    T: 'static,
{
    fn record(self, id: ErrorId) {
        if slot::is_open::<T>() {
            put_payload((self.f)(), id);
        } else {
            diagnostics::record_dropped::<T>(id);
        }
    }
}

/// Guard attaching context to a failure that passes through its frame.
///
/// When the guard is dropped it checks whether a failure is in flight: either
/// a new [`ErrorId`] was minted on this thread after the guard was created,
/// or the thread started unwinding after the guard was created. Only then is
/// its context recorded, for the newly minted id or, while unwinding without
/// one, for the id the unwinding boundary will mint next
/// ([`ErrorId::peek`]).
///
/// Create guards with [`on_error`] and [`on_error_with`].
#[must_use = "the guard records nothing unless it lives until the failure"]
pub struct OnError<D: Deferred> {
    context: Option<D>,
    baseline: Option<ErrorId>,
    was_panicking: bool,
    _thread_bound: PhantomData<*const ()>,
}

impl<D: Deferred> OnError<D> {
    fn new(context: D) -> Self {
        Self {
            context: Some(context),
            baseline: ErrorId::current(),
            was_panicking: std::thread::panicking(),
            _thread_bound: PhantomData,
        }
    }

    /// Disarms the guard without recording anything.
    pub fn dismiss(mut self) {
        self.context = None;
    }

    /// The failure the guard would record for if it were dropped now.
    fn pending(&self) -> Option<ErrorId> {
        let current = ErrorId::current();
        if current != self.baseline {
            current
        } else if std::thread::panicking() && !self.was_panicking {
            Some(ErrorId::peek())
        } else {
            None
        }
    }
}

impl<D: Deferred> Drop for OnError<D> {
    fn drop(&mut self) {
        let Some(context) = self.context.take() else {
            return;
        };
        if let Some(id) = self.pending() {
            context.record(id);
        }
    }
}

impl<D: Deferred> fmt::Debug for OnError<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnError")
            .field("armed", &self.context.is_some())
            .field("baseline", &self.baseline)
            .finish()
    }
}

/// Returns a guard recording `payloads` if a failure passes through the
/// current frame before the guard is dropped.
///
/// The payloads are constructed eagerly. Use [`on_error_with`] when building
/// the value is expensive.
pub fn on_error<P: Payloads>(payloads: P) -> OnError<Preloaded<P>> {
    OnError::new(Preloaded(payloads))
}

/// Returns a guard recording the value returned by `f` if a failure passes
/// through the current frame before the guard is dropped.
///
/// `f` is only called when the guard fires and some scope has `T` open.
///
/// # Examples
///
/// ```
/// use carrier::{ErrorId, Scope, on_error_with, slot};
///
/// #[derive(Clone, Debug, PartialEq)]
/// struct Progress(usize);
///
/// let _scope = Scope::of::<(Progress,)>().activate();
/// let id = {
///     let done = 3;
///     let _context = on_error_with(|| Progress(done));
///     ErrorId::new()
/// };
/// assert_eq!(slot::value::<Progress>(id), Some(Progress(3)));
/// ```
pub fn on_error_with<F, T>(f: F) -> OnError<Lazy<F, T>>
where
    F: FnOnce() -> T,
    T: 'static,
{
    OnError::new(Lazy {
        f,
        _payload: PhantomData,
    })
}
