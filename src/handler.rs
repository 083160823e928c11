//! Building handlers from closures.
//!
//! Any closure whose arguments all implement [`Extract`] converts into a
//! [`Handler`]. The argument types decide which payloads the handler
//! requires; [`Handler::when`], [`Handler::when_in`] and
//! [`Handler::when_caught`] add conditions on the payload values.
//!
//! # Examples
//!
//! ```
//! use carrier::{HandlerList, Payload, handler, new_error, try_handle_all};
//!
//! #[derive(Debug, PartialEq)]
//! struct Status(u16);
//!
//! let outcome = try_handle_all(
//!     || -> Result<&'static str, _> { Err(new_error((Status(404),))) },
//!     HandlerList::new()
//!         .on(handler(|_: Payload<Status>| "server error").when(|status: &Status| status.0 >= 500))
//!         .on(handler(|_: Payload<Status>| "not found").when_in([Status(404), Status(410)]))
//!         .otherwise(|| "unexpected"),
//! );
//! assert_eq!(outcome, "not found");
//! ```

use alloc::{boxed::Box, vec::Vec};
use core::{any::Any, fmt};

use crate::{
    ErrorId,
    extract::{DispatchContext, Extract, ExtractArgs, thrown_is},
    slot::{self, SlotKeys},
    unwind::Thrown,
};

type Predicate = Box<dyn Fn(ErrorId) -> bool>;
type Call<R> = Box<dyn FnOnce(&DispatchContext<'_>) -> Option<R>>;

/// A candidate handler for a failure.
///
/// A handler matches a failure when every argument can be extracted and all
/// of its predicates hold. It is immutable once added to a
/// [`HandlerList`](crate::HandlerList).
pub struct Handler<R> {
    keys: SlotKeys,
    satisfied: fn(&DispatchContext<'_>) -> bool,
    predicates: Vec<Predicate>,
    call: Call<R>,
    unconditional: bool,
    signature: &'static str,
}

impl<R: 'static> Handler<R> {
    /// # Panics
    ///
    /// Panics if the arguments move the same payload type more than once.
    fn from_parts<A: ExtractArgs>(call: Call<R>) -> Self {
        let mut keys = SlotKeys::new();
        A::declare(&mut keys);
        let mut moved = Vec::new();
        A::moves(&mut moved);
        for (index, (type_id, name)) in moved.iter().enumerate() {
            if moved[..index].iter().any(|(earlier, _)| earlier == type_id) {
                panic!("handler moves `{name}` out of its slot more than once");
            }
        }
        Self {
            keys,
            satisfied: A::is_satisfied,
            predicates: Vec::new(),
            call,
            unconditional: A::ALWAYS_SATISFIED,
            signature: core::any::type_name::<A>(),
        }
    }

    /// Requires a payload of type `T` for which `predicate` returns `true`.
    ///
    /// The predicate sees the value in place; whether the handler also takes
    /// the value is up to its arguments.
    #[must_use]
    pub fn when<T: 'static>(mut self, predicate: impl Fn(&T) -> bool + 'static) -> Self {
        self.keys.insert_type::<T>();
        self.unconditional = false;
        self.predicates.push(Box::new(move |id| {
            slot::with_value::<T, _>(id, |value| predicate(value)).unwrap_or(false)
        }));
        self
    }

    /// Requires a payload of type `T` equal to one of `values`.
    #[must_use]
    pub fn when_in<T: PartialEq + 'static>(self, values: impl IntoIterator<Item = T>) -> Self {
        let values: Vec<T> = values.into_iter().collect();
        self.when::<T>(move |value| values.contains(value))
    }

    /// Requires the failure to have unwound with an object of type `E`.
    #[must_use]
    pub fn when_caught<E: Any>(mut self) -> Self {
        self.keys.insert_type::<Thrown>();
        self.unconditional = false;
        self.predicates.push(Box::new(thrown_is::<E>));
        self
    }
}

impl<R> Handler<R> {
    /// The payload types the handler reads.
    #[must_use]
    pub fn keys(&self) -> &SlotKeys {
        &self.keys
    }

    /// Whether the handler matches every failure.
    #[must_use]
    pub fn is_unconditional(&self) -> bool {
        self.unconditional
    }

    pub(crate) fn signature(&self) -> &'static str {
        self.signature
    }

    pub(crate) fn matches(&self, cx: &DispatchContext<'_>) -> bool {
        (self.satisfied)(cx) && self.predicates.iter().all(|predicate| predicate(cx.id()))
    }

    /// Runs the handler. Returns `None` if an argument could not be extracted
    /// after all.
    pub(crate) fn invoke(self, cx: &DispatchContext<'_>) -> Option<R> {
        (self.call)(cx)
    }
}

impl<R> fmt::Debug for Handler<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("arguments", &self.signature)
            .field("keys", &self.keys)
            .field("predicates", &self.predicates.len())
            .finish_non_exhaustive()
    }
}

/// Conversion into a [`Handler`].
///
/// Implemented for [`Handler`] itself and for closures of up to eight
/// [`Extract`] arguments. `Args` only disambiguates the implementations.
pub trait IntoHandler<R, Args> {
    /// Performs the conversion.
    fn into_handler(self) -> Handler<R>;
}

/// `Args` marker of the identity conversion.
#[derive(Copy, Clone, Debug)]
pub enum Prebuilt {}

impl<R> IntoHandler<R, Prebuilt> for Handler<R> {
    fn into_handler(self) -> Handler<R> {
        self
    }
}

macro_rules! impl_into_handler {
    ($($t:ident $i:tt),*) => {
        impl<Func, R, $($t: Extract),*> IntoHandler<R, ($($t,)*)> for Func
        where
            Func: FnOnce($($t),*) -> R + 'static,
            R: 'static,
        {
            #[allow(unused_variables)]
            fn into_handler(self) -> Handler<R> {
                Handler::from_parts::<($($t,)*)>(Box::new(move |cx: &DispatchContext<'_>| {
                    let args = <($($t,)*) as ExtractArgs>::extract(cx)?;
                    Some(self($(args.$i),*))
                }))
            }
        }
    };
}

for_each_tuple!(impl_into_handler);

/// Builds a [`Handler`] from a closure, to attach predicates to it.
///
/// # Panics
///
/// Panics if the closure takes the same [`Payload<T>`](crate::Payload) or
/// [`Caught<E>`](crate::Caught) more than once, since the second argument
/// could never be produced.
pub fn handler<R, Args, F: IntoHandler<R, Args>>(f: F) -> Handler<R> {
    f.into_handler()
}
