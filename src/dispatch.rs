//! Handler selection and the handling blocks.
//!
//! A [`HandlerList`] is an ordered list of candidate handlers. Dispatching a
//! failure walks the list in declaration order and invokes the first handler
//! whose arguments can all be produced and whose predicates all hold. There
//! is no reordering by specificity: a general handler listed first shadows a
//! more specific one listed after it.
//!
//! A [`HandlerSet`] is a list whose last handler is a catch-all, so
//! dispatching through it always produces a value. It is built with
//! [`HandlerList::otherwise`], which checks at compile time that the
//! catch-all only takes [`AlwaysSatisfied`](crate::extract::AlwaysSatisfied)
//! arguments, or with [`HandlerList::finish`], which checks the same at run
//! time.
//!
//! The handling blocks [`try_handle_all`], [`try_handle_some`], [`try_catch`]
//! and [`try_catch_result`] open the payload types of their handlers, run
//! the body, and dispatch any failure it signals. The payload slots stay open
//! until the selected handler has returned.

use alloc::{boxed::Box, vec::Vec};
use core::{any::Any, fmt, panic::UnwindSafe};

use crate::{
    ErrorId, Scope,
    extract::{CatchAllArgs, DispatchContext},
    handler::{Handler, IntoHandler},
    put_payload,
    slot::SlotKeys,
    unwind::{Thrown, unpack_identity},
};

/// Result of dispatching a failure through a [`HandlerList`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome<R> {
    /// A handler matched and returned this value.
    Handled(R),
    /// No handler matched the failure.
    Unmatched(ErrorId),
}

impl<R> DispatchOutcome<R> {
    /// Returns `true` if a handler matched.
    #[must_use]
    pub fn is_handled(&self) -> bool {
        matches!(self, Self::Handled(_))
    }

    /// The value of the matching handler, if any.
    pub fn handled(self) -> Option<R> {
        match self {
            Self::Handled(value) => Some(value),
            Self::Unmatched(_) => None,
        }
    }

    /// Converts into a `Result`, with the unmatched failure as the error.
    pub fn into_result(self) -> Result<R, ErrorId> {
        match self {
            Self::Handled(value) => Ok(value),
            Self::Unmatched(id) => Err(id),
        }
    }
}

/// Error returned by [`HandlerList::finish`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HandlerListError {
    /// The list has no handlers.
    Empty,
    /// The last handler of the list can fail to match.
    MissingCatchAll,
}

impl fmt::Display for HandlerListError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "handler list is empty"),
            Self::MissingCatchAll => write!(f, "last handler of the list is not a catch-all"),
        }
    }
}

impl core::error::Error for HandlerListError {}

/// Ordered list of candidate handlers.
///
/// # Examples
///
/// ```
/// use carrier::{DispatchOutcome, HandlerList, Payload, Scope, new_error};
///
/// struct Timeout(u32);
/// struct Refused;
///
/// let handlers = HandlerList::new()
///     .on(|timeout: Payload<Timeout>| format!("timed out after {}s", timeout.0.0))
///     .on(|_: Payload<Refused>| String::from("refused"));
///
/// let _scope = Scope::for_handlers(&handlers).activate();
/// let id = new_error((Refused,));
/// assert_eq!(handlers.try_dispatch(id), DispatchOutcome::Handled(String::from("refused")));
/// ```
pub struct HandlerList<R> {
    handlers: Vec<Handler<R>>,
    keys: SlotKeys,
}

impl<R> Default for HandlerList<R> {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
            keys: SlotKeys::new(),
        }
    }
}

impl<R: 'static> HandlerList<R> {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler.
    #[must_use]
    pub fn on<A>(mut self, handler: impl IntoHandler<R, A>) -> Self {
        self.push(handler);
        self
    }

    /// Appends a handler in place.
    pub fn push<A>(&mut self, handler: impl IntoHandler<R, A>) {
        let handler = handler.into_handler();
        self.keys.merge(handler.keys());
        self.handlers.push(handler);
    }

    /// Appends a catch-all handler, completing the list.
    ///
    /// Every argument of `f` must be always satisfied, such as
    /// [`ErrorInfo`](crate::ErrorInfo) or `Option<Payload<T>>`.
    #[must_use]
    pub fn otherwise<F, A>(mut self, f: F) -> HandlerSet<R>
    where
        F: IntoHandler<R, A>,
        A: CatchAllArgs,
    {
        self.push(f);
        HandlerSet { list: self }
    }

    /// Completes the list, checking that its last handler matches every
    /// failure.
    pub fn finish(self) -> Result<HandlerSet<R>, HandlerListError> {
        match self.handlers.last() {
            None => Err(HandlerListError::Empty),
            Some(last) if !last.is_unconditional() => Err(HandlerListError::MissingCatchAll),
            Some(_) => Ok(HandlerSet { list: self }),
        }
    }
}

impl<R> HandlerList<R> {
    /// Number of handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` if there are no handlers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// The payload types read by any handler of the list.
    #[must_use]
    pub fn keys(&self) -> &SlotKeys {
        &self.keys
    }

    /// Dispatches the failure `id` to the first matching handler.
    ///
    /// # Panics
    ///
    /// Panics if a handler matches but one of its arguments then fails to
    /// be produced, which only an [`Extract`](crate::extract::Extract)
    /// implementation disagreeing with its own `is_satisfied` can cause.
    pub fn try_dispatch(self, id: ErrorId) -> DispatchOutcome<R> {
        let cx = DispatchContext::new(id, &self.keys);
        for (index, handler) in self.handlers.into_iter().enumerate() {
            if !handler.matches(&cx) {
                continue;
            }
            let signature = handler.signature();
            tracing::debug!(
                target: "carrier",
                %id,
                handler = index,
                arguments = signature,
                "selected handler"
            );
            match handler.invoke(&cx) {
                Some(value) => return DispatchOutcome::Handled(value),
                None => panic!(
                    "handler {index} `{signature}` matched {id} but an argument could not be produced"
                ),
            }
        }
        tracing::trace!(target: "carrier", %id, "no handler matched");
        DispatchOutcome::Unmatched(id)
    }
}

impl<R> AsRef<[Handler<R>]> for HandlerList<R> {
    fn as_ref(&self) -> &[Handler<R>] {
        &self.handlers
    }
}

impl<R> fmt::Debug for HandlerList<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.handlers).finish()
    }
}

/// A [`HandlerList`] ending in a catch-all.
pub struct HandlerSet<R> {
    list: HandlerList<R>,
}

impl<R> HandlerSet<R> {
    /// The payload types read by any handler of the set.
    #[must_use]
    pub fn keys(&self) -> &SlotKeys {
        self.list.keys()
    }

    /// Number of handlers, including the catch-all.
    #[must_use]
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Always `false`: a set contains at least its catch-all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Dispatches the failure `id` to the first matching handler.
    ///
    /// # Panics
    ///
    /// Panics if a selected handler fails to produce an argument, as
    /// [`HandlerList::try_dispatch`] does, including an extractor of the
    /// catch-all that declares itself always satisfied.
    pub fn dispatch(self, id: ErrorId) -> R {
        match self.list.try_dispatch(id) {
            DispatchOutcome::Handled(value) => value,
            DispatchOutcome::Unmatched(id) => {
                panic!("the catch-all handler did not match {id}")
            }
        }
    }

    /// Returns the underlying list.
    #[must_use]
    pub fn into_list(self) -> HandlerList<R> {
        self.list
    }
}

impl<R> AsRef<[Handler<R>]> for HandlerSet<R> {
    fn as_ref(&self) -> &[Handler<R>] {
        self.list.as_ref()
    }
}

impl<R> fmt::Debug for HandlerSet<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.list, f)
    }
}

/// Runs `body` and handles any failure it returns.
///
/// # Examples
///
/// ```
/// use carrier::{ErrorId, ErrorInfo, HandlerList, Payload, new_error, try_handle_all};
///
/// struct NotFound(&'static str);
///
/// fn lookup(key: &'static str) -> Result<u32, ErrorId> {
///     Err(new_error((NotFound(key),)))
/// }
///
/// let value = try_handle_all(
///     || lookup("answer"),
///     HandlerList::new()
///         .on(|missing: Payload<NotFound>| missing.0.0.len() as u32)
///         .otherwise(|_: ErrorInfo| 0),
/// );
/// assert_eq!(value, 6);
/// ```
pub fn try_handle_all<T, B>(body: B, handlers: HandlerSet<T>) -> T
where
    B: FnOnce() -> Result<T, ErrorId>,
{
    let _scope = Scope::for_handlers(&handlers).activate();
    match body() {
        Ok(value) => value,
        Err(id) => handlers.dispatch(id),
    }
}

/// Runs `body` and handles the failures it returns that some handler matches.
///
/// Handlers return `Result<T, ErrorId>` themselves, so they can recover or
/// signal a new failure. A failure no handler matches is returned unchanged;
/// its payloads move on to the enclosing scopes as the block's slots close.
///
/// # Examples
///
/// ```
/// use carrier::{ErrorId, HandlerList, Payload, Scope, new_error, slot, try_handle_some};
///
/// #[derive(Clone, Debug, PartialEq)]
/// struct Code(i32);
///
/// let _outer = Scope::of::<(Code,)>().activate();
/// let result = try_handle_some(
///     || -> Result<(), ErrorId> { Err(new_error((Code(3),))) },
///     HandlerList::new().on(handler_for_zero()),
/// );
/// let id = result.unwrap_err();
/// assert_eq!(slot::value::<Code>(id), Some(Code(3)));
///
/// fn handler_for_zero() -> carrier::Handler<Result<(), ErrorId>> {
///     carrier::handler(|_: Payload<Code>| Ok(())).when_in([Code(0)])
/// }
/// ```
pub fn try_handle_some<T, B>(body: B, handlers: HandlerList<Result<T, ErrorId>>) -> Result<T, ErrorId>
where
    B: FnOnce() -> Result<T, ErrorId>,
{
    let _scope = Scope::for_handlers(&handlers).activate();
    match body() {
        Ok(value) => Ok(value),
        Err(id) => match handlers.try_dispatch(id) {
            DispatchOutcome::Handled(result) => result,
            DispatchOutcome::Unmatched(id) => Err(id),
        },
    }
}

/// Runs `body`, catching and handling any failure it signals by unwinding.
///
/// Both failures raised with [`raise`](crate::raise) and ordinary panics are
/// caught. The object the body unwound with is available to handlers through
/// [`Caught`](crate::Caught) and [`PanicMessage`](crate::PanicMessage).
///
/// # Examples
///
/// ```
/// use carrier::{HandlerList, PanicMessage, Payload, raise, try_catch};
///
/// struct Code(i32);
///
/// let handlers = || {
///     HandlerList::new()
///         .on(|code: Payload<Code>| code.0.0)
///         .on(|message: PanicMessage| message.as_str().len() as i32)
///         .otherwise(|| -1)
/// };
///
/// assert_eq!(try_catch(|| raise((Code(7),)), handlers()), 7);
/// assert_eq!(try_catch(|| 1, handlers()), 1);
/// ```
pub fn try_catch<T, B>(body: B, handlers: HandlerSet<T>) -> T
where
    B: FnOnce() -> T + UnwindSafe,
{
    let _scope = catch_scope(handlers.keys()).activate();
    match std::panic::catch_unwind(body) {
        Ok(value) => value,
        Err(thrown) => handlers.dispatch(catch_thrown(thrown)),
    }
}

/// Runs `body`, handling failures it returns as well as failures it signals
/// by unwinding.
pub fn try_catch_result<T, B>(body: B, handlers: HandlerSet<T>) -> T
where
    B: FnOnce() -> Result<T, ErrorId> + UnwindSafe,
{
    let _scope = catch_scope(handlers.keys()).activate();
    match std::panic::catch_unwind(body) {
        Ok(Ok(value)) => value,
        Ok(Err(id)) => handlers.dispatch(id),
        Err(thrown) => handlers.dispatch(catch_thrown(thrown)),
    }
}

fn catch_scope(keys: &SlotKeys) -> Scope {
    let mut keys = keys.clone();
    keys.insert_type::<Thrown>();
    Scope::new(keys)
}

/// Keeps the unwound object for the handlers and returns its failure.
fn catch_thrown(thrown: Box<dyn Any + Send>) -> ErrorId {
    let id = unpack_identity(&*thrown);
    tracing::trace!(target: "carrier", %id, "caught unwinding failure");
    put_payload(Thrown(thrown), id);
    id
}

#[cfg(test)]
mod tests {
    use alloc::{
        format,
        string::{String, ToString},
    };

    use super::*;
    use crate::{ErrorInfo, Payload, Peek, handler, new_error, slot};

    #[derive(Clone, Debug, PartialEq)]
    struct A(u8);
    #[derive(Clone, Debug, PartialEq)]
    struct B(u8);

    #[test]
    fn test_first_match_wins_without_reordering() {
        let result = try_handle_all(
            || -> Result<&'static str, _> { Err(new_error((A(1),))) },
            HandlerList::new()
                .on(|_: Payload<A>, _: Payload<B>| "a and b")
                .on(|_: Payload<A>| "a")
                .on(|_: Peek<A>| "a again")
                .otherwise(|| "catch-all"),
        );
        assert_eq!(result, "a");
    }

    #[test]
    fn test_catch_all_receives_unmatched() {
        let id = try_handle_all(
            || -> Result<Option<ErrorId>, _> { Err(new_error((B(2),))) },
            HandlerList::new()
                .on(|_: Payload<A>| None)
                .otherwise(|info: ErrorInfo| Some(info.id())),
        );
        assert!(id.is_some());
    }

    #[test]
    fn test_success_skips_handlers() {
        let value = try_handle_all(
            || Ok::<_, ErrorId>(5),
            HandlerList::new().otherwise(|| -> i32 { panic!("handler invoked") }),
        );
        assert_eq!(value, 5);
    }

    #[test]
    fn test_finish_checks_catch_all() {
        let empty = HandlerList::<()>::new().finish().unwrap_err();
        assert_eq!(empty, HandlerListError::Empty);
        let missing = HandlerList::new().on(|_: Payload<A>| ()).finish().unwrap_err();
        assert_eq!(missing, HandlerListError::MissingCatchAll);
        assert_eq!(
            missing.to_string(),
            "last handler of the list is not a catch-all"
        );
        let conditional = HandlerList::new()
            .on(handler(|_: ErrorInfo| ()).when(|_: &A| true))
            .finish();
        assert_eq!(conditional.unwrap_err(), HandlerListError::MissingCatchAll);
        let set = HandlerList::new()
            .on(|_: Payload<A>| ())
            .on(|_: ErrorInfo, _: Option<Payload<B>>| ())
            .finish()
            .unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_unmatched_payloads_propagate_outward() {
        let _outer = Scope::of::<(A,)>().activate();
        let result: Result<(), ErrorId> = try_handle_some(
            || Err(new_error((A(9), B(1)))),
            HandlerList::new().on(|_: Payload<B>, _: Payload<u64>| Ok(())),
        );
        let id = result.unwrap_err();
        assert_eq!(slot::value::<A>(id), Some(A(9)));
        assert!(!slot::has_value::<B>(id));
    }

    #[test]
    fn test_handler_may_signal_new_failure() {
        let _outer = Scope::of::<(B,)>().activate();
        let result: Result<(), ErrorId> = try_handle_some(
            || Err(new_error((A(1),))),
            HandlerList::new().on(|a: Payload<A>| Err(new_error((B(a.0.0 + 1),)))),
        );
        let id = result.unwrap_err();
        assert_eq!(slot::value::<B>(id), Some(B(2)));
    }

    #[test]
    fn test_try_catch_plain_panic() {
        let message = try_catch(
            || -> String { std::panic::panic_any(String::from("plain")) },
            HandlerList::new()
                .on(|message: crate::PanicMessage| message.to_string())
                .otherwise(String::new),
        );
        assert_eq!(message, "plain");
    }

    #[test]
    fn test_try_catch_result_both_styles() {
        let handlers = || {
            HandlerList::new()
                .on(|a: Payload<A>| i32::from(a.0.0))
                .on(|info: ErrorInfo| if info.unwound() { 100 } else { 200 })
                .otherwise(|| 0)
        };
        assert_eq!(try_catch_result(|| Err(new_error((A(4),))), handlers()), 4);
        assert_eq!(try_catch_result(|| crate::raise((A(5),)), handlers()), 5);
        assert_eq!(try_catch_result(|| Err(new_error(())), handlers()), 200);
        assert_eq!(try_catch_result(|| crate::raise(()), handlers()), 100);
    }

    #[test]
    fn test_when_caught() {
        #[derive(Debug)]
        struct Fatal;
        let result = try_catch(
            || -> u8 { std::panic::resume_unwind(Box::new(Fatal)) },
            HandlerList::new()
                .on(handler(|| 1).when_caught::<crate::unwind::Unwound>())
                .on(|_: crate::Caught<Fatal>| 2)
                .otherwise(|| 3),
        );
        assert_eq!(result, 2);
    }

    #[test]
    fn test_handler_may_read_and_take_same_payload() {
        let result = try_handle_all(
            || -> Result<String, _> { Err(new_error((A(1),))) },
            HandlerList::new()
                .on(|a: Payload<A>, b: Peek<A>| format!("first {:?} {:?}", a.0, b.0))
                .on(|a: Payload<A>| format!("second {:?}", a.0))
                .otherwise(|| String::from("catch-all")),
        );
        assert_eq!(result, "first A(1) A(1)");

        let result = try_catch(
            || -> String { std::panic::panic_any("boom") },
            HandlerList::new()
                .on(|c: crate::Caught<&'static str>, m: crate::PanicMessage| {
                    format!("first {} {m}", c.0)
                })
                .on(|c: crate::Caught<&'static str>| format!("second {}", c.0))
                .otherwise(|| String::from("catch-all")),
        );
        assert_eq!(result, "first boom boom");
    }

    #[test]
    #[should_panic(expected = "an argument could not be produced")]
    fn test_matched_handler_must_produce_arguments() {
        struct Unreliable;

        impl crate::extract::Extract for Unreliable {
            fn declare(_keys: &mut SlotKeys) {}

            fn is_satisfied(_cx: &DispatchContext<'_>) -> bool {
                true
            }

            fn extract(_cx: &DispatchContext<'_>) -> Option<Self> {
                None
            }
        }

        let _ = try_handle_all(
            || -> Result<u8, _> { Err(new_error(())) },
            HandlerList::new()
                .on(|_: Unreliable| 1)
                .otherwise(|| 2),
        );
    }

    #[test]
    fn test_handler_types() {
        static_assertions::assert_impl_all!(HandlerListError: core::error::Error, Copy, Send, Sync);
        static_assertions::assert_not_impl_any!(HandlerSet<()>: Send, Sync);
    }
}
