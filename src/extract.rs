//! Handler arguments.
//!
//! A handler is a closure whose arguments describe what it needs. Every
//! argument type implements [`Extract`], which tells the dispatcher
//! - which payload types must have an open slot while the failure travels,
//! - whether the argument can be produced for a given failure, and
//! - how to produce it.
//!
//! | Argument            | Matches when                                  | Produces            |
//! |---------------------|-----------------------------------------------|---------------------|
//! | [`Payload<T>`]      | a `T` was recorded for the failure            | the value, moved    |
//! | [`Peek<T>`]         | a `T` was recorded for the failure            | a clone             |
//! | `Option<Payload<T>>`| always                                        | the value, if any   |
//! | `Option<Peek<T>>`   | always                                        | a clone, if any     |
//! | [`Caught<E>`]       | the failure unwound with an object of type `E`| the object          |
//! | [`PanicMessage`]    | the failure unwound with a panic message      | the message         |
//! | [`ErrorInfo`]       | always                                        | id and failure kind |
//! | [`DiagnosticInfo`]  | always                                        | a diagnostic report |
//!
//! Extractors that always match implement [`AlwaysSatisfied`]; only those
//! may appear in a catch-all handler.

use alloc::{string::String, vec::Vec};
use core::{
    any::{Any, TypeId},
    fmt,
    ops::{Deref, DerefMut},
};

use crate::{
    ErrorId,
    diagnostics::{self, DiagnosticInfo, DroppedPayloads},
    slot::{self, SlotKey, SlotKeys},
    unwind::Thrown,
};

/// What the dispatcher knows about the failure being handled.
#[derive(Copy, Clone, Debug)]
pub struct DispatchContext<'a> {
    id: ErrorId,
    keys: &'a SlotKeys,
}

impl<'a> DispatchContext<'a> {
    pub(crate) fn new(id: ErrorId, keys: &'a SlotKeys) -> Self {
        Self { id, keys }
    }

    /// The failure being handled.
    #[must_use]
    pub fn id(&self) -> ErrorId {
        self.id
    }

    /// Whether the failure was signalled by unwinding.
    #[must_use]
    pub fn unwound(&self) -> bool {
        slot::has_value::<Thrown>(self.id)
    }

    /// The payload types the handling block has open.
    #[must_use]
    pub fn keys(&self) -> &'a SlotKeys {
        self.keys
    }
}

/// A handler argument.
pub trait Extract: Sized + 'static {
    /// `true` if [`is_satisfied`](Self::is_satisfied) never returns `false`.
    ///
    /// Extractors setting this must always return `Some` from
    /// [`extract`](Self::extract).
    const ALWAYS_SATISFIED: bool = false;

    /// `true` if [`extract`](Self::extract) takes a value out of its slot.
    ///
    /// Within one argument list, moving arguments are produced after all the
    /// others, so a handler may both read and take the same payload.
    const MOVES: bool = false;

    /// Adds the slot keys the argument reads.
    fn declare(keys: &mut SlotKeys);

    /// Adds the payload types the argument moves out of their slots.
    fn moves(moved: &mut Vec<(TypeId, &'static str)>) {
        let _ = moved;
    }

    /// Whether the argument can be produced for the failure.
    fn is_satisfied(cx: &DispatchContext<'_>) -> bool;

    /// Produces the argument.
    fn extract(cx: &DispatchContext<'_>) -> Option<Self>;
}

/// Extractors that can be produced for every failure.
pub trait AlwaysSatisfied: Extract {}

/// A payload moved out of its slot.
///
/// Once moved, the value no longer propagates to enclosing scopes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct Payload<T>(pub T);

impl<T> Payload<T> {
    /// Returns the payload value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for Payload<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for Payload<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T: 'static> Extract for Payload<T> {
    const MOVES: bool = true;

    fn declare(keys: &mut SlotKeys) {
        keys.insert_type::<T>();
    }

    fn moves(moved: &mut Vec<(TypeId, &'static str)>) {
        moved.push((TypeId::of::<T>(), core::any::type_name::<T>()));
    }

    fn is_satisfied(cx: &DispatchContext<'_>) -> bool {
        slot::has_value::<T>(cx.id)
    }

    fn extract(cx: &DispatchContext<'_>) -> Option<Self> {
        slot::extract_value::<T>(cx.id).map(Payload)
    }
}

/// A clone of a payload, which stays in its slot.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct Peek<T>(pub T);

impl<T> Peek<T> {
    /// Returns the cloned value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for Peek<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: Clone + 'static> Extract for Peek<T> {
    fn declare(keys: &mut SlotKeys) {
        keys.insert_type::<T>();
    }

    fn is_satisfied(cx: &DispatchContext<'_>) -> bool {
        slot::has_value::<T>(cx.id)
    }

    fn extract(cx: &DispatchContext<'_>) -> Option<Self> {
        slot::value::<T>(cx.id).map(Peek)
    }
}

impl<E: Extract> Extract for Option<E> {
    const ALWAYS_SATISFIED: bool = true;
    const MOVES: bool = E::MOVES;

    fn declare(keys: &mut SlotKeys) {
        E::declare(keys);
    }

    fn moves(moved: &mut Vec<(TypeId, &'static str)>) {
        E::moves(moved);
    }

    fn is_satisfied(_cx: &DispatchContext<'_>) -> bool {
        true
    }

    fn extract(cx: &DispatchContext<'_>) -> Option<Self> {
        if E::is_satisfied(cx) {
            Some(E::extract(cx))
        } else {
            Some(None)
        }
    }
}

impl<E: Extract> AlwaysSatisfied for Option<E> {}

/// The object an unwinding failure was thrown with, if it has type `E`.
///
/// For failures raised with [`raise`](crate::raise) the object is an
/// [`Unwound`](crate::unwind::Unwound); for `panic!("..")` it is the message.
#[derive(Debug)]
pub struct Caught<E>(pub E);

impl<E> Caught<E> {
    /// Returns the thrown object.
    pub fn into_inner(self) -> E {
        self.0
    }
}

impl<E> Deref for Caught<E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.0
    }
}

impl<E: Any + Send> Extract for Caught<E> {
    const MOVES: bool = true;

    fn declare(keys: &mut SlotKeys) {
        keys.insert_type::<Thrown>();
    }

    fn moves(moved: &mut Vec<(TypeId, &'static str)>) {
        moved.push((TypeId::of::<Thrown>(), "thrown object"));
    }

    fn is_satisfied(cx: &DispatchContext<'_>) -> bool {
        thrown_is::<E>(cx.id)
    }

    fn extract(cx: &DispatchContext<'_>) -> Option<Self> {
        let thrown = slot::extract_value::<Thrown>(cx.id)?;
        match thrown.0.downcast::<E>() {
            Ok(object) => Some(Caught(*object)),
            Err(object) => {
                crate::put_payload(Thrown(object), cx.id);
                None
            }
        }
    }
}

/// Returns `true` if the failure unwound with an object of type `E`.
pub(crate) fn thrown_is<E: Any>(id: ErrorId) -> bool {
    slot::with_value::<Thrown, _>(id, |thrown| thrown.0.is::<E>()).unwrap_or(false)
}

/// The message of a failure that unwound through `panic!`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PanicMessage(pub String);

impl PanicMessage {
    /// The message text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PanicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Extract for PanicMessage {
    fn declare(keys: &mut SlotKeys) {
        keys.insert_type::<Thrown>();
    }

    fn is_satisfied(cx: &DispatchContext<'_>) -> bool {
        slot::with_value::<Thrown, _>(cx.id, |thrown| thrown.message().is_some()).unwrap_or(false)
    }

    fn extract(cx: &DispatchContext<'_>) -> Option<Self> {
        slot::with_value::<Thrown, _>(cx.id, |thrown| thrown.message().map(String::from))
            .flatten()
            .map(PanicMessage)
    }
}

/// The identity of the failure and how it was signalled.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ErrorInfo {
    id: ErrorId,
    unwound: bool,
}

impl ErrorInfo {
    /// The failure being handled.
    #[must_use]
    pub fn id(&self) -> ErrorId {
        self.id
    }

    /// Whether the failure was signalled by unwinding.
    #[must_use]
    pub fn unwound(&self) -> bool {
        self.unwound
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unwound {
            write!(f, "{} (unwound)", self.id)
        } else {
            write!(f, "{}", self.id)
        }
    }
}

impl Extract for ErrorInfo {
    const ALWAYS_SATISFIED: bool = true;

    fn declare(_keys: &mut SlotKeys) {}

    fn is_satisfied(_cx: &DispatchContext<'_>) -> bool {
        true
    }

    fn extract(cx: &DispatchContext<'_>) -> Option<Self> {
        Some(ErrorInfo {
            id: cx.id,
            unwound: cx.unwound(),
        })
    }
}

impl AlwaysSatisfied for ErrorInfo {}

impl Extract for DiagnosticInfo {
    const ALWAYS_SATISFIED: bool = true;

    fn declare(keys: &mut SlotKeys) {
        keys.insert(diagnostics::tally_key());
    }

    fn is_satisfied(_cx: &DispatchContext<'_>) -> bool {
        true
    }

    fn extract(cx: &DispatchContext<'_>) -> Option<Self> {
        let internal = [TypeId::of::<Thrown>(), TypeId::of::<DroppedPayloads>()];
        let present = cx
            .keys
            .iter()
            .filter(|key| !internal.contains(&SlotKey::type_id(key)) && key.holds(cx.id))
            .map(SlotKey::type_name)
            .collect();
        Some(DiagnosticInfo {
            id: cx.id,
            unwound: cx.unwound(),
            present,
            dropped: slot::value::<DroppedPayloads>(cx.id),
        })
    }
}

impl AlwaysSatisfied for DiagnosticInfo {}

/// The argument list of a handler, written as a tuple of [`Extract`] types.
pub trait ExtractArgs: Sized + 'static {
    /// `true` if every argument is always satisfied.
    const ALWAYS_SATISFIED: bool;

    /// Adds the slot keys of every argument.
    fn declare(keys: &mut SlotKeys);

    /// Adds the payload types moved by the arguments.
    fn moves(moved: &mut Vec<(TypeId, &'static str)>);

    /// Whether every argument can be produced.
    fn is_satisfied(cx: &DispatchContext<'_>) -> bool;

    /// Produces every argument, the moving ones last.
    fn extract(cx: &DispatchContext<'_>) -> Option<Self>;
}

/// An argument list that only contains [`AlwaysSatisfied`] extractors.
pub trait CatchAllArgs: ExtractArgs {}

macro_rules! impl_extract_args {
    ($($t:ident $i:tt),*) => {
        #[allow(unused_variables)]
        impl<$($t: Extract),*> ExtractArgs for ($($t,)*) {
            const ALWAYS_SATISFIED: bool = true $(&& $t::ALWAYS_SATISFIED)*;

            fn declare(keys: &mut SlotKeys) {
                $($t::declare(keys);)*
            }

            fn moves(moved: &mut Vec<(TypeId, &'static str)>) {
                $($t::moves(moved);)*
            }

            fn is_satisfied(cx: &DispatchContext<'_>) -> bool {
                true $(&& $t::is_satisfied(cx))*
            }

            #[allow(unused_mut)]
            fn extract(cx: &DispatchContext<'_>) -> Option<Self> {
                let mut args = ($(None::<$t>,)*);
                $(if !$t::MOVES {
                    args.$i = Some($t::extract(cx)?);
                })*
                $(if $t::MOVES {
                    args.$i = Some($t::extract(cx)?);
                })*
                Some(($(args.$i?,)*))
            }
        }

        impl<$($t: AlwaysSatisfied),*> CatchAllArgs for ($($t,)*) {}
    };
}

for_each_tuple!(impl_extract_args);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Scope, put_payload};

    #[derive(Clone, Debug, PartialEq)]
    struct Code(i32);

    fn keys_of<A: ExtractArgs>() -> SlotKeys {
        let mut keys = SlotKeys::new();
        A::declare(&mut keys);
        keys
    }

    #[test]
    fn test_declared_keys() {
        let keys = keys_of::<(Payload<Code>, Option<Peek<u8>>, ErrorInfo, Caught<i32>)>();
        assert!(keys.contains::<Code>());
        assert!(keys.contains::<u8>());
        assert!(keys.contains::<Thrown>());
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn test_always_satisfied_flags() {
        assert!(<(ErrorInfo, Option<Payload<Code>>)>::ALWAYS_SATISFIED);
        assert!(<()>::ALWAYS_SATISFIED);
        assert!(!<(ErrorInfo, Peek<Code>)>::ALWAYS_SATISFIED);
        static_assertions::assert_impl_all!((ErrorInfo, DiagnosticInfo, Option<Peek<Code>>): CatchAllArgs);
        static_assertions::assert_not_impl_any!((Payload<Code>,): CatchAllArgs);
    }

    #[test]
    fn test_peek_leaves_payload_move_takes_it() {
        let keys = keys_of::<(Payload<Code>,)>();
        let _scope = Scope::new(keys.clone()).activate();
        let id = ErrorId::new();
        put_payload(Code(4), id);
        let cx = DispatchContext::new(id, &keys);
        assert!(<(Peek<Code>,)>::is_satisfied(&cx));
        assert_eq!(Peek::<Code>::extract(&cx), Some(Peek(Code(4))));
        assert_eq!(Payload::<Code>::extract(&cx), Some(Payload(Code(4))));
        assert!(!Payload::<Code>::is_satisfied(&cx));
        assert_eq!(Option::<Payload<Code>>::extract(&cx), Some(None));
    }

    #[test]
    fn test_other_failure_is_invisible() {
        let keys = keys_of::<(Payload<Code>,)>();
        let _scope = Scope::new(keys.clone()).activate();
        let recorded = ErrorId::new();
        put_payload(Code(1), recorded);
        let other = ErrorId::new();
        let cx = DispatchContext::new(other, &keys);
        assert!(!Payload::<Code>::is_satisfied(&cx));
        assert!(!ErrorInfo::extract(&cx).unwrap().unwound());
    }

    #[test]
    fn test_caught_and_panic_message() {
        let keys = keys_of::<(Caught<i32>, PanicMessage)>();
        let _scope = Scope::new(keys.clone()).activate();
        let id = ErrorId::new();
        put_payload(Thrown(alloc::boxed::Box::new("boom")), id);
        let cx = DispatchContext::new(id, &keys);
        assert!(cx.unwound());
        assert!(!Caught::<i32>::is_satisfied(&cx));
        assert_eq!(
            PanicMessage::extract(&cx),
            Some(PanicMessage(String::from("boom")))
        );
        assert!(Caught::<&'static str>::is_satisfied(&cx));
        assert_eq!(Caught::<&'static str>::extract(&cx).map(Caught::into_inner), Some("boom"));
        assert!(!cx.unwound());
    }

    #[test]
    fn test_reads_happen_before_moves() {
        let keys = keys_of::<(Payload<Code>, Caught<i32>)>();
        let _scope = Scope::new(keys.clone()).activate();
        let id = ErrorId::new();
        put_payload(Code(6), id);
        let cx = DispatchContext::new(id, &keys);
        assert!(<(Payload<Code>, Peek<Code>)>::is_satisfied(&cx));
        let (taken, read) = <(Payload<Code>, Peek<Code>)>::extract(&cx).unwrap();
        assert_eq!(taken, Payload(Code(6)));
        assert_eq!(read, Peek(Code(6)));
        assert!(!slot::has_value::<Code>(id));

        let thrown = ErrorId::new();
        put_payload(Thrown(alloc::boxed::Box::new("boom")), thrown);
        let cx = DispatchContext::new(thrown, &keys);
        let (caught, message, info) =
            <(Caught<&'static str>, PanicMessage, ErrorInfo)>::extract(&cx).unwrap();
        assert_eq!(caught.into_inner(), "boom");
        assert_eq!(message.as_str(), "boom");
        assert!(info.unwound());
    }
}
