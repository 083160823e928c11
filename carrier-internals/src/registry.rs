//! Thread-scoped, type-keyed storage of [`SlotStack`]s.
//!
//! Rust has no generic statics, so the "one thread-local per payload type"
//! primitive is built from a single thread-local map from [`TypeId`] to a
//! shared, type-erased stack. Typed access goes through a safe downcast.
//!
//! # Borrowing discipline
//!
//! Every function here borrows the map only long enough to clone out the
//! `Rc` of one stack, and borrows that stack only for the duration of a
//! non-reentrant operation. No payload destructor and no caller-supplied
//! closure runs while a borrow is held:
//!
//! - values that are replaced or discarded are returned to the caller,
//! - [`with_value`] moves the value out of its frame, runs the closure, and
//!   moves it back, also when the closure panics.
//!
//! As a consequence the `RefCell` borrows below cannot fail.
//!
//! # Thread teardown
//!
//! Once the thread-local map has been destroyed (during thread exit),
//! every operation behaves as if no frame of any type were open: `open`
//! reports depth 0, `put` hands the value back, queries return nothing.

use alloc::rc::Rc;
use core::{
    any::{Any, TypeId},
    cell::RefCell,
    num::NonZeroU32,
};

use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;

use crate::{
    stack::{Closed, SlotStack},
    token::ScopeToken,
};

/// The per-thread map. Values are always `RefCell<SlotStack<T>>` for the `T`
/// whose `TypeId` is the key.
type StackMap = HashMap<TypeId, Rc<dyn Any>, FxBuildHasher>;

std::thread_local! {
    /// This thread's stacks, one per payload type ever opened.
    static STACKS: RefCell<StackMap> = RefCell::new(StackMap::default());
}

/// Shared handle to the stack of one payload type.
type StackRef<T> = Rc<RefCell<SlotStack<T>>>;

/// Fetches the stack for `T`, creating it when `create` is set.
fn stack<T: 'static>(create: bool) -> Option<StackRef<T>> {
    STACKS
        .try_with(|stacks| {
            let mut stacks = stacks.borrow_mut();
            let erased = match stacks.get(&TypeId::of::<T>()) {
                Some(erased) => Rc::clone(erased),
                None if create => {
                    let erased: Rc<dyn Any> = Rc::new(RefCell::new(SlotStack::<T>::new()));
                    stacks.insert(TypeId::of::<T>(), Rc::clone(&erased));
                    erased
                }
                None => return None,
            };
            erased.downcast::<RefCell<SlotStack<T>>>().ok()
        })
        .ok()
        .flatten()
}

/// Opens `T` for `owner` and returns the resulting depth of `T`'s stack.
///
/// See [`SlotStack::open`].
pub fn open<T: 'static>(owner: ScopeToken) -> usize {
    stack::<T>(true).map_or(0, |stack| stack.borrow_mut().open(owner))
}

/// Closes one reference of `owner` to `T`.
///
/// See [`SlotStack::close`]. Any value in the result must be dropped by the
/// caller.
pub fn close<T: 'static>(owner: ScopeToken) -> Closed<T> {
    stack::<T>(false).map_or(Closed::NotOpen, |stack| stack.borrow_mut().close(owner))
}

/// Stores `value` for failure `id` in the innermost open frame of `T`.
///
/// Returns the value that was overwritten, or gives `value` back as `Err`
/// when no scope has `T` open.
pub fn put<T: 'static>(id: NonZeroU32, value: T) -> Result<Option<T>, T> {
    match stack::<T>(false) {
        Some(stack) => stack.borrow_mut().put(id, value),
        None => Err(value),
    }
}

/// Returns `true` if some scope on this thread has `T` open.
#[must_use]
pub fn is_open<T: 'static>() -> bool {
    stack::<T>(false).is_some_and(|stack| stack.borrow().is_open())
}

/// Number of scopes on this thread that have `T` open.
#[must_use]
pub fn depth<T: 'static>() -> usize {
    stack::<T>(false).map_or(0, |stack| stack.borrow().depth())
}

/// Id of the value in the innermost frame of `T`, if it holds one.
#[must_use]
pub fn top_id<T: 'static>() -> Option<NonZeroU32> {
    stack::<T>(false)?.borrow().top()?.id()
}

/// Returns `true` if the innermost frame of `T` holds a value tagged `id`.
#[must_use]
pub fn has_value<T: 'static>(id: NonZeroU32) -> bool {
    top_id::<T>() == Some(id)
}

/// Moves the value tagged `id` out of the innermost frame of `T`.
pub fn extract<T: 'static>(id: NonZeroU32) -> Option<T> {
    stack::<T>(false)?.borrow_mut().top_mut()?.take_if(id)
}

/// Runs `f` on the value tagged `id` in the innermost frame of `T`.
///
/// The value is moved out of its frame while `f` runs, so `f` may freely use
/// the registry. If `f` stored a new value of `T` into the same frame in the
/// meantime, that newer value wins and the borrowed one is returned to the
/// caller's scope to be dropped. The value goes back to its frame even if
/// `f` panics.
pub fn with_value<T: 'static, R>(id: NonZeroU32, f: impl FnOnce(&T) -> R) -> Option<R> {
    let stack = stack::<T>(false)?;
    let (owner, value) = {
        let mut stack = stack.borrow_mut();
        let top = stack.top_mut()?;
        (top.owner(), top.take_if(id)?)
    };

    let lent = Lent {
        stack: &stack,
        owner,
        id,
        value: Some(value),
    };
    lent.value.as_ref().map(f)
}

/// A value moved out of its frame by [`with_value`], put back on drop.
struct Lent<'a, T: 'static> {
    stack: &'a StackRef<T>,
    owner: ScopeToken,
    id: NonZeroU32,
    value: Option<T>,
}

impl<T: 'static> Drop for Lent<'_, T> {
    fn drop(&mut self) {
        let Some(value) = self.value.take() else {
            return;
        };
        let leftover = {
            let mut stack = self.stack.borrow_mut();
            match stack.frame_mut(self.owner) {
                Some(frame) if frame.get().is_none() => {
                    frame.set(self.id, value);
                    None
                }
                _ => Some(value),
            }
        };
        drop(leftover);
    }
}

/// Runs `f` on the innermost frame's pair, allowing it to be replaced.
///
/// `f` receives the current pair (if any) and returns the new pair to store.
/// This is meant for bookkeeping types owned by the library itself; `f` runs
/// while `T`'s stack is borrowed and must not touch the registry for `T`.
/// Returns `false` if `T` is not open. Any value displaced is dropped after
/// the borrow is released.
pub fn update_top<T: 'static>(
    f: impl FnOnce(Option<(NonZeroU32, T)>) -> Option<(NonZeroU32, T)>,
) -> bool {
    let Some(stack) = stack::<T>(false) else {
        return false;
    };
    let displaced = {
        let mut stack = stack.borrow_mut();
        let Some(top) = stack.top_mut() else {
            return false;
        };
        match f(top.take()) {
            Some((id, value)) => top.set(id, value),
            None => None,
        }
    };
    drop(displaced);
    true
}

/// Number of distinct payload types this thread has ever opened.
#[must_use]
pub fn registered_types() -> usize {
    STACKS
        .try_with(|stacks| stacks.borrow().len())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u32) -> NonZeroU32 {
        NonZeroU32::new(raw).unwrap()
    }

    #[derive(Debug)]
    struct Local(#[allow(dead_code)] u32);

    #[test]
    fn test_put_requires_open_frame() {
        assert!(put(id(1), Local(1)).is_err());
        let owner = ScopeToken::next();
        assert_eq!(open::<Local>(owner), 1);
        assert!(put(id(1), Local(1)).unwrap().is_none());
        assert!(has_value::<Local>(id(1)));
        assert!(!has_value::<Local>(id(5)));
        assert!(matches!(close::<Local>(owner), Closed::Discarded { .. }));
        assert!(!is_open::<Local>());
    }

    #[test]
    fn test_with_value_allows_reentrant_put() {
        let owner = ScopeToken::next();
        open::<u64>(owner);
        let _ = put(id(5), 1_u64);

        let seen = with_value::<u64, _>(id(5), |value| {
            let _ = put(id(5), value + 1);
            *value
        });
        assert_eq!(seen, Some(1));
        assert_eq!(extract::<u64>(id(5)), Some(2));
        let _ = close::<u64>(owner);
    }

    #[test]
    fn test_update_top() {
        let owner = ScopeToken::next();
        assert!(!update_top::<i16>(|pair| pair));
        open::<i16>(owner);
        assert!(update_top::<i16>(|pair| {
            assert!(pair.is_none());
            Some((id(9), 3))
        }));
        assert_eq!(top_id::<i16>(), Some(id(9)));
        let _ = close::<i16>(owner);
    }

    #[test]
    fn test_registry_is_thread_scoped() {
        let owner = ScopeToken::next();
        open::<i8>(owner);
        let _ = put(id(1), 7_i8);
        std::thread::spawn(|| {
            assert!(!is_open::<i8>());
            assert!(put(id(1), 8_i8).is_err());
        })
        .join()
        .unwrap();
        assert_eq!(extract::<i8>(id(1)), Some(7));
        let _ = close::<i8>(owner);
    }
}
