//! Per-type nesting stacks of slot frames.
//!
//! A [`SlotStack<T>`] holds one [`SlotFrame<T>`] for every scope that
//! currently declares interest in payloads of type `T`, innermost last. The
//! stack itself knows nothing about threads; the [`registry`] module keeps one
//! stack per type in thread-scoped storage.
//!
//! None of the methods here drop a payload value. Values that leave the stack
//! (replaced, discarded) are handed back to the caller so that their
//! destructors can run after any borrow of the stack has been released.
//!
//! [`registry`]: crate::registry

use alloc::vec::Vec;
use core::num::NonZeroU32;

use crate::token::ScopeToken;

/// Storage for at most one payload value of type `T`, tagged with the id of
/// the failure it belongs to.
pub struct SlotFrame<T> {
    /// Scope that opened the frame.
    owner: ScopeToken,
    /// Number of times the owner opened this type without closing it yet.
    refs: usize,
    /// The payload together with the raw id of its failure.
    value: Option<(NonZeroU32, T)>,
}

impl<T> SlotFrame<T> {
    /// Creates an empty frame owned by `owner`.
    const fn new(owner: ScopeToken) -> Self {
        Self {
            owner,
            refs: 1,
            value: None,
        }
    }

    /// Returns the scope that owns this frame.
    #[must_use]
    pub fn owner(&self) -> ScopeToken {
        self.owner
    }

    /// Returns the id the current value is tagged with, if there is a value.
    #[must_use]
    pub fn id(&self) -> Option<NonZeroU32> {
        self.value.as_ref().map(|(id, _)| *id)
    }

    /// Returns `true` if the frame holds a value tagged with `id`.
    #[must_use]
    pub fn holds(&self, id: NonZeroU32) -> bool {
        self.id() == Some(id)
    }

    /// Returns the stored pair, if any.
    #[must_use]
    pub fn get(&self) -> Option<(NonZeroU32, &T)> {
        self.value.as_ref().map(|(id, value)| (*id, value))
    }

    /// Returns the stored pair with mutable access to the value, if any.
    pub fn get_mut(&mut self) -> Option<(NonZeroU32, &mut T)> {
        self.value.as_mut().map(|(id, value)| (*id, value))
    }

    /// Stores `(id, value)`, returning the value it replaced.
    pub fn set(&mut self, id: NonZeroU32, value: T) -> Option<T> {
        self.value.replace((id, value)).map(|(_, previous)| previous)
    }

    /// Removes and returns the stored pair.
    pub fn take(&mut self) -> Option<(NonZeroU32, T)> {
        self.value.take()
    }

    /// Removes and returns the value only if it is tagged with `id`.
    pub fn take_if(&mut self, id: NonZeroU32) -> Option<T> {
        if self.holds(id) {
            self.value.take().map(|(_, value)| value)
        } else {
            None
        }
    }
}

impl<T> core::fmt::Debug for SlotFrame<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SlotFrame")
            .field("type", &core::any::type_name::<T>())
            .field("owner", &self.owner)
            .field("refs", &self.refs)
            .field("id", &self.id())
            .finish()
    }
}

/// Result of closing one reference to a frame.
#[derive(Debug)]
#[must_use]
pub enum Closed<T> {
    /// The owner still holds other references; the frame stays.
    Retained,
    /// The frame was removed and held no value.
    Released,
    /// The frame was removed and its value moved into the next-outer frame.
    Propagated {
        /// Id the propagated value is tagged with.
        id: NonZeroU32,
        /// Value the outer frame held before, which has been overwritten.
        replaced: Option<T>,
    },
    /// The frame was removed and there was no outer frame to receive its
    /// value.
    Discarded {
        /// Id the discarded value was tagged with.
        id: NonZeroU32,
        /// The discarded value.
        value: T,
    },
    /// The owner had no frame on this stack.
    NotOpen,
}

/// Strictly nested stack of [`SlotFrame<T>`], innermost scope last.
pub struct SlotStack<T> {
    /// Frames, outermost first.
    frames: Vec<SlotFrame<T>>,
}

impl<T> Default for SlotStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SlotStack<T> {
    /// Creates an empty stack.
    #[must_use]
    pub const fn new() -> Self {
        Self { frames: Vec::new() }
    }

    /// Number of open frames.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Returns `true` if some scope has this type open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.frames.is_empty()
    }

    /// The innermost frame.
    #[must_use]
    pub fn top(&self) -> Option<&SlotFrame<T>> {
        self.frames.last()
    }

    /// The innermost frame, mutably.
    pub fn top_mut(&mut self) -> Option<&mut SlotFrame<T>> {
        self.frames.last_mut()
    }

    /// The frame owned by `owner`, searching from the innermost frame out.
    pub fn frame_mut(&mut self, owner: ScopeToken) -> Option<&mut SlotFrame<T>> {
        self.frames.iter_mut().rev().find(|frame| frame.owner == owner)
    }

    /// Opens the type for `owner`.
    ///
    /// If the innermost frame already belongs to `owner`, its reference count
    /// is incremented; otherwise a new empty frame is pushed. Returns the
    /// resulting depth.
    pub fn open(&mut self, owner: ScopeToken) -> usize {
        match self.frames.last_mut() {
            Some(top) if top.owner == owner => top.refs += 1,
            _ => self.frames.push(SlotFrame::new(owner)),
        }
        self.frames.len()
    }

    /// Closes one reference held by `owner`.
    ///
    /// When the last reference goes away the frame is removed. A value it held
    /// moves into the frame directly beneath it (last write wins) or, if there
    /// is none, is returned as [`Closed::Discarded`].
    ///
    /// Owners are normally closed innermost first. If they are not, the
    /// owner's frame is removed from wherever it sits and the frame beneath it
    /// receives the value.
    pub fn close(&mut self, owner: ScopeToken) -> Closed<T> {
        let Some(index) = self.frames.iter().rposition(|frame| frame.owner == owner) else {
            return Closed::NotOpen;
        };

        let frame = &mut self.frames[index];
        frame.refs -= 1;
        if frame.refs > 0 {
            return Closed::Retained;
        }

        let frame = self.frames.remove(index);
        let Some((id, value)) = frame.value else {
            return Closed::Released;
        };

        match index.checked_sub(1).map(|outer| &mut self.frames[outer]) {
            Some(outer) => Closed::Propagated {
                id,
                replaced: outer.set(id, value),
            },
            None => Closed::Discarded { id, value },
        }
    }

    /// Stores `value` in the innermost frame, tagged with `id`.
    ///
    /// Returns the value previously held by that frame, or gives `value` back
    /// as `Err` if no frame is open.
    pub fn put(&mut self, id: NonZeroU32, value: T) -> Result<Option<T>, T> {
        match self.frames.last_mut() {
            Some(top) => Ok(top.set(id, value)),
            None => Err(value),
        }
    }
}

impl<T> core::fmt::Debug for SlotStack<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(&self.frames).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u32) -> NonZeroU32 {
        NonZeroU32::new(raw).unwrap()
    }

    #[test]
    fn test_open_shares_frame_for_same_owner() {
        let owner = ScopeToken::next();
        let mut stack = SlotStack::<u8>::new();
        assert_eq!(stack.open(owner), 1);
        assert_eq!(stack.open(owner), 1);
        assert!(matches!(stack.close(owner), Closed::Retained));
        assert!(stack.is_open());
        assert!(matches!(stack.close(owner), Closed::Released));
        assert!(!stack.is_open());
    }

    #[test]
    fn test_close_propagates_to_outer_frame() {
        let outer = ScopeToken::next();
        let inner = ScopeToken::next();
        let mut stack = SlotStack::<&str>::new();
        stack.open(outer);
        stack.open(inner);
        assert_eq!(stack.put(id(5), "inner").unwrap(), None);

        match stack.close(inner) {
            Closed::Propagated { id: moved, replaced } => {
                assert_eq!(moved, id(5));
                assert!(replaced.is_none());
            }
            other => panic!("unexpected close result: {other:?}"),
        }
        assert_eq!(stack.top().unwrap().get(), Some((id(5), &"inner")));

        match stack.close(outer) {
            Closed::Discarded { id: dropped, value } => {
                assert_eq!(dropped, id(5));
                assert_eq!(value, "inner");
            }
            other => panic!("unexpected close result: {other:?}"),
        }
    }

    #[test]
    fn test_put_without_frame_returns_value() {
        let mut stack = SlotStack::<String>::new();
        let value = stack.put(id(1), "lost".into()).unwrap_err();
        assert_eq!(value, "lost");
    }

    #[test]
    fn test_out_of_order_close() {
        let outer = ScopeToken::next();
        let middle = ScopeToken::next();
        let inner = ScopeToken::next();
        let mut stack = SlotStack::<u32>::new();
        stack.open(outer);
        stack.open(middle);
        stack.frame_mut(middle).unwrap().set(id(9), 90);
        stack.open(inner);

        assert!(matches!(stack.close(middle), Closed::Propagated { .. }));
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.frame_mut(outer).unwrap().get(), Some((id(9), &90)));
        assert_eq!(stack.top().unwrap().owner(), inner);
        assert!(matches!(stack.close(middle), Closed::NotOpen));
    }

    #[test]
    fn test_take_if_checks_id() {
        let owner = ScopeToken::next();
        let mut stack = SlotStack::<u32>::new();
        stack.open(owner);
        let _ = stack.put(id(5), 1);
        let top = stack.top_mut().unwrap();
        assert_eq!(top.take_if(id(9)), None);
        assert_eq!(top.take_if(id(5)), Some(1));
        assert!(top.get().is_none());
    }
}
