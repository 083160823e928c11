//! Scope tokens naming the owner of a slot frame.

use core::{cell::Cell, num::NonZeroU64};

std::thread_local! {
    /// Last token handed out on this thread. Tokens never leave the thread
    /// that created them, so a thread-scoped counter is enough.
    static LAST_TOKEN: Cell<u64> = const { Cell::new(0) };
}

/// Identifies one activation of a scope on the current thread.
///
/// Every [`SlotFrame`](crate::SlotFrame) remembers the token of the scope
/// that opened it. This lets a scope that declares interest in the same type
/// more than once share a single frame, and lets a close find its own frame
/// even when scopes are released out of order.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ScopeToken(NonZeroU64);

impl ScopeToken {
    /// Allocates a token that is unique on the current thread.
    ///
    /// If the thread-local counter is no longer available (the thread is being
    /// torn down), the returned token is [`ScopeToken::DETACHED`]. Frames can
    /// no longer be opened at that point anyway.
    #[must_use]
    pub fn next() -> Self {
        LAST_TOKEN
            .try_with(|last| {
                let next = last.get().wrapping_add(1).max(1);
                last.set(next);
                NonZeroU64::new(next)
            })
            .ok()
            .flatten()
            .map_or(Self::DETACHED, Self)
    }

    /// Token used when the thread-scoped storage is gone.
    pub const DETACHED: Self = Self(NonZeroU64::MAX);

    /// Returns the raw value of the token.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_distinct() {
        let a = ScopeToken::next();
        let b = ScopeToken::next();
        assert_ne!(a, b);
        assert!(b.get() > a.get());
    }

    #[test]
    fn test_token_traits() {
        static_assertions::assert_impl_all!(ScopeToken: Copy, Send, Sync, Eq, core::hash::Hash);
    }
}
