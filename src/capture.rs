//! Moving a failure to another thread.
//!
//! Payload slots are thread-scoped, so a failure signalled on a worker
//! thread cannot be handled on the thread that joins it directly.
//! [`try_capture`] runs a body with slots for a fixed list of `Send` payload
//! types open and, if the body fails, packages the recorded values into a
//! [`Captured`]. On the receiving thread, [`Captured::replay`] records the
//! values again under the same [`ErrorId`], where the local handlers pick
//! them up.
//!
//! # Examples
//!
//! ```
//! use carrier::{ErrorId, HandlerList, Payload, new_error, try_capture, try_handle_all};
//!
//! struct Row(usize);
//!
//! let worker = std::thread::spawn(|| {
//!     try_capture::<(Row,), _, _>(|| -> Result<(), ErrorId> { Err(new_error((Row(42),))) })
//! });
//! let captured = worker.join().unwrap().unwrap_err();
//!
//! let row = try_handle_all(
//!     || Err(captured.replay()),
//!     HandlerList::new()
//!         .on(|row: Payload<Row>| row.0.0)
//!         .otherwise(|| 0),
//! );
//! assert_eq!(row, 42);
//! ```

use alloc::{boxed::Box, vec::Vec};
use core::fmt;

use crate::{ErrorId, Scope, put_payload, scope::SlotTypes, slot};

/// A list of `Send` payload types captured by [`try_capture`], written as a
/// tuple.
pub trait CaptureSet: SlotTypes {
    /// Moves the values of every listed type recorded for `id` out of their
    /// slots.
    #[doc(hidden)]
    fn capture(id: ErrorId, values: &mut Vec<Box<dyn Replay>>);
}

/// A value waiting to be recorded on another thread.
#[doc(hidden)]
pub trait Replay: Send {
    /// Records the value for `id` on the current thread.
    fn replay(self: Box<Self>, id: ErrorId);

    /// The name of the value's type.
    fn type_name(&self) -> &'static str;
}

struct Value<T>(T);

impl<T: Send + 'static> Replay for Value<T> {
    fn replay(self: Box<Self>, id: ErrorId) {
        put_payload(self.0, id);
    }

    fn type_name(&self) -> &'static str {
        core::any::type_name::<T>()
    }
}

fn capture_one<T: Send + 'static>(id: ErrorId, values: &mut Vec<Box<dyn Replay>>) {
    if let Some(value) = slot::extract_value::<T>(id) {
        values.push(Box::new(Value(value)));
    }
}

macro_rules! impl_capture_set {
    ($($t:ident $i:tt),*) => {
        impl<$($t: Send + 'static),*> CaptureSet for ($($t,)*) {
            #[allow(unused_variables)]
            fn capture(id: ErrorId, values: &mut Vec<Box<dyn Replay>>) {
                $(capture_one::<$t>(id, values);)*
            }
        }
    };
}

for_each_tuple!(impl_capture_set);

/// A failure and its payloads, ready to be sent to another thread.
#[must_use = "the payloads are lost unless the failure is replayed"]
pub struct Captured {
    id: ErrorId,
    values: Vec<Box<dyn Replay>>,
}

impl Captured {
    /// The captured failure.
    #[must_use]
    pub fn id(&self) -> ErrorId {
        self.id
    }

    /// Number of captured payloads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if no payload was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Names of the captured payload types.
    pub fn type_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.values.iter().map(|value| value.type_name())
    }

    /// Records the captured payloads in the current thread's open slots and
    /// returns the failure, ready to be returned as `Err`.
    pub fn replay(self) -> ErrorId {
        tracing::trace!(
            target: "carrier",
            id = %self.id,
            payloads = self.values.len(),
            "replaying captured failure"
        );
        for value in self.values {
            value.replay(self.id);
        }
        self.id
    }
}

impl fmt::Debug for Captured {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Captured")
            .field("id", &self.id)
            .field("payloads", &DebugNames(self))
            .finish()
    }
}

struct DebugNames<'a>(&'a Captured);

impl fmt::Debug for DebugNames<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.type_names()).finish()
    }
}

impl fmt::Display for Captured {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "captured {} with {} payload(s)", self.id, self.values.len())
    }
}

impl core::error::Error for Captured {}

/// Runs `body` with slots for the payload types `K` open, capturing a failure
/// it returns together with its payloads of those types.
pub fn try_capture<K, T, B>(body: B) -> Result<T, Captured>
where
    K: CaptureSet,
    B: FnOnce() -> Result<T, ErrorId>,
{
    let _scope = Scope::of::<K>().activate();
    body().map_err(|id| {
        let mut values = Vec::new();
        K::capture(id, &mut values);
        Captured { id, values }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::new_error;

    #[derive(Clone, Debug, PartialEq)]
    struct Query(&'static str);
    #[derive(Clone, Debug, PartialEq)]
    struct Attempt(u32);

    #[test]
    fn test_capture_takes_only_listed_types() {
        let captured =
            try_capture::<(Query,), (), _>(|| Err(new_error((Query("select"), Attempt(1)))))
                .unwrap_err();
        assert_eq!(captured.len(), 1);
        assert!(captured.type_names().all(|name| name.ends_with("Query")));
    }

    #[test]
    fn test_replay_on_other_thread_keeps_id() {
        let captured = try_capture::<(Query, Attempt), (), _>(|| {
            Err(new_error((Query("insert"), Attempt(3))))
        })
        .unwrap_err();
        let id = captured.id();
        std::thread::spawn(move || {
            let _scope = Scope::of::<(Query, Attempt)>().activate();
            assert_eq!(captured.replay(), id);
            assert_eq!(slot::value::<Query>(id), Some(Query("insert")));
            assert_eq!(slot::value::<Attempt>(id), Some(Attempt(3)));
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_success_passes_through() {
        assert_eq!(try_capture::<(Query,), _, _>(|| Ok(7)).unwrap(), 7);
        assert!(!slot::is_open::<Query>());
    }

    #[test]
    fn test_captured_is_send() {
        static_assertions::assert_impl_all!(Captured: Send, core::error::Error);
    }
}
