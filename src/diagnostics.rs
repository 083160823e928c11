//! Diagnostics for payloads that nobody was waiting for.
//!
//! Recording a payload whose type no scope has open is not an error: the
//! value is simply dropped. While debugging it can still be useful to know
//! that it happened. When a handler taking [`DiagnosticInfo`] is part of an
//! active handling block, and diagnostics are enabled in the installed
//! [`Config`](crate::config::Config), every such dropped payload is counted
//! against the failure it belonged to. Only the name of the first dropped type
//! and the count are kept, so memory use does not grow with the number of
//! dropped payloads.
//!
//! # Examples
//!
//! ```
//! use carrier::{DiagnosticInfo, HandlerList, new_error, try_handle_all};
//!
//! struct Unexpected(&'static str);
//!
//! let report = try_handle_all(
//!     || -> Result<String, _> { Err(new_error((Unexpected("surprise"),))) },
//!     HandlerList::new().otherwise(|info: DiagnosticInfo| info.to_string()),
//! );
//! assert!(report.contains("Unexpected"));
//! ```

use alloc::vec::Vec;
use core::{cell::Cell, fmt};

use carrier_internals::registry;

use crate::{ErrorId, config::Config, slot::SlotKey};

std::thread_local! {
    /// Number of active scopes on this thread that asked for the tally.
    static TALLY_ENABLED: Cell<usize> = const { Cell::new(0) };
}

pub(crate) fn enable_tally() {
    let _ = TALLY_ENABLED.try_with(|count| count.set(count.get() + 1));
}

pub(crate) fn disable_tally() {
    let _ = TALLY_ENABLED.try_with(|count| count.set(count.get().saturating_sub(1)));
}

/// Returns `true` if dropped payloads are currently being tallied on this
/// thread.
#[must_use]
pub fn tally_enabled() -> bool {
    Config::current().diagnostics_enabled() && TALLY_ENABLED.try_with(Cell::get).unwrap_or(0) > 0
}

/// The slot key of the tally, which also switches the tally on for the scope
/// that opens it.
pub(crate) fn tally_key() -> SlotKey {
    SlotKey::of::<DroppedPayloads>().with_tally()
}

/// Counts a payload of type `T` recorded for `id` that found no open slot.
pub(crate) fn record_dropped<T: 'static>(id: ErrorId) {
    let type_name = core::any::type_name::<T>();
    tracing::trace!(
        target: "carrier",
        payload = type_name,
        %id,
        "dropped payload, no open slot"
    );
    if !tally_enabled() {
        return;
    }
    registry::update_top::<DroppedPayloads>(|pair| match pair {
        Some((raw, mut tally)) if raw == id.raw() => {
            tally.count += 1;
            Some((raw, tally))
        }
        _ => Some((
            id.raw(),
            DroppedPayloads {
                first_type: type_name,
                count: 1,
            },
        )),
    });
}

/// Tally of the payloads dropped for one failure.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DroppedPayloads {
    first_type: &'static str,
    count: usize,
}

impl DroppedPayloads {
    /// Name of the first payload type that was dropped.
    #[must_use]
    pub fn first_type(&self) -> &'static str {
        self.first_type
    }

    /// Number of payloads dropped.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }
}

impl fmt::Display for DroppedPayloads {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} unexpected payload", self.count)?;
        if self.count != 1 {
            write!(f, "s")?;
        }
        write!(f, " dropped, first of type {}", self.first_type)
    }
}

/// Everything known about a failure, for the handler of last resort.
///
/// Taking `DiagnosticInfo` never makes a handler fail to match. Its presence
/// in a handler list enables the dropped-payload tally for that handling
/// block.
#[derive(Clone, Debug)]
pub struct DiagnosticInfo {
    pub(crate) id: ErrorId,
    pub(crate) unwound: bool,
    pub(crate) present: Vec<&'static str>,
    pub(crate) dropped: Option<DroppedPayloads>,
}

impl DiagnosticInfo {
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

    /// Names of the payload types of the handling block that hold a value for
    /// this failure.
    #[must_use]
    pub fn present_types(&self) -> &[&'static str] {
        &self.present
    }

    /// Payloads recorded for this failure that no scope was waiting for.
    #[must_use]
    pub fn dropped(&self) -> Option<DroppedPayloads> {
        self.dropped
    }
}

impl fmt::Display for DiagnosticInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)?;
        if self.unwound {
            write!(f, " (unwound)")?;
        }
        if !self.present.is_empty() {
            write!(f, "\npayloads: {}", self.present.join(", "))?;
        }
        if let Some(dropped) = &self.dropped {
            write!(f, "\n{dropped}")?;
        }
        Ok(())
    }
}
