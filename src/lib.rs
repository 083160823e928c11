#![deny(
    missing_docs,
    clippy::alloc_instead_of_core,
    clippy::std_instead_of_alloc,
    clippy::std_instead_of_core,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]
#![forbid(unsafe_code)]
// Extra checks on nightly
#![cfg_attr(nightly_extra_checks, feature(rustdoc_missing_doc_code_examples))]
#![cfg_attr(nightly_extra_checks, forbid(rustdoc::missing_doc_code_examples))]
// Make docs.rs generate better docs
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Typed failure payloads, carried from where a failure is detected to where
//! it is handled.
//!
//! ## Overview
//!
//! A function that fails rarely knows everything the code handling the
//! failure would like to know, and the code handling it rarely wants to know
//! about every type of detail every callee could produce. This crate
//! decouples the two. A failure is named by a small [`ErrorId`]; diagnostic
//! values ("payloads") are recorded for it at any depth of the call stack;
//! and a handling block further up receives exactly the payloads its
//! handlers ask for.
//!
//! Payloads do not travel inside the error value. Each handling block opens a
//! thread-scoped slot for every payload type one of its handlers reads. A
//! payload recorded while such a slot is open lands in the innermost one, in
//! constant time no matter how deep the stack is. A payload nobody opened a
//! slot for is dropped immediately.
//!
//! ## Quick Example
//!
//! ```
//! use carrier::{ErrorId, ErrorInfo, HandlerList, Payload, new_error, on_error, try_handle_all};
//!
//! #[derive(Debug)]
//! struct Errno(i32);
//! #[derive(Debug)]
//! struct Path(String);
//!
//! fn read_config(path: &str) -> Result<String, ErrorId> {
//!     let _context = on_error((Path(path.to_owned()),));
//!     Err(new_error((Errno(2),)))
//! }
//!
//! let message = try_handle_all(
//!     || read_config("/etc/app.toml"),
//!     HandlerList::new()
//!         .on(|errno: Payload<Errno>, path: Payload<Path>| {
//!             format!("{}: errno {}", path.0.0, errno.0.0)
//!         })
//!         .on(|errno: Payload<Errno>| format!("errno {}", errno.0.0))
//!         .otherwise(|info: ErrorInfo| format!("unknown {info}")),
//! );
//! assert_eq!(message, "/etc/app.toml: errno 2");
//! ```
//!
//! ## Core Concepts
//!
//! - **Failures** are identified by [`ErrorId`]. Return them as
//!   `Err(ErrorId)`, or unwind with them using [`raise`].
//! - **Payloads** are any `'static` values. Record them with [`new_error`],
//!   [`put_payload`], [`ErrorId::load`], or attach them to whatever failure
//!   passes by with the [`on_error`] and [`on_error_with`] guards.
//! - **Scopes** declare interest in payload types. The handling blocks
//!   activate them for you; see [`scope`] to do it by hand. When a scope
//!   closes, a payload it still holds moves to the next enclosing scope of
//!   the same type.
//! - **Handlers** are closures whose argument types ([`Payload`], [`Peek`],
//!   [`Caught`], [`ErrorInfo`], [`DiagnosticInfo`], ...) say what they need.
//!   A [`HandlerList`] picks the first handler whose needs are met, in
//!   declaration order.
//! - **Handling blocks**: [`try_handle_all`] and [`try_catch`] always produce
//!   a value, [`try_handle_some`] hands unmatched failures back, and
//!   [`try_catch_result`] handles both failure styles at once.
//!
//! Payload slots are per thread. To hand a failure to another thread, use
//! [`try_capture`] and [`Captured::replay`].
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events with target `carrier`: trace events
//! when scopes open and close and when payloads are propagated or dropped,
//! and a debug event naming the selected handler. It never installs a
//! subscriber.
//!
//! For implementation details of the slot storage, see the
//! [`carrier-internals`] crate.
//!
//! [`carrier-internals`]: carrier_internals

extern crate alloc;

#[macro_use]
mod macros;

pub mod capture;
pub mod config;
pub mod diagnostics;
pub mod dispatch;
pub mod extract;
pub mod handler;
pub mod prelude;
pub mod record;
pub mod scope;
pub mod slot;
pub mod unwind;

mod id;

pub use carrier_internals::ScopeToken;

pub use self::{
    capture::{Captured, try_capture},
    diagnostics::{DiagnosticInfo, DroppedPayloads},
    dispatch::{
        DispatchOutcome, HandlerList, HandlerListError, HandlerSet, try_catch, try_catch_result,
        try_handle_all, try_handle_some,
    },
    extract::{Caught, ErrorInfo, PanicMessage, Payload, Peek},
    handler::{Handler, handler},
    id::ErrorId,
    record::{OnError, Payloads, new_error, on_error, on_error_with, put_payload},
    scope::{ActiveScope, Scope},
    unwind::{Unwound, raise},
};
