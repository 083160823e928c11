//! Commonly used items for convenient importing.
//!
//! # Usage
//!
//! ```rust
//! use carrier::prelude::*;
//!
//! struct Code(i32);
//!
//! fn check(value: i32) -> Result<i32, ErrorId> {
//!     if value < 0 {
//!         return Err(new_error((Code(value),)));
//!     }
//!     Ok(value)
//! }
//!
//! let value = try_handle_all(
//!     || check(-4),
//!     HandlerList::new()
//!         .on(|code: Payload<Code>| code.0.0.abs())
//!         .otherwise(|| 0),
//! );
//! assert_eq!(value, 4);
//! ```
//!
//! # What's Included
//!
//! - **[`ErrorId`]**, **[`new_error`]**, **[`raise`]**: Signalling failures
//! - **[`on_error`]** and **[`on_error_with`]**: Deferred context
//! - **[`HandlerList`]** and **[`handler`]**: Building handlers
//! - **[`Payload`]**, **[`Peek`]**, **[`Caught`]**, **[`ErrorInfo`]**,
//!   **[`DiagnosticInfo`]**: Handler arguments
//! - The handling blocks [`try_handle_all`], [`try_handle_some`],
//!   [`try_catch`] and [`try_catch_result`]

pub use crate::{
    Caught, DiagnosticInfo, ErrorId, ErrorInfo, HandlerList, PanicMessage, Payload, Peek,
    handler, new_error, on_error, on_error_with, raise, try_catch, try_catch_result,
    try_handle_all, try_handle_some,
};
