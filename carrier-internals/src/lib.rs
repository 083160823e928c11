#![forbid(
    missing_docs,
    unsafe_code,
    clippy::alloc_instead_of_core,
    clippy::std_instead_of_alloc,
    clippy::missing_docs_in_private_items,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    unused_doc_comments
)]
#![allow(rustdoc::private_intra_doc_links)]
//! Internal implementation crate for [`carrier`].
//!
//! # Overview
//!
//! This crate contains the thread-scoped storage that [`carrier`] uses to
//! carry payload values from the place a failure is detected to the place it
//! is handled. It is the only part of the system that touches thread-local
//! storage.
//!
//! **This crate is an implementation detail.** No semantic versioning guarantees
//! are provided. Users should depend on the [`carrier`] crate, not this one.
//!
//! # Architecture
//!
//! - **[`stack`]**: Per-type storage
//!   - [`SlotFrame`]: At most one `(id, value)` pair, owned by one scope
//!   - [`SlotStack`]: Strictly nested frames for one payload type
//!   - [`Closed`]: What happened to a frame's value when its scope closed
//!
//! - **[`registry`]**: The thread-scoped map from payload type to its
//!   [`SlotStack`], with typed free functions for every operation.
//!
//! - **[`token`]**: [`ScopeToken`], naming the scope that owns a frame.
//!
//! Failure ids are plain [`NonZeroU32`] values here. The tagging scheme that
//! makes them recognisable lives in [`carrier`].
//!
//! # Safety Strategy
//!
//! The crate contains no `unsafe` code. Type erasure is done with
//! `Rc<dyn Any>` and checked downcasts; reentrancy is ruled out by never
//! running foreign code while a `RefCell` is borrowed (see [`registry`]).
//!
//! [`carrier`]: https://docs.rs/carrier/latest/carrier/
//! [`NonZeroU32`]: core::num::NonZeroU32

extern crate alloc;

pub mod registry;
mod stack;
mod token;

pub use stack::{Closed, SlotFrame, SlotStack};
pub use token::ScopeToken;
