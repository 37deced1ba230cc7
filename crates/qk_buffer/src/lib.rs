#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![no_std]

// -----------------------------------------------------------------------------
// No STD Support

extern crate alloc;

// -----------------------------------------------------------------------------
// Modules

mod error;
mod layout;
mod raw;
mod typed;

// -----------------------------------------------------------------------------
// Top-level exports

pub use error::BufferError;
pub use layout::{ElemLayout, MIN_ALIGN};
pub use raw::RawBuffer;
pub use typed::TypedBuffer;

/// Capacity of buffers created by `new`.
pub const DEFAULT_CAPACITY: usize = 10;
