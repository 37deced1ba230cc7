//! Lifetime-carrying, type-erased views of a single buffer element.
//!
//! Untyped storage hands out element slots as pointers plus a byte size.
//! Compared to a bare `*const u8`, the wrappers here keep the borrow's
//! lifetime and the element size together, and check alignment and size
//! in debug builds before any typed access.
//!
//! **ElemRef**
//!
//! [`ElemRef<'a>`] is a type-erased `&'a T` that also remembers
//! `size_of::<T>()`. It is `Copy`.
//!
//! **ElemMut**
//!
//! [`ElemMut<'a>`] is a type-erased `&'a mut T`. It cannot be copied, and
//! writing through it is `unsafe` because the pointee's type is unknown.
#![expect(unsafe_code, reason = "Raw pointers are inherently unsafe.")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![no_std]

// -----------------------------------------------------------------------------
// Modules

mod elem;

// -----------------------------------------------------------------------------
// Top-level exports

pub use elem::{ElemMut, ElemRef};
