#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![no_std]

pub use qk_buffer as buffer;
pub use qk_ptr as ptr;
