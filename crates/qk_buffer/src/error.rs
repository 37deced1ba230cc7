use thiserror::Error;

// -----------------------------------------------------------------------------
// Error

/// Errors reported by [`RawBuffer`](crate::RawBuffer) and
/// [`TypedBuffer`](crate::TypedBuffer).
///
/// Every error is detected before the buffer is mutated, so a failed call
/// leaves length, capacity and contents unchanged.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum BufferError {
    #[error("failed to allocate {bytes} bytes with alignment {align}")]
    AllocationFailure { bytes: usize, align: usize },

    #[error("requested capacity exceeds the maximum allocation size")]
    CapacityOverflow,

    #[error("index {index} is out of range for buffer of length {len}")]
    OutOfRange { index: usize, len: usize },

    #[error("buffer has already been disposed")]
    UseAfterDispose,

    #[error("element size mismatch: expected {expected} bytes, found {found}")]
    SizeMismatch { expected: usize, found: usize },

    #[error("invalid element layout: size {size}, alignment {align}")]
    InvalidLayout { size: usize, align: usize },
}
