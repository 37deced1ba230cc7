use core::alloc::Layout;

use crate::BufferError;

/// Minimum alignment of every buffer allocation, in bytes.
pub const MIN_ALIGN: usize = 16;

// -----------------------------------------------------------------------------
// ElemLayout

/// Size and alignment of the elements stored in a buffer.
///
/// The element size is the stride between two neighbouring elements.
/// The buffer alignment is the element alignment raised to at least
/// [`MIN_ALIGN`].
///
/// # Examples
///
/// ```
/// use qk_buffer::{ElemLayout, MIN_ALIGN};
///
/// let layout = ElemLayout::of::<u32>();
/// assert_eq!(layout.size(), 4);
/// assert_eq!(layout.align(), MIN_ALIGN);
///
/// assert!(ElemLayout::new(12, 4).is_ok());
/// assert!(ElemLayout::new(12, 3).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElemLayout {
    size: usize,
    align: usize,
}

impl ElemLayout {
    /// Returns the layout of `T`.
    #[inline]
    pub const fn of<T>() -> Self {
        Self {
            size: size_of::<T>(),
            align: raise_align(align_of::<T>()),
        }
    }

    /// Creates a layout from a raw element size and alignment.
    ///
    /// `align` must be a power of two and `size` a multiple of it.
    pub const fn new(size: usize, align: usize) -> Result<Self, BufferError> {
        if !align.is_power_of_two() || size % align != 0 {
            return Err(BufferError::InvalidLayout { size, align });
        }
        Ok(Self {
            size,
            align: raise_align(align),
        })
    }

    /// Byte size of one element.
    #[inline(always)]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Alignment of the backing allocation.
    #[inline(always)]
    pub const fn align(&self) -> usize {
        self.align
    }

    /// Returns `true` if elements take no space.
    #[inline(always)]
    pub const fn is_zst(&self) -> bool {
        self.size == 0
    }

    /// Creates the layout of a block holding `n` elements.
    #[inline]
    pub(crate) const fn array(&self, n: usize) -> Result<Layout, BufferError> {
        let Some(bytes) = self.size.checked_mul(n) else {
            return Err(BufferError::CapacityOverflow);
        };
        // `align` is a power of two, so this only fails on `isize::MAX` overflow.
        match Layout::from_size_align(bytes, self.align) {
            Ok(layout) => Ok(layout),
            Err(_) => Err(BufferError::CapacityOverflow),
        }
    }
}

#[inline(always)]
const fn raise_align(align: usize) -> usize {
    if align < MIN_ALIGN { MIN_ALIGN } else { align }
}

// -----------------------------------------------------------------------------
// Tests
