#![expect(unsafe_code, reason = "manual allocation of the element block")]

use alloc::alloc as malloc;
use core::alloc::Layout;
use core::fmt;
use core::num::NonZeroUsize;
use core::ptr::{self, NonNull};

use qk_ptr::{ElemMut, ElemRef};

use crate::{BufferError, DEFAULT_CAPACITY, ElemLayout};

// -----------------------------------------------------------------------------
// Fallibility

/// Whether allocation failures are returned or handled fatally.
#[derive(Clone, Copy)]
enum Fallibility {
    Fallible,
    Infallible,
}

impl Fallibility {
    #[cold]
    #[inline(never)]
    fn capacity_overflow(self) -> BufferError {
        match self {
            Fallibility::Fallible => BufferError::CapacityOverflow,
            Fallibility::Infallible => panic!("buffer capacity overflow"),
        }
    }

    #[cold]
    #[inline(never)]
    fn alloc_err(self, layout: Layout) -> BufferError {
        match self {
            Fallibility::Fallible => BufferError::AllocationFailure {
                bytes: layout.size(),
                align: layout.align(),
            },
            Fallibility::Infallible => malloc::handle_alloc_error(layout),
        }
    }
}

#[cold]
#[inline(never)]
fn use_after_dispose() -> BufferError {
    log::warn!("operation on a disposed buffer rejected");
    BufferError::UseAfterDispose
}

// -----------------------------------------------------------------------------
// RawBuffer

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Live,
    Disposed,
}

/// A growable, manually allocated block of untyped elements.
///
/// Every element occupies [`ElemLayout::size`] bytes and the block is
/// aligned to [`ElemLayout::align`]. Elements are moved in and out as raw
/// bytes through [`ElemRef`] and [`ElemMut`].
///
/// Capacity only grows, by doubling, and a live buffer always keeps at
/// least one free slot: `len < capacity`.
///
/// The block is released by [`dispose`](Self::dispose) or, failing that,
/// when the buffer is dropped. After `dispose` every fallible operation
/// returns [`BufferError::UseAfterDispose`].
///
/// # Examples
///
/// ```
/// use qk_buffer::{ElemLayout, RawBuffer};
/// use qk_ptr::ElemRef;
///
/// let mut buffer = RawBuffer::with_capacity(ElemLayout::of::<u32>(), 2);
/// buffer.push(ElemRef::from_ref(&7u32)).unwrap();
/// buffer.push(ElemRef::from_ref(&9u32)).unwrap();
///
/// assert_eq!(buffer.len(), 2);
/// assert_eq!(buffer.capacity(), 4);
///
/// let second = buffer.get(1).unwrap();
/// assert_eq!(unsafe { second.read::<u32>() }, 9);
/// ```
pub struct RawBuffer {
    elem: ElemLayout,
    data: NonNull<u8>,
    len: usize,
    capacity: usize,
    state: State,
}

// SAFETY: The buffer exclusively owns plain bytes, and mutation requires `&mut self`.
unsafe impl Send for RawBuffer {}
// SAFETY: Shared access only reads.
unsafe impl Sync for RawBuffer {}

impl Drop for RawBuffer {
    fn drop(&mut self) {
        if self.state == State::Live {
            // SAFETY: live buffers own a block of `capacity` elements.
            unsafe { self.free() }
        }
    }
}

impl RawBuffer {
    /// Creates a buffer with room for [`DEFAULT_CAPACITY`] elements.
    #[inline]
    pub fn new(elem: ElemLayout) -> Self {
        Self::with_capacity(elem, DEFAULT_CAPACITY)
    }

    /// Creates a buffer with room for `capacity` elements.
    ///
    /// A capacity of `0` is raised to `1`.
    ///
    /// # Panics
    /// Panics if the block size overflows `isize::MAX`. Allocation failure
    /// is handled by [`handle_alloc_error`](alloc::alloc::handle_alloc_error).
    pub fn with_capacity(elem: ElemLayout, capacity: usize) -> Self {
        match Self::build(elem, capacity, Fallibility::Infallible) {
            Ok(buffer) => buffer,
            // Infallible allocation diverges on failure.
            Err(_) => unreachable!(),
        }
    }

    /// Like [`with_capacity`](Self::with_capacity), but reports
    /// allocation failures instead of aborting.
    pub fn try_with_capacity(elem: ElemLayout, capacity: usize) -> Result<Self, BufferError> {
        Self::build(elem, capacity, Fallibility::Fallible)
    }

    fn build(
        elem: ElemLayout,
        capacity: usize,
        fallibility: Fallibility,
    ) -> Result<Self, BufferError> {
        let capacity = capacity.max(1);
        let data = allocate(elem, capacity, fallibility)?;
        Ok(Self {
            elem,
            data,
            len: 0,
            capacity,
            state: State::Live,
        })
    }

    /// Returns the element layout.
    #[inline(always)]
    pub const fn layout(&self) -> ElemLayout {
        self.elem
    }

    /// Number of live elements. `0` once disposed.
    #[inline(always)]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Number of elements the block holds. `0` once disposed.
    #[inline(always)]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline(always)]
    pub fn is_disposed(&self) -> bool {
        self.state == State::Disposed
    }

    /// Returns a pointer to the first element.
    ///
    /// The pointer is dangling, but aligned, for zero-sized elements
    /// and for disposed buffers.
    #[inline(always)]
    pub const fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }

    /// Returns a mutable pointer to the first element.
    #[inline(always)]
    pub const fn as_mut_ptr(&mut self) -> *mut u8 {
        self.data.as_ptr()
    }

    // -------------------------------------------------------------------------
    // Checks

    #[inline]
    fn check_live(&self) -> Result<(), BufferError> {
        match self.state {
            State::Live => Ok(()),
            State::Disposed => Err(use_after_dispose()),
        }
    }

    #[inline]
    fn check_index(&self, index: usize) -> Result<(), BufferError> {
        if index < self.len {
            Ok(())
        } else {
            Err(BufferError::OutOfRange {
                index,
                len: self.len,
            })
        }
    }

    #[inline]
    fn check_size(&self, value: ElemRef<'_>) -> Result<(), BufferError> {
        if value.size() == self.elem.size() {
            Ok(())
        } else {
            Err(BufferError::SizeMismatch {
                expected: self.elem.size(),
                found: value.size(),
            })
        }
    }

    /// Returns a pointer to the slot at `index`.
    ///
    /// # Safety
    /// `index` must be within `0..=capacity`.
    #[inline(always)]
    const unsafe fn slot(&self, index: usize) -> NonNull<u8> {
        unsafe { self.data.add(index * self.elem.size()) }
    }

    // -------------------------------------------------------------------------
    // Growth

    fn reserve_inner(
        &mut self,
        additional: usize,
        fallibility: Fallibility,
    ) -> Result<(), BufferError> {
        // One slot beyond the reserved elements must stay free.
        let required = match self.len.checked_add(additional) {
            Some(n) if n < usize::MAX => n + 1,
            _ => return Err(fallibility.capacity_overflow()),
        };
        if required <= self.capacity {
            return Ok(());
        }

        let mut new_capacity = self.capacity;
        while new_capacity < required {
            new_capacity = match new_capacity.checked_mul(2) {
                Some(n) => n,
                None => return Err(fallibility.capacity_overflow()),
            };
        }
        self.realloc(new_capacity, fallibility)
    }

    fn realloc(
        &mut self,
        new_capacity: usize,
        fallibility: Fallibility,
    ) -> Result<(), BufferError> {
        let new_layout = match self.elem.array(new_capacity) {
            Ok(layout) => layout,
            Err(_) => return Err(fallibility.capacity_overflow()),
        };

        if !self.elem.is_zst() {
            // SAFETY: the current block was allocated with exactly this layout,
            // and its size is non-zero because `capacity >= 1`.
            let ptr = unsafe {
                let old_layout = Layout::from_size_align_unchecked(
                    self.elem.size() * self.capacity,
                    self.elem.align(),
                );
                malloc::realloc(self.data.as_ptr(), old_layout, new_layout.size())
            };
            self.data = match NonNull::new(ptr) {
                Some(data) => data,
                None => return Err(fallibility.alloc_err(new_layout)),
            };
        }

        log::trace!(
            "buffer grew from {} to {} elements of {} bytes",
            self.capacity,
            new_capacity,
            self.elem.size(),
        );
        self.capacity = new_capacity;
        Ok(())
    }

    /// Releases the block.
    ///
    /// # Safety
    /// The buffer must be live, and must not be used again before
    /// `data` is reset.
    unsafe fn free(&mut self) {
        if !self.elem.is_zst() {
            unsafe {
                let layout = Layout::from_size_align_unchecked(
                    self.elem.size() * self.capacity,
                    self.elem.align(),
                );
                malloc::dealloc(self.data.as_ptr(), layout);
            }
        }
        log::trace!("freed buffer of {} elements", self.capacity);
    }

    /// Makes sure `additional` more elements can be pushed without
    /// reallocating.
    pub fn reserve(&mut self, additional: usize) -> Result<(), BufferError> {
        self.check_live()?;
        self.reserve_inner(additional, Fallibility::Infallible)
    }

    /// Like [`reserve`](Self::reserve), but reports allocation failures.
    ///
    /// The buffer is unchanged when an error is returned.
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), BufferError> {
        self.check_live()?;
        self.reserve_inner(additional, Fallibility::Fallible)
    }

    // -------------------------------------------------------------------------
    // Elements

    /// Appends a copy of `value`.
    ///
    /// If the buffer becomes full, the capacity doubles.
    pub fn push(&mut self, value: ElemRef<'_>) -> Result<(), BufferError> {
        self.check_live()?;
        self.check_size(value)?;
        self.reserve_inner(1, Fallibility::Infallible)?;

        // SAFETY: `len < capacity`, and `value` cannot borrow from `self`.
        unsafe {
            ptr::copy_nonoverlapping(
                value.as_ptr(),
                self.slot(self.len).as_ptr(),
                self.elem.size(),
            );
        }
        self.len += 1;
        Ok(())
    }

    /// Appends `count` elements read from `src`.
    ///
    /// # Safety
    /// `src` must be valid for reads of `count * layout().size()` bytes and
    /// must not point into this buffer.
    pub unsafe fn extend_from_raw(
        &mut self,
        src: *const u8,
        count: usize,
    ) -> Result<(), BufferError> {
        self.check_live()?;
        self.reserve_inner(count, Fallibility::Infallible)?;

        unsafe {
            ptr::copy_nonoverlapping(
                src,
                self.slot(self.len).as_ptr(),
                count * self.elem.size(),
            );
        }
        self.len += count;
        Ok(())
    }

    /// Returns a view of the element at `index`.
    pub fn get(&self, index: usize) -> Result<ElemRef<'_>, BufferError> {
        self.check_live()?;
        self.check_index(index)?;
        // SAFETY: `index < len`, the view borrows `self`.
        Ok(unsafe { ElemRef::new(self.slot(index), self.elem.size()) })
    }

    /// Returns an exclusive view of the element at `index`.
    pub fn get_mut(&mut self, index: usize) -> Result<ElemMut<'_>, BufferError> {
        self.check_live()?;
        self.check_index(index)?;
        // SAFETY: `index < len`, the view borrows `self` exclusively.
        Ok(unsafe { ElemMut::new(self.slot(index), self.elem.size()) })
    }

    /// Overwrites the element at `index` with a copy of `value`.
    pub fn set(&mut self, index: usize, value: ElemRef<'_>) -> Result<(), BufferError> {
        self.check_live()?;
        self.check_size(value)?;
        self.check_index(index)?;

        // SAFETY: `index < len`, the view borrows `self` exclusively.
        let mut slot = unsafe { ElemMut::new(self.slot(index), self.elem.size()) };
        // SAFETY: the block is untyped, and the sizes were checked above.
        unsafe { slot.copy_from(value) };
        Ok(())
    }

    /// Removes the element at `index`, shifting the following elements left.
    ///
    /// Removing the last element moves no data.
    pub fn remove(&mut self, index: usize) -> Result<(), BufferError> {
        self.check_live()?;
        self.check_index(index)?;

        let tail = self.len - index - 1;
        if tail > 0 {
            // SAFETY: both ranges lie within `0..len`; `ptr::copy` allows overlap.
            unsafe {
                ptr::copy(
                    self.slot(index + 1).as_ptr(),
                    self.slot(index).as_ptr(),
                    tail * self.elem.size(),
                );
            }
        }
        self.len -= 1;
        Ok(())
    }

    /// Removes the element at `index` by moving the last element into its slot.
    ///
    /// This does not preserve ordering, but is O(1).
    pub fn swap_remove(&mut self, index: usize) -> Result<(), BufferError> {
        self.check_live()?;
        self.check_index(index)?;

        let last = self.len - 1;
        if index != last {
            // SAFETY: `index < last < len`, so the slots are distinct.
            unsafe {
                ptr::copy_nonoverlapping(
                    self.slot(last).as_ptr(),
                    self.slot(index).as_ptr(),
                    self.elem.size(),
                );
            }
        }
        self.len = last;
        Ok(())
    }

    /// Shortens the buffer to `len` elements. Capacity is unchanged.
    pub fn truncate(&mut self, len: usize) -> Result<(), BufferError> {
        self.check_live()?;
        if len < self.len {
            self.len = len;
        }
        Ok(())
    }

    /// Forgets every element. Capacity is unchanged.
    pub fn clear(&mut self) -> Result<(), BufferError> {
        self.check_live()?;
        self.len = 0;
        Ok(())
    }

    /// Frees the block.
    ///
    /// Calling `dispose` again, or any other fallible operation,
    /// returns [`BufferError::UseAfterDispose`].
    pub fn dispose(&mut self) -> Result<(), BufferError> {
        self.check_live()?;
        // SAFETY: the buffer is live, and `data` is reset below.
        unsafe { self.free() }
        self.data = dangling(self.elem);
        self.len = 0;
        self.capacity = 0;
        self.state = State::Disposed;
        Ok(())
    }

    /// Creates a deep copy with the same capacity.
    ///
    /// Allocation failures are reported as [`BufferError::AllocationFailure`].
    pub fn try_clone(&self) -> Result<Self, BufferError> {
        self.check_live()?;
        let mut other = Self::try_with_capacity(self.elem, self.capacity)?;
        // SAFETY: both blocks hold at least `len` elements and are distinct.
        unsafe {
            ptr::copy_nonoverlapping(
                self.data.as_ptr(),
                other.data.as_ptr(),
                self.len * self.elem.size(),
            );
        }
        other.len = self.len;
        Ok(other)
    }
}

impl fmt::Debug for RawBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawBuffer")
            .field("layout", &self.elem)
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// -----------------------------------------------------------------------------
// alloc helper

/// An aligned, non-null pointer that owns nothing.
#[inline]
const fn dangling(elem: ElemLayout) -> NonNull<u8> {
    // SAFETY: alignments are never zero.
    let align = unsafe { NonZeroUsize::new_unchecked(elem.align()) };
    NonNull::without_provenance(align)
}

fn allocate(
    elem: ElemLayout,
    capacity: usize,
    fallibility: Fallibility,
) -> Result<NonNull<u8>, BufferError> {
    let layout = match elem.array(capacity) {
        Ok(layout) => layout,
        Err(_) => return Err(fallibility.capacity_overflow()),
    };
    if layout.size() == 0 {
        return Ok(dangling(elem));
    }

    // SAFETY: `layout` has a non-zero size.
    match NonNull::new(unsafe { malloc::alloc(layout) }) {
        Some(data) => {
            log::trace!("allocated {} bytes for {} elements", layout.size(), capacity);
            Ok(data)
        }
        None => Err(fallibility.alloc_err(layout)),
    }
}

// -----------------------------------------------------------------------------
// Tests
