#![expect(unsafe_code, reason = "typed access to the untyped block")]

use core::fmt;
use core::marker::PhantomData;
use core::ops::{Index, IndexMut};
use core::slice;

use qk_ptr::ElemRef;

use crate::{BufferError, ElemLayout, RawBuffer};

// -----------------------------------------------------------------------------
// TypedBuffer

/// A growable, manually disposed buffer of plain `Copy` values.
///
/// `TypedBuffer` is a typed facade over [`RawBuffer`]. Elements are copied
/// in and out byte-wise; the backing block is aligned to at least
/// [`MIN_ALIGN`](crate::MIN_ALIGN) bytes.
///
/// Appending never lets the buffer fill up: once `len` reaches `capacity`
/// the capacity doubles, so pushes are amortized O(1). Capacity never
/// shrinks.
///
/// The type is neither `Copy` nor `Clone`; [`try_clone`](Self::try_clone)
/// makes an explicit deep copy. After [`dispose`](Self::dispose) every
/// fallible operation returns [`BufferError::UseAfterDispose`].
///
/// Mutation needs `&mut self`, so sharing a buffer between threads
/// requires external synchronization such as a mutex.
///
/// # Examples
///
/// ```
/// use qk_buffer::{BufferError, TypedBuffer};
///
/// let mut buffer = TypedBuffer::with_capacity(1);
/// for value in [10, 20, 30, 40, 50] {
///     buffer.push(value).unwrap();
/// }
/// assert_eq!(buffer.len(), 5);
/// assert_eq!(buffer.capacity(), 8);
/// assert_eq!(buffer.as_slice(), &[10, 20, 30, 40, 50]);
///
/// assert_eq!(buffer.remove(1), Ok(20));
/// assert_eq!(buffer[1], 30);
///
/// buffer.dispose().unwrap();
/// assert_eq!(buffer.push(60), Err(BufferError::UseAfterDispose));
/// ```
pub struct TypedBuffer<T> {
    raw: RawBuffer,
    _marker: PhantomData<T>,
}

impl<T: Copy> TypedBuffer<T> {
    /// Creates a buffer with room for
    /// [`DEFAULT_CAPACITY`](crate::DEFAULT_CAPACITY) elements.
    #[inline]
    pub fn new() -> Self {
        Self::from_raw_unchecked(RawBuffer::new(ElemLayout::of::<T>()))
    }

    /// Creates a buffer with room for `capacity` elements.
    ///
    /// A capacity of `0` is raised to `1`.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::from_raw_unchecked(RawBuffer::with_capacity(ElemLayout::of::<T>(), capacity))
    }

    /// Like [`with_capacity`](Self::with_capacity), but reports
    /// allocation failures instead of aborting.
    #[inline]
    pub fn try_with_capacity(capacity: usize) -> Result<Self, BufferError> {
        RawBuffer::try_with_capacity(ElemLayout::of::<T>(), capacity).map(Self::from_raw_unchecked)
    }

    /// Creates a buffer holding a copy of `values`.
    ///
    /// ```
    /// # use qk_buffer::TypedBuffer;
    /// let buffer = TypedBuffer::from_slice(&[1u8, 2, 3]);
    /// assert_eq!(buffer.as_slice(), &[1, 2, 3]);
    /// assert_eq!(buffer.capacity(), 4);
    /// ```
    ///
    /// # Panics
    /// Panics if `values` is too long to leave a free slot behind it.
    pub fn from_slice(values: &[T]) -> Self {
        let mut buffer = Self::with_capacity(values.len().saturating_add(1));
        let extended = buffer.extend_from_slice(values);
        debug_assert!(extended.is_ok());
        buffer
    }

    /// Like [`from_slice`](Self::from_slice), but reports capacity
    /// overflow and allocation failures.
    pub fn try_from_slice(values: &[T]) -> Result<Self, BufferError> {
        let capacity = values
            .len()
            .checked_add(1)
            .ok_or(BufferError::CapacityOverflow)?;
        let mut buffer = Self::try_with_capacity(capacity)?;
        buffer.extend_from_slice(values)?;
        Ok(buffer)
    }

    #[inline(always)]
    fn from_raw_unchecked(raw: RawBuffer) -> Self {
        debug_assert_eq!(raw.layout(), ElemLayout::of::<T>());
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    /// Returns the untyped buffer underneath.
    #[inline(always)]
    pub const fn as_raw(&self) -> &RawBuffer {
        &self.raw
    }

    #[inline(always)]
    pub const fn len(&self) -> usize {
        self.raw.len()
    }

    #[inline(always)]
    pub const fn capacity(&self) -> usize {
        self.raw.capacity()
    }

    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Byte size of one element.
    #[inline(always)]
    pub const fn element_size(&self) -> usize {
        size_of::<T>()
    }

    #[inline(always)]
    pub fn is_disposed(&self) -> bool {
        self.raw.is_disposed()
    }

    /// Appends `value`, doubling the capacity once the buffer is full.
    #[inline]
    pub fn push(&mut self, value: T) -> Result<(), BufferError> {
        self.raw.push(ElemRef::from_ref(&value))
    }

    /// Appends a copy of every value in `values`.
    pub fn extend_from_slice(&mut self, values: &[T]) -> Result<(), BufferError> {
        // SAFETY: `values` is a shared borrow, so it cannot alias `self`.
        unsafe { self.raw.extend_from_raw(values.as_ptr().cast(), values.len()) }
    }

    /// Returns a copy of the element at `index`.
    #[inline]
    pub fn get(&self, index: usize) -> Result<T, BufferError> {
        self.get_ref(index).copied()
    }

    /// Returns a reference to the element at `index`.
    #[inline]
    pub fn get_ref(&self, index: usize) -> Result<&T, BufferError> {
        let elem = self.raw.get(index)?;
        elem.debug_assert_fits::<T>();
        // SAFETY: the slot holds a `T` and the block is aligned for it.
        Ok(unsafe { elem.as_ref::<T>() })
    }

    /// Returns a mutable reference to the element at `index`.
    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Result<&mut T, BufferError> {
        let elem = self.raw.get_mut(index)?;
        elem.debug_assert_fits::<T>();
        // SAFETY: the slot holds a `T` and the block is aligned for it.
        Ok(unsafe { elem.consume::<T>() })
    }

    /// Overwrites the element at `index`.
    #[inline]
    pub fn set(&mut self, index: usize, value: T) -> Result<(), BufferError> {
        self.raw.set(index, ElemRef::from_ref(&value))
    }

    /// Removes and returns the element at `index`, preserving the order
    /// of the remaining elements.
    ///
    /// Indices at or beyond `len` are rejected with
    /// [`BufferError::OutOfRange`]; removing the last element moves no data.
    pub fn remove(&mut self, index: usize) -> Result<T, BufferError> {
        let value = self.get(index)?;
        self.raw.remove(index)?;
        Ok(value)
    }

    /// Removes and returns the element at `index`, replacing it with the
    /// last element.
    pub fn swap_remove(&mut self, index: usize) -> Result<T, BufferError> {
        let value = self.get(index)?;
        self.raw.swap_remove(index)?;
        Ok(value)
    }

    /// Shortens the buffer to `len` elements. Capacity is unchanged.
    #[inline]
    pub fn truncate(&mut self, len: usize) -> Result<(), BufferError> {
        self.raw.truncate(len)
    }

    /// Sets the length to zero. Capacity is unchanged.
    #[inline]
    pub fn clear(&mut self) -> Result<(), BufferError> {
        self.raw.clear()
    }

    /// Makes sure `additional` more values can be pushed without reallocating.
    #[inline]
    pub fn reserve(&mut self, additional: usize) -> Result<(), BufferError> {
        self.raw.reserve(additional)
    }

    /// Like [`reserve`](Self::reserve), but reports allocation failures.
    #[inline]
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), BufferError> {
        self.raw.try_reserve(additional)
    }

    /// Frees the backing block.
    #[inline]
    pub fn dispose(&mut self) -> Result<(), BufferError> {
        self.raw.dispose()
    }

    /// Creates a deep copy with the same capacity.
    #[inline]
    pub fn try_clone(&self) -> Result<Self, BufferError> {
        self.raw.try_clone().map(Self::from_raw_unchecked)
    }

    /// Returns the live elements. Empty once disposed.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: `[0, len)` holds initialized `T`s and the pointer is
        // aligned even when dangling.
        unsafe { slice::from_raw_parts(self.raw.as_ptr().cast::<T>(), self.raw.len()) }
    }

    /// Returns the live elements mutably. Empty once disposed.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        let len = self.raw.len();
        // SAFETY: see `as_slice`; the borrow of `self` is exclusive.
        unsafe { slice::from_raw_parts_mut(self.raw.as_mut_ptr().cast::<T>(), len) }
    }

    #[inline]
    pub fn iter(&self) -> slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    #[inline]
    pub fn iter_mut(&mut self) -> slice::IterMut<'_, T> {
        self.as_mut_slice().iter_mut()
    }
}

impl<T: Copy> Default for TypedBuffer<T> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> From<&[T]> for TypedBuffer<T> {
    #[inline]
    fn from(values: &[T]) -> Self {
        Self::from_slice(values)
    }
}

impl<T: Copy> Index<usize> for TypedBuffer<T> {
    type Output = T;

    #[track_caller]
    fn index(&self, index: usize) -> &T {
        match self.get_ref(index) {
            Ok(value) => value,
            Err(err) => index_failed(err),
        }
    }
}

impl<T: Copy> IndexMut<usize> for TypedBuffer<T> {
    #[track_caller]
    fn index_mut(&mut self, index: usize) -> &mut T {
        match self.get_mut(index) {
            Ok(value) => value,
            Err(err) => index_failed(err),
        }
    }
}

#[cold]
#[inline(never)]
#[track_caller]
fn index_failed(err: BufferError) -> ! {
    panic!("{err}")
}

impl<'a, T: Copy> IntoIterator for &'a TypedBuffer<T> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T: Copy> IntoIterator for &'a mut TypedBuffer<T> {
    type Item = &'a mut T;
    type IntoIter = slice::IterMut<'a, T>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

impl<T: Copy + PartialEq> PartialEq for TypedBuffer<T> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: Copy + Eq> Eq for TypedBuffer<T> {}

impl<T: Copy + fmt::Debug> fmt::Debug for TypedBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::TypedBuffer;
    use crate::{BufferError, DEFAULT_CAPACITY, MIN_ALIGN};
    use alloc::format;

    #[derive(Clone, Copy, Debug, PartialEq)]
    #[repr(C)]
    struct Vertex {
        position: [f32; 3],
        color: u32,
    }

    fn vertex(i: u32) -> Vertex {
        Vertex {
            position: [i as f32, 0.5, -1.0],
            color: i,
        }
    }

    #[test]
    fn is_sync_send() {
        use core::panic::{RefUnwindSafe, UnwindSafe};

        fn is_send<T: Send>() {}
        fn is_sync<T: Sync>() {}
        fn is_unwindsafe<T: UnwindSafe>() {}
        fn is_refunwindsafe<T: RefUnwindSafe>() {}

        is_send::<TypedBuffer<i32>>();
        is_sync::<TypedBuffer<i32>>();
        is_unwindsafe::<TypedBuffer<i32>>();
        is_refunwindsafe::<TypedBuffer<i32>>();
    }

    #[test]
    fn default_capacity() {
        let buffer = TypedBuffer::<u64>::default();
        assert_eq!(buffer.capacity(), DEFAULT_CAPACITY);
        assert_eq!(buffer.element_size(), 8);
        assert!(buffer.is_empty());
        assert_eq!(buffer.as_raw().as_ptr() as usize % MIN_ALIGN, 0);
    }

    #[test]
    fn round_trip_from_capacity_one() {
        let mut buffer = TypedBuffer::with_capacity(1);
        for value in [10, 20, 30, 40, 50] {
            buffer.push(value).unwrap();
        }
        assert_eq!(buffer.len(), 5);
        assert!(buffer.capacity() >= 5);
        for (i, expected) in [10, 20, 30, 40, 50].into_iter().enumerate() {
            assert_eq!(buffer.get(i), Ok(expected));
        }
    }

    #[test]
    fn pushed_value_is_readable_at_boundary() {
        let mut buffer = TypedBuffer::with_capacity(2);
        buffer.push(vertex(0)).unwrap();
        buffer.push(vertex(1)).unwrap();
        assert_eq!(buffer.capacity(), 4);
        assert_eq!(buffer[1], vertex(1));
    }

    #[test]
    fn set_then_get() {
        let mut buffer = TypedBuffer::from_slice(&[vertex(0), vertex(1), vertex(2)]);
        buffer.set(1, vertex(9)).unwrap();
        assert_eq!(buffer.get(1), Ok(vertex(9)));
        assert_eq!(buffer.get(0), Ok(vertex(0)));
        assert_eq!(
            buffer.set(3, vertex(9)),
            Err(BufferError::OutOfRange { index: 3, len: 3 })
        );
    }

    #[test]
    fn remove_preserves_order() {
        let mut buffer = TypedBuffer::from_slice(&[1, 2, 3, 4, 5]);
        assert_eq!(buffer.remove(0), Ok(1));
        assert_eq!(buffer.as_slice(), &[2, 3, 4, 5]);
        assert_eq!(buffer.remove(2), Ok(4));
        assert_eq!(buffer.as_slice(), &[2, 3, 5]);
    }

    #[test]
    fn remove_last_keeps_capacity_and_prefix() {
        let mut buffer = TypedBuffer::with_capacity(10);
        buffer.extend_from_slice(&[1, 2, 3]).unwrap();
        let ptr = buffer.as_raw().as_ptr();

        assert_eq!(buffer.remove(2), Ok(3));
        assert_eq!(buffer.capacity(), 10);
        assert_eq!(buffer.as_raw().as_ptr(), ptr);
        assert_eq!(buffer.as_slice(), &[1, 2]);
    }

    #[test]
    fn remove_out_of_range_is_rejected() {
        let mut buffer = TypedBuffer::with_capacity(10);
        buffer.extend_from_slice(&[1, 2, 3]).unwrap();

        assert_eq!(buffer.remove(3), Err(BufferError::OutOfRange { index: 3, len: 3 }));
        assert_eq!(buffer.remove(100), Err(BufferError::OutOfRange { index: 100, len: 3 }));
        assert_eq!(buffer.as_slice(), &[1, 2, 3]);

        let mut empty = TypedBuffer::<u8>::new();
        assert_eq!(empty.remove(0), Err(BufferError::OutOfRange { index: 0, len: 0 }));
    }

    #[test]
    fn swap_remove_returns_value() {
        let mut buffer = TypedBuffer::from_slice(&[1, 2, 3, 4]);
        assert_eq!(buffer.swap_remove(1), Ok(2));
        assert_eq!(buffer.as_slice(), &[1, 4, 3]);
    }

    #[test]
    fn clear_reuses_allocation() {
        let mut buffer = TypedBuffer::from_slice(&[7, 8, 9]);
        let capacity = buffer.capacity();
        buffer.clear().unwrap();
        assert!(buffer.is_empty());

        buffer.push(1).unwrap();
        assert_eq!(buffer.capacity(), capacity);
        assert_eq!(buffer.as_slice(), &[1]);
    }

    #[test]
    fn truncate_shortens_only() {
        let mut buffer = TypedBuffer::from_slice(&[1, 2, 3]);
        buffer.truncate(5).unwrap();
        assert_eq!(buffer.len(), 3);
        buffer.truncate(1).unwrap();
        assert_eq!(buffer.as_slice(), &[1]);
    }

    #[test]
    fn get_mut_and_index_mut() {
        let mut buffer = TypedBuffer::from_slice(&[1, 2, 3]);
        *buffer.get_mut(0).unwrap() += 10;
        buffer[2] *= 3;
        for value in &mut buffer {
            *value += 1;
        }
        assert_eq!(buffer.as_slice(), &[12, 3, 10]);
        assert_eq!(buffer.iter().sum::<i32>(), 25);
    }

    #[test]
    #[should_panic(expected = "index 3 is out of range for buffer of length 3")]
    fn index_panics_out_of_range() {
        let buffer = TypedBuffer::from_slice(&[1, 2, 3]);
        let _value = buffer[3];
    }

    #[test]
    #[should_panic(expected = "buffer has already been disposed")]
    fn index_panics_after_dispose() {
        let mut buffer = TypedBuffer::from_slice(&[1, 2, 3]);
        buffer.dispose().unwrap();
        let _value = buffer[0];
    }

    #[test]
    fn reserve_avoids_growth_on_push() {
        let mut buffer = TypedBuffer::with_capacity(2);
        buffer.reserve(5).unwrap();
        let capacity = buffer.capacity();
        assert_eq!(capacity, 8);
        for i in 0..5 {
            buffer.push(i).unwrap();
        }
        assert_eq!(buffer.capacity(), capacity);
    }

    #[test]
    fn try_clone_copies_contents() {
        let buffer = TypedBuffer::from_slice(&[vertex(1), vertex(2)]);
        let mut copy = buffer.try_clone().unwrap();
        copy.set(0, vertex(5)).unwrap();

        assert_eq!(buffer[0], vertex(1));
        assert_eq!(copy[0], vertex(5));
        assert_ne!(buffer, copy);
        copy.set(0, vertex(1)).unwrap();
        assert_eq!(buffer, copy);
    }

    #[test]
    fn dispose_then_everything_fails() {
        let mut buffer = TypedBuffer::from_slice(&[1u16, 2]);
        buffer.dispose().unwrap();

        let err = BufferError::UseAfterDispose;
        assert!(buffer.is_disposed());
        assert!(buffer.as_slice().is_empty());
        assert_eq!(buffer.push(3), Err(err));
        assert_eq!(buffer.get(0), Err(err));
        assert_eq!(buffer.set(0, 1), Err(err));
        assert_eq!(buffer.remove(0), Err(err));
        assert_eq!(buffer.clear(), Err(err));
        assert_eq!(buffer.extend_from_slice(&[1]), Err(err));
        assert_eq!(buffer.try_clone().unwrap_err(), err);
        assert_eq!(buffer.dispose(), Err(err));
    }

    /// A slice of zero-sized values that no buffer can hold with a free slot.
    fn longest_unit_slice() -> &'static [()] {
        use core::ptr::NonNull;
        use core::slice;

        // SAFETY: zero-sized elements need no backing memory.
        unsafe { slice::from_raw_parts(NonNull::<()>::dangling().as_ptr(), usize::MAX) }
    }

    #[test]
    fn try_from_slice_copies_values() {
        let buffer = TypedBuffer::try_from_slice(&[4u8, 5]).unwrap();
        assert_eq!(buffer.as_slice(), &[4, 5]);
        assert_eq!(buffer.capacity(), 3);
    }

    #[test]
    fn try_from_slice_reports_overflow() {
        assert_eq!(
            TypedBuffer::try_from_slice(longest_unit_slice()).unwrap_err(),
            BufferError::CapacityOverflow
        );
    }

    #[test]
    #[should_panic(expected = "buffer capacity overflow")]
    fn from_slice_panics_on_overflow() {
        let _buffer = TypedBuffer::from_slice(longest_unit_slice());
    }

    #[test]
    fn debug_lists_elements() {
        let buffer = TypedBuffer::from_slice(&[1, 2]);
        assert_eq!(format!("{buffer:?}"), "[1, 2]");
    }
}
