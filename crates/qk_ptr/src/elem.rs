use core::fmt;
use core::marker::PhantomData;
use core::ptr::{self, NonNull};

// -----------------------------------------------------------------------------
// Common methods

macro_rules! impl_elem {
    ($elem:ident) => {
        impl $elem<'_> {
            /// Returns the size in bytes of the element this view covers.
            #[inline(always)]
            pub const fn size(&self) -> usize {
                self.size
            }

            /// Check if the pointer is aligned to type `T`.
            #[inline]
            pub fn is_aligned<T>(&self) -> bool {
                self.ptr.as_ptr().cast::<T>().is_aligned()
            }

            /// Check alignment and size for `T`, only in debug mode.
            #[cfg_attr(debug_assertions, track_caller)]
            #[cfg_attr(not(debug_assertions), inline(always))]
            pub fn debug_assert_fits<T>(&self) {
                debug_assert!(
                    self.is_aligned::<T>(),
                    "element is not aligned. Address {:p} does not have alignment {} for type {}",
                    self.ptr,
                    align_of::<T>(),
                    core::any::type_name::<T>(),
                );
                debug_assert_eq!(
                    self.size,
                    size_of::<T>(),
                    "element size {} does not match type {}",
                    self.size,
                    core::any::type_name::<T>(),
                );
            }
        }

        impl fmt::Pointer for $elem<'_> {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Pointer::fmt(&self.ptr, f)
            }
        }

        impl fmt::Debug for $elem<'_> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:?}, {} bytes)", stringify!($elem), self.ptr, self.size)
            }
        }
    };
}

// -----------------------------------------------------------------------------
// ElemRef

/// A type-erased shared view of one element, similar to `&'a T`.
///
/// The pointer must stay valid for reads of `size` bytes for `'a`, and the
/// bytes must not be changed while this view is alive.
///
/// # Examples
///
/// ```
/// # use qk_ptr::ElemRef;
/// let x = 8u32;
/// let elem = ElemRef::from_ref(&x);
/// assert_eq!(elem.size(), 4);
///
/// elem.debug_assert_fits::<u32>();
/// assert_eq!(unsafe { elem.read::<u32>() }, 8);
/// ```
#[derive(Copy, Clone)]
pub struct ElemRef<'a> {
    ptr: NonNull<u8>,
    size: usize,
    _marker: PhantomData<&'a [u8]>,
}

impl_elem!(ElemRef);

impl<'a> ElemRef<'a> {
    /// Create an `ElemRef` from a raw pointer and an element size.
    ///
    /// # Safety
    /// - `ptr` must be valid for reads of `size` bytes for `'a`.
    /// - Nothing may write through another pointer to those bytes during `'a`.
    #[inline(always)]
    pub const unsafe fn new(ptr: NonNull<u8>, size: usize) -> ElemRef<'a> {
        ElemRef {
            ptr,
            size,
            _marker: PhantomData,
        }
    }

    /// Creates an `ElemRef` covering `val`.
    #[inline(always)]
    pub const fn from_ref<T>(val: &'a T) -> ElemRef<'a> {
        ElemRef {
            ptr: NonNull::from_ref(val).cast(),
            size: size_of::<T>(),
            _marker: PhantomData,
        }
    }

    /// Gets the underlying pointer, erasing the associated lifetime.
    #[inline(always)]
    pub const fn as_ptr(self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Convert this view into a `&T` with the same lifetime `'a`.
    ///
    /// # Safety
    /// - The bytes must hold a valid value of `T`.
    /// - The pointer must be aligned for `T` and `size` must equal `size_of::<T>()`.
    #[inline(always)]
    pub const unsafe fn as_ref<T>(self) -> &'a T {
        // SAFETY: Type correct, ptr aligned and pointee valid object.
        unsafe { &*self.ptr.as_ptr().cast::<T>() }
    }

    /// Copy the element out as a `T`.
    ///
    /// # Safety
    /// See [`as_ref`](Self::as_ref).
    #[inline(always)]
    pub const unsafe fn read<T: Copy>(self) -> T {
        unsafe { ptr::read(self.ptr.as_ptr().cast::<T>()) }
    }
}

// -----------------------------------------------------------------------------
// ElemMut

/// A type-erased exclusive view of one element, similar to `&'a mut T`.
///
/// It cannot be copied, and the caller must comply with Rust alias rules.
///
/// # Examples
///
/// ```
/// # use qk_ptr::{ElemMut, ElemRef};
/// let mut x = 8u32;
/// let src = 11u32;
///
/// let mut elem = ElemMut::from_mut(&mut x);
/// unsafe { elem.copy_from(ElemRef::from_ref(&src)) };
/// assert_eq!(x, 11);
/// ```
pub struct ElemMut<'a> {
    ptr: NonNull<u8>,
    size: usize,
    _marker: PhantomData<&'a mut [u8]>,
}

impl_elem!(ElemMut);

impl<'a> ElemMut<'a> {
    /// Create an `ElemMut` from a raw pointer and an element size.
    ///
    /// # Safety
    /// - `ptr` must be valid for reads and writes of `size` bytes for `'a`.
    /// - No other pointer may access those bytes during `'a`.
    #[inline(always)]
    pub const unsafe fn new(ptr: NonNull<u8>, size: usize) -> ElemMut<'a> {
        ElemMut {
            ptr,
            size,
            _marker: PhantomData,
        }
    }

    /// Creates an `ElemMut` covering `val`.
    #[inline(always)]
    pub const fn from_mut<T>(val: &'a mut T) -> ElemMut<'a> {
        ElemMut {
            ptr: NonNull::from_mut(val).cast(),
            size: size_of::<T>(),
            _marker: PhantomData,
        }
    }

    /// Gets the underlying pointer, erasing the associated lifetime.
    #[inline(always)]
    pub const fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Gets a shared view with a shorter lifetime.
    #[inline(always)]
    pub const fn borrow(&self) -> ElemRef<'_> {
        ElemRef {
            ptr: self.ptr,
            size: self.size,
            _marker: PhantomData,
        }
    }

    /// Convert this view into a `&mut T` with the same lifetime `'a`.
    ///
    /// # Safety
    /// - The bytes must hold a valid value of `T`.
    /// - The pointer must be aligned for `T` and `size` must equal `size_of::<T>()`.
    #[inline(always)]
    pub const unsafe fn consume<T>(self) -> &'a mut T {
        unsafe { &mut *self.ptr.as_ptr().cast::<T>() }
    }

    /// Overwrite the element with `value`.
    ///
    /// # Safety
    /// The pointer must be aligned for `T` and `size` must equal `size_of::<T>()`.
    #[inline(always)]
    pub const unsafe fn write<T: Copy>(&mut self, value: T) {
        unsafe { ptr::write(self.ptr.as_ptr().cast::<T>(), value) }
    }

    /// Overwrite the element with the bytes of `src`.
    ///
    /// # Panics
    /// Panics if the two sizes differ.
    ///
    /// # Safety
    /// `src` must hold a valid value of the type this view points to.
    #[inline]
    pub unsafe fn copy_from(&mut self, src: ElemRef<'_>) {
        assert_eq!(self.size, src.size, "element size mismatch");
        // SAFETY: `src` is a shared borrow and `self` is exclusive, so they cannot overlap.
        unsafe { ptr::copy_nonoverlapping(src.as_ptr(), self.ptr.as_ptr(), self.size) }
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::{ElemMut, ElemRef};

    #[derive(Clone, Copy, Debug, PartialEq)]
    #[repr(C)]
    struct Pair {
        a: u16,
        b: u64,
    }

    #[test]
    fn sizes_follow_the_type() {
        let x = Pair { a: 1, b: 2 };
        assert_eq!(ElemRef::from_ref(&x).size(), size_of::<Pair>());
        assert_eq!(ElemRef::from_ref(&()).size(), 0);
    }

    #[test]
    fn read_and_write_through_views() {
        let mut x = Pair { a: 1, b: 2 };
        let mut elem = ElemMut::from_mut(&mut x);
        assert!(elem.is_aligned::<Pair>());

        unsafe {
            elem.write(Pair { a: 3, b: 4 });
            assert_eq!(elem.borrow().read::<Pair>(), Pair { a: 3, b: 4 });
        }
        assert_eq!(x, Pair { a: 3, b: 4 });
    }

    #[test]
    fn copy_from_copies_every_byte() {
        let src = Pair { a: 7, b: u64::MAX };
        let mut dst = Pair { a: 0, b: 0 };
        unsafe { ElemMut::from_mut(&mut dst).copy_from(ElemRef::from_ref(&src)) };
        assert_eq!(dst, src);
    }

    #[test]
    #[should_panic(expected = "element size mismatch")]
    fn copy_from_rejects_other_sizes() {
        let src = 1u8;
        let mut dst = 0u32;
        unsafe { ElemMut::from_mut(&mut dst).copy_from(ElemRef::from_ref(&src)) };
    }
}
