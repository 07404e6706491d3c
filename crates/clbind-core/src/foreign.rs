//! Native objects referenced from the host.
//!
//! A [`ForeignHandle`] is the single-field wrapper that carries a native
//! address into the host. It may own a finalizer: once attached, the native
//! object belongs to the host and is deleted exactly once, either when the
//! last handle is dropped or when the finalizer is run explicitly.
//!
//! Borrowing a wrapped object in a native call goes through [`Ref`] and
//! [`Mut`], which check the tag and the released state before handing out
//! a reference. The handle tracks live borrows like a `RefCell`: any number
//! of `Ref`s or one `Mut`, and no finalization while either is held.

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use tracing::debug;

use crate::convert::{FromHost, HostType, NativeType};
use crate::error::{ConversionError, TypeError};
use crate::{HostValue, TypeTag};

/// Deletes the object at the given address.
pub type FinalizerFn = unsafe fn(*mut ());

#[derive(Clone, Copy)]
enum FinalizerState {
    /// Native code owns the object.
    Unattached,
    /// The host owns the object and will delete it with this thunk.
    Pending(FinalizerFn),
    /// The finalizer ran; the address is null.
    Released,
}

/// Live borrow count: positive for shared borrows, -1 for the exclusive one.
type BorrowFlag = isize;

const UNUSED: BorrowFlag = 0;
const EXCLUSIVE: BorrowFlag = -1;

struct ForeignCell {
    address: Cell<*mut ()>,
    tag: TypeTag,
    finalizer: Cell<FinalizerState>,
    borrow: Cell<BorrowFlag>,
}

impl ForeignCell {
    fn borrow_shared(&self) -> bool {
        let flag = self.borrow.get();
        if flag < UNUSED {
            return false;
        }
        self.borrow.set(flag + 1);
        true
    }

    fn borrow_exclusive(&self) -> bool {
        if self.borrow.get() != UNUSED {
            return false;
        }
        self.borrow.set(EXCLUSIVE);
        true
    }

    fn release_shared(&self) {
        self.borrow.set(self.borrow.get() - 1);
    }

    fn release_exclusive(&self) {
        self.borrow.set(UNUSED);
    }

    fn run_finalizer(&self) -> bool {
        if self.borrow.get() != UNUSED {
            debug!(tag = %self.tag, "finalizer skipped, object is borrowed");
            return false;
        }
        match self.finalizer.get() {
            FinalizerState::Pending(delete) => {
                self.finalizer.set(FinalizerState::Released);
                let address = self.address.replace(std::ptr::null_mut());
                debug!(tag = %self.tag, ?address, "running finalizer");
                if !address.is_null() {
                    // SAFETY: the thunk was attached together with an address
                    // it knows how to delete, and Released guarantees one run.
                    unsafe { delete(address) };
                }
                true
            }
            FinalizerState::Unattached | FinalizerState::Released => false,
        }
    }
}

impl Drop for ForeignCell {
    fn drop(&mut self) {
        self.run_finalizer();
    }
}

/// Shared handle onto a native address.
#[derive(Clone)]
pub struct ForeignHandle(Rc<ForeignCell>);

impl ForeignHandle {
    /// Wraps `address` without a finalizer; native code keeps ownership.
    pub fn new(address: *mut (), tag: TypeTag) -> Self {
        Self(Rc::new(ForeignCell {
            address: Cell::new(address),
            tag,
            finalizer: Cell::new(FinalizerState::Unattached),
            borrow: Cell::new(UNUSED),
        }))
    }

    pub fn address(&self) -> *mut () {
        self.0.address.get()
    }

    pub fn tag(&self) -> TypeTag {
        self.0.tag
    }

    pub fn is_null(&self) -> bool {
        self.address().is_null()
    }

    pub fn has_finalizer(&self) -> bool {
        matches!(self.0.finalizer.get(), FinalizerState::Pending(_))
    }

    /// True once the finalizer has deleted the object.
    pub fn is_released(&self) -> bool {
        matches!(self.0.finalizer.get(), FinalizerState::Released)
    }

    /// Transfers ownership of the object to the host.
    ///
    /// Returns `false` and leaves the handle unchanged if a finalizer was
    /// already attached or has already run.
    ///
    /// # Safety
    ///
    /// `delete` must be the correct deleter for the handle's address, and
    /// native code must not free the object afterwards.
    pub unsafe fn attach_finalizer(&self, delete: FinalizerFn) -> bool {
        match self.0.finalizer.get() {
            FinalizerState::Unattached => {
                self.0.finalizer.set(FinalizerState::Pending(delete));
                true
            }
            FinalizerState::Pending(_) | FinalizerState::Released => false,
        }
    }

    /// Runs the finalizer now, as the collector would.
    ///
    /// Returns whether the object was deleted by this call. Later calls, and
    /// the drop of the last handle, are no-ops. While a [`Ref`] or [`Mut`]
    /// borrows the object nothing happens and `false` is returned; the
    /// finalizer stays pending.
    pub fn finalize(&self) -> bool {
        self.0.run_finalizer()
    }

    /// True while a [`Ref`] or [`Mut`] borrows the object.
    pub fn is_borrowed(&self) -> bool {
        self.0.borrow.get() != UNUSED
    }

    /// Number of live handles sharing this object.
    pub fn handle_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    pub fn ptr_eq(&self, other: &ForeignHandle) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn identity(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    fn checked_address(
        &self,
        expected: TypeTag,
        target_type: &'static str,
    ) -> Result<*mut (), ConversionError> {
        if self.tag() != expected {
            return Err(ConversionError::mismatch(expected, "SI:FOREIGN-DATA"));
        }
        if self.is_released() {
            return Err(ConversionError::ReleasedHandle { target_type });
        }
        let address = self.address();
        if address.is_null() {
            return Err(ConversionError::NullHandle { target_type });
        }
        Ok(address)
    }
}

impl fmt::Debug for ForeignHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.0.finalizer.get() {
            FinalizerState::Unattached => "native",
            FinalizerState::Pending(_) => "host",
            FinalizerState::Released => "released",
        };
        write!(f, "#<FOREIGN {} {:p} {}>", self.tag(), self.address(), state)
    }
}

unsafe fn delete_boxed<T>(address: *mut ()) {
    // SAFETY: only attached by `boxed_native_pointer::<T>`, whose contract
    // requires the address to come from `Box::<T>::into_raw`.
    drop(unsafe { Box::from_raw(address.cast::<T>()) });
}

/// Wraps a native pointer in a host value.
///
/// With `attach_finalizer`, the host takes ownership and deletes the object
/// as a `Box<T>` when the handle becomes unreachable.
///
/// # Safety
///
/// With `attach_finalizer`, `ptr` must come from `Box::<T>::into_raw` and
/// must never be freed by native code. Boxing the same pointer twice with a
/// finalizer deletes it twice.
pub unsafe fn boxed_native_pointer<T>(ptr: *mut T, tag: TypeTag, attach_finalizer: bool) -> HostValue {
    let handle = ForeignHandle::new(ptr.cast::<()>(), tag);
    if attach_finalizer {
        // SAFETY: fresh handle, and the caller vouches for the Box origin.
        unsafe { handle.attach_finalizer(delete_boxed::<T>) };
    }
    HostValue::Foreign(handle)
}

/// Heap-allocates `value` and boxes it with a finalizer.
pub fn create<T: NativeType>(value: T) -> Result<HostValue, TypeError> {
    create_with(value, true)
}

/// Heap-allocates `value` and boxes it.
///
/// Without `finalize` the allocation is never freed by the host; native code
/// must reclaim it.
pub fn create_with<T: NativeType>(value: T, finalize: bool) -> Result<HostValue, TypeError> {
    let tag = <T as HostType>::lisp_type()?;
    let ptr = Box::into_raw(Box::new(value));
    // SAFETY: `ptr` was produced by `Box::into_raw` just above.
    Ok(unsafe { boxed_native_pointer(ptr, tag, finalize) })
}

/// Shared borrow of a wrapped native object, used as a receiver or argument.
///
/// Holding the `Ref` keeps the handle alive and the object unfinalized for
/// the duration of the call. Building one fails while a [`Mut`] of the same
/// object is live.
pub struct Ref<T> {
    handle: ForeignHandle,
    _marker: PhantomData<*const T>,
}

impl<T> Ref<T> {
    pub fn handle(&self) -> &ForeignHandle {
        &self.handle
    }
}

impl<T> Deref for Ref<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the address was checked non-null and of T's tag when the
        // Ref was built. The shared borrow held by `self` keeps the finalizer
        // from running and excludes any `Mut` until it is dropped.
        unsafe { &*self.handle.address().cast::<T>() }
    }
}

impl<T> Drop for Ref<T> {
    fn drop(&mut self) {
        self.handle.0.release_shared();
    }
}

impl<T: NativeType> HostType for Ref<T> {
    const FUNDAMENTAL: bool = false;

    fn lisp_type() -> Result<TypeTag, TypeError> {
        <T as HostType>::lisp_type()
    }

    fn type_name() -> &'static str {
        <T as HostType>::type_name()
    }
}

impl<T: NativeType> FromHost for Ref<T> {
    fn from_host(value: &HostValue) -> Result<Self, ConversionError> {
        let expected = <T as HostType>::lisp_type()?;
        match value {
            HostValue::Foreign(handle) => {
                let target_type = <T as HostType>::type_name();
                handle.checked_address(expected, target_type)?;
                if !handle.0.borrow_shared() {
                    return Err(ConversionError::AlreadyBorrowed { target_type });
                }
                Ok(Ref { handle: handle.clone(), _marker: PhantomData })
            }
            other => Err(ConversionError::mismatch(expected, other.type_name())),
        }
    }
}

/// Exclusive borrow of a wrapped native object.
///
/// Building one fails while any other borrow of the same object is live, so
/// a call that receives one object twice cannot alias it.
pub struct Mut<T> {
    handle: ForeignHandle,
    _marker: PhantomData<*mut T>,
}

impl<T> Mut<T> {
    pub fn handle(&self) -> &ForeignHandle {
        &self.handle
    }
}

impl<T> Deref for Mut<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: see `Ref::deref`.
        unsafe { &*self.handle.address().cast::<T>() }
    }
}

impl<T> DerefMut for Mut<T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: see `Ref::deref`; the exclusive borrow held by `self`
        // rules out every other `Ref` and `Mut` of this object.
        unsafe { &mut *self.handle.address().cast::<T>() }
    }
}

impl<T> Drop for Mut<T> {
    fn drop(&mut self) {
        self.handle.0.release_exclusive();
    }
}

impl<T: NativeType> HostType for Mut<T> {
    const FUNDAMENTAL: bool = false;

    fn lisp_type() -> Result<TypeTag, TypeError> {
        <T as HostType>::lisp_type()
    }

    fn type_name() -> &'static str {
        <T as HostType>::type_name()
    }
}

impl<T: NativeType> FromHost for Mut<T> {
    fn from_host(value: &HostValue) -> Result<Self, ConversionError> {
        let expected = <T as HostType>::lisp_type()?;
        match value {
            HostValue::Foreign(handle) => {
                let target_type = <T as HostType>::type_name();
                handle.checked_address(expected, target_type)?;
                if !handle.0.borrow_exclusive() {
                    return Err(ConversionError::AlreadyBorrowed { target_type });
                }
                Ok(Mut { handle: handle.clone(), _marker: PhantomData })
            }
            other => Err(ConversionError::mismatch(expected, other.type_name())),
        }
    }
}
