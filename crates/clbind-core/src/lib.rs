//! Core types for binding native code to a dynamically typed host runtime.
//!
//! This crate holds everything a single native value or function needs to
//! cross the boundary:
//!
//! - [`TypeTag`] and [`HostType`]: the host type of every native type
//! - [`HostValue`], [`FromHost`] and [`IntoHost`]: the value codec
//! - [`ForeignHandle`]: native objects referenced from the host, with finalizers
//! - [`FunctionTable`] and [`IntoNativeFn`]: type-erased native callables
//! - [`Host`]: the services the host runtime provides
//!
//! Host values are reference counted with [`Rc`](std::rc::Rc), so nothing in
//! this crate is `Send`; a binding lives on the thread that created it.

pub mod convert;
pub mod error;
pub mod foreign;
pub mod gc;
pub mod host;
pub mod native_fn;
pub mod type_hash;
pub mod type_tag;
pub mod value;

pub use convert::{FromHost, HostType, IntoHost, NativeType, box_value, lisp_type, register_type, unbox};
pub use error::{BindError, ConversionError, ErrorCode, HostError, NativeError, RegistrationError, TypeError};
pub use foreign::{FinalizerFn, ForeignHandle, Mut, Ref, boxed_native_pointer, create, create_with};
pub use gc::GcRoots;
pub use host::{ClassDeclaration, ClassHandle, ClassOption, Host, SlotDescriptor};
pub use native_fn::{
    Dispatcher, FunctionIndex, FunctionTable, HostFunction, IntoArgs, IntoNativeFn, NativeFnPtr, RawFn,
    ReturnAdapter, Values,
};
pub use type_hash::TypeHash;
pub use type_tag::{FloatKind, TypeSlot, TypeTag};
pub use value::{HostValue, PackageId, Symbol};
