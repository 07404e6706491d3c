//! Bind native Rust code to a dynamically typed host runtime.
//!
//! `clbind` exposes native functions, constants and types to a host with its
//! own packages, symbols and classes. The host is reached only through the
//! [`Host`] trait; [`host::MemoryHost`] is a standalone implementation.
//!
//! ```
//! use clbind::prelude::*;
//!
//! let mut registry = initialize_binding(MemoryHost::new(), BindingConfig::default());
//! registry
//!     .register_package("math", |pkg| {
//!         pkg.defun("add", |a: i32, b: i32| a + b)?;
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! let sum = registry.call("math", "add", &[HostValue::int32(2), HostValue::int32(3)]).unwrap();
//! assert_eq!(sum.into_primary(), HostValue::int32(5));
//! ```
//!
//! The crates underneath:
//!
//! - `clbind-core`: type tags, the value codec, foreign handles and the
//!   function table
//! - `clbind-registry`: packages, function wrappers, classes and the
//!   registration context

pub mod host;

pub use clbind_core::{
    BindError, ConversionError, ErrorCode, FloatKind, ForeignHandle, FromHost, FunctionIndex, FunctionTable, GcRoots,
    Host, HostError, HostFunction, HostType, HostValue, IntoArgs, IntoHost, Mut, NativeError, NativeType, PackageId,
    Ref, RegistrationError, Symbol, TypeError, TypeHash, TypeTag, Values, box_value, boxed_native_pointer, create,
    create_with, lisp_type, native_type, register_type, unbox,
};
pub use clbind_registry::{
    BindingConfig, ClassBuilder, FunctionFlags, FunctionWrapper, Package, PackageBuilder, PackageRegistry,
    define_class,
};

pub use clbind_core as core;
pub use clbind_registry as registry;

/// Creates the binding context for `host`.
///
/// The returned registry owns the host handle and every registration made
/// through it. Create one per host runtime.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn initialize_binding<H: Host>(host: H, config: BindingConfig) -> PackageRegistry<H> {
    tracing::info!(
        upcase_names = config.upcase_names,
        force_convert = config.force_convert,
        protect_constants = config.protect_constants,
        "initializing binding"
    );
    PackageRegistry::new(host, config)
}

pub mod prelude {
    pub use crate::host::MemoryHost;
    pub use crate::initialize_binding;
    pub use clbind_core::{
        ClassOption, ConversionError, ForeignHandle, FromHost, Host, HostError, HostValue, IntoHost, Mut, NativeError,
        Ref, RegistrationError, SlotDescriptor, TypeTag, Values, native_type,
    };
    pub use clbind_registry::{BindingConfig, PackageBuilder, PackageRegistry};
    pub use num_complex::Complex;
}
