//! Class declaration and wrapped class registration.
//!
//! [`define_class`] is the low-level, idempotent declaration of a host class
//! from ordered slot descriptors. [`ClassBuilder`] wraps a native type: it
//! fixes the type's tag, exposes its constructors and methods, and declares
//! the host class when built.

use std::marker::PhantomData;

use clbind_core::{
    ClassDeclaration, ClassHandle, ClassOption, FromHost, Host, HostType, IntoHost, IntoNativeFn, Mut, NativeType,
    PackageId, Ref, RegistrationError, ReturnAdapter, SlotDescriptor, Symbol, TypeHash, TypeTag, register_type,
};
use rustc_hash::FxHashSet;
use tracing::debug;

use crate::function::FunctionFlags;
use crate::package::{PackageBuilder, tag_of};

/// Declares the class `name` in `package`, or returns it if it already exists.
///
/// `name` is used as given; slot order is kept exactly. A second call with
/// the same name in the same package returns the first class unchanged.
pub fn define_class<H: Host>(
    host: &mut H,
    name: &str,
    package: &PackageId,
    supertypes: &[Symbol],
    options: Vec<ClassOption>,
    slots: Vec<SlotDescriptor>,
) -> Result<ClassHandle, RegistrationError> {
    if name.trim().is_empty() {
        return Err(RegistrationError::InvalidName(name.to_string()));
    }
    let symbol = host.intern(package, name);
    if let Some(existing) = host.find_class(&symbol) {
        debug!(%symbol, "class already defined");
        return Ok(existing);
    }

    let mut seen = FxHashSet::default();
    for slot in &slots {
        if !seen.insert(slot.name.as_str()) {
            return Err(RegistrationError::DuplicateSlot { class: symbol.to_string(), slot: slot.name.clone() });
        }
    }

    let declaration = ClassDeclaration {
        hash: TypeHash::from_qualified(package.name(), name),
        symbol,
        supertypes: supertypes.to_vec(),
        slots,
        options,
    };
    debug!(symbol = %declaration.symbol, slots = declaration.slots.len(), "declaring class");
    Ok(host.declare_class(declaration)?)
}

// ============================================================================
// Method adaptation
// ============================================================================

/// A native method taking `&T` as its receiver.
pub trait IntoMethod<T, Args, R> {
    /// Host-visible parameters: the receiver then `Args`.
    type Params;
    type Adapted: IntoNativeFn<Self::Params, R>;

    fn adapt(self) -> Self::Adapted;
}

/// A native method taking `&mut T` as its receiver.
pub trait IntoMethodMut<T, Args, R> {
    type Params;
    type Adapted: IntoNativeFn<Self::Params, R>;

    fn adapt(self) -> Self::Adapted;
}

macro_rules! impl_into_method {
    ($($arg:ident),*) => {
        impl<T, F, R, $($arg,)*> IntoMethod<T, ($($arg,)*), R> for F
        where
            T: NativeType,
            F: Fn(&T, $($arg),*) -> R + 'static,
            R: ReturnAdapter + 'static,
            $($arg: FromHost + 'static,)*
        {
            type Params = (Ref<T>, $($arg,)*);
            type Adapted = Box<dyn Fn(Ref<T>, $($arg),*) -> R>;

            #[allow(non_snake_case)]
            fn adapt(self) -> Self::Adapted {
                Box::new(move |this: Ref<T>, $($arg: $arg),*| self(&*this, $($arg),*))
            }
        }

        impl<T, F, R, $($arg,)*> IntoMethodMut<T, ($($arg,)*), R> for F
        where
            T: NativeType,
            F: Fn(&mut T, $($arg),*) -> R + 'static,
            R: ReturnAdapter + 'static,
            $($arg: FromHost + 'static,)*
        {
            type Params = (Mut<T>, $($arg,)*);
            type Adapted = Box<dyn Fn(Mut<T>, $($arg),*) -> R>;

            #[allow(non_snake_case)]
            fn adapt(self) -> Self::Adapted {
                Box::new(move |mut this: Mut<T>, $($arg: $arg),*| self(&mut *this, $($arg),*))
            }
        }
    };
}

impl_into_method!();
impl_into_method!(A1);
impl_into_method!(A1, A2);
impl_into_method!(A1, A2, A3);
impl_into_method!(A1, A2, A3, A4);
impl_into_method!(A1, A2, A3, A4, A5);
impl_into_method!(A1, A2, A3, A4, A5, A6);

// ============================================================================
// Class builder
// ============================================================================

/// Builder for a class wrapping the native type `T`.
pub struct ClassBuilder<'b, 'r, H: Host, T: NativeType> {
    package: &'b mut PackageBuilder<'r, H>,
    name: String,
    tag: TypeTag,
    supertypes: Vec<String>,
    slots: Vec<SlotDescriptor>,
    options: Vec<ClassOption>,
    _marker: PhantomData<fn() -> T>,
}

impl<'b, 'r, H: Host, T: NativeType> ClassBuilder<'b, 'r, H, T> {
    pub(crate) fn new(package: &'b mut PackageBuilder<'r, H>, name: &str) -> Result<Self, RegistrationError> {
        let name = package.registry.config().canonical_name(name)?.into_owned();
        let tag = TypeTag::Class(TypeHash::from_qualified(package.id().name(), &name));
        register_type::<T>(tag)?;
        Ok(Self {
            package,
            name,
            tag,
            supertypes: Vec::new(),
            slots: Vec::new(),
            options: Vec::new(),
            _marker: PhantomData,
        })
    }

    /// Tag of `T`, valid before the class is declared.
    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    /// Adds a supertype.
    ///
    /// `name` is either `PKG::NAME`, for a class of any host package, or a
    /// bare name in this class's package.
    pub fn supertype(mut self, name: &str) -> Self {
        self.supertypes.push(name.to_string());
        self
    }

    /// Appends a slot of type `S`.
    pub fn slot<S: HostType>(mut self, name: &str) -> Result<Self, RegistrationError> {
        let name = self.package.registry.config().canonical_name(name)?.into_owned();
        self.slots.push(SlotDescriptor::new(name, tag_of::<S>()?));
        Ok(self)
    }

    pub fn option(mut self, option: ClassOption) -> Self {
        self.options.push(option);
        self
    }

    /// Exposes a function returning a new `T` as a constructor.
    pub fn constructor<F, Args>(self, name: &str, f: F) -> Result<Self, RegistrationError>
    where
        F: IntoNativeFn<Args, T>,
        T: IntoHost,
    {
        self.package.define_converted(name, f, FunctionFlags::CONSTRUCTOR)?;
        Ok(self)
    }

    /// Exposes a method borrowing the receiver immutably.
    pub fn method<M, Args, R>(self, name: &str, f: M) -> Result<Self, RegistrationError>
    where
        M: IntoMethod<T, Args, R>,
        R: ReturnAdapter,
    {
        self.package.define_converted(name, f.adapt(), FunctionFlags::METHOD)?;
        Ok(self)
    }

    /// Exposes a method borrowing the receiver mutably.
    pub fn method_mut<M, Args, R>(self, name: &str, f: M) -> Result<Self, RegistrationError>
    where
        M: IntoMethodMut<T, Args, R>,
        R: ReturnAdapter,
    {
        self.package.define_converted(name, f.adapt(), FunctionFlags::METHOD | FunctionFlags::MUTATING)?;
        Ok(self)
    }

    /// Declares the host class and records it on the package.
    pub fn build(self) -> Result<ClassHandle, RegistrationError> {
        let id = self.package.id();
        let mut supertypes = Vec::with_capacity(self.supertypes.len());
        for name in &self.supertypes {
            supertypes.push(self.package.registry.supertype_symbol(&id, name)?);
        }
        let handle = define_class(self.package.host_mut(), &self.name, &id, &supertypes, self.options, self.slots)?;
        self.package.package.borrow_mut().add_class(handle.clone());
        Ok(handle)
    }
}
