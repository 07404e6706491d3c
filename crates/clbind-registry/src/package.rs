//! Packages and the builder handed to registration callbacks.

use std::cell::{Ref as CellRef, RefCell};
use std::rc::Rc;

use clbind_core::{
    ClassHandle, FunctionIndex, Host, HostFunction, HostType, IntoHost, IntoNativeFn, NativeFnPtr, NativeType,
    PackageId, RegistrationError, ReturnAdapter, Symbol, TypeHash, TypeTag,
};
use tracing::debug;

use crate::class::ClassBuilder;
use crate::function::{FunctionFlags, FunctionWrapper};
use crate::registry::PackageRegistry;

/// Everything registered under one host package.
#[derive(Debug)]
pub struct Package {
    id: PackageId,
    functions: Vec<FunctionWrapper>,
    constants: Vec<Symbol>,
    classes: Vec<ClassHandle>,
}

impl Package {
    pub(crate) fn new(id: PackageId) -> Self {
        Self { id, functions: Vec::new(), constants: Vec::new(), classes: Vec::new() }
    }

    pub fn id(&self) -> &PackageId {
        &self.id
    }

    pub fn name(&self) -> &str {
        self.id.name()
    }

    /// Functions in registration order.
    pub fn functions(&self) -> &[FunctionWrapper] {
        &self.functions
    }

    /// Function registered under the interned `name`.
    pub fn function(&self, name: &str) -> Option<&FunctionWrapper> {
        self.functions.iter().find(|f| f.name() == name)
    }

    /// Function whose qualified name and argument tags hash to `hash`.
    pub fn function_by_hash(&self, hash: TypeHash) -> Option<&FunctionWrapper> {
        self.functions.iter().find(|f| f.hash == hash)
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    pub fn constants(&self) -> &[Symbol] {
        &self.constants
    }

    pub fn classes(&self) -> &[ClassHandle] {
        &self.classes
    }

    // A redefinition replaces the earlier wrapper in place.
    fn add_function(&mut self, wrapper: FunctionWrapper) {
        match self.functions.iter_mut().find(|f| f.symbol == wrapper.symbol) {
            Some(existing) => *existing = wrapper,
            None => self.functions.push(wrapper),
        }
    }

    pub(crate) fn add_class(&mut self, class: ClassHandle) {
        if !self.classes.contains(&class) {
            self.classes.push(class);
        }
    }
}

/// Registration API for the package currently being registered.
///
/// ```ignore
/// registry.register_package("geometry", |pkg| {
///     pkg.defun("area", |w: f64, h: f64| w * h)?;
///     pkg.defconstant("+origin+", 0i32)?;
///     Ok(())
/// })?;
/// ```
pub struct PackageBuilder<'r, H: Host> {
    pub(crate) registry: &'r mut PackageRegistry<H>,
    pub(crate) package: Rc<RefCell<Package>>,
}

impl<'r, H: Host> PackageBuilder<'r, H> {
    pub fn id(&self) -> PackageId {
        self.package.borrow().id().clone()
    }

    pub fn package(&self) -> CellRef<'_, Package> {
        self.package.borrow()
    }

    pub fn registry(&self) -> &PackageRegistry<H> {
        self.registry
    }

    pub fn host_mut(&mut self) -> &mut H {
        self.registry.host_mut()
    }

    /// Interns `name` in this package, after canonicalization.
    pub fn intern(&mut self, name: &str) -> Result<Symbol, RegistrationError> {
        let canonical = self.registry.config().canonical_name(name)?.into_owned();
        let id = self.id();
        Ok(self.registry.host_mut().intern(&id, &canonical))
    }

    /// Exposes a native callable through the conversion path.
    pub fn defun<F, Args, R>(&mut self, name: &str, f: F) -> Result<&mut Self, RegistrationError>
    where
        F: IntoNativeFn<Args, R>,
        R: ReturnAdapter,
    {
        self.define_converted(name, f, FunctionFlags::empty())?;
        Ok(self)
    }

    /// Exposes a plain function pointer.
    ///
    /// When every parameter and the return are host values and neither
    /// `force_convert` nor the binding config asks for conversion, the host
    /// calls the pointer directly. Otherwise this behaves like [`defun`](Self::defun).
    pub fn defun_ptr<P>(&mut self, name: &str, f: P, force_convert: bool) -> Result<&mut Self, RegistrationError>
    where
        P: NativeFnPtr + IntoNativeFn<<P as NativeFnPtr>::Args, <P as NativeFnPtr>::Ret>,
        <P as NativeFnPtr>::Ret: ReturnAdapter,
    {
        let convert = force_convert
            || self.registry.config().force_convert
            || <P as IntoNativeFn<<P as NativeFnPtr>::Args, <P as NativeFnPtr>::Ret>>::NEEDS_CONVERSION;
        match f.raw() {
            Some(raw) if !convert => {
                let argument_types = vec![TypeTag::T; raw.arity()];
                self.define(name, HostFunction::Direct(raw), argument_types, Some(TypeTag::T), FunctionFlags::DIRECT)?;
            }
            _ => {
                self.define_converted(name, f, FunctionFlags::empty())?;
            }
        }
        Ok(self)
    }

    /// Defines a host constant in this package.
    ///
    /// The value is rooted only once the host accepted it. Redefining a
    /// constant of this package neither roots nor records it again.
    pub fn defconstant<T: IntoHost>(&mut self, name: &str, value: T) -> Result<&mut Self, RegistrationError> {
        let value = value.into_host()?;
        let symbol = self.intern(name)?;
        self.registry.host_mut().make_constant(&symbol, value.clone())?;
        if self.package.borrow().constants.contains(&symbol) {
            debug!(%symbol, "constant redefined");
            return Ok(self);
        }
        if self.registry.config().protect_constants {
            self.registry.roots_mut().protect(&value);
        }
        debug!(%symbol, "defined constant");
        self.package.borrow_mut().constants.push(symbol);
        Ok(self)
    }

    /// Starts a class wrapping the native type `T`.
    ///
    /// `T`'s tag is fixed immediately, so methods can take `Ref<T>` before
    /// the class is declared with [`ClassBuilder::build`].
    pub fn defclass<T: NativeType>(&mut self, name: &str) -> Result<ClassBuilder<'_, 'r, H, T>, RegistrationError> {
        ClassBuilder::new(self, name)
    }

    pub(crate) fn define_converted<F, Args, R>(
        &mut self,
        name: &str,
        f: F,
        flags: FunctionFlags,
    ) -> Result<FunctionIndex, RegistrationError>
    where
        F: IntoNativeFn<Args, R>,
        R: ReturnAdapter,
    {
        self.registry.config().canonical_name(name)?;
        let argument_types = F::argument_types()?;
        let return_type = F::return_type()?;
        let dispatcher = F::dispatcher();
        let index = self.registry.functions_mut().push(f.into_callable(), dispatcher, F::ARITY);
        let entry = HostFunction::Dispatch { index, dispatcher, arity: F::ARITY };
        let mut flags = flags | FunctionFlags::CONVERTED;
        if return_type.is_none() {
            flags |= FunctionFlags::VOID;
        }
        self.define(name, entry, argument_types, return_type, flags)?;
        Ok(index)
    }

    fn define(
        &mut self,
        name: &str,
        entry: HostFunction,
        argument_types: Vec<TypeTag>,
        return_type: Option<TypeTag>,
        flags: FunctionFlags,
    ) -> Result<(), RegistrationError> {
        let symbol = self.intern(name)?;
        self.registry.host_mut().define_function(&symbol, entry)?;
        let hash = FunctionWrapper::signature_hash(&symbol, &argument_types);
        debug!(%symbol, index = ?entry.index(), ?flags, "defined function");
        self.package.borrow_mut().add_function(FunctionWrapper {
            symbol,
            hash,
            argument_types,
            return_type,
            entry,
            flags,
        });
        Ok(())
    }
}

/// Host tag of `T`, mapped into a registration error.
pub(crate) fn tag_of<T: HostType>() -> Result<TypeTag, RegistrationError> {
    Ok(T::lisp_type()?)
}
