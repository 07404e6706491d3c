//! The binding context.
//!
//! [`PackageRegistry`] owns the host runtime handle, every registered
//! package, the append-only function table and the collector roots. One
//! registry exists per binding; it is created by `initialize_binding` and
//! passed explicitly wherever it is needed.
//!
//! ## Registration state
//!
//! ```text
//! Idle --register_package--> Registering --callback returns/fails/panics--> Idle
//! ```
//!
//! While registering, [`PackageRegistry::current_package`] is the package
//! being built. Registration errors never roll back what the callback had
//! already defined.
//!
//! The registry holds `Rc`-based host values and is therefore not `Send`;
//! it must stay on the thread that created it.

use std::cell::RefCell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use clbind_core::{
    ClassHandle, ClassOption, FunctionIndex, FunctionTable, GcRoots, Host, HostError, HostValue, IntoArgs,
    NativeError, PackageId, RegistrationError, SlotDescriptor, Symbol, TypeTag, Values,
};
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::class::define_class;
use crate::config::BindingConfig;
use crate::package::{Package, PackageBuilder};

/// Packages searched by [`PackageRegistry::find_type`] after the current one.
const DEFAULT_TYPE_PACKAGES: [&str; 2] = ["CL", "CL-USER"];

/// Registry of wrapped packages and their functions.
pub struct PackageRegistry<H: Host> {
    host: H,
    config: BindingConfig,
    packages: FxHashMap<PackageId, Rc<RefCell<Package>>>,
    functions: FunctionTable,
    roots: GcRoots,
    current: Option<Rc<RefCell<Package>>>,
}

impl<H: Host> PackageRegistry<H> {
    pub fn new(host: H, config: BindingConfig) -> Self {
        Self {
            host,
            config,
            packages: FxHashMap::default(),
            functions: FunctionTable::new(),
            roots: GcRoots::new(),
            current: None,
        }
    }

    pub fn config(&self) -> &BindingConfig {
        &self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    pub(crate) fn functions_mut(&mut self) -> &mut FunctionTable {
        &mut self.functions
    }

    pub fn roots(&self) -> &GcRoots {
        &self.roots
    }

    pub fn roots_mut(&mut self) -> &mut GcRoots {
        &mut self.roots
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Registers the package `name` and runs `callback` to populate it.
    ///
    /// Fails with a duplicate-package error if `name` was registered before.
    /// Errors and panics from the callback are returned as a [`HostError`];
    /// whatever the callback defined before failing stays registered.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn register_package<F>(&mut self, name: &str, callback: F) -> Result<(), HostError>
    where
        F: FnOnce(&mut PackageBuilder<'_, H>) -> Result<(), RegistrationError>,
    {
        let package = match self.create_package(name) {
            Ok(package) => package,
            Err(err) => {
                warn!(package = name, error = %err, "package registration rejected");
                return Err(err.into());
            }
        };
        self.current = Some(Rc::clone(&package));
        debug!(package = %package.borrow().id(), "registering package");

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let mut builder = PackageBuilder { registry: &mut *self, package: Rc::clone(&package) };
            callback(&mut builder)
        }));
        self.current = None;

        let package = package.borrow();
        match outcome {
            Ok(Ok(())) => {
                debug!(package = %package.id(), functions = package.function_count(), "registered package");
                Ok(())
            }
            Ok(Err(err)) => {
                warn!(package = %package.id(), error = %err, "package registration failed");
                Err(err.into())
            }
            Err(payload) => {
                let err = NativeError::from_panic(payload);
                warn!(package = %package.id(), error = %err, "package registration panicked");
                Err(err.into())
            }
        }
    }

    /// Creates an empty package for `name`, bound to its host package.
    pub fn create_package(&mut self, name: &str) -> Result<Rc<RefCell<Package>>, RegistrationError> {
        let canonical = self.config.canonical_name(name)?;
        let id = self.host.make_package(&canonical)?;
        if self.packages.contains_key(&id) {
            return Err(RegistrationError::DuplicatePackage(id.name().to_string()));
        }
        let package = Rc::new(RefCell::new(Package::new(id.clone())));
        self.packages.insert(id, Rc::clone(&package));
        Ok(package)
    }

    pub fn get_package(&self, name: &str) -> Result<Rc<RefCell<Package>>, RegistrationError> {
        let canonical = self.config.canonical_name(name)?;
        self.packages
            .get(&PackageId::new(&canonical))
            .cloned()
            .ok_or_else(|| RegistrationError::PackageNotFound(canonical.into_owned()))
    }

    pub fn has_package(&self, name: &str) -> bool {
        self.get_package(name).is_ok()
    }

    pub fn package_count(&self) -> usize {
        self.packages.len()
    }

    pub fn has_current_package(&self) -> bool {
        self.current.is_some()
    }

    /// The package being registered.
    ///
    /// # Panics
    ///
    /// Panics when no registration is in progress.
    pub fn current_package(&self) -> Rc<RefCell<Package>> {
        match &self.current {
            Some(package) => Rc::clone(package),
            None => panic!("current_package called outside of register_package"),
        }
    }

    /// Declares a class in a registered package.
    ///
    /// Each supertype is either `PKG::NAME` or a bare name in `package`.
    pub fn define_class(
        &mut self,
        package: &str,
        name: &str,
        supertypes: &[&str],
        options: Vec<ClassOption>,
        slots: Vec<SlotDescriptor>,
    ) -> Result<ClassHandle, RegistrationError> {
        let package = self.get_package(package)?;
        let id = package.borrow().id().clone();
        let name = self.config.canonical_name(name)?.into_owned();
        let mut resolved = Vec::with_capacity(supertypes.len());
        for supertype in supertypes {
            resolved.push(self.supertype_symbol(&id, supertype)?);
        }
        let handle = define_class(&mut self.host, &name, &id, &resolved, options, slots)?;
        package.borrow_mut().add_class(handle.clone());
        Ok(handle)
    }

    /// Symbol of a supertype reference.
    ///
    /// `PKG::NAME` refers to any host package; a bare name is interned in
    /// `home`.
    pub(crate) fn supertype_symbol(&mut self, home: &PackageId, reference: &str) -> Result<Symbol, RegistrationError> {
        let (id, name) = match reference.split_once("::") {
            Some((package_name, name)) => {
                let package_name = self.config.canonical_name(package_name)?;
                let id = self
                    .host
                    .find_package(&package_name)
                    .ok_or_else(|| RegistrationError::PackageNotFound(package_name.into_owned()))?;
                (id, name)
            }
            None => (home.clone(), reference),
        };
        let name = self.config.canonical_name(name)?;
        Ok(self.host.intern(&id, &name))
    }

    /// Resolves a class tag by name.
    ///
    /// Searches `package` if given, otherwise the current package followed by
    /// `CL` and `CL-USER`.
    pub fn find_type(&self, name: &str, package: Option<&str>) -> Result<TypeTag, RegistrationError> {
        let canonical = self.config.canonical_name(name)?;
        let candidates: Vec<String> = match package {
            Some(package) => vec![self.config.canonical_name(package)?.into_owned()],
            None => self
                .current
                .iter()
                .map(|p| p.borrow().name().to_string())
                .chain(DEFAULT_TYPE_PACKAGES.iter().map(|p| p.to_string()))
                .collect(),
        };
        for candidate in &candidates {
            let Some(id) = self.host.find_package(candidate) else {
                continue;
            };
            if let Some(class) = self.host.find_class(&Symbol::interned(&id, &canonical)) {
                return Ok(class.tag());
            }
        }
        Err(RegistrationError::TypeNotFound { name: canonical.into_owned(), searched: candidates })
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// Host-side entry: runs the table entry at `index`.
    pub fn dispatch(&self, index: FunctionIndex, args: &[HostValue]) -> Result<Values, HostError> {
        self.functions.dispatch(index, args).map_err(|err| {
            warn!(%index, error = %err, "native call failed");
            HostError::from(err)
        })
    }

    /// Host-side entry: calls the function bound to `package::name`.
    pub fn call(&self, package: &str, name: &str, args: &[HostValue]) -> Result<Values, HostError> {
        let symbol = self.resolve_function_symbol(package, name)?;
        let Some(function) = self.host.find_function(&symbol) else {
            let err = RegistrationError::FunctionNotFound { package: package.to_string(), name: name.to_string() };
            return Err(err.into());
        };
        function.invoke(&self.functions, args).map_err(|err| {
            warn!(%symbol, error = %err, "native call failed");
            HostError::from(err)
        })
    }

    /// Native-side entry: boxes `args` and calls the host function `package::name`.
    pub fn funcall<A: IntoArgs>(&self, package: &str, name: &str, args: A) -> Result<Values, RegistrationError> {
        let args = args.into_args()?;
        let symbol = self.resolve_function_symbol(package, name)?;
        let Some(function) = self.host.find_function(&symbol) else {
            return Err(RegistrationError::FunctionNotFound { package: package.to_string(), name: name.to_string() });
        };
        Ok(function.invoke(&self.functions, &args)?)
    }

    fn resolve_function_symbol(&self, package: &str, name: &str) -> Result<Symbol, RegistrationError> {
        let package_name = self.config.canonical_name(package)?;
        let id = self
            .host
            .find_package(&package_name)
            .ok_or_else(|| RegistrationError::PackageNotFound(package_name.to_string()))?;
        let name = self.config.canonical_name(name)?;
        Ok(Symbol::interned(&id, &name))
    }
}

impl<H: Host + std::fmt::Debug> std::fmt::Debug for PackageRegistry<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageRegistry")
            .field("host", &self.host)
            .field("config", &self.config)
            .field("packages", &self.packages.len())
            .field("functions", &self.functions)
            .field("registering", &self.current.is_some())
            .finish()
    }
}
