//! Host runtime services and an in-memory host.
//!
//! [`MemoryHost`] implements [`Host`] with plain maps. It is enough to run
//! registrations and calls end to end without an embedded runtime, and it
//! keeps every declaration inspectable.

use rustc_hash::FxHashMap;
use tracing::debug;

pub use clbind_core::host::{ClassDeclaration, ClassHandle, ClassOption, Host, SlotDescriptor};
use clbind_core::{HostError, HostFunction, HostValue, PackageId, Symbol};

/// Packages every [`MemoryHost`] starts with.
pub const STANDARD_PACKAGES: [&str; 2] = ["CL", "CL-USER"];

/// A host whose packages, functions, constants and classes live in maps.
#[derive(Debug)]
pub struct MemoryHost {
    packages: FxHashMap<String, PackageId>,
    functions: FxHashMap<Symbol, HostFunction>,
    constants: FxHashMap<Symbol, HostValue>,
    classes: FxHashMap<Symbol, ClassDeclaration>,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHost {
    /// Creates a host with the standard packages.
    pub fn new() -> Self {
        let packages = STANDARD_PACKAGES.iter().map(|name| (name.to_string(), PackageId::new(name))).collect();
        Self {
            packages,
            functions: FxHashMap::default(),
            constants: FxHashMap::default(),
            classes: FxHashMap::default(),
        }
    }

    /// Package names, sorted.
    pub fn package_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.packages.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    /// Declaration of the class named by `symbol`.
    pub fn class(&self, symbol: &Symbol) -> Option<&ClassDeclaration> {
        self.classes.get(symbol)
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Looks up `package::name` without interning anything.
    pub fn lookup(&self, package: &str, name: &str) -> Option<Symbol> {
        self.packages.get(package).map(|id| Symbol::interned(id, name))
    }
}

impl Host for MemoryHost {
    fn make_package(&mut self, name: &str) -> Result<PackageId, HostError> {
        if name.is_empty() {
            return Err(HostError::host("package name must not be empty"));
        }
        let id = self.packages.entry(name.to_string()).or_insert_with(|| {
            debug!(package = name, "created host package");
            PackageId::new(name)
        });
        Ok(id.clone())
    }

    fn find_package(&self, name: &str) -> Option<PackageId> {
        self.packages.get(name).cloned()
    }

    fn intern(&mut self, package: &PackageId, name: &str) -> Symbol {
        Symbol::interned(package, name)
    }

    fn define_function(&mut self, symbol: &Symbol, function: HostFunction) -> Result<(), HostError> {
        self.functions.insert(symbol.clone(), function);
        Ok(())
    }

    fn find_function(&self, symbol: &Symbol) -> Option<HostFunction> {
        self.functions.get(symbol).copied()
    }

    fn make_constant(&mut self, symbol: &Symbol, value: HostValue) -> Result<(), HostError> {
        match self.constants.get(symbol) {
            Some(existing) if *existing != value => {
                Err(HostError::host(format!("constant {symbol} is already defined as {existing:?}")))
            }
            Some(_) => Ok(()),
            None => {
                self.constants.insert(symbol.clone(), value);
                Ok(())
            }
        }
    }

    fn constant_value(&self, symbol: &Symbol) -> Option<HostValue> {
        self.constants.get(symbol).cloned()
    }

    fn find_class(&self, symbol: &Symbol) -> Option<ClassHandle> {
        self.classes
            .get(symbol)
            .map(|declaration| ClassHandle { symbol: declaration.symbol.clone(), hash: declaration.hash })
    }

    fn declare_class(&mut self, declaration: ClassDeclaration) -> Result<ClassHandle, HostError> {
        for supertype in &declaration.supertypes {
            if !self.classes.contains_key(supertype) {
                return Err(HostError::host(format!("unknown superclass {supertype} for {}", declaration.symbol)));
            }
        }
        let handle = ClassHandle { symbol: declaration.symbol.clone(), hash: declaration.hash };
        self.classes.insert(declaration.symbol.clone(), declaration);
        Ok(handle)
    }
}
