//! The services the binding needs from the host runtime.
//!
//! The [`Host`] trait is the only way native code reaches the host's package
//! system, function namespace and class system. The binding never assumes
//! anything else about the runtime.

use crate::error::HostError;
use crate::{HostFunction, HostValue, PackageId, Symbol, TypeHash, TypeTag};

/// One slot of a class declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotDescriptor {
    pub name: String,
    pub tag: TypeTag,
}

impl SlotDescriptor {
    pub fn new(name: impl Into<String>, tag: TypeTag) -> Self {
        Self { name: name.into(), tag }
    }
}

/// Class options passed through to the host class system.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassOption {
    Documentation(String),
    /// Host metaclass designator.
    Metaclass(String),
}

/// Everything the host needs to create a class.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDeclaration {
    pub symbol: Symbol,
    pub hash: TypeHash,
    pub supertypes: Vec<Symbol>,
    /// Slots in declaration order.
    pub slots: Vec<SlotDescriptor>,
    pub options: Vec<ClassOption>,
}

/// Handle to a class known to the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassHandle {
    pub symbol: Symbol,
    pub hash: TypeHash,
}

impl ClassHandle {
    /// Tag used for values of this class.
    pub fn tag(&self) -> TypeTag {
        TypeTag::Class(self.hash)
    }
}

/// Host runtime services.
pub trait Host {
    /// Creates the package `name`, or returns its identity if it exists.
    fn make_package(&mut self, name: &str) -> Result<PackageId, HostError>;

    fn find_package(&self, name: &str) -> Option<PackageId>;

    /// Interns `name` in `package`. Interning twice yields equal symbols.
    fn intern(&mut self, package: &PackageId, name: &str) -> Symbol;

    /// Binds `symbol` to a callable entry, replacing any previous binding.
    fn define_function(&mut self, symbol: &Symbol, function: HostFunction) -> Result<(), HostError>;

    fn find_function(&self, symbol: &Symbol) -> Option<HostFunction>;

    /// Defines `symbol` as a constant.
    fn make_constant(&mut self, symbol: &Symbol, value: HostValue) -> Result<(), HostError>;

    fn constant_value(&self, symbol: &Symbol) -> Option<HostValue>;

    fn find_class(&self, symbol: &Symbol) -> Option<ClassHandle>;

    fn declare_class(&mut self, declaration: ClassDeclaration) -> Result<ClassHandle, HostError>;
}
