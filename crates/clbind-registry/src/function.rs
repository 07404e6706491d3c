//! Records of native functions exposed to the host.

use std::fmt;

use bitflags::bitflags;
use clbind_core::{FunctionIndex, HostFunction, Symbol, TypeHash, TypeTag};

bitflags! {
    /// How a function was registered.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FunctionFlags: u8 {
        /// Called through a table dispatcher with argument conversion.
        const CONVERTED = 1 << 0;
        /// Called directly by the host, no conversion.
        const DIRECT = 1 << 1;
        /// Returns no values.
        const VOID = 1 << 2;
        /// Receives a wrapped object as its first argument.
        const METHOD = 1 << 3;
        /// The receiver is borrowed mutably.
        const MUTATING = 1 << 4;
        /// Returns a new wrapped object.
        const CONSTRUCTOR = 1 << 5;
    }
}

/// One exposed native callable.
///
/// Created by a `defun`, `defun_ptr` or class method registration and never
/// changed afterwards.
#[derive(Debug, Clone)]
pub struct FunctionWrapper {
    pub symbol: Symbol,
    /// Hash of the qualified name and argument tags.
    pub hash: TypeHash,
    pub argument_types: Vec<TypeTag>,
    /// `None` when the function returns nothing.
    pub return_type: Option<TypeTag>,
    pub entry: HostFunction,
    pub flags: FunctionFlags,
}

impl FunctionWrapper {
    pub fn name(&self) -> &str {
        self.symbol.name()
    }

    pub fn arity(&self) -> usize {
        self.argument_types.len()
    }

    /// Table index, for functions on the conversion path.
    pub fn index(&self) -> Option<FunctionIndex> {
        self.entry.index()
    }

    pub fn is_direct(&self) -> bool {
        self.flags.contains(FunctionFlags::DIRECT)
    }

    /// Signature hash for `symbol` with the given argument tags.
    pub fn signature_hash(symbol: &Symbol, argument_types: &[TypeTag]) -> TypeHash {
        let param_hashes: Vec<TypeHash> = argument_types.iter().map(|tag| tag.type_hash()).collect();
        TypeHash::from_function(&symbol.to_string(), &param_hashes)
    }
}

impl fmt::Display for FunctionWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.symbol)?;
        for tag in &self.argument_types {
            write!(f, " {tag}")?;
        }
        match &self.return_type {
            Some(tag) => write!(f, ") -> {tag}"),
            None => f.write_str(") -> (VALUES)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clbind_core::{FunctionTable, PackageId};

    fn wrapper(return_type: Option<TypeTag>) -> FunctionWrapper {
        let mut table = FunctionTable::new();
        let index = table.insert(|a: i32, b: f64| a as f64 + b);
        let symbol = Symbol::interned(&PackageId::new("MATH"), "ADD");
        let argument_types = vec![TypeTag::INT32, TypeTag::DOUBLE_FLOAT];
        FunctionWrapper {
            hash: FunctionWrapper::signature_hash(&symbol, &argument_types),
            symbol,
            argument_types,
            return_type,
            entry: HostFunction::Dispatch {
                index,
                dispatcher: <fn(i32, f64) -> f64 as clbind_core::IntoNativeFn<(i32, f64), f64>>::dispatcher(),
                arity: 2,
            },
            flags: FunctionFlags::CONVERTED,
        }
    }

    #[test]
    fn accessors() {
        let w = wrapper(Some(TypeTag::DOUBLE_FLOAT));
        assert_eq!(w.name(), "ADD");
        assert_eq!(w.arity(), 2);
        assert_eq!(w.index().map(|i| i.as_usize()), Some(0));
        assert!(!w.is_direct());
    }

    #[test]
    fn signature_hash_depends_on_argument_tags() {
        let symbol = Symbol::interned(&PackageId::new("MATH"), "ADD");
        let w = wrapper(None);
        assert_eq!(w.hash, FunctionWrapper::signature_hash(&symbol, &w.argument_types));
        assert_ne!(w.hash, FunctionWrapper::signature_hash(&symbol, &[TypeTag::DOUBLE_FLOAT, TypeTag::INT32]));
        assert_ne!(w.hash, FunctionWrapper::signature_hash(&symbol, &[TypeTag::INT32]));
    }

    #[test]
    fn display_signature() {
        assert_eq!(
            wrapper(Some(TypeTag::DOUBLE_FLOAT)).to_string(),
            "(MATH::ADD (SIGNED-BYTE 32) DOUBLE-FLOAT) -> DOUBLE-FLOAT"
        );
        assert_eq!(wrapper(None).to_string(), "(MATH::ADD (SIGNED-BYTE 32) DOUBLE-FLOAT) -> (VALUES)");
    }

    #[test]
    fn flags_combine() {
        let flags = FunctionFlags::CONVERTED | FunctionFlags::METHOD | FunctionFlags::MUTATING;
        assert!(flags.contains(FunctionFlags::METHOD));
        assert!(!flags.contains(FunctionFlags::DIRECT));
    }
}
