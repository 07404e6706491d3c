//! Deterministic hash-based identity for wrapped classes and functions.
//!
//! [`TypeHash`] is a 64-bit hash computed from package-qualified names and
//! signatures. Because it is derived rather than allocated, a class tag can be
//! computed before the host has declared the class, which lets method
//! signatures refer to their receiver while the class is still being built.
//!
//! # Examples
//!
//! ```
//! use clbind_core::TypeHash;
//!
//! let a = TypeHash::from_qualified("GEOMETRY", "POINT");
//! let b = TypeHash::from_qualified("GEOMETRY", "POINT");
//! assert_eq!(a, b);
//! assert_ne!(a, TypeHash::from_qualified("OTHER", "POINT"));
//! ```

use std::fmt;
use xxhash_rust::xxh64::xxh64;

/// Domain-specific mixing constants for hash computation.
pub mod hash_constants {
    /// Separator between package and symbol name.
    pub const SEP: u64 = 0x4bc94d6bd06053ad;

    /// Domain marker for class hashes
    pub const CLASS: u64 = 0x2fac10b63a6cc57c;

    /// Domain marker for function signature hashes
    pub const FUNCTION: u64 = 0x5ea77ffbcdf5f302;

    /// Parameter position mixing constants.
    /// Each position gets its own constant so parameter order matters.
    pub const PARAM_MARKERS: [u64; 8] = [
        0x9e3779b97f4a7c15,
        0xbf58476d1ce4e5b9,
        0x94d049bb133111eb,
        0xd6e8feb86659fd93,
        0xe7037ed1a0b428db,
        0xc6a4a7935bd1e995,
        0x8648dbbc94d49b8d,
        0xa2b48b2c69e0d657,
    ];
}

/// A deterministic 64-bit hash identifying a class or a function signature.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeHash(pub u64);

impl TypeHash {
    /// Hash of a bare name with no package qualification.
    #[inline]
    pub fn from_name(name: &str) -> Self {
        TypeHash(hash_constants::CLASS ^ xxh64(name.as_bytes(), 0))
    }

    /// Hash of a package-qualified name.
    ///
    /// The same symbol name in two packages yields two different hashes.
    #[inline]
    pub fn from_qualified(package: &str, name: &str) -> Self {
        let package_hash = xxh64(package.as_bytes(), 0);
        let name_hash = xxh64(name.as_bytes(), hash_constants::SEP);
        TypeHash(hash_constants::CLASS ^ package_hash.wrapping_mul(hash_constants::SEP) ^ name_hash)
    }

    /// Hash of a function name plus its parameter hashes.
    ///
    /// Parameter order matters: `(a, b)` and `(b, a)` hash differently.
    #[inline]
    pub fn from_function(name: &str, param_hashes: &[TypeHash]) -> Self {
        let mut hash = hash_constants::FUNCTION ^ xxh64(name.as_bytes(), 0);
        for (i, param) in param_hashes.iter().enumerate() {
            let marker = hash_constants::PARAM_MARKERS
                .get(i)
                .copied()
                .unwrap_or_else(|| hash_constants::PARAM_MARKERS[0].wrapping_add(i as u64));
            hash = hash.wrapping_mul(hash_constants::SEP).wrapping_add(marker ^ param.0);
        }
        TypeHash(hash)
    }
}

impl fmt::Debug for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeHash({:#018x})", self.0)
    }
}

impl fmt::Display for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_hash_determinism() {
        assert_eq!(TypeHash::from_qualified("CL-USER", "POINT"), TypeHash::from_qualified("CL-USER", "POINT"));
    }

    #[test]
    fn qualified_hash_separates_packages() {
        let a = TypeHash::from_qualified("A", "POINT");
        let b = TypeHash::from_qualified("B", "POINT");
        assert_ne!(a, b);
        assert_ne!(a, TypeHash::from_name("POINT"));
    }

    #[test]
    fn qualified_hash_does_not_collapse_split_point() {
        assert_ne!(TypeHash::from_qualified("AB", "C"), TypeHash::from_qualified("A", "BC"));
    }

    #[test]
    fn function_hash_parameter_order_matters() {
        let a = TypeHash::from_name("A");
        let b = TypeHash::from_name("B");
        assert_ne!(TypeHash::from_function("F", &[a, b]), TypeHash::from_function("F", &[b, a]));
        assert_ne!(TypeHash::from_function("F", &[a]), TypeHash::from_function("G", &[a]));
    }

    #[test]
    fn function_hash_beyond_marker_table() {
        let params = vec![TypeHash::from_name("X"); 10];
        let h1 = TypeHash::from_function("MANY", &params);
        let h2 = TypeHash::from_function("MANY", &params[..9]);
        assert_ne!(h1, h2);
    }

    #[test]
    fn display_and_debug() {
        let h = TypeHash(0x10);
        assert_eq!(format!("{h}"), "0x0000000000000010");
        assert_eq!(format!("{h:?}"), "TypeHash(0x0000000000000010)");
    }
}
