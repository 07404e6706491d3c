//! Host runtime values.
//!
//! [`HostValue`] is the opaque value kind every host-callable signature is
//! mapped to. Immediates (booleans, numbers, strings) are owned by the host;
//! [`HostValue::Foreign`] shares a [`ForeignHandle`] onto a native object.

use std::fmt;
use std::rc::Rc;

use crate::ForeignHandle;

/// Identity of a host package, by canonical name.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageId(Rc<str>);

impl PackageId {
    pub fn new(name: &str) -> Self {
        Self(Rc::from(name))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PackageId({})", self.0)
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A host symbol, optionally interned in a package.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Symbol {
    package: Option<PackageId>,
    name: Rc<str>,
}

impl Symbol {
    pub fn new(package: Option<PackageId>, name: &str) -> Self {
        Self { package, name: Rc::from(name) }
    }

    pub fn interned(package: &PackageId, name: &str) -> Self {
        Self::new(Some(package.clone()), name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn package(&self) -> Option<&PackageId> {
        self.package.as_ref()
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({self})")
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.package {
            Some(package) => write!(f, "{}::{}", package, self.name),
            None => write!(f, "#:{}", self.name),
        }
    }
}

/// An opaque host runtime value.
#[derive(Clone, Default)]
pub enum HostValue {
    /// The empty list / false.
    #[default]
    Nil,
    Bool(bool),
    /// Any host integer; fixnums and bignums share one representation.
    Integer(i128),
    SingleFloat(f32),
    DoubleFloat(f64),
    /// Real and imaginary parts, each a real host number.
    Complex(Rc<(HostValue, HostValue)>),
    String(Rc<str>),
    Symbol(Symbol),
    Foreign(ForeignHandle),
}

impl HostValue {
    pub fn boolean(value: bool) -> Self {
        HostValue::Bool(value)
    }

    pub fn int8(value: i8) -> Self {
        HostValue::Integer(value.into())
    }

    pub fn int16(value: i16) -> Self {
        HostValue::Integer(value.into())
    }

    pub fn int32(value: i32) -> Self {
        HostValue::Integer(value.into())
    }

    pub fn int64(value: i64) -> Self {
        HostValue::Integer(value.into())
    }

    pub fn uint8(value: u8) -> Self {
        HostValue::Integer(value.into())
    }

    pub fn uint16(value: u16) -> Self {
        HostValue::Integer(value.into())
    }

    pub fn uint32(value: u32) -> Self {
        HostValue::Integer(value.into())
    }

    pub fn uint64(value: u64) -> Self {
        HostValue::Integer(value.into())
    }

    pub fn single_float(value: f32) -> Self {
        HostValue::SingleFloat(value)
    }

    pub fn double_float(value: f64) -> Self {
        HostValue::DoubleFloat(value)
    }

    pub fn complex(real: HostValue, imaginary: HostValue) -> Self {
        HostValue::Complex(Rc::new((real, imaginary)))
    }

    /// Copies `value` into a new host string.
    pub fn string(value: &str) -> Self {
        HostValue::String(Rc::from(value))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, HostValue::Nil)
    }

    /// Host type name, as reported in conversion errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            HostValue::Nil => "NULL",
            HostValue::Bool(_) => "BOOLEAN",
            HostValue::Integer(_) => "INTEGER",
            HostValue::SingleFloat(_) => "SINGLE-FLOAT",
            HostValue::DoubleFloat(_) => "DOUBLE-FLOAT",
            HostValue::Complex(_) => "COMPLEX",
            HostValue::String(_) => "STRING",
            HostValue::Symbol(_) => "SYMBOL",
            HostValue::Foreign(_) => "SI:FOREIGN-DATA",
        }
    }

    pub fn as_integer(&self) -> Option<i128> {
        match self {
            HostValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_foreign(&self) -> Option<&ForeignHandle> {
        match self {
            HostValue::Foreign(handle) => Some(handle),
            _ => None,
        }
    }

    /// Real number as `f64`, for any host real.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            HostValue::Integer(v) => Some(*v as f64),
            HostValue::SingleFloat(v) => Some(f64::from(*v)),
            HostValue::DoubleFloat(v) => Some(*v),
            _ => None,
        }
    }

    /// Heap identity of this value, if it has one.
    ///
    /// Immediates return `None`; they never need collector protection.
    pub fn identity(&self) -> Option<usize> {
        match self {
            HostValue::Complex(rc) => Some(Rc::as_ptr(rc) as *const () as usize),
            HostValue::String(rc) => Some(Rc::as_ptr(rc) as *const u8 as usize),
            HostValue::Foreign(handle) => Some(handle.identity()),
            _ => None,
        }
    }
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HostValue::Nil, HostValue::Nil) => true,
            (HostValue::Bool(a), HostValue::Bool(b)) => a == b,
            (HostValue::Integer(a), HostValue::Integer(b)) => a == b,
            (HostValue::SingleFloat(a), HostValue::SingleFloat(b)) => a == b,
            (HostValue::DoubleFloat(a), HostValue::DoubleFloat(b)) => a == b,
            (HostValue::Complex(a), HostValue::Complex(b)) => a == b,
            (HostValue::String(a), HostValue::String(b)) => a == b,
            (HostValue::Symbol(a), HostValue::Symbol(b)) => a == b,
            (HostValue::Foreign(a), HostValue::Foreign(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Nil => f.write_str("NIL"),
            HostValue::Bool(true) => f.write_str("T"),
            HostValue::Bool(false) => f.write_str("NIL"),
            HostValue::Integer(v) => write!(f, "{v}"),
            HostValue::SingleFloat(v) => write!(f, "{v:?}f0"),
            HostValue::DoubleFloat(v) => write!(f, "{v:?}d0"),
            HostValue::Complex(parts) => write!(f, "#C({:?} {:?})", parts.0, parts.1),
            HostValue::String(s) => write!(f, "{s:?}"),
            HostValue::Symbol(sym) => write!(f, "{sym}"),
            HostValue::Foreign(handle) => write!(f, "{handle:?}"),
        }
    }
}
