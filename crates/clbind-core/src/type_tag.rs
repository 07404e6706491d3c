//! Host type designators for native types.
//!
//! Every native type that crosses the boundary resolves to exactly one
//! [`TypeTag`]. Fundamental types carry a fixed `const` tag; user types get a
//! [`TypeSlot`] that is filled once at registration time.

use std::fmt;
use std::sync::OnceLock;

use crate::TypeHash;
use crate::error::TypeError;

/// Floating point precision of a float or complex tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatKind {
    Single,
    Double,
}

impl FloatKind {
    fn designator(self) -> &'static str {
        match self {
            FloatKind::Single => "SINGLE-FLOAT",
            FloatKind::Double => "DOUBLE-FLOAT",
        }
    }
}

/// Canonical host type tag.
///
/// Renders as the designator the host reader would accept, e.g.
/// `(SIGNED-BYTE 32)` or `(COMPLEX DOUBLE-FLOAT)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    /// Any host object, passed through unconverted.
    T,
    Boolean,
    /// Signed integer of the given bit width.
    SignedByte(u8),
    /// Unsigned integer of the given bit width.
    UnsignedByte(u8),
    Float(FloatKind),
    Complex(FloatKind),
    String,
    /// Opaque native address.
    ForeignData,
    /// A class declared through the registry, identified by its qualified hash.
    Class(TypeHash),
}

impl TypeTag {
    pub const BOOL: TypeTag = TypeTag::Boolean;
    pub const INT8: TypeTag = TypeTag::SignedByte(8);
    pub const INT16: TypeTag = TypeTag::SignedByte(16);
    pub const INT32: TypeTag = TypeTag::SignedByte(32);
    pub const INT64: TypeTag = TypeTag::SignedByte(64);
    pub const UINT8: TypeTag = TypeTag::UnsignedByte(8);
    pub const UINT16: TypeTag = TypeTag::UnsignedByte(16);
    pub const UINT32: TypeTag = TypeTag::UnsignedByte(32);
    pub const UINT64: TypeTag = TypeTag::UnsignedByte(64);
    /// Pointer-width signed integer.
    pub const ISIZE: TypeTag = TypeTag::SignedByte(isize::BITS as u8);
    /// Pointer-width unsigned integer.
    pub const USIZE: TypeTag = TypeTag::UnsignedByte(usize::BITS as u8);
    pub const SINGLE_FLOAT: TypeTag = TypeTag::Float(FloatKind::Single);
    pub const DOUBLE_FLOAT: TypeTag = TypeTag::Float(FloatKind::Double);

    /// True for every tag except declared classes.
    #[inline]
    pub const fn is_fundamental(self) -> bool {
        !matches!(self, TypeTag::Class(_))
    }

    /// Hash of this tag, used when hashing function signatures.
    pub fn type_hash(self) -> TypeHash {
        match self {
            TypeTag::Class(hash) => hash,
            other => TypeHash::from_name(&other.to_string()),
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::T => f.write_str("T"),
            TypeTag::Boolean => f.write_str("BOOLEAN"),
            TypeTag::SignedByte(bits) => write!(f, "(SIGNED-BYTE {bits})"),
            TypeTag::UnsignedByte(bits) => write!(f, "(UNSIGNED-BYTE {bits})"),
            TypeTag::Float(kind) => f.write_str(kind.designator()),
            TypeTag::Complex(kind) => write!(f, "(COMPLEX {})", kind.designator()),
            TypeTag::String => f.write_str("STRING"),
            TypeTag::ForeignData => f.write_str("SI:FOREIGN-DATA"),
            TypeTag::Class(hash) => write!(f, "#<CLASS {hash}>"),
        }
    }
}

/// Per-type storage for the tag of a user type.
///
/// Generic functions share their statics across instantiations, so each
/// wrapped type owns a separate `static TypeSlot`; `native_type!` declares it.
pub struct TypeSlot {
    tag: OnceLock<TypeTag>,
}

impl TypeSlot {
    pub const fn new() -> Self {
        Self { tag: OnceLock::new() }
    }

    /// Tag stored in this slot, or `NotWrapped` if the type was never registered.
    #[inline]
    pub fn get(&self, type_name: &'static str) -> Result<TypeTag, TypeError> {
        self.tag.get().copied().ok_or(TypeError::NotWrapped { type_name })
    }

    /// Stores `tag`. Registering the same tag again is a no-op.
    pub fn register(&self, type_name: &'static str, tag: TypeTag) -> Result<(), TypeError> {
        let stored = *self.tag.get_or_init(|| tag);
        if stored == tag {
            Ok(())
        } else {
            Err(TypeError::AlreadyWrapped { type_name, existing: stored })
        }
    }

    pub fn is_registered(&self) -> bool {
        self.tag.get().is_some()
    }
}

impl Default for TypeSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TypeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeSlot").field("tag", &self.tag.get()).finish()
    }
}
