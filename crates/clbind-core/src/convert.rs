//! Conversion traits between native values and host values.
//!
//! - [`HostType`]: the host tag of a native type, resolved at compile time
//!   for fundamentals and through a [`TypeSlot`] for wrapped types
//! - [`FromHost`]: unbox a native value from a [`HostValue`]
//! - [`IntoHost`]: box a native value into a [`HostValue`]
//!
//! ## Supported Types
//!
//! - Integers: `i8`..`i64`, `u8`..`u64`, `isize`, `usize`
//! - Floats: `f32`, `f64`, `Complex<f32>`, `Complex<f64>`
//! - Boolean: `bool`
//! - Strings: `String`, `&str`, `CString`, `&CStr`
//! - Raw pointers: `*mut T`, `*const T`
//! - Pass-through: `HostValue`
//! - Wrapped types declared with [`native_type!`](crate::native_type)
//!
//! Any other type is rejected at compile time:
//!
//! ```compile_fail
//! use clbind_core::box_value;
//!
//! struct NotWrapped;
//! let _ = box_value(NotWrapped);
//! ```

use std::ffi::{CStr, CString};

use num_complex::Complex;

use crate::error::{ConversionError, TypeError};
use crate::{FloatKind, ForeignHandle, HostValue, TypeSlot, TypeTag};

/// A native type with a host type tag.
pub trait HostType {
    /// Whether the tag is one of the fixed fundamental tags.
    const FUNDAMENTAL: bool = true;

    /// Whether the type is the host's own value representation, so no
    /// conversion is needed to pass it across the boundary.
    const IS_MAPPED: bool = false;

    /// Canonical host tag for this type.
    fn lisp_type() -> Result<TypeTag, TypeError>;

    /// Native type name, used in error messages.
    fn type_name() -> &'static str;
}

/// Unbox a native value from a host value.
pub trait FromHost: HostType + Sized {
    fn from_host(value: &HostValue) -> Result<Self, ConversionError>;
}

/// Box a native value into a host value.
pub trait IntoHost: HostType {
    fn into_host(self) -> Result<HostValue, ConversionError>;
}

/// A user type wrapped for the host.
///
/// Implemented by [`native_type!`](crate::native_type), which gives every
/// type its own static slot.
pub trait NativeType: HostType + 'static {
    fn type_slot() -> &'static TypeSlot;
}

/// Host tag of `T`.
#[inline]
pub fn lisp_type<T: HostType>() -> Result<TypeTag, TypeError> {
    T::lisp_type()
}

/// Associates `T` with `tag`. Idempotent for the same tag.
pub fn register_type<T: NativeType>(tag: TypeTag) -> Result<(), TypeError> {
    T::type_slot().register(T::type_name(), tag)
}

/// Box `value` for the host.
#[inline]
pub fn box_value<T: IntoHost>(value: T) -> Result<HostValue, ConversionError> {
    value.into_host()
}

/// Unbox a `T` from a host value.
#[inline]
pub fn unbox<T: FromHost>(value: &HostValue) -> Result<T, ConversionError> {
    T::from_host(value)
}

/// Declares a native type to the binding.
///
/// Generates [`NativeType`], [`HostType`] and [`IntoHost`]; boxing a value
/// moves it to the heap under a finalizer. With the `Clone` marker, the type
/// can also be unboxed by value.
///
/// ```
/// use clbind_core::{native_type, register_type, box_value, unbox, TypeHash, TypeTag};
///
/// #[derive(Clone, Debug, PartialEq)]
/// struct Point { x: f64, y: f64 }
/// native_type!(Point as "POINT", Clone);
///
/// register_type::<Point>(TypeTag::Class(TypeHash::from_qualified("GEO", "POINT"))).unwrap();
/// let boxed = box_value(Point { x: 1.0, y: 2.0 }).unwrap();
/// assert_eq!(unbox::<Point>(&boxed).unwrap(), Point { x: 1.0, y: 2.0 });
/// ```
#[macro_export]
macro_rules! native_type {
    ($ty:ty as $name:expr, Clone) => {
        $crate::native_type!($ty as $name);

        impl $crate::FromHost for $ty {
            fn from_host(value: &$crate::HostValue) -> ::std::result::Result<Self, $crate::ConversionError> {
                let borrowed = <$crate::Ref<$ty> as $crate::FromHost>::from_host(value)?;
                ::std::result::Result::Ok(::std::clone::Clone::clone(&*borrowed))
            }
        }
    };
    ($ty:ty as $name:expr) => {
        impl $crate::NativeType for $ty {
            fn type_slot() -> &'static $crate::TypeSlot {
                static SLOT: $crate::TypeSlot = $crate::TypeSlot::new();
                &SLOT
            }
        }

        impl $crate::HostType for $ty {
            const FUNDAMENTAL: bool = false;

            fn lisp_type() -> ::std::result::Result<$crate::TypeTag, $crate::TypeError> {
                <$ty as $crate::NativeType>::type_slot().get($name)
            }

            fn type_name() -> &'static str {
                $name
            }
        }

        impl $crate::IntoHost for $ty {
            fn into_host(self) -> ::std::result::Result<$crate::HostValue, $crate::ConversionError> {
                $crate::create(self).map_err(::std::convert::From::from)
            }
        }
    };
    ($ty:ty) => {
        $crate::native_type!($ty as stringify!($ty));
    };
}

// ============================================================================
// Integer implementations
// ============================================================================

macro_rules! impl_host_int {
    ($($ty:ty => $tag:expr, $ctor:ident;)*) => {
        $(
            impl HostType for $ty {
                fn lisp_type() -> Result<TypeTag, TypeError> {
                    Ok($tag)
                }

                fn type_name() -> &'static str {
                    stringify!($ty)
                }
            }

            impl FromHost for $ty {
                fn from_host(value: &HostValue) -> Result<Self, ConversionError> {
                    match value {
                        HostValue::Integer(v) => <$ty>::try_from(*v).map_err(|_| ConversionError::IntegerOverflow {
                            value: *v,
                            target_type: stringify!($ty),
                        }),
                        other => Err(ConversionError::mismatch($tag, other.type_name())),
                    }
                }
            }

            impl IntoHost for $ty {
                fn into_host(self) -> Result<HostValue, ConversionError> {
                    Ok(HostValue::$ctor(self))
                }
            }
        )*
    };
}

impl_host_int! {
    i8 => TypeTag::INT8, int8;
    i16 => TypeTag::INT16, int16;
    i32 => TypeTag::INT32, int32;
    i64 => TypeTag::INT64, int64;
    u8 => TypeTag::UINT8, uint8;
    u16 => TypeTag::UINT16, uint16;
    u32 => TypeTag::UINT32, uint32;
    u64 => TypeTag::UINT64, uint64;
}

// Pointer-width integers: the tag width comes from the platform.
macro_rules! impl_host_pointer_width {
    ($($ty:ty => $tag:expr;)*) => {
        $(
            impl HostType for $ty {
                fn lisp_type() -> Result<TypeTag, TypeError> {
                    Ok($tag)
                }

                fn type_name() -> &'static str {
                    stringify!($ty)
                }
            }

            impl FromHost for $ty {
                fn from_host(value: &HostValue) -> Result<Self, ConversionError> {
                    match value {
                        HostValue::Integer(v) => <$ty>::try_from(*v).map_err(|_| ConversionError::IntegerOverflow {
                            value: *v,
                            target_type: stringify!($ty),
                        }),
                        other => Err(ConversionError::mismatch($tag, other.type_name())),
                    }
                }
            }

            impl IntoHost for $ty {
                fn into_host(self) -> Result<HostValue, ConversionError> {
                    // Pointer widths never exceed 128 bits.
                    Ok(HostValue::Integer(self as i128))
                }
            }
        )*
    };
}

impl_host_pointer_width! {
    isize => TypeTag::ISIZE;
    usize => TypeTag::USIZE;
}

// ============================================================================
// Boolean
// ============================================================================

impl HostType for bool {
    fn lisp_type() -> Result<TypeTag, TypeError> {
        Ok(TypeTag::BOOL)
    }

    fn type_name() -> &'static str {
        "bool"
    }
}

impl FromHost for bool {
    fn from_host(value: &HostValue) -> Result<Self, ConversionError> {
        match value {
            HostValue::Bool(b) => Ok(*b),
            HostValue::Nil => Ok(false),
            other => Err(ConversionError::mismatch(TypeTag::BOOL, other.type_name())),
        }
    }
}

impl IntoHost for bool {
    fn into_host(self) -> Result<HostValue, ConversionError> {
        Ok(HostValue::boolean(self))
    }
}

// ============================================================================
// Floats
// ============================================================================

impl HostType for f32 {
    fn lisp_type() -> Result<TypeTag, TypeError> {
        Ok(TypeTag::SINGLE_FLOAT)
    }

    fn type_name() -> &'static str {
        "f32"
    }
}

impl FromHost for f32 {
    fn from_host(value: &HostValue) -> Result<Self, ConversionError> {
        match value {
            HostValue::SingleFloat(v) => Ok(*v),
            HostValue::DoubleFloat(v) => Ok(*v as f32),
            HostValue::Integer(v) => Ok(*v as f32),
            other => Err(ConversionError::mismatch(TypeTag::SINGLE_FLOAT, other.type_name())),
        }
    }
}

impl IntoHost for f32 {
    fn into_host(self) -> Result<HostValue, ConversionError> {
        Ok(HostValue::single_float(self))
    }
}

impl HostType for f64 {
    fn lisp_type() -> Result<TypeTag, TypeError> {
        Ok(TypeTag::DOUBLE_FLOAT)
    }

    fn type_name() -> &'static str {
        "f64"
    }
}

impl FromHost for f64 {
    fn from_host(value: &HostValue) -> Result<Self, ConversionError> {
        value
            .as_real()
            .ok_or_else(|| ConversionError::mismatch(TypeTag::DOUBLE_FLOAT, value.type_name()))
    }
}

impl IntoHost for f64 {
    fn into_host(self) -> Result<HostValue, ConversionError> {
        Ok(HostValue::double_float(self))
    }
}

// ============================================================================
// Complex
// ============================================================================

macro_rules! impl_host_complex {
    ($($ty:ty => $kind:expr;)*) => {
        $(
            impl HostType for Complex<$ty> {
                fn lisp_type() -> Result<TypeTag, TypeError> {
                    Ok(TypeTag::Complex($kind))
                }

                fn type_name() -> &'static str {
                    concat!("Complex<", stringify!($ty), ">")
                }
            }

            impl FromHost for Complex<$ty> {
                fn from_host(value: &HostValue) -> Result<Self, ConversionError> {
                    match value {
                        HostValue::Complex(parts) => {
                            let re = <$ty>::from_host(&parts.0)?;
                            let im = <$ty>::from_host(&parts.1)?;
                            Ok(Complex::new(re, im))
                        }
                        // A host real is a complex with zero imaginary part.
                        HostValue::Integer(_) | HostValue::SingleFloat(_) | HostValue::DoubleFloat(_) => {
                            Ok(Complex::new(<$ty>::from_host(value)?, 0.0))
                        }
                        other => Err(ConversionError::mismatch(TypeTag::Complex($kind), other.type_name())),
                    }
                }
            }

            impl IntoHost for Complex<$ty> {
                fn into_host(self) -> Result<HostValue, ConversionError> {
                    Ok(HostValue::complex(self.re.into_host()?, self.im.into_host()?))
                }
            }
        )*
    };
}

impl_host_complex! {
    f32 => FloatKind::Single;
    f64 => FloatKind::Double;
}

// ============================================================================
// Strings
// ============================================================================

impl HostType for String {
    fn lisp_type() -> Result<TypeTag, TypeError> {
        Ok(TypeTag::String)
    }

    fn type_name() -> &'static str {
        "String"
    }
}

impl FromHost for String {
    fn from_host(value: &HostValue) -> Result<Self, ConversionError> {
        match value {
            HostValue::String(s) => Ok(s.to_string()),
            other => Err(ConversionError::NotAString { actual: other.type_name() }),
        }
    }
}

impl IntoHost for String {
    fn into_host(self) -> Result<HostValue, ConversionError> {
        Ok(HostValue::string(&self))
    }
}

impl HostType for &str {
    fn lisp_type() -> Result<TypeTag, TypeError> {
        Ok(TypeTag::String)
    }

    fn type_name() -> &'static str {
        "&str"
    }
}

impl IntoHost for &str {
    fn into_host(self) -> Result<HostValue, ConversionError> {
        Ok(HostValue::string(self))
    }
}

impl HostType for CString {
    fn lisp_type() -> Result<TypeTag, TypeError> {
        Ok(TypeTag::String)
    }

    fn type_name() -> &'static str {
        "CString"
    }
}

impl FromHost for CString {
    fn from_host(value: &HostValue) -> Result<Self, ConversionError> {
        match value {
            HostValue::String(s) => {
                CString::new(s.as_bytes()).map_err(|e| ConversionError::InteriorNul { position: e.nul_position() })
            }
            other => Err(ConversionError::NotAString { actual: other.type_name() }),
        }
    }
}

impl IntoHost for CString {
    fn into_host(self) -> Result<HostValue, ConversionError> {
        self.as_c_str().into_host()
    }
}

impl HostType for &CStr {
    fn lisp_type() -> Result<TypeTag, TypeError> {
        Ok(TypeTag::String)
    }

    fn type_name() -> &'static str {
        "&CStr"
    }
}

impl IntoHost for &CStr {
    fn into_host(self) -> Result<HostValue, ConversionError> {
        Ok(HostValue::string(&self.to_string_lossy()))
    }
}

// ============================================================================
// Raw pointers
// ============================================================================

fn foreign_address(value: &HostValue) -> Result<*mut (), ConversionError> {
    match value {
        HostValue::Foreign(handle) => Ok(handle.address()),
        HostValue::Nil => Ok(std::ptr::null_mut()),
        other => Err(ConversionError::mismatch(TypeTag::ForeignData, other.type_name())),
    }
}

impl<T> HostType for *mut T {
    fn lisp_type() -> Result<TypeTag, TypeError> {
        Ok(TypeTag::ForeignData)
    }

    fn type_name() -> &'static str {
        "*mut T"
    }
}

impl<T> FromHost for *mut T {
    fn from_host(value: &HostValue) -> Result<Self, ConversionError> {
        foreign_address(value).map(|address| address.cast())
    }
}

impl<T> IntoHost for *mut T {
    fn into_host(self) -> Result<HostValue, ConversionError> {
        Ok(HostValue::Foreign(ForeignHandle::new(self.cast(), TypeTag::ForeignData)))
    }
}

impl<T> HostType for *const T {
    fn lisp_type() -> Result<TypeTag, TypeError> {
        Ok(TypeTag::ForeignData)
    }

    fn type_name() -> &'static str {
        "*const T"
    }
}

impl<T> FromHost for *const T {
    fn from_host(value: &HostValue) -> Result<Self, ConversionError> {
        foreign_address(value).map(|address| address.cast_const().cast())
    }
}

impl<T> IntoHost for *const T {
    fn into_host(self) -> Result<HostValue, ConversionError> {
        Ok(HostValue::Foreign(ForeignHandle::new(self.cast_mut().cast(), TypeTag::ForeignData)))
    }
}

// ============================================================================
// Pass-through
// ============================================================================

impl HostType for HostValue {
    const IS_MAPPED: bool = true;

    fn lisp_type() -> Result<TypeTag, TypeError> {
        Ok(TypeTag::T)
    }

    fn type_name() -> &'static str {
        "HostValue"
    }
}

impl FromHost for HostValue {
    fn from_host(value: &HostValue) -> Result<Self, ConversionError> {
        Ok(value.clone())
    }
}

impl IntoHost for HostValue {
    fn into_host(self) -> Result<HostValue, ConversionError> {
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip<T: IntoHost + FromHost + Copy>(value: T) -> T {
        unbox::<T>(&box_value(value).unwrap()).unwrap()
    }

    #[test]
    fn integer_extremes_round_trip() {
        for v in [0, 1, -1, i8::MIN, i8::MAX] {
            assert_eq!(round_trip(v), v);
        }
        for v in [0, 1, -1, i16::MIN, i16::MAX] {
            assert_eq!(round_trip(v), v);
        }
        for v in [0, 1, -1, i32::MIN, i32::MAX] {
            assert_eq!(round_trip(v), v);
        }
        for v in [0, 1, -1, i64::MIN, i64::MAX] {
            assert_eq!(round_trip(v), v);
        }
        for v in [0, 1, u8::MAX] {
            assert_eq!(round_trip(v), v);
        }
        for v in [0, 1, u16::MAX] {
            assert_eq!(round_trip(v), v);
        }
        for v in [0, 1, u32::MAX] {
            assert_eq!(round_trip(v), v);
        }
        for v in [0, 1, u64::MAX] {
            assert_eq!(round_trip(v), v);
        }
        for v in [0, -1, isize::MIN, isize::MAX] {
            assert_eq!(round_trip(v), v);
        }
        assert_eq!(round_trip(usize::MAX), usize::MAX);
    }

    #[test]
    fn integer_overflow() {
        let big = HostValue::int32(300);
        assert_eq!(
            unbox::<u8>(&big),
            Err(ConversionError::IntegerOverflow { value: 300, target_type: "u8" })
        );
        assert!(matches!(unbox::<u64>(&HostValue::int8(-1)), Err(ConversionError::IntegerOverflow { .. })));
        assert!(matches!(unbox::<i64>(&HostValue::uint64(u64::MAX)), Err(ConversionError::IntegerOverflow { .. })));
    }

    #[test]
    fn integer_type_mismatch() {
        let err = unbox::<i32>(&HostValue::string("1")).unwrap_err();
        assert_eq!(err, ConversionError::mismatch(TypeTag::INT32, "STRING"));
    }

    #[test]
    fn bool_round_trip() {
        assert!(round_trip(true));
        assert!(!round_trip(false));
        assert_eq!(unbox::<bool>(&HostValue::Nil), Ok(false));
        assert!(unbox::<bool>(&HostValue::int32(0)).is_err());
    }

    #[test]
    fn float_round_trip() {
        for v in [0.0f32, 1.0, -1.0, f32::MIN, f32::MAX, f32::INFINITY, f32::NEG_INFINITY] {
            assert_eq!(round_trip(v), v);
        }
        for v in [0.0f64, 1.0, -1.0, f64::MIN, f64::MAX, f64::INFINITY, f64::NEG_INFINITY] {
            assert_eq!(round_trip(v), v);
        }
        assert!(round_trip(f32::NAN).is_nan());
        assert!(round_trip(f64::NAN).is_nan());
    }

    #[test]
    fn float_tags_distinguish_precision() {
        assert_eq!(box_value(1.5f32).unwrap(), HostValue::SingleFloat(1.5));
        assert_eq!(box_value(1.5f64).unwrap(), HostValue::DoubleFloat(1.5));
        assert_eq!(unbox::<f64>(&HostValue::int32(3)), Ok(3.0));
    }

    #[test]
    fn complex_round_trip() {
        let c = Complex::new(1.5f64, -2.0);
        assert_eq!(round_trip(c), c);
        let c = Complex::new(f32::INFINITY, 0.25f32);
        assert_eq!(round_trip(c), c);
        assert_eq!(unbox::<Complex<f64>>(&HostValue::double_float(4.0)), Ok(Complex::new(4.0, 0.0)));
        assert_eq!(lisp_type::<Complex<f32>>(), Ok(TypeTag::Complex(FloatKind::Single)));
    }

    #[test]
    fn string_round_trip() {
        for s in ["", "a", "héllo wörld", "日本語", "emoji 🦀"] {
            let boxed = box_value(s).unwrap();
            assert_eq!(unbox::<String>(&boxed).unwrap(), s);
            assert_eq!(unbox::<String>(&box_value(s.to_string()).unwrap()).unwrap(), s);
        }
    }

    #[test]
    fn string_unbox_names_actual_type() {
        let err = unbox::<String>(&HostValue::int32(7)).unwrap_err();
        assert_eq!(err, ConversionError::NotAString { actual: "INTEGER" });
        assert_eq!(err.to_string(), "object is not a string but a INTEGER");
    }

    #[test]
    fn c_strings() {
        let c = CString::new("abc").unwrap();
        let boxed = box_value(c.clone()).unwrap();
        assert_eq!(unbox::<CString>(&boxed).unwrap(), c);
        assert_eq!(
            unbox::<CString>(&HostValue::string("a\0b")),
            Err(ConversionError::InteriorNul { position: 1 })
        );
    }

    #[test]
    fn raw_pointers_are_foreign_data() {
        let mut x = 5u32;
        let ptr: *mut u32 = &mut x;
        assert_eq!(lisp_type::<*mut u32>(), Ok(TypeTag::ForeignData));
        assert_eq!(lisp_type::<*const String>(), Ok(TypeTag::ForeignData));

        let boxed = box_value(ptr).unwrap();
        let handle = boxed.as_foreign().unwrap();
        assert!(!handle.has_finalizer());
        assert_eq!(unbox::<*mut u32>(&boxed).unwrap(), ptr);
        assert_eq!(unbox::<*const u32>(&boxed).unwrap(), ptr.cast_const());
        assert!(unbox::<*mut u32>(&HostValue::Nil).unwrap().is_null());
    }

    #[test]
    fn pass_through_is_identity() {
        let v = HostValue::string("same");
        assert_eq!(box_value(v.clone()).unwrap(), v);
        assert_eq!(unbox::<HostValue>(&v).unwrap(), v);
        assert!(HostValue::IS_MAPPED);
        assert!(!i32::IS_MAPPED);
    }

    #[test]
    fn fundamental_classification() {
        struct Opaque;
        crate::native_type!(Opaque);
        assert!(i32::FUNDAMENTAL);
        assert!(<*mut Opaque>::FUNDAMENTAL);
        assert!(!Opaque::FUNDAMENTAL);
        assert_eq!(lisp_type::<Opaque>(), Err(TypeError::NotWrapped { type_name: "Opaque" }));
    }

    #[derive(Clone, Debug, PartialEq)]
    struct Pair(i32, String);
    crate::native_type!(Pair as "PAIR", Clone);

    #[test]
    fn cloneable_native_type_unboxes_by_value() {
        register_type::<Pair>(TypeTag::Class(crate::TypeHash::from_qualified("TEST", "PAIR"))).unwrap();
        let boxed = box_value(Pair(1, "one".into())).unwrap();
        assert!(boxed.as_foreign().unwrap().has_finalizer());
        assert_eq!(unbox::<Pair>(&boxed).unwrap(), Pair(1, "one".into()));
    }
}
