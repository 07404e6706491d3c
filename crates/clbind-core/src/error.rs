//! Error types for every layer of the binding.
//!
//! ## Error Hierarchy
//!
//! ```text
//! BindError (top-level wrapper)
//! ├── TypeError          - type lookup before/against registration
//! ├── ConversionError    - box/unbox failures
//! ├── NativeError        - failures while a native function runs
//! ├── RegistrationError  - package, function and class registration
//! └── HostError          - what the host runtime sees at a boundary
//! ```
//!
//! Everything below `HostError` stays inside native code. The registration
//! boundary and the dispatchers convert to [`HostError`], which carries an
//! [`ErrorCode`] so the host can classify the condition.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror::Error;

use crate::TypeTag;

// ============================================================================
// Type Errors
// ============================================================================

/// Errors resolving the host tag of a native type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    /// The type was used before it was registered with the host.
    #[error("type {type_name} has no host wrapper")]
    NotWrapped { type_name: &'static str },

    /// The type is already registered under a different tag.
    #[error("type {type_name} is already wrapped as {existing}")]
    AlreadyWrapped { type_name: &'static str, existing: TypeTag },
}

// ============================================================================
// Conversion Errors
// ============================================================================

/// Errors converting between host values and native values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    /// The host value does not have the expected type.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: &'static str },

    /// String unboxing was attempted on a non-string.
    #[error("object is not a string but a {actual}")]
    NotAString { actual: &'static str },

    /// An integer does not fit the native width.
    #[error("integer {value} does not fit in {target_type}")]
    IntegerOverflow { value: i128, target_type: &'static str },

    /// A foreign handle holds a null address.
    #[error("null foreign handle for {target_type}")]
    NullHandle { target_type: &'static str },

    /// A foreign handle whose object was already finalized.
    #[error("foreign handle for {target_type} was already released")]
    ReleasedHandle { target_type: &'static str },

    /// The object is already borrowed in a way that excludes this borrow.
    #[error("{target_type} is already borrowed")]
    AlreadyBorrowed { target_type: &'static str },

    /// A host string contains a NUL byte where a C string is required.
    #[error("string contains an interior NUL at byte {position}")]
    InteriorNul { position: usize },

    #[error(transparent)]
    Type(#[from] TypeError),
}

impl ConversionError {
    /// Create a type mismatch error.
    pub fn mismatch(expected: impl ToString, actual: &'static str) -> Self {
        Self::TypeMismatch { expected: expected.to_string(), actual }
    }
}

// ============================================================================
// Native Errors
// ============================================================================

/// Errors raised while dispatching a call into native code.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NativeError {
    /// Argument at `position` could not be converted to its native type.
    #[error("argument {position}: {source}")]
    Argument { position: usize, source: ConversionError },

    /// A native argument could not be boxed for a host call.
    #[error("unsupported host function argument type at position {position}: {source}")]
    UnsupportedArgumentType { position: usize, source: ConversionError },

    /// Wrong number of host arguments.
    #[error("expected {expected} arguments, got {got}")]
    ArityMismatch { expected: usize, got: usize },

    /// The return value could not be boxed.
    #[error("return value: {0}")]
    Return(ConversionError),

    /// The native function returned an error.
    #[error("{message}")]
    Failed { message: String },

    /// The native function panicked.
    #[error("native function panicked: {message}")]
    Panic { message: String },

    /// No callable of the expected signature is stored at this index.
    #[error("no function at index {index}")]
    StaleFunction { index: usize },
}

impl NativeError {
    /// Create a failure carrying `message`.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed { message: message.into() }
    }

    /// Build a panic error from a `catch_unwind` payload.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self::Panic { message }
    }
}

// ============================================================================
// Registration Errors
// ============================================================================

/// Errors registering packages, functions, constants and classes.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistrationError {
    #[error("package {0} is already registered")]
    DuplicatePackage(String),

    #[error("package {0} was not found")]
    PackageNotFound(String),

    #[error("function {name} was not found in package {package}")]
    FunctionNotFound { package: String, name: String },

    #[error("type {name} was not found, searched packages: {}", searched.join(", "))]
    TypeNotFound { name: String, searched: Vec<String> },

    #[error("invalid name {0:?}")]
    InvalidName(String),

    #[error("slot {slot} is declared twice in class {class}")]
    DuplicateSlot { class: String, slot: String },

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Native(#[from] NativeError),

    #[error(transparent)]
    Host(#[from] HostError),
}

// ============================================================================
// Host Errors
// ============================================================================

/// Numeric classification of a host-level error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ErrorCode {
    /// Raised by the host runtime itself.
    Host = 0,
    TypeNotWrapped = 1,
    Conversion = 2,
    DuplicatePackage = 3,
    PackageNotFound = 4,
    FunctionNotFound = 5,
    UnsupportedArgumentType = 6,
    NativeFailure = 7,
    Panic = 8,
    Registration = 9,
}

/// An error condition as signaled to the host runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HostError {
    pub code: ErrorCode,
    pub message: String,
}

impl HostError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    /// An error raised by the host runtime.
    pub fn host(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Host, message)
    }
}

impl From<TypeError> for HostError {
    fn from(err: TypeError) -> Self {
        HostError::new(ErrorCode::TypeNotWrapped, err.to_string())
    }
}

impl From<ConversionError> for HostError {
    fn from(err: ConversionError) -> Self {
        let code = match err {
            ConversionError::Type(_) => ErrorCode::TypeNotWrapped,
            _ => ErrorCode::Conversion,
        };
        HostError::new(code, err.to_string())
    }
}

impl From<NativeError> for HostError {
    fn from(err: NativeError) -> Self {
        let code = match &err {
            NativeError::Argument { source: ConversionError::Type(_), .. } => ErrorCode::TypeNotWrapped,
            NativeError::Argument { .. } | NativeError::Return(_) | NativeError::ArityMismatch { .. } => {
                ErrorCode::Conversion
            }
            NativeError::UnsupportedArgumentType { .. } => ErrorCode::UnsupportedArgumentType,
            NativeError::Panic { .. } => ErrorCode::Panic,
            NativeError::StaleFunction { .. } => ErrorCode::FunctionNotFound,
            NativeError::Failed { .. } => ErrorCode::NativeFailure,
        };
        HostError::new(code, err.to_string())
    }
}

impl From<RegistrationError> for HostError {
    fn from(err: RegistrationError) -> Self {
        match err {
            RegistrationError::Host(host) => host,
            RegistrationError::Type(e) => e.into(),
            RegistrationError::Conversion(e) => e.into(),
            RegistrationError::Native(e) => e.into(),
            RegistrationError::DuplicatePackage(_) => HostError::new(ErrorCode::DuplicatePackage, err.to_string()),
            RegistrationError::PackageNotFound(_) => HostError::new(ErrorCode::PackageNotFound, err.to_string()),
            RegistrationError::FunctionNotFound { .. } => HostError::new(ErrorCode::FunctionNotFound, err.to_string()),
            _ => HostError::new(ErrorCode::Registration, err.to_string()),
        }
    }
}

// ============================================================================
// Top-level
// ============================================================================

/// Unified error for callers that do not need the per-layer types.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BindError {
    #[error(transparent)]
    Type(#[from] TypeError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Native(#[from] NativeError),

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Host(#[from] HostError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_wrapped_message_names_type() {
        let err = TypeError::NotWrapped { type_name: "Point" };
        assert_eq!(err.to_string(), "type Point has no host wrapper");
    }

    #[test]
    fn not_a_string_names_actual_type() {
        let err = ConversionError::NotAString { actual: "INTEGER" };
        assert_eq!(err.to_string(), "object is not a string but a INTEGER");
    }

    #[test]
    fn overflow_display() {
        let err = ConversionError::IntegerOverflow { value: 300, target_type: "u8" };
        assert!(err.to_string().contains("300"));
        assert!(err.to_string().contains("u8"));
    }

    #[test]
    fn argument_error_includes_position() {
        let err = NativeError::Argument { position: 2, source: ConversionError::mismatch(TypeTag::INT32, "STRING") };
        let msg = err.to_string();
        assert!(msg.starts_with("argument 2:"));
        assert!(msg.contains("(SIGNED-BYTE 32)"));
    }

    #[test]
    fn panic_payloads() {
        let err = NativeError::from_panic(Box::new("boom"));
        assert_eq!(err, NativeError::Panic { message: "boom".into() });

        let err = NativeError::from_panic(Box::new(String::from("owned")));
        assert_eq!(err, NativeError::Panic { message: "owned".into() });

        let err = NativeError::from_panic(Box::new(42u32));
        assert_eq!(err, NativeError::Panic { message: "unknown panic payload".into() });
    }

    #[test]
    fn host_error_codes() {
        let host: HostError = RegistrationError::DuplicatePackage("FOO".into()).into();
        assert_eq!(host.code, ErrorCode::DuplicatePackage);
        assert_eq!(host.message, "package FOO is already registered");

        let host: HostError = NativeError::failed("bad input").into();
        assert_eq!(host.code, ErrorCode::NativeFailure);
        assert_eq!(host.to_string(), "bad input");

        let host: HostError = RegistrationError::Host(HostError::host("raw")).into();
        assert_eq!(host.code, ErrorCode::Host);
    }

    #[test]
    fn error_code_round_trips_through_u8() {
        let raw: u8 = ErrorCode::Panic.into();
        assert_eq!(raw, 8);
        assert_eq!(ErrorCode::try_from(raw).unwrap(), ErrorCode::Panic);
        assert!(ErrorCode::try_from(200u8).is_err());
    }

    #[test]
    fn type_not_found_lists_packages() {
        let err = RegistrationError::TypeNotFound { name: "POINT".into(), searched: vec!["GEO".into(), "CL".into()] };
        assert_eq!(err.to_string(), "type POINT was not found, searched packages: GEO, CL");
    }
}
