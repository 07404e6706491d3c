//! Binding configuration.

use std::borrow::Cow;

use clbind_core::RegistrationError;

/// Settings fixed when the binding is initialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingConfig {
    /// Upcase package, function and class names the way the host reader does.
    pub upcase_names: bool,
    /// Always register through the conversion path, even for signatures
    /// that qualify for a direct call.
    pub force_convert: bool,
    /// Root constant values so the collector never reclaims them.
    pub protect_constants: bool,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self { upcase_names: true, force_convert: false, protect_constants: true }
    }
}

impl BindingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_upcase_names(mut self, enabled: bool) -> Self {
        self.upcase_names = enabled;
        self
    }

    pub fn with_force_convert(mut self, enabled: bool) -> Self {
        self.force_convert = enabled;
        self
    }

    pub fn with_protect_constants(mut self, enabled: bool) -> Self {
        self.protect_constants = enabled;
        self
    }

    /// Name as the host will intern it. Blank names are rejected.
    pub fn canonical_name<'a>(&self, name: &'a str) -> Result<Cow<'a, str>, RegistrationError> {
        let trimmed = name.trim();
        if trimmed.is_empty() || trimmed.len() != name.len() {
            return Err(RegistrationError::InvalidName(name.to_string()));
        }
        if self.upcase_names && name.chars().any(char::is_lowercase) {
            Ok(Cow::Owned(name.to_uppercase()))
        } else {
            Ok(Cow::Borrowed(name))
        }
    }
}
