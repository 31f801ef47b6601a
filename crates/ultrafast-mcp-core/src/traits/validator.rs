//! Common validator trait patterns
//!
//! This module defines common validator traits that are used across
//! different MCP implementations to ensure consistency.

use crate::MCPResult;

/// Base trait for all validators
pub trait BaseValidator<T> {
    /// Validate an item and return result
    fn validate(&self, item: &T) -> MCPResult<()>;

    /// Get validator name for debugging/logging
    fn name(&self) -> &'static str;

    /// Check if validator is enabled
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Trait for validators that can provide validation context
pub trait ContextualValidator<T, Context>: BaseValidator<T> {
    /// Validate an item with additional context
    fn validate_with_context(&self, item: &T, context: &Context) -> MCPResult<()>;
}

/// Trait for validators that can provide suggestions for fixing validation errors
pub trait SuggestiveValidator<T>: BaseValidator<T> {
    /// Suggest fixes for validation errors
    fn suggest_fixes(&self, item: &T) -> Vec<String>;
}

/// Composite validator that runs multiple validators
pub struct CompositeValidator<T> {
    validators: Vec<Box<dyn BaseValidator<T>>>,
    #[allow(dead_code)]
    name: String,
}

impl<T> CompositeValidator<T> {
    pub fn new(name: String) -> Self {
        Self {
            validators: Vec::new(),
            name,
        }
    }

    pub fn add_validator(mut self, validator: Box<dyn BaseValidator<T>>) -> Self {
        self.validators.push(validator);
        self
    }
}

impl<T> BaseValidator<T> for CompositeValidator<T> {
    fn validate(&self, item: &T) -> MCPResult<()> {
        for validator in &self.validators {
            if validator.is_enabled() {
                validator.validate(item)?;
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        // This is a limitation - we can't return the dynamic name
        // In practice, you'd want to use a different approach for dynamic names
        "CompositeValidator"
    }
}

/// Macro to implement common validator patterns
#[macro_export]
macro_rules! impl_base_validator {
    ($validator_type:ty, $target_type:ty, $name:expr) => {
        impl $crate::traits::BaseValidator<$target_type> for $validator_type {
            fn validate(&self, item: &$target_type) -> $crate::MCPResult<()> {
                self.validate_impl(item)
            }

            fn name(&self) -> &'static str {
                $name
            }
        }
    };
}
