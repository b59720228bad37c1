//! Per-field constraint support.

use crate::core::Value;
use crate::error::ValidationError;

/// Extra predicate a field's value must satisfy beyond its declared type.
///
/// Closures of the form `Fn(&Value) -> Result<(), ValidationError>` implement
/// this trait, so most constraints are written inline when declaring a schema.
///
/// # Examples
///
/// ```rust
/// use reactive_config::core::{FieldType, ModelSchema, Value};
/// use reactive_config::error::ValidationError;
///
/// let schema = ModelSchema::builder("Server")
///     .field("port", FieldType::Integer)
///     .constrained(|value: &Value| match value.as_i64() {
///         Some(port) if port >= 1024 => Ok(()),
///         _ => Err(ValidationError::invalid_field(
///             "port",
///             "must be >= 1024 (privileged ports require root)",
///         )),
///     })
///     .build();
/// # let _ = schema;
/// ```
pub trait Constraint: Send + Sync {
    /// Check the value.
    ///
    /// # Errors
    ///
    /// Should return a `ValidationError` describing what validation failed.
    fn check(&self, value: &Value) -> Result<(), ValidationError>;
}

impl<F> Constraint for F
where
    F: Fn(&Value) -> Result<(), ValidationError> + Send + Sync,
{
    fn check(&self, value: &Value) -> Result<(), ValidationError> {
        self(value)
    }
}
