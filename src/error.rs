//! Error types for reactive-config.

use std::fmt;
use std::path::PathBuf;

/// Result type alias for reactive-config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur when working with configuration models.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The field is not declared on the model's schema.
    #[error("Field '{field}' does not exist on model '{model}'")]
    UnknownField {
        /// Name of the model schema
        model: String,
        /// The undeclared field name
        field: String,
    },

    /// The value does not satisfy the field's declared constraint.
    #[error("Type mismatch for field '{field}': {reason}")]
    TypeMismatch {
        /// The field name/path
        field: String,
        /// Why the value was rejected
        reason: String,
    },

    /// A required field was absent from the key-value tree used for construction.
    #[error("Missing required field '{field}' for model '{model}'")]
    MissingField {
        /// Name of the model schema
        model: String,
        /// The missing field name
        field: String,
    },

    /// The callback was never subscribed to the field.
    #[error("Callback is not subscribed to field '{field}'")]
    NotSubscribed {
        /// The field name
        field: String,
    },

    /// The file extension is not one of the supported configuration formats.
    #[error("Unsupported configuration file type: {}. Supported: .json, .yaml, .toml", .0.display())]
    UnsupportedFileType(PathBuf),

    /// The path exists but is not a regular file.
    #[error("Not a regular file: {}", .0.display())]
    NotAFile(PathBuf),

    /// The path does not exist or cannot be resolved.
    #[error("Configuration file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Save requested without an explicit path on a root with no bound file.
    #[error("No file path specified and the model has no bound file")]
    MissingFileBinding,

    /// Failed to read or parse a configuration file.
    #[error("Failed to read {}: {reason}", .path.display())]
    FileRead {
        /// The file being read
        path: PathBuf,
        /// Underlying I/O or parse failure
        reason: String,
    },

    /// Failed to serialize or write a configuration file.
    #[error("Failed to write {}: {reason}", .path.display())]
    FileWrite {
        /// The file being written
        path: PathBuf,
        /// Underlying I/O or serialization failure
        reason: String,
    },

    /// File watching is not supported or failed to initialize.
    #[error("File watching error: {0}")]
    WatchError(String),

    /// Attempted to use a feature that is not enabled.
    #[error("Feature not enabled: {0}")]
    FeatureNotEnabled(&'static str),

    /// Several independent operations failed, in the order they were attempted.
    #[error("{} operations failed: {}", .0.len(), join_errors(.0))]
    Multiple(Vec<ConfigError>),
}

fn join_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Error returned by field constraints.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Custom validation error with a message.
    Custom(String),

    /// A specific field has an invalid value.
    InvalidField {
        /// The field name/path
        field: String,
        /// The reason why it's invalid
        reason: String,
    },

    /// Multiple validation errors occurred.
    Multiple(Vec<ValidationError>),
}

impl ValidationError {
    /// Create a custom validation error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Create an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(msg) => write!(f, "{}", msg),
            Self::InvalidField { field, reason } => {
                write!(f, "Field '{}' is invalid: {}", field, reason)
            }
            Self::Multiple(errors) => {
                writeln!(f, "Multiple validation errors:")?;
                for (i, err) in errors.iter().enumerate() {
                    writeln!(f, "  {}. {}", i + 1, err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl ConfigError {
    /// Build a type mismatch error for `field`.
    pub fn type_mismatch(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TypeMismatch {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn read(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        Self::FileRead {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        Self::FileWrite {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
