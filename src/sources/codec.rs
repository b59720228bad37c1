//! Reading and writing configuration documents as key-value trees.
//!
//! The format is chosen from the file extension. JSON is always available;
//! YAML and TOML require the `yaml` and `toml` features.

use super::file::FileFormat;
use crate::error::{ConfigError, Result};
use std::fs;
use std::path::Path;

/// Generic, untyped configuration document.
pub type KvTree = serde_json::Value;

/// Read and parse the configuration document at `path`.
///
/// # Errors
///
/// - [`ConfigError::UnsupportedFileType`] if the extension is not supported
/// - [`ConfigError::FileRead`] on I/O or parse failure
/// - [`ConfigError::FeatureNotEnabled`] if the format's feature is disabled
pub fn read(path: impl AsRef<Path>) -> Result<KvTree> {
    let path = path.as_ref();
    let format = FileFormat::from_path(path)?;
    let content = fs::read_to_string(path).map_err(|e| ConfigError::read(path, e))?;
    parse(format, &content).map_err(|e| match e {
        ConfigError::FileRead { reason, .. } => ConfigError::read(path, reason),
        other => other,
    })
}

/// Serialize `tree` and write it to `path`, replacing any existing content.
///
/// # Errors
///
/// - [`ConfigError::UnsupportedFileType`] if the extension is not supported
/// - [`ConfigError::FileWrite`] on serialization or I/O failure
/// - [`ConfigError::FeatureNotEnabled`] if the format's feature is disabled
pub fn write(path: impl AsRef<Path>, tree: &KvTree) -> Result<()> {
    let path = path.as_ref();
    let format = FileFormat::from_path(path)?;
    let content = render(format, tree).map_err(|e| match e {
        ConfigError::FileWrite { reason, .. } => ConfigError::write(path, reason),
        other => other,
    })?;
    fs::write(path, content).map_err(|e| ConfigError::write(path, e))
}

/// Parse `content` in the given format.
pub fn parse(format: FileFormat, content: &str) -> Result<KvTree> {
    match format {
        FileFormat::Json => serde_json::from_str(content).map_err(|e| ConfigError::read("", e)),
        #[cfg(feature = "yaml")]
        FileFormat::Yaml => serde_yaml::from_str(content).map_err(|e| ConfigError::read("", e)),
        #[cfg(feature = "toml")]
        FileFormat::Toml => toml::from_str(content).map_err(|e| ConfigError::read("", e)),
        #[allow(unreachable_patterns)]
        other => Err(ConfigError::FeatureNotEnabled(other.name())),
    }
}

/// Render `tree` in the given format.
///
/// TOML has no null, so null table entries are left out of TOML output and
/// read back as absent keys.
pub fn render(format: FileFormat, tree: &KvTree) -> Result<String> {
    match format {
        FileFormat::Json => {
            serde_json::to_string_pretty(tree).map_err(|e| ConfigError::write("", e))
        }
        #[cfg(feature = "yaml")]
        FileFormat::Yaml => serde_yaml::to_string(tree).map_err(|e| ConfigError::write("", e)),
        #[cfg(feature = "toml")]
        FileFormat::Toml => {
            toml::to_string_pretty(&without_nulls(tree)).map_err(|e| ConfigError::write("", e))
        }
        #[allow(unreachable_patterns)]
        other => Err(ConfigError::FeatureNotEnabled(other.name())),
    }
}

#[cfg(feature = "toml")]
fn without_nulls(tree: &KvTree) -> KvTree {
    match tree {
        KvTree::Object(entries) => KvTree::Object(
            entries
                .iter()
                .filter(|(_, value)| !value.is_null())
                .map(|(key, value)| (key.clone(), without_nulls(value)))
                .collect(),
        ),
        KvTree::Array(items) => KvTree::Array(items.iter().map(without_nulls).collect()),
        other => other.clone(),
    }
}
