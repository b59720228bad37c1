//! Canonical identity of a configuration file on disk.

use crate::error::{ConfigError, Result};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

/// Serialization format of a configuration file, selected by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileFormat {
    /// `.json`
    Json,
    /// `.yaml`
    Yaml,
    /// `.toml`
    Toml,
}

impl FileFormat {
    /// Detect the format from the path's extension.
    ///
    /// Only `.json`, `.yaml` and `.toml` are supported.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnsupportedFileType`] for any other extension,
    /// including a missing one.
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("yaml") => Ok(Self::Yaml),
            Some("toml") => Ok(Self::Toml),
            _ => Err(ConfigError::UnsupportedFileType(path.to_path_buf())),
        }
    }

    /// Returns true if the path carries a supported extension.
    pub fn is_supported(path: &Path) -> bool {
        Self::from_path(path).is_ok()
    }

    /// Lowercase name of the format.
    pub fn name(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Toml => "toml",
        }
    }
}

/// Canonical handle to a configuration file.
///
/// Equality and hashing use only the canonical absolute path, so identities
/// built from `"a/b.json"`, `"./a/b.json"` or an absolute path to the same
/// file compare equal and can key maps and sets.
///
/// # Examples
///
/// ```rust,no_run
/// use reactive_config::sources::ConfigFile;
///
/// let file = ConfigFile::new("config/app.yaml")?;
/// assert_eq!(file.filename(), "app.yaml");
/// # Ok::<(), reactive_config::error::ConfigError>(())
/// ```
#[derive(Clone)]
pub struct ConfigFile {
    path: PathBuf,
    filename: String,
    directory: PathBuf,
    format: FileFormat,
}

impl ConfigFile {
    /// Resolve `path` to a canonical configuration file identity.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::UnsupportedFileType`] if the extension is not json, yaml or toml
    /// - [`ConfigError::FileNotFound`] if the path cannot be resolved
    /// - [`ConfigError::NotAFile`] if the path is a directory or other non-regular file
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = FileFormat::from_path(path)?;

        let canonical = path
            .canonicalize()
            .map_err(|_| ConfigError::FileNotFound(path.to_path_buf()))?;

        if !canonical.is_file() {
            return Err(ConfigError::NotAFile(canonical));
        }

        let filename = canonical
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| ConfigError::NotAFile(canonical.clone()))?;
        let directory = canonical
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| ConfigError::NotAFile(canonical.clone()))?;

        Ok(Self {
            path: canonical,
            filename,
            directory,
            format,
        })
    }

    /// Canonical absolute path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name including extension.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Canonical parent directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Format derived from the extension.
    pub fn format(&self) -> FileFormat {
        self.format
    }
}

impl PartialEq for ConfigFile {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for ConfigFile {}

impl Hash for ConfigFile {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl fmt::Debug for ConfigFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConfigFile").field(&self.path).finish()
    }
}

impl fmt::Display for ConfigFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

impl AsRef<Path> for ConfigFile {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}
