//! Configuration files on disk: identity and codec.

pub mod codec;
mod file;

pub use codec::KvTree;
pub use file::{ConfigFile, FileFormat};
