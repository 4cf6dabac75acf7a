//! Purpose: Shared store-location defaults and connection-string parsing.
//! Exports: `StoreLocation`, `default_store_path`, `open_store`.
//! Role: Keep CLI, server, and tests agreeing on what a store string means.
//! Invariants: Default store file remains `~/.clientbook/records.json`.
//! Invariants: `memory:` never touches the filesystem.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::core::error::{Error, ErrorKind};
use crate::core::store::{FileStore, MemoryStore, RecordStore};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StoreLocation {
    Memory,
    File(PathBuf),
}

pub fn default_store_path() -> PathBuf {
    let home = std::env::var_os("HOME").unwrap_or_default();
    PathBuf::from(home).join(".clientbook").join("records.json")
}

impl Default for StoreLocation {
    fn default() -> Self {
        StoreLocation::File(default_store_path())
    }
}

impl FromStr for StoreLocation {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if value.is_empty() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("store location must not be empty")
                .with_hint("Use `memory:`, `file:<path>`, or a file path."));
        }
        if value == "memory" || value == "memory:" {
            return Ok(StoreLocation::Memory);
        }
        if let Some(rest) = value.strip_prefix("file://") {
            return file_location(rest);
        }
        if let Some(rest) = value.strip_prefix("file:") {
            return file_location(rest);
        }
        if let Some((scheme, _)) = value.split_once("://") {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("unsupported store scheme `{scheme}`"))
                .with_hint("Use `memory:`, `file:<path>`, or a file path."));
        }
        file_location(value)
    }
}

fn file_location(path: &str) -> Result<StoreLocation, Error> {
    if path.is_empty() {
        return Err(Error::new(ErrorKind::Usage).with_message("store file path must not be empty"));
    }
    Ok(StoreLocation::File(PathBuf::from(path)))
}

impl fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreLocation::Memory => f.write_str("memory:"),
            StoreLocation::File(path) => write!(f, "file:{}", path.display()),
        }
    }
}

pub fn open_store(location: &StoreLocation) -> Result<Arc<dyn RecordStore>, Error> {
    match location {
        StoreLocation::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreLocation::File(path) => Ok(Arc::new(FileStore::open(path)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::{StoreLocation, open_store};
    use crate::core::error::ErrorKind;
    use std::path::PathBuf;

    #[test]
    fn parses_supported_forms() {
        assert_eq!("memory:".parse::<StoreLocation>().expect("memory"), StoreLocation::Memory);
        assert_eq!(
            "file:/tmp/a.json".parse::<StoreLocation>().expect("file"),
            StoreLocation::File(PathBuf::from("/tmp/a.json"))
        );
        assert_eq!(
            "file:///tmp/a.json".parse::<StoreLocation>().expect("file url"),
            StoreLocation::File(PathBuf::from("/tmp/a.json"))
        );
        assert_eq!(
            "data/records.json".parse::<StoreLocation>().expect("path"),
            StoreLocation::File(PathBuf::from("data/records.json"))
        );
    }

    #[test]
    fn rejects_unknown_schemes() {
        let err = "mongodb://localhost/records"
            .parse::<StoreLocation>()
            .expect_err("scheme");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!("".parse::<StoreLocation>().is_err());
    }

    #[test]
    fn open_store_creates_file_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("records.json");
        let store = open_store(&StoreLocation::File(path.clone())).expect("open");
        assert!(path.exists());
        assert!(store.describe().starts_with("file:"));
    }
}
