//! Directory Store Module
//!
//! One file per key inside a directory, written atomically.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::cache::backend::BackingStore;
use crate::cache::Key;
use crate::error::{CacheError, Result};

/// Permission bits applied to every written file.
pub const DEFAULT_FILE_MODE: u32 = 0o666;

// == Directory Store ==
/// A [`BackingStore`] that keeps each value in its own file.
///
/// File names are the lowercase hex of the key bytes. Values are written to a
/// temporary file in the same directory and renamed into place, so a reader
/// sees either the old value or the new one.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    dir: PathBuf,
    mode: u32,
}

impl DirectoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            mode: DEFAULT_FILE_MODE,
        }
    }

    /// Sets the permission bits for written files.
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    /// Absolute file name for a key.
    pub fn file_path(&self, key: &[u8]) -> PathBuf {
        self.dir.join(hex::encode(key))
    }

    fn write_atomic(&self, target: &Path, bytes: &[u8]) -> Result<()> {
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        self.apply_mode(tmp.as_file())?;
        tmp.persist(target).map_err(|e| e.error)?;
        Ok(())
    }

    #[cfg(unix)]
    fn apply_mode(&self, file: &fs::File) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(self.mode))?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn apply_mode(&self, _file: &fs::File) -> Result<()> {
        Ok(())
    }
}

impl BackingStore for DirectoryStore {
    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        match fs::read(self.file_path(key)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(CacheError::KeyNotFound(Key::from(key))),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let target = self.file_path(key);
        self.write_atomic(&target, value)
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        match fs::remove_file(self.file_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(CacheError::KeyNotFound(Key::from(key))),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> Vec<Vec<u8>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %self.dir.display(), error = %e, "Directory not listable, reporting no keys");
                return Vec::new();
            }
        };

        entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name();
                let name = name.to_str()?;
                match Key::from_hex(name) {
                    Ok(key) => Some(key.into_bytes()),
                    Err(_) => {
                        debug!(file = name, "Skipping foreign file in cache directory");
                        None
                    }
                }
            })
            .collect()
    }

    fn exists(&self, key: &[u8]) -> bool {
        self.file_path(key).is_file()
    }

    fn location(&self) -> &Path {
        &self.dir
    }

    fn is_present(&self) -> bool {
        self.dir.exists()
    }

    fn create(&mut self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        fs::remove_dir_all(&self.dir)?;
        Ok(())
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_in(dir: &Path) -> DirectoryStore {
        let mut store = DirectoryStore::new(dir.join("cache"));
        store.create().unwrap();
        store
    }

    #[test]
    fn test_one_file_per_key() {
        let tmp = tempdir().unwrap();
        let mut store = store_in(tmp.path());

        store.set(b"foo", b"v1").unwrap();

        let path = store.path().join("666f6f");
        assert!(path.is_file());
        assert_eq!(fs::read(&path).unwrap(), b"v1");
        assert_eq!(store.get(b"foo").unwrap(), b"v1");
    }

    #[test]
    fn test_overwrite_replaces_value() {
        let tmp = tempdir().unwrap();
        let mut store = store_in(tmp.path());

        store.set(b"k", b"old").unwrap();
        store.set(b"k", b"new").unwrap();

        assert_eq!(store.get(b"k").unwrap(), b"new");
        assert_eq!(store.keys().len(), 1);
    }

    #[test]
    fn test_missing_key() {
        let tmp = tempdir().unwrap();
        let mut store = store_in(tmp.path());

        assert!(matches!(store.get(b"x"), Err(CacheError::KeyNotFound(_))));
        assert!(matches!(store.delete(b"x"), Err(CacheError::KeyNotFound(_))));
        assert!(!store.exists(b"x"));
    }

    #[test]
    fn test_keys_skip_foreign_files() {
        let tmp = tempdir().unwrap();
        let mut store = store_in(tmp.path());

        store.set(b"a", b"1").unwrap();
        fs::write(store.path().join(".tmpABC123"), b"junk").unwrap();
        fs::write(store.path().join("README"), b"junk").unwrap();

        assert_eq!(store.keys(), vec![b"a".to_vec()]);
    }

    #[test]
    fn test_keys_of_missing_directory_is_empty() {
        let tmp = tempdir().unwrap();
        let store = DirectoryStore::new(tmp.path().join("never-created"));
        assert!(store.keys().is_empty());
        assert!(!store.is_present());
    }

    #[test]
    fn test_create_is_idempotent_and_destroy_removes() {
        let tmp = tempdir().unwrap();
        let mut store = store_in(tmp.path());
        store.set(b"a", b"1").unwrap();

        store.create().unwrap();
        assert!(store.exists(b"a"));

        store.destroy().unwrap();
        assert!(!store.is_present());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_mode_applied() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempdir().unwrap();
        let mut store = store_in(tmp.path()).with_mode(0o640);
        store.set(b"a", b"1").unwrap();

        let mode = fs::metadata(store.file_path(b"a")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }
}
