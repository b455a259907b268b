use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use super::KeyValueStore;
use crate::error::{ParleyError, Result};

/// Configuration for file-backed storage.
#[derive(Debug, Clone)]
pub struct FileStoreConfig {
    pub base_dir: PathBuf,
}

impl FileStoreConfig {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn default_dir() -> PathBuf {
        default_data_dir()
    }
}

/// File-backed store: one file per key under a base directory.
///
/// # Example
/// ```no_run
/// use parley::storage::{FileStore, KeyValueStore};
///
/// let store = FileStore::new_default();
/// store.set("sidebarOpen", "true")?;
/// assert_eq!(store.get("sidebarOpen")?.as_deref(), Some("true"));
/// # Ok::<(), parley::error::ParleyError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    pub fn new(config: FileStoreConfig) -> Self {
        Self {
            base_dir: config.base_dir,
        }
    }

    pub fn new_default() -> Self {
        Self {
            base_dir: default_data_dir(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{}.dat", normalize_key(key)))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.key_path(key);
        match fs::read_to_string(&path) {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.replace(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.key_path(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "parley")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".parley"))
}

/// Map a storage key onto a safe file stem. Case is preserved so that
/// `sidebarOpen` and `sidebaropen` stay distinct.
fn normalize_key(key: &str) -> String {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return "default".to_string();
    }
    trimmed
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

/// Distinguishes concurrent writers' temp files within one process.
static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

impl FileStore {
    /// Write `value` to a sibling temp file, then rename it over the key's
    /// file so readers see either the old or the new blob.
    fn replace(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.base_dir)?;
        let target = self.key_path(key);
        let staging = self.base_dir.join(format!(
            ".{}.{}-{}.tmp",
            normalize_key(key),
            std::process::id(),
            WRITE_SEQ.fetch_add(1, Ordering::Relaxed)
        ));

        let written = fs::File::create(&staging).and_then(|mut file| {
            file.write_all(value.as_bytes())?;
            file.sync_all()
        });
        let result = written.and_then(|()| fs::rename(&staging, &target));
        if result.is_err() {
            let _ = fs::remove_file(&staging);
        }
        result.map_err(|err| {
            ParleyError::Storage(format!("writing {}: {err}", target.display()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, FileStore) {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(FileStoreConfig::new(dir.path().to_path_buf()));
        (dir, store)
    }

    #[test]
    fn value_round_trip_works() {
        let (_dir, store) = temp_store();
        store.set("conversations", "blob-data").unwrap();
        assert_eq!(
            store.get("conversations").unwrap().as_deref(),
            Some("blob-data")
        );
    }

    #[test]
    fn missing_key_reads_as_none() {
        let (_dir, store) = temp_store();
        assert_eq!(store.get("sidebarOpen").unwrap(), None);
    }

    #[test]
    fn remove_is_idempotent() {
        let (_dir, store) = temp_store();
        store.set("k", "v").unwrap();
        store.remove("k").unwrap();
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn set_creates_missing_base_dir() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        let store = FileStore::new(FileStoreConfig::new(nested.clone()));
        store.set("k", "v").unwrap();
        assert!(nested.join("k.dat").exists());
    }

    #[test]
    fn overwrites_leave_no_staging_files() {
        let (dir, store) = temp_store();
        for n in 0..5 {
            store.set("conversations", &format!("blob-{n}")).unwrap();
        }
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["conversations.dat".to_string()]);
        assert_eq!(store.get("conversations").unwrap().as_deref(), Some("blob-4"));
    }

    #[test]
    fn keys_are_sanitized_into_file_names() {
        assert_eq!(normalize_key("sidebarOpen"), "sidebarOpen");
        assert_eq!(normalize_key("../etc/passwd"), "___etc_passwd");
        assert_eq!(normalize_key("  "), "default");
    }
}
