use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::ChartError;
use crate::key::StorageKey;
use crate::series::CandleSeries;

/// Filesystem-backed store for raw `returnChartData` responses.
///
/// Directory layout: `{root}/{BASE}_{QUOTE}_{START}_{END}_`, one file per key,
/// holding the response body exactly as received.
///
/// Access to a key is serialized within the process, and writes land through
/// a rename so a reader never sees a partially written file.
pub struct ChartStore {
    root: PathBuf,
    locks: Mutex<HashMap<StorageKey, Arc<Mutex<()>>>>,
}

impl ChartStore {
    /// Create a store rooted at the given directory.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the stored file for a key.
    pub fn file_path(&self, key: &StorageKey) -> PathBuf {
        self.root.join(key.file_name())
    }

    /// Check if data exists for a key.
    pub fn has_data(&self, key: &StorageKey) -> bool {
        self.file_path(key).is_file()
    }

    /// Write raw bytes for a key, replacing any existing file.
    /// Creates the root directory as needed. Files are `0644` on Unix.
    pub fn write_raw(&self, key: &StorageKey, bytes: &[u8]) -> Result<PathBuf, ChartError> {
        let path = self.file_path(key);

        let write_err = |source| ChartError::StorageWrite {
            path: path.clone(),
            source,
        };

        self.with_key_lock(key, || {
            std::fs::create_dir_all(&self.root).map_err(write_err)?;
            let mut tmp = NamedTempFile::new_in(&self.root).map_err(write_err)?;
            tmp.write_all(bytes).map_err(write_err)?;
            tmp.as_file().sync_all().map_err(write_err)?;
            set_file_mode(tmp.as_file()).map_err(write_err)?;
            tmp.persist(&path).map_err(|e| write_err(e.error))
        })?;

        debug!("wrote {} byte(s) to {}", bytes.len(), path.display());
        Ok(path)
    }

    /// Read the raw bytes stored for a key.
    pub fn read_raw(&self, key: &StorageKey) -> Result<Vec<u8>, ChartError> {
        self.with_key_lock(key, || read_file(&self.file_path(key)))
    }

    /// Read and decode the candles stored for a key.
    pub fn load(&self, key: &StorageKey) -> Result<CandleSeries, ChartError> {
        let bytes = self.read_raw(key)?;
        CandleSeries::decode(&bytes)
    }

    /// List all keys with data in the store, sorted.
    /// Files whose names are not storage keys are skipped.
    pub fn list_keys(&self) -> Result<Vec<StorageKey>, ChartError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let read_err = |source| ChartError::StorageRead {
            path: self.root.clone(),
            source,
        };

        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.root).map_err(read_err)? {
            let entry = entry.map_err(read_err)?;
            if entry.file_type().map_err(read_err)?.is_file()
                && let Some(name) = entry.file_name().to_str()
                && let Ok(key) = name.parse::<StorageKey>()
            {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Run `f` holding the key's lock. The lock entry is dropped from the
    /// map once no other caller holds it.
    fn with_key_lock<T>(&self, key: &StorageKey, f: impl FnOnce() -> T) -> T {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(key.clone()).or_default())
        };

        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        if locks.get(key).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(key);
        }
        result
    }
}

/// Read and decode a stored file by path.
pub fn load(path: impl AsRef<Path>) -> Result<CandleSeries, ChartError> {
    let bytes = read_file(path.as_ref())?;
    CandleSeries::decode(&bytes)
}

fn read_file(path: &Path) -> Result<Vec<u8>, ChartError> {
    std::fs::read(path).map_err(|source| ChartError::StorageRead {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(unix)]
fn set_file_mode(file: &std::fs::File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn set_file_mode(_file: &std::fs::File) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics;

    fn btc_xmr() -> StorageKey {
        StorageKey::new("BTC", "XMR", 1512086400, 1512087400)
    }

    impl ChartStore {
        fn locked_keys(&self) -> usize {
            self.locks.lock().unwrap().len()
        }
    }

    #[test]
    fn file_path_format() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChartStore::new(dir.path());
        let path = store.file_path(&btc_xmr());
        assert_eq!(path, dir.path().join("BTC_XMR_1512086400_1512087400_"));
    }

    #[test]
    fn has_data_false_before_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChartStore::new(dir.path());
        assert!(!store.has_data(&btc_xmr()));
    }

    #[test]
    fn write_and_read_raw_bytes_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChartStore::new(dir.path());
        let bytes = b"[{\"date\":1512086400,\"open\":0.03,\"close\":0.031}]\n\x00\xff";

        store.write_raw(&btc_xmr(), bytes).unwrap();
        assert!(store.has_data(&btc_xmr()));
        assert_eq!(store.read_raw(&btc_xmr()).unwrap(), bytes.to_vec());
    }

    #[test]
    fn write_creates_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChartStore::new(dir.path().join("nested/datastore"));
        store.write_raw(&btc_xmr(), b"[]").unwrap();
        assert!(dir.path().join("nested/datastore").is_dir());
    }

    #[test]
    fn write_overwrites_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChartStore::new(dir.path());

        store.write_raw(&btc_xmr(), b"[{\"open\":1.0}]").unwrap();
        store.write_raw(&btc_xmr(), b"[]").unwrap();

        assert_eq!(store.read_raw(&btc_xmr()).unwrap(), b"[]".to_vec());
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[cfg(unix)]
    #[test]
    fn written_file_is_0644() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = ChartStore::new(dir.path());
        let path = store.write_raw(&btc_xmr(), b"[]").unwrap();
        let mode = std::fs::metadata(path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn load_missing_file_is_storage_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChartStore::new(dir.path());

        let err = store.load(&btc_xmr()).unwrap_err();
        assert!(matches!(err, ChartError::StorageRead { .. }));
        assert!(err.is_missing());

        let err = load(dir.path().join("nope")).unwrap_err();
        assert!(err.is_missing());
    }

    #[test]
    fn load_corrupt_file_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChartStore::new(dir.path());
        store.write_raw(&btc_xmr(), b"[{\"open\":1.0").unwrap();

        let err = store.load(&btc_xmr()).unwrap_err();
        assert!(err.is_corrupt());
        assert!(!err.is_missing());
    }

    #[test]
    fn load_then_change_falling_candle() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChartStore::new(dir.path());
        let path = store
            .write_raw(&btc_xmr(), br#"[{"Open":100.0,"Close":80.0}]"#)
            .unwrap();

        let series = load(&path).unwrap();
        assert_eq!(metrics::change(&series).unwrap(), 20.0);
    }

    #[test]
    fn load_then_change_rising_candle() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChartStore::new(dir.path());
        store
            .write_raw(&btc_xmr(), br#"[{"Open":80.0,"Close":100.0}]"#)
            .unwrap();

        let series = store.load(&btc_xmr()).unwrap();
        assert_eq!(metrics::change(&series).unwrap(), 0.0);
    }

    #[test]
    fn load_empty_array_then_change_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChartStore::new(dir.path());
        store.write_raw(&btc_xmr(), b"[]").unwrap();

        let series = store.load(&btc_xmr()).unwrap();
        assert!(series.is_empty());
        assert!(matches!(
            metrics::change(&series),
            Err(ChartError::EmptySeries)
        ));
    }

    #[test]
    fn list_keys_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChartStore::new(dir.path());

        let eth = StorageKey::new("BTC", "ETH", 1, 2);
        store.write_raw(&btc_xmr(), b"[]").unwrap();
        store.write_raw(&eth, b"[]").unwrap();
        std::fs::write(dir.path().join("README"), "not a key").unwrap();
        std::fs::create_dir(dir.path().join("BTC_LTC_1_2_")).unwrap();

        assert_eq!(store.list_keys().unwrap(), vec![eth, btc_xmr()]);
    }

    #[test]
    fn list_keys_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChartStore::new(dir.path().join("absent"));
        assert!(store.list_keys().unwrap().is_empty());
    }

    #[test]
    fn concurrent_writers_and_readers_see_whole_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ChartStore::new(dir.path()));
        let small = b"[]".to_vec();
        let large = format!("[{}]", vec![r#"{"open":1.0}"#; 2000].join(",")).into_bytes();
        store.write_raw(&btc_xmr(), &small).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                let payload = if i % 2 == 0 { small.clone() } else { large.clone() };
                let (small, large) = (small.clone(), large.clone());
                std::thread::spawn(move || {
                    for _ in 0..20 {
                        store.write_raw(&btc_xmr(), &payload).unwrap();
                        let read = store.read_raw(&btc_xmr()).unwrap();
                        assert!(read == small || read == large);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.locked_keys(), 0);
    }

    #[test]
    fn key_locks_released_after_use() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChartStore::new(dir.path());

        for start in 0..50 {
            let key = StorageKey::new("BTC", "XMR", start, start + 300);
            store.write_raw(&key, b"[]").unwrap();
            store.load(&key).unwrap();
        }
        // Failed reads release their lock too.
        assert!(store.read_raw(&btc_xmr()).is_err());

        assert_eq!(store.locked_keys(), 0);
    }
}
