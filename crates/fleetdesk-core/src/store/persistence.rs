// ── Cache persistence backends ──
//
// The entity cache writes through to a key-value `Persistence` backend.
// Values are opaque JSON documents; namespaces separate entity kinds.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::CoreError;

/// Synchronous get/put/delete-by-key store backing the entity cache.
///
/// Implementations must make `put` atomic per key: a concurrent `get` or
/// `load` sees the previous document or the new one, never a partial write.
pub trait Persistence: Send + Sync + 'static {
    /// Every `(key, document)` pair in the namespace.
    fn load(&self, namespace: &str) -> Result<Vec<(String, Vec<u8>)>, CoreError>;

    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, CoreError>;

    fn put(&self, namespace: &str, key: &str, value: &[u8]) -> Result<(), CoreError>;

    /// Deleting a missing key is not an error.
    fn delete(&self, namespace: &str, key: &str) -> Result<(), CoreError>;
}

// ── MemoryPersistence ───────────────────────────────────────────────

/// Ephemeral backend for tests and profiles without a cache directory.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    docs: DashMap<(String, String), Vec<u8>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for MemoryPersistence {
    fn load(&self, namespace: &str) -> Result<Vec<(String, Vec<u8>)>, CoreError> {
        Ok(self
            .docs
            .iter()
            .filter(|r| r.key().0 == namespace)
            .map(|r| (r.key().1.clone(), r.value().clone()))
            .collect())
    }

    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, CoreError> {
        Ok(self
            .docs
            .get(&(namespace.to_owned(), key.to_owned()))
            .map(|r| r.value().clone()))
    }

    fn put(&self, namespace: &str, key: &str, value: &[u8]) -> Result<(), CoreError> {
        self.docs
            .insert((namespace.to_owned(), key.to_owned()), value.to_vec());
        Ok(())
    }

    fn delete(&self, namespace: &str, key: &str) -> Result<(), CoreError> {
        self.docs.remove(&(namespace.to_owned(), key.to_owned()));
        Ok(())
    }
}

// ── FilePersistence ─────────────────────────────────────────────────

/// One JSON document per record under `<root>/<namespace>/`.
///
/// File names are the hex-encoded key, so any directory id is a safe file
/// name. Keys too long for that are named by a UUIDv5 of the key instead,
/// with the key itself in a `.key` file beside the document. Writes go to
/// a temp file in the same directory and are renamed into place.
#[derive(Debug, Clone)]
pub struct FilePersistence {
    root: PathBuf,
}

impl FilePersistence {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir(&self, namespace: &str) -> PathBuf {
        self.root.join(namespace)
    }

    fn path(&self, namespace: &str, key: &str) -> PathBuf {
        self.dir(namespace).join(format!("{}.json", file_stem(key)))
    }

    /// Write `value` to `dir/name` through a temp file and a rename.
    fn write_atomic(dir: &Path, name: &str, value: &[u8]) -> Result<(), CoreError> {
        let tmp = dir.join(format!(".{name}.tmp"));
        {
            let mut file = fs::File::create(&tmp).map_err(CoreError::persistence)?;
            file.write_all(value).map_err(CoreError::persistence)?;
            file.sync_all().map_err(CoreError::persistence)?;
        }
        fs::rename(&tmp, dir.join(name)).map_err(CoreError::persistence)
    }

    /// The key for a file stem: decoded from hex, or read from the
    /// sidecar of a hashed name.
    fn key_for(dir: &Path, stem: &str) -> Option<String> {
        if let Some(key) = decode_key(stem) {
            return Some(key);
        }
        if !stem.starts_with(HASHED_PREFIX) {
            return None;
        }
        let sidecar = dir.join(format!("{stem}.key"));
        match fs::read(&sidecar).map(String::from_utf8) {
            Ok(Ok(key)) => Some(key),
            Ok(Err(e)) => {
                warn!(path = %sidecar.display(), error = %e, "skipping cache record with a garbled key");
                None
            }
            Err(e) => {
                warn!(path = %sidecar.display(), error = %e, "skipping cache record without its key");
                None
            }
        }
    }
}

/// Longest hex stem used as-is. Longer keys are hashed so names stay well
/// under the common 255-byte file name limit.
const MAX_ENCODED_LEN: usize = 200;

/// Marks hashed stems; never produced by hex encoding.
const HASHED_PREFIX: &str = "k-";

fn file_stem(key: &str) -> String {
    let encoded = encode_key(key);
    if encoded.len() <= MAX_ENCODED_LEN {
        return encoded;
    }
    let digest = Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes());
    format!("{HASHED_PREFIX}{}", digest.simple())
}

fn encode_key(key: &str) -> String {
    use std::fmt::Write as _;
    key.bytes().fold(String::with_capacity(key.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

fn decode_key(encoded: &str) -> Option<String> {
    if encoded.len() % 2 != 0 {
        return None;
    }
    let bytes = (0..encoded.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(encoded.get(i..i + 2)?, 16).ok())
        .collect::<Option<Vec<u8>>>()?;
    String::from_utf8(bytes).ok()
}

impl Persistence for FilePersistence {
    fn load(&self, namespace: &str) -> Result<Vec<(String, Vec<u8>)>, CoreError> {
        let dir = self.dir(namespace);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CoreError::persistence(format!("{}: {e}", dir.display()))),
        };

        let mut docs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(CoreError::persistence)?;
            let path = entry.path();
            let Some(key) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(".json"))
                .and_then(|stem| Self::key_for(&dir, stem))
            else {
                // Leftover temp files and foreign files are not records.
                continue;
            };
            match fs::read(&path) {
                Ok(bytes) => docs.push((key, bytes)),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable cache record"),
            }
        }
        debug!(namespace, count = docs.len(), "loaded cache namespace");
        Ok(docs)
    }

    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, CoreError> {
        match fs::read(self.path(namespace, key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CoreError::persistence(e)),
        }
    }

    fn put(&self, namespace: &str, key: &str, value: &[u8]) -> Result<(), CoreError> {
        let dir = self.dir(namespace);
        fs::create_dir_all(&dir).map_err(CoreError::persistence)?;

        let stem = file_stem(key);
        if stem.starts_with(HASHED_PREFIX) {
            // The key lands first so a visible document always has one.
            Self::write_atomic(&dir, &format!("{stem}.key"), key.as_bytes())?;
        }
        Self::write_atomic(&dir, &format!("{stem}.json"), value)
    }

    fn delete(&self, namespace: &str, key: &str) -> Result<(), CoreError> {
        remove_if_present(&self.path(namespace, key))?;
        let stem = file_stem(key);
        if stem.starts_with(HASHED_PREFIX) {
            remove_if_present(&self.dir(namespace).join(format!("{stem}.key")))?;
        }
        Ok(())
    }
}

fn remove_if_present(path: &Path) -> Result<(), CoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CoreError::persistence(e)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn keys_round_trip_through_file_names() {
        let key = "/Students/Grade 5";
        assert_eq!(decode_key(&encode_key(key)).as_deref(), Some(key));
        assert_eq!(decode_key("abc"), None);
        assert_eq!(decode_key("zz"), None);
    }

    #[test]
    fn file_backend_put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePersistence::new(dir.path());

        assert!(store.load("devices").unwrap().is_empty());
        store.put("devices", "d-1", b"{\"a\":1}").unwrap();
        store.put("devices", "d-1", b"{\"a\":2}").unwrap();
        store.put("users", "u-1", b"{}").unwrap();

        assert_eq!(store.get("devices", "d-1").unwrap().unwrap(), b"{\"a\":2}");
        let loaded = store.load("devices").unwrap();
        assert_eq!(loaded, vec![("d-1".to_owned(), b"{\"a\":2}".to_vec())]);

        store.delete("devices", "d-1").unwrap();
        store.delete("devices", "d-1").unwrap();
        assert!(store.get("devices", "d-1").unwrap().is_none());
    }

    #[test]
    fn load_ignores_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePersistence::new(dir.path());
        store.put("devices", "d-1", b"{}").unwrap();
        fs::write(dir.path().join("devices").join(".6431.tmp"), b"partial").unwrap();

        assert_eq!(store.load("devices").unwrap().len(), 1);
    }

    #[test]
    fn long_keys_get_hashed_file_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePersistence::new(dir.path());
        let key = format!("/Students/{}", "Grade 5 Section A ".repeat(16));
        assert!(key.len() > 255);

        store.put("org_units", &key, b"{\"v\":1}").unwrap();
        store.put("org_units", "short", b"{}").unwrap();

        let names: Vec<String> = fs::read_dir(dir.path().join("org_units"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert!(names.iter().all(|n| n.len() <= MAX_ENCODED_LEN + ".json".len()));
        assert!(names.iter().any(|n| n.starts_with(HASHED_PREFIX) && n.ends_with(".key")));

        assert_eq!(store.get("org_units", &key).unwrap().unwrap(), b"{\"v\":1}");
        let mut loaded = store.load("org_units").unwrap();
        loaded.sort();
        assert_eq!(
            loaded,
            vec![
                (key.clone(), b"{\"v\":1}".to_vec()),
                ("short".to_owned(), b"{}".to_vec()),
            ]
        );

        store.delete("org_units", &key).unwrap();
        assert!(store.get("org_units", &key).unwrap().is_none());
        let left = fs::read_dir(dir.path().join("org_units")).unwrap().count();
        assert_eq!(left, 1);
    }

    #[test]
    fn memory_backend_separates_namespaces() {
        let store = MemoryPersistence::new();
        store.put("devices", "x", b"1").unwrap();
        store.put("users", "x", b"2").unwrap();
        assert_eq!(store.load("devices").unwrap(), vec![("x".to_owned(), b"1".to_vec())]);
        store.delete("users", "x").unwrap();
        assert!(store.get("users", "x").unwrap().is_none());
    }
}
