//! Durable bot state: the known-user set plus a free-form memory map.
//!
//! The snapshot is a single JSON document `{"users": [...], "memory": {...}}`.
//! Mutations only touch the in-memory copy; callers flush with [`StatusStore::save`]
//! (or [`StatusStore::save_if_dirty`]). Writes go to a sibling temp file that is
//! renamed into place, so a crash mid-write never leaves a truncated snapshot.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::{domain::UserId, errors::Error, Result};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    #[serde(default)]
    users: BTreeSet<UserId>,
    #[serde(default, deserialize_with = "deserialize_memory")]
    memory: BTreeMap<String, Value>,
}

impl StatusRecord {
    pub fn users(&self) -> impl Iterator<Item = UserId> + '_ {
        self.users.iter().copied()
    }

    pub fn has_user(&self, user: UserId) -> bool {
        self.users.contains(&user)
    }

    /// Returns `false` if the user was already known.
    pub fn add_user(&mut self, user: UserId) -> bool {
        self.users.insert(user)
    }

    pub fn remove_user(&mut self, user: UserId) -> bool {
        self.users.remove(&user)
    }

    pub fn memory(&self) -> &BTreeMap<String, Value> {
        &self.memory
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.memory.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.memory.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.memory.remove(key)
    }
}

// Snapshots written by the first generation of the bot encode an empty map as `[]`.
fn deserialize_memory<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(BTreeMap::new()),
        Value::Array(items) if items.is_empty() => Ok(BTreeMap::new()),
        Value::Object(map) => Ok(map.into_iter().collect()),
        other => Err(serde::de::Error::custom(format!(
            "memory must be an object, got {other}"
        ))),
    }
}

#[derive(Debug, Default)]
struct StoreState {
    record: StatusRecord,
    version: u64,
    saved_version: u64,
}

impl StoreState {
    fn touch(&mut self) {
        self.version += 1;
    }
}

pub struct StatusStore {
    path: PathBuf,
    state: Mutex<StoreState>,
    // Single-writer discipline for the snapshot file.
    save_lock: Mutex<()>,
}

impl StatusStore {
    /// Load the snapshot at `path`, or create an empty one if it does not exist.
    ///
    /// A snapshot that exists but does not parse is a fatal error: silently
    /// starting empty would drop every known user.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if path.exists() {
            let txt = fs::read_to_string(&path)?;
            let record: StatusRecord = serde_json::from_str(&txt).map_err(|source| {
                Error::CorruptStatus {
                    path: path.clone(),
                    source,
                }
            })?;
            tracing::debug!(
                path = %path.display(),
                users = record.users.len(),
                keys = record.memory.len(),
                "status loaded"
            );
            return Ok(Self::with_record(path, record));
        }

        let store = Self::with_record(path, StatusRecord::default());
        let txt = serde_json::to_string_pretty(&StatusRecord::default())?;
        write_atomic(&store.path, txt.as_bytes()).map_err(|source| Error::StatusPersist {
            path: store.path.clone(),
            source,
        })?;
        tracing::info!(path = %store.path.display(), "created empty status file");
        Ok(store)
    }

    fn with_record(path: PathBuf, record: StatusRecord) -> Self {
        Self {
            path,
            state: Mutex::new(StoreState {
                record,
                ..Default::default()
            }),
            save_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize the current in-memory record and write it to disk.
    pub async fn save(&self) -> Result<()> {
        let _writer = self.save_lock.lock().await;

        let (txt, version) = {
            let st = self.state.lock().await;
            (serde_json::to_string_pretty(&st.record)?, st.version)
        };

        write_atomic(&self.path, txt.as_bytes()).map_err(|source| Error::StatusPersist {
            path: self.path.clone(),
            source,
        })?;

        let mut st = self.state.lock().await;
        st.saved_version = st.saved_version.max(version);
        Ok(())
    }

    /// Save only if something changed since the last successful save.
    pub async fn save_if_dirty(&self) -> Result<bool> {
        if !self.is_dirty().await {
            return Ok(false);
        }
        self.save().await?;
        Ok(true)
    }

    pub async fn is_dirty(&self) -> bool {
        let st = self.state.lock().await;
        st.version != st.saved_version
    }

    pub async fn snapshot(&self) -> StatusRecord {
        self.state.lock().await.record.clone()
    }

    /// Run `f` against the current record without cloning it.
    pub async fn read<R>(&self, f: impl FnOnce(&StatusRecord) -> R) -> R {
        let st = self.state.lock().await;
        f(&st.record)
    }

    pub async fn has_user(&self, user: UserId) -> bool {
        self.read(|r| r.has_user(user)).await
    }

    pub async fn add_user(&self, user: UserId) -> bool {
        let mut st = self.state.lock().await;
        let added = st.record.add_user(user);
        if added {
            st.touch();
        }
        added
    }

    pub async fn remove_user(&self, user: UserId) -> bool {
        let mut st = self.state.lock().await;
        let removed = st.record.remove_user(user);
        if removed {
            st.touch();
        }
        removed
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.read(|r| r.get(key).cloned()).await
    }

    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await {
            Some(v) => Ok(Some(serde_json::from_value(v)?)),
            None => Ok(None),
        }
    }

    pub async fn set(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        let mut st = self.state.lock().await;
        if st.record.get(&key) != Some(&value) {
            st.record.set(key, value);
            st.touch();
        }
    }

    pub async fn set_as<T: Serialize>(&self, key: impl Into<String>, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.set(key, value).await;
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> Option<Value> {
        let mut st = self.state.lock().await;
        let removed = st.record.remove(key);
        if removed.is_some() {
            st.touch();
        }
        removed
    }

    /// A view of the memory map whose keys are prefixed with `namespace.`.
    pub fn scoped(self: &Arc<Self>, namespace: &str) -> ScopedMemory {
        ScopedMemory {
            store: self.clone(),
            prefix: format!("{namespace}."),
        }
    }
}

/// Namespaced access to [`StatusStore`] memory.
///
/// The underlying map is shared by every command; this only keeps keys apart
/// by convention.
#[derive(Clone)]
pub struct ScopedMemory {
    store: Arc<StatusStore>,
    prefix: String,
}

impl ScopedMemory {
    fn key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.store.get_as(&self.key(key)).await
    }

    pub async fn set_as<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.store.set_as(self.key(key), value).await
    }

    pub async fn remove(&self, key: &str) -> Option<Value> {
        self.store.remove(&self.key(key)).await
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "status".to_string());
    let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", std::process::id()));

    let result = (|| {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    fn tmp(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_nanos();
        let pid = std::process::id();
        PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}"))
    }

    #[test]
    fn missing_snapshot_is_created_empty() {
        let dir = tmp("jb-status-new");
        let path = dir.join("status.json");

        let _store = StatusStore::load(&path).unwrap();
        assert!(path.exists());

        let on_disk: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk, json!({ "users": [], "memory": {} }));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn corrupt_snapshot_fails_fast() {
        let path = tmp("jb-status-corrupt");
        fs::write(&path, "{\"users\": [1, 2").unwrap();

        let err = StatusStore::load(&path).err().unwrap();
        assert!(matches!(err, Error::CorruptStatus { .. }));
        assert!(err.is_fatal());
        // The broken file is left alone for inspection.
        assert!(fs::read_to_string(&path).unwrap().starts_with("{\"users\""));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn legacy_snapshot_with_string_ids_and_list_memory() {
        let path = tmp("jb-status-legacy");
        fs::write(&path, r#"{"users":["42"],"memory":[]}"#).unwrap();

        let store = StatusStore::load(&path).unwrap();
        let rec = store.state.try_lock().unwrap().record.clone();
        assert!(rec.has_user(UserId(42)));
        assert!(rec.memory().is_empty());

        let _ = fs::remove_file(&path);
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let path = tmp("jb-status-roundtrip");
        let store = StatusStore::load(&path).unwrap();

        store.add_user(UserId(7)).await;
        store.add_user(UserId(3)).await;
        store.add_user(UserId(7)).await;
        store.set("remind.pending", json!([{ "chat": 1, "text": "hi" }])).await;
        store.set("counter", json!(5)).await;
        store.save().await.unwrap();

        let before = store.snapshot().await;
        let reloaded = StatusStore::load(&path).unwrap();
        assert_eq!(reloaded.snapshot().await, before);
        assert_eq!(before.users().collect::<Vec<_>>(), vec![UserId(3), UserId(7)]);

        let _ = fs::remove_file(&path);
    }

    #[tokio::test]
    async fn floats_round_trip_bit_for_bit() {
        let path = tmp("jb-status-floats");
        let store = StatusStore::load(&path).unwrap();

        let values: [f64; 4] = [1.079907802215119e-66, 0.1 + 0.2, 2.2250738585072014e-308, 1e300 / 3.0];
        store.set("floats", json!(values)).await;
        store.save().await.unwrap();

        let reloaded = StatusStore::load(&path).unwrap();
        assert_eq!(reloaded.snapshot().await, store.snapshot().await);
        let back: Vec<f64> = reloaded.get_as("floats").await.unwrap().unwrap();
        for (a, b) in values.iter().zip(&back) {
            assert_eq!(a.to_bits(), b.to_bits());
        }

        let _ = fs::remove_file(&path);
    }

    #[tokio::test]
    async fn empty_state_round_trips() {
        let path = tmp("jb-status-empty");
        let store = StatusStore::load(&path).unwrap();
        store.save().await.unwrap();
        let reloaded = StatusStore::load(&path).unwrap();
        assert_eq!(reloaded.snapshot().await, StatusRecord::default());
        let _ = fs::remove_file(&path);
    }

    #[tokio::test]
    async fn dirty_tracking_follows_real_changes() {
        let path = tmp("jb-status-dirty");
        let store = StatusStore::load(&path).unwrap();
        assert!(!store.is_dirty().await);

        assert!(store.add_user(UserId(1)).await);
        assert!(store.is_dirty().await);
        assert!(store.save_if_dirty().await.unwrap());
        assert!(!store.is_dirty().await);

        // Re-adding a known user or writing an identical value changes nothing.
        assert!(!store.add_user(UserId(1)).await);
        store.set("k", json!(1)).await;
        store.save().await.unwrap();
        store.set("k", json!(1)).await;
        assert!(!store.is_dirty().await);
        assert!(!store.save_if_dirty().await.unwrap());

        let _ = fs::remove_file(&path);
    }

    #[tokio::test]
    async fn failed_save_keeps_state_for_retry() {
        let dir = tmp("jb-status-blocked");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("status.json");
        let store = StatusStore::load(&path).unwrap();

        // Replace the parent directory with a file so the write fails.
        fs::remove_dir_all(&dir).unwrap();
        fs::write(&dir, "not a dir").unwrap();

        store.add_user(UserId(11)).await;
        let err = store.save().await.unwrap_err();
        assert!(matches!(err, Error::StatusPersist { .. }));
        assert!(!err.is_fatal());
        assert!(store.is_dirty().await);
        assert!(store.has_user(UserId(11)).await);

        fs::remove_file(&dir).unwrap();
        assert!(store.save_if_dirty().await.unwrap());
        let reloaded = StatusStore::load(&path).unwrap();
        assert!(reloaded.has_user(UserId(11)).await);

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn scoped_memory_prefixes_keys() {
        let path = tmp("jb-status-scoped");
        let store = Arc::new(StatusStore::load(&path).unwrap());
        let scoped = store.scoped("remind");

        scoped.set_as("pending", &vec![1, 2, 3]).await.unwrap();
        assert_eq!(store.get("remind.pending").await, Some(json!([1, 2, 3])));
        assert_eq!(
            scoped.get_as::<Vec<i32>>("pending").await.unwrap(),
            Some(vec![1, 2, 3])
        );
        assert!(scoped.remove("pending").await.is_some());
        assert_eq!(store.get("remind.pending").await, None);

        let _ = fs::remove_file(&path);
    }
}
