//! Mirrored snapshot persistence.
//!
//! Every save writes the same snapshot twice: a pretty-printed JSON file
//! (human readable, diffable) and a compact bincode file. Each file is
//! written to a temporary sibling and renamed into place, so a crash never
//! leaves a half-written snapshot.
//!
//! Loading prefers the JSON file. If both files decode, keys that only the
//! binary snapshot carries are merged into the JSON one. If the JSON file
//! is missing or unreadable, the binary file is used alone. If neither
//! loads, the caller starts fresh.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use elchymin_core::PersistenceConfig;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("snapshot I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode snapshot: {0}")]
    Encode(String),
    #[error("failed to decode snapshot: {0}")]
    Decode(String),
}

impl PersistenceError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    text_path: PathBuf,
    binary_path: PathBuf,
}

impl SnapshotStore {
    pub fn new(config: &PersistenceConfig) -> Self {
        Self {
            text_path: config.text_path(),
            binary_path: config.binary_path(),
        }
    }

    pub fn text_path(&self) -> &Path {
        &self.text_path
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// Write both representations. Encoding happens before any file is
    /// touched, so an encode failure leaves the previous snapshot intact.
    pub async fn save<T: Serialize>(&self, snapshot: &T) -> Result<(), PersistenceError> {
        let text = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| PersistenceError::Encode(e.to_string()))?;
        let binary =
            bincode::serialize(snapshot).map_err(|e| PersistenceError::Encode(e.to_string()))?;

        write_atomic(&self.text_path, &text).await?;
        write_atomic(&self.binary_path, &binary).await?;
        tracing::debug!(
            "Snapshot saved ({} bytes json, {} bytes bin)",
            text.len(),
            binary.len()
        );
        Ok(())
    }

    /// Load the best available snapshot. Never errors: failures are logged
    /// and `None` means "start fresh".
    pub async fn load<T: Serialize + DeserializeOwned>(&self) -> Option<T> {
        let text = match self.read_text().await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Text snapshot unusable: {}", e);
                None
            }
        };
        let binary: Option<T> = match self.read_binary().await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Binary snapshot unusable: {}", e);
                None
            }
        };

        match (text, binary) {
            (Some(Value::Object(primary)), Some(binary)) => {
                let secondary = match serde_json::to_value(&binary) {
                    Ok(Value::Object(map)) => map,
                    _ => Map::new(),
                };
                let merged = merge_missing(primary, secondary);
                match serde_json::from_value::<T>(Value::Object(merged)) {
                    Ok(snapshot) => Some(snapshot),
                    Err(e) => {
                        tracing::warn!("Text snapshot does not decode ({}), using binary", e);
                        Some(binary)
                    }
                }
            }
            (Some(value), None) => match serde_json::from_value::<T>(value) {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    tracing::warn!("Text snapshot does not decode ({}), starting fresh", e);
                    None
                }
            },
            (Some(_), Some(binary)) | (None, Some(binary)) => Some(binary),
            (None, None) => None,
        }
    }

    async fn read_text(&self) -> Result<Option<Value>, PersistenceError> {
        let bytes = match read_optional(&self.text_path).await? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| PersistenceError::Decode(e.to_string()))
    }

    async fn read_binary<T: DeserializeOwned>(&self) -> Result<Option<T>, PersistenceError> {
        let bytes = match read_optional(&self.binary_path).await? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        bincode::deserialize(&bytes)
            .map(Some)
            .map_err(|e| PersistenceError::Decode(e.to_string()))
    }
}

/// Top-level merge: every key of `primary` wins, keys only present in
/// `secondary` are added.
pub fn merge_missing(mut primary: Map<String, Value>, secondary: Map<String, Value>) -> Map<String, Value> {
    for (key, value) in secondary {
        primary.entry(key).or_insert(value);
    }
    primary
}

/// Keep only the last `window` items.
pub fn keep_last<T>(items: &mut VecDeque<T>, window: usize) {
    if items.len() > window {
        items.drain(..items.len() - window);
    }
}

/// Append, then drop the oldest items beyond `bound`.
pub fn push_bounded<T>(items: &mut VecDeque<T>, item: T, bound: usize) {
    items.push_back(item);
    keep_last(items, bound);
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, PersistenceError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(PersistenceError::io(path, e)),
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| PersistenceError::io(parent, e))?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| PersistenceError::io(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| PersistenceError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
        notes: Vec<String>,
    }

    fn store_in(dir: &Path) -> SnapshotStore {
        SnapshotStore::new(&PersistenceConfig {
            state_dir: dir.join("soul"),
            ..Default::default()
        })
    }

    fn sample() -> Sample {
        Sample {
            name: "elchymin".into(),
            count: 3,
            notes: vec!["a".into(), "b".into()],
        }
    }

    #[test]
    fn test_merge_missing_prefers_primary() {
        let primary = json!({"a": 1, "b": 2});
        let secondary = json!({"b": 20, "c": 30});
        let merged = merge_missing(
            primary.as_object().unwrap().clone(),
            secondary.as_object().unwrap().clone(),
        );
        assert_eq!(Value::Object(merged), json!({"a": 1, "b": 2, "c": 30}));
    }

    #[test]
    fn test_keep_last() {
        let mut items: VecDeque<u32> = (0..30).collect();
        keep_last(&mut items, 20);
        assert_eq!(items.len(), 20);
        assert_eq!(items[0], 10);
        keep_last(&mut items, 50);
        assert_eq!(items.len(), 20);
    }

    #[test]
    fn test_push_bounded() {
        let mut items = VecDeque::new();
        for i in 0..100u32 {
            push_bounded(&mut items, i, 25);
        }
        assert_eq!(items.len(), 25);
        assert_eq!(items.front(), Some(&75));
        assert_eq!(items.back(), Some(&99));
    }

    #[tokio::test]
    async fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.save(&sample()).await.unwrap();
        assert!(store.text_path().exists());
        assert!(store.binary_path().exists());
        let loaded: Sample = store.load().await.unwrap();
        assert_eq!(loaded, sample());
    }

    #[tokio::test]
    async fn test_missing_files_start_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let loaded: Option<Sample> = store.load().await;
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_text_falls_back_to_binary() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.save(&sample()).await.unwrap();
        tokio::fs::write(store.text_path(), b"{ not json").await.unwrap();
        let loaded: Sample = store.load().await.unwrap();
        assert_eq!(loaded, sample());
    }

    #[tokio::test]
    async fn test_binary_fills_keys_missing_from_text() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.save(&sample()).await.unwrap();
        // hand-edited text snapshot: changed count, dropped notes
        tokio::fs::write(store.text_path(), br#"{"name": "edited", "count": 9}"#)
            .await
            .unwrap();
        let loaded: Sample = store.load().await.unwrap();
        assert_eq!(loaded.name, "edited");
        assert_eq!(loaded.count, 9);
        assert_eq!(loaded.notes, sample().notes);
    }

    #[tokio::test]
    async fn test_text_only_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.save(&sample()).await.unwrap();
        tokio::fs::remove_file(store.binary_path()).await.unwrap();
        let loaded: Sample = store.load().await.unwrap();
        assert_eq!(loaded, sample());
    }

    #[tokio::test]
    async fn test_both_corrupt_start_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.save(&sample()).await.unwrap();
        tokio::fs::write(store.text_path(), b"garbage").await.unwrap();
        tokio::fs::write(store.binary_path(), b"\x01").await.unwrap();
        let loaded: Option<Sample> = store.load().await;
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.save(&sample()).await.unwrap();
        store.save(&sample()).await.unwrap();
        let mut entries = tokio::fs::read_dir(dir.path().join("soul")).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        names.sort();
        assert_eq!(names, vec!["elchymin_soul.bin", "elchymin_soul.json"]);
    }
}
