//! Serialization of slim tables to disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use thiserror::Error;
use tracing::{debug, warn};

use crate::constants::META_TIMESTAMP_KEY;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One output file: an optional `_meta_timestamp` entry followed by the
/// records in ascending PV id order.
struct SlimFile<'a, T> {
    timestamp: Option<&'a str>,
    records: &'a BTreeMap<i64, T>,
}

impl<T: Serialize> Serialize for SlimFile<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = self.records.len() + usize::from(self.timestamp.is_some());
        let mut map = serializer.serialize_map(Some(len))?;
        if let Some(timestamp) = self.timestamp {
            map.serialize_entry(META_TIMESTAMP_KEY, timestamp)?;
        }
        for (pv_id, record) in self.records {
            map.serialize_entry(pv_id, record)?;
        }
        map.end()
    }
}

/// Current time as Unix seconds, in the string form written to
/// `_meta_timestamp`.
#[must_use]
pub fn unix_timestamp() -> String {
    chrono::Utc::now().timestamp().to_string()
}

/// Render a table as pretty-printed JSON (two-space indent, non-ASCII left
/// unescaped).
///
/// # Errors
///
/// Returns an error if a record fails to serialize.
pub fn render<T: Serialize>(
    records: &BTreeMap<i64, T>,
    timestamp: Option<&str>,
) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec_pretty(&SlimFile { timestamp, records })
}

/// A rendered table sitting in a temporary file next to its target.
///
/// Nothing is visible at the target path until [`StagedFile::commit`].
#[derive(Debug)]
#[must_use = "a staged file must be committed or discarded"]
pub struct StagedFile {
    tmp_path: PathBuf,
    path: PathBuf,
    bytes: usize,
}

impl StagedFile {
    /// Rename the temporary file over the target.
    ///
    /// # Errors
    ///
    /// Returns an error if the rename fails; the temporary file is removed.
    pub async fn commit(self) -> Result<PathBuf, WriteError> {
        if let Err(source) = tokio::fs::rename(&self.tmp_path, &self.path).await {
            remove_tmp(&self.tmp_path).await;
            return Err(WriteError::Io {
                path: self.path,
                source,
            });
        }

        debug!(path = %self.path.display(), bytes = self.bytes, "Wrote slim table");
        Ok(self.path)
    }

    /// Remove the temporary file without touching the target.
    pub async fn discard(self) {
        remove_tmp(&self.tmp_path).await;
    }
}

async fn remove_tmp(tmp_path: &Path) {
    if let Err(e) = tokio::fs::remove_file(tmp_path).await {
        warn!(path = %tmp_path.display(), "Failed to clean up temporary file: {e}");
    }
}

/// Render a table into a temporary sibling of `dir/file_name`, creating
/// `dir` if needed.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the temporary
/// file cannot be written.
pub async fn stage_slim_file<T: Serialize>(
    dir: &Path,
    file_name: &str,
    records: &BTreeMap<i64, T>,
    timestamp: Option<&str>,
) -> Result<StagedFile, WriteError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| WriteError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;

    let path = dir.join(file_name);
    let bytes = render(records, timestamp).map_err(|source| WriteError::Serialize {
        path: path.clone(),
        source,
    })?;

    let tmp_path = dir.join(format!(".{file_name}.tmp"));
    tokio::fs::write(&tmp_path, &bytes)
        .await
        .map_err(|source| WriteError::Io {
            path: tmp_path.clone(),
            source,
        })?;

    Ok(StagedFile {
        tmp_path,
        path,
        bytes: bytes.len(),
    })
}

/// Write a table to `dir/file_name`, creating `dir` if needed.
///
/// The content is written to a temporary sibling first and renamed over the
/// target, so readers never observe a partial file.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the file cannot
/// be written.
pub async fn write_slim_file<T: Serialize>(
    dir: &Path,
    file_name: &str,
    records: &BTreeMap<i64, T>,
    timestamp: Option<&str>,
) -> Result<PathBuf, WriteError> {
    stage_slim_file(dir, file_name, records, timestamp)
        .await?
        .commit()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slim::{SlimReservedRecord, SlimUsedRecord};
    use tempfile::TempDir;

    fn reserved(entries: &[(i64, &str)]) -> BTreeMap<i64, SlimReservedRecord> {
        entries
            .iter()
            .map(|(id, name)| {
                (
                    *id,
                    SlimReservedRecord {
                        username: (*name).to_string(),
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_render_pretty_with_timestamp() {
        let records = reserved(&[(42, "Alice")]);
        let rendered = String::from_utf8(render(&records, Some("1700000000")).unwrap()).unwrap();
        assert_eq!(
            rendered,
            concat!(
                "{\n",
                "  \"_meta_timestamp\": \"1700000000\",\n",
                "  \"42\": {\n",
                "    \"username\": \"Alice\"\n",
                "  }\n",
                "}"
            )
        );
    }

    #[test]
    fn test_render_orders_ids_numerically() {
        let records = reserved(&[(100, "c"), (9, "b"), (1, "a")]);
        let rendered = String::from_utf8(render(&records, None).unwrap()).unwrap();
        let one = rendered.find("\"1\"").unwrap();
        let nine = rendered.find("\"9\"").unwrap();
        let hundred = rendered.find("\"100\"").unwrap();
        assert!(one < nine && nine < hundred);
        assert!(!rendered.contains(META_TIMESTAMP_KEY));
    }

    #[test]
    fn test_render_keeps_non_ascii() {
        let mut records = BTreeMap::new();
        records.insert(
            7,
            SlimUsedRecord {
                title: "初音ミク".to_string(),
                title_en: "Miku".to_string(),
                username: "Ñandú".to_string(),
            },
        );
        let rendered = String::from_utf8(render(&records, None).unwrap()).unwrap();
        assert!(rendered.contains("初音ミク"));
        assert!(rendered.contains("Ñandú"));
        assert!(!rendered.contains("\\u"));
    }

    #[test]
    fn test_render_empty_table() {
        let records: BTreeMap<i64, SlimReservedRecord> = BTreeMap::new();
        assert_eq!(render(&records, None).unwrap(), b"{}");
    }

    #[tokio::test]
    async fn test_write_creates_dir_and_replaces_file() {
        let temp_dir = TempDir::new().unwrap();
        let out_dir = temp_dir.path().join("nested").join("pv_ids");

        let records = reserved(&[(1, "a")]);
        let path = write_slim_file(&out_dir, "reserved_slim.json", &records, None)
            .await
            .unwrap();
        assert_eq!(path, out_dir.join("reserved_slim.json"));

        write_slim_file(&out_dir, "reserved_slim.json", &reserved(&[(2, "b")]), Some("5"))
            .await
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["_meta_timestamp"], "5");
        assert_eq!(value["2"]["username"], "b");
        assert!(value.get("1").is_none());
        assert!(!out_dir.join(".reserved_slim.json.tmp").exists());
    }
    #[tokio::test]
    async fn test_staged_file_is_invisible_until_commit() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("used_slim.json");
        std::fs::write(&target, "old").unwrap();

        let records = reserved(&[(3, "c")]);
        let staged = stage_slim_file(temp_dir.path(), "used_slim.json", &records, None)
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "old");

        staged.discard().await;
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "old");
        assert!(!temp_dir.path().join(".used_slim.json.tmp").exists());
    }
}
