use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AppResult;

/// Fixed name of the durable progress snapshot
pub const SNAPSHOT_KEY: &str = "trackmyseries_episodes";

/// Serialized form of the progress cache
///
/// ```json
/// {"seen": {"42": [1001, 1002]}, "totals": {"42": 62}}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub seen: BTreeMap<u64, Vec<u64>>,
    pub totals: BTreeMap<u64, u32>,
}

/// Accepted on-disk shapes; older builds stored the bare seen map
///
/// Keys stay strings here: buffered untagged content cannot turn a JSON
/// object key into an integer.
#[derive(Deserialize)]
#[serde(untagged)]
enum SnapshotShape {
    Current {
        seen: BTreeMap<String, Vec<u64>>,
        #[serde(default)]
        totals: BTreeMap<String, u32>,
    },
    Legacy(BTreeMap<String, Vec<u64>>),
}

fn parse_keys<V, E: serde::de::Error>(map: BTreeMap<String, V>) -> Result<BTreeMap<u64, V>, E> {
    map.into_iter()
        .map(|(key, value)| {
            key.parse::<u64>()
                .map(|id| (id, value))
                .map_err(|_| E::custom(format!("invalid series id {:?}", key)))
        })
        .collect()
}

impl<'de> Deserialize<'de> for Snapshot {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match SnapshotShape::deserialize(deserializer)? {
            SnapshotShape::Current { seen, totals } => Snapshot {
                seen: parse_keys(seen)?,
                totals: parse_keys(totals)?,
            },
            SnapshotShape::Legacy(seen) => Snapshot {
                seen: parse_keys(seen)?,
                totals: BTreeMap::new(),
            },
        })
    }
}

/// JSON snapshot stored at `<dir>/trackmyseries_episodes.json`
///
/// Saves go through a temporary file and a rename so a crash never leaves a
/// half-written snapshot behind. Callers serialize saves.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(format!("{}.json", SNAPSHOT_KEY)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the snapshot; `None` when none was saved yet
    pub async fn load(&self) -> AppResult<Option<Snapshot>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    pub async fn save(&self, snapshot: &Snapshot) -> AppResult<()> {
        let bytes = serde_json::to_vec(snapshot)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    pub async fn remove(&self) -> AppResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
