//! Persisted memory of which cards were already announced, one record per
//! (set code, destination) pair.
//!
//! A record is a JSON array of card identifiers. A missing record is an
//! empty set; a record that exists but cannot be read or parsed is an error,
//! so corruption never turns into re-announcing a whole set.

use std::collections::HashSet;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, info, warn};

use crate::error::{Result, SpoilerError};
use crate::models::SetCode;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreKey {
    pub set: SetCode,
    pub destination: String,
}

impl StoreKey {
    pub fn new(set: SetCode, destination: impl Into<String>) -> Self {
        Self {
            set,
            destination: destination.into(),
        }
    }

    /// Record file name. Both parts are escaped so the `_` separator cannot
    /// appear inside either, which keeps distinct keys on distinct files.
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}.json",
            escape(self.set.as_str()),
            escape(&self.destination)
        )
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.set, self.destination)
    }
}

fn escape(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    for byte in part.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

/// Ordered set of seen identifiers. Order is kept only so records stay
/// stable on disk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeenSet {
    order: Vec<String>,
    index: HashSet<String>,
}

impl SeenSet {
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    /// Returns false if the identifier was already present.
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        if self.index.contains(&id) {
            return false;
        }
        self.index.insert(id.clone());
        self.order.push(id);
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for SeenSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = SeenSet::default();
        for id in iter {
            set.insert(id);
        }
        set
    }
}

impl Serialize for SeenSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.order.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SeenSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let ids = Vec::<String>::deserialize(deserializer)?;
        Ok(ids.into_iter().collect())
    }
}

#[async_trait]
pub trait DedupStore: Send + Sync {
    async fn load(&self, key: &StoreKey) -> Result<SeenSet>;

    /// Replaces the whole record. A later `load` sees either the old or the
    /// new content, never a partial write.
    async fn save(&self, key: &StoreKey, seen: &SeenSet) -> Result<()>;
}

/// One JSON file per key inside a data directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: &StoreKey) -> PathBuf {
        self.dir.join(key.file_name())
    }
}

#[async_trait]
impl DedupStore for FileStore {
    async fn load(&self, key: &StoreKey) -> Result<SeenSet> {
        let path = self.path_for(key);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(record = %path.display(), "no seen-card record yet, creating an empty one");
                let empty = SeenSet::default();
                if let Err(e) = self.save(key, &empty).await {
                    warn!("could not create empty record for {key}: {e}");
                }
                return Ok(empty);
            }
            Err(source) => return Err(SpoilerError::StoreRead { path, source }),
        };

        let seen: SeenSet =
            serde_json::from_slice(&raw).map_err(|source| SpoilerError::StoreParse {
                path: path.clone(),
                source,
            })?;
        info!(record = %path.display(), count = seen.len(), "read seen-card record");
        Ok(seen)
    }

    async fn save(&self, key: &StoreKey, seen: &SeenSet) -> Result<()> {
        let path = self.path_for(key);
        let body = serde_json::to_vec(seen).map_err(|e| SpoilerError::StoreWrite {
            path: path.clone(),
            source: std::io::Error::other(e),
        })?;
        let dir = self.dir.clone();
        let target = path.clone();

        tokio::task::spawn_blocking(move || write_atomically(&dir, &target, &body))
            .await
            .map_err(|e| SpoilerError::StoreWrite {
                path: path.clone(),
                source: std::io::Error::other(e),
            })?
            .map_err(|source| SpoilerError::StoreWrite {
                path: path.clone(),
                source,
            })?;

        info!(record = %path.display(), count = seen.len(), "saved seen-card record");
        Ok(())
    }
}

/// Writes to a temp file in the same directory, syncs it, then renames it
/// over the target.
fn write_atomically(dir: &Path, target: &Path, body: &[u8]) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(body)?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}
