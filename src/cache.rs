//! On-disk store of manga snapshots, keyed by the hash of their url

use crate::error::{Error, Result};
use crate::fs_utils::write_atomic;
use crate::hash::{self, SHORT_HASH_LEN};
use crate::models::Manga;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const INDEX_FILENAME: &str = "index.json";

/// Listing record kept in the index for every cached manga
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub hash: String,
    pub title: String,
    pub url: String,
}

impl CacheEntry {
    pub fn short_hash(&self) -> &str {
        hash::short_hash(&self.hash)
    }
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct Index {
    /// Normalized urls, pointing to full hashes
    #[serde(default)]
    alias: BTreeMap<String, String>,
    #[serde(default)]
    entries: BTreeMap<String, CacheEntry>,
}

impl Index {
    fn forget(&mut self, full: &str) -> Option<CacheEntry> {
        self.alias.retain(|_, target| target != full);
        self.entries.remove(full)
    }
}

/// A directory holding `index.json` and one `<hash>.json` snapshot per manga
#[derive(Debug)]
pub struct Cache {
    root: PathBuf,
    index: Mutex<Index>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Cache {
    /// Opens the cache at `root`, creating the directory if needed
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;

        let mut index: Index = match std::fs::read_to_string(root.join(INDEX_FILENAME)) {
            Ok(data) => serde_json::from_str(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Index::default(),
            Err(e) => return Err(e.into()),
        };

        // hash prefixes are never aliased, they always go through resolution
        index.alias.retain(|key, _| !hash::looks_like_hash(key));

        tracing::debug!("opened cache at {}", root.display());

        Ok(Self {
            root,
            index: Mutex::new(index),
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, full: &str) -> PathBuf {
        self.root.join(format!("{full}.json"))
    }

    fn lock_for(&self, full: &str) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.lock().entry(full.to_owned()).or_default())
    }

    fn write_index(&self, index: &Index) -> Result<()> {
        let data = serde_json::to_vec_pretty(index)?;
        write_atomic(&self.root.join(INDEX_FILENAME), &data)
    }

    /// Stores `manga`, replacing any previous snapshot with the same hash.
    /// Returns the full hash
    #[tracing::instrument(skip_all, fields(url = %manga.meta.url))]
    pub fn dump(&self, manga: &Manga) -> Result<String> {
        let full = manga.meta.hash();
        let lock = self.lock_for(&full);
        let _guard = lock.lock();

        write_atomic(&self.entry_path(&full), manga.to_json()?.as_bytes())?;

        let mut index = self.index.lock();
        index.entries.insert(
            full.clone(),
            CacheEntry {
                hash: full.clone(),
                title: manga.meta.title.clone(),
                url: manga.meta.url.clone(),
            },
        );
        index
            .alias
            .insert(hash::normalize(&manga.meta.url), full.clone());

        self.write_index(&index)?;
        tracing::info!("cached {}", hash::short_hash(&full));

        Ok(full)
    }

    /// Loads the snapshot identified by a full hash, a unique prefix of one, or a url
    pub fn load(&self, hash_or_prefix: &str) -> Result<Manga> {
        let full = self.fullhash(hash_or_prefix)?;

        match std::fs::read_to_string(self.entry_path(&full)) {
            Ok(data) => Manga::from_json(&data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::NotFound(format!(
                "snapshot of {} is missing",
                hash::short_hash(&full)
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Removes a snapshot along with its index rows
    #[tracing::instrument(skip(self))]
    pub fn delete(&self, hash_or_prefix: &str) -> Result<()> {
        let full = self.fullhash(hash_or_prefix)?;
        let lock = self.lock_for(&full);
        let _guard = lock.lock();

        let removed_file = match std::fs::remove_file(self.entry_path(&full)) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };

        let mut index = self.index.lock();
        let removed_entry = index.forget(&full).is_some();

        if !removed_file && !removed_entry {
            return Err(Error::NotFound(format!("no manga with hash '{full}'")));
        }

        self.write_index(&index)?;
        drop(index);

        self.locks.lock().remove(&full);
        tracing::info!("removed {}", hash::short_hash(&full));

        Ok(())
    }

    /// Resolves user input to a full hash. Hex input must be an unambiguous prefix of a
    /// known hash, anything else is looked up as a url
    pub fn fullhash(&self, hash_or_prefix: &str) -> Result<String> {
        let input = hash_or_prefix.trim();

        if input.chars().count() < SHORT_HASH_LEN {
            return Err(Error::InvalidArgument(format!(
                "'{input}' is too short, at least {SHORT_HASH_LEN} characters are required"
            )));
        }

        let index = self.index.lock();

        if hash::looks_like_hash(input) {
            return hash::resolve(input, index.entries.keys());
        }

        index
            .alias
            .get(&hash::normalize(input))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("no manga with url '{input}'")))
    }

    /// Full hash of a cached manga with this url
    pub fn lookup_url(&self, url: &str) -> Option<String> {
        self.index.lock().alias.get(&hash::normalize(url)).cloned()
    }

    pub fn contains(&self, full: &str) -> bool {
        self.index.lock().entries.contains_key(full)
    }

    /// Every cached manga, sorted by title
    pub fn list(&self) -> Vec<CacheEntry> {
        let mut entries: Vec<CacheEntry> = self.index.lock().entries.values().cloned().collect();
        entries.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.hash.cmp(&b.hash)));

        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chapter, Metadata};

    fn manga(url: &str, title: &str) -> Manga {
        let mut meta = Metadata::new(url);
        meta.title = title.to_owned();

        let mut manga = Manga::new(meta);
        manga.add(Chapter::new("1", format!("{url}/1")));
        manga
    }

    #[test]
    fn test_short_input_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::open(dir.path()).unwrap();

        assert!(matches!(
            cache.fullhash("abc"),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_index_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let full = {
            let cache = Cache::open(dir.path()).unwrap();
            cache.dump(&manga("https://example.com/a", "A")).unwrap()
        };

        let cache = Cache::open(dir.path()).unwrap();
        assert_eq!(cache.fullhash(&full[..8]).unwrap(), full);
        assert_eq!(cache.lookup_url("https://example.com/a"), Some(full.clone()));
        assert!(cache.contains(&full));
    }

    #[test]
    fn test_short_hash_aliases_are_dropped_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let full = hash::digest("https://example.com/a");

        let short = hash::short_hash(&full);
        let stale = "f".repeat(128);

        // an index written when short hashes were aliased, one of them pointing elsewhere
        let index = format!(
            r#"{{
                "alias": {{"{short}": "{stale}", "https://example.com/a": "{full}"}},
                "entries": {{"{full}": {{"hash": "{full}", "title": "A", "url": "https://example.com/a"}}}}
            }}"#
        );
        std::fs::write(dir.path().join(INDEX_FILENAME), index).unwrap();

        let cache = Cache::open(dir.path()).unwrap();
        assert_eq!(cache.fullhash(hash::short_hash(&full)).unwrap(), full);
        assert_eq!(cache.fullhash("https://example.com/a").unwrap(), full);
    }

    #[test]
    fn test_no_temp_files_left() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::open(dir.path()).unwrap();

        cache.dump(&manga("https://example.com/a", "A")).unwrap();
        cache.dump(&manga("https://example.com/a", "A")).unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names.len(), 2);
        assert!(names.iter().all(|name| name.ends_with(".json")));
    }
}
