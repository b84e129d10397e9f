//! On-disk mirror of downloaded assets.
//!
//! Layout: `<root>/<owner>/<name>/` holds the extracted archive of one
//! model, `<root>/registry.toml` records which server each entry came from,
//! and `<root>/.fuel-tmp/` holds staging directories. An entry only ever
//! appears through a `rename` of a fully extracted staging directory, so
//! readers never see a half-written model. Replacing an entry takes two
//! renames; readers hold the shared side of `swap` so they never observe
//! the gap between them.

use anyhow::{Context, Result};
use fuel_tools_core::{FuelError, FuelResult, Identifier};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Write};
use std::iter::Peekable;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tempfile::TempDir;
use walkdir::WalkDir;

const INDEX_FILE: &str = "registry.toml";
const TMP_DIR: &str = ".fuel-tmp";
const INDEX_BACKUP: &str = "registry.toml.bak";

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexFile {
    #[serde(default)]
    models: Vec<IndexEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    owner: String,
    name: String,
    server: String,
}

/// Lazy sequence of identifiers. Recreate it to start over.
///
/// An empty sequence is a valid answer, not a failure; use
/// [`AssetIter::is_empty`] to tell whether anything matched.
pub struct AssetIter {
    inner: Peekable<Box<dyn Iterator<Item = Identifier> + Send>>,
}

impl AssetIter {
    pub fn new<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = Identifier>,
        I::IntoIter: Send + 'static,
    {
        let boxed: Box<dyn Iterator<Item = Identifier> + Send> = Box::new(iter.into_iter());
        Self {
            inner: boxed.peekable(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Looks ahead one item without consuming it.
    pub fn is_empty(&mut self) -> bool {
        self.inner.peek().is_none()
    }
}

impl Iterator for AssetIter {
    type Item = Identifier;

    fn next(&mut self) -> Option<Identifier> {
        self.inner.next()
    }
}

impl std::fmt::Debug for AssetIter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetIter").finish_non_exhaustive()
    }
}

pub struct LocalCache {
    root: PathBuf,
    /// One writer per `owner/name`; entries live while a save holds them.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    index_lock: Mutex<()>,
    swap: Arc<RwLock<()>>,
}

impl LocalCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
            index_lock: Mutex::new(()),
            swap: Arc::new(RwLock::new(())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Cached models whose non-empty fields match `partial`.
    pub fn matching_models(&self, partial: &Identifier) -> AssetIter {
        let servers = match self.read_index() {
            Ok(index) => index,
            Err(e) => {
                log::warn!("Ignoring unreadable cache index: {:#}", e);
                HashMap::new()
            }
        };
        let partial = partial.clone();
        let swap = self.swap.clone();

        let entries = subdirectories(&self.root)
            .flat_map(move |owner| {
                // One owner's entries are read in one go, never mid-swap.
                let _guard = swap.read().unwrap_or_else(PoisonError::into_inner);
                subdirectories(owner.path()).collect::<Vec<_>>()
            })
            .filter_map(move |entry| {
                let name = entry.file_name().to_str()?.to_string();
                let owner = entry.path().parent()?.file_name()?.to_str()?.to_string();
                let server = servers
                    .get(&format!("{}/{}", owner, name))
                    .cloned()
                    .unwrap_or_default();
                let id = Identifier {
                    server,
                    owner,
                    name,
                    ..Default::default()
                };
                id.matches(&partial).then_some(id)
            });

        AssetIter::new(entries)
    }

    /// Every cached model.
    pub fn all_models(&self) -> AssetIter {
        self.matching_models(&Identifier::default())
    }

    /// Path of the cached model, without touching the network.
    pub fn cached_model(&self, id: &Identifier) -> Option<PathBuf> {
        if !id.is_complete() {
            return None;
        }
        let _guard = self.swap.read().unwrap_or_else(PoisonError::into_inner);
        self.lookup(id)
    }

    fn lookup(&self, id: &Identifier) -> Option<PathBuf> {
        let path = self.root.join(id.canonical_path());
        path.is_dir().then_some(path)
    }

    /// Path of one file inside a cached model. `file_path` is relative to
    /// the model root and may not climb out of it.
    pub fn cached_model_file(&self, id: &Identifier, file_path: &str) -> Option<PathBuf> {
        let relative = Path::new(file_path);
        if file_path.is_empty()
            || !relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
        {
            return None;
        }
        if !id.is_complete() {
            return None;
        }
        let _guard = self.swap.read().unwrap_or_else(PoisonError::into_inner);
        let path = self.lookup(id)?.join(relative);
        path.is_file().then_some(path)
    }

    /// Extract `data` (a zip archive) as the cache entry for `id`.
    ///
    /// Fails if the entry exists and `overwrite` is false, or if the
    /// archive cannot be extracted. On failure nothing new is visible.
    pub fn save_model(&self, id: &Identifier, data: &[u8], overwrite: bool) -> FuelResult<PathBuf> {
        let unique_name = id.unique_name();
        if !id.is_complete() {
            return Err(FuelError::save(unique_name, "incomplete identifier"));
        }

        let lock = self.lock_for(&unique_name);
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.save_locked(id, data, overwrite)
        };
        self.release_lock(&unique_name, lock);
        result
    }

    fn save_locked(&self, id: &Identifier, data: &[u8], overwrite: bool) -> FuelResult<PathBuf> {
        let unique_name = id.unique_name();
        let dest = self.root.join(id.canonical_path());
        if dest.exists() && !overwrite {
            return Err(FuelError::save(unique_name, "already cached"));
        }

        self.materialize(data, &dest)
            .map_err(|e| FuelError::save(&unique_name, format!("{:#}", e)))?;

        if let Err(e) = self.record_server(id) {
            log::warn!("Failed to index {}: {:#}", unique_name, e);
        }

        log::info!("Cached {} at {}", unique_name, dest.display());
        Ok(dest)
    }

    fn materialize(&self, data: &[u8], dest: &Path) -> Result<()> {
        let tmp_root = self.root.join(TMP_DIR);
        fs::create_dir_all(&tmp_root)
            .with_context(|| format!("Failed to create {}", tmp_root.display()))?;

        let staging = tempfile::Builder::new()
            .prefix("stage-")
            .tempdir_in(&tmp_root)
            .context("Failed to create staging directory")?;
        extract_archive(data, staging.path())?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        if !dest.exists() {
            return fs::rename(staging.path(), dest)
                .context("Failed to move new entry into place");
        }

        let trash = tempfile::Builder::new()
            .prefix("trash-")
            .tempdir_in(&tmp_root)
            .context("Failed to create trash directory")?;
        let old = trash.path().join("old");

        let _guard = self.swap.write().unwrap_or_else(PoisonError::into_inner);
        fs::rename(dest, &old).context("Failed to move previous entry aside")?;
        match fs::rename(staging.path(), dest) {
            Ok(()) => Ok(()),
            Err(e) => Err(restore_previous(trash, &old, dest, e)),
        }
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(key.to_string()).or_default().clone()
    }

    fn release_lock(&self, key: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        if locks.get(key).map_or(false, |lock| Arc::strong_count(lock) == 1) {
            locks.remove(key);
        }
    }

    fn read_index(&self) -> Result<HashMap<String, String>> {
        let path = self.root.join(INDEX_FILE);
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let content = fs::read_to_string(&path)?;
        let parsed: IndexFile = toml::from_str(&content)?;
        Ok(parsed
            .models
            .into_iter()
            .map(|entry| (format!("{}/{}", entry.owner, entry.name), entry.server))
            .collect())
    }

    fn record_server(&self, id: &Identifier) -> Result<()> {
        let _guard = self.index_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let path = self.root.join(INDEX_FILE);
        let mut entries = Vec::new();
        if path.exists() {
            let content = fs::read_to_string(&path)?;
            match toml::from_str::<IndexFile>(&content) {
                Ok(parsed) => entries = parsed.models,
                Err(e) => {
                    let backup = self.root.join(INDEX_BACKUP);
                    fs::write(&backup, &content)
                        .with_context(|| format!("Failed to back up {}", path.display()))?;
                    log::warn!(
                        "Unreadable cache index {} moved to {}, starting a new one: {}",
                        path.display(),
                        backup.display(),
                        e
                    );
                }
            }
        }

        let entry = IndexEntry {
            owner: id.owner.clone(),
            name: id.name.clone(),
            server: id.server.clone(),
        };
        if let Some(pos) = entries
            .iter()
            .position(|e| e.owner == entry.owner && e.name == entry.name)
        {
            entries[pos] = entry;
        } else {
            entries.push(entry);
        }

        let content = toml::to_string(&IndexFile { models: entries })?;
        let mut file = tempfile::NamedTempFile::new_in(&self.root)?;
        file.write_all(content.as_bytes())?;
        file.persist(&path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

/// Visible subdirectories directly below `dir`, in name order.
fn subdirectories(dir: &Path) -> impl Iterator<Item = walkdir::DirEntry> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_hidden(entry))
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir())
}

/// Put the previous entry back after a failed replacement. If even that
/// fails the old copy is kept where it is and its location is reported.
fn restore_previous(
    trash: TempDir,
    old: &Path,
    dest: &Path,
    cause: std::io::Error,
) -> anyhow::Error {
    match fs::rename(old, dest) {
        Ok(()) => anyhow::Error::new(cause).context("Failed to move new entry into place"),
        Err(restore) => {
            let kept = trash.keep().join("old");
            log::error!(
                "Could not restore {}, previous entry kept at {}: {}",
                dest.display(),
                kept.display(),
                restore
            );
            anyhow::anyhow!(
                "Failed to move new entry into place ({}); restoring the previous entry \
                 also failed ({}), it was kept at {}",
                cause,
                restore,
                kept.display()
            )
        }
    }
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    // The root itself may well be a dot-directory.
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
}

/// Unpack a zip archive into `dest`, which must already exist.
pub fn extract_archive(data: &[u8], dest: &Path) -> Result<()> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data)).context("Corrupt archive")?;
    log::debug!("Extracting {} entries to {}", archive.len(), dest.display());
    archive
        .extract(dest)
        .with_context(|| format!("Failed to extract archive to {}", dest.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use zip::write::FileOptions;

    fn archive(files: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in files {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn chair() -> Identifier {
        Identifier::new("alice", "Chair")
            .unwrap()
            .with_server("fuel.example.org")
    }

    #[test]
    fn test_save_then_lookup() {
        let dir = TempDir::new().unwrap();
        let cache = LocalCache::new(dir.path());
        let id = chair();

        assert_eq!(cache.cached_model(&id), None);

        let path = cache
            .save_model(&id, &archive(&[("model.sdf", "<sdf/>")]), false)
            .unwrap();
        assert_eq!(path, dir.path().join("alice").join("Chair"));
        assert_eq!(cache.cached_model(&id), Some(path.clone()));
        assert_eq!(
            fs::read_to_string(path.join("model.sdf")).unwrap(),
            "<sdf/>"
        );
        assert!(cache.locks.lock().unwrap().is_empty());
    }

    #[test]
    fn test_save_without_overwrite_keeps_first_payload() {
        let dir = TempDir::new().unwrap();
        let cache = LocalCache::new(dir.path());
        let id = chair();

        cache
            .save_model(&id, &archive(&[("model.sdf", "first")]), false)
            .unwrap();
        let second = cache.save_model(&id, &archive(&[("model.sdf", "second")]), false);

        assert!(matches!(second, Err(FuelError::Save { .. })));
        let path = cache.cached_model(&id).unwrap();
        assert_eq!(fs::read_to_string(path.join("model.sdf")).unwrap(), "first");
    }

    #[test]
    fn test_overwrite_replaces_whole_entry() {
        let dir = TempDir::new().unwrap();
        let cache = LocalCache::new(dir.path());
        let id = chair();

        cache
            .save_model(&id, &archive(&[("model.sdf", "first"), ("old.txt", "x")]), true)
            .unwrap();
        let path = cache
            .save_model(&id, &archive(&[("model.sdf", "second")]), true)
            .unwrap();

        assert_eq!(fs::read_to_string(path.join("model.sdf")).unwrap(), "second");
        assert!(!path.join("old.txt").exists());
    }

    #[test]
    fn test_corrupt_archive_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let cache = LocalCache::new(dir.path());
        let id = chair();

        let result = cache.save_model(&id, b"definitely not a zip", false);
        assert!(matches!(result, Err(FuelError::Save { .. })));
        assert_eq!(cache.cached_model(&id), None);
        assert!(cache.all_models().is_empty());

        let leftovers = fs::read_dir(dir.path().join(TMP_DIR)).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_failed_overwrite_keeps_previous_entry() {
        let dir = TempDir::new().unwrap();
        let cache = LocalCache::new(dir.path());
        let id = chair();

        cache
            .save_model(&id, &archive(&[("model.sdf", "good")]), false)
            .unwrap();
        assert!(cache.save_model(&id, b"garbage", true).is_err());

        let path = cache.cached_model(&id).unwrap();
        assert_eq!(fs::read_to_string(path.join("model.sdf")).unwrap(), "good");
    }

    #[test]
    fn test_incomplete_identifier_cannot_be_saved() {
        let dir = TempDir::new().unwrap();
        let cache = LocalCache::new(dir.path());
        let result = cache.save_model(&Identifier::owned_by("alice"), &archive(&[]), false);
        assert!(matches!(result, Err(FuelError::Save { .. })));
    }

    #[test]
    fn test_matching_models_filters_on_owner() {
        let dir = TempDir::new().unwrap();
        let cache = LocalCache::new(dir.path());
        let data = archive(&[("model.sdf", "<sdf/>")]);

        for (owner, name) in [("alice", "Chair"), ("alice", "Table"), ("bob", "Lamp")] {
            let id = Identifier::new(owner, name).unwrap();
            cache.save_model(&id, &data, false).unwrap();
        }

        let mut names: Vec<String> = cache
            .matching_models(&Identifier::owned_by("alice"))
            .map(|id| id.unique_name())
            .collect();
        names.sort();
        assert_eq!(names, vec!["alice/Chair", "alice/Table"]);

        let mut nobody = cache.matching_models(&Identifier::owned_by("carol"));
        assert!(nobody.is_empty());
        assert_eq!(nobody.next(), None);

        assert_eq!(cache.all_models().count(), 3);
    }

    #[test]
    fn test_listing_reports_recorded_server() {
        let dir = TempDir::new().unwrap();
        let cache = LocalCache::new(dir.path());
        cache
            .save_model(&chair(), &archive(&[("model.sdf", "<sdf/>")]), false)
            .unwrap();

        let listed: Vec<Identifier> = cache.all_models().collect();
        assert_eq!(listed, vec![chair()]);

        let elsewhere = Identifier::default().with_server("other.org");
        assert!(cache.matching_models(&elsewhere).is_empty());
        let here = Identifier::default().with_server("fuel.example.org");
        assert_eq!(cache.matching_models(&here).count(), 1);
    }

    #[test]
    fn test_iterator_is_restartable_by_recreating() {
        let dir = TempDir::new().unwrap();
        let cache = LocalCache::new(dir.path());
        cache
            .save_model(&chair(), &archive(&[("model.sdf", "<sdf/>")]), false)
            .unwrap();

        let partial = Identifier::owned_by("alice");
        assert_eq!(cache.matching_models(&partial).count(), 1);
        assert_eq!(cache.matching_models(&partial).count(), 1);
    }

    #[test]
    fn test_missing_root_lists_nothing() {
        let dir = TempDir::new().unwrap();
        let cache = LocalCache::new(dir.path().join("does-not-exist"));
        assert!(cache.all_models().is_empty());
    }

    #[test]
    fn test_cached_model_file() {
        let dir = TempDir::new().unwrap();
        let cache = LocalCache::new(dir.path());
        let id = chair();
        cache
            .save_model(&id, &archive(&[("meshes/chair.dae", "<collada/>")]), false)
            .unwrap();

        let hit = cache.cached_model_file(&id, "meshes/chair.dae").unwrap();
        assert!(hit.ends_with("alice/Chair/meshes/chair.dae"));
        assert_eq!(cache.cached_model_file(&id, "meshes/missing.dae"), None);
        assert_eq!(cache.cached_model_file(&id, "meshes"), None);
        assert_eq!(cache.cached_model_file(&id, "../Chair/meshes/chair.dae"), None);
        assert_eq!(cache.cached_model_file(&id, ""), None);
    }

    #[test]
    fn test_concurrent_saves_of_one_identifier() {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(LocalCache::new(dir.path()));
        let id = chair();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                let id = id.clone();
                std::thread::spawn(move || {
                    let body = format!("payload {}", i);
                    let data = archive(&[("model.sdf", body.as_str()), ("model.config", "cfg")]);
                    cache.save_model(&id, &data, true).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let path = cache.cached_model(&id).unwrap();
        let content = fs::read_to_string(path.join("model.sdf")).unwrap();
        assert!(content.starts_with("payload "));
        assert!(path.join("model.config").is_file());
        assert_eq!(cache.all_models().count(), 1);
        assert!(cache.locks.lock().unwrap().is_empty());
    }

    #[test]
    fn test_overwrite_is_invisible_to_readers() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let dir = TempDir::new().unwrap();
        let cache = Arc::new(LocalCache::new(dir.path()));
        let id = chair();
        let data = archive(&[("model.sdf", "<sdf/>")]);
        cache.save_model(&id, &data, false).unwrap();

        let done = Arc::new(AtomicBool::new(false));
        let writer = {
            let cache = cache.clone();
            let id = id.clone();
            let done = done.clone();
            std::thread::spawn(move || {
                for _ in 0..200 {
                    cache.save_model(&id, &data, true).unwrap();
                }
                done.store(true, Ordering::SeqCst);
            })
        };

        let mut misses = 0;
        while !done.load(Ordering::SeqCst) {
            if cache.cached_model(&id).is_none() {
                misses += 1;
            }
            if cache.cached_model_file(&id, "model.sdf").is_none() {
                misses += 1;
            }
            if cache.all_models().count() != 1 {
                misses += 1;
            }
        }
        writer.join().unwrap();
        assert_eq!(misses, 0, "cached entry disappeared during an overwrite");
    }

    #[test]
    fn test_failed_restore_keeps_previous_entry_on_disk() {
        let dir = TempDir::new().unwrap();
        let trash = TempDir::new_in(dir.path()).unwrap();
        let old = trash.path().join("old");
        fs::create_dir(&old).unwrap();
        fs::write(old.join("model.sdf"), "previous").unwrap();

        // The destination's parent is gone, so the restore cannot succeed.
        let dest = dir.path().join("missing").join("Chair");
        let cause = std::io::Error::new(std::io::ErrorKind::Other, "rename failed");
        let err = restore_previous(trash, &old, &dest, cause);

        let message = format!("{:#}", err);
        assert!(message.contains("kept at"), "{}", message);
        assert_eq!(fs::read_to_string(old.join("model.sdf")).unwrap(), "previous");
    }

    #[test]
    fn test_restore_puts_previous_entry_back() {
        let dir = TempDir::new().unwrap();
        let trash = TempDir::new_in(dir.path()).unwrap();
        let old = trash.path().join("old");
        fs::create_dir(&old).unwrap();
        fs::write(old.join("model.sdf"), "previous").unwrap();

        let dest = dir.path().join("Chair");
        let cause = std::io::Error::new(std::io::ErrorKind::Other, "rename failed");
        let err = restore_previous(trash, &old, &dest, cause);

        assert!(format!("{:#}", err).contains("rename failed"));
        assert_eq!(fs::read_to_string(dest.join("model.sdf")).unwrap(), "previous");
    }

    #[test]
    fn test_unreadable_index_is_backed_up_before_rewrite() {
        let dir = TempDir::new().unwrap();
        let cache = LocalCache::new(dir.path());
        fs::write(dir.path().join(INDEX_FILE), "models = [ not toml").unwrap();

        cache
            .save_model(&chair(), &archive(&[("model.sdf", "<sdf/>")]), false)
            .unwrap();

        assert_eq!(
            fs::read_to_string(dir.path().join(INDEX_BACKUP)).unwrap(),
            "models = [ not toml"
        );
        let listed: Vec<Identifier> = cache.all_models().collect();
        assert_eq!(listed[0].server, "fuel.example.org");
    }
}
