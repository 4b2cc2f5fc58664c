//! File-backed repository for caches that survive restarts.

use crate::entries::Entries;
use crate::error::{StorageError, StorageResult};
use crate::model::Identifiable;
use crate::repository::Repository;
use async_trait::async_trait;
use fs2::FileExt;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Current on-disk snapshot format version.
const SNAPSHOT_VERSION: u16 = 1;

#[derive(Serialize, Deserialize)]
struct Snapshot<M> {
    version: u16,
    next_seq: u64,
    records: Vec<(u64, M)>,
}

/// A file-backed repository.
///
/// The whole cache is kept in memory and persisted as a CBOR snapshot on
/// every batch write. Data survives process restarts.
///
/// # Durability
///
/// A batch is encoded, written to a sibling `<name>.tmp` file, synced with
/// `File::sync_all()` and renamed over the snapshot. A crash leaves either
/// the old or the new snapshot on disk, and in-process readers only see the
/// new content once the rename succeeded.
///
/// # Exclusivity
///
/// An exclusive lock on a sibling `<name>.lock` file is held for the lifetime of
/// the repository. Opening the same cache twice fails with
/// [`StorageError::Locked`].
///
/// # Example
///
/// ```no_run
/// # use serde::{Deserialize, Serialize};
/// # use tidecache_storage::{FileRepository, Identifiable};
/// # use std::path::Path;
/// #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// struct Note { id: String }
///
/// impl Identifiable for Note {
///     fn identifier(&self) -> &str { &self.id }
/// }
///
/// let repository = FileRepository::<Note>::open(Path::new("notes.cache")).unwrap();
/// println!("{} cached notes", repository.len());
/// ```
#[derive(Debug)]
pub struct FileRepository<M> {
    path: PathBuf,
    entries: RwLock<Entries<M>>,
    writer: tokio::sync::Mutex<()>,
    _lock: File,
}

impl<M> FileRepository<M>
where
    M: Identifiable + Serialize + DeserializeOwned,
{
    /// Opens or creates a repository at the given path.
    ///
    /// If a snapshot exists it is loaded; otherwise the repository starts
    /// empty and the snapshot is created on the first write.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be taken, or if an existing
    /// snapshot cannot be read or decoded.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(sidecar(path, "lock"))?;
        lock.try_lock_exclusive()
            .map_err(|_| StorageError::Locked)?;

        let entries = if path.exists() {
            decode(&fs::read(path)?)?
        } else {
            Entries::default()
        };

        debug!(path = %path.display(), models = entries.len(), "opened file repository");

        Ok(Self {
            path: path.to_path_buf(),
            entries: RwLock::new(entries),
            writer: tokio::sync::Mutex::new(()),
            _lock: lock,
        })
    }

    /// Opens or creates a repository, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the repository
    /// cannot be opened.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path to the snapshot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of stored models.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if no model is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Persists `next` and, once it is durable, makes it visible to readers.
    async fn commit(&self, next: Entries<M>) -> StorageResult<()> {
        let bytes = encode(&next)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomically(&path, &bytes))
            .await
            .map_err(|e| StorageError::backend(format!("snapshot writer failed: {e}")))??;

        debug!(path = %self.path.display(), models = next.len(), "snapshot written");
        *self.entries.write() = next;
        Ok(())
    }
}

#[async_trait]
impl<M> Repository<M> for FileRepository<M>
where
    M: Identifiable + Serialize + DeserializeOwned,
{
    async fn fetch_one(&self, id: &str) -> StorageResult<Option<M>> {
        Ok(self.entries.read().get(id))
    }

    async fn fetch_all(&self) -> StorageResult<Vec<M>> {
        Ok(self.entries.read().all())
    }

    async fn fetch_page(
        &self,
        offset: usize,
        count: usize,
        reversed: bool,
    ) -> StorageResult<Vec<M>> {
        Ok(self.entries.read().page(offset, count, reversed))
    }

    async fn save(&self, upserts: Vec<M>, deletes: Vec<String>) -> StorageResult<()> {
        if upserts.is_empty() && deletes.is_empty() {
            return Ok(());
        }

        let _writer = self.writer.lock().await;
        let mut next = self.entries.read().clone();
        next.apply(upserts, &deletes);
        self.commit(next).await
    }

    async fn delete_all(&self) -> StorageResult<()> {
        let _writer = self.writer.lock().await;
        let mut next = self.entries.read().clone();
        next.clear();
        self.commit(next).await
    }
}

fn encode<M: Identifiable + Serialize>(entries: &Entries<M>) -> StorageResult<Vec<u8>> {
    let snapshot = Snapshot {
        version: SNAPSHOT_VERSION,
        next_seq: entries.next_seq(),
        records: entries.records(),
    };

    let mut bytes = Vec::new();
    ciborium::into_writer(&snapshot, &mut bytes)
        .map_err(|e| StorageError::Codec(e.to_string()))?;
    Ok(bytes)
}

fn decode<M: Identifiable + DeserializeOwned>(bytes: &[u8]) -> StorageResult<Entries<M>> {
    let snapshot: Snapshot<M> =
        ciborium::from_reader(bytes).map_err(|e| StorageError::Codec(e.to_string()))?;

    if snapshot.version != SNAPSHOT_VERSION {
        return Err(StorageError::Corrupted(format!(
            "unsupported snapshot version {}",
            snapshot.version
        )));
    }

    Ok(Entries::from_records(snapshot.records, snapshot.next_seq))
}

/// Path of a helper file next to the snapshot: the full snapshot name with
/// `.suffix` appended, so caches sharing a stem never share helpers.
fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

fn write_atomically(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let tmp = sidecar(path, "tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: String,
        body: String,
    }

    impl Identifiable for Note {
        fn identifier(&self) -> &str {
            &self.id
        }
    }

    fn note(id: &str, body: &str) -> Note {
        Note {
            id: id.into(),
            body: body.into(),
        }
    }

    #[tokio::test]
    async fn file_create_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.cache");

        let repository = FileRepository::<Note>::open(&path).unwrap();
        assert!(repository.is_empty());
        assert_eq!(repository.path(), path);
        // Nothing is written until the first batch.
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn file_save_and_fetch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.cache");

        let repository = FileRepository::open(&path).unwrap();
        repository
            .save(vec![note("a", "one"), note("b", "two")], vec![])
            .await
            .unwrap();

        assert!(path.exists());
        assert_eq!(repository.len(), 2);
        assert_eq!(
            repository.fetch_one("a").await.unwrap(),
            Some(note("a", "one"))
        );
    }

    #[tokio::test]
    async fn file_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.cache");

        // Write data
        {
            let repository = FileRepository::open(&path).unwrap();
            repository
                .save(vec![note("a", "one"), note("b", "two")], vec![])
                .await
                .unwrap();
            repository
                .save(vec![note("a", "uno")], vec!["b".into()])
                .await
                .unwrap();
        }

        // Reopen and read
        {
            let repository = FileRepository::<Note>::open(&path).unwrap();
            assert_eq!(repository.fetch_all().await.unwrap(), vec![note("a", "uno")]);
        }
    }

    #[tokio::test]
    async fn file_order_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.cache");

        {
            let repository = FileRepository::open(&path).unwrap();
            repository
                .save(vec![note("a", ""), note("b", ""), note("c", "")], vec![])
                .await
                .unwrap();
            repository.save(vec![note("a", "x")], vec![]).await.unwrap();
        }

        let repository = FileRepository::<Note>::open(&path).unwrap();
        let page = repository.fetch_page(0, 3, true).await.unwrap();
        let ids: Vec<_> = page.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
    }

    #[tokio::test]
    async fn file_second_open_is_locked() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.cache");

        let _first = FileRepository::<Note>::open(&path).unwrap();
        let second = FileRepository::<Note>::open(&path);
        assert!(matches!(second, Err(StorageError::Locked)));
    }

    #[tokio::test]
    async fn file_caches_sharing_a_stem_are_independent() {
        let dir = tempdir().unwrap();
        let notes = dir.path().join("data.notes");
        let drafts = dir.path().join("data.drafts");

        let first = FileRepository::<Note>::open(&notes).unwrap();
        let second = FileRepository::<Note>::open(&drafts).unwrap();

        first.save(vec![note("n1", "note")], vec![]).await.unwrap();
        second.save(vec![note("d1", "draft")], vec![]).await.unwrap();

        assert!(dir.path().join("data.notes.lock").exists());
        assert!(dir.path().join("data.drafts.lock").exists());
        assert!(!dir.path().join("data.notes.tmp").exists());
        assert_eq!(first.fetch_all().await.unwrap(), vec![note("n1", "note")]);
        assert_eq!(second.fetch_all().await.unwrap(), vec![note("d1", "draft")]);
    }

    #[tokio::test]
    async fn file_named_like_a_lock_file_keeps_its_snapshot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x.lock");

        {
            let repository = FileRepository::<Note>::open(&path).unwrap();
            repository.save(vec![note("a", "kept")], vec![]).await.unwrap();
        }

        let reopened = FileRepository::<Note>::open(&path).unwrap();
        assert_eq!(reopened.fetch_all().await.unwrap(), vec![note("a", "kept")]);
    }

    #[test]
    fn sidecar_appends_to_full_name() {
        assert_eq!(
            sidecar(Path::new("dir/data.users"), "lock"),
            PathBuf::from("dir/data.users.lock")
        );
        assert_eq!(sidecar(Path::new("cache"), "tmp"), PathBuf::from("cache.tmp"));
    }

    #[tokio::test]
    async fn file_corrupted_snapshot_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.cache");
        fs::write(&path, b"not cbor at all").unwrap();

        let result = FileRepository::<Note>::open(&path);
        assert!(matches!(
            result,
            Err(StorageError::Codec(_)) | Err(StorageError::Corrupted(_))
        ));
    }

    #[tokio::test]
    async fn file_delete_all() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.cache");

        {
            let repository = FileRepository::open(&path).unwrap();
            repository.save(vec![note("a", "")], vec![]).await.unwrap();
            repository.delete_all().await.unwrap();
            assert!(repository.is_empty());
        }

        let repository = FileRepository::<Note>::open(&path).unwrap();
        assert!(repository.is_empty());
    }

    #[tokio::test]
    async fn file_create_with_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("path").join("notes.cache");

        let repository = FileRepository::<Note>::open_with_create_dirs(&path).unwrap();
        repository.save(vec![note("a", "")], vec![]).await.unwrap();
        assert!(path.exists());
    }
}
