//! JSON file persistence for the panel database.

use std::fs::{self, OpenOptions};
use std::path::PathBuf;

use super::{Backend, BackendLock, Database, StoreError};

/// Persists the database as a single JSON file.
///
/// Writes go to a temporary sibling file which is then renamed over the
/// target, so readers never see a half-written snapshot. Transactions from
/// different processes are serialized by an advisory lock on the sibling
/// `<file>.lock`.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "panel.db.json".to_string())
    }

    fn tmp_path(&self) -> PathBuf {
        self.path
            .with_file_name(format!("{}.{}.tmp", self.file_name(), std::process::id()))
    }

    fn lock_path(&self) -> PathBuf {
        self.path
            .with_file_name(format!("{}.lock", self.file_name()))
    }

    fn create_parent(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        Ok(())
    }
}

impl Backend for FileBackend {
    fn load(&self) -> Result<Database, StoreError> {
        if !self.path.exists() {
            return Ok(Database::new());
        }

        let bytes = fs::read(&self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        let database: Database =
            serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            })?;
        database.validate()?;
        Ok(database)
    }

    fn persist(&self, database: &Database) -> Result<(), StoreError> {
        self.create_parent()?;

        // Serialize first so a failure never leaves a tmp file behind
        let bytes = serde_json::to_vec_pretty(database).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        let tmp_path = self.tmp_path();
        fs::write(&tmp_path, bytes).map_err(|source| StoreError::Io {
            path: tmp_path.clone(),
            source,
        })?;

        // Windows refuses to rename over an existing file
        if cfg!(windows) && self.path.exists() {
            fs::remove_file(&self.path).map_err(|source| StoreError::Io {
                path: self.path.clone(),
                source,
            })?;
        }
        fs::rename(&tmp_path, &self.path).map_err(|source| StoreError::Io {
            path: tmp_path.clone(),
            source,
        })?;

        tracing::debug!(path = %self.path.display(), "persisted panel database");
        Ok(())
    }

    fn lock(&self) -> Result<BackendLock, StoreError> {
        self.create_parent()?;
        let lock_path = self.lock_path();
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_path)
            .map_err(|source| StoreError::Io {
                path: lock_path.clone(),
                source,
            })?;
        // Blocks until the holder in another store or process lets go
        fs2::FileExt::lock_exclusive(&file).map_err(|source| StoreError::Io {
            path: lock_path,
            source,
        })?;
        Ok(BackendLock::on_file(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_loads_empty_database() {
        let temp = TempDir::new().unwrap();
        let backend = FileBackend::new(temp.path().join("panel.db.json"));

        let database = backend.load().unwrap();
        assert!(database.template.is_none());
        assert!(database.inbounds.is_empty());
    }

    #[test]
    fn persist_creates_parent_and_leaves_no_tmp_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("panel.db.json");
        let backend = FileBackend::new(&path);

        let mut database = Database::new();
        database.template = Some("{}".to_string());
        backend.persist(&database).unwrap();

        assert!(path.exists());
        let entries: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(entries.len(), 1);

        let reloaded = backend.load().unwrap();
        assert_eq!(reloaded.template.as_deref(), Some("{}"));
    }

    #[test]
    fn lock_excludes_a_second_backend_on_the_same_file() {
        use std::sync::mpsc;
        use std::time::Duration;

        let temp = TempDir::new().expect("temp dir should be created");
        let path = temp.path().join("panel.db.json");
        let first = FileBackend::new(&path);
        let second = FileBackend::new(&path);

        let hold = first.lock().expect("first lock should succeed");
        assert!(path.with_file_name("panel.db.json.lock").exists());

        let (sender, receiver) = mpsc::channel();
        let waiter = std::thread::spawn(move || {
            let _hold = second.lock().expect("second lock should succeed");
            sender.send(()).expect("receiver should be alive");
        });

        assert!(
            receiver.recv_timeout(Duration::from_millis(200)).is_err(),
            "second backend acquired the lock while it was held"
        );
        drop(hold);
        receiver
            .recv_timeout(Duration::from_secs(5))
            .expect("second lock should be granted after release");
        waiter.join().expect("waiter thread should finish");
    }

    #[test]
    fn corrupt_file_is_reported() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("panel.db.json");
        std::fs::write(&path, b"not json").unwrap();

        let err = FileBackend::new(&path).load().unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("panel.db.json");
        let mut database = Database::new();
        database.version = 9;
        std::fs::write(&path, serde_json::to_vec(&database).unwrap()).unwrap();

        let err = FileBackend::new(&path).load().unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedVersion(9)));
    }
}
