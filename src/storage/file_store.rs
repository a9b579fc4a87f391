use std::path::{Path, PathBuf};

use log::{info, warn};
use tokio::fs as async_fs;

use crate::utils::{P2PError, Result};

/// File-system collaborator for one shared directory: the startup listing
/// that seeds the filter, presence checks and raw reads for serving
/// transfers, and persistence of received files.
pub struct FileStore {
    shared_dir: PathBuf,
}

impl FileStore {
    pub async fn new(shared_dir: PathBuf) -> Result<Self> {
        async_fs::create_dir_all(&shared_dir)
            .await
            .map_err(|e| P2PError::Io(format!("Failed to create directory: {}", e)))?;
        Ok(Self { shared_dir })
    }

    pub fn shared_dir(&self) -> &Path {
        &self.shared_dir
    }

    /// Peers hand us bare file names; anything that could walk out of the
    /// shared directory is rejected.
    fn local_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty()
            || name == ".."
            || name.contains('/')
            || name.contains('\\')
            || name.contains('\0')
        {
            return Err(P2PError::InvalidFileName(name.to_string()));
        }
        Ok(self.shared_dir.join(name))
    }

    /// List the plain files in the shared directory. Called once at startup
    /// to seed the membership filter.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut entries = async_fs::read_dir(&self.shared_dir)
            .await
            .map_err(|e| P2PError::Io(format!("Failed to read directory: {}", e)))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| P2PError::Io(format!("Failed to read directory entry: {}", e)))?
        {
            let path = entry.path();
            if path.is_file() {
                match path.file_name() {
                    Some(name) => names.push(name.to_string_lossy().to_string()),
                    None => warn!("Skipping unnamed entry: {:?}", path),
                }
            }
        }

        names.sort();
        Ok(names)
    }

    pub async fn exists(&self, name: &str) -> bool {
        match self.local_path(name) {
            Ok(path) => async_fs::try_exists(&path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    pub async fn read(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.local_path(name)?;
        async_fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => P2PError::FileNotFound(name.to_string()),
            _ => P2PError::Io(format!("Failed to read {:?}: {}", path, e)),
        })
    }

    /// Persist a transferred file under its derived local name
    /// (`received_<name>`), returning the path written.
    pub async fn save_received(&self, name: &str, data: &[u8]) -> Result<PathBuf> {
        // Validate the remote name before deriving from it.
        self.local_path(name)?;
        let path = self.shared_dir.join(format!("received_{}", name));

        async_fs::write(&path, data)
            .await
            .map_err(|e| P2PError::Io(format!("Failed to write {:?}: {}", path, e)))?;

        info!("File {} received and saved as {:?}", name, path);
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with(files: &[(&str, &[u8])]) -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        for (name, data) in files {
            std::fs::write(dir.path().join(name), data).unwrap();
        }
        let store = FileStore::new(dir.path().to_path_buf()).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn lists_plain_files_sorted() {
        let (_dir, store) = store_with(&[("b.txt", b"b"), ("a.txt", b"a")]).await;
        assert_eq!(store.list().await.unwrap(), vec!["a.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn exists_and_read() {
        let (_dir, store) = store_with(&[("a.txt", b"hello")]).await;
        assert!(store.exists("a.txt").await);
        assert!(!store.exists("missing.txt").await);
        assert_eq!(store.read("a.txt").await.unwrap(), b"hello");
        assert!(matches!(
            store.read("missing.txt").await.unwrap_err(),
            P2PError::FileNotFound(_)
        ));
    }

    #[tokio::test]
    async fn unreadable_entry_is_an_io_error_not_a_miss() {
        let (dir, store) = store_with(&[]).await;
        // A directory can't be read as a file, but it does exist: this must
        // classify as a local I/O failure, not a protocol-level miss.
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let err = store.read("nested").await.unwrap_err();
        assert!(matches!(err, P2PError::Io(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn save_received_derives_local_name() {
        let (dir, store) = store_with(&[]).await;
        let path = store.save_received("a.txt", b"payload").await.unwrap();
        assert_eq!(path, dir.path().join("received_a.txt"));
        assert_eq!(std::fs::read(path).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn path_escapes_are_rejected() {
        let (_dir, store) = store_with(&[]).await;
        for name in ["../etc/passwd", "a/b.txt", "..", ""] {
            assert!(!store.exists(name).await);
            assert!(matches!(
                store.save_received(name, b"x").await.unwrap_err(),
                P2PError::InvalidFileName(_)
            ));
        }
    }
}
