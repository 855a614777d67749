use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Per-request namespace inside the scratch directory.
///
/// Every artifact of a request is named `<dir>/<id>*`, so partial downloads
/// and intermediate files are removed together. Dropping the value cleans up.
#[derive(Debug)]
pub struct ScratchSpace {
    dir: PathBuf,
    id: String,
    closed: bool,
}

impl ScratchSpace {
    /// Ensure `dir` exists and reserve a fresh identifier inside it
    pub fn create<P: AsRef<Path>>(dir: P) -> std::io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        Ok(Self {
            dir,
            id: Uuid::new_v4().to_string(),
            closed: false,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Path prefix handed to the downloader, without extension
    pub fn prefix(&self) -> PathBuf {
        self.dir.join(&self.id)
    }

    /// Remove every entry whose name starts with the identifier.
    /// Returns how many were removed.
    pub fn cleanup(&self) -> std::io::Result<usize> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        for entry in entries {
            let entry = entry?;
            if !entry.file_name().to_string_lossy().starts_with(&self.id) {
                continue;
            }

            let path = entry.path();
            let result = if entry.file_type()?.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };

            match result {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }

        if removed > 0 {
            tracing::debug!("Removed {} scratch entries for {}", removed, self.id);
        }

        Ok(removed)
    }

    /// Clean up and consume the space; dropping it afterwards does nothing.
    /// Blocking, so async callers run it on a blocking thread.
    pub fn close(mut self) -> std::io::Result<usize> {
        self.closed = true;
        self.cleanup()
    }
}

impl Drop for ScratchSpace {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.cleanup() {
            tracing::warn!("Failed to clean scratch files for {}: {}", self.id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn artifact(scratch: &ScratchSpace, suffix: &str) -> PathBuf {
        let mut path = scratch.prefix().into_os_string();
        path.push(suffix);
        PathBuf::from(path)
    }

    #[test]
    fn test_prefix_uses_identifier() {
        let dir = tempdir().unwrap();
        let scratch = ScratchSpace::create(dir.path()).unwrap();

        assert_eq!(scratch.id().len(), 36);
        assert_eq!(scratch.prefix(), dir.path().join(scratch.id()));
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b");

        let _scratch = ScratchSpace::create(&nested).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn test_cleanup_only_touches_own_files() {
        let dir = tempdir().unwrap();
        let scratch = ScratchSpace::create(dir.path()).unwrap();

        std::fs::write(artifact(&scratch, ".wav"), b"wav").unwrap();
        std::fs::write(artifact(&scratch, ".webm.part"), b"part").unwrap();
        std::fs::write(dir.path().join("someone-else.wav"), b"other").unwrap();

        assert_eq!(scratch.cleanup().unwrap(), 2);
        assert!(!artifact(&scratch, ".wav").exists());
        assert!(dir.path().join("someone-else.wav").exists());
        assert_eq!(scratch.cleanup().unwrap(), 0);
    }

    #[test]
    fn test_drop_cleans_up() {
        let dir = tempdir().unwrap();
        let wav = {
            let scratch = ScratchSpace::create(dir.path()).unwrap();
            let wav = artifact(&scratch, ".wav");
            std::fs::write(&wav, b"wav").unwrap();
            wav
        };

        assert!(!wav.exists());
    }

    #[test]
    fn test_close_reports_removed_entries() {
        let dir = tempdir().unwrap();
        let scratch = ScratchSpace::create(dir.path()).unwrap();
        std::fs::write(artifact(&scratch, ".wav"), b"wav").unwrap();
        let wav = artifact(&scratch, ".wav");

        assert_eq!(scratch.close().unwrap(), 1);
        assert!(!wav.exists());
    }

    #[tokio::test]
    async fn test_close_on_blocking_thread() {
        let dir = tempdir().unwrap();
        let scratch = ScratchSpace::create(dir.path()).unwrap();
        std::fs::write(artifact(&scratch, ".webm.part"), b"part").unwrap();

        let removed = tokio::task::spawn_blocking(move || scratch.close())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
