//! Scoped staging of uploaded files.
//!
//! A [`StagedUpload`] owns a file written under the upload directory and
//! removes it when dropped, unless [`keep`](StagedUpload::keep) was called
//! after a successful ingestion. Deleting a document later releases the
//! kept file with [`release`].

use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

#[derive(Debug)]
pub struct StagedUpload {
    path: PathBuf,
    kept: bool,
}

impl StagedUpload {
    /// Write `bytes` to a fresh file in `dir`.
    ///
    /// The staged name is a UUID plus the original extension, so the
    /// caller-supplied filename never becomes part of a filesystem path.
    pub async fn write(dir: &Path, filename: &str, bytes: &[u8]) -> io::Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_ascii_lowercase()))
            .unwrap_or_default();
        let path = dir.join(format!("{}{}", Uuid::new_v4(), ext));
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(path = %path.display(), size = bytes.len(), "upload staged");
        Ok(Self { path, kept: false })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Storage location recorded on the document.
    pub fn location(&self) -> String {
        self.path.display().to_string()
    }

    /// Keep the file past this guard's lifetime.
    pub fn keep(mut self) -> PathBuf {
        self.kept = true;
        std::mem::take(&mut self.path)
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        if self.kept {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "could not remove staged upload");
            }
        }
    }
}

/// Remove a previously kept upload. A missing file is not an error.
pub async fn release(location: &str) -> io::Result<()> {
    match tokio::fs::remove_file(location).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Strip any directory components a client put in an upload's filename.
pub fn base_filename(filename: &str) -> &str {
    filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_dropped_upload_is_removed() {
        let dir = TempDir::new().unwrap();
        let staged = StagedUpload::write(dir.path(), "policy.TXT", b"hello")
            .await
            .unwrap();
        let path = staged.path().to_path_buf();
        assert!(path.exists());
        assert!(path.to_string_lossy().ends_with(".txt"));
        drop(staged);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_kept_upload_survives_until_released() {
        let dir = TempDir::new().unwrap();
        let staged = StagedUpload::write(dir.path(), "policy.pdf", b"%PDF")
            .await
            .unwrap();
        let location = staged.location();
        let path = staged.keep();
        assert!(path.exists());

        release(&location).await.unwrap();
        assert!(!path.exists());
        // Releasing twice is fine.
        release(&location).await.unwrap();
    }

    #[test]
    fn test_base_filename_strips_directories() {
        assert_eq!(base_filename("../../etc/passwd.txt"), "passwd.txt");
        assert_eq!(base_filename("C:\\docs\\plan.docx"), "plan.docx");
        assert_eq!(base_filename("plain.pdf"), "plain.pdf");
    }
}
