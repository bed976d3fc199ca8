//! Fetching release artifacts into a staging file next to the executable.

use async_trait::async_trait;
use std::path::Path;
use tempfile::TempPath;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::core::UpdateError;

/// Prefix of staging files, after the leading dot and executable name.
pub const STAGING_MARKER: &str = ".update-";

/// Fetches an artifact to a local file.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Download `url` into `dest`, truncating it. Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// [`UpdateError::DownloadVerificationFailed`] for transport failures, timeouts and
    /// non-2xx responses. The release was already found at this point, so none of these
    /// count as resolution failures.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, UpdateError>;
}

/// [`Downloader`] streaming over HTTPS with `reqwest`.
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    /// Downloader using `client`, which is expected to carry the request timeout.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, UpdateError> {
        info!("Downloading {}", url);

        let mut response =
            self.client.get(url).send().await.map_err(|e| UpdateError::download(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::download(url, format!("HTTP {status}")));
        }

        let mut file = fs::File::create(dest)
            .await
            .map_err(|e| UpdateError::io("create staging file", &e))?;

        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await.map_err(|e| UpdateError::download(url, e))? {
            file.write_all(&chunk)
                .await
                .map_err(|e| UpdateError::io("write staging file", &e))?;
            written += chunk.len() as u64;
        }

        file.flush().await.map_err(|e| UpdateError::io("flush staging file", &e))?;
        file.sync_all().await.map_err(|e| UpdateError::io("sync staging file", &e))?;

        debug!("Downloaded {} bytes from {}", written, url);
        Ok(written)
    }
}

/// Create an empty staging file in the same directory as `current_exe`.
///
/// The file is named `.<exe>.update-XXXXXX` and is deleted when the returned path is
/// dropped, unless it has been renamed away first.
pub fn stage_beside(current_exe: &Path) -> Result<TempPath, UpdateError> {
    let dir = current_exe.parent().unwrap_or_else(|| Path::new("."));
    let name = current_exe.file_name().unwrap_or_default().to_string_lossy();

    let file = tempfile::Builder::new()
        .prefix(&format!(".{name}{STAGING_MARKER}"))
        .tempfile_in(dir)
        .map_err(|e| UpdateError::io(format!("create staging file in {}", dir.display()), &e))?;

    // Close the handle so the file can be renamed on every platform
    Ok(file.into_temp_path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_stage_beside_uses_exe_directory() {
        let temp_dir = TempDir::new().unwrap();
        let exe = temp_dir.path().join("Hopper");

        let staged = stage_beside(&exe).unwrap();
        assert_eq!(staged.parent(), Some(temp_dir.path()));
        let name = staged.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with(".Hopper.update-"), "{name}");

        let path = staged.to_path_buf();
        assert!(path.exists());
        drop(staged);
        assert!(!path.exists());
    }
}
