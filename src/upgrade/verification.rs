use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use crate::core::UpdateError;

/// Integrity checks for staged and installed executables.
///
/// Release artifacts are not published with checksums, so the digest recorded here is
/// computed from the staged download and used to confirm the file that lands at the
/// canonical path is the one that was downloaded.
pub struct ArtifactVerifier;

impl ArtifactVerifier {
    /// Compute the SHA-256 digest of a file as `sha256:<hex>`.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use hopper::upgrade::verification::ArtifactVerifier;
    /// use std::path::Path;
    ///
    /// # async fn example() -> Result<(), hopper::core::UpdateError> {
    /// let digest = ArtifactVerifier::compute_sha256(Path::new("/path/to/binary")).await?;
    /// println!("{digest}");
    /// # Ok(())
    /// # }
    /// ```
    pub async fn compute_sha256(file_path: &Path) -> Result<String, UpdateError> {
        debug!("Computing SHA256 checksum for: {:?}", file_path);

        let mut file = fs::File::open(file_path)
            .await
            .map_err(|e| UpdateError::io(format!("open {}", file_path.display()), &e))?;

        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = file
                .read(&mut buf)
                .await
                .map_err(|e| UpdateError::io(format!("read {}", file_path.display()), &e))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }

        Ok(format!("sha256:{:x}", hasher.finalize()))
    }

    /// Verify a file against an expected `sha256:<hex>` digest (case-insensitive).
    pub async fn verify_checksum(file_path: &Path, expected: &str) -> Result<(), UpdateError> {
        let actual = Self::compute_sha256(file_path).await?;

        if !actual.eq_ignore_ascii_case(expected) {
            return Err(UpdateError::DownloadVerificationFailed {
                reason: format!("checksum mismatch: expected {expected}, found {actual}"),
            });
        }

        debug!("Checksum verified for {:?}", file_path);
        Ok(())
    }

    /// Reject artifacts that cannot be a real executable.
    ///
    /// Returns the artifact size in bytes.
    ///
    /// # Errors
    ///
    /// [`UpdateError::DownloadVerificationFailed`] when the file is missing, not a regular
    /// file, empty, or smaller than `min_size` bytes.
    pub async fn check_artifact(path: &Path, min_size: u64) -> Result<u64, UpdateError> {
        let metadata = fs::metadata(path).await.map_err(|e| {
            UpdateError::DownloadVerificationFailed {
                reason: format!("staged artifact {} is unreadable: {e}", path.display()),
            }
        })?;

        if !metadata.is_file() {
            return Err(UpdateError::DownloadVerificationFailed {
                reason: format!("staged artifact {} is not a file", path.display()),
            });
        }

        let size = metadata.len();
        if size == 0 {
            return Err(UpdateError::DownloadVerificationFailed {
                reason: "downloaded artifact is empty".to_string(),
            });
        }
        if size < min_size {
            return Err(UpdateError::DownloadVerificationFailed {
                reason: format!("downloaded artifact is {size} bytes, expected at least {min_size}"),
            });
        }

        info!("Staged artifact {:?} is {} bytes", path, size);
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_compute_sha256() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"Hello, World!").unwrap();
        temp_file.flush().unwrap();

        let checksum = ArtifactVerifier::compute_sha256(temp_file.path()).await.unwrap();
        assert_eq!(
            checksum,
            "sha256:dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );
    }

    #[tokio::test]
    async fn test_verify_checksum_is_case_insensitive() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"Hello, World!").unwrap();
        temp_file.flush().unwrap();

        let upper = "SHA256:DFFD6021BB2BD5B0AF676290809EC3A53191DD81C7F70A4B28688A362182986F";
        ArtifactVerifier::verify_checksum(temp_file.path(), upper).await.unwrap();

        let err = ArtifactVerifier::verify_checksum(temp_file.path(), "sha256:00").await.unwrap_err();
        assert!(matches!(err, UpdateError::DownloadVerificationFailed { .. }));
    }

    #[tokio::test]
    async fn test_check_artifact_sizes() {
        let empty = NamedTempFile::new().unwrap();
        assert!(ArtifactVerifier::check_artifact(empty.path(), 1).await.is_err());

        let mut small = NamedTempFile::new().unwrap();
        small.write_all(&[0u8; 100]).unwrap();
        small.flush().unwrap();
        assert!(ArtifactVerifier::check_artifact(small.path(), 1024).await.is_err());
        assert_eq!(ArtifactVerifier::check_artifact(small.path(), 100).await.unwrap(), 100);

        let dir = tempfile::tempdir().unwrap();
        assert!(ArtifactVerifier::check_artifact(dir.path(), 0).await.is_err());
        assert!(ArtifactVerifier::check_artifact(&dir.path().join("missing"), 0).await.is_err());
    }
}
