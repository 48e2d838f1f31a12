use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use url::Url;

use super::{validate_blob_key, BlobStore, StoreError};

/// Blob store on the local filesystem.
///
/// Objects live at `<root>/<key>`. Public URLs are `<base_url>/<key>` with a
/// `token` query parameter derived from the object's content, so a URL stops
/// matching once the object is replaced.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    base_url: Url,
}

impl LocalBlobStore {
    /// Creates the store rooted at `root`, creating the directory if needed.
    ///
    /// Without `base_url` the public URLs are `file://` URLs into `root`.
    pub async fn open(root: impl Into<PathBuf>, base_url: Option<Url>) -> Result<Self, StoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        let root = tokio::fs::canonicalize(&root).await?;

        let base_url = match base_url {
            Some(url) => url,
            None => Url::from_directory_path(&root)
                .map_err(|()| StoreError::InvalidBaseUrl(root.display().to_string()))?,
        };
        if base_url.cannot_be_a_base() {
            return Err(StoreError::InvalidBaseUrl(base_url.to_string()));
        }

        Ok(Self { root, base_url })
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_blob_key(key)?;
        Ok(key
            .split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.root.clone(), |path, segment| path.join(segment)))
    }
}

const HASH_CHUNK: usize = 64 * 1024;

/// First 16 bytes of the SHA-256 of the file at `path`, hex encoded.
///
/// The file is hashed in chunks; it is never held in memory whole.
async fn content_token(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut chunk = vec![0u8; HASH_CHUNK];
    loop {
        let n = file.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        hasher.update(&chunk[..n]);
    }
    Ok(hasher
        .finalize()
        .iter()
        .take(16)
        .map(|b| format!("{:02x}", b))
        .collect())
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    /// Writes through a randomized temp file and renames it into place, so a
    /// reader never sees a partially written object.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let random_suffix = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let temp_path = path.with_extension(format!("tmp.{:016x}", random_suffix));

        let write = async {
            let mut file = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&temp_path)
                .await?;
            file.write_all(&bytes).await?;
            file.sync_all().await?;
            tokio::fs::rename(&temp_path, &path).await
        };

        if let Err(e) = write.await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(StoreError::Io(e));
        }

        tracing::debug!(key = %key, size = bytes.len(), "Stored blob");
        Ok(())
    }

    async fn public_url(&self, key: &str) -> Result<String, StoreError> {
        let path = self.object_path(key)?;
        let token = match content_token(&path).await {
            Ok(token) => token,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(key.to_owned()));
            }
            Err(e) => return Err(StoreError::Io(e)),
        };

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| StoreError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(key.split('/').filter(|segment| !segment.is_empty()));
        url.query_pairs_mut()
            .clear()
            .append_pair("token", &token);

        Ok(url.to_string())
    }
}
