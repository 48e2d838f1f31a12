use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::dedup::partition_duplicates;
use super::types::{Collection, ContentRecord, FileUpload, PageMetadata, RecordDraft};
use crate::auth::SessionGate;
use crate::metadata::{self, DEFAULT_FETCH_TIMEOUT};
use crate::policy;
use crate::ratelimit::{CooldownTracker, UPLOAD_ACTION, WRITE_ACTION};
use crate::store::{BlobStore, Direction, DocumentStore, SortField, StoreError};
use crate::util::{
    normalize_link, now_millis, sanitize_file_name, sanitize_opt, youtube_video_id,
};

/// Title given to records submitted without one.
pub const DEFAULT_TITLE: &str = "Untitled";

/// Largest payload accepted by [`CatalogGateway::upload_file`].
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;

/// Blob key prefix for uploads.
const UPLOAD_PREFIX: &str = "uploads";

// ============================================================================
// External open
// ============================================================================

/// Hands a URL to the host's browser.
pub trait ExternalOpener: Send + Sync {
    fn open(&self, url: &str) -> std::io::Result<()>;
}

/// Opens URLs with the platform default handler.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemOpener;

impl ExternalOpener for SystemOpener {
    fn open(&self, url: &str) -> std::io::Result<()> {
        open::that(url)
    }
}

// ============================================================================
// Gateway
// ============================================================================

/// The single entry point the front-end uses to touch the catalog.
///
/// Every operation fails closed: invalid input, a closed cooldown window, a
/// missing session or a store error all produce `[]`, `false` or `None` plus
/// a log event. Nothing here returns an error to the caller.
pub struct CatalogGateway {
    documents: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    limiter: Arc<CooldownTracker>,
    http: reqwest::Client,
    opener: Arc<dyn ExternalOpener>,
    session: Option<Arc<dyn SessionGate>>,
    upload_root: Option<PathBuf>,
    max_upload_bytes: u64,
    metadata_timeout: Duration,
}

impl CatalogGateway {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            documents,
            blobs,
            limiter: Arc::new(CooldownTracker::default()),
            http,
            opener: Arc::new(SystemOpener),
            session: None,
            upload_root: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            metadata_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_limiter(mut self, limiter: Arc<CooldownTracker>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_opener(mut self, opener: Arc<dyn ExternalOpener>) -> Self {
        self.opener = opener;
        self
    }

    /// Store operations refuse to run while the gate reports no usable
    /// session.
    pub fn with_session_gate(mut self, gate: Arc<dyn SessionGate>) -> Self {
        self.session = Some(gate);
        self
    }

    /// Path uploads must resolve inside `root` (after symlinks).
    pub fn with_upload_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.upload_root = Some(root.into());
        self
    }

    pub fn with_max_upload_bytes(mut self, max: u64) -> Self {
        self.max_upload_bytes = max;
        self
    }

    pub fn with_metadata_timeout(mut self, timeout: Duration) -> Self {
        self.metadata_timeout = timeout;
        self
    }

    fn session_usable(&self, operation: &'static str) -> bool {
        match &self.session {
            Some(gate) if !gate.is_usable() => {
                tracing::warn!(operation, "No usable session, refusing store access");
                false
            }
            _ => true,
        }
    }

    // ------------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------------

    /// All records of `collection`, newest first. `[]` on any failure.
    pub async fn read_collection(&self, collection: &str) -> Vec<ContentRecord> {
        let Some(collection) = parse_collection(collection) else {
            return Vec::new();
        };
        self.query_newest_first(collection).await.unwrap_or_default()
    }

    async fn query_newest_first(&self, collection: Collection) -> Option<Vec<ContentRecord>> {
        if !self.session_usable("read") {
            return None;
        }
        match self
            .documents
            .query(collection, SortField::Date, Direction::Descending)
            .await
        {
            Ok(records) => {
                tracing::debug!(collection = %collection, count = records.len(), "Read collection");
                Some(records)
            }
            Err(e) => {
                tracing::error!(collection = %collection, error = %e, "Failed to read collection");
                None
            }
        }
    }

    /// [`read_collection`](Self::read_collection) plus, for `news`, the
    /// dedup pass: duplicates are dropped from the result and deleted from
    /// the store. A failed delete is logged; the deduplicated list is
    /// returned either way.
    pub async fn load_collection(&self, collection: &str) -> Vec<ContentRecord> {
        let Some(parsed) = parse_collection(collection) else {
            return Vec::new();
        };
        let Some(records) = self.query_newest_first(parsed).await else {
            return Vec::new();
        };
        if parsed != Collection::News {
            return records;
        }

        let (kept, dropped) = partition_duplicates(records);
        if !dropped.is_empty() {
            tracing::info!(
                collection = %parsed,
                kept = kept.len(),
                dropped = dropped.len(),
                "Removing duplicate records"
            );
        }
        for duplicate in &dropped {
            let Some(id) = duplicate.id.as_deref() else {
                continue;
            };
            if let Err(e) = self.documents.delete(parsed, id).await {
                tracing::warn!(collection = %parsed, id = %id, error = %e, "Failed to delete duplicate record");
            }
        }
        kept
    }

    /// Persists the first of `drafts`. Returns whether a record was stored.
    ///
    /// Rejected when the collection is unknown, the write window is closed,
    /// `drafts` is empty, or (for `news`) a stored record already carries the
    /// same link.
    pub async fn write_record(&self, collection: &str, drafts: Vec<RecordDraft>) -> bool {
        let Some(collection) = parse_collection(collection) else {
            return false;
        };
        if self.limiter.is_rate_limited(WRITE_ACTION) {
            tracing::warn!(collection = %collection, "Write rejected: rate limited");
            return false;
        }
        let Some(draft) = drafts.into_iter().next() else {
            tracing::warn!(collection = %collection, "Write rejected: no record submitted");
            return false;
        };
        if !self.session_usable("write") {
            return false;
        }

        let record = build_record(collection, draft, now_millis());

        if collection == Collection::News && !record.link.is_empty() {
            let existing = match self
                .documents
                .query(collection, SortField::Date, Direction::Descending)
                .await
            {
                Ok(existing) => existing,
                Err(e) => {
                    tracing::error!(collection = %collection, error = %e, "Failed to check for duplicate link");
                    return false;
                }
            };
            let link = record.link.trim();
            if existing.iter().any(|r| r.link.trim() == link) {
                tracing::warn!(collection = %collection, link = %link, "Write rejected: link already exists");
                return false;
            }
        }

        match self.documents.insert(collection, &record).await {
            Ok(id) => {
                tracing::info!(collection = %collection, id = %id, "Stored record");
                true
            }
            Err(e) => {
                tracing::error!(collection = %collection, error = %e, "Failed to store record");
                false
            }
        }
    }

    /// Deletes one record. `false` without a store call if `collection` or
    /// `id` is invalid.
    pub async fn delete_record(&self, collection: &str, id: &str) -> bool {
        let Some(collection) = parse_collection(collection) else {
            return false;
        };
        if !policy::is_valid_document_id(id) {
            tracing::warn!(collection = %collection, id_len = id.len(), "Delete rejected: invalid document id");
            return false;
        }
        if !self.session_usable("delete") {
            return false;
        }

        match self.documents.delete(collection, id).await {
            Ok(()) => {
                tracing::info!(collection = %collection, id = %id, "Deleted record");
                true
            }
            Err(StoreError::NotFound(_)) => {
                tracing::warn!(collection = %collection, id = %id, "Delete failed: no such record");
                false
            }
            Err(e) => {
                tracing::error!(collection = %collection, id = %id, error = %e, "Failed to delete record");
                false
            }
        }
    }

    // ------------------------------------------------------------------------
    // Blobs
    // ------------------------------------------------------------------------

    /// Stores an upload under `uploads/<unix-ms>-<name>` and returns its
    /// public URL.
    pub async fn upload_file(&self, upload: FileUpload) -> Option<String> {
        if self.limiter.is_rate_limited(UPLOAD_ACTION) {
            tracing::warn!("Upload rejected: rate limited");
            return None;
        }

        let (name, bytes) = match upload {
            FileUpload::ByPath { path } => self.read_local_upload(&path).await?,
            FileUpload::ByBuffer { name, bytes } => {
                let name = checked_upload_name(&name)?;
                if bytes.len() as u64 > self.max_upload_bytes {
                    tracing::warn!(size = bytes.len(), max = self.max_upload_bytes, "Upload rejected: too large");
                    return None;
                }
                (name, bytes)
            }
        };

        if !self.session_usable("upload") {
            return None;
        }

        let key = format!("{}/{}-{}", UPLOAD_PREFIX, now_millis(), name);
        let size = bytes.len();
        if let Err(e) = self.blobs.put(&key, bytes).await {
            tracing::error!(key = %key, error = %e, "Failed to store upload");
            return None;
        }
        match self.blobs.public_url(&key).await {
            Ok(url) => {
                tracing::info!(key = %key, size, "Stored upload");
                Some(url)
            }
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Failed to resolve upload URL");
                None
            }
        }
    }

    /// Validates and reads a local file offered for upload.
    async fn read_local_upload(&self, path: &Path) -> Option<(String, Vec<u8>)> {
        let Some(path_str) = path.to_str() else {
            tracing::warn!(path = %path.display(), "Upload rejected: path is not UTF-8");
            return None;
        };
        if !policy::is_valid_file_path(path_str) {
            tracing::warn!(path = %path_str, "Upload rejected: path not allowed");
            return None;
        }

        let resolved = match &self.upload_root {
            Some(root) => match policy::confine_to_root(root, path) {
                Some(resolved) => resolved,
                None => {
                    tracing::warn!(path = %path_str, root = %root.display(), "Upload rejected: path escapes upload root");
                    return None;
                }
            },
            None => path.to_path_buf(),
        };

        let file_name = resolved
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let name = checked_upload_name(file_name)?;

        let meta = match tokio::fs::metadata(&resolved).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => {
                tracing::warn!(path = %path_str, "Upload rejected: not a regular file");
                return None;
            }
            Err(e) => {
                tracing::warn!(path = %path_str, error = %e, "Upload rejected: cannot stat file");
                return None;
            }
        };
        if meta.len() > self.max_upload_bytes {
            tracing::warn!(path = %path_str, size = meta.len(), max = self.max_upload_bytes, "Upload rejected: too large");
            return None;
        }

        match tokio::fs::read(&resolved).await {
            // The file may have grown between stat and read.
            Ok(bytes) if bytes.len() as u64 > self.max_upload_bytes => {
                tracing::warn!(path = %path_str, size = bytes.len(), "Upload rejected: too large");
                None
            }
            Ok(bytes) => Some((name, bytes)),
            Err(e) => {
                tracing::warn!(path = %path_str, error = %e, "Upload rejected: cannot read file");
                None
            }
        }
    }

    /// Public URL of an already stored blob.
    pub async fn resolve_public_url(&self, key: &str) -> Option<String> {
        if key.trim().is_empty() || key.contains("..") {
            tracing::warn!(key = %key, "Public URL rejected: invalid key");
            return None;
        }
        if !self.session_usable("public-url") {
            return None;
        }
        match self.blobs.public_url(key).await {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to resolve public URL");
                None
            }
        }
    }

    // ------------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------------

    /// Preview metadata for `url`; all fields empty on any failure.
    pub async fn fetch_page_metadata(&self, url: &str) -> PageMetadata {
        match metadata::fetch_page_metadata(&self.http, url, self.metadata_timeout).await {
            Ok(meta) => meta,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Metadata fetch failed");
                PageMetadata::default()
            }
        }
    }

    /// Opens `url` in the system browser if it is on the allow-list.
    pub fn resolve_external_open(&self, url: &str) -> bool {
        if !policy::is_allowed_external_url(url) {
            tracing::warn!(url = %url, "External open rejected: not allow-listed");
            return false;
        }
        match self.opener.open(url) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Failed to open external URL");
                false
            }
        }
    }
}

impl std::fmt::Debug for CatalogGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogGateway")
            .field("limiter", &self.limiter)
            .field("has_session_gate", &self.session.is_some())
            .field("upload_root", &self.upload_root)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("metadata_timeout", &self.metadata_timeout)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn parse_collection(name: &str) -> Option<Collection> {
    let parsed = Collection::from_name(name);
    if parsed.is_none() {
        tracing::warn!(collection = %name, "Rejected unknown collection");
    }
    parsed
}

/// Sanitized upload name if its extension is allowed.
fn checked_upload_name(raw: &str) -> Option<String> {
    let name = sanitize_file_name(raw);
    let allowed = policy::file_extension(&name)
        .is_some_and(|ext| policy::is_allowed_file_extension(&ext));
    if !allowed {
        tracing::warn!(name = %name, "Upload rejected: file type not allowed");
        return None;
    }
    Some(name)
}

/// Turns an untrusted draft into the record that gets stored.
///
/// Every text field is sanitized. Empty title becomes [`DEFAULT_TITLE`],
/// empty description and link become `""`, the link gains a scheme, a
/// missing or non-positive date becomes `now`. Fields that do not belong to
/// `collection` are dropped. Videos without a `youtubeId` get one derived
/// from the link.
pub(crate) fn build_record(collection: Collection, draft: RecordDraft, now: i64) -> ContentRecord {
    fn text(value: Option<String>) -> Option<String> {
        sanitize_opt(value.as_deref()).filter(|s| !s.is_empty())
    }

    let link = text(draft.link)
        .map(|link| normalize_link(&link))
        .unwrap_or_default();

    let mut record = ContentRecord {
        id: None,
        title: text(draft.title).unwrap_or_else(|| DEFAULT_TITLE.to_owned()),
        description: text(draft.description).unwrap_or_default(),
        link,
        date: draft.date.filter(|d| *d > 0).unwrap_or(now),
        youtube_id: None,
        local_path: None,
        checklist: None,
        cover_photo: None,
        thumbnail: None,
    };

    match collection {
        Collection::News => {
            record.thumbnail = text(draft.thumbnail);
        }
        Collection::Videos => {
            record.youtube_id = text(draft.youtube_id).or_else(|| youtube_video_id(&record.link));
            record.local_path = text(draft.local_path);
        }
        Collection::Articles => {
            record.checklist = text(draft.checklist);
            record.cover_photo = text(draft.cover_photo);
            record.local_path = text(draft.local_path);
        }
    }

    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const NOW: i64 = 1_700_000_000_000;

    #[test]
    fn test_build_record_fills_defaults() {
        let record = build_record(Collection::News, RecordDraft::default(), NOW);
        assert_eq!(
            record,
            ContentRecord {
                id: None,
                title: "Untitled".into(),
                description: String::new(),
                link: String::new(),
                date: NOW,
                youtube_id: None,
                local_path: None,
                checklist: None,
                cover_photo: None,
                thumbnail: None,
            }
        );
    }

    #[test]
    fn test_build_record_sanitizes_and_normalizes() {
        let draft = RecordDraft {
            title: Some("Tiger<script>alert(1)</script> reserve".into()),
            description: Some("see javascript:void(0)".into()),
            link: Some("example.com/a".into()),
            date: Some(42),
            ..RecordDraft::default()
        };
        let record = build_record(Collection::News, draft, NOW);
        assert_eq!(record.title, "Tiger reserve");
        assert_eq!(record.description, "see void(0)");
        assert_eq!(record.link, "https://example.com/a");
        assert_eq!(record.date, 42);
    }

    #[test]
    fn test_build_record_title_only_script_falls_back() {
        let draft = RecordDraft {
            title: Some("<script>x</script>".into()),
            date: Some(0),
            ..RecordDraft::default()
        };
        let record = build_record(Collection::Articles, draft, NOW);
        assert_eq!(record.title, DEFAULT_TITLE);
        assert_eq!(record.date, NOW);
    }

    #[test]
    fn test_build_record_strips_foreign_kind_fields() {
        let draft = RecordDraft {
            youtube_id: Some("abc".into()),
            checklist: Some("CITES I".into()),
            cover_photo: Some("https://x/c.png".into()),
            thumbnail: Some("https://x/t.png".into()),
            local_path: Some("https://x/doc.pdf".into()),
            ..RecordDraft::default()
        };

        let news = build_record(Collection::News, draft.clone(), NOW);
        assert_eq!(news.thumbnail.as_deref(), Some("https://x/t.png"));
        assert_eq!((news.youtube_id, news.checklist, news.local_path), (None, None, None));

        let article = build_record(Collection::Articles, draft.clone(), NOW);
        assert_eq!(article.checklist.as_deref(), Some("CITES I"));
        assert_eq!(article.local_path.as_deref(), Some("https://x/doc.pdf"));
        assert_eq!((article.youtube_id, article.thumbnail), (None, None));

        let video = build_record(Collection::Videos, draft, NOW);
        assert_eq!(video.youtube_id.as_deref(), Some("abc"));
        assert_eq!((video.checklist, video.cover_photo, video.thumbnail), (None, None, None));
    }

    #[test]
    fn test_build_record_derives_youtube_id() {
        let draft = RecordDraft {
            link: Some("youtu.be/dQw4w9WgXcQ?t=10".into()),
            ..RecordDraft::default()
        };
        let video = build_record(Collection::Videos, draft, NOW);
        assert_eq!(video.link, "https://youtu.be/dQw4w9WgXcQ?t=10");
        assert_eq!(video.youtube_id.as_deref(), Some("dQw4w9WgXcQ"));
    }

    #[test]
    fn test_checked_upload_name() {
        assert_eq!(checked_upload_name("Field report.PDF").as_deref(), Some("Field_report.PDF"));
        assert_eq!(checked_upload_name("../../cover.png").as_deref(), Some("cover.png"));
        assert_eq!(checked_upload_name("payload.exe"), None);
        assert_eq!(checked_upload_name("noext"), None);
    }
}
