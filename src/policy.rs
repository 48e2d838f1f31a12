//! Validation policy for everything the front-end hands the gateway.
//!
//! Every predicate here is total: malformed input returns `false`, never
//! panics and never errors. Callers log the rejection and fail closed.

use std::path::{Component, Path, PathBuf};

use crate::catalog::Collection;

/// Maximum length of a document id accepted by delete.
pub const MAX_DOCUMENT_ID_LEN: usize = 100;

/// Upload extensions accepted by the blob store, lower-case with leading dot.
pub const ALLOWED_FILE_EXTENSIONS: [&str; 8] = [
    ".pdf", ".doc", ".docx", ".jpg", ".jpeg", ".png", ".gif", ".webp",
];

/// Substrings that mark a path as sensitive (matched case-insensitively).
const SENSITIVE_PATH_MARKERS: [&str; 3] = ["env", "config", "secret"];

/// Hosts the operator may open in the system browser. Each may carry a
/// `www.` prefix and must be followed by a path.
const ALLOWED_EXTERNAL_HOSTS: [&str; 5] = [
    "youtube.com",
    "youtu.be",
    "reddit.com",
    "nyburs.com",
    "firebasestorage.googleapis.com",
];

/// True iff `name` is exactly one of `news`, `videos`, `articles`.
pub fn is_valid_collection_type(name: &str) -> bool {
    Collection::from_name(name).is_some()
}

/// True iff `id` is non-empty and at most [`MAX_DOCUMENT_ID_LEN`] bytes.
pub fn is_valid_document_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= MAX_DOCUMENT_ID_LEN
}

/// Deny-list check for a local file path offered for upload.
///
/// The path is normalized lexically first (`a/./b/../c` becomes `a/c`), then
/// rejected if it still contains `..`, contains `~`, or contains `env`,
/// `config` or `secret` in any case. Empty paths are rejected.
///
/// This is pattern matching, not a sandbox. Pair it with
/// [`confine_to_root`] when a fixed upload directory is known.
pub fn is_valid_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }

    let normalized = normalize_lexically(Path::new(path));
    let normalized = normalized.to_string_lossy();
    if normalized.contains("..") || normalized.contains('~') {
        return false;
    }

    let lower = normalized.to_lowercase();
    !SENSITIVE_PATH_MARKERS
        .iter()
        .any(|marker| lower.contains(marker))
}

/// True iff `ext` (with leading dot, any case) is on the upload allow-list.
pub fn is_allowed_file_extension(ext: &str) -> bool {
    let lower = ext.to_ascii_lowercase();
    ALLOWED_FILE_EXTENSIONS.contains(&lower.as_str())
}

/// Lower-cased extension of the last path component, with its leading dot.
///
/// Returns `None` for names without an extension, including dot-files such as
/// `.pdf`.
pub fn file_extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
}

/// True iff `url` is HTTPS and points at an allow-listed host.
///
/// ```
/// use wildcat::policy::is_allowed_external_url;
///
/// assert!(is_allowed_external_url("https://www.youtube.com/watch?v=abc"));
/// assert!(!is_allowed_external_url("http://www.youtube.com/watch?v=abc"));
/// assert!(!is_allowed_external_url("https://youtube.com.evil.net/"));
/// ```
pub fn is_allowed_external_url(url: &str) -> bool {
    let Some(rest) = url.strip_prefix("https://") else {
        return false;
    };
    let rest = rest.strip_prefix("www.").unwrap_or(rest);

    ALLOWED_EXTERNAL_HOSTS.iter().any(|host| {
        rest.strip_prefix(host)
            .is_some_and(|after| after.starts_with('/'))
    })
}

/// Resolves `path` against `root` and returns the canonical path only if it
/// stays inside `root`.
///
/// Relative paths are joined onto `root`; absolute paths are taken as-is.
/// Both sides are canonicalized, so symlinks cannot escape. Paths that do not
/// exist are rejected.
pub fn confine_to_root(root: &Path, path: &Path) -> Option<PathBuf> {
    let root = root.canonicalize().ok()?;
    let candidate = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };
    let resolved = candidate.canonicalize().ok()?;
    resolved.starts_with(&root).then_some(resolved)
}

/// Collapses `.` and `name/..` pairs without touching the filesystem.
///
/// A `..` that would climb above a root is dropped; one that would climb
/// above the start of a relative path is kept.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out.iter().map(|c| c.as_os_str()).collect()
}
