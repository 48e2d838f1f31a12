//! Utility functions shared by the gateway layers.
//!
//! - **URL handling**: SSRF validation before outbound fetches, link
//!   normalization, YouTube id extraction
//! - **Text processing**: free-text sanitization, upload file-name
//!   sanitization, control-character stripping for scraped text
//!
//! # Examples
//!
//! ```
//! use wildcat::util::{normalize_link, sanitize};
//!
//! assert_eq!(normalize_link("example.com/a"), "https://example.com/a");
//! assert_eq!(sanitize("ok<script>x</script>"), "ok");
//! ```

mod text;
mod links;

pub use self::text::{
    sanitize, sanitize_file_name, sanitize_opt, strip_control_chars, MAX_TEXT_CHARS,
};
pub use self::links::{normalize_link, validate_url, youtube_video_id, UrlValidationError};

/// Current wall-clock time as Unix milliseconds, the unit of `ContentRecord::date`.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
