use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ============================================================================
// Collections
// ============================================================================

/// One of the three fixed content categories.
///
/// The wire names (`news`, `videos`, `articles`) are a compatibility contract
/// with the rendering front-end and the persisted data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    News,
    Videos,
    Articles,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Collection::News, Collection::Videos, Collection::Articles];

    /// Parses an exact wire name. Case variants and padding are rejected.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "news" => Some(Self::News),
            "videos" => Some(Self::Videos),
            "articles" => Some(Self::Articles),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::News => "news",
            Self::Videos => "videos",
            Self::Articles => "articles",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Records
// ============================================================================

/// A persisted catalog item.
///
/// Field names serialize in camelCase exactly as the rendering UI reads them.
/// Kind-specific fields are `None` for collections they do not belong to:
///
/// | collection | fields                                  |
/// |------------|-----------------------------------------|
/// | `news`     | `thumbnail`                             |
/// | `videos`   | `youtubeId`, `localPath`                |
/// | `articles` | `checklist`, `coverPhoto`, `localPath`  |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRecord {
    /// Assigned by the document store; `None` before creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "desc")]
    pub description: String,
    #[serde(default)]
    pub link: String,
    /// Creation time, Unix milliseconds.
    #[serde(default)]
    pub date: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youtube_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checklist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_photo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

/// Untrusted write input from the front-end. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordDraft {
    pub title: Option<String>,
    #[serde(alias = "desc")]
    pub description: Option<String>,
    pub link: Option<String>,
    pub date: Option<i64>,
    pub youtube_id: Option<String>,
    pub local_path: Option<String>,
    pub checklist: Option<String>,
    pub cover_photo: Option<String>,
    pub thumbnail: Option<String>,
}

// ============================================================================
// Uploads and metadata
// ============================================================================

/// A file offered for upload: either a path on the local disk or an
/// in-memory payload picked in the front-end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileUpload {
    ByPath { path: PathBuf },
    ByBuffer { name: String, bytes: Vec<u8> },
}

/// Social-preview metadata scraped from a page.
///
/// All fields are empty strings when the fetch or parse failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    pub title: String,
    pub description: String,
    pub preview_image: String,
}

impl PageMetadata {
    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.description.is_empty() && self.preview_image.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_collection_round_trips_wire_name() {
        for c in Collection::ALL {
            assert_eq!(Collection::from_name(c.as_str()), Some(c));
            assert_eq!(c.to_string(), c.as_str());
        }
        assert_eq!(Collection::from_name("Articles"), None);
    }

    #[test]
    fn test_record_serializes_camel_case_contract() {
        let record = ContentRecord {
            id: None,
            title: "Tiger reserve".into(),
            description: "Census".into(),
            link: "https://example.com/a".into(),
            date: 1_700_000_000_000,
            youtube_id: Some("abc".into()),
            local_path: None,
            checklist: None,
            cover_photo: None,
            thumbnail: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "title": "Tiger reserve",
                "description": "Census",
                "link": "https://example.com/a",
                "date": 1_700_000_000_000_i64,
                "youtubeId": "abc",
            })
        );
    }

    #[test]
    fn test_record_accepts_legacy_desc_field() {
        let record: ContentRecord = serde_json::from_str(
            r#"{"title":"Old","desc":"legacy","link":"","date":5,"coverPhoto":"https://x/y.png"}"#,
        )
        .unwrap();
        assert_eq!(record.description, "legacy");
        assert_eq!(record.cover_photo.as_deref(), Some("https://x/y.png"));
    }

    #[test]
    fn test_draft_defaults_missing_fields() {
        let draft: RecordDraft = serde_json::from_str(r#"{"title":"Only title"}"#).unwrap();
        assert_eq!(
            draft,
            RecordDraft {
                title: Some("Only title".into()),
                ..RecordDraft::default()
            }
        );
    }
}
