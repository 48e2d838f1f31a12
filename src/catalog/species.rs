use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Family assigned to profiles that do not name one.
pub const DEFAULT_FAMILY: &str = "Other";

/// Directory holding bundled species images, relative to the data file.
const IMAGE_DIR: &str = "Image";

/// Species data files are shipped with the app; anything larger is corrupt.
const MAX_SPECIES_FILE_SIZE: u64 = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum SpeciesError {
    #[error("Failed to read species file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid species JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Species file too large: {0} bytes")]
    TooLarge(u64),
}

/// IUCN-style status labels the catalog colours by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConservationStatus {
    CriticallyEndangered,
    Endangered,
    Vulnerable,
    NearThreatened,
    Abundant,
    /// Any other or missing label; rendered as "safe".
    Unlisted,
}

impl ConservationStatus {
    pub fn from_label(label: &str) -> Self {
        match label {
            "Critically Endangered" => Self::CriticallyEndangered,
            "Endangered" => Self::Endangered,
            "Vulnerable" => Self::Vulnerable,
            "Near Threatened" => Self::NearThreatened,
            "Abundant" => Self::Abundant,
            _ => Self::Unlisted,
        }
    }

    /// Style class used by the front-end. Near Threatened shares the
    /// vulnerable styling.
    pub fn css_class(self) -> &'static str {
        match self {
            Self::CriticallyEndangered => "status-critically-endangered",
            Self::Endangered => "status-endangered",
            Self::Vulnerable | Self::NearThreatened => "status-vulnerable",
            Self::Abundant => "status-abundant",
            Self::Unlisted => "status-safe",
        }
    }
}

/// One entry of the static species data file.
///
/// Only the fields the catalog reasons about are typed; everything else
/// (population, diet, overview, ...) rides along in `extra` untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeciesProfile {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SpeciesProfile {
    /// Short name when present and non-blank, otherwise the full name.
    pub fn display_name(&self) -> &str {
        self.short_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(self.name.as_str())
    }

    pub fn family_or_default(&self) -> &str {
        self.family
            .as_deref()
            .filter(|f| !f.is_empty())
            .unwrap_or(DEFAULT_FAMILY)
    }

    pub fn conservation_status(&self) -> ConservationStatus {
        self.status
            .as_deref()
            .map(ConservationStatus::from_label)
            .unwrap_or(ConservationStatus::Unlisted)
    }

    /// Image source: remote URLs as-is, bare file names under `Image/`.
    pub fn image_path(&self) -> Option<String> {
        let image = self.image.as_deref().filter(|i| !i.is_empty())?;
        if image.starts_with("http") {
            Some(image.to_owned())
        } else {
            Some(format!("{IMAGE_DIR}/{image}"))
        }
    }
}

/// Groups profiles by family, keeping file order within each family.
pub fn group_by_family(profiles: Vec<SpeciesProfile>) -> BTreeMap<String, Vec<SpeciesProfile>> {
    let mut families: BTreeMap<String, Vec<SpeciesProfile>> = BTreeMap::new();
    for profile in profiles {
        families
            .entry(profile.family_or_default().to_owned())
            .or_default()
            .push(profile);
    }
    families
}

/// Parses a species data file: a JSON array of profiles.
pub fn parse_species(json: &str) -> Result<Vec<SpeciesProfile>, SpeciesError> {
    Ok(serde_json::from_str(json)?)
}

/// Loads and parses the species data file at `path`.
pub async fn load_species(path: &Path) -> Result<Vec<SpeciesProfile>, SpeciesError> {
    let meta = tokio::fs::metadata(path).await?;
    if meta.len() > MAX_SPECIES_FILE_SIZE {
        return Err(SpeciesError::TooLarge(meta.len()));
    }
    let content = tokio::fs::read_to_string(path).await?;
    let profiles = parse_species(&content)?;
    tracing::debug!(path = %path.display(), count = profiles.len(), "Loaded species profiles");
    Ok(profiles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DATA: &str = r#"[
        {"name": "Bengal Tiger", "shortName": "Tiger", "family": "Felidae",
         "image": "tiger.jpg", "status": "Endangered", "population": "3,167"},
        {"name": "Snow Leopard", "family": "Felidae",
         "image": "https://cdn.example.com/snow.jpg", "status": "Vulnerable"},
        {"name": "Indian Pangolin", "status": "Near Threatened"},
        {"name": "House Sparrow", "family": "", "status": "Least Concern"}
    ]"#;

    #[test]
    fn test_parse_keeps_unknown_fields() {
        let profiles = parse_species(DATA).unwrap();
        assert_eq!(profiles.len(), 4);
        assert_eq!(
            profiles[0].extra.get("population"),
            Some(&serde_json::json!("3,167"))
        );
    }

    #[test]
    fn test_group_by_family_defaults_to_other() {
        let families = group_by_family(parse_species(DATA).unwrap());
        let keys: Vec<&str> = families.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Felidae", "Other"]);
        let felids: Vec<&str> = families["Felidae"].iter().map(|p| p.name.as_str()).collect();
        assert_eq!(felids, vec!["Bengal Tiger", "Snow Leopard"]);
        assert_eq!(families["Other"].len(), 2);
    }

    #[test]
    fn test_image_path() {
        let profiles = parse_species(DATA).unwrap();
        assert_eq!(profiles[0].image_path().as_deref(), Some("Image/tiger.jpg"));
        assert_eq!(
            profiles[1].image_path().as_deref(),
            Some("https://cdn.example.com/snow.jpg")
        );
        assert_eq!(profiles[2].image_path(), None);
    }

    #[test]
    fn test_status_and_display_name() {
        let profiles = parse_species(DATA).unwrap();
        assert_eq!(profiles[0].display_name(), "Tiger");
        assert_eq!(profiles[1].display_name(), "Snow Leopard");
        assert_eq!(
            profiles[2].conservation_status().css_class(),
            "status-vulnerable"
        );
        assert_eq!(
            profiles[3].conservation_status(),
            ConservationStatus::Unlisted
        );
    }

    #[tokio::test]
    async fn test_load_species_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, DATA).unwrap();
        assert_eq!(load_species(&path).await.unwrap().len(), 4);

        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            load_species(&path).await,
            Err(SpeciesError::Parse(_))
        ));
    }
}
