//! `~/.config/wildcat/config.toml`.
//!
//! Optional; a missing file yields `Config::default()`. Unknown keys are
//! accepted and logged as warnings.
use secrecy::SecretString;
use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::catalog::DEFAULT_MAX_UPLOAD_BYTES;
use crate::metadata::DEFAULT_FETCH_TIMEOUT;
use crate::ratelimit::DEFAULT_COOLDOWN;

/// Environment variable holding the identity API key. Wins over the file.
pub const API_KEY_ENV: &str = "WILDCAT_API_KEY";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: the file is over the size cap.
    #[error("Config too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Struct
// ============================================================================

/// Top-level gateway configuration.
///
/// Every key is optional; absent keys take the defaults below.
/// Relative paths are resolved against the config directory by the binary.
///
/// SEC-015: Custom Debug impl masks `identity_api_key`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite document store file. Default: `<config dir>/catalog.db`.
    pub database_path: Option<PathBuf>,

    /// Directory backing the blob store. Default: `<config dir>/blobs`.
    pub blob_root: Option<PathBuf>,

    /// Base URL public blob URLs are built on. Default: `file://` URLs.
    pub public_base_url: Option<String>,

    /// If set, path uploads must resolve inside this directory.
    pub upload_root: Option<PathBuf>,

    /// Cooldown between admitted writes (and between uploads), milliseconds.
    pub cooldown_ms: u64,

    /// Largest accepted upload in bytes.
    pub max_upload_bytes: u64,

    /// Time limit for a metadata fetch, body included.
    pub metadata_timeout_secs: u64,

    /// Identity Toolkit base URL for anonymous sign-in.
    pub identity_base_url: Option<String>,

    /// API key for anonymous sign-in. `WILDCAT_API_KEY` takes precedence.
    /// Without a key the gateway runs without a session gate.
    pub identity_api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            blob_root: None,
            public_base_url: None,
            upload_root: None,
            cooldown_ms: DEFAULT_COOLDOWN.as_millis() as u64,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            metadata_timeout_secs: DEFAULT_FETCH_TIMEOUT.as_secs(),
            identity_base_url: None,
            identity_api_key: None,
        }
    }
}

/// SEC-015: Mask identity_api_key in Debug output to prevent secret leakage.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("blob_root", &self.blob_root)
            .field("public_base_url", &self.public_base_url)
            .field("upload_root", &self.upload_root)
            .field("cooldown_ms", &self.cooldown_ms)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("metadata_timeout_secs", &self.metadata_timeout_secs)
            .field("identity_base_url", &self.identity_base_url)
            .field(
                "identity_api_key",
                &self.identity_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 9] = [
        "database_path",
        "blob_root",
        "public_base_url",
        "upload_root",
        "cooldown_ms",
        "max_upload_bytes",
        "metadata_timeout_secs",
        "identity_base_url",
        "identity_api_key",
    ];

    /// Reads and parses the config file at `path`.
    ///
    /// A missing or blank file yields the defaults. Files over 1 MB are
    /// refused without being read in full.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let file = match std::fs::File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file absent, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        // SEC-014: read at most one byte past the cap.
        let mut bytes = Vec::new();
        file.take(Self::MAX_FILE_SIZE + 1).read_to_end(&mut bytes)?;
        if bytes.len() as u64 > Self::MAX_FILE_SIZE {
            return Err(ConfigError::TooLarge(format!(
                "{} exceeds {} bytes",
                path.display(),
                Self::MAX_FILE_SIZE
            )));
        }

        let content = String::from_utf8(bytes)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Self::parse(&content)
    }

    /// Parses TOML text, warning about unknown keys.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        tracing::info!(cooldown_ms = config.cooldown_ms, "Loaded configuration");
        Ok(config)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata_timeout_secs)
    }

    /// Identity API key from `WILDCAT_API_KEY`, falling back to the file.
    /// Blank values count as absent.
    pub fn identity_api_key(&self) -> Option<SecretString> {
        let from_env = std::env::var(API_KEY_ENV).ok();
        Self::pick_api_key(from_env, self.identity_api_key.clone())
    }

    fn pick_api_key(from_env: Option<String>, from_file: Option<String>) -> Option<SecretString> {
        from_env
            .filter(|k| !k.trim().is_empty())
            .or(from_file.filter(|k| !k.trim().is_empty()))
            .map(SecretString::from)
    }
}

// ============================================================================
// Tests
// ============================================================================
