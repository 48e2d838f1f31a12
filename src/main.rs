use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use wildcat::auth::{AnonymousSignIn, SessionManager};
use wildcat::catalog::{self, CatalogGateway, FileUpload, RecordDraft};
use wildcat::config::Config;
use wildcat::metadata;
use wildcat::ratelimit::CooldownTracker;
use wildcat::store::{LocalBlobStore, SqliteDocumentStore};

/// Get the config directory path (~/.config/wildcat/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("wildcat"))
}

/// Creates the config directory if needed and restricts it to the owner.
fn ensure_config_dir(config_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("Failed to create {}", config_dir.display()))?;

    // SEC-007: owner-only; the directory holds the database and blobs.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        if let Err(e) = std::fs::set_permissions(config_dir, perms) {
            tracing::warn!(path = %config_dir.display(), error = %e, "Could not restrict config directory");
        }
    }

    Ok(())
}

/// Relative config paths are taken relative to the config directory.
fn resolve_in(config_dir: &Path, configured: Option<&Path>, default: &str) -> PathBuf {
    match configured {
        Some(path) if path.is_absolute() => path.to_path_buf(),
        Some(path) => config_dir.join(path),
        None => config_dir.join(default),
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "wildcat",
    about = "Content catalog gateway for a wildlife-media browser"
)]
struct Args {
    /// Config file (default: ~/.config/wildcat/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List a collection, newest first
    Read { collection: String },
    /// List a collection; for news, also remove stored duplicates
    Load { collection: String },
    /// Store one record
    Write {
        collection: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        link: Option<String>,
        /// Creation time, Unix milliseconds (default: now)
        #[arg(long)]
        date: Option<i64>,
        #[arg(long)]
        thumbnail: Option<String>,
        #[arg(long)]
        youtube_id: Option<String>,
        #[arg(long)]
        local_path: Option<String>,
        #[arg(long)]
        checklist: Option<String>,
        #[arg(long)]
        cover_photo: Option<String>,
    },
    /// Delete a record by id
    Delete { collection: String, id: String },
    /// Upload a local file and print its public URL
    Upload { path: PathBuf },
    /// Fetch title, description and preview image of a page
    Metadata { url: String },
    /// Open an allow-listed URL in the system browser
    Open { url: String },
    /// Print the public URL of a stored blob
    PublicUrl { key: String },
    /// Print a species data file grouped by family
    Species {
        file: PathBuf,
        /// Only this family
        #[arg(long)]
        family: Option<String>,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to encode output")?;
    println!("{json}");
    Ok(())
}

/// Prints `value` and maps "nothing happened" to a failing exit code.
fn finish<T: Serialize>(value: &T, succeeded: bool) -> Result<ExitCode> {
    print_json(value)?;
    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn build_gateway(config: &Config, config_dir: &Path) -> Result<CatalogGateway> {
    let db_path = resolve_in(config_dir, config.database_path.as_deref(), "catalog.db");
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let documents = SqliteDocumentStore::open(db_path_str)
        .await
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

    let blob_root = resolve_in(config_dir, config.blob_root.as_deref(), "blobs");
    let base_url = config
        .public_base_url
        .as_deref()
        .map(url::Url::parse)
        .transpose()
        .context("Invalid public_base_url in config")?;
    let blobs = LocalBlobStore::open(&blob_root, base_url)
        .await
        .with_context(|| format!("Failed to open blob store at {}", blob_root.display()))?;

    let http = metadata::build_http_client().context("Failed to build HTTP client")?;
    let limiter = Arc::new(CooldownTracker::new(config.cooldown()));

    let mut gateway = CatalogGateway::new(Arc::new(documents), Arc::new(blobs), http.clone())
        .with_limiter(limiter)
        .with_max_upload_bytes(config.max_upload_bytes)
        .with_metadata_timeout(config.metadata_timeout());

    if let Some(root) = &config.upload_root {
        gateway = gateway.with_upload_root(root.clone());
    }

    if let Some(api_key) = config.identity_api_key() {
        let provider = AnonymousSignIn::new(http, config.identity_base_url.as_deref(), api_key)
            .context("Invalid identity provider settings")?;
        let sessions = SessionManager::new(Arc::new(provider));
        if !sessions.sign_in().await {
            tracing::warn!("Anonymous sign-in failed; store operations will be refused");
        }
        gateway = gateway.with_session_gate(sessions);
    } else {
        tracing::debug!("No identity API key configured, running without a session gate");
    }

    Ok(gateway)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Logs go to stderr; stdout carries the JSON result.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    // Species data is a plain file; no stores needed.
    if let Command::Species { file, family } = &args.command {
        let profiles = catalog::load_species(file)
            .await
            .with_context(|| format!("Failed to load species from {}", file.display()))?;
        let mut families = catalog::group_by_family(profiles);
        if let Some(family) = family {
            families.retain(|name, _| name == family);
        }
        let found = !families.is_empty();
        return finish(&families, found);
    }

    let config_dir = get_config_dir()?;
    ensure_config_dir(&config_dir)?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let gateway = build_gateway(&config, &config_dir).await?;

    match args.command {
        Command::Read { collection } => {
            print_json(&gateway.read_collection(&collection).await)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Load { collection } => {
            print_json(&gateway.load_collection(&collection).await)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Write {
            collection,
            title,
            description,
            link,
            date,
            thumbnail,
            youtube_id,
            local_path,
            checklist,
            cover_photo,
        } => {
            let draft = RecordDraft {
                title,
                description,
                link,
                date,
                youtube_id,
                local_path,
                checklist,
                cover_photo,
                thumbnail,
            };
            let stored = gateway.write_record(&collection, vec![draft]).await;
            finish(&stored, stored)
        }
        Command::Delete { collection, id } => {
            let deleted = gateway.delete_record(&collection, &id).await;
            finish(&deleted, deleted)
        }
        Command::Upload { path } => {
            let url = gateway.upload_file(FileUpload::ByPath { path }).await;
            finish(&url, url.is_some())
        }
        Command::Metadata { url } => {
            let meta = gateway.fetch_page_metadata(&url).await;
            let found = !meta.is_empty();
            finish(&meta, found)
        }
        Command::Open { url } => {
            let opened = gateway.resolve_external_open(&url);
            finish(&opened, opened)
        }
        Command::PublicUrl { key } => {
            let url = gateway.resolve_public_url(&key).await;
            finish(&url, url.is_some())
        }
        Command::Species { .. } => Ok(ExitCode::SUCCESS),
    }
}
