use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::archive::client::{DEFAULT_METADATA_URL, DEFAULT_S3_URL};
use crate::archive::metadata::{DEFAULT_COLLECTION, DEFAULT_SCANNER};
use crate::archive::IaCredentials;
use crate::command::{DEFAULT_DETAILS_URL, DEFAULT_MAX_ATTACHMENTS, DEFAULT_MAX_ATTACHMENT_BYTES};
use crate::discord::MAX_FILE_OPTIONS;

const CONFIG_FILE_NAME: &str = "config.toml";
const DEFAULT_ACTIVITY: &str = "github.com/Andres9890/ia-uploading-Discord-Bot";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "ia-upload-bot", "ia-upload-bot")
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    pub token: String,
    /// "Playing …" presence; empty disables it.
    pub activity: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            activity: DEFAULT_ACTIVITY.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub access_key: String,
    pub secret_key: String,
    pub collection: String,
    pub scanner: String,
    pub metadata_url: String,
    pub s3_url: String,
    pub details_url: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            access_key: String::new(),
            secret_key: String::new(),
            collection: DEFAULT_COLLECTION.to_string(),
            scanner: DEFAULT_SCANNER.to_string(),
            metadata_url: DEFAULT_METADATA_URL.to_string(),
            s3_url: DEFAULT_S3_URL.to_string(),
            details_url: DEFAULT_DETAILS_URL.to_string(),
        }
    }
}

impl ArchiveConfig {
    pub fn credentials(&self) -> Option<IaCredentials> {
        if self.access_key.is_empty() || self.secret_key.is_empty() {
            return None;
        }
        Some(IaCredentials {
            access_key: self.access_key.clone(),
            secret_key: self.secret_key.clone(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub max_attachment_bytes: u64,
    pub max_attachments: usize,
    pub staging_dir: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        let staging_dir = project_dirs()
            .map(|dirs| dirs.cache_dir().join("staging"))
            .unwrap_or_else(|| std::env::temp_dir().join("ia-upload-bot"));
        Self {
            max_attachment_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
            max_attachments: DEFAULT_MAX_ATTACHMENTS,
            staging_dir: staging_dir.to_string_lossy().into_owned(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub discord: DiscordConfig,
    pub archive: ArchiveConfig,
    pub upload: UploadConfig,
}

impl Config {
    /// Default config file location, if the platform has one.
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Defaults, then the TOML file, then environment variables.
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(default) => Self::load_from_file(&default)?,
                None => {
                    debug!("no config file found, using defaults");
                    Self::default()
                }
            },
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("Failed to parse config")
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(token) = env_var("DISCORD_BOT_TOKEN") {
            self.discord.token = token;
        }
        if let Some(key) = env_var("IA_ACCESS_KEY") {
            self.archive.access_key = key;
        }
        if let Some(key) = env_var("IA_SECRET_KEY") {
            self.archive.secret_key = key;
        }
        if let Some(dir) = env_var("IA_UPLOAD_STAGING_DIR") {
            self.upload.staging_dir = dir;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.discord.token.trim().is_empty() {
            bail!("Missing Discord bot token (set DISCORD_BOT_TOKEN or [discord].token)");
        }
        if self.upload.max_attachments == 0 {
            bail!("[upload].max_attachments must be at least 1");
        }
        if self.upload.max_attachments > MAX_FILE_OPTIONS {
            bail!(
                "[upload].max_attachments is {} but a command can carry at most {MAX_FILE_OPTIONS} files",
                self.upload.max_attachments
            );
        }
        if self.archive.credentials().is_none() {
            warn!("Internet Archive credentials are not configured; uploads will fail");
        }
        Ok(())
    }

    /// Human-readable summary with secrets redacted.
    pub fn summary(&self) -> String {
        let redact = |s: &str| if s.is_empty() { "<unset>" } else { "<set>" };
        format!(
            "discord.token = {}\n\
             discord.activity = {:?}\n\
             archive.access_key = {}\n\
             archive.secret_key = {}\n\
             archive.collection = {}\n\
             archive.scanner = {}\n\
             archive.metadata_url = {}\n\
             archive.s3_url = {}\n\
             archive.details_url = {}\n\
             upload.max_attachment_bytes = {}\n\
             upload.max_attachments = {}\n\
             upload.staging_dir = {}",
            redact(&self.discord.token),
            self.discord.activity,
            redact(&self.archive.access_key),
            redact(&self.archive.secret_key),
            self.archive.collection,
            self.archive.scanner,
            self.archive.metadata_url,
            self.archive.s3_url,
            self.archive.details_url,
            self.upload.max_attachment_bytes,
            self.upload.max_attachments,
            self.upload.staging_dir,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_archive_conventions() {
        let config = Config::default();
        assert_eq!(config.archive.collection, "opensource_media");
        assert_eq!(config.archive.scanner, "Discord Bot");
        assert_eq!(config.upload.max_attachment_bytes, 100 * 1024 * 1024);
        assert_eq!(config.upload.max_attachments, 10);
        assert_eq!(config.archive.details_url, "https://archive.org/details");
        assert!(config.archive.credentials().is_none());
    }

    #[test]
    fn toml_overrides_selected_fields() {
        let config = Config::from_toml(
            r#"
            [discord]
            token = "abc"

            [archive]
            collection = "test_collection"
            access_key = "ak"
            secret_key = "sk"

            [upload]
            max_attachment_bytes = 10485760
            "#,
        )
        .unwrap();

        assert_eq!(config.discord.token, "abc");
        assert_eq!(config.discord.activity, DEFAULT_ACTIVITY);
        assert_eq!(config.archive.collection, "test_collection");
        assert_eq!(config.archive.scanner, "Discord Bot");
        assert_eq!(config.upload.max_attachment_bytes, 10 * 1024 * 1024);
        assert_eq!(config.upload.max_attachments, 10);
        let creds = config.archive.credentials().unwrap();
        assert_eq!(creds.access_key, "ak");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_token_fails_validation() {
        let err = Config::default().validate().unwrap_err();
        assert!(err.to_string().contains("DISCORD_BOT_TOKEN"));
    }

    #[test]
    fn attachment_limit_must_fit_the_command() {
        let mut config = Config::default();
        config.discord.token = "abc".into();

        config.upload.max_attachments = MAX_FILE_OPTIONS;
        assert!(config.validate().is_ok());

        config.upload.max_attachments = 30;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("at most 24 files"));

        config.upload.max_attachments = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[upload]\nmax_attachments = 3\n").unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.upload.max_attachments, 3);

        assert!(Config::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = Config::from_toml("[upload]\nstaging_dir = \"/from/file\"\n").unwrap();
        std::env::set_var("IA_UPLOAD_STAGING_DIR", "/from/env");
        config.apply_env_overrides();
        std::env::remove_var("IA_UPLOAD_STAGING_DIR");
        assert_eq!(config.upload.staging_dir, "/from/env");
    }

    #[test]
    fn summary_redacts_secrets() {
        let mut config = Config::default();
        config.discord.token = "super-secret".into();
        let summary = config.summary();
        assert!(!summary.contains("super-secret"));
        assert!(summary.contains("discord.token = <set>"));
        assert!(summary.contains("archive.secret_key = <unset>"));
    }
}
