use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::UploaderError;

/// Configuration for the clip uploader
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Source, ledger and scratch locations
    pub paths: PathsConfig,

    /// Grouping and media tool settings
    pub processing: ProcessingConfig,

    /// Video metadata and API endpoints
    pub upload: UploadConfig,

    /// OAuth2 credential settings
    pub auth: AuthConfig,

    /// Retry and pacing settings
    pub retry: RetryConfig,

    /// External command used when the API declines an upload
    pub fallback: FallbackConfig,

    /// Log output settings
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory the recorder writes clips into
    pub video_dir: PathBuf,

    /// Append-only list of uploaded filenames
    pub ledger_file: PathBuf,

    /// Scratch directory for merged files and concat playlists
    pub temp_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub ffmpeg_path: String,

    pub ffprobe_path: String,

    /// Clips recorded before this hour count for the previous day
    pub early_morning_cutoff_hour: u32,

    /// Files above this size are uploaded with a warning
    pub max_file_size_gb: f64,

    /// Quality hint, passed through untouched
    pub video_quality: String,

    /// Remove sources (and merged output) once an upload is recorded
    pub delete_after_upload: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyStatus {
    Private,
    Public,
    Unlisted,
}

impl PrivacyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
            Self::Unlisted => "unlisted",
        }
    }
}

impl std::str::FromStr for PrivacyStatus {
    type Err = UploaderError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "private" => Ok(Self::Private),
            "public" => Ok(Self::Public),
            "unlisted" => Ok(Self::Unlisted),
            other => Err(UploaderError::Configuration(format!(
                "privacy must be private, public or unlisted, got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub default_privacy: PrivacyStatus,

    /// YouTube category id ("20" is Gaming)
    pub default_category: String,

    pub default_tags: Vec<String>,

    /// Title for merged day videos, `{date}` is substituted
    pub merged_title_template: String,

    /// Title for single clips, `{title}` and `{date}` are substituted
    pub individual_title_template: String,

    /// chrono format used for `{date}`
    pub date_format: String,

    /// Resumable upload chunk size in MiB
    pub chunk_size_mb: u64,

    /// Resumable upload endpoint
    pub upload_endpoint: String,

    /// Data API base URL
    pub api_base: String,

    /// Timeout for a single HTTP request (seconds)
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// OAuth client secrets downloaded from the Google Cloud console
    pub client_secrets: PathBuf,

    /// Persisted token record
    pub credentials: PathBuf,

    pub scopes: Vec<String>,

    /// Skip the browser flow and ask for a code on stdin
    pub force_manual: bool,

    /// Port for the local callback listener, 0 picks a free one
    pub callback_port: u16,

    /// How long the local callback listener waits for the browser
    pub callback_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts for API uploads, chunk transfers and the fallback command
    pub max_retries: u32,

    /// Base delay between attempts (seconds)
    pub retry_delay_seconds: u64,

    /// Upper bound for exponential backoff (seconds)
    pub max_retry_delay_seconds: u64,

    pub backoff_multiplier: f64,

    /// Pause between two day-groups (seconds)
    pub inter_group_delay_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub enabled: bool,

    /// Executable invoked as `<command> --title T [--description D] FILE`
    pub command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    pub level: String,

    /// Additional plain-text log file
    pub log_file: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            video_dir: PathBuf::from("./recordings"),
            ledger_file: PathBuf::from("uploaded.txt"),
            temp_dir: PathBuf::from("temp_merged"),
        }
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            early_morning_cutoff_hour: 4,
            max_file_size_gb: 2.0,
            video_quality: "720p".to_string(),
            delete_after_upload: true,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            default_privacy: PrivacyStatus::Private,
            default_category: "20".to_string(), // Gaming
            default_tags: vec!["gaming".to_string(), "arena".to_string(), "pvp".to_string()],
            merged_title_template: "Arenas {date}".to_string(),
            individual_title_template: "{title}".to_string(),
            date_format: "%d-%m-%Y".to_string(),
            chunk_size_mb: 8,
            upload_endpoint: "https://www.googleapis.com/upload/youtube/v3/videos".to_string(),
            api_base: "https://www.googleapis.com/youtube/v3".to_string(),
            request_timeout_seconds: 600,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_secrets: PathBuf::from("client_secrets.json"),
            credentials: PathBuf::from("youtube_credentials.json"),
            scopes: vec!["https://www.googleapis.com/auth/youtube.upload".to_string()],
            force_manual: false,
            callback_port: 0,
            callback_timeout_seconds: 300,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_seconds: 5,
            max_retry_delay_seconds: 60,
            backoff_multiplier: 2.0,
            inter_group_delay_seconds: 2,
        }
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: "youtube-upload".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "daily_clip_uploader=info,warn".to_string(),
            log_file: None,
        }
    }
}

/// Locations searched when no config file is given explicitly
fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from("clip-uploader.toml"),
        PathBuf::from("config/clip-uploader.toml"),
    ];
    if let Some(home) = std::env::var_os("HOME") {
        paths.push(PathBuf::from(home).join(".config/clip-uploader/config.toml"));
    }
    paths.push(PathBuf::from("/etc/clip-uploader/config.toml"));
    paths
}

impl Config {
    /// Load configuration from `path`, or the first default location that exists,
    /// then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::from_default_locations(),
        };

        config.apply_env();
        Ok(config)
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        tracing::info!("📄 Loaded configuration from: {}", path.display());
        Ok(config)
    }

    fn from_default_locations() -> Self {
        for path in default_config_paths() {
            if let Ok(config_str) = std::fs::read_to_string(&path) {
                match toml::from_str(&config_str) {
                    Ok(config) => {
                        tracing::info!("📄 Loaded configuration from: {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config file {}: {}", path.display(), e);
                    }
                }
            }
        }

        tracing::info!("No configuration file found, using defaults");
        Self::default()
    }

    /// Override settings from `CLIP_UPLOADER_*` environment variables
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("CLIP_UPLOADER_{}", name));

        if let Some(dir) = var("VIDEO_DIR") {
            self.paths.video_dir = PathBuf::from(dir);
        }
        if let Some(file) = var("LOG_FILE") {
            self.paths.ledger_file = PathBuf::from(file);
        }
        if let Some(dir) = var("TEMP_DIR") {
            self.paths.temp_dir = PathBuf::from(dir);
        }
        if let Some(path) = var("FFMPEG_PATH") {
            self.processing.ffmpeg_path = path;
        }
        if let Some(path) = var("FFPROBE_PATH") {
            self.processing.ffprobe_path = path;
        }
        if let Some(path) = var("CLIENT_SECRETS") {
            self.auth.client_secrets = PathBuf::from(path);
        }
        if let Some(path) = var("CREDENTIALS") {
            self.auth.credentials = PathBuf::from(path);
        }
        if let Some(hour) = var("EARLY_MORNING_CUTOFF") {
            self.processing.early_morning_cutoff_hour = hour.parse().unwrap_or(4);
        }
        if let Some(size) = var("MAX_FILE_SIZE_GB") {
            self.processing.max_file_size_gb = size.parse().unwrap_or(2.0);
        }
        if let Some(privacy) = var("DEFAULT_PRIVACY") {
            match privacy.parse() {
                Ok(privacy) => self.upload.default_privacy = privacy,
                Err(e) => tracing::warn!("Ignoring CLIP_UPLOADER_DEFAULT_PRIVACY: {}", e),
            }
        }
        if let Some(category) = var("DEFAULT_CATEGORY") {
            self.upload.default_category = category;
        }
        if let Some(tags) = var("DEFAULT_TAGS") {
            self.upload.default_tags = tags
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(retries) = var("MAX_RETRIES") {
            self.retry.max_retries = retries.parse().unwrap_or(3);
        }
        if let Some(delay) = var("RETRY_DELAY") {
            self.retry.retry_delay_seconds = delay.parse().unwrap_or(5);
        }
        if let Some(delete) = var("DELETE_AFTER_UPLOAD") {
            self.processing.delete_after_upload = is_truthy(&delete);
        }

        let force_manual = var("FORCE_MANUAL_OAUTH").or_else(|| lookup("FORCE_MANUAL_OAUTH"));
        if let Some(flag) = force_manual {
            self.auth.force_manual = is_truthy(&flag);
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        std::fs::write(path, config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Check invariants the pipeline relies on and create the temp directory
    pub fn validate(&self) -> std::result::Result<(), UploaderError> {
        let invalid = |msg: String| Err(UploaderError::Configuration(msg));

        if self.processing.early_morning_cutoff_hour > 23 {
            return invalid(format!(
                "early_morning_cutoff_hour must be between 0 and 23, got {}",
                self.processing.early_morning_cutoff_hour
            ));
        }

        if self.retry.max_retries == 0 {
            return invalid("max_retries must be greater than 0".to_string());
        }

        if self.upload.chunk_size_mb == 0 {
            return invalid("chunk_size_mb must be greater than 0".to_string());
        }

        if self.processing.max_file_size_gb <= 0.0 {
            return invalid("max_file_size_gb must be positive".to_string());
        }

        if self.upload.merged_title_template.trim().is_empty()
            || self.upload.individual_title_template.trim().is_empty()
        {
            return invalid("title templates must not be empty".to_string());
        }

        if !self.paths.video_dir.is_dir() {
            return invalid(format!(
                "Video directory does not exist: {}",
                self.paths.video_dir.display()
            ));
        }

        if let Err(e) = std::fs::create_dir_all(&self.paths.temp_dir) {
            return invalid(format!(
                "Cannot create temp directory {}: {}",
                self.paths.temp_dir.display(),
                e
            ));
        }

        tracing::info!("✅ Configuration validation passed");
        Ok(())
    }

    /// Resumable upload chunk size in bytes (always a multiple of 256 KiB)
    pub fn chunk_size_bytes(&self) -> u64 {
        self.upload.chunk_size_mb * 1024 * 1024
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Clip Uploader Configuration:\n\
            - Video Directory: {}\n\
            - Ledger File: {}\n\
            - Temp Directory: {}\n\
            - Early Morning Cutoff: {:02}:00\n\
            - Privacy: {}\n\
            - Tags: {}\n\
            - Max Retries: {}\n\
            - Delete After Upload: {}\n\
            - Fallback: {}",
            self.paths.video_dir.display(),
            self.paths.ledger_file.display(),
            self.paths.temp_dir.display(),
            self.processing.early_morning_cutoff_hour,
            self.upload.default_privacy.as_str(),
            self.upload.default_tags.join(", "),
            self.retry.max_retries,
            self.processing.delete_after_upload,
            if self.fallback.enabled { self.fallback.command.as_str() } else { "disabled" },
        )
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

/// Write a default config file, refusing to replace an existing one
pub fn create_default_config(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(anyhow!("Refusing to overwrite existing config: {}", path.display()));
    }
    Config::default().save(path)
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_video_dir(mut self, dir: PathBuf) -> Self {
        self.config.paths.video_dir = dir;
        self
    }

    pub fn with_ledger_file(mut self, file: PathBuf) -> Self {
        self.config.paths.ledger_file = file;
        self
    }

    pub fn with_temp_dir(mut self, dir: PathBuf) -> Self {
        self.config.paths.temp_dir = dir;
        self
    }

    pub fn with_cutoff_hour(mut self, hour: u32) -> Self {
        self.config.processing.early_morning_cutoff_hour = hour;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.config.retry.max_retries = retries;
        self
    }

    pub fn with_retry_delay(mut self, seconds: u64) -> Self {
        self.config.retry.retry_delay_seconds = seconds;
        self
    }

    pub fn with_inter_group_delay(mut self, seconds: u64) -> Self {
        self.config.retry.inter_group_delay_seconds = seconds;
        self
    }

    pub fn delete_after_upload(mut self, enable: bool) -> Self {
        self.config.processing.delete_after_upload = enable;
        self
    }

    pub fn with_credentials(mut self, client_secrets: PathBuf, credentials: PathBuf) -> Self {
        self.config.auth.client_secrets = client_secrets;
        self.config.auth.credentials = credentials;
        self
    }

    pub fn with_merged_title_template(mut self, template: &str) -> Self {
        self.config.upload.merged_title_template = template.to_string();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
