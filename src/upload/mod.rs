//! Upload seams: the primary API transport and the command-line fallback

pub mod fallback;
pub mod youtube;

pub use fallback::CommandFallback;
pub use youtube::YouTubeTransport;

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::config::{PrivacyStatus, UploadConfig};
use crate::error::UploaderError;

/// Everything needed for one upload attempt
#[derive(Debug, Clone, PartialEq)]
pub struct UploadJob {
    pub file_path: PathBuf,
    pub title: String,
    pub description: String,
    pub privacy: PrivacyStatus,
    pub category: String,
    pub tags: Vec<String>,
}

impl UploadJob {
    /// Job with the configured privacy, category and tags
    pub fn new(
        file_path: PathBuf,
        title: impl Into<String>,
        description: impl Into<String>,
        config: &UploadConfig,
    ) -> Self {
        Self {
            file_path,
            title: title.into(),
            description: description.into(),
            privacy: config.default_privacy,
            category: config.default_category.clone(),
            tags: config.default_tags.clone(),
        }
    }
}

/// Result of handing a job to the primary transport
#[derive(Debug)]
pub enum UploadOutcome {
    /// Video id assigned by the platform
    Uploaded(String),
    /// Gave up without a hard error; the fallback should be tried
    Declined,
    Failed(UploaderError),
}

impl UploadOutcome {
    pub fn video_id(&self) -> Option<&str> {
        match self {
            Self::Uploaded(id) => Some(id),
            _ => None,
        }
    }
}

/// Primary upload path
#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn upload(&self, job: &UploadJob) -> UploadOutcome;
}

/// Secondary upload path, used once per group when the transport does not deliver
#[async_trait]
pub trait CliFallback: Send + Sync {
    async fn upload(&self, file: &Path, title: &str, description: &str) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_uses_configured_metadata() {
        let config = UploadConfig::default();
        let job = UploadJob::new(PathBuf::from("/v/a.mp4"), "Alice arena win", "", &config);

        assert_eq!(job.privacy, PrivacyStatus::Private);
        assert_eq!(job.category, "20");
        assert_eq!(job.tags, vec!["gaming", "arena", "pvp"]);
    }

    #[test]
    fn test_outcome_video_id() {
        assert_eq!(UploadOutcome::Uploaded("abc".to_string()).video_id(), Some("abc"));
        assert_eq!(UploadOutcome::Declined.video_id(), None);
    }
}
