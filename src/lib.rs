/// Daily Clip Uploader
///
/// Batches recorded game clips by day, merges each day into one video and
/// uploads it to YouTube, keeping an append-only ledger so reruns never
/// upload the same clip twice.

pub mod auth;
pub mod config;
pub mod context;
pub mod description;
pub mod error;
pub mod filename;
pub mod grouping;
pub mod ledger;
pub mod logging;
pub mod orchestrator;
pub mod retry;
pub mod upload;
pub mod video;

// Re-export main types for easy access
pub use crate::auth::{AccessTokenProvider, CredentialManager, CredentialRecord};
pub use crate::config::{Config, ConfigBuilder};
pub use crate::context::AppContext;
pub use crate::description::DescriptionSynthesizer;
pub use crate::error::{Result, UploaderError};
pub use crate::filename::ParsedFilename;
pub use crate::grouping::{group_pending, DayGroups};
pub use crate::ledger::UploadedLedger;
pub use crate::orchestrator::{RunSummary, UploadOrchestrator};
pub use crate::retry::RetryPolicy;
pub use crate::upload::{
    CliFallback, CommandFallback, UploadJob, UploadOutcome, UploadTransport, YouTubeTransport,
};
pub use crate::video::{FfmpegMerger, Merger, VideoInfo};
