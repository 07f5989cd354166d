use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tracing::{error, info, warn};

use super::CliFallback;
use crate::context::AppContext;
use crate::retry::RetryPolicy;

/// Runs an external uploader as `<command> --title T [--description D] FILE`
#[derive(Debug, Clone)]
pub struct CommandFallback {
    command: String,
    enabled: bool,
    retry: RetryPolicy,
}

impl CommandFallback {
    pub fn new(command: impl Into<String>, enabled: bool, retry: RetryPolicy) -> Self {
        Self {
            command: command.into(),
            enabled,
            retry,
        }
    }

    /// Fixed delay between attempts, same attempt budget as the API transport
    pub fn from_context(ctx: &AppContext) -> Self {
        let config = &ctx.config;
        Self::new(
            config.fallback.command.clone(),
            config.fallback.enabled,
            RetryPolicy::from_config(&config.retry).fixed(),
        )
    }
}

#[async_trait]
impl CliFallback for CommandFallback {
    async fn upload(&self, file: &Path, title: &str, description: &str) -> bool {
        if !self.enabled {
            warn!("Fallback uploader disabled, not retrying {}", file.display());
            return false;
        }

        for attempt in 0..self.retry.max_attempts() {
            info!(
                "📤 Fallback upload via {} (attempt {}/{}): {}",
                self.command,
                attempt + 1,
                self.retry.max_attempts(),
                title
            );

            let mut command = Command::new(&self.command);
            command.arg("--title").arg(title);
            if !description.is_empty() {
                command.arg("--description").arg(description);
            }
            command.arg(file);

            match command.output().await {
                Ok(output) if output.status.success() => {
                    info!("✅ Fallback upload succeeded: {}", file.display());
                    return true;
                }
                Ok(output) => {
                    warn!(
                        "{} exited with {}: {}",
                        self.command,
                        output.status,
                        String::from_utf8_lossy(&output.stderr).trim()
                    );
                }
                Err(e) => {
                    error!("Failed to run fallback uploader {}: {}", self.command, e);
                    return false;
                }
            }

            if self.retry.should_retry(attempt) {
                self.retry.wait(attempt).await;
            }
        }

        error!("❌ Fallback upload failed for {}", file.display());
        false
    }
}
