use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn, Instrument};

use crate::context::AppContext;
use crate::description::DescriptionSynthesizer;
use crate::error::{Result, UploaderError};
use crate::filename::parse_title;
use crate::grouping::{group_pending, DayGroups};
use crate::ledger::UploadedLedger;
use crate::upload::{CliFallback, UploadJob, UploadOutcome, UploadTransport};
use crate::video::{list_directory, Merger};

/// Counters reported at the end of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Clips looked at, across all groups
    pub total_processed: usize,
    /// Clips that ended up online
    pub successful_uploads: usize,
    pub failed_uploads: usize,
    /// Groups uploaded as a single clip
    pub single_videos: usize,
    /// Groups uploaded as one merged video
    pub merged_videos: usize,
    pub total_time: Duration,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Processed: {} | Uploaded: {} | Failed: {} | Single: {} | Merged: {} | Time: {:.1}s",
            self.total_processed,
            self.successful_uploads,
            self.failed_uploads,
            self.single_videos,
            self.merged_videos,
            self.total_time.as_secs_f64()
        )
    }
}

/// Drives one pass over the recordings directory, one day-group at a time
pub struct UploadOrchestrator {
    ctx: AppContext,
    merger: Arc<dyn Merger>,
    transport: Arc<dyn UploadTransport>,
    fallback: Arc<dyn CliFallback>,
    ledger: UploadedLedger,
}

impl UploadOrchestrator {
    pub fn new(
        ctx: AppContext,
        merger: Arc<dyn Merger>,
        transport: Arc<dyn UploadTransport>,
        fallback: Arc<dyn CliFallback>,
        ledger: UploadedLedger,
    ) -> Self {
        Self {
            ctx,
            merger,
            transport,
            fallback,
            ledger,
        }
    }

    pub fn ledger(&self) -> &UploadedLedger {
        &self.ledger
    }

    /// Day-groups that a run would upload right now
    pub fn pending(&self) -> Result<DayGroups> {
        let config = &self.ctx.config;
        let files = list_directory(&config.paths.video_dir)?;
        Ok(group_pending(
            &files,
            self.ledger.entries(),
            config.processing.early_morning_cutoff_hour,
        ))
    }

    /// Upload every pending group; only a directory listing failure aborts the run
    pub async fn run(&mut self) -> Result<RunSummary> {
        let span = self.ctx.span().clone();
        self.run_groups().instrument(span).await
    }

    async fn run_groups(&mut self) -> Result<RunSummary> {
        let start_time = Instant::now();
        let mut summary = RunSummary::default();

        info!("🚀 Scanning {}", self.ctx.config.paths.video_dir.display());
        let groups = self.pending()?;

        if groups.is_empty() {
            info!("No new videos to upload");
            summary.total_time = start_time.elapsed();
            return Ok(summary);
        }

        let group_count = groups.len();
        let pause = Duration::from_secs(self.ctx.config.retry.inter_group_delay_seconds);

        for (index, (date, files)) in groups.into_iter().enumerate() {
            let clips = files.len();
            info!("📅 Processing {} ({} clips) [{}/{}]", date, clips, index + 1, group_count);
            summary.total_processed += clips;

            match self.process_group(date, &files).await {
                Ok(true) => {
                    summary.successful_uploads += clips;
                    if clips == 1 {
                        summary.single_videos += 1;
                    } else {
                        summary.merged_videos += 1;
                    }
                }
                Ok(false) => {
                    error!("❌ Upload failed for {}", date);
                    summary.failed_uploads += clips;
                }
                Err(e) => {
                    error!("❌ Group {} aborted: {}", date, e);
                    summary.failed_uploads += clips;
                }
            }

            if index + 1 < group_count && !pause.is_zero() {
                debug!("Pausing {:?} before the next group", pause);
                tokio::time::sleep(pause).await;
            }
        }

        summary.total_time = start_time.elapsed();
        info!("🎉 Run complete: {}", summary);
        Ok(summary)
    }

    async fn process_group(&mut self, date: NaiveDate, files: &[PathBuf]) -> Result<bool> {
        match files {
            [] => Ok(true),
            [single] => self.upload_single(date, single).await,
            _ => self.upload_merged(date, files).await,
        }
    }

    async fn upload_single(&mut self, date: NaiveDate, file: &Path) -> Result<bool> {
        let config = Arc::clone(&self.ctx.config);
        let clip_title = parse_title(&file_name(file)?)?;
        let title = render_title(
            &config.upload.individual_title_template,
            &clip_title,
            &date.format(&config.upload.date_format).to_string(),
        );

        let job = UploadJob::new(file.to_path_buf(), title, "", &config.upload);
        if !self.deliver(&job).await {
            return Ok(false);
        }

        self.record_success(&[file.to_path_buf()], None).await;
        Ok(true)
    }

    async fn upload_merged(&mut self, date: NaiveDate, files: &[PathBuf]) -> Result<bool> {
        let config = Arc::clone(&self.ctx.config);
        let date_label = date.format(&config.upload.date_format).to_string();
        let output = config.paths.temp_dir.join(format!("{}_merged.mp4", date_label));

        self.merger.merge(files, &output, true).await?;

        let title = render_title(&config.upload.merged_title_template, "", &date_label);
        let description = DescriptionSynthesizer::new(self.merger.as_ref())
            .build_description(files)
            .await;

        let job = UploadJob::new(output.clone(), title, description, &config.upload);
        if !self.deliver(&job).await {
            return Ok(false);
        }

        self.record_success(files, Some(&output)).await;
        Ok(true)
    }

    /// Primary transport, then exactly one fallback attempt if it did not deliver
    async fn deliver(&self, job: &UploadJob) -> bool {
        match self.transport.upload(job).await {
            UploadOutcome::Uploaded(id) => {
                info!("✅ Uploaded '{}' as {}", job.title, id);
                return true;
            }
            UploadOutcome::Declined => {
                warn!("API upload declined for '{}', trying fallback", job.title);
            }
            UploadOutcome::Failed(e @ UploaderError::Authentication(_)) => {
                error!("🔑 {}", e);
                warn!("Trying fallback for '{}'", job.title);
            }
            UploadOutcome::Failed(e) => {
                warn!("API upload failed for '{}': {}, trying fallback", job.title, e);
            }
        }

        self.fallback.upload(&job.file_path, &job.title, &job.description).await
    }

    /// Ledger first; sources are removed only once their names are durable
    async fn record_success(&mut self, sources: &[PathBuf], merged: Option<&Path>) {
        let names: Vec<String> = sources
            .iter()
            .filter_map(|path| path.file_name().and_then(|n| n.to_str()).map(str::to_string))
            .collect();

        if let Some(merged) = merged {
            remove_file(merged).await;
        }

        if let Err(e) = self.ledger.mark_uploaded(&names).await {
            error!("{}; keeping source files", e);
            return;
        }

        if self.ctx.config.processing.delete_after_upload {
            for source in sources {
                remove_file(source).await;
            }
        }
    }
}

async fn remove_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("🗑️ Removed {}", path.display()),
        Err(e) => warn!(
            "{}",
            UploaderError::FileOperation(format!("could not remove {}: {}", path.display(), e))
        ),
    }
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| UploaderError::InvalidFilename(path.display().to_string()))
}

/// Substitute `{title}` and `{date}` in a title template
pub fn render_title(template: &str, title: &str, date: &str) -> String {
    template.replace("{title}", title).replace("{date}", date)
}
