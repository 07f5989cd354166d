use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::context::AppContext;
use crate::error::{Result, UploaderError};

/// Concatenates clips and reports their length
#[async_trait]
pub trait Merger: Send + Sync {
    /// Join `files` in order into `output` without re-encoding
    async fn merge(&self, files: &[PathBuf], output: &Path, overwrite: bool) -> Result<()>;

    /// Clip length in seconds
    async fn duration(&self, file: &Path) -> Result<f64>;
}

/// Video information extracted from file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    pub path: PathBuf,
    pub filename: String,
    pub duration: Duration,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub format: String,
    pub file_size: u64,
}

/// Merger backed by the ffmpeg and ffprobe command line tools
#[derive(Debug, Clone)]
pub struct FfmpegMerger {
    ffmpeg: String,
    ffprobe: String,
    /// Where concat playlists are written
    temp_dir: PathBuf,
}

impl FfmpegMerger {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>, temp_dir: PathBuf) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            temp_dir,
        }
    }

    pub fn from_context(ctx: &AppContext) -> Self {
        let config = &ctx.config;
        Self::new(
            config.processing.ffmpeg_path.clone(),
            config.processing.ffprobe_path.clone(),
            config.paths.temp_dir.clone(),
        )
    }

    /// Run `-version` on both tools; a missing tool is a configuration problem
    pub async fn check_available(&self) -> Result<()> {
        for tool in [&self.ffmpeg, &self.ffprobe] {
            let output = Command::new(tool).arg("-version").output().await.map_err(|e| {
                UploaderError::Configuration(format!("{} is not available: {}", tool, e))
            })?;

            if !output.status.success() {
                return Err(UploaderError::Configuration(format!(
                    "{} -version exited with {}",
                    tool, output.status
                )));
            }
        }

        debug!("ffmpeg and ffprobe are available");
        Ok(())
    }

    /// Extract video information using ffprobe JSON output
    pub async fn probe(&self, video_path: &Path) -> Result<VideoInfo> {
        let output = self
            .run(
                &self.ffprobe,
                Command::new(&self.ffprobe)
                    .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
                    .arg(video_path),
            )
            .await?;

        let ffprobe_data: serde_json::Value = serde_json::from_slice(&output.stdout)?;
        let format = &ffprobe_data["format"];
        let video_stream = ffprobe_data["streams"]
            .as_array()
            .and_then(|streams| streams.iter().find(|s| s["codec_type"] == "video"))
            .ok_or_else(|| {
                UploaderError::VideoProcessing(format!(
                    "No video stream found in {}",
                    video_path.display()
                ))
            })?;

        let duration_seconds: f64 = format["duration"]
            .as_str()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.0);

        let file_size = tokio::fs::metadata(video_path).await?.len();

        let video_info = VideoInfo {
            path: video_path.to_path_buf(),
            filename: video_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            duration: Duration::from_secs_f64(duration_seconds.max(0.0)),
            width: video_stream["width"].as_u64().unwrap_or(0) as u32,
            height: video_stream["height"].as_u64().unwrap_or(0) as u32,
            fps: video_stream["r_frame_rate"]
                .as_str()
                .and_then(parse_frame_rate)
                .unwrap_or(0.0),
            format: format["format_name"].as_str().unwrap_or("unknown").to_string(),
            file_size,
        };

        info!(
            "📹 Analyzed video: {} ({}x{}, {:.1}fps, {:.1}s)",
            video_info.filename,
            video_info.width,
            video_info.height,
            video_info.fps,
            video_info.duration.as_secs_f64()
        );

        Ok(video_info)
    }

    async fn run(&self, tool: &str, command: &mut Command) -> Result<Output> {
        let output = command
            .output()
            .await
            .map_err(|e| UploaderError::FFmpeg(format!("failed to run {}: {}", tool, e)))?;

        if !output.status.success() {
            return Err(UploaderError::FFmpeg(format!(
                "{} exited with {}: {}",
                tool,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(output)
    }
}

#[async_trait]
impl Merger for FfmpegMerger {
    async fn merge(&self, files: &[PathBuf], output: &Path, overwrite: bool) -> Result<()> {
        if files.is_empty() {
            return Err(UploaderError::VideoProcessing("No input files to merge".to_string()));
        }

        if let Some(missing) = files.iter().find(|f| !f.exists()) {
            return Err(UploaderError::VideoProcessing(format!(
                "Input file not found: {}",
                missing.display()
            )));
        }

        if output.exists() && !overwrite {
            info!("Output already exists, keeping it: {}", output.display());
            return Ok(());
        }

        tokio::fs::create_dir_all(&self.temp_dir).await?;

        // removed when `playlist` drops, on every return path below
        let playlist = write_playlist(&self.temp_dir, concat_playlist(files).await).await?;

        info!("🎞️ Merging {} clips into {}", files.len(), output.display());

        let mut command = Command::new(&self.ffmpeg);
        command
            .args(["-f", "concat", "-safe", "0", "-i"])
            .arg(playlist.path())
            .args(["-c", "copy"]);
        if overwrite {
            command.arg("-y");
        }
        command.arg(output);

        self.run(&self.ffmpeg, &mut command).await?;

        info!("✅ Merged video written: {}", output.display());
        Ok(())
    }

    async fn duration(&self, file: &Path) -> Result<f64> {
        let output = self
            .run(
                &self.ffprobe,
                Command::new(&self.ffprobe)
                    .args([
                        "-v",
                        "error",
                        "-select_streams",
                        "v:0",
                        "-show_entries",
                        "format=duration",
                        "-of",
                        "default=noprint_wrappers=1:nokey=1",
                    ])
                    .arg(file),
            )
            .await?;

        let text = String::from_utf8_lossy(&output.stdout);
        text.trim().parse::<f64>().map_err(|_| {
            UploaderError::FFmpeg(format!(
                "unexpected duration '{}' for {}",
                text.trim(),
                file.display()
            ))
        })
    }
}

/// Render an ffmpeg concat playlist for `files`
pub async fn concat_playlist(files: &[PathBuf]) -> String {
    let mut playlist = String::new();
    for file in files {
        let absolute = tokio::fs::canonicalize(file)
            .await
            .unwrap_or_else(|_| file.clone());
        playlist.push_str(&format!(
            "file '{}'\n",
            escape_concat_path(&absolute.to_string_lossy())
        ));
    }
    playlist
}

/// Write `contents` to a fresh temporary file in `dir`, off the async runtime
async fn write_playlist(dir: &Path, contents: String) -> Result<NamedTempFile> {
    let dir = dir.to_path_buf();

    tokio::task::spawn_blocking(move || -> std::io::Result<NamedTempFile> {
        let mut playlist = tempfile::Builder::new()
            .prefix("concat_")
            .suffix(".txt")
            .tempfile_in(&dir)?;
        playlist.write_all(contents.as_bytes())?;
        playlist.flush()?;
        Ok(playlist)
    })
    .await
    .map_err(|e| UploaderError::VideoProcessing(format!("Playlist writer failed: {}", e)))?
    .map_err(UploaderError::from)
}

/// Forward slashes only, and single quotes closed, escaped and reopened
fn escape_concat_path(path: &str) -> String {
    path.replace('\\', "/").replace('\'', "'\\''")
}

fn parse_frame_rate(rate: &str) -> Option<f64> {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            (den != 0.0).then(|| num / den)
        }
        None => rate.parse().ok(),
    }
}

/// Regular files directly inside `dir`, in filename order
pub fn list_directory(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            UploaderError::FileOperation(format!("Failed to list {}: {}", dir.display(), e))
        })?;

        if entry.file_type().is_file() {
            files.push(entry.into_path());
        } else {
            debug!("Ignoring non-file entry {}", entry.path().display());
        }
    }

    if files.is_empty() {
        warn!("No files found in {}", dir.display());
    }

    Ok(files)
}
