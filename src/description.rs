//! Timeline descriptions for merged day videos.

use std::path::PathBuf;
use tracing::warn;

use crate::filename::clip_description;
use crate::video::Merger;

/// Builds the chapter-style description of a merged video
pub struct DescriptionSynthesizer<'a> {
    merger: &'a dyn Merger,
}

impl<'a> DescriptionSynthesizer<'a> {
    pub fn new(merger: &'a dyn Merger) -> Self {
        Self { merger }
    }

    /// One `"<offset>  <clip description>"` line per clip, offsets cumulative.
    ///
    /// A clip whose duration cannot be read is left out entirely, and the
    /// offsets of the following clips do not include it.
    pub async fn build_description(&self, ordered_files: &[PathBuf]) -> String {
        let mut offset = 0.0_f64;
        let mut lines = Vec::with_capacity(ordered_files.len());

        for path in ordered_files {
            let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
                warn!("Skipping description line for {}: filename is not UTF-8", path.display());
                continue;
            };

            let duration = match self.merger.duration(path).await {
                Ok(duration) => duration,
                Err(e) => {
                    warn!("Skipping description line for {}: {}", filename, e);
                    continue;
                }
            };

            lines.push(format!("{}  {}", format_offset(offset), clip_description(filename)));
            offset += duration;
        }

        lines.join("\n")
    }
}

/// `MM:SS`, or `HH:MM:SS` from one hour on, rounded to the nearest second
pub fn format_offset(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}
