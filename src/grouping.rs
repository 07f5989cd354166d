use chrono::{NaiveDate, NaiveDateTime};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::filename::{ParsedFilename, VIDEO_EXTENSION};

/// Pending clips keyed by effective date, each list in recording order
pub type DayGroups = BTreeMap<NaiveDate, Vec<PathBuf>>;

/// Partition candidate files into per-day groups.
///
/// Files without the video extension or already in `already_uploaded` are
/// ignored. Malformed filenames are logged and skipped; they never abort
/// the batch. Within a day, files are ordered by their full timestamp, and
/// equal timestamps keep discovery order.
pub fn group_pending(
    all_files: &[PathBuf],
    already_uploaded: &HashSet<String>,
    cutoff_hour: u32,
) -> DayGroups {
    let mut buckets: BTreeMap<NaiveDate, Vec<(NaiveDateTime, PathBuf)>> = BTreeMap::new();

    for path in all_files {
        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
            warn!("Skipping non UTF-8 filename: {}", path.display());
            continue;
        };

        if !filename.ends_with(VIDEO_EXTENSION) || already_uploaded.contains(filename) {
            continue;
        }

        match ParsedFilename::parse(filename) {
            Ok(parsed) => {
                buckets
                    .entry(parsed.effective_date(cutoff_hour))
                    .or_default()
                    .push((parsed.timestamp, path.clone()));
            }
            Err(e) => {
                warn!("Skipping {}: {}", filename, e);
            }
        }
    }

    let groups: DayGroups = buckets
        .into_iter()
        .map(|(date, mut files)| {
            // sort_by_key is stable, so identical timestamps keep discovery order
            files.sort_by_key(|(timestamp, _)| *timestamp);
            debug!("{}: {} clips", date, files.len());
            (date, files.into_iter().map(|(_, path)| path).collect())
        })
        .collect();

    info!(
        "🔍 Found {} pending videos across {} dates",
        groups.values().map(Vec::len).sum::<usize>(),
        groups.len()
    );

    groups
}
