use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{Result, UploaderError};

/// Append-only record of filenames that have been uploaded.
///
/// The file holds one filename per line. It is read once at startup and
/// only ever appended to afterwards; a name present here is never offered
/// for upload again, whether or not the source file still exists.
#[derive(Debug, Clone)]
pub struct UploadedLedger {
    /// Ledger file location
    path: PathBuf,

    /// Names loaded from disk plus everything marked during this run
    entries: HashSet<String>,
}

impl UploadedLedger {
    /// Load the ledger; a missing or unreadable file yields an empty ledger
    pub async fn load(path: PathBuf) -> Self {
        let entries = match fs::read_to_string(&path).await {
            Ok(content) => content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No ledger at {}, starting empty", path.display());
                HashSet::new()
            }
            Err(e) => {
                warn!("Failed to load uploaded files ledger {}: {}", path.display(), e);
                HashSet::new()
            }
        };

        info!("📒 Loaded {} previously uploaded files", entries.len());
        Self { path, entries }
    }

    /// Ledger file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.entries.contains(filename)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read-only view used by the grouping stage
    pub fn entries(&self) -> &HashSet<String> {
        &self.entries
    }

    /// Append filenames and sync them to disk before returning.
    ///
    /// Callers delete source files only after this succeeds.
    pub async fn mark_uploaded(&mut self, filenames: &[String]) -> Result<()> {
        let mut buffer = String::new();
        for name in filenames {
            buffer.push_str(name);
            buffer.push('\n');
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| ledger_error(&self.path, e))?;

        file.write_all(buffer.as_bytes())
            .await
            .map_err(|e| ledger_error(&self.path, e))?;
        file.sync_data().await.map_err(|e| ledger_error(&self.path, e))?;

        self.entries.extend(filenames.iter().cloned());
        debug!("Marked {} files as uploaded", filenames.len());
        Ok(())
    }
}

fn ledger_error(path: &Path, e: std::io::Error) -> UploaderError {
    UploaderError::FileOperation(format!(
        "failed to update uploaded files ledger {}: {}",
        path.display(),
        e
    ))
}
