//! Session and log store: snapshot, activity log, archive bundle.
//!
//! Three artifacts live in the output directory:
//! - `session.json`: complete run snapshot, overwritten on every update.
//!   The CLI equivalent of the original in-memory gallery state; it is what
//!   lets `regenerate` pick a run back up later.
//! - `generation_log.csv`: append-only activity log, one row per successful
//!   render or regeneration. Rows are appended only after the image write
//!   succeeded, so an image without a log row can survive a crash but never
//!   the reverse.
//! - `postforge_output.zip`: bundle of the directory for bulk download.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::orchestrator::BatchRun;

pub const SESSION_FILE: &str = "session.json";
pub const LOG_FILE: &str = "generation_log.csv";
pub const ARCHIVE_FILE: &str = "postforge_output.zip";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no saved session at {0}; run `generate` first")]
    Missing(PathBuf),
    #[error("session store I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("session snapshot is not readable: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("activity log write failed: {0}")]
    Log(#[from] csv::Error),
    #[error("archive write failed: {0}")]
    Archive(#[from] zip::result::ZipError),
}

/// One activity-log row. Field order is the CSV column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub date: String,
    pub brief_snippet: String,
    pub post_id: u32,
    pub concept: String,
    /// 1-based option number; regenerations carry a `_v2` suffix.
    pub option_num: String,
    pub prompt: String,
    pub file_path: String,
}

impl LogEntry {
    pub fn new(
        brief_snippet: &str,
        post_id: u32,
        concept: &str,
        option_num: impl Into<String>,
        prompt: &str,
        file_path: &Path,
    ) -> Self {
        Self {
            date: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            brief_snippet: brief_snippet.to_string(),
            post_id,
            concept: concept.to_string(),
            option_num: option_num.into(),
            prompt: prompt.to_string(),
            file_path: file_path.display().to_string(),
        }
    }
}

/// Filesystem-backed store rooted at the output directory.
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Overwrite the session snapshot with the current run state.
    pub fn save_snapshot(&self, run: &BatchRun) -> Result<(), SessionError> {
        fs::create_dir_all(&self.root)?;
        let path = self.root.join(SESSION_FILE);
        let json = serde_json::to_string_pretty(run)?;
        fs::write(&path, json)?;
        debug!(path = %path.display(), "session snapshot saved");
        Ok(())
    }

    /// Load the snapshot saved by a previous `generate` run.
    pub fn load_snapshot(&self) -> Result<BatchRun, SessionError> {
        let path = self.root.join(SESSION_FILE);
        if !path.exists() {
            return Err(SessionError::Missing(path));
        }
        let raw = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Remove the snapshot. Images and the activity log are left alone.
    pub fn clear_snapshot(&self) -> Result<(), SessionError> {
        let path = self.root.join(SESSION_FILE);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Append rows to the activity log, writing the header only when the
    /// file is created.
    pub fn append_log(&self, entries: &[LogEntry]) -> Result<(), SessionError> {
        if entries.is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.root)?;
        let path = self.root.join(LOG_FILE);
        let new_file = !path.exists();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(new_file)
            .from_writer(file);
        for entry in entries {
            writer.serialize(entry)?;
        }
        writer.flush()?;
        info!(rows = entries.len(), path = %path.display(), "activity log appended");
        Ok(())
    }

    /// Bundle every regular file in the output directory into the archive.
    /// The archive itself is skipped so re-bundling stays idempotent.
    pub fn bundle_archive(&self) -> Result<PathBuf, SessionError> {
        let archive_path = self.root.join(ARCHIVE_FILE);
        let file = File::create(&archive_path)?;
        let mut writer = ZipWriter::new(file);
        let options = SimpleFileOptions::default();

        let mut paths: Vec<PathBuf> = fs::read_dir(&self.root)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| path.file_name() != Some(std::ffi::OsStr::new(ARCHIVE_FILE)))
            .collect();
        paths.sort();

        for path in &paths {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            writer.start_file(name, options)?;
            let mut src = File::open(path)?;
            io::copy(&mut src, &mut writer)?;
        }
        writer.finish()?;
        info!(files = paths.len(), path = %archive_path.display(), "archive bundled");
        Ok(archive_path)
    }
}
