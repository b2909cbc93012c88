use std::{
    fs::{self, File},
    io::{self, Cursor},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use failed_log_core::util::join_within;

/// Number of trailing log lines kept per failed step.
pub const LATEST_LINES: usize = 30;

/// Strip the leading timestamp from each line and keep the last [`LATEST_LINES`] lines.
///
/// Every line of a step log starts with a timestamp such as
/// `2023-12-05T07:08:20.6282273Z `, which is noise in a chat message.
pub fn format_log(log: &str) -> String {
    let lines = log
        .split('\n')
        .map(|line| line.split_once(' ').map_or("", |(_, rest)| rest))
        .collect::<Vec<_>>();
    let start = lines.len().saturating_sub(LATEST_LINES);
    lines[start..].join("\n")
}

#[derive(Debug, thiserror::Error)]
pub enum LogLookupError {
    #[error(
        "Invalid path: log for step {step_number} of job '{job_dir}' resolves outside {}",
        .root.display()
    )]
    OutsideRoot { root: PathBuf, job_dir: String, step_number: u64 },
    #[error("Failed to read log file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Raw log text of individual steps, keyed the way the run log archive is laid out.
pub trait LogSource: Sync {
    fn read_step_log(
        &self,
        job_dir: &str,
        step_number: u64,
        step_name: &str,
    ) -> Result<String, LogLookupError>;
}

/// An extracted run log archive: `{root}/{job_dir}/{step_number}_{step_name}.txt`.
#[derive(Debug, Clone)]
pub struct LogDir {
    root: PathBuf,
}

impl LogDir {
    pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

    pub fn step_log_path(
        &self,
        job_dir: &str,
        step_number: u64,
        step_name: &str,
    ) -> Result<PathBuf, LogLookupError> {
        let relative = Path::new(job_dir).join(format!("{step_number}_{step_name}.txt"));
        join_within(&self.root, relative).ok_or_else(|| LogLookupError::OutsideRoot {
            root: self.root.clone(),
            job_dir: job_dir.to_string(),
            step_number,
        })
    }
}

impl LogSource for LogDir {
    fn read_step_log(
        &self,
        job_dir: &str,
        step_number: u64,
        step_name: &str,
    ) -> Result<String, LogLookupError> {
        let path = self.step_log_path(job_dir, step_number, step_name)?;
        let data = fs::read(&path).map_err(|source| LogLookupError::Read { path, source })?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }
}

/// Extract a run log archive into `dir`, overwriting existing files.
/// Returns the number of files written.
pub fn extract_log_archive(data: &[u8], dir: &Path) -> Result<usize> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data)).context("Failed to open log archive")?;
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    let mut written = 0;
    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let Some(path) = file.enclosed_name() else {
            tracing::warn!("Skipping log archive entry with unsafe path {}", file.name());
            continue;
        };
        let out_path = dir.join(path);
        if file.is_dir() {
            fs::create_dir_all(&out_path)
                .with_context(|| format!("Failed to create {}", out_path.display()))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut out = File::create(&out_path)
            .with_context(|| format!("Failed to create {}", out_path.display()))?;
        io::copy(&mut file, &mut out)
            .with_context(|| format!("Failed to write {}", out_path.display()))?;
        written += 1;
    }
    tracing::debug!("Extracted {} log files into {}", written, dir.display());
    Ok(written)
}
