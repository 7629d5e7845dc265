//! Per-job descriptor files
//!
//! One `job<N>.json` per job, holding the job index and its per-step tweaks.
//! The worker receives exactly one of these plus the shared request archive.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::constants::files;
use crate::error::{SplitterError, SplitterResult};
use crate::models::JobTweaks;

/// `job<N>.json`
pub fn job_file_name(job_index: u64) -> String {
    format!("{}{job_index}{}", files::JOB_FILE_PREFIX, files::JOB_FILE_SUFFIX)
}

pub fn job_file_path(dir: &Path, job_index: u64) -> PathBuf {
    dir.join(job_file_name(job_index))
}

/// Write one file per job into `dir`, creating it if needed.
pub fn write_job_files(dir: &Path, jobs: &[JobTweaks]) -> SplitterResult<Vec<PathBuf>> {
    fs::create_dir_all(dir).map_err(|e| SplitterError::io(dir.display(), e))?;

    let mut written = Vec::with_capacity(jobs.len());
    for job in jobs {
        let path = job_file_path(dir, job.job_index);
        let body = serde_json::to_string_pretty(job)?;
        fs::write(&path, body).map_err(|e| SplitterError::io(path.display(), e))?;
        written.push(path);
    }

    debug!(dir = %dir.display(), count = written.len(), "Wrote job files");
    Ok(written)
}

pub fn read_job_file(path: &Path) -> SplitterResult<JobTweaks> {
    let body = fs::read_to_string(path).map_err(|e| SplitterError::io(path.display(), e))?;
    serde_json::from_str(&body)
        .map_err(|e| SplitterError::serialization(format!("job file {}", path.display()), e))
}

/// Job indices present in `dir`, sorted ascending.
pub fn discover_job_files(dir: &Path) -> SplitterResult<Vec<u64>> {
    let entries = fs::read_dir(dir).map_err(|e| SplitterError::io(dir.display(), e))?;

    let mut indices = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| SplitterError::io(dir.display(), e))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let index = name
            .strip_prefix(files::JOB_FILE_PREFIX)
            .and_then(|rest| rest.strip_suffix(files::JOB_FILE_SUFFIX))
            .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|digits| digits.parse::<u64>().ok());
        if let Some(index) = index {
            indices.push(index);
        }
    }
    indices.sort_unstable();
    Ok(indices)
}
