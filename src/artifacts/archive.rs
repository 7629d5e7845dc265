//! Shared request archive
//!
//! `request_psets.tar.gz` bundles the request document, the splitting policy
//! and the base step configurations. Every job of a request ships the same
//! archive, so a worker can rebuild the request from it alone.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::constants::files;
use crate::error::{SplitterError, SplitterResult};
use crate::models::{Request, SplittingPolicy};

/// Steps whose base configuration is absent from a PSets directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PsetCoverage {
    pub missing_steps: Vec<String>,
}

/// Check that `psets_dir` holds a `<K>_<StepName>` artifact for every step.
pub fn check_base_configs(request: &Request, psets_dir: &Path) -> SplitterResult<PsetCoverage> {
    let mut names = Vec::new();
    for entry in fs::read_dir(psets_dir).map_err(|e| SplitterError::io(psets_dir.display(), e))? {
        let entry = entry.map_err(|e| SplitterError::io(psets_dir.display(), e))?;
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }

    let missing_steps = request
        .steps
        .iter()
        .zip(1u32..)
        .map(|(step, n)| step.base_config_name(n))
        .filter(|base| {
            !names
                .iter()
                .any(|name| name == base || name.starts_with(&format!("{base}.")))
        })
        .collect();
    Ok(PsetCoverage { missing_steps })
}

/// Resolve a step's base configuration inside an unpacked `PSets/` directory.
pub fn locate_base_config(psets_dir: &Path, base_name: &str) -> Option<PathBuf> {
    let exact = psets_dir.join(base_name);
    if exact.is_file() {
        return Some(exact);
    }
    let prefix = format!("{base_name}.");
    let mut candidates: Vec<PathBuf> = fs::read_dir(psets_dir)
        .ok()?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&prefix))
        })
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

/// Write `request_psets.tar.gz` into `output_dir`.
pub fn write_request_archive(
    request: &Request,
    request_path: &Path,
    splitting_path: &Path,
    psets_dir: &Path,
    output_dir: &Path,
) -> SplitterResult<PathBuf> {
    if !psets_dir.is_dir() {
        return Err(SplitterError::io(
            psets_dir.display(),
            std::io::Error::new(std::io::ErrorKind::NotFound, "PSets directory not found"),
        ));
    }

    let coverage = check_base_configs(request, psets_dir)?;
    for missing in &coverage.missing_steps {
        warn!(base_config = %missing, psets_dir = %psets_dir.display(), "Base configuration missing from PSets directory");
    }

    fs::create_dir_all(output_dir).map_err(|e| SplitterError::io(output_dir.display(), e))?;
    let archive_path = output_dir.join(files::REQUEST_ARCHIVE);
    let file = File::create(&archive_path).map_err(|e| SplitterError::io(archive_path.display(), e))?;

    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder
        .append_path_with_name(request_path, files::ARCHIVED_REQUEST)
        .map_err(|e| SplitterError::io(request_path.display(), e))?;
    builder
        .append_path_with_name(splitting_path, files::ARCHIVED_SPLITTING)
        .map_err(|e| SplitterError::io(splitting_path.display(), e))?;
    builder
        .append_dir_all(files::ARCHIVED_PSETS_DIR, psets_dir)
        .map_err(|e| SplitterError::io(psets_dir.display(), e))?;
    builder
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .map_err(|e| SplitterError::io(archive_path.display(), e))?;

    info!(archive = %archive_path.display(), "Request archive written");
    Ok(archive_path)
}

/// Unpack a request archive into `dest`; returns the unpacked `PSets/` directory.
pub fn unpack_request_archive(archive_path: &Path, dest: &Path) -> SplitterResult<PathBuf> {
    let file = File::open(archive_path).map_err(|e| SplitterError::io(archive_path.display(), e))?;
    fs::create_dir_all(dest).map_err(|e| SplitterError::io(dest.display(), e))?;
    tar::Archive::new(GzDecoder::new(file))
        .unpack(dest)
        .map_err(|e| SplitterError::io(archive_path.display(), e))?;

    debug!(archive = %archive_path.display(), dest = %dest.display(), "Request archive unpacked");
    Ok(dest.join(files::ARCHIVED_PSETS_DIR))
}

/// Load a request, taking the splitting policy from `splitting_path` or else
/// from a `splitting.json` beside the request document.
///
/// With neither present the default policy applies, which needs
/// `Step1.EventsPerJob` in the request itself.
pub fn load_request_files(request_path: &Path, splitting_path: Option<&Path>) -> SplitterResult<Request> {
    let beside = request_path
        .parent()
        .map(|dir| dir.join(files::ARCHIVED_SPLITTING))
        .filter(|p| p.is_file());
    match splitting_path.map(Path::to_path_buf).or(beside) {
        Some(splitting) => {
            debug!(request = %request_path.display(), splitting = %splitting.display(), "Loading request");
            Request::load(request_path, &splitting)
        }
        None => {
            warn!(request = %request_path.display(), "No splitting document found, using the default policy");
            Request::load_with_policy(request_path, &SplittingPolicy::default())
        }
    }
}

/// Rebuild the request from an archive unpacked into `dir`.
pub fn load_archived_request(dir: &Path) -> SplitterResult<Request> {
    load_request_files(&dir.join(files::ARCHIVED_REQUEST), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StepSpec;

    fn request() -> Request {
        Request::new("r", 100, 10).with_steps(vec![StepSpec::new("GEN"), StepSpec::new("SIM")])
    }

    #[test]
    fn test_archive_contains_request_and_psets() {
        let work = tempfile::tempdir().unwrap();
        let psets = work.path().join("psets");
        fs::create_dir(&psets).unwrap();
        fs::write(psets.join("1_GEN.py"), "# gen").unwrap();
        fs::write(psets.join("2_SIM.py"), "# sim").unwrap();
        let request_path = work.path().join("req.json");
        fs::write(&request_path, "{}").unwrap();
        let splitting_path = work.path().join("split.json");
        fs::write(&splitting_path, "[]").unwrap();

        let out = work.path().join("out");
        let archive = write_request_archive(&request(), &request_path, &splitting_path, &psets, &out).unwrap();

        let mut names: Vec<String> = tar::Archive::new(GzDecoder::new(File::open(archive).unwrap()))
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert!(names.contains(&"request.json".to_string()));
        assert!(names.contains(&"splitting.json".to_string()));
        assert!(names.contains(&"PSets/1_GEN.py".to_string()));
        assert!(names.contains(&"PSets/2_SIM.py".to_string()));
    }

    #[test]
    fn test_unpack_restores_psets() {
        let work = tempfile::tempdir().unwrap();
        let psets = work.path().join("psets");
        fs::create_dir(&psets).unwrap();
        fs::write(psets.join("1_GEN.py"), "# gen").unwrap();
        let request_path = work.path().join("req.json");
        fs::write(&request_path, r#"{"StepChain": 1}"#).unwrap();
        let splitting_path = work.path().join("split.json");
        fs::write(&splitting_path, "[]").unwrap();
        let archive =
            write_request_archive(&request(), &request_path, &splitting_path, &psets, work.path()).unwrap();

        let dest = work.path().join("job");
        let unpacked = unpack_request_archive(&archive, &dest).unwrap();
        assert_eq!(unpacked, dest.join("PSets"));
        assert_eq!(fs::read_to_string(unpacked.join("1_GEN.py")).unwrap(), "# gen");
        assert_eq!(
            fs::read_to_string(dest.join("request.json")).unwrap(),
            r#"{"StepChain": 1}"#
        );
        assert_eq!(fs::read_to_string(dest.join("splitting.json")).unwrap(), "[]");
    }

    #[test]
    fn test_coverage_reports_missing_steps() {
        let psets = tempfile::tempdir().unwrap();
        fs::write(psets.path().join("1_GEN.py"), "").unwrap();
        let coverage = check_base_configs(&request(), psets.path()).unwrap();
        assert_eq!(coverage.missing_steps, vec!["2_SIM"]);
    }

    #[test]
    fn test_locate_base_config() {
        let psets = tempfile::tempdir().unwrap();
        fs::write(psets.path().join("2_SIM.py"), "").unwrap();
        assert_eq!(
            locate_base_config(psets.path(), "2_SIM"),
            Some(psets.path().join("2_SIM.py"))
        );
        assert_eq!(locate_base_config(psets.path(), "1_GEN"), None);
    }
}
