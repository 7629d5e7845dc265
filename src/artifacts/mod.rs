//! # Artifacts
//!
//! Files handed from the submit side to the worker: one descriptor per job and
//! one archive shared by every job of a request.

pub mod archive;
pub mod job_files;

pub use archive::{
    check_base_configs, load_archived_request, load_request_files, locate_base_config,
    unpack_request_archive, write_request_archive, PsetCoverage,
};
pub use job_files::{discover_job_files, job_file_name, job_file_path, read_job_file, write_job_files};
