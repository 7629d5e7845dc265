#![allow(clippy::doc_markdown)] // Allow technical terms like StepChain, ReqMgr in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # StepChain Splitter
//!
//! Event-based job splitting and per-step configuration for multi-step
//! ("StepChain") Monte Carlo production requests.
//!
//! ## Overview
//!
//! A request asks for `total_events` generated events, processed by a linear
//! chain of steps where step K consumes an artifact produced by an earlier
//! step. At submit time the event space is partitioned into jobs of
//! `events_per_job` events, and for every job each step receives a tweak: the
//! first event, event count, lumi and run, input file references and output
//! file names it must run with. Step 1 may fan out into parallel copies that
//! split the job's events between them.
//!
//! At run time a worker reads one job file, derives the copy tweaks if needed,
//! and runs the steps in order.
//!
//! ## Module Organization
//!
//! - [`models`] - Request, splitting policy, job and tweak values
//! - [`orchestration`] - Partitioner, chain topology, step configurator, job-set builder
//! - [`artifacts`] - Job descriptor files and the shared request archive
//! - [`execution`] - Step executor seam, copy task group, chain runner
//! - [`validation`] - Structural validation of request records
//! - [`config`] - Layered runtime configuration
//! - [`error`] - Error taxonomy and exit-code mapping
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust
//! use stepchain_splitter::models::{Request, StepSpec, StepTweaks};
//! use stepchain_splitter::orchestration::JobSetBuilder;
//!
//! # fn example() -> stepchain_splitter::SplitterResult<()> {
//! let request = Request::new("MonteCarlo_2024", 100, 40)
//!     .with_steps(vec![StepSpec::new("GEN-SIM"), StepSpec::new("DIGI")]);
//!
//! let jobs = JobSetBuilder::new(&request).build()?;
//! assert_eq!(jobs.len(), 3);
//!
//! if let StepTweaks::Single(tweak) = jobs[2].step(1)? {
//!     assert_eq!((tweak.first_event, tweak.max_events), (80, 20));
//! }
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit, integration and property tests
//! ```

pub mod artifacts;
pub mod config;
pub mod constants;
pub mod error;
pub mod execution;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod validation;

pub use config::{CopyDerivation, CopyInputPolicy, ExecutorConfig, SplitterConfig};
pub use constants::ExitCode;
pub use error::{CopyOutcome, CopyStatus, SplitterError, SplitterResult};
pub use execution::{ChainRunner, CommandStepExecutor, CopyTaskGroup, StepExecutor};
pub use models::{
    CopyTweak, EventRange, JobDescriptor, JobTweaks, Request, SplittingPolicy, StepSpec, StepTweaks,
    Tweak,
};
pub use orchestration::{
    configure_steps, partition, partition_copies, ChainTopology, JobSetBuilder, Partitioner,
    StepConfigurator,
};
