//! # Orchestration
//!
//! Submit-time derivation of the job set: partitioning the event space,
//! resolving the step chain, and building each job's per-step tweaks. All of
//! it is pure computation over an immutable [`Request`](crate::models::Request).

pub mod copies;
pub mod job_set;
pub mod partitioner;
pub mod step_configurator;
pub mod topology;

pub use copies::{copy_scope, fan_out, partition_copies};
pub use job_set::JobSetBuilder;
pub use partitioner::{partition, Partitioner};
pub use step_configurator::{configure_steps, ConfiguratorOptions, StepConfigurator};
pub use topology::{ChainTopology, ResolvedStep, StepInput};
