//! # Execution
//!
//! Worker-side runtime. A job file plus the shared archive is all a worker
//! gets; [`ChainRunner`] turns that into ordered step invocations against a
//! [`StepExecutor`].

pub mod copy_group;
pub mod executor;
pub mod runtime;

pub use copy_group::CopyTaskGroup;
pub use executor::{CommandStepExecutor, StepExecutor, StepInvocation, StepOutcome};
pub use runtime::{ChainReport, ChainRunner, StepReport};
