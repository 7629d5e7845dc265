//! # Data Model
//!
//! Immutable inputs ([`Request`], [`StepSpec`], [`SplittingPolicy`]) and the
//! pure values derived from them ([`JobDescriptor`], [`Tweak`], [`JobTweaks`]).

pub mod job;
pub mod request;
pub mod splitting;
pub mod tweak;

pub use job::{EventRange, JobDescriptor};
pub use request::{Request, StepSpec};
pub use splitting::{SplitAlgorithm, SplitEntry, SplitParams, SplittingPolicy};
pub use tweak::{CopyTweak, JobTweaks, OutputFile, StepTweaks, Tweak, TweakKey, TweakValue};
