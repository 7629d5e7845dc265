#![allow(dead_code)]

use proptest::prelude::*;
use stepchain_splitter::models::{Request, StepSpec};

/// Event totals from tiny to production-sized.
pub fn total_events_strategy() -> impl Strategy<Value = u64> {
    prop_oneof![1u64..=50, 51u64..=10_000, 10_001u64..=2_000_000]
}

pub fn events_per_job_strategy() -> impl Strategy<Value = u64> {
    prop_oneof![1u64..=10, 11u64..=1_000, 1_001u64..=50_000]
}

pub fn num_copies_strategy() -> impl Strategy<Value = u32> {
    1u32..=16
}

/// Step names as they appear in ReqMgr documents.
pub fn step_name_strategy() -> impl Strategy<Value = String> {
    "[A-Z][A-Z0-9]{1,7}(-[A-Z]{2,4})?"
}

/// Linear chains of 1..=5 uniquely named steps; the smallest job may hold
/// fewer events than step-1 copies.
pub fn request_strategy() -> impl Strategy<Value = Request> {
    (
        1u64..=5_000,
        1u64..=500,
        prop::collection::vec(step_name_strategy(), 1..=5),
        1u32..=4,
    )
        .prop_filter_map("step names must be unique", |(total, per_job, names, copies)| {
            let mut unique = names.clone();
            unique.sort();
            unique.dedup();
            if unique.len() != names.len() {
                return None;
            }
            let steps = names
                .into_iter()
                .enumerate()
                .map(|(i, name)| {
                    let step = StepSpec::new(name);
                    if i == 0 {
                        step.with_copies(copies)
                    } else {
                        step
                    }
                })
                .collect();
            Some(Request::new("proptest_request", total, per_job).with_steps(steps))
        })
}
