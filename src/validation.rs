//! Input validation for StepChain requests
//!
//! Structural checks on the raw request document, then semantic checks on the
//! parsed [`Request`]. Everything here runs at submit time, before any job is
//! derived, so a bad request aborts without producing a partial job set.

use serde_json::Value;
use std::collections::HashSet;
use tracing::warn;

use crate::error::{SplitterError, SplitterResult};
use crate::models::Request;

/// Keys every request document must carry.
const REQUIRED_REQUEST_KEYS: &[&str] = &["StepChain", "Step1"];

/// Largest value the `uint32` tweak fields can carry.
const MAX_UINT32_FIELD: u64 = u32::MAX as u64;

/// Validates the raw request document before it is parsed.
pub fn validate_request_document(document: &Value) -> SplitterResult<()> {
    let doc = document
        .as_object()
        .ok_or_else(|| SplitterError::invalid_request("request document must be a JSON object"))?;

    for key in REQUIRED_REQUEST_KEYS {
        if !doc.contains_key(*key) {
            return Err(SplitterError::invalid_request(format!(
                "request document missing required key: {key}"
            )));
        }
    }

    let step1 = doc
        .get("Step1")
        .and_then(Value::as_object)
        .ok_or_else(|| SplitterError::invalid_request("Step1 must be a JSON object"))?;
    if !step1.contains_key("StepName") {
        return Err(SplitterError::invalid_request("request Step1 missing StepName"));
    }

    Ok(())
}

/// Validates a parsed request.
pub fn validate_request(request: &Request) -> SplitterResult<()> {
    if request.steps.is_empty() {
        return Err(SplitterError::invalid_request("step chain is empty"));
    }
    if request.total_events == 0 {
        return Err(SplitterError::invalid_partition("total_events must be positive"));
    }
    if request.events_per_job == 0 {
        return Err(SplitterError::invalid_partition("events_per_job must be positive"));
    }
    if request.events_per_lumi == 0 {
        return Err(SplitterError::invalid_partition("events_per_lumi must be positive"));
    }

    let job_count = request.total_events.div_ceil(request.events_per_job);
    if request.total_events > MAX_UINT32_FIELD || job_count > MAX_UINT32_FIELD {
        return Err(SplitterError::invalid_partition(format!(
            "total_events {} does not fit the uint32 event and lumi tweak fields",
            request.total_events
        )));
    }
    if request.run_number > MAX_UINT32_FIELD {
        return Err(SplitterError::invalid_request(format!(
            "run number {} does not fit the uint32 tweak field",
            request.run_number
        )));
    }

    let mut names = HashSet::new();
    for (i, step) in request.steps.iter().enumerate() {
        let step_number = i + 1;
        if !names.insert(step.step_name.as_str()) {
            return Err(SplitterError::invalid_request(format!(
                "duplicate StepName '{}' at Step{step_number}",
                step.step_name
            )));
        }
        if step.num_copies == 0 {
            return Err(SplitterError::invalid_partition(format!(
                "Step{step_number}.NumCopies must be positive"
            )));
        }
        if step_number > 1 && step.num_copies > 1 {
            warn!(
                step = step_number,
                step_name = %step.step_name,
                num_copies = step.num_copies,
                "NumCopies is only honored for Step1; ignoring"
            );
        }
    }

    // The smallest job is the last one; surplus copies of it run with zero events.
    let copies = u64::from(request.step1_copies());
    let smallest_job = request.total_events - request.events_per_job * (job_count - 1);
    if copies > smallest_job {
        warn!(
            num_copies = copies,
            smallest_job,
            "Step1.NumCopies exceeds the events of the smallest job; some copies will be empty"
        );
    }

    Ok(())
}
