//! StepChain request model
//!
//! A [`Request`] is the immutable description of one workload: how many events
//! to produce, the splitting quotas, and the ordered chain of steps. It is built
//! once from a ReqMgr-style JSON document plus the splitting policy and is then
//! passed by reference into every partitioning and configuration computation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{debug, warn};

use super::splitting::SplittingPolicy;
use crate::constants::defaults;
use crate::error::{SplitterError, SplitterResult};
use crate::validation;

/// One position in the step chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSpec {
    /// Names the base configuration artifact for the step
    pub step_name: String,

    /// Platform tag the step's release is built for
    pub scram_arch: Option<String>,

    /// Release tag used to run the step
    pub cmssw_version: Option<String>,

    /// Parallel copies; only honored for step 1
    pub num_copies: u32,

    /// Name of the upstream step this step reads from, when not the nearest producer
    pub input_step: Option<String>,

    /// Upstream output module consumed by this step
    pub input_from_output_module: Option<String>,

    /// Whether this step's output is eligible for stage-out
    pub keep_output: bool,

    /// Explicitly declared output modules. Empty means "inferred from consumers".
    pub output_modules: Vec<String>,
}

impl StepSpec {
    pub fn new(step_name: impl Into<String>) -> Self {
        Self {
            step_name: step_name.into(),
            scram_arch: None,
            cmssw_version: None,
            num_copies: defaults::NUM_COPIES,
            input_step: None,
            input_from_output_module: None,
            keep_output: false,
            output_modules: Vec::new(),
        }
    }

    pub fn with_copies(mut self, num_copies: u32) -> Self {
        self.num_copies = num_copies;
        self
    }

    pub fn with_input(mut self, output_module: impl Into<String>) -> Self {
        self.input_from_output_module = Some(output_module.into());
        self
    }

    pub fn with_input_step(mut self, step_name: impl Into<String>) -> Self {
        self.input_step = Some(step_name.into());
        self
    }

    pub fn with_outputs<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_modules = modules.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_keep_output(mut self, keep_output: bool) -> Self {
        self.keep_output = keep_output;
        self
    }

    pub fn with_release(mut self, scram_arch: impl Into<String>, cmssw_version: impl Into<String>) -> Self {
        self.scram_arch = Some(scram_arch.into());
        self.cmssw_version = Some(cmssw_version.into());
        self
    }

    /// Module this step reads, falling back to `default_module` when unnamed.
    pub fn input_module<'a>(&'a self, default_module: &'a str) -> &'a str {
        self.input_from_output_module
            .as_deref()
            .unwrap_or(default_module)
    }

    /// Whether outputs were declared rather than inferred.
    pub fn declares_outputs(&self) -> bool {
        !self.output_modules.is_empty()
    }

    /// Base configuration artifact name: `{step_number}_{step_name}`.
    pub fn base_config_name(&self, step_number: u32) -> String {
        format!("{step_number}_{}", self.step_name)
    }
}

/// Immutable workload description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub request_name: String,
    pub total_events: u64,
    pub events_per_job: u64,
    pub events_per_lumi: u64,
    pub run_number: u64,
    /// Steps 1..N in chain order; index 0 is step 1
    pub steps: Vec<StepSpec>,
}

impl Request {
    pub fn new(request_name: impl Into<String>, total_events: u64, events_per_job: u64) -> Self {
        Self {
            request_name: request_name.into(),
            total_events,
            events_per_job,
            events_per_lumi: events_per_job,
            run_number: defaults::RUN_NUMBER,
            steps: Vec::new(),
        }
    }

    pub fn with_steps(mut self, steps: Vec<StepSpec>) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_run_number(mut self, run_number: u64) -> Self {
        self.run_number = run_number;
        self
    }

    pub fn with_events_per_lumi(mut self, events_per_lumi: u64) -> Self {
        self.events_per_lumi = events_per_lumi;
        self
    }

    pub fn chain_length(&self) -> u32 {
        self.steps.len() as u32
    }

    /// Step by 1-based chain position.
    pub fn step(&self, step_number: u32) -> Option<&StepSpec> {
        step_number
            .checked_sub(1)
            .and_then(|i| self.steps.get(i as usize))
    }

    /// Copies step 1 fans out into; 1 when there is no fan-out.
    pub fn step1_copies(&self) -> u32 {
        self.steps.first().map_or(1, |s| s.num_copies)
    }

    /// Build a request from a ReqMgr-style document and the production splitting policy.
    pub fn from_reqmgr(document: &Value, policy: &SplittingPolicy) -> SplitterResult<Self> {
        validation::validate_request_document(document)?;

        let doc = document
            .as_object()
            .ok_or_else(|| SplitterError::invalid_request("request document must be a JSON object"))?;

        let chain_length = int_field(doc, "StepChain")?.ok_or_else(|| {
            SplitterError::invalid_request("request document missing required key: StepChain")
        })?;
        if chain_length < 1 {
            return Err(SplitterError::invalid_request(format!(
                "StepChain must be at least 1, got {chain_length}"
            )));
        }

        let mut steps = Vec::with_capacity(chain_length as usize);
        for step_number in 1..=chain_length {
            let key = format!("Step{step_number}");
            let step_doc = doc
                .get(&key)
                .and_then(Value::as_object)
                .ok_or_else(|| SplitterError::invalid_request(format!("request document missing {key}")))?;
            steps.push(parse_step(&key, step_doc)?);
        }

        let step1 = doc
            .get("Step1")
            .and_then(Value::as_object)
            .ok_or_else(|| SplitterError::invalid_request("request document missing Step1"))?;

        let total_events = positive(
            "RequestNumEvents",
            int_field(step1, "RequestNumEvents")?
                .ok_or_else(|| SplitterError::invalid_partition("Step1.RequestNumEvents is required"))?,
        )?;
        let events_per_job = positive(
            "events_per_job",
            match policy.events_per_job {
                Some(n) => n,
                None => int_field(step1, "EventsPerJob")?.ok_or_else(|| {
                    SplitterError::invalid_partition(
                        "events_per_job missing from splitting params and Step1.EventsPerJob",
                    )
                })?,
            },
        )?;
        let events_per_lumi = match policy.events_per_lumi {
            Some(n) => Some(n),
            None => int_field(step1, "EventsPerLumi")?,
        }
        .map(|n| positive("events_per_lumi", n))
        .transpose()?
        .unwrap_or(events_per_job);

        if events_per_lumi != events_per_job {
            warn!(
                events_per_job,
                events_per_lumi,
                "events_per_lumi differs from events_per_job; each job still covers exactly one lumi"
            );
        }

        let run_number = match int_field(doc, "RunNumber")? {
            Some(n) if n < 0 => {
                return Err(SplitterError::invalid_request(format!(
                    "RunNumber must not be negative, got {n}"
                )))
            }
            Some(n) => n as u64,
            None => defaults::RUN_NUMBER,
        };

        let request_name = doc
            .get("RequestName")
            .or_else(|| doc.get("_id"))
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();

        let request = Request {
            request_name,
            total_events,
            events_per_job,
            events_per_lumi,
            run_number,
            steps,
        };
        validation::validate_request(&request)?;

        debug!(
            request_name = %request.request_name,
            total_events = request.total_events,
            events_per_job = request.events_per_job,
            chain_length = request.chain_length(),
            "Request loaded"
        );
        Ok(request)
    }

    /// Read the request and splitting documents from disk.
    pub fn load(request_path: &Path, splitting_path: &Path) -> SplitterResult<Self> {
        let splitting_text = std::fs::read_to_string(splitting_path)
            .map_err(|e| SplitterError::io(splitting_path.display(), e))?;
        let policy = SplittingPolicy::from_json(&splitting_text)?;
        Self::load_with_policy(request_path, &policy)
    }

    /// Read the request document from disk and apply an already parsed policy.
    pub fn load_with_policy(request_path: &Path, policy: &SplittingPolicy) -> SplitterResult<Self> {
        let request_text = std::fs::read_to_string(request_path)
            .map_err(|e| SplitterError::io(request_path.display(), e))?;
        let document: Value = serde_json::from_str(&request_text)
            .map_err(|e| SplitterError::invalid_request(format!("malformed request document: {e}")))?;
        Self::from_reqmgr(&document, policy)
    }
}

fn parse_step(key: &str, doc: &Map<String, Value>) -> SplitterResult<StepSpec> {
    let step_name = doc
        .get("StepName")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SplitterError::invalid_request(format!("{key} missing StepName")))?;

    let num_copies = match int_field(doc, "NumCopies")? {
        None => defaults::NUM_COPIES,
        Some(n) if n <= 0 => {
            return Err(SplitterError::invalid_partition(format!(
                "{key}.NumCopies must be positive, got {n}"
            )))
        }
        Some(n) => u32::try_from(n).map_err(|_| {
            SplitterError::invalid_partition(format!("{key}.NumCopies out of range: {n}"))
        })?,
    };

    let output_modules = match doc.get("OutputModules") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str().map(str::to_string).ok_or_else(|| {
                    SplitterError::invalid_request(format!("{key}.OutputModules must list strings"))
                })
            })
            .collect::<SplitterResult<Vec<_>>>()?,
        Some(_) => {
            return Err(SplitterError::invalid_request(format!(
                "{key}.OutputModules must be an array"
            )))
        }
    };

    Ok(StepSpec {
        step_name: step_name.to_string(),
        scram_arch: string_field(doc, "ScramArch"),
        cmssw_version: string_field(doc, "CMSSWVersion"),
        num_copies,
        input_step: string_field(doc, "InputStep"),
        input_from_output_module: string_field(doc, "InputFromOutputModule"),
        keep_output: doc.get("KeepOutput").and_then(Value::as_bool).unwrap_or(false),
        output_modules,
    })
}

fn string_field(doc: &Map<String, Value>, key: &str) -> Option<String> {
    doc.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn int_field(doc: &Map<String, Value>, key: &str) -> SplitterResult<Option<i64>> {
    match doc.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_i64()
            .map(Some)
            .ok_or_else(|| SplitterError::invalid_request(format!("{key} must be an integer, got {value}"))),
    }
}

fn positive(name: &str, value: i64) -> SplitterResult<u64> {
    if value <= 0 {
        return Err(SplitterError::invalid_partition(format!(
            "{name} must be positive, got {value}"
        )));
    }
    Ok(value as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn policy() -> SplittingPolicy {
        SplittingPolicy::event_based(100, 100)
    }

    #[test]
    fn test_from_reqmgr_reads_chain() {
        let doc = json!({
            "RequestName": "pdmvserv_task_EXO-RunIISummer20UL18GEN-00001",
            "StepChain": 2,
            "RunNumber": 7,
            "Step1": {"StepName": "GEN", "RequestNumEvents": 830, "NumCopies": 3,
                      "ScramArch": "slc7_amd64_gcc700", "CMSSWVersion": "CMSSW_10_6_30"},
            "Step2": {"StepName": "SIM", "InputStep": "GEN",
                      "InputFromOutputModule": "RAWSIMoutput", "KeepOutput": true}
        });

        let request = Request::from_reqmgr(&doc, &policy()).unwrap();
        assert_eq!(request.request_name, "pdmvserv_task_EXO-RunIISummer20UL18GEN-00001");
        assert_eq!(request.total_events, 830);
        assert_eq!(request.events_per_job, 100);
        assert_eq!(request.run_number, 7);
        assert_eq!(request.chain_length(), 2);
        assert_eq!(request.step1_copies(), 3);
        assert_eq!(request.step(2).unwrap().input_step.as_deref(), Some("GEN"));
        assert!(request.step(2).unwrap().keep_output);
        assert!(request.step(3).is_none());
        assert!(request.step(0).is_none());
    }

    #[test]
    fn test_step1_quotas_are_fallbacks() {
        let doc = json!({
            "StepChain": 1,
            "Step1": {"StepName": "GEN", "RequestNumEvents": 50, "EventsPerJob": 20}
        });
        let policy = SplittingPolicy {
            algorithm: crate::models::SplitAlgorithm::EventBased,
            events_per_job: None,
            events_per_lumi: None,
        };
        let request = Request::from_reqmgr(&doc, &policy).unwrap();
        assert_eq!(request.events_per_job, 20);
        assert_eq!(request.events_per_lumi, 20);
        assert_eq!(request.run_number, 1);
    }

    #[test]
    fn test_zero_events_is_invalid_partition() {
        let doc = json!({"StepChain": 1, "Step1": {"StepName": "GEN", "RequestNumEvents": 0}});
        let err = Request::from_reqmgr(&doc, &policy()).unwrap_err();
        assert!(matches!(err, SplitterError::InvalidPartitionSpec(_)));
    }

    #[test]
    fn test_non_positive_copies_is_invalid_partition() {
        let doc = json!({"StepChain": 1, "Step1": {"StepName": "GEN", "RequestNumEvents": 10, "NumCopies": 0}});
        let err = Request::from_reqmgr(&doc, &policy()).unwrap_err();
        assert!(matches!(err, SplitterError::InvalidPartitionSpec(_)));
    }

    #[test]
    fn test_missing_step_is_invalid_request() {
        let doc = json!({"StepChain": 2, "Step1": {"StepName": "GEN", "RequestNumEvents": 10}});
        let err = Request::from_reqmgr(&doc, &policy()).unwrap_err();
        assert!(matches!(err, SplitterError::InvalidRequest(_)));
    }

    #[test]
    fn test_base_config_name() {
        assert_eq!(StepSpec::new("DIGI2RAW").base_config_name(3), "3_DIGI2RAW");
    }
}
