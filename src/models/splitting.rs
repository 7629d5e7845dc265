//! Splitting policy records.
//!
//! The splitting document is a list of per-task-type entries. Only the
//! `Production` entry drives step-1 partitioning.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::constants::defaults;
use crate::error::{SplitterError, SplitterResult};

/// Parameters of one splitting entry. Unknown keys are kept but unused.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SplitParams {
    #[serde(default)]
    pub events_per_job: Option<i64>,
    #[serde(default)]
    pub events_per_lumi: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitEntry {
    pub task_type: String,
    pub split_algo: String,
    #[serde(default)]
    pub split_params: SplitParams,
}

/// Supported splitting algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitAlgorithm {
    EventBased,
}

impl SplitAlgorithm {
    pub fn parse(name: &str) -> SplitterResult<Self> {
        match name {
            defaults::EVENT_BASED_ALGO => Ok(SplitAlgorithm::EventBased),
            other => Err(SplitterError::invalid_partition(format!(
                "unsupported split algorithm '{other}' (only {} is supported)",
                defaults::EVENT_BASED_ALGO
            ))),
        }
    }
}

/// Quotas selected from the splitting document, before request fallbacks apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplittingPolicy {
    pub algorithm: SplitAlgorithm,
    pub events_per_job: Option<i64>,
    pub events_per_lumi: Option<i64>,
}

/// Event-based with no quotas; the request's own `EventsPerJob` applies.
impl Default for SplittingPolicy {
    fn default() -> Self {
        Self {
            algorithm: SplitAlgorithm::EventBased,
            events_per_job: None,
            events_per_lumi: None,
        }
    }
}

impl SplittingPolicy {
    pub fn event_based(events_per_job: i64, events_per_lumi: i64) -> Self {
        Self {
            algorithm: SplitAlgorithm::EventBased,
            events_per_job: Some(events_per_job),
            events_per_lumi: Some(events_per_lumi),
        }
    }

    /// Pick the first `Production` entry.
    pub fn from_entries(entries: &[SplitEntry]) -> SplitterResult<Self> {
        let entry = entries
            .iter()
            .find(|e| e.task_type == defaults::PRODUCTION_TASK_TYPE)
            .ok_or_else(|| {
                SplitterError::invalid_request(format!(
                    "no {} entry found in splitting document",
                    defaults::PRODUCTION_TASK_TYPE
                ))
            })?;

        let algorithm = SplitAlgorithm::parse(&entry.split_algo)?;
        debug!(
            split_algo = %entry.split_algo,
            events_per_job = ?entry.split_params.events_per_job,
            events_per_lumi = ?entry.split_params.events_per_lumi,
            "Selected production splitting entry"
        );

        Ok(Self {
            algorithm,
            events_per_job: entry.split_params.events_per_job,
            events_per_lumi: entry.split_params.events_per_lumi,
        })
    }

    pub fn from_json(document: &str) -> SplitterResult<Self> {
        let entries: Vec<SplitEntry> = serde_json::from_str(document)
            .map_err(|e| SplitterError::invalid_request(format!("malformed splitting document: {e}")))?;
        Self::from_entries(&entries)
    }
}
