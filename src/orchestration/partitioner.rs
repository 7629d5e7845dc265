//! Event-based partitioner
//!
//! Turns a total event count and a per-job quota into a dense, gap-free,
//! overlap-free sequence of [`JobDescriptor`]s. Every job but the last gets
//! exactly `events_per_job` events; the last gets the non-zero remainder.

use tracing::debug;

use crate::constants::defaults;
use crate::error::{SplitterError, SplitterResult};
use crate::models::{EventRange, JobDescriptor, Request};

/// Stateless event-based partitioner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partitioner {
    total_events: u64,
    events_per_job: u64,
    run_number: u64,
}

impl Partitioner {
    pub fn new(total_events: u64, events_per_job: u64) -> SplitterResult<Self> {
        if total_events == 0 {
            return Err(SplitterError::invalid_partition("total_events must be positive"));
        }
        if events_per_job == 0 {
            return Err(SplitterError::invalid_partition("events_per_job must be positive"));
        }
        Ok(Self {
            total_events,
            events_per_job,
            run_number: defaults::RUN_NUMBER,
        })
    }

    pub fn for_request(request: &Request) -> SplitterResult<Self> {
        Ok(Self::new(request.total_events, request.events_per_job)?.with_run_number(request.run_number))
    }

    pub fn with_run_number(mut self, run_number: u64) -> Self {
        self.run_number = run_number;
        self
    }

    /// `ceil(total_events / events_per_job)`
    pub fn job_count(&self) -> u64 {
        self.total_events.div_ceil(self.events_per_job)
    }

    /// Descriptor for a single 1-based job index, computed independently of the others.
    pub fn job(&self, job_index: u64) -> Option<JobDescriptor> {
        if job_index == 0 || job_index > self.job_count() {
            return None;
        }
        let first_event = self.events_per_job * (job_index - 1);
        let count = if job_index == self.job_count() {
            self.total_events - first_event
        } else {
            self.events_per_job
        };
        Some(JobDescriptor {
            job_index,
            event_range: EventRange::new(first_event, count),
            lumi_index: job_index,
            run_number: self.run_number,
        })
    }

    /// Iterate over every job in index order.
    pub fn jobs(&self) -> impl Iterator<Item = JobDescriptor> + '_ {
        (1..=self.job_count()).filter_map(move |i| self.job(i))
    }

    pub fn partition(&self) -> Vec<JobDescriptor> {
        let jobs: Vec<JobDescriptor> = self.jobs().collect();
        debug!(
            total_events = self.total_events,
            events_per_job = self.events_per_job,
            job_count = jobs.len(),
            "Partitioned event space"
        );
        jobs
    }
}

/// Partition `[0, total_events)` into jobs of `events_per_job` events.
pub fn partition(total_events: u64, events_per_job: u64) -> SplitterResult<Vec<JobDescriptor>> {
    Ok(Partitioner::new(total_events, events_per_job)?.partition())
}
