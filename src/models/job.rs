//! Job descriptors produced by the partitioner.

use serde::{Deserialize, Serialize};

/// Half-open event interval `[first_event, first_event + count)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventRange {
    pub first_event: u64,
    pub count: u64,
}

impl EventRange {
    pub fn new(first_event: u64, count: u64) -> Self {
        Self { first_event, count }
    }

    /// One past the last event in the range.
    pub fn end(&self) -> u64 {
        self.first_event + self.count
    }

    /// Inclusive last event, `None` for an empty range.
    pub fn last_event(&self) -> Option<u64> {
        self.count.checked_sub(1).map(|n| self.first_event + n)
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn contains(&self, event: u64) -> bool {
        self.first_event <= event && event < self.end()
    }
}

/// One unit of partitioned work: a single event range in a single lumi block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobDescriptor {
    /// 1-based, dense across the request
    pub job_index: u64,
    pub event_range: EventRange,
    /// Equal to `job_index` under the one-job-per-lumi policy
    pub lumi_index: u64,
    pub run_number: u64,
}

impl JobDescriptor {
    pub fn first_event(&self) -> u64 {
        self.event_range.first_event
    }

    pub fn event_count(&self) -> u64 {
        self.event_range.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_range_is_half_open() {
        let r = EventRange::new(100, 30);
        assert!(r.contains(100));
        assert!(r.contains(129));
        assert!(!r.contains(130));
        assert_eq!(r.end(), 130);
        assert_eq!(r.last_event(), Some(129));
        assert!(!r.is_empty());
    }

    #[test]
    fn empty_event_range() {
        let r = EventRange::new(5, 0);
        assert!(r.is_empty());
        assert_eq!(r.last_event(), None);
        assert!(!r.contains(5));
    }
}
