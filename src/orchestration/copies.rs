//! Copy fan-out for step 1
//!
//! A job's event range is sub-partitioned into `num_copies` disjoint ranges.
//! The first `count % num_copies` copies take one extra event each, and each
//! copy's first event is the cumulative offset of the copies before it.

use crate::error::{SplitterError, SplitterResult};
use crate::models::{CopyTweak, EventRange, Tweak};

/// Sub-partition `range` into `num_copies` contiguous ranges.
pub fn partition_copies(range: EventRange, num_copies: u32) -> SplitterResult<Vec<EventRange>> {
    if num_copies == 0 {
        return Err(SplitterError::invalid_partition("num_copies must be positive"));
    }

    let copies = u64::from(num_copies);
    let per_copy = range.count / copies;
    let remainder = range.count % copies;

    let mut offset = range.first_event;
    let ranges = (0..copies)
        .map(|c| {
            let count = per_copy + u64::from(c < remainder);
            let sub = EventRange::new(offset, count);
            offset += count;
            sub
        })
        .collect();
    Ok(ranges)
}

/// Working-directory scope of copy `copy_index` of step `step`.
pub fn copy_scope(step: u32, copy_dir_prefix: &str, copy_index: u32) -> String {
    format!("step{step}/{copy_dir_prefix}{copy_index}")
}

/// Derive per-copy tweaks from a job-level step-1 tweak.
///
/// Each copy keeps the job's lumi, run, and output file names and gets its own
/// `firstEvent`/`maxEvents`. `num_copies == 1` yields a single copy identical
/// to the job tweak.
pub fn fan_out(
    job_tweak: &Tweak,
    step: u32,
    num_copies: u32,
    copy_dir_prefix: &str,
) -> SplitterResult<Vec<CopyTweak>> {
    let count = u64::try_from(job_tweak.max_events).map_err(|_| {
        SplitterError::invalid_partition(format!(
            "cannot fan out a step whose maxEvents is {}",
            job_tweak.max_events
        ))
    })?;
    let range = EventRange::new(job_tweak.first_event, count);

    partition_copies(range, num_copies)?
        .into_iter()
        .zip(0u32..)
        .map(|(sub, copy_index)| {
            let max_events = i64::try_from(sub.count).map_err(|_| {
                SplitterError::invalid_partition(format!("copy event count {} overflows", sub.count))
            })?;
            Ok(CopyTweak {
                copy_index,
                scope: copy_scope(step, copy_dir_prefix, copy_index),
                tweak: Tweak {
                    first_event: sub.first_event,
                    max_events,
                    ..job_tweak.clone()
                },
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OutputFile;

    #[test]
    fn test_low_copies_take_the_remainder() {
        let copies = partition_copies(EventRange::new(1000, 830), 3).unwrap();
        assert_eq!(
            copies,
            vec![
                EventRange::new(1000, 277),
                EventRange::new(1277, 277),
                EventRange::new(1554, 276),
            ]
        );
        assert_eq!(copies.iter().map(|r| r.count).sum::<u64>(), 830);
    }

    #[test]
    fn test_single_copy_is_identity() {
        let range = EventRange::new(40, 40);
        assert_eq!(partition_copies(range, 1).unwrap(), vec![range]);
    }

    #[test]
    fn test_zero_copies_rejected() {
        assert!(matches!(
            partition_copies(EventRange::new(0, 10), 0),
            Err(SplitterError::InvalidPartitionSpec(_))
        ));
    }

    #[test]
    fn test_fan_out_scopes_and_fields() {
        let job_tweak = Tweak {
            first_lumi: 3,
            max_events: 100,
            first_event: 200,
            first_run: 1,
            input_files: Vec::new(),
            outputs: vec![OutputFile::for_module("RAWSIMoutput")],
        };
        let copies = fan_out(&job_tweak, 1, 4, "copy").unwrap();
        assert_eq!(copies.len(), 4);
        for (c, copy) in copies.iter().enumerate() {
            assert_eq!(copy.copy_index, c as u32);
            assert_eq!(copy.scope, format!("step1/copy{c}"));
            assert_eq!(copy.tweak.max_events, 25);
            assert_eq!(copy.tweak.first_event, 200 + 25 * c as u64);
            assert_eq!(copy.tweak.first_lumi, 3);
            assert_eq!(copy.tweak.outputs, job_tweak.outputs);
        }
    }

    #[test]
    fn test_fan_out_rejects_unbounded_tweak() {
        let job_tweak = Tweak {
            first_lumi: 1,
            max_events: -1,
            first_event: 0,
            first_run: 1,
            input_files: Vec::new(),
            outputs: Vec::new(),
        };
        assert!(fan_out(&job_tweak, 1, 2, "copy").is_err());
    }
}
