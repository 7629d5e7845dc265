//! # Step Configurator
//!
//! Derives the per-step [`Tweak`]s for one job. Step 1 carries the job's event
//! slice; every later step carries the same identifying first event, lumi,
//! and run, reads the whole upstream artifact (`maxEvents = -1`), and points its
//! input at the producing step's output in the same job directory.
//!
//! The configurator holds only immutable request state, so one instance can be
//! shared across threads and every job is derived independently.

use std::collections::BTreeMap;

use crate::config::{CopyDerivation, CopyInputPolicy, SplitterConfig};
use crate::constants::{files, pset};
use crate::error::{SplitterError, SplitterResult};
use crate::models::{CopyTweak, JobDescriptor, JobTweaks, OutputFile, Request, StepTweaks, Tweak};

use super::copies::{copy_scope, fan_out};
use super::topology::{ChainTopology, ResolvedStep, StepInput};

/// Settings that shape derived tweaks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfiguratorOptions {
    pub default_output_module: String,
    pub copy_input_policy: CopyInputPolicy,
    pub copy_derivation: CopyDerivation,
    pub copy_dir_prefix: String,
}

impl Default for ConfiguratorOptions {
    fn default() -> Self {
        Self::from(&SplitterConfig::default())
    }
}

impl From<&SplitterConfig> for ConfiguratorOptions {
    fn from(config: &SplitterConfig) -> Self {
        Self {
            default_output_module: config.default_output_module.clone(),
            copy_input_policy: config.copy_input_policy,
            copy_derivation: config.copy_derivation,
            copy_dir_prefix: config.copy_dir_prefix.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StepConfigurator {
    topology: ChainTopology,
    /// Copies step 1 fans out into
    step1_copies: u32,
    options: ConfiguratorOptions,
}

impl StepConfigurator {
    /// Resolve the chain once; fails with `MissingUpstreamArtifact` on a broken chain.
    pub fn new(request: &Request, options: ConfiguratorOptions) -> SplitterResult<Self> {
        if request.steps.is_empty() {
            return Err(SplitterError::invalid_request("step chain is empty"));
        }
        let step1_copies = request.step1_copies();
        if step1_copies == 0 {
            return Err(SplitterError::invalid_partition("Step1.NumCopies must be positive"));
        }
        let topology = ChainTopology::resolve(&request.steps, &options.default_output_module)?;
        Ok(Self {
            topology,
            step1_copies,
            options,
        })
    }

    pub fn topology(&self) -> &ChainTopology {
        &self.topology
    }

    pub fn options(&self) -> &ConfiguratorOptions {
        &self.options
    }

    pub fn step1_copies(&self) -> u32 {
        self.step1_copies
    }

    /// Whether step 1 fans out into parallel copies.
    pub fn fans_out(&self) -> bool {
        self.step1_copies > 1
    }

    /// Tweaks for every step of `job`, keyed by step number.
    pub fn configure(&self, job: &JobDescriptor) -> SplitterResult<JobTweaks> {
        let mut tweaks = BTreeMap::new();
        for step in self.topology.steps() {
            let tweak = self.step_tweak(job, step);
            let entry = if step.step_number == 1
                && self.fans_out()
                && self.options.copy_derivation == CopyDerivation::Submit
            {
                StepTweaks::Copies(self.copies_for(&tweak)?)
            } else {
                StepTweaks::Single(tweak)
            };
            tweaks.insert(step.step_number, entry);
        }
        Ok(JobTweaks {
            job_index: job.job_index,
            tweaks,
        })
    }

    /// Copy tweaks for step 1 of a job, from whatever the job file carries.
    ///
    /// A job-level tweak is fanned out here; precomputed copies are returned
    /// unchanged. Both paths give identical results for the same job.
    pub fn step1_copy_tweaks(&self, job: &JobTweaks) -> SplitterResult<Vec<CopyTweak>> {
        match job.step(1)? {
            StepTweaks::Single(tweak) => self.copies_for(tweak),
            StepTweaks::Copies(copies) => {
                if copies.len() != self.step1_copies as usize {
                    return Err(SplitterError::serialization(
                        "job file",
                        format!(
                            "job {} carries {} step-1 copies but the request asks for {}",
                            job.job_index,
                            copies.len(),
                            self.step1_copies
                        ),
                    ));
                }
                Ok(copies.clone())
            }
        }
    }

    fn copies_for(&self, tweak: &Tweak) -> SplitterResult<Vec<CopyTweak>> {
        fan_out(tweak, 1, self.step1_copies, &self.options.copy_dir_prefix)
    }

    fn step_tweak(&self, job: &JobDescriptor, step: &ResolvedStep) -> Tweak {
        let (max_events, input_files) = match &step.input {
            None => (job.event_count() as i64, Vec::new()),
            Some(input) => (pset::ALL_EVENTS, self.input_refs(input)),
        };
        Tweak {
            first_lumi: job.lumi_index,
            max_events,
            first_event: job.first_event(),
            first_run: job.run_number,
            input_files,
            outputs: step.outputs.iter().map(OutputFile::for_module).collect(),
        }
    }

    /// Paths are relative to the consuming step's `step<K>` directory.
    fn input_refs(&self, input: &StepInput) -> Vec<String> {
        let file = format!("{}{}", input.module, files::ROOT_EXTENSION);
        if input.producer == 1 && self.fans_out() {
            let copies = match self.options.copy_input_policy {
                CopyInputPolicy::AllCopies => self.step1_copies,
                CopyInputPolicy::FirstCopy => 1,
            };
            (0..copies)
                .map(|c| {
                    format!(
                        "{}../{}/{file}",
                        files::LOCAL_FILE_SCHEME,
                        copy_scope(1, &self.options.copy_dir_prefix, c)
                    )
                })
                .collect()
        } else {
            vec![format!(
                "{}../{}{}/{file}",
                files::LOCAL_FILE_SCHEME,
                files::STEP_DIR_PREFIX,
                input.producer
            )]
        }
    }
}

/// Derive every step's tweak for `job` under default options.
pub fn configure_steps(job: &JobDescriptor, request: &Request) -> SplitterResult<JobTweaks> {
    StepConfigurator::new(request, ConfiguratorOptions::default())?.configure(job)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventRange, StepSpec};

    fn job2() -> JobDescriptor {
        JobDescriptor {
            job_index: 2,
            event_range: EventRange::new(40, 40),
            lumi_index: 2,
            run_number: 1,
        }
    }

    fn single(tweaks: &JobTweaks, step: u32) -> &Tweak {
        match tweaks.step(step).unwrap() {
            StepTweaks::Single(t) => t,
            StepTweaks::Copies(_) => panic!("step {step} unexpectedly fanned out"),
        }
    }

    #[test]
    fn test_two_step_chain() {
        let request = Request::new("r", 100, 40)
            .with_steps(vec![StepSpec::new("GEN"), StepSpec::new("SIM")]);
        let tweaks = configure_steps(&job2(), &request).unwrap();

        let step1 = single(&tweaks, 1);
        assert_eq!(step1.first_event, 40);
        assert_eq!(step1.max_events, 40);
        assert_eq!(step1.first_lumi, 2);
        assert!(step1.input_files.is_empty());
        assert_eq!(step1.outputs, vec![OutputFile::for_module("RAWSIMoutput")]);

        let step2 = single(&tweaks, 2);
        assert_eq!(step2.max_events, -1);
        assert_eq!(step2.first_event, 40);
        assert_eq!(step2.input_files, vec!["file:../step1/RAWSIMoutput.root"]);
        assert!(step2.outputs.is_empty());
    }

    #[test]
    fn test_fan_out_inputs_follow_policy() {
        let request = Request::new("r", 90, 30).with_steps(vec![
            StepSpec::new("GEN").with_copies(3),
            StepSpec::new("SIM"),
        ]);

        let tweaks = configure_steps(&job2(), &request).unwrap();
        assert!(!tweaks.step(1).unwrap().is_fanned_out());
        assert_eq!(
            single(&tweaks, 2).input_files,
            vec![
                "file:../step1/copy0/RAWSIMoutput.root",
                "file:../step1/copy1/RAWSIMoutput.root",
                "file:../step1/copy2/RAWSIMoutput.root",
            ]
        );

        let options = ConfiguratorOptions {
            copy_input_policy: CopyInputPolicy::FirstCopy,
            ..ConfiguratorOptions::default()
        };
        let tweaks = StepConfigurator::new(&request, options)
            .unwrap()
            .configure(&job2())
            .unwrap();
        assert_eq!(
            single(&tweaks, 2).input_files,
            vec!["file:../step1/copy0/RAWSIMoutput.root"]
        );
    }

    #[test]
    fn test_submit_time_copies_match_worker_derivation() {
        let request = Request::new("r", 90, 30).with_steps(vec![
            StepSpec::new("GEN").with_copies(3),
            StepSpec::new("SIM"),
        ]);
        let worker = StepConfigurator::new(&request, ConfiguratorOptions::default()).unwrap();
        let submit = StepConfigurator::new(
            &request,
            ConfiguratorOptions {
                copy_derivation: CopyDerivation::Submit,
                ..ConfiguratorOptions::default()
            },
        )
        .unwrap();

        let submit_tweaks = submit.configure(&job2()).unwrap();
        assert!(submit_tweaks.step(1).unwrap().is_fanned_out());

        let from_worker = worker.step1_copy_tweaks(&worker.configure(&job2()).unwrap()).unwrap();
        let from_submit = submit.step1_copy_tweaks(&submit_tweaks).unwrap();
        assert_eq!(from_worker, from_submit);
        assert_eq!(from_worker.len(), 3);
    }

    #[test]
    fn test_missing_upstream_artifact() {
        let request = Request::new("r", 100, 40).with_steps(vec![
            StepSpec::new("GEN").with_outputs(["RAWSIMoutput"]),
            StepSpec::new("SIM").with_input("GENSIMoutput"),
        ]);
        assert!(matches!(
            configure_steps(&job2(), &request),
            Err(SplitterError::MissingUpstreamArtifact { .. })
        ));
    }
}
