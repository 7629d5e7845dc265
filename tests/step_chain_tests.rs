//! Request loading through per-step tweak derivation.

mod common;

use common::*;
use stepchain_splitter::config::{CopyDerivation, CopyInputPolicy};
use stepchain_splitter::models::{OutputFile, Request, SplittingPolicy, StepSpec, StepTweaks};
use stepchain_splitter::orchestration::{
    configure_steps, partition, ConfiguratorOptions, JobSetBuilder, StepConfigurator,
};
use stepchain_splitter::{ExitCode, SplitterError};

#[test]
fn test_end_to_end_two_step_request() {
    let request = chain(100, 40, &["GEN-SIM", "DIGI"]);
    let jobs = JobSetBuilder::new(&request).build().unwrap();
    assert_eq!(jobs.len(), 3);

    let job2 = &jobs[1];
    assert_eq!(job2.job_index, 2);

    let step1 = single(job2, 1);
    assert_eq!(step1.first_event, 40);
    assert_eq!(step1.max_events, 40);
    assert_eq!(step1.first_lumi, 2);
    assert!(step1.input_files.is_empty());

    let step2 = single(job2, 2);
    assert_eq!(step2.max_events, -1);
    assert_eq!(step2.input_files, vec!["file:../step1/RAWSIMoutput.root"]);
}

#[test]
fn test_step1_literals_match_tweak_tool_contract() {
    let request = chain(100, 40, &["GEN-SIM", "DIGI"]);
    let jobs = JobSetBuilder::new(&request).build().unwrap();

    let entries = single(&jobs[1], 1).to_pset_entries();
    assert_eq!(
        entries,
        vec![
            (
                "process.source.firstLuminosityBlock".to_string(),
                "customTypeCms.untracked.uint32(2)".to_string()
            ),
            (
                "process.maxEvents".to_string(),
                "customTypeCms.untracked.PSet(input=cms.untracked.int32(40))".to_string()
            ),
            (
                "process.source.firstEvent".to_string(),
                "customTypeCms.untracked.uint32(40)".to_string()
            ),
            (
                "process.source.firstRun".to_string(),
                "customTypeCms.untracked.uint32(1)".to_string()
            ),
            (
                "process.RAWSIMoutput.fileName".to_string(),
                "customTypeCms.untracked.string('file:RAWSIMoutput.root')".to_string()
            ),
        ]
    );

    let step2 = single(&jobs[1], 2).to_pset_map();
    assert_eq!(
        step2["process.source.fileNames"],
        "customTypeCms.untracked.vstring(['file:../step1/RAWSIMoutput.root'])"
    );
    assert!(!step2.contains_key("process.RAWSIMoutput.fileName"));
}

#[test]
fn test_identifying_fields_propagate_down_chain() {
    let request = chain(1_000, 300, &["GEN", "SIM", "DIGI", "RECO", "MINIAOD"]).with_run_number(42);
    for job in JobSetBuilder::new(&request).build().unwrap() {
        let head = single(&job, 1).clone();
        for step in 2..=5 {
            let tweak = single(&job, step);
            assert_eq!(tweak.first_event, head.first_event);
            assert_eq!(tweak.first_lumi, head.first_lumi);
            assert_eq!(tweak.first_run, 42);
            assert_eq!(tweak.max_events, -1);
            assert_eq!(
                tweak.input_files,
                vec![format!("file:../step{}/RAWSIMoutput.root", step - 1)]
            );
        }
    }
}

#[test]
fn test_intermediate_outputs_are_named_only_when_consumed() {
    let request = Request::new("r", 100, 50).with_steps(vec![
        StepSpec::new("GEN-SIM"),
        StepSpec::new("DIGI").with_outputs(["PREMIXRAWoutput"]),
        StepSpec::new("RECO").with_input("PREMIXRAWoutput"),
    ]);
    let job = &JobSetBuilder::new(&request).build().unwrap()[0];

    assert_eq!(single(job, 1).outputs, vec![OutputFile::for_module("RAWSIMoutput")]);
    assert_eq!(single(job, 2).outputs, vec![OutputFile::for_module("PREMIXRAWoutput")]);
    assert!(single(job, 3).outputs.is_empty());
    assert_eq!(
        single(job, 3).input_files,
        vec!["file:../step2/PREMIXRAWoutput.root"]
    );
}

#[test]
fn test_input_step_skips_to_named_producer() {
    let request = Request::new("r", 100, 50).with_steps(vec![
        StepSpec::new("GEN-SIM"),
        StepSpec::new("DIGI"),
        StepSpec::new("NANO").with_input_step("GEN-SIM"),
    ]);
    let job = &JobSetBuilder::new(&request).build().unwrap()[0];
    assert_eq!(single(job, 3).input_files, vec!["file:../step1/RAWSIMoutput.root"]);
}

#[test]
fn test_undeclared_artifact_is_missing_upstream() {
    let request = Request::new("r", 100, 50).with_steps(vec![
        StepSpec::new("GEN-SIM").with_outputs(["RAWSIMoutput"]),
        StepSpec::new("DIGI").with_input("LHEoutput"),
    ]);
    let err = JobSetBuilder::new(&request).build().unwrap_err();
    match &err {
        SplitterError::MissingUpstreamArtifact { step, step_name, module } => {
            assert_eq!(*step, 2);
            assert_eq!(step_name, "DIGI");
            assert_eq!(module, "LHEoutput");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.exit_code(), ExitCode::BadArguments);
    assert!(!err.is_retryable());
}

#[test]
fn test_fan_out_sub_partitions_job() {
    let request = Request::new("r", 1_660, 830).with_steps(vec![
        StepSpec::new("GEN-SIM").with_copies(3),
        StepSpec::new("DIGI"),
    ]);
    let configurator = StepConfigurator::new(&request, ConfiguratorOptions::default()).unwrap();
    let job = partition(1_660, 830).unwrap()[1];
    let tweaks = configurator.configure(&job).unwrap();
    let copies = configurator.step1_copy_tweaks(&tweaks).unwrap();

    let layout: Vec<(u32, &str, u64, i64)> = copies
        .iter()
        .map(|c| (c.copy_index, c.scope.as_str(), c.tweak.first_event, c.tweak.max_events))
        .collect();
    assert_eq!(
        layout,
        vec![
            (0, "step1/copy0", 830, 277),
            (1, "step1/copy1", 1_107, 277),
            (2, "step1/copy2", 1_384, 276),
        ]
    );
    for copy in &copies {
        assert_eq!(copy.tweak.first_lumi, 2);
        assert_eq!(copy.tweak.outputs, vec![OutputFile::for_module("RAWSIMoutput")]);
    }
    assert_eq!(single(&tweaks, 2).input_files.len(), 3);
}

#[test]
fn test_single_copy_does_not_fan_out() {
    let request = Request::new("r", 100, 40).with_steps(vec![
        StepSpec::new("GEN-SIM").with_copies(1),
        StepSpec::new("DIGI"),
    ]);
    let job = partition(100, 40).unwrap()[0];
    let tweaks = configure_steps(&job, &request).unwrap();
    assert_eq!(single(&tweaks, 2).input_files, vec!["file:../step1/RAWSIMoutput.root"]);
}

#[test]
fn test_first_copy_policy_and_submit_derivation() {
    let request = Request::new("r", 90, 30).with_steps(vec![
        StepSpec::new("GEN-SIM").with_copies(2),
        StepSpec::new("DIGI"),
    ]);
    let options = ConfiguratorOptions {
        copy_input_policy: CopyInputPolicy::FirstCopy,
        copy_derivation: CopyDerivation::Submit,
        ..ConfiguratorOptions::default()
    };
    let jobs = JobSetBuilder::new(&request).with_options(options).build().unwrap();

    for job in &jobs {
        match job.step(1).unwrap() {
            StepTweaks::Copies(copies) => assert_eq!(copies.len(), 2),
            StepTweaks::Single(_) => panic!("expected precomputed copies"),
        }
        assert_eq!(
            single(job, 2).input_files,
            vec!["file:../step1/copy0/RAWSIMoutput.root"]
        );
    }
}

#[test]
fn test_more_copies_than_smallest_job_leaves_empty_copies() {
    let request = Request::new("r", 102, 50).with_steps(vec![StepSpec::new("GEN").with_copies(3)]);
    let jobs = JobSetBuilder::new(&request).build().unwrap();
    assert_eq!(jobs.len(), 3);

    let configurator = StepConfigurator::new(&request, ConfiguratorOptions::default()).unwrap();
    let copies = configurator.step1_copy_tweaks(&jobs[2]).unwrap();
    let counts: Vec<i64> = copies.iter().map(|c| c.tweak.max_events).collect();
    assert_eq!(counts, vec![1, 1, 0]);
    assert_eq!(copies[1].tweak.first_event, 101);
    assert_eq!(copies[2].scope, "step1/copy2");
}

#[test]
fn test_reqmgr_documents_drive_job_set() {
    let document = reqmgr_document(830, 3);
    let splitting = serde_json::to_string(&splitting_document(100)).unwrap();
    let policy = SplittingPolicy::from_json(&splitting).unwrap();
    let request = Request::from_reqmgr(&document, &policy).unwrap();

    assert_eq!(request.total_events, 830);
    assert_eq!(request.events_per_job, 100);
    assert_eq!(request.step1_copies(), 3);
    assert_eq!(request.step(1).unwrap().base_config_name(1), "1_GEN-SIM");
    assert_eq!(request.step(1).unwrap().cmssw_version.as_deref(), Some("CMSSW_10_6_30"));

    let jobs = JobSetBuilder::new(&request).build().unwrap();
    assert_eq!(jobs.len(), 9);
    assert_eq!(single(&jobs[8], 1).max_events, 30);
}

#[test]
fn test_job_set_is_deterministic() {
    let request = Request::new("r", 25_000, 333).with_steps(vec![
        StepSpec::new("GEN-SIM").with_copies(4),
        StepSpec::new("DIGI"),
        StepSpec::new("RECO"),
    ]);
    let first = serde_json::to_string(&JobSetBuilder::new(&request).build().unwrap()).unwrap();
    let second = serde_json::to_string(&JobSetBuilder::new(&request).build().unwrap()).unwrap();
    assert_eq!(first, second);
}
