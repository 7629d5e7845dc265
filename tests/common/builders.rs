#![allow(dead_code)]

use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use stepchain_splitter::models::{Request, StepSpec, StepTweaks, Tweak};
use stepchain_splitter::JobTweaks;

/// Two-step GEN-SIM → DIGI request document as ReqMgr would store it.
pub fn reqmgr_document(total_events: i64, num_copies: i64) -> Value {
    json!({
        "RequestName": "pdmvserv_task_TOP-RunIISummer20UL17wmLHEGEN-00042",
        "StepChain": 2,
        "Step1": {
            "StepName": "GEN-SIM",
            "RequestNumEvents": total_events,
            "NumCopies": num_copies,
            "ScramArch": "slc7_amd64_gcc700",
            "CMSSWVersion": "CMSSW_10_6_30",
            "KeepOutput": false
        },
        "Step2": {
            "StepName": "DIGI",
            "InputStep": "GEN-SIM",
            "InputFromOutputModule": "RAWSIMoutput",
            "KeepOutput": true
        }
    })
}

pub fn splitting_document(events_per_job: i64) -> Value {
    json!([
        {"taskType": "Merge", "splitAlgo": "ParentlessMergeBySize", "splitParams": {"max_merge_size": 4294967296u64}},
        {"taskType": "Production", "splitAlgo": "EventBased",
         "splitParams": {"events_per_job": events_per_job, "events_per_lumi": events_per_job}}
    ])
}

/// Write both documents into `dir` and return their paths.
pub fn write_documents(dir: &Path, request: &Value, splitting: &Value) -> (PathBuf, PathBuf) {
    let request_path = dir.join("request.json");
    let splitting_path = dir.join("splitting.json");
    std::fs::write(&request_path, serde_json::to_string_pretty(request).unwrap()).unwrap();
    std::fs::write(&splitting_path, serde_json::to_string_pretty(splitting).unwrap()).unwrap();
    (request_path, splitting_path)
}

pub fn chain(total_events: u64, events_per_job: u64, names: &[&str]) -> Request {
    Request::new("test_request", total_events, events_per_job)
        .with_steps(names.iter().map(|n| StepSpec::new(*n)).collect())
}

/// The single tweak of `step`, panicking if it fanned out.
pub fn single(job: &JobTweaks, step: u32) -> &Tweak {
    match job.step(step).unwrap() {
        StepTweaks::Single(tweak) => tweak,
        StepTweaks::Copies(_) => panic!("step {step} of job {} fanned out", job.job_index),
    }
}
