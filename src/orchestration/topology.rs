//! Chain topology resolution
//!
//! Works out, once per request, which earlier step produces each step's input
//! and which output modules each step must name. A step with declared
//! `output_modules` produces exactly those; an undeclared step produces what
//! its consumers ask of it, where a consumer without `input_step` is served by
//! the immediately preceding step.

use tracing::{debug, warn};

use crate::error::{SplitterError, SplitterResult};
use crate::models::StepSpec;

/// Upstream artifact consumed by a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepInput {
    /// 1-based step number of the producer
    pub producer: u32,
    pub module: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStep {
    pub step_number: u32,
    pub input: Option<StepInput>,
    /// Output modules to name in this step's tweak, in first-seen order
    pub outputs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTopology {
    steps: Vec<ResolvedStep>,
}

impl ChainTopology {
    pub fn resolve(steps: &[StepSpec], default_module: &str) -> SplitterResult<Self> {
        let mut inputs: Vec<Option<StepInput>> = Vec::with_capacity(steps.len());

        for (i, step) in steps.iter().enumerate() {
            let step_number = i as u32 + 1;
            if step_number == 1 {
                if step.input_from_output_module.is_some() || step.input_step.is_some() {
                    warn!(
                        step_name = %step.step_name,
                        "Step1 has no upstream; ignoring its input settings"
                    );
                }
                inputs.push(None);
                continue;
            }
            inputs.push(Some(resolve_input(steps, step_number, default_module)?));
        }

        let mut resolved: Vec<ResolvedStep> = steps
            .iter()
            .enumerate()
            .map(|(i, step)| ResolvedStep {
                step_number: i as u32 + 1,
                input: None,
                outputs: step.output_modules.clone(),
            })
            .collect();

        for (i, input) in inputs.into_iter().enumerate() {
            if let Some(input) = &input {
                let producer = &mut resolved[input.producer as usize - 1];
                if !producer.outputs.contains(&input.module) {
                    producer.outputs.push(input.module.clone());
                }
            }
            resolved[i].input = input;
        }

        for step in &resolved {
            debug!(
                step = step.step_number,
                producer = step.input.as_ref().map(|i| i.producer),
                module = step.input.as_ref().map(|i| i.module.as_str()),
                outputs = ?step.outputs,
                "Resolved chain step"
            );
        }

        Ok(Self { steps: resolved })
    }

    /// Resolved step by 1-based number.
    pub fn step(&self, step_number: u32) -> Option<&ResolvedStep> {
        step_number
            .checked_sub(1)
            .and_then(|i| self.steps.get(i as usize))
    }

    pub fn steps(&self) -> &[ResolvedStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

fn resolve_input(steps: &[StepSpec], step_number: u32, default_module: &str) -> SplitterResult<StepInput> {
    let step = &steps[step_number as usize - 1];
    let module = step.input_module(default_module).to_string();
    let missing = || SplitterError::MissingUpstreamArtifact {
        step: step_number,
        step_name: step.step_name.clone(),
        module: module.clone(),
    };

    if let Some(input_step) = &step.input_step {
        let producer = steps[..step_number as usize - 1]
            .iter()
            .position(|s| &s.step_name == input_step)
            .ok_or_else(missing)?;
        let spec = &steps[producer];
        if spec.declares_outputs() && !spec.output_modules.contains(&module) {
            return Err(missing());
        }
        return Ok(StepInput {
            producer: producer as u32 + 1,
            module,
        });
    }

    // Nearest earlier producer; an undeclared step only serves its direct successor.
    for j in (1..step_number).rev() {
        let spec = &steps[j as usize - 1];
        let produces = if spec.declares_outputs() {
            spec.output_modules.contains(&module)
        } else {
            j == step_number - 1
        };
        if produces {
            return Ok(StepInput {
                producer: j,
                module,
            });
        }
    }
    Err(missing())
}
