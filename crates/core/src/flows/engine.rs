use thiserror::Error;

use crate::domain::Intent;
use crate::flows::execution::ExecutionState;
use crate::flows::states::{FlowEdge, Step};

pub trait FlowDefinition {
    fn initial_step(&self) -> Step;
    fn transition(&self, current: Step, state: &ExecutionState) -> Result<Step, FlowTransitionError>;
    fn edges(&self) -> &'static [FlowEdge];
}

const TARIFF_QUERY_EDGES: [FlowEdge; 11] = [
    FlowEdge { from: Step::Start, to: Step::Classify, condition: "always" },
    FlowEdge { from: Step::Classify, to: Step::Lookup, condition: "rate lookup / comparison" },
    FlowEdge { from: Step::Classify, to: Step::Summarize, condition: "general info" },
    FlowEdge { from: Step::Classify, to: Step::HandleError, condition: "unsupported / failed" },
    FlowEdge { from: Step::Lookup, to: Step::Format, condition: "found or not found" },
    FlowEdge { from: Step::Lookup, to: Step::HandleError, condition: "error" },
    FlowEdge { from: Step::Summarize, to: Step::Format, condition: "always" },
    FlowEdge { from: Step::Summarize, to: Step::HandleError, condition: "error" },
    FlowEdge { from: Step::Format, to: Step::End, condition: "always" },
    FlowEdge { from: Step::Format, to: Step::HandleError, condition: "error" },
    FlowEdge { from: Step::HandleError, to: Step::End, condition: "always" },
];

/// Routing for a single natural-language tariff question.
#[derive(Clone, Debug, Default)]
pub struct TariffQueryFlow;

impl FlowDefinition for TariffQueryFlow {
    fn initial_step(&self) -> Step {
        Step::Start
    }

    fn transition(&self, current: Step, state: &ExecutionState) -> Result<Step, FlowTransitionError> {
        transition_tariff_query(current, state)
    }

    fn edges(&self) -> &'static [FlowEdge] {
        &TARIFF_QUERY_EDGES
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_step(&self) -> Step {
        self.flow.initial_step()
    }

    pub fn next(&self, current: Step, state: &ExecutionState) -> Result<Step, FlowTransitionError> {
        let next = self.flow.transition(current, state)?;
        if !self.is_edge(current, next) {
            return Err(FlowTransitionError::UndeclaredEdge { from: current, to: next });
        }
        Ok(next)
    }

    pub fn edges(&self) -> &'static [FlowEdge] {
        self.flow.edges()
    }

    pub fn is_edge(&self, from: Step, to: Step) -> bool {
        self.flow.edges().iter().any(|edge| edge.from == from && edge.to == to)
    }
}

impl Default for FlowEngine<TariffQueryFlow> {
    fn default() -> Self {
        Self::new(TariffQueryFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("no transition leaves terminal step {step}")]
    TerminalStep { step: Step },
    #[error("transition {from} -> {to} is not part of the declared graph")]
    UndeclaredEdge { from: Step, to: Step },
    #[error("step {step} was reached without a classification")]
    MissingClassification { step: Step },
}

fn transition_tariff_query(
    current: Step,
    state: &ExecutionState,
) -> Result<Step, FlowTransitionError> {
    let failed = state.error().is_some();

    let next = match current {
        Step::Start => Step::Classify,
        Step::Classify => match (failed, state.classification().map(|c| c.intent)) {
            (true, _) | (false, None) => Step::HandleError,
            (false, Some(Intent::RateLookup | Intent::Comparison)) => Step::Lookup,
            (false, Some(Intent::GeneralInfo)) => Step::Summarize,
            (false, Some(Intent::Unsupported)) => Step::HandleError,
        },
        Step::Lookup | Step::Summarize => {
            if state.classification().is_none() {
                return Err(FlowTransitionError::MissingClassification { step: current });
            }
            if failed {
                Step::HandleError
            } else {
                Step::Format
            }
        }
        Step::Format => {
            if failed {
                Step::HandleError
            } else {
                Step::End
            }
        }
        Step::HandleError => Step::End,
        Step::End => return Err(FlowTransitionError::TerminalStep { step: current }),
    };

    Ok(next)
}
