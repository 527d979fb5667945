pub mod engine;
pub mod execution;
pub mod states;
pub mod visualize;

pub use engine::{FlowDefinition, FlowEngine, FlowTransitionError, TariffQueryFlow};
pub use execution::{
    ExecutionState, ExecutionStatistics, RunResult, StateError, StatePatch, StepTiming,
};
pub use states::{FlowEdge, Step, UnknownStep};
pub use visualize::render_dot;
