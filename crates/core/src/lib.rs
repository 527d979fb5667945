pub mod config;
pub mod dataset;
pub mod domain;
pub mod errors;
pub mod fixtures;
pub mod flows;

pub use dataset::{DatasetError, LookupError, LookupRequest, TariffDataset, TariffStore};
pub use domain::{
    percent_label, ClassifiedQuery, DatasetSummary, Intent, SupportedDomain, TariffRecord, Trend,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{
    render_dot, ExecutionState, ExecutionStatistics, FlowEngine, FlowTransitionError, RunResult,
    StateError, StatePatch, Step, StepTiming, TariffQueryFlow,
};
