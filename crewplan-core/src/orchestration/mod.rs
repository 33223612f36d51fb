//! Orchestration of the analysis pipeline and the learning loop
//!
//! Every execution owns a [`RunState`] that moves along the stage graph in
//! [`graph`]. The [`AllocationAdvisor`] drives those transitions, keeps one
//! registry entry per execution id and shares only the feedback store and
//! the versioned ranking weights between executions.

pub mod graph;
pub mod orchestrator;
pub mod state;

pub use orchestrator::{AdvisorBuilder, AllocationAdvisor};
pub use state::{
    AnalysisRequest, AnalysisSummary, Degradation, FeedbackResponse, RunState, RunStatus, Stage,
};
