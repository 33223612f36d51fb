//! Core domain models and the analysis pipeline for CrewPlan
//!
//! This crate contains the allocation model, the conflict detection and
//! remediation pipeline, the feedback-driven learning loop and the state
//! graph that sequences them for each execution.

pub mod calendar;
pub mod conflict;
pub mod error;
pub mod feedback;
pub mod learning;
pub mod orchestration;
pub mod pipeline;
pub mod resource;
pub mod settings;
pub mod simulation;
pub mod solution;
pub mod store;
pub mod weights;

pub use error::{Error, Result};
pub use orchestration::{AllocationAdvisor, AnalysisRequest, AnalysisSummary, Stage};
pub use settings::PipelineSettings;
pub use weights::{RankingWeights, VersionedWeightStore};

/// Common result type used throughout the core library
pub type CoreResult<T> = std::result::Result<T, Error>;
