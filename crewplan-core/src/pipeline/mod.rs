//! Analysis pipeline stages
//!
//! Each stage is a plain function or a small service over borrowed data; the
//! orchestrator owns the run state and threads it through them.

pub mod consolidator;
pub mod detector;
pub mod generator;
pub mod heuristic;
pub mod ranker;

pub use consolidator::consolidate;
pub use detector::detect_conflicts;
pub use generator::{
    GenerationOutcome, ProposalProvider, ProposalRequest, RawProposal, SolutionGenerator,
};
pub use heuristic::RuleBasedProvider;
pub use ranker::{rank_conflicts, score};
