//! Proposal prompts for CrewPlan
//!
//! This crate renders the conflict prompt sent to the generative service,
//! parses whatever proposal text comes back, and provides the HTTP-backed
//! `ProposalProvider` used by the analysis pipeline.

pub mod error;
pub mod http;
pub mod renderer;
pub mod response;

pub use error::{Error, Result};
pub use http::{HttpProposalProvider, ProviderConfig};
pub use renderer::ConflictPromptRenderer;
pub use response::parse_proposals;

/// Re-export core types for convenience
pub use crewplan_core as core;
