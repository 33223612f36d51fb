//! Candidate generation through an external proposal provider
//!
//! The provider is an opaque remote capability. Every call is bounded by a
//! timeout and a retry budget, responses are validated field by field, and a
//! conflict that ends up with nothing usable receives the fallback candidate.
//! One conflict's failure never affects the others.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::conflict::Conflict;
use crate::orchestration::state::Degradation;
use crate::settings::GeneratorSettings;
use crate::solution::{CandidateSolution, ImpactAnalysis, Strategy};
use crate::{Error, Result};

/// Payload sent to the provider for one conflict
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProposalRequest {
    pub execution_id: Uuid,
    pub conflict: Conflict,
    pub min_proposals: usize,
    pub max_proposals: usize,
}

/// Proposal exactly as returned by a provider, before validation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RawProposal {
    #[serde(default)]
    pub strategy: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default, alias = "feasibility_score")]
    pub feasibility: Option<f64>,
    #[serde(default, alias = "complexity_score")]
    pub complexity: Option<f64>,
    #[serde(default)]
    pub preserves_deadline: Option<bool>,
    #[serde(default, alias = "impact_analysis")]
    pub impact: Option<ImpactAnalysis>,
}

impl RawProposal {
    /// Validate and convert into a candidate for `conflict_id`
    pub fn into_candidate(self, conflict_id: &str) -> Result<CandidateSolution> {
        let strategy = self
            .strategy
            .ok_or_else(|| Error::validation("Proposal is missing a strategy"))?;
        let description = self
            .description
            .ok_or_else(|| Error::validation("Proposal is missing a description"))?;
        let feasibility = self
            .feasibility
            .ok_or_else(|| Error::validation("Proposal is missing a feasibility score"))?;
        let complexity = self
            .complexity
            .ok_or_else(|| Error::validation("Proposal is missing a complexity score"))?;
        let preserves_deadline = self
            .preserves_deadline
            .ok_or_else(|| Error::validation("Proposal is missing the deadline flag"))?;

        let candidate = CandidateSolution::new(
            conflict_id,
            Strategy::from_tag(&strategy),
            &description,
            self.reasoning.as_deref().unwrap_or_default(),
            feasibility,
            complexity,
            preserves_deadline,
        )?;
        Ok(candidate.with_impact(self.impact.unwrap_or_default()))
    }
}

/// External capability that proposes remediations for a conflict
#[async_trait]
pub trait ProposalProvider: Send + Sync {
    /// Short name used in logs and errors
    fn name(&self) -> &str;

    async fn propose(&self, request: &ProposalRequest) -> Result<Vec<RawProposal>>;
}

/// Candidates for a batch of conflicts plus any degraded paths taken
#[derive(Debug, Clone, Default)]
pub struct GenerationOutcome {
    pub candidates: Vec<CandidateSolution>,
    pub degradations: Vec<Degradation>,
}

impl GenerationOutcome {
    pub fn fallback_count(&self) -> usize {
        self.candidates.iter().filter(|c| c.is_fallback()).count()
    }
}

/// Generates validated candidates for conflicts
#[derive(Clone)]
pub struct SolutionGenerator {
    provider: Arc<dyn ProposalProvider>,
    settings: GeneratorSettings,
}

impl SolutionGenerator {
    pub fn new(provider: Arc<dyn ProposalProvider>, settings: GeneratorSettings) -> Self {
        Self { provider, settings }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Generate candidates for every conflict, at most `max_concurrency` at a time.
    ///
    /// Output keeps the order of `conflicts`.
    pub async fn generate(&self, execution_id: Uuid, conflicts: &[Conflict]) -> GenerationOutcome {
        let futures: Vec<_> = conflicts
            .iter()
            .map(|c| self.generate_for(execution_id, c))
            .collect();
        let results: Vec<(Vec<CandidateSolution>, Option<Degradation>)> =
            stream::iter(futures)
                .buffered(self.settings.max_concurrency.max(1))
                .collect()
                .await;

        let mut outcome = GenerationOutcome::default();
        for (candidates, degradation) in results {
            outcome.candidates.extend(candidates);
            outcome.degradations.extend(degradation);
        }
        info!(
            %execution_id,
            conflicts = conflicts.len(),
            candidates = outcome.candidates.len(),
            fallbacks = outcome.fallback_count(),
            provider = self.provider.name(),
            "Candidate generation finished"
        );
        outcome
    }

    /// Candidates for one conflict; never fails, degrading to the fallback instead
    pub async fn generate_for(
        &self,
        execution_id: Uuid,
        conflict: &Conflict,
    ) -> (Vec<CandidateSolution>, Option<Degradation>) {
        let request = ProposalRequest {
            execution_id,
            conflict: conflict.clone(),
            min_proposals: self.settings.min_proposals,
            max_proposals: self.settings.max_proposals,
        };

        let reason = match self.propose_with_retry(&request).await {
            Ok(raw) => {
                let received = raw.len();
                let candidates = self.validate_proposals(raw, &conflict.id);
                if !candidates.is_empty() {
                    return (candidates, None);
                }
                format!("no usable proposals among {} received", received)
            }
            Err(err) => err.to_string(),
        };

        warn!(
            %execution_id,
            conflict_id = %conflict.id,
            reason = %reason,
            "Falling back to default candidate"
        );
        (
            vec![CandidateSolution::fallback(conflict.id.clone())],
            Some(Degradation::FallbackCandidate {
                conflict_id: conflict.id.clone(),
                reason,
            }),
        )
    }

    async fn propose_with_retry(&self, request: &ProposalRequest) -> Result<Vec<RawProposal>> {
        let retry = &self.settings.retry;
        let timeout_secs = self.settings.request_timeout_secs;
        let mut attempt = 1;

        loop {
            let call = self.provider.propose(request);
            let error = match tokio::time::timeout(Duration::from_secs(timeout_secs), call).await {
                Ok(Ok(proposals)) => return Ok(proposals),
                Ok(Err(err)) => err,
                Err(_) => Error::timeout(format!("{} propose", self.provider.name()), timeout_secs),
            };

            if attempt >= retry.max_attempts {
                return Err(error);
            }
            let base = retry.delay_for(attempt);
            let jitter_ms = rand::thread_rng().gen_range(0..=base.as_millis() as u64 / 4);
            let delay = base + Duration::from_millis(jitter_ms);
            warn!(
                conflict_id = %request.conflict.id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Proposal request failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn validate_proposals(&self, raw: Vec<RawProposal>, conflict_id: &str) -> Vec<CandidateSolution> {
        let mut candidates = Vec::new();
        for proposal in raw {
            if candidates.len() >= self.settings.max_proposals {
                break;
            }
            match proposal.into_candidate(conflict_id) {
                Ok(candidate) => candidates.push(candidate),
                Err(err) => debug!(conflict_id, error = %err, "Discarding malformed proposal"),
            }
        }
        if candidates.len() < self.settings.min_proposals && !candidates.is_empty() {
            debug!(
                conflict_id,
                usable = candidates.len(),
                wanted = self.settings.min_proposals,
                "Provider returned fewer proposals than requested"
            );
        }
        candidates
    }
}
