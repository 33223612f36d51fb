//! Tunable parameters for the analysis pipeline and the learning loop
//!
//! Every numeric threshold used by the generator, the feedback collector,
//! the pattern analyzer and the weight adjuster lives here so deployments can
//! override them from configuration.

use crate::weights::RankingWeights;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct PipelineSettings {
    pub generator: GeneratorSettings,
    pub learning: LearningSettings,
    pub runs: RunSettings,
    pub initial_weights: RankingWeights,
}

/// Retention of execution state in memory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunSettings {
    /// Executions kept in memory; idle resting runs beyond this are evicted,
    /// oldest first, and reloaded from the run store on demand
    pub max_resident: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self { max_resident: 256 }
    }
}

/// Settings for calls to the proposal provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneratorSettings {
    pub min_proposals: usize,
    pub max_proposals: usize,
    /// Conflicts generated concurrently within one execution
    pub max_concurrency: usize,
    pub request_timeout_secs: u64,
    pub retry: RetryPolicy,
}

/// Retry policy for provider calls
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
}

/// How resubmitted feedback for the same solution is treated
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    /// The first record for an (execution, solution) pair wins; later ones are ignored
    FirstWins,
    /// Every submission is appended and counted
    AllowDuplicates,
}

/// Settings for the feedback, pattern and weight stages
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LearningSettings {
    /// Ratings at or below this value trigger a re-detection pass
    pub low_rating_threshold: u8,
    /// Records a strategy needs before it emits a signal
    pub min_samples: usize,
    pub baseline_acceptance: f64,
    pub baseline_rating: f64,
    pub learning_rate: f64,
    /// Largest change a single adjustment may apply to one weight
    pub max_delta: f64,
    pub min_weight: f64,
    pub max_iterations: u32,
    pub max_cas_retries: u32,
    pub dedup: DedupPolicy,
    /// Analyze only the submitting manager's history when a manager is known
    pub scope_by_manager: bool,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            min_proposals: 2,
            max_proposals: 3,
            max_concurrency: 4,
            request_timeout_secs: 30,
            retry: RetryPolicy::default(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 200,
            backoff_multiplier: 2.0,
            max_delay_ms: 5_000,
        }
    }
}

impl Default for LearningSettings {
    fn default() -> Self {
        Self {
            low_rating_threshold: 2,
            min_samples: 5,
            baseline_acceptance: 0.5,
            baseline_rating: 3.0,
            learning_rate: 0.1,
            max_delta: 0.05,
            min_weight: 0.05,
            max_iterations: 3,
            max_cas_retries: 5,
            dedup: DedupPolicy::FirstWins,
            scope_by_manager: true,
        }
    }
}

impl RetryPolicy {
    /// Delay before the given retry (1-based), capped at `max_delay_ms`
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1) as i32;
        let millis = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(millis.min(self.max_delay_ms as f64) as u64)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::configuration("Retry max_attempts must be at least 1"));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(Error::configuration(
                "Retry backoff_multiplier must be at least 1.0",
            ));
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(Error::configuration(
                "Retry initial_delay_ms cannot exceed max_delay_ms",
            ));
        }
        Ok(())
    }
}

impl PipelineSettings {
    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        let generator = &self.generator;
        if generator.min_proposals == 0 || generator.min_proposals > generator.max_proposals {
            return Err(Error::configuration(
                "Generator min_proposals must be between 1 and max_proposals",
            ));
        }
        if generator.max_concurrency == 0 {
            return Err(Error::configuration(
                "Generator max_concurrency must be greater than 0",
            ));
        }
        if generator.request_timeout_secs == 0 {
            return Err(Error::configuration(
                "Generator request_timeout_secs must be greater than 0",
            ));
        }
        generator.retry.validate()?;

        let learning = &self.learning;
        if !(1..=5).contains(&learning.low_rating_threshold) {
            return Err(Error::configuration(
                "Learning low_rating_threshold must be between 1 and 5",
            ));
        }
        if learning.min_samples == 0 {
            return Err(Error::configuration(
                "Learning min_samples must be greater than 0",
            ));
        }
        if !(0.0..=1.0).contains(&learning.baseline_acceptance) {
            return Err(Error::configuration(
                "Learning baseline_acceptance must be within [0, 1]",
            ));
        }
        if !(1.0..=5.0).contains(&learning.baseline_rating) {
            return Err(Error::configuration(
                "Learning baseline_rating must be within [1, 5]",
            ));
        }
        if learning.max_delta <= 0.0 || learning.max_delta >= 1.0 {
            return Err(Error::configuration(
                "Learning max_delta must be within (0, 1)",
            ));
        }
        if learning.learning_rate <= 0.0 {
            return Err(Error::configuration(
                "Learning learning_rate must be positive",
            ));
        }
        if learning.min_weight < 0.0 || learning.min_weight * 3.0 >= 1.0 {
            return Err(Error::configuration(
                "Learning min_weight must be within [0, 1/3)",
            ));
        }
        if learning.max_cas_retries == 0 {
            return Err(Error::configuration(
                "Learning max_cas_retries must be at least 1",
            ));
        }

        if self.runs.max_resident == 0 {
            return Err(Error::configuration(
                "Runs max_resident must be greater than 0",
            ));
        }

        self.initial_weights.validate()?;
        let below_floor = self
            .initial_weights
            .as_array()
            .iter()
            .any(|w| *w < learning.min_weight);
        if below_floor {
            return Err(Error::configuration(format!(
                "Every initial weight must be at least learning min_weight {}",
                learning.min_weight
            )));
        }
        Ok(())
    }
}
