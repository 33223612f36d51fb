//! Ranking weights and the process-wide versioned weight store
//!
//! Readers take cheap snapshots; the weight adjuster is the only writer and
//! publishes through [`VersionedWeightStore::compare_and_swap`], so two
//! concurrent learning cycles can never silently overwrite each other.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{Error, Result};

const SUM_TOLERANCE: f64 = 1e-6;

/// Scoring coefficients for feasibility, simplicity and deadline preservation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RankingWeights {
    pub feasibility: f64,
    /// Applied to `1 - complexity`
    pub complexity: f64,
    pub deadline: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            feasibility: 0.30,
            complexity: 0.45,
            deadline: 0.25,
        }
    }
}

impl RankingWeights {
    pub fn new(feasibility: f64, complexity: f64, deadline: f64) -> Result<Self> {
        let weights = Self {
            feasibility,
            complexity,
            deadline,
        };
        weights.validate()?;
        Ok(weights)
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.feasibility, self.complexity, self.deadline]
    }

    pub fn from_array(values: [f64; 3]) -> Self {
        Self {
            feasibility: values[0],
            complexity: values[1],
            deadline: values[2],
        }
    }

    pub fn sum(&self) -> f64 {
        self.as_array().iter().sum()
    }

    /// Scale so the weights sum to 1
    pub fn normalized(&self) -> Result<Self> {
        let sum = self.sum();
        if !sum.is_finite() || sum <= 0.0 {
            return Err(Error::validation("Cannot normalize weights with a non-positive sum"));
        }
        Ok(Self::from_array(self.as_array().map(|w| w / sum)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.as_array().iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::validation("Ranking weights must be finite and non-negative"));
        }
        if (self.sum() - 1.0).abs() > SUM_TOLERANCE {
            return Err(Error::validation(format!(
                "Ranking weights must sum to 1, got {:.6}",
                self.sum()
            )));
        }
        Ok(())
    }
}

/// One published version of the weights
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeightSnapshot {
    pub version: u64,
    pub weights: RankingWeights,
    pub created_at: DateTime<Utc>,
    pub reason: String,
}

impl WeightSnapshot {
    pub fn initial(weights: RankingWeights) -> Self {
        Self {
            version: 1,
            weights,
            created_at: Utc::now(),
            reason: "initial".to_string(),
        }
    }
}

/// Thread-safe, versioned store holding the full weight history
#[derive(Debug, Clone)]
pub struct VersionedWeightStore {
    history: Arc<RwLock<Vec<WeightSnapshot>>>,
}

impl VersionedWeightStore {
    pub fn new(initial: RankingWeights) -> Result<Self> {
        initial.validate()?;
        Ok(Self {
            history: Arc::new(RwLock::new(vec![WeightSnapshot::initial(initial)])),
        })
    }

    /// Restore from previously persisted snapshots, oldest first
    pub fn from_history(history: Vec<WeightSnapshot>) -> Result<Self> {
        if history.is_empty() {
            return Err(Error::validation("Weight history cannot be empty"));
        }
        for pair in history.windows(2) {
            if pair[1].version <= pair[0].version {
                return Err(Error::validation("Weight history versions must increase"));
            }
        }
        for snapshot in &history {
            snapshot.weights.validate()?;
        }
        Ok(Self {
            history: Arc::new(RwLock::new(history)),
        })
    }

    /// Latest published snapshot
    pub fn current(&self) -> WeightSnapshot {
        let history = self.history.read();
        // history is never empty: both constructors guarantee one entry
        history[history.len() - 1].clone()
    }

    /// Snapshot for a specific version, used to attribute past rankings
    pub fn version(&self, version: u64) -> Option<WeightSnapshot> {
        self.history
            .read()
            .iter()
            .find(|s| s.version == version)
            .cloned()
    }

    pub fn history(&self) -> Vec<WeightSnapshot> {
        self.history.read().clone()
    }

    /// Publish `weights` if the current version still equals `expected_version`
    pub fn compare_and_swap(
        &self,
        expected_version: u64,
        weights: RankingWeights,
        reason: &str,
    ) -> Result<WeightSnapshot> {
        let weights = weights.normalized()?;
        weights.validate()?;

        let mut history = self.history.write();
        let actual = history.last().map(|s| s.version).unwrap_or(0);
        if actual != expected_version {
            return Err(Error::weight_conflict(expected_version, actual));
        }
        let snapshot = WeightSnapshot {
            version: actual + 1,
            weights,
            created_at: Utc::now(),
            reason: reason.to_string(),
        };
        history.push(snapshot.clone());
        debug!(version = snapshot.version, reason, "Published ranking weights");
        Ok(snapshot)
    }

    /// Read-modify-write with re-read on version collision.
    ///
    /// `update` receives the current snapshot and returns the new weights, or
    /// `None` to leave the store untouched.
    pub fn update_with<F>(&self, max_retries: u32, reason: &str, mut update: F) -> Result<Option<WeightSnapshot>>
    where
        F: FnMut(&WeightSnapshot) -> Result<Option<RankingWeights>>,
    {
        let mut attempt = 0;
        loop {
            let current = self.current();
            let Some(next) = update(&current)? else {
                return Ok(None);
            };
            match self.compare_and_swap(current.version, next, reason) {
                Ok(snapshot) => return Ok(Some(snapshot)),
                Err(err) if err.is_weight_conflict() && attempt + 1 < max_retries => {
                    attempt += 1;
                    warn!(attempt, error = %err, "Weight update collided, re-reading");
                }
                Err(err) => return Err(err),
            }
        }
    }
}
