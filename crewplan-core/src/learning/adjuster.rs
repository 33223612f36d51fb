//! Bounded adjustment of the ranking weights toward observed preferences
//!
//! Each strategy signal yields a preference gap `g` in [-1, 1] combining the
//! acceptance gap and the rating gap against the neutral baseline. The gap is
//! projected onto the three weight dimensions through the profile of the
//! candidates managers actually rated (mean feasibility, mean simplicity,
//! deadline share). The resulting deltas are centered so they sum to zero,
//! scaled so no single delta exceeds `max_delta`, and scaled again so no
//! weight drops below `min_weight`. Repeated adjustments therefore saturate
//! at the floor instead of diverging.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::learning::patterns::{PatternReport, StrategySignal};
use crate::settings::LearningSettings;
use crate::weights::{RankingWeights, WeightSnapshot};
use crate::Result;

const NEGLIGIBLE: f64 = 1e-12;

/// Record of one adjustment decision
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeightAdjustment {
    pub from_version: u64,
    /// Version published by the adjustment, `None` when nothing changed
    pub to_version: Option<u64>,
    pub previous: RankingWeights,
    pub adjusted: RankingWeights,
    /// Applied change per dimension: feasibility, complexity, deadline
    pub deltas: [f64; 3],
    pub signals_used: usize,
}

impl WeightAdjustment {
    pub fn unchanged(snapshot: &WeightSnapshot, signals_used: usize) -> Self {
        Self {
            from_version: snapshot.version,
            to_version: None,
            previous: snapshot.weights,
            adjusted: snapshot.weights,
            deltas: [0.0; 3],
            signals_used,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WeightAdjuster {
    settings: LearningSettings,
}

impl WeightAdjuster {
    pub fn new(settings: LearningSettings) -> Self {
        Self { settings }
    }

    /// Preference gap of one strategy against the baseline, in [-1, 1]
    pub fn preference_gap(&self, signal: &StrategySignal) -> f64 {
        let acceptance_span = self
            .settings
            .baseline_acceptance
            .max(1.0 - self.settings.baseline_acceptance)
            .max(NEGLIGIBLE);
        let rating_span = (self.settings.baseline_rating - 1.0)
            .max(5.0 - self.settings.baseline_rating)
            .max(NEGLIGIBLE);

        let acceptance_gap = (signal.acceptance_rate - self.settings.baseline_acceptance) / acceptance_span;
        let rating_gap = (signal.average_rating - self.settings.baseline_rating) / rating_span;
        (0.5 * acceptance_gap + 0.5 * rating_gap).clamp(-1.0, 1.0)
    }

    /// Bounded per-dimension deltas for `current` given the report's signals
    pub fn deltas(&self, current: &RankingWeights, report: &PatternReport) -> [f64; 3] {
        if report.signals.is_empty() {
            return [0.0; 3];
        }

        let n = report.signals.len() as f64;
        let mut raw = [0.0; 3];
        for signal in &report.signals {
            let gap = self.preference_gap(signal);
            let profile = [signal.mean_feasibility, signal.mean_simplicity, signal.deadline_share];
            for (delta, exposure) in raw.iter_mut().zip(profile) {
                *delta += self.settings.learning_rate * gap * exposure / n;
            }
        }

        // Center so the weights keep summing to one
        let mean = raw.iter().sum::<f64>() / 3.0;
        for delta in raw.iter_mut() {
            *delta -= mean;
        }

        let largest = raw.iter().fold(0.0_f64, |acc, d| acc.max(d.abs()));
        if largest < NEGLIGIBLE {
            return [0.0; 3];
        }
        let mut scale = (self.settings.max_delta / largest).min(1.0);

        // Keep every weight at or above the floor
        for (weight, delta) in current.as_array().iter().zip(raw) {
            if delta < 0.0 {
                let room = (weight - self.settings.min_weight).max(0.0);
                scale = scale.min(room / (-delta));
            }
        }

        raw.map(|d| d * scale)
    }

    /// New weights for `current`, or `None` when the signals call for no change
    pub fn propose(&self, current: &RankingWeights, report: &PatternReport) -> Result<Option<RankingWeights>> {
        let deltas = self.deltas(current, report);
        if deltas.iter().all(|d| d.abs() < NEGLIGIBLE) {
            debug!(signals = report.signals.len(), "No weight change warranted");
            return Ok(None);
        }

        let values = current.as_array();
        let adjusted = RankingWeights::from_array([
            values[0] + deltas[0],
            values[1] + deltas[1],
            values[2] + deltas[2],
        ])
        .normalized()?;
        info!(
            feasibility = adjusted.feasibility,
            complexity = adjusted.complexity,
            deadline = adjusted.deadline,
            "Proposed ranking weight adjustment"
        );
        Ok(Some(adjusted))
    }
}
