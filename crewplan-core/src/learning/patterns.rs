//! Aggregation of feedback into per-strategy signals

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::feedback::FeedbackRecord;
use crate::settings::LearningSettings;
use crate::solution::Strategy;

/// Aggregated preference signal for one strategy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrategySignal {
    pub strategy: Strategy,
    pub samples: usize,
    pub acceptance_rate: f64,
    pub average_rating: f64,
    pub average_effectiveness: f64,
    /// Mean feasibility of the rated candidates
    pub mean_feasibility: f64,
    /// Mean `1 - complexity` of the rated candidates
    pub mean_simplicity: f64,
    /// Share of rated candidates that preserved the deadline
    pub deadline_share: f64,
}

/// Strategy left out for lack of samples
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkippedStrategy {
    pub strategy: Strategy,
    pub samples: usize,
    pub required: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatternReport {
    /// Manager id, or `None` for global history
    pub manager_id: Option<String>,
    pub total_records: usize,
    pub signals: Vec<StrategySignal>,
    pub skipped: Vec<SkippedStrategy>,
}

impl PatternReport {
    pub fn signal(&self, strategy: Strategy) -> Option<&StrategySignal> {
        self.signals.iter().find(|s| s.strategy == strategy)
    }

    pub fn has_signals(&self) -> bool {
        !self.signals.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct PatternAnalyzer {
    min_samples: usize,
}

impl PatternAnalyzer {
    pub fn new(settings: &LearningSettings) -> Self {
        Self {
            min_samples: settings.min_samples,
        }
    }

    /// Aggregate `records`, which the caller has already scoped
    pub fn analyze(&self, records: &[FeedbackRecord], manager_id: Option<String>) -> PatternReport {
        let mut groups: BTreeMap<Strategy, Vec<&FeedbackRecord>> = BTreeMap::new();
        for record in records {
            groups.entry(record.strategy).or_default().push(record);
        }

        let mut signals = Vec::new();
        let mut skipped = Vec::new();
        for (strategy, group) in groups {
            if group.len() < self.min_samples {
                debug!(%strategy, samples = group.len(), required = self.min_samples, "Not enough samples");
                skipped.push(SkippedStrategy {
                    strategy,
                    samples: group.len(),
                    required: self.min_samples,
                });
                continue;
            }
            signals.push(aggregate(strategy, &group));
        }

        info!(
            manager_id = manager_id.as_deref().unwrap_or("global"),
            records = records.len(),
            signals = signals.len(),
            skipped = skipped.len(),
            "Pattern analysis finished"
        );
        PatternReport {
            manager_id,
            total_records: records.len(),
            signals,
            skipped,
        }
    }
}

fn aggregate(strategy: Strategy, group: &[&FeedbackRecord]) -> StrategySignal {
    let n = group.len() as f64;
    let mean = |f: &dyn Fn(&FeedbackRecord) -> f64| group.iter().map(|r| f(*r)).sum::<f64>() / n;

    StrategySignal {
        strategy,
        samples: group.len(),
        acceptance_rate: mean(&|r| if r.accepted { 1.0 } else { 0.0 }),
        average_rating: mean(&|r| f64::from(r.rating)),
        average_effectiveness: mean(&|r| r.effectiveness),
        mean_feasibility: mean(&|r| r.feasibility),
        mean_simplicity: mean(&|r| 1.0 - r.complexity),
        deadline_share: mean(&|r| if r.preserves_deadline { 1.0 } else { 0.0 }),
    }
}
