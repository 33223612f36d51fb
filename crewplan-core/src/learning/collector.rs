//! Feedback collection against a run's ranked output

use std::sync::Arc;
use tracing::{info, warn};

use crate::feedback::{FeedbackRecord, FeedbackSubmission};
use crate::orchestration::state::RunState;
use crate::settings::LearningSettings;
use crate::store::FeedbackStore;
use crate::{Error, Result};

/// Whether a piece of feedback should send the run back to detection
pub fn wants_continuation(accepted: bool, rating: u8, low_rating_threshold: u8) -> bool {
    !accepted || rating <= low_rating_threshold
}

/// Result of collecting one submission
#[derive(Debug, Clone, PartialEq)]
pub struct CollectedFeedback {
    /// The stored record; the original one when the submission was a duplicate
    pub record: FeedbackRecord,
    pub duplicate: bool,
    pub continued: bool,
}

/// Validates submissions and appends them to the durable store
#[derive(Clone)]
pub struct FeedbackCollector {
    store: Arc<dyn FeedbackStore>,
    settings: LearningSettings,
}

impl FeedbackCollector {
    pub fn new(store: Arc<dyn FeedbackStore>, settings: LearningSettings) -> Self {
        Self { store, settings }
    }

    pub fn store(&self) -> &Arc<dyn FeedbackStore> {
        &self.store
    }

    /// Record feedback for a solution ranked in `state`.
    ///
    /// Fails with `NotFound` when the solution was not part of the run's
    /// ranked output. A duplicate under first-wins dedup returns the original
    /// record and its decision.
    pub async fn collect(&self, state: &RunState, submission: &FeedbackSubmission) -> Result<CollectedFeedback> {
        submission.validate()?;
        if submission.execution_id != state.execution_id {
            return Err(Error::validation("Feedback execution id does not match the run"));
        }

        let ranked = state
            .find_ranked(submission.solution_id)
            .ok_or_else(|| Error::not_found("solution", submission.solution_id.to_string()))?;
        let record = FeedbackRecord::from_submission(submission, &ranked.solution, ranked.weights_version)?;

        if !self.store.append(&record).await? {
            let original = self
                .store
                .find(record.execution_id, record.solution_id)
                .await?
                .ok_or_else(|| Error::Internal("Deduplicated feedback has no stored original".into()))?;
            warn!(
                execution_id = %original.execution_id,
                solution_id = %original.solution_id,
                "Ignoring resubmitted feedback"
            );
            let continued = wants_continuation(
                original.accepted,
                original.rating,
                self.settings.low_rating_threshold,
            );
            return Ok(CollectedFeedback {
                record: original,
                duplicate: true,
                continued,
            });
        }

        let continued = wants_continuation(record.accepted, record.rating, self.settings.low_rating_threshold);
        info!(
            execution_id = %record.execution_id,
            solution_id = %record.solution_id,
            strategy = %record.strategy,
            accepted = record.accepted,
            rating = record.rating,
            continued,
            "Feedback recorded"
        );
        Ok(CollectedFeedback {
            record,
            duplicate: false,
            continued,
        })
    }
}
