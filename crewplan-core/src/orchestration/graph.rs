//! Stage graph: guarded, pure transition functions

use crate::orchestration::state::{RunState, Stage};

/// Whether the graph has an edge from `from` to `to`
pub fn can_transition(from: Stage, to: Stage) -> bool {
    use Stage::*;
    matches!(
        (from, to),
        (Consolidating, Detecting)
            | (Detecting, Generating)
            | (Detecting, NoConflictsDone)
            | (Generating, Ranking)
            | (Ranking, RankingComplete)
            | (RankingComplete, FeedbackReceived)
            | (NoConflictsDone, FeedbackReceived)
            | (Done, FeedbackReceived)
            | (FeedbackReceived, PatternAnalysis)
            | (PatternAnalysis, WeightAdjusted)
            | (WeightAdjusted, Detecting)
            | (WeightAdjusted, Done)
    )
}

/// Edge to follow from the state's current stage, `None` at a resting stage
pub fn next_stage(state: &RunState, max_iterations: u32) -> Option<Stage> {
    match state.stage {
        Stage::Consolidating => Some(Stage::Detecting),
        Stage::Detecting if state.conflicts.is_empty() => Some(Stage::NoConflictsDone),
        Stage::Detecting => Some(Stage::Generating),
        Stage::Generating => Some(Stage::Ranking),
        Stage::Ranking => Some(Stage::RankingComplete),
        Stage::FeedbackReceived => Some(Stage::PatternAnalysis),
        Stage::PatternAnalysis => Some(Stage::WeightAdjusted),
        Stage::WeightAdjusted if state.continued && state.iterations < max_iterations => {
            Some(Stage::Detecting)
        }
        Stage::WeightAdjusted => Some(Stage::Done),
        Stage::RankingComplete | Stage::NoConflictsDone | Stage::Done => None,
    }
}
