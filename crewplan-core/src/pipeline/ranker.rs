//! Weighted ranking of candidate solutions

use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::conflict::Conflict;
use crate::solution::{CandidateSolution, ConflictRanking, RankedSolution};
use crate::weights::{RankingWeights, WeightSnapshot};

/// `feasibility·W_f + (1 − complexity)·W_c + deadline·W_d`
pub fn score(candidate: &CandidateSolution, weights: &RankingWeights) -> f64 {
    let deadline = if candidate.preserves_deadline { 1.0 } else { 0.0 };
    candidate.feasibility * weights.feasibility
        + (1.0 - candidate.complexity) * weights.complexity
        + deadline * weights.deadline
}

/// Rank one conflict's candidates.
///
/// Score descending, then lower complexity, then strategy order; remaining
/// ties keep input order.
pub fn rank_candidates(
    conflict_id: &str,
    candidates: Vec<CandidateSolution>,
    snapshot: &WeightSnapshot,
) -> ConflictRanking {
    let mut scored: Vec<(f64, CandidateSolution)> = candidates
        .into_iter()
        .map(|c| (score(&c, &snapshot.weights), c))
        .collect();
    scored.sort_by(|(sa, a), (sb, b)| compare(*sa, a, *sb, b));

    let solutions = scored
        .into_iter()
        .enumerate()
        .map(|(index, (rank_score, solution))| {
            debug!(
                conflict_id,
                solution_id = %solution.id,
                strategy = %solution.strategy,
                rank_score,
                "Ranked candidate"
            );
            RankedSolution {
                solution,
                rank_score,
                rank: index + 1,
                weights_version: snapshot.version,
            }
        })
        .collect();

    ConflictRanking {
        conflict_id: conflict_id.to_string(),
        solutions,
    }
}

fn compare(sa: f64, a: &CandidateSolution, sb: f64, b: &CandidateSolution) -> Ordering {
    sb.total_cmp(&sa)
        .then_with(|| a.complexity.total_cmp(&b.complexity))
        .then_with(|| a.strategy.cmp(&b.strategy))
}

/// Rank every conflict's candidates, in conflict order
pub fn rank_conflicts(
    conflicts: &[Conflict],
    candidates: &[CandidateSolution],
    snapshot: &WeightSnapshot,
) -> Vec<ConflictRanking> {
    let mut grouped: HashMap<&str, Vec<CandidateSolution>> = HashMap::new();
    for candidate in candidates {
        grouped
            .entry(candidate.conflict_id.as_str())
            .or_default()
            .push(candidate.clone());
    }

    let rankings: Vec<ConflictRanking> = conflicts
        .iter()
        .map(|conflict| {
            let group = grouped.remove(conflict.id.as_str()).unwrap_or_default();
            rank_candidates(&conflict.id, group, snapshot)
        })
        .collect();

    for orphan in grouped.keys() {
        warn!(conflict_id = orphan, "Candidates reference a conflict no longer detected");
    }
    rankings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solution::Strategy;

    fn candidate(strategy: Strategy, feasibility: f64, complexity: f64, deadline: bool) -> CandidateSolution {
        CandidateSolution::new("c1", strategy, "option", "", feasibility, complexity, deadline).unwrap()
    }

    #[test]
    fn test_score_formula() {
        let weights = RankingWeights::new(0.3, 0.45, 0.25).unwrap();
        let c = candidate(Strategy::MoveNoncritical, 0.8, 0.2, true);
        assert!((score(&c, &weights) - (0.24 + 0.36 + 0.25)).abs() < 1e-12);

        let fallback = CandidateSolution::fallback("c1");
        assert_eq!(score(&fallback, &weights), 0.0);
    }

    #[test]
    fn test_ties_break_on_complexity_then_strategy() {
        // Equal weights make the three candidates below score the same
        let snapshot = WeightSnapshot::initial(RankingWeights::new(0.5, 0.5, 0.0).unwrap());
        let extend = candidate(Strategy::ExtendDuration, 0.5, 0.5, false);
        let redistribute = candidate(Strategy::RedistributeWithSlack, 0.5, 0.5, false);
        let simpler = candidate(Strategy::Unknown, 0.25, 0.25, false);

        let ranking = rank_candidates(
            "c1",
            vec![extend.clone(), redistribute.clone(), simpler.clone()],
            &snapshot,
        );
        let ids: Vec<_> = ranking.solutions.iter().map(|r| r.solution.id).collect();
        assert_eq!(ids, vec![simpler.id, redistribute.id, extend.id]);
        assert_eq!(ranking.solutions[0].rank, 1);
        assert_eq!(ranking.solutions[2].rank, 3);
        assert_eq!(ranking.best().unwrap().weights_version, 1);
    }

    #[test]
    fn test_unknown_strategy_ranked_below_known_on_tie() {
        let snapshot = WeightSnapshot::initial(RankingWeights::default());
        let unknown = candidate(Strategy::Unknown, 0.7, 0.3, true);
        let known = candidate(Strategy::ExtendDuration, 0.7, 0.3, true);
        let ranking = rank_candidates("c1", vec![unknown.clone(), known.clone()], &snapshot);
        assert_eq!(ranking.solutions[0].solution.id, known.id);
    }
}
