//! End-to-end tests of the allocation advisor with stub collaborators

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinSet;
use uuid::Uuid;

use common::*;
use crewplan_core::conflict::Severity;
use crewplan_core::feedback::{FeedbackSubmission, ImplementationOutcome};
use crewplan_core::orchestration::{AnalysisRequest, Degradation, Stage};
use crewplan_core::resource::AllocationSnapshot;
use crewplan_core::settings::PipelineSettings;
use crewplan_core::simulation::{Scenario, SimulationRequest};
use crewplan_core::solution::Strategy;
use crewplan_core::store::{InMemoryRunStore, InMemoryWeightHistory, StaticAllocationSource, WeightHistory};
use crewplan_core::weights::{RankingWeights, WeightSnapshot};
use crewplan_core::AllocationAdvisor;

fn request(projects: &[&str]) -> AnalysisRequest {
    AnalysisRequest {
        project_ids: projects.iter().map(|p| p.to_string()).collect(),
        ..AnalysisRequest::default()
    }
}

fn feedback(execution_id: Uuid, solution_id: Uuid, accepted: bool, rating: u8) -> FeedbackSubmission {
    FeedbackSubmission {
        execution_id,
        solution_id,
        manager_id: Some("mgr-1".into()),
        accepted,
        rating,
        outcome: if accepted {
            ImplementationOutcome::Success
        } else {
            ImplementationOutcome::Failed
        },
        context: serde_json::json!({}),
    }
}

async fn solution_ids(advisor: &AllocationAdvisor, execution_id: Uuid) -> Vec<Uuid> {
    advisor
        .status(execution_id)
        .await
        .unwrap()
        .rankings
        .iter()
        .flat_map(|r| r.solutions.iter().map(|s| s.solution.id))
        .collect()
}

#[tokio::test]
async fn test_single_overallocation_is_detected_and_ranked() {
    let provider = Arc::new(CountingProvider::default());
    let advisor = advisor_with(single_conflict_snapshot(), provider.clone()).await;

    let summary = advisor.start_analysis(request(&["A", "B"])).await.unwrap();
    assert_eq!(summary.stage, Stage::RankingComplete);
    assert_eq!(summary.conflict_count, 1);
    assert_eq!(summary.critical_conflicts, 0);
    assert!(summary.solution_count >= 1);
    assert_eq!(provider.calls(), 1);

    let status = advisor.status(summary.execution_id).await.unwrap();
    let conflict = &status.conflicts[0];
    assert_eq!(conflict.resource_id, "R1");
    assert_eq!(conflict.allocated_hours, 11.0);
    assert_eq!(conflict.capacity_hours, 8.0);
    assert!((conflict.overallocation_ratio - 0.375).abs() < 1e-12);
    assert_eq!(conflict.severity, Severity::Medium);

    let ranking = &status.rankings[0];
    assert_eq!(ranking.conflict_id, conflict.id);
    for pair in ranking.solutions.windows(2) {
        assert!(pair[0].rank_score >= pair[1].rank_score);
    }
}

#[tokio::test]
async fn test_no_conflicts_short_circuits_generation() {
    let provider = Arc::new(CountingProvider::default());
    let advisor = advisor_with(quiet_snapshot(), provider.clone()).await;

    let summary = advisor.start_analysis(request(&["A"])).await.unwrap();
    assert_eq!(summary.stage, Stage::NoConflictsDone);
    assert_eq!(summary.conflict_count, 0);
    assert_eq!(summary.solution_count, 0);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_unusable_provider_output_falls_back() {
    let advisor = advisor_with(two_conflict_snapshot(), Arc::new(EmptyProvider)).await;
    let summary = advisor.start_analysis(request(&[])).await.unwrap();

    let status = advisor.status(summary.execution_id).await.unwrap();
    assert_eq!(status.rankings.len(), 2);
    for ranking in &status.rankings {
        assert_eq!(ranking.solutions.len(), 1);
        let only = &ranking.solutions[0].solution;
        assert!(only.is_fallback());
        assert_eq!(only.strategy, Strategy::Unknown);
    }
    let fallbacks = status
        .degradations
        .iter()
        .filter(|d| matches!(d, Degradation::FallbackCandidate { .. }))
        .count();
    assert_eq!(fallbacks, 2);
}

#[tokio::test]
async fn test_provider_outage_never_aborts_the_run() {
    let advisor = advisor_with(single_conflict_snapshot(), Arc::new(DownProvider)).await;
    let summary = advisor.start_analysis(request(&["A", "B"])).await.unwrap();
    assert_eq!(summary.stage, Stage::RankingComplete);
    assert_eq!(summary.solution_count, 1);
}

#[tokio::test]
async fn test_rejection_reenters_detection_and_keeps_solution_ids() {
    let provider = Arc::new(CountingProvider::default());
    let advisor = advisor_with(two_conflict_snapshot(), provider.clone()).await;
    let summary = advisor.start_analysis(request(&["A", "B"])).await.unwrap();
    let ids = solution_ids(&advisor, summary.execution_id).await;
    assert_eq!(provider.calls(), 2);

    let response = advisor
        .submit_feedback(feedback(summary.execution_id, ids[0], false, 1))
        .await
        .unwrap();
    assert!(response.continued);
    assert!(response.reentered);
    assert!(!response.duplicate);
    assert_eq!(response.stage, Stage::RankingComplete);
    assert_eq!(response.iterations, 1);

    // Re-entry re-ranks existing candidates instead of asking the provider again
    assert_eq!(provider.calls(), 2);
    let mut after = solution_ids(&advisor, summary.execution_id).await;
    let mut before = ids.clone();
    after.sort();
    before.sort();
    assert_eq!(after, before);

    let status = advisor.status(summary.execution_id).await.unwrap();
    assert_eq!(status.feedback_history.len(), 1);
}

#[tokio::test]
async fn test_acceptance_ends_the_run() {
    let advisor = advisor_with(single_conflict_snapshot(), Arc::new(CountingProvider::default())).await;
    let summary = advisor.start_analysis(request(&["A", "B"])).await.unwrap();
    let ids = solution_ids(&advisor, summary.execution_id).await;

    let response = advisor
        .submit_feedback(feedback(summary.execution_id, ids[0], true, 5))
        .await
        .unwrap();
    assert!(!response.continued);
    assert!(!response.reentered);
    assert_eq!(response.stage, Stage::Done);
    assert_eq!(advisor.stage(summary.execution_id).await.unwrap(), Stage::Done);
}

#[tokio::test]
async fn test_iterations_are_capped() {
    let advisor = advisor_with(two_conflict_snapshot(), Arc::new(CountingProvider::default())).await;
    let summary = advisor.start_analysis(request(&["A", "B"])).await.unwrap();
    let ids = solution_ids(&advisor, summary.execution_id).await;
    assert!(ids.len() >= 5);

    for (round, id) in ids.iter().take(3).enumerate() {
        let response = advisor
            .submit_feedback(feedback(summary.execution_id, *id, false, 1))
            .await
            .unwrap();
        assert!(response.reentered);
        assert_eq!(response.iterations, round as u32 + 1);
    }

    let response = advisor
        .submit_feedback(feedback(summary.execution_id, ids[3], false, 1))
        .await
        .unwrap();
    assert!(response.continued);
    assert!(!response.reentered);
    assert_eq!(response.stage, Stage::Done);
    assert_eq!(response.iterations, 3);

    // Feedback is still accepted once the run is done
    let response = advisor
        .submit_feedback(feedback(summary.execution_id, ids[4], true, 4))
        .await
        .unwrap();
    assert_eq!(response.stage, Stage::Done);
}

#[tokio::test]
async fn test_duplicate_feedback_returns_original_decision() {
    let advisor = advisor_with(two_conflict_snapshot(), Arc::new(CountingProvider::default())).await;
    let summary = advisor.start_analysis(request(&["A", "B"])).await.unwrap();
    let ids = solution_ids(&advisor, summary.execution_id).await;

    let first = advisor
        .submit_feedback(feedback(summary.execution_id, ids[0], true, 5))
        .await
        .unwrap();
    assert!(!first.continued);

    let second = advisor
        .submit_feedback(feedback(summary.execution_id, ids[0], false, 1))
        .await
        .unwrap();
    assert!(second.duplicate);
    assert!(!second.continued);
    assert!(!second.reentered);

    let status = advisor.status(summary.execution_id).await.unwrap();
    assert_eq!(status.feedback_history.len(), 1);
    let report = advisor.analyze_patterns(None).await.unwrap();
    assert_eq!(report.total_records, 1);
}

#[tokio::test]
async fn test_feedback_errors() {
    let advisor = advisor_with(single_conflict_snapshot(), Arc::new(CountingProvider::default())).await;
    let summary = advisor.start_analysis(request(&["A", "B"])).await.unwrap();
    let ids = solution_ids(&advisor, summary.execution_id).await;

    let err = advisor
        .submit_feedback(feedback(Uuid::new_v4(), ids[0], true, 5))
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = advisor
        .submit_feedback(feedback(summary.execution_id, Uuid::new_v4(), true, 5))
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = advisor
        .submit_feedback(feedback(summary.execution_id, ids[0], true, 0))
        .await
        .unwrap_err();
    assert!(err.is_validation());

    assert!(advisor.status(Uuid::new_v4()).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_unknown_project_and_bad_snapshot_are_validation_errors() {
    let advisor = advisor_with(single_conflict_snapshot(), Arc::new(CountingProvider::default())).await;
    let err = advisor.start_analysis(request(&["Z"])).await.unwrap_err();
    assert!(err.is_validation());

    let mut broken = single_conflict_snapshot();
    broken.assignments.push(assignment("x1", "A", "R404", "2025-02-17", 3.0));
    let advisor = advisor_with(broken, Arc::new(CountingProvider::default())).await;
    let err = advisor.start_analysis(request(&["A"])).await.unwrap_err();
    assert!(err.is_validation());
    assert!(advisor.executions().is_empty());
}

#[tokio::test]
async fn test_consistent_feedback_adjusts_weights() {
    let history = Arc::new(InMemoryWeightHistory::new());
    let advisor = AllocationAdvisor::builder(fast_settings())
        .source(Arc::new(StaticAllocationSource::new(two_conflict_snapshot())))
        .provider(Arc::new(CountingProvider::default()))
        .weight_history(history.clone())
        .build()
        .await
        .unwrap();
    assert_eq!(advisor.current_weights().version, 1);

    for _ in 0..5 {
        let summary = advisor.start_analysis(request(&["A", "B"])).await.unwrap();
        let status = advisor.status(summary.execution_id).await.unwrap();
        let redistribute = status.rankings[0]
            .solutions
            .iter()
            .find(|s| s.solution.strategy == Strategy::RedistributeWithSlack)
            .unwrap()
            .solution
            .id;
        advisor
            .submit_feedback(feedback(summary.execution_id, redistribute, true, 5))
            .await
            .unwrap();
    }

    let current = advisor.current_weights();
    assert_eq!(current.version, 2);
    assert!((current.weights.sum() - 1.0).abs() < 1e-9);
    for (new, old) in current
        .weights
        .as_array()
        .iter()
        .zip(RankingWeights::default().as_array())
    {
        assert!((new - old).abs() <= 0.05 + 1e-9);
    }
    assert_eq!(history.latest().await.unwrap().unwrap().version, 2);

    let report = advisor.analyze_patterns(Some("mgr-1".into())).await.unwrap();
    let signal = report.signal(Strategy::RedistributeWithSlack).unwrap();
    assert_eq!(signal.samples, 5);
    assert_eq!(signal.acceptance_rate, 1.0);
}

#[tokio::test]
async fn test_concurrent_executions_are_independent() {
    let advisor = Arc::new(advisor_with(two_conflict_snapshot(), Arc::new(CountingProvider::default())).await);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let advisor = Arc::clone(&advisor);
            tokio::spawn(async move { advisor.start_analysis(request(&["A", "B"])).await })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.stage, Stage::RankingComplete);
        assert_eq!(summary.conflict_count, 2);
        ids.push(summary.execution_id);
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 8);
    assert_eq!(advisor.executions().len(), 8);
}

#[tokio::test]
async fn test_completion_callback() {
    let notifier = Arc::new(RecordingNotifier::default());
    let advisor = AllocationAdvisor::builder(fast_settings())
        .source(Arc::new(StaticAllocationSource::new(single_conflict_snapshot())))
        .notifier(notifier.clone())
        .build()
        .await
        .unwrap();

    let summary = advisor
        .start_analysis(AnalysisRequest {
            callback_url: Some("http://localhost:9999/done".into()),
            ..request(&["A", "B"])
        })
        .await
        .unwrap();

    let notices = notifier.notices.lock();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].summary.execution_id, summary.execution_id);
    assert_eq!(notices[0].callback_url, "http://localhost:9999/done");
}

#[tokio::test]
async fn test_failed_callback_is_recorded_not_raised() {
    let advisor = AllocationAdvisor::builder(fast_settings())
        .source(Arc::new(StaticAllocationSource::new(single_conflict_snapshot())))
        .notifier(Arc::new(FailingNotifier))
        .build()
        .await
        .unwrap();

    let summary = advisor
        .start_analysis(AnalysisRequest {
            callback_url: Some("http://localhost:9999/done".into()),
            ..request(&["A", "B"])
        })
        .await
        .unwrap();
    let status = advisor.status(summary.execution_id).await.unwrap();
    assert!(status
        .degradations
        .iter()
        .any(|d| matches!(d, Degradation::Callback { .. })));
}

#[tokio::test]
async fn test_builder_requires_source_and_restores_history() {
    let err = AllocationAdvisor::builder(PipelineSettings::default())
        .build()
        .await
        .err()
        .unwrap();
    assert_eq!(err.category(), "configuration");

    let history = Arc::new(InMemoryWeightHistory::new());
    history
        .save(&WeightSnapshot::initial(RankingWeights::default()))
        .await
        .unwrap();
    let mut second = WeightSnapshot::initial(RankingWeights::new(0.4, 0.4, 0.2).unwrap());
    second.version = 2;
    history.save(&second).await.unwrap();

    let advisor = AllocationAdvisor::builder(PipelineSettings::default())
        .source(Arc::new(StaticAllocationSource::new(AllocationSnapshot::default())))
        .weight_history(history)
        .build()
        .await
        .unwrap();
    assert_eq!(advisor.current_weights().version, 2);
    assert_eq!(advisor.weight_versions().len(), 2);
}

#[tokio::test]
async fn test_huge_project_delay_is_a_validation_error() {
    let advisor = advisor_with(single_conflict_snapshot(), Arc::new(CountingProvider::default())).await;
    let simulate = |days: i64| {
        let scenario =
            Scenario::from_parts("delay_project", serde_json::json!({"project_id": "B", "days": days})).unwrap();
        advisor.simulate(&SimulationRequest {
            scenario,
            snapshot: single_conflict_snapshot(),
            date_range: None,
        })
    };

    assert!(simulate(1_000_000_000).unwrap_err().is_validation());
    assert!(simulate(i64::MIN).unwrap_err().is_validation());

    let result = simulate(7).unwrap();
    assert_eq!(result.before.total, 1);
    assert_eq!(result.after.total, 0);
}

async fn redistribute_solution(advisor: &AllocationAdvisor, execution_id: Uuid) -> Uuid {
    advisor.status(execution_id).await.unwrap().rankings[0]
        .solutions
        .iter()
        .find(|s| s.solution.strategy == Strategy::RedistributeWithSlack)
        .unwrap()
        .solution
        .id
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_learning_cycles_publish_every_adjustment() {
    const RUNS: usize = 8;
    let mut settings = fast_settings();
    settings.learning.min_samples = 1;
    settings.learning.max_cas_retries = 64;
    let history = Arc::new(InMemoryWeightHistory::new());
    let advisor = Arc::new(
        AllocationAdvisor::builder(settings)
            .source(Arc::new(StaticAllocationSource::new(two_conflict_snapshot())))
            .provider(Arc::new(CountingProvider::default()))
            .weight_history(history.clone())
            .build()
            .await
            .unwrap(),
    );

    let mut submissions = Vec::new();
    for _ in 0..RUNS {
        let summary = advisor.start_analysis(request(&["A", "B"])).await.unwrap();
        let solution = redistribute_solution(&advisor, summary.execution_id).await;
        submissions.push(feedback(summary.execution_id, solution, true, 5));
    }
    let execution_ids: HashSet<Uuid> = submissions.iter().map(|s| s.execution_id).collect();

    let mut cycles = JoinSet::new();
    for submission in submissions {
        let advisor = Arc::clone(&advisor);
        cycles.spawn(async move { advisor.submit_feedback(submission).await });
    }
    while let Some(joined) = cycles.join_next().await {
        let response = joined.unwrap().unwrap();
        assert_eq!(response.stage, Stage::Done);
    }

    let versions = advisor.weight_versions();
    assert_eq!(advisor.current_weights().version, RUNS as u64 + 1);
    assert_eq!(
        versions.iter().map(|v| v.version).collect::<Vec<_>>(),
        (1..=RUNS as u64 + 1).collect::<Vec<_>>()
    );
    // Each learning cycle published exactly one version of its own
    let adjusted_by: HashSet<Uuid> = versions
        .iter()
        .skip(1)
        .filter_map(|v| execution_ids.iter().find(|id| v.reason.contains(&id.to_string())).copied())
        .collect();
    assert_eq!(adjusted_by, execution_ids);
    assert_eq!(history.all().await.unwrap().len(), RUNS + 1);

    for execution_id in &execution_ids {
        let status = advisor.status(*execution_id).await.unwrap();
        assert!(!status
            .degradations
            .iter()
            .any(|d| matches!(d, Degradation::WeightUpdate { .. })));
    }
    assert!((advisor.current_weights().weights.sum() - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_resting_runs_beyond_the_limit_are_evicted() {
    let mut settings = fast_settings();
    settings.runs.max_resident = 2;
    let advisor = AllocationAdvisor::builder(settings)
        .source(Arc::new(StaticAllocationSource::new(single_conflict_snapshot())))
        .build()
        .await
        .unwrap();

    let mut ids = Vec::new();
    for _ in 0..4 {
        ids.push(advisor.start_analysis(request(&["A", "B"])).await.unwrap().execution_id);
    }

    let resident: HashSet<Uuid> = advisor.executions().into_iter().collect();
    assert_eq!(resident, ids[2..].iter().copied().collect());
    // No run store, so the oldest runs are gone for good
    assert!(advisor.status(ids[0]).await.unwrap_err().is_not_found());
    assert_eq!(advisor.stage(ids[3]).await.unwrap(), Stage::RankingComplete);
}

#[tokio::test]
async fn test_evicted_runs_are_restored_from_the_run_store() {
    let mut settings = fast_settings();
    settings.runs.max_resident = 2;
    let runs = Arc::new(InMemoryRunStore::new());
    let advisor = AllocationAdvisor::builder(settings)
        .source(Arc::new(StaticAllocationSource::new(single_conflict_snapshot())))
        .run_store(runs.clone())
        .build()
        .await
        .unwrap();

    let mut ids = Vec::new();
    for _ in 0..4 {
        ids.push(advisor.start_analysis(request(&["A", "B"])).await.unwrap().execution_id);
    }
    assert_eq!(runs.len(), 4);
    assert!(!advisor.executions().contains(&ids[0]));

    let ids_of_first = solution_ids(&advisor, ids[0]).await;
    assert!(advisor.executions().contains(&ids[0]));
    assert_eq!(advisor.executions().len(), 2);

    let response = advisor
        .submit_feedback(feedback(ids[0], ids_of_first[0], true, 5))
        .await
        .unwrap();
    assert_eq!(response.stage, Stage::Done);

    // The stored copy follows the run to its new resting stage
    let stored = crewplan_core::store::RunStore::load(runs.as_ref(), ids[0])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.stage, Stage::Done);
    assert_eq!(stored.feedback_history.len(), 1);
}
