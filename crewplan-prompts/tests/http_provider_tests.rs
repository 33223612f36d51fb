//! HTTP proposal provider tests against a mock proposal service

use chrono::NaiveDate;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crewplan_core::pipeline::{consolidate, detect_conflicts, ProposalProvider, ProposalRequest};
use crewplan_core::resource::{AllocationSnapshot, Assignment, Project, RawResource};
use crewplan_core::settings::{PipelineSettings, RetryPolicy};
use crewplan_core::solution::{CandidateOrigin, Strategy};
use crewplan_core::store::StaticAllocationSource;
use crewplan_core::{AllocationAdvisor, AnalysisRequest};
use crewplan_prompts::{HttpProposalProvider, ProviderConfig};

fn snapshot() -> AllocationSnapshot {
    let day = NaiveDate::from_ymd_opt(2025, 2, 17).unwrap();
    let assignment = |id: &str, project: &str, hours: f64| {
        Assignment::builder()
            .id(id)
            .project_id(project)
            .resource_id("R1")
            .dates(day, day)
            .hours(hours)
            .slack_days(2)
            .build()
            .unwrap()
    };
    AllocationSnapshot {
        projects: vec![Project::new("A", "Tower"), Project::new("B", "Bridge")],
        resources: vec![RawResource::new("R1", "Ana Souza", "Carpenter", 8.0)],
        assignments: vec![assignment("a1", "A", 5.0), assignment("b1", "B", 6.0)],
    }
}

fn request() -> ProposalRequest {
    let resources = consolidate(&snapshot()).unwrap();
    ProposalRequest {
        execution_id: Uuid::new_v4(),
        conflict: detect_conflicts(&resources, None).remove(0),
        min_proposals: 2,
        max_proposals: 3,
    }
}

fn provider_for(server: &MockServer, api_key: Option<&str>) -> HttpProposalProvider {
    HttpProposalProvider::new(&ProviderConfig {
        endpoint: Some(format!("{}/v1/proposals", server.uri())),
        api_key: api_key.map(String::from),
        timeout_secs: 5,
        ..ProviderConfig::default()
    })
    .unwrap()
}

fn proposals_body() -> serde_json::Value {
    json!([
        {
            "strategy": "MOVE_NONCRITICAL",
            "description": "Move task b1 to Tuesday",
            "reasoning": "b1 has two days of slack",
            "feasibility": 0.9,
            "complexity": 0.2,
            "preserves_deadline": true,
            "impact": {"affected_tasks": ["b1"], "days_impact": 1, "resources_needed": 0}
        },
        {
            "strategy": "EXTEND_DURATION",
            "description": "Spread a1 over two days",
            "reasoning": "keeps the crew",
            "feasibility": 0.6,
            "complexity": 0.4,
            "preserves_deadline": false
        }
    ])
}

#[tokio::test]
async fn test_posts_prompt_and_conflict_context() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/proposals"))
        .and(header("authorization", "Bearer secret-key"))
        .and(body_partial_json(json!({
            "model": "default",
            "context": {
                "conflict": {"id": "R1:2025-02-17", "resource_id": "R1"},
                "min_proposals": 2,
                "max_proposals": 3
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(proposals_body()))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider_for(&server, Some("secret-key"));
    let proposals = provider.propose(&request()).await.unwrap();

    assert_eq!(proposals.len(), 2);
    assert_eq!(proposals[0].strategy.as_deref(), Some("MOVE_NONCRITICAL"));
    assert_eq!(provider.name(), "http");
}

#[tokio::test]
async fn test_fenced_text_envelope_is_parsed() {
    let server = MockServer::start().await;
    let content = format!("Here you go:\n```json\n{}\n```", proposals_body());
    Mock::given(method("POST"))
        .and(path("/v1/proposals"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "content": content })))
        .mount(&server)
        .await;

    let proposals = provider_for(&server, None).propose(&request()).await.unwrap();
    assert_eq!(proposals.len(), 2);
}

#[tokio::test]
async fn test_server_error_is_a_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let err = provider_for(&server, None).propose(&request()).await.unwrap_err();
    assert!(err.is_recoverable());
    assert!(err.to_string().contains("503"));
}

#[tokio::test]
async fn test_prose_without_json_is_a_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("I am unable to help."))
        .mount(&server)
        .await;

    let err = provider_for(&server, None).propose(&request()).await.unwrap_err();
    assert!(matches!(err, crewplan_core::Error::Provider { .. }));
}

#[tokio::test]
async fn test_advisor_ranks_service_proposals() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/proposals"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "proposals": proposals_body() })))
        .mount(&server)
        .await;

    let mut settings = PipelineSettings::default();
    settings.generator.retry = RetryPolicy {
        max_attempts: 1,
        initial_delay_ms: 1,
        backoff_multiplier: 1.0,
        max_delay_ms: 1,
    };
    let advisor = AllocationAdvisor::builder(settings)
        .source(Arc::new(StaticAllocationSource::new(snapshot())))
        .provider(Arc::new(provider_for(&server, None)))
        .build()
        .await
        .unwrap();

    let summary = advisor
        .start_analysis(AnalysisRequest {
            project_ids: vec!["A".into(), "B".into()],
            date_range: None,
            callback_url: None,
        })
        .await
        .unwrap();
    assert_eq!(summary.conflict_count, 1);
    assert_eq!(summary.solution_count, 2);

    let status = advisor.status(summary.execution_id).await.unwrap();
    let best = status.rankings[0].best().unwrap();
    assert_eq!(best.solution.strategy, Strategy::MoveNoncritical);
    assert_eq!(best.solution.origin, CandidateOrigin::Provider);
    assert_eq!(best.rank, 1);
}
