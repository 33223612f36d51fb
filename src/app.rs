//! Assembles the advisor from configuration and runs the CLI commands

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crewplan_core::calendar::DateRange;
use crewplan_core::feedback::FeedbackSubmission;
use crewplan_core::learning::PatternReport;
use crewplan_core::orchestration::{FeedbackResponse, RunStatus};
use crewplan_core::pipeline::{ProposalProvider, RuleBasedProvider};
use crewplan_core::simulation::{Scenario, SimulationRequest, SimulationResult};
use crewplan_core::resource::AllocationSnapshot;
use crewplan_core::store::{AllocationSource, StaticAllocationSource};
use crewplan_core::weights::WeightSnapshot;
use crewplan_core::{AllocationAdvisor, AnalysisRequest};
use crewplan_prompts::HttpProposalProvider;
use crewplan_storage::{StorageManager, StoredRun};

use crate::callback::HttpCallbackNotifier;
use crate::config::Config;
use crate::source::{read_snapshot, JsonFileSource};

const CALLBACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Runtime wiring for one CLI invocation
pub struct App {
    advisor: AllocationAdvisor,
    storage: Option<StorageManager>,
    provider_name: String,
}

/// What `analyze` prints
#[derive(Debug, Serialize)]
pub struct AnalyzeOutput {
    pub provider: String,
    pub status: RunStatus,
}

impl App {
    /// Build the advisor. `offline` keeps everything in memory and uses the
    /// rule-based provider.
    pub async fn build(config: &Config, source: Arc<dyn AllocationSource>, offline: bool) -> Result<Self> {
        config.validate().context("invalid configuration")?;

        let provider: Arc<dyn ProposalProvider> = match (&config.provider.endpoint, offline) {
            (Some(_), false) => Arc::new(
                HttpProposalProvider::new(&config.provider).context("cannot create proposal provider")?,
            ),
            _ => {
                info!("Using rule-based proposals");
                Arc::new(RuleBasedProvider::default())
            }
        };

        let provider_name = provider.name().to_string();
        let mut builder = AllocationAdvisor::builder(config.pipeline.clone())
            .source(source)
            .provider(provider)
            .notifier(Arc::new(HttpCallbackNotifier::new(CALLBACK_TIMEOUT)?));

        let storage = if offline {
            None
        } else {
            let manager = StorageManager::new(&config.database, config.pipeline.learning.dedup)
                .await
                .context("cannot open database")?;
            manager.health_check().await.context("database health check failed")?;
            builder = builder
                .feedback_store(manager.feedback())
                .weight_history(manager.weights())
                .run_store(manager.runs());
            Some(manager)
        };

        let advisor = builder.build().await?;
        info!(
            weights_version = advisor.current_weights().version,
            provider = %provider_name,
            persistent = storage.is_some(),
            "Advisor ready"
        );
        Ok(Self {
            advisor,
            storage,
            provider_name,
        })
    }

    pub fn advisor(&self) -> &AllocationAdvisor {
        &self.advisor
    }

    pub async fn analyze(
        &self,
        project_ids: Vec<String>,
        date_range: Option<DateRange>,
        callback_url: Option<String>,
    ) -> Result<AnalyzeOutput> {
        let summary = self
            .advisor
            .start_analysis(AnalysisRequest {
                project_ids,
                date_range,
                callback_url,
            })
            .await?;
        let status = self.advisor.status(summary.execution_id).await?;
        Ok(AnalyzeOutput {
            provider: self.provider_name.clone(),
            status,
        })
    }

    pub async fn patterns(&self, manager_id: Option<String>) -> Result<PatternReport> {
        Ok(self.advisor.analyze_patterns(manager_id).await?)
    }

    pub fn weights(&self) -> Vec<WeightSnapshot> {
        self.advisor.weight_versions()
    }

    /// Status of an execution, read back from the run store when this process
    /// did not start it
    pub async fn status(&self, execution_id: Uuid) -> Result<RunStatus> {
        Ok(self.advisor.status(execution_id).await?)
    }

    /// Record a manager's decision and run the learning cycle
    pub async fn submit_feedback(&self, submission: FeedbackSubmission) -> Result<FeedbackResponse> {
        Ok(self.advisor.submit_feedback(submission).await?)
    }

    /// Stored executions, newest first
    pub async fn recent_runs(&self, limit: u32) -> Result<Vec<StoredRun>> {
        let storage = self
            .storage
            .as_ref()
            .context("listing runs needs the database; drop --offline")?;
        Ok(storage.runs().list_recent(limit).await?)
    }

    pub async fn shutdown(self) {
        if let Some(storage) = self.storage {
            storage.close().await;
        }
    }
}

/// Run a what-if scenario against a snapshot file; needs no database or provider
pub async fn simulate(
    snapshot_path: &Path,
    kind: &str,
    params: serde_json::Value,
    date_range: Option<DateRange>,
) -> Result<SimulationResult> {
    let snapshot = read_snapshot(snapshot_path).await?;
    let scenario = Scenario::from_parts(kind, params)?;
    let request = SimulationRequest {
        scenario,
        snapshot,
        date_range,
    };
    let result = crewplan_core::simulation::simulate(&request)?;
    if result.improvement_score <= 0.0 {
        warn!(scenario = %result.scenario, "Scenario does not reduce overallocation");
    }
    Ok(result)
}

/// Allocation source for a snapshot file
pub fn file_source(path: &Path) -> Arc<dyn AllocationSource> {
    Arc::new(JsonFileSource::new(path))
}

/// Source for commands that only read stored feedback and weights
pub fn empty_source() -> Arc<dyn AllocationSource> {
    Arc::new(StaticAllocationSource::new(AllocationSnapshot::default()))
}
