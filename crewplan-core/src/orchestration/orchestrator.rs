//! The allocation advisor: entry point for analysis, feedback, status and simulation

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::feedback::{FeedbackScope, FeedbackSubmission};
use crate::learning::{FeedbackCollector, PatternAnalyzer, PatternReport, WeightAdjuster, WeightAdjustment};
use crate::orchestration::graph;
use crate::orchestration::state::{
    AnalysisRequest, AnalysisSummary, Degradation, FeedbackResponse, RunState, RunStatus, Stage,
};
use crate::pipeline::{consolidate, detect_conflicts, rank_conflicts, ProposalProvider, RuleBasedProvider, SolutionGenerator};
use crate::settings::PipelineSettings;
use crate::simulation::{self, SimulationRequest, SimulationResult};
use crate::store::{
    AllocationSource, CallbackNotifier, CompletionNotice, FeedbackStore, InMemoryFeedbackStore,
    InMemoryWeightHistory, NoopNotifier, RunStore, WeightHistory,
};
use crate::weights::{VersionedWeightStore, WeightSnapshot};
use crate::{Error, Result};

/// Registry entry for one execution.
///
/// `state` holds the last published snapshot for readers; `lease` is held by
/// whichever task currently owns the run, so there is one writer at a time.
struct ExecutionSlot {
    state: RwLock<RunState>,
    lease: tokio::sync::Mutex<()>,
}

impl ExecutionSlot {
    fn new(state: RunState) -> Self {
        Self {
            state: RwLock::new(state),
            lease: tokio::sync::Mutex::new(()),
        }
    }

    fn read(&self) -> RunState {
        self.state.read().clone()
    }

    fn publish(&self, state: &RunState) {
        *self.state.write() = state.clone();
    }
}

/// Runs the analysis pipeline and the learning loop for many executions
pub struct AllocationAdvisor {
    settings: PipelineSettings,
    source: Arc<dyn AllocationSource>,
    generator: SolutionGenerator,
    collector: FeedbackCollector,
    analyzer: PatternAnalyzer,
    adjuster: WeightAdjuster,
    weight_history: Arc<dyn WeightHistory>,
    notifier: Arc<dyn CallbackNotifier>,
    run_store: Option<Arc<dyn RunStore>>,
    weights: VersionedWeightStore,
    executions: DashMap<Uuid, Arc<ExecutionSlot>>,
}

/// Builder for [`AllocationAdvisor`]; only the allocation source is required
pub struct AdvisorBuilder {
    settings: PipelineSettings,
    source: Option<Arc<dyn AllocationSource>>,
    provider: Option<Arc<dyn ProposalProvider>>,
    feedback_store: Option<Arc<dyn FeedbackStore>>,
    weight_history: Option<Arc<dyn WeightHistory>>,
    notifier: Option<Arc<dyn CallbackNotifier>>,
    run_store: Option<Arc<dyn RunStore>>,
}

impl AdvisorBuilder {
    pub fn new(settings: PipelineSettings) -> Self {
        Self {
            settings,
            source: None,
            provider: None,
            feedback_store: None,
            weight_history: None,
            notifier: None,
            run_store: None,
        }
    }

    pub fn source(mut self, source: Arc<dyn AllocationSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn ProposalProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn feedback_store(mut self, store: Arc<dyn FeedbackStore>) -> Self {
        self.feedback_store = Some(store);
        self
    }

    pub fn weight_history(mut self, history: Arc<dyn WeightHistory>) -> Self {
        self.weight_history = Some(history);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn CallbackNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Without a run store, executions evicted from memory are gone
    pub fn run_store(mut self, store: Arc<dyn RunStore>) -> Self {
        self.run_store = Some(store);
        self
    }

    /// Validate settings and restore the weight history.
    ///
    /// An empty history is seeded with the configured initial weights.
    pub async fn build(self) -> Result<AllocationAdvisor> {
        self.settings.validate()?;
        let source = self
            .source
            .ok_or_else(|| Error::configuration("An allocation source is required"))?;
        let provider = self
            .provider
            .unwrap_or_else(|| Arc::new(RuleBasedProvider::new()));
        let feedback_store = self
            .feedback_store
            .unwrap_or_else(|| Arc::new(InMemoryFeedbackStore::new(self.settings.learning.dedup)));
        let weight_history = self
            .weight_history
            .unwrap_or_else(|| Arc::new(InMemoryWeightHistory::new()));
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(NoopNotifier));

        let history = weight_history.all().await?;
        let weights = if history.is_empty() {
            let store = VersionedWeightStore::new(self.settings.initial_weights)?;
            weight_history.save(&store.current()).await?;
            store
        } else {
            VersionedWeightStore::from_history(history)?
        };
        info!(
            weights_version = weights.current().version,
            provider = provider.name(),
            "Allocation advisor ready"
        );

        Ok(AllocationAdvisor {
            generator: SolutionGenerator::new(provider, self.settings.generator.clone()),
            collector: FeedbackCollector::new(feedback_store, self.settings.learning.clone()),
            analyzer: PatternAnalyzer::new(&self.settings.learning),
            adjuster: WeightAdjuster::new(self.settings.learning.clone()),
            settings: self.settings,
            source,
            weight_history,
            notifier,
            run_store: self.run_store,
            weights,
            executions: DashMap::new(),
        })
    }
}

impl AllocationAdvisor {
    pub fn builder(settings: PipelineSettings) -> AdvisorBuilder {
        AdvisorBuilder::new(settings)
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Load allocations and run one analysis pass up to a resting stage
    pub async fn start_analysis(&self, request: AnalysisRequest) -> Result<AnalysisSummary> {
        request.validate()?;
        let snapshot = self
            .source
            .load(&request.project_ids, request.date_range)
            .await?;
        if let Some(missing) = request
            .project_ids
            .iter()
            .find(|id| snapshot.project(id).is_none())
        {
            return Err(Error::validation(format!("Unknown project {}", missing)));
        }

        let execution_id = Uuid::new_v4();
        let state = RunState::new(execution_id, request, snapshot, self.weights.current());
        let slot = Arc::new(ExecutionSlot::new(state.clone()));
        self.executions.insert(execution_id, Arc::clone(&slot));
        let _lease = slot.lease.lock().await;
        info!(%execution_id, projects = ?state.request.project_ids, "Starting analysis");

        let mut state = match self.drive(&slot, state).await {
            Ok(state) => state,
            Err(err) => {
                error!(%execution_id, error = %err, category = err.category(), "Analysis failed");
                self.executions.remove(&execution_id);
                return Err(err);
            }
        };
        self.notify_completion(&slot, &mut state).await;
        self.persist_run(&slot, &mut state).await;
        self.evict_resting();
        Ok(state.summary())
    }

    /// Record feedback and run the learning cycle for the execution
    pub async fn submit_feedback(&self, submission: FeedbackSubmission) -> Result<FeedbackResponse> {
        let execution_id = submission.execution_id;
        let slot = self.slot(execution_id).await?;
        let _lease = slot.lease.lock().await;
        let mut state = slot.read();

        if !state.stage.is_resting() {
            return Err(Error::validation(format!(
                "Execution {} is at stage {} and cannot take feedback yet",
                execution_id, state.stage
            )));
        }

        let collected = self.collector.collect(&state, &submission).await?;
        if collected.duplicate {
            return Ok(FeedbackResponse {
                continued: collected.continued,
                reentered: false,
                duplicate: true,
                stage: state.stage,
                iterations: state.iterations,
                weights_version: state.weights.version,
            });
        }

        let iterations_before = state.iterations;
        state.feedback_history.push(collected.record);
        state.continued = collected.continued;
        let resting = state.clone();
        state.transition(Stage::FeedbackReceived)?;
        slot.publish(&state);

        let mut state = match self.drive(&slot, state).await {
            Ok(state) => state,
            Err(err) => {
                error!(%execution_id, error = %err, "Learning cycle failed");
                slot.publish(&resting);
                return Err(err);
            }
        };
        let reentered = state.iterations > iterations_before;
        if reentered {
            self.notify_completion(&slot, &mut state).await;
        }
        self.persist_run(&slot, &mut state).await;

        Ok(FeedbackResponse {
            continued: collected.continued,
            reentered,
            duplicate: false,
            stage: state.stage,
            iterations: state.iterations,
            weights_version: state.weights.version,
        })
    }

    /// Latest published state of an execution
    pub async fn status(&self, execution_id: Uuid) -> Result<RunStatus> {
        Ok(self.slot(execution_id).await?.read().status())
    }

    pub async fn stage(&self, execution_id: Uuid) -> Result<Stage> {
        Ok(self.slot(execution_id).await?.read().stage)
    }

    /// Run a what-if scenario on a supplied snapshot
    pub fn simulate(&self, request: &SimulationRequest) -> Result<SimulationResult> {
        simulation::simulate(request)
    }

    /// Pattern report over the stored feedback, for one manager or globally
    pub async fn analyze_patterns(&self, manager_id: Option<String>) -> Result<PatternReport> {
        let scope = manager_id
            .clone()
            .map(FeedbackScope::Manager)
            .unwrap_or(FeedbackScope::Global);
        let records = self.collector.store().list(&scope).await?;
        Ok(self.analyzer.analyze(&records, manager_id))
    }

    pub fn current_weights(&self) -> WeightSnapshot {
        self.weights.current()
    }

    pub fn weight_versions(&self) -> Vec<WeightSnapshot> {
        self.weights.history()
    }

    /// Executions currently held in memory
    pub fn executions(&self) -> Vec<Uuid> {
        self.executions.iter().map(|e| *e.key()).collect()
    }

    /// Drop an execution from the registry; shared state is unaffected
    pub fn abandon(&self, execution_id: Uuid) -> bool {
        self.executions.remove(&execution_id).is_some()
    }

    /// Resident slot for an execution, restoring it from the run store if needed
    async fn slot(&self, execution_id: Uuid) -> Result<Arc<ExecutionSlot>> {
        if let Some(entry) = self.executions.get(&execution_id) {
            return Ok(Arc::clone(entry.value()));
        }

        let stored = match &self.run_store {
            Some(store) => store.load(execution_id).await?,
            None => None,
        };
        let state = stored.ok_or_else(|| Error::not_found("execution", execution_id.to_string()))?;
        debug!(%execution_id, stage = %state.stage, "Restored execution from run store");

        let slot = Arc::clone(
            self.executions
                .entry(execution_id)
                .or_insert_with(|| Arc::new(ExecutionSlot::new(state)))
                .value(),
        );
        self.evict_resting();
        Ok(slot)
    }

    async fn persist_run(&self, slot: &ExecutionSlot, state: &mut RunState) {
        let Some(store) = &self.run_store else {
            return;
        };
        if let Err(err) = store.save(state).await {
            warn!(execution_id = %state.execution_id, error = %err, "Failed to persist run state");
            state.degradations.push(Degradation::RunPersistence {
                reason: err.to_string(),
            });
            slot.publish(state);
        }
    }

    /// Drop the oldest idle resting executions above `runs.max_resident`.
    ///
    /// A slot is idle when the registry holds its only reference, so nobody is
    /// reading or driving it.
    fn evict_resting(&self) {
        let excess = self
            .executions
            .len()
            .saturating_sub(self.settings.runs.max_resident);
        if excess == 0 {
            return;
        }

        let mut idle: Vec<(DateTime<Utc>, Uuid)> = self
            .executions
            .iter()
            .filter(|entry| Arc::strong_count(entry.value()) == 1)
            .filter_map(|entry| {
                let state = entry.value().state.read();
                state
                    .stage
                    .is_resting()
                    .then_some((state.updated_at, state.execution_id))
            })
            .collect();
        idle.sort();

        let mut evicted = 0;
        for (_, execution_id) in idle {
            if evicted == excess {
                break;
            }
            let removed = self.executions.remove_if(&execution_id, |_, slot| {
                Arc::strong_count(slot) == 1 && slot.state.read().stage.is_resting()
            });
            if removed.is_some() {
                evicted += 1;
            }
        }
        debug!(evicted, resident = self.executions.len(), "Evicted resting executions");
    }

    /// Run stages and follow graph edges until a resting stage
    async fn drive(&self, slot: &ExecutionSlot, mut state: RunState) -> Result<RunState> {
        let max_iterations = self.settings.learning.max_iterations;
        loop {
            state = self.run_stage(state).await?;
            slot.publish(&state);

            let Some(next) = graph::next_stage(&state, max_iterations) else {
                return Ok(state);
            };
            state.transition(next)?;
            info!(
                execution_id = %state.execution_id,
                stage = %next,
                iteration = state.iterations,
                "Stage transition"
            );
            slot.publish(&state);
        }
    }

    /// Perform the work of the state's current stage
    async fn run_stage(&self, mut state: RunState) -> Result<RunState> {
        match state.stage {
            Stage::Consolidating => {
                state.resources = consolidate(&state.snapshot)?;
            }
            Stage::Detecting => {
                state.conflicts = detect_conflicts(&state.resources, state.request.date_range.as_ref());
            }
            Stage::Generating => {
                let pending = state.conflicts_without_candidates();
                if pending.is_empty() {
                    debug!(execution_id = %state.execution_id, "Every conflict already has candidates");
                } else {
                    let outcome = self.generator.generate(state.execution_id, &pending).await;
                    state.candidates.extend(outcome.candidates);
                    state.degradations.extend(outcome.degradations);
                }
            }
            Stage::Ranking => {
                state.weights = self.weights.current();
                state.rankings = rank_conflicts(&state.conflicts, &state.candidates, &state.weights);
            }
            Stage::PatternAnalysis => {
                let manager_id = if self.settings.learning.scope_by_manager {
                    state.feedback_history.last().and_then(|r| r.manager_id.clone())
                } else {
                    None
                };
                let report = self.analyze_patterns(manager_id).await?;
                state
                    .degradations
                    .extend(report.skipped.iter().map(|s| Degradation::SkippedSignal {
                        strategy: s.strategy,
                        samples: s.samples,
                        required: s.required,
                    }));
                state.patterns = Some(report);
            }
            Stage::WeightAdjusted => {
                state = self.adjust_weights(state).await?;
            }
            Stage::RankingComplete | Stage::NoConflictsDone | Stage::FeedbackReceived | Stage::Done => {}
        }
        Ok(state)
    }

    async fn adjust_weights(&self, mut state: RunState) -> Result<RunState> {
        let Some(report) = state.patterns.clone() else {
            return Ok(state);
        };
        let reason = format!("feedback on execution {}", state.execution_id);
        let mut base = self.weights.current();

        let outcome = self
            .weights
            .update_with(self.settings.learning.max_cas_retries, &reason, |current| {
                base = current.clone();
                self.adjuster.propose(&current.weights, &report)
            });

        let adjustment = match outcome {
            Ok(Some(published)) => {
                if let Err(err) = self.weight_history.save(&published).await {
                    warn!(version = published.version, error = %err, "Failed to persist ranking weights");
                    state.degradations.push(Degradation::WeightUpdate {
                        reason: format!("persisting version {} failed: {}", published.version, err),
                    });
                }
                let before = base.weights.as_array();
                let after = published.weights.as_array();
                WeightAdjustment {
                    from_version: base.version,
                    to_version: Some(published.version),
                    previous: base.weights,
                    adjusted: published.weights,
                    deltas: [after[0] - before[0], after[1] - before[1], after[2] - before[2]],
                    signals_used: report.signals.len(),
                }
            }
            Ok(None) => WeightAdjustment::unchanged(&base, report.signals.len()),
            Err(err) if err.is_weight_conflict() => {
                warn!(execution_id = %state.execution_id, error = %err, "Giving up on weight update");
                state.degradations.push(Degradation::WeightUpdate {
                    reason: err.to_string(),
                });
                WeightAdjustment::unchanged(&base, report.signals.len())
            }
            Err(err) => return Err(err),
        };

        state.weights = self.weights.current();
        state.last_adjustment = Some(adjustment);
        Ok(state)
    }

    async fn notify_completion(&self, slot: &ExecutionSlot, state: &mut RunState) {
        let Some(callback_url) = state.request.callback_url.clone() else {
            return;
        };
        let notice = CompletionNotice {
            callback_url,
            summary: state.summary(),
        };
        if let Err(err) = self.notifier.notify(&notice).await {
            warn!(
                execution_id = %state.execution_id,
                callback_url = %notice.callback_url,
                error = %err,
                "Completion callback failed"
            );
            state.degradations.push(Degradation::Callback {
                reason: err.to_string(),
            });
            slot.publish(state);
        }
    }
}
