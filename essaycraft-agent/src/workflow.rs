//! Workflow controller - drives one essay run through the step graph

use crate::prompts;
use essaycraft_core::error::{self, Error, Result};
use essaycraft_core::{
    ChatMessage, Checkpoint, CheckpointStore, CompletionRequest, LlmProvider, Queries, RunStatus,
    SearchProvider, Settings, StateUpdate, Step, WorkflowState,
};
use futures_core::Stream;
use std::collections::HashSet;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Configuration for the workflow
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowConfig {
    /// Sampling temperature for every model call
    pub temperature: f32,
    /// Queries kept from each research step
    pub max_queries: usize,
    /// Search hits requested per query
    pub results_per_query: usize,
    /// Largest accepted `max_revisions`
    pub max_revisions_limit: u32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_queries: 3,
            results_per_query: 2,
            max_revisions_limit: essaycraft_core::settings::DEFAULT_MAX_REVISIONS_LIMIT,
        }
    }
}

impl WorkflowConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            temperature: settings.temperature,
            max_revisions_limit: settings.max_revisions_limit,
            ..Default::default()
        }
    }
}

/// One executed step as seen by the caller
#[derive(Debug, Clone, PartialEq)]
pub struct StepEvent {
    pub step: Step,
    /// What the step changed; empty for Terminal
    pub update: StateUpdate,
    /// Revision number after the step
    pub revision_number: u32,
}

/// The essay workflow.
///
/// Runs are addressed by session id. Each step's result is merged into the
/// session's checkpoint and persisted before the step's event is yielded, so
/// a run that fails or is cancelled resumes at the step that did not finish.
pub struct Workflow<P, S> {
    provider: P,
    search: S,
    store: CheckpointStore,
    config: WorkflowConfig,
    /// Sessions currently being streamed
    active: Mutex<HashSet<String>>,
}

impl<P: LlmProvider, S: SearchProvider> Workflow<P, S> {
    pub fn new(provider: P, search: S, store: CheckpointStore) -> Self {
        Self::with_config(provider, search, store, WorkflowConfig::default())
    }

    pub fn with_config(provider: P, search: S, store: CheckpointStore, config: WorkflowConfig) -> Self {
        Self {
            provider,
            search,
            store,
            config,
            active: Mutex::new(HashSet::new()),
        }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn search(&self) -> &S {
        &self.search
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Create a run for `topic` and return its session id.
    ///
    /// Nothing executes until the session is streamed.
    pub fn start_run(&self, topic: &str, max_revisions: i64) -> Result<String> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(error::config_invalid("topic must not be empty").with_operation("start_run"));
        }
        if max_revisions < 0 || max_revisions > i64::from(self.config.max_revisions_limit) {
            return Err(error::config_invalid(format!(
                "max_revisions must be between 0 and {}, got {}",
                self.config.max_revisions_limit, max_revisions
            ))
            .with_operation("start_run"));
        }

        let mut checkpoint = Checkpoint::new(WorkflowState::new(topic, max_revisions as u32));
        self.store
            .save(&mut checkpoint)
            .map_err(|e| e.with_operation("start_run"))?;

        info!(
            session_id = %checkpoint.session_id,
            max_revisions,
            store = self.store.backend_name(),
            "run created"
        );
        Ok(checkpoint.session_id)
    }

    /// Stream a run's steps until Terminal
    pub fn stream_run<'a>(&'a self, session_id: &str) -> impl Stream<Item = Result<StepEvent>> + 'a {
        self.stream_run_with_cancel(session_id, CancellationToken::new())
    }

    /// Stream a run's steps, stopping early once `cancel` fires.
    ///
    /// The stream yields one event per executed step and a final Terminal
    /// event. Any error is the last item: the checkpoint records it and keeps
    /// `next` at the step that failed, so streaming the session again resumes
    /// there. A completed session yields a single `RunCompleted` error.
    pub fn stream_run_with_cancel<'a>(
        &'a self,
        session_id: &str,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<StepEvent>> + 'a {
        let session_id = session_id.to_string();

        async_stream::stream! {
            let _guard = match self.claim(&session_id) {
                Ok(guard) => guard,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let mut checkpoint = match self.store.load(&session_id) {
                Ok(checkpoint) => checkpoint,
                Err(e) => {
                    yield Err(e.with_operation("stream_run"));
                    return;
                }
            };

            if checkpoint.is_completed() {
                yield Err(error::run_completed(&session_id).with_operation("stream_run"));
                return;
            }

            if checkpoint.status != RunStatus::Pending {
                info!(session_id = %session_id, next = %checkpoint.next, status = %checkpoint.status, "resuming run");
            }
            checkpoint.status = RunStatus::Running;
            checkpoint.last_error = None;
            if let Err(e) = self.store.save(&mut checkpoint) {
                yield Err(e.with_operation("stream_run"));
                return;
            }

            loop {
                let step = checkpoint.next;

                if step.is_terminal() {
                    checkpoint.history.push(Step::Terminal);
                    checkpoint.status = RunStatus::Completed;
                    if let Err(e) = self.store.save(&mut checkpoint) {
                        yield Err(e.with_operation("stream_run"));
                        return;
                    }
                    info!(
                        session_id = %session_id,
                        revisions = checkpoint.state.revision_number,
                        "run completed"
                    );
                    yield Ok(StepEvent {
                        step: Step::Terminal,
                        update: StateUpdate::default(),
                        revision_number: checkpoint.state.revision_number,
                    });
                    return;
                }

                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    result = self.execute(step, &checkpoint.state) => Some(result),
                };

                let update = match outcome {
                    None => {
                        info!(session_id = %session_id, next = %step, "run cancelled");
                        let err = error::cancelled(&session_id).with_context("step", step.as_str());
                        yield Err(self.record_failure(&mut checkpoint, RunStatus::Cancelled, err));
                        return;
                    }
                    Some(Err(e)) => {
                        let err = e.with_operation("stream_run").with_context("step", step.as_str());
                        yield Err(self.record_failure(&mut checkpoint, RunStatus::Failed, err));
                        return;
                    }
                    Some(Ok(update)) => update,
                };

                if let Err(e) = checkpoint.state.merge(&update) {
                    let err = e.with_operation("stream_run").with_context("step", step.as_str());
                    yield Err(self.record_failure(&mut checkpoint, RunStatus::Failed, err));
                    return;
                }
                checkpoint.history.push(step);
                checkpoint.next = step.next(&checkpoint.state);

                if let Err(e) = self.store.save(&mut checkpoint) {
                    yield Err(e.with_operation("stream_run").with_context("step", step.as_str()));
                    return;
                }

                info!(
                    session_id = %session_id,
                    step = %step,
                    revision = checkpoint.state.revision_number,
                    snippets = checkpoint.state.content.len(),
                    "step completed"
                );

                yield Ok(StepEvent {
                    step,
                    update,
                    revision_number: checkpoint.state.revision_number,
                });
            }
        }
    }

    /// Current checkpoint of a session
    pub fn checkpoint(&self, session_id: &str) -> Result<Checkpoint> {
        self.store.load(session_id)
    }

    /// All readable sessions, oldest first. Entries that fail to load are skipped.
    pub fn sessions(&self) -> Result<Vec<Checkpoint>> {
        let mut checkpoints = Vec::new();
        for id in self.store.list()? {
            match self.store.load(&id) {
                Ok(checkpoint) => checkpoints.push(checkpoint),
                Err(e) => warn!(session_id = %id, error = %e, "skipping unreadable checkpoint"),
            }
        }
        checkpoints.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        Ok(checkpoints)
    }

    // ========================================================================
    // Steps
    // ========================================================================

    async fn execute(&self, step: Step, state: &WorkflowState) -> Result<StateUpdate> {
        match step {
            Step::Plan => {
                let plan = self.complete_text(prompts::PLAN.to_string(), &state.task).await?;
                Ok(StateUpdate::plan(plan))
            }
            Step::ResearchPlan => self.research(prompts::RESEARCH_PLAN, &state.task).await,
            Step::Generate => {
                let draft = self
                    .complete_text(
                        prompts::writer(&state.content),
                        &prompts::generation_request(&state.task, &state.plan),
                    )
                    .await?;
                Ok(StateUpdate::draft(draft, state.revision_number + 1))
            }
            Step::Reflect => {
                let critique = self
                    .complete_text(prompts::REFLECTION.to_string(), &state.draft)
                    .await?;
                Ok(StateUpdate::critique(critique))
            }
            Step::ResearchCritique => {
                self.research(prompts::RESEARCH_CRITIQUE, &state.critique).await
            }
            Step::Terminal => Err(error::unexpected("terminal step has no work")),
        }
    }

    fn request(&self, system: String, user: &str) -> CompletionRequest {
        CompletionRequest::new(vec![ChatMessage::system(system), ChatMessage::user(user)])
            .with_temperature(self.config.temperature)
    }

    async fn complete_text(&self, system: String, user: &str) -> Result<String> {
        debug!(provider = self.provider.name(), "model call");
        self.provider
            .complete_text(self.request(system, user))
            .await
            .map_err(|e| error::from_provider("model", e))
    }

    /// Ask for search queries, run each, and collect every hit's content in order
    async fn research(&self, system: &str, user: &str) -> Result<StateUpdate> {
        debug!(provider = self.provider.name(), "structured model call");
        let queries: Queries = self
            .provider
            .complete_structured(self.request(system.to_string(), user), &Queries::schema())
            .await
            .map_err(|e| error::from_provider("model", e))?;

        let (queries, dropped) = queries.normalized(self.config.max_queries);
        if dropped > 0 {
            warn!(dropped, kept = queries.len(), "model proposed too many queries");
        }

        let mut content = Vec::new();
        for query in &queries {
            debug!(search = self.search.name(), query = %query, "search call");
            let results = self
                .search
                .search(query, self.config.results_per_query)
                .await
                .map_err(|e| error::from_provider("search", e).with_context("query", query.clone()))?;
            content.extend(results.into_iter().map(|r| r.content));
        }
        Ok(StateUpdate::research(content))
    }

    // ========================================================================
    // Bookkeeping
    // ========================================================================

    /// Mark the checkpoint as stopped and hand the error back for yielding
    fn record_failure(&self, checkpoint: &mut Checkpoint, status: RunStatus, err: Error) -> Error {
        checkpoint.status = status;
        checkpoint.last_error = Some(err.to_string());
        if let Err(store_err) = self.store.save(checkpoint) {
            warn!(
                session_id = %checkpoint.session_id,
                error = %store_err,
                "failed to record run failure"
            );
        }
        err
    }

    fn claim(&self, session_id: &str) -> Result<SessionGuard<'_>> {
        let mut active = self
            .active
            .lock()
            .map_err(|_| error::unexpected("active session set lock poisoned"))?;
        if !active.insert(session_id.to_string()) {
            return Err(error::session_busy(session_id).with_operation("stream_run"));
        }
        Ok(SessionGuard {
            active: &self.active,
            session_id: session_id.to_string(),
        })
    }
}

/// Releases a session claim when the stream is dropped
struct SessionGuard<'a> {
    active: &'a Mutex<HashSet<String>>,
    session_id: String,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut active) = self.active.lock() {
            active.remove(&self.session_id);
        }
    }
}
