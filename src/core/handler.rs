use super::{
    bind_task_llm, ReviewConsole, ReviewDecision, Task, TaskContext, TaskData, TaskFactory,
    TaskResult, TerminalConsole, WorkflowData,
};
use crate::config::{load_workflows, ConfigManager, TaskConfig, WorkflowDefinition};
use crate::constants::DEPENDENCY_CHAIN_BROKEN;
use crate::db::Database;
use crate::errors::Error;
use crate::llm::LlmClient;
use crate::utils::LoggerManager;
use futures::FutureExt;
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

/// Results of one workflow run, in execution order.
#[derive(Debug, Default)]
pub struct WorkflowResults {
    entries: Vec<(String, TaskResult)>,
}

impl WorkflowResults {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, task_name: &str, result: TaskResult) {
        self.entries.retain(|(name, _)| name != task_name);
        self.entries.push((task_name.to_string(), result));
    }

    pub fn get(&self, task_name: &str) -> Option<&TaskResult> {
        self.entries
            .iter()
            .find(|(name, _)| name == task_name)
            .map(|(_, result)| result)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TaskResult)> {
        self.entries
            .iter()
            .map(|(name, result)| (name.as_str(), result))
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn all_succeeded(&self) -> bool {
        self.entries.iter().all(|(_, result)| result.is_success())
    }
}

/// Runs named workflows: resolves dependencies, binds language models, threads task
/// outputs through `WorkflowData` and drives the human review loop.
pub struct WorkflowHandler {
    db: Database,
    conf: Arc<ConfigManager>,
    logger_manager: Arc<LoggerManager>,
    default_llm: Option<Arc<LlmClient>>,
    workflows: BTreeMap<String, WorkflowDefinition>,
    registry: Arc<dyn TaskFactory>,
    console: Box<dyn ReviewConsole>,
}

impl WorkflowHandler {
    /// Creates a handler over already parsed workflow definitions.
    pub fn new(
        db: Database,
        conf: Arc<ConfigManager>,
        logger_manager: Arc<LoggerManager>,
        default_llm: Option<Arc<LlmClient>>,
        workflows: BTreeMap<String, WorkflowDefinition>,
        registry: Arc<dyn TaskFactory>,
    ) -> Self {
        WorkflowHandler {
            db,
            conf,
            logger_manager,
            default_llm,
            workflows,
            registry,
            console: Box::new(TerminalConsole),
        }
    }

    /// Creates a handler from a workflow document on disk.
    ///
    /// # Errors
    /// Fails if the document is missing or malformed.
    pub fn from_file(
        path: &Path,
        db: Database,
        conf: Arc<ConfigManager>,
        logger_manager: Arc<LoggerManager>,
        default_llm: Option<Arc<LlmClient>>,
        registry: Arc<dyn TaskFactory>,
    ) -> Result<Self, Error> {
        let workflows = load_workflows(path)?;
        Ok(Self::new(
            db,
            conf,
            logger_manager,
            default_llm,
            workflows,
            registry,
        ))
    }

    /// Replaces the interactive terminal used for human review.
    pub fn with_console(mut self, console: impl ReviewConsole + 'static) -> Self {
        self.console = Box::new(console);
        self
    }

    pub fn workflow_names(&self) -> Vec<&str> {
        self.workflows.keys().map(String::as_str).collect()
    }

    pub fn workflow(&self, name: &str) -> Option<&WorkflowDefinition> {
        self.workflows.get(name)
    }

    pub fn registry(&self) -> &dyn TaskFactory {
        self.registry.as_ref()
    }

    /// Context handed to a task: its parameters, its model and the outputs so far.
    pub(crate) fn build_context(
        &self,
        config: &TaskConfig,
        workflow_data: &WorkflowData,
    ) -> Result<TaskContext, Error> {
        let llm = bind_task_llm(config, self.default_llm.as_ref(), &self.conf)?;
        Ok(TaskContext::new(
            self.db.clone(),
            Arc::clone(&self.conf),
            Arc::clone(&self.logger_manager),
            config.params.clone(),
            llm,
        )
        .with_workflow_data(workflow_data.clone()))
    }

    pub(crate) fn instantiate(
        &self,
        config: &TaskConfig,
        workflow_data: &WorkflowData,
    ) -> Result<Box<dyn Task>, Error> {
        let context = self.build_context(config, workflow_data)?;
        self.registry
            .create(&config.task_type, &config.name, config.human_review, context)
    }

    /// Executes the tasks of workflow `name` in their declared order.
    ///
    /// A task whose dependencies did not all succeed fails, and so does every task after
    /// it. Any failed task stops the run; the tasks that follow are recorded as skipped.
    ///
    /// # Errors
    /// `UnknownWorkflow` if `name` is not defined; `UnknownTaskType` if any task type is
    /// not registered. Both are checked before anything runs.
    pub async fn execute_workflow(&mut self, name: &str) -> Result<WorkflowResults, Error> {
        let definition = self
            .workflows
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownWorkflow(name.to_string()))?;
        if let Some(unknown) = definition
            .tasks
            .iter()
            .find(|task| !self.registry.supports(&task.task_type))
        {
            return Err(Error::UnknownTaskType(unknown.task_type.clone()));
        }

        let execution_id = Uuid::new_v4();
        let started = Instant::now();
        info!(
            execution_id = %execution_id,
            workflow = name,
            tasks = definition.tasks.len(),
            "workflow_started"
        );

        let task_names: Vec<String> = definition.tasks.iter().map(|t| t.name.clone()).collect();
        let mut results = WorkflowResults::new();
        let mut workflow_data = WorkflowData::new();

        for (index, config) in definition.tasks.into_iter().enumerate() {
            let remaining = &task_names[index + 1..];

            let failed_dependencies = unmet_dependencies(&config, &results);
            if !failed_dependencies.is_empty() {
                let message = format!(
                    "Dependencies failed for {}: {}",
                    config.name,
                    failed_dependencies.join(", ")
                );
                error!(execution_id = %execution_id, "{}", message);
                let result = TaskResult::failure(&config.name, message)
                    .with_metric("dependency_failures", failed_dependencies.len())
                    .with_data(TaskData::DependencyFailure {
                        failed_dependencies,
                    });
                results.insert(&config.name, result);
                skip_remaining(&mut results, remaining, DEPENDENCY_CHAIN_BROKEN);
                break;
            }

            let result = match self.instantiate(&config, &workflow_data) {
                Ok(task) => {
                    let (result, params) = self.run_task(task, &config).await;
                    self.store_params(name, &config.name, params);
                    result
                }
                Err(e) => {
                    error!("Could not create task {}: {}", config.name, e);
                    TaskResult::failure(&config.name, e.to_string())
                }
            };

            let success = result.is_success();
            if success {
                workflow_data.insert(
                    &config.name,
                    result.data().cloned().unwrap_or(TaskData::Empty),
                );
            }
            results.insert(&config.name, result);

            if !success {
                error!(
                    execution_id = %execution_id,
                    task = %config.name,
                    "Workflow {} stopped after failure of {}",
                    name,
                    config.name
                );
                let reason = format!("Skipped due to failure of {}", config.name);
                skip_remaining(&mut results, remaining, &reason);
                break;
            }
        }

        info!(
            execution_id = %execution_id,
            workflow = name,
            succeeded = results.all_succeeded(),
            elapsed = %humantime::format_duration(started.elapsed()),
            "workflow_finished"
        );
        Ok(results)
    }

    /// Executes one task and, when review is on, loops until approval, rejection or
    /// the re-run budget is spent.
    async fn run_task(
        &mut self,
        mut task: Box<dyn Task>,
        config: &TaskConfig,
    ) -> (TaskResult, Map<String, Value>) {
        let span = self
            .logger_manager
            .task_span(&config.name, &config.task_type);
        let started = Instant::now();

        if let Err(e) = task.validate_context() {
            error!(parent: &span, "Invalid context for {}: {}", config.name, e);
            let params = task.context().params.clone();
            return (TaskResult::failure(&config.name, e.to_string()), params);
        }

        info!(parent: &span, "Starting task {}", config.name);
        let mut result = execute_guarded(task.as_mut(), &config.name)
            .instrument(span.clone())
            .await;

        let rerun_bound = config.rerun_bound();
        let mut reruns = 0;
        while task.requires_human_review() && result.is_success() {
            let allow_rerun = reruns < rerun_bound;
            let decision =
                span.in_scope(|| task.review(&mut result, self.console.as_mut(), allow_rerun));
            match decision {
                ReviewDecision::Approve => {
                    info!(parent: &span, "Result of {} approved", config.name);
                    break;
                }
                ReviewDecision::Reject => {
                    warn!(parent: &span, "Result of {} rejected", config.name);
                    result.reject();
                    break;
                }
                ReviewDecision::Rerun if allow_rerun => {
                    reruns += 1;
                    info!(
                        parent: &span,
                        "Re-running {} ({}/{})", config.name, reruns, rerun_bound
                    );
                    result = execute_guarded(task.as_mut(), &config.name)
                        .instrument(span.clone())
                        .await;
                }
                ReviewDecision::Rerun => {
                    warn!(
                        parent: &span,
                        "Re-run limit of {} reached for {}, keeping the last result",
                        rerun_bound,
                        config.name
                    );
                    break;
                }
            }
        }

        let elapsed = humantime::format_duration(started.elapsed());
        if result.is_success() {
            info!(parent: &span, "Task {} finished in {}", config.name, elapsed);
        } else {
            error!(
                parent: &span,
                "Task {} failed after {}: {}",
                config.name,
                elapsed,
                result.error().unwrap_or_default()
            );
        }
        (result, task.context().params.clone())
    }

    /// Keeps review edits on the workflow definition for later runs of this handler.
    fn store_params(&mut self, workflow: &str, task_name: &str, params: Map<String, Value>) {
        if let Some(config) = self
            .workflows
            .get_mut(workflow)
            .and_then(|w| w.tasks.iter_mut().find(|t| t.name == task_name))
        {
            config.params = params;
        }
    }
}

/// Dependencies of `config` that have no successful result yet, rendered for messages.
fn unmet_dependencies(config: &TaskConfig, results: &WorkflowResults) -> Vec<String> {
    config
        .depends_on
        .iter()
        .filter_map(|dep| match results.get(dep) {
            None => Some(format!("{} (not executed)", dep)),
            Some(result) if !result.is_success() => Some(format!(
                "{} (failed: {})",
                dep,
                result.error().unwrap_or_default()
            )),
            Some(_) => None,
        })
        .collect()
}

fn skip_remaining(results: &mut WorkflowResults, remaining: &[String], reason: &str) {
    for name in remaining {
        warn!("Skipping {}: {}", name, reason);
        results.insert(
            name,
            TaskResult::failure(name, reason).with_metric("skipped_due_to_workflow_failure", true),
        );
    }
}

/// Runs `execute`, converting a panic into a failed result.
async fn execute_guarded(task: &mut dyn Task, name: &str) -> TaskResult {
    match AssertUnwindSafe(task.execute()).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!("Task {} panicked: {}", name, message);
            TaskResult::failure(name, format!("Task panicked: {}", message))
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
