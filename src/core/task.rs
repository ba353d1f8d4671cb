use super::{default_review, ReviewConsole, ReviewDecision, TaskContext, TaskResult};
use crate::errors::Error;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// A unit of work inside a workflow.
///
/// Implementations own their [`TaskContext`]; the engine reads parameters back from
/// it after review so edits survive into the results.
#[async_trait]
pub trait Task: Send + Sync {
    /// Name of this step as declared in the workflow.
    fn name(&self) -> &str;

    /// Registry identifier of the task type. Parameters are scoped under it, so
    /// `content_fetching.timeout` applies to every content fetching step.
    fn task_type(&self) -> &'static str;

    fn requires_llm(&self) -> bool {
        false
    }

    /// Whether the workflow asked for a reviewer to look at successful results.
    fn requires_human_review(&self) -> bool;

    fn context(&self) -> &TaskContext;

    fn context_mut(&mut self) -> &mut TaskContext;

    /// Runs the task. Failures are reported through the result, never by panicking.
    async fn execute(&mut self) -> TaskResult;

    /// Resolves a parameter scoped to this task and records its source.
    fn get_parameter(&mut self, name: &str, default: Value) -> Value {
        let scope = self.task_type();
        self.context_mut().get_parameter(scope, name, default)
    }

    /// Typed parameter lookup.
    fn param<T>(&mut self, name: &str, default: T) -> Result<T, Error>
    where
        Self: Sized,
        T: Serialize + DeserializeOwned,
    {
        let scope = self.task_type();
        self.context_mut().parameter(scope, name, default)
    }

    /// Checks the context before execution.
    fn validate_context(&self) -> Result<(), Error> {
        if self.requires_llm() && self.context().llm.is_none() {
            return Err(Error::Validation(format!(
                "Task {} requires an LLM but none is configured",
                self.name()
            )));
        }
        Ok(())
    }

    /// Asks a reviewer about a successful result. The result may be amended in place.
    fn review(
        &mut self,
        result: &mut TaskResult,
        console: &mut dyn ReviewConsole,
        allow_rerun: bool,
    ) -> ReviewDecision {
        let name = self.name().to_string();
        let scope = self.task_type();
        default_review(&name, scope, self.context_mut(), result, console, allow_rerun)
    }
}
