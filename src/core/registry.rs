use super::{Task, TaskContext};
use crate::errors::Error;

/// Creates task instances from their `task_type` key.
pub trait TaskFactory: Send + Sync {
    fn supports(&self, task_type: &str) -> bool;

    /// Every task type this factory can build, for listings.
    fn task_types(&self) -> Vec<String>;

    /// Builds a task bound to `context`.
    ///
    /// # Errors
    /// `UnknownTaskType` for unsupported types; construction errors otherwise.
    fn create(
        &self,
        task_type: &str,
        name: &str,
        human_review: bool,
        context: TaskContext,
    ) -> Result<Box<dyn Task>, Error>;
}
