use super::TaskData;
use crate::constants::{NO_DATA_WARNING, REJECTED_BY_HUMAN_REVIEW};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

pub type Metrics = BTreeMap<String, Value>;

/// Outcome of one task execution.
///
/// A failed result always carries an error message: the only ways to build one are
/// [`TaskResult::failure`] and [`TaskResult::reject`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskResult {
    task_name: String,
    success: bool,
    created_at: DateTime<Utc>,
    data: Option<TaskData>,
    error: Option<String>,
    warning: Option<String>,
    metrics: Metrics,
}

impl TaskResult {
    pub fn success(task_name: &str) -> Self {
        TaskResult {
            task_name: task_name.to_string(),
            success: true,
            created_at: Utc::now(),
            data: None,
            error: None,
            warning: None,
            metrics: Metrics::new(),
        }
    }

    pub fn failure(task_name: &str, error: impl Into<String>) -> Self {
        TaskResult {
            success: false,
            error: Some(error.into()),
            ..TaskResult::success(task_name)
        }
    }

    /// Successful run that found nothing to do; downstream tasks still run.
    pub fn no_data(task_name: &str, message: &str) -> Self {
        TaskResult::success(task_name).with_warning(format!("{}{}", NO_DATA_WARNING, message))
    }

    pub fn with_data(mut self, data: TaskData) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }

    pub fn with_metric(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metrics.insert(key.to_string(), value.into());
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics.extend(metrics);
        self
    }

    /// Turns an approved-for-review result into a rejection.
    pub fn reject(&mut self) {
        self.success = false;
        self.error = Some(REJECTED_BY_HUMAN_REVIEW.to_string());
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn data(&self) -> Option<&TaskData> {
        self.data.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn is_no_data(&self) -> bool {
        self.warning
            .as_deref()
            .is_some_and(|w| w.starts_with(NO_DATA_WARNING))
    }

    pub fn is_rejected(&self) -> bool {
        !self.success && self.error.as_deref() == Some(REJECTED_BY_HUMAN_REVIEW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_always_has_error() {
        let result = TaskResult::failure("collect", "boom");
        assert!(!result.is_success());
        assert_eq!(result.error(), Some("boom"));

        let mut approved = TaskResult::success("select").with_metric("count", 3);
        approved.reject();
        assert!(!approved.is_success());
        assert!(approved.is_rejected());
        assert_eq!(approved.error(), Some(REJECTED_BY_HUMAN_REVIEW));
        assert_eq!(approved.metrics()["count"], Value::from(3));
    }

    #[test]
    fn test_no_data_is_a_prefixed_success() {
        let result = TaskResult::no_data("summaries", "No topics to summarize");
        assert!(result.is_success());
        assert!(result.is_no_data());
        assert_eq!(
            result.warning(),
            Some("NO_DATA_WARNING: No topics to summarize")
        );
        assert!(!TaskResult::success("x").with_warning("2 incoherent topics").is_no_data());
    }
}
