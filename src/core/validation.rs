use super::{WorkflowData, WorkflowHandler};
use crate::errors::Error;
use std::collections::HashSet;

/// Outcome of a dry check of a workflow definition.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ValidationReport {
    pub workflow: String,
    pub errors: Vec<String>,
    /// Non-blocking observations, e.g. which tasks share the default LLM
    pub notes: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl WorkflowHandler {
    /// Checks workflow `name` without running it.
    ///
    /// Reports duplicate task names, unregistered task types, dependencies that are not
    /// declared earlier in the list, and tasks that cannot be built or whose context is
    /// invalid.
    ///
    /// # Errors
    /// `UnknownWorkflow` if `name` is not defined.
    pub fn validate_workflow(&self, name: &str) -> Result<ValidationReport, Error> {
        let definition = self
            .workflow(name)
            .ok_or_else(|| Error::UnknownWorkflow(name.to_string()))?;
        let mut report = ValidationReport {
            workflow: name.to_string(),
            ..ValidationReport::default()
        };

        if definition.tasks.is_empty() {
            report.errors.push(format!("Workflow {} has no tasks", name));
        }

        let all_names: HashSet<&str> = definition.tasks.iter().map(|t| t.name.as_str()).collect();
        let mut declared: HashSet<&str> = HashSet::new();
        let empty_data = WorkflowData::new();

        for config in &definition.tasks {
            if !declared.insert(config.name.as_str()) {
                report
                    .errors
                    .push(format!("Duplicate task name {}", config.name));
            }

            for dep in &config.depends_on {
                if dep == &config.name {
                    report
                        .errors
                        .push(format!("Task {} depends on itself", config.name));
                } else if !all_names.contains(dep.as_str()) {
                    report.errors.push(format!(
                        "Task {} depends on unknown task {}",
                        config.name, dep
                    ));
                } else if !declared.contains(dep.as_str()) {
                    report.errors.push(format!(
                        "Task {} depends on {}, which is declared after it",
                        config.name, dep
                    ));
                }
            }

            if !self.registry().supports(&config.task_type) {
                report.errors.push(format!(
                    "Task {} has unknown task type {}",
                    config.name, config.task_type
                ));
                continue;
            }

            match self.instantiate(config, &empty_data) {
                Ok(task) => {
                    if let Err(e) = task.validate_context() {
                        report.errors.push(format!("Task {}: {}", config.name, e));
                    } else if task.requires_llm() && config.llm_config.is_none() {
                        report.notes.push(format!(
                            "{} will use default LLM configuration",
                            config.name
                        ));
                    }
                }
                Err(e) => report
                    .errors
                    .push(format!("Task {} cannot be created: {}", config.name, e)),
            }
        }

        Ok(report)
    }
}
