use super::{TaskContext, TaskResult};
use crate::config::{type_name, ConfigSource, Parameter};
use crate::errors::Error;
use colored::Colorize;
use dialoguer::{theme::ColorfulTheme, Input, Select};
use serde_json::{Map, Value};
use std::collections::VecDeque;

use tracing::{info, warn};

/// What a reviewer decided about a successful task result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    /// Parameters were edited; execute the task again
    Rerun,
    Reject,
}

/// Interaction surface used during human review.
pub trait ReviewConsole: Send {
    fn show(&mut self, text: &str);
    /// Returns the index of the chosen option.
    fn select(&mut self, prompt: &str, options: &[&str]) -> Result<usize, Error>;
    fn read_line(&mut self, prompt: &str) -> Result<String, Error>;
}

/// Interactive console backed by the terminal.
#[derive(Debug, Default)]
pub struct TerminalConsole;

impl ReviewConsole for TerminalConsole {
    fn show(&mut self, text: &str) {
        println!("{}", text);
    }

    fn select(&mut self, prompt: &str, options: &[&str]) -> Result<usize, Error> {
        Select::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .items(options)
            .default(0)
            .interact()
            .map_err(|e| Error::IoError(std::io::Error::other(e.to_string())))
    }

    fn read_line(&mut self, prompt: &str) -> Result<String, Error> {
        Input::<String>::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()
            .map_err(|e| Error::IoError(std::io::Error::other(e.to_string())))
    }
}

/// Console fed from a fixed script, for unattended runs and tests.
///
/// `choices` are matched against option labels by prefix; everything shown is kept
/// in `transcript`.
#[derive(Debug, Default)]
pub struct ScriptedConsole {
    choices: VecDeque<String>,
    lines: VecDeque<String>,
    pub transcript: Vec<String>,
}

impl ScriptedConsole {
    pub fn new<C, L>(choices: C, lines: L) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
        L: IntoIterator,
        L::Item: Into<String>,
    {
        ScriptedConsole {
            choices: choices.into_iter().map(Into::into).collect(),
            lines: lines.into_iter().map(Into::into).collect(),
            transcript: Vec::new(),
        }
    }
}

impl ReviewConsole for ScriptedConsole {
    fn show(&mut self, text: &str) {
        self.transcript.push(text.to_string());
    }

    fn select(&mut self, prompt: &str, options: &[&str]) -> Result<usize, Error> {
        self.transcript.push(format!("{} {:?}", prompt, options));
        let choice = self
            .choices
            .pop_front()
            .ok_or_else(|| Error::Validation("Review script has no choice left".to_string()))?;
        options
            .iter()
            .position(|option| option.starts_with(choice.as_str()))
            .ok_or_else(|| {
                Error::Validation(format!("'{}' is not among {:?}", choice, options))
            })
    }

    fn read_line(&mut self, prompt: &str) -> Result<String, Error> {
        self.transcript.push(prompt.to_string());
        Ok(self.lines.pop_front().unwrap_or_default())
    }
}

pub const APPROVE_OPTION: &str = "Approve";
pub const RERUN_OPTION: &str = "Re-run with different parameters";
pub const REJECT_OPTION: &str = "Reject";

/// Prints a result summary: status, warning and metrics.
pub fn present_result(task_name: &str, result: &TaskResult, console: &mut dyn ReviewConsole) {
    console.show(&format!("\n{} {}", "Review:".bold(), task_name.cyan()));
    console.show(&format!("  status: {}", "success".green()));
    if let Some(warning) = result.warning() {
        console.show(&format!("  warning: {}", warning.yellow()));
    }
    if !result.metrics().is_empty() {
        console.show("  metrics:");
        for (key, value) in result.metrics() {
            console.show(&format!("    {}: {}", key, value));
        }
    }
}

/// Standard review: approve, re-run with edited parameters, or reject.
///
/// The re-run option is only offered while `allow_rerun` holds. A console failure is
/// treated as a rejection. Edits are written for parameters scoped under `scope`.
pub fn default_review(
    task_name: &str,
    scope: &str,
    ctx: &mut TaskContext,
    result: &TaskResult,
    console: &mut dyn ReviewConsole,
    allow_rerun: bool,
) -> ReviewDecision {
    present_result(task_name, result, console);

    let mut options = vec![(APPROVE_OPTION, ReviewDecision::Approve)];
    if allow_rerun {
        options.push((RERUN_OPTION, ReviewDecision::Rerun));
    }
    options.push((REJECT_OPTION, ReviewDecision::Reject));
    let labels: Vec<&str> = options.iter().map(|(label, _)| *label).collect();

    let decision = match console.select("How do you want to proceed?", &labels) {
        Ok(index) => options
            .get(index)
            .map(|(_, decision)| *decision)
            .unwrap_or(ReviewDecision::Reject),
        Err(e) => {
            warn!("Review of {} failed: {}", task_name, e);
            ReviewDecision::Reject
        }
    };

    match decision {
        ReviewDecision::Rerun => match collect_parameter_updates(scope, ctx, console) {
            Ok(count) => {
                info!("Re-running {} with {} updated parameter(s)", task_name, count);
                ReviewDecision::Rerun
            }
            Err(e) => {
                warn!("Parameter update for {} failed: {}", task_name, e);
                ReviewDecision::Reject
            }
        },
        other => other,
    }
}

/// Interactive parameter editing before a re-run.
///
/// Shows every parameter the task resolved with its source, then reads `key=value`
/// lines until an empty one. Unknown keys and values that do not coerce are reported
/// and asked again. Accepted values are written into the workflow parameters and
/// recorded with the workflow source.
///
/// # Returns
/// * `Result<usize, Error>` - Number of parameters changed
pub fn collect_parameter_updates(
    scope: &str,
    ctx: &mut TaskContext,
    console: &mut dyn ReviewConsole,
) -> Result<usize, Error> {
    console.show("Current parameters:");
    for (name, param) in &ctx.param_sources {
        console.show(&format!(
            "  {}: {} ({})",
            name,
            param.value,
            param.source.description().dimmed()
        ));
    }
    console.show(
        "Enter updates as key=value, an empty line to finish. \
         Updates override every source except command line arguments.",
    );

    let mut updates: Vec<(String, Value)> = Vec::new();
    loop {
        let line = console.read_line("Parameter")?;
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        let Some((key, raw)) = line.split_once('=') else {
            console.show(&"Invalid format, expected key=value".red().to_string());
            continue;
        };
        let key = key.trim();
        let Some(current) = ctx.param_sources.get(key) else {
            console.show(&format!("{} '{}'", "Unknown parameter".red(), key));
            continue;
        };
        match coerce_value(key, raw.trim(), &current.value) {
            Ok(value) => {
                console.show(&format!(
                    "Will update {}: {} -> {} (was from {})",
                    key,
                    current.value,
                    value,
                    current.source.description()
                ));
                updates.retain(|(k, _)| k != key);
                updates.push((key.to_string(), value));
            }
            Err(e) => console.show(&e.to_string().red().to_string()),
        }
    }

    if updates.is_empty() {
        console.show("No parameters changed");
    }
    let count = updates.len();
    for (key, value) in updates {
        apply_override(scope, &mut ctx.params, &key, value.clone());
        ctx.param_sources
            .insert(key, Parameter::new(value, ConfigSource::Workflow));
    }
    Ok(count)
}

/// Converts reviewer input to the type of the parameter's current value.
///
/// # Errors
/// `ParameterConversion` for unparsable numbers, `UnsupportedParameterType` when the
/// current value is null or a mapping.
pub fn coerce_value(key: &str, raw: &str, current: &Value) -> Result<Value, Error> {
    let conversion = |message: String| Error::ParameterConversion {
        key: key.to_string(),
        message,
    };

    match current {
        Value::Bool(_) => Ok(Value::Bool(matches!(
            raw.to_lowercase().as_str(),
            "true" | "1" | "yes"
        ))),
        Value::Number(n) if n.is_f64() => raw
            .parse::<f64>()
            .map(Value::from)
            .map_err(|e| conversion(e.to_string())),
        Value::Number(_) => raw
            .parse::<i64>()
            .map(Value::from)
            .map_err(|e| conversion(e.to_string())),
        Value::Array(_) => {
            let inner = raw.trim_start_matches('[').trim_end_matches(']');
            Ok(Value::Array(
                inner
                    .split(',')
                    .map(|item| Value::String(item.trim().to_string()))
                    .collect(),
            ))
        }
        Value::String(_) => Ok(Value::String(raw.to_string())),
        Value::Null | Value::Object(_) => Err(Error::UnsupportedParameterType {
            key: key.to_string(),
            type_name: type_name(current).to_string(),
        }),
    }
}

/// Writes `key` so it wins over any task scoped variant in the same mapping.
fn apply_override(scope: &str, params: &mut Map<String, Value>, key: &str, value: Value) {
    params.remove(&format!("{}.{}", scope, key));
    if let Some(Value::Object(scoped)) = params.get_mut(scope) {
        scoped.remove(key);
    }
    params.insert(key.to_string(), value);
}
