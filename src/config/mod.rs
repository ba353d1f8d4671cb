mod manager;
mod opml;
mod parser;
mod resolver;
mod secrets;
mod workflow;

pub use manager::*;
pub use opml::*;
pub use parser::*;
pub use resolver::*;
pub use secrets::*;
pub use workflow::*;

use serde_json::Value;
use std::fmt;

/// Precedence tier that produced a resolved parameter value, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConfigSource {
    CliArgument,
    Workflow,
    EnvironmentVariable,
    EnvironmentSettings,
    BaseSettings,
    Default,
}

impl ConfigSource {
    /// Human readable origin shown in the review prompt.
    pub fn description(&self) -> &'static str {
        match self {
            ConfigSource::CliArgument => "command line argument",
            ConfigSource::Workflow => "workflow config",
            ConfigSource::EnvironmentVariable => "environment variable",
            ConfigSource::EnvironmentSettings => "environment settings yaml",
            ConfigSource::BaseSettings => "base settings yaml",
            ConfigSource::Default => "default value",
        }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            ConfigSource::CliArgument => "CLI_ARGUMENT",
            ConfigSource::Workflow => "WORKFLOW",
            ConfigSource::EnvironmentVariable => "ENVIRONMENT_VARIABLE",
            ConfigSource::EnvironmentSettings => "ENVIRONMENT_SETTINGS",
            ConfigSource::BaseSettings => "BASE_SETTINGS",
            ConfigSource::Default => "DEFAULT",
        };
        f.write_str(tag)
    }
}

/// A resolved configuration value together with the tier it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub value: Value,
    pub source: ConfigSource,
}

impl Parameter {
    pub fn new(value: Value, source: ConfigSource) -> Self {
        Parameter { value, source }
    }
}
