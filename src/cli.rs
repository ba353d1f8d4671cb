use clap::{Args, Parser, Subcommand};
use news_briefing::config::CliArgs;
use serde_json::Value;
use std::path::PathBuf;

/// Command line interface for the news briefing generator
#[derive(Parser, Debug)]
#[command(name = "news-briefing", version, about = "News Briefing Generator")]
pub struct Cli {
    /// Directory holding settings.yaml, the environment files and workflows.yaml
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    /// Settings environment to layer over the base settings, e.g. "production"
    #[arg(long, global = true)]
    pub environment: Option<String>,

    /// Sets the logging verbosity level for the application
    /// Possible values: "error", "warn", "info", "debug", "trace"
    #[arg(long, global = true)]
    pub logging_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List available workflow definitions and their tasks
    ListWorkflows {
        /// Path to workflow definitions
        #[arg(short = 'w', long = "workflow-file")]
        workflow: Option<PathBuf>,
    },
    /// Validate a workflow configuration
    Validate {
        /// Name of the workflow to validate
        workflow_name: String,

        /// Path to workflow definitions
        #[arg(short = 'w', long = "workflow-file")]
        workflow: Option<PathBuf>,
    },
    /// Execute a workflow by name
    Run(RunArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Name of the workflow to execute
    pub workflow_name: String,

    /// Path to the database file
    #[arg(short, long)]
    pub database: Option<String>,

    /// Path to workflow definitions
    #[arg(short = 'w', long = "workflow-file")]
    pub workflow: Option<PathBuf>,

    /// Path to an OPML file whose feeds replace the configured ones
    #[arg(short, long)]
    pub opml: Option<PathBuf>,

    /// Base URL of the Ollama API server
    #[arg(short, long)]
    pub base_url_ollama: Option<String>,

    /// Task parameter override as key=value, e.g. --set nr_topics=8; repeatable
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub overrides: Vec<(String, Value)>,
}

impl RunArgs {
    /// Arguments that were actually given, as the highest precedence parameter source.
    pub fn cli_args(&self) -> CliArgs {
        let mut args = CliArgs::new();
        if let Some(database) = &self.database {
            args.insert("database", database.as_str());
        }
        if let Some(workflow) = &self.workflow {
            args.insert("workflow_file", workflow.to_string_lossy().as_ref());
        }
        if let Some(opml) = &self.opml {
            args.insert("opml", opml.to_string_lossy().as_ref());
        }
        if let Some(url) = &self.base_url_ollama {
            args.insert("base_url_ollama", url.as_str());
        }
        for (key, value) in &self.overrides {
            args.insert(key, value.clone());
        }
        args
    }
}

/// Parses `key=value`; the value is read as a YAML scalar so numbers and booleans keep
/// their type.
fn parse_key_value(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in '{}'", raw));
    }
    let value = serde_yaml::from_str::<Value>(value.trim())
        .ok()
        .filter(|v| !v.is_null())
        .unwrap_or_else(|| Value::String(value.trim().to_string()));
    Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_run_flags_become_cli_args() {
        let cli = Cli::parse_from([
            "news-briefing",
            "run",
            "daily",
            "-d",
            "/tmp/briefing.db",
            "--workflow-file",
            "configs/workflows.yaml",
            "--set",
            "nr_topics=8",
            "--set",
            "output_path=out/today.html",
        ]);
        let Command::Run(run) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(run.workflow_name, "daily");

        let args = run.cli_args();
        assert_eq!(args.get("database"), Some(&json!("/tmp/briefing.db")));
        assert_eq!(args.lookup("nr_topics"), Some(&json!(8)));
        assert_eq!(args.lookup("output_path"), Some(&json!("out/today.html")));
        assert_eq!(
            args.lookup("workflow_file"),
            Some(&json!("configs/workflows.yaml"))
        );
        assert_eq!(args.lookup("opml"), None);
    }

    #[test]
    fn test_key_value_requires_separator() {
        assert!(parse_key_value("nr_topics").is_err());
        assert!(parse_key_value("=3").is_err());
        assert_eq!(
            parse_key_value("check_robots_txt=false").unwrap(),
            ("check_robots_txt".to_string(), json!(false))
        );
    }
}
