//! Command line entry point.
//!
//! Loads `.env`, builds the application context and dispatches to one of the
//! `list-workflows`, `validate` or `run` commands.

mod cli;

use clap::Parser;
use cli::{Cli, Command, RunArgs};
use colored::Colorize;
use news_briefing::core::{AppContext, AppOptions, ValidationReport, WorkflowHandler};
use news_briefing::errors::Error;
use news_briefing::tasks::BuiltinTasks;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error};

const SUCCESS_SYMBOL: &str = "✓";
const FAILURE_SYMBOL: &str = "❌";
const INFO_SYMBOL: &str = "ℹ️";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let dotenv = dotenvy::dotenv();

    let options = match &cli.command {
        Command::Run(run) => AppOptions {
            database: run.database.clone(),
            opml: run.opml.clone(),
            base_url_ollama: run.base_url_ollama.clone(),
            cli_args: run.cli_args(),
            ..app_options(&cli)
        },
        _ => app_options(&cli),
    };
    let app = match AppContext::initialize(options) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("{} Failed to start: {}", FAILURE_SYMBOL, e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = dotenv {
        debug!("No .env file loaded: {}", e);
    }

    let outcome = match &cli.command {
        Command::ListWorkflows { workflow } => list_workflows(&app, workflow.as_deref()),
        Command::Validate {
            workflow_name,
            workflow,
        } => validate(&app, workflow_name, workflow.as_deref()),
        Command::Run(run) => run_workflow(&app, run).await,
    };

    let code = match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{}", e);
            eprintln!("{} {}", FAILURE_SYMBOL, e);
            ExitCode::FAILURE
        }
    };
    app.shutdown();
    code
}

fn app_options(cli: &Cli) -> AppOptions {
    AppOptions {
        config_dir: cli.config_dir.clone(),
        environment: cli.environment.clone(),
        logging_level: cli.logging_level.clone(),
        ..AppOptions::default()
    }
}

fn create_handler(app: &AppContext, workflow_path: Option<&Path>) -> Result<WorkflowHandler, Error> {
    WorkflowHandler::from_file(
        &app.workflow_path(workflow_path),
        app.db.clone(),
        Arc::clone(&app.conf),
        Arc::clone(&app.logger_manager),
        app.default_llm.clone(),
        Arc::new(BuiltinTasks),
    )
}

fn list_workflows(app: &AppContext, workflow_path: Option<&Path>) -> Result<bool, Error> {
    let handler = create_handler(app, workflow_path)?;
    let names = handler.workflow_names();
    if names.is_empty() {
        println!("No workflows found");
        return Ok(true);
    }

    println!("\nAvailable workflows:");
    for name in names {
        println!("\n{}:", name.bold());
        let Some(definition) = handler.workflow(name) else {
            continue;
        };
        for task in &definition.tasks {
            let mut line = format!("  • {} ({})", task.name, task.task_type);
            if !task.depends_on.is_empty() {
                line.push_str(&format!(" - depends on: {}", task.depends_on.join(", ")));
            }
            println!("{}", line);
        }
    }
    Ok(true)
}

fn validate(app: &AppContext, workflow_name: &str, workflow_path: Option<&Path>) -> Result<bool, Error> {
    let handler = create_handler(app, workflow_path)?;
    let report = handler.validate_workflow(workflow_name)?;
    print_report(&report);
    Ok(report.is_valid())
}

fn print_report(report: &ValidationReport) {
    println!("\nValidating workflow: {}", report.workflow);
    for note in &report.notes {
        println!("{}  {}", INFO_SYMBOL, note.yellow());
    }
    for err in &report.errors {
        println!("{} {}", FAILURE_SYMBOL, err);
    }
    if report.is_valid() {
        println!("\n{} Workflow configuration is valid", SUCCESS_SYMBOL);
    } else {
        println!("\n{} Validation failed", FAILURE_SYMBOL);
    }
}

async fn run_workflow(app: &AppContext, run: &RunArgs) -> Result<bool, Error> {
    let mut handler = create_handler(app, run.workflow.as_deref())?;
    let report = handler.validate_workflow(&run.workflow_name)?;
    print_report(&report);
    if !report.is_valid() {
        return Ok(false);
    }

    let results = handler.execute_workflow(&run.workflow_name).await?;
    println!();
    for (task_name, result) in results.iter() {
        match result.error() {
            None => println!("{} {}", SUCCESS_SYMBOL.green(), task_name),
            Some(err) => println!("{} {}: {}", FAILURE_SYMBOL.red(), task_name, err.red()),
        }
        if let Some(warning) = result.warning() {
            println!("  Warning: {}", warning.yellow());
        }
        if !result.metrics().is_empty() {
            println!("  Metrics: {}", serde_json::to_string(result.metrics())?);
        }
    }
    Ok(results.all_succeeded())
}
