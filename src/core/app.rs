use crate::config::{load_opml_feeds, resolve_config_dir, CliArgs, ConfigManager};
use crate::constants::{DEFAULT_DATABASE_PATH, WORKFLOWS_FILE};
use crate::db::Database;
use crate::errors::Error;
use crate::llm::LlmClient;
use crate::utils::{LogSettings, LoggerManager};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

/// Start-up options gathered from the command line.
#[derive(Debug, Default, Clone)]
pub struct AppOptions {
    pub config_dir: Option<PathBuf>,
    pub environment: Option<String>,
    pub logging_level: Option<String>,
    pub database: Option<String>,
    pub opml: Option<PathBuf>,
    pub base_url_ollama: Option<String>,
    pub cli_args: CliArgs,
}

/// Shared services of one process: settings, logging, storage and the default LLM.
#[derive(Debug)]
pub struct AppContext {
    pub conf: Arc<ConfigManager>,
    pub db: Database,
    pub logger_manager: Arc<LoggerManager>,
    /// `None` when the configured provider could not be built
    pub default_llm: Option<Arc<LlmClient>>,
}

impl AppContext {
    /// Loads settings, installs logging, opens the database and builds the default LLM.
    ///
    /// A default LLM that cannot be built is logged and left out; tasks needing it
    /// fail their context check instead.
    pub fn initialize(options: AppOptions) -> Result<Self, Error> {
        let config_dir = resolve_config_dir(options.config_dir.as_deref())?;
        let mut conf = ConfigManager::load(
            &config_dir,
            options.environment.as_deref(),
            options.cli_args,
        )?;

        if let Some(url) = &options.base_url_ollama {
            conf.set("ollama.base_url", Value::String(url.clone()));
        }
        if let Some(opml) = &options.opml {
            conf.override_feeds(load_opml_feeds(opml)?);
        }

        let mut log_settings = LogSettings::from_config(&conf);
        if let Some(level) = options.logging_level {
            log_settings.level = level;
        }
        let logger_manager = Arc::new(LoggerManager::init(log_settings));
        info!(
            "Configuration loaded from {} (environment: {})",
            conf.config_dir().display(),
            conf.environment()
        );

        let db_path = options
            .database
            .or_else(|| conf.get_str("database.path"))
            .unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string());
        let db = Database::new(&db_path)?;

        let default_llm = match LlmClient::from_settings(&conf) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                warn!("Default LLM unavailable: {}", e);
                None
            }
        };

        Ok(AppContext {
            conf: Arc::new(conf),
            db,
            logger_manager,
            default_llm,
        })
    }

    /// Workflow document to use: `explicit`, else `workflows.yaml` in the config dir.
    pub fn workflow_path(&self, explicit: Option<&Path>) -> PathBuf {
        explicit
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.conf.config_dir().join(WORKFLOWS_FILE))
    }

    /// Flushes log writers. Database connections close when the pool is dropped.
    pub fn shutdown(self) {
        info!("Shutting down");
        drop(self.db);
        self.logger_manager.shutdown();
    }
}
