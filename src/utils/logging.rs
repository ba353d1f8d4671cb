use crate::config::ConfigManager;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info_span, Span};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Logging options read from the `logging.*` settings.
#[derive(Debug, Clone)]
pub struct LogSettings {
    /// Filter directive, e.g. "info" or "news_briefing=debug"
    pub level: String,
    /// Daily rotated log file, written through a background worker
    pub log_file: Option<PathBuf>,
    /// Whether progress bars are drawn
    pub progress: bool,
    /// Include source file names in console output
    pub with_file_info: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        LogSettings {
            level: "info".to_string(),
            log_file: None,
            progress: true,
            with_file_info: false,
        }
    }
}

impl LogSettings {
    pub fn from_config(conf: &ConfigManager) -> Self {
        let defaults = LogSettings::default();
        LogSettings {
            level: conf.get_str("logging.level").unwrap_or(defaults.level),
            log_file: conf.get_str("logging.log_file").map(PathBuf::from),
            progress: conf
                .get("logging.progress", serde_json::Value::Bool(defaults.progress))
                .as_bool()
                .unwrap_or(defaults.progress),
            with_file_info: conf
                .get("logging.with_file_info", serde_json::Value::Bool(false))
                .as_bool()
                .unwrap_or(false),
        }
    }
}

/// Owns the process logging setup and hands out per-task spans and progress bars.
///
/// Created once by the application and passed to every task context. Records bound
/// for the log file are queued to a background writer; `shutdown` flushes them.
#[derive(Debug)]
pub struct LoggerManager {
    settings: LogSettings,
    guards: Mutex<Vec<WorkerGuard>>,
}

impl LoggerManager {
    /// Installs the global subscriber with a console layer and an optional file layer.
    ///
    /// If a subscriber is already installed (e.g. in tests) the existing one is kept.
    ///
    /// # Arguments
    ///
    /// * `settings` - Level, log file and progress options
    pub fn init(settings: LogSettings) -> Self {
        let filter = match EnvFilter::try_new(&settings.level) {
            Ok(f) => f,
            Err(_) => {
                eprintln!("Invalid log level '{}', defaulting to 'info'", settings.level);
                EnvFilter::new("info")
            }
        };

        let console_layer = fmt::layer()
            .with_line_number(settings.with_file_info)
            .with_file(settings.with_file_info)
            .with_writer(std::io::stderr);

        let mut guards = Vec::new();
        let file_layer = settings.log_file.as_deref().map(|path| {
            let (dir, file_name) = split_log_path(path);
            let file_appender = RollingFileAppender::new(Rotation::DAILY, dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(file_appender);
            guards.push(guard);
            fmt::layer()
                .with_ansi(false)
                .with_line_number(true)
                .with_writer(writer)
        });

        if let Err(e) = tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .with(file_layer)
            .try_init()
        {
            eprintln!("Logging already initialized: {}", e);
        }

        LoggerManager {
            settings,
            guards: Mutex::new(guards),
        }
    }

    /// A manager that leaves the global subscriber untouched and draws no progress bars.
    pub fn detached() -> Self {
        LoggerManager {
            settings: LogSettings {
                progress: false,
                ..LogSettings::default()
            },
            guards: Mutex::new(Vec::new()),
        }
    }

    pub fn settings(&self) -> &LogSettings {
        &self.settings
    }

    /// Span that scopes every event a task emits.
    pub fn task_span(&self, task_name: &str, task_type: &str) -> Span {
        info_span!("task", name = %task_name, task_type = %task_type)
    }

    /// Progress bar for a fan-out of `len` operations; hidden when progress output is off.
    pub fn progress(&self, len: u64, message: &str) -> ProgressBar {
        if !self.settings.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len);
        let style = ProgressStyle::default_bar()
            .template("{spinner} [{elapsed_precise}] {msg} [{bar:30}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .progress_chars("=> ");
        pb.set_style(style);
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    }

    /// Flushes and stops the background log writer.
    pub fn shutdown(&self) {
        if let Ok(mut guards) = self.guards.lock() {
            guards.clear();
        }
    }
}

fn split_log_path(path: &Path) -> (PathBuf, String) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(crate::constants::DEFAULT_LOG_DIR));
    let file_name = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| "news-briefing.log".to_string());
    (dir, file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_log_path() {
        let (dir, name) = split_log_path(Path::new("var/log/nbg.log"));
        assert_eq!(dir, PathBuf::from("var/log"));
        assert_eq!(name, "nbg.log");

        let (dir, name) = split_log_path(Path::new("nbg.log"));
        assert_eq!(dir, PathBuf::from("logs"));
        assert_eq!(name, "nbg.log");
    }

    #[test]
    fn test_detached_manager_hides_progress() {
        let manager = LoggerManager::detached();
        assert!(manager.progress(10, "testing").is_hidden());
        manager.shutdown();
    }
}
