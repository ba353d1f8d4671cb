use diesel::result::Error as DieselError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Diesel error: {0}")]
    DieselError(#[from] DieselError),
    #[error("Connection pool error: {0}")]
    PoolError(#[from] r2d2::Error),
    #[error("Serde error: {0}")]
    SerdeError(#[from] serde_json::Error),
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Template error: {0}")]
    TemplateError(#[from] minijinja::Error),
    #[error("Feed parse error: {0}")]
    FeedError(#[from] feed_rs::parser::ParseFeedError),
    #[error("OPML parse error: {0}")]
    OpmlError(#[from] roxmltree::Error),

    #[error("Configuration file not found: {0}")]
    ConfigFileNotFound(String),
    #[error("Invalid settings in '{path}': {message}")]
    InvalidSettings { path: String, message: String },
    #[error("Invalid workflow document '{path}': {message}")]
    InvalidWorkflowDocument { path: String, message: String },
    #[error("Workflow '{0}' not found")]
    UnknownWorkflow(String),
    #[error("Unknown task type: {0}")]
    UnknownTaskType(String),
    #[error("{0}")]
    MissingSecret(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("LLM error: {0}")]
    Llm(String),
    #[error("Clustering error: {0}")]
    Clustering(String),
    #[error("Unsupported type '{type_name}' for parameter '{key}'")]
    UnsupportedParameterType { key: String, type_name: String },
    #[error("Invalid value for parameter '{key}': {message}")]
    ParameterConversion { key: String, message: String },
}
