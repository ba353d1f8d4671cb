use crate::constants::{CONFIGS_DIR_ENV, DEFAULT_CONFIG_DIRS};
use crate::errors::Error;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

/// Finds the directory holding `settings.yaml` and the workflow definitions.
///
/// # Arguments
/// * `explicit` - Directory given on the command line, if any
///
/// # Returns
/// * `Result<PathBuf, Error>` - The first existing candidate directory
///
/// # Errors
/// Returns `ConfigFileNotFound` when an explicit directory does not exist or when
/// none of the default locations exist.
pub fn resolve_config_dir(explicit: Option<&Path>) -> Result<PathBuf, Error> {
    if let Some(dir) = explicit {
        if dir.is_dir() {
            return Ok(dir.to_path_buf());
        }
        return Err(Error::ConfigFileNotFound(dir.display().to_string()));
    }

    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Ok(dir) = std::env::var(CONFIGS_DIR_ENV) {
        candidates.push(PathBuf::from(dir));
    }
    candidates.extend(DEFAULT_CONFIG_DIRS.iter().map(PathBuf::from));
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("news-briefing"));
    }

    candidates
        .into_iter()
        .find(|dir| dir.is_dir())
        .ok_or_else(|| Error::ConfigFileNotFound("configs".to_string()))
}

/// Loads a YAML settings file into a JSON mapping.
///
/// # Arguments
/// * `path` - Location of the YAML file
/// * `required` - Whether a missing file is an error or an empty mapping
///
/// # Errors
/// Returns an error if a required file is missing, or if the file is not a YAML mapping.
pub fn load_settings_file(path: &Path, required: bool) -> Result<Map<String, Value>, Error> {
    if !path.exists() {
        if required {
            return Err(Error::ConfigFileNotFound(path.display().to_string()));
        }
        debug!("Optional settings file {} not present", path.display());
        return Ok(Map::new());
    }

    let yaml_str = fs::read_to_string(path)?;
    let value: Value = serde_yaml::from_str(&yaml_str).map_err(|e| Error::InvalidSettings {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let settings = match value {
        Value::Null => Map::new(),
        Value::Object(map) => map,
        other => {
            return Err(Error::InvalidSettings {
                path: path.display().to_string(),
                message: format!("expected a mapping at top level, found {}", type_name(&other)),
            })
        }
    };
    info!("Loaded settings from {}", path.display());
    Ok(settings)
}

/// Recursively merges `overlay` into `base`; nested mappings are merged, everything else replaced.
pub fn deep_merge(base: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Name of a JSON value's type as shown to users.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deep_merge_overrides_nested_leaves() {
        let mut base = json!({"ollama": {"base_url": "a", "model": "m"}, "level": "info"})
            .as_object()
            .cloned()
            .unwrap();
        let overlay = json!({"ollama": {"base_url": "b"}, "extra": 1})
            .as_object()
            .cloned()
            .unwrap();

        deep_merge(&mut base, &overlay);

        assert_eq!(
            Value::Object(base),
            json!({"ollama": {"base_url": "b", "model": "m"}, "level": "info", "extra": 1})
        );
    }

    #[test]
    fn test_missing_optional_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_file(&dir.path().join("settings.test.yaml"), false).unwrap();
        assert!(settings.is_empty());
    }

    #[test]
    fn test_missing_required_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_settings_file(&dir.path().join("settings.yaml"), true).unwrap_err();
        assert!(matches!(err, Error::ConfigFileNotFound(_)));
    }

    #[test]
    fn test_non_mapping_settings_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");
        fs::write(&path, "- just\n- a list\n").unwrap();
        let err = load_settings_file(&path, true).unwrap_err();
        assert!(matches!(err, Error::InvalidSettings { .. }));
    }
}
