// Harness configuration loading for the runner
use anyhow::{bail, Context, Result};
use autograde_common::config::HarnessConfig;
use std::fs;
use std::path::Path;

/// Load a harness config file
pub fn load(config_path: &Path) -> Result<HarnessConfig> {
    if !config_path.exists() {
        bail!("Harness config file not found: {}", config_path.display());
    }

    let content = fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read {}", config_path.display()))?;

    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", config_path.display()))
}

/// File (when given) then environment overrides
pub fn load_with_overrides(config_path: Option<&Path>) -> Result<HarnessConfig> {
    let config = match config_path {
        Some(path) => load(path)?,
        None => HarnessConfig::new(),
    };
    Ok(config.with_env_overrides())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use uuid::Uuid;

    #[test]
    fn test_load_config_file() {
        let path = std::env::temp_dir().join(format!("autograde-config-{}.json", Uuid::new_v4()));
        fs::write(&path, r#"{"run_dir": "/srv/run", "fallback_output": "out.json"}"#).unwrap();

        let config = load(&path).unwrap();
        assert_eq!(config.run_dir, PathBuf::from("/srv/run"));
        assert_eq!(config.fallback_output_path(), PathBuf::from("/srv/run/out.json"));

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_missing_config() {
        let err = load(Path::new("/nonexistent/autograde.json")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_load_malformed_config() {
        let path = std::env::temp_dir().join(format!("autograde-config-{}.json", Uuid::new_v4()));
        fs::write(&path, "{ not json").unwrap();

        let err = load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));

        fs::remove_file(&path).ok();
    }
}
