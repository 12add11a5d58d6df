use std::path::{Path, PathBuf};

use campus_common::{Error, Result};
use tracing::{debug, info};

use crate::model::{AppConfig, LogFormat};

const CONFIG_FILE_NAMES: &[&str] = &["config.yml", "config.yaml", "config.toml"];

pub const ENV_DATABASE: &str = "CAMPUS_DATABASE";
pub const ENV_BUSY_TIMEOUT_MS: &str = "CAMPUS_BUSY_TIMEOUT_MS";
pub const ENV_LOG_LEVEL: &str = "CAMPUS_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "CAMPUS_LOG_FORMAT";

/// Locates and parses the configuration file, then layers environment
/// overrides on top. A missing file is not an error; defaults apply.
pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    /// `~/.config/campus` on Linux, the platform equivalent elsewhere.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("campus")
    }

    pub fn find_config_file(&self) -> Option<PathBuf> {
        CONFIG_FILE_NAMES
            .iter()
            .map(|name| self.config_dir.join(name))
            .find(|p| p.is_file())
    }

    pub fn load(&self) -> Result<AppConfig> {
        let mut config = match self.find_config_file() {
            Some(path) => Self::load_file(&path)?,
            None => {
                debug!(
                    "no config file in {}, using defaults",
                    self.config_dir.display()
                );
                AppConfig::default()
            }
        };
        apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a single file, choosing the format from its extension.
    pub fn load_file(path: &Path) -> Result<AppConfig> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let config = match ext {
            "yml" | "yaml" => serde_yaml::from_str(&contents).map_err(|e| {
                Error::Config(format!("YAML parse error in {}: {e}", path.display()))
            })?,
            "toml" => toml::from_str(&contents).map_err(|e| {
                Error::Config(format!("TOML parse error in {}: {e}", path.display()))
            })?,
            other => {
                return Err(Error::Config(format!(
                    "unsupported config extension: {other}"
                )));
            }
        };
        info!("loaded config from {}", path.display());
        Ok(config)
    }
}

/// Apply `CAMPUS_*` overrides looked up through `lookup`.
pub fn apply_env_overrides(
    config: &mut AppConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(path) = lookup(ENV_DATABASE).filter(|v| !v.is_empty()) {
        config.database.path = PathBuf::from(path);
    }
    if let Some(ms) = lookup(ENV_BUSY_TIMEOUT_MS) {
        config.database.busy_timeout_ms = ms
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("{ENV_BUSY_TIMEOUT_MS}={ms:?}: {e}")))?;
    }
    if let Some(level) = lookup(ENV_LOG_LEVEL).filter(|v| !v.is_empty()) {
        config.logging.level = level;
    }
    if let Some(format) = lookup(ENV_LOG_FORMAT) {
        config.logging.format = match format.to_ascii_lowercase().as_str() {
            "text" => LogFormat::Text,
            "json" => LogFormat::Json,
            other => {
                return Err(Error::Config(format!(
                    "{ENV_LOG_FORMAT} must be text or json, got {other:?}"
                )));
            }
        };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::new(dir.path());
        assert!(loader.find_config_file().is_none());

        let mut config = AppConfig::default();
        apply_env_overrides(&mut config, env(&[])).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.database.path, PathBuf::from("campus.db"));
    }

    #[test]
    fn yaml_file_is_found_and_parsed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.yml"),
            "database:\n  path: /var/lib/campus/campus.db\nlogging:\n  format: json\n",
        )
        .unwrap();

        let loader = ConfigLoader::new(dir.path());
        let path = loader.find_config_file().unwrap();
        let config = ConfigLoader::load_file(&path).unwrap();
        assert_eq!(
            config.database.path,
            PathBuf::from("/var/lib/campus/campus.db")
        );
        assert_eq!(config.database.busy_timeout_ms, 5_000);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.migrations.table_name, "_campus_migrations");
    }

    #[test]
    fn toml_file_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[migrations]\ntable_name = \"schema_history\"\n\n[logging]\nlevel = \"debug\"\n",
        )
        .unwrap();

        let config = ConfigLoader::load_file(&path).unwrap();
        assert_eq!(config.migrations.table_name, "schema_history");
        assert_eq!(config.migrations.lock_table_name, "_campus_migrations_lock");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "x=1").unwrap();
        let err = ConfigLoader::load_file(&path).unwrap_err();
        assert_eq!(
            err.to_string(),
            "configuration error: unsupported config extension: ini"
        );
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = AppConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[
                (ENV_DATABASE, "/tmp/other.db"),
                (ENV_BUSY_TIMEOUT_MS, "250"),
                (ENV_LOG_FORMAT, "JSON"),
            ]),
        )
        .unwrap();
        assert_eq!(config.database.path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.database.busy_timeout_ms, 250);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn bad_env_values_are_config_errors() {
        let mut config = AppConfig::default();
        let err = apply_env_overrides(&mut config, env(&[(ENV_BUSY_TIMEOUT_MS, "soon")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = apply_env_overrides(&mut config, env(&[(ENV_LOG_FORMAT, "xml")])).unwrap_err();
        assert!(err.to_string().contains("text or json"));
    }
}
