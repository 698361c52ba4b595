use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = "worktrail.toml";

labeled_enum! {
    pub enum DispatchMode as "dispatch mode" {
        Sequential => "sequential" | "sync",
        Concurrent => "concurrent" | "parallel",
    }
}

/// Per-root engine settings. Every section and field is optional in the
/// file; anything missing keeps its default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub store: StoreConfig,
    pub lifecycle: LifecycleConfig,
    pub groups: GroupConfig,
    pub hooks: HookConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub slug_max_len: usize,
    pub capture_git_context: bool,
    pub session_number: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            slug_max_len: 50,
            capture_git_context: true,
            session_number: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Minimum idle days before an item can decay at all.
    pub decay_after_days: i64,
    /// Items scoring at or above this never decay.
    pub min_activity_score: f64,
    /// Idle days after which a `now` Work is high priority.
    pub now_inactive_days: i64,
    pub review_after_days: i64,
    /// Idle days after which archiving needs no confirmation.
    pub auto_archive_days: i64,
    pub group_stale_days: i64,
    pub group_min_activity: f64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            decay_after_days: 7,
            min_activity_score: 3.0,
            now_inactive_days: 14,
            review_after_days: 30,
            auto_archive_days: 90,
            group_stale_days: 30,
            group_min_activity: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupConfig {
    pub min_artifacts: usize,
    pub max_artifacts: usize,
    pub min_readiness: f64,
    pub split_cohesion: f64,
    /// Readiness at which a consolidated Work lands in `now` instead of `next`.
    pub immediate_readiness: f64,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            min_artifacts: 2,
            max_artifacts: 10,
            min_readiness: 0.6,
            split_cohesion: 0.3,
            immediate_readiness: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HookConfig {
    pub enabled: bool,
    pub mode: DispatchMode,
    pub timeout_ms: u64,
    pub max_concurrency: usize,
    pub continue_on_error: bool,
    pub builtin: Vec<String>,
    pub inactivity_warning_days: i64,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: DispatchMode::Concurrent,
            timeout_ms: 5_000,
            max_concurrency: 4,
            continue_on_error: true,
            builtin: vec![
                "activity_log".to_string(),
                "commit_tracker".to_string(),
                "inactivity_warning".to_string(),
            ],
            inactivity_warning_days: 14,
        }
    }
}

impl HookConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }
}

impl EngineConfig {
    pub fn path_for_root(root: &Path) -> PathBuf {
        root.join(CONFIG_FILE_NAME)
    }

    /// Reads `<root>/worktrail.toml` when present, defaults otherwise.
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let path = Self::path_for_root(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&raw).map_err(|err| match err {
            ConfigError::Toml { source, .. } => ConfigError::Toml {
                path: Some(path.clone()),
                source,
            },
            other => other,
        })
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig =
            toml::from_str(raw).map_err(|source| ConfigError::Toml { path: None, source })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.hooks.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "hooks.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.groups.min_artifacts == 0 {
            return Err(ConfigError::Invalid(
                "groups.min_artifacts must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.groups.min_readiness) {
            return Err(ConfigError::Invalid(
                "groups.min_readiness must be between 0 and 1".to_string(),
            ));
        }
        if self.lifecycle.auto_archive_days < self.lifecycle.decay_after_days {
            return Err(ConfigError::Invalid(
                "lifecycle.auto_archive_days must not be below decay_after_days".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Toml {
        path: Option<PathBuf>,
        source: toml::de::Error,
    },
    Render(toml::ser::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "I/O error while reading config: {}", err),
            ConfigError::Toml {
                path: Some(path),
                source,
            } => write!(f, "invalid config TOML in '{}': {}", path.display(), source),
            ConfigError::Toml { path: None, source } => {
                write!(f, "invalid config TOML: {}", source)
            }
            ConfigError::Render(err) => write!(f, "failed to render config: {}", err),
            ConfigError::Invalid(message) => write!(f, "invalid config: {}", message),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Io(err) => Some(err),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Render(err) => Some(err),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        ConfigError::Io(value)
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(value: toml::ser::Error) -> Self {
        ConfigError::Render(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, DispatchMode, EngineConfig};
    use uuid::Uuid;

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let config = EngineConfig::from_toml_str(
            r#"
[hooks]
mode = "sequential"
max_concurrency = 2

[lifecycle]
auto_archive_days = 120
"#,
        )
        .expect("partial config should parse");
        assert_eq!(config.hooks.mode, DispatchMode::Sequential);
        assert_eq!(config.hooks.max_concurrency, 2);
        assert_eq!(config.hooks.timeout_ms, 5_000);
        assert_eq!(config.lifecycle.auto_archive_days, 120);
        assert_eq!(config.lifecycle.now_inactive_days, 14);
        assert_eq!(config.groups.min_artifacts, 2);
    }

    #[test]
    fn rejects_zero_concurrency() {
        let err = EngineConfig::from_toml_str("[hooks]\nmax_concurrency = 0\n")
            .expect_err("zero concurrency should be rejected");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rendered_defaults_parse_back() {
        let rendered = EngineConfig::default()
            .to_toml_string()
            .expect("defaults should render");
        let parsed = EngineConfig::from_toml_str(&rendered).expect("rendered config should parse");
        assert_eq!(parsed, EngineConfig::default());
    }

    #[test]
    fn load_reports_path_on_bad_toml() {
        let root = std::env::temp_dir().join(format!("worktrail-config-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&root).expect("temp root should be creatable");
        std::fs::write(EngineConfig::path_for_root(&root), "[hooks\n").expect("write config");

        let err = EngineConfig::load(&root).expect_err("broken TOML should fail");
        assert!(err.to_string().contains("worktrail.toml"));

        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn missing_file_means_defaults() {
        let root = std::env::temp_dir().join(format!("worktrail-config-{}", Uuid::now_v7()));
        let config = EngineConfig::load(&root).expect("missing config should default");
        assert_eq!(config, EngineConfig::default());
    }
}
