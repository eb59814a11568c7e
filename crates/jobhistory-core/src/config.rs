//! Configuration management for jobhistory.
//!
//! Configuration is loaded from multiple sources and merged:
//! 1. Global config: `~/.config/jobhistory/config.json`
//! 2. Environment variable: `JOBHISTORY_CONFIG_CONTENT`
//! 3. Project config: `jobhistory.json` or `jobhistory.jsonc` in the given directory
//!
//! Supports JSONC (JSON with comments) and variable substitution:
//! - `{env:VAR_NAME}` - Substitute environment variable
//! - `{file:path}` - Substitute file contents

use crate::entity::{EntityDescriptor, EntityKind};
use crate::error::{ConfigError, HistoryResult};
use jobhistory_snapshot::{EntityId, PurgePolicy, SnapshotConfig};
use jobhistory_util::{LogConfig, LogLevel};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Environment variable holding inline configuration.
pub const CONFIG_CONTENT_ENV: &str = "JOBHISTORY_CONFIG_CONTENT";

/// Static regex for variable substitution, compiled once.
static VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

/// Get the variable substitution regex, compiling it once on first use.
fn var_regex() -> &'static regex::Regex {
    VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\{(env|file):([^}]+)\}")
            .expect("Invalid regex pattern - this is a compile-time constant")
    })
}

/// History configuration.
///
/// Every field is optional in the file; the accessors supply defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Log level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<LogLevel>,

    /// Directory holding all history (`config-history`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_root: Option<PathBuf>,

    /// File name of the configuration content in each snapshot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_file: Option<String>,

    /// Whether module entities get a history.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_module_configuration: Option<bool>,

    /// Skip writing a snapshot whose content equals the latest one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_duplicate_history: Option<bool>,

    /// Keep at most this many snapshots per entity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_history_entries: Option<usize>,

    /// Drop snapshots older than this many days.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_days_to_keep: Option<u32>,

    /// Timestamps a write may try before failing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_write_attempts: Option<u32>,
}

impl HistoryConfig {
    /// Load configuration from all sources.
    ///
    /// Loading order (later sources override earlier):
    /// 1. Global config from `~/.config/jobhistory/`
    /// 2. `JOBHISTORY_CONFIG_CONTENT` environment variable
    /// 3. Project config from `project_dir`
    pub async fn load(project_dir: Option<&Path>) -> HistoryResult<(Self, Vec<PathBuf>)> {
        let mut config = HistoryConfig::default();
        let mut sources = Vec::new();

        // 1. Load global config
        if let Some(global_dir) = jobhistory_util::path::config_dir() {
            let path = global_dir.join("config.json");
            if path.exists() {
                config = config.merge(Self::load_file(&path).await?);
                sources.push(path);
            }
        }

        // 2. Load from environment variable
        if let Ok(content) = std::env::var(CONFIG_CONTENT_ENV) {
            config = config.merge(Self::parse_jsonc(&content, "<env>")?);
        }

        // 3. Load project config
        if let Some(dir) = project_dir {
            for name in &["jobhistory.jsonc", "jobhistory.json"] {
                let path = dir.join(name);
                if path.exists() {
                    config = config.merge(Self::load_file(&path).await?);
                    sources.push(path);
                    break;
                }
            }
        }

        config.validate()?;
        tracing::debug!(sources = sources.len(), "Loaded history configuration");
        Ok((config, sources))
    }

    /// Load configuration from a file.
    pub async fn load_file(path: &Path) -> HistoryResult<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let content = Self::substitute_variables(&content, path)?;
        Self::parse_jsonc(&content, &path.display().to_string())
    }

    /// Check values that would make the store unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_write_attempts == Some(0) {
            return Err(ConfigError::validation("max_write_attempts must be at least 1"));
        }
        if let Some(name) = &self.content_file {
            if !jobhistory_util::path::is_safe_component(name)
                || name == jobhistory_snapshot::METADATA_FILE
            {
                return Err(ConfigError::validation(format!(
                    "content_file {name:?} must be a plain file name"
                )));
            }
        }
        Ok(())
    }

    pub fn log_level(&self) -> LogLevel {
        self.log_level.unwrap_or_default()
    }

    /// Logging setup for the configured level.
    pub fn log_config(&self) -> LogConfig {
        LogConfig::with_level(self.log_level())
    }

    pub fn history_root(&self) -> PathBuf {
        self.history_root
            .clone()
            .unwrap_or_else(jobhistory_util::path::default_history_root)
    }

    pub fn save_module_configuration(&self) -> bool {
        self.save_module_configuration.unwrap_or(false)
    }

    pub fn skip_duplicate_history(&self) -> bool {
        self.skip_duplicate_history.unwrap_or(true)
    }

    /// Store settings derived from this configuration.
    pub fn snapshot_config(&self) -> SnapshotConfig {
        let defaults = SnapshotConfig::default();
        SnapshotConfig {
            content_file: self.content_file.clone().unwrap_or(defaults.content_file),
            max_write_attempts: self.max_write_attempts.unwrap_or(defaults.max_write_attempts),
        }
    }

    pub fn purge_policy(&self) -> PurgePolicy {
        PurgePolicy {
            max_entries: self.max_history_entries,
            max_age_days: self.max_days_to_keep,
        }
    }

    /// Describe an entity of the given kind under this configuration.
    pub fn descriptor(&self, id: EntityId, kind: EntityKind) -> EntityDescriptor {
        EntityDescriptor::new(id, kind, self.save_module_configuration())
    }

    /// Parse JSONC (JSON with comments).
    fn parse_jsonc(content: &str, source: &str) -> HistoryResult<Self> {
        let stripped = Self::strip_comments(content);

        serde_json::from_str(&stripped).map_err(|e| {
            ConfigError::InvalidJson {
                path: source.to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Strip JSON comments.
    fn strip_comments(input: &str) -> String {
        let mut result = String::with_capacity(input.len());
        let mut chars = input.chars().peekable();
        let mut in_string = false;
        let mut escape_next = false;

        while let Some(c) = chars.next() {
            if escape_next {
                result.push(c);
                escape_next = false;
                continue;
            }

            if c == '\\' && in_string {
                result.push(c);
                escape_next = true;
                continue;
            }

            if c == '"' {
                in_string = !in_string;
                result.push(c);
                continue;
            }

            if in_string {
                result.push(c);
                continue;
            }

            if c == '/' {
                match chars.peek() {
                    Some('/') => {
                        chars.next();
                        for c in chars.by_ref() {
                            if c == '\n' {
                                result.push('\n');
                                break;
                            }
                        }
                        continue;
                    }
                    Some('*') => {
                        chars.next();
                        let mut prev = ' ';
                        for c in chars.by_ref() {
                            if prev == '*' && c == '/' {
                                break;
                            }
                            // keep line numbers stable for error messages
                            if c == '\n' {
                                result.push('\n');
                            }
                            prev = c;
                        }
                        continue;
                    }
                    _ => {}
                }
            }

            result.push(c);
        }

        result
    }

    /// Substitute `{env:..}` and `{file:..}` references.
    ///
    /// File references are resolved relative to the config file.
    fn substitute_variables(content: &str, config_path: &Path) -> HistoryResult<String> {
        let config_dir = config_path.parent().unwrap_or(Path::new("."));
        let mut result = content.to_string();

        for cap in var_regex().captures_iter(content) {
            let (Some(full_match), Some(kind), Some(value)) = (cap.get(0), cap.get(1), cap.get(2))
            else {
                continue;
            };
            let value = value.as_str();

            let replacement = match kind.as_str() {
                "env" => std::env::var(value).map_err(|_| ConfigError::EnvVarNotFound {
                    name: value.to_string(),
                })?,
                "file" => {
                    let file_path = config_dir.join(value);
                    std::fs::read_to_string(&file_path)
                        .map(|v| v.trim().to_string())
                        .map_err(|_| ConfigError::FileRefNotFound {
                            path: file_path.display().to_string(),
                        })?
                }
                _ => continue,
            };

            result = result.replace(full_match.as_str(), &replacement);
        }

        Ok(result)
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(self, other: Self) -> Self {
        Self {
            log_level: other.log_level.or(self.log_level),
            history_root: other.history_root.or(self.history_root),
            content_file: other.content_file.or(self.content_file),
            save_module_configuration: other
                .save_module_configuration
                .or(self.save_module_configuration),
            skip_duplicate_history: other.skip_duplicate_history.or(self.skip_duplicate_history),
            max_history_entries: other.max_history_entries.or(self.max_history_entries),
            max_days_to_keep: other.max_days_to_keep.or(self.max_days_to_keep),
            max_write_attempts: other.max_write_attempts.or(self.max_write_attempts),
        }
    }
}
