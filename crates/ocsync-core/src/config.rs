//! Configuration for the state layer.

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Main configuration struct.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Merge engine settings
    pub store: StoreConfig,
    /// Event stream settings
    pub stream: StreamConfig,
}

/// How the store guards against a delta event being applied twice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeltaDedup {
    /// Trust the transport to deliver each delta at most once
    #[default]
    Off,
    /// Skip deltas whose event sequence number is not above the last one applied to the part
    Sequence,
    /// Skip a delta when the stored text already ends with it and equals the payload text
    SnapshotMatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Messages held while their session is unknown
    pub max_pending_messages: usize,
    /// Parts held while their message is unknown
    pub max_pending_parts: usize,
    /// Delta redelivery guard
    pub delta_dedup: DeltaDedup,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_pending_messages: 256,
            max_pending_parts: 1024,
            delta_dedup: DeltaDedup::Off,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Capacity of the store change notification channel
    pub change_channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            change_channel_capacity: 256,
        }
    }
}

/// Validation result with multiple issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if validation passed (no errors).
    pub fn is_ok(&self) -> bool {
        !self.issues.iter().any(|i| i.severity == IssueSeverity::Error)
    }

    pub fn errors(&self) -> Vec<&ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Error)
            .collect()
    }

    pub fn warnings(&self) -> Vec<&ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Warning)
            .collect()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity: IssueSeverity::Error,
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity: IssueSeverity::Warning,
            field: field.into(),
            message: message.into(),
        });
    }
}

/// A single validation issue.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub severity: IssueSeverity,
    /// Field path (e.g., "store.max_pending_parts")
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    /// Warnings don't prevent loading
    Warning,
    /// Errors prevent loading
    Error,
}

impl SyncConfig {
    /// Load configuration from defaults, the user and project TOML files, and
    /// `OCSYNC_` environment variables (nested keys split on `__`).
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment()
            .merge(Toml::file(Self::config_dir().join("config.toml")))
            .merge(Toml::file(".opencode-sync/config.toml"))
            .merge(Env::prefixed("OCSYNC_").split("__"))
            .extract()
    }

    /// Load configuration from a single TOML file layered over the defaults.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, figment::Error> {
        Self::figment().merge(Toml::file(path.as_ref())).extract()
    }

    /// Load and validate configuration.
    pub fn load_validated() -> Result<Self, Error> {
        let config = Self::load().map_err(|e| Error::Config(e.to_string()))?;
        config.into_validated()
    }

    /// Fail on validation errors, logging warnings.
    pub fn into_validated(self) -> Result<Self, Error> {
        let result = self.validate();
        if !result.is_ok() {
            let errors: Vec<String> = result
                .errors()
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect();
            return Err(Error::Config(format!(
                "Configuration validation failed:\n  {}",
                errors.join("\n  ")
            )));
        }

        for warning in result.warnings() {
            tracing::warn!("Config warning - {}: {}", warning.field, warning.message);
        }

        Ok(self)
    }

    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();

        if self.store.max_pending_messages == 0 {
            result.add_warning(
                "store.max_pending_messages",
                "messages for unseen sessions will be dropped immediately",
            );
        }

        if self.store.max_pending_parts == 0 {
            result.add_warning(
                "store.max_pending_parts",
                "parts for unseen messages will be dropped immediately",
            );
        }

        if self.store.max_pending_parts > 1_000_000 {
            result.add_warning(
                "store.max_pending_parts",
                "buffer horizon is very high (> 1M), memory use may grow",
            );
        }

        if self.stream.change_channel_capacity == 0 {
            result.add_error(
                "stream.change_channel_capacity",
                "change_channel_capacity must be greater than 0",
            );
        }

        result
    }

    /// Render the configuration as TOML, e.g. to seed a config file.
    pub fn to_toml(&self) -> Result<String, Error> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|p| p.join("opencode-sync"))
            .unwrap_or_else(|| PathBuf::from("~/.config/opencode-sync"))
    }

    fn figment() -> Figment {
        Figment::new().merge(Serialized::defaults(SyncConfig::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = SyncConfig::default();
        let result = config.validate();
        assert!(result.is_ok(), "Default config should be valid: {:?}", result.issues);
        assert!(result.warnings().is_empty());
    }

    #[test]
    fn test_zero_channel_capacity_is_error() {
        let mut config = SyncConfig::default();
        config.stream.change_channel_capacity = 0;
        let result = config.validate();
        assert!(!result.is_ok());
        assert!(result
            .errors()
            .iter()
            .any(|e| e.field == "stream.change_channel_capacity"));
        assert!(config.into_validated().is_err());
    }

    #[test]
    fn test_zero_horizon_is_warning() {
        let mut config = SyncConfig::default();
        config.store.max_pending_messages = 0;
        let result = config.validate();
        assert!(result.is_ok());
        assert!(result
            .warnings()
            .iter()
            .any(|e| e.field == "store.max_pending_messages"));
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[store]\nmax_pending_parts = 8\ndelta_dedup = \"snapshot-match\""
        )
        .unwrap();

        let config = SyncConfig::load_from(file.path()).unwrap();
        assert_eq!(config.store.max_pending_parts, 8);
        assert_eq!(config.store.delta_dedup, DeltaDedup::SnapshotMatch);
        assert_eq!(config.store.max_pending_messages, 256);
        assert_eq!(config.stream, StreamConfig::default());
    }

    #[test]
    fn test_toml_output_loads_back() {
        let mut config = SyncConfig::default();
        config.store.delta_dedup = DeltaDedup::Sequence;
        let text = config.to_toml().unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        assert_eq!(SyncConfig::load_from(file.path()).unwrap(), config);
    }
}
