use crate::error::{LogmuxError, Result};
use crate::follow::FollowSource;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Runtime settings for the multiplexer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory whose subdirectories are treated as services
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// Delay between reconciliation polls, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Number of existing lines emitted when attaching to a log file
    #[serde(default = "default_tail_lines")]
    pub tail_lines: usize,

    /// Mechanism used to follow log files
    #[serde(default)]
    pub follow_source: FollowSource,
}

// Default value functions for serde
fn default_root_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_tail_lines() -> usize {
    100
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            poll_interval_ms: default_poll_interval_ms(),
            tail_lines: default_tail_lines(),
            follow_source: FollowSource::default(),
        }
    }
}

impl Settings {
    /// Load settings from a file (supports TOML and JSON)
    pub fn from_file(path: &Path) -> Result<Settings> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| LogmuxError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");

        let settings = match extension {
            "toml" => Self::parse_toml(&contents)?,
            "json" => Self::parse_json(&contents)?,
            _ => {
                return Err(LogmuxError::InvalidConfig(format!(
                    "Unsupported file format: {}. Use .toml or .json",
                    extension
                )))
            }
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Parse TOML settings
    fn parse_toml(contents: &str) -> Result<Settings> {
        toml::from_str(contents)
            .map_err(|e| LogmuxError::InvalidConfig(format!("Failed to parse TOML: {}", e)))
    }

    /// Parse JSON settings
    fn parse_json(contents: &str) -> Result<Settings> {
        serde_json::from_str(contents)
            .map_err(|e| LogmuxError::InvalidConfig(format!("Failed to parse JSON: {}", e)))
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        if self.root_dir.as_os_str().is_empty() {
            return Err(LogmuxError::ConfigError(
                "root_dir must not be empty".to_string(),
            ));
        }

        if self.poll_interval_ms == 0 {
            return Err(LogmuxError::ConfigError(
                "poll_interval_ms must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.root_dir, PathBuf::from("."));
        assert_eq!(settings.poll_interval_ms, 1000);
        assert_eq!(settings.tail_lines, 100);
        assert_eq!(settings.follow_source, FollowSource::Native);
    }

    #[test]
    fn test_parse_toml_with_defaults() {
        let settings = Settings::parse_toml("root_dir = \"/var/service\"").unwrap();
        assert_eq!(settings.root_dir, PathBuf::from("/var/service"));
        assert_eq!(settings.poll_interval_ms, 1000);
        assert_eq!(settings.tail_lines, 100);
    }

    #[test]
    fn test_parse_toml_full() {
        let contents = r#"
            root_dir = "/srv"
            poll_interval_ms = 250
            tail_lines = 10
            follow_source = "external"
        "#;
        let settings = Settings::parse_toml(contents).unwrap();
        assert_eq!(settings.root_dir, PathBuf::from("/srv"));
        assert_eq!(settings.poll_interval_ms, 250);
        assert_eq!(settings.tail_lines, 10);
        assert_eq!(settings.follow_source, FollowSource::External);
    }

    #[test]
    fn test_parse_json() {
        let contents = r#"{"root_dir": "/srv", "tail_lines": 5}"#;
        let settings = Settings::parse_json(contents).unwrap();
        assert_eq!(settings.root_dir, PathBuf::from("/srv"));
        assert_eq!(settings.tail_lines, 5);
        assert_eq!(settings.poll_interval_ms, 1000);
    }

    #[test]
    fn test_parse_invalid_toml() {
        assert!(Settings::parse_toml("root_dir = [").is_err());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let settings = Settings {
            poll_interval_ms: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_root() {
        let settings = Settings {
            root_dir: PathBuf::new(),
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_from_file_rejects_unknown_extension() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.yaml");
        std::fs::write(&path, "root_dir: /srv").unwrap();
        assert!(Settings::from_file(&path).is_err());
    }

    #[test]
    fn test_from_file_toml() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.toml");
        std::fs::write(&path, "poll_interval_ms = 100").unwrap();
        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.poll_interval_ms, 100);
    }
}
