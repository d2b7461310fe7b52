//! Configuration file support.
//!
//! Two configuration file locations are read:
//! - Global: `~/.phloem/config.toml` - User-wide defaults
//! - Project: `.phloem/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::dependency::GroupId;
use crate::ops::report::ReportFormat;

/// Name of the per-user and per-project configuration directory.
const CONFIG_DIR: &str = ".phloem";

/// Library configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Validation settings
    pub validate: ValidateConfig,

    /// Report settings
    pub report: ReportConfig,
}

/// Validation-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidateConfig {
    /// Fail when [build-system] is missing (default: true)
    pub require_build_system: Option<bool>,

    /// Treat extra, disagreeing pointer matches as errors (default: false)
    pub strict_pointers: Option<bool>,

    /// Let candidate selection pick pre-releases (default: false)
    pub allow_prereleases: Option<bool>,

    /// Groups to check; empty means every declared group
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
}

/// Report-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Output format (human, json, github)
    pub format: Option<String>,

    /// Colorize human output
    pub color: Option<bool>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create config directory: {}", parent.display())
            })?;
        }

        let contents =
            toml::to_string_pretty(self).with_context(|| "failed to serialize config")?;

        std::fs::write(path, contents)
            .with_context(|| format!("failed to write config file: {}", path.display()))
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        if other.validate.require_build_system.is_some() {
            self.validate.require_build_system = other.validate.require_build_system;
        }
        if other.validate.strict_pointers.is_some() {
            self.validate.strict_pointers = other.validate.strict_pointers;
        }
        if other.validate.allow_prereleases.is_some() {
            self.validate.allow_prereleases = other.validate.allow_prereleases;
        }
        if !other.validate.groups.is_empty() {
            self.validate.groups = other.validate.groups;
        }

        if other.report.format.is_some() {
            self.report.format = other.report.format;
        }
        if other.report.color.is_some() {
            self.report.color = other.report.color;
        }
    }

    pub fn require_build_system(&self) -> bool {
        self.validate.require_build_system.unwrap_or(true)
    }

    pub fn strict_pointers(&self) -> bool {
        self.validate.strict_pointers.unwrap_or(false)
    }

    pub fn allow_prereleases(&self) -> bool {
        self.validate.allow_prereleases.unwrap_or(false)
    }

    /// The configured groups; empty means all.
    pub fn groups(&self) -> Vec<GroupId> {
        self.validate
            .groups
            .iter()
            .map(|g| GroupId::from_name(g))
            .collect()
    }

    /// Parse the report format, falling back to human output.
    pub fn report_format(&self) -> ReportFormat {
        match self.report.format.as_deref() {
            Some(s) => s.parse().unwrap_or_else(|e| {
                tracing::warn!("{}, using human output", e);
                ReportFormat::Human
            }),
            None => ReportFormat::Human,
        }
    }

    /// Whether human output is colorized.
    pub fn color(&self) -> bool {
        self.report.color.unwrap_or(false)
    }

    /// Load the merged configuration for a project directory.
    pub fn discover(project_root: &Path) -> Self {
        let project = project_config_path(project_root);
        match global_config_path() {
            Some(global) => load_config(&global, &project),
            None => Config::load_or_default(&project),
        }
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.phloem/config.toml)
/// 2. Global config (~/.phloem/config.toml)
/// 3. Defaults
pub fn load_config(global_path: &Path, project_path: &Path) -> Config {
    let mut config = Config::default();

    if global_path.exists() {
        config.merge(Config::load_or_default(global_path));
    }

    if project_path.exists() {
        config.merge(Config::load_or_default(project_path));
    }

    tracing::debug!("effective config: {:?}", config);
    config
}

/// Get the global config directory (~/.phloem).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(CONFIG_DIR))
}

/// Get the global config path (~/.phloem/config.toml).
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config path (.phloem/config.toml).
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(CONFIG_DIR).join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.require_build_system());
        assert!(!config.strict_pointers());
        assert!(!config.allow_prereleases());
        assert!(config.groups().is_empty());
        assert_eq!(config.report_format(), ReportFormat::Human);
    }

    #[test]
    fn test_config_load() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");

        std::fs::write(
            &config_path,
            r#"
[validate]
require_build_system = false
strict_pointers = true
groups = ["main", "docs"]

[report]
format = "json"
"#,
        )
        .unwrap();

        let config = Config::load(&config_path).unwrap();
        assert!(!config.require_build_system());
        assert!(config.strict_pointers());
        assert_eq!(
            config.groups(),
            vec![GroupId::Main, GroupId::Named("docs".to_string())]
        );
        assert_eq!(config.report_format(), ReportFormat::Json);
    }

    #[test]
    fn test_config_merge() {
        let mut base = Config::default();
        base.validate.strict_pointers = Some(true);
        base.report.format = Some("github".to_string());

        let mut override_cfg = Config::default();
        override_cfg.report.format = Some("json".to_string());

        base.merge(override_cfg);

        assert_eq!(base.report.format, Some("json".to_string()));
        assert_eq!(base.validate.strict_pointers, Some(true)); // Not overridden
    }

    #[test]
    fn test_unknown_format_falls_back() {
        let mut config = Config::default();
        config.report.format = Some("yaml".to_string());
        assert_eq!(config.report_format(), ReportFormat::Human);
    }

    #[test]
    fn test_invalid_file_falls_back_to_default() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(&config_path, "[validate\n").unwrap();

        assert!(Config::load(&config_path).is_err());
        assert_eq!(Config::load_or_default(&config_path), Config::default());
    }

    #[test]
    fn test_save_and_reload() {
        let tmp = TempDir::new().unwrap();
        let config_path = project_config_path(tmp.path());

        let mut config = Config::default();
        config.validate.allow_prereleases = Some(true);
        config.save(&config_path).unwrap();

        let loaded = Config::load(&config_path).unwrap();
        assert!(loaded.allow_prereleases());
    }

    #[test]
    fn test_load_config_precedence() {
        let tmp = TempDir::new().unwrap();
        let global_path = tmp.path().join("global.toml");
        let project_path = tmp.path().join("project.toml");

        std::fs::write(
            &global_path,
            r#"
[validate]
strict_pointers = true
require_build_system = false
"#,
        )
        .unwrap();

        std::fs::write(
            &project_path,
            r#"
[validate]
require_build_system = true
"#,
        )
        .unwrap();

        let config = load_config(&global_path, &project_path);

        assert!(config.require_build_system());
        assert!(config.strict_pointers());
    }
}
