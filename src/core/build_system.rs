//! `[build-system]` table: which backend builds distributable artifacts.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::dependency::{is_valid_name, normalize_name};
use crate::resolver::constraint::{ConstraintError, VersionConstraint};

/// Backends whose providing distribution is known.
const KNOWN_BACKENDS: &[(&str, &str)] = &[
    ("poetry.core.masonry.api", "poetry-core"),
    ("poetry.masonry.api", "poetry"),
    ("setuptools.build_meta", "setuptools"),
    ("setuptools.build_meta:__legacy__", "setuptools"),
    ("hatchling.build", "hatchling"),
    ("flit_core.buildapi", "flit-core"),
    ("pdm.backend", "pdm-backend"),
    ("maturin", "maturin"),
];

/// The `[build-system]` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BuildSystem {
    /// Requirements installed before building (`poetry-core>=1.0.0`)
    #[serde(default)]
    pub requires: Vec<String>,

    /// Import path of the build backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_backend: Option<String>,

    /// In-tree backend search path
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backend_path: Vec<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, toml::Value>,
}

impl BuildSystem {
    /// Parse every entry of `requires`.
    pub fn requirements(&self) -> Result<Vec<Requirement>, RequirementError> {
        self.requires.iter().map(|r| Requirement::parse(r)).collect()
    }

    /// The distribution providing the configured backend, if it is a known one.
    pub fn backend_provider(&self) -> Option<&'static str> {
        let backend = self.build_backend.as_deref()?.trim();
        KNOWN_BACKENDS
            .iter()
            .find(|(path, _)| *path == backend)
            .map(|(_, provider)| *provider)
    }

    /// Find the requirement for a distribution by normalized name.
    pub fn requirement_for(&self, name: &str) -> Option<Requirement> {
        let wanted = normalize_name(name);
        self.requires
            .iter()
            .filter_map(|r| Requirement::parse(r).ok())
            .find(|r| r.normalized_name() == wanted)
    }
}

/// Error parsing a requirement string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequirementError {
    #[error("requirement `{0}` has no package name")]
    MissingName(String),

    #[error("requirement `{requirement}` has an invalid name")]
    InvalidName { requirement: String },

    #[error("requirement `{0}` has an unterminated extras list")]
    UnterminatedExtras(String),

    #[error("requirement `{requirement}` has an invalid version constraint")]
    InvalidConstraint {
        requirement: String,
        #[source]
        source: ConstraintError,
    },
}

/// A PEP 508 requirement: `name[extra,...] <constraint> ; <markers>` or `name @ url`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    name: String,
    extras: Vec<String>,
    constraint: VersionConstraint,
    url: Option<String>,
    markers: Option<String>,
}

impl Requirement {
    /// Parse a requirement string.
    pub fn parse(input: &str) -> Result<Self, RequirementError> {
        let (spec, markers) = match input.split_once(';') {
            Some((spec, markers)) => (spec.trim(), Some(markers.trim().to_string())),
            None => (input.trim(), None),
        };

        let name_end = spec
            .find(|c: char| !(c.is_ascii_alphanumeric() || "._-".contains(c)))
            .unwrap_or(spec.len());
        let name = &spec[..name_end];
        if name.is_empty() {
            return Err(RequirementError::MissingName(input.to_string()));
        }
        if !is_valid_name(name) {
            return Err(RequirementError::InvalidName {
                requirement: input.to_string(),
            });
        }

        let mut rest = spec[name_end..].trim_start();

        let mut extras = Vec::new();
        if let Some(after) = rest.strip_prefix('[') {
            let close = after
                .find(']')
                .ok_or_else(|| RequirementError::UnterminatedExtras(input.to_string()))?;
            extras = after[..close]
                .split(',')
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string)
                .collect();
            rest = after[close + 1..].trim_start();
        }

        if let Some(url) = rest.strip_prefix('@') {
            return Ok(Requirement {
                name: name.to_string(),
                extras,
                constraint: VersionConstraint::any(),
                url: Some(url.trim().to_string()),
                markers,
            });
        }

        let constraint_str = rest
            .strip_prefix('(')
            .and_then(|r| r.strip_suffix(')'))
            .unwrap_or(rest);
        let constraint = VersionConstraint::parse(constraint_str).map_err(|source| {
            RequirementError::InvalidConstraint {
                requirement: input.to_string(),
                source,
            }
        })?;

        Ok(Requirement {
            name: name.to_string(),
            extras,
            constraint,
            url: None,
            markers,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }

    pub fn extras(&self) -> &[String] {
        &self.extras
    }

    pub fn constraint(&self) -> &VersionConstraint {
        &self.constraint
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn markers(&self) -> Option<&str> {
        self.markers.as_deref()
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.extras.is_empty() {
            write!(f, "[{}]", self.extras.join(","))?;
        }
        match self.url {
            Some(ref url) => write!(f, " @ {}", url)?,
            None if !self.constraint.is_any() => write!(f, "{}", self.constraint)?,
            None => {}
        }
        if let Some(ref markers) = self.markers {
            write!(f, " ; {}", markers)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semver::Version;

    #[test]
    fn test_parse_poetry_core_requirement() {
        let req = Requirement::parse("poetry-core>=1.0.0").unwrap();
        assert_eq!(req.name(), "poetry-core");
        assert!(req.constraint().matches(&Version::new(1, 8, 3)));
        assert!(!req.constraint().matches(&Version::new(0, 9, 0)));
        assert_eq!(req.to_string(), "poetry-core>=1.0.0");
    }

    #[test]
    fn test_parse_requirement_with_extras_and_markers() {
        let req =
            Requirement::parse("setuptools[toml] (>=61, <70) ; python_version >= '3.8'").unwrap();
        assert_eq!(req.name(), "setuptools");
        assert_eq!(req.extras(), ["toml".to_string()]);
        assert!(req.constraint().matches(&Version::new(65, 0, 0)));
        assert_eq!(req.markers(), Some("python_version >= '3.8'"));
    }

    #[test]
    fn test_parse_url_requirement() {
        let req = Requirement::parse("mybackend @ https://example.com/mybackend-1.0.tar.gz").unwrap();
        assert_eq!(req.url(), Some("https://example.com/mybackend-1.0.tar.gz"));
        assert!(req.constraint().is_any());
    }

    #[test]
    fn test_invalid_requirements() {
        assert!(matches!(
            Requirement::parse(">=1.0"),
            Err(RequirementError::MissingName(_))
        ));
        assert!(matches!(
            Requirement::parse("poetry-core[toml"),
            Err(RequirementError::UnterminatedExtras(_))
        ));
        assert!(matches!(
            Requirement::parse("poetry-core>=one"),
            Err(RequirementError::InvalidConstraint { .. })
        ));
    }

    #[test]
    fn test_backend_provider() {
        let build = BuildSystem {
            requires: vec!["poetry-core>=1.0.0".to_string()],
            build_backend: Some("poetry.core.masonry.api".to_string()),
            ..Default::default()
        };
        assert_eq!(build.backend_provider(), Some("poetry-core"));
        assert!(build.requirement_for("Poetry_Core").is_some());
        assert!(build.requirement_for("setuptools").is_none());

        let custom = BuildSystem {
            build_backend: Some("in_tree.backend".to_string()),
            ..Default::default()
        };
        assert_eq!(custom.backend_provider(), None);
    }
}
