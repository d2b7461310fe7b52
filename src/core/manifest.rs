//! pyproject.toml manifest parsing and schema.
//!
//! The manifest is the single artifact describing the project: identity in
//! `[tool.poetry]`, dependency groups, `[build-system]` and the release
//! automation table `[tool.semantic_release]`. Tables this crate does not
//! interpret are kept so that serializing a parsed manifest loses nothing.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use miette::{Diagnostic as MietteDiagnostic, NamedSource, SourceSpan};
use semver::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::build_system::BuildSystem;
use crate::core::dependency::{
    normalize_name, Dependency, DependencyError, DependencyTable, GroupId, PYTHON,
};
use crate::core::release::{OneOrMany, ReleaseConfig};
use crate::resolver::version::parse_version;

/// Canonical manifest file name.
pub const MANIFEST_NAME: &str = "pyproject.toml";

/// Error loading a manifest.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum ManifestError {
    #[error("failed to parse {}: {message}", path.display())]
    #[diagnostic(code(phloem::manifest::parse))]
    Parse {
        path: PathBuf,
        message: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("{message}")]
        span: Option<SourceSpan>,
    },

    #[error("manifest at {} has no [tool.poetry] section", path.display())]
    #[diagnostic(
        code(phloem::manifest::missing_poetry),
        help("add a [tool.poetry] table with at least `name` and `version`")
    )]
    MissingPoetry { path: PathBuf },
}

impl ManifestError {
    fn parse(path: &Path, content: &str, err: &toml::de::Error) -> Self {
        ManifestError::Parse {
            path: path.to_path_buf(),
            message: err.message().to_string(),
            src: NamedSource::new(path.display().to_string(), content.to_string()),
            span: err.span().map(SourceSpan::from),
        }
    }
}

/// Package identity from [tool.poetry].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PackageMetadata {
    /// Package name
    pub name: String,

    /// Package version
    pub version: String,

    /// Package description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Authors, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub maintainers: Vec<String>,

    /// License identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    /// README file(s)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readme: Option<OneOrMany>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classifiers: Vec<String>,

    /// Other [tool.poetry] keys (`packages`, `include`, `scripts`, ...)
    #[serde(flatten)]
    pub extra: BTreeMap<String, toml::Value>,
}

impl PackageMetadata {
    /// Parse the version string.
    pub fn version(&self) -> Result<Version> {
        parse_version(&self.version).with_context(|| format!("invalid version: {}", self.version))
    }
}

/// A named group from `[tool.poetry.group.<name>]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencyGroup {
    /// Not installed unless requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional: Option<bool>,

    #[serde(default)]
    pub dependencies: DependencyTable,

    #[serde(flatten)]
    pub extra: BTreeMap<String, toml::Value>,
}

/// The parsed pyproject.toml manifest.
#[derive(Debug, Clone)]
pub struct Manifest {
    /// Package identity
    pub package: PackageMetadata,

    /// Runtime dependencies (including the `python` constraint)
    pub dependencies: DependencyTable,

    /// Development dependencies
    pub dev_dependencies: DependencyTable,

    /// Named dependency groups
    pub groups: IndexMap<String, DependencyGroup>,

    /// Extras: extra name -> optional dependency names
    pub extras: IndexMap<String, Vec<String>>,

    /// Build backend declaration
    pub build_system: Option<BuildSystem>,

    /// Release automation configuration
    pub release: Option<ReleaseConfig>,

    /// Other [tool.*] tables
    pub tools: BTreeMap<String, toml::Value>,

    /// Other top-level tables
    pub other: BTreeMap<String, toml::Value>,

    /// Path of the manifest file
    pub manifest_path: PathBuf,

    /// The text this manifest was parsed from
    source: String,
}

/// Location and contents are not part of a manifest's meaning.
impl PartialEq for Manifest {
    fn eq(&self, other: &Self) -> bool {
        self.package == other.package
            && self.dependencies == other.dependencies
            && self.dev_dependencies == other.dev_dependencies
            && self.groups == other.groups
            && self.extras == other.extras
            && self.build_system == other.build_system
            && self.release == other.release
            && self.tools == other.tools
            && self.other == other.other
    }
}

/// Raw manifest as deserialized from TOML.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RawPyproject {
    #[serde(default)]
    tool: RawTool,

    #[serde(
        default,
        rename = "build-system",
        skip_serializing_if = "Option::is_none"
    )]
    build_system: Option<BuildSystem>,

    #[serde(flatten)]
    other: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RawTool {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    poetry: Option<RawPoetry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    semantic_release: Option<ReleaseConfig>,

    #[serde(flatten)]
    other: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawPoetry {
    #[serde(flatten)]
    package: PackageMetadata,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    dependencies: DependencyTable,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    dev_dependencies: DependencyTable,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    group: IndexMap<String, DependencyGroup>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    extras: IndexMap<String, Vec<String>>,
}

impl Manifest {
    /// Load a manifest from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest: {}", path.display()))?;

        Self::parse(&content, path)
    }

    /// Parse manifest content.
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let raw: RawPyproject =
            toml::from_str(content).map_err(|e| ManifestError::parse(path, content, &e))?;

        let poetry = raw.tool.poetry.ok_or_else(|| ManifestError::MissingPoetry {
            path: path.to_path_buf(),
        })?;

        tracing::debug!(
            "parsed manifest for `{}` {} ({} runtime, {} dev, {} named groups)",
            poetry.package.name,
            poetry.package.version,
            poetry.dependencies.len(),
            poetry.dev_dependencies.len(),
            poetry.group.len()
        );

        Ok(Manifest {
            package: poetry.package,
            dependencies: poetry.dependencies,
            dev_dependencies: poetry.dev_dependencies,
            groups: poetry.group,
            extras: poetry.extras,
            build_system: raw.build_system,
            release: raw.tool.semantic_release,
            tools: raw.tool.other,
            other: raw.other,
            manifest_path: path.to_path_buf(),
            source: content.to_string(),
        })
    }

    /// Serialize the manifest back to TOML.
    ///
    /// Formatting and comments are not preserved, keys and values are.
    pub fn to_toml_string(&self) -> Result<String> {
        let raw = RawPyproject {
            tool: RawTool {
                poetry: Some(RawPoetry {
                    package: self.package.clone(),
                    dependencies: self.dependencies.clone(),
                    dev_dependencies: self.dev_dependencies.clone(),
                    group: self.groups.clone(),
                    extras: self.extras.clone(),
                }),
                semantic_release: self.release.clone(),
                other: self.tools.clone(),
            },
            build_system: self.build_system.clone(),
            other: self.other.clone(),
        };

        toml::to_string_pretty(&raw).context("failed to serialize manifest")
    }

    /// Get the package name.
    pub fn name(&self) -> &str {
        &self.package.name
    }

    /// Get the package version.
    pub fn version(&self) -> Result<Version> {
        self.package.version()
    }

    /// The directory containing this manifest.
    pub fn manifest_dir(&self) -> &Path {
        self.manifest_path.parent().unwrap_or(Path::new("."))
    }

    /// The text this manifest was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The `python` constraint of the runtime group, as written.
    pub fn python_constraint(&self) -> Option<&str> {
        self.dependencies
            .iter()
            .find(|(name, _)| normalize_name(name) == PYTHON)
            .and_then(|(_, spec)| spec.constraint_strings().first().copied())
    }

    /// Every declared group with its table, main and dev first.
    pub fn declared_groups(&self) -> Vec<(GroupId, &DependencyTable)> {
        let mut groups = vec![
            (GroupId::Main, &self.dependencies),
            (GroupId::Dev, &self.dev_dependencies),
        ];
        groups.extend(
            self.groups
                .iter()
                .map(|(name, group)| (GroupId::Named(name.clone()), &group.dependencies)),
        );
        groups
    }

    /// Get a group's declarations.
    pub fn group(&self, id: &GroupId) -> Option<&DependencyTable> {
        match id {
            GroupId::Main => Some(&self.dependencies),
            GroupId::Dev => Some(&self.dev_dependencies),
            GroupId::Named(name) => self.groups.get(name).map(|g| &g.dependencies),
        }
    }

    /// Parse every declaration of the given groups (all groups when empty).
    ///
    /// The `python` pseudo-dependency is included; callers that want only
    /// packages filter it with [`Dependency::is_python`].
    pub fn dependency_list(&self, groups: &[GroupId]) -> Result<Vec<Dependency>, DependencyError> {
        let mut deps = Vec::new();
        for (group, table) in self.declared_groups() {
            if !groups.is_empty() && !groups.contains(&group) {
                continue;
            }
            for (name, spec) in table {
                deps.push(spec.to_dependency(name, group.clone())?);
            }
        }
        Ok(deps)
    }
}

/// Find the nearest manifest at or above `start`.
pub fn find_manifest(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(MANIFEST_NAME))
        .find(|candidate| candidate.is_file())
}

/// Generate a manifest for a new project.
pub fn generate_default_manifest(name: &str, authors: &[&str]) -> String {
    let authors = authors
        .iter()
        .map(|a| format!("\"{}\"", a))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"[tool.poetry]
name = "{name}"
version = "0.1.0"
description = ""
authors = [{authors}]
license = "MIT"
readme = "README.md"

[tool.poetry.dependencies]
python = "^3.9"

[tool.poetry.dev-dependencies]

[tool.semantic_release]
version_variable = "pyproject.toml:version"

[build-system]
requires = ["poetry-core>=1.0.0"]
build-backend = "poetry.core.masonry.api"
"#
    )
}
