//! Dependency specification.
//!
//! A Dependency describes what the project requires from another package:
//! a version constraint, the group that declares it, and where it comes from.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::resolver::constraint::{ConstraintError, VersionConstraint};

/// PEP 508 distribution name.
static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^([a-z0-9]|[a-z0-9][a-z0-9._-]*[a-z0-9])$").unwrap());

static SEPARATOR_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[-_.]+").unwrap());

/// Name of the interpreter pseudo-dependency in the main group.
pub const PYTHON: &str = "python";

/// Dependency declarations keyed by name, in declaration order.
pub type DependencyTable = IndexMap<String, DependencySpec>;

/// Normalize a package name (PEP 503): lowercase, separator runs become `-`.
///
/// `Scikit_Learn` and `scikit-learn` name the same package.
pub fn normalize_name(name: &str) -> String {
    SEPARATOR_RUN_RE
        .replace_all(name.trim(), "-")
        .to_lowercase()
}

/// Check that a package name is a valid distribution name.
pub fn is_valid_name(name: &str) -> bool {
    NAME_RE.is_match(name)
}

/// The group a dependency is declared in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GroupId {
    /// `[tool.poetry.dependencies]`
    Main,
    /// `[tool.poetry.dev-dependencies]`
    Dev,
    /// `[tool.poetry.group.<name>.dependencies]`
    Named(String),
}

impl GroupId {
    /// Parse a group name as used in options (`main`, `dev`, anything else is named).
    pub fn from_name(name: &str) -> Self {
        match name {
            "main" => GroupId::Main,
            "dev" | "dev-dependencies" => GroupId::Dev,
            other => GroupId::Named(other.to_string()),
        }
    }

    /// The TOML path of the table holding this group's declarations.
    pub fn table_path(&self) -> Vec<String> {
        match self {
            GroupId::Main => vec!["tool".into(), "poetry".into(), "dependencies".into()],
            GroupId::Dev => vec!["tool".into(), "poetry".into(), "dev-dependencies".into()],
            GroupId::Named(name) => vec![
                "tool".into(),
                "poetry".into(),
                "group".into(),
                name.clone(),
                "dependencies".into(),
            ],
        }
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupId::Main => write!(f, "main"),
            GroupId::Dev => write!(f, "dev"),
            GroupId::Named(name) => write!(f, "group `{}`", name),
        }
    }
}

/// Where a dependency is fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    /// A package index; `None` means the default index.
    Registry(Option<String>),
    /// A local directory or archive.
    Path(PathBuf),
    /// A git repository, optionally pinned to a branch, tag or revision.
    Git { url: String, reference: Option<String> },
    /// A direct archive URL.
    Url(String),
}

impl SourceKind {
    /// Check if this is an index dependency.
    pub fn is_registry(&self) -> bool {
        matches!(self, SourceKind::Registry(_))
    }
}

/// Error converting a declaration into a [`Dependency`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DependencyError {
    #[error("invalid dependency name `{0}`")]
    InvalidName(String),

    #[error("dependency `{name}` has an invalid version constraint")]
    InvalidConstraint {
        name: String,
        #[source]
        source: ConstraintError,
    },

    #[error("dependency `{name}` has an invalid python constraint")]
    InvalidPython {
        name: String,
        #[source]
        source: ConstraintError,
    },

    #[error("dependency `{name}` has an invalid url `{url}`")]
    InvalidUrl { name: String, url: String },

    #[error("dependency `{name}` cannot combine `{first}` and `{second}`")]
    ConflictingSources {
        name: String,
        first: &'static str,
        second: &'static str,
    },

    #[error("dependency `{0}` declares an empty list of constraints")]
    EmptyMultiple(String),
}

/// Dependency specification as it appears in pyproject.toml.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencySpec {
    /// Simple constraint string: `pandas = "^1.4"`
    Simple(String),

    /// Detailed specification
    Detailed(DetailedDependencySpec),

    /// One entry per environment: `foo = [{ version = "1", python = "<3.8" }, ...]`
    Multiple(Vec<DetailedDependencySpec>),
}

/// Detailed dependency specification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DetailedDependencySpec {
    /// Version constraint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Only installed through an extra
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional: Option<bool>,

    /// Extras of the dependency to enable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extras: Option<Vec<String>>,

    /// Interpreter constraint for this dependency
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python: Option<String>,

    /// Environment markers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markers: Option<String>,

    /// Platform restriction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    /// Accept pre-releases when selecting a version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_prereleases: Option<bool>,

    /// Path to local dependency
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Install a path dependency in editable mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub develop: Option<bool>,

    /// Git repository URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<String>,

    /// Git branch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    /// Git tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    /// Git revision
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,

    /// Direct archive URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Named package source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Keys this crate does not interpret, kept for round-tripping
    #[serde(flatten)]
    pub extra: BTreeMap<String, toml::Value>,
}

impl DetailedDependencySpec {
    fn source_kind(&self, name: &str) -> Result<SourceKind, DependencyError> {
        let selectors: Vec<&'static str> = [
            ("path", self.path.is_some()),
            ("git", self.git.is_some()),
            ("url", self.url.is_some()),
        ]
        .into_iter()
        .filter_map(|(key, set)| set.then_some(key))
        .collect();

        if let [first, second, ..] = selectors.as_slice() {
            return Err(DependencyError::ConflictingSources {
                name: name.to_string(),
                first: *first,
                second: *second,
            });
        }

        if let Some(ref path) = self.path {
            return Ok(SourceKind::Path(path.clone()));
        }

        if let Some(ref git) = self.git {
            // scp-like `git@host:owner/repo.git` is not a URL but is valid for git
            if !git.starts_with("git@") && Url::parse(git).is_err() {
                return Err(DependencyError::InvalidUrl {
                    name: name.to_string(),
                    url: git.clone(),
                });
            }
            let reference = self
                .branch
                .clone()
                .or_else(|| self.tag.clone())
                .or_else(|| self.rev.clone());
            return Ok(SourceKind::Git {
                url: git.clone(),
                reference,
            });
        }

        if let Some(ref url) = self.url {
            Url::parse(url).map_err(|_| DependencyError::InvalidUrl {
                name: name.to_string(),
                url: url.clone(),
            })?;
            return Ok(SourceKind::Url(url.clone()));
        }

        Ok(SourceKind::Registry(self.source.clone()))
    }
}

impl DependencySpec {
    /// Shorthand for a plain constraint declaration.
    pub fn simple(constraint: impl Into<String>) -> Self {
        DependencySpec::Simple(constraint.into())
    }

    /// The constraint expressions written for this declaration.
    ///
    /// Entries without a `version` key are omitted.
    pub fn constraint_strings(&self) -> Vec<&str> {
        match self {
            DependencySpec::Simple(v) => vec![v.as_str()],
            DependencySpec::Detailed(d) => d.version.as_deref().into_iter().collect(),
            DependencySpec::Multiple(entries) => entries
                .iter()
                .filter_map(|d| d.version.as_deref())
                .collect(),
        }
    }

    /// Whether the declaration is only installed through an extra.
    pub fn is_optional(&self) -> bool {
        match self {
            DependencySpec::Simple(_) => false,
            DependencySpec::Detailed(d) => d.optional.unwrap_or(false),
            DependencySpec::Multiple(entries) => {
                entries.iter().all(|d| d.optional.unwrap_or(false))
            }
        }
    }

    /// Convert to a Dependency given its declared name and group.
    pub fn to_dependency(&self, name: &str, group: GroupId) -> Result<Dependency, DependencyError> {
        if !is_valid_name(name) {
            return Err(DependencyError::InvalidName(name.to_string()));
        }

        let parse = |expr: &str| {
            VersionConstraint::parse(expr).map_err(|source| DependencyError::InvalidConstraint {
                name: name.to_string(),
                source,
            })
        };
        let parse_python = |expr: &str| {
            VersionConstraint::parse(expr).map_err(|source| DependencyError::InvalidPython {
                name: name.to_string(),
                source,
            })
        };

        let dep = Dependency::new(name, group);

        match self {
            DependencySpec::Simple(version) => Ok(dep.with_constraint(parse(version)?)),

            DependencySpec::Detailed(detail) => {
                let constraint = match detail.version {
                    Some(ref v) => parse(v)?,
                    None => VersionConstraint::any(),
                };
                let python = detail.python.as_deref().map(parse_python).transpose()?;

                Ok(dep
                    .with_constraint(constraint)
                    .with_source(detail.source_kind(name)?)
                    .optional(detail.optional.unwrap_or(false))
                    .with_extras(detail.extras.clone().unwrap_or_default())
                    .with_python(python)
                    .allow_prereleases(detail.allow_prereleases.unwrap_or(false)))
            }

            DependencySpec::Multiple(entries) => {
                let first = entries
                    .first()
                    .ok_or_else(|| DependencyError::EmptyMultiple(name.to_string()))?;

                // Validate every alternative; the dependency accepts their union
                for entry in entries {
                    if let Some(ref v) = entry.version {
                        parse(v)?;
                    }
                    if let Some(ref p) = entry.python {
                        parse_python(p)?;
                    }
                    entry.source_kind(name)?;
                }

                let joined = entries
                    .iter()
                    .map(|d| d.version.as_deref().unwrap_or("*"))
                    .collect::<Vec<_>>()
                    .join(" || ");

                Ok(dep
                    .with_constraint(parse(&joined)?)
                    .with_source(first.source_kind(name)?)
                    .optional(self.is_optional())
                    .with_extras(first.extras.clone().unwrap_or_default())
                    .allow_prereleases(entries.iter().any(|d| d.allow_prereleases == Some(true))))
            }
        }
    }
}

/// A dependency declaration with its constraint parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct Dependency {
    /// Name as declared
    name: String,

    /// PEP 503 normalized name
    normalized: String,

    /// Declaring group
    group: GroupId,

    /// Version constraint
    constraint: VersionConstraint,

    /// Where to find the package
    source: SourceKind,

    /// Whether this is optional
    optional: bool,

    /// Extras to enable
    extras: Vec<String>,

    /// Interpreter restriction
    python: Option<VersionConstraint>,

    /// Whether pre-releases may be selected
    allow_prereleases: bool,
}

impl Dependency {
    /// Create a new dependency that accepts any version from the default index.
    pub fn new(name: impl Into<String>, group: GroupId) -> Self {
        let name = name.into();
        Dependency {
            normalized: normalize_name(&name),
            name,
            group,
            constraint: VersionConstraint::any(),
            source: SourceKind::Registry(None),
            optional: false,
            extras: Vec::new(),
            python: None,
            allow_prereleases: false,
        }
    }

    /// Create a dependency with a version constraint.
    pub fn with_constraint(mut self, constraint: VersionConstraint) -> Self {
        self.constraint = constraint;
        self
    }

    /// Set where the dependency comes from.
    pub fn with_source(mut self, source: SourceKind) -> Self {
        self.source = source;
        self
    }

    /// Set whether this dependency is optional.
    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// Set extras to enable.
    pub fn with_extras(mut self, extras: Vec<String>) -> Self {
        self.extras = extras;
        self
    }

    /// Restrict the dependency to an interpreter range.
    pub fn with_python(mut self, python: Option<VersionConstraint>) -> Self {
        self.python = python;
        self
    }

    /// Set whether pre-releases may be selected.
    pub fn allow_prereleases(mut self, allow: bool) -> Self {
        self.allow_prereleases = allow;
        self
    }

    /// Get the package name as declared.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the normalized package name.
    pub fn normalized_name(&self) -> &str {
        &self.normalized
    }

    /// Get the declaring group.
    pub fn group(&self) -> &GroupId {
        &self.group
    }

    /// Get the version constraint.
    pub fn constraint(&self) -> &VersionConstraint {
        &self.constraint
    }

    /// Get the source.
    pub fn source(&self) -> &SourceKind {
        &self.source
    }

    /// Check if this is an optional dependency.
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Get the extras to enable.
    pub fn extras(&self) -> &[String] {
        &self.extras
    }

    /// Get the interpreter restriction.
    pub fn python(&self) -> Option<&VersionConstraint> {
        self.python.as_ref()
    }

    /// Whether pre-releases may be selected for this dependency.
    pub fn allows_prereleases(&self) -> bool {
        self.allow_prereleases || self.constraint.mentions_prerelease()
    }

    /// Check if a version satisfies this dependency's constraint.
    pub fn accepts(&self, version: &Version) -> bool {
        self.constraint.matches(version)
    }

    /// Check if this is the interpreter pseudo-dependency.
    pub fn is_python(&self) -> bool {
        self.group == GroupId::Main && self.normalized == PYTHON
    }
}
