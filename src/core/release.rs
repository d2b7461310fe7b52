//! `[tool.semantic_release]` configuration and version pointers.
//!
//! Release automation finds the authoritative version through pointers of
//! the form `file:variable`. A `version_variable` pointer names a variable
//! assigned on its own line (`version = "0.2.0"`, `__version__ = '0.2.0'`);
//! a `version_toml` pointer names a dotted key (`pyproject.toml:tool.poetry.version`).

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        let items: &[String] = match self {
            OneOrMany::One(s) => std::slice::from_ref(s),
            OneOrMany::Many(v) => v,
        };
        items.iter()
    }

    pub fn is_empty(&self) -> bool {
        match self {
            OneOrMany::One(_) => false,
            OneOrMany::Many(v) => v.is_empty(),
        }
    }
}

impl Default for OneOrMany {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

/// The `[tool.semantic_release]` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseConfig {
    /// `file:variable` pointers to the version string
    #[serde(default, skip_serializing_if = "OneOrMany::is_empty")]
    pub version_variable: OneOrMany,

    /// `file:dotted.key` pointers into TOML files
    #[serde(default, skip_serializing_if = "OneOrMany::is_empty")]
    pub version_toml: OneOrMany,

    /// Branch releases are cut from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_to_pypi: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_to_release: Option<bool>,

    /// Command producing the distributable artifacts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_command: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, toml::Value>,
}

impl ReleaseConfig {
    /// All configured pointers, `version_variable` entries first.
    pub fn pointers(&self) -> Result<Vec<VersionPointer>, PointerError> {
        let variables = self
            .version_variable
            .iter()
            .map(|p| VersionPointer::parse(p, PointerKind::Variable));
        let tomls = self
            .version_toml
            .iter()
            .map(|p| VersionPointer::parse(p, PointerKind::Toml));
        variables.chain(tomls).collect()
    }
}

/// How a pointer locates the version inside its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    /// `variable = "x"` or `variable: "x"` at the start of a line
    Variable,
    /// Dotted key path in a TOML document
    Toml,
}

/// Error resolving a version pointer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PointerError {
    #[error("malformed version pointer `{0}`, expected `file:variable`")]
    Malformed(String),

    #[error("failed to read `{file}` for version pointer `{pointer}`: {message}")]
    Unreadable {
        pointer: String,
        file: PathBuf,
        message: String,
    },

    #[error("`{file}` is not valid TOML: {message}")]
    InvalidToml { file: PathBuf, message: String },

    #[error("version pointer `{0}` does not match anything")]
    NotFound(String),

    #[error("version pointer `{0}` does not point at a string")]
    NotAString(String),
}

/// One occurrence of the pointed-at version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerMatch {
    /// 1-based line number; 0 when the location is not line based
    pub line: usize,
    pub value: String,
}

/// A `file:variable` pointer to a version string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionPointer {
    file: PathBuf,
    key: String,
    kind: PointerKind,
}

impl VersionPointer {
    /// Parse `file:variable`.
    pub fn parse(pointer: &str, kind: PointerKind) -> Result<Self, PointerError> {
        let (file, key) = pointer
            .trim()
            .rsplit_once(':')
            .ok_or_else(|| PointerError::Malformed(pointer.to_string()))?;

        let (file, key) = (file.trim(), key.trim());
        if file.is_empty() || key.is_empty() {
            return Err(PointerError::Malformed(pointer.to_string()));
        }

        Ok(VersionPointer {
            file: PathBuf::from(file),
            key: key.to_string(),
            kind,
        })
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> PointerKind {
        self.kind
    }

    /// The line pattern for `Variable` pointers; group 2 is the version.
    pub fn pattern(&self) -> Option<Regex> {
        match self.kind {
            PointerKind::Variable => Regex::new(&format!(
                r#"(?m)^([ \t]*{}[ \t]*[:=][ \t]*["'])([^"'\n]*)["']"#,
                regex::escape(&self.key)
            ))
            .ok(),
            PointerKind::Toml => None,
        }
    }

    /// Path of the target file relative to the manifest directory.
    pub fn target(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(&self.file)
    }

    /// Find every occurrence of the pointed-at version.
    ///
    /// `manifest` is `(path, contents)` of the already-loaded manifest; a
    /// pointer into that file reads the in-memory contents.
    pub fn resolve(
        &self,
        base_dir: &Path,
        manifest: (&Path, &str),
    ) -> Result<Vec<PointerMatch>, PointerError> {
        let target = self.target(base_dir);
        let owned;
        let contents = if is_same_file(&target, manifest.0) {
            manifest.1
        } else {
            owned = std::fs::read_to_string(&target).map_err(|e| PointerError::Unreadable {
                pointer: self.to_string(),
                file: target.clone(),
                message: e.to_string(),
            })?;
            owned.as_str()
        };

        let matches = match self.kind {
            PointerKind::Variable => self.find_variable(contents),
            PointerKind::Toml => self.find_toml_key(contents, &target)?,
        };

        if matches.is_empty() {
            return Err(PointerError::NotFound(self.to_string()));
        }
        Ok(matches)
    }

    fn find_variable(&self, contents: &str) -> Vec<PointerMatch> {
        let Some(re) = self.pattern() else {
            return Vec::new();
        };

        re.captures_iter(contents)
            .filter_map(|caps| {
                let value = caps.get(2)?;
                let line = contents[..value.start()].matches('\n').count() + 1;
                Some(PointerMatch {
                    line,
                    value: value.as_str().to_string(),
                })
            })
            .collect()
    }

    fn find_toml_key(&self, contents: &str, file: &Path) -> Result<Vec<PointerMatch>, PointerError> {
        let table: toml::Table = toml::from_str(contents).map_err(|e| PointerError::InvalidToml {
            file: file.to_path_buf(),
            message: e.message().to_string(),
        })?;

        let mut current: Option<&toml::Value> = None;
        for (i, segment) in self.key.split('.').enumerate() {
            current = if i == 0 {
                table.get(segment)
            } else {
                current.and_then(|v| v.get(segment))
            };
        }

        match current {
            None => Ok(Vec::new()),
            Some(toml::Value::String(s)) => Ok(vec![PointerMatch {
                line: 0,
                value: s.clone(),
            }]),
            Some(_) => Err(PointerError::NotAString(self.to_string())),
        }
    }
}

impl fmt::Display for VersionPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.key)
    }
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MANIFEST: &str = r#"[tool.poetry]
name = "phloemfinder"
version = "0.2.0"

[tool.semantic_release]
version_variable = "pyproject.toml:version"
"#;

    #[test]
    fn test_parse_pointer() {
        let p = VersionPointer::parse("pyproject.toml:version", PointerKind::Variable).unwrap();
        assert_eq!(p.file(), Path::new("pyproject.toml"));
        assert_eq!(p.key(), "version");
        assert_eq!(p.to_string(), "pyproject.toml:version");

        assert!(matches!(
            VersionPointer::parse("pyproject.toml", PointerKind::Variable),
            Err(PointerError::Malformed(_))
        ));
        assert!(matches!(
            VersionPointer::parse(":version", PointerKind::Variable),
            Err(PointerError::Malformed(_))
        ));
    }

    #[test]
    fn test_resolve_against_manifest_in_memory() {
        let base = Path::new("/nonexistent/project");
        let manifest_path = base.join("pyproject.toml");
        let p = VersionPointer::parse("pyproject.toml:version", PointerKind::Variable).unwrap();

        let matches = p.resolve(base, (&manifest_path, MANIFEST)).unwrap();
        assert_eq!(
            matches,
            vec![PointerMatch {
                line: 3,
                value: "0.2.0".to_string()
            }]
        );
    }

    #[test]
    fn test_variable_does_not_match_inside_other_names() {
        let p = VersionPointer::parse("x.py:version", PointerKind::Variable).unwrap();
        let found = p.find_variable("python_version = \"3.9\"\nversion: '1.0'\n");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].value, "1.0");
        assert_eq!(found[0].line, 2);
    }

    #[test]
    fn test_resolve_python_module_pointer() {
        let tmp = TempDir::new().unwrap();
        let module = tmp.path().join("src/phloemfinder");
        std::fs::create_dir_all(&module).unwrap();
        std::fs::write(module.join("__init__.py"), "__version__ = '0.2.0'\n").unwrap();

        let p = VersionPointer::parse(
            "src/phloemfinder/__init__.py:__version__",
            PointerKind::Variable,
        )
        .unwrap();
        let manifest_path = tmp.path().join("pyproject.toml");
        let matches = p.resolve(tmp.path(), (&manifest_path, MANIFEST)).unwrap();
        assert_eq!(matches[0].value, "0.2.0");

        let missing = VersionPointer::parse("src/other.py:__version__", PointerKind::Variable)
            .unwrap()
            .resolve(tmp.path(), (&manifest_path, MANIFEST));
        assert!(matches!(missing, Err(PointerError::Unreadable { .. })));
    }

    #[test]
    fn test_resolve_toml_pointer() {
        let base = Path::new("/nonexistent/project");
        let manifest_path = base.join("pyproject.toml");

        let p = VersionPointer::parse("pyproject.toml:tool.poetry.version", PointerKind::Toml)
            .unwrap();
        let matches = p.resolve(base, (&manifest_path, MANIFEST)).unwrap();
        assert_eq!(matches[0].value, "0.2.0");

        let table = VersionPointer::parse("pyproject.toml:tool.poetry", PointerKind::Toml).unwrap();
        assert!(matches!(
            table.resolve(base, (&manifest_path, MANIFEST)),
            Err(PointerError::NotAString(_))
        ));

        let absent = VersionPointer::parse("pyproject.toml:tool.nope.version", PointerKind::Toml)
            .unwrap();
        assert!(matches!(
            absent.resolve(base, (&manifest_path, MANIFEST)),
            Err(PointerError::NotFound(_))
        ));
    }

    #[test]
    fn test_release_config_pointers() {
        let config: ReleaseConfig = toml::from_str(
            r#"
version_variable = ["pyproject.toml:version", "src/phloemfinder/__init__.py:__version__"]
version_toml = "pyproject.toml:tool.poetry.version"
branch = "main"
"#,
        )
        .unwrap();
        let pointers = config.pointers().unwrap();
        assert_eq!(pointers.len(), 3);
        assert_eq!(pointers[2].kind(), PointerKind::Toml);
    }
}
