//! Test fixtures for common test scenarios.
//!
//! This module provides pre-built manifests and project layouts used across
//! the unit tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The phloemfinder manifest: version 0.2.0 with a pointer back into itself.
pub const PHLOEMFINDER_MANIFEST: &str = r#"[tool.poetry]
name = "phloemfinder"
version = "0.2.0"
description = "Finding plant metabolite correlates of pest resistance"
authors = ["Marc Galland <m.galland@uva.nl>", "Lissy-Anne Denkers <l.denkers@uva.nl>"]
license = "Apache-2.0"
readme = "README.md"
packages = [{ include = "phloemfinder", from = "src" }]

[tool.poetry.dependencies]
python = "^3.9"
pandas = "^1.4.1"
matplotlib = "^3.5.1"
scikit-learn = ">=1.5.1"
tpot = "^0.11.7"

[tool.poetry.dev-dependencies]
myst-nb = "^0.13.2"
sphinx = "^4.4.0"
sphinx-autoapi = "^1.8.4"
sphinx-rtd-theme = "^1.0.0"
python-semantic-release = "^7.25.2"

[tool.sphinx]
project = "phloemfinder"
html_theme = "sphinx_rtd_theme"

[tool.semantic_release]
version_variable = "pyproject.toml:version"

[build-system]
requires = ["poetry-core>=1.0.0"]
build-backend = "poetry.core.masonry.api"
"#;

/// Fixture for a project directory with a manifest and extra files.
#[derive(Debug, Clone)]
pub struct ProjectFixture {
    /// Project name.
    pub name: String,
    /// pyproject.toml content.
    pub manifest: String,
    /// Other files (path relative to project root -> content).
    pub files: BTreeMap<PathBuf, String>,
}

impl ProjectFixture {
    /// Create a project with the given manifest.
    pub fn new(name: impl Into<String>, manifest: impl Into<String>) -> Self {
        ProjectFixture {
            name: name.into(),
            manifest: manifest.into(),
            files: BTreeMap::new(),
        }
    }

    /// The phloemfinder project, version only in pyproject.toml.
    pub fn phloemfinder() -> Self {
        ProjectFixture::new("phloemfinder", PHLOEMFINDER_MANIFEST)
    }

    /// The phloemfinder project with a second pointer into the package module.
    pub fn phloemfinder_with_module_version(module_version: &str) -> Self {
        let manifest = PHLOEMFINDER_MANIFEST.replace(
            r#"version_variable = "pyproject.toml:version""#,
            r#"version_variable = ["pyproject.toml:version", "src/phloemfinder/__init__.py:__version__"]"#,
        );
        ProjectFixture::new("phloemfinder", manifest).with_file(
            "src/phloemfinder/__init__.py",
            format!("__version__ = \"{}\"\n", module_version),
        )
    }

    /// Replace the manifest's identity version.
    pub fn with_version(mut self, version: &str) -> Self {
        self.manifest = self
            .manifest
            .replacen(r#"version = "0.2.0""#, &format!(r#"version = "{}""#, version), 1);
        self
    }

    /// Add a file.
    pub fn with_file(mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }

    /// Write the fixture under `root`, returning the manifest path.
    pub fn write_to(&self, root: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(root)?;
        let manifest_path = root.join("pyproject.toml");
        std::fs::write(&manifest_path, &self.manifest)?;

        for (path, content) in &self.files {
            let full = root.join(path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(full, content)?;
        }

        Ok(manifest_path)
    }
}

/// A manifest with the given `[tool.poetry.dependencies]` lines.
pub fn manifest_with_deps(name: &str, deps: &[(&str, &str)]) -> String {
    let mut manifest = format!(
        r#"[tool.poetry]
name = "{name}"
version = "0.1.0"
authors = ["Test Author"]

[tool.poetry.dependencies]
"#
    );

    for (dep_name, spec) in deps {
        manifest.push_str(&format!("{} = {}\n", dep_name, spec));
    }

    manifest.push_str(
        r#"
[tool.semantic_release]
version_variable = "pyproject.toml:version"

[build-system]
requires = ["poetry-core>=1.0.0"]
build-backend = "poetry.core.masonry.api"
"#,
    );

    manifest
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fixture_writes_files() {
        let tmp = TempDir::new().unwrap();
        let fixture = ProjectFixture::phloemfinder_with_module_version("0.2.0");
        let manifest_path = fixture.write_to(tmp.path()).unwrap();

        assert!(manifest_path.exists());
        let init = std::fs::read_to_string(tmp.path().join("src/phloemfinder/__init__.py")).unwrap();
        assert_eq!(init, "__version__ = \"0.2.0\"\n");
    }

    #[test]
    fn test_with_version_touches_identity_only() {
        let fixture = ProjectFixture::phloemfinder().with_version("0.3.0");
        assert!(fixture.manifest.contains(r#"version = "0.3.0""#));
        assert!(!fixture.manifest.contains(r#"version = "0.2.0""#));
    }
}
