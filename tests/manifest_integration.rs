//! Integration tests for the manifest workflow.
//!
//! These tests drive the public API against a project laid out on disk,
//! from loading through validation, resolution, edits and version bumps.

use std::fs;
use std::path::PathBuf;

use phloem_manifest::core::release::PointerKind;
use phloem_manifest::ops::{
    add_dependency, bump_version, remove_dependency, validate_path, AddOptions, BumpOptions,
    RemoveOptions,
};
use phloem_manifest::resolver::{check_candidate, parse_version, BumpLevel, ResolveError};
use phloem_manifest::{resolve, CandidateIndex, GroupId, Manifest, ResolveOptions, ValidateOptions};
use tempfile::TempDir;

const MANIFEST: &str = r#"[tool.poetry]
name = "phloemfinder"
version = "0.2.0"
description = "Finding plant metabolite correlates of pest resistance"
authors = ["Marc Galland <m.galland@uva.nl>"]
license = "Apache-2.0"
readme = "README.md"

[tool.poetry.dependencies]
python = "^3.9"
pandas = "^1.4.1"
matplotlib = "^3.5.1"
scikit-learn = ">=1.5.1"
tpot = "^0.11.7"

[tool.poetry.dev-dependencies]
sphinx = "^4.4.0"
python-semantic-release = "^7.25.2"

[tool.semantic_release]
version_variable = ["pyproject.toml:version", "src/phloemfinder/__init__.py:__version__"]

[build-system]
requires = ["poetry-core>=1.0.0"]
build-backend = "poetry.core.masonry.api"
"#;

/// Lay out the project with the given module version.
fn project(module_version: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let manifest_path = tmp.path().join("pyproject.toml");
    fs::write(&manifest_path, MANIFEST).unwrap();

    let module = tmp.path().join("src/phloemfinder");
    fs::create_dir_all(&module).unwrap();
    fs::write(
        module.join("__init__.py"),
        format!("__version__ = \"{}\"\n", module_version),
    )
    .unwrap();

    (tmp, manifest_path)
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn test_load_identity_and_pointers() {
    let (_tmp, manifest_path) = project("0.2.0");
    let manifest = Manifest::load(&manifest_path).unwrap();

    assert_eq!(manifest.name(), "phloemfinder");
    assert_eq!(manifest.package.version, "0.2.0");
    assert_eq!(manifest.python_constraint(), Some("^3.9"));

    let pointers = manifest.release.as_ref().unwrap().pointers().unwrap();
    assert_eq!(pointers.len(), 2);
    assert_eq!(pointers[0].to_string(), "pyproject.toml:version");
    assert_eq!(pointers[1].kind(), PointerKind::Variable);
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_consistent_project_validates() {
    let (_tmp, manifest_path) = project("0.2.0");
    let report = validate_path(&manifest_path, &ValidateOptions::default()).unwrap();

    assert!(report.passed, "{:#?}", report.errors());
}

#[test]
fn test_drifted_module_version_fails_validation() {
    let (_tmp, manifest_path) = project("0.1.0");
    let report = validate_path(&manifest_path, &ValidateOptions::default()).unwrap();

    assert!(!report.passed);
    let errors = report.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, "release");
    assert!(errors[0].1.message.contains("resolves to `0.1.0`, expected `0.2.0`"));
}

// ============================================================================
// Resolution
// ============================================================================

#[test]
fn test_lower_bound_rejects_older_release() {
    let (_tmp, manifest_path) = project("0.2.0");
    let manifest = Manifest::load(&manifest_path).unwrap();
    let deps = manifest.dependency_list(&[GroupId::Main]).unwrap();
    let sklearn = deps.iter().find(|d| d.name() == "scikit-learn").unwrap();

    let err = check_candidate(sklearn, &parse_version("1.4.9").unwrap()).unwrap_err();
    assert!(matches!(err, ResolveError::CandidateRejected { .. }));
    assert_eq!(
        err.to_string(),
        "`scikit-learn` 1.4.9 does not satisfy `>=1.5.1`"
    );

    assert!(check_candidate(sklearn, &parse_version("1.5.1").unwrap()).is_ok());
}

#[test]
fn test_resolve_main_group() {
    let (_tmp, manifest_path) = project("0.2.0");
    let manifest = Manifest::load(&manifest_path).unwrap();

    let mut index = CandidateIndex::new();
    index
        .add_versions("pandas", &["1.3.5", "1.4.1", "1.5.3", "2.0.0"])
        .unwrap()
        .add_versions("matplotlib", &["3.5.1", "3.6.0"])
        .unwrap()
        .add_versions("scikit-learn", &["1.4.9", "1.5.1", "1.5.2"])
        .unwrap()
        .add_versions("tpot", &["0.11.7", "0.12.0"])
        .unwrap();

    let opts = ResolveOptions {
        groups: vec![GroupId::Main],
        ..Default::default()
    };
    let resolution = resolve(&manifest, &index, &opts).unwrap();

    assert_eq!(resolution.len(), 4);
    assert_eq!(resolution.get("pandas").unwrap().to_string(), "1.5.3");
    assert_eq!(resolution.get("Scikit_Learn").unwrap().to_string(), "1.5.2");
    assert_eq!(resolution.get("tpot").unwrap().to_string(), "0.11.7");
}

// ============================================================================
// Editing
// ============================================================================

#[test]
fn test_bump_keeps_pointers_in_step() {
    let (tmp, manifest_path) = project("0.2.0");

    let result = bump_version(&manifest_path, &BumpOptions::level(BumpLevel::Minor)).unwrap();
    assert_eq!(result.previous, "0.2.0");
    assert_eq!(result.new, "0.3.0");

    let module = fs::read_to_string(tmp.path().join("src/phloemfinder/__init__.py")).unwrap();
    assert_eq!(module, "__version__ = \"0.3.0\"\n");

    let report = validate_path(&manifest_path, &ValidateOptions::default()).unwrap();
    assert!(report.passed, "{:#?}", report.errors());
}

#[test]
fn test_add_and_remove_dependency() {
    let (_tmp, manifest_path) = project("0.2.0");

    add_dependency(
        &manifest_path,
        &AddOptions::new("seaborn", "^0.11.2", GroupId::Main),
    )
    .unwrap();
    let manifest = Manifest::load(&manifest_path).unwrap();
    assert!(manifest.dependencies.contains_key("seaborn"));

    remove_dependency(
        &manifest_path,
        &RemoveOptions {
            name: "Seaborn".to_string(),
            group: GroupId::Main,
        },
    )
    .unwrap();
    let after = Manifest::load(&manifest_path).unwrap();
    assert!(!after.dependencies.contains_key("seaborn"));
    assert_eq!(after, Manifest::parse(MANIFEST, &manifest_path).unwrap());
}

#[test]
fn test_invalid_edit_keeps_file() {
    let (_tmp, manifest_path) = project("0.2.0");

    let err = add_dependency(
        &manifest_path,
        &AddOptions::new("pandas", ">=banana", GroupId::Main),
    )
    .unwrap_err();
    assert!(format!("{:#}", err).contains("invalid version constraint"));
    assert_eq!(fs::read_to_string(&manifest_path).unwrap(), MANIFEST);
}
