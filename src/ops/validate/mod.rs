//! Manifest validation.
//!
//! Checks every invariant a maintainer can break by editing pyproject.toml
//! and collects the findings into a [`ValidationReport`].
//!
//! ## Validation Steps
//!
//! 1. `identity`: name, authors and project URLs
//! 2. `version`: the identity version parses
//! 3. `constraints`: every dependency constraint parses and can be met
//! 4. `duplicates`: no package is declared twice within a group
//! 5. `satisfiability`: constraints for one package intersect across groups
//! 6. `build-system`: a backend is declared and its provider is required
//! 7. `release`: every release pointer resolves to the identity version
//! 8. `round-trip`: serializing and re-parsing preserves the manifest

mod checks;
mod types;

use std::path::Path;
use std::time::Instant;

use anyhow::Result;

use crate::core::Manifest;
use crate::util::diagnostic::Diagnostic;

pub use self::types::{steps, ValidateOptions, ValidationReport, ValidationStep};

use self::checks::{
    check_build_system, check_constraints, check_duplicates, check_identity, check_release,
    check_round_trip, check_satisfiability, check_version,
};

/// Validate a parsed manifest.
pub fn validate(manifest: &Manifest, opts: &ValidateOptions) -> ValidationReport {
    let start = Instant::now();
    let mut report = ValidationReport::new(
        manifest.name(),
        &manifest.package.version,
        &manifest.manifest_path,
    );

    run_step(&mut report, steps::IDENTITY, || check_identity(manifest));
    run_step(&mut report, steps::VERSION, || check_version(manifest));
    run_step(&mut report, steps::CONSTRAINTS, || check_constraints(manifest, opts));
    run_step(&mut report, steps::DUPLICATES, || check_duplicates(manifest, opts));
    run_step(&mut report, steps::SATISFIABILITY, || {
        check_satisfiability(manifest, opts)
    });
    run_step(&mut report, steps::BUILD_SYSTEM, || check_build_system(manifest, opts));
    run_step(&mut report, steps::RELEASE, || check_release(manifest, opts));
    run_step(&mut report, steps::ROUND_TRIP, || check_round_trip(manifest));

    report.total_duration = start.elapsed();

    if report.passed {
        tracing::info!(
            "{} {} is valid ({} warnings)",
            report.package,
            report.version,
            report.warnings().len()
        );
    } else {
        tracing::warn!(
            "{} {} failed {} of {} checks",
            report.package,
            report.version,
            report.failed_count(),
            report.steps.len()
        );
    }

    report
}

fn run_step(
    report: &mut ValidationReport,
    name: &str,
    check: impl FnOnce() -> Vec<Diagnostic>,
) {
    let start = Instant::now();
    let step = ValidationStep::new(name, check(), start.elapsed());
    tracing::debug!("{}: {}", step.name, step.message);
    report.add_step(step);
}

/// Load and validate a manifest.
///
/// Syntax errors are returned as errors; everything else is a finding.
pub fn validate_path(manifest_path: &Path, opts: &ValidateOptions) -> Result<ValidationReport> {
    let manifest = Manifest::load(manifest_path)?;
    Ok(validate(&manifest, opts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{create_test_project, ProjectFixture, PHLOEMFINDER_MANIFEST};
    use std::path::PathBuf;

    fn parse(content: &str) -> Manifest {
        Manifest::parse(content, Path::new("/nonexistent/phloemfinder/pyproject.toml")).unwrap()
    }

    fn step<'a>(report: &'a ValidationReport, name: &str) -> &'a ValidationStep {
        report.step(name).unwrap()
    }

    #[test]
    fn test_phloemfinder_is_valid() {
        let report = validate(&parse(PHLOEMFINDER_MANIFEST), &ValidateOptions::default());

        assert!(report.passed, "{:#?}", report.errors());
        assert_eq!(report.steps.len(), 8);
        assert_eq!(report.version, "0.2.0");
        assert!(report.warnings().is_empty());
    }

    #[test]
    fn test_pointer_confirms_identity_version() {
        let report = validate(&parse(PHLOEMFINDER_MANIFEST), &ValidateOptions::default());
        let release = step(&report, steps::RELEASE);
        assert!(release.passed);
        assert!(release.findings.is_empty());
    }

    #[test]
    fn test_version_drift_in_module_is_an_error() {
        let (tmp, manifest_path) =
            create_test_project(&ProjectFixture::phloemfinder_with_module_version("0.1.0"));

        let report = validate_path(&manifest_path, &ValidateOptions::default()).unwrap();
        let release = step(&report, steps::RELEASE);
        assert!(!release.passed);

        let err = release.errors().next().unwrap();
        assert!(err
            .message
            .contains("`src/phloemfinder/__init__.py:__version__` resolves to `0.1.0`, expected `0.2.0`"));
        assert_eq!(
            err.location,
            Some(tmp.path().join("src/phloemfinder/__init__.py"))
        );
        assert_eq!(err.line, Some(1));
    }

    #[test]
    fn test_matching_module_version_passes() {
        let (_tmp, manifest_path) =
            create_test_project(&ProjectFixture::phloemfinder_with_module_version("0.2.0"));

        let report = validate_path(&manifest_path, &ValidateOptions::default()).unwrap();
        assert!(report.passed, "{:#?}", report.errors());
    }

    #[test]
    fn test_missing_pointer_target() {
        let content = PHLOEMFINDER_MANIFEST.replace(
            "pyproject.toml:version",
            "src/phloemfinder/__init__.py:__version__",
        );
        let report = validate(&parse(&content), &ValidateOptions::default());
        let release = step(&report, steps::RELEASE);
        assert!(!release.passed);
        assert_eq!(
            release.findings[0].location,
            Some(PathBuf::from(
                "/nonexistent/phloemfinder/src/phloemfinder/__init__.py"
            ))
        );
    }

    #[test]
    fn test_invalid_constraint_is_reported() {
        let content = PHLOEMFINDER_MANIFEST.replace(r#"pandas = "^1.4.1""#, r#"pandas = ">=one""#);
        let report = validate(&parse(&content), &ValidateOptions::default());
        let constraints = step(&report, steps::CONSTRAINTS);
        assert!(!constraints.passed);
        assert!(constraints.findings[0].message.contains("`pandas`"));
        assert!(constraints.findings[0]
            .context
            .iter()
            .any(|c| c.contains("main dependencies")));
    }

    #[test]
    fn test_out_of_range_bound_is_reported() {
        let content = PHLOEMFINDER_MANIFEST
            .replace(r#"tpot = "^0.11.7""#, r#"tpot = "^18446744073709551615""#);
        let report = validate(&parse(&content), &ValidateOptions::default());
        let constraints = step(&report, steps::CONSTRAINTS);
        assert!(!constraints.passed);
        assert!(constraints.findings[0].message.contains("`tpot`"));
    }

    #[test]
    fn test_unsatisfiable_constraint_is_reported() {
        let content = PHLOEMFINDER_MANIFEST.replace(r#"tpot = "^0.11.7""#, r#"tpot = ">1.0,<0.5""#);
        let report = validate(&parse(&content), &ValidateOptions::default());
        assert!(!step(&report, steps::CONSTRAINTS).passed);
    }

    #[test]
    fn test_duplicate_spellings_are_reported() {
        let content = PHLOEMFINDER_MANIFEST.replace(
            r#"tpot = "^0.11.7""#,
            "tpot = \"^0.11.7\"\nscikit_learn = \"^1.5\"",
        );
        let report = validate(&parse(&content), &ValidateOptions::default());
        let duplicates = step(&report, steps::DUPLICATES);
        assert!(!duplicates.passed);
        assert!(duplicates.findings[0].message.contains("`scikit-learn` is declared 2 times"));
    }

    #[test]
    fn test_cross_group_conflict_is_reported() {
        let content = PHLOEMFINDER_MANIFEST.replace(
            r#"sphinx = "^4.4.0""#,
            "sphinx = \"^4.4.0\"\npandas = \">=2.0\"",
        );
        let report = validate(&parse(&content), &ValidateOptions::default());
        let sat = step(&report, steps::SATISFIABILITY);
        assert!(!sat.passed);
        assert!(sat.findings[0].message.contains("version conflict for `pandas`"));

        // Checking only the main group hides the conflict
        let opts = ValidateOptions {
            groups: vec![crate::core::dependency::GroupId::Main],
            ..Default::default()
        };
        assert!(step(&validate(&parse(&content), &opts), steps::SATISFIABILITY).passed);
    }

    #[test]
    fn test_build_system_checks() {
        let without = PHLOEMFINDER_MANIFEST
            .split("[build-system]")
            .next()
            .unwrap()
            .to_string();
        let report = validate(&parse(&without), &ValidateOptions::default());
        assert!(!step(&report, steps::BUILD_SYSTEM).passed);

        let lenient = ValidateOptions {
            require_build_system: false,
            ..Default::default()
        };
        let report = validate(&parse(&without), &lenient);
        let build = step(&report, steps::BUILD_SYSTEM);
        assert!(build.passed);
        assert_eq!(build.warnings().count(), 1);

        let wrong_provider =
            PHLOEMFINDER_MANIFEST.replace(r#"requires = ["poetry-core>=1.0.0"]"#, r#"requires = ["setuptools>=61"]"#);
        let report = validate(&parse(&wrong_provider), &ValidateOptions::default());
        let build = step(&report, steps::BUILD_SYSTEM);
        assert!(!build.passed);
        assert!(build.findings[0].message.contains("`poetry-core`"));
    }

    #[test]
    fn test_extras_must_name_optional_dependencies() {
        let content = format!(
            "{}\n[tool.poetry.extras]\nparallel = [\"dask\"]\nplots = [\"matplotlib\"]\n",
            PHLOEMFINDER_MANIFEST
        );
        let report = validate(&parse(&content), &ValidateOptions::default());
        let sat = step(&report, steps::SATISFIABILITY);
        assert_eq!(sat.errors().count(), 1);
        assert_eq!(sat.warnings().count(), 1);
    }

    #[test]
    fn test_identity_checks() {
        let content = PHLOEMFINDER_MANIFEST
            .replace(
                r#"authors = ["Marc Galland <m.galland@uva.nl>", "Lissy-Anne Denkers <l.denkers@uva.nl>"]"#,
                "authors = []\nhomepage = \"not a url\"",
            );
        let report = validate(&parse(&content), &ValidateOptions::default());
        let identity = step(&report, steps::IDENTITY);
        assert_eq!(identity.errors().count(), 2);
    }

    #[test]
    fn test_invalid_identity_version() {
        let content = PHLOEMFINDER_MANIFEST.replace(r#"version = "0.2.0""#, r#"version = "zero""#);
        let report = validate(&parse(&content), &ValidateOptions::default());
        assert!(!step(&report, steps::VERSION).passed);
        // The pointer still finds `zero`, so the release check agrees
        assert!(step(&report, steps::RELEASE).passed);
    }

    #[test]
    fn test_round_trip_step_passes() {
        let report = validate(&parse(PHLOEMFINDER_MANIFEST), &ValidateOptions::default());
        assert!(step(&report, steps::ROUND_TRIP).passed);
    }

    #[test]
    fn test_validate_path_surfaces_syntax_errors() {
        let (tmp, _) = create_test_project(&ProjectFixture::new(
            "broken",
            "[tool.poetry\nname = \"x\"\n",
        ));
        let err = validate_path(&tmp.path().join("pyproject.toml"), &ValidateOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
    }
}
