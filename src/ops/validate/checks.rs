//! Individual manifest checks.
//!
//! Each check returns its findings; none of them fail early.

use std::collections::BTreeMap;
use std::error::Error as StdError;

use pubgrub::Range;
use semver::Version;
use url::Url;

use crate::core::dependency::{is_valid_name, normalize_name, Dependency, DependencyError};
use crate::core::Manifest;
use crate::ops::fingerprint::{fingerprint_str, source_fingerprint};
use crate::resolver::constraint::is_empty_range;
use crate::resolver::errors::ResolveError;
use crate::resolver::version::parse_version;
use crate::resolver::VersionConstraint;
use crate::util::diagnostic::{suggestions, Diagnostic};

use super::types::ValidateOptions;

/// Name, authors and URLs.
pub(super) fn check_identity(manifest: &Manifest) -> Vec<Diagnostic> {
    let mut findings = Vec::new();
    let package = &manifest.package;

    if package.name.trim().is_empty() {
        findings.push(
            Diagnostic::error("package name is empty")
                .with_location(&manifest.manifest_path)
                .with_suggestion("Set `name` in [tool.poetry]"),
        );
    } else if !is_valid_name(&package.name) {
        findings.push(
            Diagnostic::error(format!(
                "`{}` is not a valid distribution name",
                package.name
            ))
            .with_location(&manifest.manifest_path)
            .with_suggestion(format!(
                "Use letters, digits and `-_.` only, e.g. `{}`",
                normalize_name(&package.name)
            )),
        );
    }

    if package.authors.is_empty() {
        findings.push(
            Diagnostic::error("no authors declared")
                .with_location(&manifest.manifest_path)
                .with_suggestion("Add `authors = [\"Name <email>\"]` to [tool.poetry]"),
        );
    }

    if package.description.is_none() {
        findings.push(
            Diagnostic::warning("no description declared").with_location(&manifest.manifest_path),
        );
    }

    let urls = [
        ("homepage", &package.homepage),
        ("repository", &package.repository),
        ("documentation", &package.documentation),
    ];
    for (key, url) in urls {
        if let Some(url) = url {
            if let Err(e) = Url::parse(url) {
                findings.push(
                    Diagnostic::error(format!("`{}` is not a valid URL: `{}`", key, url))
                        .with_context(e.to_string())
                        .with_location(&manifest.manifest_path),
                );
            }
        }
    }

    findings
}

/// The identity version parses.
pub(super) fn check_version(manifest: &Manifest) -> Vec<Diagnostic> {
    let raw = &manifest.package.version;
    match parse_version(raw) {
        Ok(version) => {
            tracing::debug!("identity version {} parses as {}", raw, version);
            if raw.starts_with(['v', 'V']) || raw.trim() != raw {
                vec![Diagnostic::warning(format!(
                    "version `{}` is not in normalized form",
                    raw
                ))
                .with_location(&manifest.manifest_path)
                .with_suggestion(format!("Write it as `{}`", raw.trim().trim_start_matches(['v', 'V'])))]
            } else {
                Vec::new()
            }
        }
        Err(e) => vec![Diagnostic::error(format!("invalid version `{}`", raw))
            .with_context(e.to_string())
            .with_location(&manifest.manifest_path)
            .with_suggestion("Use a release such as `0.2.0`, `1.0.0rc1` or `1.0.0.post1`")],
    }
}

/// Every constraint of every selected group parses and can be met.
pub(super) fn check_constraints(manifest: &Manifest, opts: &ValidateOptions) -> Vec<Diagnostic> {
    let mut findings = Vec::new();

    for (group, table) in manifest.declared_groups() {
        if !opts.includes(&group) {
            continue;
        }
        for (name, spec) in table {
            match spec.to_dependency(name, group.clone()) {
                Ok(dep) => {
                    if !dep.constraint().is_satisfiable() {
                        findings.push(
                            Diagnostic::error(format!(
                                "constraint `{}` for `{}` can never be satisfied",
                                dep.constraint(),
                                name
                            ))
                            .with_context(format!("declared in {} dependencies", group))
                            .with_location(&manifest.manifest_path),
                        );
                    }
                }
                Err(e) => {
                    let mut diag = Diagnostic::error(e.to_string())
                        .with_context(format!("declared in {} dependencies", group))
                        .with_location(&manifest.manifest_path);
                    let mut cause = e.source();
                    while let Some(inner) = cause {
                        diag = diag.with_context(inner.to_string());
                        cause = inner.source();
                    }
                    if matches!(
                        e,
                        DependencyError::InvalidConstraint { .. }
                            | DependencyError::InvalidPython { .. }
                    ) {
                        diag = diag.with_suggestion(suggestions::INVALID_CONSTRAINT);
                    }
                    findings.push(diag);
                }
            }
        }
    }

    findings
}

/// No package is declared twice in one group under different spellings.
pub(super) fn check_duplicates(manifest: &Manifest, opts: &ValidateOptions) -> Vec<Diagnostic> {
    let mut findings = Vec::new();

    for (group, table) in manifest.declared_groups() {
        if !opts.includes(&group) {
            continue;
        }
        let mut by_name: BTreeMap<String, Vec<&str>> = BTreeMap::new();
        for name in table.keys() {
            by_name.entry(normalize_name(name)).or_default().push(name);
        }
        for (normalized, spellings) in by_name {
            if spellings.len() > 1 {
                findings.push(
                    Diagnostic::error(format!(
                        "`{}` is declared {} times in {} dependencies",
                        normalized,
                        spellings.len(),
                        group
                    ))
                    .with_context(format!("spelled {}", quoted(&spellings)))
                    .with_location(&manifest.manifest_path)
                    .with_suggestion(format!("Keep a single `{}` entry", normalized)),
                );
            }
        }
    }

    findings
}

/// Constraints across groups intersect; extras name optional dependencies.
pub(super) fn check_satisfiability(manifest: &Manifest, opts: &ValidateOptions) -> Vec<Diagnostic> {
    let mut findings = Vec::new();

    let deps: Vec<Dependency> = manifest
        .declared_groups()
        .into_iter()
        .filter(|(group, _)| opts.includes(group))
        .flat_map(|(group, table)| {
            table
                .iter()
                .filter_map(move |(name, spec)| spec.to_dependency(name, group.clone()).ok())
        })
        .collect();

    let mut by_package: BTreeMap<&str, Vec<&Dependency>> = BTreeMap::new();
    for dep in deps.iter().filter(|d| !d.is_python()) {
        by_package.entry(dep.normalized_name()).or_default().push(dep);
    }

    for (package, declared) in &by_package {
        if declared.len() < 2 {
            continue;
        }
        let combined = declared.iter().fold(Range::full(), |acc: Range<Version>, d| {
            acc.intersection(d.constraint().range())
        });
        if is_empty_range(&combined) {
            let conflict = ResolveError::VersionConflict {
                package: (*package).to_string(),
                requirements: declared
                    .iter()
                    .map(|d| (d.group().to_string(), d.constraint().to_string()))
                    .collect(),
            };
            findings.push(
                conflict
                    .to_diagnostic()
                    .with_location(&manifest.manifest_path),
            );
        }
    }

    let project_python = manifest
        .python_constraint()
        .and_then(|p| VersionConstraint::parse(p).ok());
    if let Some(ref project_python) = project_python {
        for dep in &deps {
            if let Some(python) = dep.python() {
                if is_empty_range(&python.intersect(project_python)) {
                    findings.push(
                        Diagnostic::warning(format!(
                            "`{}` is restricted to python `{}`, which the project never supports",
                            dep.name(),
                            python
                        ))
                        .with_context(format!("project requires python `{}`", project_python))
                        .with_location(&manifest.manifest_path),
                    );
                }
            }
        }
    }

    for (extra, names) in &manifest.extras {
        for name in names {
            let normalized = normalize_name(name);
            let found = manifest
                .dependencies
                .iter()
                .find(|(declared, _)| normalize_name(declared) == normalized);
            match found {
                None => findings.push(
                    Diagnostic::error(format!(
                        "extra `{}` names `{}`, which is not a main dependency",
                        extra, name
                    ))
                    .with_location(&manifest.manifest_path)
                    .with_suggestion(format!(
                        "Declare `{}` in [tool.poetry.dependencies] with optional = true",
                        name
                    )),
                ),
                Some((_, spec)) if !spec.is_optional() => findings.push(
                    Diagnostic::warning(format!(
                        "extra `{}` names `{}`, which is always installed",
                        extra, name
                    ))
                    .with_location(&manifest.manifest_path)
                    .with_suggestion(format!("Mark `{}` as optional = true", name)),
                ),
                Some(_) => {}
            }
        }
    }

    findings
}

/// [build-system] names a backend and requires its provider.
pub(super) fn check_build_system(manifest: &Manifest, opts: &ValidateOptions) -> Vec<Diagnostic> {
    let Some(ref build) = manifest.build_system else {
        let diag = if opts.require_build_system {
            Diagnostic::error("no [build-system] table")
        } else {
            Diagnostic::warning("no [build-system] table")
        };
        return vec![diag
            .with_location(&manifest.manifest_path)
            .with_suggestion(suggestions::NO_BUILD_SYSTEM)];
    };

    let mut findings = Vec::new();

    if build.requires.is_empty() {
        findings.push(
            Diagnostic::error("build-system.requires is empty")
                .with_location(&manifest.manifest_path)
                .with_suggestion(suggestions::NO_BUILD_SYSTEM),
        );
    }

    for requirement in &build.requires {
        if let Err(e) = crate::core::build_system::Requirement::parse(requirement) {
            let mut diag = Diagnostic::error(e.to_string()).with_location(&manifest.manifest_path);
            if let Some(source) = e.source() {
                diag = diag.with_context(source.to_string());
            }
            findings.push(diag);
        }
    }

    match build.build_backend.as_deref().map(str::trim) {
        None => findings.push(
            Diagnostic::warning("no build-backend declared")
                .with_context("installers fall back to the legacy setuptools backend")
                .with_location(&manifest.manifest_path),
        ),
        Some("") => findings.push(
            Diagnostic::error("build-backend is empty").with_location(&manifest.manifest_path),
        ),
        Some(backend) => match build.backend_provider() {
            Some(provider) if build.requirement_for(provider).is_none() => findings.push(
                Diagnostic::error(format!(
                    "build backend `{}` is provided by `{}`, which is not in build-system.requires",
                    backend, provider
                ))
                .with_location(&manifest.manifest_path)
                .with_suggestion(format!("Add `{}` to build-system.requires", provider)),
            ),
            Some(provider) => {
                tracing::debug!("build backend {} provided by {}", backend, provider);
            }
            None if build.backend_path.is_empty() => findings.push(
                Diagnostic::note(format!("build backend `{}` is not a known backend", backend))
                    .with_location(&manifest.manifest_path),
            ),
            None => {}
        },
    }

    findings
}

/// Every release pointer resolves to the identity version.
pub(super) fn check_release(manifest: &Manifest, opts: &ValidateOptions) -> Vec<Diagnostic> {
    let Some(ref release) = manifest.release else {
        return vec![Diagnostic::note(
            "no [tool.semantic_release] table, the version has no release pointer",
        )
        .with_location(&manifest.manifest_path)];
    };

    let pointers = match release.pointers() {
        Ok(pointers) => pointers,
        Err(e) => {
            return vec![Diagnostic::error(e.to_string())
                .with_location(&manifest.manifest_path)
                .with_suggestion("Write pointers as `file:variable`, e.g. `pyproject.toml:version`")]
        }
    };

    if pointers.is_empty() {
        return vec![Diagnostic::warning(
            "[tool.semantic_release] declares no version_variable or version_toml",
        )
        .with_location(&manifest.manifest_path)
        .with_suggestion("Add `version_variable = \"pyproject.toml:version\"`")];
    }

    let expected = &manifest.package.version;
    let base_dir = manifest.manifest_dir();
    let mut findings = Vec::new();

    for pointer in &pointers {
        let target = pointer.target(base_dir);
        let matches = match pointer.resolve(base_dir, (&manifest.manifest_path, manifest.source())) {
            Ok(matches) => matches,
            Err(e) => {
                findings.push(
                    Diagnostic::error(e.to_string())
                        .with_location(&target)
                        .with_suggestion(format!(
                            "Make `{}` assign the version, e.g. `{} = \"{}\"`",
                            pointer.file().display(),
                            pointer.key(),
                            expected
                        )),
                );
                continue;
            }
        };

        let first = &matches[0];
        tracing::debug!("{} resolves to {}", pointer, first.value);

        if &first.value != expected {
            findings.push(
                Diagnostic::error(format!(
                    "version pointer `{}` resolves to `{}`, expected `{}`",
                    pointer, first.value, expected
                ))
                .with_location(&target)
                .with_line(first.line)
                .with_suggestion(suggestions::VERSION_DRIFT),
            );
        }

        for extra in matches[1..].iter().filter(|m| &m.value != expected) {
            let message = format!(
                "`{}` is assigned again with `{}`",
                pointer.key(),
                extra.value
            );
            let diag = if opts.strict_pointers {
                Diagnostic::error(message)
            } else {
                Diagnostic::warning(message)
            };
            findings.push(
                diag.with_context(format!(
                    "release automation rewrites every assignment matched by `{}`",
                    pointer
                ))
                .with_location(&target)
                .with_line(extra.line),
            );
        }
    }

    findings
}

/// Serializing and re-parsing preserves the manifest.
pub(super) fn check_round_trip(manifest: &Manifest) -> Vec<Diagnostic> {
    let serialized = match manifest.to_toml_string() {
        Ok(s) => s,
        Err(e) => return vec![Diagnostic::error(format!("{:#}", e))],
    };

    let reparsed = match Manifest::parse(&serialized, &manifest.manifest_path) {
        Ok(m) => m,
        Err(e) => {
            return vec![Diagnostic::error("re-serialized manifest does not parse")
                .with_context(format!("{:#}", e))]
        }
    };

    let mut findings = Vec::new();
    if &reparsed != manifest {
        findings.push(Diagnostic::error(
            "re-serialized manifest differs from the parsed manifest",
        ));
    }

    match (source_fingerprint(manifest), fingerprint_str(&serialized)) {
        (Ok(original), Ok(written)) if original != written => findings.push(
            Diagnostic::error("re-serializing the manifest changes its key/value pairs")
                .with_location(&manifest.manifest_path),
        ),
        (Err(e), _) | (_, Err(e)) => findings.push(Diagnostic::error(format!("{:#}", e))),
        _ => {}
    }

    findings
}

fn quoted(names: &[&str]) -> String {
    names
        .iter()
        .map(|n| format!("`{}`", n))
        .collect::<Vec<_>>()
        .join(", ")
}
