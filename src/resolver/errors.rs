//! Resolution error types and diagnostics.

use thiserror::Error;

use crate::util::diagnostic::Diagnostic;

/// Error during candidate selection or dependency resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("no matching version for `{package}`")]
    NoMatchingVersion {
        package: String,
        requirement: String,
        available: Vec<String>,
    },

    #[error("`{package}` {candidate} does not satisfy `{requirement}`")]
    CandidateRejected {
        package: String,
        requirement: String,
        candidate: String,
    },

    #[error("version conflict for `{package}`")]
    VersionConflict {
        package: String,
        requirements: Vec<(String, String)>, // (declaring group, requirement)
    },

    #[error("package not found: `{package}`")]
    PackageNotFound {
        package: String,
        suggestions: Vec<String>,
    },

    #[error("python {python} does not satisfy `{requirement}`")]
    UnsupportedPython { requirement: String, python: String },

    #[error("dependency resolution failed")]
    NoSolution { report: String },
}

impl ResolveError {
    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            ResolveError::NoMatchingVersion {
                package,
                requirement,
                available,
            } => {
                let mut diag = Diagnostic::error(format!(
                    "no version of `{}` matches requirement `{}`",
                    package, requirement
                ));

                if !available.is_empty() {
                    diag = diag.with_context(format!(
                        "available versions: {}",
                        available.join(", ")
                    ));
                }

                diag.with_suggestion(format!(
                    "Update your version requirement for `{}`",
                    package
                ))
            }

            ResolveError::CandidateRejected {
                package,
                requirement,
                candidate,
            } => Diagnostic::error(format!(
                "`{}` {} is rejected by requirement `{}`",
                package, candidate, requirement
            ))
            .with_suggestion(format!(
                "Pick a version of `{}` inside `{}`",
                package, requirement
            )),

            ResolveError::VersionConflict {
                package,
                requirements,
            } => {
                let mut diag =
                    Diagnostic::error(format!("version conflict for `{}`", package));

                for (group, req) in requirements {
                    diag = diag.with_context(format!(
                        "{} dependencies require {} {}",
                        group, package, req
                    ));
                }

                diag.with_suggestion(format!(
                    "Declare overlapping constraints for `{}` in every group",
                    package
                ))
                .with_suggestion(format!(
                    "Keep `{}` in a single dependency group",
                    package
                ))
            }

            ResolveError::PackageNotFound {
                package,
                suggestions,
            } => {
                let mut diag =
                    Diagnostic::error(format!("could not find package `{}`", package));

                if !suggestions.is_empty() {
                    diag = diag.with_context(format!(
                        "did you mean: {}?",
                        suggestions.join(", ")
                    ));
                }

                diag.with_suggestion("Check that the package name is spelled correctly")
            }

            ResolveError::UnsupportedPython {
                requirement,
                python,
            } => Diagnostic::error(format!(
                "the project requires python `{}`, but {} was requested",
                requirement, python
            ))
            .with_suggestion("Widen the `python` constraint in [tool.poetry.dependencies]"),

            ResolveError::NoSolution { report } => {
                let mut diag = Diagnostic::error("dependency resolution failed");
                for line in report.lines().filter(|l| !l.trim().is_empty()) {
                    diag = diag.with_context(line.trim());
                }
                diag.with_suggestion("Relax the constraints named above")
            }
        }
    }
}
