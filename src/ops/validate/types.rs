//! Public types for the validate module.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::core::dependency::GroupId;
use crate::util::config::Config;
use crate::util::diagnostic::{Diagnostic, Severity};

/// Step names, in execution order.
pub mod steps {
    pub const IDENTITY: &str = "identity";
    pub const VERSION: &str = "version";
    pub const CONSTRAINTS: &str = "constraints";
    pub const DUPLICATES: &str = "duplicates";
    pub const SATISFIABILITY: &str = "satisfiability";
    pub const BUILD_SYSTEM: &str = "build-system";
    pub const RELEASE: &str = "release";
    pub const ROUND_TRIP: &str = "round-trip";
}

/// Result of a validation step.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationStep {
    /// Step name
    pub name: String,

    /// Whether the step passed (no error findings)
    pub passed: bool,

    /// Status message
    pub message: String,

    /// How long the step took (in milliseconds for JSON)
    #[serde(serialize_with = "serialize_duration_ms")]
    pub duration: Duration,

    /// Everything the step found
    pub findings: Vec<Diagnostic>,
}

fn serialize_duration_ms<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}

impl ValidationStep {
    /// Create a step from its findings.
    pub fn new(name: impl Into<String>, findings: Vec<Diagnostic>, duration: Duration) -> Self {
        let errors = findings.iter().filter(|d| d.is_error()).count();
        let warnings = findings
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count();

        let message = match (errors, warnings) {
            (0, 0) => "ok".to_string(),
            (0, w) => format!("ok with {} warning{}", w, plural(w)),
            (e, 0) => format!("{} error{}", e, plural(e)),
            (e, w) => format!("{} error{}, {} warning{}", e, plural(e), w, plural(w)),
        };

        ValidationStep {
            name: name.into(),
            passed: errors == 0,
            message,
            duration,
            findings,
        }
    }

    /// Error findings.
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.findings.iter().filter(|d| d.is_error())
    }

    /// Warning findings.
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.findings
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

/// Complete validation result.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    /// Package name
    pub package: String,

    /// Package version, as written
    pub version: String,

    /// Manifest that was validated
    pub manifest_path: PathBuf,

    /// Individual step results
    pub steps: Vec<ValidationStep>,

    /// Total validation time (in milliseconds for JSON)
    #[serde(serialize_with = "serialize_duration_ms")]
    pub total_duration: Duration,

    /// Whether validation passed overall
    pub passed: bool,
}

impl ValidationReport {
    /// Create an empty, passing report.
    pub fn new(
        package: impl Into<String>,
        version: impl Into<String>,
        manifest_path: impl Into<PathBuf>,
    ) -> Self {
        ValidationReport {
            package: package.into(),
            version: version.into(),
            manifest_path: manifest_path.into(),
            steps: Vec::new(),
            total_duration: Duration::ZERO,
            passed: true,
        }
    }

    /// Add a step result.
    pub fn add_step(&mut self, step: ValidationStep) {
        if !step.passed {
            self.passed = false;
        }
        self.steps.push(step);
    }

    /// Find a step by name.
    pub fn step(&self, name: &str) -> Option<&ValidationStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Get count of passed steps.
    pub fn passed_count(&self) -> usize {
        self.steps.iter().filter(|s| s.passed).count()
    }

    /// Get count of failed steps.
    pub fn failed_count(&self) -> usize {
        self.steps.iter().filter(|s| !s.passed).count()
    }

    /// All error findings with their step name.
    pub fn errors(&self) -> Vec<(&str, &Diagnostic)> {
        self.steps
            .iter()
            .flat_map(|s| s.errors().map(move |d| (s.name.as_str(), d)))
            .collect()
    }

    /// All warning findings with their step name.
    pub fn warnings(&self) -> Vec<(&str, &Diagnostic)> {
        self.steps
            .iter()
            .flat_map(|s| s.warnings().map(move |d| (s.name.as_str(), d)))
            .collect()
    }
}

/// Options for validation.
#[derive(Debug, Clone)]
pub struct ValidateOptions {
    /// Groups to check; empty means every declared group
    pub groups: Vec<GroupId>,

    /// Missing [build-system] is an error rather than a warning
    pub require_build_system: bool,

    /// Extra, disagreeing matches of a pointer are errors rather than warnings
    pub strict_pointers: bool,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        ValidateOptions {
            groups: Vec::new(),
            require_build_system: true,
            strict_pointers: false,
        }
    }
}

impl ValidateOptions {
    pub fn from_config(config: &Config) -> Self {
        ValidateOptions {
            groups: config.groups(),
            require_build_system: config.require_build_system(),
            strict_pointers: config.strict_pointers(),
        }
    }

    /// Whether a group is selected.
    pub fn includes(&self, group: &GroupId) -> bool {
        self.groups.is_empty() || self.groups.contains(group)
    }
}
