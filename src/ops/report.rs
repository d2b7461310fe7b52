//! Output formatting for validation reports (human/JSON/GitHub).

use std::fmt::Write as _;

use thiserror::Error;

use crate::ops::validate::ValidationReport;
use crate::util::diagnostic::{Diagnostic, Severity};

/// Output format for validation reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    /// Human-readable output (default)
    #[default]
    Human,
    /// Machine-readable JSON output
    Json,
    /// GitHub Actions annotations with job summary
    Github,
}

impl std::str::FromStr for ReportFormat {
    type Err = ReportFormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(ReportFormat::Human),
            "json" => Ok(ReportFormat::Json),
            "github" | "github-actions" | "gha" => Ok(ReportFormat::Github),
            _ => Err(ReportFormatParseError(s.to_string())),
        }
    }
}

/// Error parsing a report format option.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid report format '{0}', valid values: human, json, github")]
pub struct ReportFormatParseError(pub String);

/// Format a report for display (human-readable).
pub fn format_report(report: &ValidationReport, verbose: bool, color: bool) -> String {
    let mut output = String::new();

    writeln!(
        output,
        "Validate: {} v{} ({})",
        report.package,
        report.version,
        report.manifest_path.display()
    )
    .unwrap();
    writeln!(output, "{}", "=".repeat(50)).unwrap();
    writeln!(output).unwrap();

    for step in &report.steps {
        let status = if step.passed { "[OK]" } else { "[FAIL]" };
        writeln!(output, "  {} {} ({:.2?})", status, step.name, step.duration).unwrap();

        if verbose || !step.passed {
            writeln!(output, "      {}", step.message).unwrap();
        }
    }

    let findings: Vec<&Diagnostic> = report
        .steps
        .iter()
        .flat_map(|s| s.findings.iter())
        .filter(|d| verbose || d.severity <= Severity::Warning)
        .collect();
    if !findings.is_empty() {
        writeln!(output).unwrap();
        for diag in findings {
            output.push_str(&diag.format(color));
        }
    }

    writeln!(output).unwrap();

    let status = if report.passed { "PASSED" } else { "FAILED" };
    writeln!(
        output,
        "Result: {} ({}/{} checks passed, {} warnings)",
        status,
        report.passed_count(),
        report.steps.len(),
        report.warnings().len()
    )
    .unwrap();
    writeln!(output, "Total time: {:.2?}", report.total_duration).unwrap();

    output
}

/// Format a report as JSON.
pub fn format_report_json(report: &ValidationReport) -> String {
    serde_json::to_string_pretty(report)
        .unwrap_or_else(|e| format!(r#"{{"error": "Failed to serialize report: {}"}}"#, e))
}

/// Format a report for GitHub Actions.
///
/// Outputs:
/// - `::error::` and `::warning::` annotations for CI integration
/// - Job summary in markdown format
pub fn format_report_github_actions(report: &ValidationReport) -> String {
    let mut output = String::new();

    for step in &report.steps {
        for diag in &step.findings {
            let level = match diag.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
                Severity::Note | Severity::Help => "notice",
            };
            let file = diag
                .location
                .as_ref()
                .unwrap_or(&report.manifest_path)
                .display()
                .to_string();
            let line = diag.line.map(|l| format!(",line={}", l)).unwrap_or_default();
            writeln!(
                output,
                "::{} file={}{},title={}::{}",
                level,
                file,
                line,
                step.name,
                escape(&annotation_message(diag))
            )
            .unwrap();
        }
    }

    writeln!(output, "::group::Validation Summary").unwrap();
    writeln!(output).unwrap();
    writeln!(output, "## {} v{}", report.package, report.version).unwrap();
    writeln!(output).unwrap();

    writeln!(output, "| Check | Status | Findings |").unwrap();
    writeln!(output, "|-------|--------|----------|").unwrap();
    for step in &report.steps {
        let status = if step.passed {
            ":white_check_mark:"
        } else {
            ":x:"
        };
        writeln!(output, "| {} | {} | {} |", step.name, status, step.message).unwrap();
    }
    writeln!(output).unwrap();

    let overall_status = if report.passed { "PASSED" } else { "FAILED" };
    let overall_emoji = if report.passed {
        ":heavy_check_mark:"
    } else {
        ":x:"
    };
    writeln!(
        output,
        "**Result:** {} {} ({}/{} checks passed)",
        overall_emoji,
        overall_status,
        report.passed_count(),
        report.steps.len()
    )
    .unwrap();

    let failed: Vec<_> = report.steps.iter().filter(|s| !s.passed).collect();
    if !failed.is_empty() {
        writeln!(output).unwrap();
        writeln!(output, "### Failed Checks").unwrap();
        for step in failed {
            writeln!(output).unwrap();
            writeln!(output, "<details>").unwrap();
            writeln!(output, "<summary>{}</summary>", step.name).unwrap();
            writeln!(output).unwrap();
            writeln!(output, "```").unwrap();
            for diag in step.errors() {
                output.push_str(&diag.format(false));
            }
            writeln!(output, "```").unwrap();
            writeln!(output).unwrap();
            writeln!(output, "</details>").unwrap();
        }
    }

    writeln!(output, "::endgroup::").unwrap();

    output
}

/// Format the report according to the specified output format.
pub fn format_report_for_output(
    report: &ValidationReport,
    format: ReportFormat,
    verbose: bool,
    color: bool,
) -> String {
    match format {
        ReportFormat::Human => format_report(report, verbose, color),
        ReportFormat::Json => format_report_json(report),
        ReportFormat::Github => format_report_github_actions(report),
    }
}

fn annotation_message(diag: &Diagnostic) -> String {
    let mut message = diag.message.clone();
    for ctx in &diag.context {
        message.push('\n');
        message.push_str(ctx);
    }
    message
}

/// Escape for the workflow command format.
fn escape(message: &str) -> String {
    message
        .replace('%', "%25")
        .replace('\r', "")
        .replace('\n', "%0A")
}
