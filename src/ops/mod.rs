//! High-level operations.
//!
//! This module contains the operations run against a pyproject.toml:
//! validation, reporting, fingerprinting, version bumps and dependency edits.

pub mod bump;
pub mod dependency_edit;
pub mod fingerprint;
pub mod report;
pub mod validate;

pub use bump::{bump_version, BumpOptions, BumpResult};
pub use dependency_edit::{
    add_dependency, remove_dependency, AddOptions, AddResult, RemoveOptions, RemoveResult,
};
pub use fingerprint::{manifest_fingerprint, semantically_equal, source_fingerprint};
pub use report::{format_report, format_report_for_output, ReportFormat};
pub use validate::{validate, validate_path, ValidateOptions, ValidationReport, ValidationStep};
