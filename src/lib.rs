//! phloem_manifest - the phloemfinder project manifest
//!
//! This crate provides a typed model of the phloemfinder pyproject.toml
//! together with the operations maintainers run against it: validation,
//! dependency resolution against an in-memory candidate index, version
//! bumps across release pointers, and dependency edits.

pub mod core;
pub mod ops;
pub mod resolver;
pub mod util;

/// Test utilities for unit tests.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests. It provides manifest fixtures and temporary project
/// layouts.
#[cfg(test)]
pub mod test_support;

pub use self::core::{dependency::Dependency, dependency::GroupId, manifest::Manifest};

pub use ops::validate::{validate, ValidateOptions, ValidationReport};
pub use resolver::{check_candidate, resolve, CandidateIndex, Resolution, ResolveOptions};
pub use util::config::Config;
