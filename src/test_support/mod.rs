//! Test utilities for unit tests.
//!
//! Provides manifest fixtures and helpers that lay projects out in a
//! temporary directory.
//!
//! # Example
//!
//! ```rust,ignore
//! use phloem_manifest::test_support::{create_test_project, ProjectFixture};
//!
//! #[test]
//! fn test_example() {
//!     let (tmp, manifest_path) = create_test_project(&ProjectFixture::phloemfinder());
//!     // Load and check the manifest...
//! }
//! ```

pub mod fixtures;

use std::path::PathBuf;

// Re-export fixtures for convenience
pub use fixtures::*;

/// Lay out a fixture in a fresh temporary directory.
///
/// Returns the TempDir handle - dropping it will clean up the directory.
pub fn create_test_project(fixture: &ProjectFixture) -> (tempfile::TempDir, PathBuf) {
    let tmp = tempfile::TempDir::new().expect("failed to create temp dir");
    let manifest_path = fixture
        .write_to(tmp.path())
        .expect("failed to write fixture");
    (tmp, manifest_path)
}

/// Assertion helpers for testing.
pub mod assertions {
    /// Assert that an error message (including its causes) contains a substring.
    pub fn assert_error_contains<T: std::fmt::Debug>(
        result: Result<T, anyhow::Error>,
        substring: &str,
    ) {
        match result {
            Ok(v) => panic!("expected Err containing '{}', got Ok: {:?}", substring, v),
            Err(e) => {
                let msg = format!("{:#}", e);
                assert!(
                    msg.contains(substring),
                    "error '{}' does not contain '{}'",
                    msg,
                    substring
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_project() {
        let (tmp, manifest_path) = create_test_project(&ProjectFixture::phloemfinder());
        assert_eq!(manifest_path, tmp.path().join("pyproject.toml"));
        assert!(manifest_path.exists());
    }

    #[test]
    fn test_assertions() {
        use assertions::*;

        let err: Result<(), anyhow::Error> =
            Err(anyhow::anyhow!("inner").context("outer message"));
        assert_error_contains(err, "inner");
    }
}
