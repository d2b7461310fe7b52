//! Core data structures.
//!
//! This module contains the typed model of a pyproject.toml:
//! - Package identity and the manifest itself
//! - Dependency declarations and groups
//! - The PEP 517 build-system table
//! - Release configuration and version pointers

pub mod build_system;
pub mod dependency;
pub mod manifest;
pub mod release;

pub use build_system::{BuildSystem, Requirement};
pub use dependency::{Dependency, DependencySpec, GroupId};
pub use manifest::{find_manifest, Manifest, PackageMetadata, MANIFEST_NAME};
pub use release::{ReleaseConfig, VersionPointer};
