//! Semantic manifest fingerprints.
//!
//! A fingerprint hashes a normalized view of a manifest document, so it is
//! stable across whitespace, comments, key order and empty tables.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use crate::core::Manifest;

/// Fingerprint of the manifest model as it would be written.
pub fn manifest_fingerprint(manifest: &Manifest) -> Result<String> {
    let serialized = manifest.to_toml_string()?;
    fingerprint_str(&serialized)
}

/// Fingerprint of the text the manifest was parsed from.
pub fn source_fingerprint(manifest: &Manifest) -> Result<String> {
    fingerprint_str(manifest.source())
        .with_context(|| format!("failed to fingerprint {}", manifest.manifest_path.display()))
}

/// Fingerprint a TOML document.
pub fn fingerprint_str(content: &str) -> Result<String> {
    let document: toml::Value = toml::from_str(content).context("failed to parse TOML document")?;
    let normalized = normalize(serde_json::to_value(&document).context("failed to convert TOML")?);

    // serde_json maps are sorted by key, so the encoding is canonical
    let bytes = serde_json::to_vec(&normalized).context("failed to serialize normalized manifest")?;
    let hash = Sha256::digest(&bytes);
    Ok(hex::encode(hash))
}

/// Whether two TOML documents hold the same key/value pairs.
pub fn semantically_equal(a: &str, b: &str) -> Result<bool> {
    Ok(fingerprint_str(a)? == fingerprint_str(b)?)
}

/// Drop empty tables and arrays; an empty table means the same as no table.
fn normalize(value: serde_json::Value) -> serde_json::Value {
    use serde_json::Value;

    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, normalize(v)))
                .filter(|(_, v)| !is_empty(v))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize).collect()),
        other => other,
    }
}

fn is_empty(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Object(map) => map.is_empty(),
        serde_json::Value::Array(items) => items.is_empty(),
        _ => false,
    }
}
