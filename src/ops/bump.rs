//! Version bumping.
//!
//! Rewrites the identity version and every release pointer target in one
//! pass, then checks that all pointers agree on the new version.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use regex::Captures;
use toml_edit::{DocumentMut, Item, Value};

use crate::core::release::{PointerKind, VersionPointer};
use crate::core::Manifest;
use crate::ops::dependency_edit::find_table;
use crate::resolver::version::{bump, format_version, parse_version, BumpLevel};
use crate::util::fs;

/// Options for bumping the version.
#[derive(Debug, Clone, Default)]
pub struct BumpOptions {
    /// Component to bump
    pub level: Option<BumpLevel>,

    /// Explicit new version
    pub version: Option<String>,

    /// Compute the edits without writing them
    pub dry_run: bool,
}

impl BumpOptions {
    pub fn level(level: BumpLevel) -> Self {
        BumpOptions {
            level: Some(level),
            ..Default::default()
        }
    }

    pub fn to_version(version: impl Into<String>) -> Self {
        BumpOptions {
            version: Some(version.into()),
            ..Default::default()
        }
    }
}

/// Result of a bump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BumpResult {
    /// Version before the bump, as written
    pub previous: String,

    /// Version after the bump, as written
    pub new: String,

    /// Files that were (or would be) rewritten
    pub files: Vec<PathBuf>,
}

/// A pending rewrite of one file.
struct FileEdit {
    original: String,
    contents: String,
}

/// Bump the version of the manifest at `manifest_path`.
pub fn bump_version(manifest_path: &Path, opts: &BumpOptions) -> Result<BumpResult> {
    let manifest = Manifest::load(manifest_path)?;
    let previous = manifest.package.version.clone();
    let current = manifest
        .version()
        .context("cannot bump a version that does not parse")?;

    let next = match (&opts.version, opts.level) {
        (Some(explicit), None) => {
            let next = parse_version(explicit)?;
            if next <= current {
                bail!(
                    "new version `{}` is not newer than `{}`",
                    explicit,
                    previous
                );
            }
            next
        }
        (None, Some(level)) => bump(&current, level)?,
        (Some(_), Some(_)) => bail!("give either a bump level or a version, not both"),
        (None, None) => bail!("nothing to bump, give a bump level or a version"),
    };
    let new = format_version(&next);

    let pointers = match manifest.release {
        Some(ref release) => release.pointers()?,
        None => Vec::new(),
    };

    let manifest_key = fs::normalize_path(manifest_path);
    let mut edits: BTreeMap<PathBuf, FileEdit> = BTreeMap::new();
    edits.insert(
        manifest_key.clone(),
        FileEdit {
            original: manifest.source().to_string(),
            contents: set_identity_version(manifest.source(), &new)
                .with_context(|| format!("failed to update {}", manifest_path.display()))?,
        },
    );

    for pointer in &pointers {
        let target = fs::normalize_path(&pointer.target(manifest.manifest_dir()));
        if !edits.contains_key(&target) {
            let original = fs::read_to_string(&target)
                .with_context(|| format!("cannot follow version pointer `{}`", pointer))?;
            edits.insert(
                target.clone(),
                FileEdit {
                    contents: original.clone(),
                    original,
                },
            );
        }

        let Some(edit) = edits.get_mut(&target) else {
            continue;
        };
        edit.contents = match pointer.kind() {
            PointerKind::Variable => rewrite_variable(pointer, &edit.contents, &previous, &new)?,
            PointerKind::Toml => rewrite_toml_key(pointer, &edit.contents, &new)?,
        };
    }

    let changed: Vec<(PathBuf, String, String)> = edits
        .into_iter()
        .filter(|(_, edit)| edit.contents != edit.original)
        .map(|(path, edit)| (path, edit.contents, edit.original))
        .collect();
    let files: Vec<PathBuf> = changed.iter().map(|(path, _, _)| path.clone()).collect();

    if opts.dry_run {
        tracing::info!("would bump {} -> {} in {} files", previous, new, files.len());
        return Ok(BumpResult {
            previous,
            new,
            files,
        });
    }

    fs::write_all_or_restore(&changed)?;

    if let Err(e) = verify_pointers(manifest_path, &new) {
        let restore: Vec<_> = changed
            .iter()
            .map(|(path, contents, original)| (path.clone(), original.clone(), contents.clone()))
            .collect();
        fs::write_all_or_restore(&restore)?;
        return Err(e.context("version pointers disagree after bump, changes were reverted"));
    }

    tracing::info!("bumped {} -> {} in {} files", previous, new, files.len());
    Ok(BumpResult {
        previous,
        new,
        files,
    })
}

/// Every pointer must now resolve to `expected`.
fn verify_pointers(manifest_path: &Path, expected: &str) -> Result<()> {
    let manifest = Manifest::load(manifest_path)?;
    if manifest.package.version != expected {
        bail!(
            "identity version is `{}`, expected `{}`",
            manifest.package.version,
            expected
        );
    }

    let Some(ref release) = manifest.release else {
        return Ok(());
    };
    for pointer in release.pointers()? {
        let matches = pointer.resolve(
            manifest.manifest_dir(),
            (&manifest.manifest_path, manifest.source()),
        )?;
        if let Some(first) = matches.first() {
            if first.value != expected {
                bail!(
                    "version pointer `{}` resolves to `{}`, expected `{}`",
                    pointer,
                    first.value,
                    expected
                );
            }
        }
    }
    Ok(())
}

fn set_identity_version(contents: &str, new: &str) -> Result<String> {
    let mut doc: DocumentMut = contents.parse()?;
    let path = ["tool", "poetry"].map(String::from);
    let slot = find_table(&mut doc, &path)
        .and_then(|table| table.get_mut("version"))
        .and_then(Item::as_value_mut)
        .context("no `version` in [tool.poetry]")?;
    set_string(slot, new);
    Ok(doc.to_string())
}

/// Rewrite `variable = "x"` assignments.
///
/// The first assignment is authoritative and always rewritten; later ones
/// only when they still hold the previous version.
fn rewrite_variable(
    pointer: &VersionPointer,
    contents: &str,
    previous: &str,
    new: &str,
) -> Result<String> {
    let re = pointer
        .pattern()
        .with_context(|| format!("invalid version pointer `{}`", pointer))?;

    let mut first = true;
    let mut rewritten = 0;
    let out = re.replace_all(contents, |caps: &Captures<'_>| {
        let whole = &caps[0];
        let take = first || &caps[2] == previous;
        first = false;
        if take {
            rewritten += 1;
            // The closing quote is the last character of the match
            format!("{}{}{}", &caps[1], new, &whole[whole.len() - 1..])
        } else {
            whole.to_string()
        }
    });

    if rewritten == 0 {
        bail!("version pointer `{}` does not match anything", pointer);
    }
    Ok(out.into_owned())
}

/// Rewrite the string at a dotted key.
fn rewrite_toml_key(pointer: &VersionPointer, contents: &str, new: &str) -> Result<String> {
    let mut doc: DocumentMut = contents
        .parse()
        .with_context(|| format!("`{}` is not valid TOML", pointer.file().display()))?;

    let segments: Vec<String> = pointer.key().split('.').map(String::from).collect();
    let Some((last, parents)) = segments.split_last() else {
        bail!("malformed version pointer `{}`", pointer);
    };

    let slot = find_table(&mut doc, parents)
        .and_then(|table| table.get_mut(last))
        .and_then(Item::as_value_mut)
        .filter(|value| value.is_str())
        .with_context(|| format!("version pointer `{}` does not point at a string", pointer))?;
    set_string(slot, new);

    Ok(doc.to_string())
}

/// Replace a string value, keeping its surrounding whitespace and comments.
fn set_string(slot: &mut Value, new: &str) {
    let decor = slot.decor().clone();
    *slot = new.into();
    *slot.decor_mut() = decor;
}
