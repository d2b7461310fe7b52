//! Adding and removing dependency declarations.
//!
//! Edits go through `toml_edit`, so comments, ordering and formatting of
//! the rest of the manifest are kept.

use std::path::Path;

use anyhow::{bail, Context, Result};
use toml_edit::{value, Array, DocumentMut, InlineTable, Item, Table, TableLike, Value};

use crate::core::dependency::{is_valid_name, normalize_name, GroupId, PYTHON};
use crate::core::Manifest;
use crate::resolver::VersionConstraint;
use crate::util::fs;

/// Options for adding a dependency.
#[derive(Debug, Clone)]
pub struct AddOptions {
    /// Package name
    pub name: String,

    /// Group to add to
    pub group: GroupId,

    /// Version constraint
    pub version: Option<String>,

    /// Path dependency
    pub path: Option<String>,

    /// Git repository URL
    pub git: Option<String>,

    /// Git branch
    pub branch: Option<String>,

    /// Git tag
    pub tag: Option<String>,

    /// Git revision
    pub rev: Option<String>,

    /// Direct archive URL
    pub url: Option<String>,

    /// Extras of the dependency to enable
    pub extras: Vec<String>,

    /// Interpreter constraint for this dependency
    pub python: Option<String>,

    /// Add as optional dependency
    pub optional: bool,

    /// Let version selection pick pre-releases
    pub allow_prereleases: bool,
}

impl AddOptions {
    /// A registry dependency with a version constraint.
    pub fn new(name: impl Into<String>, version: impl Into<String>, group: GroupId) -> Self {
        AddOptions {
            name: name.into(),
            group,
            version: Some(version.into()),
            path: None,
            git: None,
            branch: None,
            tag: None,
            rev: None,
            url: None,
            extras: Vec::new(),
            python: None,
            optional: false,
            allow_prereleases: false,
        }
    }
}

/// Result of adding a dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddResult {
    /// Name as written
    pub name: String,

    pub group: GroupId,

    /// The declaration that was replaced, as `key = value`
    pub replaced: Option<String>,
}

/// Options for removing a dependency.
#[derive(Debug, Clone)]
pub struct RemoveOptions {
    /// Package name (any spelling)
    pub name: String,

    /// Group to remove from
    pub group: GroupId,
}

/// Result of removing a dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveResult {
    /// Key that was removed, as it was spelled
    pub removed: String,

    pub group: GroupId,

    /// Extras that no longer name the dependency
    pub pruned_extras: Vec<String>,
}

/// Add or replace a dependency in pyproject.toml.
///
/// The file is left untouched if the declaration is invalid.
pub fn add_dependency(manifest_path: &Path, opts: &AddOptions) -> Result<AddResult> {
    validate_add(opts)?;

    let content = fs::read_to_string(manifest_path)?;
    let mut doc: DocumentMut = content
        .parse()
        .with_context(|| format!("failed to parse {}", manifest_path.display()))?;

    let dep_value = build_dependency_value(opts)?;
    let path = opts.group.table_path();
    let table = ensure_table(&mut doc, &path)?;

    let normalized = normalize_name(&opts.name);
    let existing = find_key(table, &normalized);

    let replaced = existing.as_ref().map(|key| {
        let old = table
            .get(key)
            .and_then(Item::as_value)
            .map(|v| v.to_string().trim().to_string())
            .unwrap_or_else(|| "{ ... }".to_string());
        format!("{} = {}", key, old)
    });

    match existing {
        Some(ref key) if key == &opts.name => {
            // Same spelling: replace in place to keep ordering
            table.insert(key, dep_value);
        }
        Some(ref key) => {
            table.remove(key);
            table.insert(&opts.name, dep_value);
        }
        None => {
            table.insert(&opts.name, dep_value);
        }
    }

    let new_content = doc.to_string();
    Manifest::parse(&new_content, manifest_path)
        .context("edited manifest no longer parses, not writing it")?;
    fs::write_string(manifest_path, &new_content)?;

    match replaced {
        Some(ref old) => tracing::info!("replaced `{}` in {} dependencies", old, opts.group),
        None => tracing::info!("added `{}` to {} dependencies", opts.name, opts.group),
    }

    Ok(AddResult {
        name: opts.name.clone(),
        group: opts.group.clone(),
        replaced,
    })
}

/// Remove a dependency from pyproject.toml.
pub fn remove_dependency(manifest_path: &Path, opts: &RemoveOptions) -> Result<RemoveResult> {
    let normalized = normalize_name(&opts.name);
    if opts.group == GroupId::Main && normalized == PYTHON {
        bail!("`python` is the interpreter constraint and cannot be removed");
    }

    let content = fs::read_to_string(manifest_path)?;
    let mut doc: DocumentMut = content
        .parse()
        .with_context(|| format!("failed to parse {}", manifest_path.display()))?;

    let path = opts.group.table_path();
    let Some(table) = find_table(&mut doc, &path) else {
        bail!("no {} dependencies in {}", opts.group, manifest_path.display());
    };

    let Some(key) = find_key(table, &normalized) else {
        bail!(
            "dependency `{}` not found in {} dependencies",
            opts.name,
            opts.group
        );
    };
    table.remove(&key);

    let mut pruned_extras = Vec::new();
    if opts.group == GroupId::Main {
        let extras_path = ["tool", "poetry", "extras"].map(String::from);
        if let Some(extras) = find_table(&mut doc, &extras_path) {
            for (extra, item) in extras.iter_mut() {
                if let Some(array) = item.as_array_mut() {
                    let before = array.len();
                    array.retain(|v| {
                        v.as_str().map(normalize_name).as_deref() != Some(normalized.as_str())
                    });
                    if array.len() != before {
                        pruned_extras.push(extra.get().to_string());
                    }
                }
            }
        }
    }

    fs::write_string(manifest_path, &doc.to_string())?;
    tracing::info!("removed `{}` from {} dependencies", key, opts.group);

    Ok(RemoveResult {
        removed: key,
        group: opts.group.clone(),
        pruned_extras,
    })
}

fn validate_add(opts: &AddOptions) -> Result<()> {
    if !is_valid_name(&opts.name) {
        bail!("invalid dependency name `{}`", opts.name);
    }

    let sources = [&opts.path, &opts.git, &opts.url]
        .iter()
        .filter(|s| s.is_some())
        .count();
    if sources > 1 {
        bail!(
            "dependency `{}` can use only one of `path`, `git` and `url`",
            opts.name
        );
    }
    if opts.git.is_none() && (opts.branch.is_some() || opts.tag.is_some() || opts.rev.is_some()) {
        bail!("`branch`, `tag` and `rev` need a `git` source");
    }
    if sources == 0 && opts.version.is_none() {
        bail!(
            "dependency `{}` needs a version constraint or a path, git or url source",
            opts.name
        );
    }

    if let Some(ref version) = opts.version {
        VersionConstraint::parse(version)
            .with_context(|| format!("invalid version constraint for `{}`", opts.name))?;
    }
    if let Some(ref python) = opts.python {
        VersionConstraint::parse(python)
            .with_context(|| format!("invalid python constraint for `{}`", opts.name))?;
    }

    Ok(())
}

/// Build the TOML value for a dependency.
fn build_dependency_value(opts: &AddOptions) -> Result<Item> {
    let needs_table = opts.path.is_some()
        || opts.git.is_some()
        || opts.url.is_some()
        || !opts.extras.is_empty()
        || opts.python.is_some()
        || opts.optional
        || opts.allow_prereleases;

    if !needs_table {
        return match opts.version {
            Some(ref version) => Ok(value(version.as_str())),
            None => bail!("dependency `{}` has no version constraint", opts.name),
        };
    }

    let mut table = InlineTable::new();

    if let Some(ref version) = opts.version {
        table.insert("version", version.as_str().into());
    }
    if let Some(ref path) = opts.path {
        table.insert("path", path.as_str().into());
    }
    if let Some(ref git) = opts.git {
        table.insert("git", git.as_str().into());

        if let Some(ref branch) = opts.branch {
            table.insert("branch", branch.as_str().into());
        } else if let Some(ref tag) = opts.tag {
            table.insert("tag", tag.as_str().into());
        } else if let Some(ref rev) = opts.rev {
            table.insert("rev", rev.as_str().into());
        }
    }
    if let Some(ref url) = opts.url {
        table.insert("url", url.as_str().into());
    }
    if !opts.extras.is_empty() {
        let mut extras = Array::new();
        for extra in &opts.extras {
            extras.push(extra.as_str());
        }
        table.insert("extras", Value::Array(extras));
    }
    if let Some(ref python) = opts.python {
        table.insert("python", python.as_str().into());
    }
    if opts.optional {
        table.insert("optional", true.into());
    }
    if opts.allow_prereleases {
        table.insert("allow-prereleases", true.into());
    }

    Ok(Item::Value(table.into()))
}

/// Find the key naming a package, whatever its spelling.
fn find_key(table: &dyn TableLike, normalized: &str) -> Option<String> {
    table
        .iter()
        .map(|(key, _)| key.to_string())
        .find(|key| normalize_name(key) == normalized)
}

/// Walk a table path, creating missing tables.
pub(crate) fn ensure_table<'a>(
    doc: &'a mut DocumentMut,
    path: &[String],
) -> Result<&'a mut dyn TableLike> {
    let mut current: &mut dyn TableLike = doc.as_table_mut();
    for (i, segment) in path.iter().enumerate() {
        let mut new_table = Table::new();
        new_table.set_implicit(i + 1 < path.len());
        current = current
            .entry(segment)
            .or_insert(Item::Table(new_table))
            .as_table_like_mut()
            .with_context(|| format!("`{}` is not a table", path[..=i].join(".")))?;
    }
    Ok(current)
}

/// Walk a table path without creating anything.
pub(crate) fn find_table<'a>(
    doc: &'a mut DocumentMut,
    path: &[String],
) -> Option<&'a mut dyn TableLike> {
    let mut current: &mut dyn TableLike = doc.as_table_mut();
    for segment in path {
        current = current.get_mut(segment)?.as_table_like_mut()?;
    }
    Some(current)
}
