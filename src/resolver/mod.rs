//! Dependency resolution.
//!
//! Candidate versions are supplied in memory through a [`CandidateIndex`];
//! nothing here touches the network. [`check_candidate`] and
//! [`select_candidate`] answer single-package questions, [`resolve`] runs
//! PubGrub over the declared groups and their transitive requirements.
//! The resolver is pure and deterministic.

pub mod constraint;
pub mod errors;
pub mod version;

pub use constraint::{ConstraintError, VersionConstraint};
pub use errors::ResolveError;
pub use version::{bump, format_version, parse_version, parse_version_lenient, BumpLevel};

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::convert::Infallible;
use std::fmt;

use anyhow::Result;
use pubgrub::{
    DefaultStringReporter, Dependencies, DependencyProvider, PackageResolutionStatistics,
    PubGrubError, Range, Reporter,
};
use semver::Version;

use crate::core::dependency::{normalize_name, Dependency, GroupId};
use crate::core::manifest::Manifest;
use crate::resolver::constraint::is_empty_range;
use crate::resolver::version::VersionError;
use crate::util::config::Config;

/// One available release of a package.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    version: Version,
    /// Requirements of this release: normalized name -> constraint
    dependencies: Vec<(String, VersionConstraint)>,
}

impl Candidate {
    pub fn new(version: Version) -> Self {
        Candidate {
            version,
            dependencies: Vec::new(),
        }
    }

    /// Add a requirement of this release.
    pub fn requires(mut self, name: &str, constraint: VersionConstraint) -> Self {
        self.dependencies.push((normalize_name(name), constraint));
        self
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn dependencies(&self) -> &[(String, VersionConstraint)] {
        &self.dependencies
    }
}

/// Available versions per package, keyed by normalized name.
#[derive(Debug, Clone, Default)]
pub struct CandidateIndex {
    packages: HashMap<String, Vec<Candidate>>,
}

impl CandidateIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a candidate for a package.
    pub fn add(&mut self, name: &str, candidate: Candidate) -> &mut Self {
        let entries = self.packages.entry(normalize_name(name)).or_default();
        entries.retain(|c| c.version != candidate.version);
        entries.push(candidate);
        entries.sort_by(|a, b| a.version.cmp(&b.version));
        self
    }

    /// Add dependency-free versions written in PEP 440 spelling.
    pub fn add_versions(&mut self, name: &str, versions: &[&str]) -> Result<&mut Self, VersionError> {
        for v in versions {
            let version = parse_version(v)?;
            self.add(name, Candidate::new(version));
        }
        Ok(self)
    }

    /// Candidates for a package, lowest version first.
    pub fn candidates(&self, name: &str) -> &[Candidate] {
        self.packages
            .get(&normalize_name(name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Versions of a package, lowest first.
    pub fn versions(&self, name: &str) -> Vec<&Version> {
        self.candidates(name).iter().map(|c| &c.version).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(&normalize_name(name))
    }

    /// Known package names close to `name`.
    pub fn suggestions(&self, name: &str) -> Vec<String> {
        let wanted = normalize_name(name);
        let mut close: Vec<String> = self
            .packages
            .keys()
            .filter(|known| edit_distance(known, &wanted) <= 2 || known.contains(&wanted))
            .cloned()
            .collect();
        close.sort();
        close
    }
}

/// Pick the highest candidate accepted by `constraint`.
///
/// Pre-releases are only considered when allowed or when the constraint
/// itself names a pre-release.
pub fn select_candidate<'a, I>(
    constraint: &VersionConstraint,
    candidates: I,
    allow_prereleases: bool,
) -> Option<&'a Version>
where
    I: IntoIterator<Item = &'a Version>,
{
    let allow_pre = allow_prereleases || constraint.mentions_prerelease();
    candidates
        .into_iter()
        .filter(|v| allow_pre || v.pre.is_empty())
        .filter(|v| constraint.matches(v))
        .max()
}

/// Accept or reject a concrete version for a dependency.
pub fn check_candidate(dependency: &Dependency, version: &Version) -> Result<(), ResolveError> {
    if dependency.accepts(version) {
        tracing::debug!(
            "`{}` {} satisfies `{}`",
            dependency.name(),
            version,
            dependency.constraint()
        );
        Ok(())
    } else {
        Err(ResolveError::CandidateRejected {
            package: dependency.name().to_string(),
            requirement: dependency.constraint().to_string(),
            candidate: format_version(version),
        })
    }
}

/// Options for resolution.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Groups to resolve; empty means all declared groups
    pub groups: Vec<GroupId>,

    /// Extras whose optional dependencies are included
    pub extras: Vec<String>,

    /// Let every package select pre-releases
    pub allow_prereleases: bool,

    /// Interpreter version to resolve for
    pub python_version: Option<Version>,
}

impl ResolveOptions {
    /// Groups and pre-release policy from `[validate]`.
    pub fn from_config(config: &Config) -> Self {
        ResolveOptions {
            groups: config.groups(),
            allow_prereleases: config.allow_prereleases(),
            ..Default::default()
        }
    }
}

/// The selected version of every package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    packages: BTreeMap<String, Version>,
}

impl Resolution {
    /// Selected version of a package.
    pub fn get(&self, name: &str) -> Option<&Version> {
        self.packages.get(&normalize_name(name))
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Packages in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Version)> {
        self.packages.iter()
    }
}

/// A package identifier for PubGrub resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PubGrubPackage {
    /// The project itself
    Root(String),
    /// A dependency, by normalized name
    Package(String),
}

impl fmt::Display for PubGrubPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PubGrubPackage::Root(name) | PubGrubPackage::Package(name) => write!(f, "{}", name),
        }
    }
}

/// Dependency provider for PubGrub resolution.
pub struct ManifestResolver<'a> {
    index: &'a CandidateIndex,

    /// Root name and version
    root: (String, Version),

    /// Direct requirements of the root, intersected across groups
    root_requirements: Vec<(String, Range<Version>)>,

    /// Packages allowed to select pre-releases
    prereleases: BTreeSet<String>,

    allow_all_prereleases: bool,
}

impl ManifestResolver<'_> {
    fn allows_prerelease(&self, name: &str) -> bool {
        self.allow_all_prereleases || self.prereleases.contains(name)
    }
}

impl DependencyProvider for ManifestResolver<'_> {
    type P = PubGrubPackage;
    type V = Version;
    type VS = Range<Version>;
    type M = String;
    type Err = Infallible;
    type Priority = u32;

    fn prioritize(
        &self,
        package: &Self::P,
        _range: &Self::VS,
        _package_conflicts_counts: &PackageResolutionStatistics,
    ) -> Self::Priority {
        // Higher priority = resolved first; fewer candidates first
        match package {
            PubGrubPackage::Root(_) => u32::MAX,
            PubGrubPackage::Package(name) => {
                (1000 - self.index.candidates(name).len().min(1000)) as u32
            }
        }
    }

    fn choose_version(
        &self,
        package: &Self::P,
        range: &Self::VS,
    ) -> Result<Option<Self::V>, Self::Err> {
        match package {
            PubGrubPackage::Root(_) => {
                let version = &self.root.1;
                Ok(range.contains(version).then(|| version.clone()))
            }
            PubGrubPackage::Package(name) => {
                let allow_pre = self.allows_prerelease(name);
                Ok(self
                    .index
                    .candidates(name)
                    .iter()
                    .rev()
                    .map(Candidate::version)
                    .find(|v| (allow_pre || v.pre.is_empty()) && range.contains(v))
                    .cloned())
            }
        }
    }

    fn get_dependencies(
        &self,
        package: &Self::P,
        version: &Self::V,
    ) -> Result<Dependencies<Self::P, Self::VS, Self::M>, Self::Err> {
        match package {
            PubGrubPackage::Root(_) => Ok(Dependencies::Available(
                self.root_requirements
                    .iter()
                    .map(|(name, range)| (PubGrubPackage::Package(name.clone()), range.clone()))
                    .collect(),
            )),
            PubGrubPackage::Package(name) => {
                match self
                    .index
                    .candidates(name)
                    .iter()
                    .find(|c| &c.version == version)
                {
                    Some(candidate) => Ok(Dependencies::Available(
                        candidate
                            .dependencies
                            .iter()
                            .map(|(dep, constraint)| {
                                (PubGrubPackage::Package(dep.clone()), constraint.range().clone())
                            })
                            .collect(),
                    )),
                    None => Ok(Dependencies::Unavailable(format!(
                        "{} {} is not in the index",
                        name, version
                    ))),
                }
            }
        }
    }
}

/// Resolve the manifest's dependencies against an index.
///
/// Errors are [`ResolveError`] values wrapped in `anyhow`.
pub fn resolve(
    manifest: &Manifest,
    index: &CandidateIndex,
    opts: &ResolveOptions,
) -> Result<Resolution> {
    if let (Some(python), Some(requirement)) = (&opts.python_version, manifest.python_constraint())
    {
        let constraint = VersionConstraint::parse(requirement)?;
        if !constraint.matches(python) {
            return Err(ResolveError::UnsupportedPython {
                requirement: requirement.to_string(),
                python: python.to_string(),
            }
            .into());
        }
    }

    let deps = manifest.dependency_list(&opts.groups)?;
    let selected: Vec<&Dependency> = deps
        .iter()
        .filter(|d| !d.is_python())
        .filter(|d| d.source().is_registry())
        .filter(|d| !d.is_optional() || in_selected_extra(manifest, opts, d))
        .filter(|d| match (d.python(), &opts.python_version) {
            (Some(range), Some(python)) => range.matches(python),
            _ => true,
        })
        .collect();

    // Intersect requirements for packages declared in several groups
    let mut combined: BTreeMap<&str, (Range<Version>, Vec<&Dependency>)> = BTreeMap::new();
    for dep in &selected {
        let entry = combined
            .entry(dep.normalized_name())
            .or_insert_with(|| (Range::full(), Vec::new()));
        entry.0 = entry.0.intersection(dep.constraint().range());
        entry.1.push(dep);
    }

    let mut prereleases = BTreeSet::new();
    for (name, (range, declared)) in &combined {
        if is_empty_range(range) {
            return Err(ResolveError::VersionConflict {
                package: (*name).to_string(),
                requirements: declared
                    .iter()
                    .map(|d| (d.group().to_string(), d.constraint().to_string()))
                    .collect(),
            }
            .into());
        }

        if !index.contains(name) {
            return Err(ResolveError::PackageNotFound {
                package: declared[0].name().to_string(),
                suggestions: index.suggestions(name),
            }
            .into());
        }

        let allow_pre = opts.allow_prereleases || declared.iter().any(|d| d.allows_prereleases());
        if allow_pre {
            prereleases.insert((*name).to_string());
        }

        let available = index.versions(name);
        let matching = available
            .iter()
            .any(|v| (allow_pre || v.pre.is_empty()) && range.contains(v));
        if !matching {
            return Err(ResolveError::NoMatchingVersion {
                package: declared[0].name().to_string(),
                requirement: declared
                    .iter()
                    .map(|d| d.constraint().as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                available: available.iter().map(|v| format_version(v)).collect(),
            }
            .into());
        }
    }

    let root_name = normalize_name(manifest.name());
    let root_version = manifest.version().unwrap_or_else(|_| Version::new(0, 0, 0));
    let provider = ManifestResolver {
        index,
        root: (root_name.clone(), root_version.clone()),
        root_requirements: combined
            .into_iter()
            .map(|(name, (range, _))| (name.to_string(), range))
            .collect(),
        prereleases,
        allow_all_prereleases: opts.allow_prereleases,
    };

    tracing::debug!(
        "resolving {} direct requirements of `{}`",
        provider.root_requirements.len(),
        root_name
    );

    match pubgrub::resolve(&provider, PubGrubPackage::Root(root_name), root_version) {
        Ok(solution) => {
            let packages = solution
                .into_iter()
                .filter_map(|(pkg, version)| match pkg {
                    PubGrubPackage::Package(name) => Some((name, version)),
                    PubGrubPackage::Root(_) => None,
                })
                .collect::<BTreeMap<_, _>>();
            tracing::debug!("resolved {} packages", packages.len());
            Ok(Resolution { packages })
        }
        Err(PubGrubError::NoSolution(tree)) => Err(ResolveError::NoSolution {
            report: DefaultStringReporter::report(&tree),
        }
        .into()),
        Err(e) => Err(ResolveError::NoSolution {
            report: e.to_string(),
        }
        .into()),
    }
}

fn in_selected_extra(manifest: &Manifest, opts: &ResolveOptions, dep: &Dependency) -> bool {
    opts.extras.iter().any(|extra| {
        manifest.extras.get(extra).is_some_and(|names| {
            names
                .iter()
                .any(|n| normalize_name(n) == dep.normalized_name())
        })
    })
}

fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut current = vec![i + 1];
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != *cb);
            current.push(substitution.min(prev[j + 1] + 1).min(current[j] + 1));
        }
        prev = current;
    }
    prev[b.len()]
}
