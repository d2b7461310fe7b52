//! Version constraint expressions.
//!
//! A constraint is parsed into a PubGrub [`Range`] over semver versions.
//! Accepted syntax is the union of what Poetry and PEP 440 write in
//! `pyproject.toml`:
//!
//! - `*` or empty: any version
//! - `^1.2.3`, `~1.2`, `~=2.2`: caret, tilde and compatible release
//! - `==1.2.3`, `==1.2.*`, `!=1.3.*`, `>`, `>=`, `<`, `<=`
//! - bare `1.2.3` (exact) and `1.2.*` (wildcard)
//! - `,` or whitespace joins clauses (AND), `||` or `|` joins alternatives (OR)

use std::fmt;
use std::str::FromStr;

use pubgrub::Range;
use semver::{Prerelease, Version};
use thiserror::Error;

use super::version::{parse_version, VersionError};

/// Error parsing a version constraint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstraintError {
    #[error("invalid version in constraint `{constraint}`: {source}")]
    InvalidVersion {
        constraint: String,
        #[source]
        source: VersionError,
    },

    #[error("operator `{op}` in constraint `{constraint}` is missing a version")]
    MissingVersion { op: String, constraint: String },

    #[error("wildcard is not allowed with `{op}` in constraint `{constraint}`")]
    WildcardNotAllowed { op: String, constraint: String },

    #[error("`~=` needs at least two release components in constraint `{constraint}`")]
    CompatibleReleaseTooShort { constraint: String },

    #[error("empty alternative in constraint `{constraint}`")]
    EmptyAlternative { constraint: String },

    #[error("upper bound of constraint `{constraint}` is out of range")]
    BoundOverflow { constraint: String },
}

/// Comparison operator of a single clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Exact,
    NotEqual,
    Greater,
    GreaterEq,
    Less,
    LessEq,
    Caret,
    Tilde,
    Compatible,
}

impl Op {
    /// Operators in match order (longest first).
    const PREFIXES: &'static [(&'static str, Op)] = &[
        ("===", Op::Exact),
        ("~=", Op::Compatible),
        ("==", Op::Exact),
        ("!=", Op::NotEqual),
        (">=", Op::GreaterEq),
        ("<=", Op::LessEq),
        (">", Op::Greater),
        ("<", Op::Less),
        ("^", Op::Caret),
        ("~", Op::Tilde),
        ("=", Op::Exact),
    ];

    fn split(clause: &str) -> (Op, &str, &str) {
        for (prefix, op) in Self::PREFIXES {
            if let Some(rest) = clause.strip_prefix(prefix) {
                return (*op, *prefix, rest.trim());
            }
        }
        (Op::Exact, "", clause)
    }
}

/// A parsed version constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    raw: String,
    range: Range<Version>,
    mentions_prerelease: bool,
}

impl VersionConstraint {
    /// The constraint that accepts every version.
    pub fn any() -> Self {
        VersionConstraint {
            raw: "*".to_string(),
            range: Range::full(),
            mentions_prerelease: false,
        }
    }

    /// Parse a constraint expression.
    pub fn parse(input: &str) -> Result<Self, ConstraintError> {
        let raw = input.trim();
        if raw.is_empty() || raw == "*" {
            return Ok(VersionConstraint {
                raw: if raw.is_empty() { "*".to_string() } else { raw.to_string() },
                ..Self::any()
            });
        }

        let mut range = Range::empty();
        let mut mentions_prerelease = false;

        for alternative in raw.replace("||", "|").split('|') {
            let clauses = tokenize(alternative);
            if clauses.is_empty() {
                return Err(ConstraintError::EmptyAlternative {
                    constraint: raw.to_string(),
                });
            }

            let mut alt_range = Range::full();
            for clause in clauses {
                let parsed = parse_clause(&clause, raw)?;
                mentions_prerelease |= parsed.prerelease;
                alt_range = alt_range.intersection(&parsed.range);
            }
            range = range.union(&alt_range);
        }

        Ok(VersionConstraint {
            raw: raw.to_string(),
            range,
            mentions_prerelease,
        })
    }

    /// The expression as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The set of versions this constraint accepts.
    pub fn range(&self) -> &Range<Version> {
        &self.range
    }

    /// Check if a version satisfies this constraint.
    pub fn matches(&self, version: &Version) -> bool {
        self.range.contains(version)
    }

    /// Whether the expression names a pre-release itself (`>=2.0rc1`).
    ///
    /// Candidate selection only considers pre-releases when this is set or
    /// they are explicitly allowed.
    pub fn mentions_prerelease(&self) -> bool {
        self.mentions_prerelease
    }

    /// Whether any version at all satisfies this constraint.
    pub fn is_satisfiable(&self) -> bool {
        !is_empty_range(&self.range)
    }

    /// Versions accepted by both constraints.
    pub fn intersect(&self, other: &VersionConstraint) -> Range<Version> {
        self.range.intersection(&other.range)
    }

    /// Whether some version satisfies both constraints.
    pub fn allows_any(&self, other: &VersionConstraint) -> bool {
        !is_empty_range(&self.intersect(other))
    }

    /// Whether the constraint accepts every version.
    pub fn is_any(&self) -> bool {
        self.range == Range::full()
    }
}

impl Default for VersionConstraint {
    fn default() -> Self {
        Self::any()
    }
}

impl FromStr for VersionConstraint {
    type Err = ConstraintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Check whether a range admits no version.
pub fn is_empty_range(range: &Range<Version>) -> bool {
    *range == Range::empty()
}

struct Clause {
    range: Range<Version>,
    prerelease: bool,
}

/// Split one alternative into clauses, gluing detached operators (`>= 1.2`).
fn tokenize(alternative: &str) -> Vec<String> {
    let mut clauses = Vec::new();
    let mut pending_op: Option<String> = None;

    for token in alternative
        .split(',')
        .flat_map(|part| part.split_whitespace())
    {
        let is_operator = token.chars().all(|c| "<>=!~^".contains(c));
        if is_operator {
            let op = pending_op.take().unwrap_or_default();
            pending_op = Some(op + token);
            continue;
        }

        match pending_op.take() {
            Some(op) => clauses.push(format!("{}{}", op, token)),
            None => clauses.push(token.to_string()),
        }
    }

    // A trailing operator becomes a clause of its own and fails to parse
    if let Some(op) = pending_op {
        clauses.push(op);
    }

    clauses
}

fn parse_clause(clause: &str, constraint: &str) -> Result<Clause, ConstraintError> {
    let (op, op_str, version_str) = Op::split(clause);

    if version_str.is_empty() {
        return Err(ConstraintError::MissingVersion {
            op: op_str.to_string(),
            constraint: constraint.to_string(),
        });
    }

    if version_str == "*" {
        return match op {
            Op::Exact => Ok(Clause {
                range: Range::full(),
                prerelease: false,
            }),
            _ => Err(ConstraintError::WildcardNotAllowed {
                op: op_str.to_string(),
                constraint: constraint.to_string(),
            }),
        };
    }

    let (base, wildcard) = match version_str.strip_suffix(".*") {
        Some(base) => (base, true),
        None => (version_str, false),
    };

    let version = parse_version(base).map_err(|source| ConstraintError::InvalidVersion {
        constraint: constraint.to_string(),
        source,
    })?;
    let components = release_components(base);
    let prerelease = !version.pre.is_empty();

    let inc = |n: u64| {
        n.checked_add(1).ok_or_else(|| ConstraintError::BoundOverflow {
            constraint: constraint.to_string(),
        })
    };

    if wildcard {
        let prefix = wildcard_range(&version, components, &inc)?;
        let range = match op {
            Op::Exact => prefix,
            Op::NotEqual => prefix.complement(),
            _ => {
                return Err(ConstraintError::WildcardNotAllowed {
                    op: op_str.to_string(),
                    constraint: constraint.to_string(),
                })
            }
        };
        return Ok(Clause { range, prerelease });
    }

    let range = match op {
        Op::Exact => Range::singleton(version),
        Op::NotEqual => Range::singleton(version).complement(),
        Op::Greater => Range::strictly_higher_than(version),
        Op::GreaterEq => Range::higher_than(version),
        Op::Less => Range::strictly_lower_than(lowest_of(&version)),
        Op::LessEq => Range::lower_than(version),
        Op::Caret => {
            // ^1.2.3 := >=1.2.3 <2.0.0
            // ^0.2.3 := >=0.2.3 <0.3.0
            // ^0.0.3 := >=0.0.3 <0.0.4
            // ^0.0   := >=0.0.0 <0.1.0
            let upper = if version.major > 0 || components == 1 {
                Version::new(inc(version.major)?, 0, 0)
            } else if version.minor > 0 || components == 2 {
                Version::new(0, inc(version.minor)?, 0)
            } else {
                Version::new(0, 0, inc(version.patch)?)
            };
            Range::between(version, lowest_of(&upper))
        }
        Op::Tilde => {
            // ~1.2.3 := >=1.2.3 <1.3.0, ~1 := >=1.0.0 <2.0.0
            let upper = if components >= 2 {
                Version::new(version.major, inc(version.minor)?, 0)
            } else {
                Version::new(inc(version.major)?, 0, 0)
            };
            Range::between(version, lowest_of(&upper))
        }
        Op::Compatible => {
            // ~=2.2 := >=2.2 <3.0, ~=1.4.5 := >=1.4.5 <1.5.0
            let upper = match components {
                0 | 1 => {
                    return Err(ConstraintError::CompatibleReleaseTooShort {
                        constraint: constraint.to_string(),
                    })
                }
                2 => Version::new(inc(version.major)?, 0, 0),
                _ => Version::new(version.major, inc(version.minor)?, 0),
            };
            Range::between(version, lowest_of(&upper))
        }
    };

    Ok(Clause { range, prerelease })
}

/// `1.2.*` := >=1.2.0 <1.3.0, `1.*` := >=1.0.0 <2.0.0
fn wildcard_range(
    version: &Version,
    components: usize,
    inc: impl Fn(u64) -> Result<u64, ConstraintError>,
) -> Result<Range<Version>, ConstraintError> {
    let lower = Version::new(version.major, version.minor, version.patch);
    let upper = match components {
        0 | 1 => Version::new(inc(version.major)?, 0, 0),
        2 => Version::new(version.major, inc(version.minor)?, 0),
        _ => Version::new(version.major, version.minor, inc(version.patch)?),
    };
    Ok(Range::between(lowest_of(&lower), lowest_of(&upper)))
}

/// The smallest version sharing this release, so that an exclusive upper
/// bound also excludes the release's pre-releases (`<2.0` rejects `2.0rc1`).
fn lowest_of(version: &Version) -> Version {
    if !version.pre.is_empty() || !version.build.is_empty() {
        return version.clone();
    }
    let mut lowest = version.clone();
    lowest.pre = Prerelease::new("0").unwrap_or(Prerelease::EMPTY);
    lowest
}

/// Number of release components written (`1.2` -> 2, `1.0rc1` -> 2).
fn release_components(version: &str) -> usize {
    version
        .trim()
        .trim_start_matches(['v', 'V'])
        .split('.')
        .take_while(|part| part.chars().next().is_some_and(|c| c.is_ascii_digit()))
        .count()
}
