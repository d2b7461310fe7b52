//! Version parsing for manifest version strings.
//!
//! Manifests carry PEP 440 style versions (`1.2`, `1.0.0rc1`, `0.12.1.post1`).
//! They are mapped onto semver so the rest of the crate can order and range
//! them with one version type:
//!
//! - missing release components default to zero (`1.2` -> `1.2.0`)
//! - pre-releases become a semver pre-release (`1.0rc1` -> `1.0.0-rc.1`)
//! - dev releases of a final release sort below its pre-releases
//!   (`1.0.dev3` -> `1.0.0-0.dev.3`); dev releases of a pre- or post-release
//!   (`1.0rc1.dev2`, `1.0.post1.dev2`) have no faithful ordering and are rejected
//! - post releases and local labels become build metadata, which semver
//!   orders after the plain release (`1.0.post1` -> `1.0.0+post.1`)

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use semver::{BuildMetadata, Prerelease, Version};
use thiserror::Error;

/// Suffix grammar after the numeric release segment.
static SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)^
        (?:[-_.]?(?P<pre_l>alpha|beta|preview|pre|rc|a|b|c)[-_.]?(?P<pre_n>\d+)?)?
        (?:-(?P<post_n1>\d+)|[-_.]?(?P<post_l>post|rev|r)[-_.]?(?P<post_n2>\d+)?)?
        (?:[-_.]?(?P<dev_l>dev)[-_.]?(?P<dev_n>\d+)?)?
        (?:\+(?P<local>[a-z0-9]+(?:[-_.][a-z0-9]+)*))?
        $",
    )
    .unwrap()
});

/// Error parsing a version string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("version string is empty")]
    Empty,

    #[error("invalid version `{0}`")]
    Invalid(String),

    #[error("version `{0}` uses an epoch, which is not supported")]
    Epoch(String),

    #[error("version `{0}` has more than three release components")]
    TooManyComponents(String),

    #[error("version `{0}` is a dev release of a pre- or post-release, which is not supported")]
    NestedDevRelease(String),

    #[error("version `{0}` cannot be bumped past the largest component value")]
    Overflow(String),
}

/// Parse a version string, allowing for incomplete versions and PEP 440 suffixes.
pub fn parse_version(input: &str) -> Result<Version, VersionError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(VersionError::Empty);
    }

    let s = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);

    if s.contains('!') {
        return Err(VersionError::Epoch(input.to_string()));
    }

    // Plain semver needs no translation
    if let Ok(v) = Version::parse(s) {
        return Ok(v);
    }

    let lower = s.to_ascii_lowercase();
    let release_end = lower
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(lower.len());
    let (release, suffix) = lower.split_at(release_end);

    // `1.0.post1` splits as `1.0.` + `post1`
    let release = release.strip_suffix('.').unwrap_or(release);
    let (major, minor, patch) = parse_release(release, input)?;

    let caps = SUFFIX_RE
        .captures(suffix)
        .ok_or_else(|| VersionError::Invalid(input.to_string()))?;

    let number = |name: &str| -> u64 {
        caps.name(name)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    };

    let has_post = caps.name("post_n1").is_some() || caps.name("post_l").is_some();
    if caps.name("dev_l").is_some() && (caps.name("pre_l").is_some() || has_post) {
        return Err(VersionError::NestedDevRelease(input.to_string()));
    }

    let mut pre = Vec::new();
    if let Some(label) = caps.name("pre_l") {
        pre.push(normalize_pre_label(label.as_str()).to_string());
        pre.push(number("pre_n").to_string());
    }
    if caps.name("dev_l").is_some() {
        pre.push("0".to_string());
        pre.push("dev".to_string());
        pre.push(number("dev_n").to_string());
    }

    let mut build = Vec::new();
    if caps.name("post_n1").is_some() {
        build.push("post".to_string());
        build.push(number("post_n1").to_string());
    } else if caps.name("post_l").is_some() {
        build.push("post".to_string());
        build.push(number("post_n2").to_string());
    }
    if let Some(local) = caps.name("local") {
        build.push("local".to_string());
        build.extend(
            local
                .as_str()
                .split(['-', '_', '.'])
                .map(str::to_string),
        );
    }

    let mut version = Version::new(major, minor, patch);
    if !pre.is_empty() {
        version.pre = Prerelease::new(&pre.join("."))
            .map_err(|_| VersionError::Invalid(input.to_string()))?;
    }
    if !build.is_empty() {
        version.build = BuildMetadata::new(&build.join("."))
            .map_err(|_| VersionError::Invalid(input.to_string()))?;
    }

    Ok(version)
}

/// Parse a version string, returning `None` when it is not a version.
pub fn parse_version_lenient(s: &str) -> Option<Version> {
    parse_version(s).ok()
}

fn parse_release(release: &str, input: &str) -> Result<(u64, u64, u64), VersionError> {
    let parts: Vec<&str> = release.split('.').collect();
    if parts.len() > 3 {
        return Err(VersionError::TooManyComponents(input.to_string()));
    }

    let mut nums = [0u64; 3];
    for (i, part) in parts.iter().enumerate() {
        nums[i] = part
            .parse()
            .map_err(|_| VersionError::Invalid(input.to_string()))?;
    }

    Ok((nums[0], nums[1], nums[2]))
}

fn normalize_pre_label(label: &str) -> &'static str {
    match label {
        "a" | "alpha" => "a",
        "b" | "beta" => "b",
        _ => "rc",
    }
}

/// Render a version the way it is written in a manifest.
///
/// Inverse of [`parse_version`] for the shapes it produces.
pub fn format_version(version: &Version) -> String {
    let mut out = format!("{}.{}.{}", version.major, version.minor, version.patch);

    let pre: Vec<&str> = if version.pre.is_empty() {
        Vec::new()
    } else {
        version.pre.as_str().split('.').collect()
    };
    let mut rest = pre.as_slice();
    let mut dev = None;

    match rest {
        ["0", "dev", n] => {
            dev = Some(*n);
            rest = &[];
        }
        [label @ ("a" | "b" | "rc"), n, tail @ ..] => {
            out.push_str(label);
            out.push_str(n);
            rest = tail;
        }
        _ => {}
    }
    if let ["dev", n] = rest {
        dev = Some(*n);
        rest = &[];
    }
    if !rest.is_empty() {
        // Not one of ours; keep the semver spelling
        out.push('-');
        out.push_str(&rest.join("."));
    }

    let build: Vec<&str> = if version.build.is_empty() {
        Vec::new()
    } else {
        version.build.as_str().split('.').collect()
    };
    let mut build_rest = build.as_slice();
    if let ["post", n, tail @ ..] = build_rest {
        out.push_str(".post");
        out.push_str(n);
        build_rest = tail;
    }
    if let Some(n) = dev {
        out.push_str(".dev");
        out.push_str(n);
    }
    match build_rest {
        [] => {}
        ["local", local @ ..] => {
            out.push('+');
            out.push_str(&local.join("."));
        }
        other => {
            out.push('+');
            out.push_str(&other.join("."));
        }
    }

    out
}

/// Which component of a version to bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BumpLevel {
    Major,
    Minor,
    Patch,
    /// Next release candidate (`0.2.0` -> `0.2.1rc1`, `0.2.1rc1` -> `0.2.1rc2`)
    Prerelease,
}

impl fmt::Display for BumpLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BumpLevel::Major => write!(f, "major"),
            BumpLevel::Minor => write!(f, "minor"),
            BumpLevel::Patch => write!(f, "patch"),
            BumpLevel::Prerelease => write!(f, "prerelease"),
        }
    }
}

impl std::str::FromStr for BumpLevel {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "major" => Ok(BumpLevel::Major),
            "minor" => Ok(BumpLevel::Minor),
            "patch" => Ok(BumpLevel::Patch),
            "prerelease" | "pre" | "rc" => Ok(BumpLevel::Prerelease),
            _ => Err(VersionError::Invalid(s.to_string())),
        }
    }
}

/// Compute the next version for a bump level.
///
/// Bumping a pre-release with `Patch` finalizes it instead of skipping ahead,
/// and `Prerelease` stays on the pending release.
pub fn bump(version: &Version, level: BumpLevel) -> Result<Version, VersionError> {
    let overflow = || VersionError::Overflow(format_version(version));
    let inc = |n: u64| n.checked_add(1).ok_or_else(overflow);

    let next = match level {
        BumpLevel::Major => Version::new(inc(version.major)?, 0, 0),
        BumpLevel::Minor => Version::new(version.major, inc(version.minor)?, 0),
        BumpLevel::Patch => {
            if version.pre.is_empty() {
                Version::new(version.major, version.minor, inc(version.patch)?)
            } else {
                Version::new(version.major, version.minor, version.patch)
            }
        }
        BumpLevel::Prerelease => {
            let parts: Vec<&str> = if version.pre.is_empty() {
                Vec::new()
            } else {
                version.pre.as_str().split('.').collect()
            };
            let next_pre = match parts.as_slice() {
                [] => None,
                [label @ ("a" | "b" | "rc"), n, ..] => match n.parse::<u64>() {
                    Ok(n) => Some(format!("{}.{}", label, inc(n)?)),
                    Err(_) => Some("rc.1".to_string()),
                },
                // dev and semver-style pre-releases move to the first candidate
                _ => Some("rc.1".to_string()),
            };

            let same_release = next_pre.and_then(|pre| {
                let mut next = Version::new(version.major, version.minor, version.patch);
                next.pre = Prerelease::new(&pre).ok()?;
                Some(next).filter(|next| next > version)
            });

            match same_release {
                Some(next) => next,
                None => {
                    let mut next =
                        Version::new(version.major, version.minor, inc(version.patch)?);
                    next.pre = Prerelease::new("rc.1").unwrap_or(Prerelease::EMPTY);
                    next
                }
            }
        }
    };

    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version_lenient() {
        assert_eq!(parse_version_lenient("1"), Some(Version::new(1, 0, 0)));
        assert_eq!(parse_version_lenient("1.2"), Some(Version::new(1, 2, 0)));
        assert_eq!(parse_version_lenient("1.2.3"), Some(Version::new(1, 2, 3)));
        assert_eq!(parse_version_lenient("v0.2.0"), Some(Version::new(0, 2, 0)));
        assert_eq!(parse_version_lenient("banana"), None);
    }

    #[test]
    fn test_pep440_prerelease() {
        let v = parse_version("1.0rc1").unwrap();
        assert_eq!(v.to_string(), "1.0.0-rc.1");
        assert!(v < Version::new(1, 0, 0));

        let alpha = parse_version("2.0.0alpha2").unwrap();
        assert_eq!(alpha.pre.as_str(), "a.2");
        assert!(alpha < parse_version("2.0.0b1").unwrap());
        assert!(parse_version("2.0.0b1").unwrap() < parse_version("2.0.0rc1").unwrap());
    }

    #[test]
    fn test_pep440_post_and_dev() {
        let post = parse_version("0.12.1.post1").unwrap();
        assert!(post > Version::new(0, 12, 1));
        assert!(post < Version::new(0, 12, 2));

        let dev = parse_version("1.0.dev3").unwrap();
        assert!(dev < parse_version("1.0a1").unwrap());
        assert!(dev < Version::new(1, 0, 0));
    }

    #[test]
    fn test_dev_of_pre_or_post_release_is_rejected() {
        assert!(matches!(
            parse_version("1.0rc1.dev2"),
            Err(VersionError::NestedDevRelease(_))
        ));
        assert!(matches!(
            parse_version("1.0.post1.dev2"),
            Err(VersionError::NestedDevRelease(_))
        ));
        assert!(parse_version("1.0.dev2").is_ok());
    }

    #[test]
    fn test_rejected_versions() {
        assert_eq!(parse_version(""), Err(VersionError::Empty));
        assert!(matches!(parse_version("1!2.0"), Err(VersionError::Epoch(_))));
        assert!(matches!(
            parse_version("1.2.3.4"),
            Err(VersionError::TooManyComponents(_))
        ));
        assert!(parse_version("1.x").is_err());
    }

    #[test]
    fn test_format_version() {
        for s in ["0.2.0", "1.0.0rc1", "1.2.0a3", "0.12.1.post1", "1.0.0.dev3", "1.0.0+ubuntu.1"] {
            let v = parse_version(s).unwrap();
            assert_eq!(format_version(&v), s);
        }
    }

    #[test]
    fn test_bump_levels() {
        let v = Version::new(0, 2, 0);
        assert_eq!(bump(&v, BumpLevel::Major).unwrap(), Version::new(1, 0, 0));
        assert_eq!(bump(&v, BumpLevel::Minor).unwrap(), Version::new(0, 3, 0));
        assert_eq!(bump(&v, BumpLevel::Patch).unwrap(), Version::new(0, 2, 1));

        let rc = bump(&v, BumpLevel::Prerelease).unwrap();
        assert_eq!(format_version(&rc), "0.2.1rc1");
        let rc2 = bump(&rc, BumpLevel::Prerelease).unwrap();
        assert_eq!(format_version(&rc2), "0.2.1rc2");
        assert_eq!(bump(&rc2, BumpLevel::Patch).unwrap(), Version::new(0, 2, 1));
    }

    #[test]
    fn test_prerelease_bump_stays_on_pending_release() {
        let dev = parse_version("1.0.0.dev3").unwrap();
        let next = bump(&dev, BumpLevel::Prerelease).unwrap();
        assert_eq!(format_version(&next), "1.0.0rc1");
        assert!(next > dev);

        let beta = Version::parse("1.0.0-beta").unwrap();
        let next = bump(&beta, BumpLevel::Prerelease).unwrap();
        assert_eq!(format_version(&next), "1.0.0rc1");
        assert!(next > beta);

        // rc.1 would not be newer here
        let zeta = Version::parse("1.0.0-zeta").unwrap();
        let next = bump(&zeta, BumpLevel::Prerelease).unwrap();
        assert_eq!(format_version(&next), "1.0.1rc1");
    }

    #[test]
    fn test_bump_overflow_is_an_error() {
        let v = Version::new(u64::MAX, 0, 0);
        assert!(matches!(
            bump(&v, BumpLevel::Major),
            Err(VersionError::Overflow(_))
        ));
        assert_eq!(
            bump(&v, BumpLevel::Minor).unwrap(),
            Version::new(u64::MAX, 1, 0)
        );
    }

    #[test]
    fn test_bump_level_from_str() {
        assert_eq!("Minor".parse::<BumpLevel>().unwrap(), BumpLevel::Minor);
        assert_eq!("rc".parse::<BumpLevel>().unwrap(), BumpLevel::Prerelease);
        assert!("huge".parse::<BumpLevel>().is_err());
    }
}
