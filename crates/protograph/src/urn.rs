//! URN addressing for protocol artifacts.
//!
//! Artifacts are addressed as
//! `urn:proto:<category>:<authority>[/<segment>...][@<version>][#<fragment>]`,
//! for example `urn:proto:api:acme/orders@1.2.0#GET./orders`.
//!
//! Everything in this module is pure and total: malformed input yields
//! `None` or `false`, never a panic.
//!
//! ## Identity
//!
//! Two URNs that differ only in version or fragment share an identity. The
//! [`normalize`] function computes that identity and is what the graph's
//! normalized-URN index is keyed by.
//!
//! ## Version ranges
//!
//! [`version_matches_range`] implements the familiar semver range dialect:
//!
//! | Range | Meaning |
//! |-------|---------|
//! | `*`, `x`, empty | any version |
//! | `1.2.3`, `=1.2.3` | exactly that version |
//! | `1.2`, `1.2.x` | `>=1.2.0 <1.3.0` |
//! | `^1.2.3` | `>=1.2.3 <2.0.0` (`^0.2.3` is `<0.3.0`) |
//! | `~1.2.3` | `>=1.2.3 <1.3.0` |
//! | `>=1.0.0 <2.0.0` | conjunction |
//! | `1.0.0 - 2.0.0` | inclusive hyphen range |
//! | `^1.0.0 \|\| ^2.0.0` | disjunction |

use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

/// Scheme prefix every artifact URN starts with.
pub const URN_PREFIX: &str = "urn:proto:";

/// Components of a parsed URN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedUrn {
    /// First path segment; groups artifacts owned by the same publisher
    pub authority: String,
    /// Artifact category (`api`, `data`, `event`, ...)
    pub category: String,
    /// Path after the authority, or the authority itself for single-segment paths
    pub name: String,
    /// Exact version, if present
    pub version: Option<String>,
    /// Fragment addressing a sub-element, if present
    pub fragment: Option<String>,
    path: String,
}

impl ParsedUrn {
    /// The full identifier path (`authority/name`).
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The URN without version or fragment.
    #[must_use]
    pub fn base(&self) -> String {
        format!("{URN_PREFIX}{}:{}", self.category, self.path)
    }
}

impl fmt::Display for ParsedUrn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{URN_PREFIX}{}:{}", self.category, self.path)?;
        if let Some(version) = &self.version {
            write!(f, "@{version}")?;
        }
        if let Some(fragment) = &self.fragment {
            write!(f, "#{fragment}")?;
        }
        Ok(())
    }
}

/// Parse a URN into its components.
///
/// Returns `None` if the URN does not match the grammar. The version, when
/// present, must be an exact version; ranges are only accepted by
/// [`split_version`] and [`version_matches_range`].
#[must_use]
pub fn parse(urn: &str) -> Option<ParsedUrn> {
    let urn = urn.trim();

    let (base, fragment) = match urn.split_once('#') {
        Some((_, "")) => return None,
        Some((base, fragment)) => (base, Some(fragment.to_string())),
        None => (urn, None),
    };

    let rest = base.strip_prefix(URN_PREFIX)?;
    let (category, path_and_version) = rest.split_once(':')?;
    if !is_valid_category(category) {
        return None;
    }

    let (path, version) = match path_and_version.split_once('@') {
        Some((path, version)) => {
            Version::parse(version)?;
            (path, Some(version.to_string()))
        }
        None => (path_and_version, None),
    };

    if path.is_empty() || !path.split('/').all(is_valid_segment) {
        return None;
    }

    let (authority, name) = match path.split_once('/') {
        Some((authority, name)) => (authority, name),
        None => (path, path),
    };

    Some(ParsedUrn {
        authority: authority.to_string(),
        category: category.to_string(),
        name: name.to_string(),
        version,
        fragment,
        path: path.to_string(),
    })
}

/// Check a URN against the grammar.
///
/// Fragment-suffixed URNs are validated by stripping the fragment and
/// validating the base.
#[must_use]
pub fn is_valid(urn: &str) -> bool {
    parse(urn).is_some()
}

/// Strip version and fragment, yielding the identity shared by every
/// version of an artifact.
///
/// Works lexically so it is defined for malformed input too.
#[must_use]
pub fn normalize(urn: &str) -> String {
    let base = urn.trim().split('#').next().unwrap_or_default();
    let base = base.split('@').next().unwrap_or_default();
    base.trim().to_string()
}

/// Split a URN reference into its normalized identity and the version or
/// range qualifier that follows `@`, if any.
///
/// Unlike [`parse`], the qualifier may be any range expression.
#[must_use]
pub fn split_version(urn: &str) -> (String, Option<String>) {
    let without_fragment = urn.trim().split('#').next().unwrap_or_default();
    match without_fragment.split_once('@') {
        Some((base, range)) if !range.trim().is_empty() => {
            (base.trim().to_string(), Some(range.trim().to_string()))
        }
        Some((base, _)) => (base.trim().to_string(), None),
        None => (without_fragment.trim().to_string(), None),
    }
}

/// The authority of a URN, or `None` for malformed input.
#[must_use]
pub fn authority(urn: &str) -> Option<String> {
    parse(urn).map(|p| p.authority)
}

/// Does `version` satisfy the semver `range`?
///
/// Returns `false` if either side cannot be parsed.
#[must_use]
pub fn version_matches_range(version: &str, range: &str) -> bool {
    let Some(version) = Version::parse(version) else {
        return false;
    };
    match Range::parse(range) {
        Some(range) => range.matches(&version),
        None => false,
    }
}

fn is_valid_category(category: &str) -> bool {
    let mut chars = category.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

// ============================================================================
// Versions
// ============================================================================

/// A semantic version. Build metadata is accepted and ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    /// Major component
    pub major: u64,
    /// Minor component
    pub minor: u64,
    /// Patch component
    pub patch: u64,
    /// Dot-separated pre-release identifiers
    pub pre: Vec<String>,
}

impl Version {
    /// Create a release version.
    #[must_use]
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: Vec::new(),
        }
    }

    /// Parse `MAJOR[.MINOR[.PATCH]][-PRE][+BUILD]`, with an optional leading `v`.
    /// Missing components default to zero.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        let partial = Partial::parse(input)?;
        if partial.has_wildcard {
            return None;
        }
        Some(partial.floor())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.pre.is_empty() {
            write!(f, "-{}", self.pre.join("."))?;
        }
        Ok(())
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| compare_pre(&self.pre, &other.pre))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn compare_pre(a: &[String], b: &[String]) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => return Ordering::Equal,
        // A pre-release sorts before its release
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        (false, false) => {}
    }
    for (x, y) in a.iter().zip(b) {
        let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            (Ok(_), Err(_)) => Ordering::Less,
            (Err(_), Ok(_)) => Ordering::Greater,
            (Err(_), Err(_)) => x.cmp(y),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

/// A possibly incomplete version as written in a range (`1`, `1.2`, `1.x`).
#[derive(Debug, Clone)]
struct Partial {
    major: Option<u64>,
    minor: Option<u64>,
    patch: Option<u64>,
    pre: Vec<String>,
    has_wildcard: bool,
}

impl Partial {
    fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        let input = input.strip_prefix('v').unwrap_or(input);
        if input.is_empty() {
            return None;
        }

        let input = input.split('+').next().unwrap_or_default();
        let (core, pre) = match input.split_once('-') {
            Some((core, pre)) => {
                let ids: Vec<String> = pre.split('.').map(str::to_string).collect();
                if ids
                    .iter()
                    .any(|id| id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'))
                {
                    return None;
                }
                (core, ids)
            }
            None => (input, Vec::new()),
        };

        let parts: Vec<&str> = core.split('.').collect();
        if parts.is_empty() || parts.len() > 3 {
            return None;
        }

        let mut numbers = [None, None, None];
        let mut has_wildcard = false;
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            if matches!(*part, "x" | "X" | "*") {
                has_wildcard = true;
                continue;
            }
            // `1.x.3` is not a meaningful range
            if has_wildcard || part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            *slot = Some(part.parse().ok()?);
        }

        if !pre.is_empty() && numbers.iter().any(Option::is_none) {
            return None;
        }

        Some(Self {
            major: numbers[0],
            minor: numbers[1],
            patch: numbers[2],
            pre,
            has_wildcard,
        })
    }

    fn is_full(&self) -> bool {
        self.major.is_some() && self.minor.is_some() && self.patch.is_some()
    }

    /// Lowest version the partial describes.
    fn floor(&self) -> Version {
        Version {
            major: self.major.unwrap_or(0),
            minor: self.minor.unwrap_or(0),
            patch: self.patch.unwrap_or(0),
            pre: self.pre.clone(),
        }
    }

    /// Smallest version above everything the partial describes, or `None`
    /// for a bare wildcard.
    fn ceiling(&self) -> Option<Version> {
        match (self.major, self.minor, self.patch) {
            (None, _, _) => None,
            (Some(major), None, _) => Some(Version::new(major.saturating_add(1), 0, 0)),
            (Some(major), Some(minor), None) => {
                Some(Version::new(major, minor.saturating_add(1), 0))
            }
            (Some(major), Some(minor), Some(patch)) => {
                Some(Version::new(major, minor, patch.saturating_add(1)))
            }
        }
    }
}

#[derive(Debug, Clone)]
enum Bound {
    Any,
    Eq(Version),
    Gt(Version),
    Gte(Version),
    Lt(Version),
    Lte(Version),
}

impl Bound {
    fn matches(&self, v: &Version) -> bool {
        match self {
            Self::Any => true,
            Self::Eq(b) => v == b,
            Self::Gt(b) => v > b,
            Self::Gte(b) => v >= b,
            Self::Lt(b) => v < b,
            Self::Lte(b) => v <= b,
        }
    }
}

/// A disjunction of conjunctions of bounds.
#[derive(Debug, Clone)]
struct Range {
    alternatives: Vec<Vec<Bound>>,
}

impl Range {
    fn parse(input: &str) -> Option<Self> {
        let alternatives = input
            .split("||")
            .map(parse_conjunction)
            .collect::<Option<Vec<_>>>()?;
        Some(Self { alternatives })
    }

    fn matches(&self, v: &Version) -> bool {
        self.alternatives
            .iter()
            .any(|bounds| bounds.iter().all(|b| b.matches(v)))
    }
}

fn parse_conjunction(input: &str) -> Option<Vec<Bound>> {
    let input = input.trim();
    if input.is_empty() {
        return Some(vec![Bound::Any]);
    }

    if let Some((low, high)) = input.split_once(" - ") {
        let low = Partial::parse(low)?;
        let high = Partial::parse(high)?;
        let mut bounds = vec![Bound::Gte(low.floor())];
        if high.is_full() {
            bounds.push(Bound::Lte(high.floor()));
        } else if let Some(ceiling) = high.ceiling() {
            bounds.push(Bound::Lt(ceiling));
        }
        return Some(bounds);
    }

    // Re-attach operators written with a space (`>= 1.0.0`)
    let mut tokens: Vec<String> = Vec::new();
    let mut pending_op = String::new();
    for token in input.split_whitespace() {
        if token.chars().all(|c| matches!(c, '<' | '>' | '=' | '^' | '~')) {
            pending_op.push_str(token);
        } else {
            tokens.push(format!("{pending_op}{token}"));
            pending_op.clear();
        }
    }
    if !pending_op.is_empty() {
        return None;
    }

    let mut bounds = Vec::new();
    for token in &tokens {
        bounds.extend(parse_comparator(token)?);
    }
    Some(bounds)
}

fn parse_comparator(token: &str) -> Option<Vec<Bound>> {
    const OPERATORS: [&str; 7] = [">=", "<=", ">", "<", "=", "^", "~"];

    let (op, rest) = OPERATORS
        .iter()
        .find_map(|op| token.strip_prefix(op).map(|rest| (*op, rest)))
        .unwrap_or(("", token));

    if matches!(rest, "*" | "x" | "X") {
        return Some(vec![Bound::Any]);
    }

    let partial = Partial::parse(rest)?;
    let floor = partial.floor();

    let bounds = match op {
        "" | "=" => {
            if partial.is_full() {
                vec![Bound::Eq(floor)]
            } else {
                range_of(&partial)
            }
        }
        ">" => {
            if partial.is_full() {
                vec![Bound::Gt(floor)]
            } else {
                match partial.ceiling() {
                    Some(ceiling) => vec![Bound::Gte(ceiling)],
                    // `>*` matches nothing
                    None => vec![Bound::Lt(Version::new(0, 0, 0)), Bound::Gt(Version::new(0, 0, 0))],
                }
            }
        }
        ">=" => vec![Bound::Gte(floor)],
        "<" => vec![Bound::Lt(floor)],
        "<=" => {
            if partial.is_full() {
                vec![Bound::Lte(floor)]
            } else {
                match partial.ceiling() {
                    Some(ceiling) => vec![Bound::Lt(ceiling)],
                    None => vec![Bound::Any],
                }
            }
        }
        "^" => {
            let upper = match (partial.major, partial.minor, partial.patch) {
                (Some(0), Some(0), Some(patch)) => Some(Version::new(0, 0, patch.saturating_add(1))),
                (Some(0), Some(minor), _) => Some(Version::new(0, minor.saturating_add(1), 0)),
                (Some(major), _, _) => Some(Version::new(major.saturating_add(1), 0, 0)),
                (None, _, _) => None,
            };
            with_upper(floor, upper)
        }
        "~" => {
            let upper = match (partial.major, partial.minor) {
                (Some(major), Some(minor)) => Some(Version::new(major, minor.saturating_add(1), 0)),
                (Some(major), None) => Some(Version::new(major.saturating_add(1), 0, 0)),
                (None, _) => None,
            };
            with_upper(floor, upper)
        }
        _ => return None,
    };
    Some(bounds)
}

fn range_of(partial: &Partial) -> Vec<Bound> {
    with_upper(partial.floor(), partial.ceiling())
}

fn with_upper(floor: Version, upper: Option<Version>) -> Vec<Bound> {
    match upper {
        Some(upper) => vec![Bound::Gte(floor), Bound::Lt(upper)],
        None => vec![Bound::Any],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[test]
    fn parse_extracts_all_components() {
        let parsed = parse("urn:proto:api:acme/orders@1.2.0#GET./orders").unwrap();

        assert_eq!(parsed.category, "api");
        assert_eq!(parsed.authority, "acme");
        assert_eq!(parsed.name, "orders");
        assert_eq!(parsed.version.as_deref(), Some("1.2.0"));
        assert_eq!(parsed.fragment.as_deref(), Some("GET./orders"));
        assert_eq!(parsed.base(), "urn:proto:api:acme/orders");
    }

    #[test]
    fn single_segment_path_is_its_own_authority() {
        let parsed = parse("urn:proto:api:x@1.0.0").unwrap();
        assert_eq!(parsed.authority, "x");
        assert_eq!(parsed.name, "x");
    }

    #[rstest]
    #[case::plain("urn:proto:data:acme/users")]
    #[case::versioned("urn:proto:event:acme/user.created@2.1.0")]
    #[case::partial_version("urn:proto:api:acme/orders@1.2")]
    #[case::prerelease("urn:proto:api:acme/orders@1.0.0-beta.1")]
    #[case::fragment("urn:proto:api:acme/orders@1.0.0#GET./orders")]
    #[case::hyphen_category("urn:proto:api-endpoint:acme/orders.list")]
    fn valid_urns(#[case] urn: &str) {
        assert!(is_valid(urn), "{urn} should be valid");
    }

    #[rstest]
    #[case::empty("")]
    #[case::wrong_scheme("urn:other:api:acme/orders")]
    #[case::missing_path("urn:proto:api:")]
    #[case::uppercase_category("urn:proto:API:acme/orders")]
    #[case::empty_segment("urn:proto:api:acme//orders")]
    #[case::range_version("urn:proto:api:acme/orders@^1.0.0")]
    #[case::empty_fragment("urn:proto:api:acme/orders#")]
    #[case::space("urn:proto:api:acme/my orders")]
    fn invalid_urns(#[case] urn: &str) {
        assert!(!is_valid(urn), "{urn} should be invalid");
        assert!(parse(urn).is_none());
    }

    #[test]
    fn normalize_strips_version_and_fragment() {
        assert_eq!(
            normalize("urn:proto:api:acme/orders@1.2.0#GET./orders"),
            "urn:proto:api:acme/orders"
        );
        assert_eq!(
            normalize("urn:proto:api:acme/orders"),
            "urn:proto:api:acme/orders"
        );
    }

    #[test]
    fn split_version_keeps_ranges() {
        let (base, range) = split_version("urn:proto:api:acme/orders@>=1.0.0 <2.0.0");
        assert_eq!(base, "urn:proto:api:acme/orders");
        assert_eq!(range.as_deref(), Some(">=1.0.0 <2.0.0"));

        let (_, range) = split_version("urn:proto:api:acme/orders");
        assert!(range.is_none());
    }

    #[rstest]
    #[case("1.2.3", "1.2.3", true)]
    #[case("1.2.4", "1.2.3", false)]
    #[case("1.2.9", "1.2", true)]
    #[case("1.3.0", "1.2.x", false)]
    #[case("1.9.0", "^1.2.3", true)]
    #[case("2.0.0", "^1.2.3", false)]
    #[case("0.2.9", "^0.2.3", true)]
    #[case("0.3.0", "^0.2.3", false)]
    #[case("1.2.9", "~1.2.3", true)]
    #[case("1.3.0", "~1.2.3", false)]
    #[case("1.5.0", ">=1.0.0 <2.0.0", true)]
    #[case("2.0.0", ">=1.0.0 <2.0.0", false)]
    #[case("1.5.0", ">= 1.0.0", true)]
    #[case("2.0.0", "1.0.0 - 2.0.0", true)]
    #[case("2.0.5", "1.0.0 - 2.0", true)]
    #[case("2.1.0", "1.0.0 - 2.0", false)]
    #[case("3.0.0", "1.0.0 - 2", false)]
    #[case("2.3.0", "^1.0.0 || ^2.0.0", true)]
    #[case("9.9.9", "*", true)]
    #[case("1.0.0-beta", "<1.0.0", true)]
    #[case("1.3.0", ">1.2", true)]
    #[case("1.2.5", ">1.2", false)]
    #[case("not-a-version", "*", false)]
    #[case("1.0.0", ">=garbage", false)]
    fn range_matching(#[case] version: &str, #[case] range: &str, #[case] expected: bool) {
        assert_eq!(
            version_matches_range(version, range),
            expected,
            "{version} vs {range}"
        );
    }

    #[test]
    fn prerelease_ordering_follows_semver() {
        let alpha = Version::parse("1.0.0-alpha").unwrap();
        let alpha1 = Version::parse("1.0.0-alpha.1").unwrap();
        let beta = Version::parse("1.0.0-beta").unwrap();
        let release = Version::parse("1.0.0").unwrap();

        assert!(alpha < alpha1);
        assert!(alpha1 < beta);
        assert!(beta < release);
    }

    proptest! {
        #[test]
        fn parse_and_match_never_panic(input in "\\PC*", range in "\\PC*") {
            let _ = parse(&input);
            let _ = normalize(&input);
            let _ = split_version(&input);
            let _ = version_matches_range(&input, &range);
        }

        #[test]
        fn normalized_valid_urn_stays_valid(
            category in "[a-z][a-z0-9-]{0,8}",
            authority in "[a-z0-9]{1,8}",
            name in "[a-z0-9._-]{1,12}",
            major in 0u64..20,
            minor in 0u64..20,
        ) {
            let urn = format!("urn:proto:{category}:{authority}/{name}@{major}.{minor}.0");
            prop_assert!(is_valid(&urn));
            let base = normalize(&urn);
            prop_assert!(is_valid(&base));
            prop_assert_eq!(normalize(&base), base.clone());
        }
    }
}
