//! Namespaced Identifier (NSID) parsing.
//!
//! Stored as `SmolStr` since most NSIDs are short, mirroring how small
//! atproto identifiers are generally kept in this codebase.

use smol_str::SmolStr;
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

use crate::error::XrpcErrorKind;

/// A validated namespace identifier, e.g. `com.example.getFoo`.
#[derive(Clone, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Nsid(SmolStr);

impl Nsid {
    /// Validate a bare NSID string (no `/xrpc/` prefix, no query string).
    pub fn new(s: impl AsRef<str>) -> Result<Self, XrpcErrorKind> {
        let s = s.as_ref();
        if !is_valid_nsid(s) {
            return Err(XrpcErrorKind::invalid_request(format!(
                "invalid nsid: {s}"
            )));
        }
        Ok(Self(SmolStr::new(s)))
    }

    /// Infallible constructor for statically known-valid NSIDs. Panics on
    /// an invalid literal, which is a programmer error, not a request error.
    pub fn raw(s: &str) -> Self {
        assert!(is_valid_nsid(s), "invalid NSID literal: {s}");
        Self(SmolStr::new(s))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// The authority portion, e.g. `com.example` out of `com.example.getFoo`.
    pub fn domain_authority(&self) -> &str {
        let split = self.0.rfind('.').expect("enforced by constructor");
        &self.0[..split]
    }

    /// The name segment, e.g. `getFoo` out of `com.example.getFoo`.
    pub fn name(&self) -> &str {
        let split = self.0.rfind('.').expect("enforced by constructor");
        &self.0[split + 1..]
    }
}

/// Validate an NSID in isolation (no path wrapper), using the same segment
/// rules the path scanner in [`parse_xrpc_path`] enforces, but over the
/// whole string rather than stopping at `/` or `?`.
fn is_valid_nsid(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }
    let bytes = s.as_bytes();
    let mut i = 0usize;
    let mut prev_alnum = false;
    let mut dots = 0usize;
    while i < bytes.len() {
        let b = bytes[i];
        if b.is_ascii_alphanumeric() {
            prev_alnum = true;
        } else if b == b'-' || b == b'.' {
            if !prev_alnum {
                return false;
            }
            if b == b'.' {
                dots += 1;
            }
            prev_alnum = false;
        } else {
            return false;
        }
        i += 1;
    }
    // must end on an alphanumeric (no trailing '-' or '.')
    if !prev_alnum {
        return false;
    }
    // minimum two segments means at least one '.'
    dots >= 1 && s.len() >= 2
}

/// Parse an NSID out of a request path of the form `/xrpc/<nsid>`, optionally
/// followed by a trailing `/` and/or a `?query`.
///
/// Implements the byte-scan algorithm directly rather than a regex: accept
/// `[0-9A-Za-z]` unconditionally; accept `-`/`.` only directly after an
/// alphanumeric byte (no leading, trailing, or consecutive separators); a
/// single `/` is accepted only when it is immediately followed by
/// end-of-string or `?`; `?` terminates the scan.
pub fn parse_xrpc_path(input: &str) -> Result<Nsid, XrpcErrorKind> {
    let path = extract_pathname(input);
    const PREFIX: &str = "/xrpc/";
    if !path.starts_with(PREFIX) {
        return Err(invalid_path());
    }
    let bytes = path.as_bytes();
    let mut i = PREFIX.len();
    let start = i;
    let mut prev_alnum = false;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'?' {
            break;
        }
        if b.is_ascii_alphanumeric() {
            prev_alnum = true;
            i += 1;
            continue;
        }
        if (b == b'-' || b == b'.') && prev_alnum {
            prev_alnum = false;
            i += 1;
            continue;
        }
        if b == b'/' {
            let next_is_end = i + 1 == bytes.len();
            let next_is_query = bytes.get(i + 1) == Some(&b'?');
            if next_is_end || next_is_query {
                break;
            }
            return Err(invalid_path());
        }
        return Err(invalid_path());
    }
    if !prev_alnum {
        return Err(invalid_path());
    }
    let nsid_str = &path[start..i];
    if nsid_str.len() < 2 {
        return Err(invalid_path());
    }
    Ok(Nsid(SmolStr::new(nsid_str)))
}

fn invalid_path() -> XrpcErrorKind {
    XrpcErrorKind::invalid_request("invalid xrpc path")
}

fn extract_pathname(input: &str) -> &str {
    if let Some(rest) = input
        .strip_prefix("http://")
        .or_else(|| input.strip_prefix("https://"))
    {
        let start = rest.find('/').unwrap_or(rest.len());
        &rest[start..]
    } else {
        input
    }
}

impl FromStr for Nsid {
    type Err = XrpcErrorKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for Nsid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Nsid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nsid({})", self.0)
    }
}

impl AsRef<str> for Nsid {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Deref for Nsid {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl<'de> serde::Deserialize<'de> for Nsid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value: SmolStr = serde::Deserialize::deserialize(deserializer)?;
        if !is_valid_nsid(&value) {
            return Err(serde::de::Error::custom(format!(
                "invalid nsid: {value}"
            )));
        }
        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_two_segment_nsid() {
        let nsid = parse_xrpc_path("/xrpc/a.b").unwrap();
        assert_eq!(nsid.as_str(), "a.b");
    }

    #[test]
    fn parses_with_trailing_slash() {
        let nsid = parse_xrpc_path("/xrpc/com.example.foo/").unwrap();
        assert_eq!(nsid.as_str(), "com.example.foo");
    }

    #[test]
    fn parses_with_query_string() {
        let nsid = parse_xrpc_path("/xrpc/com.example.foo?message=hi").unwrap();
        assert_eq!(nsid.as_str(), "com.example.foo");
    }

    #[test]
    fn parses_with_trailing_slash_and_query() {
        let nsid = parse_xrpc_path("/xrpc/com.example.foo/?message=hi").unwrap();
        assert_eq!(nsid.as_str(), "com.example.foo");
    }

    #[test]
    fn parses_full_url() {
        let nsid = parse_xrpc_path("https://example.com/xrpc/com.example.foo").unwrap();
        assert_eq!(nsid.as_str(), "com.example.foo");
    }

    #[test]
    fn rejects_missing_prefix() {
        assert!(parse_xrpc_path("/foo/com.example.foo").is_err());
    }

    #[test]
    fn rejects_single_segment() {
        assert!(parse_xrpc_path("/xrpc/a").is_err());
    }

    #[test]
    fn rejects_leading_hyphen_or_dot() {
        assert!(parse_xrpc_path("/xrpc/.foo").is_err());
        assert!(parse_xrpc_path("/xrpc/-foo.bar").is_err());
    }

    #[test]
    fn rejects_consecutive_separators() {
        assert!(parse_xrpc_path("/xrpc/foo..bar").is_err());
        assert!(parse_xrpc_path("/xrpc/foo.-bar").is_err());
    }

    #[test]
    fn rejects_trailing_hyphen_or_dot() {
        assert!(parse_xrpc_path("/xrpc/foo.bar.").is_err());
        assert!(parse_xrpc_path("/xrpc/foo.bar-").is_err());
    }

    #[test]
    fn rejects_embedded_slash() {
        assert!(parse_xrpc_path("/xrpc/foo.bar/baz").is_err());
    }

    #[test]
    fn round_trips_arbitrary_valid_nsids() {
        for s in ["a.bb", "com.example.foo", "io.example.getFooBar123"] {
            let path = format!("/xrpc/{s}");
            let nsid = parse_xrpc_path(&path).unwrap();
            assert_eq!(nsid.as_str(), s);
        }
    }

    #[test]
    fn nsid_new_validates_standalone_strings() {
        assert!(Nsid::new("com.example.foo").is_ok());
        assert!(Nsid::new("a.b").is_ok());
        assert!(Nsid::new("nodothere").is_err());
        assert!(Nsid::new("").is_err());
    }

    #[test]
    fn domain_and_name_split() {
        let nsid = Nsid::new("com.example.fooBar").unwrap();
        assert_eq!(nsid.domain_authority(), "com.example");
        assert_eq!(nsid.name(), "fooBar");
    }
}
