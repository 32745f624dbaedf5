//! Object key validation and composition.
//!
//! Keys are `/`-separated strings, not filesystem paths, so they are handled
//! as strings throughout: a key built on Windows must be identical to one
//! built on Linux.

use crate::error::{ErrorKind, Result};

/// Validates an object key and returns its normalized form.
///
/// Empty segments and `.` are dropped, `..` pops the previous segment and
/// may never climb above the bucket root. Null bytes are rejected.
///
/// # Examples
///
/// ```
/// use shoebox_storage::validate_key;
/// // Valid keys
/// assert!(validate_key("Photos/2024/IMG_0001.CR2").is_ok());
/// assert!(validate_key("a/../b.jpg").is_ok()); // (never leaves bucket root)
/// // Invalid keys
/// assert!(validate_key("../escape.jpg").is_err());
/// assert!(validate_key("a\0b").is_err());
/// // Keys get resolved
/// assert_eq!(validate_key("Photos//./2024/x.jpg/").unwrap(), "Photos/2024/x.jpg");
/// ```
pub fn validate(key: &str) -> Result<String> {
    let mut segments: Vec<&str> = Vec::new();
    for segment in key.split('/') {
        match segment {
            "" | "." => {},
            ".." => {
                if segments.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidKey(key.to_string()));
                }
            },
            s if s.contains('\0') => exn::bail!(ErrorKind::InvalidKey(key.to_string())),
            s => segments.push(s),
        }
    }
    match segments.is_empty() {
        true => exn::bail!(ErrorKind::InvalidKey(key.to_string())),
        false => Ok(segments.join("/")),
    }
}

/// Joins a key prefix and a relative key with exactly one `/` between them.
pub fn join(prefix: &str, relative: &str) -> Result<String> {
    let prefix = prefix.trim_end_matches('/');
    match prefix.is_empty() {
        true => validate(relative),
        false => validate(&format!("{prefix}/{relative}")),
    }
}

/// Strips `prefix/` from the front of a listed key.
///
/// Returns `None` for keys that don't live under the prefix, including the
/// bare prefix itself (some providers list "folder" placeholder objects).
pub fn strip_prefix<'a>(prefix: &str, key: &'a str) -> Option<&'a str> {
    let prefix = prefix.trim_end_matches('/');
    let rest = match prefix.is_empty() {
        true => key,
        false => key.strip_prefix(prefix)?.strip_prefix('/')?,
    };
    match rest.is_empty() {
        true => None,
        false => Some(rest),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Photos/IMG_0001.jpg", "Photos/IMG_0001.jpg")]
    #[case("a/b/c/clip.mp4", "a/b/c/clip.mp4")]
    #[case("single.nef", "single.nef")]
    #[case("a//b//c.jpg", "a/b/c.jpg")]
    #[case("a/./b/./c.jpg", "a/b/c.jpg")]
    #[case("/leading/slash.jpg", "leading/slash.jpg")]
    #[case("trailing/", "trailing")]
    #[case("a/b/..", "a")]
    #[case("dots..in..name.jpg", "dots..in..name.jpg")]
    fn test_valid_keys(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(validate(input).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case(".")]
    #[case("//")]
    #[case("..")]
    #[case("../etc/passwd")]
    #[case("a/../../b")]
    #[case("a\0b")]
    fn test_invalid_keys(#[case] input: &str) {
        let err = validate(input).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidKey(_)));
    }

    #[rstest]
    #[case("Photos", "2024/a.jpg", "Photos/2024/a.jpg")]
    #[case("Photos/", "2024/a.jpg", "Photos/2024/a.jpg")]
    #[case("", "a.jpg", "a.jpg")]
    #[case("Photos", "1700000000000_a.jpg", "Photos/1700000000000_a.jpg")]
    fn test_join(#[case] prefix: &str, #[case] relative: &str, #[case] expected: &str) {
        assert_eq!(join(prefix, relative).unwrap(), expected);
    }

    #[rstest]
    #[case("Photos", "Photos/2024/a.jpg", Some("2024/a.jpg"))]
    #[case("Photos/", "Photos/a.jpg", Some("a.jpg"))]
    #[case("Photos", "PhotosExtra/a.jpg", None)]
    #[case("Photos", "Photos/", None)]
    #[case("Photos", "Other/a.jpg", None)]
    #[case("", "a.jpg", Some("a.jpg"))]
    fn test_strip_prefix(#[case] prefix: &str, #[case] key: &str, #[case] expected: Option<&str>) {
        assert_eq!(strip_prefix(prefix, key), expected);
    }
}
