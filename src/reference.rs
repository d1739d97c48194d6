//! repository reference parsing and normalization
//!
//! a reference has the shape `domain/path[:tag][@digest]`. short names are
//! expanded the way container registries expect: `foo` becomes
//! `docker.io/library/foo`, `user/foo` becomes `docker.io/user/foo`.

use std::fmt;

use crate::digest::Digest;
use crate::error::{Error, Result};

pub const DEFAULT_DOMAIN: &str = "docker.io";
const LEGACY_DEFAULT_DOMAIN: &str = "index.docker.io";
pub const OFFICIAL_REPO_PREFIX: &str = "library/";
const NAME_TOTAL_LENGTH_MAX: usize = 255;
const TAG_LENGTH_MAX: usize = 128;

/// a parsed, fully qualified repository reference
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Named {
    domain: String,
    path: String,
    tag: Option<String>,
    digest: Option<Digest>,
}

impl Named {
    /// canonical repository name (`domain/path`)
    pub fn name(&self) -> String {
        format!("{}/{}", self.domain, self.path)
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&Digest> {
        self.digest.as_ref()
    }
}

impl fmt::Display for Named {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.domain, self.path)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

/// parse a possibly short name into a fully qualified reference
///
/// a malformed digest suffix is reported as `InvalidDigest`, every other
/// problem as `InvalidName`.
pub fn parse_normalized_named(s: &str) -> Result<Named> {
    if is_full_identifier(s) {
        return Err(Error::invalid_name(
            s,
            "cannot specify 64-byte hexadecimal strings",
        ));
    }

    let (domain, remainder) = split_docker_domain(s);
    let remote_name = remainder.split(':').next().unwrap_or_default();
    if remote_name.to_lowercase() != remote_name {
        return Err(Error::invalid_name(s, "repository name must be lowercase"));
    }

    parse_qualified(s, &domain, &remainder)
}

/// whether `s` looks like a full 64-character hex record ID
pub fn is_full_identifier(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

fn split_docker_domain(s: &str) -> (String, String) {
    let (mut domain, mut remainder) = match s.split_once('/') {
        Some((first, rest))
            if first.contains('.') || first.contains(':') || first == "localhost" =>
        {
            (first.to_string(), rest.to_string())
        }
        _ => (DEFAULT_DOMAIN.to_string(), s.to_string()),
    };

    if domain == LEGACY_DEFAULT_DOMAIN {
        domain = DEFAULT_DOMAIN.to_string();
    }
    if domain == DEFAULT_DOMAIN && !remainder.contains('/') {
        remainder = format!("{}{}", OFFICIAL_REPO_PREFIX, remainder);
    }
    (domain, remainder)
}

fn parse_qualified(original: &str, domain: &str, remainder: &str) -> Result<Named> {
    let (name_and_tag, digest) = match remainder.split_once('@') {
        Some((name_and_tag, digest)) => (name_and_tag, Some(Digest::parse(digest)?)),
        None => (remainder, None),
    };

    // a colon after the last slash separates the tag
    let (path, tag) = match name_and_tag.rfind(':') {
        Some(i) if !name_and_tag[i..].contains('/') => {
            (&name_and_tag[..i], Some(&name_and_tag[i + 1..]))
        }
        _ => (name_and_tag, None),
    };

    validate_domain(original, domain)?;

    if path.is_empty() {
        return Err(Error::invalid_name(original, "repository name must have at least one component"));
    }
    for component in path.split('/') {
        if !valid_path_component(component) {
            return Err(Error::invalid_name(
                original,
                format!("invalid repository path component {:?}", component),
            ));
        }
    }

    if domain.len() + 1 + path.len() > NAME_TOTAL_LENGTH_MAX {
        return Err(Error::invalid_name(
            original,
            format!("repository name must not be more than {} characters", NAME_TOTAL_LENGTH_MAX),
        ));
    }

    if let Some(tag) = tag {
        validate_tag(original, tag)?;
    }

    Ok(Named {
        domain: domain.to_string(),
        path: path.to_string(),
        tag: tag.map(str::to_string),
        digest,
    })
}

fn validate_domain(original: &str, domain: &str) -> Result<()> {
    let (host, port) = match domain.rsplit_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (domain, None),
    };

    if let Some(port) = port {
        if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::invalid_name(original, format!("invalid port in domain {:?}", domain)));
        }
    }

    let valid = !host.is_empty()
        && host.split('.').all(|label| {
            let bytes = label.as_bytes();
            !bytes.is_empty()
                && bytes[0].is_ascii_alphanumeric()
                && bytes[bytes.len() - 1].is_ascii_alphanumeric()
                && bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'-')
        });
    if !valid {
        return Err(Error::invalid_name(original, format!("invalid domain {:?}", domain)));
    }
    Ok(())
}

/// `[a-z0-9]+((\.|_|__|-+)[a-z0-9]+)*`
fn valid_path_component(component: &str) -> bool {
    let bytes = component.as_bytes();
    let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();

    let mut i = 0;
    loop {
        let start = i;
        while i < bytes.len() && alnum(bytes[i]) {
            i += 1;
        }
        if i == start {
            return false;
        }
        if i == bytes.len() {
            return true;
        }

        let sep_start = i;
        while i < bytes.len() && !alnum(bytes[i]) {
            i += 1;
        }
        let sep = &component[sep_start..i];
        let valid_sep = sep == "." || sep == "_" || sep == "__" || sep.bytes().all(|b| b == b'-');
        if !valid_sep {
            return false;
        }
    }
}

/// `[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}`
fn validate_tag(original: &str, tag: &str) -> Result<()> {
    let word = |b: u8| b.is_ascii_alphanumeric() || b == b'_';
    let bytes = tag.as_bytes();
    let valid = !bytes.is_empty()
        && bytes.len() <= TAG_LENGTH_MAX
        && word(bytes[0])
        && bytes.iter().all(|b| word(*b) || *b == b'.' || *b == b'-');
    if !valid {
        return Err(Error::invalid_name(original, format!("invalid tag {:?}", tag)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Named {
        parse_normalized_named(s).unwrap()
    }

    #[test]
    fn test_short_name_gets_library_prefix() {
        let named = parse("foo");
        assert_eq!(named.name(), "docker.io/library/foo");
        assert_eq!(named.tag(), None);
        assert!(named.digest().is_none());
    }

    #[test]
    fn test_user_repository_keeps_namespace() {
        assert_eq!(parse("user/foo").name(), "docker.io/user/foo");
        assert_eq!(parse("index.docker.io/foo").name(), "docker.io/library/foo");
    }

    #[test]
    fn test_explicit_domain() {
        let named = parse("quay.io/org/app:v1.2");
        assert_eq!(named.domain(), "quay.io");
        assert_eq!(named.path(), "org/app");
        assert_eq!(named.tag(), Some("v1.2"));

        let named = parse("localhost:5000/app:latest");
        assert_eq!(named.domain(), "localhost:5000");
        assert_eq!(named.path(), "app");
        assert_eq!(named.tag(), Some("latest"));

        assert_eq!(parse("localhost/app").name(), "localhost/app");
    }

    #[test]
    fn test_tag_and_digest() {
        let digest = Digest::from_bytes(b"");
        let named = parse(&format!("foo:owl@{}", digest));
        assert_eq!(named.name(), "docker.io/library/foo");
        assert_eq!(named.tag(), Some("owl"));
        assert_eq!(named.digest(), Some(&digest));
        assert_eq!(named.to_string(), format!("docker.io/library/foo:owl@{}", digest));
    }

    #[test]
    fn test_bad_digest_is_digest_error() {
        let err = parse_normalized_named("foo@sha256:nope").unwrap_err();
        assert!(matches!(err, Error::InvalidDigest { .. }));
    }

    #[test]
    fn test_rejects_invalid_names() {
        for bad in [
            "Foo",
            "foo/Bar",
            "foo:",
            "foo:-bad",
            "-foo",
            "foo..bar",
            "foo/",
            "bad_domain.com/",
            "ex ample",
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
        ] {
            assert!(
                matches!(parse_normalized_named(bad), Err(Error::InvalidName { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_path_component_separators() {
        assert!(valid_path_component("a.b"));
        assert!(valid_path_component("a_b"));
        assert!(valid_path_component("a__b"));
        assert!(valid_path_component("a---b"));
        assert!(!valid_path_component("a___b"));
        assert!(!valid_path_component("a._b"));
        assert!(!valid_path_component("a."));
        assert!(!valid_path_component(""));
    }

    #[test]
    fn test_name_length_limit() {
        let long = "a".repeat(300);
        assert!(parse_normalized_named(&long).is_err());
    }
}
