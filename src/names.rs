//! derivation of repository, tag and digest associations from record names

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::reference::parse_normalized_named;

/// everything derived from a record's raw names and implicit digests
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NameSet {
    /// the raw names, unmodified
    pub names: Vec<String>,
    /// digests named explicitly plus the implicit ones
    pub digests: Vec<Digest>,
    /// canonical repository -> tags
    pub tags: BTreeMap<String, Vec<String>>,
    /// sorted canonical repositories
    pub repositories: Vec<String>,
    pub repo_tags: Vec<String>,
    pub repo_digests: Vec<String>,
}

impl NameSet {
    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.digests.is_empty()
    }
}

/// rebuild the derived name data for a record
///
/// fails without producing anything if a name is empty or contains
/// whitespace, or if any digest (implicit or embedded in a name) is malformed.
/// names that are not repository references at all are kept in `names` and
/// otherwise ignored.
pub fn recompute_names<N, D>(raw_names: &[N], implicit_digests: &[D]) -> Result<NameSet>
where
    N: AsRef<str>,
    D: AsRef<str>,
{
    for name in raw_names {
        let name = name.as_ref();
        validate_name(name)?;
        // checked before the reference parse so that a bare token cannot
        // carry a broken digest
        if let Some((_, digest)) = name.split_once('@') {
            Digest::parse(digest)?;
        }
    }
    let implicit = implicit_digests
        .iter()
        .map(|d| Digest::parse(d.as_ref()))
        .collect::<Result<Vec<_>>>()?;

    let mut set = NameSet {
        names: raw_names.iter().map(|n| n.as_ref().to_string()).collect(),
        ..NameSet::default()
    };

    let mut repositories = BTreeSet::new();
    let mut digests = Unique::default();
    let mut repo_tags = Unique::default();
    let mut repo_digests = Unique::default();

    for raw in raw_names {
        let named = match parse_normalized_named(raw.as_ref()) {
            Ok(named) => named,
            Err(e @ Error::InvalidDigest { .. }) => return Err(e),
            Err(_) => continue,
        };
        let repository = named.name();

        if let Some(tag) = named.tag() {
            let tags = set.tags.entry(repository.clone()).or_default();
            if !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_string());
            }
            repo_tags.push(format!("{}:{}", repository, tag));
        }
        if let Some(digest) = named.digest() {
            digests.push_digest(&mut set.digests, digest);
            repo_digests.push(format!("{}@{}", repository, digest));
        }
        repositories.insert(repository);
    }

    for digest in &implicit {
        digests.push_digest(&mut set.digests, digest);
    }
    for repository in &repositories {
        for digest in &implicit {
            repo_digests.push(format!("{}@{}", repository, digest));
        }
    }

    set.repositories = repositories.into_iter().collect();
    set.repo_tags = repo_tags.items;
    set.repo_digests = repo_digests.items;
    Ok(set)
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_name(name, "name must not be empty"));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(Error::invalid_name(name, "name must not contain whitespace"));
    }
    Ok(())
}

/// insertion-ordered list without duplicates
#[derive(Default)]
struct Unique {
    seen: HashSet<String>,
    items: Vec<String>,
}

impl Unique {
    fn push(&mut self, item: String) {
        if self.seen.insert(item.clone()) {
            self.items.push(item);
        }
    }

    fn push_digest(&mut self, out: &mut Vec<Digest>, digest: &Digest) {
        if self.seen.insert(digest.to_string()) {
            out.push(digest.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_NAMES: &[&str] = &[];
    const NO_DIGESTS: &[&str] = &[];

    fn sorted(mut v: Vec<String>) -> Vec<String> {
        v.sort();
        v
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_input() {
        let set = recompute_names(NO_NAMES, NO_DIGESTS).unwrap();
        assert_eq!(set, NameSet::default());
        assert!(set.is_empty());
    }

    #[test]
    fn test_implicit_digests_without_names() {
        let a = Digest::from_bytes(b"");
        let b = Digest::from_bytes(b"another digest");
        let set = recompute_names(NO_NAMES, &[b.clone(), a.clone()]).unwrap();
        assert_eq!(set.digests, vec![b, a]);
        assert!(set.repositories.is_empty());
        assert!(set.repo_digests.is_empty());
    }

    #[test]
    fn test_bare_repository_is_normalized() {
        let set = recompute_names(&["foo"], NO_DIGESTS).unwrap();
        assert_eq!(set.names, strings(&["foo"]));
        assert_eq!(set.repositories, strings(&["docker.io/library/foo"]));
        assert!(set.tags.is_empty());
        assert!(set.repo_tags.is_empty());
        assert!(set.digests.is_empty());
        assert!(set.repo_digests.is_empty());
    }

    #[test]
    fn test_repositories_are_sorted() {
        let set = recompute_names(&["foo", "bar"], NO_DIGESTS).unwrap();
        assert_eq!(
            set.repositories,
            strings(&["docker.io/library/bar", "docker.io/library/foo"])
        );
    }

    #[test]
    fn test_tags_grouped_by_repository() {
        let set = recompute_names(&["foo:owl", "foo:fish", "bar:baz"], NO_DIGESTS).unwrap();

        let mut expected = BTreeMap::new();
        expected.insert("docker.io/library/foo".to_string(), strings(&["owl", "fish"]));
        expected.insert("docker.io/library/bar".to_string(), strings(&["baz"]));
        assert_eq!(set.tags, expected);

        assert_eq!(
            sorted(set.repo_tags),
            strings(&[
                "docker.io/library/bar:baz",
                "docker.io/library/foo:fish",
                "docker.io/library/foo:owl",
            ])
        );
        assert!(set.repo_digests.is_empty());
    }

    #[test]
    fn test_duplicate_tags_collapse() {
        let set = recompute_names(&["foo:owl", "docker.io/library/foo:owl"], NO_DIGESTS).unwrap();
        assert_eq!(set.tags["docker.io/library/foo"], strings(&["owl"]));
        assert_eq!(set.repo_tags, strings(&["docker.io/library/foo:owl"]));
        assert_eq!(set.names.len(), 2);
    }

    #[test]
    fn test_explicit_and_implicit_digests() {
        let d1 = Digest::from_bytes(b"");
        let d2 = Digest::from_bytes(b"another digest");
        let names = vec![
            "foo:owl".to_string(),
            "foo:fish".to_string(),
            format!("foo@{}", d1),
        ];
        let set = recompute_names(&names, &[d2.clone()]).unwrap();

        assert_eq!(set.names, names);
        assert_eq!(set.digests, vec![d1.clone(), d2.clone()]);
        assert_eq!(set.repositories, strings(&["docker.io/library/foo"]));
        assert_eq!(
            sorted(set.repo_digests),
            sorted(vec![
                format!("docker.io/library/foo@{}", d1),
                format!("docker.io/library/foo@{}", d2),
            ])
        );
    }

    #[test]
    fn test_implicit_digests_apply_to_every_repository() {
        let a = Digest::from_bytes(b"");
        let b = Digest::from_bytes(b"another digest");
        let c = Digest::from_bytes(b"a third digest");
        let names = vec![
            "foo:owl".to_string(),
            "foo:fish".to_string(),
            format!("foo@{}", a),
            format!("bar@{}", b),
        ];
        let set = recompute_names(&names, &[b.clone(), c.clone()]).unwrap();

        assert_eq!(
            set.repositories,
            strings(&["docker.io/library/bar", "docker.io/library/foo"])
        );
        assert_eq!(set.tags.len(), 1);
        assert_eq!(
            sorted(set.repo_digests),
            sorted(vec![
                format!("docker.io/library/foo@{}", a),
                format!("docker.io/library/foo@{}", b),
                format!("docker.io/library/foo@{}", c),
                format!("docker.io/library/bar@{}", b),
                format!("docker.io/library/bar@{}", c),
            ])
        );
        // b is both explicit and implicit but listed once
        assert_eq!(set.digests, vec![a, b, c]);
    }

    #[test]
    fn test_bare_tokens_only_kept_as_names() {
        let id = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
        let set = recompute_names(&["Mixed-Case", id], NO_DIGESTS).unwrap();
        assert_eq!(set.names, strings(&["Mixed-Case", id]));
        assert!(set.repositories.is_empty());
        assert!(set.tags.is_empty());
    }

    #[test]
    fn test_empty_name_rejected() {
        let err = recompute_names(&[""], NO_DIGESTS).unwrap_err();
        assert!(matches!(err, Error::InvalidName { .. }));
    }

    #[test]
    fn test_whitespace_rejected() {
        let err = recompute_names(&["not allowed to include whitespace"], NO_DIGESTS).unwrap_err();
        assert!(matches!(err, Error::InvalidName { .. }));
    }

    #[test]
    fn test_bad_implicit_digest_rejected() {
        let err = recompute_names(NO_NAMES, &["sha256:not-a-real-digest"]).unwrap_err();
        assert!(matches!(err, Error::InvalidDigest { .. }));
    }

    #[test]
    fn test_bad_embedded_digest_rejected() {
        let err = recompute_names(&["foo:owl", "foo@sha256:nope"], NO_DIGESTS).unwrap_err();
        assert!(matches!(err, Error::InvalidDigest { .. }));
    }

    #[test]
    fn test_bad_digest_rejected_regardless_of_case() {
        for name in ["Foo@sha256:nope", "UPPER/Case:tag@sha256:nope", "foo@bar@sha256:nope"] {
            let err = recompute_names(&[name], NO_DIGESTS).unwrap_err();
            assert!(matches!(err, Error::InvalidDigest { .. }), "{}", name);
        }

        // a bare token with a valid digest is still kept and ignored
        let digested = format!("Foo@{}", Digest::from_bytes(b"m"));
        let set = recompute_names(&[digested.as_str()], NO_DIGESTS).unwrap();
        assert_eq!(set.names, vec![digested.clone()]);
        assert!(set.digests.is_empty());
        assert!(set.repositories.is_empty());
    }
}
