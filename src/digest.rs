use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// digest algorithms understood by the store
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Algorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl Algorithm {
    /// the canonical algorithm for newly computed digests
    pub const CANONICAL: Algorithm = Algorithm::Sha256;

    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Sha256 => "sha256",
            Algorithm::Sha384 => "sha384",
            Algorithm::Sha512 => "sha512",
        }
    }

    /// length of the hex-encoded portion
    pub fn hex_len(self) -> usize {
        match self {
            Algorithm::Sha256 => 64,
            Algorithm::Sha384 => 96,
            Algorithm::Sha512 => 128,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "sha256" => Some(Algorithm::Sha256),
            "sha384" => Some(Algorithm::Sha384),
            "sha512" => Some(Algorithm::Sha512),
            _ => None,
        }
    }
}

/// a validated content digest of the form `algorithm:hex`
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest {
    algorithm: Algorithm,
    value: String,
}

impl Digest {
    /// parse and validate a digest string
    pub fn parse(s: &str) -> crate::Result<Self> {
        let (alg, encoded) = match s.split_once(':') {
            Some((alg, encoded)) if !alg.is_empty() && !encoded.is_empty() => (alg, encoded),
            _ => return Err(Error::invalid_digest(s, "invalid checksum digest format")),
        };

        let algorithm = match Algorithm::from_name(alg) {
            Some(a) => a,
            None if valid_algorithm_syntax(alg) => {
                return Err(Error::invalid_digest(s, "unsupported digest algorithm"))
            }
            None => return Err(Error::invalid_digest(s, "invalid checksum digest format")),
        };

        if encoded.len() != algorithm.hex_len() {
            return Err(Error::invalid_digest(s, "invalid checksum digest length"));
        }
        if !encoded
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(Error::invalid_digest(s, "invalid checksum digest format"));
        }

        Ok(Self {
            algorithm,
            value: s.to_string(),
        })
    }

    /// canonical (sha256) digest of a byte string
    pub fn from_bytes(data: &[u8]) -> Self {
        let encoded = hex::encode(Sha256::digest(data));
        Self {
            algorithm: Algorithm::CANONICAL,
            value: format!("{}:{}", Algorithm::CANONICAL.name(), encoded),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// hex portion after the colon
    pub fn encoded(&self) -> &str {
        &self.value[self.algorithm.name().len() + 1..]
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

/// `[a-z0-9]+([+._-][a-z0-9]+)*`
fn valid_algorithm_syntax(alg: &str) -> bool {
    let lower = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    alg.split(['+', '.', '_', '-'])
        .all(|part| !part.is_empty() && part.chars().all(lower))
}

impl AsRef<str> for Digest {
    fn as_ref(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({}:{})", self.algorithm.name(), &self.encoded()[..12])
    }
}

impl FromStr for Digest {
    type Err = Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Digest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.value)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
