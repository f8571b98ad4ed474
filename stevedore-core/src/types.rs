//! Domain types for promotion manifests.
//!
//! Registry, image, digest, and tag names are strongly-typed newtypes; all
//! manifest entities are serializable/deserializable via serde + serde_yaml.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A registry root, e.g. `gcr.io/my-project`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegistryName(pub String);

impl fmt::Display for RegistryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for RegistryName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RegistryName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A named image (repository) within a registry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ImageName(pub String);

impl fmt::Display for ImageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ImageName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ImageName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A content digest, algorithm-prefixed hex (e.g. `sha256:…`). Immutable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Digest(pub String);

impl Digest {
    /// Check algorithm prefix and hex payload length.
    ///
    /// Accepted forms: `sha256:` + 64 lowercase hex, `sha512:` + 128
    /// lowercase hex.
    pub fn is_valid(&self) -> bool {
        let Some((algo, hex)) = self.0.split_once(':') else {
            return false;
        };
        let expected_len = match algo {
            "sha256" => 64,
            "sha512" => 128,
            _ => return false,
        };
        hex.len() == expected_len && hex.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Digest {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Digest {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A mutable human label bound to at most one digest within a
/// (registry, image) pair. The empty tag stands for untagged content.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tag(pub String);

impl Tag {
    /// The empty tag: promotes digest content without binding a label.
    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Docker tag grammar: `[A-Za-z0-9_][A-Za-z0-9._-]{0,127}`.
    pub fn is_valid(&self) -> bool {
        let mut bytes = self.0.bytes();
        let Some(first) = bytes.next() else {
            return false;
        };
        if !(first.is_ascii_alphanumeric() || first == b'_') {
            return false;
        }
        self.0.len() <= 128
            && bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || b == b'-')
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Tag {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Tag {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Manifest entities
// ---------------------------------------------------------------------------

/// How the promoter talks to one registry, and whether it may serve as the
/// promotion source. Constructed from manifest parse; immutable thereafter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryContext {
    pub name: RegistryName,
    #[serde(
        rename = "service-account",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub service_account: Option<String>,
    #[serde(default)]
    pub src: bool,
}

/// One image's desired state: a digest → tag-list map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSpec {
    pub name: ImageName,
    pub dmap: BTreeMap<Digest, Vec<Tag>>,
    /// Permit tag reassignment for this image even without the global
    /// move permission.
    #[serde(
        rename = "allow-tag-moves",
        default,
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub allow_tag_moves: bool,
}

/// The declarative desired state: which images should exist in which
/// destination registries, drawn from exactly one source registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub registries: Vec<RegistryContext>,
    #[serde(default)]
    pub images: Vec<ImageSpec>,
}

impl Manifest {
    /// The single registry marked `src: true`.
    ///
    /// Only meaningful on a validated manifest; on a malformed one this
    /// returns the first source-marked entry, if any.
    pub fn src_registry(&self) -> Option<&RegistryContext> {
        self.registries.iter().find(|rc| rc.src)
    }

    /// All destination (non-source) registries.
    pub fn destinations(&self) -> impl Iterator<Item = &RegistryContext> {
        self.registries.iter().filter(|rc| !rc.src)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
