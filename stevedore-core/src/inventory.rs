//! In-memory registry inventories.
//!
//! [`RegInvImage`] is the observed state of one registry: image → digest →
//! tag set. Two distinct tags on the same digest are equal citizens — the
//! model never collapses a tag set into a scalar, and equality compares tag
//! sets as unordered sets.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::types::{Digest, ImageName, RegistryName, Tag};

/// The tags bound to one digest. Ordered for deterministic iteration.
pub type TagSet = BTreeSet<Tag>;

/// Digest → tag-set map for one image.
pub type DigestTags = BTreeMap<Digest, TagSet>;

// ---------------------------------------------------------------------------
// RegInvImage
// ---------------------------------------------------------------------------

/// Observed state of one registry, flat across repositories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegInvImage(pub BTreeMap<ImageName, DigestTags>);

impl RegInvImage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a digest (and its tags) under an image, merging with any tags
    /// already recorded for that digest.
    pub fn insert(&mut self, image: ImageName, digest: Digest, tags: impl IntoIterator<Item = Tag>) {
        self.0
            .entry(image)
            .or_default()
            .entry(digest)
            .or_default()
            .extend(tags);
    }

    /// Whether `digest` exists under `image`.
    pub fn has_digest(&self, image: &ImageName, digest: &Digest) -> bool {
        self.0
            .get(image)
            .is_some_and(|dmap| dmap.contains_key(digest))
    }

    /// The digest a tag currently points at under `image`, if any.
    ///
    /// A live tag binds to exactly one digest at a time, so the first match
    /// is the only match.
    pub fn digest_for_tag(&self, image: &ImageName, tag: &Tag) -> Option<&Digest> {
        let dmap = self.0.get(image)?;
        dmap.iter()
            .find_map(|(digest, tags)| tags.contains(tag).then_some(digest))
    }

    pub fn images(&self) -> impl Iterator<Item = (&ImageName, &DigestTags)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of distinct digests across all images.
    pub fn digest_count(&self) -> usize {
        self.0.values().map(BTreeMap::len).sum()
    }
}

// ---------------------------------------------------------------------------
// MasterInventory
// ---------------------------------------------------------------------------

/// Observed state of every registry referenced by a promotion run.
///
/// Populated once by parallel reads, then treated as read-only input to the
/// planner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterInventory(pub BTreeMap<RegistryName, RegInvImage>);

impl MasterInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, registry: &RegistryName) -> Option<&RegInvImage> {
        self.0.get(registry)
    }

    pub fn set(&mut self, registry: RegistryName, inv: RegInvImage) {
        self.0.insert(registry, inv);
    }

    pub fn registries(&self) -> impl Iterator<Item = (&RegistryName, &RegInvImage)> {
        self.0.iter()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
