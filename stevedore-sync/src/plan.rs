//! The edge planner: diff declared desired state against observed
//! destination state and emit a deduplicated, deterministically ordered set
//! of promotion edges.
//!
//! Safety rules enforced here:
//! - a tag already bound to a different digest is never reassigned unless
//!   moves are explicitly permitted (globally or per image);
//! - every copy/tag edge must have its source digest observed in the source
//!   registry's inventory, or it is dropped;
//! - a plan that would bind one destination tag to two digests is refused
//!   outright.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use stevedore_core::{Digest, ImageName, ManifestError, RegistryName, Tag};

use crate::context::SyncContext;
use crate::error::SyncError;

// ---------------------------------------------------------------------------
// Edge model
// ---------------------------------------------------------------------------

/// What an edge does to the destination tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TagOp {
    /// Bind a tag (or promote untagged content) where nothing conflicts.
    Add,
    /// Reassign a tag that currently points at another digest.
    Move,
    /// Desired binding already live; nothing to do. Never emitted.
    Keep,
    /// Remove a tag binding or a whole digest (thin mode).
    Delete,
}

impl fmt::Display for TagOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TagOp::Add => "add",
            TagOp::Move => "move",
            TagOp::Keep => "keep",
            TagOp::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// One atomic planned mutation, fully self-describing.
///
/// Equality covers all seven fields; ordering sorts by destination first so
/// that identical inputs always produce byte-identical plans.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PromotionEdge {
    pub src_registry: RegistryName,
    pub src_image: ImageName,
    pub digest: Digest,
    pub dst_registry: RegistryName,
    pub dst_image: ImageName,
    pub tag: Tag,
    pub tag_op: TagOp,
}

impl Ord for PromotionEdge {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (
            &self.dst_registry,
            &self.dst_image,
            &self.digest,
            &self.tag,
            self.tag_op,
            &self.src_registry,
            &self.src_image,
        )
            .cmp(&(
                &other.dst_registry,
                &other.dst_image,
                &other.digest,
                &other.tag,
                other.tag_op,
                &other.src_registry,
                &other.src_image,
            ))
    }
}

impl PartialOrd for PromotionEdge {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PromotionEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}@{} -> {}/{}",
            self.src_registry, self.src_image, self.digest, self.dst_registry, self.dst_image
        )?;
        if !self.tag.is_empty() {
            write!(f, ":{}", self.tag)?;
        }
        write!(f, " ({})", self.tag_op)
    }
}

/// Planner switches. An explicit value — there is no global default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanOptions {
    /// Permit tag reassignment for every image.
    pub allow_moves: bool,
    /// Emit delete edges for destination digests no manifest declares.
    pub thin: bool,
}

/// The planner's output: ordered edges plus the candidates it dropped.
#[derive(Debug, Default)]
pub struct Plan {
    pub edges: Vec<PromotionEdge>,
    pub errors: Vec<SyncError>,
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Compute the promotion edges for a populated sync context.
///
/// Fatal errors: a manifest without a source registry, or a tag bound to two
/// digests across the merged manifests. Dropped candidates (source missing,
/// forbidden move) are returned in [`Plan::errors`].
pub fn plan(ctx: &SyncContext, options: &PlanOptions) -> Result<Plan, SyncError> {
    let mut candidates: BTreeSet<PromotionEdge> = BTreeSet::new();
    let mut errors: Vec<SyncError> = Vec::new();

    for manifest in &ctx.manifests {
        let Some(src) = manifest.src_registry() else {
            return Err(SyncError::Manifest(ManifestError::NoSourceRegistry));
        };

        for dst in manifest.destinations() {
            let dst_inv = ctx.inv.get(&dst.name);

            for image in &manifest.images {
                for (digest, tags) in &image.dmap {
                    if tags.is_empty() {
                        // Untagged content: promote the digest itself when absent.
                        let present =
                            dst_inv.is_some_and(|inv| inv.has_digest(&image.name, digest));
                        if !present {
                            candidates.insert(PromotionEdge {
                                src_registry: src.name.clone(),
                                src_image: image.name.clone(),
                                digest: digest.clone(),
                                dst_registry: dst.name.clone(),
                                dst_image: image.name.clone(),
                                tag: Tag::empty(),
                                tag_op: TagOp::Add,
                            });
                        }
                        continue;
                    }

                    for tag in tags {
                        let current = dst_inv.and_then(|inv| inv.digest_for_tag(&image.name, tag));
                        let tag_op = match current {
                            // Desired binding already live: Keep, skip.
                            Some(current) if current == digest => {
                                tracing::debug!(
                                    registry = %dst.name,
                                    image = %image.name,
                                    tag = %tag,
                                    "already promoted; skipping",
                                );
                                continue;
                            }
                            // The tag points at another digest: a Move,
                            // emitted only with explicit permission.
                            Some(current) => {
                                if !(options.allow_moves || image.allow_tag_moves) {
                                    tracing::warn!(
                                        registry = %dst.name,
                                        image = %image.name,
                                        tag = %tag,
                                        current = %current,
                                        wanted = %digest,
                                        "tag move forbidden",
                                    );
                                    errors.push(SyncError::MoveForbidden {
                                        registry: dst.name.clone(),
                                        image: image.name.clone(),
                                        tag: tag.clone(),
                                        current: current.clone(),
                                        wanted: digest.clone(),
                                    });
                                    continue;
                                }
                                TagOp::Move
                            }
                            None => TagOp::Add,
                        };
                        candidates.insert(PromotionEdge {
                            src_registry: src.name.clone(),
                            src_image: image.name.clone(),
                            digest: digest.clone(),
                            dst_registry: dst.name.clone(),
                            dst_image: image.name.clone(),
                            tag: tag.clone(),
                            tag_op,
                        });
                    }
                }
            }
        }
    }

    if options.thin {
        thin_candidates(ctx, &mut candidates);
    }

    // Source-truth validation: a copy/tag edge whose digest was not observed
    // at the source is dropped. Delete edges are grounded in the destination
    // observation and exempt.
    let mut edges = Vec::with_capacity(candidates.len());
    for edge in candidates {
        if edge.tag_op == TagOp::Delete {
            edges.push(edge);
            continue;
        }
        let observed = ctx
            .inv
            .get(&edge.src_registry)
            .is_some_and(|inv| inv.has_digest(&edge.src_image, &edge.digest));
        if observed {
            edges.push(edge);
        } else {
            tracing::warn!(edge = %edge, "source digest not observed; dropping edge");
            errors.push(SyncError::SourceMissing {
                src_registry: edge.src_registry,
                src_image: edge.src_image,
                digest: edge.digest,
                dst_registry: edge.dst_registry,
                dst_image: edge.dst_image,
            });
        }
    }

    // Tag-uniqueness: one destination tag, one digest, or the whole plan is
    // refused before anything executes.
    let mut bindings: BTreeMap<(&RegistryName, &ImageName, &Tag), &Digest> = BTreeMap::new();
    for edge in &edges {
        if edge.tag.is_empty() || edge.tag_op == TagOp::Delete {
            continue;
        }
        let key = (&edge.dst_registry, &edge.dst_image, &edge.tag);
        if let Some(previous) = bindings.insert(key, &edge.digest) {
            if previous != &edge.digest {
                return Err(SyncError::TagConflict {
                    registry: edge.dst_registry.clone(),
                    image: edge.dst_image.clone(),
                    tag: edge.tag.clone(),
                    first: previous.clone(),
                    second: edge.digest.clone(),
                });
            }
        }
    }

    tracing::info!(edges = edges.len(), dropped = errors.len(), "plan computed");
    Ok(Plan { edges, errors })
}

/// Thin mode: delete every destination digest that no manifest declares for
/// that destination, restricted to images under management.
fn thin_candidates(ctx: &SyncContext, candidates: &mut BTreeSet<PromotionEdge>) {
    // (destination, image) -> declared digests, across all manifests.
    let mut declared: BTreeMap<(&RegistryName, &ImageName), BTreeSet<&Digest>> = BTreeMap::new();
    for manifest in &ctx.manifests {
        for dst in manifest.destinations() {
            for image in &manifest.images {
                declared
                    .entry((&dst.name, &image.name))
                    .or_default()
                    .extend(image.dmap.keys());
            }
        }
    }

    for ((dst_registry, dst_image), wanted) in &declared {
        let Some(dst_inv) = ctx.inv.get(dst_registry) else {
            continue;
        };
        let Some(dmap) = dst_inv.0.get(*dst_image) else {
            continue;
        };
        for digest in dmap.keys() {
            if !wanted.contains(digest) {
                candidates.insert(PromotionEdge {
                    src_registry: (*dst_registry).clone(),
                    src_image: (*dst_image).clone(),
                    digest: digest.clone(),
                    dst_registry: (*dst_registry).clone(),
                    dst_image: (*dst_image).clone(),
                    tag: Tag::empty(),
                    tag_op: TagOp::Delete,
                });
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
