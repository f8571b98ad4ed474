//! Canonical textual rendering of a registry inventory.
//!
//! The sole non-trivial contract is determinism: equal inventories must
//! render to byte-identical text on any host. Both formats iterate ordered
//! containers end to end, so no sorting depends on map iteration order.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use stevedore_core::{Digest, ImageName, RegInvImage, Tag};

use crate::error::SyncError;

/// Allowed snapshot output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    Yaml,
    Csv,
}

impl SnapshotFormat {
    pub const ALL: [SnapshotFormat; 2] = [SnapshotFormat::Yaml, SnapshotFormat::Csv];
}

impl fmt::Display for SnapshotFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotFormat::Yaml => f.write_str("yaml"),
            SnapshotFormat::Csv => f.write_str("csv"),
        }
    }
}

impl FromStr for SnapshotFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yaml" => Ok(SnapshotFormat::Yaml),
            "csv" => Ok(SnapshotFormat::Csv),
            other => Err(format!("unknown snapshot format '{other}'; expected: yaml, csv")),
        }
    }
}

/// One image's row in the YAML snapshot.
#[derive(Serialize)]
struct SnapshotEntry<'a> {
    name: &'a ImageName,
    dmap: BTreeMap<&'a Digest, Vec<&'a Tag>>,
}

/// Render an inventory in the requested format.
pub fn render(inv: &RegInvImage, format: SnapshotFormat) -> Result<String, SyncError> {
    match format {
        SnapshotFormat::Yaml => render_yaml(inv),
        SnapshotFormat::Csv => Ok(render_csv(inv)),
    }
}

fn render_yaml(inv: &RegInvImage) -> Result<String, SyncError> {
    let entries: Vec<SnapshotEntry<'_>> = inv
        .images()
        .map(|(name, dmap)| SnapshotEntry {
            name,
            dmap: dmap
                .iter()
                .map(|(digest, tags)| (digest, tags.iter().collect()))
                .collect(),
        })
        .collect();
    Ok(serde_yaml::to_string(&entries)?)
}

fn render_csv(inv: &RegInvImage) -> String {
    let mut rows = Vec::new();
    for (image, dmap) in inv.images() {
        for (digest, tags) in dmap {
            if tags.is_empty() {
                rows.push(format!("{image},{digest},"));
                continue;
            }
            for tag in tags {
                rows.push(format!("{image},{digest},{tag}"));
            }
        }
    }
    rows.sort();

    let mut out = String::new();
    for row in rows {
        out.push_str(&row);
        out.push('\n');
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
