//! Manifest loading, validation, and cross-manifest merging.
//!
//! Manifests are YAML files of the form:
//!
//! ```yaml
//! registries:
//!   - name: gcr.io/src-project
//!     src: true
//!   - name: gcr.io/dst-project
//!     service-account: promoter@dst-project.iam.gserviceaccount.com
//! images:
//!   - name: my-image
//!     dmap:
//!       "sha256:abc…": ["v1.0.0", "latest"]
//!       "sha256:def…": []
//! ```
//!
//! Multiple manifest files may be combined in one run; registries are matched
//! by name across files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{io_err, ManifestError};
use crate::types::{Manifest, RegistryContext, RegistryName};

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Load and validate a single manifest file.
///
/// Returns `ManifestError::Parse` (with path and line context) when the YAML
/// is malformed, or the first structural validation error otherwise.
pub fn load_file(path: &Path) -> Result<Manifest, ManifestError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let manifest: Manifest = serde_yaml::from_str(&contents).map_err(|e| ManifestError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    validate(&manifest)?;
    Ok(manifest)
}

/// Load and validate every manifest file in `paths`.
pub fn load_files(paths: &[PathBuf]) -> Result<Vec<Manifest>, ManifestError> {
    paths.iter().map(|p| load_file(p)).collect()
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Structural validation of one manifest: exactly one source registry, at
/// least one destination, no destination named after the source, and
/// well-formed digests and tags.
pub fn validate(manifest: &Manifest) -> Result<(), ManifestError> {
    let src_count = manifest.registries.iter().filter(|rc| rc.src).count();
    match src_count {
        0 => return Err(ManifestError::NoSourceRegistry),
        1 => {}
        count => return Err(ManifestError::MultipleSourceRegistries { count }),
    }
    if let Some(src) = manifest.src_registry() {
        if manifest.destinations().any(|rc| rc.name == src.name) {
            return Err(ManifestError::DestinationEqualsSource {
                registry: src.name.clone(),
            });
        }
    }
    if manifest.destinations().next().is_none() {
        return Err(ManifestError::NoDestinationRegistries);
    }

    for image in &manifest.images {
        for (digest, tags) in &image.dmap {
            if !digest.is_valid() {
                return Err(ManifestError::InvalidDigest {
                    image: image.name.0.clone(),
                    digest: digest.0.clone(),
                });
            }
            for tag in tags {
                if !tag.is_valid() {
                    return Err(ManifestError::InvalidTag {
                        image: image.name.0.clone(),
                        tag: tag.0.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Deduplicate registry contexts across manifests, keyed by name.
///
/// A service-account conflict between two manifests referencing the same
/// registry is fatal. A context with a service account wins over one
/// without, so later manifests may omit the account for brevity.
pub fn merge_registry_contexts(
    manifests: &[Manifest],
) -> Result<BTreeMap<RegistryName, RegistryContext>, ManifestError> {
    let mut merged: BTreeMap<RegistryName, RegistryContext> = BTreeMap::new();

    for manifest in manifests {
        for rc in &manifest.registries {
            match merged.get_mut(&rc.name) {
                None => {
                    merged.insert(rc.name.clone(), rc.clone());
                }
                Some(existing) => {
                    match (&existing.service_account, &rc.service_account) {
                        (Some(a), Some(b)) if a != b => {
                            return Err(ManifestError::ServiceAccountConflict {
                                registry: rc.name.clone(),
                            });
                        }
                        (None, Some(_)) => {
                            existing.service_account = rc.service_account.clone();
                        }
                        _ => {}
                    }
                    // A registry that is a source anywhere is never treated
                    // as write-only.
                    existing.src = existing.src || rc.src;
                }
            }
        }
    }

    Ok(merged)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
