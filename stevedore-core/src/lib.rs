//! Stevedore core library — domain types, manifests, inventories, errors.
//!
//! Public API surface:
//! - [`types`] — newtypes and manifest entities
//! - [`manifest`] — load / validate / merge
//! - [`inventory`] — observed registry state
//! - [`error`] — [`ManifestError`]

pub mod error;
pub mod inventory;
pub mod manifest;
pub mod types;

pub use error::ManifestError;
pub use inventory::{DigestTags, MasterInventory, RegInvImage, TagSet};
pub use types::{Digest, ImageName, ImageSpec, Manifest, RegistryContext, RegistryName, Tag};
