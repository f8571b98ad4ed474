//! Registry inventory reads over the `/v2/<repository>/tags/list` endpoint.
//!
//! The reader speaks the GCR-extended tags-list format: alongside the plain
//! `tags` array, the response carries a `manifest` map (digest → tag list)
//! and a `child` array of sub-repository names, which the reader walks
//! iteratively. A failure on one sub-repository is logged and skipped; a
//! failure on the registry root aborts the read for that registry.
//!
//! Credentials are the caller's concern: the reader sends at most an ambient
//! bearer token it was handed, and never touches disk.

use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use stevedore_core::{Digest, ImageName, RegInvImage, RegistryContext, RegistryName, Tag};

use crate::error::ReadError;

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

/// One `tags/list` response. Fields the promoter does not consume
/// (`name`, `tags`, upload times) are ignored on parse.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagsList {
    #[serde(default)]
    pub child: Vec<String>,
    #[serde(default)]
    pub manifest: BTreeMap<String, ManifestEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManifestEntry {
    #[serde(default)]
    pub tag: Vec<String>,
}

/// Parse a tags-list body. Pure, so the wire format is testable offline.
pub fn parse_tags_list(body: &str) -> Result<TagsList, serde_json::Error> {
    serde_json::from_str(body)
}

/// Record one repository's manifests into the inventory under `image`.
///
/// Digests that fail syntax validation are logged and skipped rather than
/// poisoning the whole read.
pub fn record_manifests(inv: &mut RegInvImage, image: &ImageName, listing: &TagsList) {
    for (digest, entry) in &listing.manifest {
        let digest = Digest::from(digest.clone());
        if !digest.is_valid() {
            tracing::warn!(image = %image, digest = %digest, "skipping malformed digest in tags-list");
            continue;
        }
        inv.insert(
            image.clone(),
            digest,
            entry.tag.iter().cloned().map(Tag::from),
        );
    }
}

/// Split `gcr.io/my-project` into host and repository prefix.
pub fn split_registry(name: &RegistryName) -> Result<(&str, &str), ReadError> {
    match name.0.split_once('/') {
        Some((host, prefix)) if !host.is_empty() && !prefix.is_empty() => Ok((host, prefix)),
        _ => Err(ReadError::BadRegistryName {
            name: name.0.clone(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Reader seam
// ---------------------------------------------------------------------------

/// Read seam: the real HTTP reader in production, fixtures in tests.
#[async_trait]
pub trait RegistryReader: Send + Sync {
    /// Materialize the observed inventory of one registry.
    async fn read(&self, ctx: &RegistryContext) -> Result<RegInvImage, ReadError>;
}

/// Tags-list reader over HTTPS.
#[derive(Debug, Clone, Default)]
pub struct HttpReader {
    client: reqwest::Client,
    bearer: Option<String>,
}

impl HttpReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an ambient bearer token to every request.
    pub fn with_bearer(token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            bearer: Some(token.into()),
        }
    }

    async fn fetch_tags_list(&self, host: &str, repository: &str) -> Result<TagsList, ReadError> {
        let raw = format!("https://{host}/v2/{repository}/tags/list");
        let url = Url::parse(&raw).map_err(|e| ReadError::Url {
            url: raw.clone(),
            source: e,
        })?;

        let mut request = self.client.get(url);
        if let Some(token) = &self.bearer {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|e| ReadError::Http {
            url: raw.clone(),
            source: e,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReadError::Status {
                url: raw,
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| ReadError::Http {
            url: raw.clone(),
            source: e,
        })?;
        parse_tags_list(&body).map_err(|e| ReadError::Parse {
            url: raw,
            source: e,
        })
    }
}

#[async_trait]
impl RegistryReader for HttpReader {
    async fn read(&self, ctx: &RegistryContext) -> Result<RegInvImage, ReadError> {
        let (host, prefix) = split_registry(&ctx.name)?;
        let mut inv = RegInvImage::new();

        // Breadth-first over the child-repository tree. The registry root
        // itself is a listing, not an image.
        let mut queue = VecDeque::from([prefix.to_string()]);
        while let Some(repository) = queue.pop_front() {
            let listing = match self.fetch_tags_list(host, &repository).await {
                Ok(listing) => listing,
                Err(err) if repository == prefix => return Err(err),
                Err(err) => {
                    tracing::warn!(
                        registry = %ctx.name,
                        repository = %repository,
                        error = %err,
                        "skipping unreadable repository",
                    );
                    continue;
                }
            };

            for child in &listing.child {
                queue.push_back(format!("{repository}/{child}"));
            }

            if repository != prefix {
                let image = ImageName::from(
                    repository
                        .strip_prefix(&format!("{prefix}/"))
                        .unwrap_or(&repository),
                );
                record_manifests(&mut inv, &image, &listing);
            }
        }

        tracing::debug!(
            registry = %ctx.name,
            images = inv.0.len(),
            digests = inv.digest_count(),
            "registry read complete",
        );
        Ok(inv)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
