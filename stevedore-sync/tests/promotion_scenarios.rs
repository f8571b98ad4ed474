//! End-to-end promotion scenarios against a simulated registry.
//!
//! The fake registry backs both the reader and the runner with one shared
//! state, so a full run can be verified from manifest files on disk through
//! planning, execution, and the resulting registry contents.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::broadcast;

use stevedore_core::{
    Digest, ImageName, MasterInventory, RegInvImage, RegistryContext, RegistryName, Tag,
};
use stevedore_registry::{
    ClientError, DryRunRunner, OpRunner, ReadError, RegistryCommand, RegistryOp, RegistryReader,
};
use stevedore_sync::{run_promotion, PromoteOptions, SyncError};

// ---------------------------------------------------------------------------
// Fake registry: one shared state behind both seams
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct FakeRegistry {
    state: Arc<Mutex<MasterInventory>>,
    ops: Arc<Mutex<Vec<RegistryOp>>>,
    fail_copies_of: Option<Digest>,
}

impl FakeRegistry {
    fn new(state: MasterInventory) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            ops: Arc::new(Mutex::new(Vec::new())),
            fail_copies_of: None,
        }
    }

    fn snapshot(&self) -> MasterInventory {
        self.state.lock().expect("state lock").clone()
    }

    fn recorded_ops(&self) -> Vec<RegistryOp> {
        self.ops.lock().expect("ops lock").clone()
    }

    fn failed(message: &str) -> ClientError {
        ClientError::CommandFailed {
            program: "crane".to_string(),
            status: 1,
            stderr: message.to_string(),
        }
    }
}

#[async_trait]
impl RegistryReader for FakeRegistry {
    async fn read(&self, ctx: &RegistryContext) -> Result<RegInvImage, ReadError> {
        Ok(self
            .state
            .lock()
            .expect("state lock")
            .get(&ctx.name)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl OpRunner for FakeRegistry {
    async fn run(&self, command: &RegistryCommand) -> Result<(), ClientError> {
        self.ops.lock().expect("ops lock").push(command.op.clone());
        let mut state = self.state.lock().expect("state lock");
        match &command.op {
            RegistryOp::Copy {
                src_registry,
                src_image,
                digest,
                dst_registry,
                dst_image,
            } => {
                if self.fail_copies_of.as_ref() == Some(digest) {
                    return Err(Self::failed("simulated copy failure"));
                }
                let src_has = state
                    .get(src_registry)
                    .is_some_and(|inv| inv.has_digest(src_image, digest));
                if !src_has {
                    return Err(Self::failed("source digest not found"));
                }
                let mut dst = state.get(dst_registry).cloned().unwrap_or_default();
                dst.insert(dst_image.clone(), digest.clone(), []);
                state.set(dst_registry.clone(), dst);
            }
            RegistryOp::SetTag {
                registry,
                image,
                digest,
                tag,
            } => {
                let mut inv = state.get(registry).cloned().unwrap_or_default();
                let Some(dmap) = inv.0.get_mut(image) else {
                    return Err(Self::failed("image not found at destination"));
                };
                if !dmap.contains_key(digest) {
                    return Err(Self::failed("digest not found at destination"));
                }
                for tags in dmap.values_mut() {
                    tags.remove(tag);
                }
                if let Some(tags) = dmap.get_mut(digest) {
                    tags.insert(tag.clone());
                }
                state.set(registry.clone(), inv);
            }
            RegistryOp::DeleteTag { registry, image, tag } => {
                let mut inv = state.get(registry).cloned().unwrap_or_default();
                if let Some(dmap) = inv.0.get_mut(image) {
                    for tags in dmap.values_mut() {
                        tags.remove(tag);
                    }
                }
                state.set(registry.clone(), inv);
            }
            RegistryOp::DeleteDigest { registry, image, digest } => {
                let mut inv = state.get(registry).cloned().unwrap_or_default();
                if let Some(dmap) = inv.0.get_mut(image) {
                    dmap.remove(digest);
                }
                state.set(registry.clone(), inv);
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const SRC: &str = "gcr.io/src";
const DST: &str = "gcr.io/dst";

fn digest(hex_byte: &str) -> Digest {
    Digest::from(format!("sha256:{}", hex_byte.repeat(32)))
}

fn seed(entries: &[(&str, &str, &str, &[&str])]) -> MasterInventory {
    let mut master = MasterInventory::new();
    for (registry, image, hex, tags) in entries {
        let name = RegistryName::from(*registry);
        let mut inv = master.get(&name).cloned().unwrap_or_default();
        inv.insert(
            ImageName::from(*image),
            digest(hex),
            tags.iter().map(|t| Tag::from(*t)),
        );
        master.set(name, inv);
    }
    master
}

/// Write a manifest file binding `image` digests to tags.
fn write_manifest(dir: &TempDir, entries: &[(&str, &str, &[&str])]) -> PathBuf {
    let mut body = format!(
        "registries:\n- name: {SRC}\n  src: true\n- name: {DST}\nimages:\n"
    );
    for (image, hex, tags) in entries {
        body.push_str(&format!("- name: {image}\n  dmap:\n"));
        let rendered: Vec<String> = tags.iter().map(|t| format!("\"{t}\"")).collect();
        body.push_str(&format!(
            "    \"{}\": [{}]\n",
            digest(hex),
            rendered.join(", ")
        ));
    }
    let path = dir.path().join("manifest.yaml");
    std::fs::write(&path, body).expect("write manifest");
    path
}

fn options(manifest: PathBuf, confirm: bool) -> PromoteOptions {
    PromoteOptions {
        manifests: vec![manifest],
        confirm,
        ..PromoteOptions::default()
    }
}

fn no_cancel() -> broadcast::Receiver<()> {
    let (tx, rx) = broadcast::channel(1);
    drop(tx);
    rx
}

fn tags_of(inv: &MasterInventory, registry: &str, image: &str, hex: &str) -> Vec<String> {
    inv.get(&RegistryName::from(registry))
        .and_then(|r| r.0.get(&ImageName::from(image)))
        .and_then(|dmap| dmap.get(&digest(hex)))
        .map(|tags| tags.iter().map(|t| t.0.clone()).collect())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fresh_copy_promotes_digest_and_tag() {
    let dir = TempDir::new().expect("tempdir");
    let manifest = write_manifest(&dir, &[("foo", "aa", &["v1"])]);
    let fake = FakeRegistry::new(seed(&[(SRC, "foo", "aa", &["v1"])]));

    let outcome = run_promotion(
        &options(manifest, true),
        Arc::new(fake.clone()),
        Arc::new(fake.clone()),
        no_cancel(),
    )
    .await
    .expect("run");

    assert!(outcome.ok(), "errors: {:?}", outcome.errors);
    assert_eq!(outcome.report.succeeded.len(), 1);

    let after = fake.snapshot();
    assert_eq!(tags_of(&after, DST, "foo", "aa"), vec!["v1".to_string()]);
}

#[tokio::test]
async fn second_run_is_idempotent() {
    let dir = TempDir::new().expect("tempdir");
    let manifest = write_manifest(&dir, &[("foo", "aa", &["v1"])]);
    let fake = FakeRegistry::new(seed(&[(SRC, "foo", "aa", &["v1"])]));

    for _ in 0..2 {
        run_promotion(
            &options(manifest.clone(), true),
            Arc::new(fake.clone()),
            Arc::new(fake.clone()),
            no_cancel(),
        )
        .await
        .expect("run")
        .into_result()
        .expect("clean run");
    }

    let ops = fake.recorded_ops();
    assert_eq!(ops.len(), 2, "second run must plan zero edges, got: {ops:?}");
}

#[tokio::test]
async fn retag_runs_without_copy() {
    let dir = TempDir::new().expect("tempdir");
    let manifest = write_manifest(&dir, &[("foo", "aa", &["v1", "stable"])]);
    let fake = FakeRegistry::new(seed(&[
        (SRC, "foo", "aa", &["v1", "stable"]),
        (DST, "foo", "aa", &["v1"]),
    ]));

    let outcome = run_promotion(
        &options(manifest, true),
        Arc::new(fake.clone()),
        Arc::new(fake.clone()),
        no_cancel(),
    )
    .await
    .expect("run");
    assert!(outcome.ok());

    let ops = fake.recorded_ops();
    assert!(
        ops.iter().all(|op| !matches!(op, RegistryOp::Copy { .. })),
        "digest already present; only a tag write is allowed: {ops:?}"
    );
    let after = fake.snapshot();
    assert_eq!(tags_of(&after, DST, "foo", "aa"), vec!["stable".to_string(), "v1".to_string()]);
}

#[tokio::test]
async fn forbidden_move_drops_edge_and_fails_aggregate() {
    let dir = TempDir::new().expect("tempdir");
    let manifest = write_manifest(&dir, &[("foo", "bb", &["v1"])]);
    let fake = FakeRegistry::new(seed(&[
        (SRC, "foo", "bb", &["v1"]),
        (DST, "foo", "aa", &["v1"]),
    ]));

    let before = fake.snapshot();
    let outcome = run_promotion(
        &options(manifest, true),
        Arc::new(fake.clone()),
        Arc::new(fake.clone()),
        no_cancel(),
    )
    .await
    .expect("run");

    assert!(!outcome.ok());
    assert!(outcome
        .errors
        .iter()
        .any(|e| matches!(e, SyncError::MoveForbidden { .. })));
    let err = outcome.into_result().unwrap_err();
    assert!(matches!(err, SyncError::Aggregate { failed: 0, dropped: 1 }), "got: {err}");
    assert_eq!(fake.snapshot(), before, "nothing may execute");
}

#[tokio::test]
async fn permitted_move_retags_and_leaves_old_digest_untagged() {
    let dir = TempDir::new().expect("tempdir");
    let manifest = write_manifest(&dir, &[("foo", "bb", &["v1"])]);
    let fake = FakeRegistry::new(seed(&[
        (SRC, "foo", "bb", &["v1"]),
        (DST, "foo", "aa", &["v1"]),
    ]));

    let outcome = run_promotion(
        &PromoteOptions {
            allow_moves: true,
            ..options(manifest, true)
        },
        Arc::new(fake.clone()),
        Arc::new(fake.clone()),
        no_cancel(),
    )
    .await
    .expect("run");
    assert!(outcome.ok(), "errors: {:?}", outcome.errors);

    let after = fake.snapshot();
    assert_eq!(tags_of(&after, DST, "foo", "bb"), vec!["v1".to_string()]);
    assert!(tags_of(&after, DST, "foo", "aa").is_empty(), "old digest must end up untagged");
}

#[tokio::test]
async fn partial_failure_completes_other_edges_without_rollback() {
    let dir = TempDir::new().expect("tempdir");
    let manifest = write_manifest(&dir, &[("foo", "aa", &["v1"]), ("bar", "bb", &["v2"])]);
    let mut fake = FakeRegistry::new(seed(&[
        (SRC, "foo", "aa", &["v1"]),
        (SRC, "bar", "bb", &["v2"]),
    ]));
    fake.fail_copies_of = Some(digest("bb"));

    let outcome = run_promotion(
        &options(manifest, true),
        Arc::new(fake.clone()),
        Arc::new(fake.clone()),
        no_cancel(),
    )
    .await
    .expect("run");

    assert_eq!(outcome.report.succeeded.len(), 1);
    assert_eq!(outcome.report.failed.len(), 1);

    let after = fake.snapshot();
    assert_eq!(tags_of(&after, DST, "foo", "aa"), vec!["v1".to_string()], "good edge fully applied");
    assert!(
        tags_of(&after, DST, "bar", "bb").is_empty(),
        "failed edge leaves no partial tag"
    );

    let err = outcome.into_result().unwrap_err();
    assert!(matches!(err, SyncError::Aggregate { failed: 1, dropped: 0 }), "got: {err}");
}

#[tokio::test]
async fn dry_run_leaves_observed_inventory_untouched() {
    let dir = TempDir::new().expect("tempdir");
    let manifest = write_manifest(&dir, &[("foo", "aa", &["v1"])]);
    let fake = FakeRegistry::new(seed(&[(SRC, "foo", "aa", &["v1"])]));

    let before = fake.snapshot();
    let outcome = run_promotion(
        &options(manifest, false),
        Arc::new(fake.clone()),
        Arc::new(DryRunRunner::default()),
        no_cancel(),
    )
    .await
    .expect("run");

    assert!(outcome.ok());
    assert_eq!(outcome.report.succeeded.len(), 1, "dry run reports every edge as done");
    assert_eq!(fake.snapshot(), before, "dry run must not mutate anything");
    assert!(fake.recorded_ops().is_empty(), "dry run must not reach the registry");
}

#[tokio::test]
async fn missing_manifest_file_is_fatal() {
    let dir = TempDir::new().expect("tempdir");
    let err = run_promotion(
        &options(dir.path().join("absent.yaml"), false),
        Arc::new(FakeRegistry::new(MasterInventory::new())),
        Arc::new(DryRunRunner::default()),
        no_cancel(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, SyncError::Manifest(_)), "got: {err}");
}

#[tokio::test]
async fn unreadable_source_registry_drops_edges_via_source_truth() {
    struct FailingReader;

    #[async_trait]
    impl RegistryReader for FailingReader {
        async fn read(&self, ctx: &RegistryContext) -> Result<RegInvImage, ReadError> {
            Err(ReadError::Status {
                url: format!("https://{}/v2/tags/list", ctx.name),
                status: 503,
            })
        }
    }

    let dir = TempDir::new().expect("tempdir");
    let manifest = write_manifest(&dir, &[("foo", "aa", &["v1"])]);

    let outcome = run_promotion(
        &options(manifest, false),
        Arc::new(FailingReader),
        Arc::new(DryRunRunner::default()),
        no_cancel(),
    )
    .await
    .expect("read failures are not fatal");

    assert!(outcome.report.succeeded.is_empty());
    assert!(outcome
        .errors
        .iter()
        .any(|e| matches!(e, SyncError::Read { .. })));
    assert!(outcome
        .errors
        .iter()
        .any(|e| matches!(e, SyncError::SourceMissing { .. })));
    assert!(outcome.into_result().is_err());
}
