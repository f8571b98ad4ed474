//! Registry write operations as deferred command invocations.
//!
//! Every mutation is a [`RegistryOp`] value — a tagged variant, not a
//! behaviour interface — paired with the destination's optional service
//! account in a [`RegistryCommand`]. A command is pure data until a runner
//! executes it, which is what makes dry-run mode and test doubles trivial.
//!
//! The external registry tool (default `crane`) is expected to provide:
//!
//! ```text
//! <tool> copy   <src-ref@digest> <dst-ref>     # idempotent by digest
//! <tool> tag    <dst-ref@digest> <tag>
//! <tool> delete <dst-ref:tag>                  # removes the tag binding
//! <tool> delete <dst-ref@digest>               # removes digest + its tags
//! ```

use std::fmt;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;

use stevedore_core::{Digest, ImageName, RegistryName, Tag};

use crate::error::ClientError;

/// Default external registry tool.
pub const DEFAULT_TOOL: &str = "crane";

// ---------------------------------------------------------------------------
// Ops
// ---------------------------------------------------------------------------

/// One atomic registry mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryOp {
    /// Copy content by digest; a digest already present at the destination
    /// is a successful no-op.
    Copy {
        src_registry: RegistryName,
        src_image: ImageName,
        digest: Digest,
        dst_registry: RegistryName,
        dst_image: ImageName,
    },
    /// Create or overwrite the tag → digest binding. The digest must already
    /// exist at the destination.
    SetTag {
        registry: RegistryName,
        image: ImageName,
        digest: Digest,
        tag: Tag,
    },
    /// Remove a tag binding; the underlying digest is unaffected.
    DeleteTag {
        registry: RegistryName,
        image: ImageName,
        tag: Tag,
    },
    /// Remove an image blob; tags pointing at it go with it.
    DeleteDigest {
        registry: RegistryName,
        image: ImageName,
        digest: Digest,
    },
}

fn digest_ref(registry: &RegistryName, image: &ImageName, digest: &Digest) -> String {
    format!("{registry}/{image}@{digest}")
}

fn tag_ref(registry: &RegistryName, image: &ImageName, tag: &Tag) -> String {
    format!("{registry}/{image}:{tag}")
}

impl fmt::Display for RegistryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryOp::Copy {
                src_registry,
                src_image,
                digest,
                dst_registry,
                dst_image,
            } => write!(
                f,
                "copy {} -> {dst_registry}/{dst_image}",
                digest_ref(src_registry, src_image, digest)
            ),
            RegistryOp::SetTag {
                registry,
                image,
                digest,
                tag,
            } => write!(f, "tag {} as {tag}", digest_ref(registry, image, digest)),
            RegistryOp::DeleteTag { registry, image, tag } => {
                write!(f, "untag {}", tag_ref(registry, image, tag))
            }
            RegistryOp::DeleteDigest { registry, image, digest } => {
                write!(f, "delete {}", digest_ref(registry, image, digest))
            }
        }
    }
}

/// A [`RegistryOp`] plus the service account it should run under, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryCommand {
    pub op: RegistryOp,
    pub account: Option<String>,
}

impl RegistryCommand {
    pub fn new(op: RegistryOp) -> Self {
        Self { op, account: None }
    }

    pub fn with_account(op: RegistryOp, account: Option<String>) -> Self {
        Self { op, account }
    }

    /// Build the argv for the external registry tool. Pure: no side effects,
    /// no execution.
    pub fn invocation(&self, tool: &str) -> Invocation {
        let mut args = match &self.op {
            RegistryOp::Copy {
                src_registry,
                src_image,
                digest,
                dst_registry,
                dst_image,
            } => vec![
                "copy".to_string(),
                digest_ref(src_registry, src_image, digest),
                format!("{dst_registry}/{dst_image}"),
            ],
            RegistryOp::SetTag {
                registry,
                image,
                digest,
                tag,
            } => vec![
                "tag".to_string(),
                digest_ref(registry, image, digest),
                tag.to_string(),
            ],
            RegistryOp::DeleteTag { registry, image, tag } => {
                vec!["delete".to_string(), tag_ref(registry, image, tag)]
            }
            RegistryOp::DeleteDigest { registry, image, digest } => {
                vec!["delete".to_string(), digest_ref(registry, image, digest)]
            }
        };
        if let Some(account) = &self.account {
            args.push(format!("--account={account}"));
        }
        Invocation {
            program: tool.to_string(),
            args,
        }
    }
}

// ---------------------------------------------------------------------------
// Invocation
// ---------------------------------------------------------------------------

/// A fully-resolved external command, ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

impl Invocation {
    /// Run the command to completion, capturing output.
    pub async fn run(&self) -> Result<(), ClientError> {
        self.run_with_deadline(None).await
    }

    /// Run with an optional deadline; the child is killed on expiry.
    pub async fn run_with_deadline(&self, deadline: Option<Duration>) -> Result<(), ClientError> {
        tracing::debug!(command = %self, "running registry command");
        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let pending = command.output();
        let output = match deadline {
            None => pending.await,
            Some(limit) => match tokio::time::timeout(limit, pending).await {
                Ok(output) => output,
                Err(_) => {
                    return Err(ClientError::TimedOut {
                        program: self.program.clone(),
                        after_secs: limit.as_secs(),
                    });
                }
            },
        }
        .map_err(|e| ClientError::Spawn {
            program: self.program.clone(),
            source: e,
        })?;

        if output.status.success() {
            return Ok(());
        }
        Err(ClientError::CommandFailed {
            program: self.program.clone(),
            status: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Runners
// ---------------------------------------------------------------------------

/// Execution seam for registry commands: real subprocesses, dry-run logging,
/// or test doubles.
#[async_trait]
pub trait OpRunner: Send + Sync {
    async fn run(&self, command: &RegistryCommand) -> Result<(), ClientError>;
}

/// Executes commands through the external registry tool.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    tool: String,
    deadline: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            deadline: None,
        }
    }

    /// Kill any single command that runs longer than `deadline`.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(DEFAULT_TOOL)
    }
}

#[async_trait]
impl OpRunner for ProcessRunner {
    async fn run(&self, command: &RegistryCommand) -> Result<(), ClientError> {
        let invocation = command.invocation(&self.tool);
        tracing::info!(op = %command.op, "executing");
        invocation.run_with_deadline(self.deadline).await
    }
}

/// Logs the exact invocation and reports success without executing anything.
#[derive(Debug, Clone)]
pub struct DryRunRunner {
    tool: String,
}

impl DryRunRunner {
    pub fn new(tool: impl Into<String>) -> Self {
        Self { tool: tool.into() }
    }
}

impl Default for DryRunRunner {
    fn default() -> Self {
        Self::new(DEFAULT_TOOL)
    }
}

#[async_trait]
impl OpRunner for DryRunRunner {
    async fn run(&self, command: &RegistryCommand) -> Result<(), ClientError> {
        tracing::info!("[dry-run] would run: {}", command.invocation(&self.tool));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
