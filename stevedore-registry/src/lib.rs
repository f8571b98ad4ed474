//! # stevedore-registry
//!
//! Uniform read/write interface over remote container registries.
//!
//! Writes are deferred [`RegistryCommand`] values executed by an
//! [`OpRunner`] (subprocess, dry-run, or test double); reads go through the
//! [`RegistryReader`] seam, with [`HttpReader`] speaking the tags-list
//! protocol.

pub mod error;
pub mod ops;
pub mod reader;

pub use error::{ClientError, ReadError};
pub use ops::{
    DryRunRunner, Invocation, OpRunner, ProcessRunner, RegistryCommand, RegistryOp, DEFAULT_TOOL,
};
pub use reader::{HttpReader, RegistryReader, TagsList};
