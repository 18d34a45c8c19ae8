// src/lib.rs

//! agent-bundle: javaagent bundle assembly
//!
//! Combines three independently built library sets into one
//! classloader-isolated agent jar.
//!
//! # Architecture
//!
//! - Relocation: agent libraries are moved to private package names, class
//!   constant pools and service descriptors included
//! - Shared contract: the logging facade and telemetry API libraries are
//!   never relocated or isolated, so their types stay shared with the
//!   bootstrap tier
//! - Isolation: relocated agent libraries live under `inst/` with `.class`
//!   files renamed to `.classdata`
//! - Merge: one primitive, two duplicate policies (FAIL before isolation,
//!   EXCLUDE for the final bundle)
//! - Output: a classifier jar and a byte-identical classifier-less copy,
//!   both promoted atomically

pub mod archive;
pub mod config;
mod error;
pub mod hash;
pub mod isolate;
pub mod library;
pub mod manifest;
pub mod merge;
pub mod pipeline;
pub mod progress;
pub mod relocate;
pub mod shared;
pub mod verify;

pub use archive::{Archive, ArchiveEntry, EntryKind};
pub use config::BundleConfig;
pub use error::{Error, Result};
pub use isolate::{IsolationConfig, IsolationResult, NamespacePlan, RenameRule};
pub use library::{LibrarySet, LibrarySetKind};
pub use manifest::{AttributeValue, ManifestAttributes, ManifestSpec};
pub use merge::{DuplicatePolicy, MergeResult, Merger};
pub use pipeline::{AssembledBundle, BuildReport, Pipeline, Stage};
pub use progress::{
    CallbackProgress, CliProgress, LogProgress, ProgressEvent, ProgressTracker, SilentProgress,
};
pub use relocate::{RelocationMap, RelocationRule, Relocator};
pub use shared::{SharedContract, SharedLibrary};
pub use verify::{TwinCheck, VerifyReport, verify_bundle, verify_twins};
