//! Salvor - forensic file recovery engine.
//!
//! Recovers deleted files from block storage devices through three
//! orthogonal strategies: filesystem-metadata recovery (NTFS MFT and FAT32
//! directory entries), signature-based carving of unallocated space, and
//! device diagnostics (cluster sampling, surface and SMART health scans).
//! The source device is only ever read.
//!
//! The [`orchestrator::Orchestrator`] is the main entry point: it runs
//! cancellable scan jobs, fans out progress events, and hands selected
//! records to the [`extract::Extractor`] for on-demand recovery with hash
//! verification.

pub mod carve;
pub mod cli;
pub mod device;
pub mod diagnostics;
pub mod error;
pub mod extract;
pub mod fs;
pub mod job;
pub mod manifest;
pub mod orchestrator;
pub mod signatures;
pub mod types;
pub mod util;
pub mod validate;

pub use carve::Carver;
pub use device::{DeviceMode, RawDevice};
pub use error::{EngineError, Result};
pub use extract::{Extractor, FailureReason, RecoveryOutcome};
pub use fs::{FatParser, MftParser};
pub use job::{JobSnapshot, JobStatus, ProgressEvent, ScanContext, Scanner};
pub use orchestrator::Orchestrator;
pub use signatures::{Signature, SignatureRegistry};
pub use types::{
    CarvingMode, FileCategory, FileRecord, RecordStatus, RecoveryMethod, ScanOptions, ScanResult,
    ScanStats, SignatureSet, Strategy,
};
pub use validate::{validate, Validation};
