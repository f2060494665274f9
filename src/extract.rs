//! On-demand extraction of indexed records.
//!
//! An indexed record is a promise: re-reading `size_bytes` at
//! `source_offset` on `source_device` must reproduce bytes whose SHA-256
//! matches the record. The extractor re-opens devices as needed, performs
//! the sector-aligned re-read, verifies the hash and writes atomically.
//! Per-file failures are counted and reported; the batch always continues.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use sha2::Digest;
use tracing::{debug, info, warn};

use crate::device::RawDevice;
use crate::types::{FileRecord, RecordStatus};

/// Stable identifiers for per-file extraction failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    InvalidDevice,
    ReadError,
    NoData,
    HashMismatch,
    WriteError,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::InvalidDevice => "invalid_device",
            FailureReason::ReadError => "read_error",
            FailureReason::NoData => "no_data",
            FailureReason::HashMismatch => "hash_mismatch",
            FailureReason::WriteError => "write_error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecoveryFailure {
    pub filename: String,
    pub reason: FailureReason,
    pub detail: String,
}

/// Batch outcome. `records` carries every input record with its status
/// updated to `Recovered` or `Failed`.
#[derive(Debug, Default, Serialize)]
pub struct RecoveryOutcome {
    pub recovered: usize,
    pub failed: usize,
    pub total_bytes: u64,
    pub failures: Vec<RecoveryFailure>,
    pub records: Vec<FileRecord>,
}

/// Writes via a temporary sibling and an atomic rename so a crash never
/// leaves a half-written file under the final name.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension(format!(
        "{}.tmp-{}",
        path.extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default(),
        uuid::Uuid::new_v4().simple()
    ));
    fs::write(&tmp, data)?;
    match fs::rename(&tmp, path) {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}

/// Materializes selected records into an output directory.
pub struct Extractor {
    pub create_subdirectories: bool,
    pub validate_hashes: bool,
}

impl Default for Extractor {
    fn default() -> Self {
        Extractor {
            create_subdirectories: true,
            validate_hashes: true,
        }
    }
}

impl Extractor {
    pub fn new(create_subdirectories: bool, validate_hashes: bool) -> Extractor {
        Extractor {
            create_subdirectories,
            validate_hashes,
        }
    }

    fn output_path(&self, output_dir: &Path, record: &FileRecord) -> PathBuf {
        if self.create_subdirectories {
            output_dir
                .join(record.extension.to_uppercase())
                .join(&record.name)
        } else {
            output_dir.join(&record.name)
        }
    }

    /// Extracts each record in turn. `progress` receives
    /// `(index, total, filename)` after every file; `cancel` stops the
    /// batch between files, keeping what was already written.
    pub fn recover(
        &self,
        records: &[FileRecord],
        output_dir: &Path,
        cancel: &AtomicBool,
        mut progress: impl FnMut(usize, usize, &str),
    ) -> RecoveryOutcome {
        let mut outcome = RecoveryOutcome::default();
        let mut devices: HashMap<String, RawDevice> = HashMap::new();
        let total = records.len();

        info!(files = total, output = %output_dir.display(), "starting on-demand recovery");

        for (index, record) in records.iter().enumerate() {
            if cancel.load(Ordering::SeqCst) {
                info!("recovery cancelled, keeping files written so far");
                break;
            }

            let mut updated = record.clone();
            match self.recover_one(record, output_dir, &mut devices) {
                Ok(path) => {
                    updated.status = RecordStatus::Recovered;
                    updated.path = Some(path);
                    outcome.recovered += 1;
                    outcome.total_bytes += record.size_bytes;
                }
                Err((reason, detail)) => {
                    warn!(
                        file = %record.name,
                        reason = reason.as_str(),
                        detail = %detail,
                        "recovery failed"
                    );
                    updated.status = RecordStatus::Failed;
                    outcome.failed += 1;
                    outcome.failures.push(RecoveryFailure {
                        filename: record.name.clone(),
                        reason,
                        detail,
                    });
                }
            }
            outcome.records.push(updated);
            progress(index + 1, total, &record.name);
        }

        info!(
            recovered = outcome.recovered,
            failed = outcome.failed,
            "recovery batch finished"
        );
        outcome
    }

    fn recover_one(
        &self,
        record: &FileRecord,
        output_dir: &Path,
        devices: &mut HashMap<String, RawDevice>,
    ) -> Result<PathBuf, (FailureReason, String)> {
        if record.source_device.is_empty() || record.source_device == "unknown" {
            return Err((
                FailureReason::InvalidDevice,
                "record has no source device".to_string(),
            ));
        }

        if !devices.contains_key(&record.source_device) {
            let device = RawDevice::open(&record.source_device)
                .map_err(|e| (FailureReason::InvalidDevice, e.to_string()))?;
            devices.insert(record.source_device.clone(), device);
        }
        let device = devices
            .get_mut(&record.source_device)
            .expect("device inserted above");

        let data = device
            .read_at(record.source_offset, record.size_bytes as usize)
            .map_err(|e| (FailureReason::ReadError, e.to_string()))?;
        if data.is_empty() {
            return Err((
                FailureReason::NoData,
                format!("no bytes at offset {}", record.source_offset),
            ));
        }

        if self.validate_hashes {
            let actual = hex::encode(sha2::Sha256::digest(&data));
            if actual != record.sha256 {
                // The promise is broken; nothing is written.
                return Err((
                    FailureReason::HashMismatch,
                    format!("expected {}, read {}", record.sha256, actual),
                ));
            }
        }

        let path = self.output_path(output_dir, record);
        write_atomic(&path, &data).map_err(|e| (FailureReason::WriteError, e.to_string()))?;
        debug!(file = %record.name, path = %path.display(), "recovered");
        Ok(path)
    }
}
