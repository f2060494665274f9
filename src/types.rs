//! Core data model: recoverable file records, scan strategies and options.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a record was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryMethod {
    Mft,
    Fat32,
    Carving,
}

impl RecoveryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryMethod::Mft => "mft",
            RecoveryMethod::Fat32 => "fat32",
            RecoveryMethod::Carving => "carving",
        }
    }
}

impl fmt::Display for RecoveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a record. `Indexed` records have not been written anywhere;
/// they are a promise that the bytes at `source_offset` on `source_device`
/// hash to `sha256`. Only the extractor moves a record to `Recovered` or
/// `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Indexed,
    Recovered,
    Failed,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Indexed => "indexed",
            RecordStatus::Recovered => "recovered",
            RecordStatus::Failed => "failed",
        }
    }
}

/// One recoverable file, as discovered by a parser or the carver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub name: String,
    pub extension: String,
    pub size_bytes: u64,
    /// Absolute byte offset on the device where the file's bytes begin.
    pub source_offset: u64,
    /// Original device identifier, preserved verbatim so recovery can
    /// reopen the same source.
    pub source_device: String,
    pub md5: String,
    pub sha256: String,
    pub validation_score: u8,
    pub is_partial: bool,
    pub method: RecoveryMethod,
    pub status: RecordStatus,
    pub discovered_at: DateTime<Utc>,
    /// Filename recovered from filesystem metadata, when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_filename: Option<String>,
    /// Size declared by filesystem metadata (may exceed what was readable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_size: Option<u64>,
    /// Signature id that matched, for carved records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature_id: Option<String>,
    /// Where the bytes were (or would be) written under the output directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Category tags used to select signature subsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCategory {
    Images,
    Documents,
    Videos,
    Audio,
    Archives,
    Databases,
}

impl FileCategory {
    pub const ALL: [FileCategory; 6] = [
        FileCategory::Images,
        FileCategory::Documents,
        FileCategory::Videos,
        FileCategory::Audio,
        FileCategory::Archives,
        FileCategory::Databases,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FileCategory::Images => "images",
            FileCategory::Documents => "documents",
            FileCategory::Videos => "videos",
            FileCategory::Audio => "audio",
            FileCategory::Archives => "archives",
            FileCategory::Databases => "databases",
        }
    }

    pub fn parse(s: &str) -> Option<FileCategory> {
        match s.to_ascii_lowercase().as_str() {
            "images" => Some(FileCategory::Images),
            "documents" => Some(FileCategory::Documents),
            "videos" => Some(FileCategory::Videos),
            "audio" => Some(FileCategory::Audio),
            "archives" => Some(FileCategory::Archives),
            "databases" => Some(FileCategory::Databases),
            _ => None,
        }
    }
}

/// Which signatures a carving pass searches for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureSet {
    /// Common important formats, fixed small chunks.
    Quick,
    /// Every registry entry with a defined header.
    Deep,
    /// User-chosen categories.
    Selective(HashSet<FileCategory>),
}

/// Scan strategy, dispatched by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// NTFS MFT first, FAT32 second; empty result when neither is detected.
    Metadata,
    Carving(SignatureSet),
    ClusterSample,
    SurfaceHealth,
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Metadata => "metadata",
            Strategy::Carving(_) => "carving",
            Strategy::ClusterSample => "cluster-sample",
            Strategy::SurfaceHealth => "surface-health",
        }
    }
}

/// Whether carving writes file bytes or only indexes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CarvingMode {
    IndexOnly,
    Write,
}

/// Options shared by every scan job.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Where artifacts (and write-mode carved files) land.
    pub output_dir: PathBuf,
    /// `None` selects the preset default: index-only for deep carving,
    /// write for selective.
    pub carving_mode: Option<CarvingMode>,
    pub create_subdirectories: bool,
    pub validate_hashes: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./scan_results"),
            carving_mode: None,
            create_subdirectories: true,
            validate_hashes: true,
        }
    }
}

/// Candidates a scan looked at but did not keep, by reason.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RejectCounts {
    pub invalid_candidate: u64,
    pub validation_failed: u64,
    pub low_score: u64,
    pub duplicate_content: u64,
    pub oversized_candidate: u64,
    pub too_small: u64,
    pub no_data: u64,
}

/// Counters accumulated while a scan runs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanStats {
    pub bytes_scanned: u64,
    pub sectors_scanned: u64,
    pub total_sectors: u64,
    pub entries_parsed: u64,
    pub files_found: usize,
    pub partial_files: usize,
    pub bytes_recovered: u64,
    pub per_extension: BTreeMap<String, usize>,
    pub rejects: RejectCounts,
}

impl ScanStats {
    pub fn count_record(&mut self, record: &FileRecord) {
        self.files_found += 1;
        if record.is_partial {
            self.partial_files += 1;
        }
        *self
            .per_extension
            .entry(record.extension.clone())
            .or_insert(0) += 1;
    }
}

/// Terminal snapshot of a finished (or cancelled) scan job.
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub duration_seconds: f64,
    pub bytes_scanned: u64,
    pub total_files: usize,
    pub partial_files: usize,
    pub per_extension: BTreeMap<String, usize>,
    pub records: Vec<FileRecord>,
}
