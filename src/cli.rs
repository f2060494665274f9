//! Command-line interface definitions and progress rendering.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;

use crate::job::ProgressEvent;
use crate::types::{
    CarvingMode, FileCategory, FileRecord, RecordStatus, RecoveryMethod, SignatureSet, Strategy,
};

#[derive(Parser)]
#[command(name = "salvor")]
#[command(version)]
#[command(about = "Recover deleted files from block storage devices", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StrategyArg {
    /// NTFS MFT / FAT32 directory recovery
    Metadata,
    /// Signature-based carving
    Carving,
    /// Cluster sampling with hex previews
    ClusterSample,
    /// Surface scan + SMART health score
    SurfaceHealth,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PresetArg {
    /// Common important formats, small chunks
    Quick,
    /// Every signature with a defined header, index-only by default
    Deep,
    /// Only the categories passed via --types
    Selective,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan a device and index (or carve out) recoverable files
    Scan {
        /// Device identifier: /dev/sdb, E:, \\.\PHYSICALDRIVE1 or an image file
        #[arg(short = 'D', long)]
        device: String,

        #[arg(short, long, default_value = "./scan_results")]
        output: PathBuf,

        #[arg(short, long, value_enum, default_value = "carving")]
        strategy: StrategyArg,

        #[arg(short, long, value_enum, default_value = "deep")]
        preset: PresetArg,

        /// Category filter: images,documents,videos,audio,archives,databases
        #[arg(short = 't', long, value_delimiter = ',')]
        types: Option<Vec<String>>,

        /// Force index-only carving (no bytes written)
        #[arg(long, conflicts_with = "write")]
        index_only: bool,

        /// Force write-mode carving
        #[arg(long)]
        write: bool,
    },

    /// Recover files previously indexed by a scan
    Recover {
        /// Path to scan_index.json produced by an index-mode scan
        #[arg(short, long)]
        manifest: PathBuf,

        #[arg(short, long, default_value = "./recovered")]
        output: PathBuf,

        /// Only recover these extensions (comma separated)
        #[arg(short = 't', long, value_delimiter = ',')]
        types: Option<Vec<String>>,

        /// Do not group output by extension
        #[arg(long)]
        flat: bool,

        /// Skip SHA-256 verification of re-read bytes
        #[arg(long)]
        no_verify: bool,
    },

    /// List supported file signatures
    ListSignatures,

    /// Show device information
    Info {
        #[arg(short = 'D', long)]
        device: String,
    },
}

impl StrategyArg {
    pub fn to_strategy(self, preset: PresetArg, types: Option<Vec<String>>) -> Strategy {
        match self {
            StrategyArg::Metadata => Strategy::Metadata,
            StrategyArg::Carving => {
                let selection = match preset {
                    PresetArg::Quick => SignatureSet::Quick,
                    PresetArg::Deep => SignatureSet::Deep,
                    PresetArg::Selective => {
                        SignatureSet::Selective(parse_categories(types.as_deref()))
                    }
                };
                Strategy::Carving(selection)
            }
            StrategyArg::ClusterSample => Strategy::ClusterSample,
            StrategyArg::SurfaceHealth => Strategy::SurfaceHealth,
        }
    }
}

/// Maps `--types` values to categories, warning on unknown names. An empty
/// result selects every category.
pub fn parse_categories(types: Option<&[String]>) -> HashSet<FileCategory> {
    let mut categories = HashSet::new();
    for name in types.unwrap_or_default() {
        match FileCategory::parse(name) {
            Some(category) => {
                categories.insert(category);
            }
            None => eprintln!("Warning: unknown file category '{name}'"),
        }
    }
    if categories.is_empty() {
        categories.extend(FileCategory::ALL);
    }
    categories
}

pub fn carving_mode_override(index_only: bool, write: bool) -> Option<CarvingMode> {
    if index_only {
        Some(CarvingMode::IndexOnly)
    } else if write {
        Some(CarvingMode::Write)
    } else {
        None
    }
}

/// Rebuilds records from a scan manifest so they can be fed back to the
/// extractor.
pub fn records_from_manifest(manifest: &Value) -> Vec<FileRecord> {
    let Some(files) = manifest["files"].as_array() else {
        return Vec::new();
    };
    files
        .iter()
        .filter_map(|entry| {
            let method = match entry["method"].as_str()? {
                "mft" => RecoveryMethod::Mft,
                "fat32" => RecoveryMethod::Fat32,
                _ => RecoveryMethod::Carving,
            };
            Some(FileRecord {
                name: entry["filename"].as_str()?.to_string(),
                extension: entry["extension"].as_str().unwrap_or("dat").to_string(),
                size_bytes: entry["size_bytes"].as_u64()?,
                source_offset: entry["offset"].as_u64()?,
                source_device: entry["drive_path"].as_str().unwrap_or_default().to_string(),
                md5: entry["md5"].as_str().unwrap_or_default().to_string(),
                sha256: entry["sha256"].as_str().unwrap_or_default().to_string(),
                validation_score: entry["validation_score"].as_u64().unwrap_or(0) as u8,
                is_partial: entry["is_partial"].as_bool().unwrap_or(false),
                method,
                status: RecordStatus::Indexed,
                discovered_at: chrono::Utc::now(),
                original_filename: None,
                declared_size: None,
                signature_id: entry["signature"].as_str().map(str::to_string),
                path: None,
            })
        })
        .collect()
}

/// indicatif wrapper fed by orchestrator progress events.
pub struct ProgressReporter {
    bar: Arc<ProgressBar>,
}

impl ProgressReporter {
    pub fn for_scan() -> ProgressReporter {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}% ({eta})",
                )
                .unwrap()
                .progress_chars("#>-"),
        );
        bar.set_message("Scanning device for recoverable files...");
        ProgressReporter { bar: Arc::new(bar) }
    }

    pub fn for_recovery(total_files: u64) -> ProgressReporter {
        let bar = ProgressBar::new(total_files);
        bar.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} files ({eta})",
                )
                .unwrap()
                .progress_chars("#>-"),
        );
        bar.set_message("Recovering files...");
        ProgressReporter { bar: Arc::new(bar) }
    }

    pub fn event_callback(&self) -> impl Fn(&ProgressEvent) + Send + Sync + 'static {
        let bar = Arc::clone(&self.bar);
        move |event: &ProgressEvent| {
            bar.set_position(event.progress_percent as u64);
            bar.set_message(format!(
                "{} | {} files found | eta {}",
                event.phase, event.files_found, event.eta
            ));
        }
    }

    pub fn set_position(&self, position: u64) {
        self.bar.set_position(position);
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}
