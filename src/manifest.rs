//! Persisted JSON artifacts.
//!
//! These files are the engine's only durable output: the scan index or
//! recovery manifest describing every record, the cluster map, and the
//! health report. All job state beyond them lives in memory.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::diagnostics::{ClusterMapReport, HealthReport};
use crate::error::Result;
use crate::types::{CarvingMode, FileRecord, ScanStats};

pub const INDEX_MANIFEST: &str = "scan_index.json";
pub const RECOVERY_MANIFEST: &str = "recovery_manifest.json";
pub const CLUSTER_MAP: &str = "cluster_map.json";
pub const HEALTH_REPORT: &str = "health_report.json";

/// Writes `scan_index.json` (index mode) or `recovery_manifest.json`
/// (write mode) into the output directory and returns its path.
pub fn write_scan_manifest(
    output_dir: &Path,
    mode: CarvingMode,
    recovery_method: &str,
    drive_path: &str,
    records: &[FileRecord],
    stats: &ScanStats,
    duration_seconds: f64,
) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)?;

    let (file_name, mode_label, count_key, recovery_status) = match mode {
        CarvingMode::IndexOnly => (
            INDEX_MANIFEST,
            "index_only",
            "total_files_indexed",
            "indexed",
        ),
        CarvingMode::Write => (
            RECOVERY_MANIFEST,
            "write",
            "total_files_recovered",
            "completed",
        ),
    };

    let total_size_bytes: u64 = records.iter().map(|r| r.size_bytes).sum();
    let partial_files = records.iter().filter(|r| r.is_partial).count();

    let files: Vec<Value> = records
        .iter()
        .map(|record| {
            let mut entry = json!({
                "filename": record.name,
                "path": record
                    .path
                    .as_ref()
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                "size_bytes": record.size_bytes,
                "offset": record.source_offset,
                "file_type": record.extension.to_uppercase(),
                "extension": record.extension,
                "md5": record.md5,
                "sha256": record.sha256,
                "validation_score": record.validation_score,
                "is_partial": record.is_partial,
                "status": record.status.as_str(),
                "method": record.method.as_str(),
                "recovered_at": record.discovered_at.to_rfc3339(),
                "signature": record
                    .signature_id
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string()),
            });
            // Index entries carry the device so on-demand recovery can
            // reopen it.
            if mode == CarvingMode::IndexOnly {
                entry["drive_path"] = json!(record.source_device);
            }
            entry
        })
        .collect();

    let mut statistics = Map::new();
    statistics.insert(count_key.to_string(), json!(records.len()));
    statistics.insert("unique_files".to_string(), json!(records.len()));
    statistics.insert("total_size_bytes".to_string(), json!(total_size_bytes));
    statistics.insert("partial_files".to_string(), json!(partial_files));
    statistics.insert(
        "disk_space_used".to_string(),
        json!(match mode {
            CarvingMode::IndexOnly => 0,
            CarvingMode::Write => total_size_bytes,
        }),
    );
    statistics.insert("recovery_status".to_string(), json!(recovery_status));

    let manifest = json!({
        "scan_info": {
            "mode": mode_label,
            "timestamp": Utc::now().to_rfc3339(),
            "drive_path": drive_path,
            "total_sectors_scanned": stats.sectors_scanned,
            "scan_duration_seconds": duration_seconds,
            "recovery_method": recovery_method,
        },
        "statistics": Value::Object(statistics),
        "files": files,
    });

    let path = output_dir.join(file_name);
    fs::write(&path, serde_json::to_vec_pretty(&manifest)?)?;
    info!(path = %path.display(), files = records.len(), "manifest written");
    Ok(path)
}

pub fn write_cluster_map(output_dir: &Path, report: &ClusterMapReport) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)?;
    let path = output_dir.join(CLUSTER_MAP);
    fs::write(&path, serde_json::to_vec_pretty(report)?)?;
    info!(path = %path.display(), clusters = report.cluster_map.len(), "cluster map written");
    Ok(path)
}

pub fn write_health_report(output_dir: &Path, report: &HealthReport) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)?;
    let path = output_dir.join(HEALTH_REPORT);
    fs::write(&path, serde_json::to_vec_pretty(report)?)?;
    info!(path = %path.display(), score = report.health_score, "health report written");
    Ok(path)
}
