//! Device diagnostics: cluster sampling, surface scans and health scoring.

pub mod smart;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::job::ScanContext;
use crate::util::{all_zero, ascii_preview};

/// Sampling granularity for the cluster map.
pub const SAMPLE_CLUSTER_BYTES: usize = 4096;
/// At most this many clusters are sampled, evenly spaced.
const MAX_SAMPLED_CLUSTERS: u64 = 1000;
/// Bytes shown in the hex/ASCII previews.
const PREVIEW_BYTES: usize = 256;

const SECTOR_BYTES: u64 = 512;
const GIB: u64 = 1024 * 1024 * 1024;

#[derive(Debug, Clone, Serialize)]
pub struct ClusterSample {
    pub cluster_id: u64,
    pub offset: u64,
    pub is_empty: bool,
    pub hex_preview: String,
    pub ascii_preview: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterStats {
    pub drive_path: String,
    pub drive_size: u64,
    pub total_clusters: u64,
    pub sampled_clusters: u64,
    pub empty_clusters: u64,
    pub used_clusters: u64,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterMapReport {
    pub statistics: ClusterStats,
    pub cluster_map: Vec<ClusterSample>,
}

/// Reads up to 1000 evenly spaced 4 KiB clusters and classifies each as
/// empty or used, with a hex and ASCII preview of the leading bytes.
pub fn cluster_sample(ctx: &mut ScanContext) -> Result<ClusterMapReport> {
    let drive_size = ctx
        .device
        .size()
        .ok_or_else(|| EngineError::UnsupportedDevice("device size unknown".to_string()))?;
    let total_clusters = (drive_size / SAMPLE_CLUSTER_BYTES as u64).max(1);
    let sample_rate = (total_clusters / MAX_SAMPLED_CLUSTERS).max(1);
    let expected = total_clusters.div_ceil(sample_rate);

    info!(
        drive_size,
        total_clusters, sample_rate, "sampling clusters across device"
    );
    let started = std::time::Instant::now();

    let mut cluster_map = Vec::new();
    let mut empty_clusters = 0u64;
    let mut used_clusters = 0u64;

    let mut cluster_id = 0u64;
    while cluster_id < total_clusters {
        if ctx.cancelled() {
            info!(sampled = cluster_map.len(), "cluster sampling cancelled");
            break;
        }

        let offset = cluster_id * SAMPLE_CLUSTER_BYTES as u64;
        match ctx.device.read_at(offset, SAMPLE_CLUSTER_BYTES) {
            Ok(data) if !data.is_empty() => {
                let is_empty = all_zero(&data);
                if is_empty {
                    empty_clusters += 1;
                } else {
                    used_clusters += 1;
                }
                let preview = &data[..PREVIEW_BYTES.min(data.len())];
                cluster_map.push(ClusterSample {
                    cluster_id,
                    offset,
                    is_empty,
                    hex_preview: hex::encode(preview),
                    ascii_preview: ascii_preview(preview),
                });
            }
            Ok(_) => {}
            Err(e) => debug!(cluster_id, error = %e, "cluster read failed"),
        }

        let sampled = cluster_map.len() as u64;
        if sampled % 10 == 0 {
            let percent = (sampled as f64 / expected as f64) * 100.0;
            ctx.emit(percent.min(99.0), sampled, expected, "cluster_sample");
        }
        cluster_id += sample_rate;
    }

    ctx.emit_final(100.0, cluster_map.len() as u64, expected, "cluster_sample");

    Ok(ClusterMapReport {
        statistics: ClusterStats {
            drive_path: ctx.target.clone(),
            drive_size,
            total_clusters,
            sampled_clusters: cluster_map.len() as u64,
            empty_clusters,
            used_clusters,
            duration_seconds: started.elapsed().as_secs_f64(),
        },
        cluster_map,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct SectorStatus {
    pub sector: u64,
    pub status: &'static str,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SurfaceReport {
    pub surface_map: Vec<SectorStatus>,
    pub bad_sectors: u64,
    pub total_tested: u64,
}

/// Samples sectors at a stride calibrated to device size (~1000 samples
/// under 10 GiB, ~500 above) and marks unreadable or empty reads bad.
pub fn surface_scan(ctx: &mut ScanContext) -> Result<SurfaceReport> {
    let drive_size = ctx
        .device
        .size()
        .ok_or_else(|| EngineError::UnsupportedDevice("device size unknown".to_string()))?;
    let total_sectors = (drive_size / SECTOR_BYTES).max(1);
    let samples = if drive_size < 10 * GIB { 1000 } else { 500 };
    let interval = (total_sectors / samples).max(1);
    let expected = total_sectors.div_ceil(interval);

    info!(total_sectors, interval, "surface scan started");

    let mut report = SurfaceReport::default();
    let mut sector = 0u64;
    while sector < total_sectors {
        if ctx.cancelled() {
            info!(tested = report.total_tested, "surface scan cancelled");
            break;
        }

        let status = match ctx.device.read_at(sector * SECTOR_BYTES, SECTOR_BYTES as usize) {
            // A short read at the trailing edge still proves the sector
            // responds; only an empty read or an error marks it bad.
            Ok(data) if !data.is_empty() => "good",
            Ok(_) => "bad",
            Err(e) => {
                debug!(sector, error = %e, "sector unreadable");
                "bad"
            }
        };
        if status == "bad" {
            report.bad_sectors += 1;
        }
        report.surface_map.push(SectorStatus { sector, status });
        report.total_tested += 1;

        if report.total_tested % 10 == 0 {
            let percent = (report.total_tested as f64 / expected as f64) * 100.0;
            ctx.emit(percent.min(99.0), report.total_tested, expected, "surface_scan");
        }
        sector += interval;
    }

    info!(
        tested = report.total_tested,
        bad = report.bad_sectors,
        "surface scan finished"
    );
    Ok(report)
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub name: &'static str,
    pub status: &'static str,
    pub details: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub drive_path: String,
    pub scan_time: DateTime<Utc>,
    pub smart_data: Option<BTreeMap<String, String>>,
    pub health_score: u8,
    pub status: &'static str,
    pub surface_map: Vec<SectorStatus>,
    pub bad_sectors: u64,
    pub total_sectors_tested: u64,
    pub recommendations: Vec<String>,
    pub checks: Vec<HealthCheck>,
}

/// SMART ingestion plus surface sampling, folded into a 0-100 health score.
pub fn health_scan(ctx: &mut ScanContext) -> Result<HealthReport> {
    let mut checks = Vec::new();

    let smart_data = smart::collect(&ctx.target);
    match &smart_data {
        Some(attributes) => checks.push(HealthCheck {
            name: "SMART Data Access",
            status: "pass",
            details: format!("read {} SMART attributes", attributes.len()),
        }),
        None => checks.push(HealthCheck {
            name: "SMART Data Access",
            status: "skip",
            details: "SMART data not available for this drive".to_string(),
        }),
    }
    ctx.emit(25.0, 1, 4, "smart");

    let surface = surface_scan(ctx)?;
    checks.push(match surface.bad_sectors {
        0 => HealthCheck {
            name: "Surface Scan",
            status: "pass",
            details: format!("no bad sectors in {} tested", surface.total_tested),
        },
        1..=9 => HealthCheck {
            name: "Surface Scan",
            status: "warning",
            details: format!("found {} bad sectors", surface.bad_sectors),
        },
        _ => HealthCheck {
            name: "Surface Scan",
            status: "fail",
            details: format!(
                "found {} bad sectors, drive may be failing",
                surface.bad_sectors
            ),
        },
    });

    let (health_score, mut recommendations, smart_checks) =
        score_health(surface.bad_sectors, smart_data.as_ref());
    checks.extend(smart_checks);

    let status = if health_score >= 90 {
        recommendations.insert(0, "drive is healthy".to_string());
        "Excellent"
    } else if health_score >= 70 {
        recommendations.insert(0, "drive is in good condition".to_string());
        "Good"
    } else if health_score >= 50 {
        recommendations.insert(0, "consider backing up important data".to_string());
        "Fair"
    } else {
        recommendations.insert(0, "drive may fail soon, back up immediately".to_string());
        "Poor"
    };

    ctx.emit_final(100.0, surface.total_tested, surface.total_tested, "health");

    Ok(HealthReport {
        drive_path: ctx.target.clone(),
        scan_time: Utc::now(),
        smart_data,
        health_score,
        status,
        surface_map: surface.surface_map,
        bad_sectors: surface.bad_sectors,
        total_sectors_tested: surface.total_tested,
        recommendations,
        checks,
    })
}

/// Extracts the leading number from values like `"1,234"`, `"40°C"` or
/// `"12 hours"`.
fn parse_attribute_number(value: &str) -> Option<i64> {
    let cleaned: String = value
        .chars()
        .filter(|c| *c != ',')
        .take_while(|c| c.is_ascii_digit() || *c == '-')
        .collect();
    cleaned.parse().ok()
}

/// Starts at 100 and deducts for surface and SMART findings:
/// up to 50 for bad sectors (5 apiece), up to 20 for reallocated sectors,
/// up to 15 for pending sectors (2 apiece), 5 for running hot, up to 30 for
/// media errors (10 apiece) and 20 for any critical warning.
pub fn score_health(
    bad_sectors: u64,
    smart: Option<&BTreeMap<String, String>>,
) -> (u8, Vec<String>, Vec<HealthCheck>) {
    let mut score: i64 = 100;
    let mut recommendations = Vec::new();
    let mut checks = Vec::new();

    if bad_sectors > 0 {
        score -= (bad_sectors as i64 * 5).min(50);
        recommendations.push(format!("{bad_sectors} bad sectors detected"));
    }

    if let Some(smart) = smart {
        if let Some(reallocated) = smart
            .get("Reallocated_Sector_Count")
            .and_then(|v| parse_attribute_number(v))
        {
            if reallocated > 0 {
                score -= reallocated.min(20);
                recommendations.push(format!("{reallocated} reallocated sectors"));
                checks.push(HealthCheck {
                    name: "Reallocated Sectors",
                    status: "warning",
                    details: format!("{reallocated} sectors have been reallocated"),
                });
            }
        }

        if let Some(pending) = smart
            .get("Current_Pending_Sector")
            .and_then(|v| parse_attribute_number(v))
        {
            if pending > 0 {
                score -= (pending * 2).min(15);
                recommendations.push(format!("{pending} pending sectors"));
                checks.push(HealthCheck {
                    name: "Pending Sectors",
                    status: "fail",
                    details: format!("{pending} sectors are pending reallocation"),
                });
            }
        }

        if let Some(temperature) = smart
            .get("Temperature_Celsius")
            .and_then(|v| parse_attribute_number(v))
        {
            if temperature > 60 {
                score -= 5;
                recommendations.push(format!("high temperature: {temperature}\u{b0}C"));
                checks.push(HealthCheck {
                    name: "Drive Temperature",
                    status: "warning",
                    details: format!("temperature is {temperature}\u{b0}C (recommended < 60\u{b0}C)"),
                });
            } else if temperature > 0 {
                checks.push(HealthCheck {
                    name: "Drive Temperature",
                    status: "pass",
                    details: format!("temperature is normal: {temperature}\u{b0}C"),
                });
            }
        }

        if let Some(media_errors) = smart
            .get("Media_Errors")
            .and_then(|v| parse_attribute_number(v))
        {
            if media_errors > 0 {
                score -= (media_errors * 10).min(30);
                recommendations.push(format!("{media_errors} media errors detected"));
                checks.push(HealthCheck {
                    name: "Media Errors",
                    status: "fail",
                    details: format!("{media_errors} media errors reported"),
                });
            }
        }

        if let Some(warning) = smart.get("Critical_Warning") {
            if warning != "None" {
                score -= 20;
                recommendations.push(warning.clone());
                checks.push(HealthCheck {
                    name: "Critical Warning",
                    status: "fail",
                    details: warning.clone(),
                });
            }
        }
    }

    (score.clamp(0, 100) as u8, recommendations, checks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smart_with(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn pristine_drive_scores_excellent() {
        let smart = smart_with(&[("Temperature_Celsius", "35\u{b0}C")]);
        let (score, _, checks) = score_health(0, Some(&smart));
        assert_eq!(score, 100);
        assert!(checks.iter().any(|c| c.name == "Drive Temperature" && c.status == "pass"));
    }

    #[test]
    fn bad_sector_penalty_caps_at_fifty() {
        let (score, _, _) = score_health(3, None);
        assert_eq!(score, 85);
        let (score, _, _) = score_health(1000, None);
        assert_eq!(score, 50);
    }

    #[test]
    fn smart_penalties_accumulate() {
        let smart = smart_with(&[
            ("Reallocated_Sector_Count", "12"),
            ("Current_Pending_Sector", "4"),
            ("Temperature_Celsius", "65\u{b0}C"),
        ]);
        // 100 - 12 (reallocated) - 8 (pending) - 5 (temperature)
        let (score, recommendations, _) = score_health(0, Some(&smart));
        assert_eq!(score, 75);
        assert_eq!(recommendations.len(), 3);
    }

    #[test]
    fn nvme_critical_warning_costs_twenty() {
        let smart = smart_with(&[
            ("Critical_Warning", "Warning Level 2"),
            ("Media_Errors", "1"),
        ]);
        let (score, _, checks) = score_health(0, Some(&smart));
        assert_eq!(score, 70);
        assert!(checks.iter().any(|c| c.name == "Critical Warning"));
        assert!(checks.iter().any(|c| c.name == "Media Errors"));
    }

    #[test]
    fn score_never_goes_negative() {
        let smart = smart_with(&[
            ("Reallocated_Sector_Count", "50000"),
            ("Current_Pending_Sector", "50000"),
            ("Media_Errors", "50000"),
            ("Critical_Warning", "Warning Level 1"),
            ("Temperature_Celsius", "80\u{b0}C"),
        ]);
        let (score, _, _) = score_health(100000, Some(&smart));
        assert_eq!(score, 0);
    }

    #[test]
    fn attribute_numbers_parse_through_formatting() {
        assert_eq!(parse_attribute_number("1,234"), Some(1234));
        assert_eq!(parse_attribute_number("40\u{b0}C"), Some(40));
        assert_eq!(parse_attribute_number("132 hours"), Some(132));
        assert_eq!(parse_attribute_number("None"), None);
    }
}
