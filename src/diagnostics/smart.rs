//! SMART data ingestion.
//!
//! Shells out to `smartctl --json` when smartmontools is installed and
//! normalizes the interesting attributes (ATA table entries and the NVMe
//! health log) into a flat, human-readable map. Absence of the tool or of
//! SMART support simply yields `None`; the health scan records a skipped
//! check instead of failing.

use std::collections::BTreeMap;
use std::process::Command;

use serde_json::Value;
use tracing::{debug, info};

/// ATA attribute ids worth surfacing.
const ATA_ATTRIBUTES: [(u64, &str); 4] = [
    (5, "Reallocated_Sector_Count"),
    (9, "Power_On_Hours"),
    (194, "Temperature_Celsius"),
    (197, "Current_Pending_Sector"),
];

/// Reads and normalizes SMART attributes for `device`, or `None` when
/// smartctl is missing or the device does not answer.
pub fn collect(device: &str) -> Option<BTreeMap<String, String>> {
    let device_type = scan_device_type(device);

    let mut command = Command::new("smartctl");
    command.arg("-a").arg(device);
    if let Some(kind) = &device_type {
        command.arg("-d").arg(kind);
    }
    command.arg("--json=c");

    let output = match command.output() {
        Ok(output) => output,
        Err(e) => {
            debug!(error = %e, "smartctl unavailable");
            return None;
        }
    };

    // smartctl uses non-zero exits for advisory bits; parse whatever JSON
    // came back and only give up when there is none.
    let parsed: Value = serde_json::from_slice(&output.stdout).ok()?;
    let attributes = normalize(&parsed);
    if attributes.is_empty() {
        return None;
    }
    info!(device, attributes = attributes.len(), "SMART data collected");
    Some(attributes)
}

/// Asks `smartctl --scan` which transport the device uses so `-d` can be
/// passed explicitly.
fn scan_device_type(device: &str) -> Option<String> {
    let output = Command::new("smartctl").arg("--scan").output().ok()?;
    let listing = String::from_utf8_lossy(&output.stdout);
    for line in listing.lines() {
        if !line.starts_with('#') && line.contains(device) {
            // Format: "/dev/sda -d ata # ..."
            let mut parts = line.split_whitespace();
            while let Some(token) = parts.next() {
                if token == "-d" {
                    return parts.next().map(str::to_string);
                }
            }
        }
    }
    None
}

/// Flattens a smartctl JSON document into the attribute map used by the
/// health score.
pub(crate) fn normalize(v: &Value) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();

    if let Some(temperature) = v["temperature"]["current"].as_i64() {
        out.insert(
            "Temperature_Celsius".to_string(),
            format!("{temperature}\u{b0}C"),
        );
    }

    if let Some(table) = v["ata_smart_attributes"]["table"].as_array() {
        for entry in table {
            let Some(id) = entry["id"].as_u64() else {
                continue;
            };
            let Some((_, name)) = ATA_ATTRIBUTES.iter().find(|(aid, _)| *aid == id) else {
                continue;
            };
            let raw = entry["raw"]["value"]
                .as_i64()
                .map(|n| n.to_string())
                .or_else(|| entry["raw"]["string"].as_str().map(str::to_string));
            if let Some(raw) = raw {
                let value = match *name {
                    "Temperature_Celsius" => format!("{raw}\u{b0}C"),
                    "Power_On_Hours" => format!("{raw} hours"),
                    _ => raw,
                };
                out.insert((*name).to_string(), value);
            }
        }
    }

    let nvme = &v["nvme_smart_health_information_log"];
    if nvme.is_object() {
        if let Some(warning) = nvme["critical_warning"].as_i64() {
            let value = if warning == 0 {
                "None".to_string()
            } else {
                format!("Warning Level {warning}")
            };
            out.insert("Critical_Warning".to_string(), value);
        }
        if let Some(temperature) = nvme["temperature"].as_i64() {
            out.insert(
                "Temperature_Celsius".to_string(),
                format!("{temperature}\u{b0}C"),
            );
        }
        if let Some(spare) = nvme["available_spare"].as_i64() {
            out.insert("Available_Spare".to_string(), format!("{spare}%"));
        }
        if let Some(threshold) = nvme["available_spare_threshold"].as_i64() {
            out.insert(
                "Available_Spare_Threshold".to_string(),
                format!("{threshold}%"),
            );
        }
        if let Some(used) = nvme["percentage_used"].as_i64() {
            out.insert("Percentage_Used".to_string(), format!("{used}%"));
        }
        if let Some(hours) = nvme["power_on_hours"].as_i64() {
            out.insert("Power_On_Hours".to_string(), format!("{hours} hours"));
        }
        if let Some(errors) = nvme["media_errors"].as_i64() {
            out.insert("Media_Errors".to_string(), errors.to_string());
        }
    }

    out
}
