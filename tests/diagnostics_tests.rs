mod common;

use common::{disk_with, write_image};
use salvor::diagnostics::{cluster_sample, health_scan, surface_scan};
use salvor::job::ScanContext;
use salvor::manifest::{write_cluster_map, write_health_report, CLUSTER_MAP, HEALTH_REPORT};
use salvor::{RawDevice, ScanOptions};

const MIB: usize = 1024 * 1024;

fn context_for(disk: &[u8]) -> (ScanContext, tempfile::NamedTempFile) {
    let image = write_image(disk);
    let device = RawDevice::open(image.path().to_str().unwrap()).unwrap();
    let (ctx, _cancel) = ScanContext::standalone(device, ScanOptions::default());
    (ctx, image)
}

#[test]
fn cluster_sample_classifies_empty_and_used_clusters() {
    // First half zeros, second half patterned.
    let pattern: Vec<u8> = (0..MIB / 2)
        .map(|i| ((i.wrapping_mul(31).wrapping_add(7)) % 256).max(1) as u8)
        .collect();
    let disk = disk_with(MIB, &[(MIB / 2, &pattern)]);
    let (mut ctx, _image) = context_for(&disk);

    let report = cluster_sample(&mut ctx).unwrap();

    // 256 clusters on a 1 MiB device, all sampled (rate 1).
    assert_eq!(report.statistics.total_clusters, 256);
    assert_eq!(report.statistics.sampled_clusters, 256);
    assert_eq!(report.statistics.empty_clusters, 128);
    assert_eq!(report.statistics.used_clusters, 128);
    assert_eq!(report.cluster_map.len(), 256);

    let first = &report.cluster_map[0];
    assert!(first.is_empty);
    assert_eq!(first.offset, 0);
    // 256 preview bytes, two hex characters each.
    assert_eq!(first.hex_preview.len(), 512);
    assert_eq!(first.ascii_preview.len(), 256);

    let used = &report.cluster_map[128];
    assert!(!used.is_empty);
    assert_eq!(used.cluster_id, 128);
    assert_eq!(used.offset, (MIB / 2) as u64);
}

#[test]
fn cluster_sample_rate_caps_the_sample_count() {
    let disk = vec![0u8; 8 * MIB];
    let (mut ctx, _image) = context_for(&disk);

    let report = cluster_sample(&mut ctx).unwrap();
    // 2048 clusters sampled every 2nd: 1024 samples.
    assert_eq!(report.statistics.total_clusters, 2048);
    assert_eq!(report.statistics.sampled_clusters, 1024);
}

#[test]
fn surface_scan_on_a_healthy_image_finds_no_bad_sectors() {
    let disk = vec![0x5Au8; MIB];
    let (mut ctx, _image) = context_for(&disk);

    let report = surface_scan(&mut ctx).unwrap();
    assert_eq!(report.bad_sectors, 0);
    assert!(report.total_tested >= 1000);
    assert!(report.surface_map.iter().all(|s| s.status == "good"));
}

#[test]
fn health_scan_produces_a_full_report() {
    let disk = vec![0x5Au8; MIB];
    let (mut ctx, _image) = context_for(&disk);

    let report = health_scan(&mut ctx).unwrap();

    // No bad sectors on an image file; SMART may or may not be available
    // in the environment, but the check list always records the outcome.
    assert_eq!(report.bad_sectors, 0);
    assert!(report.health_score >= 90);
    assert_eq!(report.status, "Excellent");
    assert!(report.checks.iter().any(|c| c.name == "SMART Data Access"));
    assert!(report.checks.iter().any(|c| c.name == "Surface Scan"));
    assert!(!report.recommendations.is_empty());
}

#[test]
fn diagnostic_artifacts_serialize_to_json() {
    let disk = vec![0u8; MIB];
    let out = tempfile::tempdir().unwrap();

    let (mut ctx, _image) = context_for(&disk);
    let cluster_report = cluster_sample(&mut ctx).unwrap();
    let path = write_cluster_map(out.path(), &cluster_report).unwrap();
    assert!(path.ends_with(CLUSTER_MAP));
    let parsed: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert!(parsed["statistics"]["sampled_clusters"].as_u64().unwrap() > 0);
    assert!(parsed["cluster_map"].is_array());

    let (mut ctx, _image) = context_for(&disk);
    let health_report = health_scan(&mut ctx).unwrap();
    let path = write_health_report(out.path(), &health_report).unwrap();
    assert!(path.ends_with(HEALTH_REPORT));
    let parsed: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert!(parsed["health_score"].as_u64().unwrap() <= 100);
    assert!(parsed["checks"].is_array());
    assert!(parsed.get("surface_map").is_some());
}
