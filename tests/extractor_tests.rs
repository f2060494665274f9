mod common;

use std::sync::atomic::AtomicBool;

use common::{disk_with, sha256_hex, synthetic_jpeg, write_image};
use salvor::job::{ScanContext, Scanner};
use salvor::{
    CarvingMode, Carver, Extractor, FailureReason, RawDevice, RecordStatus, ScanOptions,
    SignatureSet,
};

const MIB: usize = 1024 * 1024;

/// Index a JPEG with the carver, returning the records and the image
/// handle that keeps the backing file alive.
fn indexed_jpeg() -> (Vec<salvor::FileRecord>, Vec<u8>, tempfile::NamedTempFile) {
    let jpeg = synthetic_jpeg(32 * 1024);
    let disk = disk_with(2 * MIB, &[(MIB, &jpeg)]);
    let image = write_image(&disk);

    let device = RawDevice::open(image.path().to_str().unwrap()).unwrap();
    let options = ScanOptions {
        carving_mode: Some(CarvingMode::IndexOnly),
        ..Default::default()
    };
    let (mut ctx, _cancel) = ScanContext::standalone(device, options);
    Carver::new(SignatureSet::Deep).run(&mut ctx).unwrap();

    (ctx.records(), jpeg, image)
}

#[test]
fn indexed_record_round_trips_to_identical_bytes() {
    let (records, jpeg, _image) = indexed_jpeg();
    assert_eq!(records.len(), 1);

    let out = tempfile::tempdir().unwrap();
    let cancel = AtomicBool::new(false);
    let outcome = Extractor::default().recover(&records, out.path(), &cancel, |_, _, _| {});

    assert_eq!(outcome.recovered, 1);
    assert_eq!(outcome.failed, 0);
    assert_eq!(outcome.total_bytes, jpeg.len() as u64);

    let record = &outcome.records[0];
    assert_eq!(record.status, RecordStatus::Recovered);
    let written = std::fs::read(record.path.as_ref().unwrap()).unwrap();
    assert_eq!(written, jpeg);
    assert_eq!(sha256_hex(&written), record.sha256);
}

#[test]
fn output_is_grouped_by_uppercase_extension() {
    let (records, _, _image) = indexed_jpeg();
    let out = tempfile::tempdir().unwrap();
    let cancel = AtomicBool::new(false);

    Extractor::default().recover(&records, out.path(), &cancel, |_, _, _| {});
    assert!(out.path().join("JPG").join(&records[0].name).exists());

    // Flat mode puts everything directly under the output directory.
    let flat_out = tempfile::tempdir().unwrap();
    Extractor::new(false, true).recover(&records, flat_out.path(), &cancel, |_, _, _| {});
    assert!(flat_out.path().join(&records[0].name).exists());
}

#[test]
fn tampered_hash_fails_and_writes_nothing() {
    let (mut records, _, _image) = indexed_jpeg();
    records[0].sha256 =
        "0000000000000000000000000000000000000000000000000000000000000000".to_string();

    let out = tempfile::tempdir().unwrap();
    let cancel = AtomicBool::new(false);
    let outcome = Extractor::default().recover(&records, out.path(), &cancel, |_, _, _| {});

    assert_eq!(outcome.recovered, 0);
    assert_eq!(outcome.failed, 1);
    assert_eq!(outcome.failures[0].reason, FailureReason::HashMismatch);
    assert_eq!(outcome.records[0].status, RecordStatus::Failed);
    assert!(!out.path().join("JPG").join(&records[0].name).exists());
}

#[test]
fn hash_validation_can_be_disabled() {
    let (mut records, _, _image) = indexed_jpeg();
    records[0].sha256 = "not-a-hash".to_string();

    let out = tempfile::tempdir().unwrap();
    let cancel = AtomicBool::new(false);
    let outcome = Extractor::new(true, false).recover(&records, out.path(), &cancel, |_, _, _| {});
    assert_eq!(outcome.recovered, 1);
}

#[test]
fn missing_device_and_bad_offsets_fail_without_aborting_the_batch() {
    let (records, _, _image) = indexed_jpeg();

    let mut invalid_device = records[0].clone();
    invalid_device.source_device = "unknown".to_string();

    let mut past_the_end = records[0].clone();
    past_the_end.source_offset = 1 << 40;

    let good = records[0].clone();

    let out = tempfile::tempdir().unwrap();
    let cancel = AtomicBool::new(false);
    let outcome = Extractor::default().recover(
        &[invalid_device, past_the_end, good],
        out.path(),
        &cancel,
        |_, _, _| {},
    );

    assert_eq!(outcome.recovered, 1);
    assert_eq!(outcome.failed, 2);
    let reasons: Vec<FailureReason> = outcome.failures.iter().map(|f| f.reason).collect();
    assert!(reasons.contains(&FailureReason::InvalidDevice));
    assert!(reasons.contains(&FailureReason::NoData));
}

#[test]
fn cancellation_stops_between_files() {
    let (records, _, _image) = indexed_jpeg();
    let batch = vec![records[0].clone(), records[0].clone(), records[0].clone()];

    let out = tempfile::tempdir().unwrap();
    let cancel = AtomicBool::new(true);
    let outcome = Extractor::default().recover(&batch, out.path(), &cancel, |_, _, _| {});
    assert_eq!(outcome.recovered + outcome.failed, 0);
}
