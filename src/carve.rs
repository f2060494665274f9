//! Signature-based file carving.
//!
//! The carver streams the device through a rolling buffer, searching for
//! format headers with a multi-pattern matcher. The trailing 100 KiB of
//! each chunk is retained so headers and footers straddling a chunk
//! boundary are still seen; consequently a carved file never exceeds one
//! chunk plus the overlap. Candidates are terminated by their format's
//! footer where one exists (strictly: no footer, no file) and by a
//! conservative size cap otherwise, then validated, scored, deduplicated by
//! offset window and MD5, and emitted as records.

use std::collections::{BTreeSet, HashSet};

use chrono::Utc;
use memchr::memmem;
use sha2::Digest;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::extract::write_atomic;
use crate::job::{ScanContext, Scanner};
use crate::signatures::{HeaderMatcher, Signature, SignatureRegistry};
use crate::types::{
    CarvingMode, FileRecord, RecordStatus, RecoveryMethod, ScanStats, SignatureSet,
};
use crate::validate::{validate, MIN_CARVE_BYTES, MIN_CARVE_SCORE};

/// Bytes retained between chunks so signatures crossing a boundary are
/// found.
pub const OVERLAP_BYTES: usize = 100 * 1024;

/// Two candidates whose start offsets differ by less than this are the
/// same find.
const DEDUP_WINDOW: u64 = 512;

/// Secondary check bytes must occur within this distance of the header.
const CHECK_WINDOW: usize = 1000;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// Write-mode safety valve: cumulative accepted bytes never exceed
/// `min(2 x device size, this)`.
const WRITE_CAP_BYTES: u64 = 20 * GIB;

/// Chunk size is ~1% of available memory, clamped to [1 MiB, 10 MiB], and
/// held to 2 MiB for small devices.
pub fn optimal_chunk_size(device_size: Option<u64>, available_memory: u64) -> usize {
    let mut optimal = (available_memory / 100).clamp(MIB, 10 * MIB);
    if device_size.is_some_and(|s| s < GIB) {
        optimal = optimal.min(2 * MIB);
    }
    optimal as usize
}

fn available_memory() -> u64 {
    use sysinfo::System;
    let mut system = System::new();
    system.refresh_memory();
    let available = system.available_memory();
    if available == 0 {
        4 * GIB
    } else {
        available
    }
}

/// Where a candidate ends, as an index into `buffer`, or `None` when the
/// format demands a terminator that is not present.
fn end_of_candidate(buffer: &[u8], start: usize, sig: &Signature, cap: u64) -> Option<usize> {
    let data = &buffer[start..];
    let find_from = |from: usize, needle: &[u8], tail: usize| -> Option<usize> {
        if data.len() <= from {
            return None;
        }
        memmem::find(&data[from..], needle).map(|p| start + from + p + tail)
    };

    match sig.extension {
        "jpg" => find_from(2, &[0xFF, 0xD9], 2),
        "png" => find_from(8, b"\x00\x00\x00\x00IEND\xae\x42\x60\x82", 12),
        "pdf" => find_from(10, b"%%EOF", 5),
        // End-of-central-directory plus its minimal 22-byte record.
        "zip" | "docx" | "xlsx" | "pptx" => {
            find_from(100, b"PK\x05\x06", 22).map(|end| end.min(buffer.len()))
        }
        "gif" => find_from(6, &[0x00, 0x3B], 2),
        "svg" => find_from(5, b"</svg>", 6),
        "wav" => {
            if data.len() < 8 {
                return None;
            }
            let riff_size = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;
            if riff_size < 36 {
                return None;
            }
            let end = 8 + riff_size;
            (end <= data.len()).then_some(start + end)
        }
        _ => {
            let limit = cap.min(sig.max_size) as usize;
            Some(start + limit.min(data.len()))
        }
    }
}

/// The carving mode a scan will actually run in: the caller's explicit
/// choice, or the preset default (deep scans only index, quick and
/// selective scans write as they go).
pub fn effective_carving_mode(selection: &SignatureSet, explicit: Option<CarvingMode>) -> CarvingMode {
    explicit.unwrap_or(match selection {
        SignatureSet::Deep => CarvingMode::IndexOnly,
        SignatureSet::Quick | SignatureSet::Selective(_) => CarvingMode::Write,
    })
}

/// Streaming signature carver over a raw device.
pub struct Carver {
    selection: SignatureSet,
}

struct CarveState {
    mode: CarvingMode,
    per_file_cap: u64,
    write_cap: u64,
    found_offsets: BTreeSet<u64>,
    found_md5: HashSet<String>,
    written_bytes: u64,
}

impl Carver {
    pub fn new(selection: SignatureSet) -> Carver {
        Carver { selection }
    }

    fn scan_buffer(
        &self,
        ctx: &ScanContext,
        matcher: &HeaderMatcher,
        buffer: &[u8],
        device_offset: u64,
        limit: usize,
        state: &mut CarveState,
        stats: &mut ScanStats,
    ) -> bool {
        for (pos, sig) in matcher.find(buffer, limit) {
            if ctx.cancelled() {
                return true;
            }

            // Signatures like ISO sit at a fixed distance into the file.
            let Some(start) = pos.checked_sub(sig.header_offset as usize) else {
                continue;
            };
            let absolute = device_offset + start as u64;

            let window_start = absolute.saturating_sub(DEDUP_WINDOW - 1);
            if state
                .found_offsets
                .range(window_start..=absolute + DEDUP_WINDOW - 1)
                .next()
                .is_some()
            {
                continue;
            }

            if let Some(check) = sig.check {
                let window_end = (start + CHECK_WINDOW).min(buffer.len());
                if memmem::find(&buffer[start..window_end], check).is_none() {
                    continue;
                }
            }

            let Some(end) = end_of_candidate(buffer, start, sig, state.per_file_cap) else {
                stats.rejects.invalid_candidate += 1;
                continue;
            };
            if end <= start || end > buffer.len() {
                stats.rejects.invalid_candidate += 1;
                continue;
            }
            let data = &buffer[start..end];
            if data.len() < MIN_CARVE_BYTES {
                stats.rejects.invalid_candidate += 1;
                continue;
            }
            if data.len() as u64 > state.per_file_cap.min(sig.max_size) {
                stats.rejects.oversized_candidate += 1;
                continue;
            }

            let validation = validate(data, sig);
            if !validation.is_valid {
                debug!(offset = absolute, sig = sig.id, reason = %validation.reason, "candidate rejected");
                stats.rejects.validation_failed += 1;
                continue;
            }
            if validation.score < MIN_CARVE_SCORE {
                stats.rejects.low_score += 1;
                continue;
            }

            let (md5_digest, sha_digest) =
                rayon::join(|| md5::compute(data), || sha2::Sha256::digest(data));
            let md5_hex = format!("{md5_digest:x}");
            if state.found_md5.contains(&md5_hex) {
                stats.rejects.duplicate_content += 1;
                continue;
            }

            let extension = if validation.is_partial {
                format!("partial.{}", sig.extension)
            } else {
                sig.extension.to_string()
            };
            let name = format!("f{absolute:08}.{extension}");
            let path = ctx.options.output_dir.join(&name);

            let status = match state.mode {
                CarvingMode::IndexOnly => RecordStatus::Indexed,
                CarvingMode::Write => {
                    if state.written_bytes + data.len() as u64 > state.write_cap {
                        warn!(
                            written = state.written_bytes,
                            cap = state.write_cap,
                            "recovery size cap reached, stopping carving"
                        );
                        return true;
                    }
                    if let Err(e) = write_atomic(&path, data) {
                        warn!(path = %path.display(), error = %e, "failed to write carved file");
                        continue;
                    }
                    state.written_bytes += data.len() as u64;
                    RecordStatus::Recovered
                }
            };

            let record = FileRecord {
                name,
                extension: sig.extension.to_string(),
                size_bytes: data.len() as u64,
                source_offset: absolute,
                source_device: ctx.target.clone(),
                md5: md5_hex.clone(),
                sha256: hex::encode(sha_digest),
                validation_score: validation.score,
                is_partial: validation.is_partial,
                method: RecoveryMethod::Carving,
                status,
                discovered_at: Utc::now(),
                original_filename: None,
                declared_size: None,
                signature_id: Some(sig.id.to_string()),
                path: Some(path),
            };

            state.found_offsets.insert(absolute);
            state.found_md5.insert(md5_hex);
            stats.count_record(&record);
            stats.bytes_recovered += record.size_bytes;
            debug!(
                offset = absolute,
                sig = sig.id,
                score = validation.score,
                "carved file"
            );
            ctx.push_record(record);
        }
        false
    }
}

impl Scanner for Carver {
    fn name(&self) -> &'static str {
        "signature-carver"
    }

    fn run(&self, ctx: &mut ScanContext) -> Result<ScanStats> {
        let registry = SignatureRegistry::global();
        let signatures = registry.select(&self.selection);
        let matcher = HeaderMatcher::new(&signatures)?;

        let device_size = ctx.device.size();
        let (chunk_size, per_file_cap) = match self.selection {
            SignatureSet::Quick => (2 * MIB as usize, 10 * MIB),
            _ => (
                optimal_chunk_size(device_size, available_memory()),
                20 * MIB,
            ),
        };
        let mode = effective_carving_mode(&self.selection, ctx.options.carving_mode);
        if mode == CarvingMode::Write {
            std::fs::create_dir_all(&ctx.options.output_dir)?;
        }

        info!(
            signatures = signatures.len(),
            chunk_size,
            ?mode,
            device_size,
            "starting carving pass"
        );

        let mut stats = ScanStats::default();
        stats.total_sectors = device_size.unwrap_or(0) / 512;

        let mut state = CarveState {
            mode,
            per_file_cap,
            write_cap: device_size
                .map(|s| (2 * s).min(WRITE_CAP_BYTES))
                .unwrap_or(WRITE_CAP_BYTES),
            found_offsets: BTreeSet::new(),
            found_md5: HashSet::new(),
            written_bytes: 0,
        };

        let mut buffer: Vec<u8> = Vec::with_capacity(chunk_size + OVERLAP_BYTES);
        let mut device_offset: u64 = 0;
        let mut chunk = vec![0u8; chunk_size];
        let mut consecutive_errors = 0u32;

        ctx.device.seek(0)?;
        loop {
            if ctx.cancelled() {
                info!("carving cancelled");
                break;
            }

            let n = match ctx.device.read(&mut chunk) {
                Ok(n) => {
                    consecutive_errors = 0;
                    n
                }
                Err(e) => {
                    // Skip the unreadable region and keep going.
                    debug!(error = %e, "chunk read failed, skipping region");
                    consecutive_errors += 1;
                    if consecutive_errors > 16 {
                        break;
                    }
                    let next = ctx.device.position() + chunk_size as u64;
                    ctx.device.seek(next)?;
                    continue;
                }
            };

            if n == 0 {
                // End of device: the retained tail gets a full-width search.
                self.scan_buffer(
                    ctx,
                    &matcher,
                    &buffer,
                    device_offset,
                    buffer.len(),
                    &mut state,
                    &mut stats,
                );
                break;
            }

            buffer.extend_from_slice(&chunk[..n]);
            stats.bytes_scanned += n as u64;
            stats.sectors_scanned = stats.bytes_scanned / 512;

            let limit = buffer.len().saturating_sub(OVERLAP_BYTES);
            let stop = self.scan_buffer(
                ctx,
                &matcher,
                &buffer,
                device_offset,
                limit,
                &mut state,
                &mut stats,
            );
            if stop {
                break;
            }

            if let Some(total) = device_size {
                let percent = (stats.bytes_scanned as f64 / total as f64) * 100.0;
                ctx.emit(
                    percent.min(99.0),
                    stats.sectors_scanned,
                    stats.total_sectors,
                    "carving",
                );
            }

            if buffer.len() > OVERLAP_BYTES {
                let cut = buffer.len() - OVERLAP_BYTES;
                device_offset += cut as u64;
                buffer.drain(..cut);
            }
        }

        ctx.emit_final(
            100.0,
            stats.sectors_scanned,
            stats.total_sectors,
            "carving_complete",
        );
        info!(
            files = stats.files_found,
            scanned = stats.bytes_scanned,
            "carving pass finished"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(id: &str) -> &'static Signature {
        SignatureRegistry::global().by_id(id).unwrap()
    }

    #[test]
    fn chunk_size_clamps() {
        assert_eq!(optimal_chunk_size(None, 64 * GIB), 10 * MIB as usize);
        assert_eq!(optimal_chunk_size(None, 32 * MIB), MIB as usize);
        // Small devices hold the chunk at 2 MiB even with plenty of memory.
        assert_eq!(
            optimal_chunk_size(Some(512 * MIB), 64 * GIB),
            2 * MIB as usize
        );
    }

    #[test]
    fn jpeg_end_detection_requires_eoi() {
        let mut buffer = vec![0x11u8; 4096];
        buffer[0..3].copy_from_slice(&[0xFF, 0xD8, 0xFF]);
        assert_eq!(end_of_candidate(&buffer, 0, sig("jpg"), 10 * MIB), None);

        buffer[2000] = 0xFF;
        buffer[2001] = 0xD9;
        assert_eq!(
            end_of_candidate(&buffer, 0, sig("jpg"), 10 * MIB),
            Some(2002)
        );
    }

    #[test]
    fn zip_end_includes_eocd_record() {
        let mut buffer = vec![0u8; 4096];
        buffer[0..4].copy_from_slice(b"PK\x03\x04");
        buffer[2000..2004].copy_from_slice(b"PK\x05\x06");
        assert_eq!(
            end_of_candidate(&buffer, 0, sig("zip"), 10 * MIB),
            Some(2022)
        );
    }

    #[test]
    fn wav_end_uses_riff_size() {
        let mut buffer = vec![0u8; 8192];
        buffer[0..4].copy_from_slice(b"RIFF");
        buffer[4..8].copy_from_slice(&2000u32.to_le_bytes());
        assert_eq!(
            end_of_candidate(&buffer, 0, sig("wav"), 10 * MIB),
            Some(2008)
        );

        // Declared size runs past the buffer: strict reject.
        buffer[4..8].copy_from_slice(&100_000u32.to_le_bytes());
        assert_eq!(end_of_candidate(&buffer, 0, sig("wav"), 10 * MIB), None);

        // Implausibly small RIFF size.
        buffer[4..8].copy_from_slice(&10u32.to_le_bytes());
        assert_eq!(end_of_candidate(&buffer, 0, sig("wav"), 10 * MIB), None);
    }

    #[test]
    fn unterminated_formats_fall_back_to_cap() {
        let buffer = vec![0u8; 8192];
        // bmp has no footer; candidate is clipped at the cap or buffer end.
        assert_eq!(
            end_of_candidate(&buffer, 100, sig("bmp"), 4096),
            Some(100 + 4096)
        );
        assert_eq!(
            end_of_candidate(&buffer, 8000, sig("bmp"), 4096),
            Some(8192)
        );
    }
}
