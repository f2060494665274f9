//! NTFS MFT parser.
//!
//! Walks fixed-size 1024-byte MFT entries sequentially and recovers files
//! whose entries are marked not-in-use. Resident DATA payloads come straight
//! out of the entry; non-resident payloads are reassembled from decoded data
//! runs. Entries that fail their magic check (including `BAAD` fixup
//! casualties) are skipped, never treated as an error.

use byteorder::{ByteOrder, LittleEndian};
use chrono::Utc;
use tracing::{debug, info};

use crate::device::RawDevice;
use crate::error::{EngineError, Result};
use crate::job::{ScanContext, Scanner};
use crate::types::{FileRecord, RecordStatus, RecoveryMethod, ScanStats};
use crate::util::{all_zero, sanitize_filename};

pub const MFT_ENTRY_SIZE: usize = 1024;
/// Upper bound on the sequential walk, mirroring the drive-size heuristic.
const MAX_MFT_ENTRIES: u64 = 5_000_000;
/// Non-resident payloads are truncated here to bound memory; anything
/// larger is indexed with a partial flag.
pub const MAX_NONRESIDENT_BYTES: u64 = 100 * 1024 * 1024;
/// Leniency gate: entries whose payload is shorter than this, or starts
/// with nothing but zeros, were overwritten and are not worth indexing.
const MIN_PAYLOAD_BYTES: usize = 100;

const ATTR_FILE_NAME: u32 = 0x30;
const ATTR_DATA: u32 = 0x80;
const ATTR_END: u32 = 0xFFFF_FFFF;

/// Fields of the NTFS boot sector the parser needs.
#[derive(Debug, Clone, Copy)]
pub struct NtfsBootSector {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub mft_lcn: u64,
}

impl NtfsBootSector {
    /// Requires the `"NTFS    "` OEM id at bytes 3..11 and sane geometry.
    pub fn parse(sector: &[u8]) -> Option<NtfsBootSector> {
        if sector.len() < 512 || &sector[3..11] != b"NTFS    " {
            return None;
        }
        let bytes_per_sector = LittleEndian::read_u16(&sector[0x0B..0x0D]);
        let sectors_per_cluster = sector[0x0D];
        let mft_lcn = LittleEndian::read_u64(&sector[0x30..0x38]);
        if bytes_per_sector < 512 || sectors_per_cluster == 0 || mft_lcn == 0 {
            return None;
        }
        Some(NtfsBootSector {
            bytes_per_sector,
            sectors_per_cluster,
            mft_lcn,
        })
    }

    pub fn cluster_size(&self) -> u64 {
        self.bytes_per_sector as u64 * self.sectors_per_cluster as u64
    }

    pub fn mft_offset(&self) -> u64 {
        self.mft_lcn * self.cluster_size()
    }
}

/// One decoded data run. `lcn` is `None` for sparse runs, which read as
/// zeros.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataRun {
    pub lcn: Option<u64>,
    pub clusters: u64,
}

/// Decodes an NTFS data-run list. Each run starts with a header byte whose
/// low nibble is the size of the length field and whose high nibble is the
/// size of the offset field; offsets are signed and relative to the
/// previous run's LCN.
pub fn parse_data_runs(bytes: &[u8]) -> Vec<DataRun> {
    let mut runs = Vec::new();
    let mut pos = 0usize;
    let mut current_lcn: i64 = 0;

    while pos < bytes.len() {
        let header = bytes[pos];
        if header == 0 {
            break;
        }
        let length_size = (header & 0x0F) as usize;
        let offset_size = (header >> 4) as usize;
        if length_size == 0
            || length_size > 8
            || offset_size > 8
            || pos + 1 + length_size + offset_size > bytes.len()
        {
            break;
        }
        pos += 1;

        let clusters = LittleEndian::read_uint(&bytes[pos..pos + length_size], length_size);
        pos += length_size;

        if offset_size == 0 {
            runs.push(DataRun {
                lcn: None,
                clusters,
            });
            continue;
        }

        let delta = LittleEndian::read_int(&bytes[pos..pos + offset_size], offset_size);
        pos += offset_size;
        current_lcn += delta;
        if current_lcn < 0 {
            break;
        }
        runs.push(DataRun {
            lcn: Some(current_lcn as u64),
            clusters,
        });
    }

    runs
}

/// Reads up to `want` payload bytes across `runs`. Returns the assembled
/// data and whether a device read cut the assembly short.
fn read_data_runs(
    device: &mut RawDevice,
    runs: &[DataRun],
    bytes_per_cluster: u64,
    want: u64,
) -> (Vec<u8>, bool) {
    let mut out: Vec<u8> = Vec::with_capacity(want.min(1 << 20) as usize);

    for run in runs {
        if out.len() as u64 >= want {
            break;
        }
        let run_bytes = run.clusters.saturating_mul(bytes_per_cluster);
        let take = run_bytes.min(want - out.len() as u64) as usize;
        match run.lcn {
            None => out.resize(out.len() + take, 0),
            Some(lcn) => match device.read_at(lcn * bytes_per_cluster, take) {
                Ok(chunk) => {
                    let short = chunk.len() < take;
                    out.extend_from_slice(&chunk);
                    if short {
                        return (out, true);
                    }
                }
                Err(e) => {
                    debug!(lcn, error = %e, "data run read failed, keeping partial payload");
                    return (out, true);
                }
            },
        }
    }

    (out, false)
}

struct ParsedEntry {
    filename: String,
    payload: Vec<u8>,
    declared_size: u64,
    /// Absolute device offset where the payload's first byte lives.
    payload_offset: u64,
    truncated: bool,
}

/// Extracts filename and DATA payload from one deleted MFT entry.
fn parse_entry(
    entry: &[u8],
    entry_offset: u64,
    device: &mut RawDevice,
    bytes_per_cluster: u64,
) -> Option<ParsedEntry> {
    let first_attr = LittleEndian::read_u16(&entry[0x14..0x16]) as usize;
    if first_attr == 0 || first_attr >= entry.len() {
        return None;
    }

    let mut filename: Option<(String, u8)> = None;
    let mut payload: Option<(Vec<u8>, u64, u64, bool)> = None;

    let mut offset = first_attr;
    while offset + 8 <= entry.len() {
        let attr_type = LittleEndian::read_u32(&entry[offset..offset + 4]);
        if attr_type == ATTR_END {
            break;
        }
        let attr_len = LittleEndian::read_u32(&entry[offset + 4..offset + 8]) as usize;
        if attr_len == 0 || attr_len > entry.len() || offset + attr_len > entry.len() {
            break;
        }
        let non_resident = entry[offset + 8] != 0;

        match attr_type {
            // FILE_NAME is always resident.
            ATTR_FILE_NAME if !non_resident && offset + 0x16 <= entry.len() => {
                if let Some((name, namespace)) = parse_file_name(entry, offset) {
                    let replace = match &filename {
                        None => true,
                        // Win32 namespaces (1, 3) win over DOS 8.3 (2).
                        Some((_, existing_ns)) => {
                            matches!(namespace, 1 | 3) && !matches!(*existing_ns, 1 | 3)
                        }
                    };
                    if replace {
                        filename = Some((name, namespace));
                    }
                }
            }
            ATTR_DATA if payload.is_none() => {
                if non_resident {
                    payload = parse_non_resident_data(
                        entry,
                        offset,
                        attr_len,
                        device,
                        bytes_per_cluster,
                    );
                } else {
                    payload = parse_resident_data(entry, offset, entry_offset);
                }
            }
            _ => {}
        }

        offset += attr_len;
    }

    let (filename, _) = filename?;
    let (payload, declared_size, payload_offset, truncated) = payload?;
    Some(ParsedEntry {
        filename,
        payload,
        declared_size,
        payload_offset,
        truncated,
    })
}

/// FILE_NAME content layout: length in characters at +0x40, namespace at
/// +0x41, UTF-16LE name at +0x42.
fn parse_file_name(entry: &[u8], attr_offset: usize) -> Option<(String, u8)> {
    let content_offset = LittleEndian::read_u16(&entry[attr_offset + 0x14..attr_offset + 0x16]) as usize;
    let content_len = LittleEndian::read_u32(&entry[attr_offset + 0x10..attr_offset + 0x14]) as usize;
    if content_len < 0x42 {
        return None;
    }
    let content = attr_offset + content_offset;
    if content + 0x42 > entry.len() {
        return None;
    }
    let name_chars = entry[content + 0x40] as usize;
    let namespace = entry[content + 0x41];
    if name_chars == 0 || name_chars >= 256 {
        return None;
    }
    let name_start = content + 0x42;
    let name_bytes = name_chars * 2;
    if name_start + name_bytes > entry.len() {
        return None;
    }
    let units: Vec<u16> = entry[name_start..name_start + name_bytes]
        .chunks_exact(2)
        .map(LittleEndian::read_u16)
        .collect();
    let name = String::from_utf16_lossy(&units).trim().to_string();
    if name.is_empty() {
        return None;
    }
    Some((name, namespace))
}

fn parse_resident_data(
    entry: &[u8],
    attr_offset: usize,
    entry_offset: u64,
) -> Option<(Vec<u8>, u64, u64, bool)> {
    if attr_offset + 0x18 > entry.len() {
        return None;
    }
    let content_offset = LittleEndian::read_u16(&entry[attr_offset + 0x14..attr_offset + 0x16]) as usize;
    let content_len = LittleEndian::read_u32(&entry[attr_offset + 0x10..attr_offset + 0x14]) as usize;
    if content_len == 0 {
        return None;
    }
    let start = attr_offset + content_offset;
    if start + content_len > entry.len() {
        return None;
    }
    let data = entry[start..start + content_len].to_vec();
    let absolute = entry_offset + start as u64;
    Some((data, content_len as u64, absolute, false))
}

fn parse_non_resident_data(
    entry: &[u8],
    attr_offset: usize,
    attr_len: usize,
    device: &mut RawDevice,
    bytes_per_cluster: u64,
) -> Option<(Vec<u8>, u64, u64, bool)> {
    if attr_len < 0x40 || attr_offset + 0x40 > entry.len() {
        return None;
    }
    let declared = LittleEndian::read_u64(&entry[attr_offset + 0x30..attr_offset + 0x38]);
    let runs_offset = LittleEndian::read_u16(&entry[attr_offset + 0x20..attr_offset + 0x22]) as usize;
    if declared == 0 || runs_offset == 0 || attr_offset + runs_offset >= attr_offset + attr_len {
        return None;
    }
    let runs = parse_data_runs(&entry[attr_offset + runs_offset..attr_offset + attr_len]);
    // A leading sparse run leaves no byte to anchor extraction on.
    let first_lcn = runs.first().and_then(|r| r.lcn)?;

    // A record carries a single offset and extraction re-reads one flat
    // span from it, so only the leading physically contiguous runs can be
    // promised. Everything past the first gap (or sparse hole) is left out
    // of the indexed payload and the file is flagged partial instead.
    let contiguous_bytes = contiguous_prefix_bytes(&runs, bytes_per_cluster);

    let want = declared.min(MAX_NONRESIDENT_BYTES).min(contiguous_bytes);
    if want == 0 {
        return None;
    }
    let (data, short_read) = read_data_runs(device, &runs, bytes_per_cluster, want);
    if data.is_empty() {
        return None;
    }
    let truncated = short_read || declared > data.len() as u64;
    Some((data, declared, first_lcn * bytes_per_cluster, truncated))
}

/// Bytes covered by the leading run of physically adjacent clusters. Stops
/// at the first sparse run or LCN discontinuity.
fn contiguous_prefix_bytes(runs: &[DataRun], bytes_per_cluster: u64) -> u64 {
    let mut total: u64 = 0;
    let mut next_lcn = match runs.first().and_then(|r| r.lcn) {
        Some(lcn) => lcn,
        None => return 0,
    };
    for run in runs {
        match run.lcn {
            Some(lcn) if lcn == next_lcn => {
                total = total.saturating_add(run.clusters.saturating_mul(bytes_per_cluster));
                next_lcn = lcn.saturating_add(run.clusters);
            }
            _ => break,
        }
    }
    total
}

/// Recovers deleted files by walking the MFT.
pub struct MftParser;

impl MftParser {
    pub fn detect(device: &mut RawDevice) -> Result<bool> {
        let sector = device.read_at(0, 512)?;
        Ok(NtfsBootSector::parse(&sector).is_some())
    }
}

/// Entry 0 describes `$MFT` itself; its declared DATA size bounds how many
/// entries the table actually holds. Only trusted when the entry looks like
/// a live `$MFT` record (in use, non-resident data).
fn mft_table_entries(device: &mut RawDevice, mft_offset: u64) -> Option<u64> {
    let entry = device.read_at(mft_offset, MFT_ENTRY_SIZE).ok()?;
    if entry.len() < MFT_ENTRY_SIZE || &entry[..4] != b"FILE" {
        return None;
    }
    let flags = LittleEndian::read_u16(&entry[0x16..0x18]);
    if flags & 0x01 == 0 {
        return None;
    }

    let first_attr = LittleEndian::read_u16(&entry[0x14..0x16]) as usize;
    if first_attr == 0 || first_attr >= entry.len() {
        return None;
    }
    let mut offset = first_attr;
    while offset + 8 <= entry.len() {
        let attr_type = LittleEndian::read_u32(&entry[offset..offset + 4]);
        if attr_type == ATTR_END {
            break;
        }
        let attr_len = LittleEndian::read_u32(&entry[offset + 4..offset + 8]) as usize;
        if attr_len == 0 || offset + attr_len > entry.len() {
            break;
        }
        if attr_type == ATTR_DATA && entry[offset + 8] != 0 && offset + 0x38 <= entry.len() {
            let declared = LittleEndian::read_u64(&entry[offset + 0x30..offset + 0x38]);
            if declared >= MFT_ENTRY_SIZE as u64 {
                return Some(declared / MFT_ENTRY_SIZE as u64);
            }
        }
        offset += attr_len;
    }
    None
}

impl Scanner for MftParser {
    fn name(&self) -> &'static str {
        "ntfs-mft"
    }

    fn run(&self, ctx: &mut ScanContext) -> Result<ScanStats> {
        let sector = ctx.device.read_at(0, 512)?;
        let boot = NtfsBootSector::parse(&sector)
            .ok_or_else(|| EngineError::FilesystemUnrecognized(ctx.target.clone()))?;

        let bytes_per_cluster = boot.cluster_size();
        let mft_offset = boot.mft_offset();
        let device_size = ctx.device.size();
        let mut estimated_entries = device_size
            .map(|s| (s / MFT_ENTRY_SIZE as u64).min(MAX_MFT_ENTRIES))
            .unwrap_or(1_000_000)
            .max(1);
        // A live $MFT record gives the exact table length, which beats the
        // device-size estimate.
        if let Some(table_entries) = mft_table_entries(&mut ctx.device, mft_offset) {
            estimated_entries = estimated_entries.min(table_entries);
        }

        info!(
            bytes_per_cluster,
            mft_offset, estimated_entries, "scanning MFT for deleted files"
        );

        let mut stats = ScanStats::default();
        stats.total_sectors = estimated_entries * (MFT_ENTRY_SIZE as u64 / 512);
        let mut consecutive_errors = 0u32;

        for entry_num in 0..estimated_entries {
            if entry_num % 100 == 0 {
                if ctx.cancelled() {
                    info!(entry_num, "MFT scan cancelled");
                    break;
                }
                let percent = (entry_num as f64 / estimated_entries as f64) * 100.0;
                ctx.emit(
                    percent.min(99.0),
                    stats.sectors_scanned,
                    stats.total_sectors,
                    "mft_scan",
                );
            }

            let entry_offset = mft_offset + entry_num * MFT_ENTRY_SIZE as u64;
            let entry = match ctx.device.read_at(entry_offset, MFT_ENTRY_SIZE) {
                Ok(e) => e,
                Err(e) => {
                    debug!(entry_num, error = %e, "MFT entry read failed");
                    consecutive_errors += 1;
                    if consecutive_errors > 100 {
                        break;
                    }
                    continue;
                }
            };
            consecutive_errors = 0;
            if entry.len() < MFT_ENTRY_SIZE {
                break;
            }

            stats.entries_parsed += 1;
            stats.sectors_scanned += MFT_ENTRY_SIZE as u64 / 512;
            stats.bytes_scanned += MFT_ENTRY_SIZE as u64;

            if &entry[..4] != b"FILE" {
                continue;
            }

            let flags = LittleEndian::read_u16(&entry[0x16..0x18]);
            let in_use = flags & 0x01 != 0;
            let is_directory = flags & 0x02 != 0;
            if in_use || is_directory {
                continue;
            }

            let Some(parsed) = parse_entry(&entry, entry_offset, &mut ctx.device, bytes_per_cluster)
            else {
                continue;
            };

            if parsed.payload.len() < MIN_PAYLOAD_BYTES {
                stats.rejects.too_small += 1;
                continue;
            }
            if all_zero(&parsed.payload[..MIN_PAYLOAD_BYTES]) {
                stats.rejects.no_data += 1;
                continue;
            }

            let safe_name = sanitize_filename(&parsed.filename);
            let extension = safe_name
                .rsplit_once('.')
                .map(|(_, e)| e.to_ascii_lowercase())
                .unwrap_or_else(|| "dat".to_string());

            let (md5_digest, sha_digest) = rayon::join(
                || md5::compute(&parsed.payload),
                || <sha2::Sha256 as sha2::Digest>::digest(&parsed.payload),
            );

            let record = FileRecord {
                name: safe_name,
                extension,
                size_bytes: parsed.payload.len() as u64,
                source_offset: parsed.payload_offset,
                source_device: ctx.target.clone(),
                md5: format!("{md5_digest:x}"),
                sha256: hex::encode(sha_digest),
                validation_score: 100,
                is_partial: parsed.truncated,
                method: RecoveryMethod::Mft,
                status: RecordStatus::Indexed,
                discovered_at: Utc::now(),
                original_filename: Some(parsed.filename),
                declared_size: Some(parsed.declared_size),
                signature_id: None,
                path: None,
            };
            stats.count_record(&record);
            debug!(name = %record.name, size = record.size_bytes, "indexed deleted file");
            ctx.push_record(record);
        }

        ctx.emit_final(
            100.0,
            stats.sectors_scanned,
            stats.total_sectors,
            "mft_complete",
        );
        info!(
            entries = stats.entries_parsed,
            files = stats.files_found,
            "MFT scan finished"
        );
        Ok(stats)
    }
}
