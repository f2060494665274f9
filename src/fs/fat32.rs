//! FAT32 directory parser.
//!
//! Deleted files keep their 32-byte directory entry with the first name
//! byte replaced by 0xE5. The FAT chain of a deleted file is usually
//! invalidated, so data is read sequentially from the start cluster rather
//! than by following the chain.

use byteorder::{ByteOrder, LittleEndian};
use chrono::Utc;
use tracing::{debug, info};

use crate::device::RawDevice;
use crate::error::{EngineError, Result};
use crate::job::{ScanContext, Scanner};
use crate::types::{FileRecord, RecordStatus, RecoveryMethod, ScanStats};
use crate::util::sanitize_filename;

const DIR_ENTRY_SIZE: usize = 32;
const DELETED_MARKER: u8 = 0xE5;
const ATTR_DIRECTORY: u8 = 0x10;
const ATTR_VOLUME_LABEL: u8 = 0x08;
/// How many data-region clusters are walked for directory entries.
const MAX_DIRECTORY_CLUSTERS: u64 = 1000;
/// Sequential read cap per deleted file.
pub const MAX_FILE_BYTES: u64 = 50 * 1024 * 1024;

/// BPB fields needed to locate the data region.
#[derive(Debug, Clone, Copy)]
pub struct Fat32BootSector {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub num_fats: u8,
    pub sectors_per_fat: u32,
    pub root_cluster: u32,
}

impl Fat32BootSector {
    /// Requires the `"FAT32   "` type string at bytes 82..90.
    pub fn parse(sector: &[u8]) -> Option<Fat32BootSector> {
        if sector.len() < 512 || &sector[0x52..0x5A] != b"FAT32   " {
            return None;
        }
        let parsed = Fat32BootSector {
            bytes_per_sector: LittleEndian::read_u16(&sector[0x0B..0x0D]),
            sectors_per_cluster: sector[0x0D],
            reserved_sectors: LittleEndian::read_u16(&sector[0x0E..0x10]),
            num_fats: sector[0x10],
            sectors_per_fat: LittleEndian::read_u32(&sector[0x24..0x28]),
            root_cluster: LittleEndian::read_u32(&sector[0x2C..0x30]),
        };
        let sane = parsed.bytes_per_sector >= 512
            && parsed.sectors_per_cluster > 0
            && parsed.num_fats > 0
            && parsed.sectors_per_fat > 0
            && parsed.root_cluster >= 2;
        sane.then_some(parsed)
    }

    pub fn bytes_per_cluster(&self) -> u64 {
        self.bytes_per_sector as u64 * self.sectors_per_cluster as u64
    }

    /// First byte of the data region (cluster 2).
    pub fn data_offset(&self) -> u64 {
        (self.reserved_sectors as u64
            + self.num_fats as u64 * self.sectors_per_fat as u64)
            * self.bytes_per_sector as u64
    }

    pub fn cluster_offset(&self, cluster: u32) -> u64 {
        self.data_offset() + (cluster as u64 - 2) * self.bytes_per_cluster()
    }
}

/// Rebuilds a name from an 8.3 directory entry whose first byte was
/// overwritten by the deletion marker.
fn reconstruct_short_name(entry: &[u8]) -> (String, String) {
    let base: String = std::iter::once('_')
        .chain(
            entry[1..8]
                .iter()
                .map(|&b| b as char)
                .take_while(|c| *c != ' '),
        )
        .collect();
    let ext: String = entry[8..11]
        .iter()
        .map(|&b| b as char)
        .take_while(|c| *c != ' ')
        .collect();
    let name = if ext.is_empty() {
        base.clone()
    } else {
        format!("{base}.{ext}")
    };
    (name, ext.to_ascii_lowercase())
}

/// Recovers deleted files from FAT32 directory entries.
pub struct FatParser;

impl FatParser {
    pub fn detect(device: &mut RawDevice) -> Result<bool> {
        let sector = device.read_at(0, 512)?;
        Ok(Fat32BootSector::parse(&sector).is_some())
    }
}

impl Scanner for FatParser {
    fn name(&self) -> &'static str {
        "fat32-directory"
    }

    fn run(&self, ctx: &mut ScanContext) -> Result<ScanStats> {
        let sector = ctx.device.read_at(0, 512)?;
        let boot = Fat32BootSector::parse(&sector)
            .ok_or_else(|| EngineError::FilesystemUnrecognized(ctx.target.clone()))?;

        let bytes_per_cluster = boot.bytes_per_cluster();
        let data_offset = boot.data_offset();
        info!(
            bytes_per_cluster,
            data_offset,
            root_cluster = boot.root_cluster,
            "scanning FAT32 directory entries"
        );

        let mut stats = ScanStats::default();
        stats.total_sectors = MAX_DIRECTORY_CLUSTERS * boot.sectors_per_cluster as u64;

        'clusters: for cluster_num in 0..MAX_DIRECTORY_CLUSTERS {
            if cluster_num % 100 == 0 {
                if ctx.cancelled() {
                    info!(cluster_num, "FAT32 scan cancelled");
                    break;
                }
                let percent = (cluster_num as f64 / MAX_DIRECTORY_CLUSTERS as f64) * 100.0;
                ctx.emit(
                    percent.min(99.0),
                    stats.sectors_scanned,
                    stats.total_sectors,
                    "fat_scan",
                );
            }

            let cluster_offset = data_offset + cluster_num * bytes_per_cluster;
            let cluster = match ctx.device.read_at(cluster_offset, bytes_per_cluster as usize) {
                Ok(c) => c,
                Err(e) => {
                    debug!(cluster_num, error = %e, "cluster read failed");
                    continue;
                }
            };
            if cluster.len() < DIR_ENTRY_SIZE {
                // Past the end of the device.
                break;
            }
            stats.sectors_scanned += boot.sectors_per_cluster as u64;
            stats.bytes_scanned += cluster.len() as u64;

            for entry_start in (0..cluster.len()).step_by(DIR_ENTRY_SIZE) {
                if entry_start + DIR_ENTRY_SIZE > cluster.len() {
                    break;
                }
                let entry = &cluster[entry_start..entry_start + DIR_ENTRY_SIZE];
                stats.entries_parsed += 1;

                if entry[0] != DELETED_MARKER {
                    continue;
                }
                let attributes = entry[0x0B];
                if attributes & ATTR_DIRECTORY != 0 || attributes & ATTR_VOLUME_LABEL != 0 {
                    continue;
                }

                let (name, extension) = reconstruct_short_name(entry);
                let declared_size = LittleEndian::read_u32(&entry[0x1C..0x20]) as u64;
                let cluster_high = LittleEndian::read_u16(&entry[0x14..0x16]) as u32;
                let cluster_low = LittleEndian::read_u16(&entry[0x1A..0x1C]) as u32;
                let start_cluster = (cluster_high << 16) | cluster_low;

                if start_cluster < 2 {
                    stats.rejects.no_data += 1;
                    continue;
                }

                let file_offset = boot.cluster_offset(start_cluster);
                let want = declared_size.min(MAX_FILE_BYTES) as usize;
                let data = match ctx.device.read_at(file_offset, want) {
                    Ok(d) => d,
                    Err(e) => {
                        debug!(start_cluster, error = %e, "file data read failed");
                        stats.rejects.no_data += 1;
                        continue;
                    }
                };
                if data.is_empty() {
                    stats.rejects.no_data += 1;
                    continue;
                }

                let (md5_digest, sha_digest) = rayon::join(
                    || md5::compute(&data),
                    || <sha2::Sha256 as sha2::Digest>::digest(&data),
                );

                let safe_name = sanitize_filename(&name);
                let record = FileRecord {
                    name: format!("fat_{cluster_num}_{safe_name}"),
                    extension: if extension.is_empty() {
                        "dat".to_string()
                    } else {
                        extension
                    },
                    size_bytes: data.len() as u64,
                    source_offset: file_offset,
                    source_device: ctx.target.clone(),
                    md5: format!("{md5_digest:x}"),
                    sha256: hex::encode(sha_digest),
                    validation_score: 100,
                    is_partial: (data.len() as u64) < declared_size,
                    method: RecoveryMethod::Fat32,
                    status: RecordStatus::Indexed,
                    discovered_at: Utc::now(),
                    original_filename: Some(name),
                    declared_size: Some(declared_size),
                    signature_id: None,
                    path: None,
                };
                stats.count_record(&record);
                debug!(name = %record.name, size = record.size_bytes, "indexed deleted file");
                ctx.push_record(record);

                if ctx.cancelled() {
                    break 'clusters;
                }
            }
        }

        ctx.emit_final(
            100.0,
            stats.sectors_scanned,
            stats.total_sectors,
            "fat_complete",
        );
        info!(
            entries = stats.entries_parsed,
            files = stats.files_found,
            "FAT32 scan finished"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boot_sector() -> Vec<u8> {
        let mut sector = vec![0u8; 512];
        LittleEndian::write_u16(&mut sector[0x0B..0x0D], 512);
        sector[0x0D] = 8; // 4 KiB clusters
        LittleEndian::write_u16(&mut sector[0x0E..0x10], 32);
        sector[0x10] = 2;
        LittleEndian::write_u32(&mut sector[0x24..0x28], 100);
        LittleEndian::write_u32(&mut sector[0x2C..0x30], 2);
        sector[0x52..0x5A].copy_from_slice(b"FAT32   ");
        sector
    }

    #[test]
    fn bpb_geometry() {
        let boot = Fat32BootSector::parse(&boot_sector()).unwrap();
        assert_eq!(boot.bytes_per_cluster(), 4096);
        // (32 reserved + 2 * 100 FAT sectors) * 512
        assert_eq!(boot.data_offset(), 232 * 512);
        assert_eq!(boot.cluster_offset(2), boot.data_offset());
        assert_eq!(boot.cluster_offset(3), boot.data_offset() + 4096);
    }

    #[test]
    fn detection_requires_type_string() {
        let mut sector = boot_sector();
        assert!(Fat32BootSector::parse(&sector).is_some());
        sector[0x52] = b'N';
        assert!(Fat32BootSector::parse(&sector).is_none());
    }

    #[test]
    fn short_name_reconstruction() {
        let mut entry = [0x20u8; 32];
        entry[0] = DELETED_MARKER;
        entry[1..5].copy_from_slice(b"HOTO");
        entry[8..11].copy_from_slice(b"JPG");
        let (name, ext) = reconstruct_short_name(&entry);
        assert_eq!(name, "_HOTO.JPG");
        assert_eq!(ext, "jpg");

        let mut bare = [0x20u8; 32];
        bare[0] = DELETED_MARKER;
        bare[1..3].copy_from_slice(b"AB");
        let (name, ext) = reconstruct_short_name(&bare);
        assert_eq!(name, "_AB");
        assert_eq!(ext, "");
    }
}
