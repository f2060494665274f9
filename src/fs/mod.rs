//! Filesystem-metadata recovery.
//!
//! Both parsers work from deleted directory structures: NTFS keeps dead
//! files visible in MFT entries, FAT32 marks them with a 0xE5 byte. Neither
//! parser trusts allocation state beyond that; data is read straight from
//! the clusters the metadata points at.

pub mod fat32;
pub mod ntfs;

pub use fat32::FatParser;
pub use ntfs::MftParser;

use crate::device::RawDevice;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilesystemKind {
    Ntfs,
    Fat32,
}

/// Probes the first sector for a known filesystem.
pub fn detect(device: &mut RawDevice) -> Result<Option<FilesystemKind>> {
    let sector = device.read_at(0, 512)?;
    if ntfs::NtfsBootSector::parse(&sector).is_some() {
        return Ok(Some(FilesystemKind::Ntfs));
    }
    if fat32::Fat32BootSector::parse(&sector).is_some() {
        return Ok(Some(FilesystemKind::Fat32));
    }
    Ok(None)
}
