//! Raw device access.
//!
//! A [`RawDevice`] wraps a platform backend behind a uniform seek/read
//! surface with 64-bit offsets. Raw volume handles only accept reads at
//! sector-aligned positions, so [`RawDevice::read_at`] performs an aligned
//! re-read and slices out the requested window.

mod file;
mod mmap;
#[cfg(windows)]
mod windows;

pub use file::FileBackend;
pub use mmap::MmapBackend;
#[cfg(windows)]
pub use windows::WindowsBackend;

use bytes::Bytes;

use crate::error::{EngineError, Result};

/// Default logical sector size.
pub const DEFAULT_SECTOR_SIZE: u32 = 512;

/// Low-level positioned reader implemented per platform.
pub trait DeviceBackend: Send {
    /// Absolute seek. Must accept offsets beyond 2^31.
    fn seek(&mut self, offset: u64) -> Result<()>;

    /// Reads into `buf`, returning the byte count. Short reads at the end
    /// of the device are success, not errors.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Total size in bytes, when the backend can determine it.
    fn size(&self) -> Option<u64>;
}

/// Whether the handle gives sector-level access or fell back to the mounted
/// filesystem. Strategies that parse on-disk structures reject `Mounted`
/// handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMode {
    Raw,
    Mounted,
}

/// Maps a user-facing device identifier to the path handed to the OS.
///
/// Drive letters become raw volume paths (`E:` -> `\\.\E:`); raw paths and
/// Unix device nodes or image files pass through untouched.
pub fn canonicalize(identifier: &str) -> String {
    if identifier.starts_with("\\\\.\\") {
        return identifier.to_string();
    }
    let bytes = identifier.as_bytes();
    if bytes.len() == 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        return format!("\\\\.\\{}:", (bytes[0] as char).to_ascii_uppercase());
    }
    identifier.to_string()
}

/// A read-only handle over a block source. Never mutates the underlying
/// device; closed on drop.
pub struct RawDevice {
    backend: Box<dyn DeviceBackend>,
    identifier: String,
    canonical: String,
    sector_size: u32,
    mode: DeviceMode,
    position: u64,
}

impl RawDevice {
    /// Opens the platform backend for `identifier`.
    pub fn open(identifier: &str) -> Result<RawDevice> {
        let canonical = canonicalize(identifier);

        #[cfg(windows)]
        {
            windows::open(identifier, &canonical)
        }
        #[cfg(not(windows))]
        {
            let backend = FileBackend::open(&canonical)?;
            Ok(RawDevice::from_backend(
                Box::new(backend),
                identifier,
                canonical,
                DeviceMode::Raw,
            ))
        }
    }

    /// Opens a disk image file through a memory map. Only regular files are
    /// mappable; device nodes must go through [`RawDevice::open`].
    pub fn open_mapped(identifier: &str) -> Result<RawDevice> {
        let backend = MmapBackend::open(identifier)?;
        Ok(RawDevice::from_backend(
            Box::new(backend),
            identifier,
            identifier.to_string(),
            DeviceMode::Raw,
        ))
    }

    pub(crate) fn from_backend(
        backend: Box<dyn DeviceBackend>,
        identifier: &str,
        canonical: String,
        mode: DeviceMode,
    ) -> RawDevice {
        RawDevice {
            backend,
            identifier: identifier.to_string(),
            canonical,
            sector_size: DEFAULT_SECTOR_SIZE,
            mode,
            position: 0,
        }
    }

    /// The identifier this device was opened with, preserved verbatim for
    /// `FileRecord::source_device`.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn canonical_path(&self) -> &str {
        &self.canonical
    }

    pub fn sector_size(&self) -> u32 {
        self.sector_size
    }

    pub fn mode(&self) -> DeviceMode {
        self.mode
    }

    pub fn size(&self) -> Option<u64> {
        self.backend.size()
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Absolute seek.
    pub fn seek(&mut self, offset: u64) -> Result<()> {
        self.backend.seek(offset)?;
        self.position = offset;
        Ok(())
    }

    /// Reads at the current position, advancing it. May return fewer bytes
    /// than `buf` holds; zero means end of device.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.backend.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    /// Fills `buf` as far as the device allows, looping over partial reads.
    pub fn read_full(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    /// Reads `len` bytes starting at an arbitrary `offset`.
    ///
    /// Raw handles require sector-aligned positions, so the read is aligned
    /// down to the containing sector, the length rounded up to a sector
    /// multiple, and the requested window sliced out of the result. A short
    /// slice at the end of the device is success.
    pub fn read_at(&mut self, offset: u64, len: usize) -> Result<Bytes> {
        if len == 0 {
            return Ok(Bytes::new());
        }
        let sector = self.sector_size as u64;
        let aligned_offset = offset - offset % sector;
        let adjust = (offset - aligned_offset) as usize;
        let aligned_len = (adjust + len).div_ceil(sector as usize) * sector as usize;

        self.seek(aligned_offset)?;
        let mut buf = vec![0u8; aligned_len];
        let n = self.read_full(&mut buf)?;
        if n <= adjust {
            return Ok(Bytes::new());
        }
        buf.truncate(n);
        let end = (adjust + len).min(buf.len());
        Ok(Bytes::from(buf).slice(adjust..end))
    }
}

impl std::fmt::Debug for RawDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawDevice")
            .field("identifier", &self.identifier)
            .field("canonical", &self.canonical)
            .field("sector_size", &self.sector_size)
            .field("mode", &self.mode)
            .field("size", &self.size())
            .finish()
    }
}

/// Maps an `io::Error` from opening `path` onto the engine's error kinds.
pub(crate) fn open_error(path: &str, err: std::io::Error) -> EngineError {
    match err.kind() {
        std::io::ErrorKind::PermissionDenied => EngineError::PermissionDenied(path.to_string()),
        std::io::ErrorKind::NotFound => EngineError::DeviceNotFound(path.to_string()),
        _ => EngineError::Io(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_maps_drive_letters() {
        assert_eq!(canonicalize("E:"), "\\\\.\\E:");
        assert_eq!(canonicalize("e:"), "\\\\.\\E:");
        assert_eq!(canonicalize("\\\\.\\PHYSICALDRIVE1"), "\\\\.\\PHYSICALDRIVE1");
        assert_eq!(canonicalize("/dev/sda"), "/dev/sda");
        assert_eq!(canonicalize("disk.img"), "disk.img");
    }

    #[test]
    fn alignment_math() {
        // offset 1000 in 512-byte sectors: aligned down to 512, 24 bytes of
        // slack, read length rounded up to cover the window.
        let sector = 512u64;
        let offset = 1000u64;
        let len = 600usize;
        let aligned = offset - offset % sector;
        let adjust = (offset - aligned) as usize;
        let aligned_len = (adjust + len).div_ceil(sector as usize) * sector as usize;
        assert_eq!(aligned, 512);
        assert_eq!(adjust, 488);
        assert_eq!(aligned_len, 1536);
    }
}
