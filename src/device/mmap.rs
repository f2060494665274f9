//! Memory-mapped backend for disk image files.

use std::fs::OpenOptions;
use std::path::Path;

use memmap2::Mmap;

use crate::error::{EngineError, Result};

use super::{open_error, DeviceBackend};

/// Maps a whole image file and serves reads by copying out of the map.
/// Cheapest option for repeated random access over `.img` captures.
#[derive(Debug)]
pub struct MmapBackend {
    mmap: Mmap,
    position: u64,
}

impl MmapBackend {
    pub fn open(path: &str) -> Result<MmapBackend> {
        let file = OpenOptions::new()
            .read(true)
            .open(Path::new(path))
            .map_err(|e| open_error(path, e))?;

        let metadata = file.metadata()?;
        if !metadata.is_file() || metadata.len() == 0 {
            return Err(EngineError::UnsupportedDevice(format!(
                "{path} is not a mappable image file"
            )));
        }

        let mmap = unsafe { Mmap::map(&file) }?;
        Ok(MmapBackend { mmap, position: 0 })
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.mmap
    }
}

impl DeviceBackend for MmapBackend {
    fn seek(&mut self, offset: u64) -> Result<()> {
        self.position = offset;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let len = self.mmap.len() as u64;
        if self.position >= len {
            return Ok(0);
        }
        let start = self.position as usize;
        let n = buf.len().min(self.mmap.len() - start);
        buf[..n].copy_from_slice(&self.mmap[start..start + n]);
        self.position += n as u64;
        Ok(n)
    }

    fn size(&self) -> Option<u64> {
        Some(self.mmap.len() as u64)
    }
}
