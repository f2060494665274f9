//! Standard file backend for Unix device nodes and disk image files.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::Result;

use super::{open_error, DeviceBackend};

/// Reads through `std::fs::File`. Works for `/dev` block nodes, partitions
/// and plain image files; the file is opened read-only and never written.
#[derive(Debug)]
pub struct FileBackend {
    file: File,
    size: Option<u64>,
}

impl FileBackend {
    pub fn open(path: &str) -> Result<FileBackend> {
        let mut file = OpenOptions::new()
            .read(true)
            .open(Path::new(path))
            .map_err(|e| open_error(path, e))?;

        #[cfg(target_os = "linux")]
        {
            use rustix::fs::{fadvise, Advice};
            let _ = fadvise(&file, 0, None, Advice::Sequential);
        }

        let size = Self::probe_size(&mut file)?;
        Ok(FileBackend { file, size })
    }

    /// Regular files report their metadata length; block devices often
    /// report zero there, so fall back to seeking to the end.
    fn probe_size(file: &mut File) -> Result<Option<u64>> {
        let metadata = file.metadata()?;
        if metadata.is_file() {
            return Ok(Some(metadata.len()));
        }
        let end = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(0))?;
        Ok(if end > 0 { Some(end) } else { None })
    }
}

impl DeviceBackend for FileBackend {
    fn seek(&mut self, offset: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.file.read(buf)?)
    }

    fn size(&self) -> Option<u64> {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn reads_and_reports_size() {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(b"0123456789abcdef").unwrap();
        tmp.flush().unwrap();

        let mut backend = FileBackend::open(tmp.path().to_str().unwrap()).unwrap();
        assert_eq!(backend.size(), Some(16));

        backend.seek(10).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(backend.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
    }

    #[test]
    fn missing_path_maps_to_device_not_found() {
        let err = FileBackend::open("/no/such/device").unwrap_err();
        assert!(matches!(err, crate::error::EngineError::DeviceNotFound(_)));
    }
}
