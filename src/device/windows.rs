//! Windows raw volume backend.
//!
//! Raw sector access goes through `\\.\X:` / `\\.\PHYSICALDRIVEn` handles
//! opened with share-read so other processes keep working. When the raw
//! open is denied the volume is reopened through the normal file API and
//! the handle is marked [`DeviceMode::Mounted`] so structure-parsing
//! strategies can refuse it.

use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;
use std::ptr;

use windows_sys::Win32::Foundation::{
    CloseHandle, GetLastError, ERROR_ACCESS_DENIED, ERROR_FILE_NOT_FOUND, ERROR_PATH_NOT_FOUND,
    GENERIC_READ, HANDLE, INVALID_HANDLE_VALUE,
};
use windows_sys::Win32::Storage::FileSystem::{
    CreateFileW, GetFileSizeEx, ReadFile, SetFilePointer, SetFilePointerEx, FILE_BEGIN,
    FILE_CURRENT, FILE_SHARE_READ, FILE_SHARE_WRITE, INVALID_SET_FILE_POINTER, OPEN_EXISTING,
};

use crate::error::{EngineError, Result};

use super::{DeviceBackend, DeviceMode, FileBackend, RawDevice};

const SEEK_CHUNK: u64 = 1 << 30;

pub struct WindowsBackend {
    handle: HANDLE,
    size: Option<u64>,
}

// The handle is only touched through &mut self.
unsafe impl Send for WindowsBackend {}

fn wide(path: &str) -> Vec<u16> {
    OsStr::new(path).encode_wide().chain(Some(0)).collect()
}

/// Opens `canonical` raw first; on access denial, retries the mounted
/// volume through the file API so at least file-level reads keep working.
pub fn open(identifier: &str, canonical: &str) -> Result<RawDevice> {
    match WindowsBackend::open_raw(canonical) {
        Ok(backend) => Ok(RawDevice::from_backend(
            Box::new(backend),
            identifier,
            canonical.to_string(),
            DeviceMode::Raw,
        )),
        Err(EngineError::PermissionDenied(_)) if identifier.ends_with(':') => {
            tracing::warn!(
                device = identifier,
                "raw volume access denied, falling back to mounted mode"
            );
            let mounted = format!("{identifier}\\");
            let backend = FileBackend::open(&mounted)?;
            Ok(RawDevice::from_backend(
                Box::new(backend),
                identifier,
                mounted,
                DeviceMode::Mounted,
            ))
        }
        Err(e) => Err(e),
    }
}

impl WindowsBackend {
    pub fn open_raw(path: &str) -> Result<WindowsBackend> {
        let wide_path = wide(path);
        let handle = unsafe {
            CreateFileW(
                wide_path.as_ptr(),
                GENERIC_READ,
                FILE_SHARE_READ | FILE_SHARE_WRITE,
                ptr::null(),
                OPEN_EXISTING,
                0,
                ptr::null_mut(),
            )
        };
        if handle == INVALID_HANDLE_VALUE {
            let code = unsafe { GetLastError() };
            return Err(match code {
                ERROR_ACCESS_DENIED => EngineError::PermissionDenied(path.to_string()),
                ERROR_FILE_NOT_FOUND | ERROR_PATH_NOT_FOUND => {
                    EngineError::DeviceNotFound(path.to_string())
                }
                _ => EngineError::Io(std::io::Error::from_raw_os_error(code as i32)),
            });
        }

        let mut size: i64 = 0;
        let size = if unsafe { GetFileSizeEx(handle, &mut size) } != 0 && size > 0 {
            Some(size as u64)
        } else {
            // Volume handles refuse GetFileSizeEx; probe by seeking to end.
            Self::probe_size(handle)
        };

        Ok(WindowsBackend { handle, size })
    }

    fn probe_size(handle: HANDLE) -> Option<u64> {
        let mut end: i64 = 0;
        let ok = unsafe {
            SetFilePointerEx(handle, 0, &mut end, windows_sys::Win32::Storage::FileSystem::FILE_END)
        };
        let _ = unsafe { SetFilePointerEx(handle, 0, ptr::null_mut(), FILE_BEGIN) };
        if ok != 0 && end > 0 {
            Some(end as u64)
        } else {
            None
        }
    }

    /// 32-bit `SetFilePointer` dance for subsystems where the extended call
    /// fails: rewind, then walk forward in 1 GiB relative moves.
    fn seek_chunked(&mut self, offset: u64) -> Result<()> {
        let rewound = unsafe { SetFilePointer(self.handle, 0, ptr::null_mut(), FILE_BEGIN) };
        if rewound == INVALID_SET_FILE_POINTER {
            return Err(self.last_io_error(offset));
        }
        let mut remaining = offset;
        while remaining > 0 {
            let step = remaining.min(SEEK_CHUNK);
            let moved =
                unsafe { SetFilePointer(self.handle, step as i32, ptr::null_mut(), FILE_CURRENT) };
            if moved == INVALID_SET_FILE_POINTER {
                return Err(self.last_io_error(offset));
            }
            remaining -= step;
        }
        Ok(())
    }

    fn last_io_error(&self, offset: u64) -> EngineError {
        let code = unsafe { GetLastError() };
        EngineError::ReadError {
            offset,
            message: std::io::Error::from_raw_os_error(code as i32).to_string(),
        }
    }
}

impl DeviceBackend for WindowsBackend {
    fn seek(&mut self, offset: u64) -> Result<()> {
        let ok = unsafe { SetFilePointerEx(self.handle, offset as i64, ptr::null_mut(), FILE_BEGIN) };
        if ok == 0 {
            return self.seek_chunked(offset);
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut read: u32 = 0;
        let ok = unsafe {
            ReadFile(
                self.handle,
                buf.as_mut_ptr(),
                buf.len() as u32,
                &mut read,
                ptr::null_mut(),
            )
        };
        if ok == 0 {
            let code = unsafe { GetLastError() };
            return Err(EngineError::Io(std::io::Error::from_raw_os_error(
                code as i32,
            )));
        }
        Ok(read as usize)
    }

    fn size(&self) -> Option<u64> {
        self.size
    }
}

impl Drop for WindowsBackend {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.handle);
        }
    }
}
