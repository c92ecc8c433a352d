//! Windows API bindings for NTFS operations
//!
//! Safe wrappers around Win32 APIs for volume access and IOCTL operations.

use crate::error::{IndexError, Result};
use crate::ntfs::device::{
    parse_file_record_output, DeviceOpener, FileRecord, MftDevice, FILE_RECORD_OUTPUT_HEADER,
};
use crate::ntfs::structs::*;
use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;
use std::ptr;

// ============================================================================
// IOCTL Control Codes (from winioctl.h)
// ============================================================================

pub const FSCTL_GET_NTFS_VOLUME_DATA: u32 = 0x00090064;
pub const FSCTL_GET_NTFS_FILE_RECORD: u32 = 0x00090068;

// File attributes for CreateFile
pub const GENERIC_READ: u32 = 0x80000000;
pub const FILE_SHARE_READ: u32 = 0x00000001;
pub const FILE_SHARE_WRITE: u32 = 0x00000002;

pub const INVALID_HANDLE_VALUE: isize = -1;

// ============================================================================
// Safe Handle Wrapper
// ============================================================================

/// RAII wrapper for Windows HANDLE
pub struct SafeHandle {
    handle: isize,
}

impl SafeHandle {
    /// Create from raw handle
    pub fn new(handle: isize) -> Option<Self> {
        if handle == INVALID_HANDLE_VALUE || handle == 0 {
            None
        } else {
            Some(Self { handle })
        }
    }

    fn as_handle(&self) -> windows::Win32::Foundation::HANDLE {
        windows::Win32::Foundation::HANDLE(self.handle as *mut std::ffi::c_void)
    }
}

impl Drop for SafeHandle {
    fn drop(&mut self) {
        unsafe {
            let _ = windows::Win32::Foundation::CloseHandle(self.as_handle());
        }
    }
}

/// Win32 error code carried by a windows-rs error (HRESULT_FROM_WIN32)
fn win32_code(error: &windows::core::Error) -> i32 {
    (error.code().0 as u32 & 0xFFFF) as i32
}

// ============================================================================
// Volume Operations
// ============================================================================

/// Open `\\.\X:` for raw access.
///
/// Read and write sharing stay enabled so the OS and other processes keep
/// using the volume during the scan.
pub fn open_volume(drive_letter: char) -> Result<SafeHandle> {
    use windows::core::PCWSTR;
    use windows::Win32::Storage::FileSystem::{
        CreateFileW, FILE_FLAGS_AND_ATTRIBUTES, FILE_SHARE_MODE, OPEN_EXISTING,
    };

    let path = format!("\\\\.\\{}:", drive_letter);
    let wide_path: Vec<u16> = OsStr::new(&path)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect();

    let handle = unsafe {
        CreateFileW(
            PCWSTR::from_raw(wide_path.as_ptr()),
            GENERIC_READ,
            FILE_SHARE_MODE(FILE_SHARE_READ | FILE_SHARE_WRITE),
            None,
            OPEN_EXISTING,
            FILE_FLAGS_AND_ATTRIBUTES(0),
            None,
        )
    };

    match handle {
        Ok(h) => SafeHandle::new(h.0 as isize).ok_or_else(|| IndexError::DeviceOpen {
            drive: drive_letter,
            code: std::io::Error::last_os_error().raw_os_error().unwrap_or(0),
        }),
        Err(e) => Err(IndexError::DeviceOpen {
            drive: drive_letter,
            code: win32_code(&e),
        }),
    }
}

/// Send a DeviceIoControl request
pub fn device_io_control(
    handle: &SafeHandle,
    control_code: u32,
    in_buffer: Option<&[u8]>,
    out_buffer: &mut [u8],
) -> Result<u32> {
    use windows::Win32::System::IO::DeviceIoControl;

    let mut bytes_returned: u32 = 0;

    let (in_ptr, in_size) = match in_buffer {
        Some(buf) => (buf.as_ptr() as *const std::ffi::c_void, buf.len() as u32),
        None => (ptr::null(), 0),
    };

    let result = unsafe {
        DeviceIoControl(
            handle.as_handle(),
            control_code,
            Some(in_ptr),
            in_size,
            Some(out_buffer.as_mut_ptr() as *mut std::ffi::c_void),
            out_buffer.len() as u32,
            Some(&mut bytes_returned),
            None,
        )
    };

    match result {
        Ok(()) => Ok(bytes_returned),
        Err(e) => Err(IndexError::from_win32(
            win32_code(&e) as u32,
            &format!("DeviceIoControl(0x{:08X})", control_code),
        )),
    }
}

/// Get NTFS volume data
pub fn get_ntfs_volume_data(handle: &SafeHandle) -> Result<NtfsVolumeData> {
    let mut buffer = [0u8; NTFS_VOLUME_DATA_SIZE];
    device_io_control(handle, FSCTL_GET_NTFS_VOLUME_DATA, None, &mut buffer)?;

    NtfsVolumeData::from_bytes(&buffer)
        .ok_or_else(|| IndexError::WindowsError("Failed to parse NTFS volume data".to_string()))
}

// ============================================================================
// Volume Device
// ============================================================================

/// A raw volume handle plus the reply buffer reused for every record read
pub struct VolumeDevice {
    drive_letter: char,
    handle: SafeHandle,
    buffer: Vec<u8>,
}

impl VolumeDevice {
    pub fn open(drive_letter: char) -> Result<Self> {
        Ok(Self {
            drive_letter,
            handle: open_volume(drive_letter)?,
            buffer: Vec::new(),
        })
    }
}

impl MftDevice for VolumeDevice {
    fn query_volume_data(&mut self) -> Result<NtfsVolumeData> {
        let data = get_ntfs_volume_data(&self.handle).map_err(|e| IndexError::DeviceQuery {
            drive: self.drive_letter,
            reason: e.to_string(),
        })?;
        self.buffer = vec![0u8; FILE_RECORD_OUTPUT_HEADER + data.bytes_per_file_record_segment as usize];
        Ok(data)
    }

    fn read_file_record(&mut self, record_number: u64) -> Result<FileRecord<'_>> {
        // NTFS_FILE_RECORD_INPUT_BUFFER: the segment goes in the low part
        let input = (record_number & 0xFFFF_FFFF).to_le_bytes();
        let bytes_returned = device_io_control(
            &self.handle,
            FSCTL_GET_NTFS_FILE_RECORD,
            Some(&input),
            &mut self.buffer,
        )
        .map_err(|e| IndexError::FatalRead {
            drive: self.drive_letter,
            record: record_number,
            reason: e.to_string(),
        })?;

        let (returned, data) = parse_file_record_output(&self.buffer[..bytes_returned as usize])?;
        Ok(FileRecord {
            record_number: returned,
            data,
        })
    }
}

/// Opens real volumes through `\\.\X:`
#[derive(Debug, Default, Clone, Copy)]
pub struct VolumeOpener;

impl DeviceOpener for VolumeOpener {
    type Device = VolumeDevice;

    fn open(&self, drive_letter: char) -> Result<VolumeDevice> {
        VolumeDevice::open(drive_letter)
    }
}
