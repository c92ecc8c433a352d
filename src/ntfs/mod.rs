//! NTFS volume access and MFT parsing
//!
//! - Raw device access through `FSCTL_GET_NTFS_VOLUME_DATA` and
//!   `FSCTL_GET_NTFS_FILE_RECORD`
//! - Top-down MFT walk with cursor resynchronization
//! - $FILE_NAME extraction into a ParentMap

pub mod cursor;
pub mod device;
pub mod mft;
pub mod structs;
#[cfg(windows)]
pub mod winapi;

// Re-export commonly used types
pub use device::{DeviceOpener, FileRecord, MftDevice, VolumeSession};
pub use mft::{AttributeParser, MftRecordReader, RecordDisposition};
pub use structs::{FileNameAttribute, FilenameNamespace, MftRecordHeader, NtfsVolumeData};
#[cfg(windows)]
pub use winapi::{open_volume, SafeHandle, VolumeDevice, VolumeOpener};

#[cfg(not(windows))]
pub use unsupported::VolumeOpener;

#[cfg(not(windows))]
mod unsupported {
    use crate::error::{IndexError, Result};
    use crate::ntfs::device::{DeviceOpener, FileRecord, MftDevice};
    use crate::ntfs::structs::NtfsVolumeData;

    /// ERROR_NOT_SUPPORTED
    const NOT_SUPPORTED: i32 = 50;

    /// Raw volume access exists only on Windows; every open fails here.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct VolumeOpener;

    pub enum NoDevice {}

    impl MftDevice for NoDevice {
        fn query_volume_data(&mut self) -> Result<NtfsVolumeData> {
            match *self {}
        }

        fn read_file_record(&mut self, _record_number: u64) -> Result<FileRecord<'_>> {
            match *self {}
        }
    }

    impl DeviceOpener for VolumeOpener {
        type Device = NoDevice;

        fn open(&self, drive_letter: char) -> Result<NoDevice> {
            Err(IndexError::DeviceOpen {
                drive: drive_letter,
                code: NOT_SUPPORTED,
            })
        }
    }
}
