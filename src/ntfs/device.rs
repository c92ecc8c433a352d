//! Volume device access
//!
//! The indexer talks to a volume through two small traits so the same
//! pipeline runs against a raw Windows handle or an in-memory MFT image.

use crate::error::{IndexError, Result};
use crate::ntfs::structs::NtfsVolumeData;
use byteorder::{ByteOrder, LittleEndian};
use tracing::debug;

/// Header of an FSCTL_GET_NTFS_FILE_RECORD reply: returned FRN + record length
pub const FILE_RECORD_OUTPUT_HEADER: usize = 12;

/// One record segment as returned by the device
#[derive(Debug, Clone, Copy)]
pub struct FileRecord<'a> {
    /// Segment actually returned; may be lower than the one requested
    pub record_number: u64,
    pub data: &'a [u8],
}

/// Raw per-volume device: geometry query plus indexed record reads
pub trait MftDevice {
    /// FSCTL_GET_NTFS_VOLUME_DATA
    fn query_volume_data(&mut self) -> Result<NtfsVolumeData>;

    /// FSCTL_GET_NTFS_FILE_RECORD for `record_number`.
    ///
    /// The device answers with the nearest in-use segment at or below the
    /// requested one, so callers must use `FileRecord::record_number`.
    fn read_file_record(&mut self, record_number: u64) -> Result<FileRecord<'_>>;
}

/// Opens a device for a drive letter
pub trait DeviceOpener: Sync {
    type Device: MftDevice;

    fn open(&self, drive_letter: char) -> Result<Self::Device>;
}

/// Decode an NTFS_FILE_RECORD_OUTPUT_BUFFER.
///
/// Returns the segment number (low 32 bits of the returned FRN) and the
/// record bytes, checked against both the reply size and the declared length.
pub fn parse_file_record_output(buffer: &[u8]) -> Result<(u64, &[u8])> {
    if buffer.len() < FILE_RECORD_OUTPUT_HEADER {
        return Err(IndexError::BufferTooSmall {
            needed: FILE_RECORD_OUTPUT_HEADER,
            got: buffer.len(),
        });
    }

    let returned_frn = LittleEndian::read_u64(&buffer[0..8]);
    let record_length = LittleEndian::read_u32(&buffer[8..12]) as usize;
    let end = FILE_RECORD_OUTPUT_HEADER + record_length;

    if record_length == 0 || end > buffer.len() {
        return Err(IndexError::InvalidMftRecord(
            returned_frn & 0xFFFF_FFFF,
            format!(
                "declared length {} does not fit a {} byte reply",
                record_length,
                buffer.len()
            ),
        ));
    }

    Ok((
        returned_frn & 0xFFFF_FFFF,
        &buffer[FILE_RECORD_OUTPUT_HEADER..end],
    ))
}

// ============================================================================
// Volume Session
// ============================================================================

/// An open device plus the geometry needed to walk its MFT.
///
/// Owns the device for the duration of one scan; dropping the session
/// releases the handle.
pub struct VolumeSession<D: MftDevice> {
    drive_letter: char,
    device: D,
    volume_data: NtfsVolumeData,
}

impl<D: MftDevice> VolumeSession<D> {
    /// Query the geometry of an opened device.
    ///
    /// On failure the device is dropped here, closing the handle.
    pub fn establish(drive_letter: char, mut device: D) -> Result<Self> {
        let volume_data = device
            .query_volume_data()
            .map_err(|e| match e {
                IndexError::DeviceQuery { .. } => e,
                other => IndexError::DeviceQuery {
                    drive: drive_letter,
                    reason: other.to_string(),
                },
            })?;

        if volume_data.bytes_per_file_record_segment == 0 {
            return Err(IndexError::DeviceQuery {
                drive: drive_letter,
                reason: "volume reports zero bytes per file record segment".to_string(),
            });
        }

        debug!(
            drive = %drive_letter,
            mft_valid_length = volume_data.mft_valid_data_length,
            bytes_per_record = volume_data.bytes_per_file_record_segment,
            "volume geometry"
        );

        Ok(Self {
            drive_letter,
            device,
            volume_data,
        })
    }

    pub fn drive_letter(&self) -> char {
        self.drive_letter
    }

    pub fn mft_valid_length(&self) -> u64 {
        self.volume_data.mft_valid_data_length
    }

    pub fn bytes_per_record_segment(&self) -> u32 {
        self.volume_data.bytes_per_file_record_segment
    }

    pub fn volume_data(&self) -> &NtfsVolumeData {
        &self.volume_data
    }

    /// `mft_valid_length / bytes_per_record_segment`
    pub fn record_count(&self) -> u64 {
        self.volume_data.record_count()
    }

    /// Read one record; any device failure is fatal for the scan
    pub fn read_record(&mut self, record_number: u64) -> Result<FileRecord<'_>> {
        let drive = self.drive_letter;
        self.device
            .read_file_record(record_number)
            .map_err(|e| match e {
                IndexError::FatalRead { .. } => e,
                other => IndexError::FatalRead {
                    drive,
                    record: record_number,
                    reason: other.to_string(),
                },
            })
    }
}
