//! Shared fixtures: synthetic MFT records and an in-memory volume device

#![allow(dead_code)]

use mftindex::ntfs::structs::{
    ATTRIBUTE_END_MARKER, FILE_NAME_FIXED_SIZE, MFT_RECORD_IN_USE, MFT_RECORD_IS_DIRECTORY,
    MFT_RECORD_SIGNATURE, RESIDENT_HEADER_SIZE,
};
use mftindex::{store, DeviceOpener, FileRecord, IndexError, MftDevice, NtfsVolumeData, Result};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::collections::{BTreeMap, HashMap};

pub const RECORD_SIZE: usize = 1024;
pub const ROOT: u64 = 5;

pub const NS_POSIX: u8 = 0;
pub const NS_WIN32: u8 = 1;
pub const NS_DOS: u8 = 2;

// ============================================================================
// Record builders
// ============================================================================

pub fn file_name_attr(name: &str, parent: u64, namespace: u8) -> Vec<u8> {
    let units: Vec<u16> = name.encode_utf16().collect();
    let mut value = vec![0u8; FILE_NAME_FIXED_SIZE];
    value[0..8].copy_from_slice(&parent.to_le_bytes());
    value[64] = units.len() as u8;
    value[65] = namespace;
    for unit in units {
        value.extend_from_slice(&unit.to_le_bytes());
    }

    let length = (RESIDENT_HEADER_SIZE + value.len() + 7) & !7;
    let mut attr = vec![0u8; length];
    attr[0..4].copy_from_slice(&0x30u32.to_le_bytes());
    attr[4..8].copy_from_slice(&(length as u32).to_le_bytes());
    attr[16..20].copy_from_slice(&(value.len() as u32).to_le_bytes());
    attr[20..22].copy_from_slice(&(RESIDENT_HEADER_SIZE as u16).to_le_bytes());
    attr[RESIDENT_HEADER_SIZE..RESIDENT_HEADER_SIZE + value.len()].copy_from_slice(&value);
    attr
}

pub fn record(flags: u16, sequence: u16, attributes: &[Vec<u8>]) -> Vec<u8> {
    const FIRST_ATTR: usize = 56;

    let mut data = vec![0u8; RECORD_SIZE];
    data[0..4].copy_from_slice(&MFT_RECORD_SIGNATURE.to_le_bytes());
    data[16..18].copy_from_slice(&sequence.to_le_bytes());
    data[20..22].copy_from_slice(&(FIRST_ATTR as u16).to_le_bytes());
    data[22..24].copy_from_slice(&flags.to_le_bytes());

    let mut offset = FIRST_ATTR;
    for attr in attributes {
        data[offset..offset + attr.len()].copy_from_slice(attr);
        offset += attr.len();
    }
    data[offset..offset + 4].copy_from_slice(&ATTRIBUTE_END_MARKER.to_le_bytes());
    data[24..28].copy_from_slice(&((offset + 8) as u32).to_le_bytes());
    data
}

// ============================================================================
// Volume image
// ============================================================================

/// Sparse MFT: only the segments inserted are in use
#[derive(Clone, Default)]
pub struct VolumeImage {
    pub record_count: u64,
    pub records: BTreeMap<u64, Vec<u8>>,
    /// Requests answered with a higher segment than the one asked for
    pub answers_above: BTreeMap<u64, u64>,
}

impl VolumeImage {
    pub fn new(record_count: u64) -> Self {
        Self {
            record_count,
            records: BTreeMap::new(),
            answers_above: BTreeMap::new(),
        }
    }

    pub fn file(self, frn: u64, parent: u64, name: &str) -> Self {
        self.raw(frn, record(MFT_RECORD_IN_USE, 1, &[file_name_attr(name, parent, NS_WIN32)]))
    }

    /// Directory carrying both a DOS alias and its Win32 name
    pub fn dir(self, frn: u64, parent: u64, name: &str) -> Self {
        let short: String = name.chars().filter(|c| !c.is_whitespace()).take(6).collect();
        self.raw(
            frn,
            record(
                MFT_RECORD_IN_USE | MFT_RECORD_IS_DIRECTORY,
                1,
                &[
                    file_name_attr(&format!("{}~1", short.to_uppercase()), parent, NS_DOS),
                    file_name_attr(name, parent, NS_WIN32),
                ],
            ),
        )
    }

    pub fn raw(mut self, frn: u64, data: Vec<u8>) -> Self {
        self.records.insert(frn, data);
        self
    }

    /// Make a read of `requested` come back with segment `returned`
    pub fn answer_above(mut self, requested: u64, returned: u64) -> Self {
        self.answers_above.insert(requested, returned);
        self
    }
}

// ============================================================================
// Fake device
// ============================================================================

pub struct FakeDevice {
    image: VolumeImage,
    fail_query: bool,
    fail_read_at: Option<u64>,
    reply: Vec<u8>,
}

impl MftDevice for FakeDevice {
    fn query_volume_data(&mut self) -> Result<NtfsVolumeData> {
        if self.fail_query {
            return Err(IndexError::WindowsError("FSCTL_GET_NTFS_VOLUME_DATA: Win32 error code 1".into()));
        }
        Ok(NtfsVolumeData {
            bytes_per_sector: 512,
            bytes_per_cluster: 4096,
            bytes_per_file_record_segment: RECORD_SIZE as u32,
            mft_valid_data_length: self.image.record_count * RECORD_SIZE as u64,
            ..Default::default()
        })
    }

    /// Answers with the nearest in-use segment at or below the request
    fn read_file_record(&mut self, record_number: u64) -> Result<FileRecord<'_>> {
        if self.fail_read_at == Some(record_number) {
            return Err(IndexError::WindowsError("device not ready".into()));
        }

        let redirected = self
            .image
            .answers_above
            .get(&record_number)
            .and_then(|returned| self.image.records.get_key_value(returned));

        let (returned, data) = match redirected.or_else(|| self.image.records.range(..=record_number).next_back()) {
            Some((&frn, data)) => (frn, data.clone()),
            // system area: something that is never indexed
            None => (0, record(MFT_RECORD_IN_USE, 1, &[])),
        };

        self.reply = data;
        Ok(FileRecord {
            record_number: returned,
            data: &self.reply,
        })
    }
}

#[derive(Clone)]
pub enum Behavior {
    Healthy,
    OpenFails(i32),
    QueryFails,
    ReadFailsAt(u64),
}

#[derive(Default)]
pub struct FakeOpener {
    volumes: HashMap<char, (VolumeImage, Behavior)>,
}

impl FakeOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_volume(mut self, drive_letter: char, image: VolumeImage) -> Self {
        self.volumes.insert(drive_letter, (image, Behavior::Healthy));
        self
    }

    pub fn with_faulty_volume(mut self, drive_letter: char, image: VolumeImage, behavior: Behavior) -> Self {
        self.volumes.insert(drive_letter, (image, behavior));
        self
    }
}

impl DeviceOpener for FakeOpener {
    type Device = FakeDevice;

    fn open(&self, drive_letter: char) -> Result<FakeDevice> {
        let (image, behavior) = self.volumes.get(&drive_letter).ok_or(IndexError::DeviceOpen {
            drive: drive_letter,
            code: 2,
        })?;

        if let Behavior::OpenFails(code) = behavior {
            return Err(IndexError::DeviceOpen {
                drive: drive_letter,
                code: *code,
            });
        }

        Ok(FakeDevice {
            image: image.clone(),
            fail_query: matches!(behavior, Behavior::QueryFails),
            fail_read_at: match behavior {
                Behavior::ReadFailsAt(n) => Some(*n),
                _ => None,
            },
            reply: Vec::new(),
        })
    }
}

// ============================================================================
// Store helpers
// ============================================================================

pub fn memory_store() -> Mutex<Connection> {
    let conn = Connection::open_in_memory().unwrap();
    store::init_tables(&conn).unwrap();
    Mutex::new(conn)
}

/// A stored row: shard, ASCII, PATH, PRIORITY
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub shard: usize,
    pub ascii: i64,
    pub path: String,
    pub priority: i64,
}

pub fn all_rows(conn: &Connection) -> Vec<Row> {
    let mut rows = Vec::new();
    for shard in 0..mftindex::SHARD_COUNT {
        let mut stmt = conn
            .prepare(&format!("SELECT ASCII, PATH, PRIORITY FROM {};", store::table_name(shard)))
            .unwrap();
        let found = stmt
            .query_map([], |r| {
                Ok(Row {
                    shard,
                    ascii: r.get(0)?,
                    path: r.get(1)?,
                    priority: r.get(2)?,
                })
            })
            .unwrap();
        rows.extend(found.map(|r| r.unwrap()));
    }
    rows.sort_by(|a, b| a.path.cmp(&b.path));
    rows
}

pub fn total_rows(conn: &Connection) -> u64 {
    store::row_counts(conn).unwrap().iter().sum()
}
