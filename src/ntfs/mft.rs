//! MFT record walk and $FILE_NAME extraction
//!
//! The reader pulls record segments from the top of the MFT down to the
//! first user record; the parser turns each segment into ParentMap entries.

use crate::error::{IndexError, Result};
use crate::index::ParentMap;
use crate::ntfs::cursor::RecordCursor;
use crate::ntfs::device::{FileRecord, MftDevice, VolumeSession};
use crate::ntfs::structs::*;

// ============================================================================
// MFT Record Reader
// ============================================================================

/// Walks record segments from `record_count - 1` down to `FIRST_USER_RECORD`.
///
/// After each read the cursor moves below the segment the device actually
/// returned, which skips whole runs of free segments in one step. It never
/// moves upwards, and a record is always reported under its own number.
pub struct MftRecordReader<'s, D: MftDevice> {
    session: &'s mut VolumeSession<D>,
    next_index: Option<u64>,
    records_read: u64,
}

impl<'s, D: MftDevice> MftRecordReader<'s, D> {
    pub fn new(session: &'s mut VolumeSession<D>) -> Self {
        let count = session.record_count();
        let next_index = if count > FIRST_USER_RECORD {
            Some(count - 1)
        } else {
            None
        };

        Self {
            session,
            next_index,
            records_read: 0,
        }
    }

    /// Number of segments returned so far
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    /// Next record, `None` once the walk reaches the system records.
    ///
    /// A read error ends the walk: the error is returned once and every
    /// later call yields `None`.
    pub fn next_record(&mut self) -> Option<Result<FileRecord<'_>>> {
        let requested = self.next_index?;

        match self.session.read_record(requested) {
            Err(e) => {
                self.next_index = None;
                Some(Err(e))
            }
            Ok(record) => {
                if record.record_number > requested {
                    // answered above the request: the segment keeps its own
                    // number and the walk carries on below the request
                    self.next_index = Self::below(requested);
                    self.records_read += 1;
                    return Some(Ok(record));
                }
                if record.record_number < FIRST_USER_RECORD {
                    self.next_index = None;
                    return None;
                }

                self.next_index = Self::below(record.record_number);
                self.records_read += 1;
                Some(Ok(record))
            }
        }
    }

    fn below(index: u64) -> Option<u64> {
        if index > FIRST_USER_RECORD {
            Some(index - 1)
        } else {
            None
        }
    }
}

// ============================================================================
// Attribute Parser
// ============================================================================

/// What the parser did with one record segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordDisposition {
    /// Number of Win32 names inserted into the map
    Indexed(usize),
    /// Valid and in use, but no resident Win32 $FILE_NAME
    NoFileName,
    BadSignature,
    InExtend,
    NotInUse,
    Stale,
}

pub struct AttributeParser;

impl AttributeParser {
    /// Parse `data` as segment `frn` and insert its Win32 names into `map`.
    ///
    /// A malformed attribute chain is a record-local error: nothing from
    /// the record is inserted.
    pub fn parse_into(frn: u64, data: &[u8], map: &mut ParentMap) -> Result<RecordDisposition> {
        let header = MftRecordHeader::from_bytes(data).ok_or_else(|| {
            IndexError::InvalidMftRecord(frn, "record shorter than its header".to_string())
        })?;

        if !header.is_valid() {
            return Ok(RecordDisposition::BadSignature);
        }
        if header.is_in_extend() {
            return Ok(RecordDisposition::InExtend);
        }
        if !header.is_in_use() {
            return Ok(RecordDisposition::NotInUse);
        }
        if header.is_stale() {
            return Ok(RecordDisposition::Stale);
        }

        let names = Self::win32_names(data, header.first_attribute_offset as usize)?;
        if names.is_empty() {
            return Ok(RecordDisposition::NoFileName);
        }

        let count = names.len();
        for attr in names {
            let parent = attr.parent_segment();
            map.insert(frn, attr.name, parent);
        }
        Ok(RecordDisposition::Indexed(count))
    }

    /// Walk the attribute chain and collect resident Win32 $FILE_NAME values
    fn win32_names(data: &[u8], first_attribute: usize) -> Result<Vec<FileNameAttribute>> {
        let mut names = Vec::new();
        let mut cursor = RecordCursor::new(data, first_attribute);

        loop {
            if cursor.type_code_at()? == ATTRIBUTE_END_MARKER {
                break;
            }

            let attr = cursor.header_at()?;
            let length = attr.length as usize;
            let attr_data = cursor.slice(length)?;

            if attr.attribute_type == FILE_NAME_ATTRIBUTE && !attr.non_resident {
                let file_name = ResidentAttributeHeader::from_bytes(attr_data)
                    .and_then(|resident| resident.value(attr_data))
                    .and_then(FileNameAttribute::from_bytes);

                if let Some(file_name) = file_name {
                    if file_name.namespace.is_win32_long() {
                        names.push(file_name);
                    }
                }
            }

            cursor.advance_by(length)?;
        }

        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ntfs::device::{parse_file_record_output, FILE_RECORD_OUTPUT_HEADER};

    const RECORD_SIZE: usize = 1024;
    const FIRST_ATTR: usize = 56;

    fn file_name_attr(name: &str, parent: u64, namespace: u8) -> Vec<u8> {
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

    fn record(flags: u16, sequence: u16, attributes: &[Vec<u8>]) -> Vec<u8> {
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

    #[test]
    fn keeps_only_win32_name() {
        let data = record(
            MFT_RECORD_IN_USE,
            1,
            &[
                file_name_attr("PROGRA~1", 5, 2),
                file_name_attr("Program Files", 5, 1),
            ],
        );
        let mut map = ParentMap::new();
        let outcome = AttributeParser::parse_into(64, &data, &mut map).unwrap();

        assert_eq!(outcome, RecordDisposition::Indexed(1));
        let entry = map.get(64).unwrap();
        assert_eq!(entry.filename, "Program Files");
        assert_eq!(entry.parent_frn, 5);
    }

    #[test]
    fn win32_and_dos_name_is_kept() {
        let data = record(MFT_RECORD_IN_USE, 3, &[file_name_attr("notes.md", 40, 3)]);
        let mut map = ParentMap::new();
        AttributeParser::parse_into(41, &data, &mut map).unwrap();
        assert_eq!(map.get(41).unwrap().filename, "notes.md");
    }

    #[test]
    fn parent_reference_drops_sequence_bits() {
        let parent = (7u64 << 48) | 0x0000_0001_0000_0123;
        let data = record(MFT_RECORD_IN_USE, 1, &[file_name_attr("x", parent, 1)]);
        let mut map = ParentMap::new();
        AttributeParser::parse_into(500, &data, &mut map).unwrap();
        assert_eq!(map.get(500).unwrap().parent_frn, 0x123);
    }

    #[test]
    fn skips_unusable_headers() {
        let attrs = [file_name_attr("gone.txt", 5, 1)];
        let mut map = ParentMap::new();

        let not_in_use = record(0, 1, &attrs);
        assert_eq!(
            AttributeParser::parse_into(20, &not_in_use, &mut map).unwrap(),
            RecordDisposition::NotInUse
        );

        let extend = record(MFT_RECORD_IN_USE | MFT_RECORD_IN_EXTEND, 1, &attrs);
        assert_eq!(
            AttributeParser::parse_into(21, &extend, &mut map).unwrap(),
            RecordDisposition::InExtend
        );

        let stale = record(MFT_RECORD_IN_USE, 0, &attrs);
        assert_eq!(
            AttributeParser::parse_into(22, &stale, &mut map).unwrap(),
            RecordDisposition::Stale
        );

        let mut unsigned = record(MFT_RECORD_IN_USE, 1, &attrs);
        unsigned[0..4].copy_from_slice(b"BAAD");
        assert_eq!(
            AttributeParser::parse_into(23, &unsigned, &mut map).unwrap(),
            RecordDisposition::BadSignature
        );

        assert!(map.is_empty());
    }

    #[test]
    fn non_resident_file_name_is_ignored() {
        let mut attr = file_name_attr("big", 5, 1);
        attr[8] = 1;
        let data = record(MFT_RECORD_IN_USE, 1, &[attr]);
        let mut map = ParentMap::new();
        assert_eq!(
            AttributeParser::parse_into(30, &data, &mut map).unwrap(),
            RecordDisposition::NoFileName
        );
    }

    #[test]
    fn zero_length_attribute_is_record_local_error() {
        let mut attr = file_name_attr("bad", 5, 1);
        attr[4..8].copy_from_slice(&0u32.to_le_bytes());
        let data = record(MFT_RECORD_IN_USE, 1, &[attr]);
        let mut map = ParentMap::new();

        let err = AttributeParser::parse_into(31, &data, &mut map).unwrap_err();
        assert!(err.is_recoverable());
        assert!(map.is_empty());
    }

    #[test]
    fn chain_without_end_marker_is_rejected() {
        let mut data = record(MFT_RECORD_IN_USE, 1, &[]);
        // stretch a single attribute to the very end of the record
        let length = (RECORD_SIZE - FIRST_ATTR) as u32;
        data[FIRST_ATTR..FIRST_ATTR + 4].copy_from_slice(&0x10u32.to_le_bytes());
        data[FIRST_ATTR + 4..FIRST_ATTR + 8].copy_from_slice(&length.to_le_bytes());

        let mut map = ParentMap::new();
        assert!(AttributeParser::parse_into(32, &data, &mut map).is_err());
    }

    // ------------------------------------------------------------------------
    // Reader
    // ------------------------------------------------------------------------

    /// Segments 0..count; only `present` ones are in use, reads of a free
    /// segment answer with the nearest present one below it, unless
    /// `answer_above` redirects the request to a higher segment
    struct SparseMft {
        count: u64,
        present: Vec<u64>,
        answer_above: Option<(u64, u64)>,
        requests: Vec<u64>,
        reply: Vec<u8>,
    }

    impl SparseMft {
        fn new(count: u64, present: Vec<u64>) -> Self {
            Self {
                count,
                present,
                answer_above: None,
                requests: Vec::new(),
                reply: Vec::new(),
            }
        }
    }

    impl MftDevice for SparseMft {
        fn query_volume_data(&mut self) -> Result<NtfsVolumeData> {
            Ok(NtfsVolumeData {
                bytes_per_file_record_segment: RECORD_SIZE as u32,
                mft_valid_data_length: self.count * RECORD_SIZE as u64,
                ..Default::default()
            })
        }

        fn read_file_record(&mut self, record_number: u64) -> Result<FileRecord<'_>> {
            self.requests.push(record_number);
            let returned = match self.answer_above {
                Some((requested, returned)) if requested == record_number => returned,
                _ => self
                    .present
                    .iter()
                    .copied()
                    .filter(|&n| n <= record_number)
                    .max()
                    .unwrap_or(0),
            };

            let name = format!("seg{}", returned);
            let body = record(MFT_RECORD_IN_USE, 1, &[file_name_attr(&name, 5, 1)]);
            self.reply.clear();
            self.reply.extend_from_slice(&returned.to_le_bytes());
            self.reply.extend_from_slice(&(body.len() as u32).to_le_bytes());
            self.reply.extend_from_slice(&body);
            let (number, data) = parse_file_record_output(&self.reply)?;
            assert_eq!(data.len() + FILE_RECORD_OUTPUT_HEADER, self.reply.len());
            Ok(FileRecord {
                record_number: number,
                data,
            })
        }
    }

    #[test]
    fn reader_resynchronizes_to_returned_index() {
        let device = SparseMft::new(100, vec![3, 17, 40, 41, 90]);
        let mut session = VolumeSession::establish('C', device).unwrap();

        let mut seen = Vec::new();
        {
            let mut reader = MftRecordReader::new(&mut session);
            while let Some(record) = reader.next_record() {
                seen.push(record.unwrap().record_number);
            }
            assert_eq!(reader.records_read(), 4);
        }

        assert_eq!(seen, vec![90, 41, 40, 17]);
    }

    #[test]
    fn reader_yields_nothing_for_system_only_mft() {
        let device = SparseMft::new(16, vec![0, 5]);
        let mut session = VolumeSession::establish('C', device).unwrap();
        let mut reader = MftRecordReader::new(&mut session);
        assert!(reader.next_record().is_none());
    }

    #[test]
    fn segment_returned_above_request_keeps_its_number() {
        let mut device = SparseMft::new(60, vec![41, 50]);
        device.answer_above = Some((40, 50));
        let mut session = VolumeSession::establish('C', device).unwrap();

        let mut seen = Vec::new();
        let mut map = ParentMap::new();
        {
            let mut reader = MftRecordReader::new(&mut session);
            while let Some(record) = reader.next_record() {
                let record = record.unwrap();
                seen.push(record.record_number);
                AttributeParser::parse_into(record.record_number, record.data, &mut map).unwrap();
            }
        }

        assert_eq!(seen, vec![50, 41, 50]);
        assert!(map.get(40).is_none());
        assert_eq!(map.get(50).unwrap().filename, "seg50");
        assert_eq!(map.get(41).unwrap().filename, "seg41");
    }
}
