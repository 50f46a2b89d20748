//! OLE property set streams for workbook metadata.
//!
//! Builds the `\x05SummaryInformation` and
//! `\x05DocumentSummaryInformation` streams per [MS-OLEPS]. Strings are
//! written as UTF-16 (codepage 1200, VT_LPWSTR) so Japanese metadata
//! survives without a legacy codepage round trip.

use crate::models::DocumentMetadata;

const VT_I2: u32 = 0x0002;
const VT_LPWSTR: u32 = 0x001F;

const PROPID_CODEPAGE: u32 = 1;

// SummaryInformation property ids
const PROPID_TITLE: u32 = 2;
const PROPID_SUBJECT: u32 = 3;
const PROPID_AUTHOR: u32 = 4;
const PROPID_KEYWORDS: u32 = 5;
const PROPID_COMMENTS: u32 = 6;

// DocumentSummaryInformation property ids
const PROPID_CATEGORY: u32 = 2;

/// FMTID {F29F85E0-4FF9-1068-AB91-08002B27B3D9}
const FMTID_SUMMARY_INFORMATION: [u8; 16] = [
    0xE0, 0x85, 0x9F, 0xF2, 0xF9, 0x4F, 0x68, 0x10, 0xAB, 0x91, 0x08, 0x00, 0x2B, 0x27, 0xB3,
    0xD9,
];

/// FMTID {D5CDD502-2E9C-101B-9397-08002B2CF9AE}
const FMTID_DOC_SUMMARY_INFORMATION: [u8; 16] = [
    0x02, 0xD5, 0xCD, 0xD5, 0x9C, 0x2E, 0x1B, 0x10, 0x93, 0x97, 0x08, 0x00, 0x2B, 0x2C, 0xF9,
    0xAE,
];

pub const SUMMARY_INFORMATION_STREAM: &str = "\u{5}SummaryInformation";
pub const DOC_SUMMARY_INFORMATION_STREAM: &str = "\u{5}DocumentSummaryInformation";

enum PropertyValue<'a> {
    I2(i16),
    Lpwstr(&'a str),
}

impl PropertyValue<'_> {
    /// Typed value bytes: u32 type tag followed by the padded payload.
    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        match self {
            PropertyValue::I2(v) => {
                bytes.extend_from_slice(&VT_I2.to_le_bytes());
                bytes.extend_from_slice(&v.to_le_bytes());
                bytes.extend_from_slice(&[0, 0]); // pad to 4
            }
            PropertyValue::Lpwstr(s) => {
                bytes.extend_from_slice(&VT_LPWSTR.to_le_bytes());
                let units: Vec<u16> = s.encode_utf16().collect();
                // Character count includes the null terminator
                bytes.extend_from_slice(&((units.len() + 1) as u32).to_le_bytes());
                for unit in &units {
                    bytes.extend_from_slice(&unit.to_le_bytes());
                }
                bytes.extend_from_slice(&[0, 0]); // terminator
                while bytes.len() % 4 != 0 {
                    bytes.push(0);
                }
            }
        }
        bytes
    }
}

/// Serialize one property set stream: header, single FMTID/offset pair,
/// then the section with its (id, offset) table and typed values.
fn build_stream(fmtid: [u8; 16], properties: &[(u32, PropertyValue<'_>)]) -> Vec<u8> {
    let mut stream = Vec::new();
    stream.extend_from_slice(&0xFFFEu16.to_le_bytes()); // byte order
    stream.extend_from_slice(&0u16.to_le_bytes()); // format version
    stream.extend_from_slice(&0u32.to_le_bytes()); // OS version
    stream.extend_from_slice(&[0u8; 16]); // CLSID
    stream.extend_from_slice(&1u32.to_le_bytes()); // one section
    stream.extend_from_slice(&fmtid);
    stream.extend_from_slice(&48u32.to_le_bytes()); // section offset

    // Section: size, count, (id, offset) table, values. Offsets are
    // relative to the section start.
    let mut values: Vec<Vec<u8>> = properties.iter().map(|(_, v)| v.to_bytes()).collect();
    let table_len = 8 + properties.len() * 8;
    let mut section = Vec::new();
    let mut offset = table_len as u32;
    section.extend_from_slice(&0u32.to_le_bytes()); // size, patched below
    section.extend_from_slice(&(properties.len() as u32).to_le_bytes());
    for ((id, _), value) in properties.iter().zip(&values) {
        section.extend_from_slice(&id.to_le_bytes());
        section.extend_from_slice(&offset.to_le_bytes());
        offset += value.len() as u32;
    }
    for value in values.drain(..) {
        section.extend_from_slice(&value);
    }
    let size = section.len() as u32;
    section[0..4].copy_from_slice(&size.to_le_bytes());

    stream.extend_from_slice(&section);
    stream
}

fn push_string<'a>(props: &mut Vec<(u32, PropertyValue<'a>)>, id: u32, value: &'a str) {
    if !value.is_empty() {
        props.push((id, PropertyValue::Lpwstr(value)));
    }
}

/// Build the `\x05SummaryInformation` stream from document metadata.
pub fn summary_information(metadata: &DocumentMetadata) -> Vec<u8> {
    let mut props: Vec<(u32, PropertyValue<'_>)> = vec![(PROPID_CODEPAGE, PropertyValue::I2(1200))];
    push_string(&mut props, PROPID_TITLE, &metadata.title);
    push_string(&mut props, PROPID_SUBJECT, &metadata.subject);
    push_string(&mut props, PROPID_AUTHOR, &metadata.creator);
    push_string(&mut props, PROPID_KEYWORDS, &metadata.keywords);
    push_string(&mut props, PROPID_COMMENTS, &metadata.description);
    build_stream(FMTID_SUMMARY_INFORMATION, &props)
}

/// Build the `\x05DocumentSummaryInformation` stream.
pub fn document_summary_information(metadata: &DocumentMetadata) -> Vec<u8> {
    let mut props: Vec<(u32, PropertyValue<'_>)> = vec![(PROPID_CODEPAGE, PropertyValue::I2(1200))];
    push_string(&mut props, PROPID_CATEGORY, &metadata.category);
    build_stream(FMTID_DOC_SUMMARY_INFORMATION, &props)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_u32(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
    }

    #[test]
    fn test_stream_header_shape() {
        let stream = summary_information(&DocumentMetadata::default());
        assert_eq!(&stream[0..2], &0xFFFEu16.to_le_bytes());
        assert_eq!(&stream[24..28], &1u32.to_le_bytes());
        assert_eq!(&stream[28..44], &FMTID_SUMMARY_INFORMATION);
        assert_eq!(read_u32(&stream, 44), 48);
        // Declared section size matches the actual tail
        let section_size = read_u32(&stream, 48) as usize;
        assert_eq!(48 + section_size, stream.len());
    }

    #[test]
    fn test_codepage_is_always_first() {
        let stream = document_summary_information(&DocumentMetadata::default());
        // Section at 48: size, count, first (id, offset) pair
        assert_eq!(read_u32(&stream, 52), 1); // count: codepage only
        assert_eq!(read_u32(&stream, 56), PROPID_CODEPAGE);
        let value_offset = 48 + read_u32(&stream, 60) as usize;
        assert_eq!(read_u32(&stream, value_offset), VT_I2);
        assert_eq!(
            i16::from_le_bytes([stream[value_offset + 4], stream[value_offset + 5]]),
            1200
        );
    }

    #[test]
    fn test_metadata_strings_round_trip() {
        let metadata = DocumentMetadata {
            creator: "商事システム".into(),
            title: "利用者一覧".into(),
            ..DocumentMetadata::default()
        };
        let stream = summary_information(&metadata);
        let count = read_u32(&stream, 52) as usize;
        assert_eq!(count, 3); // codepage + title + author

        // Find the title property in the table
        let mut title_offset = None;
        for i in 0..count {
            let id = read_u32(&stream, 56 + i * 8);
            if id == PROPID_TITLE {
                title_offset = Some(48 + read_u32(&stream, 60 + i * 8) as usize);
            }
        }
        let offset = title_offset.expect("title property present");
        assert_eq!(read_u32(&stream, offset), VT_LPWSTR);
        let cch = read_u32(&stream, offset + 4) as usize;
        assert_eq!(cch, "利用者一覧".chars().count() + 1);
        let mut units = Vec::new();
        for i in 0..cch - 1 {
            let at = offset + 8 + i * 2;
            units.push(u16::from_le_bytes([stream[at], stream[at + 1]]));
        }
        assert_eq!(String::from_utf16(&units).unwrap(), "利用者一覧");
    }
}
