//! BIFF8 record emission for the workbook stream.
//!
//! Records are appended to an in-memory byte buffer: a 4-byte header
//! (record type u16 + payload length u16, little-endian) followed by the
//! payload. Layouts follow [MS-XLS] and Apache POI's serialization so
//! the output opens in Excel 97 through current releases.

use std::collections::HashMap;

use crate::error::{DocumentError, DocumentResult};

/// Maximum payload bytes per record; longer data continues in CONTINUE
/// records.
pub const MAX_RECORD_DATA: usize = 8224;

/// Last addressable 0-based row in a BIFF8 sheet.
pub const MAX_ROW: u32 = 65535;

/// Points to twips (1/20 pt).
pub const TWIPS_PER_POINT: u16 = 20;

fn write_record(out: &mut Vec<u8>, record_type: u16, payload: &[u8]) {
    out.extend_from_slice(&record_type.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    out.extend_from_slice(payload);
}

fn le16(v: u16) -> [u8; 2] {
    v.to_le_bytes()
}

// =============================================================================
// Stream-Level Records
// =============================================================================

/// Substream type for [`write_bof`].
pub const SUBSTREAM_WORKBOOK: u16 = 0x0005;
pub const SUBSTREAM_WORKSHEET: u16 = 0x0010;

/// BOF record (0x0809), BIFF8 version stamp plus substream type.
pub fn write_bof(out: &mut Vec<u8>, substream_type: u16) {
    let mut payload = Vec::with_capacity(16);
    payload.extend_from_slice(&le16(0x0600)); // BIFF8
    payload.extend_from_slice(&le16(substream_type));
    payload.extend_from_slice(&le16(0x0DBB)); // build id
    payload.extend_from_slice(&le16(0x07CC)); // build year
    payload.extend_from_slice(&0u32.to_le_bytes()); // file history
    payload.extend_from_slice(&6u32.to_le_bytes()); // lowest BIFF version
    write_record(out, 0x0809, &payload);
}

/// EOF record (0x000A).
pub fn write_eof(out: &mut Vec<u8>) {
    write_record(out, 0x000A, &[]);
}

/// CODEPAGE record (0x0042). BIFF8 always declares 0x04B0 (UTF-16).
pub fn write_codepage(out: &mut Vec<u8>) {
    write_record(out, 0x0042, &le16(0x04B0));
}

/// DATE1904 record (0x0022); 0 selects the 1900 date system.
pub fn write_date1904(out: &mut Vec<u8>, is_1904: bool) {
    write_record(out, 0x0022, &le16(u16::from(is_1904)));
}

/// WINDOW1 record (0x003D), default workbook window geometry.
pub fn write_window1(out: &mut Vec<u8>) {
    let mut payload = Vec::with_capacity(18);
    payload.extend_from_slice(&le16(0)); // xWn
    payload.extend_from_slice(&le16(0)); // yWn
    payload.extend_from_slice(&le16(0x3000)); // dxWn
    payload.extend_from_slice(&le16(0x1E00)); // dyWn
    payload.extend_from_slice(&le16(0x0038)); // option flags
    payload.extend_from_slice(&le16(0)); // itabCur
    payload.extend_from_slice(&le16(0)); // itabFirst
    payload.extend_from_slice(&le16(1)); // ctabSel
    payload.extend_from_slice(&le16(0x0258)); // wTabRatio
    write_record(out, 0x003D, &payload);
}

/// USESELFS record (0x0160); natural-language formulas off.
pub fn write_useselfs(out: &mut Vec<u8>) {
    write_record(out, 0x0160, &le16(0));
}

// =============================================================================
// Fonts and Formats
// =============================================================================

pub const FONT_WEIGHT_NORMAL: u16 = 400;
pub const FONT_WEIGHT_BOLD: u16 = 700;
pub const COLOR_AUTOMATIC: u16 = 0x7FFF;

/// A FONT record payload description.
#[derive(Debug, Clone)]
pub struct FontSpec {
    pub name: String,
    /// Height in points.
    pub size_points: u16,
    pub weight: u16,
    pub italic: bool,
}

impl FontSpec {
    pub fn new(name: impl Into<String>, size_points: u16) -> Self {
        Self {
            name: name.into(),
            size_points,
            weight: FONT_WEIGHT_NORMAL,
            italic: false,
        }
    }

    pub fn bold(mut self) -> Self {
        self.weight = FONT_WEIGHT_BOLD;
        self
    }

    pub fn italic(mut self) -> Self {
        self.italic = true;
        self
    }
}

/// FONT record (0x0031).
///
/// The name is written as compressed 8-bit when it is ASCII, otherwise
/// UTF-16LE; Japanese font names need the latter.
pub fn write_font(out: &mut Vec<u8>, font: &FontSpec) {
    let is_ascii = font.name.is_ascii();
    let (cch, name_bytes): (u8, Vec<u8>) = if is_ascii {
        let bytes = font.name.as_bytes();
        let n = bytes.len().min(255);
        (n as u8, bytes[..n].to_vec())
    } else {
        let utf16: Vec<u16> = font.name.encode_utf16().collect();
        let n = utf16.len().min(255);
        let mut buf = Vec::with_capacity(n * 2);
        for unit in &utf16[..n] {
            buf.extend_from_slice(&unit.to_le_bytes());
        }
        (n as u8, buf)
    };

    let mut payload = Vec::with_capacity(16 + name_bytes.len());
    payload.extend_from_slice(&le16(font.size_points * TWIPS_PER_POINT));
    payload.extend_from_slice(&le16(if font.italic { 0x0002 } else { 0 }));
    payload.extend_from_slice(&le16(COLOR_AUTOMATIC));
    payload.extend_from_slice(&le16(font.weight));
    payload.extend_from_slice(&le16(0)); // escapement
    payload.push(0); // underline
    payload.push(0); // family
    payload.push(0); // charset
    payload.push(0); // reserved
    payload.push(cch);
    payload.push(if is_ascii { 0x00 } else { 0x01 });
    payload.extend_from_slice(&name_bytes);
    write_record(out, 0x0031, &payload);
}

/// FORMAT record (0x041E) for a built-in number format index.
pub fn write_format(out: &mut Vec<u8>, index: u16, pattern: &str) {
    let bytes = pattern.as_bytes();
    let cch = bytes.len().min(u16::MAX as usize) as u16;
    let mut payload = Vec::with_capacity(5 + bytes.len());
    payload.extend_from_slice(&le16(index));
    payload.extend_from_slice(&le16(cch));
    payload.push(0x00); // compressed 8-bit
    payload.extend_from_slice(&bytes[..cch as usize]);
    write_record(out, 0x041E, &payload);
}

/// Built-in FORMAT patterns 0..7, emitted the way POI's
/// InternalWorkbook does.
pub const BUILTIN_FORMATS: [&str; 8] = [
    "General",
    "0",
    "0.00",
    "#,##0",
    "#,##0.00",
    "\"$\"#,##0_);(\"$\"#,##0)",
    "\"$\"#,##0_);[Red](\"$\"#,##0)",
    "\"$\"#,##0.00_);(\"$\"#,##0.00)",
];

/// XF record (0x00E0) with default alignment and no borders or fill.
pub fn write_xf(out: &mut Vec<u8>, font_index: u16, format_index: u16, is_style: bool) {
    let mut payload = Vec::with_capacity(20);
    payload.extend_from_slice(&le16(font_index));
    payload.extend_from_slice(&le16(format_index));
    payload.extend_from_slice(&le16(if is_style { 0xFFF5 } else { 0x0001 }));
    payload.push(0x20); // vertical alignment: bottom
    payload.push(0); // rotation
    payload.push(0); // indent
    payload.push(0); // used attributes
    payload.extend_from_slice(&le16(0)); // border styles
    payload.extend_from_slice(&le16(0)); // border palette
    payload.extend_from_slice(&0u32.to_le_bytes()); // fill pattern
    // fill fg/bg palette indices, automatic
    let fill: u16 = (COLOR_AUTOMATIC & 0x7F) | ((COLOR_AUTOMATIC & 0x7F) << 7);
    payload.extend_from_slice(&le16(fill));
    write_record(out, 0x00E0, &payload);
}

/// XF index every cell record references.
pub const CELL_XF_INDEX: u16 = 15;

/// Write the full XF table: 15 style XFs, the default cell XF at index
/// 15, then five style XFs for the built-in comma/currency/percent
/// styles. Mirrors POI's default table so STYLE indices line up.
pub fn write_xf_table(out: &mut Vec<u8>) {
    for i in 0..15u16 {
        let font_index = match i {
            1 | 2 => 1, // bold
            3 | 4 => 2, // italic
            _ => 0,
        };
        write_xf(out, font_index, 0, true);
    }
    write_xf(out, 0, 0, false);
    for format_index in [0x002Bu16, 0x0029, 0x002C, 0x002A, 0x0009] {
        write_xf(out, 0, format_index, true);
    }
}

/// STYLE records (0x0293) for the built-in styles Excel expects.
pub fn write_builtin_styles(out: &mut Vec<u8>) {
    const MAPPINGS: [(u16, u8); 6] = [
        (0x0010, 3), // Comma
        (0x0011, 6), // Comma [0]
        (0x0012, 4), // Currency
        (0x0013, 7), // Currency [0]
        (0x0000, 0), // Normal
        (0x0014, 5), // Percent
    ];
    for (xf_index, builtin_id) in MAPPINGS {
        let mut payload = Vec::with_capacity(4);
        payload.extend_from_slice(&le16((xf_index & 0x0FFF) | 0x8000));
        payload.push(builtin_id);
        payload.push(0xFF); // no outline level
        write_record(out, 0x0293, &payload);
    }
}

// =============================================================================
// Sheet Catalog
// =============================================================================

/// BOUNDSHEET record (0x0085).
///
/// Returns the stream offset of the 4-byte BOF-position field so the
/// caller can patch it once the worksheet substream offset is known.
pub fn write_boundsheet(out: &mut Vec<u8>, name: &str) -> usize {
    let truncated: String = name.chars().take(31).collect();
    let is_ascii = truncated.is_ascii();
    let (cch, name_bytes): (u8, Vec<u8>) = if is_ascii {
        (truncated.len() as u8, truncated.into_bytes())
    } else {
        let utf16: Vec<u16> = truncated.encode_utf16().collect();
        let mut buf = Vec::with_capacity(utf16.len() * 2);
        for unit in &utf16 {
            buf.extend_from_slice(&unit.to_le_bytes());
        }
        (utf16.len() as u8, buf)
    };

    let mut payload = Vec::with_capacity(8 + name_bytes.len());
    payload.extend_from_slice(&0u32.to_le_bytes()); // BOF position, patched later
    payload.extend_from_slice(&le16(0)); // visible worksheet
    payload.push(cch);
    payload.push(if is_ascii { 0x00 } else { 0x01 });
    payload.extend_from_slice(&name_bytes);

    let position_field_offset = out.len() + 4;
    write_record(out, 0x0085, &payload);
    position_field_offset
}

/// Patch the BOF-position field of a previously written BOUNDSHEET.
pub fn patch_boundsheet_position(out: &mut [u8], field_offset: usize, bof_position: u32) {
    out[field_offset..field_offset + 4].copy_from_slice(&bof_position.to_le_bytes());
}

// =============================================================================
// Shared String Table
// =============================================================================

/// Interns strings and tracks total references for the SST header.
#[derive(Debug, Default)]
pub struct SharedStrings {
    strings: Vec<String>,
    index: HashMap<String, u32>,
    total_refs: u32,
}

impl SharedStrings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `text`, counting one more reference, and return its index.
    pub fn intern(&mut self, text: &str) -> u32 {
        self.total_refs += 1;
        if let Some(&i) = self.index.get(text) {
            return i;
        }
        let i = self.strings.len() as u32;
        self.strings.push(text.to_string());
        self.index.insert(text.to_string(), i);
        i
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn unique_count(&self) -> usize {
        self.strings.len()
    }

    /// SST record (0x00FC) with CONTINUE (0x003C) records as needed.
    ///
    /// Strings that straddle a record boundary restart with their
    /// high-byte flag in the continuation, per POI's SSTSerializer.
    pub fn write_sst(&self, out: &mut Vec<u8>) {
        let mut buffer: Vec<u8> = Vec::with_capacity(MAX_RECORD_DATA);
        let mut first_record = true;

        fn flush(out: &mut Vec<u8>, buffer: &mut Vec<u8>, first: &mut bool) {
            if buffer.is_empty() {
                return;
            }
            let record_type = if *first { 0x00FC } else { 0x003C };
            write_record(out, record_type, buffer);
            buffer.clear();
            *first = false;
        }

        buffer.extend_from_slice(&self.total_refs.to_le_bytes());
        buffer.extend_from_slice(&(self.strings.len() as u32).to_le_bytes());
        let mut available = MAX_RECORD_DATA - buffer.len();

        for s in &self.strings {
            let is_ascii = s.is_ascii();
            let flag: u8 = if is_ascii { 0x00 } else { 0x01 };
            let data: Vec<u8> = if is_ascii {
                s.as_bytes().to_vec()
            } else {
                let mut buf = Vec::with_capacity(s.len() * 2);
                for unit in s.encode_utf16() {
                    buf.extend_from_slice(&unit.to_le_bytes());
                }
                buf
            };
            let cch = if is_ascii { data.len() } else { data.len() / 2 }.min(0xFFFF);
            let char_width = if is_ascii { 1 } else { 2 };
            let byte_len = cch * char_width;

            // The 3-byte string header must not be split
            if available < 3 {
                flush(out, &mut buffer, &mut first_record);
                available = MAX_RECORD_DATA;
            }
            buffer.extend_from_slice(&(cch as u16).to_le_bytes());
            buffer.push(flag);
            available -= 3;

            let mut written = 0;
            while written < byte_len {
                let mut can_write = available.min(byte_len - written);
                // Never split a UTF-16 code unit across records
                can_write -= can_write % char_width;
                if can_write == 0 {
                    flush(out, &mut buffer, &mut first_record);
                    buffer.push(flag); // continued-string grbit
                    available = MAX_RECORD_DATA - 1;
                    continue;
                }
                buffer.extend_from_slice(&data[written..written + can_write]);
                written += can_write;
                available -= can_write;
            }
        }

        flush(out, &mut buffer, &mut first_record);
    }
}

// =============================================================================
// Worksheet Records
// =============================================================================

/// DEFCOLWIDTH record (0x0055), width in characters.
pub fn write_defcolwidth(out: &mut Vec<u8>, width_chars: u16) {
    write_record(out, 0x0055, &le16(width_chars));
}

/// DEFAULTROWHEIGHT record (0x0225), height in points.
pub fn write_defaultrowheight(out: &mut Vec<u8>, height_points: u16) {
    let mut payload = Vec::with_capacity(4);
    payload.extend_from_slice(&le16(0x0001)); // height changed flag
    payload.extend_from_slice(&le16(height_points * TWIPS_PER_POINT));
    write_record(out, 0x0225, &payload);
}

/// DIMENSIONS record (0x0200); `last_row`/`last_col` are exclusive.
pub fn write_dimensions(out: &mut Vec<u8>, first_row: u32, last_row: u32, first_col: u16, last_col: u16) {
    let mut payload = Vec::with_capacity(14);
    payload.extend_from_slice(&first_row.to_le_bytes());
    payload.extend_from_slice(&last_row.to_le_bytes());
    payload.extend_from_slice(&le16(first_col));
    payload.extend_from_slice(&le16(last_col));
    payload.extend_from_slice(&le16(0)); // reserved
    write_record(out, 0x0200, &payload);
}

/// WSBOOL record (0x0081) with POI's default flags.
pub fn write_wsbool(out: &mut Vec<u8>) {
    write_record(out, 0x0081, &le16(0x04C1));
}

/// WINDOW2 record (0x023E) with POI's default view flags.
pub fn write_window2(out: &mut Vec<u8>) {
    let mut payload = Vec::with_capacity(18);
    payload.extend_from_slice(&le16(0x06B6)); // grbit
    payload.extend_from_slice(&le16(0)); // rwTop
    payload.extend_from_slice(&le16(0)); // colLeft
    payload.extend_from_slice(&le16(0x0040)); // icvHdr
    payload.extend_from_slice(&le16(0)); // reserved
    payload.extend_from_slice(&le16(0)); // page break zoom
    payload.extend_from_slice(&le16(0)); // normal zoom
    payload.extend_from_slice(&le16(0)); // unused
    payload.extend_from_slice(&le16(0)); // reserved
    write_record(out, 0x023E, &payload);
}

fn check_row(row: u32) -> DocumentResult<u16> {
    u16::try_from(row).map_err(|_| DocumentError::RowLimit(row))
}

/// NUMBER record (0x0203), IEEE 754 double cell.
pub fn write_number(out: &mut Vec<u8>, row: u32, col: u16, value: f64) -> DocumentResult<()> {
    let row = check_row(row)?;
    let mut payload = Vec::with_capacity(14);
    payload.extend_from_slice(&le16(row));
    payload.extend_from_slice(&le16(col));
    payload.extend_from_slice(&le16(CELL_XF_INDEX));
    payload.extend_from_slice(&value.to_le_bytes());
    write_record(out, 0x0203, &payload);
    Ok(())
}

/// LABELSST record (0x00FD), string cell referencing the SST.
pub fn write_labelsst(out: &mut Vec<u8>, row: u32, col: u16, sst_index: u32) -> DocumentResult<()> {
    let row = check_row(row)?;
    let mut payload = Vec::with_capacity(10);
    payload.extend_from_slice(&le16(row));
    payload.extend_from_slice(&le16(col));
    payload.extend_from_slice(&le16(CELL_XF_INDEX));
    payload.extend_from_slice(&sst_index.to_le_bytes());
    write_record(out, 0x00FD, &payload);
    Ok(())
}

/// BOOLERR record (0x0205) carrying a boolean.
pub fn write_bool(out: &mut Vec<u8>, row: u32, col: u16, value: bool) -> DocumentResult<()> {
    let row = check_row(row)?;
    let mut payload = Vec::with_capacity(8);
    payload.extend_from_slice(&le16(row));
    payload.extend_from_slice(&le16(col));
    payload.extend_from_slice(&le16(CELL_XF_INDEX));
    payload.push(u8::from(value));
    payload.push(0); // boolean, not error
    write_record(out, 0x0205, &payload);
    Ok(())
}

/// BLANK record (0x0201), an empty but styled cell.
pub fn write_blank(out: &mut Vec<u8>, row: u32, col: u16) -> DocumentResult<()> {
    let row = check_row(row)?;
    let mut payload = Vec::with_capacity(6);
    payload.extend_from_slice(&le16(row));
    payload.extend_from_slice(&le16(col));
    payload.extend_from_slice(&le16(CELL_XF_INDEX));
    write_record(out, 0x0201, &payload);
    Ok(())
}

// =============================================================================
// Record Walking (used by tests and sanity checks)
// =============================================================================

/// Iterate over (record_type, payload) pairs in a BIFF stream.
pub fn records(stream: &[u8]) -> impl Iterator<Item = (u16, &[u8])> {
    let mut offset = 0usize;
    std::iter::from_fn(move || {
        if offset + 4 > stream.len() {
            return None;
        }
        let record_type = u16::from_le_bytes([stream[offset], stream[offset + 1]]);
        let len = u16::from_le_bytes([stream[offset + 2], stream[offset + 3]]) as usize;
        let start = offset + 4;
        if start + len > stream.len() {
            return None;
        }
        offset = start + len;
        Some((record_type, &stream[start..start + len]))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_header_layout() {
        let mut out = Vec::new();
        write_eof(&mut out);
        assert_eq!(out, vec![0x0A, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_bof_is_biff8() {
        let mut out = Vec::new();
        write_bof(&mut out, SUBSTREAM_WORKBOOK);
        let (record_type, payload) = records(&out).next().unwrap();
        assert_eq!(record_type, 0x0809);
        assert_eq!(payload.len(), 16);
        assert_eq!(&payload[0..2], &[0x00, 0x06]);
        assert_eq!(&payload[2..4], &[0x05, 0x00]);
    }

    #[test]
    fn test_font_utf16_name() {
        let mut out = Vec::new();
        write_font(&mut out, &FontSpec::new("ＭＳ Ｐゴシック", 9));
        let (record_type, payload) = records(&out).next().unwrap();
        assert_eq!(record_type, 0x0031);
        // 180 twips for 9 pt
        assert_eq!(&payload[0..2], &180u16.to_le_bytes());
        let cch = payload[14] as usize;
        assert_eq!(cch, "ＭＳ Ｐゴシック".chars().count());
        assert_eq!(payload[15], 0x01); // UTF-16LE flag
        assert_eq!(payload.len(), 16 + cch * 2);
    }

    #[test]
    fn test_xf_table_shape() {
        let mut out = Vec::new();
        write_xf_table(&mut out);
        let xfs: Vec<_> = records(&out).collect();
        assert_eq!(xfs.len(), 21);
        // Index 15 is the default cell XF
        let (_, cell_xf) = xfs[CELL_XF_INDEX as usize];
        assert_eq!(&cell_xf[4..6], &0x0001u16.to_le_bytes());
        // Style XFs around it
        let (_, style_xf) = xfs[0];
        assert_eq!(&style_xf[4..6], &0xFFF5u16.to_le_bytes());
    }

    #[test]
    fn test_shared_strings_intern_and_counts() {
        let mut sst = SharedStrings::new();
        assert_eq!(sst.intern("a"), 0);
        assert_eq!(sst.intern("b"), 1);
        assert_eq!(sst.intern("a"), 0);
        assert_eq!(sst.unique_count(), 2);

        let mut out = Vec::new();
        sst.write_sst(&mut out);
        let (record_type, payload) = records(&out).next().unwrap();
        assert_eq!(record_type, 0x00FC);
        assert_eq!(&payload[0..4], &3u32.to_le_bytes()); // total refs
        assert_eq!(&payload[4..8], &2u32.to_le_bytes()); // unique
        // "a": cch=1, ascii flag, byte
        assert_eq!(&payload[8..11], &[0x01, 0x00, 0x00]);
        assert_eq!(payload[11], b'a');
    }

    #[test]
    fn test_sst_japanese_is_utf16() {
        let mut sst = SharedStrings::new();
        sst.intern("田中");
        let mut out = Vec::new();
        sst.write_sst(&mut out);
        let (_, payload) = records(&out).next().unwrap();
        assert_eq!(&payload[8..10], &2u16.to_le_bytes());
        assert_eq!(payload[10], 0x01);
        let mut expected = Vec::new();
        for unit in "田中".encode_utf16() {
            expected.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(&payload[11..15], &expected[..]);
    }

    #[test]
    fn test_sst_continues_past_record_limit() {
        let mut sst = SharedStrings::new();
        // 5 strings of 3000 ASCII bytes each overflow one record
        for i in 0..5 {
            sst.intern(&format!("{}{}", i, "x".repeat(2999)));
        }
        let mut out = Vec::new();
        sst.write_sst(&mut out);
        let types: Vec<u16> = records(&out).map(|(t, _)| t).collect();
        assert_eq!(types[0], 0x00FC);
        assert!(types[1..].iter().all(|&t| t == 0x003C));
        assert!(types.len() >= 2);
        for (_, payload) in records(&out) {
            assert!(payload.len() <= MAX_RECORD_DATA);
        }
    }

    #[test]
    fn test_cell_records_reject_row_overflow() {
        let mut out = Vec::new();
        assert!(write_number(&mut out, 70000, 0, 1.0).is_err());
        assert!(write_labelsst(&mut out, 65535, 0, 0).is_ok());
    }

    #[test]
    fn test_boundsheet_patching() {
        let mut out = Vec::new();
        let field = write_boundsheet(&mut out, "Sheet1");
        patch_boundsheet_position(&mut out, field, 0xDEAD);
        let (_, payload) = records(&out).next().unwrap();
        assert_eq!(&payload[0..4], &0xDEADu32.to_le_bytes());
        assert_eq!(payload[6] as usize, "Sheet1".len());
        assert_eq!(payload[7], 0x00);
    }
}
