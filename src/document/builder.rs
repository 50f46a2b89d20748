//! Tabular document assembly.
//!
//! Compiles records into a single-sheet BIFF8 workbook: header labels
//! first, then one row per record starting at the configured start row,
//! every value coerced to its column's declared cell type. The workbook
//! stream is wrapped in an OLE2 container together with the metadata
//! property streams.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{DocumentError, DocumentResult};
use crate::models::{CellAddress, CellType, Record};
use crate::registry::ExportConfig;
use crate::transform;

use super::biff::{self, FontSpec, SharedStrings};
use super::cfb::CompoundFile;
use super::props;

/// Default workbook typeface.
pub const DEFAULT_FONT_NAME: &str = "ＭＳ Ｐゴシック";
/// Default font size in points.
pub const DEFAULT_FONT_SIZE: u16 = 9;
/// Default column width in characters.
pub const DEFAULT_COLUMN_WIDTH: u16 = 12;
/// Default row height in points.
pub const DEFAULT_ROW_HEIGHT: u16 = 12;

/// Name of the workbook stream inside the container.
pub const WORKBOOK_STREAM: &str = "Workbook";

/// A coerced cell ready for record emission.
#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Number(f64),
    Text(u32),
    Bool(bool),
    Blank,
}

/// Compiles one export configuration into .xls documents.
///
/// The builder itself is stateless between calls; every [`compile`]
/// starts from a fresh workbook.
///
/// [`compile`]: DocumentBuilder::compile
#[derive(Debug)]
pub struct DocumentBuilder<'a> {
    config: &'a ExportConfig,
}

impl<'a> DocumentBuilder<'a> {
    pub fn new(config: &'a ExportConfig) -> Self {
        Self { config }
    }

    /// Compile `records` into a complete .xls file.
    pub fn compile(&self, records: &[Record]) -> DocumentResult<Vec<u8>> {
        let workbook = self.workbook_stream(records)?;

        let mut container = CompoundFile::new();
        container.add_stream(WORKBOOK_STREAM, workbook);
        container.add_stream(
            props::SUMMARY_INFORMATION_STREAM,
            props::summary_information(&self.config.metadata),
        );
        container.add_stream(
            props::DOC_SUMMARY_INFORMATION_STREAM,
            props::document_summary_information(&self.config.metadata),
        );
        container.into_bytes()
    }

    /// Build the raw BIFF8 workbook stream without the OLE2 wrapper.
    pub fn workbook_stream(&self, records: &[Record]) -> DocumentResult<Vec<u8>> {
        let mut sst = SharedStrings::new();
        let mut cells: BTreeMap<(u32, u16), Cell> = BTreeMap::new();

        // Header labels at their declared addresses
        for (address, label) in self.config.header.resolved()? {
            let row0 = address.row - 1;
            if row0 > biff::MAX_ROW {
                return Err(DocumentError::RowLimit(row0));
            }
            cells.insert((row0, address.column), Cell::Text(sst.intern(label)));
        }

        // One row per record, starting at start_row
        for (index, record) in records.iter().enumerate() {
            let row = self.config.start_row + index as u32;
            if row - 1 > biff::MAX_ROW {
                return Err(DocumentError::RowLimit(row - 1));
            }
            for procedure in &self.config.procedures {
                let (value, cell_type) =
                    transform::execute(&self.config.registry, procedure, record, row)?;
                let column = procedure.column_index()?;
                let address = CellAddress::new(column, row);
                let cell = coerce(&value, cell_type, &address, &mut sst)?;
                cells.insert((row - 1, column), cell);
            }
        }

        let mut stream = Vec::new();

        // Workbook globals
        biff::write_bof(&mut stream, biff::SUBSTREAM_WORKBOOK);
        biff::write_codepage(&mut stream);
        biff::write_date1904(&mut stream, false);
        biff::write_window1(&mut stream);
        for font in default_fonts() {
            biff::write_font(&mut stream, &font);
        }
        for (index, pattern) in biff::BUILTIN_FORMATS.iter().enumerate() {
            biff::write_format(&mut stream, index as u16, pattern);
        }
        biff::write_xf_table(&mut stream);
        biff::write_builtin_styles(&mut stream);
        biff::write_useselfs(&mut stream);
        let boundsheet_field = biff::write_boundsheet(&mut stream, &self.config.sheet_name);
        if !sst.is_empty() {
            sst.write_sst(&mut stream);
        }
        biff::write_eof(&mut stream);

        // Worksheet substream
        let worksheet_position = stream.len() as u32;
        biff::write_bof(&mut stream, biff::SUBSTREAM_WORKSHEET);
        biff::write_defcolwidth(&mut stream, DEFAULT_COLUMN_WIDTH);
        biff::write_defaultrowheight(&mut stream, DEFAULT_ROW_HEIGHT);
        let (first_row, last_row, first_col, last_col) = dimensions(&cells);
        biff::write_dimensions(&mut stream, first_row, last_row, first_col, last_col);
        biff::write_wsbool(&mut stream);
        biff::write_window2(&mut stream);
        for (&(row, col), cell) in &cells {
            match cell {
                Cell::Number(value) => biff::write_number(&mut stream, row, col, *value)?,
                Cell::Text(sst_index) => biff::write_labelsst(&mut stream, row, col, *sst_index)?,
                Cell::Bool(value) => biff::write_bool(&mut stream, row, col, *value)?,
                Cell::Blank => biff::write_blank(&mut stream, row, col)?,
            }
        }
        biff::write_eof(&mut stream);

        biff::patch_boundsheet_position(&mut stream, boundsheet_field, worksheet_position);
        Ok(stream)
    }
}

fn default_fonts() -> [FontSpec; 4] {
    let base = FontSpec::new(DEFAULT_FONT_NAME, DEFAULT_FONT_SIZE);
    [
        base.clone(),
        base.clone().bold(),
        base.clone().italic(),
        base.bold().italic(),
    ]
}

/// Used range in 0-based coordinates, exclusive upper bounds.
fn dimensions(cells: &BTreeMap<(u32, u16), Cell>) -> (u32, u32, u16, u16) {
    if cells.is_empty() {
        return (0, 1, 0, 1);
    }
    let mut first_row = u32::MAX;
    let mut last_row = 0u32;
    let mut first_col = u16::MAX;
    let mut last_col = 0u16;
    for &(row, col) in cells.keys() {
        first_row = first_row.min(row);
        last_row = last_row.max(row);
        first_col = first_col.min(col);
        last_col = last_col.max(col);
    }
    (first_row, last_row + 1, first_col, last_col + 1)
}

fn coerce_error(address: &CellAddress, cell_type: CellType, value: &Value) -> DocumentError {
    DocumentError::Coerce {
        address: address.to_string(),
        cell_type: cell_type.name().to_string(),
        value: value.to_string(),
    }
}

/// Coerce a transform result to its declared cell type.
///
/// Nulls produce blank cells for every type; beyond that the declared
/// type is binding, so a string column never turns numeric-looking text
/// into a number and a numeric column rejects text it cannot parse.
fn coerce(
    value: &Value,
    cell_type: CellType,
    address: &CellAddress,
    sst: &mut SharedStrings,
) -> DocumentResult<Cell> {
    if value.is_null() {
        return Ok(Cell::Blank);
    }
    match cell_type {
        CellType::String => match value {
            Value::String(s) => Ok(Cell::Text(sst.intern(s))),
            Value::Number(n) => Ok(Cell::Text(sst.intern(&n.to_string()))),
            Value::Bool(b) => Ok(Cell::Text(sst.intern(if *b { "true" } else { "false" }))),
            other => Err(coerce_error(address, cell_type, other)),
        },
        CellType::Numeric => match value {
            Value::Number(n) => n
                .as_f64()
                .map(Cell::Number)
                .ok_or_else(|| coerce_error(address, cell_type, value)),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(Cell::Number)
                .map_err(|_| coerce_error(address, cell_type, value)),
            Value::Bool(b) => Ok(Cell::Number(if *b { 1.0 } else { 0.0 })),
            other => Err(coerce_error(address, cell_type, other)),
        },
        CellType::Boolean => match value {
            Value::Bool(b) => Ok(Cell::Bool(*b)),
            Value::Number(n) => Ok(Cell::Bool(n.as_f64().unwrap_or(0.0) != 0.0)),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "1" => Ok(Cell::Bool(true)),
                "false" | "0" => Ok(Cell::Bool(false)),
                _ => Err(coerce_error(address, cell_type, value)),
            },
            other => Err(coerce_error(address, cell_type, other)),
        },
        // Formula text is stored literally; evaluation is out of scope
        CellType::Formula => match value {
            Value::String(s) => Ok(Cell::Text(sst.intern(s))),
            Value::Number(n) => Ok(Cell::Text(sst.intern(&n.to_string()))),
            other => Err(coerce_error(address, cell_type, other)),
        },
        CellType::Null => Ok(Cell::Blank),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HeaderSpec;
    use crate::registry::ColumnProcedure;
    use serde_json::json;

    fn users_config() -> ExportConfig {
        let mut config = ExportConfig::new("利用者");
        config.header = HeaderSpec::from_labels(&["氏名", "メール", "年齢"]);
        config.procedures = vec![
            ColumnProcedure::new("A", "extractName", CellType::String),
            ColumnProcedure::new("B", "extractEmail", CellType::String),
            ColumnProcedure::new("C", "extractAge", CellType::Numeric),
        ];
        config.registry.register_field("extractName", "name");
        config.registry.register_field("extractEmail", "email");
        config.registry.register_field("extractAge", "age");
        config
    }

    fn user(name: &str, email: &str, age: u32) -> Record {
        let mut record = Record::new();
        record.insert("name".into(), json!(name));
        record.insert("email".into(), json!(email));
        record.insert("age".into(), json!(age));
        record
    }

    fn count_records(stream: &[u8], record_type: u16) -> usize {
        biff::records(stream).filter(|(t, _)| *t == record_type).count()
    }

    #[test]
    fn test_empty_compile_yields_valid_container() {
        let config = ExportConfig::new("Sheet1");
        let builder = DocumentBuilder::new(&config);
        let file = builder.compile(&[]).unwrap();
        assert_eq!(&file[0..8], &super::super::cfb::MAGIC);
        assert_eq!(file.len() % 512, 0);
    }

    #[test]
    fn test_rows_start_at_start_row() {
        let config = users_config();
        let builder = DocumentBuilder::new(&config);
        let stream = builder
            .workbook_stream(&[user("田中", "tanaka@example.jp", 30), user("佐藤", "sato@example.jp", 41)])
            .unwrap();

        // Header: 3 labels in row 1 (0-based row 0); data rows at
        // 0-based rows 1 and 2
        let label_rows: Vec<u16> = biff::records(&stream)
            .filter(|(t, _)| *t == 0x00FD)
            .map(|(_, p)| u16::from_le_bytes([p[0], p[1]]))
            .collect();
        assert_eq!(label_rows, vec![0, 0, 0, 1, 1, 2, 2]);

        let number_rows: Vec<u16> = biff::records(&stream)
            .filter(|(t, _)| *t == 0x0203)
            .map(|(_, p)| u16::from_le_bytes([p[0], p[1]]))
            .collect();
        assert_eq!(number_rows, vec![1, 2]);
    }

    #[test]
    fn test_cell_record_count_matches_procedures() {
        let config = users_config();
        let builder = DocumentBuilder::new(&config);
        let records: Vec<Record> = (0..10)
            .map(|i| user(&format!("u{i}"), &format!("u{i}@example.jp"), 20 + i))
            .collect();
        let stream = builder.workbook_stream(&records).unwrap();

        // 3 header labels + 2 string columns x 10 rows
        assert_eq!(count_records(&stream, 0x00FD), 3 + 20);
        // 1 numeric column x 10 rows
        assert_eq!(count_records(&stream, 0x0203), 10);
    }

    #[test]
    fn test_numeric_string_parses_and_garbage_fails() {
        let mut sst = SharedStrings::new();
        let address = CellAddress::new(2, 2);
        assert_eq!(
            coerce(&json!("12.5"), CellType::Numeric, &address, &mut sst).unwrap(),
            Cell::Number(12.5)
        );
        let err = coerce(&json!("ageless"), CellType::Numeric, &address, &mut sst).unwrap_err();
        assert!(err.to_string().contains("C2"));
    }

    #[test]
    fn test_string_type_keeps_numeric_text() {
        let mut sst = SharedStrings::new();
        let address = CellAddress::new(0, 2);
        let cell = coerce(&json!("007"), CellType::String, &address, &mut sst).unwrap();
        // Interned as text, not converted to a NUMBER cell
        assert_eq!(cell, Cell::Text(0));
    }

    #[test]
    fn test_boolean_coercions() {
        let mut sst = SharedStrings::new();
        let address = CellAddress::new(0, 2);
        for (value, expected) in [
            (json!(true), true),
            (json!(0), false),
            (json!(2), true),
            (json!("TRUE"), true),
            (json!("0"), false),
        ] {
            assert_eq!(
                coerce(&value, CellType::Boolean, &address, &mut sst).unwrap(),
                Cell::Bool(expected)
            );
        }
        assert!(coerce(&json!("yes"), CellType::Boolean, &address, &mut sst).is_err());
    }

    #[test]
    fn test_null_values_are_blank_for_every_type() {
        let mut sst = SharedStrings::new();
        let address = CellAddress::new(0, 2);
        for cell_type in [CellType::String, CellType::Numeric, CellType::Boolean, CellType::Null] {
            assert_eq!(
                coerce(&Value::Null, cell_type, &address, &mut sst).unwrap(),
                Cell::Blank
            );
        }
    }

    #[test]
    fn test_missing_transform_aborts_compile() {
        let mut config = users_config();
        config.procedures.push(ColumnProcedure::new("D", "extractPhone", CellType::String));
        let builder = DocumentBuilder::new(&config);
        let err = builder.compile(&[user("田中", "t@example.jp", 30)]).unwrap_err();
        assert!(err.to_string().contains("extractPhone"));
        assert!(err.to_string().contains("D2"));
    }

    #[test]
    fn test_row_limit_is_enforced() {
        let mut config = users_config();
        config.start_row = 65_537;
        let builder = DocumentBuilder::new(&config);
        let err = builder.workbook_stream(&[user("x", "x@example.jp", 1)]).unwrap_err();
        assert!(matches!(err, DocumentError::RowLimit(_)));
    }

    #[test]
    fn test_dimensions_cover_used_range() {
        let config = users_config();
        let builder = DocumentBuilder::new(&config);
        let stream = builder.workbook_stream(&[user("a", "b", 1)]).unwrap();
        let (_, payload) = biff::records(&stream).find(|(t, _)| *t == 0x0200).unwrap();
        assert_eq!(&payload[0..4], &0u32.to_le_bytes()); // first row
        assert_eq!(&payload[4..8], &2u32.to_le_bytes()); // last row + 1
        assert_eq!(&payload[8..10], &0u16.to_le_bytes()); // first col
        assert_eq!(&payload[10..12], &3u16.to_le_bytes()); // last col + 1
    }

    #[test]
    fn test_japanese_header_reaches_sst() {
        let config = users_config();
        let builder = DocumentBuilder::new(&config);
        let stream = builder.workbook_stream(&[]).unwrap();
        let (_, sst_payload) = biff::records(&stream).find(|(t, _)| *t == 0x00FC).unwrap();
        // cstUnique = 3 header labels
        assert_eq!(&sst_payload[4..8], &3u32.to_le_bytes());
        // First string is 氏名 in UTF-16
        assert_eq!(&sst_payload[8..10], &2u16.to_le_bytes());
        assert_eq!(sst_payload[10], 0x01);
    }
}
