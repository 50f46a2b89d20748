//! Domain models for the sheetport export pipeline.
//!
//! This module contains the core data structures used throughout the pipeline:
//!
//! - [`Record`] - a flat field-to-scalar input record
//! - [`CellType`] - declared data type of an output cell
//! - [`CellAddress`] - "A1"-style spreadsheet coordinates
//! - [`HeaderSpec`] - header labels with their target addresses
//! - [`DocumentMetadata`] - workbook summary properties

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::ConfigError;

/// A flat input record: field name to scalar value.
///
/// Records are produced by the caller (database rows, API payloads) and
/// are never mutated by the export pipeline.
pub type Record = serde_json::Map<String, Value>;

// =============================================================================
// Cell Types
// =============================================================================

/// Declared data type of an output cell.
///
/// Every column procedure names one of these explicitly; the document
/// builder never guesses a type from the value's shape.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CellType {
    /// Text cell. Numeric-looking strings stay strings.
    String,
    /// Numeric cell backed by an IEEE 754 double.
    Numeric,
    /// Boolean cell.
    Boolean,
    /// Formula text stored literally, never evaluated.
    Formula,
    /// Always-blank cell.
    Null,
}

impl CellType {
    /// Parse a cell type from its configuration name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "string" | "str" | "s" => Some(Self::String),
            "numeric" | "number" | "n" => Some(Self::Numeric),
            "boolean" | "bool" | "b" => Some(Self::Boolean),
            "formula" | "f" => Some(Self::Formula),
            "null" => Some(Self::Null),
            _ => None,
        }
    }

    /// Human-readable name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Numeric => "numeric",
            Self::Boolean => "boolean",
            Self::Formula => "formula",
            Self::Null => "null",
        }
    }
}

// =============================================================================
// Cell Addresses
// =============================================================================

/// A spreadsheet cell coordinate.
///
/// `column` is 0-based ("A" = 0, "AA" = 26); `row` is 1-based, matching
/// the "A1" text form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellAddress {
    pub column: u16,
    pub row: u32,
}

impl CellAddress {
    pub fn new(column: u16, row: u32) -> Self {
        Self { column, row }
    }

    /// Parse an "A1"-style address.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let letters: String = text.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
        let digits = &text[letters.len()..];
        if letters.is_empty() || digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::InvalidAddress(text.to_string()));
        }
        let column = Self::column_index(&letters)
            .ok_or_else(|| ConfigError::InvalidAddress(text.to_string()))?;
        let row: u32 = digits
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(text.to_string()))?;
        if row == 0 {
            return Err(ConfigError::InvalidAddress(text.to_string()));
        }
        Ok(Self { column, row })
    }

    /// Convert column letters to a 0-based index.
    pub fn column_index(letters: &str) -> Option<u16> {
        if letters.is_empty() {
            return None;
        }
        let mut index: u32 = 0;
        for c in letters.chars() {
            if !c.is_ascii_alphabetic() {
                return None;
            }
            let digit = (c.to_ascii_uppercase() as u32) - ('A' as u32) + 1;
            index = index * 26 + digit;
            if index > 256 {
                // BIFF8 sheets top out at column IV
                return None;
            }
        }
        Some((index - 1) as u16)
    }

    /// Convert a 0-based column index back to letters.
    pub fn column_letters(mut column: u16) -> String {
        let mut letters = Vec::new();
        loop {
            letters.push(b'A' + (column % 26) as u8);
            if column < 26 {
                break;
            }
            column = column / 26 - 1;
        }
        letters.reverse();
        String::from_utf8(letters).unwrap_or_default()
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", Self::column_letters(self.column), self.row)
    }
}

// =============================================================================
// Header Specification
// =============================================================================

/// Header labels with the cells they occupy.
///
/// The header is written as-is before any data rows; labels need not be
/// contiguous or start at column A.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeaderSpec {
    /// (address text, label) pairs, e.g. `("A1", "氏名")`.
    pub cells: Vec<(String, String)>,
}

impl HeaderSpec {
    /// Build a single-row header at row 1 from consecutive labels.
    pub fn from_labels(labels: &[&str]) -> Self {
        let cells = labels
            .iter()
            .enumerate()
            .map(|(i, label)| {
                let address = CellAddress::new(i as u16, 1);
                (address.to_string(), label.to_string())
            })
            .collect();
        Self { cells }
    }

    /// Resolve every address, failing on the first malformed one.
    pub fn resolved(&self) -> Result<Vec<(CellAddress, &str)>, ConfigError> {
        self.cells
            .iter()
            .map(|(addr, label)| Ok((CellAddress::parse(addr)?, label.as_str())))
            .collect()
    }
}

// =============================================================================
// Document Metadata
// =============================================================================

/// Workbook summary properties.
///
/// These surface in the file manager's property sheet, not in any cell.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentMetadata {
    pub creator: String,
    pub title: String,
    pub subject: String,
    pub description: String,
    pub keywords: String,
    pub category: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_type_from_name() {
        assert_eq!(CellType::from_name("string"), Some(CellType::String));
        assert_eq!(CellType::from_name("NUMERIC"), Some(CellType::Numeric));
        assert_eq!(CellType::from_name(" bool "), Some(CellType::Boolean));
        assert_eq!(CellType::from_name("formula"), Some(CellType::Formula));
        assert_eq!(CellType::from_name("null"), Some(CellType::Null));
        assert_eq!(CellType::from_name("date"), None);
        assert_eq!(CellType::from_name(""), None);
    }

    #[test]
    fn test_address_parse_and_display() {
        let a1 = CellAddress::parse("A1").unwrap();
        assert_eq!(a1, CellAddress::new(0, 1));
        assert_eq!(a1.to_string(), "A1");

        let aa10 = CellAddress::parse("AA10").unwrap();
        assert_eq!(aa10, CellAddress::new(26, 10));
        assert_eq!(aa10.to_string(), "AA10");

        let b2 = CellAddress::parse("b2").unwrap();
        assert_eq!(b2, CellAddress::new(1, 2));
    }

    #[test]
    fn test_address_parse_rejects_garbage() {
        assert!(CellAddress::parse("").is_err());
        assert!(CellAddress::parse("A").is_err());
        assert!(CellAddress::parse("1").is_err());
        assert!(CellAddress::parse("A0").is_err());
        assert!(CellAddress::parse("A1B").is_err());
        // Past column IV
        assert!(CellAddress::parse("ZZZ1").is_err());
    }

    #[test]
    fn test_column_letters_round_trip() {
        for (letters, index) in [("A", 0u16), ("Z", 25), ("AA", 26), ("AZ", 51), ("BA", 52), ("IV", 255)] {
            assert_eq!(CellAddress::column_index(letters), Some(index));
            assert_eq!(CellAddress::column_letters(index), letters);
        }
    }

    #[test]
    fn test_header_from_labels() {
        let header = HeaderSpec::from_labels(&["氏名", "メール"]);
        let resolved = header.resolved().unwrap();
        assert_eq!(resolved[0], (CellAddress::new(0, 1), "氏名"));
        assert_eq!(resolved[1], (CellAddress::new(1, 1), "メール"));
    }
}
