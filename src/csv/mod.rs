//! CSV row serialization and Windows-oriented text preparation.
//!
//! Two concerns live here: turning a slice of scalars into one properly
//! quoted CSV line, and normalizing/transcoding text so legacy Windows
//! spreadsheet tools open it cleanly (CRLF line endings, Shift_JIS bytes).

use csv::{QuoteStyle, WriterBuilder};
use encoding_rs::{Encoding, SHIFT_JIS};
use serde_json::Value;

use crate::error::{CsvError, CsvResult};

/// Default transcoding target for legacy Windows consumers.
pub const DEFAULT_LEGACY_ENCODING: &'static Encoding = SHIFT_JIS;

// =============================================================================
// Row Serialization
// =============================================================================

/// Render a scalar the way it appears in a CSV field.
pub fn render_field(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        // Nested structures have no CSV form; fall back to JSON text
        other => other.to_string(),
    }
}

/// Serialize one row of scalars to a CSV line without a trailing
/// terminator.
///
/// A field is quoted only when it contains a comma, a double quote, or a
/// newline; embedded quotes are doubled. Fields that need no quoting are
/// emitted verbatim.
pub fn serialize_row(fields: &[Value]) -> CsvResult<String> {
    let rendered: Vec<String> = fields.iter().map(render_field).collect();

    // The writer quotes a lone empty field to keep the record from
    // reading as empty; nothing in an all-empty row needs quoting, so
    // join it directly.
    if rendered.iter().all(|f| f.is_empty()) {
        return Ok(rendered.join(","));
    }

    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Necessary)
        .from_writer(Vec::new());

    writer.write_record(&rendered)?;
    writer.flush().map_err(|e| CsvError::Buffer(e.to_string()))?;

    let bytes = writer
        .into_inner()
        .map_err(|e| CsvError::Buffer(e.to_string()))?;
    let mut line = String::from_utf8(bytes).map_err(|e| CsvError::Buffer(e.to_string()))?;

    // The writer always terminates the record
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(line)
}

// =============================================================================
// Windows Normalization
// =============================================================================

/// Normalize every line-break convention in `text` to CRLF.
///
/// All of LFCR, CRLF, LF and CR collapse to a single break, in that
/// match order, so mixed input normalizes deterministically and a second
/// application is a no-op.
pub fn windows_normalize(text: &str) -> String {
    let collapsed = text
        .replace("\n\r", "\n")
        .replace("\r\n", "\n")
        .replace('\r', "\n");
    collapsed.replace('\n', "\r\n")
}

/// CRLF-normalize `text`, then transcode it from UTF-8.
///
/// Characters without a representation in `encoding` are an error, never
/// silently replaced.
pub fn windows_encode(text: &str, encoding: &'static Encoding) -> CsvResult<Vec<u8>> {
    let normalized = windows_normalize(text);
    let (bytes, _, had_errors) = encoding.encode(&normalized);
    if had_errors {
        return Err(CsvError::Encoding {
            encoding: encoding.name().to_string(),
        });
    }
    Ok(bytes.into_owned())
}

/// [`windows_encode`] with the Shift_JIS default target.
pub fn windows_encode_default(text: &str) -> CsvResult<Vec<u8>> {
    windows_encode(text, DEFAULT_LEGACY_ENCODING)
}
