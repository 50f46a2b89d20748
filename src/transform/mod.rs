//! Row transform executor.
//!
//! Resolves a column procedure against one record: look up the transform,
//! apply it, and pair the resulting scalar with the declared cell type.
//! Errors carry the target cell address so a failure in row 3017 is
//! findable.

use serde_json::Value;

use crate::error::{TransformError, TransformResult};
use crate::models::{CellAddress, CellType, Record};
use crate::registry::{ColumnProcedure, TransformRegistry};

/// Execute one column procedure against one record.
///
/// `row` is the 1-based output row the value will land in, used only for
/// error context.
pub fn execute(
    registry: &TransformRegistry,
    procedure: &ColumnProcedure,
    record: &Record,
    row: u32,
) -> TransformResult<(Value, CellType)> {
    if let Err(e) = procedure.check() {
        return Err(TransformError::MalformedProcedure {
            address: format!("{}{}", procedure.column, row),
            reason: e.to_string(),
        });
    }
    // check() guarantees the letters parse
    let column = procedure
        .column_index()
        .map_err(|e| TransformError::MalformedProcedure {
            address: format!("{}{}", procedure.column, row),
            reason: e.to_string(),
        })?;
    let address = CellAddress::new(column, row);

    let transform = registry
        .get(&procedure.transform)
        .ok_or_else(|| TransformError::MissingTransform {
            name: procedure.transform.clone(),
            address: address.to_string(),
        })?;

    Ok((transform(record), procedure.cell_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TransformRegistry;
    use serde_json::json;

    fn registry() -> TransformRegistry {
        let mut registry = TransformRegistry::new();
        registry.register("extractName", |r: &Record| {
            r.get("name").cloned().unwrap_or(Value::Null)
        });
        registry
    }

    fn record() -> Record {
        let mut r = Record::new();
        r.insert("name".into(), json!("佐藤"));
        r
    }

    #[test]
    fn test_execute_resolves_transform_and_type() {
        let procedure = ColumnProcedure::new("A", "extractName", CellType::String);
        let (value, cell_type) = execute(&registry(), &procedure, &record(), 2).unwrap();
        assert_eq!(value, json!("佐藤"));
        assert_eq!(cell_type, CellType::String);
    }

    #[test]
    fn test_missing_transform_names_the_cell() {
        let procedure = ColumnProcedure::new("B", "extractEmail", CellType::String);
        let err = execute(&registry(), &procedure, &record(), 5).unwrap_err();
        match err {
            TransformError::MissingTransform { name, address } => {
                assert_eq!(name, "extractEmail");
                assert_eq!(address, "B5");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_malformed_procedure_is_fatal() {
        let procedure = ColumnProcedure::new("A", "", CellType::String);
        let err = execute(&registry(), &procedure, &record(), 2).unwrap_err();
        assert!(matches!(err, TransformError::MalformedProcedure { .. }));
    }
}
