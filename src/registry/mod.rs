//! Column procedure registry and export configuration.
//!
//! An export is described declaratively: each output column names a
//! registered transform and the cell type its result is written as. The
//! registry maps transform names to the closures that pull a scalar out
//! of a [`Record`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ConfigError, ConfigResult};
use crate::models::{CellAddress, CellType, DocumentMetadata, HeaderSpec, Record};

/// A transform: pure function from a record to a scalar value.
pub type Transform = Arc<dyn Fn(&Record) -> Value + Send + Sync>;

// =============================================================================
// Transform Registry
// =============================================================================

/// Named transforms available to column procedures.
///
/// Each document type registers its own selectors at startup; the
/// registry is immutable afterwards and shared across requests.
#[derive(Clone, Default)]
pub struct TransformRegistry {
    transforms: HashMap<String, Transform>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transform under a name, replacing any previous one.
    pub fn register<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&Record) -> Value + Send + Sync + 'static,
    {
        self.transforms.insert(name.into(), Arc::new(f));
    }

    /// Look up a transform by name.
    pub fn get(&self, name: &str) -> Option<&Transform> {
        self.transforms.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.transforms.contains_key(name)
    }

    /// Register a transform that copies a record field verbatim.
    pub fn register_field(&mut self, name: impl Into<String>, field: impl Into<String>) {
        let field = field.into();
        self.register(name, move |record: &Record| {
            record.get(&field).cloned().unwrap_or(Value::Null)
        });
    }
}

impl std::fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.transforms.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        f.debug_struct("TransformRegistry").field("transforms", &names).finish()
    }
}

// =============================================================================
// Column Procedures
// =============================================================================

/// One output column: which transform feeds it and what cell type it gets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnProcedure {
    /// Column letters, e.g. "A" or "AB".
    pub column: String,
    /// Registered transform name.
    pub transform: String,
    /// Declared cell type for every value this column produces.
    #[serde(rename = "type")]
    pub cell_type: CellType,
}

impl ColumnProcedure {
    pub fn new(column: impl Into<String>, transform: impl Into<String>, cell_type: CellType) -> Self {
        Self {
            column: column.into(),
            transform: transform.into(),
            cell_type,
        }
    }

    /// Build a procedure from a textual cell type, the way loose
    /// configuration sources (JSON, form input) supply it.
    pub fn from_parts(
        column: impl Into<String>,
        transform: impl Into<String>,
        type_name: &str,
    ) -> ConfigResult<Self> {
        let column = column.into();
        let cell_type =
            CellType::from_name(type_name).ok_or_else(|| ConfigError::UnknownCellType {
                column: column.clone(),
                cell_type: type_name.to_string(),
            })?;
        Ok(Self::new(column, transform, cell_type))
    }

    /// Structural checks shared by lazy and eager validation.
    pub fn check(&self) -> ConfigResult<()> {
        if self.column.trim().is_empty() {
            return Err(ConfigError::EmptyColumn);
        }
        if CellAddress::column_index(self.column.trim()).is_none() {
            return Err(ConfigError::InvalidAddress(self.column.clone()));
        }
        if self.transform.trim().is_empty() {
            return Err(ConfigError::EmptyTransform(self.column.clone()));
        }
        Ok(())
    }

    /// 0-based column index; `check()` must have passed.
    pub fn column_index(&self) -> ConfigResult<u16> {
        CellAddress::column_index(self.column.trim())
            .ok_or_else(|| ConfigError::InvalidAddress(self.column.clone()))
    }
}

// =============================================================================
// Export Configuration
// =============================================================================

/// Everything one export needs: layout, procedures, metadata, transforms.
#[derive(Clone)]
pub struct ExportConfig {
    /// Worksheet name shown on the tab.
    pub sheet_name: String,
    /// First data row, 1-based. Row 1 holds the header.
    pub start_row: u32,
    /// Header labels and their addresses.
    pub header: HeaderSpec,
    /// Output columns in emission order.
    pub procedures: Vec<ColumnProcedure>,
    /// Workbook summary properties.
    pub metadata: DocumentMetadata,
    /// Transforms the procedures draw from.
    pub registry: TransformRegistry,
}

impl ExportConfig {
    pub fn new(sheet_name: impl Into<String>) -> Self {
        Self {
            sheet_name: sheet_name.into(),
            start_row: 2,
            header: HeaderSpec::default(),
            procedures: Vec::new(),
            metadata: DocumentMetadata::default(),
            registry: TransformRegistry::new(),
        }
    }

    /// Validate the whole configuration eagerly.
    ///
    /// Catches everything the per-cell lazy checks would catch, plus
    /// unresolvable transform names, so a bad configuration fails at
    /// registration instead of on the first request.
    pub fn validate(&self) -> ConfigResult<()> {
        for (addr, _) in &self.header.cells {
            CellAddress::parse(addr)?;
        }
        for procedure in &self.procedures {
            procedure.check()?;
            if !self.registry.contains(&procedure.transform) {
                return Err(ConfigError::UnknownTransform {
                    column: procedure.column.clone(),
                    transform: procedure.transform.clone(),
                });
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ExportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportConfig")
            .field("sheet_name", &self.sheet_name)
            .field("start_row", &self.start_row)
            .field("procedures", &self.procedures)
            .finish()
    }
}
