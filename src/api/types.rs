//! REST API response types.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Response for `GET /api/exports`: the registered export names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogResponse {
    pub exports: Vec<String>,
}

/// Create an error response body
pub fn error_response(error: &str) -> Value {
    json!({
        "status": "error",
        "error": error,
    })
}
