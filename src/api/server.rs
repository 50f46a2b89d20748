//! HTTP server for the export API.
//!
//! # API Endpoints
//!
//! | Method | Path                       | Description                      |
//! |--------|----------------------------|----------------------------------|
//! | GET    | `/health`                  | Health check                     |
//! | GET    | `/api/exports`             | List registered export names     |
//! | GET    | `/api/logs`                | SSE stream for real-time logs    |
//! | POST   | `/api/export/{name}.csv`   | Compile records to CSV           |
//! | POST   | `/api/export/{name}.xls`   | Compile records to a .xls file   |
//!
//! The export endpoints take a JSON array of records and respond with
//! the compiled document as an attachment, carrying the cache headers
//! old proxies and IE-over-SSL need to let the download through.

use axum::{
    extract::{Path, State},
    http::{header, HeaderName, Method, StatusCode},
    response::{sse::Event, IntoResponse, Json, Response, Sse},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_error, LOG_BROADCASTER};
use super::types::{error_response, CatalogResponse};
use crate::error::ServerError;
use crate::export::{CsvExporter, ExcelExporter, ExporterCatalog, FileExporter};
use crate::models::Record;

/// Attachment cache lifetime in seconds.
const CACHE_TTL_SECS: i64 = 1800;

/// Start the HTTP server
pub async fn start_server(port: u16, catalog: ExporterCatalog) -> Result<(), Box<dyn std::error::Error>> {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE, header::CONTENT_DISPOSITION]);

    let app = Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/exports", get(list_exports))
        .route("/api/logs", get(sse_logs))
        .route("/api/export/{file}", post(export))
        .layer(cors)
        .with_state(Arc::new(catalog));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 Export server running on http://localhost:{}", port);
    println!("   POST /api/export/{{name}}.csv - Compile records to CSV");
    println!("   POST /api/export/{{name}}.xls - Compile records to .xls");
    println!("   GET  /api/exports             - Registered exports");
    println!("   GET  /api/logs                - SSE log stream");
    println!("   GET  /health                  - Health check");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "export": "POST /api/export/{name}.{csv|xls}",
            "exports": "GET /api/exports",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// List the export names registered in the catalog
async fn list_exports(State(catalog): State<Arc<ExporterCatalog>>) -> Json<CatalogResponse> {
    Json(CatalogResponse {
        exports: catalog.names().map(str::to_string).collect(),
    })
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Compile an export and respond with the document as an attachment
async fn export(
    State(catalog): State<Arc<ExporterCatalog>>,
    Path(file): Path<String>,
    Json(records): Json<Vec<Record>>,
) -> Result<Response, (StatusCode, Json<Value>)> {
    let Some((name, extension)) = file.rsplit_once('.') else {
        let err = ServerError::BadRequest(format!("missing extension: {file}"));
        return Err((StatusCode::BAD_REQUEST, Json(error_response(&err.to_string()))));
    };

    let config = catalog.get(name).map_err(|e| {
        (StatusCode::NOT_FOUND, Json(error_response(&e.to_string())))
    })?;

    let body = match extension {
        "csv" => CsvExporter::new(config.clone()).try_output(&records),
        "xls" => ExcelExporter::new(config.clone()).try_output(&records),
        other => {
            let err = ServerError::BadRequest(format!("unsupported extension: {other}"));
            return Err((StatusCode::BAD_REQUEST, Json(error_response(&err.to_string()))));
        }
    }
    .map_err(|e| {
        let err = ServerError::from(e);
        log_error(format!("export {file} failed: {err}"));
        (StatusCode::UNPROCESSABLE_ENTITY, Json(error_response(&err.to_string())))
    })?;

    let now = Utc::now();
    let response = match extension {
        "csv" => respond_as_csv(body, &file, now).into_response(),
        _ => respond_as_excel(body, &file, now).into_response(),
    };
    Ok(response)
}

/// RFC 1123 date, always in GMT
fn http_date(when: DateTime<Utc>) -> String {
    when.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn attachment(
    payload: Vec<u8>,
    filename: &str,
    content_type: &'static str,
    now: DateTime<Utc>,
) -> ([(HeaderName, String); 6], Vec<u8>) {
    let headers = [
        (header::CONTENT_TYPE, content_type.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        ),
        (header::EXPIRES, http_date(now + ChronoDuration::seconds(CACHE_TTL_SECS))),
        (header::LAST_MODIFIED, http_date(now)),
        (header::CACHE_CONTROL, "public".to_string()),
        (header::PRAGMA, "public".to_string()),
    ];
    (headers, payload)
}

/// CSV attachment with download cache headers
pub fn respond_as_csv(payload: Vec<u8>, filename: &str, now: DateTime<Utc>) -> impl IntoResponse {
    attachment(payload, filename, "text/csv", now)
}

/// Excel attachment with download cache headers
pub fn respond_as_excel(payload: Vec<u8>, filename: &str, now: DateTime<Utc>) -> impl IntoResponse {
    attachment(payload, filename, "application/vnd.ms-excel", now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_http_date_is_rfc_1123_gmt() {
        assert_eq!(http_date(fixed_now()), "Mon, 01 Jan 2024 00:00:00 GMT");
    }

    #[test]
    fn test_csv_attachment_headers() {
        let response = respond_as_csv(b"a,b".to_vec(), "users.csv", fixed_now()).into_response();
        let headers = response.headers();
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "text/csv");
        assert_eq!(
            headers.get(header::CONTENT_DISPOSITION).unwrap(),
            "attachment; filename=\"users.csv\""
        );
        assert_eq!(headers.get(header::LAST_MODIFIED).unwrap(), "Mon, 01 Jan 2024 00:00:00 GMT");
        assert_eq!(headers.get(header::EXPIRES).unwrap(), "Mon, 01 Jan 2024 00:30:00 GMT");
        assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "public");
        assert_eq!(headers.get(header::PRAGMA).unwrap(), "public");
    }

    #[test]
    fn test_excel_attachment_content_type() {
        let response = respond_as_excel(Vec::new(), "users.xls", fixed_now()).into_response();
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/vnd.ms-excel"
        );
    }
}
