// Recibos - Web Server
// REST API over the ingestion pipeline with Axum

use axum::{
    body::Bytes,
    extract::{Path as AxumPath, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use recibos::{
    BatchIngestor, CodeRegistry, CsvAuditLedger, DiskBlobStore, IngestSummary, LedgerEntry,
    LedgerFilter, LopdfExtractor, Pipeline, PipelineConfig, ReconcileReport, SqliteStore,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
    ingestor: Arc<BatchIngestor>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn err(message: String) -> Self {
        Self {
            success: false,
            data: (),
            error: Some(message),
        }
    }
}

/// Ledger entry response (simplified for API)
#[derive(Serialize, Deserialize)]
struct EntryResponse {
    key: String,
    legajo: String,
    periodo: String,
    empresa: String,
    nombre: Option<String>,
    source_files: Vec<String>,
    fields: BTreeMap<String, String>,
}

impl From<LedgerEntry> for EntryResponse {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            key: entry.key,
            legajo: entry.legajo,
            periodo: entry.periodo,
            empresa: entry.company.code().to_string(),
            nombre: entry.nombre,
            source_files: entry.source_files,
            fields: entry.fields,
        }
    }
}

#[derive(Deserialize)]
struct ReconcileRequest {
    official: BTreeMap<String, String>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/recibos/:filename - Upload and ingest one receipt
async fn upload_receipt(
    State(state): State<AppState>,
    AxumPath(filename): AxumPath<String>,
    body: Bytes,
) -> impl IntoResponse {
    let decoded_filename = urlencoding::decode(&filename)
        .unwrap_or_else(|_| filename.clone().into())
        .into_owned();

    let pipeline = state.pipeline.clone();
    let result =
        tokio::task::spawn_blocking(move || pipeline.ingest_file(&decoded_filename, &body)).await;

    match result {
        Ok(Ok(summary)) => {
            (StatusCode::OK, Json(ApiResponse::<IngestSummary>::ok(summary))).into_response()
        }
        Ok(Err(e)) => {
            eprintln!("Error ingesting receipt: {}", e);
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ApiResponse::err(e.to_string())),
            )
                .into_response()
        }
        Err(e) => {
            eprintln!("Ingest task failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::err(e.to_string())),
            )
                .into_response()
        }
    }
}

/// POST /api/ingest/:dir - Bulk ingest every PDF already on disk in a
/// server-visible directory
async fn ingest_directory(
    State(state): State<AppState>,
    AxumPath(dir): AxumPath<String>,
) -> impl IntoResponse {
    let decoded_dir = urlencoding::decode(&dir)
        .unwrap_or_else(|_| dir.clone().into())
        .into_owned();

    let mut files = Vec::new();
    match std::fs::read_dir(&decoded_dir) {
        Ok(entries) => {
            for entry in entries.flatten() {
                let path = entry.path();
                let is_pdf = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.eq_ignore_ascii_case("pdf"))
                    .unwrap_or(false);
                if !is_pdf {
                    continue;
                }
                let name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("recibo.pdf")
                    .to_string();
                match std::fs::read(&path) {
                    Ok(bytes) => files.push((name, bytes)),
                    Err(e) => eprintln!("Error reading {}: {}", name, e),
                }
            }
        }
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::err(format!("directorio inválido: {}", e))),
            )
                .into_response();
        }
    }

    let report = state
        .ingestor
        .ingest(files, Arc::new(AtomicBool::new(false)))
        .await;

    (StatusCode::OK, Json(ApiResponse::ok(report))).into_response()
}

/// GET /api/ledger - All consolidated entries
async fn get_ledger(State(state): State<AppState>) -> impl IntoResponse {
    ledger_response(&state, LedgerFilter::default())
}

/// GET /api/ledger/:periodo - Entries for one period
async fn get_ledger_period(
    State(state): State<AppState>,
    AxumPath(periodo): AxumPath<String>,
) -> impl IntoResponse {
    let decoded = urlencoding::decode(&periodo)
        .unwrap_or_else(|_| periodo.clone().into())
        .into_owned();

    ledger_response(
        &state,
        LedgerFilter {
            periodo: Some(decoded),
            ..Default::default()
        },
    )
}

fn ledger_response(state: &AppState, filter: LedgerFilter) -> axum::response::Response {
    match state.pipeline.ledger(&filter) {
        Ok(entries) => {
            let response: Vec<EntryResponse> = entries.into_iter().map(|e| e.into()).collect();
            (StatusCode::OK, Json(ApiResponse::ok(response))).into_response()
        }
        Err(e) => {
            eprintln!("Error querying ledger: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::ok(Vec::<EntryResponse>::new())),
            )
                .into_response()
        }
    }
}

/// POST /api/reconcile/:legajo/:periodo - Diff against an official map
async fn reconcile(
    State(state): State<AppState>,
    AxumPath((legajo, periodo)): AxumPath<(String, String)>,
    Json(request): Json<ReconcileRequest>,
) -> impl IntoResponse {
    let decoded_periodo = urlencoding::decode(&periodo)
        .unwrap_or_else(|_| periodo.clone().into())
        .into_owned();

    match state
        .pipeline
        .reconcile(&legajo, &decoded_periodo, Some(&request.official))
    {
        Ok(report) => {
            (StatusCode::OK, Json(ApiResponse::<ReconcileReport>::ok(report))).into_response()
        }
        Err(e) => {
            eprintln!("Error reconciling {}/{}: {}", legajo, decoded_periodo, e);
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ApiResponse::err(e.to_string())),
            )
                .into_response()
        }
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() {
    println!("🧾 Recibos - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = PipelineConfig::default();

    let store = SqliteStore::open(Path::new("recibos.db")).expect("Failed to open database");
    println!("✓ Database opened: recibos.db");

    let csv_ledger =
        CsvAuditLedger::open(Path::new("auditoria.csv")).expect("Failed to open audit ledger");
    let blobs = DiskBlobStore::new(Path::new("archivos")).expect("Failed to open blob dir");

    let pipeline = Arc::new(
        Pipeline::new(
            Arc::new(store),
            Arc::new(LopdfExtractor::new()),
            Some(Arc::new(csv_ledger)),
            Some(Arc::new(blobs)),
            CodeRegistry::builtin(),
            &config,
        )
        .expect("Failed to build pipeline"),
    );

    let ingestor = Arc::new(BatchIngestor::new(
        pipeline.clone(),
        config.max_concurrent,
        config.extract_timeout,
    ));

    let state = AppState { pipeline, ingestor };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/recibos/:filename", post(upload_receipt))
        .route("/ingest/:dir", post(ingest_directory))
        .route("/ledger", get(get_ledger))
        .route("/ledger/:periodo", get(get_ledger_period))
        .route("/reconcile/:legajo/:periodo", post(reconcile))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(tower_http::cors::CorsLayer::permissive());

    let addr = "0.0.0.0:3000";
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    println!("\n🚀 Server running on http://localhost:3000");
    println!("   API: http://localhost:3000/api/ledger");
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
