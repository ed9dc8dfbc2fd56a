// Recibos CLI - batch ingest, ledger listing, reconciliation

use anyhow::{anyhow, Context, Result};
use recibos::{
    load_official_map, BatchIngestor, CodeRegistry, CsvAuditLedger, DiskBlobStore, LedgerFilter,
    LedgerStore, LopdfExtractor, Pipeline, PipelineConfig, SqliteStore,
};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

const DB_FILE: &str = "recibos.db";
const CSV_FILE: &str = "auditoria.csv";
const BLOB_DIR: &str = "archivos";

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("ingest") => {
            let dir = args
                .get(2)
                .ok_or_else(|| anyhow!("uso: recibos ingest <directorio>"))?;
            run_ingest(Path::new(dir))
        }
        Some("ledger") => run_ledger(args.get(2).cloned()),
        Some("reconcile") => {
            let (legajo, periodo, oficial) = match (args.get(2), args.get(3), args.get(4)) {
                (Some(l), Some(p), Some(o)) => (l, p, o),
                _ => return Err(anyhow!("uso: recibos reconcile <legajo> <periodo> <oficial.csv>")),
            };
            run_reconcile(legajo, periodo, Path::new(oficial))
        }
        _ => {
            eprintln!("Recibos v{}", recibos::VERSION);
            eprintln!("  recibos ingest <directorio>                    procesa los PDF del directorio");
            eprintln!("  recibos ledger [periodo]                       lista el libro consolidado");
            eprintln!("  recibos reconcile <legajo> <periodo> <csv>     compara contra valores oficiales");
            Ok(())
        }
    }
}

fn build_pipeline(data_dir: &Path) -> Result<Pipeline> {
    let store = Arc::new(SqliteStore::open(data_dir.join(DB_FILE))?);
    let csv_ledger = Arc::new(CsvAuditLedger::open(data_dir.join(CSV_FILE))?);
    let blobs = Arc::new(DiskBlobStore::new(data_dir.join(BLOB_DIR))?);

    let pipeline = Pipeline::new(
        store,
        Arc::new(LopdfExtractor::new()),
        Some(csv_ledger),
        Some(blobs),
        CodeRegistry::builtin(),
        &PipelineConfig::default(),
    )?;
    Ok(pipeline)
}

fn run_ingest(dir: &Path) -> Result<()> {
    println!("📂 Procesando recibos de {:?}", dir);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let mut files: Vec<(String, Vec<u8>)> = Vec::new();
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("no se pudo leer el directorio {:?}", dir))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("pdf"))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();

    for path in paths {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("recibo.pdf")
            .to_string();
        let bytes = fs::read(&path).with_context(|| format!("no se pudo leer {:?}", path))?;
        files.push((name, bytes));
    }

    if files.is_empty() {
        println!("No hay archivos PDF en {:?}", dir);
        return Ok(());
    }
    println!("✓ {} archivos encontrados", files.len());

    let config = PipelineConfig::default();
    let pipeline = Arc::new(build_pipeline(Path::new("."))?);
    let ingestor = BatchIngestor::new(pipeline, config.max_concurrent, config.extract_timeout);

    let runtime = tokio::runtime::Runtime::new()?;
    let report = runtime.block_on(ingestor.ingest(files, Arc::new(AtomicBool::new(false))));

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for outcome in &report.outcomes {
        match outcome.outcome {
            recibos::OutcomeKind::Ok => {
                let verb = if outcome.created == Some(true) { "nuevo" } else { "fusionado" };
                println!("✓ {} ({})", outcome.filename, verb);
            }
            _ => println!(
                "✗ {}: {}",
                outcome.filename,
                outcome.reason.as_deref().unwrap_or("sin detalle")
            ),
        }
    }
    println!("\n{}", report.summary());

    Ok(())
}

fn run_ledger(periodo: Option<String>) -> Result<()> {
    let store = SqliteStore::open(Path::new(DB_FILE))?;
    let filter = LedgerFilter {
        periodo,
        ..Default::default()
    };
    let entries = store.query(&filter)?;

    println!("📒 Libro consolidado: {} registros", entries.len());
    for entry in entries {
        println!(
            "  {} | {} | {} | {} | {} códigos | {} archivos",
            entry.legajo,
            entry.periodo,
            entry.company.name(),
            entry.nombre.as_deref().unwrap_or("-"),
            entry.fields.len(),
            entry.source_files.len(),
        );
    }
    Ok(())
}

fn run_reconcile(legajo: &str, periodo: &str, oficial: &Path) -> Result<()> {
    let official = load_official_map(oficial)?;
    let pipeline = build_pipeline(Path::new("."))?;

    let report = pipeline.reconcile(legajo, periodo, Some(&official))?;

    println!("⚖️  Conciliación legajo {} período {}", legajo, periodo);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    if report.no_official_data {
        println!("Sin datos oficiales para esta clave.");
        return Ok(());
    }
    if report.items.is_empty() {
        println!("✓ Sin diferencias por encima de la tolerancia");
        return Ok(());
    }

    for item in &report.items {
        println!(
            "  {} {} | oficial {} | calculado {} | Δ {} ({})",
            item.code,
            item.label,
            item.official,
            item.calculated,
            item.delta,
            item.direction.as_str(),
        );
    }
    println!("\n{} diferencias", report.items.len());
    Ok(())
}
