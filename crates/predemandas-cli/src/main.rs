mod archive;
mod config;
mod input;
mod transport;
mod workbook;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use predemandas_core::{
    build_matrix, export_matrix, merge_clients, merge_shared, run_dispatch, CancelToken,
    DeliveryTransport, DuplicatePolicy, Session,
};
use predemandas_pdf::PdfConcatenator;
use serde::Serialize;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use crate::config::{relay_token, AppConfig, TransportConfig};
use crate::input::load_session;
use crate::transport::{OutboxTransport, RelayTransport};

const CLI_CONTRACT_VERSION: &str = "predemandas.v1";
const DEFAULT_LOG_FILTER: &str = "warn,predemandas=info";

#[derive(Debug, Parser)]
#[command(name = "predemandas")]
#[command(about = "Classify, bundle and dispatch pre-filing lawsuit documents")]
struct Cli {
    /// YAML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Overrides the duplicate policy from the configuration file.
    #[arg(long, value_enum, global = true)]
    duplicates: Option<DuplicatesArg>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Report category and identity for every input file.
    Classify(InputArgs),
    /// Build the traceability matrix.
    Matrix(MatrixArgs),
    /// Merge every client bundle into a zip archive.
    Bundle(BundleArgs),
    /// Deliver merged bundles for each reference row and write the dispatch log.
    Dispatch(DispatchArgs),
}

#[derive(Debug, Args)]
struct InputArgs {
    #[arg(long)]
    input: PathBuf,
}

#[derive(Debug, Args)]
struct MatrixArgs {
    #[command(flatten)]
    input: InputArgs,
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct BundleArgs {
    #[command(flatten)]
    input: InputArgs,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    matrix_out: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct DispatchArgs {
    #[command(flatten)]
    input: InputArgs,
    #[arg(long)]
    reference: PathBuf,
    #[arg(long)]
    log_out: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DuplicatesArg {
    LastWins,
    KeepFirst,
    Reject,
}

impl From<DuplicatesArg> for DuplicatePolicy {
    fn from(value: DuplicatesArg) -> Self {
        match value {
            DuplicatesArg::LastWins => Self::LastWins,
            DuplicatesArg::KeepFirst => Self::KeepFirst,
            DuplicatesArg::Reject => Self::Reject,
        }
    }
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(&with_contract_version(value))?
    );
    Ok(())
}

fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    fs::write(path, bytes)
        .with_context(|| format!("failed to write {}", path.display()))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = match cli.config.as_deref() {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    let policy = cli
        .duplicates
        .map(DuplicatePolicy::from)
        .or(config.duplicates)
        .unwrap_or_default();

    match cli.command {
        Command::Classify(args) => run_classify(&args, policy),
        Command::Matrix(args) => run_matrix(&args, policy),
        Command::Bundle(args) => run_bundle(&args, policy),
        Command::Dispatch(args) => run_dispatch_command(&args, policy, &config),
    }
}

fn run_classify(args: &InputArgs, policy: DuplicatePolicy) -> Result<()> {
    let loaded = load_session(&args.input, policy)?;
    let unmatched = loaded
        .reports
        .iter()
        .filter(|report| report.classification.category().is_none())
        .count();
    emit_json(serde_json::json!({
        "input": args.input.display().to_string(),
        "duplicates": policy.as_str(),
        "clients": loaded.session.client_count(),
        "unmatched": unmatched,
        "files": loaded.reports,
        "rejected": loaded.rejections,
    }))
}

fn run_matrix(args: &MatrixArgs, policy: DuplicatePolicy) -> Result<()> {
    let loaded = load_session(&args.input.input, policy)?;
    let export = export_matrix(&build_matrix(&loaded.session));
    if let Some(out) = args.out.as_deref() {
        write_json_file(out, &export)?;
    }
    emit_json(serde_json::json!({
        "written_to": args.out.as_ref().map(|out| out.display().to_string()),
        "columns": export.columns,
        "rows": export.rows,
    }))
}

fn run_bundle(args: &BundleArgs, policy: DuplicatePolicy) -> Result<()> {
    let loaded = load_session(&args.input.input, policy)?;
    let session = &loaded.session;
    let concatenator = PdfConcatenator::new();
    let run = merge_clients(session, &concatenator, &CancelToken::new());
    let shared = needs_shared_bundle(session).then(|| merge_shared(session, &concatenator));
    let folders = archive::write_bundle(&args.out, session, &run, shared.as_ref())?;

    if let Some(out) = args.matrix_out.as_deref() {
        write_json_file(out, &export_matrix(&build_matrix(session)))?;
    }
    emit_json(serde_json::json!({
        "archive": args.out.display().to_string(),
        "clients": run.merges.len(),
        "failures": run.failures(),
        "cancelled": run.cancelled,
        "folders": folders,
        "rejected": loaded.rejections,
    }))
}

fn needs_shared_bundle(session: &Session) -> bool {
    session.client_count() == 0 && session.shared_documents().next().is_some()
}

fn run_dispatch_command(
    args: &DispatchArgs,
    policy: DuplicatePolicy,
    config: &AppConfig,
) -> Result<()> {
    let dispatch = config
        .dispatch()
        .context("dispatch requires --config with a dispatch section")?;
    let table = workbook::read_reference(&args.reference)?;
    let loaded = load_session(&args.input.input, policy)?;

    let transport: Box<dyn DeliveryTransport> = match &dispatch.transport {
        TransportConfig::Outbox { dir } => {
            Box::new(OutboxTransport::new(dir.clone(), dispatch.sender.clone()))
        }
        TransportConfig::Relay {
            endpoint,
            token_env,
            allow_missing_attachment,
        } => Box::new(RelayTransport::new(
            endpoint.clone(),
            relay_token(token_env.as_deref())?,
            dispatch.sender.clone(),
            *allow_missing_attachment,
        )),
    };

    let log = run_dispatch(
        &loaded.session,
        &table,
        &PdfConcatenator::new(),
        transport.as_ref(),
        &dispatch.settings(),
        &CancelToken::new(),
    );
    let export = log.export();
    if let Some(out) = args.log_out.as_deref() {
        write_json_file(out, &export)?;
    }
    tracing::info!(
        rows = log.entries.len(),
        failures = log.failures(),
        "dispatch finished"
    );
    emit_json(serde_json::json!({
        "rows": log.entries.len(),
        "failures": log.failures(),
        "cancelled": log.cancelled,
        "entries": log.entries,
        "log": export,
        "written_to": args.log_out.as_ref().map(|out| out.display().to_string()),
    }))
}
