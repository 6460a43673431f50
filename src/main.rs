use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Local;
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use pdf_catalog::catalog::data::{records_from_table, sample_table, table_from_json};
use pdf_catalog::catalog::library::{author_summary, category_summary};
use pdf_catalog::{
    CancelFlag, CatalogEngine, CatalogError, CatalogMode, CatalogRequest, CatalogResult,
    CatalogSettings, Coordinator,
};

/// Generate image-illustrated PDF product catalogs
#[derive(Parser, Debug)]
#[command(name = "pdf-catalog", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// Where the rows come from
#[derive(Args, Debug)]
struct Source {
    /// JSON array of rows (arrays of cells), header row first
    #[arg(long, conflicts_with = "demo")]
    input: Option<PathBuf>,
    /// Use the built-in eight-product sample sheet
    #[arg(long)]
    demo: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a catalog PDF
    Generate {
        #[command(flatten)]
        source: Source,
        /// category, author or full
        #[arg(long, default_value = "category")]
        mode: CatalogMode,
        /// Category path or author name to include (repeatable)
        #[arg(long = "select")]
        select: Vec<String>,
        /// Output file (defaults to a timestamped name in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// JSON settings file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the categories and authors available for selection
    Summary {
        #[command(flatten)]
        source: Source,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

async fn load_table(source: &Source) -> CatalogResult<Vec<Vec<String>>> {
    match (&source.input, source.demo) {
        (Some(path), _) => {
            let json = tokio::fs::read_to_string(path).await?;
            table_from_json(&json)
        }
        (None, true) => Ok(sample_table()),
        (None, false) => Err(CatalogError::InvalidInput(
            "pass --input FILE or --demo".to_string(),
        )),
    }
}

async fn generate(
    source: &Source,
    mode: CatalogMode,
    select: Vec<String>,
    output: Option<PathBuf>,
    config: Option<PathBuf>,
) -> CatalogResult<()> {
    let settings = match &config {
        Some(path) => CatalogSettings::load(path)?,
        None => CatalogSettings::default(),
    };
    let table = load_table(source).await?;

    let mut request = CatalogRequest::new(mode);
    if !select.is_empty() {
        request = request.with_selection(select);
    }
    let output = output.unwrap_or_else(|| PathBuf::from(request.default_file_name(&Local::now())));

    let cancel = CancelFlag::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("cancellation requested");
            on_ctrl_c.cancel();
        }
    });

    let coordinator = Coordinator::new()
        .with_sink(|percent: u8, message: &str| tracing::info!(percent, "{}", message))
        .with_cancel(cancel);

    let engine = CatalogEngine::new(settings)?;
    let report = engine.run(&table, &request, &output, &coordinator).await?;
    println!("{}", report.output.display());
    Ok(())
}

async fn summary(source: &Source) -> CatalogResult<()> {
    let records = records_from_table(&load_table(source).await?);
    let listing = json!({
        "categories": category_summary(&records),
        "authors": author_summary(&records),
    });
    println!("{}", serde_json::to_string_pretty(&listing)?);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Generate {
            source,
            mode,
            select,
            output,
            config,
        } => generate(&source, mode, select, output, config).await,
        Command::Summary { source } => summary(&source).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(CatalogError::Cancelled) => ExitCode::from(130),
        Err(err) => {
            tracing::error!(error = %err, "pdf-catalog failed");
            ExitCode::FAILURE
        }
    }
}
