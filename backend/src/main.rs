//! DataNexus CLI - clean and transform tabular datasets
//!
//! # Main Commands
//!
//! ```bash
//! datanexus serve                                  # Start HTTP server (port 3000)
//! datanexus transform data.csv -p pipeline.json    # Apply a pipeline to a file
//! datanexus profile data.csv                       # Print dataset profile JSON
//! ```
//!
//! # Debug Commands (for development)
//!
//! ```bash
//! datanexus parse data.csv          # Just parse to JSON records
//! datanexus operations              # Show the available operations
//! ```

use clap::{Parser, Subcommand};
use datanexus::{
    export::{self, ExportFormat},
    parser::{self, LoadOptions, DEFAULT_CHUNK_SIZE},
    profile,
    session::SessionManager,
    transform::{operations_description, pipeline},
    validation, CacheConfig, DerivedDataset,
};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "datanexus")]
#[command(about = "Clean and transform tabular datasets without code", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a dataset file and output JSON records
    Parse {
        /// Input file (.csv or .xlsx)
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Apply a pipeline definition to a dataset file
    Transform {
        /// Input file (.csv or .xlsx)
        input: PathBuf,

        /// Pipeline definition JSON file
        #[arg(short, long)]
        pipeline: PathBuf,

        /// Output file (default: stdout for csv)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format: csv or xlsx (default: csv)
        #[arg(short, long, default_value = "csv")]
        format: String,
    },

    /// Print the dataset profile as JSON
    Profile {
        /// Input file (.csv or .xlsx)
        input: PathBuf,

        /// Profile the result of a pipeline instead of the raw dataset
        #[arg(short, long)]
        pipeline: Option<PathBuf>,
    },

    /// Show the available operations
    Operations,

    /// Start the HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Parse { input, output } => cmd_parse(input, output),
        Commands::Transform {
            input,
            pipeline,
            output,
            format,
        } => cmd_transform(input, pipeline, output, format),
        Commands::Profile { input, pipeline } => cmd_profile(input, pipeline),
        Commands::Operations => {
            println!("{}", operations_description());
            Ok(())
        }
        Commands::Serve { port } => cmd_serve(port).await,
    };

    if let Err(message) = result {
        eprintln!("Error: {}", message);
        std::process::exit(1);
    }
}

fn load_options() -> LoadOptions {
    let chunk_size = std::env::var("DATANEXUS_CHUNK_SIZE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_CHUNK_SIZE);
    LoadOptions { chunk_size }
}

fn cache_config() -> CacheConfig {
    let defaults = CacheConfig::default();
    let max_entries = std::env::var("DATANEXUS_CACHE_ENTRIES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults.max_entries);
    let max_bytes = std::env::var("DATANEXUS_CACHE_MB")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .map(|mb| mb * 1024 * 1024)
        .unwrap_or(defaults.max_bytes);
    CacheConfig {
        max_entries,
        max_bytes,
    }
}

fn cmd_parse(input: PathBuf, output: Option<PathBuf>) -> Result<(), String> {
    let dataset = parser::load_path(&input, &load_options()).map_err(|e| e.to_string())?;

    let records = dataset.table().to_json_records();
    let json = serde_json::to_string_pretty(&records).map_err(|e| e.to_string())?;

    eprintln!(
        "Parsed {} rows x {} columns (fingerprint {})",
        dataset.table().row_count(),
        dataset.schema().len(),
        &dataset.fingerprint()[..12],
    );

    write_text(output, json)
}

fn read_pipeline(path: &PathBuf) -> Result<Vec<datanexus::Operation>, String> {
    let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
    let doc: serde_json::Value = serde_json::from_str(&content).map_err(|e| e.to_string())?;
    validation::parse_pipeline_definition(&doc).map_err(|errors| errors.join("\n"))
}

fn cmd_transform(
    input: PathBuf,
    pipeline_path: PathBuf,
    output: Option<PathBuf>,
    format: String,
) -> Result<(), String> {
    let format: ExportFormat = format.parse()?;
    let dataset = parser::load_path(&input, &load_options()).map_err(|e| e.to_string())?;
    let ops = read_pipeline(&pipeline_path)?;

    let derived = pipeline::run(&dataset, &ops).map_err(|e| e.to_string())?;
    eprintln!(
        "Applied {} operations: {} rows -> {} rows",
        ops.len(),
        dataset.table().row_count(),
        derived.row_count(),
    );

    let bytes = export::serialize(&derived, format).map_err(|e| e.to_string())?;
    match (output, format) {
        (Some(path), _) => fs::write(&path, bytes).map_err(|e| e.to_string()),
        (None, ExportFormat::Csv) => {
            let text = String::from_utf8(bytes).map_err(|e| e.to_string())?;
            print!("{}", text);
            Ok(())
        }
        (None, ExportFormat::Xlsx) => Err("xlsx output requires --output".to_string()),
    }
}

fn cmd_profile(input: PathBuf, pipeline_path: Option<PathBuf>) -> Result<(), String> {
    let dataset = parser::load_path(&input, &load_options()).map_err(|e| e.to_string())?;

    let derived = match pipeline_path {
        Some(path) => {
            let ops = read_pipeline(&path)?;
            pipeline::run(&dataset, &ops).map_err(|e| e.to_string())?
        }
        None => DerivedDataset::new(dataset.table().clone()),
    };

    let report = profile::profile(derived.table());
    let json = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}

async fn cmd_serve(port: u16) -> Result<(), String> {
    let port = std::env::var("DATANEXUS_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(port);

    let manager = Arc::new(SessionManager::new(cache_config()));
    datanexus::server::start_server(port, manager)
        .await
        .map_err(|e| e.to_string())
}

fn write_text(output: Option<PathBuf>, text: String) -> Result<(), String> {
    match output {
        Some(path) => fs::write(&path, text).map_err(|e| e.to_string()),
        None => {
            println!("{}", text);
            Ok(())
        }
    }
}
