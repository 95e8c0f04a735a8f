//! A3S WebExt CLI - converts search descriptors into packaged WebExtensions.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use a3s_webext::{Converter, ConverterConfig};

/// A3S WebExt - search descriptor to WebExtension converter
#[derive(Parser)]
#[command(name = "a3s-webext")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert one engine, or every discovered engine
    Convert(ConvertArgs),

    /// List discovered engines and their locale files
    Engines(SourceArgs),
}

#[derive(Parser)]
struct SourceArgs {
    /// Source tree root
    #[arg(short, long, default_value = ".")]
    source: PathBuf,

    /// JSON configuration file extending the built-in tables
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Parser)]
struct ConvertArgs {
    /// Engine identity to convert (all engines when omitted)
    engine: Option<String>,

    #[command(flatten)]
    source: SourceArgs,

    /// Directory for staging trees and archives
    #[arg(short = 'd', long, default_value = "dist")]
    out_dir: PathBuf,

    /// Explicit archive path (single engine only)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Convert(args) => run_convert(args).await,
        Commands::Engines(args) => list_engines(args),
    }
}

fn build_converter(args: &SourceArgs, out_dir: PathBuf) -> Result<Converter> {
    let config = match &args.config {
        Some(path) => ConverterConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ConverterConfig::default(),
    };
    let converter = Converter::new(&args.source, out_dir).with_config(config);

    let descriptor_dir = converter.descriptor_dir();
    if !descriptor_dir.is_dir() {
        anyhow::bail!("Descriptor directory not found: {}", descriptor_dir.display());
    }
    Ok(converter)
}

fn list_engines(args: SourceArgs) -> Result<()> {
    let converter = build_converter(&args, PathBuf::from("dist"))?;
    let groups = converter.discover()?;

    if groups.is_empty() {
        println!("No descriptor files found in {}", converter.descriptor_dir().display());
        return Ok(());
    }

    println!("Discovered engines:\n");
    for (engine_id, files) in &groups {
        let names: Vec<_> = files
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy())
            .collect();
        println!("  {:<20} {}", engine_id, names.join(", "));
    }
    println!();
    println!("Usage: a3s-webext convert <engine> --source <dir>");
    Ok(())
}

async fn run_convert(args: ConvertArgs) -> Result<()> {
    if args.output.is_some() && args.engine.is_none() {
        anyhow::bail!("--output requires an engine to be selected");
    }

    let converter = build_converter(&args.source, args.out_dir)?;

    let reports = match &args.engine {
        Some(engine_id) => vec![
            converter
                .convert_engine(engine_id, args.output.as_deref())
                .await?,
        ],
        None => converter.convert_all().await?,
    };

    for report in &reports {
        println!("{}", report);
        for warning in &report.warnings {
            println!("    warning: {}", warning);
        }
    }

    let packaged = reports.iter().filter(|r| r.is_success()).count();
    println!("\n{} of {} engine(s) packaged", packaged, reports.len());
    Ok(())
}
