use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info, warn};

use erpforge_codegen_lib::{Assembler, BundleLibrary};
use erpforge_ir::Sdf;
use erpforge_validate::SchemaError;

mod config;
mod output;

use config::{GeneratorConfig, DEFAULT_CONFIG};

#[derive(Parser, Debug)]
#[command(name = "erpforge")]
#[command(about = "Generate CRUD services and routes from an SDF schema")]
struct Args {
    /// Input SDF schema (JSON)
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory (overrides output_dir in the config file)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Config file
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Log filter (overrides log_level in the config file and RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,

    /// Bundle to disable; may be repeated
    #[arg(long = "disable-bundle")]
    disable_bundle: Vec<String>,

    /// Validate and generate, but write nothing
    #[arg(long)]
    dry_run: bool,
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => tracing_subscriber::EnvFilter::new(level),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "info".into()),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = GeneratorConfig::load(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    init_logging(args.log_level.as_deref().or(config.log_level.as_deref()));

    info!("Reading schema: {}", args.input.display());
    let input = std::fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let sdf: Sdf = serde_json::from_str(&input).context("schema is not a valid SDF document")?;

    let library = BundleLibrary::builtin()
        .with_disabled(config.bundles.disabled.iter().chain(&args.disable_bundle).cloned());
    let code = match Assembler::new(library).generate(&sdf) {
        Ok(code) => code,
        Err(e) => {
            if let Some(schema) = e.downcast_ref::<SchemaError>() {
                error!(rule = schema.rule(), entity = schema.entity(), "{}", schema);
            }
            return Err(e.context("generation aborted; nothing was written"));
        }
    };
    for warning in &code.warnings {
        warn!("{}", warning);
    }

    if args.dry_run {
        for file in &code.files {
            info!("would write {}", file.path);
        }
        return Ok(());
    }

    let out_dir = args
        .output
        .or(config.output_dir)
        .unwrap_or_else(|| PathBuf::from("generated"));
    let written = output::write_all(&out_dir, &code)?;
    info!("Wrote {} files to {}", written.len(), out_dir.display());
    Ok(())
}
