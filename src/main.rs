use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use county_health_etl::app::publish_use_case::PublishUseCase;
use county_health_etl::config::{Config, ExportFormat};
use county_health_etl::infra::file_loader::FileLoader;
use county_health_etl::infra::report_writer::{write_quality_report, write_run_report};
use county_health_etl::observability::init_logging;
use county_health_etl::pipeline::{CleaningRegistry, Orchestrator, SchemaRegistry};

#[derive(Parser)]
#[command(name = "county_health_etl")]
#[command(about = "Clean, validate and export county behavioral-health datasets")]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, env = "ETL_CONFIG", default_value = "config.toml", global = true)]
    config: PathBuf,

    /// Override `pipeline.target_county`
    #[arg(long, env = "ETL_TARGET_COUNTY", global = true)]
    county: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, clean, validate and export datasets
    Run {
        /// Dataset keys to run (comma-separated). Defaults to the config, then to all.
        #[arg(long, value_delimiter = ',')]
        datasets: Vec<String>,
        /// Export formats (comma-separated)
        #[arg(long, value_enum, value_delimiter = ',')]
        formats: Vec<ExportFormat>,
    },
    /// List registered datasets
    List,
    /// Print one dataset contract as JSON
    Describe {
        /// Dataset key
        key: String,
    },
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(&cli.config).context("Failed to load configuration")?;
    if let Some(county) = cli.county.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        config.pipeline.target_county = county.to_string();
    }
    Ok(config)
}

fn build_registry(config: &Config) -> Result<Arc<SchemaRegistry>> {
    let registry = SchemaRegistry::builtin(&config.catalog_settings()).context("Failed to build dataset registry")?;
    Ok(Arc::new(registry))
}

/// Source paths in the config are relative to the config file
fn base_dir(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn run(cli: &Cli, config: Config, datasets: Vec<String>, formats: Vec<ExportFormat>) -> Result<()> {
    let schemas = build_registry(&config)?;
    let loader = FileLoader::new(base_dir(&cli.config), config.sources.clone());
    let orchestrator = Orchestrator::new(schemas, CleaningRegistry::new(), Box::new(loader))
        .context("Cleaning rules do not cover the dataset registry")?
        .with_sample_rows(config.pipeline.sample_rows);

    let datasets = if datasets.is_empty() { config.pipeline.datasets.clone() } else { datasets };
    let formats = if formats.is_empty() { config.output.formats.clone() } else { formats };

    println!("🔄 Running pipeline for {} County...", config.pipeline.target_county);
    let result = if datasets.is_empty() {
        orchestrator.run_all()
    } else {
        orchestrator.run(&datasets)
    }
    .context("Pipeline run aborted")?;

    println!("\n📊 Run {}:", result.run_id);
    for outcome in result.outcomes.values() {
        let rows = outcome.summary.as_ref().map(|s| s.row_count).unwrap_or_default();
        println!("   {:<32} {:<20} {} rows", outcome.key, outcome.state.label(), rows);
    }

    let publish = PublishUseCase::for_formats(&config.output.dir, &formats);
    let published = publish.publish(&result.frames());
    for (exporter, cause) in &published.failures {
        println!("❌ {} export failed: {}", exporter, cause);
    }
    info!(files = published.written.len(), "exports written");

    write_run_report(&result, &config.report_path()).context("Failed to write run report")?;
    write_quality_report(&result, &config.quality_report_path()).context("Failed to write data quality report")?;
    println!("📝 Reports written to {}", config.output.dir.display());

    let failed = result.failed_keys();
    if failed.is_empty() {
        println!("✅ {} datasets done", result.done_count());
    } else {
        warn!(failed = failed.len(), "some datasets failed");
        println!("\n⚠️  {} datasets failed. Re-run with:", failed.len());
        println!("   county_health_etl run --datasets {}", failed.join(","));
    }
    Ok(())
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match &cli.command {
        Commands::Run { datasets, formats } => {
            if let Err(e) = run(&cli, config, datasets.clone(), formats.clone()) {
                error!("Run failed: {:#}", e);
                return Err(e);
            }
        }
        Commands::List => {
            let schemas = build_registry(&config)?;
            println!("📋 {} registered datasets:", schemas.len());
            for spec in schemas.iter() {
                println!("   {:<32} {:<18} {}", spec.key(), spec.rule(), spec.label());
            }
        }
        Commands::Describe { key } => {
            let schemas = build_registry(&config)?;
            let spec = schemas.get(key).with_context(|| format!("Unknown dataset '{key}'"))?;
            println!("{}", serde_json::to_string_pretty(&*spec)?);
        }
    }
    Ok(())
}
