use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{error, info};

use service_sync::app::export_use_case::ExportUseCase;
use service_sync::app::migrate_use_case::{MigrateUseCase, RunAborted, RunSummary};
use service_sync::app::ports::SourceStore;
use service_sync::config::{MigrationConfig, RunSettings};
use service_sync::error::MigrationError;
use service_sync::infra::json_source_adapter::JsonFileSourceStore;
use service_sync::infra::sqlite_target_adapter::SqliteTargetStore;
use service_sync::observability::{logging, metrics};
use service_sync::pipeline::processing::normalize::Normalizer;

#[derive(Parser)]
#[command(name = "service_sync")]
#[command(about = "Migrate service records from a document store into a relational table")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the TOML config (defaults to ./service_sync.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Write the Prometheus text exposition here after the command finishes
    #[arg(long, global = true)]
    metrics_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract, normalize, dedupe and load the configured collection
    Migrate {
        /// Run every stage except the load and report what would be inserted
        #[arg(long)]
        dry_run: bool,
        /// Partition key, overrides config and environment
        #[arg(long)]
        country: Option<String>,
        #[arg(long)]
        chunk_size: Option<usize>,
    },
    /// Snapshot the collection to raw JSON, normalized JSON and CSV
    Export {
        #[arg(long)]
        output_dir: Option<PathBuf>,
        #[arg(long)]
        country: Option<String>,
    },
    /// Load a single JSON dump file through the same dedupe and load path
    Seed {
        /// Dump file: JSON array, object keyed by id, or NDJSON
        #[arg(long)]
        from: PathBuf,
        #[arg(long)]
        country: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load environment variables
    dotenv::dotenv().ok();

    let mut config = MigrationConfig::load(cli.config.as_deref())?;
    config.apply_env()?;

    let _log_guard = logging::init_logging(&config.log_dir);
    metrics::init().map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let result = match cli.command {
        Commands::Migrate {
            dry_run,
            country,
            chunk_size,
        } => {
            override_cli(&mut config, country, chunk_size);
            let source = JsonFileSourceStore::new(&config.source_dir);
            println!("🔄 Migrating '{}' into '{}'...", config.collection, config.target_table);
            run_migration(&config, &source, dry_run).await
        }
        Commands::Export {
            output_dir,
            country,
        } => {
            override_cli(&mut config, country, None);
            let settings = config.resolve()?;
            let output_dir = output_dir.unwrap_or(settings.output_dir.clone());
            let source = JsonFileSourceStore::new(&config.source_dir);
            let exporter = ExportUseCase::new(Normalizer::new(config.rules.clone()), settings.country);
            println!("📦 Exporting '{}' to {}...", settings.collection, output_dir.display());
            exporter
                .export_all(&source, &settings.collection, &output_dir)
                .await
                .map(|paths| {
                    println!("✅ Export complete");
                    println!("   Raw JSON: {}", paths.raw_path.display());
                    println!("   Normalized JSON: {}", paths.normalized_path.display());
                    println!("   CSV: {}", paths.csv_path.display());
                    println!("   Manifest: {}", paths.manifest_path.display());
                })
                .map_err(anyhow::Error::from)
        }
        Commands::Seed {
            from,
            country,
            dry_run,
        } => {
            override_cli(&mut config, country, None);
            let source = JsonFileSourceStore::single_file(&from);
            println!("🌱 Seeding '{}' from {}...", config.target_table, from.display());
            run_migration(&config, &source, dry_run).await
        }
    };

    if let Some(path) = &cli.metrics_file {
        write_metrics(path)?;
    }

    result
}

fn override_cli(config: &mut MigrationConfig, country: Option<String>, chunk_size: Option<usize>) {
    if let Some(country) = country {
        config.country = Some(country);
    }
    if let Some(chunk_size) = chunk_size {
        config.chunk_size = chunk_size;
    }
}

async fn run_migration(
    config: &MigrationConfig,
    source: &dyn SourceStore,
    dry_run: bool,
) -> anyhow::Result<()> {
    let outcome = match prepare(config) {
        Ok((settings, target)) => {
            let settings = RunSettings { dry_run, ..settings };
            let normalizer = Normalizer::new(config.rules.clone());
            let mut use_case = MigrateUseCase::new(source, &target, normalizer, settings);
            let result = use_case.run().await;
            result
        }
        Err(e) => Err(RunAborted::before_start(e)),
    };

    match outcome {
        Ok(summary) => {
            info!(%summary, "Migration finished");
            print_summary(&summary);
            Ok(())
        }
        Err(aborted) => {
            error!(state = %aborted.state, "Migration aborted: {}", aborted.source);
            println!("❌ Migration aborted while {}: {}", aborted.state, aborted.source);
            print_summary(&aborted.partial);
            Err(aborted.into())
        }
    }
}

/// Validate settings and open the target; both belong to the run's `Configuring` state.
fn prepare(config: &MigrationConfig) -> Result<(RunSettings, SqliteTargetStore), MigrationError> {
    let settings = config.resolve()?;
    let target = SqliteTargetStore::open(&config.target_db).map_err(|e| MigrationError::Database {
        message: format!("opening target store {}: {}", config.target_db.display(), e),
    })?;
    Ok((settings, target))
}

fn print_summary(summary: &RunSummary) {
    println!("\n📊 Migration results:");
    println!("   Seen: {}", summary.total_seen);
    println!(
        "   Skipped as duplicate: {} ({} already migrated, {} repeated in run)",
        summary.skipped_duplicates(),
        summary.skipped_existing,
        summary.skipped_in_run
    );
    println!("   Skipped without identity: {}", summary.skipped_unidentifiable);
    if summary.dry_run {
        println!("   Would insert: {}", summary.to_insert);
    } else {
        println!("   Inserted: {}", summary.inserted);
    }
}

fn write_metrics(path: &Path) -> anyhow::Result<()> {
    if let Some(text) = metrics::render() {
        std::fs::write(path, text)
            .with_context(|| format!("writing metrics to {}", path.display()))?;
        info!("Wrote metrics to {}", path.display());
    }
    Ok(())
}
