use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;

use logistics_etl::config::{DatabaseConfig, EtlConfig};
use logistics_etl::observability::{self, metrics};
use logistics_etl::pipeline::generation::DefectRates;
use logistics_etl::pipeline::storage::{SqliteStore, Table, WarehouseStore};
use logistics_etl::{Pipeline, RunSummary};

#[derive(Parser)]
#[command(name = "logistics-etl")]
#[command(about = "Generate messy shipment data, clean it, and load a star-schema warehouse")]
#[command(version)]
struct Cli {
    /// TOML configuration file (defaults to ./etl.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: generate, transform, load
    Run {
        /// Number of rows to generate
        #[arg(long)]
        rows: Option<usize>,
        /// Seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,
        /// SQLite warehouse file (or :memory:)
        #[arg(long)]
        database: Option<PathBuf>,
        /// Disable defect injection
        #[arg(long)]
        clean: bool,
        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show row counts and the content fingerprint of an existing warehouse
    Inspect {
        #[arg(long)]
        database: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut config = EtlConfig::load(cli.config.as_deref()).context("loading configuration")?;
    let _guard = observability::init_logging(&config.logging);
    metrics::describe_all();

    match cli.command {
        Commands::Run {
            rows,
            seed,
            database,
            clean,
            json,
        } => {
            if let Some(rows) = rows {
                config.generator.rows = rows;
            }
            if seed.is_some() {
                config.generator.seed = seed;
            }
            if let Some(path) = database {
                config.database.path = path;
            }
            if clean {
                config.generator.defects = DefectRates::none();
            }
            config.validate().context("invalid configuration")?;

            let mut store = SqliteStore::open(&config.database).context("opening warehouse")?;
            let summary = match Pipeline::run(&config, &mut store) {
                Ok(summary) => summary,
                Err(e) => {
                    error!("ETL run failed: {}", e);
                    if let Some(committed) = e.committed_rows() {
                        eprintln!("❌ Run aborted after {committed} rows were committed");
                    }
                    return Err(e).context("ETL run failed");
                }
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }
        }
        Commands::Inspect { database } => {
            let db = DatabaseConfig {
                path: database.unwrap_or(config.database.path),
                ..config.database
            };
            db.validate()?;
            let mut store = SqliteStore::open(&db).context("opening warehouse")?;
            store.ensure_schema()?;
            println!("📊 Warehouse {}", db.path.display());
            for table in Table::LOAD_ORDER {
                println!("   {:<16} {:>8}", table.name(), store.row_count(table)?);
            }
            println!("   fingerprint      {}", store.fingerprint()?);
        }
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    let report = &summary.transform;
    println!("\n📊 ETL run {} (seed {})", summary.run_id, summary.seed);
    println!("   Generated: {} ({} injected defects)", summary.generated, summary.injected_defects);
    println!("   Accepted:  {}", report.accepted);
    println!("   Rejected:  {}", report.rejected);
    for (reason, count) in &report.rejections_by_reason {
        println!("     - {:<18} {}", reason.as_str(), count);
    }
    println!(
        "   Imputed:   {} ship dates, {} locations, {} costs",
        report.imputed_ship_dates, report.imputed_locations, report.imputed_costs
    );
    println!(
        "   Corrected: {} negative costs, {} carrier names, {} statuses recoded",
        report.corrected_costs, report.normalized_carriers, report.recoded_statuses
    );
    println!("   Loaded:");
    for table in Table::LOAD_ORDER {
        println!("     - {:<16} {}", table.name(), summary.load.rows(table));
    }
    println!("   Fingerprint: {}", summary.fingerprint);
    println!("   Duration:    {} ms", summary.duration_ms);
}
