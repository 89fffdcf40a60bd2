use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trialscope::config::Settings;
use trialscope::db::{self, Database, TrialStore};
use trialscope::ingest::{RegistryClient, RegistryIngestion};
use trialscope::lifecycle::Lifecycle;

#[derive(Parser)]
#[command(
    name = "trialscope",
    version,
    about = "Clinical trial explorer backend with scheduled registry ingestion",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run migrations, start the ingestion scheduler, and serve HTTP traffic
    Serve,

    /// Apply pending schema migrations and exit
    Migrate,

    /// Run a single ingestion pass and exit
    Ingest,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging
    setup_tracing(&cli.log_format, cli.verbose)?;

    tracing::info!("trialscope starting");

    let settings = Settings::from_env()?;
    tracing::info!(environment = settings.environment.as_str(), "Configuration loaded");

    match cli.command {
        Commands::Serve => {
            serve(settings).await?;
        }

        Commands::Migrate => {
            migrate(settings).await?;
        }

        Commands::Ingest => {
            ingest(settings).await?;
        }
    }

    tracing::info!("trialscope completed successfully");
    Ok(())
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("trialscope=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new("trialscope=info,warn")
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

async fn serve(settings: Settings) -> Result<()> {
    let bind_address = settings.server.bind_address;
    tracing::info!(address = %bind_address, "Starting service");

    let lifecycle = Lifecycle::new(settings);
    lifecycle.run().await
}

async fn migrate(settings: Settings) -> Result<()> {
    let report = db::apply_migrations(&settings.database.url).await?;

    if report.was_noop() {
        println!("Schema already current at version {}", report.current_version);
    } else {
        println!(
            "Applied {} migration(s); schema now at version {}",
            report.applied, report.current_version
        );
    }

    Ok(())
}

async fn ingest(settings: Settings) -> Result<()> {
    // The schema must be current before writing trials; apply is a no-op
    // when it already is
    db::apply_migrations(&settings.database.url).await?;

    let database = Database::connect(&settings.database)?;
    let store = TrialStore::new(&database);
    let client = RegistryClient::new(&settings.registry)?;
    let job = RegistryIngestion::new(client, store);

    println!(
        "Ingesting studies for condition '{}'...",
        settings.registry.condition
    );
    let stats = job.run_once().await?;

    println!("Ingestion complete");
    println!("  Fetched:  {}", stats.fetched);
    println!("  Inserted: {}", stats.inserted);
    println!("  Updated:  {}", stats.updated);
    println!("  Skipped:  {}", stats.skipped);

    database.close();
    Ok(())
}
