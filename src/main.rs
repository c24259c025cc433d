use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use disk_engine::{ApplicationBuilder, Config};

#[derive(Parser)]
#[command(name = "disk-engine")]
#[command(about = "Content-addressed storage engine maintenance")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Remove unreferenced blobs and expired chunk sets
    Reap {
        /// Run a single sweep and exit
        #[arg(long)]
        once: bool,
    },
    /// Apply database migrations
    Migrate,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing();
    let cli = Cli::parse();

    let config = Config::from_env();
    config.validate()?;
    info!("Configuration loaded and validated");

    let builder = ApplicationBuilder::new(config).with_database().await?;

    match cli.command {
        Commands::Migrate => {
            builder.run_migrations().await?;
            info!("Migrations applied");
        }
        Commands::Reap { once } => {
            let engine = builder.with_infrastructure().await?.build()?;

            if once {
                let report = engine.reaper.sweep().await;
                info!("{}", report.summary());
                for failure in &report.errors {
                    tracing::error!(error = %failure, "Reaper error");
                }
                if !report.is_success() {
                    return Err(format!("sweep finished with {} errors", report.errors.len()).into());
                }
            } else {
                tokio::select! {
                    _ = engine.reaper.clone().run() => {}
                    _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
                }
            }
        }
    }

    Ok(())
}
