use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use nvsflash_core::{generate, parse_csv, parse_size, read_partition, DirFiles, GenerateOptions, Version};
use nvsflash_web::routes::assets::check_manifest;
use nvsflash_web::{create_router, ServerState, Settings};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "nvsflash")]
#[command(about = "ESP32 NVS partition generator and browser flashing server", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Configuration file path
        #[arg(short, long, env = "NVSFLASH_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Build a partition image from a CSV file
    Generate {
        /// Input CSV (`key,type,encoding,value`)
        input: PathBuf,
        /// Output image
        output: PathBuf,
        /// Partition size, decimal or 0x hex
        size: String,
        /// NVS format version
        #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(1..=2))]
        version: u8,
    },
    /// Decode and verify a partition image
    Inspect {
        /// Partition image
        partition: PathBuf,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,nvsflash_web=debug,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { config } => serve(config.as_deref()).await,
        Commands::Generate {
            input,
            output,
            size,
            version,
        } => generate_file(&input, &output, &size, version),
        Commands::Inspect { partition, json } => inspect(&partition, json),
    }
}

async fn serve(config: Option<&Path>) -> anyhow::Result<()> {
    let settings = Settings::load(config)?;
    settings.validate()?;

    tracing::info!("nvsflash server starting...");

    let static_dir = settings.assets.static_dir.clone();
    if !static_dir.is_dir() {
        tracing::warn!("Static directory {} does not exist", static_dir.display());
    }
    match check_manifest(&static_dir) {
        Ok(report) if report.valid => {
            tracing::info!(
                "Manifest: {} {} ({} builds)",
                report.manifest.name,
                report.manifest.version,
                report.manifest.builds.len()
            );
        }
        Ok(report) => {
            for issue in &report.issues {
                tracing::warn!("Manifest: {}", issue);
            }
            for part in &report.missing_parts {
                tracing::warn!("Manifest part {} is missing from {}", part, static_dir.display());
            }
        }
        Err(e) => tracing::warn!("Manifest unavailable: {}", e),
    }

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let app = create_router(ServerState::new(settings)).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("🚀 nvsflash ready!");
    tracing::info!("   Flashing page: http://{}/", addr);
    tracing::info!("   Manifest:      http://{}/static/manifest.json", addr);
    tracing::info!("   API:           http://{}/api/info", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C, shutting down..."),
        Err(e) => tracing::error!("Failed to listen for Ctrl+C: {}", e),
    }
}

fn generate_file(input: &Path, output: &Path, size: &str, version: u8) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let rows = parse_csv(&text)?;

    let Some(version) = Version::from_number(version) else {
        bail!("unsupported NVS version {version}");
    };
    let options = GenerateOptions {
        size: parse_size(size)?,
        version,
    };

    // `file` rows are relative to the CSV.
    let base = input.parent().unwrap_or_else(|| Path::new("."));
    let image = generate(&rows, &options, &DirFiles::unconfined(base))?;

    std::fs::write(output, &image)
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!("Created NVS binary partition: {}", output.display());
    Ok(())
}

fn inspect(path: &Path, json: bool) -> anyhow::Result<()> {
    let image =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let partition = read_partition(&image)?;

    if json {
        let pages: Vec<serde_json::Value> = partition
            .pages
            .iter()
            .map(|page| {
                serde_json::json!({
                    "index": page.index,
                    "state": format!("{:?}", page.state),
                    "seq": page.seq,
                    "version": page.version.map(|v| v.number()),
                    "used_entries": page.used_entries,
                })
            })
            .collect();
        let doc = serde_json::json!({ "pages": pages, "items": partition.items });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!("{} ({} bytes)", path.display(), image.len());
    for page in &partition.pages {
        match (page.seq, page.version) {
            (Some(seq), Some(version)) => println!(
                "page {:>3}  {:<14} seq {:<4} {}  {} entries",
                page.index,
                format!("{:?}", page.state),
                seq,
                version,
                page.used_entries
            ),
            _ => println!("page {:>3}  {:?}", page.index, page.state),
        }
    }
    for item in &partition.items {
        println!(
            "{:<16} {:<16} {:<7} {}",
            item.namespace,
            item.key,
            item.value.type_name(),
            item.value
        );
    }
    Ok(())
}
