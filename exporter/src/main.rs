use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::Context;
use clap::{Parser, Subcommand};
use lineage_export::config::ExportConfig;
use lineage_export::debounce::Debouncer;
use lineage_export::progress::{ProgressEvent, ProgressSink};
use lineage_export::store::{FsSliceStore, SliceStore, monitor_usage};
use lineage_export::{CleanupTasks, Document, ExportOutcome, Exporter};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often the watched scene file is checked for changes
const WATCH_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Quiet period before a changed scene is re-exported
const WATCH_DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Parser)]
#[command(name = "lineage-export", version, about = "Export wide family-tree scenes to one image")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Export a scene file to a single image
    Export {
        /// Scene JSON file
        scene: PathBuf,
        /// Background color, e.g. "#f9fafb"
        #[arg(long)]
        background: Option<String>,
        /// Directory receiving the exported image
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Leading part of the exported file name
        #[arg(long)]
        title: Option<String>,
        /// Base URL of the merge service
        #[arg(long, env = "MERGE_SERVICE_URL")]
        merge_url: Option<String>,
        /// Re-export whenever the scene file changes
        #[arg(long)]
        watch: bool,
    },
    /// Report the size of a scene and whether it needs slicing
    Check {
        /// Scene JSON file
        scene: PathBuf,
    },
    /// Show local slice storage usage
    Storage {
        /// Remove all stored slices first
        #[arg(long)]
        clear: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lineage_export=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Load configuration from environment
    let mut config = ExportConfig::from_env();

    match cli.command {
        Command::Export {
            scene,
            background,
            output_dir,
            title,
            merge_url,
            watch,
        } => {
            if let Some(dir) = output_dir {
                config.output.output_dir = dir;
            }
            if let Some(title) = title {
                config.output.document_title = title;
            }
            if let Some(url) = merge_url {
                config.merge.base_url = url;
            }
            info!(
                "Loaded configuration: max_width={}, slice_width={}, merge_service={}",
                config.slicing.max_width, config.slicing.slice_width, config.merge.base_url
            );

            let exporter = Exporter::from_config(config)?;
            let mut cleanups = CleanupTasks::new();
            let mut outcome = run_export(&exporter, &scene, background.as_deref()).await?;
            cleanups.track(&mut outcome);

            if watch {
                watch_scene(&exporter, &scene, background.as_deref(), &mut cleanups).await?;
            }
            // Let deferred slice cleanups finish before exiting
            cleanups.wait_all().await;
        }
        Command::Check { scene } => {
            let document = load(&scene).await?;
            let check = Exporter::from_config(config)?.check_size(&document)?;
            println!("{}", serde_json::to_string_pretty(&check)?);
        }
        Command::Storage { clear } => {
            let store = FsSliceStore::new(config.store.store_dir.clone());
            if clear {
                store.clear_all().await?;
            }
            let report = monitor_usage(&store, config.store.max_size_mb).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

async fn load(scene: &Path) -> anyhow::Result<Document> {
    Document::load(scene)
        .await
        .with_context(|| format!("failed to load scene {:?}", scene))
}

async fn run_export(
    exporter: &Exporter,
    scene: &Path,
    background: Option<&str>,
) -> anyhow::Result<ExportOutcome> {
    let document = load(scene).await?;
    let sink: ProgressSink = Arc::new(|event: &ProgressEvent| {
        info!("[{:>3}%] {}", event.percentage, event.message);
    });

    let outcome = exporter
        .export_region(&document, background, Some(sink))
        .await?;
    info!("Export finished via {:?} path", outcome.path);
    if let Some(merge) = &outcome.merge {
        info!("Merged image {} ({})", merge.download_url, merge.file_size);
    }
    println!("{}", outcome.file.display());
    Ok(outcome)
}

/// Re-export the scene on every change until Ctrl-C
async fn watch_scene(
    exporter: &Exporter,
    scene: &Path,
    background: Option<&str>,
    cleanups: &mut CleanupTasks,
) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let debouncer = Debouncer::new(WATCH_DEBOUNCE);
    let mut last_modified = modified(scene).await;
    let mut ticker = tokio::time::interval(WATCH_POLL_INTERVAL);

    info!("Watching {:?} for changes (Ctrl-C to stop)", scene);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let current = modified(scene).await;
                if current != last_modified {
                    last_modified = current;
                    let tx = tx.clone();
                    debouncer.trigger(move || {
                        let _ = tx.send(());
                    });
                }
            }
            Some(()) = rx.recv() => {
                match run_export(exporter, scene, background).await {
                    Ok(mut outcome) => cleanups.track(&mut outcome),
                    Err(e) => error!("Export failed: {:#}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping watch");
                break;
            }
        }
    }
    Ok(())
}

async fn modified(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}
