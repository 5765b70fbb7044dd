use anyhow::Context;
use clap::Parser;
use clients::backend::{HttpTourBackend, OfflineBackend};
use clients::directions::{GoogleDirections, StraightLineDirections};
use gui_bridge::bridge::{gui_bind_address, GuiBridge};
use log::{info, warn};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use tokio::sync::mpsc;
use tourcore::interface::{DirectionsProvider, TourBackend};
use workflow::config::WorkflowConfig;
use workflow::runner::Runner;

mod clients;
mod generator;
mod gui_bridge;
mod player;
mod workflow;

/// Fetches until offline content counts as generated.
const OFFLINE_READY_AFTER: u32 = 1;
const CONTENT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Parser)]
#[command(author, version, about = "Walking tour navigation driver")]
struct Args {
    /// Run the whole tour in-process and emit a summary
    #[arg(long, default_value_t = false)]
    offline: bool,
    /// Load a workflow config from YAML
    #[arg(long)]
    workflow: Option<PathBuf>,
    /// Base URL of the tour backend
    #[arg(long)]
    backend: Option<String>,
    /// Google Directions API key (falls back to GOOGLE_MAPS_API_KEY)
    #[arg(long)]
    directions_key: Option<String>,
    /// Keep the GUI bridge alive and drive navigation from map clicks
    #[arg(long, default_value_t = false)]
    serve: bool,
    /// Reopen a saved tour instead of creating one from the workflow
    #[arg(long, value_name = "ID")]
    tour: Option<String>,
    /// List the tours stored on the backend and exit
    #[arg(long, default_value_t = false)]
    list: bool,
}

fn build_backend(args: &Args, config: &WorkflowConfig) -> Arc<dyn TourBackend> {
    match (&config.backend_url, args.offline) {
        (Some(url), false) => {
            info!("using tour backend at {}", url);
            Arc::new(HttpTourBackend::new(url))
        }
        _ => {
            info!("using in-process tour backend");
            Arc::new(OfflineBackend::new(OFFLINE_READY_AFTER))
        }
    }
}

fn build_directions(args: &Args, config: &WorkflowConfig) -> Arc<dyn DirectionsProvider> {
    match (config.resolved_directions_key(), args.offline) {
        (Some(key), false) => Arc::new(GoogleDirections::new(key)),
        (None, false) => {
            warn!("no directions key; routing with straight lines");
            Arc::new(StraightLineDirections)
        }
        _ => Arc::new(StraightLineDirections),
    }
}

fn append_report(report: &str) -> anyhow::Result<()> {
    let report_path = PathBuf::from("tools/data/offline_tour.log");
    if let Some(parent) = report_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&report_path)
        .with_context(|| format!("opening {}", report_path.display()))?;
    file.write_all(report.as_bytes())
        .context("writing offline report")?;
    Ok(())
}

async fn run(args: Args) -> anyhow::Result<()> {
    let workflow_config = if let Some(path) = &args.workflow {
        let mut config = WorkflowConfig::load(path)?;
        config.apply_overrides(args.backend.clone(), args.directions_key.clone());
        config
    } else {
        WorkflowConfig::from_args(args.backend.clone(), args.directions_key.clone())
    };

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let gui_bridge = Arc::new(GuiBridge::new(command_tx));
    let mut runner = Runner::new(
        &workflow_config.navigation,
        build_backend(&args, &workflow_config),
        build_directions(&args, &workflow_config),
    )
    .with_bridge(gui_bridge.clone());

    if args.list {
        let tours = runner.list_tours().await.context("listing tours")?;
        if tours.is_empty() {
            println!("No saved tours.");
        }
        for tour in tours {
            println!("{}\t{}\t{} stops", tour.id, tour.name, tour.waypoints.len());
        }
        return Ok(());
    }

    match &args.tour {
        Some(tour_id) => runner.open_tour(tour_id).await?,
        None => runner
            .plan(&workflow_config)
            .await
            .context("planning tour")?,
    }
    gui_bridge.publish_status("Waiting for tour content...");
    runner
        .wait_until_ready(CONTENT_TIMEOUT)
        .await
        .context("waiting for tour content")?;

    if args.offline {
        let summary = runner
            .replay_walk(
                &workflow_config.walk,
                workflow_config.follow_up_question.as_deref(),
            )
            .await
            .context("replaying walk")?;

        println!(
            "Offline tour -> arrivals {}, completed {}, completed path {}, remaining path {}",
            summary.arrivals, summary.completed, summary.completed_path, summary.remaining_path
        );
        gui_bridge.publish_status("Offline tour results ready.");
        append_report(&format!(
            "tour={} {}\n",
            runner.session().tour_id().unwrap_or_default(),
            summary
        ))?;
    }

    if args.serve {
        let _server = gui_bridge.serve(gui_bind_address());
        gui_bridge.publish_status("HTTP bridge running (Ctrl+C to stop)...");
        runner
            .run_interactive(command_rx, async {
                if let Err(err) = signal::ctrl_c().await {
                    warn!("awaiting Ctrl+C failed: {}", err);
                }
            })
            .await?;
    } else if !args.offline {
        info!("tour ready; pass --offline or --serve to walk it");
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let runtime = TokioBuilder::new_multi_thread()
        .enable_all()
        .build()
        .context("creating tokio runtime")?;
    runtime.block_on(run(args))
}
