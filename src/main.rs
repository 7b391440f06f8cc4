mod cli;

use nvframes::{
    config,
    orchestrator::{FleetOrchestrator, ProcessRunner},
    worker,
};
use nvframes_av::devices;
use nvframes_common::paths::read_video_list;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, RunArgs};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn env_filter(verbose: bool) -> EnvFilter {
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let directives = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if verbose {
            "nvframes=debug,nvframes_pipeline=debug,nvframes_av=debug".to_string()
        } else {
            "info".to_string()
        }
    });
    EnvFilter::new(directives)
}

async fn run_videos(args: RunArgs, config_path: Option<&std::path::Path>) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;
    args.apply(&mut config)?;
    config::validate_config(&config)?;

    let videos = read_video_list(&args.video_list)
        .with_context(|| format!("Failed to read video list: {:?}", args.video_list))?;

    let available = devices::device_count(config.devices.count)
        .context("Failed to detect devices (use --device-count to override)")?;
    let selected = config.devices.selection.resolve(available)?;

    // Fail before scheduling anything if the compressor cannot be loaded.
    let factory = nvframes_av::open_compressor(
        config.pipeline.compressor,
        config.pipeline.quality,
        config.paths.turbojpeg_path.as_deref(),
    )
    .context("Failed to set up JPEG compressor")?;
    tracing::info!("Using {} JPEG compressor", factory.name());
    drop(factory);

    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("Failed to create output directory: {:?}", args.output_dir))?;

    let exe = std::env::current_exe().context("Failed to locate the nvframes executable")?;
    let orchestrator = FleetOrchestrator::new(selected, config.run.log_dir.clone())?;
    let runner = Arc::new(ProcessRunner::new(exe, args.output_dir.clone(), config));

    let summary = orchestrator.run(videos, runner).await?;
    println!(
        "Processed {} videos: {} succeeded, {} failed",
        summary.total, summary.succeeded, summary.failed
    );
    Ok(())
}

fn list_devices() -> Result<()> {
    let devices = devices::list_devices()?;
    if devices.is_empty() {
        println!("No accelerator devices found.");
    }
    for device in devices {
        println!("{}: {}", device.index, device.name);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Workers install their own subscriber writing to the per-video log.
    if let Commands::Worker { job } = &cli.command {
        let code = worker::main(job, env_filter(cli.verbose))?;
        std::process::exit(code);
    }

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(cli.verbose))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_videos(args, cli.config.as_deref()))
        }
        Commands::Devices => list_devices(),
        Commands::Worker { .. } => Ok(()),
    }
}
