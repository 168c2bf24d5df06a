use anyhow::Context;
use clap::Parser;
use live_watermark::config::{InstallConfig, InstallMode};
use live_watermark::document::{MemoryDocument, PageFixture};
use live_watermark::error::Error;
use live_watermark::orchestrator::Orchestrator;
use live_watermark::watermark::CompositingRenderer;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Live Watermark - watermark every image in a page and print the result
#[derive(Parser, Debug)]
#[command(name = "live-watermark")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to install configuration file
    #[arg(short, long, default_value = "install.yaml")]
    config: PathBuf,

    /// Path to page fixture (YAML or JSON)
    #[arg(short, long)]
    page: PathBuf,

    /// Force preview mode regardless of the install id
    #[arg(long)]
    preview: bool,

    /// Upper bound on how long to wait for renders to settle
    #[arg(long, default_value_t = 10_000)]
    settle_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = InstallConfig::from_file(&args.config)
        .with_context(|| format!("Failed to load configuration {}", args.config.display()))?;
    config.validate().context("Invalid configuration")?;

    live_watermark::logging::init_subscriber(&config.logging)
        .context("Failed to initialize logging subsystem")?;

    let mode = if args.preview {
        InstallMode::Preview
    } else {
        config.mode()
    };

    tracing::info!(
        config_file = %args.config.display(),
        page = %args.page.display(),
        mode = mode.as_str(),
        location = %config.options.advanced.location,
        "Configuration loaded successfully"
    );

    let page = std::fs::read_to_string(&args.page)
        .with_context(|| format!("Failed to read page fixture {}", args.page.display()))?;
    let fixture = PageFixture::from_yaml(&page)?;
    let document = Arc::new(MemoryDocument::from_fixture(&fixture));

    let renderer = CompositingRenderer::new(&config.renderer).context("Failed to create renderer")?;
    let orchestrator = Orchestrator::new(
        document.clone(),
        Arc::new(renderer),
        config.options.clone(),
        config.timing.clone(),
    );

    if !orchestrator.bootstrap(mode) {
        return Err(Error::ContainerNotFound(config.options.advanced.location.clone()).into());
    }

    if !orchestrator.wait_idle(Duration::from_millis(args.settle_ms)).await {
        tracing::warn!(
            in_flight = orchestrator.in_flight(),
            settle_ms = args.settle_ms,
            "Renders still running after settle time"
        );
    }
    orchestrator.shutdown();

    let metrics = orchestrator.metrics().snapshot();
    tracing::info!(
        started = metrics.renders_started,
        succeeded = metrics.renders_succeeded,
        failed = metrics.renders_failed,
        timed_out = metrics.renders_timed_out,
        "Watermarking finished"
    );

    let snapshot = document.snapshot();
    println!(
        "{}",
        serde_json::to_string_pretty(&snapshot).context("Failed to serialize document")?
    );

    Ok(())
}
