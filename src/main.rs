//! vcgraph - demo entry point
//!
//! Builds the pipeline described by a config file (or the default
//! camera -> encoder -> capture pipeline) on the reference engine, runs it
//! until every capture port reports end of stream, and tears it down.
//!
//! Usage: `vcgraph [config.toml|config.json]`

use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vcgraph::{
    config::{self, PipelineConfig, PortAddress},
    engine::MockEngine,
    pipeline::{CaptureHandler, FileCaptureHandler, InMemoryHandler},
};

fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(config::default_config_path);

    let config = match &config_path {
        Some(path) if path.exists() => PipelineConfig::load(path)
            .with_context(|| format!("Loading {}", path.display()))?,
        _ => PipelineConfig::default(),
    };

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match &config_path {
        Some(path) if path.exists() => tracing::info!("Using config {}", path.display()),
        _ => tracing::info!("Using built-in default pipeline"),
    }

    let engine = Arc::new(MockEngine::new().with_eos_after(config.run.frames));
    let mut pipeline = config.build(engine).context("Building pipeline")?;
    pipeline.start().context("Enabling pipeline")?;

    let mut in_memory = Vec::new();
    for capture in &config.captures {
        let address = PortAddress::parse(&capture.port)?;
        let port = config::resolve_port(&pipeline, &address)?;
        let handler: Box<dyn CaptureHandler> = match &capture.path {
            Some(path) => Box::new(FileCaptureHandler::create(path)?),
            None => {
                let handler = InMemoryHandler::new();
                in_memory.push((address.to_string(), handler.stats()));
                Box::new(handler)
            }
        };
        pipeline
            .start_capture(port, handler)
            .with_context(|| format!("Capturing from {}", address))?;
    }

    for component in pipeline.components() {
        component.print_summary();
    }

    let mut idle = 0;
    let mut total = 0;
    while !pipeline.all_captures_finished() {
        let handled = pipeline.dispatch_pending()?;
        total += handled;
        if handled == 0 {
            idle += 1;
            if idle >= config.run.max_idle_polls {
                tracing::warn!("No buffers for {} polls, stopping", idle);
                break;
            }
        } else {
            idle = 0;
        }
    }
    tracing::info!("Handled {} buffers", total);

    for (port, stats) in &in_memory {
        let stats = stats.lock();
        tracing::info!(
            "{}: {} frames, {} bytes, {} keyframes",
            port,
            stats.frames,
            stats.bytes,
            stats.keyframes
        );
    }

    tracing::info!("Shutting down...");
    pipeline.shutdown().context("Tearing down pipeline")?;
    Ok(())
}
