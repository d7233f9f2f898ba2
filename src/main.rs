//! Synthetic replay driver.
//!
//! Usage: `sensor-pipeline [config.toml|config.json]`
//!
//! Runs the synthetic scenario through the pipeline described by the config
//! (defaults if no path is given) and prints the final status as JSON.

use anyhow::Context;
use crossbeam_channel::unbounded;
use sensor_pipeline::sim::{self, Scenario, SyntheticSource};
use sensor_pipeline::{DataSource, PipelineBuilder, PipelineConfig};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,sensor_pipeline=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting sensor pipeline replay");

    let config = match std::env::args().nth(1) {
        Some(path) => PipelineConfig::load(&path)
            .with_context(|| format!("loading pipeline config from {}", path))?,
        None => PipelineConfig::default().with_all_stages(),
    };
    tracing::info!("Execution mode: {}", config.execution);

    let scenario = Scenario::default();
    let (refined_tx, refined_rx) = unbounded();
    let pipeline = PipelineBuilder::new(config.clone(), sim::stages(&scenario))
        .on_refined(move |refined| {
            let _ = refined_tx.send(Arc::clone(refined));
        })
        .build()
        .context("building pipeline")?;

    let source = Arc::new(SyntheticSource::new(
        pipeline.input_handle(),
        scenario,
        config.rng(),
    ));
    pipeline.register_data_source(Arc::clone(&source) as Arc<dyn DataSource>);
    pipeline.launch().context("launching pipeline")?;

    let poll = config.shutdown.poll_interval();
    if config.execution.is_parallel() {
        let replay = source.spawn().context("spawning synthetic source")?;
        pipeline.shutdown_when_finished(poll);
        if replay.join().is_err() {
            tracing::error!("Synthetic source thread panicked");
        }
    } else {
        source.run();
        while !pipeline.shutdown_when_finished(poll) {
            pipeline.step();
        }
    }

    let refined: Vec<_> = refined_rx.try_iter().collect();
    if let Some(last) = refined.last() {
        tracing::info!(
            "{} refined keyframes, final bias estimate {:.5} rad/s",
            refined.len(),
            last.bias
        );
    }

    let status = pipeline.status();
    println!("{}", serde_json::to_string_pretty(&status)?);

    if status.failed {
        anyhow::bail!("pipeline reported an estimation failure");
    }
    Ok(())
}
