//! Wires a 120 Hz pipeline emitting one event per tick into a 60 Hz
//! pipeline's queue, demonstrating cross-pipeline event delivery
//! end-to-end, and exits after a configurable duration.

mod pipelines;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use cadence_exec::{BeginPass, Executor, ExecutorConfig, TimeMode};
use cadence_system::PipelineTag;

use pipelines::{Emitter, FastPipeline, Receiver, SlowPipeline};

/// Runs a fast and a slow pipeline wired together for a fixed duration.
#[derive(Parser, Debug)]
#[command(name = "cadence", about = "Demo executor: a 120 Hz emitter feeding a 60 Hz receiver")]
struct Args {
    /// How long to run before requesting shutdown.
    #[arg(long, default_value_t = 1.0)]
    seconds: f64,

    /// Emit structured logs as JSON instead of the default text format.
    #[arg(long)]
    json_logs: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = ExecutorConfig::load().unwrap_or_default();
    config.log_json = config.log_json || args.json_logs;
    cadence_exec::telemetry::init(&config);

    let mut executor = Executor::new(config);

    executor.add_pipeline::<FastPipeline>(120.0, TimeMode::Free, None, 0);
    let begin_pass: BeginPass = Box::new(|| true);
    executor.add_pipeline::<SlowPipeline>(60.0, TimeMode::Bound, Some(begin_pass), 0);

    let slow_hash = cadence_exec::hash_name(SlowPipeline::NAME);
    let slow_index = executor
        .pipeline_index(slow_hash)
        .context("slow pipeline was just registered")?;

    let received = Arc::new(AtomicUsize::new(0));
    executor
        .add_system(Box::new(Emitter::new(slow_index, received.clone())), Vec::new())
        .context("registering emitter system")?;
    executor
        .add_system(Box::new(Receiver::new()), Vec::new())
        .context("registering receiver system")?;

    let shutdown = executor.shutdown_handle();
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_secs_f64(args.seconds));
        shutdown.request_shutdown();
    });

    tracing::info!(seconds = args.seconds, "demo executor starting");
    executor.run(None, false)?;
    tracing::info!(events_received = received.load(Ordering::Relaxed), "demo executor finished");

    Ok(())
}
