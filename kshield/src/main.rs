use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use kshield::{
    configuration::{Configuration, SinkKind},
    ebpf_manager::{AyaProbeLoader, FillerDispatchTable, ProbeBinder},
    event_processing::{EventPipeline, PerfBufferManager, PerfMapPoller},
    policy::OpaEvaluator,
    sink::{ConsoleSink, EventSink, PolicySink},
    Args,
};
use log::{debug, info};
use tokio::signal;
use tokio::signal::unix::{signal as unix_signal, SignalKind};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    env_logger::init();

    let config = build_configuration(&args)?;
    info!("Probe image: {}", config.probe.image_path.display());

    // Bump the memlock rlimit. This is needed for older kernels that don't use the
    // new memcg based accounting, see https://lwn.net/Articles/837122/
    let rlim = libc::rlimit {
        rlim_cur: libc::RLIM_INFINITY,
        rlim_max: libc::RLIM_INFINITY,
    };
    let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) };
    if ret != 0 {
        debug!("remove limit on locked memory failed, ret is: {ret}");
    }

    let buffers = PerfBufferManager::new();
    let mut loader = AyaProbeLoader::load(
        &config.probe.image_path,
        buffers.map_capacity(),
        &config.probe.per_cpu_maps,
    )?;

    // Readers must exist before the first filler is reachable.
    let perf_array = loader.open_perf_buffer(&config.probe.perf_map)?;

    let table = FillerDispatchTable::builtin();
    let bound = ProbeBinder::new(&table, &config.probe.tail_table).bind(loader)?;
    info!(
        "Bound {} of {} fillers into {} and {} tracepoints",
        bound.fillers().len(),
        table.len(),
        bound.tail_table(),
        bound.tracepoints().len()
    );

    let sink = build_sink(&config).await?;
    let pipeline = EventPipeline::new(config.clone(), sink);

    let losses = pipeline.stats().losses().clone();
    let (sample_tx, sample_rx) = mpsc::channel(config.pipeline.signal_queue_capacity);
    let handle = pipeline.start(sample_rx);
    let poller = PerfMapPoller::new(
        perf_array,
        &config.probe.perf_map,
        buffers,
        losses,
        &config.pipeline,
    )
    .start(sample_tx)?;

    println!("kshield started, press Ctrl+C to exit");

    let mut terminate = unix_signal(SignalKind::terminate())?;
    match args.duration {
        Some(secs) => tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                info!("Tracing completed after {secs} seconds");
            }
            _ = signal::ctrl_c() => info!("Received Ctrl+C, exiting..."),
            _ = terminate.recv() => info!("Received SIGTERM, exiting..."),
        },
        None => tokio::select! {
            _ = signal::ctrl_c() => info!("Received Ctrl+C, exiting..."),
            _ = terminate.recv() => info!("Received SIGTERM, exiting..."),
        },
    }

    poller.stop().await;
    let stats = handle.join().await;
    println!(
        "decoded={} rejected={} sink_failures={} lost={}",
        stats.decoded, stats.rejected, stats.sink_failures, stats.lost
    );

    // Tables and programs are released only after the readers are gone.
    drop(bound);
    Ok(())
}

fn build_configuration(args: &Args) -> anyhow::Result<Configuration> {
    let mut builder = Configuration::builder();
    if let Some(path) = &args.config {
        builder = builder.from_config_file(path)?;
    }
    let config = builder.from_environment()?.from_args(args).build()?;
    Ok(config)
}

async fn build_sink(config: &Configuration) -> anyhow::Result<Arc<dyn EventSink>> {
    match config.output.sink {
        SinkKind::Console => {
            let sink = ConsoleSink::from_config(&config.output);
            println!("{}", sink.header());
            Ok(Arc::new(sink))
        }
        SinkKind::Policy => {
            let evaluator = OpaEvaluator::new(&config.policy)?;
            if let Some(dir) = &config.policy.policy_dir {
                evaluator
                    .load_policies(dir)
                    .await
                    .with_context(|| format!("loading policies from {}", dir.display()))?;
            }
            info!("Submitting events to {}", evaluator.decision_url());
            Ok(Arc::new(PolicySink::new(evaluator)))
        }
    }
}
