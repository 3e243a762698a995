//! Albor Space 5G GNodeB DL-SCH Slot Driver
//!
//! Drives the PDSCH transport block pipeline slot by slot: one random
//! transport block per slot is encoded and mapped into a resource grid, and
//! the completion latency is reported.

mod config;

use anyhow::{bail, Result};
use bytes::Bytes;
use clap::Parser;
use config::{DlschConfig, ExecutorConfig, ExecutorKind};
use interfaces::{InlineExecutor, TaskExecutor, TokioExecutor, WorkerPoolConfig, WorkerPoolExecutor};
use layers::phy::pdsch::helpers::compute_nof_data_re;
use layers::phy::pdsch::PdschSegmentation;
use layers::phy::{
    DefaultResourceGridMapper, PdschProcessor, PdschProcessorFactory, PdschProcessorNotifier, ResourceGrid,
    SharedTransportBlock,
};
use layers::LayerError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Albor Space 5G GNodeB DL-SCH driver
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML, TOML or JSON)
    #[arg(short, long)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Number of slots to process, overrides the configuration
    #[arg(long)]
    slots: Option<u32>,

    /// Number of executor threads, overrides the configuration
    #[arg(long)]
    threads: Option<usize>,
}

/// Forwards PDSCH completions to the slot loop
struct ChannelNotifier {
    sender: mpsc::UnboundedSender<Instant>,
}

impl PdschProcessorNotifier for ChannelNotifier {
    fn on_finish_processing(&self) {
        if self.sender.send(Instant::now()).is_err() {
            warn!("Slot loop is gone, dropping PDSCH completion");
        }
    }
}

/// Latency statistics over the processed slots
#[derive(Debug, Default)]
struct LatencyStats {
    count: u32,
    total: Duration,
    min: Option<Duration>,
    max: Duration,
}

impl LatencyStats {
    fn add(&mut self, latency: Duration) {
        self.count += 1;
        self.total += latency;
        self.min = Some(self.min.map_or(latency, |min| min.min(latency)));
        self.max = self.max.max(latency);
    }

    fn average(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.total / self.count
        }
    }
}

fn build_executor(config: &ExecutorConfig) -> Result<Arc<dyn TaskExecutor>, LayerError> {
    let executor: Arc<dyn TaskExecutor> = match config.kind {
        ExecutorKind::WorkerPool => Arc::new(WorkerPoolExecutor::new(WorkerPoolConfig {
            name: "pdsch".to_string(),
            nof_threads: config.nof_threads,
            queue_size: config.queue_size,
        })?),
        ExecutorKind::Tokio => {
            if config.queue_size == 0 {
                return Err(LayerError::InvalidConfiguration(
                    "Tokio executor needs a non-zero in-flight limit".to_string(),
                ));
            }
            Arc::new(TokioExecutor::current(config.queue_size))
        }
        ExecutorKind::Inline => Arc::new(InlineExecutor),
    };
    Ok(executor)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Starting Albor Space 5G GNodeB DL-SCH driver");

    let mut config = match &args.config {
        Some(path) => {
            info!("Configuration file: {}", path);
            DlschConfig::from_file(path)?
        }
        None => {
            info!("No configuration file, using defaults");
            DlschConfig::default()
        }
    };
    if let Some(slots) = args.slots {
        config.run.slots = slots;
    }
    if let Some(threads) = args.threads {
        config.executor.nof_threads = threads;
    }

    let tbs_bytes = config.pdsch.tbs_bytes;
    if tbs_bytes == 0 {
        bail!("Transport block size must be non-zero");
    }

    let executor = build_executor(&config.executor)?;
    let factory = PdschProcessorFactory::new(
        config.processor.cb_pool_capacity,
        executor,
        Arc::new(DefaultResourceGridMapper::new()),
    )?;
    let validator = factory.create_validator();
    let mut processor = factory.create_concurrent();

    let first_pdu = config.pdsch_pdu(0)?;
    validator.is_valid(&first_pdu)?;
    let codeword = first_pdu.codewords[0];
    let segmentation = PdschSegmentation::derive(
        tbs_bytes * 8,
        first_pdu.ldpc_base_graph,
        codeword.modulation,
        codeword.rv,
        first_pdu.tbs_lbrm_bytes,
        compute_nof_data_re(&first_pdu),
        first_pdu.nof_layers(),
    );

    info!("Cell configuration:");
    info!("  PCI: {}", config.cell.pci);
    info!("  BWP: {} RBs from RB {}", config.cell.bwp_size_rb, config.cell.bwp_start_rb);
    info!("  Ports: {}", config.cell.nof_ports);
    info!("PDSCH configuration:");
    info!("  Modulation: {:?}, layers: {}", codeword.modulation, first_pdu.nof_layers());
    info!("  TBS: {} bytes in {} codeblocks", tbs_bytes, segmentation.nof_codeblocks());
    info!(
        "  Executor: {:?} with {} threads",
        config.executor.kind, config.executor.nof_threads
    );

    let grid = Arc::new(ResourceGrid::new(
        config.cell.nof_ports,
        config.cell.bwp_start_rb + config.cell.bwp_size_rb,
    ));
    let (sender, mut receiver) = mpsc::unbounded_channel();
    let notifier = Arc::new(ChannelNotifier { sender });
    let mut rng = StdRng::seed_from_u64(config.run.seed);
    let mut stats = LatencyStats::default();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    for slot in 0..config.run.slots {
        let pdu = config.pdsch_pdu(slot % 10)?;
        let data: Bytes = (0..tbs_bytes).map(|_| rng.gen::<u8>()).collect::<Vec<u8>>().into();
        grid.clear();

        let start = Instant::now();
        processor.process(grid.clone(), notifier.clone(), vec![SharedTransportBlock::new(data)], &pdu);

        let mut interrupted = false;
        let mut finished = tokio::select! {
            finished = receiver.recv() => finished,
            _ = &mut ctrl_c => {
                info!("Received shutdown signal");
                interrupted = true;
                None
            }
        };
        if interrupted {
            // Let the transmission in flight complete
            finished = receiver.recv().await;
        }
        let Some(finished) = finished else {
            bail!("Notifier channel closed");
        };

        let latency = finished.duration_since(start);
        stats.add(latency);
        debug!("Slot {}: {} us", slot, latency.as_micros());

        if interrupted {
            break;
        }
    }

    info!("Processed {} slots", stats.count);
    info!(
        "  Latency min/avg/max: {}/{}/{} us",
        stats.min.unwrap_or_default().as_micros(),
        stats.average().as_micros(),
        stats.max.as_micros()
    );
    info!("  Codeblocks per TB: {}", segmentation.nof_codeblocks());

    info!("GNodeB DL-SCH driver shutdown complete");
    Ok(())
}
