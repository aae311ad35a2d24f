use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use collection::{collector::DataCollectionModule, tracker::ActivityTracker};
use processing::{daily_aggregator::DailyAggregator, ProcessingModule};
use shutdown::ReloadSource;
use storage::{entities::ActivityEntry, log_store::CsvLogStore};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    config::{ConfigOverrides, TrackerConfig},
    utils::{
        clock::{Clock, DefaultClock},
        dir::activity_dir,
    },
    window_api::{FocusSampler, GenericFocusSampler},
};

pub mod collection;
pub mod processing;
pub mod shutdown;
pub mod storage;

const ENTRY_CHANNEL_CAPACITY: usize = 10;

/// Everything the daemon needs to start.
pub struct DaemonOptions {
    pub app_dir: PathBuf,
    pub config_path: PathBuf,
    pub overrides: ConfigOverrides,
    pub config: TrackerConfig,
}

/// Represents the starting point for the daemon. Runs until Ctrl-C.
pub async fn start_daemon(options: DaemonOptions) -> Result<()> {
    let DaemonOptions {
        app_dir,
        config_path,
        overrides,
        config,
    } = options;
    info!("Starting with {config:?}");

    let (sender, receiver) = mpsc::channel::<ActivityEntry>(ENTRY_CHANNEL_CAPACITY);
    let (interval_sender, interval_receiver) = watch::channel(config.poll_interval());
    let sampler = GenericFocusSampler::new()?;

    let shutdown_token = CancellationToken::new();

    let collector = create_collector(
        sender,
        sampler,
        &config,
        &shutdown_token,
        interval_receiver,
        DefaultClock,
    );

    let processor = create_processor(activity_dir(&app_dir), receiver)?;
    let finalized = processor.subscribe();

    let reload_source = ReloadSource {
        config_path,
        overrides,
    };

    let (_, _, collection_result, processing_result, _) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token.clone()),
        shutdown::reload_on_hangup(reload_source, interval_sender, shutdown_token.clone()),
        async {
            // Signal listeners run until cancelation.
            let result = collector.run().await;
            shutdown_token.cancel();
            result
        },
        processor.run(),
        report_finalized(finalized),
    );

    if let Err(collection_result) = collection_result {
        error!("Collection module got an error {:?}", collection_result);
    }

    if let Err(processing_result) = processing_result {
        error!("Processing module got an error {:?}", processing_result);
    }

    Ok(())
}

fn create_collector(
    sender: mpsc::Sender<ActivityEntry>,
    sampler: impl FocusSampler + 'static,
    config: &TrackerConfig,
    shutdown_token: &CancellationToken,
    poll_interval: watch::Receiver<Duration>,
    clock: impl Clock,
) -> DataCollectionModule {
    DataCollectionModule::new(
        sender,
        Box::new(sampler),
        ActivityTracker::new(config.tracker_settings(), clock.now()),
        shutdown_token.clone(),
        poll_interval,
        Box::new(clock),
    )
    .with_finalize_on_stop(config.finalize_on_stop)
}

fn create_processor(
    activity_dir: PathBuf,
    receiver: mpsc::Receiver<ActivityEntry>,
) -> Result<ProcessingModule<DailyAggregator<CsvLogStore>>> {
    let store = CsvLogStore::new(activity_dir)?;
    Ok(ProcessingModule::new(receiver, DailyAggregator::new(store)))
}

/// Logs every finalized entry until processing stops.
async fn report_finalized(mut finalized: broadcast::Receiver<ActivityEntry>) {
    loop {
        match finalized.recv().await {
            Ok(entry) => info!(
                "{} | {} for {}s",
                entry.app_name,
                entry.window_title,
                entry.duration().map(|v| v.num_seconds()).unwrap_or_default()
            ),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                error!("Missed {skipped} finalized entries")
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}
