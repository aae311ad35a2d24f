use std::{path::PathBuf, time::Duration};

use tokio::{select, sync::watch};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::{ConfigOverrides, TrackerConfig};

/// Cancels `cancelation` on Ctrl-C, or SIGTERM on unix. Returns early if something else cancels
/// first.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Can't listen for SIGTERM {e:?}");
                std::future::pending::<()>().await
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, shutting down");
            cancelation.cancel();
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
            cancelation.cancel();
        },
        _ = cancelation.cancelled() => {},
    };
}

/// Where a reload reads configuration from.
pub struct ReloadSource {
    pub config_path: PathBuf,
    pub overrides: ConfigOverrides,
}

impl ReloadSource {
    fn load(&self) -> anyhow::Result<TrackerConfig> {
        TrackerConfig::load(Some(&self.config_path), &self.overrides)
    }
}

/// Re-reads the configuration on SIGHUP and publishes the poll interval. Other settings take
/// effect on restart. Only unix has SIGHUP, elsewhere this just waits for cancelation.
pub async fn reload_on_hangup(
    source: ReloadSource,
    poll_interval: watch::Sender<Duration>,
    cancelation: CancellationToken,
) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(v) => v,
            Err(e) => {
                error!("Can't listen for SIGHUP, configuration won't be reloaded {e:?}");
                cancelation.cancelled().await;
                return;
            }
        };

        loop {
            select! {
                _ = cancelation.cancelled() => return,
                _ = hangup.recv() => reload(&source, &poll_interval),
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = (source, poll_interval);
        cancelation.cancelled().await;
    }
}

/// Loads the configuration again and sends the poll interval if it changed. A broken file keeps
/// the current values.
pub fn reload(source: &ReloadSource, poll_interval: &watch::Sender<Duration>) {
    info!("Reloading configuration from {:?}", source.config_path);
    match source.load() {
        Ok(config) => {
            let interval = config.poll_interval();
            poll_interval.send_if_modified(|current| {
                let changed = *current != interval;
                *current = interval;
                changed
            });
        }
        Err(e) => error!("Keeping current configuration, reload failed {e:?}"),
    }
}
