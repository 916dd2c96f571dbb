//! Scan scheduler — the background discovery/maintenance cycle.
//!
//! Each cycle optionally runs a discovery scan, then one maintenance pass,
//! then idles for the inter-scan delay. Disabling discovery only skips the
//! scan: maintenance keeps running. A settings change cuts the idle short.

use std::time::Duration;

use tokio::sync::watch;

use crate::fleet::{Fleet, WeakFleet};
use crate::ports::Transport;

/// Cadence of the background cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSettings {
    /// How long each discovery scan listens for advertisements.
    pub scan_duration: Duration,
    /// Idle time between two cycles.
    pub inter_scan_delay: Duration,
    /// Whether newly discovered dice get connection intent.
    pub auto_connect: bool,
    /// Whether cycles run a discovery scan.
    pub enabled: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            scan_duration: Duration::from_secs(5),
            inter_scan_delay: Duration::from_secs(5),
            auto_connect: false,
            enabled: false,
        }
    }
}

/// Run cycles until the fleet is shut down or dropped.
pub(crate) async fn run<T: Transport>(fleet: WeakFleet<T>, mut settings: watch::Receiver<ScanSettings>) {
    tracing::debug!("scan scheduler started");
    loop {
        let current = *settings.borrow_and_update();
        let Some(handle) = fleet.upgrade() else {
            break;
        };
        if handle.is_shut_down() {
            break;
        }
        run_cycle(&handle, current).await;
        drop(handle);

        tokio::select! {
            () = tokio::time::sleep(current.inter_scan_delay) => {}
            changed = settings.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    tracing::debug!("scan scheduler stopped");
}

async fn run_cycle<T: Transport>(fleet: &Fleet<T>, settings: ScanSettings) {
    if settings.enabled {
        match fleet
            .discover(settings.scan_duration, settings.auto_connect)
            .await
        {
            Ok(added) => tracing::debug!(added, "discovery scan complete"),
            Err(err) => tracing::warn!(%err, "discovery scan failed"),
        }
    }
    fleet.maintain().await;
}
