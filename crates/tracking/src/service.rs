use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use model::event::TrackingEvent;
use model::fix::LocationFix;
use model::sector::Sector;
use model::tracking::{SectorHistoryEntry, TrackingState};
use model::violation::ViolationReport;
use recorder::ViolationSink;
use routing::client::DirectionsApi;
use routing::provider::RouteProvider;
use tokio::sync::{broadcast, mpsc, RwLock};

use crate::catalog::SectorCatalog;
use crate::continuity::{ContinuityBridge, SnapshotError, SnapshotStore};
use crate::monitor::SectorMonitor;
use crate::settings::TrackingSettings;
use crate::warnings::EarlyWarningWatcher;

const FIX_QUEUE_CAPACITY: usize = 32;
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Runs the tracking reducer as a supervised background task.
///
/// Fixes arrive through an mpsc queue and are processed strictly in arrival
/// order; events fan out through a broadcast channel. A panic inside one
/// fix's processing is caught and logged, the next fix is handled with the
/// monitor state intact. Dropping the service (and every cloned fix sender)
/// halts delivery; in-flight route or recorder calls finish on their own.
pub struct TrackingService {
    fix_tx: mpsc::Sender<LocationFix>,
    event_tx: broadcast::Sender<TrackingEvent>,
    monitor: Arc<RwLock<SectorMonitor>>,
    catalog: Arc<RwLock<SectorCatalog>>,
}

impl TrackingService {
    /// Starts the reducer loop and a background task that resolves routes
    /// for all active sectors. Fix processing never waits for resolution;
    /// sectors keep their straight-line fallback until a polyline lands.
    pub fn start<A, R>(
        catalog: SectorCatalog,
        settings: TrackingSettings,
        provider: Arc<RouteProvider<A>>,
        sink: Arc<R>,
        device_id: String,
    ) -> Self
    where
        A: DirectionsApi + 'static,
        R: ViolationSink + 'static,
    {
        let (fix_tx, mut fix_rx) = mpsc::channel::<LocationFix>(FIX_QUEUE_CAPACITY);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let catalog = Arc::new(RwLock::new(catalog));
        let monitor = Arc::new(RwLock::new(SectorMonitor::new()));

        {
            let catalog = catalog.clone();
            tokio::spawn(async move {
                resolve_routes(provider, catalog).await;
            });
        }

        // reducer loop
        {
            let monitor = monitor.clone();
            let catalog = catalog.clone();
            let event_tx = event_tx.clone();
            tokio::spawn(async move {
                let mut watcher = EarlyWarningWatcher::new();
                while let Some(fix) = fix_rx.recv().await {
                    let step = handle_fix(
                        &monitor,
                        &catalog,
                        &settings,
                        &mut watcher,
                        &sink,
                        &device_id,
                        fix,
                    );
                    match AssertUnwindSafe(step).catch_unwind().await {
                        Ok(events) => {
                            for event in events {
                                // no receivers is fine
                                let _ = event_tx.send(event);
                            }
                        }
                        Err(why) => {
                            log::error!("fix processing paniced: {:?}", why);
                        }
                    }
                }
                log::info!("fix stream closed, tracking stopped");
            });
        }

        Self {
            fix_tx,
            event_tx,
            monitor,
            catalog,
        }
    }

    /// Handle for the location collaborator to push fixes through.
    pub fn fix_sender(&self) -> mpsc::Sender<LocationFix> {
        self.fix_tx.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackingEvent> {
        self.event_tx.subscribe()
    }

    /// Cloned snapshot of the tracking state.
    pub async fn state(&self) -> TrackingState {
        self.monitor.read().await.state()
    }

    pub async fn history(&self) -> Vec<SectorHistoryEntry> {
        self.monitor.read().await.history().to_vec()
    }

    /// Cloned view of the catalog, routes included once resolved.
    pub async fn sectors(&self) -> Vec<Sector> {
        self.catalog.read().await.sectors().to_vec()
    }

    /// Persists the current state through the continuity bridge. Called when
    /// the host process may be about to suspend.
    pub async fn persist_to<S: SnapshotStore>(
        &self,
        bridge: &ContinuityBridge<S>,
        now_ms: i64,
    ) -> Result<(), SnapshotError> {
        let monitor = self.monitor.read().await;
        bridge.persist(&monitor, now_ms).await
    }

    /// Reconciles the in-memory state with the persisted snapshot. Called
    /// when the host process resumes.
    pub async fn restore_from<S: SnapshotStore>(
        &self,
        bridge: &ContinuityBridge<S>,
    ) -> Result<bool, SnapshotError> {
        let mut monitor = self.monitor.write().await;
        let catalog = self.catalog.read().await;
        bridge.restore_into(&mut monitor, &catalog).await
    }
}

async fn resolve_routes<A: DirectionsApi>(
    provider: Arc<RouteProvider<A>>,
    catalog: Arc<RwLock<SectorCatalog>>,
) {
    let sectors: Vec<Sector> = catalog
        .read()
        .await
        .sectors()
        .iter()
        .filter(|sector| sector.active)
        .cloned()
        .collect();

    for sector in sectors {
        match provider.resolve_route(&sector).await {
            Some(polyline) => {
                if catalog.write().await.attach_route(&sector.id, polyline) {
                    log::info!("attached resolved route for sector '{}'", sector.id);
                }
            }
            None => {
                log::warn!(
                    "no route resolved for sector '{}', keeping the straight line",
                    sector.id
                );
            }
        }
    }
}

async fn handle_fix<R: ViolationSink + 'static>(
    monitor: &RwLock<SectorMonitor>,
    catalog: &RwLock<SectorCatalog>,
    settings: &TrackingSettings,
    watcher: &mut EarlyWarningWatcher,
    sink: &Arc<R>,
    device_id: &str,
    fix: LocationFix,
) -> Vec<TrackingEvent> {
    let catalog = catalog.read().await;
    let mut monitor = monitor.write().await;

    let mut events = monitor.process_fix(&catalog, settings, &fix);

    // approach warnings only matter while outside every sector
    if !monitor.state().is_in_sector() {
        events.extend(watcher.process(&catalog, settings, &fix));
    }

    // hand completed sessions to the recorder without blocking the exit
    for event in &events {
        if let TrackingEvent::SectorExited { .. } = event {
            if let Some(entry) = monitor.history().first() {
                let report = ViolationReport::from_history(
                    entry,
                    fix.latitude,
                    fix.longitude,
                    device_id,
                );
                let sink = sink.clone();
                tokio::spawn(async move {
                    sink.record(report).await;
                });
            }
        }
    }

    events
}
