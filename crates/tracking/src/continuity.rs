use std::error;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use model::tracking::TrackingSnapshot;
use tokio::sync::RwLock;

use crate::catalog::SectorCatalog;
use crate::monitor::SectorMonitor;

#[derive(Debug, Clone)]
pub enum SnapshotError {
    Io(Arc<std::io::Error>),
    Json(Arc<serde_json::Error>),
}

impl error::Error for SnapshotError {}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SnapshotError::Io(e) => write!(f, "snapshot store error: {}", e),
            SnapshotError::Json(e) => write!(f, "snapshot encoding error: {}", e),
        }
    }
}

impl From<std::io::Error> for SnapshotError {
    fn from(e: std::io::Error) -> Self {
        SnapshotError::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for SnapshotError {
    fn from(e: serde_json::Error) -> Self {
        SnapshotError::Json(Arc::new(e))
    }
}

/// Where continuity snapshots live between process suspensions.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save(&self, snapshot: &TrackingSnapshot) -> Result<(), SnapshotError>;
    async fn load(&self) -> Result<Option<TrackingSnapshot>, SnapshotError>;
    async fn clear(&self) -> Result<(), SnapshotError>;
}

/// JSON file on disk, like collector state between runs.
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn save(&self, snapshot: &TrackingSnapshot) -> Result<(), SnapshotError> {
        let encoded = serde_json::to_vec_pretty(snapshot)?;
        tokio::fs::write(&self.path, encoded).await?;
        Ok(())
    }

    async fn load(&self) -> Result<Option<TrackingSnapshot>, SnapshotError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(why) if why.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(why) => Err(why.into()),
        }
    }

    async fn clear(&self) -> Result<(), SnapshotError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(why) if why.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(why) => Err(why.into()),
        }
    }
}

/// In-memory store for tests and hosts that manage persistence themselves.
pub struct MemorySnapshotStore {
    inner: RwLock<Option<TrackingSnapshot>>,
}

impl Default for MemorySnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save(&self, snapshot: &TrackingSnapshot) -> Result<(), SnapshotError> {
        *self.inner.write().await = Some(snapshot.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<TrackingSnapshot>, SnapshotError> {
        Ok(self.inner.read().await.clone())
    }

    async fn clear(&self) -> Result<(), SnapshotError> {
        *self.inner.write().await = None;
        Ok(())
    }
}

/// Persists and restores the monitor's essential state across process
/// suspension. Called at context-switch boundaries, not continuously; the
/// two execution contexts reconcile opportunistically through the store.
pub struct ContinuityBridge<S: SnapshotStore> {
    store: S,
}

impl<S: SnapshotStore> ContinuityBridge<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn persist(
        &self,
        monitor: &SectorMonitor,
        now_ms: i64,
    ) -> Result<(), SnapshotError> {
        self.store.save(&monitor.snapshot(now_ms)).await
    }

    /// Applies the persisted snapshot to the monitor. With nothing persisted
    /// an in-memory session is cleared: the other context exited the sector
    /// while this one was suspended. Returns whether a snapshot was found.
    pub async fn restore_into(
        &self,
        monitor: &mut SectorMonitor,
        catalog: &SectorCatalog,
    ) -> Result<bool, SnapshotError> {
        match self.store.load().await? {
            Some(snapshot) => {
                monitor.restore(&snapshot, catalog);
                Ok(true)
            }
            None => {
                monitor.restore(&TrackingSnapshot::default(), catalog);
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::fix::LocationFix;
    use model::sector::{Sector, SectorEndpoint};
    use utility::id::Id;

    use crate::settings::TrackingSettings;

    fn catalog() -> SectorCatalog {
        SectorCatalog::new(vec![Sector {
            id: Id::new("a7-nord".to_owned()),
            name: "A7 Nord".to_owned(),
            speed_limit_kmh: 100.0,
            start: SectorEndpoint::new(54.0, 10.0),
            end: SectorEndpoint::new(54.017986, 10.0),
            active: true,
            route: None,
        }])
    }

    fn monitor_in_sector(catalog: &SectorCatalog) -> SectorMonitor {
        let mut monitor = SectorMonitor::new();
        let settings = TrackingSettings::default();
        monitor.process_fix(catalog, &settings, &LocationFix::new(54.0, 10.0, 95.0, 1_000));
        monitor.process_fix(catalog, &settings, &LocationFix::new(54.0, 10.0, 95.0, 1_600));
        assert!(monitor.state().is_in_sector());
        monitor
    }

    #[tokio::test]
    async fn memory_round_trip() {
        let catalog = catalog();
        let monitor = monitor_in_sector(&catalog);
        let bridge = ContinuityBridge::new(MemorySnapshotStore::new());

        bridge.persist(&monitor, 2_000).await.unwrap();

        let mut fresh = SectorMonitor::new();
        let found = bridge.restore_into(&mut fresh, &catalog).await.unwrap();
        assert!(found);
        let state = fresh.state();
        assert_eq!(state.current_sector_id, monitor.state().current_sector_id);
        assert_eq!(state.entry_time_ms, monitor.state().entry_time_ms);
        assert_eq!(state.speed_readings, monitor.state().speed_readings);
    }

    #[tokio::test]
    async fn empty_store_clears_in_memory_session() {
        let catalog = catalog();
        let mut monitor = monitor_in_sector(&catalog);
        let bridge = ContinuityBridge::new(MemorySnapshotStore::new());

        let found = bridge.restore_into(&mut monitor, &catalog).await.unwrap();
        assert!(!found);
        assert!(!monitor.state().is_in_sector());
    }

    #[tokio::test]
    async fn file_store_round_trip_and_clear() {
        let path = std::env::temp_dir().join(format!(
            "sector-snapshot-{}.json",
            std::process::id()
        ));
        let store = FileSnapshotStore::new(&path);

        assert!(store.load().await.unwrap().is_none());

        let snapshot = TrackingSnapshot {
            current_sector_id: Some(Id::new("a7-nord".to_owned())),
            entry_time_ms: Some(1_000),
            speed_readings: vec![95.0],
            recommended_speed_kmh: None,
            current_average_speed: 95.0,
            saved_at_ms: 2_000,
        };
        store.save(&snapshot).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.current_sector_id, snapshot.current_sector_id);
        assert_eq!(loaded.speed_readings, snapshot.speed_readings);

        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
        // clearing twice is fine
        store.clear().await.unwrap();
    }
}
