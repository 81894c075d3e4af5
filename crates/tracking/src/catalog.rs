use std::error;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use model::route::RoutePolyline;
use model::sector::{Sector, SectorEndpoint};
use utility::id::Id;

#[derive(Debug, Clone)]
pub enum CatalogError {
    Io(Arc<std::io::Error>),
    Json(Arc<serde_json::Error>),
}

impl error::Error for CatalogError {}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CatalogError::Io(e) => write!(f, "catalog file error: {}", e),
            CatalogError::Json(e) => write!(f, "catalog parse error: {}", e),
        }
    }
}

impl From<std::io::Error> for CatalogError {
    fn from(e: std::io::Error) -> Self {
        CatalogError::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(e: serde_json::Error) -> Self {
        CatalogError::Json(Arc::new(e))
    }
}

/// Static list of enforcement sectors, loaded once at startup. Read-only
/// afterwards except for wholesale route attachment by the resolve task.
pub struct SectorCatalog {
    sectors: Vec<Sector>,
}

impl SectorCatalog {
    /// Invalid sector definitions (non-positive limit, bad coordinates) are
    /// dropped with a warning rather than poisoning the catalog.
    pub fn new(sectors: Vec<Sector>) -> Self {
        let sectors = sectors
            .into_iter()
            .filter(|sector| {
                if sector.is_valid() {
                    true
                } else {
                    log::warn!("dropping invalid sector definition '{}'", sector.id);
                    false
                }
            })
            .collect();
        Self { sectors }
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)?;
        let sectors: Vec<Sector> = serde_json::from_str(&raw)?;
        Ok(Self::new(sectors))
    }

    /// The sectors shipped with the app, used when the host supplies no
    /// catalog file.
    pub fn builtin() -> Self {
        Self::new(vec![
            Sector {
                id: Id::new("a7-nord".to_owned()),
                name: "A7 Nord".to_owned(),
                speed_limit_kmh: 100.0,
                start: SectorEndpoint {
                    latitude: 54.0,
                    longitude: 10.0,
                    kilometer_marker: Some(12.4),
                },
                end: SectorEndpoint {
                    latitude: 54.017986,
                    longitude: 10.0,
                    kilometer_marker: Some(14.4),
                },
                active: true,
                route: None,
            },
            Sector {
                id: Id::new("b76-west".to_owned()),
                name: "B76 West".to_owned(),
                speed_limit_kmh: 80.0,
                start: SectorEndpoint {
                    latitude: 54.3233,
                    longitude: 10.1228,
                    kilometer_marker: None,
                },
                end: SectorEndpoint {
                    latitude: 54.3300,
                    longitude: 10.0950,
                    kilometer_marker: None,
                },
                active: true,
                route: None,
            },
        ])
    }

    pub fn sectors(&self) -> &[Sector] {
        &self.sectors
    }

    pub fn len(&self) -> usize {
        self.sectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sectors.is_empty()
    }

    pub fn get(&self, id: &Id<Sector>) -> Option<&Sector> {
        self.sectors.iter().find(|sector| &sector.id == id)
    }

    /// First active sector whose geometry lies within `threshold_m` of the
    /// given position. With overlapping sector geometries the catalog order
    /// decides; there is no priority rule.
    pub fn find_containing(
        &self,
        latitude: f64,
        longitude: f64,
        threshold_m: f64,
    ) -> Option<&Sector> {
        self.sectors
            .iter()
            .filter(|sector| sector.active)
            .find(|sector| sector.is_near(latitude, longitude, threshold_m))
    }

    /// Replaces a sector's route wholesale. Returns false for unknown ids.
    pub fn attach_route(&mut self, id: &Id<Sector>, polyline: RoutePolyline) -> bool {
        match self.sectors.iter_mut().find(|sector| &sector.id == id) {
            Some(sector) => {
                sector.route = Some(polyline);
                true
            }
            None => false,
        }
    }
}
