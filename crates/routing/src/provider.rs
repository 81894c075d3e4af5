use std::time::Duration;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use model::route::{RoutePoint, RoutePolyline};
use model::sector::Sector;
use tokio::sync::RwLock;

use crate::client::{DirectionsApi, RoutingProfile};
use crate::RoutingError;

/// Resolution order. The traffic-aware profile is only consulted when the
/// standard one cannot produce a usable polyline.
const PROFILES: &[RoutingProfile] = &[RoutingProfile::Driving, RoutingProfile::DrivingTraffic];

const CACHE_TTL_HOURS: i64 = 24;

const RATE_LIMIT_BACKOFF: Duration = Duration::from_millis(1_500);

/// A route needs at least this many points to count as resolved; anything
/// shorter is indistinguishable from the straight-line fallback.
const MIN_ROUTE_POINTS: usize = 3;

struct CachedRoute {
    polyline: RoutePolyline,
    fetched_at: DateTime<Utc>,
}

/// Resolves a polyline approximating the physical road between a sector's
/// endpoints. Successful results are memoized process-wide for 24 hours;
/// failures are never cached and are retried on the next call.
pub struct RouteProvider<A: DirectionsApi> {
    api: A,
    cache: RwLock<IndexMap<String, CachedRoute>>,
}

fn cache_key(sector: &Sector) -> String {
    format!(
        "{}:{:.6},{:.6}:{:.6},{:.6}",
        sector.id,
        sector.start.latitude,
        sector.start.longitude,
        sector.end.latitude,
        sector.end.longitude,
    )
}

impl<A: DirectionsApi> RouteProvider<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            cache: RwLock::new(IndexMap::new()),
        }
    }

    /// Returns `None` when no profile yields a usable polyline; the caller
    /// substitutes the straight line between the sector endpoints.
    pub async fn resolve_route(&self, sector: &Sector) -> Option<RoutePolyline> {
        let key = cache_key(sector);

        if let Some(cached) = self.cache.read().await.get(&key) {
            let age = Utc::now() - cached.fetched_at;
            if age < chrono::Duration::hours(CACHE_TTL_HOURS) {
                return Some(cached.polyline.clone());
            }
        }

        let polyline = self.fetch_from_profiles(sector).await?;
        self.cache.write().await.insert(
            key,
            CachedRoute {
                polyline: polyline.clone(),
                fetched_at: Utc::now(),
            },
        );
        Some(polyline)
    }

    /// Drops a cached route so the next resolution refetches.
    pub async fn invalidate(&self, sector: &Sector) {
        self.cache.write().await.shift_remove(&cache_key(sector));
    }

    async fn fetch_from_profiles(&self, sector: &Sector) -> Option<RoutePolyline> {
        let mut waited_for_rate_limit = false;
        let mut index = 0;

        while index < PROFILES.len() {
            let profile = PROFILES[index];
            match self.api.fetch(profile, &sector.start, &sector.end).await {
                Ok(points) => {
                    if let Some(polyline) = usable_polyline(points) {
                        return Some(polyline);
                    }
                    log::warn!(
                        "route for sector '{}' via {:?} has too few valid points",
                        sector.id,
                        profile
                    );
                }
                Err(RoutingError::UnroutablePair) => {
                    log::info!(
                        "sector '{}' not routable via {:?}, trying next profile",
                        sector.id,
                        profile
                    );
                }
                Err(RoutingError::Unauthorized) => {
                    // credential failure, no point trying further profiles
                    log::error!("routing credentials rejected, aborting resolution");
                    return None;
                }
                Err(RoutingError::RateLimited) if !waited_for_rate_limit => {
                    waited_for_rate_limit = true;
                    tokio::time::sleep(RATE_LIMIT_BACKOFF).await;
                    // retry the same profile once
                    continue;
                }
                Err(why) => {
                    log::warn!("route resolution for sector '{}' failed: {}", sector.id, why);
                }
            }
            index += 1;
        }

        None
    }
}

fn usable_polyline(points: Vec<RoutePoint>) -> Option<RoutePolyline> {
    let valid: Vec<RoutePoint> = points.into_iter().filter(|p| p.is_valid()).collect();
    if valid.len() >= MIN_ROUTE_POINTS {
        Some(RoutePolyline::new(valid))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use model::sector::SectorEndpoint;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use utility::id::Id;

    fn sector() -> Sector {
        Sector {
            id: Id::new("a7-nord".to_owned()),
            name: "A7 Nord".to_owned(),
            speed_limit_kmh: 100.0,
            start: SectorEndpoint::new(54.00, 10.0),
            end: SectorEndpoint::new(54.02, 10.0),
            active: true,
            route: None,
        }
    }

    fn three_points() -> Vec<RoutePoint> {
        vec![
            RoutePoint::new(10.0, 54.00),
            RoutePoint::new(10.0, 54.01),
            RoutePoint::new(10.0, 54.02),
        ]
    }

    /// Plays back one scripted result per fetch call.
    struct ScriptedApi {
        calls: AtomicUsize,
        script: Mutex<Vec<Result<Vec<RoutePoint>, RoutingError>>>,
    }

    impl ScriptedApi {
        fn new(script: Vec<Result<Vec<RoutePoint>, RoutingError>>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                script: Mutex::new(script),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DirectionsApi for ScriptedApi {
        async fn fetch(
            &self,
            _profile: RoutingProfile,
            _start: &SectorEndpoint,
            _end: &SectorEndpoint,
        ) -> Result<Vec<RoutePoint>, RoutingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                Err(RoutingError::NoRoute)
            } else {
                script.remove(0)
            }
        }
    }

    #[tokio::test]
    async fn first_profile_wins() {
        let provider = RouteProvider::new(ScriptedApi::new(vec![Ok(three_points())]));
        let route = provider.resolve_route(&sector()).await.unwrap();
        assert!(route.is_real_route());
        assert_eq!(provider.api.calls(), 1);
    }

    #[tokio::test]
    async fn unroutable_falls_through_to_next_profile() {
        let provider = RouteProvider::new(ScriptedApi::new(vec![
            Err(RoutingError::UnroutablePair),
            Ok(three_points()),
        ]));
        let route = provider.resolve_route(&sector()).await;
        assert!(route.is_some());
        assert_eq!(provider.api.calls(), 2);
    }

    #[tokio::test]
    async fn unauthorized_aborts_all_profiles() {
        let provider = RouteProvider::new(ScriptedApi::new(vec![
            Err(RoutingError::Unauthorized),
            Ok(three_points()),
        ]));
        let route = provider.resolve_route(&sector()).await;
        assert!(route.is_none());
        assert_eq!(provider.api.calls(), 1);
    }

    #[tokio::test]
    async fn rate_limit_waits_once_and_retries() {
        let provider = RouteProvider::new(ScriptedApi::new(vec![
            Err(RoutingError::RateLimited),
            Ok(three_points()),
        ]));
        let route = provider.resolve_route(&sector()).await;
        assert!(route.is_some());
        assert_eq!(provider.api.calls(), 2);
    }

    #[tokio::test]
    async fn two_point_responses_are_not_routes() {
        let short = vec![RoutePoint::new(10.0, 54.0), RoutePoint::new(10.0, 54.02)];
        let provider =
            RouteProvider::new(ScriptedApi::new(vec![Ok(short.clone()), Ok(short)]));
        assert!(provider.resolve_route(&sector()).await.is_none());
        assert_eq!(provider.api.calls(), 2);
    }

    #[tokio::test]
    async fn successful_resolution_is_cached() {
        let provider = RouteProvider::new(ScriptedApi::new(vec![Ok(three_points())]));
        let sector = sector();
        assert!(provider.resolve_route(&sector).await.is_some());
        assert!(provider.resolve_route(&sector).await.is_some());
        assert_eq!(provider.api.calls(), 1);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let provider = RouteProvider::new(ScriptedApi::new(vec![
            Err(RoutingError::NoRoute),
            Err(RoutingError::NoRoute),
            Ok(three_points()),
            Ok(three_points()),
        ]));
        let sector = sector();
        assert!(provider.resolve_route(&sector).await.is_none());
        // next call retries instead of serving a cached failure
        assert!(provider.resolve_route(&sector).await.is_some());
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let provider = RouteProvider::new(ScriptedApi::new(vec![
            Ok(three_points()),
            Ok(three_points()),
        ]));
        let sector = sector();
        assert!(provider.resolve_route(&sector).await.is_some());
        provider.invalidate(&sector).await;
        assert!(provider.resolve_route(&sector).await.is_some());
        assert_eq!(provider.api.calls(), 2);
    }
}
