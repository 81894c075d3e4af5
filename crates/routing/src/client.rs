use std::env;
use std::time::Duration;

use async_trait::async_trait;
use model::route::RoutePoint;
use model::sector::SectorEndpoint;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::RoutingError;

pub const DEFAULT_BASE_URL: &str = "https://api.mapbox.com/directions/v5/mapbox";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(8);

/// Routing profiles, tried in the order the provider lists them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingProfile {
    Driving,
    DrivingTraffic,
}

impl RoutingProfile {
    pub fn path(&self) -> &'static str {
        match self {
            Self::Driving => "driving",
            Self::DrivingTraffic => "driving-traffic",
        }
    }
}

#[derive(Clone, Debug)]
pub struct RoutingCredentials {
    pub access_token: String,
    pub base_url: String,
    pub rate_limit_per_minute: Option<u64>,
}

impl RoutingCredentials {
    pub fn env() -> Self {
        let access_token =
            env::var("ROUTING_ACCESS_TOKEN").expect("Expected routing access token.");
        let base_url =
            env::var("ROUTING_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_owned());

        Self {
            access_token,
            base_url,
            rate_limit_per_minute: None,
        }
    }
}

/// Seam between the provider and the directions service. The provider is
/// generic over this so resolution logic is testable without network I/O.
#[async_trait]
pub trait DirectionsApi: Send + Sync {
    async fn fetch(
        &self,
        profile: RoutingProfile,
        start: &SectorEndpoint,
        end: &SectorEndpoint,
    ) -> Result<Vec<RoutePoint>, RoutingError>;
}

struct RoutingClientState {
    avaliable_requests: u64,
    last_refill: chrono::DateTime<chrono::Local>,
}

pub struct RoutingApiClient {
    credentials: RoutingCredentials,
    http: reqwest::Client,
    state: RwLock<RoutingClientState>,
}

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    routes: Vec<DirectionsRoute>,
}

#[derive(Debug, Deserialize)]
struct DirectionsRoute {
    geometry: RouteGeometry,
}

#[derive(Debug, Deserialize)]
struct RouteGeometry {
    coordinates: Vec<[f64; 2]>,
}

impl RoutingApiClient {
    pub fn new(credentials: &RoutingCredentials) -> Result<Self, RoutingError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            credentials: credentials.clone(),
            http,
            state: RwLock::new(RoutingClientState {
                avaliable_requests: credentials.rate_limit_per_minute.unwrap_or(0),
                last_refill: chrono::offset::Local::now(),
            }),
        })
    }

    async fn try_decrement_avaliable_requests(&self) -> Result<(), RoutingError> {
        if let Some(rate_limit_minutes) = self.credentials.rate_limit_per_minute {
            let mut state = self.state.write().await;

            let minutes_since_last_refill =
                (chrono::offset::Local::now() - state.last_refill).num_minutes();
            if minutes_since_last_refill >= 1 {
                state.avaliable_requests = rate_limit_minutes;
                state.last_refill = chrono::offset::Local::now();
            }

            if state.avaliable_requests != 0 {
                state.avaliable_requests -= 1;
            } else {
                return Err(RoutingError::RateLimited);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DirectionsApi for RoutingApiClient {
    async fn fetch(
        &self,
        profile: RoutingProfile,
        start: &SectorEndpoint,
        end: &SectorEndpoint,
    ) -> Result<Vec<RoutePoint>, RoutingError> {
        self.try_decrement_avaliable_requests().await?;

        /* perform get-request */
        let url = format!(
            "{}/{}/{:.6},{:.6};{:.6},{:.6}",
            self.credentials.base_url,
            profile.path(),
            start.longitude,
            start.latitude,
            end.longitude,
            end.latitude,
        );
        let response = self
            .http
            .get(&url)
            .query(&[
                ("geometries", "geojson"),
                ("overview", "full"),
                ("access_token", self.credentials.access_token.as_str()),
            ])
            .send()
            .await?;

        /* classify response */
        match response.status() {
            reqwest::StatusCode::OK => {
                let parsed: DirectionsResponse = response.json().await?;
                let route = parsed.routes.into_iter().next().ok_or(RoutingError::NoRoute)?;
                Ok(route
                    .geometry
                    .coordinates
                    .into_iter()
                    .map(|[longitude, latitude]| RoutePoint::new(longitude, latitude))
                    .collect())
            }
            reqwest::StatusCode::UNAUTHORIZED => Err(RoutingError::Unauthorized),
            reqwest::StatusCode::UNPROCESSABLE_ENTITY => Err(RoutingError::UnroutablePair),
            reqwest::StatusCode::TOO_MANY_REQUESTS => Err(RoutingError::RateLimited),
            other => match response.text().await {
                Ok(val) => Err(RoutingError::InvalidResponse {
                    status_code: other,
                    url,
                    response: Some(val),
                }),
                Err(_) => Err(RoutingError::InvalidResponse {
                    status_code: other,
                    url,
                    response: None,
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_paths() {
        assert_eq!(RoutingProfile::Driving.path(), "driving");
        assert_eq!(RoutingProfile::DrivingTraffic.path(), "driving-traffic");
    }

    #[test]
    fn directions_response_parses_geojson() {
        let raw = r#"{
            "routes": [
                {"geometry": {"coordinates": [[10.0, 54.0], [10.001, 54.005], [10.002, 54.01]]}}
            ]
        }"#;
        let parsed: DirectionsResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.routes[0].geometry.coordinates.len(), 3);
        assert_eq!(parsed.routes[0].geometry.coordinates[0], [10.0, 54.0]);
    }

    #[tokio::test]
    async fn rate_limit_exhausts() {
        let client = RoutingApiClient::new(&RoutingCredentials {
            access_token: "token".to_owned(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            rate_limit_per_minute: Some(2),
        })
        .unwrap();
        assert!(client.try_decrement_avaliable_requests().await.is_ok());
        assert!(client.try_decrement_avaliable_requests().await.is_ok());
        assert!(matches!(
            client.try_decrement_avaliable_requests().await,
            Err(RoutingError::RateLimited)
        ));
    }
}
