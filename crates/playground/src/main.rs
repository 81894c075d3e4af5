use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use model::fix::LocationFix;
use model::route::RoutePoint;
use model::sector::SectorEndpoint;
use recorder::LogSink;
use routing::client::{DirectionsApi, RoutingProfile};
use routing::provider::RouteProvider;
use routing::RoutingError;
use tracking::catalog::SectorCatalog;
use tracking::service::TrackingService;
use tracking::settings::TrackingSettings;

/// Offline directions backend so the playground runs without credentials.
/// Swap in `RoutingApiClient::new(&RoutingCredentials::env())` for the real
/// service.
struct OfflineDirections;

#[async_trait]
impl DirectionsApi for OfflineDirections {
    async fn fetch(
        &self,
        _profile: RoutingProfile,
        start: &SectorEndpoint,
        end: &SectorEndpoint,
    ) -> Result<Vec<RoutePoint>, RoutingError> {
        // a gentle dogleg between the endpoints, enough for a real route
        let mid = RoutePoint::new(
            (start.longitude + end.longitude) / 2.0 + 0.0005,
            (start.latitude + end.latitude) / 2.0,
        );
        Ok(vec![
            RoutePoint::new(start.longitude, start.latitude),
            mid,
            RoutePoint::new(end.longitude, end.latitude),
        ])
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let service = TrackingService::start(
        SectorCatalog::builtin(),
        TrackingSettings::default(),
        Arc::new(RouteProvider::new(OfflineDirections)),
        Arc::new(LogSink),
        "playground-device".to_owned(),
    );

    let mut events = service.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("event: {}", serde_json::to_string(&event).unwrap());
        }
    });

    // approach from 3 km south, drive the 2 km sector at ~110 km/h, leave
    let drive: &[(f64, f64)] = &[
        (53.9730, 110.0),
        (53.9820, 110.0),
        (53.9910, 110.0),
        (54.0000, 110.0),
        (54.0000, 110.0),
        (54.0045, 112.0),
        (54.0090, 108.0),
        (54.0135, 110.0),
        (54.0180, 110.0),
        (54.0199, 110.0),
        (54.0210, 110.0),
        (54.0221, 110.0),
    ];

    let sender = service.fix_sender();
    let mut t = 1_000_000i64;
    for &(latitude, speed) in drive {
        t += 600;
        sender
            .send(LocationFix::new(latitude, 10.0, speed, t))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    // let the exit recording and event printing drain
    tokio::time::sleep(Duration::from_millis(300)).await;

    let state = service.state().await;
    println!("final state: {}", serde_json::to_string_pretty(&state).unwrap());
    for entry in service.history().await {
        println!("history: {}", serde_json::to_string(&entry).unwrap());
    }
}
