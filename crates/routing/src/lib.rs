use std::error;
use std::fmt;
use std::sync::Arc;

pub mod client;
pub mod provider;

#[derive(Debug, Clone)]
pub enum RoutingError {
    Request(Arc<reqwest::Error>),
    Json(Arc<serde_json::Error>),
    InvalidResponse {
        status_code: reqwest::StatusCode,
        url: String,
        response: Option<String>,
    },
    /// Credential failure. Fatal for the whole resolution attempt, no point
    /// retrying other profiles.
    Unauthorized,
    /// The service cannot route between the given endpoints (HTTP 422).
    UnroutablePair,
    RateLimited,
    NoRoute,
}

impl error::Error for RoutingError {}

impl fmt::Display for RoutingError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RoutingError::Request(e) => write!(f, "HTTP request error: {}", e),
            RoutingError::Json(e) => write!(f, "JSON parse error: {}", e),
            RoutingError::InvalidResponse {
                status_code,
                url,
                response,
            } => match response {
                Some(text) => {
                    write!(f, "Invalid Response ({}) {}: {}", status_code, url, text)
                }
                None => write!(f, "Invalid Response ({}) {}", status_code, url),
            },
            RoutingError::Unauthorized => write!(f, "Routing credentials rejected."),
            RoutingError::UnroutablePair => {
                write!(f, "No route exists between the given endpoints.")
            }
            RoutingError::RateLimited => write!(f, "Rate limit reached."),
            RoutingError::NoRoute => write!(f, "Response contained no route."),
        }
    }
}

impl From<reqwest::Error> for RoutingError {
    fn from(e: reqwest::Error) -> Self {
        RoutingError::Request(Arc::new(e))
    }
}

impl From<serde_json::Error> for RoutingError {
    fn from(e: serde_json::Error) -> Self {
        RoutingError::Json(Arc::new(e))
    }
}
