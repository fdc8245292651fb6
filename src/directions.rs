// Copyright: Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license

use crate::Coordinate;
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const DIRECTIONS_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/directions/json";

/// The slice of the directions provider response the engine consumes.
/// Unknown fields in the provider payload are ignored on deserialization.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DirectionsResponse {
    #[serde(default)]
    pub routes: Vec<DirectionsRoute>,
    pub status: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DirectionsRoute {
    #[serde(default)]
    pub legs: Vec<RouteLeg>,
    #[serde(default)]
    pub summary: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouteLeg {
    #[serde(default)]
    pub steps: Vec<LegStep>,
    pub end_address: Option<String>,
    pub distance: Option<TextValue>,
    pub duration: Option<TextValue>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LegStep {
    pub maneuver: Option<String>,
    pub end_location: Coordinate,
    pub polyline: PolylinePoints,
    pub distance: Option<TextValue>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolylinePoints {
    pub points: String,
}

/// Provider's human/machine value pair, e.g. `{"text": "0.4 km", "value": 400}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TextValue {
    pub text: String,
    pub value: i64,
}

/// Route origin: a free-form address, or a live position formatted as
/// `"lat,lng"` for re-route requests.
#[derive(Clone, Debug, PartialEq)]
pub enum Origin {
    Address(String),
    Position(Coordinate),
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Origin::Address(address) => write!(f, "{address}"),
            Origin::Position(coordinate) => write!(f, "{coordinate}"),
        }
    }
}

#[derive(Error, Debug)]
pub enum DirectionsError {
    #[error("directions request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("directions endpoint returned HTTP {0}")]
    Http(reqwest::StatusCode),

    #[error("failed to parse directions response: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Seam the navigation loop re-routes through. The engine only ever has one
/// request in flight; implementations do not need to queue.
#[allow(async_fn_in_trait)]
pub trait DirectionsProvider {
    async fn get_route(
        &self,
        origin: &Origin,
        destination: &str,
        mode: &str,
    ) -> Result<DirectionsResponse, DirectionsError>;
}

impl<P: DirectionsProvider> DirectionsProvider for std::sync::Arc<P> {
    async fn get_route(
        &self,
        origin: &Origin,
        destination: &str,
        mode: &str,
    ) -> Result<DirectionsResponse, DirectionsError> {
        (**self).get_route(origin, destination, mode).await
    }
}

/// Google Directions API client.
pub struct GoogleDirectionsClient {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl GoogleDirectionsClient {
    pub fn new(api_key: String) -> Result<Self, DirectionsError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            client,
            api_key,
            endpoint: DIRECTIONS_ENDPOINT.to_string(),
        })
    }

    /// Point the client somewhere else, e.g. a local stub server.
    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = endpoint;
        self
    }
}

impl DirectionsProvider for GoogleDirectionsClient {
    async fn get_route(
        &self,
        origin: &Origin,
        destination: &str,
        mode: &str,
    ) -> Result<DirectionsResponse, DirectionsError> {
        debug!("requesting directions {origin} -> {destination} ({mode})");

        let origin = origin.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("origin", origin.as_str()),
                ("destination", destination),
                ("mode", mode),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?;

        let http_status = response.status();
        let body = response.text().await?;

        if !http_status.is_success() {
            error!("directions endpoint returned {http_status}: {body}");
            return Err(DirectionsError::Http(http_status));
        }

        let parsed: DirectionsResponse = serde_json::from_str(&body).map_err(|err| {
            error!("failed to parse directions response: {err}. Body: {body}");
            err
        })?;

        debug!(
            "directions status {} with {} route(s)",
            parsed.status,
            parsed.routes.len()
        );

        Ok(parsed)
    }
}
