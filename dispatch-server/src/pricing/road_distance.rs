//! Road-distance provider
//!
//! The provider is an HTTP service shaped like the Google Distance Matrix
//! API. Every call is bounded by a timeout, and callers always have a
//! haversine fallback, so provider failures never reach order placement.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use shared::models::Coordinates;
use thiserror::Error;

/// Road-distance provider errors
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Road-distance provider is not configured")]
    Unconfigured,

    #[error("Road-distance request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Road-distance request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Road-distance provider returned status {0}")]
    Status(String),

    #[error("Road-distance response had no usable element")]
    EmptyResponse,
}

/// Source of road distances between two points
#[async_trait]
pub trait RoadDistanceProvider: Send + Sync {
    /// Road distance in km
    async fn distance_km(
        &self,
        origin: Coordinates,
        destination: Coordinates,
    ) -> Result<f64, ProviderError>;
}

/// Routing provider settings
#[derive(Debug, Clone)]
pub struct RoutingConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            timeout: Duration::from_millis(3000),
        }
    }
}

impl RoutingConfig {
    pub fn is_configured(&self) -> bool {
        self.api_url.as_deref().is_some_and(|u| !u.trim().is_empty())
            && self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct MatrixResponse {
    status: String,
    #[serde(default)]
    rows: Vec<MatrixRow>,
}

#[derive(Debug, Deserialize)]
struct MatrixRow {
    #[serde(default)]
    elements: Vec<MatrixElement>,
}

#[derive(Debug, Deserialize)]
struct MatrixElement {
    status: String,
    distance: Option<MatrixValue>,
}

#[derive(Debug, Deserialize)]
struct MatrixValue {
    /// Meters
    value: f64,
}

impl MatrixResponse {
    fn first_distance_km(self) -> Result<f64, ProviderError> {
        if self.status != "OK" {
            return Err(ProviderError::Status(self.status));
        }
        let element = self
            .rows
            .into_iter()
            .next()
            .and_then(|row| row.elements.into_iter().next())
            .ok_or(ProviderError::EmptyResponse)?;
        if element.status != "OK" {
            return Err(ProviderError::Status(element.status));
        }
        let meters = element
            .distance
            .map(|d| d.value)
            .filter(|m| m.is_finite() && *m >= 0.0)
            .ok_or(ProviderError::EmptyResponse)?;
        Ok(meters / 1000.0)
    }
}

/// Distance-Matrix HTTP client
pub struct HttpRoadDistance {
    client: reqwest::Client,
    url: String,
    key: String,
    timeout: Duration,
}

impl HttpRoadDistance {
    /// Build a client, `Err(Unconfigured)` when URL or key is missing
    pub fn from_config(config: &RoutingConfig) -> Result<Self, ProviderError> {
        if !config.is_configured() {
            return Err(ProviderError::Unconfigured);
        }
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            url: config.api_url.clone().unwrap_or_default(),
            key: config.api_key.clone().unwrap_or_default(),
            timeout: config.timeout,
        })
    }
}

#[async_trait]
impl RoadDistanceProvider for HttpRoadDistance {
    async fn distance_km(
        &self,
        origin: Coordinates,
        destination: Coordinates,
    ) -> Result<f64, ProviderError> {
        let origins = format!("{},{}", origin.lat, origin.lon);
        let destinations = format!("{},{}", destination.lat, destination.lon);

        let request = self
            .client
            .get(&self.url)
            .query(&[
                ("origins", origins.as_str()),
                ("destinations", destinations.as_str()),
                ("units", "metric"),
                ("key", self.key.as_str()),
            ])
            .send();

        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| ProviderError::Timeout(self.timeout))??
            .error_for_status()?;

        let body: MatrixResponse = response.json().await?;
        body.first_distance_km()
    }
}
