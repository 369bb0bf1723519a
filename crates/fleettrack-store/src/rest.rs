//! REST clients for the durable location store and the order service.
//!
//! Both collaborators are internal HTTP services speaking camelCase JSON.
//! Every call carries the configured request timeout; 404 answers map to
//! `None` on single-entity reads.

use async_trait::async_trait;
use fleettrack_core::error::StoreError;
use fleettrack_core::types::{ActiveDelivery, NearbyDriver, PositionSample};
use std::time::Duration;
use tracing::debug;

use crate::{DeliverySource, HistoryRange, LocationStore, RadiusQuery};

fn build_client(timeout: Duration) -> Result<reqwest::Client, StoreError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| StoreError::Transport(e.to_string()))
}

fn transport_error(err: reqwest::Error, timeout: Duration) -> StoreError {
    if err.is_timeout() {
        StoreError::Timeout(timeout)
    } else {
        StoreError::Transport(err.to_string())
    }
}

/// Fetches one entity, mapping 404 to `None` and decoding everything else.
async fn get_optional<T: serde::de::DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<Option<T>, StoreError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| transport_error(e, timeout))?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !response.status().is_success() {
        return Err(StoreError::status(response.status().as_u16(), url));
    }

    response
        .json::<T>()
        .await
        .map(Some)
        .map_err(|e| StoreError::Decode(e.to_string()))
}

/// Durable location store over HTTP.
pub struct RestLocationStore {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl RestLocationStore {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, StoreError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }
}

#[async_trait]
impl LocationStore for RestLocationStore {
    async fn save(&self, batch: &[PositionSample]) -> Result<(), StoreError> {
        let url = format!("{}/internal/locations", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(batch)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        if !response.status().is_success() {
            return Err(StoreError::status(response.status().as_u16(), url));
        }

        debug!(count = batch.len(), "persisted location batch");
        Ok(())
    }

    async fn latest(&self, driver_id: &str) -> Result<Option<PositionSample>, StoreError> {
        let url = format!(
            "{}/internal/drivers/{}/location/latest",
            self.base_url, driver_id
        );
        get_optional(&self.client, &url, self.timeout).await
    }

    async fn history(
        &self,
        driver_id: &str,
        range: &HistoryRange,
    ) -> Result<Vec<PositionSample>, StoreError> {
        let url = format!(
            "{}/internal/drivers/{}/location/history",
            self.base_url, driver_id
        );

        let mut request = self.client.get(&url).query(&[("limit", range.limit)]);
        if let Some(start) = range.start {
            request = request.query(&[("start", start.to_rfc3339())]);
        }
        if let Some(end) = range.end {
            request = request.query(&[("end", end.to_rfc3339())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;
        if !response.status().is_success() {
            return Err(StoreError::status(response.status().as_u16(), url));
        }

        response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn query_nearby(&self, query: &RadiusQuery) -> Result<Vec<NearbyDriver>, StoreError> {
        let url = format!("{}/internal/locations/nearby", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("lat", query.latitude.to_string()),
                ("lng", query.longitude.to_string()),
                ("radius", query.radius_meters.to_string()),
                ("limit", query.limit.to_string()),
            ])
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        if !response.status().is_success() {
            return Err(StoreError::status(response.status().as_u16(), url));
        }

        response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }
}

/// Order-service view over HTTP.
pub struct RestDeliverySource {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl RestDeliverySource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, StoreError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }
}

#[async_trait]
impl DeliverySource for RestDeliverySource {
    async fn find_active_order(
        &self,
        driver_id: &str,
    ) -> Result<Option<ActiveDelivery>, StoreError> {
        let url = format!(
            "{}/internal/drivers/{}/active-delivery",
            self.base_url, driver_id
        );
        get_optional(&self.client, &url, self.timeout).await
    }

    async fn delivery(&self, order_id: &str) -> Result<Option<ActiveDelivery>, StoreError> {
        let url = format!("{}/internal/deliveries/{}", self.base_url, order_id);
        get_optional(&self.client, &url, self.timeout).await
    }
}
