//! reqwest-backed places backend client
//!
//! Endpoint layout:
//! - signed-in user: `/places`, `/places/summary`, `/places/in-bounds`
//! - followed user `U`: `/users/U/map/places`, `/users/U/map/summary`,
//!   `/users/U/map/places/in-bounds`

use placemap_common::config::TomlConfig;
use placemap_common::model::SourceMetadata;
use placemap_common::{BoundingBox, SourceId};
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::{ApiError, EagerPlace, PagedPlace, PlaceApi};

const USER_AGENT: &str = concat!("placemap/", env!("CARGO_PKG_VERSION"));

/// HTTP client for the places backend
pub struct HttpPlaceApi {
    http_client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpPlaceApi {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            http_client,
            base_url,
            token,
        })
    }

    /// Build a client from bootstrap configuration
    pub fn from_config(config: &TomlConfig) -> Result<Self, ApiError> {
        Self::new(
            config.api_base_url.clone(),
            config.api_token.clone(),
            config.loader.request_timeout(),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn places_url(&self, source_id: &SourceId) -> String {
        match source_id {
            SourceId::Me => format!("{}/places", self.base_url),
            SourceId::User(id) => format!("{}/users/{}/map/places", self.base_url, id),
        }
    }

    fn summary_url(&self, source_id: &SourceId) -> String {
        match source_id {
            SourceId::Me => format!("{}/places/summary", self.base_url),
            SourceId::User(id) => format!("{}/users/{}/map/summary", self.base_url, id),
        }
    }

    fn in_bounds_url(&self, source_id: &SourceId) -> String {
        format!("{}/in-bounds", self.places_url(source_id))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        tracing::debug!(url = %url, "Querying places backend");

        let mut request = self.http_client.get(url).query(query);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();

        if status == 404 {
            return Err(ApiError::NotFound(url.to_string()));
        }

        if status == 401 || status == 403 {
            let detail = response.text().await.unwrap_or_default();
            return Err(ApiError::Forbidden(detail));
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ApiError::Status(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))
    }
}

#[async_trait::async_trait]
impl PlaceApi for HttpPlaceApi {
    async fn source_metadata(&self, source_id: &SourceId) -> Result<SourceMetadata, ApiError> {
        let metadata: SourceMetadata = self.get_json(&self.summary_url(source_id), &[]).await?;

        tracing::debug!(
            source_id = %source_id,
            total_place_count = metadata.total_place_count,
            tags = metadata.tags.len(),
            collections = metadata.collections.len(),
            "Retrieved source metadata"
        );

        Ok(metadata)
    }

    async fn all_places(&self, source_id: &SourceId) -> Result<Vec<EagerPlace>, ApiError> {
        self.get_json(&self.places_url(source_id), &[]).await
    }

    async fn places_in_bounds(
        &self,
        source_id: &SourceId,
        bbox: &BoundingBox,
        limit: usize,
    ) -> Result<Vec<PagedPlace>, ApiError> {
        let query = [
            ("min_lat", bbox.min_lat.to_string()),
            ("max_lat", bbox.max_lat.to_string()),
            ("min_lng", bbox.min_lng.to_string()),
            ("max_lng", bbox.max_lng.to_string()),
            ("limit", limit.to_string()),
        ];
        self.get_json(&self.in_bounds_url(source_id), &query).await
    }
}
