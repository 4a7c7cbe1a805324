//! Hub directory search.
//!
//! [`HubClient::find_spaces`] is a pass-through to the Hub's `/api/spaces`
//! listing: the query, sort field and limit are forwarded as-is with a
//! descending direction, and whatever the Hub returns is handed back.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::ClientConfig;

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API error: {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("Invalid space id: {0}")]
    InvalidSpaceId(String),
}

pub type HubResult<T> = std::result::Result<T, HubError>;

/// Sort fields accepted by the Hub listing endpoint.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, strum::EnumString, strum::AsRefStr, strum::Display,
)]
pub enum SpaceSort {
    #[default]
    #[strum(serialize = "likes")]
    Likes,
    #[strum(to_string = "lastModified", serialize = "updatedAt")]
    LastModified,
    #[strum(serialize = "createdAt")]
    CreatedAt,
    #[strum(serialize = "trendingScore")]
    TrendingScore,
    #[strum(serialize = "id")]
    Id,
}

/// Directory metadata for a single Space, as returned by the Hub.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpaceInfo {
    pub id: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sdk: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, rename = "pipeline_tag")]
    pub pipeline_tag: Option<String>,
    #[serde(default)]
    pub private: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SpaceInfo {
    /// The author field when the Hub sends it, otherwise the owner part of the id.
    pub fn owner(&self) -> &str {
        self.author
            .as_deref()
            .unwrap_or_else(|| self.id.split('/').next().unwrap_or_default())
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SpaceHost {
    host: String,
}

#[derive(Clone)]
pub struct HubClient {
    client: Client,
    base_url: String,
    token: Option<SecretString>,
    request_timeout: Duration,
}

impl HubClient {
    pub fn new(client: Client, config: &ClientConfig, token: Option<SecretString>) -> Self {
        Self {
            client,
            base_url: config.hub_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.expose_secret().is_empty()),
            request_timeout: config.request_timeout,
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.timeout(self.request_timeout);
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn find_spaces(
        &self,
        task_description: &str,
        sort_by: SpaceSort,
        limit: usize,
    ) -> HubResult<Vec<SpaceInfo>> {
        let url = format!("{}/api/spaces", self.base_url);
        let limit = limit.to_string();
        let request = self.client.get(&url).query(&[
            ("search", task_description),
            ("sort", sort_by.as_ref()),
            ("direction", "-1"),
            ("limit", limit.as_str()),
        ]);
        let response = self.authorize(request).send().await?;

        match response.status() {
            StatusCode::OK => {
                let spaces = response.json::<Vec<SpaceInfo>>().await?;
                debug!("Hub returned {} spaces", spaces.len());
                Ok(spaces)
            }
            status => Err(HubError::Api {
                status,
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    /// Resolves the direct host URL a Space is served from.
    #[tracing::instrument(skip(self))]
    pub async fn space_host(&self, space_id: &str) -> HubResult<String> {
        if space_id.split('/').filter(|part| !part.is_empty()).count() != 2 {
            return Err(HubError::InvalidSpaceId(space_id.to_string()));
        }
        let url = format!("{}/api/spaces/{}/host", self.base_url, space_id);
        let response = self.authorize(self.client.get(&url)).send().await?;

        match response.status() {
            StatusCode::OK => {
                let host = response.json::<SpaceHost>().await?;
                Ok(host.host.trim_end_matches('/').to_string())
            }
            status => Err(HubError::Api {
                status,
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    pub(crate) fn token(&self) -> Option<&SecretString> {
        self.token.as_ref()
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}
