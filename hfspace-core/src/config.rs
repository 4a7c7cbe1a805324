use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path, time::Duration};

use crate::{Error, InternalResult};

pub const DEFAULT_HUB_URL: &str = "https://huggingface.co";
pub const FAVORITES_FILE: &str = "favorite_spaces.json";
pub const RESULTS_DB: &str = "generated_content.db";

/// Settings shared by the Hub and Space clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    #[serde(default = "default_hub_url")]
    pub hub_url: String,

    #[serde(default = "default_request_timeout", with = "duration_ms")]
    pub request_timeout: Duration,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            hub_url: default_hub_url(),
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl ClientConfig {
    pub fn with_hub_url(mut self, hub_url: impl Into<String>) -> Self {
        self.hub_url = hub_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Builds the HTTP client every remote call goes through.
    ///
    /// Only connection setup is bounded here. `request_timeout` is applied per
    /// request to bounded responses; Space result streams run unbounded.
    pub fn http_client(&self) -> InternalResult<reqwest::Client> {
        reqwest::Client::builder()
            .connect_timeout(self.request_timeout)
            .user_agent(self.user_agent.clone())
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))
    }
}

fn default_hub_url() -> String {
    DEFAULT_HUB_URL.to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_user_agent() -> String {
    format!("hfspace/{}", env!("CARGO_PKG_VERSION"))
}

pub fn from_file<T: for<'de> Deserialize<'de>, P: AsRef<Path>>(path: P) -> InternalResult<T> {
    let file = File::open(path)
        .map_err(|e| Error::Internal(format!("Failed to open config file: {}", e)))?;
    let reader = BufReader::new(file);
    let config = serde_json::from_reader(reader)
        .map_err(|e| Error::Internal(format!("Failed to parse config file: {}", e)))?;
    Ok(config)
}

pub fn from_str<T: for<'de> Deserialize<'de>>(s: &str) -> InternalResult<T> {
    let config = serde_json::from_str(s)
        .map_err(|e| Error::Internal(format!("Failed to parse config: {}", e)))?;
    Ok(config)
}

pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
