use serde::Deserialize;
use serde_json::Value;
use std::{io::Read, time::Duration};
use thiserror::Error;

const USER_AGENT: &str = "GameShelf";
const COVER_URL_BASE: &str = "https://cdn.cloudflare.steamstatic.com/steam/apps";

pub fn cover_url(app_id: u32) -> String {
    format!("{COVER_URL_BASE}/{app_id}/header.jpg")
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Decode(String),
}

impl From<ureq::Error> for FetchError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(code, _) => FetchError::Status(code),
            ureq::Error::Transport(transport) => FetchError::Transport(transport.to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogPayload {
    #[serde(default)]
    pub games: Vec<WireGame>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireGame {
    pub appid: u32,
    #[serde(default = "unknown_name")]
    pub name: String,
    #[serde(default)]
    pub playtime_forever: u64,
    #[serde(default)]
    pub accounts: Vec<WireAccount>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireAccount {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub playtime_forever: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompatibilityPayload {
    #[serde(default = "unknown_name")]
    pub compatibility: String,
    #[serde(default, deserialize_with = "players_lenient")]
    pub active_players: i64,
}

fn unknown_name() -> String {
    "unknown".to_string()
}

// The backend reports player counts as either a JSON number or a decimal string.
fn players_lenient<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(raw) => raw.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

pub trait Backend: Send + Sync {
    fn fetch_catalog(&self, identity_ids: &[String]) -> Result<CatalogPayload, FetchError>;
    fn fetch_compatibility(&self, app_id: u32) -> Result<CompatibilityPayload, FetchError>;
    fn fetch_cover(&self, app_id: u32) -> Result<Vec<u8>, FetchError>;
}

pub struct HttpBackend {
    agent: ureq::Agent,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(10))
            .timeout_write(Duration::from_secs(10))
            .build();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Backend for HttpBackend {
    fn fetch_catalog(&self, identity_ids: &[String]) -> Result<CatalogPayload, FetchError> {
        let url = format!("{}/catalog/{}", self.base_url, identity_ids.join(","));
        let response = self
            .agent
            .get(&url)
            .set("User-Agent", USER_AGENT)
            .call()?;
        response
            .into_json()
            .map_err(|err| FetchError::Decode(err.to_string()))
    }

    fn fetch_compatibility(&self, app_id: u32) -> Result<CompatibilityPayload, FetchError> {
        let url = format!("{}/compatibility/{app_id}", self.base_url);
        let response = self
            .agent
            .get(&url)
            .set("User-Agent", USER_AGENT)
            .call()?;
        response
            .into_json()
            .map_err(|err| FetchError::Decode(err.to_string()))
    }

    fn fetch_cover(&self, app_id: u32) -> Result<Vec<u8>, FetchError> {
        let response = self
            .agent
            .get(&cover_url(app_id))
            .set("User-Agent", USER_AGENT)
            .call()?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|err| FetchError::Decode(err.to_string()))?;
        Ok(bytes)
    }
}
