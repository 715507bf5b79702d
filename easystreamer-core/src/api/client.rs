//! HTTP client for the streaming server's `/api` endpoints

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use super::{CatalogSource, SignalingChannel};
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::models::{
    ResyncRequest, SdpType, SessionDescription, SignalRequest, StatsSnapshot, StreamDefinition,
};

pub const API_STREAMS: &str = "/api/streams";
pub const API_STATS: &str = "/api/stats";
pub const API_SIGNAL: &str = "/api/signal";
pub const API_RESYNC: &str = "/api/resync";

/// Maximum accepted response body (SDP answers with many candidates stay well below this)
const MAX_RESPONSE_SIZE: usize = 4 * 1024 * 1024;

/// Streaming server API client
///
/// Cheap to clone; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    client: Client,
}

impl ApiClient {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        url::Url::parse(&config.base_url)?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.client.get(self.url(path)).send().await?;
        let body = read_body(check_response(response)?).await?;
        serde_json::from_slice(&body).map_err(Into::into)
    }
}

#[async_trait]
impl SignalingChannel for ApiClient {
    async fn signal(&self, request: &SignalRequest) -> Result<SessionDescription> {
        debug!(
            uid = %request.uid,
            stream_count = request.stream_ids.len(),
            "Sending offer"
        );

        let response = self
            .client
            .post(self.url(API_SIGNAL))
            .json(request)
            .send()
            .await?;

        let body = read_body(check_response(response)?).await?;
        parse_answer(&body)
    }

    async fn resync(&self, request: &ResyncRequest) -> Result<()> {
        let response = self
            .client
            .post(self.url(API_RESYNC))
            .json(request)
            .send()
            .await?;
        check_response(response)?;
        Ok(())
    }
}

#[async_trait]
impl CatalogSource for ApiClient {
    async fn fetch_streams(&self) -> Result<Vec<StreamDefinition>> {
        self.get_json(API_STREAMS).await
    }

    async fn fetch_stats(&self) -> Result<StatsSnapshot> {
        self.get_json(API_STATS).await
    }
}

/// Check HTTP response status before processing body.
fn check_response(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_client_error() || status.is_server_error() {
        return Err(Error::Http {
            status,
            url: resp.url().to_string(),
        });
    }
    Ok(resp)
}

async fn read_body(response: reqwest::Response) -> Result<bytes::Bytes> {
    if let Some(len) = response.content_length() {
        if len as usize > MAX_RESPONSE_SIZE {
            return Err(Error::ResponseTooLarge { size: len });
        }
    }
    let body = response.bytes().await?;
    if body.len() > MAX_RESPONSE_SIZE {
        return Err(Error::ResponseTooLarge {
            size: body.len() as u64,
        });
    }
    Ok(body)
}

/// Validate a `/api/signal` response body into an answer.
///
/// The server signals failure with an empty body or an empty JSON string
/// rather than an error status, so both map to [`Error::EmptyAnswer`].
fn parse_answer(body: &[u8]) -> Result<SessionDescription> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(Error::EmptyAnswer);
    }

    let value: serde_json::Value = serde_json::from_slice(body)?;
    match &value {
        serde_json::Value::Null => return Err(Error::EmptyAnswer),
        serde_json::Value::String(s) if s.is_empty() => return Err(Error::EmptyAnswer),
        _ => {}
    }

    let desc: SessionDescription = serde_json::from_value(value)?;
    if desc.sdp.trim().is_empty() {
        return Err(Error::EmptyAnswer);
    }
    if !matches!(desc.sdp_type, SdpType::Answer | SdpType::Pranswer) {
        warn!(sdp_type = desc.sdp_type.as_str(), "Server replied with a non-answer description");
        return Err(Error::Parse(format!(
            "expected an answer, got '{}'",
            desc.sdp_type.as_str()
        )));
    }
    Ok(desc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answer_accepts_answer() {
        let desc = parse_answer(br#"{"type":"answer","sdp":"v=0\r\n"}"#).unwrap();
        assert_eq!(desc.sdp_type, SdpType::Answer);
    }

    #[test]
    fn test_parse_answer_empty_forms() {
        assert!(matches!(parse_answer(b""), Err(Error::EmptyAnswer)));
        assert!(matches!(parse_answer(b"  \n"), Err(Error::EmptyAnswer)));
        assert!(matches!(parse_answer(br#""""#), Err(Error::EmptyAnswer)));
        assert!(matches!(parse_answer(b"null"), Err(Error::EmptyAnswer)));
        assert!(matches!(
            parse_answer(br#"{"type":"answer","sdp":""}"#),
            Err(Error::EmptyAnswer)
        ));
    }

    #[test]
    fn test_parse_answer_rejects_schema_violations() {
        assert!(matches!(parse_answer(b"{not json"), Err(Error::Parse(_))));
        assert!(matches!(parse_answer(br#"{"sdp":"v=0"}"#), Err(Error::Parse(_))));
        assert!(matches!(
            parse_answer(br#"{"type":"offer","sdp":"v=0"}"#),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_rejects_invalid_base_url() {
        let config = ServerConfig {
            base_url: "not a url".to_string(),
            ..ServerConfig::default()
        };
        assert!(matches!(ApiClient::new(&config), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let config = ServerConfig {
            base_url: "http://127.0.0.1:8080/".to_string(),
            ..ServerConfig::default()
        };
        let client = ApiClient::new(&config).unwrap();
        assert_eq!(client.url(API_STREAMS), "http://127.0.0.1:8080/api/streams");
    }
}
