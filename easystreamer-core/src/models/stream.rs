use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Identifier of a stream published by the server
///
/// Opaque to the client; unique within one catalog snapshot and stable across
/// polls for as long as the stream exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for StreamId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for StreamId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Codec the server ingests a track with
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Codec {
    H264,
    VP8,
    /// Any other name, kept verbatim
    Other(String),
}

impl Codec {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::H264 => "H264",
            Self::VP8 => "VP8",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for Codec {
    fn from(name: String) -> Self {
        match name.as_str() {
            "H264" => Self::H264,
            "VP8" => Self::VP8,
            _ => Self::Other(name),
        }
    }
}

impl From<Codec> for String {
    fn from(codec: Codec) -> Self {
        match codec {
            Codec::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Network origin of one track of a stream (server-side ingest metadata)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackDefinition {
    pub port: u16,
    /// Multicast or unicast source address; the server assumes localhost when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<IpAddr>,
    pub codec: Codec,
}

/// One entry of `GET /api/streams`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDefinition {
    pub id: StreamId,
    /// Selected automatically when a new client connects
    #[serde(default)]
    pub default: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<TrackDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<TrackDefinition>,
}

impl StreamDefinition {
    /// Ids of every stream flagged `default` in a catalog snapshot, in catalog order
    #[must_use]
    pub fn default_ids(catalog: &[Self]) -> Vec<StreamId> {
        catalog
            .iter()
            .filter(|def| def.default)
            .map(|def| def.id.clone())
            .collect()
    }
}
