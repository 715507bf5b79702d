//! HTTP-level tests for `ApiClient` against a mock streaming server

use easystreamer_core::api::{API_RESYNC, API_SIGNAL, API_STATS, API_STREAMS};
use easystreamer_core::config::ServerConfig;
use easystreamer_core::models::{
    Codec, ResyncRequest, SdpType, SessionDescription, SignalRequest, StreamId,
};
use easystreamer_core::{ApiClient, CatalogSource, ClientId, Error, SignalingChannel};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> ApiClient {
    let config = ServerConfig {
        base_url: server.uri(),
        ..ServerConfig::default()
    };
    ApiClient::new(&config).unwrap()
}

fn signal_request() -> SignalRequest {
    SignalRequest {
        uid: ClientId::from("client-1"),
        stream_ids: vec![StreamId::from("cam1"), StreamId::from("cam2")],
        offer: SessionDescription::offer("v=0\r\n"),
    }
}

// =========================================================================
// Catalog
// =========================================================================

#[tokio::test]
async fn test_fetch_streams_parses_catalog() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(API_STREAMS))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {
                "id": "cam1",
                "default": true,
                "video": {"port": 5000, "ip": "10.0.0.5", "codec": "H264"},
                "audio": null
            },
            {
                "id": "cam2",
                "video": {"port": 5002, "codec": "VP8"}
            }
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let streams = client_for(&mock_server).fetch_streams().await.unwrap();

    assert_eq!(streams.len(), 2);
    assert!(streams[0].default);
    assert!(!streams[1].default);
    assert_eq!(streams[1].video.as_ref().map(|t| &t.codec), Some(&Codec::VP8));
}

#[tokio::test]
async fn test_fetch_streams_server_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(API_STREAMS))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let result = client_for(&mock_server).fetch_streams().await;
    assert!(matches!(result, Err(Error::Http { status, .. }) if status.as_u16() == 500));
}

#[tokio::test]
async fn test_fetch_stats_rejects_garbage() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(API_STATS))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
        .mount(&mock_server)
        .await;

    let result = client_for(&mock_server).fetch_stats().await;
    assert!(matches!(result, Err(Error::Parse(_))));
}

#[tokio::test]
async fn test_fetch_stats_parses_snapshot() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(API_STATS))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "system_status": {
                "mem_total": 8_000,
                "mem_used": 2_000,
                "proc_mem": 1_536,
                "cpu_num": 4,
                "cpu_used": 12.6,
                "proc_cpu": 3.2,
                "uptime": 3600,
                "proc_id": 42
            },
            "clients": 3
        })))
        .mount(&mock_server)
        .await;

    let stats = client_for(&mock_server).fetch_stats().await.unwrap();
    assert_eq!(stats.clients, 3);
    assert_eq!(stats.cpu_percent(), "13");
    assert_eq!(stats.mem_percent(), "25");
    assert_eq!(stats.proc_mem_pretty(), "1.5 KB");
}

// =========================================================================
// Signaling
// =========================================================================

#[tokio::test]
async fn test_signal_posts_offer_and_returns_answer() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(API_SIGNAL))
        .and(body_json(serde_json::json!({
            "uid": "client-1",
            "stream_ids": ["cam1", "cam2"],
            "offer": {"type": "offer", "sdp": "v=0\r\n"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "type": "answer",
            "sdp": "v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\n"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let answer = client_for(&mock_server)
        .signal(&signal_request())
        .await
        .unwrap();

    assert_eq!(answer.sdp_type, SdpType::Answer);
    assert!(answer.sdp.starts_with("v=0"));
}

#[tokio::test]
async fn test_signal_empty_answer_is_an_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(API_SIGNAL))
        .respond_with(ResponseTemplate::new(200).set_body_string("\"\""))
        .mount(&mock_server)
        .await;

    let result = client_for(&mock_server).signal(&signal_request()).await;
    assert!(matches!(result, Err(Error::EmptyAnswer)));
}

#[tokio::test]
async fn test_signal_error_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(API_SIGNAL))
        .respond_with(ResponseTemplate::new(400))
        .mount(&mock_server)
        .await;

    let result = client_for(&mock_server).signal(&signal_request()).await;
    assert!(matches!(result, Err(Error::Http { .. })));
}

#[tokio::test]
async fn test_resync_posts_group_ids() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(API_RESYNC))
        .and(body_json(serde_json::json!({
            "uid": "client-1",
            "stream_ids": ["group-a"]
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let request = ResyncRequest {
        uid: ClientId::from("client-1"),
        stream_ids: vec!["group-a".to_string()],
    };
    client_for(&mock_server).resync(&request).await.unwrap();
}

#[tokio::test]
async fn test_unreachable_server_is_network_error() {
    let config = ServerConfig {
        base_url: "http://127.0.0.1:1".to_string(),
        connect_timeout_secs: 1,
        request_timeout_secs: 1,
    };
    let client = ApiClient::new(&config).unwrap();

    let result = client.fetch_streams().await;
    assert!(matches!(result, Err(Error::Network(_))));
}
