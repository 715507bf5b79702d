//! WebRTC peer connection backing the stream manager
//!
//! This module handles:
//! - Peer connection setup (default codecs and interceptors, STUN servers)
//! - Receive-only transceivers
//! - Offer creation with complete ICE gathering
//! - Inbound track readers that turn RTP flow into mute/unmute events

use crate::connection::{MediaConnection, Transceiver};
use crate::error::{Result, RtcError};
use crate::track::{run_track_reader, MediaPacket, TrackEvent, TrackFeed, TrackKind};
use crate::types::{SessionKey, TrackId};
use async_trait::async_trait;
use easystreamer_core::config::WebRTCConfig;
use easystreamer_core::models::{SdpType, SessionDescription};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit};
use webrtc::track::track_remote::TrackRemote;

struct WebRtcTransceiver {
    inner: Arc<RTCRtpTransceiver>,
}

#[async_trait]
impl Transceiver for WebRtcTransceiver {
    async fn stop(&self) -> Result<()> {
        debug!(mid = ?self.inner.mid(), "Stopping transceiver");
        self.inner.stop().await.map_err(Into::into)
    }
}

/// Receive-only peer connection to the streaming server
pub struct WebRtcConnection {
    peer_connection: Arc<RTCPeerConnection>,
    ice_gathering_timeout: Duration,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<TrackEvent>>>,
    /// Stops every track reader on close
    cancel_token: CancellationToken,
}

impl WebRtcConnection {
    pub async fn new(config: &WebRTCConfig) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers = if config.stun_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: config.stun_servers.clone(),
                ..Default::default()
            }]
        };
        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let peer_connection = Arc::new(api.new_peer_connection(rtc_config).await?);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();

        let mute_after = config.mute_timeout();
        let reader_token = cancel_token.clone();
        peer_connection.on_track(Box::new(move |track, _receiver, _transceiver| {
            spawn_track_reader(track, mute_after, events_tx.clone(), reader_token.child_token());
            Box::pin(async {})
        }));

        peer_connection.on_peer_connection_state_change(Box::new(|state| {
            info!(state = %state, "Peer connection state changed");
            Box::pin(async {})
        }));

        info!(
            stun_servers = config.stun_servers.len(),
            mute_timeout_ms = config.mute_timeout_ms,
            "WebRTC connection created"
        );

        Ok(Self {
            peer_connection,
            ice_gathering_timeout: config.ice_gathering_timeout(),
            events_rx: Mutex::new(Some(events_rx)),
            cancel_token,
        })
    }
}

/// Announce an inbound track and start pumping its packets
fn spawn_track_reader(
    track: Arc<TrackRemote>,
    mute_after: Duration,
    events: mpsc::UnboundedSender<TrackEvent>,
    cancel_token: CancellationToken,
) {
    let group = SessionKey::new(track.stream_id());
    let feed = TrackFeed::new(
        TrackId::new(track.id()),
        TrackKind::from(track.kind()),
        track.codec().capability.mime_type,
    );

    info!(
        group = %group,
        track_id = %feed.id,
        kind = ?feed.kind,
        codec = %feed.codec,
        "Inbound track"
    );

    if events
        .send(TrackEvent::Added {
            group,
            feed: feed.clone(),
        })
        .is_err()
    {
        return;
    }

    tokio::spawn(run_track_reader(
        feed,
        mute_after,
        move || {
            let track = Arc::clone(&track);
            async move {
                match track.read_rtp().await {
                    Ok((packet, _attributes)) => Some(MediaPacket::from_rtp(&packet)),
                    Err(e) => {
                        debug!(track_id = %track.id(), error = %e, "Track read ended");
                        None
                    }
                }
            }
        },
        events,
        cancel_token,
    ));
}

#[async_trait]
impl MediaConnection for WebRtcConnection {
    async fn add_receiver(&self, kind: TrackKind) -> Result<Arc<dyn Transceiver>> {
        let inner = self
            .peer_connection
            .add_transceiver_from_kind(
                kind.into(),
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Recvonly,
                    send_encodings: vec![],
                }),
            )
            .await?;
        Ok(Arc::new(WebRtcTransceiver { inner }))
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self.peer_connection.create_offer(None).await?;

        // Must be taken before the local description starts gathering
        let mut gather_complete = self.peer_connection.gathering_complete_promise().await;
        self.peer_connection.set_local_description(offer).await?;

        if timeout(self.ice_gathering_timeout, gather_complete.recv())
            .await
            .is_err()
        {
            warn!(
                timeout_ms = self.ice_gathering_timeout.as_millis() as u64,
                "ICE gathering did not complete, offering the candidates gathered so far"
            );
        }

        let local = self
            .peer_connection
            .local_description()
            .await
            .ok_or_else(|| RtcError::Connection("no local description after offer".to_string()))?;

        Ok(SessionDescription::offer(local.sdp))
    }

    async fn set_remote_description(&self, answer: &SessionDescription) -> Result<()> {
        let description = match answer.sdp_type {
            SdpType::Answer => RTCSessionDescription::answer(answer.sdp.clone()),
            SdpType::Pranswer => RTCSessionDescription::pranswer(answer.sdp.clone()),
            other => {
                return Err(RtcError::InvalidDescription(format!(
                    "expected an answer, got '{}'",
                    other.as_str()
                )))
            }
        }
        .map_err(|e| RtcError::InvalidDescription(e.to_string()))?;

        self.peer_connection
            .set_remote_description(description)
            .await
            .map_err(|e| RtcError::InvalidDescription(e.to_string()))
    }

    fn take_track_events(&self) -> Option<mpsc::UnboundedReceiver<TrackEvent>> {
        self.events_rx.lock().take()
    }

    async fn close(&self) -> Result<()> {
        self.cancel_token.cancel();
        self.peer_connection.close().await?;
        Ok(())
    }
}

impl Drop for WebRtcConnection {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
