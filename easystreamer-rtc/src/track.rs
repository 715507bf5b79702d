//! Inbound media tracks
//!
//! This module handles:
//! - Track kinds and the events the connection reports for each inbound track
//! - The packet feed consumers subscribe to
//! - Mute/unmute detection from RTP packet flow

use crate::types::{SessionKey, TrackId};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Capacity of per-track packet broadcast channel.
/// Lagging subscribers lose the oldest packets instead of stalling the reader.
const TRACK_PACKET_CHANNEL_CAPACITY: usize = 256;

/// Media track kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl From<webrtc::rtp_transceiver::rtp_codec::RTPCodecType> for TrackKind {
    fn from(codec_type: webrtc::rtp_transceiver::rtp_codec::RTPCodecType) -> Self {
        match codec_type {
            webrtc::rtp_transceiver::rtp_codec::RTPCodecType::Audio => Self::Audio,
            _ => Self::Video,
        }
    }
}

impl From<TrackKind> for webrtc::rtp_transceiver::rtp_codec::RTPCodecType {
    fn from(kind: TrackKind) -> Self {
        match kind {
            TrackKind::Audio => Self::Audio,
            TrackKind::Video => Self::Video,
        }
    }
}

/// RTP packet as delivered to feed subscribers
#[derive(Debug, Clone)]
pub struct MediaPacket {
    /// RTP payload
    pub payload: Bytes,

    /// Source SSRC
    pub ssrc: u32,

    pub sequence_number: u16,

    pub timestamp: u32,

    pub payload_type: u8,

    pub marker: bool,

    /// When packet was received
    pub received_at: Instant,
}

impl MediaPacket {
    #[must_use]
    pub fn from_rtp(packet: &webrtc::rtp::packet::Packet) -> Self {
        Self {
            payload: packet.payload.clone(),
            ssrc: packet.header.ssrc,
            sequence_number: packet.header.sequence_number,
            timestamp: packet.header.timestamp,
            payload_type: packet.header.payload_type,
            marker: packet.header.marker,
            received_at: Instant::now(),
        }
    }
}

/// Counters kept per feed
#[derive(Debug, Default)]
struct TrackCounters {
    packets_received: AtomicU64,
    bytes_received: AtomicU64,
}

/// Snapshot of a feed's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrackStats {
    pub packets_received: u64,
    pub bytes_received: u64,
}

/// One inbound track: identity plus a broadcast of its packets
///
/// Cloning shares the underlying channel and counters.
#[derive(Debug, Clone)]
pub struct TrackFeed {
    pub id: TrackId,
    pub kind: TrackKind,
    /// MIME type negotiated for the track, e.g. `video/H264`
    pub codec: String,
    packets: broadcast::Sender<MediaPacket>,
    counters: Arc<TrackCounters>,
}

impl TrackFeed {
    pub fn new(id: TrackId, kind: TrackKind, codec: impl Into<String>) -> Self {
        let (packets, _) = broadcast::channel(TRACK_PACKET_CHANNEL_CAPACITY);
        Self {
            id,
            kind,
            codec: codec.into(),
            packets,
            counters: Arc::new(TrackCounters::default()),
        }
    }

    /// Receive packets from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<MediaPacket> {
        self.packets.subscribe()
    }

    #[must_use]
    pub fn is_video(&self) -> bool {
        self.kind == TrackKind::Video
    }

    #[must_use]
    pub fn stats(&self) -> TrackStats {
        TrackStats {
            packets_received: self.counters.packets_received.load(Ordering::Relaxed),
            bytes_received: self.counters.bytes_received.load(Ordering::Relaxed),
        }
    }

    /// Count and fan out one packet. Having no subscribers is not an error.
    pub fn publish(&self, packet: MediaPacket) {
        self.counters.packets_received.fetch_add(1, Ordering::Relaxed);
        self.counters
            .bytes_received
            .fetch_add(packet.payload.len() as u64, Ordering::Relaxed);
        let _ = self.packets.send(packet);
    }
}

/// Lifecycle events of inbound tracks, in the order the connection observed them
#[derive(Debug, Clone)]
pub enum TrackEvent {
    /// A new inbound track belonging to `group`
    Added { group: SessionKey, feed: TrackFeed },
    /// Media started (or resumed) flowing on the track
    Unmuted { track: TrackId },
    /// Media stopped flowing on the track
    Muted { track: TrackId },
    /// The track will produce no more media
    Ended { track: TrackId },
}

impl TrackEvent {
    #[must_use]
    pub fn track_id(&self) -> &TrackId {
        match self {
            Self::Added { feed, .. } => &feed.id,
            Self::Unmuted { track } | Self::Muted { track } | Self::Ended { track } => track,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Added { .. } => "added",
            Self::Unmuted { .. } => "unmuted",
            Self::Muted { .. } => "muted",
            Self::Ended { .. } => "ended",
        }
    }
}

/// Pump packets from `read_packet` into `feed`, deriving mute state.
///
/// A track starts muted. The first packet after silence emits `Unmuted`, no
/// packet for `mute_after` emits `Muted`, and `read_packet` returning `None`
/// emits `Ended` and stops the loop.
pub async fn run_track_reader<F, Fut>(
    feed: TrackFeed,
    mute_after: Duration,
    mut read_packet: F,
    events: mpsc::UnboundedSender<TrackEvent>,
    cancel_token: CancellationToken,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<MediaPacket>>,
{
    let track_id = feed.id.clone();
    let mut muted = true;

    loop {
        let event = tokio::select! {
            () = cancel_token.cancelled() => break,
            result = timeout(mute_after, read_packet()) => match result {
                Ok(Some(packet)) => {
                    feed.publish(packet);
                    if !muted {
                        continue;
                    }
                    muted = false;
                    TrackEvent::Unmuted { track: track_id.clone() }
                }
                Ok(None) => TrackEvent::Ended { track: track_id.clone() },
                Err(_) => {
                    if muted {
                        continue;
                    }
                    muted = true;
                    TrackEvent::Muted { track: track_id.clone() }
                }
            }
        };

        debug!(track_id = %track_id, event = event.name(), "Track state changed");
        let ended = matches!(event, TrackEvent::Ended { .. });
        if events.send(event).is_err() || ended {
            break;
        }
    }

    info!(track_id = %track_id, "Track reader stopped");
}
