//! `EasyStreamer` stream subscription manager
//!
//! Keeps a receive-only WebRTC connection subscribed to exactly the streams a
//! user has selected, and tells the caller which inbound media is live.
//!
//! ## Architecture
//!
//! - **`SelectionSet`**: ordered set of selected stream ids
//! - **`TransceiverAllocator`**: one live receive-only transceiver per selected id
//! - **`NegotiationDriver`**: offer/answer rounds with dirty-flag coalescing
//! - **`TrackDemuxer`**: mute/unmute-driven publication of live media handles
//! - **`StreamManager`**: owns all of the above on a single event loop task
//! - **`WebRtcConnection`**: the production [`MediaConnection`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! use easystreamer_rtc::{StreamManager, WebRtcConnection};
//!
//! let connection = Arc::new(WebRtcConnection::new(&config.webrtc).await?);
//! let manager = StreamManager::start(connection, Arc::new(api_client), ClientId::generate())?;
//! manager.add("cam1");
//! let mut live = manager.subscribe_live();
//! ```

mod allocator;
mod connection;
mod demux;
mod error;
mod manager;
pub mod mock;
mod negotiation;
mod peer;
mod selection;
mod track;
mod types;

pub use allocator::TransceiverAllocator;
pub use connection::{MediaConnection, Transceiver};
pub use demux::{LiveHandles, LiveMediaHandle, MediaGroup, TrackDemuxer};
pub use error::{Result, RtcError};
pub use manager::StreamManager;
pub use negotiation::{NegotiationDriver, NegotiationPhase, NegotiationStatus};
pub use peer::WebRtcConnection;
pub use selection::SelectionSet;
pub use track::{run_track_reader, MediaPacket, TrackEvent, TrackFeed, TrackKind, TrackStats};
pub use types::{SessionKey, TrackId};
