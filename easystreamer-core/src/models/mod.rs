pub mod signal;
pub mod stats;
pub mod stream;

pub use signal::{ResyncRequest, SdpType, SessionDescription, SignalRequest};
pub use stats::{format_bytes, StatsSnapshot, SystemStatus, UNKNOWN_PLACEHOLDER};
pub use stream::{Codec, StreamDefinition, StreamId, TrackDefinition};
