//! Inbound track demultiplexer
//!
//! Tracks arrive dark. A group becomes live (gets a [`LiveMediaHandle`]) when
//! any of its tracks unmutes, and goes dark again when its video mutes or
//! ends. Publishing a handle asks the caller to send one resync for the group
//! so the server restarts delivery from a decodable point.

use crate::track::{TrackEvent, TrackFeed, TrackStats};
use crate::types::{SessionKey, TrackId};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::watch;
use tracing::{debug, info};

/// Inbound tracks sharing one group id
#[derive(Debug, Clone, Default)]
pub struct MediaGroup {
    pub tracks: Vec<TrackFeed>,
}

impl MediaGroup {
    pub fn video(&self) -> impl Iterator<Item = &TrackFeed> {
        self.tracks.iter().filter(|t| t.is_video())
    }

    pub fn audio(&self) -> impl Iterator<Item = &TrackFeed> {
        self.tracks.iter().filter(|t| !t.is_video())
    }

    /// Counters summed over every track in the group
    #[must_use]
    pub fn stats(&self) -> TrackStats {
        self.tracks
            .iter()
            .map(TrackFeed::stats)
            .fold(TrackStats::default(), |total, track| TrackStats {
                packets_received: total.packets_received + track.packets_received,
                bytes_received: total.bytes_received + track.bytes_received,
            })
    }
}

/// A group that is currently delivering media and ready to render
#[derive(Debug, Clone)]
pub struct LiveMediaHandle {
    pub session_key: SessionKey,
    pub media: MediaGroup,
}

pub type LiveHandles = BTreeMap<SessionKey, LiveMediaHandle>;

#[derive(Debug)]
pub struct TrackDemuxer {
    groups: HashMap<SessionKey, MediaGroup>,
    track_groups: HashMap<TrackId, SessionKey>,
    live_tx: watch::Sender<LiveHandles>,
}

impl TrackDemuxer {
    #[must_use]
    pub fn new() -> Self {
        let (live_tx, _) = watch::channel(LiveHandles::new());
        Self {
            groups: HashMap::new(),
            track_groups: HashMap::new(),
            live_tx,
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LiveHandles> {
        self.live_tx.subscribe()
    }

    #[must_use]
    pub fn is_live(&self, group: &SessionKey) -> bool {
        self.live_tx.borrow().contains_key(group)
    }

    /// Groups recorded so far, live or dark
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Apply one track event. Returns the group to resync when a handle was
    /// just published.
    pub fn handle_event(&mut self, event: TrackEvent) -> Option<SessionKey> {
        match event {
            TrackEvent::Added { group, feed } => {
                self.on_added(group, feed);
                None
            }
            TrackEvent::Unmuted { track } => self.on_unmuted(&track),
            TrackEvent::Muted { track } => {
                self.on_muted(&track);
                None
            }
            TrackEvent::Ended { track } => {
                self.on_ended(&track);
                None
            }
        }
    }

    fn on_added(&mut self, group: SessionKey, feed: TrackFeed) {
        if self.track_groups.contains_key(&feed.id) {
            debug!(track_id = %feed.id, "Track already recorded");
            return;
        }
        debug!(
            group = %group,
            track_id = %feed.id,
            kind = ?feed.kind,
            codec = %feed.codec,
            "Inbound track recorded"
        );
        self.track_groups.insert(feed.id.clone(), group.clone());
        self.groups.entry(group.clone()).or_default().tracks.push(feed);
        self.refresh(&group);
    }

    fn on_unmuted(&mut self, track: &TrackId) -> Option<SessionKey> {
        let Some(group) = self.track_groups.get(track).cloned() else {
            debug!(track_id = %track, "Unmute for unknown track");
            return None;
        };
        if self.is_live(&group) {
            return None;
        }
        let media = self.groups.get(&group).cloned().unwrap_or_default();
        info!(group = %group, tracks = media.tracks.len(), "Group is live");
        self.live_tx.send_modify(|live| {
            live.insert(
                group.clone(),
                LiveMediaHandle {
                    session_key: group.clone(),
                    media,
                },
            );
        });
        Some(group)
    }

    fn on_muted(&mut self, track: &TrackId) {
        let Some(group) = self.track_groups.get(track).cloned() else {
            debug!(track_id = %track, "Mute for unknown track");
            return;
        };
        // Audio mutes are ignored
        if self.is_video_track(&group, track) {
            self.unpublish(&group);
        }
    }

    fn on_ended(&mut self, track: &TrackId) {
        let Some(group) = self.track_groups.remove(track) else {
            debug!(track_id = %track, "End of unknown track");
            return;
        };
        let was_video = self.is_video_track(&group, track);

        let now_empty = self.groups.get_mut(&group).map_or(true, |media| {
            media.tracks.retain(|t| &t.id != track);
            media.tracks.is_empty()
        });

        if now_empty {
            self.groups.remove(&group);
            debug!(group = %group, "Group forgotten");
        }
        if was_video || now_empty {
            self.unpublish(&group);
        } else {
            self.refresh(&group);
        }
    }

    fn is_video_track(&self, group: &SessionKey, track: &TrackId) -> bool {
        self.groups
            .get(group)
            .and_then(|media| media.tracks.iter().find(|t| &t.id == track))
            .is_some_and(TrackFeed::is_video)
    }

    fn unpublish(&self, group: &SessionKey) {
        let removed = self
            .live_tx
            .send_if_modified(|live| live.remove(group).is_some());
        if removed {
            let stats = self
                .groups
                .get(group)
                .map(MediaGroup::stats)
                .unwrap_or_default();
            info!(
                group = %group,
                packets = stats.packets_received,
                bytes = stats.bytes_received,
                "Group went dark"
            );
        }
    }

    /// Keep a published handle's track list in step with the group
    fn refresh(&self, group: &SessionKey) {
        let Some(media) = self.groups.get(group) else {
            return;
        };
        self.live_tx.send_if_modified(|live| match live.get_mut(group) {
            Some(handle) => {
                handle.media = media.clone();
                true
            }
            None => false,
        });
    }
}

impl Default for TrackDemuxer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::{MediaPacket, TrackKind};
    use bytes::Bytes;
    use std::time::Instant;

    fn added(group: &str, track: &str, kind: TrackKind) -> TrackEvent {
        TrackEvent::Added {
            group: SessionKey::from(group),
            feed: TrackFeed::new(TrackId::from(track), kind, "video/H264"),
        }
    }

    fn unmuted(track: &str) -> TrackEvent {
        TrackEvent::Unmuted {
            track: TrackId::from(track),
        }
    }

    fn muted(track: &str) -> TrackEvent {
        TrackEvent::Muted {
            track: TrackId::from(track),
        }
    }

    #[test]
    fn test_new_group_starts_dark() {
        let mut demuxer = TrackDemuxer::new();
        assert_eq!(demuxer.handle_event(added("g1", "v1", TrackKind::Video)), None);
        assert_eq!(demuxer.group_count(), 1);
        assert!(demuxer.subscribe().borrow().is_empty());
    }

    #[test]
    fn test_unmute_publishes_once() {
        let mut demuxer = TrackDemuxer::new();
        let live = demuxer.subscribe();
        demuxer.handle_event(added("g1", "v1", TrackKind::Video));
        demuxer.handle_event(added("g1", "a1", TrackKind::Audio));

        assert_eq!(demuxer.handle_event(unmuted("v1")), Some(SessionKey::from("g1")));
        assert_eq!(demuxer.handle_event(unmuted("v1")), None);
        assert_eq!(demuxer.handle_event(unmuted("a1")), None);

        let live = live.borrow();
        let handle = live.get(&SessionKey::from("g1")).unwrap();
        assert_eq!(handle.session_key, SessionKey::from("g1"));
        assert_eq!(handle.media.tracks.len(), 2);
        assert_eq!(handle.media.video().count(), 1);
    }

    #[test]
    fn test_video_mute_unpublishes_and_unmute_republishes() {
        let mut demuxer = TrackDemuxer::new();
        demuxer.handle_event(added("g1", "v1", TrackKind::Video));
        demuxer.handle_event(unmuted("v1"));

        demuxer.handle_event(muted("v1"));
        assert!(!demuxer.is_live(&SessionKey::from("g1")));
        assert_eq!(demuxer.group_count(), 1);

        assert_eq!(demuxer.handle_event(unmuted("v1")), Some(SessionKey::from("g1")));
        assert!(demuxer.is_live(&SessionKey::from("g1")));
    }

    #[test]
    fn test_audio_mute_is_ignored() {
        let mut demuxer = TrackDemuxer::new();
        demuxer.handle_event(added("g1", "v1", TrackKind::Video));
        demuxer.handle_event(added("g1", "a1", TrackKind::Audio));
        demuxer.handle_event(unmuted("a1"));

        demuxer.handle_event(muted("a1"));
        assert!(demuxer.is_live(&SessionKey::from("g1")));
    }

    #[test]
    fn test_unknown_tracks_are_ignored() {
        let mut demuxer = TrackDemuxer::new();
        assert_eq!(demuxer.handle_event(unmuted("ghost")), None);
        demuxer.handle_event(muted("ghost"));
        demuxer.handle_event(TrackEvent::Ended {
            track: TrackId::from("ghost"),
        });
        assert_eq!(demuxer.group_count(), 0);
    }

    #[test]
    fn test_ended_tracks_are_forgotten() {
        let mut demuxer = TrackDemuxer::new();
        demuxer.handle_event(added("g1", "v1", TrackKind::Video));
        demuxer.handle_event(added("g1", "a1", TrackKind::Audio));
        demuxer.handle_event(unmuted("a1"));

        // Audio ending keeps the group live with one fewer track
        demuxer.handle_event(TrackEvent::Ended {
            track: TrackId::from("a1"),
        });
        {
            let live = demuxer.subscribe();
            let live = live.borrow();
            assert_eq!(live[&SessionKey::from("g1")].media.tracks.len(), 1);
        }

        demuxer.handle_event(TrackEvent::Ended {
            track: TrackId::from("v1"),
        });
        assert!(!demuxer.is_live(&SessionKey::from("g1")));
        assert_eq!(demuxer.group_count(), 0);
    }

    #[test]
    fn test_group_stats_sum_tracks() {
        let video = TrackFeed::new(TrackId::from("v1"), TrackKind::Video, "video/H264");
        let audio = TrackFeed::new(TrackId::from("a1"), TrackKind::Audio, "audio/opus");
        for (feed, len) in [(&video, 1200), (&video, 800), (&audio, 160)] {
            feed.publish(MediaPacket {
                payload: Bytes::from(vec![0_u8; len]),
                ssrc: 1,
                sequence_number: 0,
                timestamp: 0,
                payload_type: 96,
                marker: false,
                received_at: Instant::now(),
            });
        }

        let group = MediaGroup {
            tracks: vec![video, audio],
        };
        assert_eq!(group.audio().count(), 1);
        assert_eq!(
            group.stats(),
            TrackStats {
                packets_received: 3,
                bytes_received: 2160,
            }
        );
    }
}
