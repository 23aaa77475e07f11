//! Media readiness tracking.
//!
//! Reduces a single item's lifecycle signals into the gate the playback clock
//! checks before every tick, plus the item's resolved duration.

use crate::config::PlaybackConfig;
use crate::story::MediaType;

/// Lifecycle signal reported by the host's media element.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaSignal {
    LoadStart,
    CanPlay,
    Playing,
    Waiting,
    Stalled,
    Error(String),
    Metadata { duration_ms: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MediaState {
    Loading,
    Playing,
    Buffering,
    Failed,
}

/// What changed after feeding a signal.
#[derive(Debug, Clone, PartialEq)]
pub enum Readiness {
    Unchanged,
    Ready(bool),
    DurationResolved { duration_ms: u64, late: bool },
    /// The media is broken; playback should move on.
    Skip { reason: String },
}

#[derive(Debug, Clone)]
pub struct ReadinessTracker {
    media_type: MediaType,
    state: MediaState,
    duration_ms: Option<u64>,
    /// Set once the metadata timeout substituted the fallback duration.
    fallback_applied: bool,
    metadata_seen: bool,
    attached: bool,
    /// Bumped whenever a video drops into loading or buffering.
    stall_epoch: u64,
    policy: PlaybackConfig,
}

impl ReadinessTracker {
    pub fn new(media_type: MediaType, policy: PlaybackConfig) -> Self {
        let (state, duration_ms) = if media_type.is_video() {
            (MediaState::Loading, None)
        } else {
            (MediaState::Playing, Some(policy.image_duration_ms))
        };
        Self {
            media_type,
            state,
            duration_ms,
            fallback_applied: false,
            metadata_seen: false,
            attached: true,
            stall_epoch: 0,
            policy,
        }
    }

    /// Whether the clock may advance progress.
    ///
    /// A playing video with no resolved duration yet still holds the gate
    /// closed until metadata or the fallback arrives.
    pub fn ready(&self) -> bool {
        self.attached && self.state == MediaState::Playing && self.duration_ms.is_some()
    }

    pub fn buffering(&self) -> bool {
        self.media_type.is_video()
            && matches!(self.state, MediaState::Loading | MediaState::Buffering)
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.duration_ms
    }

    /// Identifies the current loading or buffering spell.
    pub fn stall_epoch(&self) -> u64 {
        self.stall_epoch
    }

    /// Still stuck in the spell identified by `epoch`.
    pub fn is_stalled(&self, epoch: u64) -> bool {
        self.attached && self.buffering() && epoch == self.stall_epoch
    }

    /// Whether the fallback timer still matters for this item.
    pub fn awaiting_metadata(&self) -> bool {
        self.attached && self.media_type.is_video() && self.duration_ms.is_none()
    }

    /// Stop reacting to signals; late callbacks become no-ops.
    pub fn detach(&mut self) {
        self.attached = false;
    }

    pub fn handle(&mut self, signal: MediaSignal) -> Readiness {
        if !self.attached || self.state == MediaState::Failed {
            return Readiness::Unchanged;
        }

        let was_ready = self.ready();
        let was_buffering = self.buffering();
        match signal {
            MediaSignal::Error(reason) => {
                self.state = MediaState::Failed;
                return Readiness::Skip { reason };
            }
            _ if !self.media_type.is_video() => return Readiness::Unchanged,
            MediaSignal::LoadStart => self.state = MediaState::Loading,
            // Decodable is not the same as advancing; wait for `Playing`.
            MediaSignal::CanPlay => {}
            MediaSignal::Playing => self.state = MediaState::Playing,
            MediaSignal::Waiting | MediaSignal::Stalled => self.state = MediaState::Buffering,
            MediaSignal::Metadata { duration_ms } => return self.resolve_metadata(duration_ms),
        }

        if !was_buffering && self.buffering() {
            self.stall_epoch += 1;
        }

        let is_ready = self.ready();
        if was_ready == is_ready {
            Readiness::Unchanged
        } else {
            Readiness::Ready(is_ready)
        }
    }

    /// The metadata window elapsed. Applies the fallback if nothing arrived.
    pub fn metadata_timeout(&mut self) -> Readiness {
        if !self.awaiting_metadata() {
            return Readiness::Unchanged;
        }
        tracing::debug!(
            "No video metadata after {} ms, assuming {} ms",
            self.policy.metadata_timeout_ms,
            self.policy.video_fallback_ms
        );
        self.duration_ms = Some(self.policy.video_fallback_ms.min(self.policy.video_max_ms));
        self.fallback_applied = true;
        Readiness::DurationResolved {
            duration_ms: self.policy.video_fallback_ms.min(self.policy.video_max_ms),
            late: false,
        }
    }

    /// The stall window for `epoch` elapsed. Gives up on media that never
    /// started or never recovered.
    pub fn stall_timeout(&mut self, epoch: u64) -> Readiness {
        if !self.is_stalled(epoch) {
            return Readiness::Unchanged;
        }
        self.state = MediaState::Failed;
        Readiness::Skip {
            reason: format!("stalled for {} ms", self.policy.stall_timeout_ms),
        }
    }

    fn resolve_metadata(&mut self, duration_ms: f64) -> Readiness {
        if self.metadata_seen || !duration_ms.is_finite() || duration_ms <= 0.0 {
            return Readiness::Unchanged;
        }
        self.metadata_seen = true;

        let capped = (duration_ms.round() as u64).clamp(1, self.policy.video_max_ms);
        let late = self.fallback_applied;
        self.duration_ms = Some(capped);
        Readiness::DurationResolved {
            duration_ms: capped,
            late,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video() -> ReadinessTracker {
        ReadinessTracker::new(MediaType::Video, PlaybackConfig::default())
    }

    #[test]
    fn image_is_ready_with_fixed_window() {
        let tracker = ReadinessTracker::new(MediaType::Image, PlaybackConfig::default());
        assert!(tracker.ready());
        assert!(!tracker.buffering());
        assert_eq!(tracker.duration_ms(), Some(5_000));
    }

    #[test]
    fn text_uses_the_same_window() {
        let tracker = ReadinessTracker::new(MediaType::Text, PlaybackConfig::default());
        assert_eq!(tracker.duration_ms(), Some(5_000));
    }

    #[test]
    fn video_needs_playing_not_can_play() {
        let mut tracker = video();
        tracker.handle(MediaSignal::Metadata { duration_ms: 12_000.0 });
        assert_eq!(tracker.handle(MediaSignal::CanPlay), Readiness::Unchanged);
        assert!(!tracker.ready());

        assert_eq!(tracker.handle(MediaSignal::Playing), Readiness::Ready(true));
        assert_eq!(tracker.handle(MediaSignal::Waiting), Readiness::Ready(false));
        assert!(tracker.buffering());
        assert_eq!(tracker.handle(MediaSignal::Playing), Readiness::Ready(true));
        assert_eq!(tracker.handle(MediaSignal::Stalled), Readiness::Ready(false));
    }

    #[test]
    fn long_video_is_capped() {
        let mut tracker = video();
        let outcome = tracker.handle(MediaSignal::Metadata { duration_ms: 80_000.0 });
        assert_eq!(
            outcome,
            Readiness::DurationResolved {
                duration_ms: 59_000,
                late: false
            }
        );
    }

    #[test]
    fn missing_metadata_falls_back() {
        let mut tracker = video();
        tracker.handle(MediaSignal::Playing);
        assert!(!tracker.ready());

        tracker.metadata_timeout();
        assert_eq!(tracker.duration_ms(), Some(10_000));
        assert!(tracker.ready());

        // Second timeout is stale.
        assert_eq!(tracker.metadata_timeout(), Readiness::Unchanged);
    }

    #[test]
    fn late_metadata_replaces_fallback() {
        let mut tracker = video();
        tracker.metadata_timeout();
        let outcome = tracker.handle(MediaSignal::Metadata { duration_ms: 4_000.0 });
        assert_eq!(
            outcome,
            Readiness::DurationResolved {
                duration_ms: 4_000,
                late: true
            }
        );
        // Only the first metadata counts.
        assert_eq!(
            tracker.handle(MediaSignal::Metadata { duration_ms: 9_000.0 }),
            Readiness::Unchanged
        );
    }

    #[test]
    fn unusable_metadata_is_ignored() {
        let mut tracker = video();
        assert_eq!(
            tracker.handle(MediaSignal::Metadata { duration_ms: f64::NAN }),
            Readiness::Unchanged
        );
        assert_eq!(
            tracker.handle(MediaSignal::Metadata { duration_ms: 0.0 }),
            Readiness::Unchanged
        );
        assert!(tracker.awaiting_metadata());
    }

    #[test]
    fn error_requests_skip_once() {
        let mut tracker = video();
        assert!(matches!(
            tracker.handle(MediaSignal::Error("404".into())),
            Readiness::Skip { .. }
        ));
        assert_eq!(tracker.handle(MediaSignal::Error("again".into())), Readiness::Unchanged);
        assert!(!tracker.ready());
    }

    #[test]
    fn stall_outlasting_window_skips() {
        let mut tracker = video();
        tracker.handle(MediaSignal::Playing);
        tracker.metadata_timeout();
        let before = tracker.stall_epoch();

        tracker.handle(MediaSignal::Waiting);
        let epoch = tracker.stall_epoch();
        assert_ne!(epoch, before);
        assert!(matches!(tracker.stall_timeout(epoch), Readiness::Skip { .. }));
        assert!(!tracker.ready());
    }

    #[test]
    fn recovered_or_restalled_video_ignores_old_window() {
        let mut tracker = video();
        let loading = tracker.stall_epoch();
        tracker.handle(MediaSignal::Playing);
        assert_eq!(tracker.stall_timeout(loading), Readiness::Unchanged);

        tracker.handle(MediaSignal::Stalled);
        let first = tracker.stall_epoch();
        tracker.handle(MediaSignal::Playing);
        tracker.handle(MediaSignal::Waiting);
        assert_eq!(tracker.stall_timeout(first), Readiness::Unchanged);
        assert!(tracker.is_stalled(tracker.stall_epoch()));
    }

    #[test]
    fn images_never_stall() {
        let mut tracker = ReadinessTracker::new(MediaType::Image, PlaybackConfig::default());
        assert_eq!(tracker.stall_timeout(tracker.stall_epoch()), Readiness::Unchanged);
    }

    #[test]
    fn detached_tracker_ignores_signals() {
        let mut tracker = video();
        tracker.detach();
        assert_eq!(tracker.handle(MediaSignal::Playing), Readiness::Unchanged);
        assert_eq!(tracker.metadata_timeout(), Readiness::Unchanged);
    }
}
