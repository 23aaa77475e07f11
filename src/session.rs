//! Session controller.
//!
//! The top-level state machine of one open viewer. Owns the current position,
//! pause and overlay state, and composes the clock, readiness tracker,
//! preloader, recorder and gesture controller. It is the only component that
//! ends a session; every other component reports upward through return values.

use crate::clock::{ClockHandle, PlaybackClock, Tick};
use crate::config::ViewerConfig;
use crate::effect::{Effect, ItemToken, Notice, ServiceCall};
use crate::error::EngineError;
use crate::gesture::{Boundaries, GestureController, Intent, Key, Point, Release};
use crate::preload::Preloader;
use crate::readiness::{MediaSignal, Readiness, ReadinessTracker};
use crate::recorder::Recorder;
use crate::service::UnseenReactions;
use crate::story::{StoryCollection, StoryItem};
use rand::rngs::StdRng;
use std::time::Duration;

/// Dialogs that can sit on top of playback. All of them hold the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayKind {
    ViewerList,
    Analytics,
    HighlightPicker,
    DeleteConfirm,
    ReactorList,
}

#[derive(Debug, Clone, Copy)]
struct Overlay {
    kind: OverlayKind,
    /// Pause state to restore when the overlay closes.
    resume_paused: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Open {
        collection_index: usize,
        item_index: usize,
    },
    Closed,
}

/// Render snapshot of an open session.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewSession {
    pub collection_index: usize,
    pub item_index: usize,
    pub item_id: String,
    pub item_token: ItemToken,
    pub progress: f64,
    pub paused: bool,
    pub buffering: bool,
    pub resolved_duration_ms: Option<u64>,
    pub swipe_offset_px: f32,
    pub overlay: Option<OverlayKind>,
    pub delete_pending: bool,
    /// `has_unviewed` per collection.
    pub unviewed: Vec<bool>,
}

pub struct Session {
    collections: Vec<StoryCollection>,
    phase: Phase,
    paused: bool,
    overlay: Option<Overlay>,
    pending_delete: Option<String>,
    clock: PlaybackClock,
    tick_interval: Duration,
    metadata_timeout: Duration,
    stall_timeout: Duration,
    tracker: ReadinessTracker,
    token: ItemToken,
    preloader: Preloader,
    recorder: Recorder,
    gesture: GestureController,
    config: ViewerConfig,
}

impl Session {
    /// Open a viewer on `collections`, starting at the first item of
    /// `start_index`. Empty collections are dropped first.
    pub fn open(
        collections: Vec<StoryCollection>,
        start_index: usize,
        viewer_id: &str,
        config: &ViewerConfig,
    ) -> Result<(Self, Vec<Effect>), EngineError> {
        let recorder = Recorder::new(viewer_id, config.reactions);
        Self::open_with_recorder(collections, start_index, recorder, config)
    }

    /// Like [`Session::open`] with a fixed random source for bursts.
    pub fn open_with_rng(
        collections: Vec<StoryCollection>,
        start_index: usize,
        viewer_id: &str,
        config: &ViewerConfig,
        rng: StdRng,
    ) -> Result<(Self, Vec<Effect>), EngineError> {
        let recorder = Recorder::with_rng(viewer_id, config.reactions, rng);
        Self::open_with_recorder(collections, start_index, recorder, config)
    }

    fn open_with_recorder(
        collections: Vec<StoryCollection>,
        start_index: usize,
        recorder: Recorder,
        config: &ViewerConfig,
    ) -> Result<(Self, Vec<Effect>), EngineError> {
        // Keep the caller's start collection addressable after dropping empties.
        let nonempty_before = collections
            .iter()
            .take(start_index)
            .filter(|c| !c.is_empty())
            .count();
        let collections: Vec<StoryCollection> =
            collections.into_iter().filter(|c| !c.is_empty()).collect();
        if collections.is_empty() {
            return Err(EngineError::NothingToShow);
        }
        let start = nonempty_before.min(collections.len() - 1);

        let first_type = collections[start].items[0].media_type;
        let mut session = Self {
            phase: Phase::Closed,
            paused: false,
            overlay: None,
            pending_delete: None,
            clock: PlaybackClock::new(config.playback.tick_interval_ms),
            tick_interval: config.playback.tick_interval(),
            metadata_timeout: config.playback.metadata_timeout(),
            stall_timeout: config.playback.stall_timeout(),
            tracker: ReadinessTracker::new(first_type, config.playback),
            token: ItemToken::default(),
            preloader: Preloader::new(),
            recorder,
            gesture: GestureController::new(config.gesture, 0.0),
            config: config.clone(),
            collections,
        };
        tracing::info!(
            "Opening story viewer on collection {} of {}",
            start + 1,
            session.collections.len()
        );
        let effects = session.enter(start, 0);
        Ok((session, effects))
    }

    pub fn is_closed(&self) -> bool {
        self.phase == Phase::Closed
    }

    pub fn position(&self) -> Option<(usize, usize)> {
        match self.phase {
            Phase::Open {
                collection_index,
                item_index,
            } => Some((collection_index, item_index)),
            Phase::Closed => None,
        }
    }

    pub fn current_item(&self) -> Option<&StoryItem> {
        let (ci, ii) = self.position()?;
        self.collections.get(ci)?.items.get(ii)
    }

    pub fn collections(&self) -> &[StoryCollection] {
        &self.collections
    }

    pub fn viewer_id(&self) -> &str {
        self.recorder.viewer_id()
    }

    pub fn active_clocks(&self) -> usize {
        self.clock.active_handles()
    }

    pub fn clock_handle(&self) -> Option<ClockHandle> {
        self.clock.handle()
    }

    pub fn item_token(&self) -> ItemToken {
        self.token
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn snapshot(&self) -> Option<ViewSession> {
        let (collection_index, item_index) = self.position()?;
        let item = self.current_item()?;
        Some(ViewSession {
            collection_index,
            item_index,
            item_id: item.id.clone(),
            item_token: self.token,
            progress: self.clock.progress(),
            paused: self.paused,
            buffering: self.tracker.buffering(),
            resolved_duration_ms: self.tracker.duration_ms(),
            swipe_offset_px: self.gesture.offset_px(),
            overlay: self.overlay.map(|o| o.kind),
            delete_pending: self.pending_delete.is_some(),
            unviewed: self.collections.iter().map(StoryCollection::has_unviewed).collect(),
        })
    }

    // --- intents -----------------------------------------------------------

    pub fn pause(&mut self) {
        if self.is_closed() {
            return;
        }
        match &mut self.overlay {
            Some(overlay) => overlay.resume_paused = true,
            None => self.paused = true,
        }
    }

    pub fn resume(&mut self) {
        if self.is_closed() {
            return;
        }
        match &mut self.overlay {
            // Stays held until the overlay closes.
            Some(overlay) => overlay.resume_paused = false,
            None => self.paused = false,
        }
    }

    pub fn toggle_pause(&mut self) {
        let paused = match self.overlay {
            Some(overlay) => overlay.resume_paused,
            None => self.paused,
        };
        if paused {
            self.resume();
        } else {
            self.pause();
        }
    }

    pub fn next(&mut self) -> Vec<Effect> {
        self.navigate(Intent::NextItem)
    }

    pub fn prev(&mut self) -> Vec<Effect> {
        self.navigate(Intent::PrevItem)
    }

    pub fn close(&mut self) -> Vec<Effect> {
        self.close_session("closed by user")
    }

    pub fn react(&mut self, emoji: &str) -> Vec<Effect> {
        let Some(item) = self.current_item().cloned() else {
            return Vec::new();
        };
        self.recorder.react(&item, emoji)
    }

    pub fn tap_reaction_affordance(&mut self) -> Vec<Effect> {
        let Some(item) = self.current_item().cloned() else {
            return Vec::new();
        };
        self.recorder.tap_affordance(&item)
    }

    pub fn open_overlay(&mut self, kind: OverlayKind) {
        if self.is_closed() {
            return;
        }
        let resume_paused = match self.overlay {
            Some(existing) => existing.resume_paused,
            None => self.paused,
        };
        self.overlay = Some(Overlay {
            kind,
            resume_paused,
        });
        self.paused = true;
    }

    pub fn close_overlay(&mut self) {
        if self.pending_delete.is_some() {
            // The confirm dialog stays until the service answers.
            return;
        }
        if let Some(overlay) = self.overlay.take() {
            self.paused = overlay.resume_paused;
        }
    }

    pub fn overlay(&self) -> Option<OverlayKind> {
        self.overlay.map(|o| o.kind)
    }

    /// Ask the author to confirm deleting the current item.
    pub fn request_delete(&mut self) {
        if self.current_is_own() && self.pending_delete.is_none() {
            self.open_overlay(OverlayKind::DeleteConfirm);
        }
    }

    pub fn confirm_delete(&mut self) -> Vec<Effect> {
        if self.overlay() != Some(OverlayKind::DeleteConfirm)
            || self.pending_delete.is_some()
            || !self.current_is_own()
        {
            return Vec::new();
        }
        let Some(item_id) = self.current_item().map(|item| item.id.clone()) else {
            return Vec::new();
        };
        tracing::debug!("Requesting deletion of {}", item_id);
        self.pending_delete = Some(item_id.clone());
        vec![Effect::Call(ServiceCall::DeleteItem { item_id })]
    }

    /// The service answered a delete. `Err` carries the rejection message.
    pub fn delete_finished(&mut self, item_id: &str, outcome: Result<(), String>) -> Vec<Effect> {
        if self.pending_delete.as_deref() != Some(item_id) {
            return Vec::new();
        }
        self.pending_delete = None;
        self.close_overlay();
        match outcome {
            Ok(()) => self.remove_item(item_id),
            Err(message) => {
                tracing::warn!("Delete of {} rejected: {}", item_id, message);
                vec![Effect::Notify(Notice::error(format!(
                    "Could not delete story: {message}"
                )))]
            }
        }
    }

    pub fn report(&mut self, reason: &str) -> Vec<Effect> {
        let Some(item) = self.current_item() else {
            return Vec::new();
        };
        if item.is_authored_by(self.recorder.viewer_id()) {
            return Vec::new();
        }
        vec![Effect::Call(ServiceCall::ReportItem {
            item_id: item.id.clone(),
            reason: reason.to_string(),
        })]
    }

    pub fn report_finished(&mut self, item_id: &str, outcome: Result<(), String>) -> Vec<Effect> {
        if self.is_closed() {
            return Vec::new();
        }
        match outcome {
            Ok(()) => vec![Effect::Notify(Notice::info("Story reported"))],
            Err(message) => {
                tracing::warn!("Report of {} failed: {}", item_id, message);
                vec![Effect::Notify(Notice::error(format!(
                    "Could not report story: {message}"
                )))]
            }
        }
    }

    // --- raw input ---------------------------------------------------------

    pub fn set_viewport_width(&mut self, width: f32) {
        self.gesture.set_viewport_width(width);
    }

    pub fn key(&mut self, key: Key) -> Vec<Effect> {
        if key == Key::Escape && self.overlay.is_some() {
            self.close_overlay();
            return Vec::new();
        }
        match self.gesture.key(key) {
            Some(intent) => self.apply_intent(intent),
            None => Vec::new(),
        }
    }

    pub fn tap(&mut self, x: f32) -> Vec<Effect> {
        match self.gesture.tap(x) {
            Some(intent) => self.apply_intent(intent),
            None => Vec::new(),
        }
    }

    pub fn pointer_down(&mut self, point: Point, now_ms: u64) {
        if !self.is_closed() && self.overlay.is_none() {
            self.gesture.pointer_down(point, now_ms);
        }
    }

    pub fn pointer_move(&mut self, point: Point) -> f32 {
        let bounds = self.boundaries();
        self.gesture.pointer_move(point, bounds)
    }

    pub fn pointer_up(&mut self, point: Point, now_ms: u64) -> Vec<Effect> {
        match self.gesture.pointer_up(point, now_ms) {
            Release::Navigate(intent) | Release::Tap(Some(intent)) => self.apply_intent(intent),
            Release::SnapBack | Release::Tap(None) => Vec::new(),
        }
    }

    // --- events ------------------------------------------------------------

    /// One interval tick from the clock identified by `handle`.
    pub fn tick(&mut self, handle: ClockHandle) -> Vec<Effect> {
        if self.is_closed() {
            return Vec::new();
        }
        let gate_open = !self.paused && self.tracker.ready();
        let duration_ms = self.tracker.duration_ms().unwrap_or(0);
        match self.clock.tick(handle, gate_open, duration_ms) {
            Ok(Tick::Completed) => {
                tracing::debug!("Auto-advancing past {}", self.current_id());
                self.advance()
            }
            Ok(Tick::Stale | Tick::Held | Tick::Advanced { .. }) => Vec::new(),
            Err(err) => {
                tracing::warn!("Clock fault on {}: {}, skipping", self.current_id(), err);
                self.advance()
            }
        }
    }

    pub fn media_signal(&mut self, token: ItemToken, signal: MediaSignal) -> Vec<Effect> {
        if self.is_closed() || token != self.token {
            return Vec::new();
        }
        let before = self.tracker.duration_ms();
        let epoch = self.tracker.stall_epoch();
        let outcome = self.tracker.handle(signal);
        let mut effects = Vec::new();
        if self.tracker.stall_epoch() != epoch {
            effects.push(self.stall_watch());
        }
        match outcome {
            Readiness::Skip { reason } => {
                tracing::warn!("Media for {} failed ({}), skipping", self.current_id(), reason);
                return self.advance();
            }
            Readiness::DurationResolved { duration_ms, late } => {
                if let (true, Some(fallback)) = (late, before) {
                    tracing::debug!(
                        "Late metadata for {}: {} ms replaces {} ms",
                        self.current_id(),
                        duration_ms,
                        fallback
                    );
                    self.clock.rescale(fallback, duration_ms);
                }
            }
            Readiness::Ready(ready) => {
                tracing::debug!("Media for {} ready: {}", self.current_id(), ready);
            }
            Readiness::Unchanged => {}
        }
        effects
    }

    pub fn metadata_timeout(&mut self, token: ItemToken) -> Vec<Effect> {
        if !self.is_closed() && token == self.token {
            self.tracker.metadata_timeout();
        }
        Vec::new()
    }

    /// The stall window armed for `epoch` elapsed.
    pub fn stall_timeout(&mut self, token: ItemToken, epoch: u64) -> Vec<Effect> {
        if self.is_closed() || token != self.token || !self.tracker.is_stalled(epoch) {
            return Vec::new();
        }
        if self.paused {
            // Held by the viewer; give the media another full window.
            return vec![self.stall_watch()];
        }
        match self.tracker.stall_timeout(epoch) {
            Readiness::Skip { reason } => {
                tracing::warn!("Media for {} {}, skipping", self.current_id(), reason);
                self.advance()
            }
            _ => Vec::new(),
        }
    }

    pub fn unseen_reactions(&mut self, item_id: &str, unseen: UnseenReactions) -> Vec<Effect> {
        match self.current_item().cloned() {
            Some(item) if item.id == item_id => self.recorder.on_unseen_reactions(&item, unseen),
            _ => Vec::new(),
        }
    }

    pub fn preload_settled(&mut self, item_id: &str) {
        self.preloader.settle(item_id);
    }

    /// An item vanished on the server (deleted here or elsewhere).
    pub fn item_deleted(&mut self, item_id: &str) -> Vec<Effect> {
        if self.pending_delete.as_deref() == Some(item_id) {
            return self.delete_finished(item_id, Ok(()));
        }
        self.remove_item(item_id)
    }

    // --- internals ---------------------------------------------------------

    fn current_id(&self) -> &str {
        self.current_item().map(|item| item.id.as_str()).unwrap_or("-")
    }

    fn stall_watch(&self) -> Effect {
        Effect::ArmStallTimeout {
            token: self.token,
            epoch: self.tracker.stall_epoch(),
            after: self.stall_timeout,
        }
    }

    /// Preload hint for whatever now follows the current item.
    fn retarget_preload(&mut self) -> Option<Effect> {
        let next = self
            .peek_next()
            .map(|(nci, nii)| &self.collections[nci].items[nii]);
        self.preloader.target(next).map(Effect::Preload)
    }

    fn current_is_own(&self) -> bool {
        self.current_item()
            .is_some_and(|item| item.is_authored_by(self.recorder.viewer_id()))
    }

    fn apply_intent(&mut self, intent: Intent) -> Vec<Effect> {
        match intent {
            Intent::TogglePause => {
                self.toggle_pause();
                Vec::new()
            }
            Intent::CloseViewer => self.close(),
            Intent::NextItem | Intent::PrevItem => self.navigate(intent),
        }
    }

    fn navigate(&mut self, intent: Intent) -> Vec<Effect> {
        if self.overlay.is_some() {
            tracing::debug!("Ignoring {:?} while an overlay is open", intent);
            return Vec::new();
        }
        match intent {
            Intent::NextItem => self.advance(),
            Intent::PrevItem => self.retreat(),
            _ => Vec::new(),
        }
    }

    fn peek_next(&self) -> Option<(usize, usize)> {
        let (ci, ii) = self.position()?;
        if ii + 1 < self.collections[ci].len() {
            Some((ci, ii + 1))
        } else if ci + 1 < self.collections.len() {
            Some((ci + 1, 0))
        } else {
            None
        }
    }

    fn peek_prev(&self) -> Option<(usize, usize)> {
        let (ci, ii) = self.position()?;
        if ii > 0 {
            Some((ci, ii - 1))
        } else if ci > 0 {
            Some((ci - 1, self.collections[ci - 1].len() - 1))
        } else {
            None
        }
    }

    fn boundaries(&self) -> Boundaries {
        Boundaries {
            has_prev: self.peek_prev().is_some(),
            has_next: self.peek_next().is_some(),
        }
    }

    fn advance(&mut self) -> Vec<Effect> {
        if self.is_closed() {
            return Vec::new();
        }
        match self.peek_next() {
            Some((ci, ii)) => self.enter(ci, ii),
            None => self.close_session("reached the end"),
        }
    }

    fn retreat(&mut self) -> Vec<Effect> {
        match self.peek_prev() {
            Some((ci, ii)) => self.enter(ci, ii),
            None => Vec::new(),
        }
    }

    /// Make `(ci, ii)` current: fresh tracker, fresh clock, new preload target.
    fn enter(&mut self, ci: usize, ii: usize) -> Vec<Effect> {
        let mut effects = Vec::new();
        let item = self.collections[ci].items[ii].clone();

        self.tracker.detach();
        self.tracker = ReadinessTracker::new(item.media_type, self.config.playback);
        self.token = ItemToken(self.token.0 + 1);
        self.gesture.cancel();
        self.phase = Phase::Open {
            collection_index: ci,
            item_index: ii,
        };

        let restart = self.clock.restart();
        if let Some(stopped) = restart.stopped {
            effects.push(Effect::StopClock(stopped));
        }
        effects.push(Effect::StartClock {
            handle: restart.started,
            interval: self.tick_interval,
        });
        if self.tracker.awaiting_metadata() {
            effects.push(Effect::ArmMetadataTimeout {
                token: self.token,
                after: self.metadata_timeout,
            });
        }
        if self.tracker.buffering() {
            effects.push(self.stall_watch());
        }

        tracing::debug!(
            "Showing {} ({}) at {}/{}",
            item.id,
            item.media_type.as_str(),
            ci,
            ii
        );

        effects.extend(self.retarget_preload());

        let recorded = self.recorder.on_item_shown(&item);
        if recorded
            .iter()
            .any(|e| matches!(e, Effect::Call(ServiceCall::RecordView { .. })))
        {
            self.collections[ci].mark_viewed(&item.id);
        }
        effects.extend(recorded);
        effects
    }

    fn remove_item(&mut self, item_id: &str) -> Vec<Effect> {
        let Some((cur_ci, cur_ii)) = self.position() else {
            return Vec::new();
        };
        let Some((ci, removed)) = self
            .collections
            .iter_mut()
            .enumerate()
            .find_map(|(ci, c)| c.remove(item_id).map(|idx| (ci, idx)))
        else {
            return Vec::new();
        };
        tracing::info!("Story {} removed", item_id);

        if ci != cur_ci {
            if self.collections[ci].is_empty() {
                self.collections.remove(ci);
                let cur_ci = if ci < cur_ci { cur_ci - 1 } else { cur_ci };
                self.phase = Phase::Open {
                    collection_index: cur_ci,
                    item_index: cur_ii,
                };
            }
            return self.retarget_preload().into_iter().collect();
        }

        let remaining = self.collections[ci].len();
        if remaining == 0 {
            return self.close_session("collection emptied");
        }
        if removed == cur_ii {
            self.enter(ci, cur_ii.min(remaining - 1))
        } else {
            if removed < cur_ii {
                self.phase = Phase::Open {
                    collection_index: ci,
                    item_index: cur_ii - 1,
                };
            }
            self.retarget_preload().into_iter().collect()
        }
    }

    fn close_session(&mut self, reason: &str) -> Vec<Effect> {
        if self.is_closed() {
            return Vec::new();
        }
        tracing::info!("Closing story viewer: {}", reason);

        let mut effects = Vec::new();
        if let Some(handle) = self.clock.stop() {
            effects.push(Effect::StopClock(handle));
        }
        self.tracker.detach();
        self.gesture.cancel();
        effects.extend(
            self.preloader
                .release_all()
                .into_iter()
                .map(|item_id| Effect::CancelPreload { item_id }),
        );
        self.overlay = None;
        self.pending_delete = None;
        self.phase = Phase::Closed;
        effects.push(Effect::Closed);
        effects
    }
}
