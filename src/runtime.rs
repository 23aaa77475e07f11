//! Tokio driver for a [`Session`].
//!
//! Owns the real timers and carries out the effects the session returns. All
//! session mutation happens on the driver task; interval ticks, timeouts and
//! service answers come back to it as messages, so nothing can touch a session
//! after it closed.

use crate::burst::Burst;
use crate::clock::ClockHandle;
use crate::effect::{Effect, ItemToken, Notice, ServiceCall};
use crate::gesture::{Key, Point};
use crate::preload::{MediaWarmer, PreloadHint};
use crate::readiness::MediaSignal;
use crate::service::{StoryService, UnseenReactions};
use crate::session::{OverlayKind, Session, ViewSession};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Input from the host UI.
#[derive(Debug, Clone)]
pub enum Command {
    Key(Key),
    Tap { x: f32 },
    PointerDown { point: Point, now_ms: u64 },
    PointerMove(Point),
    PointerUp { point: Point, now_ms: u64 },
    ViewportWidth(f32),
    Pause,
    Resume,
    Next,
    Prev,
    Close,
    React(String),
    TapReaction,
    OpenOverlay(OverlayKind),
    CloseOverlay,
    RequestDelete,
    ConfirmDelete,
    Report(String),
    Media { token: ItemToken, signal: MediaSignal },
    /// The item disappeared server-side.
    ItemDeleted(String),
}

/// Output for the host UI besides the snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    Burst(Burst),
    Notice(Notice),
    Closed,
}

#[derive(Debug)]
enum Internal {
    Tick(ClockHandle),
    MetadataTimeout(ItemToken),
    StallTimeout { token: ItemToken, epoch: u64 },
    Unseen {
        item_id: String,
        unseen: UnseenReactions,
    },
    DeleteFinished {
        item_id: String,
        outcome: Result<(), String>,
    },
    ReportFinished {
        item_id: String,
        outcome: Result<(), String>,
    },
    PreloadSettled(String),
}

/// Collaborators the driver calls out to.
#[derive(Clone)]
pub struct Services {
    pub story: Arc<dyn StoryService>,
    pub warmer: Arc<dyn MediaWarmer>,
}

/// Host-side handle to a running session.
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<Option<ViewSession>>,
    events: mpsc::Receiver<HostEvent>,
    active_intervals: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub async fn send(&self, command: Command) -> bool {
        self.commands.send(command).await.is_ok()
    }

    pub fn commands(&self) -> mpsc::Sender<Command> {
        self.commands.clone()
    }

    /// Latest snapshot; `None` once the session closed.
    pub fn snapshot(&self) -> Option<ViewSession> {
        self.snapshots.borrow().clone()
    }

    pub fn watch_snapshots(&self) -> watch::Receiver<Option<ViewSession>> {
        self.snapshots.clone()
    }

    pub async fn next_event(&mut self) -> Option<HostEvent> {
        self.events.recv().await
    }

    pub fn try_next_event(&mut self) -> Option<HostEvent> {
        self.events.try_recv().ok()
    }

    /// Tick intervals currently running for this session.
    pub fn active_intervals(&self) -> usize {
        self.active_intervals.load(Ordering::SeqCst)
    }

    /// Wait for the driver to finish tearing down.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::error!("Session driver failed: {}", e);
        }
    }
}

/// Spawn the driver for an opened session.
pub fn spawn_session(session: Session, opening: Vec<Effect>, services: Services) -> SessionHandle {
    let (command_tx, command_rx) = mpsc::channel(64);
    let (internal_tx, internal_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::channel(100);
    let (snapshot_tx, snapshot_rx) = watch::channel(session.snapshot());
    let active_intervals = Arc::new(AtomicUsize::new(0));

    let driver = Driver {
        viewer_id: session.viewer_id().to_string(),
        session,
        services,
        internal_tx,
        event_tx,
        snapshot_tx,
        clocks: HashMap::new(),
        timers: Vec::new(),
        preloads: HashMap::new(),
        active_intervals: active_intervals.clone(),
    };
    let task = tokio::spawn(driver.run(command_rx, internal_rx, opening));

    SessionHandle {
        commands: command_tx,
        snapshots: snapshot_rx,
        events: event_rx,
        active_intervals,
        task,
    }
}

struct Driver {
    session: Session,
    viewer_id: String,
    services: Services,
    internal_tx: mpsc::UnboundedSender<Internal>,
    event_tx: mpsc::Sender<HostEvent>,
    snapshot_tx: watch::Sender<Option<ViewSession>>,
    clocks: HashMap<ClockHandle, JoinHandle<()>>,
    timers: Vec<JoinHandle<()>>,
    preloads: HashMap<String, JoinHandle<()>>,
    active_intervals: Arc<AtomicUsize>,
}

impl Driver {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
        opening: Vec<Effect>,
    ) {
        self.apply(opening);
        self.publish();

        while !self.session.is_closed() {
            let effects = tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => {
                        tracing::debug!("Host dropped the session handle");
                        self.session.close()
                    }
                },
                Some(event) = internal.recv() => self.on_internal(event),
            };
            self.apply(effects);
            self.publish();
        }

        self.shutdown();
        // Awaited so a host that fell behind on events still sees the close.
        if self.event_tx.send(HostEvent::Closed).await.is_err() {
            tracing::debug!("Host stopped listening before close");
        }
    }

    fn on_command(&mut self, command: Command) -> Vec<Effect> {
        let session = &mut self.session;
        match command {
            Command::Key(key) => session.key(key),
            Command::Tap { x } => session.tap(x),
            Command::PointerDown { point, now_ms } => {
                session.pointer_down(point, now_ms);
                Vec::new()
            }
            Command::PointerMove(point) => {
                session.pointer_move(point);
                Vec::new()
            }
            Command::PointerUp { point, now_ms } => session.pointer_up(point, now_ms),
            Command::ViewportWidth(width) => {
                session.set_viewport_width(width);
                Vec::new()
            }
            Command::Pause => {
                session.pause();
                Vec::new()
            }
            Command::Resume => {
                session.resume();
                Vec::new()
            }
            Command::Next => session.next(),
            Command::Prev => session.prev(),
            Command::Close => session.close(),
            Command::React(emoji) => session.react(&emoji),
            Command::TapReaction => session.tap_reaction_affordance(),
            Command::OpenOverlay(kind) => {
                session.open_overlay(kind);
                Vec::new()
            }
            Command::CloseOverlay => {
                session.close_overlay();
                Vec::new()
            }
            Command::RequestDelete => {
                session.request_delete();
                Vec::new()
            }
            Command::ConfirmDelete => session.confirm_delete(),
            Command::Report(reason) => session.report(&reason),
            Command::Media { token, signal } => session.media_signal(token, signal),
            Command::ItemDeleted(item_id) => session.item_deleted(&item_id),
        }
    }

    fn on_internal(&mut self, event: Internal) -> Vec<Effect> {
        match event {
            Internal::Tick(handle) => self.session.tick(handle),
            Internal::MetadataTimeout(token) => self.session.metadata_timeout(token),
            Internal::StallTimeout { token, epoch } => self.session.stall_timeout(token, epoch),
            Internal::Unseen { item_id, unseen } => self.session.unseen_reactions(&item_id, unseen),
            Internal::DeleteFinished { item_id, outcome } => {
                self.session.delete_finished(&item_id, outcome)
            }
            Internal::ReportFinished { item_id, outcome } => {
                self.session.report_finished(&item_id, outcome)
            }
            Internal::PreloadSettled(item_id) => {
                self.preloads.remove(&item_id);
                self.session.preload_settled(&item_id);
                Vec::new()
            }
        }
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::StartClock { handle, interval } => self.start_clock(handle, interval),
                Effect::StopClock(handle) => self.stop_clock(handle),
                Effect::ArmMetadataTimeout { token, after } => {
                    self.arm_timer(after, Internal::MetadataTimeout(token))
                }
                Effect::ArmStallTimeout { token, epoch, after } => {
                    self.arm_timer(after, Internal::StallTimeout { token, epoch })
                }
                Effect::Preload(hint) => self.preload(hint),
                Effect::CancelPreload { item_id } => {
                    if let Some(task) = self.preloads.remove(&item_id) {
                        tracing::debug!("Cancelling preload of {}", item_id);
                        task.abort();
                    }
                }
                Effect::Call(call) => self.dispatch(call),
                Effect::Burst(burst) => self.emit(HostEvent::Burst(burst)),
                Effect::Notify(notice) => self.emit(HostEvent::Notice(notice)),
                // Reported by `run` once teardown is done.
                Effect::Closed => {}
            }
        }
    }

    fn start_clock(&mut self, handle: ClockHandle, period: Duration) {
        // The session always stops the old interval first.
        debug_assert!(self.clocks.is_empty(), "clock started while another is alive");

        let tx = self.internal_tx.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if tx.send(Internal::Tick(handle)).is_err() {
                    break;
                }
            }
        });
        self.clocks.insert(handle, task);
        self.active_intervals.store(self.clocks.len(), Ordering::SeqCst);
    }

    fn stop_clock(&mut self, handle: ClockHandle) {
        if let Some(task) = self.clocks.remove(&handle) {
            task.abort();
        }
        self.active_intervals.store(self.clocks.len(), Ordering::SeqCst);
    }

    fn arm_timer(&mut self, after: Duration, message: Internal) {
        self.timers.retain(|timer| !timer.is_finished());
        let tx = self.internal_tx.clone();
        self.timers.push(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(message);
        }));
    }

    fn preload(&mut self, hint: PreloadHint) {
        let warmer = self.services.warmer.clone();
        let tx = self.internal_tx.clone();
        let item_id = hint.item_id.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = warmer.warm(&hint.media_ref).await {
                tracing::warn!("Failed to preload {}: {}", hint.item_id, e);
            }
            let _ = tx.send(Internal::PreloadSettled(hint.item_id));
        });
        self.preloads.insert(item_id, task);
    }

    /// Fire-and-forget service call. Answers that matter come back as
    /// messages and are dropped if the session is gone by then.
    fn dispatch(&self, call: ServiceCall) {
        let story = self.services.story.clone();
        let viewer_id = self.viewer_id.clone();
        let tx = self.internal_tx.clone();

        tokio::spawn(async move {
            match call {
                ServiceCall::RecordView { item_id, author_id } => {
                    if let Err(e) = story.record_view(&item_id, &viewer_id, &author_id).await {
                        tracing::warn!("Failed to record view of {}: {}", item_id, e);
                    }
                }
                ServiceCall::SubmitReaction { item_id, emoji } => {
                    if let Err(e) = story.submit_reaction(&item_id, &viewer_id, &emoji).await {
                        tracing::warn!("Failed to submit reaction on {}: {}", item_id, e);
                    }
                }
                ServiceCall::SubmitEmojiTap { item_id, emoji } => {
                    match story.submit_emoji_button_tap(&item_id, &emoji).await {
                        Ok(tap) => tracing::debug!("Emoji tap on {} (new: {})", item_id, tap.is_new),
                        Err(e) => tracing::warn!("Failed to submit emoji tap on {}: {}", item_id, e),
                    }
                }
                ServiceCall::QueryUnseenReactions { item_id } => {
                    match story.get_unseen_reactions(&item_id).await {
                        Ok(unseen) => {
                            let _ = tx.send(Internal::Unseen { item_id, unseen });
                        }
                        Err(e) => tracing::warn!("Failed to fetch reactions on {}: {}", item_id, e),
                    }
                }
                ServiceCall::MarkReactionsSeen { item_id } => {
                    if let Err(e) = story.mark_reactions_seen(&item_id).await {
                        tracing::warn!("Failed to mark reactions seen on {}: {}", item_id, e);
                    }
                }
                ServiceCall::DeleteItem { item_id } => {
                    let outcome = story.delete_item(&item_id, &viewer_id).await.map_err(|e| {
                        if !e.is_rejection() {
                            tracing::warn!("Delete of {} failed in transport: {}", item_id, e);
                        }
                        e.to_string()
                    });
                    let _ = tx.send(Internal::DeleteFinished { item_id, outcome });
                }
                ServiceCall::ReportItem { item_id, reason } => {
                    let outcome = story
                        .report_item(&item_id, &viewer_id, &reason)
                        .await
                        .map_err(|e| e.to_string());
                    let _ = tx.send(Internal::ReportFinished { item_id, outcome });
                }
            }
        });
    }

    fn emit(&self, event: HostEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            tracing::debug!("Dropping host event: {}", e);
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.session.snapshot());
    }

    /// Release everything still running once the session is closed.
    fn shutdown(&mut self) {
        for (_, task) in self.clocks.drain() {
            task.abort();
        }
        self.active_intervals.store(0, Ordering::SeqCst);
        for timer in self.timers.drain(..) {
            timer.abort();
        }
        for (_, task) in self.preloads.drain() {
            task.abort();
        }
        self.publish();
    }
}
