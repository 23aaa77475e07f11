//! Side effects requested by the playback core.
//!
//! The core never performs I/O or touches timers itself; it returns these and
//! the runtime carries them out.

use crate::burst::Burst;
use crate::clock::ClockHandle;
use crate::preload::PreloadHint;
use std::time::Duration;

/// Identifies which item a media signal or timeout belongs to.
///
/// Bumped every time the current item changes, so late callbacks for an item
/// that is no longer shown can be recognised and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ItemToken(pub u64);

/// A call to the external story service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCall {
    RecordView { item_id: String, author_id: String },
    SubmitReaction { item_id: String, emoji: String },
    SubmitEmojiTap { item_id: String, emoji: String },
    QueryUnseenReactions { item_id: String },
    MarkReactionsSeen { item_id: String },
    DeleteItem { item_id: String },
    ReportItem { item_id: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// User-visible message for the host's notification surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    StartClock { handle: ClockHandle, interval: Duration },
    StopClock(ClockHandle),
    ArmMetadataTimeout { token: ItemToken, after: Duration },
    /// Skip the item if it is still stuck in stall `epoch` after `after`.
    ArmStallTimeout { token: ItemToken, epoch: u64, after: Duration },
    Preload(PreloadHint),
    CancelPreload { item_id: String },
    Call(ServiceCall),
    Burst(Burst),
    Notify(Notice),
    /// The session reached its terminal state.
    Closed,
}
