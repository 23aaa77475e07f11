//! Story data model.
//!
//! Collections and items are read-only snapshots during playback; the only
//! mutation the engine performs is removing a deleted item from its copy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of media a story item carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
    Text,
}

impl MediaType {
    /// Check if this is a video media type.
    pub fn is_video(&self) -> bool {
        matches!(self, MediaType::Video)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
            MediaType::Text => "text",
        }
    }
}

/// Position in the unit square, `(0,0)` top-left, `(1,1)` bottom-right.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizedPosition {
    pub x: f32,
    pub y: f32,
}

/// Reaction affordance placed on an item by its author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionEmoji {
    pub symbol: String,
    pub position: NormalizedPosition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sticker {
    pub kind: String,
    #[serde(default)]
    pub content: Option<String>,
    pub position: NormalizedPosition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextOverlay {
    pub text: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub position: NormalizedPosition,
}

/// A single ephemeral media unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryItem {
    pub id: String,
    pub author_id: String,
    pub media_type: MediaType,
    pub media_ref: String,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub text_overlay: Option<TextOverlay>,
    #[serde(default)]
    pub stickers: Vec<Sticker>,
    #[serde(default)]
    pub reaction_emoji: Option<ReactionEmoji>,
    #[serde(default)]
    pub audio_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub view_count: u64,
    /// Whether the current viewer already has a view record for this item.
    #[serde(default)]
    pub viewed: bool,
}

impl StoryItem {
    pub fn is_authored_by(&self, viewer_id: &str) -> bool {
        self.author_id == viewer_id
    }
}

/// The ordered set of one author's active items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryCollection {
    pub author_id: String,
    pub items: Vec<StoryItem>,
}

impl StoryCollection {
    pub fn new(author_id: impl Into<String>, items: Vec<StoryItem>) -> Self {
        Self {
            author_id: author_id.into(),
            items,
        }
    }

    /// Any item without a view record for the current viewer.
    pub fn has_unviewed(&self) -> bool {
        self.items.iter().any(|item| !item.viewed)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Remove an item by id, returning its former index.
    pub(crate) fn remove(&mut self, item_id: &str) -> Option<usize> {
        let index = self.items.iter().position(|item| item.id == item_id)?;
        self.items.remove(index);
        Some(index)
    }

    pub(crate) fn mark_viewed(&mut self, item_id: &str) {
        if let Some(item) = self.items.iter_mut().find(|item| item.id == item_id) {
            item.viewed = true;
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    pub fn item(id: &str, author: &str, media_type: MediaType) -> StoryItem {
        let created_at = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        StoryItem {
            id: id.to_string(),
            author_id: author.to_string(),
            media_type,
            media_ref: format!("/media/{id}"),
            filter: None,
            text_overlay: None,
            stickers: Vec::new(),
            reaction_emoji: None,
            audio_ref: None,
            created_at,
            expires_at: created_at + chrono::Duration::hours(24),
            view_count: 0,
            viewed: false,
        }
    }

    /// One collection per `(author, item count)` pair, all images.
    pub fn collections(shape: &[(&str, usize)]) -> Vec<StoryCollection> {
        shape
            .iter()
            .map(|(author, count)| {
                let items = (0..*count)
                    .map(|i| item(&format!("{author}-{i}"), author, MediaType::Image))
                    .collect();
                StoryCollection::new(*author, items)
            })
            .collect()
    }
}
