#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use story_viewer::error::{ServiceError, ServiceResult};
use story_viewer::preload::MediaWarmer;
use story_viewer::service::{EmojiTap, StoryService, UnseenReactions};
use story_viewer::story::{NormalizedPosition, ReactionEmoji};
use story_viewer::{MediaType, StoryCollection, StoryItem};

pub fn item(id: &str, author: &str, media_type: MediaType, age_secs: i64) -> StoryItem {
    let created_at = Utc::now() - Duration::seconds(age_secs);
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
        expires_at: created_at + Duration::hours(24),
        view_count: 0,
        viewed: false,
    }
}

/// `count` images by `author`, ids `author-0..`.
pub fn images(author: &str, count: usize) -> StoryCollection {
    let items = (0..count)
        .map(|i| item(&format!("{author}-{i}"), author, MediaType::Image, 100 - i as i64))
        .collect();
    StoryCollection::new(author, items)
}

pub fn with_reaction(mut story: StoryItem, symbol: &str) -> StoryItem {
    story.reaction_emoji = Some(ReactionEmoji {
        symbol: symbol.to_string(),
        position: NormalizedPosition { x: 0.5, y: 0.7 },
    });
    story
}

/// Story service that records every call.
#[derive(Default)]
pub struct FakeService {
    pub calls: Mutex<Vec<String>>,
    pub reject_delete: bool,
    pub unseen: Option<UnseenReactions>,
    pub collections: Vec<StoryCollection>,
}

impl FakeService {
    pub fn count(&self, name: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.starts_with(name))
            .count()
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl StoryService for FakeService {
    async fn load_collections(&self, _viewer_id: &str) -> ServiceResult<Vec<StoryCollection>> {
        Ok(self.collections.clone())
    }

    async fn record_view(&self, item_id: &str, viewer_id: &str, _author_id: &str) -> ServiceResult<()> {
        self.log(format!("record_view {item_id} {viewer_id}"));
        Ok(())
    }

    async fn submit_reaction(&self, item_id: &str, _viewer_id: &str, emoji: &str) -> ServiceResult<()> {
        self.log(format!("submit_reaction {item_id} {emoji}"));
        Ok(())
    }

    async fn submit_emoji_button_tap(&self, item_id: &str, emoji: &str) -> ServiceResult<EmojiTap> {
        self.log(format!("emoji_tap {item_id} {emoji}"));
        Ok(EmojiTap { is_new: true })
    }

    async fn get_unseen_reactions(&self, item_id: &str) -> ServiceResult<UnseenReactions> {
        self.log(format!("get_unseen_reactions {item_id}"));
        self.unseen
            .ok_or_else(|| ServiceError::NotFound(item_id.to_string()))
    }

    async fn mark_reactions_seen(&self, item_id: &str) -> ServiceResult<()> {
        self.log(format!("mark_reactions_seen {item_id}"));
        Ok(())
    }

    async fn delete_item(&self, item_id: &str, _author_id: &str) -> ServiceResult<()> {
        self.log(format!("delete_item {item_id}"));
        if self.reject_delete {
            return Err(ServiceError::Unauthorized {
                action: "delete",
                item_id: item_id.to_string(),
            });
        }
        Ok(())
    }

    async fn report_item(&self, item_id: &str, _reporter_id: &str, reason: &str) -> ServiceResult<()> {
        self.log(format!("report_item {item_id} {reason}"));
        Ok(())
    }
}

/// Warmer that counts warmups per media reference.
#[derive(Default)]
pub struct FakeWarmer {
    pub warmed: Mutex<HashMap<String, usize>>,
}

impl FakeWarmer {
    pub fn times(&self, media_ref: &str) -> usize {
        self.warmed.lock().unwrap().get(media_ref).copied().unwrap_or(0)
    }
}

#[async_trait]
impl MediaWarmer for FakeWarmer {
    async fn warm(&self, media_ref: &str) -> anyhow::Result<()> {
        *self
            .warmed
            .lock()
            .unwrap()
            .entry(media_ref.to_string())
            .or_default() += 1;
        Ok(())
    }
}
