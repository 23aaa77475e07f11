//! Preloading of the upcoming item's media.
//!
//! The session asks for a hint whenever the "next" item changes; only videos
//! are warmed, and each item at most once per session.

use crate::story::StoryItem;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::collections::HashSet;

/// Best-effort request to warm a media resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreloadHint {
    pub item_id: String,
    pub media_ref: String,
}

#[derive(Debug, Default)]
pub struct Preloader {
    issued: HashSet<String>,
    /// Hints not yet settled, in issue order.
    outstanding: Vec<String>,
}

impl Preloader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hint for `next` if it is a video that has not been warmed yet.
    pub fn target(&mut self, next: Option<&StoryItem>) -> Option<PreloadHint> {
        let item = next?;
        if !item.media_type.is_video() || !self.issued.insert(item.id.clone()) {
            return None;
        }
        tracing::debug!("Preloading media: {}", item.id);
        self.outstanding.push(item.id.clone());
        Some(PreloadHint {
            item_id: item.id.clone(),
            media_ref: item.media_ref.clone(),
        })
    }

    /// The warmup for `item_id` finished (either way).
    pub fn settle(&mut self, item_id: &str) {
        self.outstanding.retain(|id| id != item_id);
    }

    pub fn is_preloaded(&self, item_id: &str) -> bool {
        self.issued.contains(item_id)
    }

    /// Hints to cancel on close.
    pub fn release_all(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outstanding)
    }
}

/// Fetches a media resource ahead of display.
#[async_trait]
pub trait MediaWarmer: Send + Sync {
    async fn warm(&self, media_ref: &str) -> Result<()>;
}

/// Warms media by downloading it once so the host's HTTP cache has it.
pub struct HttpMediaWarmer {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpMediaWarmer {
    pub fn new(client: reqwest::Client, base_url: String, token: Option<String>) -> Self {
        Self {
            client,
            base_url,
            token,
        }
    }

    /// Get the full URL for a media reference.
    pub fn full_url(&self, media_ref: &str) -> String {
        if media_ref.starts_with("http://") || media_ref.starts_with("https://") {
            media_ref.to_string()
        } else {
            format!("{}{}", self.base_url.trim_end_matches('/'), media_ref)
        }
    }
}

#[async_trait]
impl MediaWarmer for HttpMediaWarmer {
    async fn warm(&self, media_ref: &str) -> Result<()> {
        let url = self.full_url(media_ref);
        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.context("Failed to send request")?;
        let response = response
            .error_for_status()
            .context("Server returned error")?;

        let mut stream = response.bytes_stream();
        let mut size = 0usize;
        while let Some(chunk) = stream.next().await {
            size += chunk.context("Failed to read response")?.len();
        }
        tracing::debug!("Warmed {} ({:.2} KB)", url, size as f64 / 1024.0);
        Ok(())
    }
}
