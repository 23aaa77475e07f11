//! External story service.
//!
//! The playback core only talks to the service through the runtime; this
//! module defines that boundary and a PocketBase-style HTTP implementation.

use crate::error::{ServiceError, ServiceResult};
use crate::story::{StoryCollection, StoryItem};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::collections::{BTreeMap, HashSet};

/// Outstanding reactions on one of the viewer's own items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnseenReactions {
    pub viewer_count: u32,
    pub acknowledged: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmojiTap {
    pub is_new: bool,
}

#[async_trait]
pub trait StoryService: Send + Sync {
    async fn load_collections(&self, viewer_id: &str) -> ServiceResult<Vec<StoryCollection>>;
    async fn record_view(&self, item_id: &str, viewer_id: &str, author_id: &str) -> ServiceResult<()>;
    async fn submit_reaction(&self, item_id: &str, viewer_id: &str, emoji: &str) -> ServiceResult<()>;
    async fn submit_emoji_button_tap(&self, item_id: &str, emoji: &str) -> ServiceResult<EmojiTap>;
    async fn get_unseen_reactions(&self, item_id: &str) -> ServiceResult<UnseenReactions>;
    async fn mark_reactions_seen(&self, item_id: &str) -> ServiceResult<()>;
    async fn delete_item(&self, item_id: &str, author_id: &str) -> ServiceResult<()>;
    async fn report_item(&self, item_id: &str, reporter_id: &str, reason: &str) -> ServiceResult<()>;
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ViewRecord {
    story_id: String,
}

/// Group items per author, oldest first within each author.
///
/// Authors keep the order in which their first item appears in `items`.
pub fn group_collections(items: Vec<StoryItem>, viewed: &HashSet<String>) -> Vec<StoryCollection> {
    let mut order: Vec<String> = Vec::new();
    let mut by_author: BTreeMap<String, Vec<StoryItem>> = BTreeMap::new();
    for mut item in items {
        item.viewed = item.viewed || viewed.contains(&item.id);
        if !by_author.contains_key(&item.author_id) {
            order.push(item.author_id.clone());
        }
        by_author.entry(item.author_id.clone()).or_default().push(item);
    }

    order
        .into_iter()
        .filter_map(|author| {
            let mut items = by_author.remove(&author)?;
            items.sort_by_key(|item| item.created_at);
            Some(StoryCollection::new(author, items))
        })
        .collect()
}

/// Story service backed by a PocketBase REST API.
pub struct HttpStoryService {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpStoryService {
    pub fn new(client: Client, base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn records_url(&self, collection: &str, filter: &str, extra: &str) -> String {
        format!(
            "{}/api/collections/{}/records?filter={}&perPage=200{}",
            self.base_url,
            collection,
            urlencoding::encode(filter),
            extra
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String, item_id: &str) -> ServiceResult<T> {
        let response = self.authorize(self.client.get(url)).send().await?;
        let response = check(response, "read", item_id)?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn post_json(
        &self,
        url: String,
        body: serde_json::Value,
        action: &'static str,
        item_id: &str,
    ) -> ServiceResult<Response> {
        let response = self.authorize(self.client.post(url)).json(&body).send().await?;
        check(response, action, item_id)
    }
}

/// Map rejection statuses onto typed errors.
/// Escape a value for use inside a single-quoted filter literal.
fn quote_filter(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn check(response: Response, action: &'static str, item_id: &str) -> ServiceResult<Response> {
    match response.status() {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ServiceError::Unauthorized {
            action,
            item_id: item_id.to_string(),
        }),
        StatusCode::NOT_FOUND => Err(ServiceError::NotFound(item_id.to_string())),
        _ => Ok(response.error_for_status()?),
    }
}

#[async_trait]
impl StoryService for HttpStoryService {
    async fn load_collections(&self, viewer_id: &str) -> ServiceResult<Vec<StoryCollection>> {
        let stories: ListResponse<StoryItem> = self
            .get_json(
                self.records_url("stories", "expiresAt > @now", "&sort=-createdAt"),
                "*",
            )
            .await?;
        let views: ListResponse<ViewRecord> = self
            .get_json(
                self.records_url(
                    "story_views",
                    &format!("viewerId='{}'", quote_filter(viewer_id)),
                    "",
                ),
                "*",
            )
            .await?;

        let viewed: HashSet<String> = views.items.into_iter().map(|v| v.story_id).collect();
        let collections = group_collections(stories.items, &viewed);
        tracing::info!(
            "Fetched {} stories from {} authors",
            collections.iter().map(StoryCollection::len).sum::<usize>(),
            collections.len()
        );
        Ok(collections)
    }

    async fn record_view(&self, item_id: &str, viewer_id: &str, author_id: &str) -> ServiceResult<()> {
        self.post_json(
            self.url("/api/collections/story_views/records"),
            json!({ "storyId": item_id, "viewerId": viewer_id, "authorId": author_id }),
            "view",
            item_id,
        )
        .await?;
        Ok(())
    }

    async fn submit_reaction(&self, item_id: &str, viewer_id: &str, emoji: &str) -> ServiceResult<()> {
        self.post_json(
            self.url("/api/collections/story_reactions/records"),
            json!({ "storyId": item_id, "viewerId": viewer_id, "emoji": emoji }),
            "react to",
            item_id,
        )
        .await?;
        Ok(())
    }

    async fn submit_emoji_button_tap(&self, item_id: &str, emoji: &str) -> ServiceResult<EmojiTap> {
        let response = self
            .post_json(
                self.url(&format!("/api/stories/{}/emoji-tap", urlencoding::encode(item_id))),
                json!({ "emoji": emoji }),
                "react to",
                item_id,
            )
            .await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn get_unseen_reactions(&self, item_id: &str) -> ServiceResult<UnseenReactions> {
        self.get_json(
            self.url(&format!(
                "/api/stories/{}/unseen-reactions",
                urlencoding::encode(item_id)
            )),
            item_id,
        )
        .await
    }

    async fn mark_reactions_seen(&self, item_id: &str) -> ServiceResult<()> {
        self.post_json(
            self.url(&format!(
                "/api/stories/{}/reactions-seen",
                urlencoding::encode(item_id)
            )),
            json!({}),
            "acknowledge reactions on",
            item_id,
        )
        .await?;
        Ok(())
    }

    async fn delete_item(&self, item_id: &str, author_id: &str) -> ServiceResult<()> {
        tracing::debug!("Deleting story {} on behalf of {}", item_id, author_id);
        let url = self.url(&format!(
            "/api/collections/stories/records/{}",
            urlencoding::encode(item_id)
        ));
        let response = self.authorize(self.client.delete(url)).send().await?;
        check(response, "delete", item_id)?;
        Ok(())
    }

    async fn report_item(&self, item_id: &str, reporter_id: &str, reason: &str) -> ServiceResult<()> {
        self.post_json(
            self.url("/api/collections/story_reports/records"),
            json!({ "storyId": item_id, "reporterId": reporter_id, "reason": reason }),
            "report",
            item_id,
        )
        .await?;
        Ok(())
    }
}
