//! View and reaction bookkeeping.
//!
//! Views are recorded at most once per (item, viewer) within a session and
//! marked locally before the call goes out, so a failed call is never retried.
//! The author's accumulated reaction burst is likewise shown at most once per
//! item per session.

use crate::burst::Burst;
use crate::config::ReactionConfig;
use crate::effect::{Effect, ServiceCall};
use crate::service::UnseenReactions;
use crate::story::{NormalizedPosition, StoryItem};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;

/// Where live bursts start when the item has no reaction affordance.
const DEFAULT_BURST_ORIGIN: NormalizedPosition = NormalizedPosition { x: 0.5, y: 0.85 };

#[derive(Debug)]
pub struct Recorder {
    viewer_id: String,
    viewed: HashSet<String>,
    /// Items whose unseen reactions were already queried.
    queried: HashSet<String>,
    /// Items whose accumulated burst already played.
    burst_shown: HashSet<String>,
    config: ReactionConfig,
    rng: StdRng,
}

impl Recorder {
    pub fn new(viewer_id: impl Into<String>, config: ReactionConfig) -> Self {
        Self::with_rng(viewer_id, config, StdRng::from_entropy())
    }

    pub fn with_rng(viewer_id: impl Into<String>, config: ReactionConfig, rng: StdRng) -> Self {
        Self {
            viewer_id: viewer_id.into(),
            viewed: HashSet::new(),
            queried: HashSet::new(),
            burst_shown: HashSet::new(),
            config,
            rng,
        }
    }

    pub fn viewer_id(&self) -> &str {
        &self.viewer_id
    }

    pub fn has_recorded(&self, item_id: &str) -> bool {
        self.viewed.contains(item_id)
    }

    /// `item` just became current.
    pub fn on_item_shown(&mut self, item: &StoryItem) -> Vec<Effect> {
        if item.is_authored_by(&self.viewer_id) {
            if item.reaction_emoji.is_some() && self.queried.insert(item.id.clone()) {
                return vec![Effect::Call(ServiceCall::QueryUnseenReactions {
                    item_id: item.id.clone(),
                })];
            }
            return Vec::new();
        }

        if !self.viewed.insert(item.id.clone()) {
            return Vec::new();
        }
        tracing::debug!("Recording view of {}", item.id);
        vec![Effect::Call(ServiceCall::RecordView {
            item_id: item.id.clone(),
            author_id: item.author_id.clone(),
        })]
    }

    /// Answer to an unseen-reactions query for one of the viewer's own items.
    pub fn on_unseen_reactions(&mut self, item: &StoryItem, unseen: UnseenReactions) -> Vec<Effect> {
        if !self.queried.contains(&item.id) || unseen.acknowledged || unseen.viewer_count == 0 {
            return Vec::new();
        }
        let Some(emoji) = &item.reaction_emoji else {
            return Vec::new();
        };
        if !self.burst_shown.insert(item.id.clone()) {
            return Vec::new();
        }

        tracing::debug!(
            "Showing {} accumulated reactions on {}",
            unseen.viewer_count,
            item.id
        );
        let burst = Burst::accumulated(
            &item.id,
            &emoji.symbol,
            unseen.viewer_count,
            self.config.max_accumulated_particles,
            &mut self.rng,
        );
        vec![
            Effect::Burst(burst),
            Effect::Call(ServiceCall::MarkReactionsSeen {
                item_id: item.id.clone(),
            }),
        ]
    }

    /// Reaction button pressed.
    pub fn react(&mut self, item: &StoryItem, emoji: &str) -> Vec<Effect> {
        if item.is_authored_by(&self.viewer_id) || emoji.is_empty() {
            return Vec::new();
        }
        let origin = item
            .reaction_emoji
            .as_ref()
            .map(|e| e.position)
            .unwrap_or(DEFAULT_BURST_ORIGIN);
        let burst = Burst::live(&item.id, emoji, origin, self.config.live_particles, &mut self.rng);
        vec![
            Effect::Burst(burst),
            Effect::Call(ServiceCall::SubmitReaction {
                item_id: item.id.clone(),
                emoji: emoji.to_string(),
            }),
        ]
    }

    /// The item's own reaction affordance was tapped.
    pub fn tap_affordance(&mut self, item: &StoryItem) -> Vec<Effect> {
        if item.is_authored_by(&self.viewer_id) {
            return Vec::new();
        }
        let Some(emoji) = &item.reaction_emoji else {
            return Vec::new();
        };
        let burst = Burst::live(
            &item.id,
            &emoji.symbol,
            emoji.position,
            self.config.live_particles,
            &mut self.rng,
        );
        vec![
            Effect::Burst(burst),
            Effect::Call(ServiceCall::SubmitEmojiTap {
                item_id: item.id.clone(),
                emoji: emoji.symbol.clone(),
            }),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::story::fixtures::item;
    use crate::story::{MediaType, ReactionEmoji};

    fn recorder(viewer: &str) -> Recorder {
        Recorder::with_rng(viewer, ReactionConfig::default(), StdRng::seed_from_u64(11))
    }

    fn calls(effects: &[Effect]) -> Vec<&ServiceCall> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Call(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    fn with_affordance(mut story: StoryItem) -> StoryItem {
        story.reaction_emoji = Some(ReactionEmoji {
            symbol: "🔥".into(),
            position: NormalizedPosition { x: 0.3, y: 0.6 },
        });
        story
    }

    #[test]
    fn view_recorded_once_per_item() {
        let mut rec = recorder("me");
        let story = item("s1", "ana", MediaType::Image);

        let first = rec.on_item_shown(&story);
        assert_eq!(
            calls(&first),
            vec![&ServiceCall::RecordView {
                item_id: "s1".into(),
                author_id: "ana".into()
            }]
        );
        assert!(rec.on_item_shown(&story).is_empty());
        assert!(rec.has_recorded("s1"));
    }

    #[test]
    fn author_views_are_not_recorded() {
        let mut rec = recorder("ana");
        assert!(rec.on_item_shown(&item("s1", "ana", MediaType::Image)).is_empty());
        assert!(!rec.has_recorded("s1"));
    }

    #[test]
    fn accumulated_burst_plays_once() {
        let mut rec = recorder("ana");
        let story = with_affordance(item("s1", "ana", MediaType::Image));
        let unseen = UnseenReactions {
            viewer_count: 7,
            acknowledged: false,
        };

        assert_eq!(
            calls(&rec.on_item_shown(&story)),
            vec![&ServiceCall::QueryUnseenReactions { item_id: "s1".into() }]
        );
        // Revisiting does not query again.
        assert!(rec.on_item_shown(&story).is_empty());

        let effects = rec.on_unseen_reactions(&story, unseen);
        assert!(matches!(&effects[0], Effect::Burst(b) if b.particles.len() == 14));
        assert_eq!(
            calls(&effects),
            vec![&ServiceCall::MarkReactionsSeen { item_id: "s1".into() }]
        );
        assert!(rec.on_unseen_reactions(&story, unseen).is_empty());
    }

    #[test]
    fn acknowledged_or_empty_reactions_do_nothing() {
        let mut rec = recorder("ana");
        let story = with_affordance(item("s1", "ana", MediaType::Image));
        rec.on_item_shown(&story);

        let none = UnseenReactions {
            viewer_count: 0,
            acknowledged: false,
        };
        assert!(rec.on_unseen_reactions(&story, none).is_empty());
        let seen = UnseenReactions {
            viewer_count: 4,
            acknowledged: true,
        };
        assert!(rec.on_unseen_reactions(&story, seen).is_empty());
    }

    #[test]
    fn unsolicited_unseen_answer_is_ignored() {
        let mut rec = recorder("ana");
        let story = with_affordance(item("s1", "ana", MediaType::Image));
        let unseen = UnseenReactions {
            viewer_count: 3,
            acknowledged: false,
        };
        assert!(rec.on_unseen_reactions(&story, unseen).is_empty());
    }

    #[test]
    fn react_bursts_and_submits() {
        let mut rec = recorder("me");
        let effects = rec.react(&item("s1", "ana", MediaType::Video), "😂");
        assert!(matches!(&effects[0], Effect::Burst(b) if b.particles.len() == 10));
        assert_eq!(
            calls(&effects),
            vec![&ServiceCall::SubmitReaction {
                item_id: "s1".into(),
                emoji: "😂".into()
            }]
        );

        // Repeated taps are allowed.
        assert_eq!(rec.react(&item("s1", "ana", MediaType::Video), "😂").len(), 2);
    }

    #[test]
    fn author_cannot_react_to_own_item() {
        let mut rec = recorder("ana");
        assert!(rec.react(&item("s1", "ana", MediaType::Image), "❤").is_empty());
    }

    #[test]
    fn affordance_tap_uses_item_symbol() {
        let mut rec = recorder("me");
        let story = with_affordance(item("s1", "ana", MediaType::Image));
        let effects = rec.tap_affordance(&story);
        assert_eq!(
            calls(&effects),
            vec![&ServiceCall::SubmitEmojiTap {
                item_id: "s1".into(),
                emoji: "🔥".into()
            }]
        );
        assert!(rec.tap_affordance(&item("s2", "ana", MediaType::Image)).is_empty());
    }
}
