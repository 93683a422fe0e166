//! Outward announcement of room-state transitions.
//!
//! The Slack notifier keeps a single message mirroring the room state: it
//! edits its own message in place while that message is still the latest in
//! the channel, and posts a fresh one otherwise so the update lands at the
//! bottom where people look.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;

use crate::config::NotifierSection;
use crate::room::RoomSnapshot;

const SLACK_API: &str = "https://slack.com/api";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("slack request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("slack API error: {0}")]
    Api(String),
}

/// Sink for room-state announcements.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, snapshot: &RoomSnapshot) -> Result<(), NotifyError>;
}

/// Fallback for boxes without Slack credentials: transitions only reach the
/// log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, snapshot: &RoomSnapshot) -> Result<(), NotifyError> {
        tracing::info!("room is now {}", snapshot.state);
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct Channel {
    id: String,
    name: String,
    #[serde(default)]
    name_normalized: String,
}

#[derive(Debug, Deserialize)]
struct ChannelList {
    ok: bool,
    error: Option<String>,
    #[serde(default)]
    channels: Vec<Channel>,
}

#[derive(Debug, Deserialize)]
struct AuthTest {
    ok: bool,
    error: Option<String>,
    bot_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Message {
    ts: String,
    bot_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct History {
    ok: bool,
    error: Option<String>,
    #[serde(default)]
    messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct Ack {
    ok: bool,
    error: Option<String>,
}

fn api_error(error: Option<String>, call: &str) -> NotifyError {
    NotifyError::Api(error.unwrap_or_else(|| format!("{call} failed")))
}

/// Mirrors the room state into one Slack channel.
pub struct SlackNotifier {
    client: reqwest::Client,
    token: String,
    channel_id: String,
    bot_id: String,
    assets_url: String,
}

impl SlackNotifier {
    /// Resolve the channel and our own bot identity up front. Failures
    /// here are configuration problems and fatal at startup.
    pub async fn connect(cfg: &NotifierSection) -> Result<Self, NotifyError> {
        let client = reqwest::Client::new();

        let list: ChannelList = client
            .get(format!("{SLACK_API}/conversations.list"))
            .bearer_auth(&cfg.token)
            .query(&[("exclude_archived", "true"), ("types", "private_channel")])
            .send()
            .await?
            .json()
            .await?;
        if !list.ok {
            return Err(api_error(list.error, "conversations.list"));
        }
        let channel_id = list
            .channels
            .iter()
            .find(|c| c.name == cfg.channel || c.name_normalized == cfg.channel)
            .map(|c| c.id.clone())
            .ok_or_else(|| NotifyError::Api(format!("channel '{}' not found", cfg.channel)))?;

        let auth: AuthTest = client
            .post(format!("{SLACK_API}/auth.test"))
            .bearer_auth(&cfg.token)
            .send()
            .await?
            .json()
            .await?;
        if !auth.ok {
            return Err(api_error(auth.error, "auth.test"));
        }
        let bot_id = auth
            .bot_id
            .ok_or_else(|| NotifyError::Api("auth.test returned no bot_id".to_string()))?;

        tracing::info!("slack notifier connected to channel {}", channel_id);

        Ok(Self {
            client,
            token: cfg.token.clone(),
            channel_id,
            bot_id,
            assets_url: cfg.assets_url.trim_end_matches('/').to_string(),
        })
    }

    /// Block Kit body announcing the given state.
    fn build_blocks(&self, snapshot: &RoomSnapshot) -> Value {
        let icon_url = format!("{}/pingpong-icon-{}.png", self.assets_url, snapshot.state);
        json!([
            {
                "type": "section",
                "text": {
                    "type": "mrkdwn",
                    "text": "Looks like we have some news regarding the pingpong room:"
                }
            },
            { "type": "divider" },
            {
                "type": "section",
                "text": {
                    "type": "mrkdwn",
                    "text": format!(
                        "The room is now {}! Since <!date^{:.0}^{{time}}| >",
                        snapshot.state, snapshot.last_state_change_time
                    ),
                },
                "accessory": {
                    "type": "image",
                    "image_url": icon_url,
                    "alt_text": "pingpong icon"
                }
            }
        ])
    }

    async fn latest_message(&self) -> Result<Option<Message>, NotifyError> {
        let history: History = self
            .client
            .get(format!("{SLACK_API}/conversations.history"))
            .bearer_auth(&self.token)
            .query(&[("channel", self.channel_id.as_str()), ("limit", "1")])
            .send()
            .await?
            .json()
            .await?;
        if !history.ok {
            return Err(api_error(history.error, "conversations.history"));
        }
        Ok(history.messages.into_iter().next())
    }

    async fn post_or_update(&self, blocks: Value) -> Result<(), NotifyError> {
        let ours = self
            .latest_message()
            .await?
            .filter(|m| m.bot_id.as_deref() == Some(self.bot_id.as_str()));

        let ack: Ack = match ours {
            Some(message) => {
                self.client
                    .post(format!("{SLACK_API}/chat.update"))
                    .bearer_auth(&self.token)
                    .json(&json!({
                        "channel": self.channel_id,
                        "ts": message.ts,
                        "blocks": blocks,
                    }))
                    .send()
                    .await?
                    .json()
                    .await?
            }
            None => {
                self.client
                    .post(format!("{SLACK_API}/chat.postMessage"))
                    .bearer_auth(&self.token)
                    .json(&json!({
                        "channel": self.channel_id,
                        "blocks": blocks,
                    }))
                    .send()
                    .await?
                    .json()
                    .await?
            }
        };
        if !ack.ok {
            return Err(api_error(ack.error, "chat API call"));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify(&self, snapshot: &RoomSnapshot) -> Result<(), NotifyError> {
        self.post_or_update(self.build_blocks(snapshot)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notifier() -> SlackNotifier {
        SlackNotifier {
            client: reqwest::Client::new(),
            token: "xoxb-test".to_string(),
            channel_id: "C123".to_string(),
            bot_id: "B42".to_string(),
            assets_url: "http://example.com/assets".to_string(),
        }
    }

    #[test]
    fn blocks_carry_state_text_and_matching_icon() {
        let blocks = notifier().build_blocks(&RoomSnapshot {
            state: "taken",
            last_state_change_time: 1_700_000_000.0,
        });
        let text = blocks[2]["text"]["text"].as_str().unwrap();
        assert!(text.contains("The room is now taken!"));
        assert!(text.contains("<!date^1700000000^{time}| >"));
        assert_eq!(
            blocks[2]["accessory"]["image_url"],
            "http://example.com/assets/pingpong-icon-taken.png"
        );
    }

    #[test]
    fn free_state_picks_the_free_icon() {
        let blocks = notifier().build_blocks(&RoomSnapshot {
            state: "free",
            last_state_change_time: 0.0,
        });
        assert_eq!(
            blocks[2]["accessory"]["image_url"],
            "http://example.com/assets/pingpong-icon-free.png"
        );
    }

    #[test]
    fn fractional_timestamps_are_rounded_for_slack() {
        let blocks = notifier().build_blocks(&RoomSnapshot {
            state: "free",
            last_state_change_time: 1_700_000_000.74,
        });
        let text = blocks[2]["text"]["text"].as_str().unwrap();
        assert!(text.contains("<!date^1700000001^{time}| >"));
    }

    #[test]
    fn parses_a_channel_listing() {
        let list: ChannelList = serde_json::from_str(
            r#"{"ok": true, "channels": [
                {"id": "C1", "name": "pingpong", "name_normalized": "pingpong"},
                {"id": "C2", "name": "random"}
            ]}"#,
        )
        .unwrap();
        assert!(list.ok);
        assert_eq!(list.channels.len(), 2);
        assert_eq!(list.channels[0].id, "C1");
        assert_eq!(list.channels[1].name_normalized, "");
    }

    #[test]
    fn parses_an_api_error_envelope() {
        let ack: Ack =
            serde_json::from_str(r#"{"ok": false, "error": "channel_not_found"}"#).unwrap();
        assert!(!ack.ok);
        assert_eq!(ack.error.as_deref(), Some("channel_not_found"));
    }

    #[test]
    fn parses_history_with_and_without_bot_id() {
        let history: History = serde_json::from_str(
            r#"{"ok": true, "messages": [{"ts": "1700000000.000100", "bot_id": "B42"}]}"#,
        )
        .unwrap();
        assert_eq!(history.messages[0].bot_id.as_deref(), Some("B42"));

        let history: History =
            serde_json::from_str(r#"{"ok": true, "messages": [{"ts": "1.2"}]}"#).unwrap();
        assert!(history.messages[0].bot_id.is_none());
    }
}
