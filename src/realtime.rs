//! PocketBase realtime subscription.
//!
//! Watches the stories collection so an item deleted elsewhere disappears from
//! an open viewer.

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, http::HeaderValue, Message},
};
use url::Url;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Events from the realtime subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeEvent {
    Connected,
    Disconnected,
    /// A story record was deleted server-side.
    ItemDeleted(String),
}

#[derive(Debug, Deserialize)]
struct RealtimeMessage {
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    record: Option<serde_json::Value>,
}

/// Turn one realtime frame into an event, if it carries one we care about.
pub fn parse_message(text: &str) -> Option<RealtimeEvent> {
    let msg: RealtimeMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            tracing::debug!("Failed to parse realtime message: {} - {}", e, text);
            return None;
        }
    };

    match msg.action.as_deref()? {
        "delete" => {
            let id = msg.record?.get("id")?.as_str()?.to_string();
            Some(RealtimeEvent::ItemDeleted(id))
        }
        _ => None,
    }
}

/// Build the WebSocket URL for a PocketBase base URL.
fn ws_url(base_url: &str) -> Result<Url> {
    let mut url = Url::parse(base_url).context("Invalid PocketBase URL")?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|_| anyhow::anyhow!("Failed to set WebSocket scheme"))?;
    url.set_path("/api/realtime");
    Ok(url)
}

pub struct RealtimeManager {
    base_url: String,
    token: Option<String>,
    event_tx: mpsc::Sender<RealtimeEvent>,
}

impl RealtimeManager {
    pub fn new(base_url: String, token: Option<String>, event_tx: mpsc::Sender<RealtimeEvent>) -> Self {
        Self {
            base_url,
            token,
            event_tx,
        }
    }

    /// Connection loop. Returns once the receiving side is gone.
    pub async fn run(&self) {
        loop {
            tracing::info!("Connecting to PocketBase realtime...");

            match self.connect_and_subscribe().await {
                Ok(()) => tracing::warn!("Realtime connection closed, reconnecting in 5s..."),
                Err(e) => {
                    tracing::error!("Realtime connection error: {}, reconnecting in 5s...", e)
                }
            }

            if self.event_tx.send(RealtimeEvent::Disconnected).await.is_err() {
                tracing::debug!("Realtime listener dropped, stopping");
                return;
            }
            sleep(RECONNECT_DELAY).await;
        }
    }

    async fn connect_and_subscribe(&self) -> Result<()> {
        let url = ws_url(&self.base_url)?;
        tracing::debug!("Connecting to: {}", url);

        let mut request = url.to_string().into_client_request()?;
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .context("Invalid auth token")?;
            request.headers_mut().insert("Authorization", value);
        }

        let (ws_stream, _response) = connect_async(request)
            .await
            .context("Failed to connect to WebSocket")?;
        let (mut write, mut read) = ws_stream.split();

        // PocketBase greets with the client id before accepting subscriptions.
        let client_id = loop {
            let Some(msg) = read.next().await else {
                anyhow::bail!("Connection closed before client id");
            };
            if let Message::Text(text) = msg.context("Failed to receive message")? {
                if let Ok(json) = serde_json::from_str::<serde_json::Value>(&text) {
                    if let Some(id) = json.get("clientId").and_then(|v| v.as_str()) {
                        break id.to_string();
                    }
                }
            }
        };
        tracing::debug!("Got client ID: {}", client_id);

        let subscribe_msg = serde_json::json!({
            "clientId": client_id,
            "subscriptions": ["stories"]
        });
        write
            .send(Message::Text(subscribe_msg.to_string()))
            .await
            .context("Failed to send subscription")?;

        let _ = self.event_tx.send(RealtimeEvent::Connected).await;
        tracing::info!("Realtime connected and subscribed");

        while let Some(msg) = read.next().await {
            match msg.context("Failed to receive message")? {
                Message::Text(text) => {
                    if let Some(event) = parse_message(&text) {
                        tracing::debug!("Realtime event: {:?}", event);
                        if self.event_tx.send(event).await.is_err() {
                            return Ok(());
                        }
                    }
                }
                Message::Ping(data) => {
                    write
                        .send(Message::Pong(data))
                        .await
                        .context("Failed to send pong")?;
                }
                Message::Close(_) => {
                    tracing::info!("WebSocket closed by server");
                    break;
                }
                _ => {}
            }
        }

        Ok(())
    }
}

/// Spawn the realtime manager as a background task.
pub fn spawn_realtime(base_url: String, token: Option<String>) -> mpsc::Receiver<RealtimeEvent> {
    let (tx, rx) = mpsc::channel(100);
    let manager = RealtimeManager::new(base_url, token, tx);
    tokio::spawn(async move {
        manager.run().await;
    });
    rx
}
