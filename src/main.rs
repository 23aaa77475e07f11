use anyhow::{Context, Result};
use reqwest::Client;
use std::path::PathBuf;
use std::sync::Arc;
use story_viewer::config::ViewerConfig;
use story_viewer::effect::NoticeLevel;
use story_viewer::gesture::Key;
use story_viewer::preload::HttpMediaWarmer;
use story_viewer::readiness::MediaSignal;
use story_viewer::realtime::{spawn_realtime, RealtimeEvent};
use story_viewer::runtime::{spawn_session, Command, HostEvent, Services};
use story_viewer::service::{HttpStoryService, StoryService};
use story_viewer::session::{OverlayKind, Session};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

/// Viewport the headless host pretends to have, for tap zones.
const VIEWPORT_WIDTH: f32 = 390.0;

const HELP: &str = "commands: n | p | space | q | esc | r <emoji> | t | report <reason> | v | c | d | y | tap <x>";

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = ViewerConfig::load(config_path.as_deref())?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    anyhow::ensure!(
        !config.viewer_id.is_empty(),
        "viewer_id must be set (config file or STORY_VIEWER__VIEWER_ID)"
    );

    let client = Client::new();
    let story = Arc::new(HttpStoryService::new(
        client.clone(),
        config.api.base_url.clone(),
        config.api.token.clone(),
    ));
    let collections = story
        .load_collections(&config.viewer_id)
        .await
        .context("Failed to fetch stories")?;
    let (session, opening) = Session::open(collections, 0, &config.viewer_id, &config)
        .context("Failed to open story viewer")?;

    let services = Services {
        story,
        warmer: Arc::new(HttpMediaWarmer::new(
            client,
            config.api.base_url.clone(),
            config.api.token.clone(),
        )),
    };
    let mut handle = spawn_session(session, opening, services);
    let commands = handle.commands();
    let _ = commands.send(Command::ViewportWidth(VIEWPORT_WIDTH)).await;

    if config.realtime.enabled {
        let mut events = spawn_realtime(config.api.base_url.clone(), config.api.token.clone());
        let commands = commands.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    RealtimeEvent::ItemDeleted(item_id) => {
                        if commands.send(Command::ItemDeleted(item_id)).await.is_err() {
                            break;
                        }
                    }
                    other => tracing::debug!("Realtime: {:?}", other),
                }
            }
        });
    }

    println!("{HELP}");
    let mut snapshots = handle.watch_snapshots();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut interrupted = false;
    let mut last_token = None;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let Some(view) = snapshots.borrow_and_update().clone() else {
                    break;
                };
                if last_token != Some(view.item_token) {
                    last_token = Some(view.item_token);
                    tracing::info!(
                        "Now showing {} ({}/{})",
                        view.item_id,
                        view.collection_index,
                        view.item_index
                    );
                    // No real player here; report playback as started right away.
                    let _ = commands
                        .send(Command::Media { token: view.item_token, signal: MediaSignal::Playing })
                        .await;
                }
            }
            line = lines.next_line(), if stdin_open => {
                match line.context("Failed to read stdin")? {
                    Some(line) => match parse_command(&line) {
                        Some(command) => {
                            let _ = commands.send(command).await;
                        }
                        None => println!("{HELP}"),
                    },
                    None => {
                        stdin_open = false;
                        let _ = commands.send(Command::Close).await;
                    }
                }
            }
            Some(event) = handle.next_event() => log_event(event),
            // A completed signal future must not be polled again.
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                tracing::info!("Interrupted");
                let _ = commands.send(Command::Close).await;
            }
        }
    }

    while let Some(event) = handle.try_next_event() {
        log_event(event);
    }
    handle.join().await;
    Ok(())
}

fn log_event(event: HostEvent) {
    match event {
        HostEvent::Burst(burst) => tracing::info!(
            "{} x{} on {}",
            burst.symbol,
            burst.particles.len(),
            burst.item_id
        ),
        HostEvent::Notice(notice) => match notice.level {
            NoticeLevel::Info => tracing::info!("{}", notice.message),
            NoticeLevel::Error => tracing::warn!("{}", notice.message),
        },
        HostEvent::Closed => tracing::info!("Viewer closed"),
    }
}

fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    let (word, rest) = match line.split_once(' ') {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word {
        "n" | "next" => Command::Key(Key::ArrowRight),
        "p" | "prev" => Command::Key(Key::ArrowLeft),
        "space" | "s" => Command::Key(Key::Space),
        "q" | "esc" => Command::Key(Key::Escape),
        "r" if !rest.is_empty() => Command::React(rest.to_string()),
        "t" => Command::TapReaction,
        "report" if !rest.is_empty() => Command::Report(rest.to_string()),
        "v" => Command::OpenOverlay(OverlayKind::ViewerList),
        "c" => Command::CloseOverlay,
        "d" => Command::RequestDelete,
        "y" => Command::ConfirmDelete,
        "tap" => Command::Tap {
            x: rest.parse().ok()?,
        },
        _ => return None,
    };
    Some(command)
}
