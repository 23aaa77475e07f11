mod common;

use common::{images, item};
use rand::rngs::StdRng;
use rand::SeedableRng;
use story_viewer::effect::{Effect, ServiceCall};
use story_viewer::gesture::{Key, Point};
use story_viewer::readiness::MediaSignal;
use story_viewer::realtime::{parse_message, RealtimeEvent};
use story_viewer::{EngineError, MediaType, Session, StoryCollection, ViewerConfig};

fn open(collections: Vec<StoryCollection>, config: &ViewerConfig) -> (Session, Vec<Effect>) {
    Session::open_with_rng(collections, 0, "me", config, StdRng::seed_from_u64(9)).unwrap()
}

fn tick_n(session: &mut Session, n: usize) -> Vec<Effect> {
    let mut out = Vec::new();
    for _ in 0..n {
        if let Some(handle) = session.clock_handle() {
            out.extend(session.tick(handle));
        }
    }
    out
}

#[test]
fn configured_image_window_drives_auto_advance() {
    let config = ViewerConfig::from_toml_str(
        r#"
        viewer_id = "me"
        [playback]
        image_duration_ms = 1000
        "#,
    )
    .unwrap();
    let (mut session, _) = open(vec![images("ana", 2)], &config);

    tick_n(&mut session, 19);
    assert_eq!(session.current_item().unwrap().id, "ana-0");
    tick_n(&mut session, 1);
    assert_eq!(session.current_item().unwrap().id, "ana-1");
}

#[test]
fn walks_every_item_then_closes() {
    let config = ViewerConfig::default();
    let (mut session, opening) = open(vec![images("ana", 2), images("ben", 1)], &config);

    let mut effects = opening;
    effects.extend(tick_n(&mut session, 300));
    assert!(session.is_closed());

    let viewed: Vec<&str> = effects
        .iter()
        .filter_map(|e| match e {
            Effect::Call(ServiceCall::RecordView { item_id, .. }) => Some(item_id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(viewed, ["ana-0", "ana-1", "ben-0"]);
    assert_eq!(
        effects.iter().filter(|e| matches!(e, Effect::Closed)).count(),
        1
    );
}

#[test]
fn keyboard_and_taps_share_navigation() {
    let (mut session, _) = open(vec![images("ana", 3)], &ViewerConfig::default());
    session.set_viewport_width(300.0);

    session.key(Key::from_name("ArrowRight"));
    session.tap(290.0);
    assert_eq!(session.position(), Some((0, 2)));
    session.key(Key::from_name("ArrowLeft"));
    assert_eq!(session.position(), Some((0, 1)));
    assert!(session.key(Key::from_name("Tab")).is_empty());
}

#[test]
fn vertical_drag_does_not_navigate() {
    let (mut session, _) = open(vec![images("ana", 2)], &ViewerConfig::default());
    session.set_viewport_width(300.0);
    session.pointer_down(Point::new(150.0, 100.0), 0);
    session.pointer_move(Point::new(60.0, 400.0));
    session.pointer_up(Point::new(60.0, 400.0), 100);
    assert_eq!(session.position(), Some((0, 0)));
}

#[test]
fn quick_flick_near_left_edge_moves_forward() {
    let (mut session, _) = open(vec![images("ana", 3)], &ViewerConfig::default());
    session.set_viewport_width(300.0);
    session.next();
    assert_eq!(session.position(), Some((0, 1)));

    // Starts in the "previous" tap zone but is a fast leftward flick.
    session.pointer_down(Point::new(50.0, 100.0), 0);
    session.pointer_up(Point::new(41.0, 100.0), 5);
    assert_eq!(session.position(), Some((0, 2)));
}

#[test]
fn media_error_skips_forward() {
    let collection = StoryCollection::new(
        "ana",
        vec![
            item("v1", "ana", MediaType::Video, 20),
            item("t1", "ana", MediaType::Text, 10),
        ],
    );
    let (mut session, _) = open(vec![collection], &ViewerConfig::default());
    let token = session.item_token();
    session.media_signal(token, MediaSignal::Error("network".into()));
    assert_eq!(session.current_item().unwrap().id, "t1");
}

#[test]
fn buffering_video_is_skipped_after_stall_window() {
    let config = ViewerConfig::from_toml_str(
        r#"
        viewer_id = "me"
        [playback]
        stall_timeout_ms = 3000
        "#,
    )
    .unwrap();
    let collection = StoryCollection::new(
        "ana",
        vec![
            item("v1", "ana", MediaType::Video, 20),
            item("t1", "ana", MediaType::Text, 10),
        ],
    );
    let (mut session, opening) = open(vec![collection], &config);
    let token = session.item_token();
    let armed = |effects: &[Effect]| {
        effects
            .iter()
            .find_map(|e| match e {
                Effect::ArmStallTimeout { epoch, after, .. } => Some((*epoch, *after)),
                _ => None,
            })
    };
    let (loading, after) = armed(&opening).unwrap();
    assert_eq!(after.as_millis(), 3000);

    session.media_signal(token, MediaSignal::Metadata { duration_ms: 6000.0 });
    session.media_signal(token, MediaSignal::Playing);
    let effects = session.media_signal(token, MediaSignal::Waiting);
    let (stalled, _) = armed(&effects).unwrap();
    assert_ne!(stalled, loading);

    // The window from the initial load no longer applies.
    assert!(session.stall_timeout(token, loading).is_empty());
    assert_eq!(session.current_item().unwrap().id, "v1");

    session.stall_timeout(token, stalled);
    assert_eq!(session.current_item().unwrap().id, "t1");
}

#[test]
fn realtime_delete_frame_removes_item() {
    let (mut session, _) = open(vec![images("ana", 2)], &ViewerConfig::default());
    let frame = r#"{"action":"delete","record":{"id":"ana-0"}}"#;
    let Some(RealtimeEvent::ItemDeleted(id)) = parse_message(frame) else {
        panic!("delete frame not recognised");
    };
    session.item_deleted(&id);
    assert_eq!(session.current_item().unwrap().id, "ana-1");
    assert_eq!(session.collections()[0].len(), 1);
}

#[test]
fn nothing_to_show_is_an_error() {
    let result = Session::open(Vec::new(), 0, "me", &ViewerConfig::default());
    assert!(matches!(result, Err(EngineError::NothingToShow)));
}
