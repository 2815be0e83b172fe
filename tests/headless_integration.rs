// Headless integration: drives a full VivaSession through TestEventSource with
// the in-memory backend and a recording renderer, on a paused tokio clock so
// every timing assertion is exact.

mod common;

use std::time::Duration;

use tokio::time::{sleep, Instant};

use common::{params, quiet_config, Harness};
use viva_client::backend::MemoryBackend;
use viva_client::config::{Config, ExpiryPolicy};
use viva_client::protocol::{EventType, Message, Sender};
use viva_client::renderer::RenderOp;
use viva_client::runtime::UiEvent;
use viva_client::Phase;

const MIN_TYPING: Duration = Duration::from_millis(3000);

#[tokio::test(start_paused = true)]
async fn redirect_policy_locks_input_and_ends_once() {
    let config = Config {
        expiry_policy: ExpiryPolicy::Redirect,
        ..quiet_config()
    };
    let h = Harness::spawn(config, params(2), MemoryBackend::new());
    let t0 = Instant::now();
    h.push(UiEvent::Start);

    sleep(Duration::from_secs(5)).await;

    assert_eq!(h.renderer.input_enabled(), Some(false));
    let expired_at = h
        .renderer
        .first(|op| matches!(op, RenderOp::Timer { display, .. } if display == "00:00"))
        .unwrap();
    assert_eq!(expired_at, t0 + Duration::from_secs(2));

    let viva_end: Vec<_> = h
        .backend
        .singles()
        .into_iter()
        .filter(|e| e.event_type == EventType::VivaEnd)
        .collect();
    assert_eq!(viva_end.len(), 1);

    let navigated_at = h
        .renderer
        .first(|op| matches!(op, RenderOp::Navigate(_)))
        .unwrap();
    assert_eq!(navigated_at, expired_at + Duration::from_millis(800));
    assert_eq!(
        h.renderer.count(|op| matches!(op, RenderOp::Navigate(_))),
        1
    );
    assert!(h.renderer.ops().iter().any(|(_, op)| matches!(
        op,
        RenderOp::Navigate(url) if url == "http://localhost:8000/viva/summary/101/"
    )));

    // Typing after the lock changes nothing.
    h.push(UiEvent::SendText("too late".into()));
    sleep(Duration::from_millis(10)).await;
    assert!(h.backend.sent().iter().all(|r| r.text != "too late"));

    let report = h.quit().await;
    assert_eq!(report.phase, Phase::Summary);
    assert_eq!(report.summary.duration_secs, 2);
}

#[tokio::test(start_paused = true)]
async fn examiner_reply_respects_minimum_typing_time() {
    let backend = MemoryBackend::new()
        .with_script(vec!["Opening question?".into(), "Hi there".into()])
        .with_fetch_delay(Duration::from_millis(100));
    let h = Harness::spawn(quiet_config(), params(600), backend);
    let t0 = Instant::now();
    h.push(UiEvent::Start);

    sleep(Duration::from_secs(5)).await;
    // First poll lands at 900 ms, but the question waits for the typing time.
    assert_eq!(
        h.renderer.message_rendered_at("Opening question?"),
        Some(t0 + MIN_TYPING)
    );

    let t1 = Instant::now();
    h.push(UiEvent::SendText("Hello".into()));
    sleep(Duration::from_secs(10)).await;

    let placeholder_at = h
        .renderer
        .ops()
        .into_iter()
        .find(|(at, op)| *at >= t1 && *op == RenderOp::PlaceholderShown)
        .map(|(at, _)| at)
        .unwrap();
    assert_eq!(placeholder_at, t1);

    let reply_at = h.renderer.message_rendered_at("Hi there").unwrap();
    assert!(reply_at >= placeholder_at + MIN_TYPING);
    assert_eq!(reply_at, t1 + MIN_TYPING);

    // The server echoes "Hello" back on every poll; it is drawn exactly once.
    let hellos = h
        .renderer
        .messages()
        .into_iter()
        .filter(|m| m.sender == Sender::Student && m.text == "Hello")
        .count();
    assert_eq!(hellos, 1);

    let report = h.quit().await;
    assert_eq!(report.cursor, 3);
    assert_eq!(report.rendered, 2);
    assert_eq!(report.phase, Phase::Active);
}

#[tokio::test(start_paused = true)]
async fn failed_polls_are_retried_on_the_next_tick() {
    let backend = MemoryBackend::new().with_script(vec!["Q1".into()]);
    backend.fail_next_fetches(3);
    let h = Harness::spawn(quiet_config(), params(600), backend);
    let t0 = Instant::now();
    h.push(UiEvent::Start);

    sleep(Duration::from_secs(6)).await;

    // Ticks at 0.8, 1.6 and 2.4 s fail; the 3.2 s tick succeeds.
    let rendered = h.renderer.message_rendered_at("Q1").unwrap();
    assert_eq!(rendered, t0 + Duration::from_millis(3200));
    assert!(h.backend.fetch_count() >= 4);
    h.quit().await;
}

#[tokio::test(start_paused = true)]
async fn slow_fetches_never_overlap() {
    let backend = MemoryBackend::new().with_fetch_delay(Duration::from_millis(2000));
    let h = Harness::spawn(quiet_config(), params(600), backend);
    h.push(UiEvent::Start);

    sleep(Duration::from_millis(8000)).await;

    // Without the single in-flight guard there would be ten fetches by now.
    let fetches = h.backend.fetch_count();
    assert!(fetches <= 4, "fetches = {fetches}");
    h.quit().await;
}

#[tokio::test(start_paused = true)]
async fn intro_message_appears_before_start_and_stays_local() {
    let h = Harness::spawn(Config::default(), params(600), MemoryBackend::new());
    let t0 = Instant::now();

    sleep(Duration::from_secs(3)).await;

    let intro = Config::default().intro_text.unwrap();
    let shown = h.renderer.message_rendered_at(&intro).unwrap();
    let jitter = shown - t0;
    assert!(jitter >= Duration::from_millis(900) && jitter <= Duration::from_millis(1800));
    assert!(h.backend.sent().is_empty());

    h.push(UiEvent::Start);
    sleep(Duration::from_millis(10)).await;
    assert_eq!(h.backend.sent().len(), 1);
    assert!(h.renderer.first(|op| *op == RenderOp::IntroHidden).is_some());

    let report = h.quit().await;
    assert_eq!(report.cursor, 0);
}

#[tokio::test(start_paused = true)]
async fn pause_freezes_the_countdown() {
    let config = Config {
        allow_pause: true,
        ..quiet_config()
    };
    let h = Harness::spawn(config, params(10), MemoryBackend::new());
    h.push(UiEvent::Start);

    sleep(Duration::from_millis(3500)).await;
    assert_eq!(h.renderer.last_timer().as_deref(), Some("00:07"));

    h.push(UiEvent::TogglePause);
    sleep(Duration::from_secs(20)).await;
    assert_eq!(h.renderer.last_timer().as_deref(), Some("00:07"));

    h.push(UiEvent::TogglePause);
    sleep(Duration::from_millis(2500)).await;
    assert_eq!(h.renderer.last_timer().as_deref(), Some("00:05"));

    let report = h.quit().await;
    assert_eq!(report.phase, Phase::Active);
}

#[tokio::test(start_paused = true)]
async fn pause_key_is_ignored_unless_allowed() {
    let config = Config {
        allow_early_submit: true,
        ..quiet_config()
    };
    let h = Harness::spawn(config, params(600), MemoryBackend::new());
    h.push(UiEvent::Start);

    sleep(Duration::from_millis(10_500)).await;
    h.push(UiEvent::TogglePause);
    sleep(Duration::from_secs(300)).await;
    assert_eq!(h.renderer.last_timer().as_deref(), Some("04:50"));
    assert_eq!(
        h.renderer
            .count(|op| matches!(op, RenderOp::Timer { paused: true, .. })),
        0
    );

    h.push(UiEvent::TogglePause);
    sleep(Duration::from_secs(5)).await;
    h.push(UiEvent::Submit);
    sleep(Duration::from_millis(100)).await;

    let report = h.quit().await;
    assert_eq!(report.summary.duration_secs, 315);
}

#[tokio::test(start_paused = true)]
async fn server_side_messages_never_duplicate_student_bubbles() {
    let backend = MemoryBackend::new();
    let h = Harness::spawn(quiet_config(), params(600), backend.clone());
    h.push(UiEvent::Start);

    for answer in ["one", "two", "three"] {
        h.push(UiEvent::SendText(answer.into()));
        sleep(Duration::from_millis(900)).await;
    }
    backend.push_message(Message::new(Sender::Ai, "Next?"));
    sleep(Duration::from_secs(5)).await;

    let students: Vec<_> = h
        .renderer
        .messages()
        .into_iter()
        .filter(|m| m.sender == Sender::Student)
        .map(|m| m.text)
        .collect();
    assert_eq!(students, vec!["one", "two", "three"]);
    assert_eq!(
        h.renderer.messages().last(),
        Some(&Message::new(Sender::Ai, "Next?"))
    );

    let report = h.quit().await;
    assert_eq!(report.cursor, 4);
}
