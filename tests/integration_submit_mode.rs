// Expiry in submit mode through feedback, rating and the summary view.

mod common;

use std::time::Duration;

use tokio::time::{sleep, Instant};

use common::{params, quiet_config, Harness};
use viva_client::backend::MemoryBackend;
use viva_client::config::{Config, FeedbackVisibility};
use viva_client::protocol::{EventType, FeedbackPoll, SendResponse, START_SENTINEL};
use viva_client::renderer::{RenderOp, SendLabel};
use viva_client::runtime::UiEvent;
use viva_client::Phase;

fn backend_with_feedback(text: Option<&str>, visible: Option<bool>) -> MemoryBackend {
    let backend = MemoryBackend::new();
    backend.set_end_response(SendResponse {
        feedback_text: text.map(str::to_string),
        feedback_visible: visible,
        ..SendResponse::default()
    });
    backend
}

#[tokio::test(start_paused = true)]
async fn expiry_turns_send_into_submit_then_feedback_and_rating() {
    let backend = backend_with_feedback(Some("Good work"), Some(true));
    let h = Harness::spawn(quiet_config(), params(2), backend);
    h.push(UiEvent::Start);

    sleep(Duration::from_millis(2500)).await;
    assert_eq!(h.renderer.label(), Some(SendLabel::Submit));
    assert_eq!(h.renderer.input_enabled(), Some(true));
    assert_eq!(h.renderer.last_timer().as_deref(), Some("00:00"));
    assert!(h.renderer.first(|op| matches!(op, RenderOp::Navigate(_))).is_none());

    let submitted_at = Instant::now();
    h.push(UiEvent::SendText("final answer".into()));
    sleep(Duration::from_millis(2000)).await;

    let ended = h.backend.ended();
    assert_eq!(ended.len(), 1);
    assert_eq!(ended[0].text.as_deref(), Some("final answer"));
    assert_eq!(ended[0].duration_seconds, 2);
    assert!(ended[0].ended);
    assert_eq!(h.renderer.label(), Some(SendLabel::Submitted));
    assert_eq!(h.renderer.input_enabled(), Some(false));

    let cleared_at = h.renderer.first(|op| *op == RenderOp::Cleared).unwrap();
    let feedback_at = h
        .renderer
        .first(|op| matches!(op, RenderOp::Feedback(text) if text == "Good work"))
        .unwrap();
    assert_eq!(cleared_at, submitted_at);
    assert_eq!(feedback_at, cleared_at + Duration::from_millis(900));
    assert!(h.renderer.first(|op| *op == RenderOp::Rating).unwrap() >= feedback_at);

    // Nothing else can be sent once the final answer is in.
    h.push(UiEvent::SendText("late".into()));
    sleep(Duration::from_millis(10)).await;
    assert_eq!(h.backend.ended().len(), 1);
    assert!(h.backend.sent().iter().all(|r| r.text != "late"));

    h.push(UiEvent::Rate(4));
    sleep(Duration::from_millis(10)).await;
    let ratings: Vec<u8> = h.backend.ratings().iter().map(|r| r.rating).collect();
    assert_eq!(ratings, vec![4]);
    assert_eq!(
        h.renderer.count(|op| matches!(op, RenderOp::Summary(_))),
        1
    );

    let report = h.quit().await;
    assert_eq!(report.phase, Phase::Summary);
    assert_eq!(report.summary.rating, Some(4));
    assert_eq!(report.summary.feedback.as_deref(), Some("Good work"));
    assert_eq!(report.summary.duration_secs, 2);
}

#[tokio::test(start_paused = true)]
async fn expired_session_can_submit_an_empty_answer() {
    let backend = backend_with_feedback(None, Some(false));
    let h = Harness::spawn(quiet_config(), params(1), backend);
    h.push(UiEvent::Start);
    sleep(Duration::from_millis(1500)).await;

    h.push(UiEvent::Submit);
    sleep(Duration::from_millis(10)).await;

    let ended = h.backend.ended();
    assert_eq!(ended.len(), 1);
    assert_eq!(ended[0].text, None);
    // Feedback hidden by the server: straight to the summary, transcript untouched.
    assert!(h.renderer.first(|op| *op == RenderOp::Cleared).is_none());
    assert_eq!(
        h.renderer.count(|op| matches!(op, RenderOp::Summary(_))),
        1
    );

    let report = h.quit().await;
    assert_eq!(report.phase, Phase::Summary);
    assert_eq!(report.summary.feedback, None);
}

#[tokio::test(start_paused = true)]
async fn feedback_is_polled_until_ready() {
    let backend = backend_with_feedback(None, Some(true));
    let h = Harness::spawn(quiet_config(), params(1), backend.clone());
    h.push(UiEvent::Start);
    sleep(Duration::from_millis(1500)).await;

    h.push(UiEvent::SendText("answer".into()));
    sleep(Duration::from_millis(3000)).await;
    assert!(h.renderer.first(|op| matches!(op, RenderOp::Feedback(_))).is_none());
    assert_eq!(h.renderer.count(|op| *op == RenderOp::PlaceholderShown), 2);

    backend.set_feedback(FeedbackPoll {
        ready: true,
        strengths: Some("Clear reasoning".into()),
        improvements: Some("Cite sources".into()),
        ..FeedbackPoll::default()
    });
    sleep(Duration::from_millis(2500)).await;

    assert!(h.renderer.ops().iter().any(|(_, op)| matches!(
        op,
        RenderOp::Feedback(text)
            if text == "Strengths: Clear reasoning\n\nImprovements: Cite sources"
    )));
    assert!(h.renderer.first(|op| *op == RenderOp::Rating).is_some());

    let report = h.quit().await;
    assert_eq!(report.phase, Phase::Feedback);
}

#[tokio::test(start_paused = true)]
async fn feedback_that_never_arrives_falls_back_to_summary() {
    let mut config = quiet_config();
    config.timings.feedback_poll_attempts = 3;
    let h = Harness::spawn(config, params(1), backend_with_feedback(None, Some(true)));
    h.push(UiEvent::Start);
    sleep(Duration::from_millis(1500)).await;

    let submitted_at = Instant::now();
    h.push(UiEvent::Submit);
    sleep(Duration::from_secs(10)).await;

    assert!(h.renderer.first(|op| matches!(op, RenderOp::Feedback(_))).is_none());
    let summary_at = h
        .renderer
        .first(|op| matches!(op, RenderOp::Summary(_)))
        .unwrap();
    // Three polls, two waits of 2 s between them.
    assert_eq!(summary_at, submitted_at + Duration::from_secs(4));

    let report = h.quit().await;
    assert_eq!(report.phase, Phase::Summary);
}

#[tokio::test(start_paused = true)]
async fn configured_hidden_feedback_skips_the_feedback_view() {
    let config = Config {
        feedback_visibility: FeedbackVisibility::Hidden,
        allow_early_submit: true,
        ..quiet_config()
    };
    // The server does not say either way, so the config decides.
    let backend = backend_with_feedback(Some("Not for students yet"), None);
    let h = Harness::spawn(config, params(600), backend);
    h.push(UiEvent::Start);
    sleep(Duration::from_secs(5)).await;

    h.push(UiEvent::SendText("early finish".into()));
    h.push(UiEvent::Submit);
    sleep(Duration::from_secs(2)).await;

    // Active + early submit: the first SendText is a regular answer.
    assert_eq!(h.backend.sent().last().map(|r| r.text.as_str()), Some("early finish"));
    assert_eq!(h.backend.ended().len(), 1);
    assert!(h.renderer.first(|op| matches!(op, RenderOp::Feedback(_))).is_none());

    let report = h.quit().await;
    assert_eq!(report.phase, Phase::Summary);
    assert_eq!(report.summary.duration_secs, 5);
    assert_eq!(report.summary.messages_sent, 1);
}

#[tokio::test(start_paused = true)]
async fn repeated_start_expires_and_ends_once() {
    let backend = backend_with_feedback(None, None);
    let h = Harness::spawn(quiet_config(), params(3), backend.clone());
    let t0 = Instant::now();
    h.push(UiEvent::Start);
    sleep(Duration::from_millis(1500)).await;
    h.push(UiEvent::Start);
    sleep(Duration::from_secs(5)).await;

    let expired =
        |op: &RenderOp| matches!(op, RenderOp::Timer { display, .. } if display == "00:00");
    assert_eq!(h.renderer.count(expired), 1);
    assert_eq!(h.renderer.first(expired), Some(t0 + Duration::from_secs(3)));
    let starts = backend
        .sent()
        .iter()
        .filter(|r| r.text == START_SENTINEL)
        .count();
    assert_eq!(starts, 1);

    h.push(UiEvent::Submit);
    sleep(Duration::from_millis(10)).await;
    h.push(UiEvent::Submit);
    let report = h.quit().await;

    assert_eq!(report.summary.duration_secs, 3);
    assert_eq!(backend.ended().len(), 1);
    let viva_ends = backend
        .batches()
        .iter()
        .flat_map(|batch| batch.events.iter())
        .filter(|event| event.event_type == EventType::VivaEnd)
        .count();
    assert_eq!(viva_ends, 1);
}
