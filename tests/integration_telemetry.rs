// Behavioural telemetry as seen by the server: batching, retry, the final
// flush and cadence anomalies raised from live keystrokes.

mod common;

use std::time::Duration;

use tokio::time::{sleep, Instant};

use common::{params, quiet_config, Harness};
use viva_client::backend::MemoryBackend;
use viva_client::config::{CadencePreset, Config, TelemetryMode};
use viva_client::protocol::EventType;
use viva_client::runtime::{CopySource, Key, Keystroke, UiEvent};

fn batched_types(backend: &MemoryBackend) -> Vec<EventType> {
    backend
        .batches()
        .iter()
        .flat_map(|batch| batch.events.iter().map(|e| e.event_type))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn focus_changes_are_batched_after_the_flush_delay() {
    let h = Harness::spawn(quiet_config(), params(600), MemoryBackend::new());
    h.push(UiEvent::Start);
    h.push(UiEvent::FocusLost);
    h.push(UiEvent::FocusGained);

    sleep(Duration::from_millis(799)).await;
    assert!(h.backend.batches().is_empty());

    sleep(Duration::from_millis(2)).await;
    assert_eq!(h.backend.batches().len(), 1);
    assert_eq!(
        batched_types(&h.backend),
        vec![EventType::Blur, EventType::Focus]
    );
    assert!(h.backend.singles().is_empty());
    h.quit().await;
}

#[tokio::test(start_paused = true)]
async fn failed_batch_is_retried_in_order() {
    let backend = MemoryBackend::new();
    backend.fail_next_logs(1);
    let h = Harness::spawn(quiet_config(), params(600), backend);
    h.push(UiEvent::Start);
    h.push(UiEvent::Paste("first".into()));

    sleep(Duration::from_millis(900)).await;
    assert!(h.backend.batches().is_empty());

    // Recorded while the retry is pending; must land after the requeued event.
    h.push(UiEvent::Cut);
    sleep(Duration::from_millis(1000)).await;

    assert_eq!(h.backend.batches().len(), 1);
    assert_eq!(
        batched_types(&h.backend),
        vec![EventType::Paste, EventType::Cut]
    );
    h.quit().await;
}

#[tokio::test(start_paused = true)]
async fn quitting_flushes_what_is_still_queued() {
    let h = Harness::spawn(quiet_config(), params(600), MemoryBackend::new());
    h.push(UiEvent::Start);
    h.push(UiEvent::Visibility { hidden: true });
    h.push(UiEvent::Copy {
        source: CopySource::Ai,
        length: 42,
    });
    h.push(UiEvent::Copy {
        source: CopySource::Student,
        length: 7,
    });

    let backend = h.backend.clone();
    h.quit().await;

    assert_eq!(
        batched_types(&backend),
        vec![EventType::Visibility, EventType::Copy]
    );
    let copy = &backend.batches()[0].events[1];
    assert_eq!(copy.event_data["length"], 42);
}

#[tokio::test(start_paused = true)]
async fn submit_flushes_viva_end_immediately() {
    let config = Config {
        allow_early_submit: true,
        ..quiet_config()
    };
    let h = Harness::spawn(config, params(600), MemoryBackend::new());
    h.push(UiEvent::Start);
    sleep(Duration::from_secs(3)).await;

    h.push(UiEvent::SendText("done".into()));
    h.push(UiEvent::Submit);
    sleep(Duration::from_millis(10)).await;

    let types = batched_types(&h.backend);
    assert_eq!(types, vec![EventType::VivaEnd]);
    let end = &h.backend.batches()[0].events[0];
    assert_eq!(end.event_data["duration_seconds"], 3);
    assert_eq!(end.event_data["reason"], "submitted");
    h.quit().await;
}

#[tokio::test(start_paused = true)]
async fn immediate_mode_posts_each_event_on_its_own() {
    let config = Config {
        telemetry_mode: TelemetryMode::Immediate,
        ..quiet_config()
    };
    let h = Harness::spawn(config, params(600), MemoryBackend::new());
    h.push(UiEvent::Start);
    h.push(UiEvent::FocusLost);
    h.push(UiEvent::Paste("x".into()));
    sleep(Duration::from_millis(10)).await;

    let singles: Vec<_> = h.backend.singles().iter().map(|e| e.event_type).collect();
    assert_eq!(singles, vec![EventType::Blur, EventType::Paste]);
    assert!(h.backend.batches().is_empty());
    h.quit().await;
}

#[tokio::test(start_paused = true)]
async fn typing_pause_is_reported_once_per_cooldown() {
    let config = Config {
        cadence: CadencePreset::Simple,
        ..quiet_config()
    };
    let h = Harness::spawn(config, params(600), MemoryBackend::new());
    h.push(UiEvent::Start);

    let base = Instant::now();
    let mut offsets: Vec<u64> = (0..9).map(|i| i * 100).collect();
    offsets.push(800 + 2000);
    offsets.push(800 + 4000);
    for offset in offsets {
        h.push(UiEvent::Key(Keystroke {
            key: Key::Char('a'),
            at: base + Duration::from_millis(offset),
        }));
    }
    sleep(Duration::from_secs(2)).await;

    let types = batched_types(&h.backend);
    let arrhythmic: Vec<_> = h
        .backend
        .batches()
        .iter()
        .flat_map(|batch| batch.events.clone())
        .filter(|e| e.event_type == EventType::ArrhythmicTyping)
        .collect();
    assert_eq!(arrhythmic.len(), 1);
    assert_eq!(arrhythmic[0].event_data["anomaly"], "spike");
    assert_eq!(arrhythmic[0].event_data["interval_ms"], 2000.0);
    // Summaries and raw keys stay local unless keystroke tracking is on.
    assert!(!types.contains(&EventType::TypingCadence));
    assert!(!types.contains(&EventType::Keypress));

    let report = h.quit().await;
    assert_eq!(report.summary.messages_sent, 0);
}
