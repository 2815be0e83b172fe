//! Session lifecycle controller.
//!
//! One [`VivaSession`] owns the countdown, poller, cadence monitor and
//! telemetry emitter for a single attempt and multiplexes them with UI events
//! and network completions on one task. Network calls run as spawned tasks
//! that report back over a channel; nothing here blocks on the network.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::json;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;

use crate::backend::VivaBackend;
use crate::cadence::{CadenceMonitor, CadenceSignal};
use crate::config::{Config, ExpiryPolicy, FeedbackVisibility, TelemetryMode};
use crate::countdown::{Countdown, Tick};
use crate::error::{Result, VivaError};
use crate::poller::{Placeholder, TranscriptPoller};
use crate::protocol::{
    EndRequest, EventType, FeedbackPoll, Message, RatingRequest, SendRequest, SendResponse,
    Sender, SessionId, TelemetryEvent, TranscriptResponse, START_SENTINEL,
};
use crate::renderer::{SendLabel, TranscriptRenderer};
use crate::runtime::{CopySource, Key, Keystroke, UiEvent};
use crate::telemetry::TelemetryEmitter;
use crate::util::sleep_until_opt;

const INTRO_JITTER_MS: std::ops::RangeInclusive<u64> = 900..=1800;
const PASTE_SNIPPET_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Phase {
    NotStarted,
    Active,
    /// Time is up; one final message may still be submitted.
    SubmitPending,
    Submitted,
    Feedback,
    Summary,
    /// Timed out under the redirect policy; waiting to navigate away.
    Expired,
}

/// Server-seeded timing for one attempt.
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub session_id: SessionId,
    pub total_secs: u64,
    pub remaining_secs: u64,
    /// The server already considers the attempt over (page reloaded after expiry).
    pub already_ended: bool,
}

impl SessionParams {
    pub fn new(session_id: SessionId, total_secs: u64, remaining_secs: u64) -> Self {
        Self {
            session_id,
            total_secs,
            remaining_secs,
            already_ended: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub duration_secs: u64,
    pub messages_sent: usize,
    pub feedback: Option<String>,
    pub rating: Option<u8>,
    pub url: String,
}

/// What `run` hands back once the loop ends.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub phase: Phase,
    pub cursor: usize,
    pub rendered: usize,
    pub summary: SessionSummary,
}

#[derive(Debug)]
enum NetEvent {
    Transcript(Result<TranscriptResponse>),
    Sent(Result<SendResponse>),
    Ended(Result<SendResponse>),
    Feedback { attempt: u32, result: Result<FeedbackPoll> },
    Rated(Result<()>),
}

#[derive(Debug, Clone, PartialEq)]
enum Scheduled {
    Intro,
    Navigate,
    RevealFeedback(String),
    PollFeedback(u32),
}

/// Deadline-ordered one-shot jobs.
#[derive(Debug, Default)]
struct Schedule {
    jobs: Vec<(Instant, Scheduled)>,
}

impl Schedule {
    fn at(&mut self, deadline: Instant, job: Scheduled) {
        let idx = self.jobs.partition_point(|(at, _)| *at <= deadline);
        self.jobs.insert(idx, (deadline, job));
    }

    fn cancel(&mut self, pred: impl Fn(&Scheduled) -> bool) -> bool {
        let before = self.jobs.len();
        self.jobs.retain(|(_, job)| !pred(job));
        self.jobs.len() != before
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.jobs.first().map(|(at, _)| *at)
    }

    fn take_due(&mut self, now: Instant) -> Vec<Scheduled> {
        let n = self.jobs.partition_point(|(at, _)| *at <= now);
        self.jobs.drain(..n).map(|(_, job)| job).collect()
    }
}

pub struct VivaSession<R: TranscriptRenderer> {
    config: Config,
    session_id: SessionId,
    backend: Arc<dyn VivaBackend>,
    renderer: R,
    phase: Phase,
    countdown: Countdown,
    poller: TranscriptPoller,
    placeholder: Placeholder,
    telemetry: TelemetryEmitter,
    cadence: CadenceMonitor,
    draft: String,
    schedule: Schedule,
    net_tx: UnboundedSender<NetEvent>,
    net_rx: UnboundedReceiver<NetEvent>,
    last_question: Option<String>,
    feedback: Option<String>,
    rating: Option<u8>,
    messages_sent: usize,
    rendered: usize,
    ended_at_secs: Option<u64>,
}

impl<R: TranscriptRenderer> VivaSession<R> {
    pub fn new(
        config: Config,
        params: SessionParams,
        backend: Arc<dyn VivaBackend>,
        renderer: R,
    ) -> Self {
        let (net_tx, net_rx) = mpsc::unbounded_channel();
        let countdown = Countdown::new(
            params.total_secs,
            params.remaining_secs,
            params.already_ended,
        );
        let poller = TranscriptPoller::new(
            config.timings.poll_interval(),
            config.timings.min_typing(),
        );
        let telemetry =
            TelemetryEmitter::new(Arc::clone(&backend), params.session_id.clone(), &config);
        let cadence = CadenceMonitor::new(config.cadence.config());

        Self {
            session_id: params.session_id,
            config,
            backend,
            renderer,
            phase: Phase::NotStarted,
            countdown,
            poller,
            placeholder: Placeholder::default(),
            telemetry,
            cadence,
            draft: String::new(),
            schedule: Schedule::default(),
            net_tx,
            net_rx,
            last_question: None,
            feedback: None,
            rating: None,
            messages_sent: 0,
            rendered: 0,
            ended_at_secs: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn countdown(&self) -> &Countdown {
        &self.countdown
    }

    pub fn cursor(&self) -> usize {
        self.poller.cursor()
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn telemetry(&self) -> &TelemetryEmitter {
        &self.telemetry
    }

    /// Paint the pre-start view and schedule the intro message.
    pub fn open(&mut self) {
        self.renderer.show_timer(&self.countdown.display(), false);
        self.renderer.set_send_label(SendLabel::Send);
        self.renderer.set_input_enabled(false);
        if self.phase == Phase::NotStarted && self.config.intro_text.is_some() {
            self.show_placeholder(Instant::now());
            let jitter = rand::thread_rng().gen_range(INTRO_JITTER_MS);
            self.schedule
                .at(Instant::now() + Duration::from_millis(jitter), Scheduled::Intro);
        }
    }

    pub fn start(&mut self) {
        if self.phase != Phase::NotStarted {
            return;
        }
        if self.schedule.cancel(|job| *job == Scheduled::Intro) {
            self.hide_placeholder();
        }
        self.phase = Phase::Active;
        self.renderer.hide_intro();
        self.poller.start();
        tracing::info!(
            session_id = %self.session_id,
            remaining = self.countdown.remaining(),
            "viva started"
        );

        match self.countdown.start() {
            Tick::Expired => {
                self.renderer.show_timer(&self.countdown.display(), false);
                self.on_expired();
            }
            _ => {
                self.renderer.show_timer(&self.countdown.display(), false);
                self.renderer.set_input_enabled(true);
                self.show_placeholder(Instant::now());
                self.post_message(START_SENTINEL.to_string());
            }
        }
    }

    /// Send `text` as the student's next answer. After expiry this is the
    /// final submission; in any other phase but `Active` it does nothing.
    pub fn send(&mut self, text: &str) {
        match self.phase {
            Phase::SubmitPending => return self.submit_text(text),
            Phase::Active => {}
            _ => return,
        }
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        self.renderer.render_message(&Message::new(Sender::Student, text));
        self.messages_sent += 1;
        self.set_draft(String::new());
        self.show_placeholder(Instant::now());
        self.post_message(text.to_string());
    }

    /// Finalise with whatever is in the draft.
    pub fn submit(&mut self) {
        let draft = self.draft.clone();
        self.submit_text(&draft);
    }

    pub fn submit_text(&mut self, text: &str) {
        let allowed = match self.phase {
            Phase::SubmitPending => true,
            Phase::Active => self.config.allow_early_submit,
            _ => false,
        };
        if !allowed {
            return;
        }

        let text = text.trim();
        let final_text = (!text.is_empty()).then(|| text.to_string());
        if let Some(text) = &final_text {
            self.renderer
                .render_message(&Message::new(Sender::Student, text.as_str()));
            self.messages_sent += 1;
        }

        self.countdown.stop();
        self.poller.stop();
        self.poller.clear_pending();
        self.hide_placeholder();
        self.set_draft(String::new());

        let duration = self.countdown.elapsed_secs();
        self.ended_at_secs = Some(duration);
        self.phase = Phase::Submitted;
        self.renderer.set_send_label(SendLabel::Submitted);
        self.renderer.set_input_enabled(false);
        tracing::info!(
            session_id = %self.session_id,
            duration,
            final_text = final_text.is_some(),
            "viva submitted"
        );

        self.telemetry.record(TelemetryEvent::new(
            EventType::VivaEnd,
            json!({ "duration_seconds": duration, "reason": "submitted" }),
        ));
        self.telemetry.flush();

        let backend = Arc::clone(&self.backend);
        let req = EndRequest::new(self.session_id.clone(), final_text, duration);
        self.spawn_net(async move { NetEvent::Ended(backend.end_session(&req).await) });
    }

    /// Rate the feedback on a 1-5 scale. Ignored outside the feedback view.
    pub fn rate(&mut self, rating: u8) -> Result<()> {
        if !(1..=5).contains(&rating) {
            return Err(VivaError::InvalidRating(rating));
        }
        if self.phase != Phase::Feedback {
            return Ok(());
        }
        self.rating = Some(rating);
        let backend = Arc::clone(&self.backend);
        let req = RatingRequest {
            session_id: self.session_id.clone(),
            rating,
        };
        self.spawn_net(async move { NetEvent::Rated(backend.submit_rating(&req).await) });
        self.show_summary();
        Ok(())
    }

    pub fn toggle_pause(&mut self) {
        if self.phase != Phase::Active {
            return;
        }
        if !self.config.allow_pause {
            tracing::debug!(session_id = %self.session_id, "pause is disabled, ignoring");
            return;
        }
        let state = self.countdown.toggle_pause();
        tracing::debug!(session_id = %self.session_id, ?state, "countdown toggled");
        self.renderer
            .show_timer(&self.countdown.display(), !self.countdown.is_running());
    }

    pub fn handle_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::Start => self.start(),
            UiEvent::Key(stroke) => self.on_key(stroke),
            UiEvent::Send => {
                let draft = self.draft.clone();
                self.send(&draft);
            }
            UiEvent::SendText(text) => self.send(&text),
            UiEvent::Submit => self.submit(),
            UiEvent::Paste(text) => self.on_paste(text),
            UiEvent::Copy { source, length } => {
                if self.tracking() {
                    self.telemetry.record_copy(source, length);
                }
            }
            UiEvent::CopyQuestion => {
                if let (true, Some(question)) = (self.tracking(), &self.last_question) {
                    let length = question.chars().count();
                    self.telemetry.record_copy(CopySource::Ai, length);
                }
            }
            UiEvent::Cut => self.on_cut(),
            UiEvent::FocusLost => self.track(TelemetryEvent::bare(EventType::Blur)),
            UiEvent::FocusGained => self.track(TelemetryEvent::bare(EventType::Focus)),
            UiEvent::Visibility { hidden } => {
                let state = if hidden { "hidden" } else { "visible" };
                self.track(TelemetryEvent::new(
                    EventType::Visibility,
                    json!({ "state": state }),
                ));
            }
            UiEvent::TogglePause => self.toggle_pause(),
            UiEvent::Rate(rating) => {
                if let Err(err) = self.rate(rating) {
                    tracing::debug!(error = %err, "rating rejected");
                }
            }
            UiEvent::Resize => self.renderer.refresh(),
            UiEvent::Quit => {}
        }
    }

    /// Drive the session until the UI quits or its channel closes.
    pub async fn run(mut self, mut events: UnboundedReceiver<UiEvent>) -> SessionReport {
        self.open();
        self.renderer.refresh();
        loop {
            let render_at = self.poller.next_due();
            let job_at = self.schedule.next_deadline();
            tokio::select! {
                event = events.recv() => match event {
                    Some(UiEvent::Quit) | None => break,
                    Some(event) => self.handle_event(event),
                },
                _ = self.countdown.wait() => self.on_second(),
                _ = self.poller.tick() => self.on_poll_tick(),
                _ = sleep_until_opt(render_at) => self.on_render_due(),
                wake = self.telemetry.wake() => self.telemetry.handle(wake),
                Some(net) = self.net_rx.recv() => self.on_net(net),
                _ = sleep_until_opt(job_at) => self.on_schedule(),
            }
            self.renderer.refresh();
        }
        self.shutdown().await;
        self.report()
    }

    /// Stop timers and give queued telemetry one last chance to go out.
    pub async fn shutdown(&mut self) {
        self.countdown.stop();
        self.poller.stop();
        self.telemetry
            .shutdown_flush(self.config.timings.shutdown_flush())
            .await;
        tracing::info!(session_id = %self.session_id, phase = %self.phase, "session closed");
    }

    pub fn report(&self) -> SessionReport {
        SessionReport {
            phase: self.phase,
            cursor: self.poller.cursor(),
            rendered: self.rendered,
            summary: self.summary(),
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            duration_secs: self
                .ended_at_secs
                .unwrap_or_else(|| self.countdown.elapsed_secs()),
            messages_sent: self.messages_sent,
            feedback: self.feedback.clone(),
            rating: self.rating,
            url: self.config.summary_url(&self.session_id),
        }
    }

    fn tracking(&self) -> bool {
        matches!(self.phase, Phase::Active | Phase::SubmitPending)
    }

    fn track(&mut self, event: TelemetryEvent) {
        if self.tracking() {
            self.telemetry.record(event);
        }
    }

    fn on_key(&mut self, stroke: Keystroke) {
        match self.phase {
            Phase::NotStarted => {
                if stroke.key == Key::Enter {
                    self.start();
                }
                return;
            }
            Phase::Feedback => {
                if let Key::Char(c) = stroke.key {
                    if let Some(rating) = c.to_digit(10) {
                        self.handle_event(UiEvent::Rate(rating as u8));
                    }
                }
                return;
            }
            Phase::Active | Phase::SubmitPending => {}
            Phase::Submitted | Phase::Summary | Phase::Expired => return,
        }

        let kind = stroke.key.kind();
        if self.telemetry.mode() == TelemetryMode::Immediate {
            let key = match stroke.key {
                Key::Char(c) => c.to_string(),
                _ => kind.to_string(),
            };
            self.track(TelemetryEvent::new(EventType::Keypress, json!({ "key": key })));
        }
        for signal in self.cadence.observe(kind, stroke.at) {
            self.track(cadence_event(signal));
        }

        match stroke.key {
            Key::Char(c) => {
                let mut draft = std::mem::take(&mut self.draft);
                draft.push(c);
                self.set_draft(draft);
            }
            Key::Backspace => {
                let mut draft = std::mem::take(&mut self.draft);
                draft.pop();
                self.set_draft(draft);
            }
            Key::Enter => {
                let draft = self.draft.clone();
                self.send(&draft);
            }
            Key::Delete | Key::Modifier | Key::Other => {}
        }
    }

    fn on_paste(&mut self, text: String) {
        if !self.tracking() {
            return;
        }
        let snippet: String = text.chars().take(PASTE_SNIPPET_CHARS).collect();
        self.telemetry.record(TelemetryEvent::new(
            EventType::Paste,
            json!({ "length": text.chars().count(), "text": snippet }),
        ));
        let mut draft = std::mem::take(&mut self.draft);
        draft.push_str(&text);
        self.set_draft(draft);
    }

    fn on_cut(&mut self) {
        if !self.tracking() || self.draft.is_empty() {
            return;
        }
        let length = self.draft.chars().count();
        self.telemetry
            .record(TelemetryEvent::new(EventType::Cut, json!({ "length": length })));
        self.set_draft(String::new());
    }

    fn on_second(&mut self) {
        match self.countdown.tick() {
            Tick::Running(_) => self.renderer.show_timer(&self.countdown.display(), false),
            Tick::Expired => {
                self.renderer.show_timer(&self.countdown.display(), false);
                self.on_expired();
            }
            Tick::Idle => {}
        }
    }

    fn on_expired(&mut self) {
        if self.phase != Phase::Active {
            return;
        }
        let duration = self.countdown.elapsed_secs();
        tracing::info!(
            session_id = %self.session_id,
            policy = ?self.config.expiry_policy,
            "countdown expired"
        );
        match self.config.expiry_policy {
            ExpiryPolicy::SubmitMode => {
                self.phase = Phase::SubmitPending;
                self.renderer.set_input_enabled(true);
                self.renderer.set_send_label(SendLabel::Submit);
            }
            ExpiryPolicy::Redirect => {
                self.phase = Phase::Expired;
                self.ended_at_secs = Some(duration);
                self.poller.stop();
                self.poller.clear_pending();
                self.renderer.set_input_enabled(false);
                self.telemetry.send_now(TelemetryEvent::new(
                    EventType::VivaEnd,
                    json!({ "duration_seconds": duration, "reason": "timeout" }),
                ));
                self.schedule
                    .at(Instant::now() + self.config.timings.grace(), Scheduled::Navigate);
            }
        }
    }

    fn on_poll_tick(&mut self) {
        if !self.tracking() {
            return;
        }
        if !self.poller.begin_fetch() {
            tracing::trace!(session_id = %self.session_id, "poll skipped, fetch outstanding");
            return;
        }
        let backend = Arc::clone(&self.backend);
        let session = self.session_id.clone();
        self.spawn_net(async move {
            NetEvent::Transcript(backend.fetch_transcript(&session).await)
        });
    }

    fn on_render_due(&mut self) {
        let due = self.poller.take_due(Instant::now());
        if !self.tracking() {
            return;
        }
        for message in due {
            self.hide_placeholder();
            self.renderer.render_message(&message);
            self.last_question = Some(message.text);
            self.rendered += 1;
        }
        if self.poller.has_pending() {
            // Keep the indicator up for the next queued reply.
            self.show_placeholder(Instant::now());
        }
    }

    fn on_net(&mut self, event: NetEvent) {
        match event {
            NetEvent::Transcript(result) => {
                self.poller.finish_fetch();
                match result {
                    Ok(resp) if self.tracking() => {
                        let report =
                            self.poller
                                .reconcile(&resp.messages, &mut self.placeholder, Instant::now());
                        if report.placeholder_shown {
                            self.renderer.show_placeholder();
                        }
                        if report.scheduled + report.skipped > 0 {
                            tracing::debug!(
                                session_id = %self.session_id,
                                cursor = self.poller.cursor(),
                                scheduled = report.scheduled,
                                skipped = report.skipped,
                                "transcript reconciled"
                            );
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::debug!(
                            session_id = %self.session_id,
                            error = %err,
                            "transcript poll failed"
                        )
                    }
                }
            }
            NetEvent::Sent(Err(err)) => {
                tracing::warn!(session_id = %self.session_id, error = %err, "message send failed");
            }
            NetEvent::Sent(Ok(_)) => {}
            NetEvent::Ended(result) => self.on_ended(result),
            NetEvent::Feedback { attempt, result } => self.on_feedback(attempt, result),
            NetEvent::Rated(Err(err)) => {
                tracing::warn!(session_id = %self.session_id, error = %err, "rating not recorded");
            }
            NetEvent::Rated(Ok(())) => {}
        }
    }

    fn on_ended(&mut self, result: Result<SendResponse>) {
        if self.phase != Phase::Submitted {
            return;
        }
        let resp = match result {
            Ok(resp) => resp,
            Err(err) => {
                tracing::warn!(session_id = %self.session_id, error = %err, "end request failed");
                return self.show_summary();
            }
        };
        let visible = resp
            .feedback_visible
            .unwrap_or(self.config.feedback_visibility == FeedbackVisibility::Immediate);
        if !visible {
            return self.show_summary();
        }

        self.renderer.clear_transcript();
        let now = Instant::now();
        self.show_placeholder(now);
        match resp.feedback_text.filter(|text| !text.trim().is_empty()) {
            Some(text) => self.schedule.at(
                now + self.config.timings.feedback_delay(),
                Scheduled::RevealFeedback(text),
            ),
            None => self.poll_feedback(1),
        }
    }

    fn poll_feedback(&mut self, attempt: u32) {
        let backend = Arc::clone(&self.backend);
        let session = self.session_id.clone();
        self.spawn_net(async move {
            NetEvent::Feedback {
                attempt,
                result: backend.fetch_feedback(&session).await,
            }
        });
    }

    fn on_feedback(&mut self, attempt: u32, result: Result<FeedbackPoll>) {
        if self.phase != Phase::Submitted {
            return;
        }
        let text = match result {
            Ok(poll) => poll.to_text(),
            Err(err) => {
                tracing::debug!(
                    session_id = %self.session_id,
                    attempt,
                    error = %err,
                    "feedback poll failed"
                );
                None
            }
        };
        if let Some(text) = text {
            return self.reveal_feedback(text);
        }
        if attempt < self.config.timings.feedback_poll_attempts {
            self.schedule.at(
                Instant::now() + self.config.timings.feedback_poll(),
                Scheduled::PollFeedback(attempt + 1),
            );
        } else {
            tracing::info!(
                session_id = %self.session_id,
                attempt,
                "feedback not ready, showing summary"
            );
            self.show_summary();
        }
    }

    fn reveal_feedback(&mut self, text: String) {
        self.hide_placeholder();
        self.phase = Phase::Feedback;
        self.renderer.show_feedback(&text);
        self.renderer.show_rating();
        self.feedback = Some(text);
    }

    fn on_schedule(&mut self) {
        for job in self.schedule.take_due(Instant::now()) {
            match job {
                Scheduled::Intro => {
                    if self.phase != Phase::NotStarted {
                        continue;
                    }
                    self.hide_placeholder();
                    if let Some(intro) = self.config.intro_text.clone() {
                        self.renderer.render_message(&Message::new(Sender::Ai, intro));
                    }
                }
                Scheduled::Navigate => {
                    let url = self.config.summary_url(&self.session_id);
                    self.show_summary();
                    self.renderer.navigate(&url);
                }
                Scheduled::RevealFeedback(text) => {
                    if self.phase == Phase::Submitted {
                        self.reveal_feedback(text);
                    }
                }
                Scheduled::PollFeedback(attempt) => {
                    if self.phase == Phase::Submitted {
                        self.poll_feedback(attempt);
                    }
                }
            }
        }
    }

    fn show_summary(&mut self) {
        self.hide_placeholder();
        self.phase = Phase::Summary;
        let summary = self.summary();
        self.renderer.show_summary(&summary);
    }

    fn post_message(&self, text: String) {
        let backend = Arc::clone(&self.backend);
        let req = SendRequest {
            session_id: self.session_id.clone(),
            text,
        };
        self.spawn_net(async move { NetEvent::Sent(backend.send_message(&req).await) });
    }

    fn spawn_net<F>(&self, fut: F)
    where
        F: Future<Output = NetEvent> + Send + 'static,
    {
        let tx = self.net_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(fut.await);
        });
    }

    fn set_draft(&mut self, draft: String) {
        self.draft = draft;
        self.renderer.set_draft(&self.draft);
    }

    fn show_placeholder(&mut self, now: Instant) {
        if self.placeholder.show(now) {
            self.renderer.show_placeholder();
        }
    }

    fn hide_placeholder(&mut self) {
        if self.placeholder.hide() {
            self.renderer.hide_placeholder();
        }
    }
}

fn cadence_event(signal: CadenceSignal) -> TelemetryEvent {
    match signal {
        CadenceSignal::Arrhythmic {
            kind,
            interval_ms,
            baseline_ms,
        } => TelemetryEvent::new(
            EventType::ArrhythmicTyping,
            json!({
                "anomaly": kind.to_string(),
                "interval_ms": round1(interval_ms),
                "baseline_ms": round1(baseline_ms),
            }),
        ),
        CadenceSignal::Summary {
            median_ms,
            mean_ms,
            std_dev_ms,
            samples,
        } => TelemetryEvent::new(
            EventType::TypingCadence,
            json!({
                "median_ms": round1(median_ms),
                "mean_ms": round1(mean_ms),
                "std_dev_ms": round1(std_dev_ms),
                "samples": samples,
            }),
        ),
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
