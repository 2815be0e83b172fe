use std::sync::{Arc, Mutex, MutexGuard};

use strum_macros::Display;
use tokio::time::Instant;

use crate::protocol::Message;
use crate::session::SessionSummary;

/// Caption of the send action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SendLabel {
    Send,
    Submit,
    Submitted,
}

/// Everything the session needs from a view. Kept free of terminal types so
/// the controller can run headless.
pub trait TranscriptRenderer: Send {
    fn render_message(&mut self, message: &Message);
    fn show_placeholder(&mut self);
    fn hide_placeholder(&mut self);
    fn set_input_enabled(&mut self, enabled: bool);
    fn set_send_label(&mut self, label: SendLabel);
    fn set_draft(&mut self, draft: &str);
    fn show_timer(&mut self, display: &str, paused: bool);
    fn hide_intro(&mut self);
    fn clear_transcript(&mut self);
    fn show_feedback(&mut self, text: &str);
    fn show_rating(&mut self);
    fn show_summary(&mut self, summary: &SessionSummary);
    /// Open the summary page outside the client.
    fn navigate(&mut self, url: &str);
    /// Flush pending drawing, if the view buffers.
    fn refresh(&mut self) {}
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderOp {
    Message(Message),
    PlaceholderShown,
    PlaceholderHidden,
    InputEnabled(bool),
    Label(SendLabel),
    Draft(String),
    Timer { display: String, paused: bool },
    IntroHidden,
    Cleared,
    Feedback(String),
    Rating,
    Summary(SessionSummary),
    Navigate(String),
}

/// Records every call with the (tokio) instant it happened. Clones share the
/// same log, so a test can keep one while the session owns another.
#[derive(Debug, Clone, Default)]
pub struct RecordingRenderer {
    ops: Arc<Mutex<Vec<(Instant, RenderOp)>>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> Vec<(Instant, RenderOp)> {
        self.lock().clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock()
            .iter()
            .filter_map(|(_, op)| match op {
                RenderOp::Message(m) => Some(m.clone()),
                _ => None,
            })
            .collect()
    }

    /// When the first message with this text was rendered.
    pub fn message_rendered_at(&self, text: &str) -> Option<Instant> {
        self.first(|op| matches!(op, RenderOp::Message(m) if m.text == text))
    }

    pub fn first(&self, pred: impl Fn(&RenderOp) -> bool) -> Option<Instant> {
        self.lock()
            .iter()
            .find(|(_, op)| pred(op))
            .map(|(at, _)| *at)
    }

    pub fn count(&self, pred: impl Fn(&RenderOp) -> bool) -> usize {
        self.lock().iter().filter(|(_, op)| pred(op)).count()
    }

    /// Last value passed to `set_input_enabled`, if any.
    pub fn input_enabled(&self) -> Option<bool> {
        self.lock().iter().rev().find_map(|(_, op)| match op {
            RenderOp::InputEnabled(enabled) => Some(*enabled),
            _ => None,
        })
    }

    pub fn label(&self) -> Option<SendLabel> {
        self.lock().iter().rev().find_map(|(_, op)| match op {
            RenderOp::Label(label) => Some(*label),
            _ => None,
        })
    }

    pub fn last_timer(&self) -> Option<String> {
        self.lock().iter().rev().find_map(|(_, op)| match op {
            RenderOp::Timer { display, .. } => Some(display.clone()),
            _ => None,
        })
    }

    fn push(&self, op: RenderOp) {
        self.lock().push((Instant::now(), op));
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(Instant, RenderOp)>> {
        self.ops.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TranscriptRenderer for RecordingRenderer {
    fn render_message(&mut self, message: &Message) {
        self.push(RenderOp::Message(message.clone()));
    }

    fn show_placeholder(&mut self) {
        self.push(RenderOp::PlaceholderShown);
    }

    fn hide_placeholder(&mut self) {
        self.push(RenderOp::PlaceholderHidden);
    }

    fn set_input_enabled(&mut self, enabled: bool) {
        self.push(RenderOp::InputEnabled(enabled));
    }

    fn set_send_label(&mut self, label: SendLabel) {
        self.push(RenderOp::Label(label));
    }

    fn set_draft(&mut self, draft: &str) {
        self.push(RenderOp::Draft(draft.to_string()));
    }

    fn show_timer(&mut self, display: &str, paused: bool) {
        self.push(RenderOp::Timer {
            display: display.to_string(),
            paused,
        });
    }

    fn hide_intro(&mut self) {
        self.push(RenderOp::IntroHidden);
    }

    fn clear_transcript(&mut self) {
        self.push(RenderOp::Cleared);
    }

    fn show_feedback(&mut self, text: &str) {
        self.push(RenderOp::Feedback(text.to_string()));
    }

    fn show_rating(&mut self) {
        self.push(RenderOp::Rating);
    }

    fn show_summary(&mut self, summary: &SessionSummary) {
        self.push(RenderOp::Summary(summary.clone()));
    }

    fn navigate(&mut self, url: &str) {
        self.push(RenderOp::Navigate(url.to_string()));
    }
}
