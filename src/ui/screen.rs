use ratatui::Frame;

use crate::ui::{render_feedback, render_summary, ChatView};

/// A UI Screen boundary: responsible for rendering one stage of the session
pub trait Screen {
    fn render(&self, view: &ChatView, f: &mut Frame);
}

/// Chat screen - intro, exchange and submit mode
pub struct ChatScreen;

impl Screen for ChatScreen {
    fn render(&self, view: &ChatView, f: &mut Frame) {
        f.render_widget(view, f.area());
    }
}

/// Feedback screen - examiner feedback plus the rating prompt
pub struct FeedbackScreen;

impl Screen for FeedbackScreen {
    fn render(&self, view: &ChatView, f: &mut Frame) {
        let area = f.area();
        render_feedback(view, area, f.buffer_mut());
    }
}

pub struct SummaryScreen;

impl Screen for SummaryScreen {
    fn render(&self, view: &ChatView, f: &mut Frame) {
        let area = f.area();
        if let Some(summary) = &view.summary {
            render_summary(summary, view.status.as_deref(), area, f.buffer_mut());
        }
    }
}

/// Helper to construct the appropriate screen for the current view
pub fn current_screen(view: &ChatView) -> Box<dyn Screen> {
    if view.summary.is_some() {
        Box::new(SummaryScreen)
    } else if view.feedback.is_some() {
        Box::new(FeedbackScreen)
    } else {
        Box::new(ChatScreen)
    }
}
