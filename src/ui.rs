pub mod screen;

use std::io::Stdout;

use ratatui::{
    backend::CrosstermBackend,
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget, Wrap},
    Terminal,
};
use unicode_width::UnicodeWidthStr;
use webbrowser::Browser;

use viva_client::protocol::{Message, MessageSegment, Sender};
use viva_client::renderer::{SendLabel, TranscriptRenderer};
use viva_client::session::SessionSummary;

use crate::ui::screen::current_screen;

const HORIZONTAL_MARGIN: u16 = 2;
const TYPING_INDICATOR: &str = "examiner is typing ...";

/// Everything the terminal shows. Mutated by [`TuiRenderer`], drawn by the screens.
#[derive(Debug, Clone)]
pub struct ChatView {
    pub title: String,
    pub messages: Vec<Message>,
    pub placeholder: bool,
    pub input_enabled: bool,
    pub label: SendLabel,
    pub draft: String,
    pub timer: String,
    pub paused: bool,
    pub intro_visible: bool,
    pub feedback: Option<String>,
    pub rating_visible: bool,
    pub summary: Option<SessionSummary>,
    pub status: Option<String>,
    /// Which optional keys the help line advertises.
    pub early_submit: bool,
    pub pause_allowed: bool,
}

impl ChatView {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            messages: Vec::new(),
            placeholder: false,
            input_enabled: false,
            label: SendLabel::Send,
            draft: String::new(),
            timer: "00:00".to_string(),
            paused: false,
            intro_visible: true,
            feedback: None,
            rating_visible: false,
            summary: None,
            status: None,
            early_submit: false,
            pause_allowed: false,
        }
    }

    pub fn with_controls(mut self, early_submit: bool, pause_allowed: bool) -> Self {
        self.early_submit = early_submit;
        self.pause_allowed = pause_allowed;
        self
    }

    pub fn help_line(&self) -> String {
        if self.intro_visible {
            return "(enter) start  (esc) quit".to_string();
        }
        if self.label == SendLabel::Submit {
            return "time is up: (enter) submit final answer  (esc) quit".to_string();
        }
        let mut keys = vec!["(enter) send"];
        if self.early_submit {
            keys.push("(ctrl+s) submit");
        }
        if self.pause_allowed {
            keys.push("(ctrl+p) pause");
        }
        keys.extend(["(ctrl+y) copy question", "(esc) quit"]);
        keys.join("  ")
    }
}

/// Flatten the transcript into display lines. Student bubbles are right
/// aligned, examiner bubbles left aligned, fenced code is set apart.
pub fn transcript_lines(view: &ChatView) -> Vec<Line<'static>> {
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let examiner_style = Style::default().patch(bold).fg(Color::Cyan);
    let student_style = Style::default().patch(bold).fg(Color::Green);
    let code_style = Style::default().fg(Color::Yellow).bg(Color::Black);
    let dim_italic = Style::default().add_modifier(Modifier::DIM | Modifier::ITALIC);

    let mut lines = Vec::new();
    for message in &view.messages {
        let (name, style, alignment) = match message.sender {
            Sender::Student => ("You", student_style, Alignment::Right),
            Sender::Ai => ("Examiner", examiner_style, Alignment::Left),
            Sender::System => ("System", dim_italic, Alignment::Center),
        };
        lines.push(Line::from(Span::styled(name, style)).alignment(alignment));
        for segment in message.segments() {
            match segment {
                MessageSegment::Text(text) => {
                    for row in text.lines() {
                        lines.push(Line::from(row.to_string()).alignment(alignment));
                    }
                }
                MessageSegment::Code(code) => {
                    for row in code.lines() {
                        lines.push(Line::from(Span::styled(format!(" {row} "), code_style)));
                    }
                }
            }
        }
        lines.push(Line::default());
    }
    if view.placeholder {
        lines.push(Line::from(Span::styled(TYPING_INDICATOR, dim_italic)));
    }
    lines
}

/// Rows `lines` occupy once wrapped at `width` columns.
pub fn wrapped_height(lines: &[Line], width: u16) -> u16 {
    let width = width.max(1) as usize;
    let rows: usize = lines
        .iter()
        .map(|line| {
            let w: usize = line.spans.iter().map(|s| s.content.width()).sum();
            w.div_ceil(width).max(1)
        })
        .sum();
    rows.min(u16::MAX as usize) as u16
}

impl Widget for &ChatView {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let bold_style = Style::default().add_modifier(Modifier::BOLD);
        let dim_style = Style::default().add_modifier(Modifier::DIM);
        let red_bold_style = Style::default().patch(bold_style).fg(Color::Red);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(3),
                Constraint::Length(3),
                Constraint::Length(1),
            ])
            .split(area);

        let timer_style = if self.timer == "00:00" {
            red_bold_style
        } else {
            bold_style
        };
        let mut header = vec![
            Span::styled(self.title.clone(), bold_style),
            Span::raw("  "),
            Span::styled(self.timer.clone(), timer_style),
        ];
        if self.paused {
            header.push(Span::styled(" (paused)", dim_style));
        }
        Paragraph::new(Line::from(header)).render(chunks[0], buf);

        let lines = transcript_lines(self);
        let height = wrapped_height(&lines, chunks[1].width);
        let scroll = height.saturating_sub(chunks[1].height);
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .scroll((scroll, 0))
            .render(chunks[1], buf);

        let input_title = format!(" {} ", self.label);
        let input_style = if self.input_enabled {
            Style::default()
        } else {
            dim_style
        };
        let draft_width = self.draft.width();
        let inner_width = chunks[2].width.saturating_sub(2) as usize;
        // Keep the tail of a long draft visible.
        let visible = if draft_width > inner_width {
            let skip = self.draft.chars().count().saturating_sub(inner_width);
            self.draft.chars().skip(skip).collect::<String>()
        } else {
            self.draft.clone()
        };
        Paragraph::new(Span::styled(visible, input_style))
            .block(Block::default().borders(Borders::ALL).title(input_title))
            .render(chunks[2], buf);

        Paragraph::new(Span::styled(self.help_line(), dim_style))
            .alignment(Alignment::Center)
            .render(chunks[3], buf);
    }
}

pub fn render_feedback(view: &ChatView, area: Rect, buf: &mut Buffer) {
    let bold_style = Style::default().add_modifier(Modifier::BOLD);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .constraints([
            Constraint::Length(2),
            Constraint::Min(3),
            Constraint::Length(3),
        ])
        .split(area);

    Paragraph::new(Span::styled("Feedback", bold_style)).render(chunks[0], buf);
    let body = match (&view.feedback, view.placeholder) {
        (Some(text), _) => text.clone(),
        (None, true) => TYPING_INDICATOR.to_string(),
        (None, false) => String::new(),
    };
    Paragraph::new(body)
        .wrap(Wrap { trim: false })
        .render(chunks[1], buf);

    if view.rating_visible {
        Paragraph::new("How useful was this viva? (1) not at all ... (5) very")
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::TOP))
            .render(chunks[2], buf);
    }
}

pub fn render_summary(
    summary: &SessionSummary,
    status: Option<&str>,
    area: Rect,
    buf: &mut Buffer,
) {
    let bold_style = Style::default().add_modifier(Modifier::BOLD);
    let dim_style = Style::default().add_modifier(Modifier::DIM);

    let minutes = summary.duration_secs / 60;
    let seconds = summary.duration_secs % 60;
    let mut lines = vec![
        Line::from(Span::styled("Viva complete", bold_style)),
        Line::default(),
        Line::from(format!("session     {}", summary.session_id)),
        Line::from(format!("duration    {minutes}m {seconds:02}s")),
        Line::from(format!("answers     {}", summary.messages_sent)),
    ];
    if let Some(rating) = summary.rating {
        lines.push(Line::from(format!("rating      {rating}/5")));
    }
    lines.push(Line::default());
    lines.push(Line::from(Span::styled(summary.url.clone(), dim_style)));
    if let Some(status) = status {
        lines.push(Line::from(Span::styled(status.to_string(), dim_style)));
    }
    lines.push(Line::default());
    lines.push(Line::from(Span::styled("(esc)ape to exit", dim_style)));

    let height = lines.len() as u16;
    let top = area.height.saturating_sub(height) / 2;
    let centered = Rect {
        y: area.y + top,
        height: height.min(area.height),
        ..area
    };
    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .render(centered, buf);
}

/// Terminal-backed renderer. Calls only touch [`ChatView`]; `refresh` draws.
pub struct TuiRenderer {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    view: ChatView,
    dirty: bool,
}

impl TuiRenderer {
    pub fn new(terminal: Terminal<CrosstermBackend<Stdout>>, view: ChatView) -> Self {
        Self {
            terminal,
            view,
            dirty: true,
        }
    }

    fn touch(&mut self) -> &mut ChatView {
        self.dirty = true;
        &mut self.view
    }
}

impl TranscriptRenderer for TuiRenderer {
    fn render_message(&mut self, message: &Message) {
        self.touch().messages.push(message.clone());
    }

    fn show_placeholder(&mut self) {
        self.touch().placeholder = true;
    }

    fn hide_placeholder(&mut self) {
        self.touch().placeholder = false;
    }

    fn set_input_enabled(&mut self, enabled: bool) {
        self.touch().input_enabled = enabled;
    }

    fn set_send_label(&mut self, label: SendLabel) {
        self.touch().label = label;
    }

    fn set_draft(&mut self, draft: &str) {
        self.touch().draft = draft.to_string();
    }

    fn show_timer(&mut self, display: &str, paused: bool) {
        let view = self.touch();
        view.timer = display.to_string();
        view.paused = paused;
    }

    fn hide_intro(&mut self) {
        self.touch().intro_visible = false;
    }

    fn clear_transcript(&mut self) {
        self.touch().messages.clear();
    }

    fn show_feedback(&mut self, text: &str) {
        self.touch().feedback = Some(text.to_string());
    }

    fn show_rating(&mut self) {
        self.touch().rating_visible = true;
    }

    fn show_summary(&mut self, summary: &SessionSummary) {
        let view = self.touch();
        view.rating_visible = false;
        view.summary = Some(summary.clone());
    }

    fn navigate(&mut self, url: &str) {
        let opened = Browser::is_available() && webbrowser::open(url).is_ok();
        tracing::info!(url, opened, "summary page");
        self.touch().status = Some(if opened {
            "opened in your browser".to_string()
        } else {
            format!("open {url} to review the session")
        });
    }

    fn refresh(&mut self) {
        if !self.dirty {
            return;
        }
        self.dirty = false;
        let view = &self.view;
        if let Err(err) = self.terminal.draw(|f| current_screen(view).render(view, f)) {
            tracing::warn!(error = %err, "terminal draw failed");
        }
    }
}
