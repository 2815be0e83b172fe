use crossterm::event::{self, Event as CtEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;

use crate::cadence::KeyKind;

/// Key as seen by the session, independent of the terminal backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Backspace,
    Delete,
    Enter,
    Modifier,
    Other,
}

impl Key {
    pub fn kind(&self) -> KeyKind {
        match self {
            Key::Char(_) => KeyKind::Char,
            Key::Backspace => KeyKind::Backspace,
            Key::Delete => KeyKind::Delete,
            Key::Enter => KeyKind::Enter,
            Key::Modifier => KeyKind::Modifier,
            Key::Other => KeyKind::Other,
        }
    }
}

/// A key-down with the instant it was read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Keystroke {
    pub key: Key,
    pub at: Instant,
}

impl Keystroke {
    pub fn now(key: Key) -> Self {
        Self {
            key,
            at: Instant::now(),
        }
    }
}

/// Where a copied selection came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CopySource {
    Ai,
    Student,
    Draft,
}

/// Unified event type consumed by the session loop
#[derive(Clone, Debug, PartialEq)]
pub enum UiEvent {
    /// Begin the viva (leaves the intro panel).
    Start,
    Key(Keystroke),
    /// Send the current draft.
    Send,
    /// Send explicit text, bypassing the draft.
    SendText(String),
    Submit,
    Paste(String),
    Copy { source: CopySource, length: usize },
    /// Copy the latest examiner question.
    CopyQuestion,
    /// Cut the whole draft.
    Cut,
    FocusLost,
    FocusGained,
    Visibility { hidden: bool },
    TogglePause,
    Rate(u8),
    Resize,
    Quit,
}

/// Translate one crossterm event. `None` for events the session ignores.
pub fn map_event(ev: CtEvent, at: Instant) -> Option<UiEvent> {
    match ev {
        CtEvent::Key(key) => map_key(key, at),
        CtEvent::Paste(text) => Some(UiEvent::Paste(text)),
        CtEvent::FocusLost => Some(UiEvent::FocusLost),
        CtEvent::FocusGained => Some(UiEvent::FocusGained),
        CtEvent::Resize(_, _) => Some(UiEvent::Resize),
        CtEvent::Mouse(_) => None,
    }
}

fn map_key(key: KeyEvent, at: Instant) -> Option<UiEvent> {
    if key.kind == KeyEventKind::Release {
        return None;
    }
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let stroke = |key| Some(UiEvent::Key(Keystroke { key, at }));
    match key.code {
        KeyCode::Esc => Some(UiEvent::Quit),
        KeyCode::Char('c') if ctrl => Some(UiEvent::Quit),
        KeyCode::Char('p') if ctrl => Some(UiEvent::TogglePause),
        KeyCode::Char('s') if ctrl => Some(UiEvent::Submit),
        KeyCode::Char('y') if ctrl => Some(UiEvent::CopyQuestion),
        KeyCode::Char('x') if ctrl => Some(UiEvent::Cut),
        KeyCode::Char(_) if ctrl => stroke(Key::Other),
        KeyCode::Char(c) => stroke(Key::Char(c)),
        KeyCode::Backspace => stroke(Key::Backspace),
        KeyCode::Delete => stroke(Key::Delete),
        KeyCode::Enter => stroke(Key::Enter),
        KeyCode::Modifier(_) => stroke(Key::Modifier),
        _ => stroke(Key::Other),
    }
}

/// Production event source using crossterm.
///
/// Reads block on a dedicated thread and are forwarded into the async loop.
pub struct CrosstermEventSource {
    rx: UnboundedReceiver<UiEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        std::thread::spawn(move || loop {
            match event::read() {
                Ok(ev) => {
                    let Some(ui) = map_event(ev, Instant::now()) else {
                        continue;
                    };
                    if tx.send(ui).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "terminal event read failed");
                    break;
                }
            }
        });

        Self { rx }
    }

    pub fn into_receiver(self) -> UnboundedReceiver<UiEvent> {
        self.rx
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Scripted event source for headless runs.
pub struct TestEventSource {
    tx: UnboundedSender<UiEvent>,
}

impl TestEventSource {
    pub fn channel() -> (Self, UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn push(&self, ev: UiEvent) {
        let _ = self.tx.send(ev);
    }

    /// Type `text` as individual key-downs stamped with the current instant.
    pub fn type_text(&self, text: &str) {
        for c in text.chars() {
            self.push(UiEvent::Key(Keystroke::now(Key::Char(c))));
        }
    }
}
