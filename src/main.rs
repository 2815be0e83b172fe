pub mod ui;

use std::{
    io::{self, stdin},
    path::PathBuf,
    sync::Arc,
};

use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    cursor::Show,
    event::{DisableBracketedPaste, DisableFocusChange, EnableBracketedPaste, EnableFocusChange},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{backend::CrosstermBackend, Terminal};

use viva_client::{
    backend::{HttpBackend, MemoryBackend, VivaBackend},
    config::{Config, ConfigStore, ExpiryPolicy, FileConfigStore},
    logging,
    protocol::SessionId,
    runtime::CrosstermEventSource,
    SessionParams, SessionReport, VivaSession,
};

use crate::ui::{ChatView, TuiRenderer};

const DEMO_SESSION: &str = "demo";

/// terminal client for timed viva chat sessions
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Runs one timed viva (oral exam) chat against the viva server: a countdown, \
                  the examiner's questions as they arrive, and best-effort behavioural telemetry."
)]
pub struct Cli {
    /// session id issued by the server
    #[clap(short = 's', long, required_unless_present = "demo")]
    session: Option<String>,

    /// server base url (overrides the config file)
    #[clap(short = 'u', long)]
    base_url: Option<String>,

    /// cookie string to send, must include csrftoken=...
    #[clap(long)]
    cookie: Option<String>,

    /// seconds remaining in this attempt
    #[clap(short = 't', long, default_value_t = 600)]
    seconds: u64,

    /// full length of the attempt in seconds (defaults to --seconds)
    #[clap(long)]
    total_seconds: Option<u64>,

    /// the server already ended this attempt
    #[clap(long)]
    ended: bool,

    /// config file to use instead of the default location
    #[clap(short = 'c', long)]
    config: Option<PathBuf>,

    /// lock input and open the summary page when time runs out
    #[clap(long)]
    legacy_expiry: bool,

    /// allow submitting before time runs out
    #[clap(long)]
    early_submit: bool,

    /// allow pausing the countdown
    #[clap(long)]
    allow_pause: bool,

    /// offline run against a scripted examiner
    #[clap(long)]
    demo: bool,
}

impl Cli {
    fn apply(&self, mut config: Config) -> Config {
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        if self.legacy_expiry {
            config.expiry_policy = ExpiryPolicy::Redirect;
        }
        if self.early_submit {
            config.allow_early_submit = true;
        }
        if self.allow_pause {
            config.allow_pause = true;
        }
        config
    }

    fn params(&self) -> SessionParams {
        let id = self.session.as_deref().unwrap_or(DEMO_SESSION);
        SessionParams {
            already_ended: self.ended,
            ..SessionParams::new(
                SessionId::new(id),
                self.total_seconds.unwrap_or(self.seconds),
                self.seconds,
            )
        }
    }

    fn config_store(&self) -> FileConfigStore {
        match &self.config {
            Some(path) => FileConfigStore::with_path(path),
            None => FileConfigStore::new(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let _logging = logging::init_logging()?;
    let config = cli.apply(cli.config_store().load());
    let params = cli.params();

    let backend: Arc<dyn VivaBackend> = if cli.demo {
        Arc::new(MemoryBackend::demo())
    } else {
        Arc::new(HttpBackend::new(config.clone(), cli.cookie.clone())?)
    };
    tracing::info!(
        session_id = %params.session_id,
        demo = cli.demo,
        base_url = %config.base_url,
        "starting viva client"
    );

    let mut guard = TerminalGuard::enter()?;
    let terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;

    let title = format!("Viva {}", params.session_id);
    let view = ChatView::new(title).with_controls(config.allow_early_submit, config.allow_pause);
    let renderer = TuiRenderer::new(terminal, view);
    let session = VivaSession::new(config, params, backend, renderer);
    let events = CrosstermEventSource::new().into_receiver();
    let report = session.run(events).await;

    guard.restore()?;
    print_report(&report);

    Ok(())
}

/// Raw mode plus the alternate screen, undone on drop.
struct TerminalGuard {
    active: bool,
}

impl TerminalGuard {
    fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        let guard = Self { active: true };
        execute!(
            io::stdout(),
            EnterAlternateScreen,
            EnableBracketedPaste,
            EnableFocusChange
        )?;
        Ok(guard)
    }

    fn restore(&mut self) -> io::Result<()> {
        if !std::mem::take(&mut self.active) {
            return Ok(());
        }
        disable_raw_mode()?;
        execute!(
            io::stdout(),
            DisableFocusChange,
            DisableBracketedPaste,
            LeaveAlternateScreen,
            Show
        )
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if let Err(err) = self.restore() {
            tracing::warn!(error = %err, "failed to restore terminal");
        }
    }
}

fn print_report(report: &SessionReport) {
    let summary = &report.summary;
    println!(
        "viva {}: {} after {}s, {} answer(s) sent",
        summary.session_id, report.phase, summary.duration_secs, summary.messages_sent
    );
    println!("summary: {}", summary.url);
}
