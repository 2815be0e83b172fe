#![allow(dead_code)]

use std::sync::Arc;

use tokio::task::JoinHandle;

use viva_client::backend::MemoryBackend;
use viva_client::config::Config;
use viva_client::protocol::SessionId;
use viva_client::renderer::RecordingRenderer;
use viva_client::runtime::{TestEventSource, UiEvent};
use viva_client::{SessionParams, SessionReport, VivaSession};

/// A running session plus the handles a test needs to poke and observe it.
pub struct Harness {
    pub backend: MemoryBackend,
    pub renderer: RecordingRenderer,
    pub source: TestEventSource,
    handle: JoinHandle<SessionReport>,
}

impl Harness {
    pub fn spawn(config: Config, params: SessionParams, backend: MemoryBackend) -> Self {
        let renderer = RecordingRenderer::new();
        let session = VivaSession::new(
            config,
            params,
            Arc::new(backend.clone()),
            renderer.clone(),
        );
        let (source, rx) = TestEventSource::channel();
        let handle = tokio::spawn(session.run(rx));
        Self {
            backend,
            renderer,
            source,
            handle,
        }
    }

    pub fn push(&self, event: UiEvent) {
        self.source.push(event);
    }

    pub async fn quit(self) -> SessionReport {
        self.source.push(UiEvent::Quit);
        self.handle.await.unwrap()
    }
}

/// Default config without the pre-start intro message.
pub fn quiet_config() -> Config {
    Config {
        intro_text: None,
        ..Config::default()
    }
}

pub fn params(remaining: u64) -> SessionParams {
    SessionParams::new(SessionId::new("101"), remaining, remaining)
}
