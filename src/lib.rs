// Library surface for headless/integration tests and reuse.
// Keep this lean to avoid coupling to bin-only types in main.rs.
pub mod app_dirs;
pub mod backend;
pub mod cadence;
pub mod config;
pub mod countdown;
pub mod error;
pub mod logging;
pub mod poller;
pub mod protocol;
pub mod renderer;
pub mod runtime;
pub mod session;
pub mod telemetry;
pub mod util;

pub use error::{Result, VivaError};
pub use session::{Phase, SessionParams, SessionReport, SessionSummary, VivaSession};
