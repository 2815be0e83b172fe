use std::future;
use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::util::format_mmss;

const ONE_SECOND: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownState {
    Idle,
    Running,
    Paused,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Still counting; carries the new remaining seconds.
    Running(u64),
    /// Reached zero on this tick. Returned exactly once per run.
    Expired,
    /// Not running (idle, paused or already expired).
    Idle,
}

/// Per-session visible countdown.
///
/// Owns at most one interval handle: starting again replaces (and drops) the
/// previous one, so two decrement loops can never run side by side.
#[derive(Debug)]
pub struct Countdown {
    total: u64,
    remaining: u64,
    state: CountdownState,
    ticker: Option<Interval>,
}

impl Countdown {
    /// `already_ended` is for sessions resumed after a reload past expiry.
    pub fn new(total_secs: u64, remaining_secs: u64, already_ended: bool) -> Self {
        let remaining = if already_ended { 0 } else { remaining_secs };
        Self {
            total: total_secs.max(remaining),
            remaining,
            state: CountdownState::Idle,
            ticker: None,
        }
    }

    /// Begin (or restart) decrementing. Returns `Tick::Expired` when there is
    /// no time left to count, in which case no interval is created.
    pub fn start(&mut self) -> Tick {
        if self.remaining == 0 {
            self.ticker = None;
            if self.state == CountdownState::Expired {
                return Tick::Idle;
            }
            self.state = CountdownState::Expired;
            return Tick::Expired;
        }
        self.arm();
        self.state = CountdownState::Running;
        Tick::Running(self.remaining)
    }

    pub fn stop(&mut self) {
        self.ticker = None;
        if self.state != CountdownState::Expired {
            self.state = CountdownState::Idle;
        }
    }

    /// Suspend or resume without touching the remaining time.
    pub fn toggle_pause(&mut self) -> CountdownState {
        match self.state {
            CountdownState::Running => {
                self.ticker = None;
                self.state = CountdownState::Paused;
            }
            CountdownState::Paused => {
                self.arm();
                self.state = CountdownState::Running;
            }
            CountdownState::Idle | CountdownState::Expired => {}
        }
        self.state
    }

    /// Resolves on the next one-second boundary. Pending forever when not running.
    pub async fn wait(&mut self) {
        match self.ticker.as_mut() {
            Some(ticker) if self.state == CountdownState::Running => {
                ticker.tick().await;
            }
            _ => future::pending::<()>().await,
        }
    }

    /// Apply one elapsed second.
    pub fn tick(&mut self) -> Tick {
        if self.state != CountdownState::Running {
            return Tick::Idle;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.ticker = None;
            self.state = CountdownState::Expired;
            Tick::Expired
        } else {
            Tick::Running(self.remaining)
        }
    }

    pub fn display(&self) -> String {
        format_mmss(self.remaining)
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.total.saturating_sub(self.remaining)
    }

    pub fn state(&self) -> CountdownState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == CountdownState::Running
    }

    fn arm(&mut self) {
        let mut ticker = interval_at(Instant::now() + ONE_SECOND, ONE_SECOND);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);
    }
}
