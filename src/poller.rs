use std::collections::VecDeque;
use std::future;
use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::protocol::{Message, Sender};

/// The transient "typing" indicator. Remembers when it first appeared.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Placeholder {
    shown_at: Option<Instant>,
}

impl Placeholder {
    /// Returns `true` if the placeholder was not already visible.
    pub fn show(&mut self, now: Instant) -> bool {
        if self.shown_at.is_some() {
            return false;
        }
        self.shown_at = Some(now);
        true
    }

    pub fn hide(&mut self) -> bool {
        self.shown_at.take().is_some()
    }

    pub fn shown_at(&self) -> Option<Instant> {
        self.shown_at
    }

    pub fn is_visible(&self) -> bool {
        self.shown_at.is_some()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Reconciled {
    /// AI messages queued for rendering.
    pub scheduled: usize,
    /// New entries that were filtered out (student echoes, sentinel, system).
    pub skipped: usize,
    /// Whether the placeholder had to be shown for this batch.
    pub placeholder_shown: bool,
}

/// Tracks how much of the server transcript has been processed and paces the
/// rendering of new examiner messages.
#[derive(Debug)]
pub struct TranscriptPoller {
    cursor: usize,
    min_typing: Duration,
    period: Duration,
    pending: VecDeque<(Instant, Message)>,
    in_flight: bool,
    ticker: Option<Interval>,
}

impl TranscriptPoller {
    pub fn new(period: Duration, min_typing: Duration) -> Self {
        Self {
            cursor: 0,
            min_typing,
            period,
            pending: VecDeque::new(),
            in_flight: false,
            ticker: None,
        }
    }

    /// Number of server transcript entries already processed.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn start(&mut self) {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.ticker = Some(ticker);
    }

    pub fn stop(&mut self) {
        self.ticker = None;
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    /// Resolves on the next poll tick. Pending forever once stopped.
    pub async fn tick(&mut self) {
        match self.ticker.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => future::pending::<()>().await,
        }
    }

    /// Claim the single fetch slot. `false` means a fetch is still outstanding.
    pub fn begin_fetch(&mut self) -> bool {
        if self.in_flight {
            return false;
        }
        self.in_flight = true;
        true
    }

    pub fn finish_fetch(&mut self) {
        self.in_flight = false;
    }

    /// Process a full transcript. Only examiner messages past the cursor are
    /// queued; the cursor then jumps to the transcript length, filtered entries
    /// included. A shorter (stale) transcript leaves the cursor where it is.
    pub fn reconcile(
        &mut self,
        messages: &[Message],
        placeholder: &mut Placeholder,
        now: Instant,
    ) -> Reconciled {
        let mut report = Reconciled::default();
        let Some(fresh) = messages.get(self.cursor..) else {
            return report;
        };

        for message in fresh {
            if message.sender != Sender::Ai || message.is_start_sentinel() {
                report.skipped += 1;
                continue;
            }
            if placeholder.show(now) {
                report.placeholder_shown = true;
            }
            let shown_at = placeholder.shown_at().unwrap_or(now);
            let mut due = (shown_at + self.min_typing).max(now);
            if let Some((last_due, _)) = self.pending.back() {
                due = due.max(*last_due);
            }
            self.pending.push_back((due, message.clone()));
            report.scheduled += 1;
        }

        self.cursor = self.cursor.max(messages.len());
        report
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.pending.front().map(|(due, _)| *due)
    }

    /// Pop every queued message whose time has come, in order.
    pub fn take_due(&mut self, now: Instant) -> Vec<Message> {
        let mut due = Vec::new();
        while self.pending.front().is_some_and(|(at, _)| *at <= now) {
            if let Some((_, message)) = self.pending.pop_front() {
                due.push(message);
            }
        }
        due
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn clear_pending(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::START_SENTINEL;

    const MIN_TYPING: Duration = Duration::from_millis(3000);

    fn poller() -> TranscriptPoller {
        TranscriptPoller::new(Duration::from_millis(800), MIN_TYPING)
    }

    fn ai(text: &str) -> Message {
        Message::new(Sender::Ai, text)
    }

    fn student(text: &str) -> Message {
        Message::new(Sender::Student, text)
    }

    #[tokio::test(start_paused = true)]
    async fn cursor_advances_past_filtered_messages() {
        let mut poller = poller();
        let mut placeholder = Placeholder::default();
        let transcript = vec![
            ai("Q1"),
            student("A1"),
            ai("Q2"),
            student("A2"),
            ai("Q3"),
        ];

        let report = poller.reconcile(&transcript, &mut placeholder, Instant::now());
        assert_eq!(poller.cursor(), 5);
        assert_eq!(report.scheduled, 3);
        assert_eq!(report.skipped, 2);

        // Same transcript again: nothing new.
        let report = poller.reconcile(&transcript, &mut placeholder, Instant::now());
        assert_eq!(report, Reconciled::default());
    }

    #[tokio::test(start_paused = true)]
    async fn sentinel_and_system_entries_are_skipped() {
        let mut poller = poller();
        let mut placeholder = Placeholder::default();
        let transcript = vec![
            student(START_SENTINEL),
            ai(START_SENTINEL),
            Message::new(Sender::System, "Session resumed"),
        ];
        let report = poller.reconcile(&transcript, &mut placeholder, Instant::now());
        assert_eq!(report.scheduled, 0);
        assert_eq!(report.skipped, 3);
        assert_eq!(poller.cursor(), 3);
        assert!(!placeholder.is_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_shorter_transcript_never_moves_cursor_back() {
        let mut poller = poller();
        let mut placeholder = Placeholder::default();
        poller.reconcile(&[ai("Q1"), student("A1")], &mut placeholder, Instant::now());
        poller.reconcile(&[ai("Q1")], &mut placeholder, Instant::now());
        assert_eq!(poller.cursor(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn examiner_message_waits_for_minimum_typing_time() {
        let mut poller = poller();
        let mut placeholder = Placeholder::default();
        let shown = Instant::now();
        placeholder.show(shown);

        tokio::time::advance(Duration::from_millis(900)).await;
        let report = poller.reconcile(&[ai("Hi there")], &mut placeholder, Instant::now());
        assert!(!report.placeholder_shown);
        assert_eq!(poller.next_due(), Some(shown + MIN_TYPING));
        assert!(poller.take_due(Instant::now()).is_empty());

        crate::util::sleep_until_opt(poller.next_due()).await;
        assert_eq!(Instant::now(), shown + MIN_TYPING);
        let due = poller.take_due(Instant::now());
        assert_eq!(due, vec![ai("Hi there")]);
        assert!(!poller.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_network_renders_immediately() {
        let mut poller = poller();
        let mut placeholder = Placeholder::default();
        placeholder.show(Instant::now());

        tokio::time::advance(Duration::from_millis(4500)).await;
        let now = Instant::now();
        poller.reconcile(&[ai("late")], &mut placeholder, now);
        assert_eq!(poller.take_due(now).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn placeholder_is_shown_when_missing() {
        let mut poller = poller();
        let mut placeholder = Placeholder::default();
        let now = Instant::now();
        let report = poller.reconcile(&[ai("Q1")], &mut placeholder, now);
        assert!(report.placeholder_shown);
        assert_eq!(placeholder.shown_at(), Some(now));
        assert_eq!(poller.next_due(), Some(now + MIN_TYPING));
    }

    #[tokio::test(start_paused = true)]
    async fn only_one_fetch_at_a_time() {
        let mut poller = poller();
        assert!(poller.begin_fetch());
        assert!(!poller.begin_fetch());
        poller.finish_fetch();
        assert!(poller.begin_fetch());
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_follow_the_poll_period() {
        let mut poller = poller();
        let start = Instant::now();
        poller.start();
        poller.tick().await;
        poller.tick().await;
        assert_eq!(start.elapsed(), Duration::from_millis(1600));

        poller.stop();
        let waited = tokio::time::timeout(Duration::from_secs(5), poller.tick()).await;
        assert!(waited.is_err());
    }
}
