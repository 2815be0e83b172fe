//! Best-effort behavioural telemetry.
//!
//! Events pass a per-category filter, then either go out one request each
//! (`TelemetryMode::Immediate`) or sit in a bounded queue that is flushed in
//! batches. Delivery is not guaranteed: whatever is still queued when the
//! process ends is lost.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{timeout, Instant};

use crate::backend::VivaBackend;
use crate::config::{Config, TelemetryMode, TrackingFlags};
use crate::protocol::{EventType, LogBatch, LogSingle, SessionId, TelemetryEvent};
use crate::runtime::CopySource;
use crate::util::sleep_until_opt;

/// Whether the tracking flags let `event_type` through. `viva_end` always passes.
pub fn category_enabled(flags: &TrackingFlags, event_type: EventType) -> bool {
    match event_type {
        EventType::Blur
        | EventType::Focus
        | EventType::Visibility
        | EventType::Paste
        | EventType::Copy
        | EventType::Cut => flags.event_tracking,
        EventType::Keypress | EventType::TypingCadence => flags.keystroke_tracking,
        EventType::ArrhythmicTyping => flags.arrhythmic_typing,
        EventType::VivaEnd => true,
    }
}

/// Bounded FIFO. Pushing past capacity evicts from the front.
#[derive(Debug)]
pub struct TelemetryQueue {
    events: VecDeque<TelemetryEvent>,
    cap: usize,
    batch_size: usize,
    evicted: u64,
}

impl TelemetryQueue {
    pub fn new(cap: usize, batch_size: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(cap),
            cap: cap.max(1),
            batch_size: batch_size.max(1),
            evicted: 0,
        }
    }

    pub fn push(&mut self, event: TelemetryEvent) {
        self.events.push_back(event);
        self.trim();
    }

    /// Remove up to `batch_size` events from the front.
    pub fn take_batch(&mut self) -> Vec<TelemetryEvent> {
        let n = self.batch_size.min(self.events.len());
        self.events.drain(..n).collect()
    }

    /// Put a failed batch back at the front, oldest first.
    pub fn requeue(&mut self, batch: Vec<TelemetryEvent>) {
        for event in batch.into_iter().rev() {
            self.events.push_front(event);
        }
        self.trim();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn iter(&self) -> impl Iterator<Item = &TelemetryEvent> {
        self.events.iter()
    }

    fn trim(&mut self) {
        while self.events.len() > self.cap {
            self.events.pop_front();
            self.evicted += 1;
        }
    }
}

#[derive(Debug)]
pub enum FlushDone {
    Delivered(usize),
    Failed(Vec<TelemetryEvent>),
}

#[derive(Debug)]
pub enum TelemetryWake {
    FlushDue,
    Done(FlushDone),
}

pub struct TelemetryEmitter {
    backend: Arc<dyn VivaBackend>,
    session: SessionId,
    mode: TelemetryMode,
    flags: TrackingFlags,
    queue: TelemetryQueue,
    flush_at: Option<Instant>,
    in_flight: bool,
    flush_delay: Duration,
    retry_delay: Duration,
    done_tx: UnboundedSender<FlushDone>,
    done_rx: UnboundedReceiver<FlushDone>,
}

impl TelemetryEmitter {
    pub fn new(backend: Arc<dyn VivaBackend>, session: SessionId, config: &Config) -> Self {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        Self {
            backend,
            session,
            mode: config.telemetry_mode,
            flags: config.tracking,
            queue: TelemetryQueue::new(config.queue_cap, config.batch_size),
            flush_at: None,
            in_flight: false,
            flush_delay: config.timings.flush_delay(),
            retry_delay: config.timings.retry_flush(),
            done_tx,
            done_rx,
        }
    }

    pub fn mode(&self) -> TelemetryMode {
        self.mode
    }

    pub fn flags(&self) -> TrackingFlags {
        self.flags
    }

    pub fn queue(&self) -> &TelemetryQueue {
        &self.queue
    }

    pub fn flush_at(&self) -> Option<Instant> {
        self.flush_at
    }

    /// Accept an event. Returns `false` when its category is disabled.
    pub fn record(&mut self, event: TelemetryEvent) -> bool {
        if !category_enabled(&self.flags, event.event_type) {
            return false;
        }
        match self.mode {
            TelemetryMode::Immediate => self.send_now(event),
            TelemetryMode::Batched => {
                self.queue.push(event);
                if self.flush_at.is_none() && !self.in_flight {
                    self.flush_at = Some(Instant::now() + self.flush_delay);
                }
            }
        }
        true
    }

    /// Copies are only of interest when the selection came from the examiner.
    pub fn record_copy(&mut self, source: CopySource, length: usize) -> bool {
        if source != CopySource::Ai {
            return false;
        }
        self.record(TelemetryEvent::new(
            EventType::Copy,
            json!({ "length": length, "source": "ai" }),
        ))
    }

    /// Single-event POST, fire and forget.
    pub fn send_now(&self, event: TelemetryEvent) {
        let backend = Arc::clone(&self.backend);
        let body = LogSingle::new(self.session.clone(), event);
        tokio::spawn(async move {
            if let Err(err) = backend.log_event(&body).await {
                tracing::debug!(
                    event = %body.event_type,
                    error = %err,
                    "single telemetry post failed"
                );
            }
        });
    }

    /// Resolves when a flush is due or an outstanding flush completed.
    pub async fn wake(&mut self) -> TelemetryWake {
        let flush_at = self.flush_at;
        tokio::select! {
            Some(done) = self.done_rx.recv() => TelemetryWake::Done(done),
            _ = sleep_until_opt(flush_at) => TelemetryWake::FlushDue,
        }
    }

    pub fn handle(&mut self, wake: TelemetryWake) {
        match wake {
            TelemetryWake::FlushDue => {
                self.flush_at = None;
                self.flush();
            }
            TelemetryWake::Done(FlushDone::Delivered(count)) => {
                self.in_flight = false;
                tracing::debug!(count, "telemetry batch delivered");
                self.schedule_retry();
            }
            TelemetryWake::Done(FlushDone::Failed(batch)) => {
                self.in_flight = false;
                tracing::warn!(count = batch.len(), "telemetry batch failed, requeued");
                self.queue.requeue(batch);
                self.schedule_retry();
            }
        }
    }

    /// Start a batch request now if none is outstanding.
    pub fn flush(&mut self) {
        if self.in_flight || self.queue.is_empty() {
            return;
        }
        let batch = self.queue.take_batch();
        self.in_flight = true;
        let backend = Arc::clone(&self.backend);
        let session = self.session.clone();
        let done = self.done_tx.clone();
        tokio::spawn(async move {
            let body = LogBatch {
                session_id: session,
                events: batch,
            };
            let result = match backend.log_events(&body).await {
                Ok(()) => FlushDone::Delivered(body.events.len()),
                Err(err) => {
                    tracing::debug!(error = %err, "telemetry flush failed");
                    FlushDone::Failed(body.events)
                }
            };
            let _ = done.send(result);
        });
    }

    /// Drain the queue before teardown, giving up after `limit`.
    pub async fn shutdown_flush(&mut self, limit: Duration) {
        let drained = timeout(limit, async {
            if self.in_flight {
                if let Some(done) = self.done_rx.recv().await {
                    self.in_flight = false;
                    if let FlushDone::Failed(batch) = done {
                        self.queue.requeue(batch);
                    }
                }
            }
            while !self.queue.is_empty() {
                let body = LogBatch {
                    session_id: self.session.clone(),
                    events: self.queue.take_batch(),
                };
                if let Err(err) = self.backend.log_events(&body).await {
                    tracing::warn!(
                        error = %err,
                        dropped = body.events.len(),
                        "final telemetry flush failed"
                    );
                    break;
                }
            }
        })
        .await;
        if drained.is_err() {
            tracing::warn!(left = self.queue.len(), "final telemetry flush timed out");
        }
        self.flush_at = None;
    }

    fn schedule_retry(&mut self) {
        if !self.queue.is_empty() && self.flush_at.is_none() {
            self.flush_at = Some(Instant::now() + self.retry_delay);
        }
    }
}
