//! Diagnostic Sinks

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::event::{DiagnosticEvent, DiagnosticKind};

/// Receiver of advisory events.
///
/// `report` is called inline by the engine and must not block or fail;
/// sinks that talk to slow backends should hand off (see [`ChannelSink`]).
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, event: DiagnosticEvent);
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for Arc<S> {
    fn report(&self, event: DiagnosticEvent) {
        (**self).report(event)
    }
}

/// Logs every event at WARN level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, event: DiagnosticEvent) {
        warn!(
            kind = event.kind().as_str(),
            severity = ?event.severity(),
            subject = %event.subject(),
            "Mileage diagnostic: {:?}",
            event
        );
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events received so far
    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn kinds(&self) -> Vec<DiagnosticKind> {
        self.events().iter().map(DiagnosticEvent::kind).collect()
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.kinds().into_iter().filter(|k| *k == kind).count()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().map(|e| e.is_empty()).unwrap_or(true)
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl DiagnosticSink for MemorySink {
    fn report(&self, event: DiagnosticEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Hands events to a background task over an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<DiagnosticEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DiagnosticEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl DiagnosticSink for ChannelSink {
    fn report(&self, event: DiagnosticEvent) {
        if let Err(e) = self.tx.send(event) {
            debug!("Diagnostic dropped, drain task gone: {:?}", e.0.kind());
        }
    }
}

/// Forward everything arriving on `rx` to `sink` until all senders are dropped
pub fn spawn_drain(
    mut rx: mpsc::UnboundedReceiver<DiagnosticEvent>,
    sink: Arc<dyn DiagnosticSink>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut forwarded = 0usize;
        while let Some(event) = rx.recv().await {
            sink.report(event);
            forwarded += 1;
        }
        info!("Diagnostic drain stopped after {} events", forwarded);
    })
}
