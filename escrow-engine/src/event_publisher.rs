//! Event Publisher - Publishes escrow notifications for audit
//!
//! Every state-changing escrow operation emits one [`EscrowEvent`] into a
//! write-only sink. External observers consume the sink; the escrow itself
//! never reads its own notifications back.
//!
//! Publishing is synchronous so the escrow can commit a record and emit its
//! event without an await point in between. Sinks that forward to slow
//! destinations should hand the event off (for example to a channel) rather
//! than block.

use crate::models::EscrowEvent;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

/// Write-only destination for escrow notifications
pub trait EventSink: Send + Sync {
    fn publish(&self, event: EscrowEvent);
}

/// Append-only in-memory log
#[derive(Debug, Clone, Default)]
pub struct MemoryEventSink {
    events: Arc<RwLock<Vec<EscrowEvent>>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot for observers
    pub fn events(&self) -> Vec<EscrowEvent> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for MemoryEventSink {
    fn publish(&self, event: EscrowEvent) {
        self.events
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// Emits each notification as a structured log record
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn publish(&self, event: EscrowEvent) {
        match serde_json::to_string(&event) {
            Ok(payload) => info!(
                target: "escrow_events",
                kind = event.kind.as_str(),
                %payload,
                "Escrow event"
            ),
            Err(e) => warn!("Failed to serialize escrow event {}: {}", event.id, e),
        }
    }
}

/// Publishes to several sinks in order
#[derive(Clone, Default)]
pub struct FanoutEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutEventSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

impl EventSink for FanoutEventSink {
    fn publish(&self, event: EscrowEvent) {
        for sink in &self.sinks {
            sink.publish(event.clone());
        }
    }
}
