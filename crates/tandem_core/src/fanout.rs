//! In-process broadcast registry for board mutation events.
//!
//! # Responsibility
//! - Hold the sinks (websocket sessions, automation adapters) that want
//!   every successful board mutation.
//! - Deliver one event to every registered sink, skipping failures.
//!
//! # Invariants
//! - Delivery is at-most-once per sink per event; a failing sink is logged
//!   and skipped, it never blocks other sinks or fails the mutation.
//! - Registration order does not matter: sinks are kept sorted by id.

use crate::model::board::BoardEvent;
use log::warn;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Delivery failure reported by one sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkError {
    pub message: String,
}

impl SinkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Display for SinkError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "sink delivery failed: {}", self.message)
    }
}

impl Error for SinkError {}

/// Sink registration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FanoutRegistryError {
    InvalidSinkId(String),
    DuplicateSinkId(String),
    SinkNotFound(String),
}

impl Display for FanoutRegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSinkId(value) => write!(f, "sink id is invalid: {value}"),
            Self::DuplicateSinkId(value) => write!(f, "sink id already registered: {value}"),
            Self::SinkNotFound(value) => write!(f, "sink not found: {value}"),
        }
    }
}

impl Error for FanoutRegistryError {}

/// Receiver of board mutation events.
///
/// Implementations must tolerate being called from whichever thread runs
/// the mutation; the registry holds no locks while delivering.
pub trait EventSink: Send + Sync {
    /// Stable sink identifier, unique within one registry.
    fn sink_id(&self) -> &str;
    /// Delivers one event. Errors are reported, logged, and ignored.
    fn deliver(&self, event: &BoardEvent) -> Result<(), SinkError>;
}

/// Runtime event sink registry.
///
/// Interior-mutable so the service layer can emit through a shared handle
/// while connection lifecycles register and unregister concurrently.
#[derive(Default)]
pub struct FanoutRegistry {
    sinks: RwLock<BTreeMap<String, Arc<dyn EventSink>>>,
}

impl FanoutRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one sink under its id.
    pub fn register(&self, sink: Arc<dyn EventSink>) -> Result<(), FanoutRegistryError> {
        let sink_id = sink.sink_id().trim().to_string();
        if !is_valid_sink_id(&sink_id) {
            return Err(FanoutRegistryError::InvalidSinkId(sink_id));
        }

        let mut sinks = self.write_sinks();
        if sinks.contains_key(sink_id.as_str()) {
            return Err(FanoutRegistryError::DuplicateSinkId(sink_id));
        }
        sinks.insert(sink_id, sink);
        Ok(())
    }

    /// Removes one sink by id.
    pub fn unregister(&self, sink_id: &str) -> Result<(), FanoutRegistryError> {
        let normalized = sink_id.trim();
        let mut sinks = self.write_sinks();
        if sinks.remove(normalized).is_none() {
            return Err(FanoutRegistryError::SinkNotFound(normalized.to_string()));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.read_sinks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_sinks().is_empty()
    }

    /// Returns sorted sink ids.
    pub fn sink_ids(&self) -> Vec<String> {
        self.read_sinks().keys().cloned().collect()
    }

    /// Delivers one event to every registered sink and returns how many
    /// deliveries succeeded. Failing sinks are logged and skipped.
    pub fn emit(&self, event: &BoardEvent) -> usize {
        let snapshot: Vec<Arc<dyn EventSink>> = self.read_sinks().values().cloned().collect();

        let mut delivered = 0;
        for sink in snapshot {
            match sink.deliver(event) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    warn!(
                        "event=fanout_deliver module=fanout status=skip sink={} error={err}",
                        sink.sink_id()
                    );
                }
            }
        }
        delivered
    }

    fn read_sinks(&self) -> RwLockReadGuard<'_, BTreeMap<String, Arc<dyn EventSink>>> {
        self.sinks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_sinks(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Arc<dyn EventSink>>> {
        self.sinks.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn is_valid_sink_id(value: &str) -> bool {
    if value.is_empty() {
        return false;
    }
    value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}
