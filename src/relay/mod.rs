//! Engine callback relay.
//!
//! The relay is the one [`EngineEventSink`] the bridge installs on the
//! engine. It runs in the engine's execution context, so everything here is
//! bounded: classify the opcode, update [`EngineStateCell`] for lifecycle
//! events, format one line, hand it to the [`NotificationHub`] and return.
//! Per-event diagnostics stay at trace level for the same reason.

pub mod format;
pub mod pending;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::engine::events::{
    EngineCallbackOpcode, EngineEvent, EngineEventSink, FileRequest, FileRequestTicket,
};
use crate::engine::state::{EngineState, EngineStateCell};
use crate::managers::{NotificationChannel, NotificationHub, NotificationMessage};

pub use format::{format_engine_line, format_file_request_line, terminate_within};
pub use pending::{PendingFileRequests, PendingFileSummary};

/// Lifecycle effect of an opcode, if any.
pub fn state_change_for(opcode: EngineCallbackOpcode) -> Option<EngineState> {
    match opcode {
        EngineCallbackOpcode::EngineStarted => Some(EngineState::Running),
        EngineCallbackOpcode::EngineStopped | EngineCallbackOpcode::Quit => {
            Some(EngineState::Stopped)
        }
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RelayStats {
    pub events: u64,
    pub state_changes: u64,
    pub file_requests: u64,
    pub file_requests_refused: u64,
}

pub struct EngineCallbackRelay {
    state: Arc<EngineStateCell>,
    hub: Arc<NotificationHub>,
    pending: Arc<PendingFileRequests>,
    max_line_bytes: usize,
    events: AtomicU64,
    state_changes: AtomicU64,
    file_requests: AtomicU64,
    file_requests_refused: AtomicU64,
}

impl EngineCallbackRelay {
    pub fn new(
        state: Arc<EngineStateCell>,
        hub: Arc<NotificationHub>,
        pending: Arc<PendingFileRequests>,
        max_line_bytes: usize,
    ) -> Self {
        Self {
            state,
            hub,
            pending,
            max_line_bytes,
            events: AtomicU64::new(0),
            state_changes: AtomicU64::new(0),
            file_requests: AtomicU64::new(0),
            file_requests_refused: AtomicU64::new(0),
        }
    }

    /// Relay one engine event: state first, then exactly one notification.
    pub fn relay(&self, event: &EngineEvent) {
        self.events.fetch_add(1, Ordering::Relaxed);

        if let Some(next) = state_change_for(event.opcode) {
            let previous = self.state.transition(next);
            if previous != next {
                self.state_changes.fetch_add(1, Ordering::Relaxed);
            }
            log::trace!("[Relay] engine state {:?} -> {:?}", previous, next);
        }

        let line = format_engine_line(event, self.max_line_bytes);
        self.hub
            .publish(NotificationMessage::new(NotificationChannel::Engine, line));
    }

    /// Register a file request and announce it to the control plane.
    pub fn relay_file_request(&self, request: &FileRequest) -> FileRequestTicket {
        self.file_requests.fetch_add(1, Ordering::Relaxed);

        let Some(ticket) = self.pending.register(request) else {
            self.file_requests_refused.fetch_add(1, Ordering::Relaxed);
            log::warn!("[Relay] file request table full, answering with no file");
            return FileRequestTicket::unanswered();
        };

        if let Some(id) = ticket.id() {
            let line = format_file_request_line(id, request, self.max_line_bytes);
            self.hub.publish(NotificationMessage::new(
                NotificationChannel::FileRequest,
                line,
            ));
        }
        ticket
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            events: self.events.load(Ordering::Relaxed),
            state_changes: self.state_changes.load(Ordering::Relaxed),
            file_requests: self.file_requests.load(Ordering::Relaxed),
            file_requests_refused: self.file_requests_refused.load(Ordering::Relaxed),
        }
    }
}

impl EngineEventSink for EngineCallbackRelay {
    fn on_event(&self, event: &EngineEvent) {
        self.relay(event);
    }

    fn on_file_request(&self, request: &FileRequest) -> FileRequestTicket {
        self.relay_file_request(request)
    }
}
