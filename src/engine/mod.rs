//! Engine side of the bridge.
//!
//! `backend` defines the capability traits the bridge drives and ships the
//! in-memory stub engine; `events` and `state` carry what flows back out of
//! the engine; `idle` pumps a running engine; `core` wires it all into the
//! shared `BridgeHandle`.

pub mod backend;
pub mod core;
pub mod events;
pub mod idle;
pub mod state;

pub use backend::{HostEngine, StubEngine};
pub use core::BridgeHandle;
pub use events::{
    EngineCallbackOpcode, EngineEvent, EngineEventSink, FileCallbackOpcode, FileRequest,
    FileRequestTicket, SubscriptionId, TicketStatus,
};
pub use idle::{IdlePump, IdleStats, IdleTick};
pub use state::{EngineState, EngineStateCell};
