// hostbridge - control bridge between a plugin-host engine and an HTTP control plane
// Engine events flow out through the callback relay; control requests flow in
// through the command table.

// Module declarations
pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod http;
pub mod managers;
pub mod relay;

// Re-exports for convenience
pub use config::BridgeConfig;
pub use control::{CommandTable, ControlRequest, ControlResponse, Session};
pub use engine::{BridgeHandle, EngineState, HostEngine, StubEngine};
pub use managers::{NotificationHub, NotificationListener, NotificationMessage};

/// Install the global fmt subscriber at `level` (`error`..`trace`).
///
/// `log` records from library code are bridged into it. Calling this twice is
/// harmless; the first subscriber stays.
pub fn init_logging(level: &str) {
    let level = level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);
    if tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init()
        .is_err()
    {
        log::debug!("logging already initialised");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_repeatable() {
        init_logging("debug");
        init_logging("not-a-level");
    }
}
