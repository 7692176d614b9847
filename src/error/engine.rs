// Engine error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Engine error code constants
///
/// Error code range: 1001-1008
pub struct EngineErrorCodes {}

impl EngineErrorCodes {
    /// Requested driver name is not known to the engine
    pub const UNKNOWN_DRIVER: i32 = 1001;

    /// Engine is already running
    pub const ALREADY_RUNNING: i32 = 1002;

    /// Engine is not running
    pub const NOT_RUNNING: i32 = 1003;

    /// Plugin id does not refer to a loaded plugin
    pub const INVALID_PLUGIN: i32 = 1004;

    /// Plugin rack is full
    pub const PLUGIN_LIMIT: i32 = 1005;

    /// Patchbay connection could not be made or found
    pub const PATCHBAY: i32 = 1006;

    /// Reading or writing a project/state file failed
    pub const FILE_IO: i32 = 1007;

    /// Mutex/RwLock was poisoned
    pub const LOCK_POISONED: i32 = 1008;
}

/// Log an engine error with structured context
///
/// The logging is non-blocking and will not panic on failure.
pub fn log_engine_error(err: &EngineError, context: &str) {
    error!(
        "Engine error in {}: code={}, component=HostEngine, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors raised inside an engine implementation.
///
/// The collaborator interface reports plain success flags; implementations
/// keep the last of these as the text returned by `get-last-error`.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    UnknownDriver { name: String },
    AlreadyRunning,
    NotRunning,
    InvalidPlugin { plugin_id: u32 },
    PluginLimit { max: u32 },
    Patchbay { details: String },
    FileIo { path: String, reason: String },
    LockPoisoned { component: String },
}

impl ErrorCode for EngineError {
    fn code(&self) -> i32 {
        match self {
            EngineError::UnknownDriver { .. } => EngineErrorCodes::UNKNOWN_DRIVER,
            EngineError::AlreadyRunning => EngineErrorCodes::ALREADY_RUNNING,
            EngineError::NotRunning => EngineErrorCodes::NOT_RUNNING,
            EngineError::InvalidPlugin { .. } => EngineErrorCodes::INVALID_PLUGIN,
            EngineError::PluginLimit { .. } => EngineErrorCodes::PLUGIN_LIMIT,
            EngineError::Patchbay { .. } => EngineErrorCodes::PATCHBAY,
            EngineError::FileIo { .. } => EngineErrorCodes::FILE_IO,
            EngineError::LockPoisoned { .. } => EngineErrorCodes::LOCK_POISONED,
        }
    }

    fn message(&self) -> String {
        match self {
            EngineError::UnknownDriver { name } => format!("Unknown engine driver '{}'", name),
            EngineError::AlreadyRunning => {
                "Engine already running. Call engine-close first.".to_string()
            }
            EngineError::NotRunning => "Engine not running. Call engine-init first.".to_string(),
            EngineError::InvalidPlugin { plugin_id } => {
                format!("Invalid plugin id {}", plugin_id)
            }
            EngineError::PluginLimit { max } => {
                format!("Maximum number of plugins reached ({})", max)
            }
            EngineError::Patchbay { details } => format!("Patchbay error: {}", details),
            EngineError::FileIo { path, reason } => {
                format!("Failed to access '{}': {}", path, reason)
            }
            EngineError::LockPoisoned { component } => format!("Lock poisoned on {}", component),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EngineError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for EngineError {}
