// Error types for the plugin host bridge
//
// This module defines the error types for engine implementations and the
// control request path, with numeric codes so that HTTP clients and logs can
// match on them without parsing messages.

mod control;
mod engine;

pub use control::{log_control_error, ControlError, ControlErrorCodes};
pub use engine::{log_engine_error, EngineError, EngineErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the HTTP boundary.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
