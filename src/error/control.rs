// Control request error types and constants

use crate::error::ErrorCode;
use axum::http::StatusCode;
use log::warn;
use std::fmt;

/// Control error code constants
///
/// Error code range: 2001-2009
pub struct ControlErrorCodes {}

impl ControlErrorCodes {
    /// Required request parameter is absent
    pub const MISSING_PARAMETER: i32 = 2001;

    /// Parameter present but not parseable as the expected type
    pub const INVALID_PARAMETER: i32 = 2002;

    /// Parameter parsed but outside the accepted range
    pub const OUT_OF_RANGE: i32 = 2003;

    /// Operation name not present in the command table
    pub const UNKNOWN_OPERATION: i32 = 2004;

    /// Engine reported failure for the operation
    pub const ENGINE_REJECTED: i32 = 2005;

    /// Lookup-style engine operation returned nothing
    pub const NOT_FOUND: i32 = 2006;

    /// No pending file request carries the given correlation id
    pub const UNKNOWN_FILE_REQUEST: i32 = 2007;

    /// Missing or invalid access token
    pub const UNAUTHORIZED: i32 = 2008;

    /// Handler aborted unexpectedly
    pub const INTERNAL: i32 = 2009;
}

/// Log a control error with structured context
///
/// Client-caused errors are expected traffic and logged at warn level.
pub fn log_control_error(err: &ControlError, context: &str) {
    warn!(
        "Control error in {}: code={}, component=SessionResponder, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors produced while answering a control request
///
/// Every variant maps onto exactly one HTTP status. Only `UnknownOperation`,
/// `Unauthorized` and `Internal` leave the client-error (400) class.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlError {
    MissingParameter {
        name: &'static str,
    },
    InvalidParameter {
        name: &'static str,
        value: String,
        expected: &'static str,
    },
    OutOfRange {
        name: &'static str,
        value: String,
        limit: String,
    },
    UnknownOperation {
        name: String,
    },
    EngineRejected {
        operation: &'static str,
        reason: String,
    },
    NotFound {
        operation: &'static str,
    },
    UnknownFileRequest {
        id: u64,
    },
    Unauthorized,
    Internal {
        reason: String,
    },
}

impl ControlError {
    pub fn status(&self) -> StatusCode {
        match self {
            ControlError::UnknownOperation { .. } => StatusCode::NOT_FOUND,
            ControlError::Unauthorized => StatusCode::UNAUTHORIZED,
            ControlError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl ErrorCode for ControlError {
    fn code(&self) -> i32 {
        match self {
            ControlError::MissingParameter { .. } => ControlErrorCodes::MISSING_PARAMETER,
            ControlError::InvalidParameter { .. } => ControlErrorCodes::INVALID_PARAMETER,
            ControlError::OutOfRange { .. } => ControlErrorCodes::OUT_OF_RANGE,
            ControlError::UnknownOperation { .. } => ControlErrorCodes::UNKNOWN_OPERATION,
            ControlError::EngineRejected { .. } => ControlErrorCodes::ENGINE_REJECTED,
            ControlError::NotFound { .. } => ControlErrorCodes::NOT_FOUND,
            ControlError::UnknownFileRequest { .. } => ControlErrorCodes::UNKNOWN_FILE_REQUEST,
            ControlError::Unauthorized => ControlErrorCodes::UNAUTHORIZED,
            ControlError::Internal { .. } => ControlErrorCodes::INTERNAL,
        }
    }

    fn message(&self) -> String {
        match self {
            ControlError::MissingParameter { name } => {
                format!("missing required parameter '{}'", name)
            }
            ControlError::InvalidParameter {
                name,
                value,
                expected,
            } => format!(
                "parameter '{}' must be {} (got '{}')",
                name, expected, value
            ),
            ControlError::OutOfRange { name, value, limit } => {
                format!("parameter '{}' out of range: {} (limit {})", name, value, limit)
            }
            ControlError::UnknownOperation { name } => format!("unknown operation '{}'", name),
            ControlError::EngineRejected { operation, reason } => {
                if reason.is_empty() {
                    format!("engine rejected {}", operation)
                } else {
                    format!("engine rejected {}: {}", operation, reason)
                }
            }
            ControlError::NotFound { operation } => {
                format!("{} returned no data", operation)
            }
            ControlError::UnknownFileRequest { id } => {
                format!("no pending file request with id {}", id)
            }
            ControlError::Unauthorized => "missing or invalid token".to_string(),
            ControlError::Internal { reason } => format!("internal error: {}", reason),
        }
    }
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ControlError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for ControlError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_are_client_errors() {
        let errors = [
            ControlError::MissingParameter { name: "index" },
            ControlError::InvalidParameter {
                name: "index",
                value: "abc".to_string(),
                expected: "an unsigned integer",
            },
            ControlError::OutOfRange {
                name: "index",
                value: "7".to_string(),
                limit: "2".to_string(),
            },
            ControlError::EngineRejected {
                operation: "engine-init",
                reason: String::new(),
            },
            ControlError::NotFound {
                operation: "get-plugin-info",
            },
        ];

        for err in errors {
            assert_eq!(err.status(), StatusCode::BAD_REQUEST, "{}", err);
        }
    }

    #[test]
    fn test_routing_and_fatal_statuses() {
        assert_eq!(
            ControlError::UnknownOperation {
                name: "nope".to_string()
            }
            .status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(ControlError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ControlError::Internal {
                reason: "boom".to_string()
            }
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_control_error_messages() {
        let err = ControlError::InvalidParameter {
            name: "index",
            value: "-1".to_string(),
            expected: "an unsigned integer",
        };
        assert_eq!(
            err.message(),
            "parameter 'index' must be an unsigned integer (got '-1')"
        );

        let err = ControlError::EngineRejected {
            operation: "engine-init",
            reason: "Unknown engine driver 'x'".to_string(),
        };
        assert_eq!(
            err.message(),
            "engine rejected engine-init: Unknown engine driver 'x'"
        );
        assert_eq!(err.code(), ControlErrorCodes::ENGINE_REJECTED);
    }
}
