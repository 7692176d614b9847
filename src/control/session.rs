//! Session responder: one request in, exactly one response out.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use crate::control::commands::CommandTable;
use crate::control::request::ControlRequest;
use crate::control::response::ControlResponse;
use crate::engine::BridgeHandle;
use crate::error::{log_control_error, ControlError, ErrorCode};

/// Handles a single control request.
///
/// `respond` consumes the session, so a session can only ever produce one
/// response. A panicking handler is contained here and answered with a 500;
/// other sessions and the engine state are unaffected.
pub struct Session<'a> {
    bridge: &'a BridgeHandle,
    table: &'a CommandTable,
    request: ControlRequest,
}

impl<'a> Session<'a> {
    pub fn new(bridge: &'a BridgeHandle, table: &'a CommandTable, request: ControlRequest) -> Self {
        Self {
            bridge,
            table,
            request,
        }
    }

    pub fn respond(self) -> ControlResponse {
        let started = Instant::now();
        let Session {
            bridge,
            table,
            request,
        } = self;

        let outcome = table.resolve(request.operation()).and_then(|command| {
            panic::catch_unwind(AssertUnwindSafe(|| command.execute(bridge, &request)))
                .unwrap_or_else(|payload| {
                    Err(ControlError::Internal {
                        reason: panic_message(payload.as_ref()),
                    })
                })
        });

        let response = match outcome {
            Ok(response) => response,
            Err(err) => {
                if let ControlError::Internal { .. } = err {
                    log::error!(
                        "[Session] #{} {} aborted: code={} {}",
                        request.id(),
                        request.operation(),
                        err.code(),
                        err.message()
                    );
                } else {
                    log_control_error(&err, request.operation());
                }
                ControlResponse::from_error(&err)
            }
        };

        log::debug!(
            "[Session] #{} {} -> {} ({} bytes, {:?})",
            request.id(),
            request.operation(),
            response.status().as_u16(),
            response.body().len(),
            started.elapsed()
        );
        response
    }
}

/// Answer `request` against the standard command table.
pub fn respond(bridge: &BridgeHandle, request: ControlRequest) -> ControlResponse {
    Session::new(bridge, CommandTable::global(), request).respond()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::control::commands::Command;
    use crate::engine::EngineState;
    use axum::http::StatusCode;

    fn exploding(_: &BridgeHandle, _: &ControlRequest) -> Result<ControlResponse, ControlError> {
        panic!("boom")
    }

    fn bridge() -> BridgeHandle {
        BridgeHandle::with_stub_engine(BridgeConfig::default()).0
    }

    #[test]
    fn unknown_operation_is_404() {
        let bridge = bridge();
        let response = respond(&bridge, ControlRequest::new("no-such-thing", Vec::new()));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn validation_failure_is_400_with_message() {
        let bridge = bridge();
        let response = respond(&bridge, ControlRequest::new("get-engine-driver-name", Vec::new()));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.body_text(), "missing required parameter 'index'");
    }

    #[test]
    fn panicking_handler_becomes_500_and_state_survives() {
        let bridge = bridge();
        assert_eq!(
            respond(
                &bridge,
                ControlRequest::new("engine-init", Vec::new()).with_param("driverName", "Dummy")
            )
            .status(),
            StatusCode::OK
        );

        let mut table = CommandTable::empty();
        table.register(Command::new("explode", &[], "panics", exploding));
        let response = Session::new(&bridge, &table, ControlRequest::new("explode", Vec::new())).respond();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body_text(), "internal error: boom");

        assert_eq!(bridge.engine_state(), EngineState::Running);
        let running = respond(&bridge, ControlRequest::new("is-engine-running", Vec::new()));
        assert_eq!(running.body_text(), "true");
    }

    #[test]
    fn driver_count_scenario() {
        let bridge = bridge();
        let response = respond(&bridge, ControlRequest::new("get-engine-driver-count", Vec::new()));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body_text(), "2");
    }
}
