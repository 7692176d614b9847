//! Control plane request handling: parse, dispatch, answer.

pub mod commands;
pub mod request;
pub mod response;
pub mod session;

pub use commands::{Command, CommandDescriptor, CommandTable};
pub use request::ControlRequest;
pub use response::ControlResponse;
pub use session::{respond, Session};
