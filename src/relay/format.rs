//! Notification line formatting.
//!
//! Lines are built with no I/O so the relay can call these from the engine's
//! execution context.

use std::fmt::Write as _;

use crate::engine::events::{EngineEvent, FileRequest};

/// `<opcode> <pluginId> <value1> <value2> <value3> <payload>\n`
///
/// `value3` carries six decimals. An absent payload renders as empty, so the
/// line always has six fields.
pub fn format_engine_line(event: &EngineEvent, max_line_bytes: usize) -> String {
    let mut line = String::with_capacity(64);
    let _ = write!(
        line,
        "{} {} {} {} {:.6} {}",
        event.opcode.code(),
        event.plugin_id,
        event.value1,
        event.value2,
        event.value3,
        event.payload.as_deref().unwrap_or("")
    );
    terminate_within(line, max_line_bytes)
}

/// `fc <id> <opcode> <isDir> "<title>" "<filter>"\n`
pub fn format_file_request_line(id: u64, request: &FileRequest, max_line_bytes: usize) -> String {
    let mut line = String::with_capacity(64);
    let _ = write!(
        line,
        "fc {} {} {} \"{}\" \"{}\"",
        id,
        request.opcode as u32,
        u8::from(request.is_dir),
        request.title.replace('"', "'"),
        request.filter.replace('"', "'")
    );
    terminate_within(line, max_line_bytes)
}

/// Flatten embedded line breaks, truncate on a char boundary so the result
/// including its terminator fits `max_line_bytes`, and append `\n`.
pub fn terminate_within(line: String, max_line_bytes: usize) -> String {
    let mut line = if line.contains(['\n', '\r']) {
        line.replace(['\n', '\r'], " ")
    } else {
        line
    };

    let budget = max_line_bytes.max(1) - 1;
    if line.len() > budget {
        let mut cut = budget;
        while !line.is_char_boundary(cut) {
            cut -= 1;
        }
        line.truncate(cut);
    }
    line.push('\n');
    line
}
