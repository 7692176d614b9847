//! Command table: operation name to handler.
//!
//! Every handler follows the same three steps: extract and validate its
//! parameters, invoke exactly one target engine operation, and map the
//! result to a [`ControlResponse`]. Validation failures return before the
//! target operation runs. Lookup-style operations that yield nothing become
//! [`ControlError::NotFound`], and failed boolean operations become
//! [`ControlError::EngineRejected`] carrying the engine's last error.

use std::collections::BTreeMap;

use axum::http::StatusCode;
use once_cell::sync::Lazy;
use serde::Serialize;

use crate::control::request::ControlRequest;
use crate::control::response::ControlResponse;
use crate::engine::backend::{PluginDescriptor, PluginType};
use crate::engine::BridgeHandle;
use crate::error::ControlError;

pub type Handler = fn(&BridgeHandle, &ControlRequest) -> Result<ControlResponse, ControlError>;

/// One named operation.
///
/// `params` lists accepted parameter names for discovery; optional ones end
/// with `?`.
#[derive(Clone, Copy)]
pub struct Command {
    pub name: &'static str,
    pub params: &'static [&'static str],
    pub summary: &'static str,
    handler: Handler,
}

impl Command {
    pub const fn new(
        name: &'static str,
        params: &'static [&'static str],
        summary: &'static str,
        handler: Handler,
    ) -> Self {
        Self {
            name,
            params,
            summary,
            handler,
        }
    }

    pub fn execute(
        &self,
        bridge: &BridgeHandle,
        request: &ControlRequest,
    ) -> Result<ControlResponse, ControlError> {
        (self.handler)(bridge, request)
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

/// Discovery listing row served on `GET /`.
#[derive(Debug, Clone, Serialize)]
pub struct CommandDescriptor {
    pub name: &'static str,
    pub params: &'static [&'static str],
    pub summary: &'static str,
}

#[derive(Debug, Default)]
pub struct CommandTable {
    commands: BTreeMap<&'static str, Command>,
}

static STANDARD: Lazy<CommandTable> = Lazy::new(CommandTable::standard);

impl CommandTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Process-wide table with every supported operation.
    pub fn global() -> &'static CommandTable {
        &STANDARD
    }

    /// Add a command. Returns false and keeps the existing entry when the
    /// name is already taken.
    pub fn register(&mut self, command: Command) -> bool {
        if self.commands.contains_key(command.name) {
            log::warn!("[CommandTable] duplicate operation '{}' ignored", command.name);
            return false;
        }
        self.commands.insert(command.name, command);
        true
    }

    /// Look up an operation. Unknown names fail closed.
    pub fn resolve(&self, name: &str) -> Result<&Command, ControlError> {
        self.commands
            .get(name)
            .ok_or_else(|| ControlError::UnknownOperation {
                name: name.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.commands.keys().copied()
    }

    pub fn descriptors(&self) -> Vec<CommandDescriptor> {
        self.commands
            .values()
            .map(|command| CommandDescriptor {
                name: command.name,
                params: command.params,
                summary: command.summary,
            })
            .collect()
    }

    pub fn standard() -> Self {
        let mut table = Self::empty();
        for command in STANDARD_COMMANDS {
            table.register(*command);
        }
        table
    }
}

const STANDARD_COMMANDS: &[Command] = &[
    // engine
    Command::new("engine-init", &["driverName", "clientName?"], "Start the engine on a driver", engine_init),
    Command::new("engine-close", &[], "Stop the engine", engine_close),
    Command::new("is-engine-running", &[], "Whether the engine is running", is_engine_running),
    Command::new("get-engine-driver-count", &[], "Number of available drivers", get_engine_driver_count),
    Command::new("get-engine-driver-name", &["index"], "Driver name by index", get_engine_driver_name),
    Command::new("get-engine-driver-device-names", &["index"], "Device names of a driver", get_engine_driver_device_names),
    Command::new("get-engine-driver-device-info", &["index", "name"], "Device capabilities", get_engine_driver_device_info),
    Command::new("get-last-error", &[], "Most recent engine error", get_last_error),
    Command::new("set-engine-about-to-close", &[], "Announce an imminent close", set_engine_about_to_close),
    Command::new("get-buffer-size", &[], "Current buffer size", get_buffer_size),
    Command::new("get-sample-rate", &[], "Current sample rate", get_sample_rate),
    Command::new("load-file", &["filename"], "Load a file as a new plugin", load_file),
    Command::new("load-project", &["filename"], "Replace the session from a project file", load_project),
    Command::new("save-project", &["filename"], "Write the session to a project file", save_project),
    // patchbay
    Command::new("patchbay-connect", &["groupIdA", "portIdA", "groupIdB", "portIdB"], "Connect two ports", patchbay_connect),
    Command::new("patchbay-disconnect", &["connectionId"], "Remove a connection", patchbay_disconnect),
    Command::new("patchbay-refresh", &["external"], "Re-announce the patchbay graph", patchbay_refresh),
    // transport
    Command::new("transport-play", &[], "Start the transport", transport_play),
    Command::new("transport-pause", &[], "Pause the transport", transport_pause),
    Command::new("transport-bpm", &["bpm"], "Set the tempo", transport_bpm),
    Command::new("transport-relocate", &["frame"], "Move the playhead", transport_relocate),
    Command::new("get-current-transport-frame", &[], "Playhead frame", get_current_transport_frame),
    Command::new("get-transport-info", &[], "Transport position and tempo", get_transport_info),
    // plugins
    Command::new("get-current-plugin-count", &[], "Loaded plugin count", get_current_plugin_count),
    Command::new("get-max-plugin-number", &[], "Plugin limit", get_max_plugin_number),
    Command::new("add-plugin", &["pluginType", "filename?", "name?", "label?", "uniqueId?"], "Instantiate a plugin", add_plugin),
    Command::new("remove-plugin", &["pluginId"], "Remove a plugin", remove_plugin),
    Command::new("remove-all-plugins", &[], "Clear the rack", remove_all_plugins),
    Command::new("rename-plugin", &["pluginId", "newName"], "Rename a plugin", rename_plugin),
    Command::new("clone-plugin", &["pluginId"], "Duplicate a plugin", clone_plugin),
    Command::new("switch-plugins", &["pluginIdA", "pluginIdB"], "Swap two rack positions", switch_plugins),
    Command::new("load-plugin-state", &["pluginId", "filename"], "Restore plugin state from a file", load_plugin_state),
    Command::new("save-plugin-state", &["pluginId", "filename"], "Write plugin state to a file", save_plugin_state),
    Command::new("get-plugin-info", &["pluginId"], "Plugin description", get_plugin_info),
    Command::new("get-audio-port-count-info", &["pluginId"], "Audio input and output counts", get_audio_port_count_info),
    Command::new("set-active", &["pluginId", "onOff"], "Enable or bypass a plugin", set_active),
    Command::new("set-volume", &["pluginId", "value"], "Output volume", set_volume),
    Command::new("set-drywet", &["pluginId", "value"], "Dry/wet mix", set_drywet),
    Command::new("set-panning", &["pluginId", "value"], "Stereo panning", set_panning),
    Command::new("send-midi-note", &["pluginId", "channel", "note", "velocity"], "Send a note on (velocity 0 for note off)", send_midi_note),
    // parameters
    Command::new("get-parameter-count", &["pluginId"], "Parameter count of a plugin", get_parameter_count),
    Command::new("get-parameter-info", &["pluginId", "parameterId"], "Parameter description", get_parameter_info),
    Command::new("get-parameter-ranges", &["pluginId", "parameterId"], "Parameter range", get_parameter_ranges),
    Command::new("get-current-parameter-value", &["pluginId", "parameterId"], "Parameter value", get_current_parameter_value),
    Command::new("set-parameter-value", &["pluginId", "parameterId", "value"], "Change a parameter", set_parameter_value),
    Command::new("reset-parameters", &["pluginId"], "Restore parameter defaults", reset_parameters),
    Command::new("randomize-parameters", &["pluginId"], "Randomize parameters", randomize_parameters),
    // file requests
    Command::new("file-callback-reply", &["id", "filename?"], "Answer a pending file request", file_callback_reply),
    Command::new("get-pending-file-requests", &[], "Outstanding file requests", get_pending_file_requests),
];

// ====== SHARED HELPERS ======

/// 200 on success, otherwise the engine's last error.
fn flag(
    bridge: &BridgeHandle,
    operation: &'static str,
    ok: bool,
) -> Result<ControlResponse, ControlError> {
    if ok {
        Ok(ControlResponse::ok())
    } else {
        Err(ControlError::EngineRejected {
            operation,
            reason: bridge.engine().last_error(),
        })
    }
}

fn found<T>(operation: &'static str, value: Option<T>) -> Result<T, ControlError> {
    value.ok_or(ControlError::NotFound { operation })
}

fn plugin_id(
    bridge: &BridgeHandle,
    request: &ControlRequest,
    name: &'static str,
) -> Result<u32, ControlError> {
    request.index_below(name, bridge.engine().current_plugin_count())
}

fn parameter_id(
    bridge: &BridgeHandle,
    request: &ControlRequest,
    plugin_id: u32,
) -> Result<u32, ControlError> {
    request.index_below("parameterId", bridge.engine().parameter_count(plugin_id))
}

/// Plugin id and parameter id, both range checked. A malformed parameter id
/// is reported before the plugin id is looked up.
fn plugin_parameter(bridge: &BridgeHandle, request: &ControlRequest) -> Result<(u32, u32), ControlError> {
    request.u32("parameterId")?;
    let plugin = plugin_id(bridge, request, "pluginId")?;
    let parameter = parameter_id(bridge, request, plugin)?;
    Ok((plugin, parameter))
}

/// Two distinct rack positions. Both ids must parse before either is range
/// checked.
fn plugin_pair(bridge: &BridgeHandle, request: &ControlRequest) -> Result<(u32, u32), ControlError> {
    request.u32("pluginIdB")?;
    let a = plugin_id(bridge, request, "pluginIdA")?;
    let b = plugin_id(bridge, request, "pluginIdB")?;
    Ok((a, b))
}

fn driver_index(bridge: &BridgeHandle, request: &ControlRequest) -> Result<u32, ControlError> {
    request.index_below("index", bridge.engine().engine_driver_count())
}

fn non_empty<'a>(request: &'a ControlRequest, name: &'static str) -> Result<&'a str, ControlError> {
    let value = request.string(name)?;
    if value.trim().is_empty() {
        return Err(ControlError::InvalidParameter {
            name,
            value: value.to_string(),
            expected: "a non-empty string",
        });
    }
    Ok(value)
}

// ====== ENGINE ======

fn engine_init(bridge: &BridgeHandle, req: &ControlRequest) -> Result<ControlResponse, ControlError> {
    let driver_name = non_empty(req, "driverName")?;
    let client_name = req
        .optional_string("clientName")
        .unwrap_or(bridge.config().engine.default_client_name.as_str());
    // the relay has to be listening before the start event fires
    bridge.install_callbacks();
    flag(bridge, "engine-init", bridge.engine().engine_init(driver_name, client_name))
}

fn engine_close(bridge: &BridgeHandle, _: &ControlRequest) -> Result<ControlResponse, ControlError> {
    flag(bridge, "engine-close", bridge.engine().engine_close())
}

fn is_engine_running(bridge: &BridgeHandle, _: &ControlRequest) -> Result<ControlResponse, ControlError> {
    if bridge.engine().is_engine_running() {
        Ok(ControlResponse::ok_text("true"))
    } else {
        Ok(ControlResponse::text(StatusCode::BAD_REQUEST, "false"))
    }
}

fn get_engine_driver_count(bridge: &BridgeHandle, _: &ControlRequest) -> Result<ControlResponse, ControlError> {
    Ok(ControlResponse::ok_scalar(bridge.engine().engine_driver_count()))
}

fn get_engine_driver_name(bridge: &BridgeHandle, req: &ControlRequest) -> Result<ControlResponse, ControlError> {
    let index = driver_index(bridge, req)?;
    let name = found("get-engine-driver-name", bridge.engine().engine_driver_name(index))?;
    Ok(ControlResponse::ok_text(name))
}

fn get_engine_driver_device_names(bridge: &BridgeHandle, req: &ControlRequest) -> Result<ControlResponse, ControlError> {
    let index = driver_index(bridge, req)?;
    let names = found(
        "get-engine-driver-device-names",
        bridge.engine().engine_driver_device_names(index),
    )?;
    ControlResponse::ok_json(&names)
}

fn get_engine_driver_device_info(bridge: &BridgeHandle, req: &ControlRequest) -> Result<ControlResponse, ControlError> {
    let name = req.string("name")?;
    let index = driver_index(bridge, req)?;
    let info = found(
        "get-engine-driver-device-info",
        bridge.engine().engine_driver_device_info(index, name),
    )?;
    ControlResponse::ok_json(&info)
}

fn get_last_error(bridge: &BridgeHandle, _: &ControlRequest) -> Result<ControlResponse, ControlError> {
    Ok(ControlResponse::ok_text(bridge.engine().last_error()))
}

fn set_engine_about_to_close(bridge: &BridgeHandle, _: &ControlRequest) -> Result<ControlResponse, ControlError> {
    flag(
        bridge,
        "set-engine-about-to-close",
        bridge.engine().set_engine_about_to_close(),
    )
}

fn get_buffer_size(bridge: &BridgeHandle, _: &ControlRequest) -> Result<ControlResponse, ControlError> {
    Ok(ControlResponse::ok_scalar(bridge.engine().buffer_size()))
}

fn get_sample_rate(bridge: &BridgeHandle, _: &ControlRequest) -> Result<ControlResponse, ControlError> {
    Ok(ControlResponse::ok_scalar(bridge.engine().sample_rate()))
}

fn load_file(bridge: &BridgeHandle, req: &ControlRequest) -> Result<ControlResponse, ControlError> {
    let filename = non_empty(req, "filename")?;
    flag(bridge, "load-file", bridge.engine().load_file(filename))
}

fn load_project(bridge: &BridgeHandle, req: &ControlRequest) -> Result<ControlResponse, ControlError> {
    let filename = non_empty(req, "filename")?;
    flag(bridge, "load-project", bridge.engine().load_project(filename))
}

fn save_project(bridge: &BridgeHandle, req: &ControlRequest) -> Result<ControlResponse, ControlError> {
    let filename = non_empty(req, "filename")?;
    flag(bridge, "save-project", bridge.engine().save_project(filename))
}

// ====== PATCHBAY ======

fn patchbay_connect(bridge: &BridgeHandle, req: &ControlRequest) -> Result<ControlResponse, ControlError> {
    let group_a = req.u32("groupIdA")?;
    let port_a = req.u32("portIdA")?;
    let group_b = req.u32("groupIdB")?;
    let port_b = req.u32("portIdB")?;
    flag(
        bridge,
        "patchbay-connect",
        bridge
            .engine()
            .patchbay_connect(group_a, port_a, group_b, port_b),
    )
}

fn patchbay_disconnect(bridge: &BridgeHandle, req: &ControlRequest) -> Result<ControlResponse, ControlError> {
    let connection_id = req.u32("connectionId")?;
    flag(
        bridge,
        "patchbay-disconnect",
        bridge.engine().patchbay_disconnect(connection_id),
    )
}

fn patchbay_refresh(bridge: &BridgeHandle, req: &ControlRequest) -> Result<ControlResponse, ControlError> {
    let external = req.bool("external")?;
    flag(bridge, "patchbay-refresh", bridge.engine().patchbay_refresh(external))
}

// ====== TRANSPORT ======

fn transport_play(bridge: &BridgeHandle, _: &ControlRequest) -> Result<ControlResponse, ControlError> {
    bridge.engine().transport_play();
    Ok(ControlResponse::ok())
}

fn transport_pause(bridge: &BridgeHandle, _: &ControlRequest) -> Result<ControlResponse, ControlError> {
    bridge.engine().transport_pause();
    Ok(ControlResponse::ok())
}

fn transport_bpm(bridge: &BridgeHandle, req: &ControlRequest) -> Result<ControlResponse, ControlError> {
    let bpm = req.f64("bpm")?;
    if bpm <= 0.0 {
        return Err(ControlError::OutOfRange {
            name: "bpm",
            value: bpm.to_string(),
            limit: "> 0".to_string(),
        });
    }
    bridge.engine().transport_bpm(bpm);
    Ok(ControlResponse::ok())
}

fn transport_relocate(bridge: &BridgeHandle, req: &ControlRequest) -> Result<ControlResponse, ControlError> {
    let frame = req.u64("frame")?;
    bridge.engine().transport_relocate(frame);
    Ok(ControlResponse::ok())
}

fn get_current_transport_frame(bridge: &BridgeHandle, _: &ControlRequest) -> Result<ControlResponse, ControlError> {
    Ok(ControlResponse::ok_scalar(bridge.engine().current_transport_frame()))
}

fn get_transport_info(bridge: &BridgeHandle, _: &ControlRequest) -> Result<ControlResponse, ControlError> {
    let info = found("get-transport-info", bridge.engine().transport_info())?;
    ControlResponse::ok_json(&info)
}

// ====== PLUGINS ======

fn get_current_plugin_count(bridge: &BridgeHandle, _: &ControlRequest) -> Result<ControlResponse, ControlError> {
    Ok(ControlResponse::ok_scalar(bridge.engine().current_plugin_count()))
}

fn get_max_plugin_number(bridge: &BridgeHandle, _: &ControlRequest) -> Result<ControlResponse, ControlError> {
    Ok(ControlResponse::ok_scalar(bridge.engine().max_plugin_number()))
}

fn add_plugin(bridge: &BridgeHandle, req: &ControlRequest) -> Result<ControlResponse, ControlError> {
    let raw_type = req.string("pluginType")?;
    let plugin_type: PluginType =
        raw_type
            .parse()
            .map_err(|_| ControlError::InvalidParameter {
                name: "pluginType",
                value: raw_type.to_string(),
                expected: "a plugin type (internal, ladspa, dssi, lv2, vst2, vst3, au, sf2, sfz)",
            })?;
    let unique_id = match req.raw("uniqueId") {
        Some(_) => req.i64("uniqueId")?,
        None => 0,
    };
    let descriptor = PluginDescriptor {
        plugin_type,
        filename: req.optional_string("filename").map(str::to_string),
        name: req.optional_string("name").map(str::to_string),
        label: req.optional_string("label").map(str::to_string),
        unique_id,
    };
    flag(bridge, "add-plugin", bridge.engine().add_plugin(&descriptor))
}

fn remove_plugin(bridge: &BridgeHandle, req: &ControlRequest) -> Result<ControlResponse, ControlError> {
    let id = plugin_id(bridge, req, "pluginId")?;
    flag(bridge, "remove-plugin", bridge.engine().remove_plugin(id))
}

fn remove_all_plugins(bridge: &BridgeHandle, _: &ControlRequest) -> Result<ControlResponse, ControlError> {
    flag(bridge, "remove-all-plugins", bridge.engine().remove_all_plugins())
}

fn rename_plugin(bridge: &BridgeHandle, req: &ControlRequest) -> Result<ControlResponse, ControlError> {
    let new_name = non_empty(req, "newName")?;
    let id = plugin_id(bridge, req, "pluginId")?;
    match bridge.engine().rename_plugin(id, new_name) {
        Some(applied) => Ok(ControlResponse::ok_text(applied)),
        None => Err(ControlError::EngineRejected {
            operation: "rename-plugin",
            reason: bridge.engine().last_error(),
        }),
    }
}

fn clone_plugin(bridge: &BridgeHandle, req: &ControlRequest) -> Result<ControlResponse, ControlError> {
    let id = plugin_id(bridge, req, "pluginId")?;
    flag(bridge, "clone-plugin", bridge.engine().clone_plugin(id))
}

fn switch_plugins(bridge: &BridgeHandle, req: &ControlRequest) -> Result<ControlResponse, ControlError> {
    let (a, b) = plugin_pair(bridge, req)?;
    flag(bridge, "switch-plugins", bridge.engine().switch_plugins(a, b))
}

fn load_plugin_state(bridge: &BridgeHandle, req: &ControlRequest) -> Result<ControlResponse, ControlError> {
    let filename = non_empty(req, "filename")?;
    let id = plugin_id(bridge, req, "pluginId")?;
    flag(bridge, "load-plugin-state", bridge.engine().load_plugin_state(id, filename))
}

fn save_plugin_state(bridge: &BridgeHandle, req: &ControlRequest) -> Result<ControlResponse, ControlError> {
    let filename = non_empty(req, "filename")?;
    let id = plugin_id(bridge, req, "pluginId")?;
    flag(bridge, "save-plugin-state", bridge.engine().save_plugin_state(id, filename))
}

fn get_plugin_info(bridge: &BridgeHandle, req: &ControlRequest) -> Result<ControlResponse, ControlError> {
    let id = plugin_id(bridge, req, "pluginId")?;
    let info = found("get-plugin-info", bridge.engine().plugin_info(id))?;
    ControlResponse::ok_json(&info)
}

fn get_audio_port_count_info(bridge: &BridgeHandle, req: &ControlRequest) -> Result<ControlResponse, ControlError> {
    let id = plugin_id(bridge, req, "pluginId")?;
    let info = found(
        "get-audio-port-count-info",
        bridge.engine().audio_port_count_info(id),
    )?;
    ControlResponse::ok_json(&info)
}

fn set_active(bridge: &BridgeHandle, req: &ControlRequest) -> Result<ControlResponse, ControlError> {
    let on_off = req.bool("onOff")?;
    let id = plugin_id(bridge, req, "pluginId")?;
    bridge.engine().set_active(id, on_off);
    Ok(ControlResponse::ok())
}

fn set_volume(bridge: &BridgeHandle, req: &ControlRequest) -> Result<ControlResponse, ControlError> {
    let value = req.f32("value")?;
    let id = plugin_id(bridge, req, "pluginId")?;
    bridge.engine().set_volume(id, value);
    Ok(ControlResponse::ok())
}

fn set_drywet(bridge: &BridgeHandle, req: &ControlRequest) -> Result<ControlResponse, ControlError> {
    let value = req.f32("value")?;
    let id = plugin_id(bridge, req, "pluginId")?;
    bridge.engine().set_drywet(id, value);
    Ok(ControlResponse::ok())
}

fn set_panning(bridge: &BridgeHandle, req: &ControlRequest) -> Result<ControlResponse, ControlError> {
    let value = req.f32("value")?;
    let id = plugin_id(bridge, req, "pluginId")?;
    bridge.engine().set_panning(id, value);
    Ok(ControlResponse::ok())
}

fn send_midi_note(bridge: &BridgeHandle, req: &ControlRequest) -> Result<ControlResponse, ControlError> {
    let channel = req.u8_at_most("channel", 15)?;
    let note = req.u8_at_most("note", 127)?;
    let velocity = req.u8_at_most("velocity", 127)?;
    let id = plugin_id(bridge, req, "pluginId")?;
    bridge.engine().send_midi_note(id, channel, note, velocity);
    Ok(ControlResponse::ok())
}

// ====== PARAMETERS ======

fn get_parameter_count(bridge: &BridgeHandle, req: &ControlRequest) -> Result<ControlResponse, ControlError> {
    let id = plugin_id(bridge, req, "pluginId")?;
    Ok(ControlResponse::ok_scalar(bridge.engine().parameter_count(id)))
}

fn get_parameter_info(bridge: &BridgeHandle, req: &ControlRequest) -> Result<ControlResponse, ControlError> {
    let (id, parameter) = plugin_parameter(bridge, req)?;
    let info = found(
        "get-parameter-info",
        bridge.engine().parameter_info(id, parameter),
    )?;
    ControlResponse::ok_json(&info)
}

fn get_parameter_ranges(bridge: &BridgeHandle, req: &ControlRequest) -> Result<ControlResponse, ControlError> {
    let (id, parameter) = plugin_parameter(bridge, req)?;
    let ranges = found(
        "get-parameter-ranges",
        bridge.engine().parameter_ranges(id, parameter),
    )?;
    ControlResponse::ok_json(&ranges)
}

fn get_current_parameter_value(bridge: &BridgeHandle, req: &ControlRequest) -> Result<ControlResponse, ControlError> {
    let (id, parameter) = plugin_parameter(bridge, req)?;
    Ok(ControlResponse::ok_scalar(
        bridge.engine().current_parameter_value(id, parameter),
    ))
}

fn set_parameter_value(bridge: &BridgeHandle, req: &ControlRequest) -> Result<ControlResponse, ControlError> {
    let value = req.f32("value")?;
    let (id, parameter) = plugin_parameter(bridge, req)?;
    bridge.engine().set_parameter_value(id, parameter, value);
    Ok(ControlResponse::ok())
}

fn reset_parameters(bridge: &BridgeHandle, req: &ControlRequest) -> Result<ControlResponse, ControlError> {
    let id = plugin_id(bridge, req, "pluginId")?;
    bridge.engine().reset_parameters(id);
    Ok(ControlResponse::ok())
}

fn randomize_parameters(bridge: &BridgeHandle, req: &ControlRequest) -> Result<ControlResponse, ControlError> {
    let id = plugin_id(bridge, req, "pluginId")?;
    bridge.engine().randomize_parameters(id);
    Ok(ControlResponse::ok())
}

// ====== FILE REQUESTS ======

fn file_callback_reply(bridge: &BridgeHandle, req: &ControlRequest) -> Result<ControlResponse, ControlError> {
    let id = req.u64("id")?;
    let answer = req.optional_string("filename").map(str::to_string);
    if bridge.pending_file_requests().resolve(id, answer) {
        Ok(ControlResponse::ok())
    } else {
        Err(ControlError::UnknownFileRequest { id })
    }
}

fn get_pending_file_requests(bridge: &BridgeHandle, _: &ControlRequest) -> Result<ControlResponse, ControlError> {
    ControlResponse::ok_json(&bridge.pending_file_requests().list())
}
