use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use rand::Rng;

use crate::engine::events::{
    EngineCallbackOpcode, EngineEvent, EngineEventSink, FileRequest, FileRequestTicket,
    SubscriptionId, TicketStatus,
};
use crate::error::{log_engine_error, EngineError, ErrorCode};

use super::{
    DriverApi, EngineDriverDeviceInfo, EngineLifecycle, ParameterApi, ParameterInfo,
    ParameterRanges, PatchbayApi, PluginApi, PluginDescriptor, PluginInfo, PluginType,
    PortCountInfo, TransportApi, TransportInfo, DEVICE_HAS_DYNAMIC_BUFFER_SIZE,
    DEVICE_HAS_DYNAMIC_SAMPLE_RATE,
};

/// Drivers the stub engine reports, with their device names.
pub const STUB_DRIVERS: &[(&str, &[&str])] = &[
    ("Dummy", &["Default"]),
    ("JACK", &["Auto-Connect ON", "Auto-Connect OFF"]),
];

const STUB_BUFFER_SIZE: u32 = 512;
const STUB_SAMPLE_RATE: f64 = 48_000.0;
const TICKS_PER_BEAT: f64 = 1920.0;
const BEATS_PER_BAR: f64 = 4.0;

// Internal parameter ids carried in value1 of parameter change events.
const PARAMETER_ACTIVE: i32 = -2;
const PARAMETER_DRYWET: i32 = -3;
const PARAMETER_VOLUME: i32 = -4;
const PARAMETER_PANNING: i32 = -7;

#[derive(Debug, Clone)]
struct StubParameter {
    info: ParameterInfo,
    ranges: ParameterRanges,
    value: f32,
}

#[derive(Debug, Clone)]
struct StubPlugin {
    info: PluginInfo,
    audio: PortCountInfo,
    active: bool,
    volume: f32,
    drywet: f32,
    panning: f32,
    parameters: Vec<StubParameter>,
}

/// Per-plugin mixer controls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StubMixer {
    pub active: bool,
    pub volume: f32,
    pub drywet: f32,
    pub panning: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StubSnapshot {
    pub driver: Option<String>,
    pub client_name: String,
    pub about_to_close: bool,
    pub mixer: Vec<StubMixer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Connection {
    group_a: u32,
    port_a: u32,
    group_b: u32,
    port_b: u32,
}

#[derive(Debug)]
struct StubState {
    running: bool,
    driver: Option<String>,
    client_name: String,
    about_to_close: bool,
    plugins: Vec<StubPlugin>,
    connections: BTreeMap<u32, Connection>,
    next_connection_id: u32,
    playing: bool,
    frame: u64,
    bpm: f64,
    last_error: String,
    /// Events produced by bulk operations, released on the next idle.
    deferred: VecDeque<EngineEvent>,
    /// Events produced by the current call, emitted once the lock is released.
    outbox: Vec<EngineEvent>,
    file_tickets: Vec<FileRequestTicket>,
    chosen_files: Vec<String>,
}

impl StubState {
    fn new() -> Self {
        Self {
            running: false,
            driver: None,
            client_name: String::new(),
            about_to_close: false,
            plugins: Vec::new(),
            connections: BTreeMap::new(),
            next_connection_id: 1,
            playing: false,
            frame: 0,
            bpm: 120.0,
            last_error: String::new(),
            deferred: VecDeque::new(),
            outbox: Vec::new(),
            file_tickets: Vec::new(),
            chosen_files: Vec::new(),
        }
    }

    fn require_running(&self) -> Result<(), EngineError> {
        if self.running {
            Ok(())
        } else {
            Err(EngineError::NotRunning)
        }
    }

    fn plugin(&self, plugin_id: u32) -> Result<&StubPlugin, EngineError> {
        self.plugins
            .get(plugin_id as usize)
            .ok_or(EngineError::InvalidPlugin { plugin_id })
    }

    fn plugin_mut(&mut self, plugin_id: u32) -> Result<&mut StubPlugin, EngineError> {
        self.plugins
            .get_mut(plugin_id as usize)
            .ok_or(EngineError::InvalidPlugin { plugin_id })
    }

    fn unique_name(&self, wanted: &str, skip: Option<usize>) -> String {
        let taken = |candidate: &str| {
            self.plugins
                .iter()
                .enumerate()
                .any(|(idx, p)| Some(idx) != skip && p.info.name == candidate)
        };
        if !taken(wanted) {
            return wanted.to_string();
        }
        (2..)
            .map(|n| format!("{} ({})", wanted, n))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| wanted.to_string())
    }

    fn emit(&mut self, event: EngineEvent) {
        self.outbox.push(event);
    }
}

/// Deterministic in-memory engine used by the CLI and tests.
///
/// It keeps a plugin rack, transport and patchbay in memory and emits engine
/// events to its subscribers synchronously from the calling thread. Bulk
/// parameter changes are deferred until the next `engine_idle`, which is what
/// gives the idle pump something to advance.
///
/// Subscribers see events in the order the state changes were made: a call
/// holds `emit_order` from before it mutates until its events are delivered.
pub struct StubEngine {
    emit_order: Mutex<()>,
    state: Mutex<StubState>,
    sinks: RwLock<Vec<(SubscriptionId, Arc<dyn EngineEventSink>)>>,
    next_subscription: AtomicU64,
    idle_calls: AtomicU64,
    max_plugins: u32,
}

impl StubEngine {
    pub fn new(max_plugins: u32) -> Self {
        Self {
            emit_order: Mutex::new(()),
            state: Mutex::new(StubState::new()),
            sinks: RwLock::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            idle_calls: AtomicU64::new(0),
            max_plugins,
        }
    }

    /// Session details the trait surface does not expose.
    pub fn snapshot(&self) -> Option<StubSnapshot> {
        self.read(|s| StubSnapshot {
            driver: s.driver.clone(),
            client_name: s.client_name.clone(),
            about_to_close: s.about_to_close,
            mixer: s
                .plugins
                .iter()
                .map(|p| StubMixer {
                    active: p.active,
                    volume: p.volume,
                    drywet: p.drywet,
                    panning: p.panning,
                })
                .collect(),
        })
    }

    /// Number of `engine_idle` calls received so far.
    pub fn idle_calls(&self) -> u64 {
        self.idle_calls.load(Ordering::SeqCst)
    }

    /// Files chosen through answered file requests, oldest first.
    pub fn chosen_files(&self) -> Vec<String> {
        self.read(|s| s.chosen_files.clone()).unwrap_or_default()
    }

    /// Ask subscribers for a file, as a plugin with a file parameter would.
    ///
    /// Returns the correlation id of the first subscriber that registered the
    /// request. The answer is collected on a later `engine_idle`.
    pub fn request_file(&self, request: FileRequest) -> Option<u64> {
        let _order = self.order_guard();
        let sinks = self.sink_snapshot();
        let mut first_id = None;
        let mut tickets = Vec::new();
        for sink in sinks {
            let ticket = sink.on_file_request(&request);
            if let Some(id) = ticket.id() {
                first_id.get_or_insert(id);
                tickets.push(ticket);
            }
        }
        if let Ok(mut state) = self.lock() {
            state.file_tickets.extend(tickets);
        }
        first_id
    }

    // a panicking subscriber must not wedge later calls
    fn order_guard(&self) -> MutexGuard<'_, ()> {
        self.emit_order.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock(&self) -> Result<MutexGuard<'_, StubState>, EngineError> {
        self.state.lock().map_err(|_| EngineError::LockPoisoned {
            component: "stub engine state".to_string(),
        })
    }

    fn read<R>(&self, f: impl FnOnce(&StubState) -> R) -> Option<R> {
        self.lock().ok().map(|state| f(&state))
    }

    /// Run a mutating operation, record failures as the last error and emit
    /// queued events after the state lock is released. The order guard is
    /// held across both, so reads never wait on subscribers.
    fn run<R>(
        &self,
        context: &str,
        f: impl FnOnce(&mut StubState) -> Result<R, EngineError>,
    ) -> Option<R> {
        let order = self.order_guard();
        let (result, events) = match self.lock() {
            Ok(mut state) => {
                let result = f(&mut state);
                if let Err(err) = &result {
                    state.last_error = err.message();
                }
                let events = std::mem::take(&mut state.outbox);
                (result, events)
            }
            Err(err) => (Err(err), Vec::new()),
        };

        for event in &events {
            self.dispatch(event);
        }
        drop(order);

        match result {
            Ok(value) => Some(value),
            Err(err @ (EngineError::LockPoisoned { .. } | EngineError::FileIo { .. })) => {
                log_engine_error(&err, context);
                None
            }
            Err(err) => {
                log::debug!(
                    "[StubEngine] {} failed: code={} {}",
                    context,
                    err.code(),
                    err.message()
                );
                None
            }
        }
    }

    fn sink_snapshot(&self) -> Vec<Arc<dyn EngineEventSink>> {
        self.sinks
            .read()
            .map(|sinks| sinks.iter().map(|(_, sink)| Arc::clone(sink)).collect())
            .unwrap_or_default()
    }

    fn dispatch(&self, event: &EngineEvent) {
        for sink in self.sink_snapshot() {
            sink.on_event(event);
        }
    }

    fn build_plugin(descriptor: &PluginDescriptor, name: String) -> StubPlugin {
        let label = descriptor
            .label
            .clone()
            .unwrap_or_else(|| descriptor.plugin_type.to_string());
        let audio = match descriptor.plugin_type {
            PluginType::Sf2 | PluginType::Sfz => PortCountInfo { ins: 0, outs: 2 },
            _ => PortCountInfo { ins: 2, outs: 2 },
        };
        let parameters = vec![
            StubParameter {
                info: ParameterInfo {
                    name: "Gain".to_string(),
                    symbol: "gain".to_string(),
                    unit: "x".to_string(),
                    scale_point_count: 0,
                },
                ranges: ParameterRanges {
                    def: 1.0,
                    min: 0.0,
                    max: 2.0,
                    step: 0.01,
                    step_small: 0.001,
                    step_large: 0.1,
                },
                value: 1.0,
            },
            StubParameter {
                info: ParameterInfo {
                    name: "Mix".to_string(),
                    symbol: "mix".to_string(),
                    unit: "%".to_string(),
                    scale_point_count: 0,
                },
                ranges: ParameterRanges {
                    def: 0.5,
                    min: 0.0,
                    max: 1.0,
                    step: 0.01,
                    step_small: 0.001,
                    step_large: 0.1,
                },
                value: 0.5,
            },
        ];

        StubPlugin {
            info: PluginInfo {
                plugin_type: descriptor.plugin_type,
                hints: 0,
                name,
                label,
                filename: descriptor.filename.clone().unwrap_or_default(),
                maker: "hostbridge".to_string(),
                unique_id: descriptor.unique_id,
            },
            audio,
            active: true,
            volume: 1.0,
            drywet: 1.0,
            panning: 0.0,
            parameters,
        }
    }

    fn insert_plugin(
        state: &mut StubState,
        max_plugins: u32,
        descriptor: &PluginDescriptor,
    ) -> Result<u32, EngineError> {
        state.require_running()?;
        if state.plugins.len() as u32 >= max_plugins {
            return Err(EngineError::PluginLimit { max: max_plugins });
        }
        let wanted = descriptor
            .name
            .clone()
            .or_else(|| descriptor.label.clone())
            .or_else(|| {
                descriptor
                    .filename
                    .as_deref()
                    .and_then(|f| Path::new(f).file_stem())
                    .map(|stem| stem.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| descriptor.plugin_type.to_string());
        let name = state.unique_name(&wanted, None);
        let plugin_id = state.plugins.len() as u32;
        state.plugins.push(Self::build_plugin(descriptor, name.clone()));
        state.emit(
            EngineEvent::new(EngineCallbackOpcode::PluginAdded)
                .plugin(plugin_id)
                .payload(name),
        );
        Ok(plugin_id)
    }

    fn internal_change(
        &self,
        context: &str,
        plugin_id: u32,
        parameter: i32,
        value: f32,
        apply: impl FnOnce(&mut StubPlugin),
    ) {
        self.run(context, |s| {
            apply(s.plugin_mut(plugin_id)?);
            s.emit(
                EngineEvent::new(EngineCallbackOpcode::ParameterValueChanged)
                    .plugin(plugin_id)
                    .values(parameter, 0, value),
            );
            Ok(())
        });
    }
}

impl Default for StubEngine {
    fn default() -> Self {
        Self::new(99)
    }
}

fn io_error(path: &str, err: impl std::fmt::Display) -> EngineError {
    EngineError::FileIo {
        path: path.to_string(),
        reason: err.to_string(),
    }
}

impl EngineLifecycle for StubEngine {
    fn engine_init(&self, driver_name: &str, client_name: &str) -> bool {
        self.run("engine_init", |s| {
            let (driver, _) = STUB_DRIVERS
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(driver_name))
                .ok_or_else(|| EngineError::UnknownDriver {
                    name: driver_name.to_string(),
                })?;
            if s.running {
                return Err(EngineError::AlreadyRunning);
            }
            s.running = true;
            s.about_to_close = false;
            s.driver = Some(driver.to_string());
            s.client_name = client_name.to_string();
            s.last_error.clear();
            s.emit(
                EngineEvent::new(EngineCallbackOpcode::EngineStarted)
                    .values(STUB_BUFFER_SIZE as i32, 0, STUB_SAMPLE_RATE as f32)
                    .payload(*driver),
            );
            Ok(())
        })
        .is_some()
    }

    fn engine_close(&self) -> bool {
        self.run("engine_close", |s| {
            s.require_running()?;
            s.running = false;
            s.driver = None;
            s.plugins.clear();
            s.connections.clear();
            s.deferred.clear();
            s.playing = false;
            s.emit(EngineEvent::new(EngineCallbackOpcode::EngineStopped));
            Ok(())
        })
        .is_some()
    }

    fn engine_idle(&self) {
        self.idle_calls.fetch_add(1, Ordering::SeqCst);
        self.run("engine_idle", |s| {
            let deferred: Vec<EngineEvent> = s.deferred.drain(..).collect();
            s.outbox.extend(deferred);

            let mut still_pending = Vec::new();
            for mut ticket in std::mem::take(&mut s.file_tickets) {
                match ticket.poll() {
                    TicketStatus::Pending => still_pending.push(ticket),
                    TicketStatus::Answered(Some(path)) => {
                        s.chosen_files.push(path.clone());
                        s.emit(EngineEvent::new(EngineCallbackOpcode::Info).payload(path));
                    }
                    TicketStatus::Answered(None) => {}
                }
            }
            s.file_tickets = still_pending;
            Ok(())
        });
    }

    fn is_engine_running(&self) -> bool {
        self.read(|s| s.running).unwrap_or(false)
    }

    fn set_engine_about_to_close(&self) -> bool {
        self.run("set_engine_about_to_close", |s| {
            s.require_running()?;
            s.about_to_close = true;
            Ok(())
        })
        .is_some()
    }

    fn last_error(&self) -> String {
        self.read(|s| s.last_error.clone()).unwrap_or_default()
    }

    fn buffer_size(&self) -> u32 {
        self.read(|s| if s.running { STUB_BUFFER_SIZE } else { 0 })
            .unwrap_or(0)
    }

    fn sample_rate(&self) -> f64 {
        self.read(|s| if s.running { STUB_SAMPLE_RATE } else { 0.0 })
            .unwrap_or(0.0)
    }

    fn load_file(&self, filename: &str) -> bool {
        let metadata = fs::metadata(filename);
        let max_plugins = self.max_plugins;
        self.run("load_file", |s| {
            let metadata = metadata.map_err(|err| io_error(filename, err))?;
            if !metadata.is_file() {
                return Err(io_error(filename, "not a regular file"));
            }
            let extension = Path::new(filename)
                .extension()
                .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
            let plugin_type = match extension.as_deref() {
                Some("sf2") => PluginType::Sf2,
                Some("sfz") => PluginType::Sfz,
                _ => PluginType::Internal,
            };
            let descriptor = PluginDescriptor {
                plugin_type,
                filename: Some(filename.to_string()),
                name: None,
                label: Some("audiofile".to_string()),
                unique_id: 0,
            };
            Self::insert_plugin(s, max_plugins, &descriptor).map(|_| ())
        })
        .is_some()
    }

    fn load_project(&self, filename: &str) -> bool {
        let contents = fs::read_to_string(filename);
        let max_plugins = self.max_plugins;
        self.run("load_project", |s| {
            s.require_running()?;
            let contents = contents.map_err(|err| io_error(filename, err))?;
            let entries: Vec<PluginInfo> =
                serde_json::from_str(&contents).map_err(|err| io_error(filename, err))?;
            if entries.len() as u32 > max_plugins {
                return Err(EngineError::PluginLimit { max: max_plugins });
            }

            for plugin_id in (0..s.plugins.len() as u32).rev() {
                s.emit(EngineEvent::new(EngineCallbackOpcode::PluginRemoved).plugin(plugin_id));
            }
            s.plugins.clear();
            s.connections.clear();

            for entry in entries {
                let descriptor = PluginDescriptor {
                    plugin_type: entry.plugin_type,
                    filename: Some(entry.filename).filter(|f| !f.is_empty()),
                    name: Some(entry.name),
                    label: Some(entry.label),
                    unique_id: entry.unique_id,
                };
                Self::insert_plugin(s, max_plugins, &descriptor)?;
            }
            s.emit(
                EngineEvent::new(EngineCallbackOpcode::ProjectLoadFinished).payload(filename),
            );
            Ok(())
        })
        .is_some()
    }

    fn save_project(&self, filename: &str) -> bool {
        let snapshot = self.run("save_project", |s| {
            s.require_running()?;
            Ok(s.plugins.iter().map(|p| p.info.clone()).collect::<Vec<_>>())
        });
        let Some(snapshot) = snapshot else {
            return false;
        };
        self.run("save_project", |_| {
            let json =
                serde_json::to_string_pretty(&snapshot).map_err(|err| io_error(filename, err))?;
            fs::write(filename, json).map_err(|err| io_error(filename, err))
        })
        .is_some()
    }

    fn subscribe(&self, sink: Arc<dyn EngineEventSink>) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::SeqCst));
        match self.sinks.write() {
            Ok(mut sinks) => sinks.push((id, sink)),
            Err(_) => log::error!("[StubEngine] sink registry poisoned, dropping subscription"),
        }
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        match self.sinks.write() {
            Ok(mut sinks) => {
                let before = sinks.len();
                sinks.retain(|(sid, _)| *sid != id);
                sinks.len() != before
            }
            Err(_) => false,
        }
    }
}

impl DriverApi for StubEngine {
    fn engine_driver_count(&self) -> u32 {
        STUB_DRIVERS.len() as u32
    }

    fn engine_driver_name(&self, index: u32) -> Option<String> {
        STUB_DRIVERS
            .get(index as usize)
            .map(|(name, _)| name.to_string())
    }

    fn engine_driver_device_names(&self, index: u32) -> Option<Vec<String>> {
        STUB_DRIVERS
            .get(index as usize)
            .map(|(_, devices)| devices.iter().map(|d| d.to_string()).collect())
    }

    fn engine_driver_device_info(
        &self,
        index: u32,
        name: &str,
    ) -> Option<EngineDriverDeviceInfo> {
        let (driver, devices) = STUB_DRIVERS.get(index as usize)?;
        if !devices.contains(&name) {
            return None;
        }
        let info = if *driver == "JACK" {
            // buffer size and rate are dictated by the JACK server
            EngineDriverDeviceInfo {
                hints: DEVICE_HAS_DYNAMIC_BUFFER_SIZE,
                buffer_sizes: vec![STUB_BUFFER_SIZE],
                sample_rates: vec![STUB_SAMPLE_RATE],
            }
        } else {
            EngineDriverDeviceInfo {
                hints: DEVICE_HAS_DYNAMIC_BUFFER_SIZE | DEVICE_HAS_DYNAMIC_SAMPLE_RATE,
                buffer_sizes: vec![128, 256, 512, 1024, 2048],
                sample_rates: vec![44_100.0, 48_000.0, 96_000.0],
            }
        };
        Some(info)
    }
}

impl PluginApi for StubEngine {
    fn current_plugin_count(&self) -> u32 {
        self.read(|s| s.plugins.len() as u32).unwrap_or(0)
    }

    fn max_plugin_number(&self) -> u32 {
        self.max_plugins
    }

    fn add_plugin(&self, descriptor: &PluginDescriptor) -> bool {
        let max_plugins = self.max_plugins;
        self.run("add_plugin", |s| {
            Self::insert_plugin(s, max_plugins, descriptor).map(|_| ())
        })
        .is_some()
    }

    fn remove_plugin(&self, plugin_id: u32) -> bool {
        self.run("remove_plugin", |s| {
            s.plugin(plugin_id)?;
            s.plugins.remove(plugin_id as usize);
            s.emit(EngineEvent::new(EngineCallbackOpcode::PluginRemoved).plugin(plugin_id));
            Ok(())
        })
        .is_some()
    }

    fn remove_all_plugins(&self) -> bool {
        self.run("remove_all_plugins", |s| {
            s.require_running()?;
            for plugin_id in (0..s.plugins.len() as u32).rev() {
                s.emit(EngineEvent::new(EngineCallbackOpcode::PluginRemoved).plugin(plugin_id));
            }
            s.plugins.clear();
            Ok(())
        })
        .is_some()
    }

    fn rename_plugin(&self, plugin_id: u32, new_name: &str) -> Option<String> {
        self.run("rename_plugin", |s| {
            s.plugin(plugin_id)?;
            let name = s.unique_name(new_name, Some(plugin_id as usize));
            s.plugin_mut(plugin_id)?.info.name = name.clone();
            s.emit(
                EngineEvent::new(EngineCallbackOpcode::PluginRenamed)
                    .plugin(plugin_id)
                    .payload(name.clone()),
            );
            Ok(name)
        })
    }

    fn clone_plugin(&self, plugin_id: u32) -> bool {
        let max_plugins = self.max_plugins;
        self.run("clone_plugin", |s| {
            let mut copy = s.plugin(plugin_id)?.clone();
            if s.plugins.len() as u32 >= max_plugins {
                return Err(EngineError::PluginLimit { max: max_plugins });
            }
            copy.info.name = s.unique_name(&copy.info.name, None);
            let new_id = s.plugins.len() as u32;
            let name = copy.info.name.clone();
            s.plugins.push(copy);
            s.emit(
                EngineEvent::new(EngineCallbackOpcode::PluginAdded)
                    .plugin(new_id)
                    .payload(name),
            );
            Ok(())
        })
        .is_some()
    }

    fn switch_plugins(&self, plugin_id_a: u32, plugin_id_b: u32) -> bool {
        self.run("switch_plugins", |s| {
            s.plugin(plugin_id_a)?;
            s.plugin(plugin_id_b)?;
            if plugin_id_a == plugin_id_b {
                return Err(EngineError::InvalidPlugin {
                    plugin_id: plugin_id_b,
                });
            }
            s.plugins.swap(plugin_id_a as usize, plugin_id_b as usize);
            s.emit(EngineEvent::new(EngineCallbackOpcode::ReloadAll).plugin(plugin_id_a));
            s.emit(EngineEvent::new(EngineCallbackOpcode::ReloadAll).plugin(plugin_id_b));
            Ok(())
        })
        .is_some()
    }

    fn load_plugin_state(&self, plugin_id: u32, filename: &str) -> bool {
        let contents = fs::read_to_string(filename);
        self.run("load_plugin_state", |s| {
            s.plugin(plugin_id)?;
            let contents = contents.map_err(|err| io_error(filename, err))?;
            let values: Vec<f32> =
                serde_json::from_str(&contents).map_err(|err| io_error(filename, err))?;
            let plugin = s.plugin_mut(plugin_id)?;
            let mut changed = Vec::new();
            for (parameter_id, (param, value)) in
                plugin.parameters.iter_mut().zip(values).enumerate()
            {
                param.value = param.ranges.clamp(value);
                changed.push((parameter_id as i32, param.value));
            }
            for (parameter_id, value) in changed {
                s.emit(
                    EngineEvent::new(EngineCallbackOpcode::ParameterValueChanged)
                        .plugin(plugin_id)
                        .values(parameter_id, 0, value),
                );
            }
            Ok(())
        })
        .is_some()
    }

    fn save_plugin_state(&self, plugin_id: u32, filename: &str) -> bool {
        let values = self.run("save_plugin_state", |s| {
            Ok(s.plugin(plugin_id)?
                .parameters
                .iter()
                .map(|p| p.value)
                .collect::<Vec<f32>>())
        });
        let Some(values) = values else {
            return false;
        };
        self.run("save_plugin_state", |_| {
            let json = serde_json::to_string(&values).map_err(|err| io_error(filename, err))?;
            fs::write(filename, json).map_err(|err| io_error(filename, err))
        })
        .is_some()
    }

    fn plugin_info(&self, plugin_id: u32) -> Option<PluginInfo> {
        self.read(|s| s.plugin(plugin_id).ok().map(|p| p.info.clone()))
            .flatten()
    }

    fn audio_port_count_info(&self, plugin_id: u32) -> Option<PortCountInfo> {
        self.read(|s| s.plugin(plugin_id).ok().map(|p| p.audio))
            .flatten()
    }

    fn set_active(&self, plugin_id: u32, on_off: bool) {
        let value = if on_off { 1.0 } else { 0.0 };
        self.internal_change("set_active", plugin_id, PARAMETER_ACTIVE, value, |p| {
            p.active = on_off
        });
    }

    fn set_volume(&self, plugin_id: u32, value: f32) {
        let value = value.clamp(0.0, 1.27);
        self.internal_change("set_volume", plugin_id, PARAMETER_VOLUME, value, |p| {
            p.volume = value
        });
    }

    fn set_drywet(&self, plugin_id: u32, value: f32) {
        let value = value.clamp(0.0, 1.0);
        self.internal_change("set_drywet", plugin_id, PARAMETER_DRYWET, value, |p| {
            p.drywet = value
        });
    }

    fn set_panning(&self, plugin_id: u32, value: f32) {
        let value = value.clamp(-1.0, 1.0);
        self.internal_change("set_panning", plugin_id, PARAMETER_PANNING, value, |p| {
            p.panning = value
        });
    }

    fn send_midi_note(&self, plugin_id: u32, channel: u8, note: u8, velocity: u8) {
        self.run("send_midi_note", |s| {
            s.require_running()?;
            s.plugin(plugin_id)?;
            let opcode = if velocity == 0 {
                EngineCallbackOpcode::NoteOff
            } else {
                EngineCallbackOpcode::NoteOn
            };
            s.emit(EngineEvent::new(opcode).plugin(plugin_id).values(
                channel as i32,
                note as i32,
                velocity as f32,
            ));
            Ok(())
        });
    }
}

impl ParameterApi for StubEngine {
    fn parameter_count(&self, plugin_id: u32) -> u32 {
        self.read(|s| {
            s.plugin(plugin_id)
                .map(|p| p.parameters.len() as u32)
                .unwrap_or(0)
        })
        .unwrap_or(0)
    }

    fn parameter_info(&self, plugin_id: u32, parameter_id: u32) -> Option<ParameterInfo> {
        self.read(|s| {
            s.plugin(plugin_id)
                .ok()
                .and_then(|p| p.parameters.get(parameter_id as usize))
                .map(|param| param.info.clone())
        })
        .flatten()
    }

    fn parameter_ranges(&self, plugin_id: u32, parameter_id: u32) -> Option<ParameterRanges> {
        self.read(|s| {
            s.plugin(plugin_id)
                .ok()
                .and_then(|p| p.parameters.get(parameter_id as usize))
                .map(|param| param.ranges)
        })
        .flatten()
    }

    fn current_parameter_value(&self, plugin_id: u32, parameter_id: u32) -> f32 {
        self.read(|s| {
            s.plugin(plugin_id)
                .ok()
                .and_then(|p| p.parameters.get(parameter_id as usize))
                .map(|param| param.value)
                .unwrap_or(0.0)
        })
        .unwrap_or(0.0)
    }

    fn set_parameter_value(&self, plugin_id: u32, parameter_id: u32, value: f32) {
        self.run("set_parameter_value", |s| {
            let param = s
                .plugin_mut(plugin_id)?
                .parameters
                .get_mut(parameter_id as usize)
                .ok_or(EngineError::InvalidPlugin { plugin_id })?;
            param.value = param.ranges.clamp(value);
            let applied = param.value;
            s.emit(
                EngineEvent::new(EngineCallbackOpcode::ParameterValueChanged)
                    .plugin(plugin_id)
                    .values(parameter_id as i32, 0, applied),
            );
            Ok(())
        });
    }

    fn reset_parameters(&self, plugin_id: u32) {
        self.run("reset_parameters", |s| {
            let plugin = s.plugin_mut(plugin_id)?;
            let mut events = Vec::new();
            for (parameter_id, param) in plugin.parameters.iter_mut().enumerate() {
                param.value = param.ranges.def;
                events.push(
                    EngineEvent::new(EngineCallbackOpcode::ParameterValueChanged)
                        .plugin(plugin_id)
                        .values(parameter_id as i32, 0, param.value),
                );
            }
            s.deferred.extend(events);
            Ok(())
        });
    }

    fn randomize_parameters(&self, plugin_id: u32) {
        self.run("randomize_parameters", |s| {
            let plugin = s.plugin_mut(plugin_id)?;
            let mut rng = rand::thread_rng();
            let mut events = Vec::new();
            for (parameter_id, param) in plugin.parameters.iter_mut().enumerate() {
                param.value = rng.gen_range(param.ranges.min..=param.ranges.max);
                events.push(
                    EngineEvent::new(EngineCallbackOpcode::ParameterValueChanged)
                        .plugin(plugin_id)
                        .values(parameter_id as i32, 0, param.value),
                );
            }
            s.deferred.extend(events);
            Ok(())
        });
    }
}

impl TransportApi for StubEngine {
    fn transport_play(&self) {
        self.run("transport_play", |s| {
            s.require_running()?;
            s.playing = true;
            Ok(())
        });
    }

    fn transport_pause(&self) {
        self.run("transport_pause", |s| {
            s.require_running()?;
            s.playing = false;
            Ok(())
        });
    }

    fn transport_bpm(&self, bpm: f64) {
        self.run("transport_bpm", |s| {
            s.require_running()?;
            s.bpm = bpm;
            Ok(())
        });
    }

    fn transport_relocate(&self, frame: u64) {
        self.run("transport_relocate", |s| {
            s.require_running()?;
            s.frame = frame;
            Ok(())
        });
    }

    fn current_transport_frame(&self) -> u64 {
        self.read(|s| s.frame).unwrap_or(0)
    }

    fn transport_info(&self) -> Option<TransportInfo> {
        self.read(|s| {
            if !s.running {
                return None;
            }
            let beats = s.frame as f64 / STUB_SAMPLE_RATE * s.bpm / 60.0;
            let bar = (beats / BEATS_PER_BAR).floor() as i32 + 1;
            let beat = (beats % BEATS_PER_BAR).floor() as i32 + 1;
            let tick = (beats.fract() * TICKS_PER_BEAT).floor() as i32;
            Some(TransportInfo {
                playing: s.playing,
                frame: s.frame,
                bar,
                beat,
                tick,
                bpm: s.bpm,
            })
        })
        .flatten()
    }
}

impl PatchbayApi for StubEngine {
    fn patchbay_connect(
        &self,
        group_id_a: u32,
        port_id_a: u32,
        group_id_b: u32,
        port_id_b: u32,
    ) -> bool {
        self.run("patchbay_connect", |s| {
            s.require_running()?;
            let connection = Connection {
                group_a: group_id_a,
                port_a: port_id_a,
                group_b: group_id_b,
                port_b: port_id_b,
            };
            if group_id_a == group_id_b && port_id_a == port_id_b {
                return Err(EngineError::Patchbay {
                    details: "cannot connect a port to itself".to_string(),
                });
            }
            if s.connections.values().any(|c| *c == connection) {
                return Err(EngineError::Patchbay {
                    details: "ports already connected".to_string(),
                });
            }
            let connection_id = s.next_connection_id;
            s.next_connection_id += 1;
            s.connections.insert(connection_id, connection);
            s.emit(
                EngineEvent::new(EngineCallbackOpcode::PatchbayConnectionAdded)
                    .plugin(connection_id)
                    .payload(format!(
                        "{}:{}:{}:{}",
                        group_id_a, port_id_a, group_id_b, port_id_b
                    )),
            );
            Ok(())
        })
        .is_some()
    }

    fn patchbay_disconnect(&self, connection_id: u32) -> bool {
        self.run("patchbay_disconnect", |s| {
            s.require_running()?;
            s.connections
                .remove(&connection_id)
                .ok_or_else(|| EngineError::Patchbay {
                    details: format!("unknown connection {}", connection_id),
                })?;
            s.emit(
                EngineEvent::new(EngineCallbackOpcode::PatchbayConnectionRemoved)
                    .plugin(connection_id),
            );
            Ok(())
        })
        .is_some()
    }

    fn patchbay_refresh(&self, external: bool) -> bool {
        self.run("patchbay_refresh", |s| {
            s.require_running()?;
            let mut events = Vec::new();
            if external {
                events.push(
                    EngineEvent::new(EngineCallbackOpcode::PatchbayClientAdded)
                        .plugin(0)
                        .payload("system"),
                );
            }
            for (idx, plugin) in s.plugins.iter().enumerate() {
                events.push(
                    EngineEvent::new(EngineCallbackOpcode::PatchbayClientAdded)
                        .plugin(idx as u32 + 1)
                        .payload(plugin.info.name.clone()),
                );
            }
            for (id, c) in &s.connections {
                events.push(
                    EngineEvent::new(EngineCallbackOpcode::PatchbayConnectionAdded)
                        .plugin(*id)
                        .payload(format!(
                            "{}:{}:{}:{}",
                            c.group_a, c.port_a, c.group_b, c.port_b
                        )),
                );
            }
            s.outbox.extend(events);
            Ok(())
        })
        .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::events::FileCallbackOpcode;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<EngineEvent>>,
    }

    impl EngineEventSink for Recorder {
        fn on_event(&self, event: &EngineEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    impl Recorder {
        fn opcodes(&self) -> Vec<EngineCallbackOpcode> {
            self.events.lock().unwrap().iter().map(|e| e.opcode).collect()
        }
    }

    fn running_engine() -> (StubEngine, Arc<Recorder>) {
        let engine = StubEngine::new(4);
        let recorder = Arc::new(Recorder::default());
        engine.subscribe(recorder.clone());
        assert!(engine.engine_init("Dummy", "test"));
        (engine, recorder)
    }

    fn lv2(name: &str) -> PluginDescriptor {
        PluginDescriptor {
            plugin_type: PluginType::Lv2,
            filename: None,
            name: Some(name.to_string()),
            label: None,
            unique_id: 0,
        }
    }

    #[test]
    fn init_emits_started_and_rejects_second_init() {
        let (engine, recorder) = running_engine();
        assert!(engine.is_engine_running());
        assert_eq!(recorder.opcodes(), vec![EngineCallbackOpcode::EngineStarted]);

        assert!(!engine.engine_init("Dummy", "again"));
        assert!(engine.last_error().contains("already running"));
    }

    #[test]
    fn snapshot_reflects_session_and_mixer() {
        let (engine, _) = running_engine();
        engine.add_plugin(&lv2("Synth"));
        engine.set_volume(0, 2.0);
        engine.set_panning(0, -0.5);
        engine.set_active(0, false);
        assert!(engine.set_engine_about_to_close());

        let snapshot = engine.snapshot().unwrap();
        assert_eq!(snapshot.driver.as_deref(), Some("Dummy"));
        assert_eq!(snapshot.client_name, "test");
        assert!(snapshot.about_to_close);
        assert_eq!(
            snapshot.mixer,
            vec![StubMixer {
                active: false,
                volume: 1.27,
                drywet: 1.0,
                panning: -0.5,
            }]
        );
    }

    #[test]
    fn unknown_driver_records_last_error() {
        let engine = StubEngine::default();
        assert!(!engine.engine_init("CoreAudio", "test"));
        assert_eq!(engine.last_error(), "Unknown engine driver 'CoreAudio'");
        assert!(!engine.is_engine_running());
    }

    #[test]
    fn close_without_init_fails() {
        let engine = StubEngine::default();
        assert!(!engine.engine_close());
        assert!(engine.last_error().contains("not running"));
    }

    #[test]
    fn plugin_names_stay_unique() {
        let (engine, _) = running_engine();
        assert!(engine.add_plugin(&lv2("Reverb")));
        assert!(engine.add_plugin(&lv2("Reverb")));
        assert_eq!(engine.plugin_info(1).unwrap().name, "Reverb (2)");

        assert_eq!(engine.rename_plugin(1, "Reverb").as_deref(), Some("Reverb (2)"));
        assert_eq!(engine.rename_plugin(1, "Delay").as_deref(), Some("Delay"));
    }

    #[test]
    fn plugin_limit_is_enforced() {
        let (engine, _) = running_engine();
        for i in 0..4 {
            assert!(engine.add_plugin(&lv2(&format!("p{i}"))));
        }
        assert!(!engine.add_plugin(&lv2("overflow")));
        assert!(!engine.clone_plugin(0));
        assert_eq!(engine.current_plugin_count(), 4);
    }

    #[test]
    fn parameter_values_are_clamped() {
        let (engine, recorder) = running_engine();
        engine.add_plugin(&lv2("Gain"));
        engine.set_parameter_value(0, 0, 5.0);
        assert_eq!(engine.current_parameter_value(0, 0), 2.0);
        let last = recorder.events.lock().unwrap().last().cloned().unwrap();
        assert_eq!(last.opcode, EngineCallbackOpcode::ParameterValueChanged);
        assert_eq!(last.value3, 2.0);
    }

    #[test]
    fn bulk_parameter_changes_wait_for_idle() {
        let (engine, recorder) = running_engine();
        engine.add_plugin(&lv2("Gain"));
        let before = recorder.opcodes().len();

        engine.randomize_parameters(0);
        assert_eq!(recorder.opcodes().len(), before);

        engine.engine_idle();
        assert_eq!(recorder.opcodes().len(), before + 2);
        assert_eq!(engine.idle_calls(), 1);
    }

    #[test]
    fn patchbay_rejects_duplicates_and_unknown_ids() {
        let (engine, _) = running_engine();
        assert!(engine.patchbay_connect(1, 1, 2, 1));
        assert!(!engine.patchbay_connect(1, 1, 2, 1));
        assert!(engine.patchbay_disconnect(1));
        assert!(!engine.patchbay_disconnect(1));
    }

    #[test]
    fn transport_info_tracks_relocation() {
        let (engine, _) = running_engine();
        // 2 seconds at 120 bpm = 4 beats = start of bar 2
        engine.transport_relocate(96_000);
        let info = engine.transport_info().unwrap();
        assert_eq!(info.bar, 2);
        assert_eq!(info.beat, 1);
        assert_eq!(info.tick, 0);
    }

    #[test]
    fn transport_info_absent_when_stopped() {
        let engine = StubEngine::default();
        assert!(engine.transport_info().is_none());
    }

    #[test]
    fn device_info_for_unknown_device_is_none() {
        let engine = StubEngine::default();
        assert!(engine.engine_driver_device_info(0, "Default").is_some());
        assert!(engine.engine_driver_device_info(0, "nonexistent").is_none());
        assert!(engine.engine_driver_device_info(9, "Default").is_none());
    }

    #[test]
    fn project_save_and_load_restores_rack() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let path = path.to_str().unwrap();

        let (engine, recorder) = running_engine();
        engine.add_plugin(&lv2("Synth"));
        engine.add_plugin(&lv2("Delay"));
        assert!(engine.save_project(path));

        engine.remove_all_plugins();
        assert_eq!(engine.current_plugin_count(), 0);
        assert!(engine.load_project(path));
        assert_eq!(engine.current_plugin_count(), 2);
        assert_eq!(engine.plugin_info(1).unwrap().name, "Delay");
        assert_eq!(
            recorder.opcodes().last(),
            Some(&EngineCallbackOpcode::ProjectLoadFinished)
        );
    }

    #[test]
    fn missing_project_file_is_rejected() {
        let (engine, _) = running_engine();
        assert!(!engine.load_project("/no/such/project.json"));
        assert!(engine.last_error().contains("/no/such/project.json"));
    }

    #[test]
    fn oversized_project_leaves_rack_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.json");
        let path = path.to_str().unwrap();

        let big = StubEngine::new(8);
        assert!(big.engine_init("Dummy", "big"));
        for i in 0..5 {
            assert!(big.add_plugin(&lv2(&format!("p{i}"))));
        }
        assert!(big.save_project(path));

        let (engine, recorder) = running_engine();
        engine.add_plugin(&lv2("Keep"));
        let before = recorder.opcodes().len();

        assert!(!engine.load_project(path));
        assert_eq!(engine.current_plugin_count(), 1);
        assert_eq!(engine.plugin_info(0).unwrap().name, "Keep");
        assert_eq!(recorder.opcodes().len(), before);
        assert!(engine.last_error().contains("Maximum number of plugins"));
    }

    #[test]
    fn concurrent_calls_deliver_events_in_mutation_order() {
        use std::thread;
        use std::time::Duration;

        struct SlowStart;
        impl EngineEventSink for SlowStart {
            fn on_event(&self, event: &EngineEvent) {
                if event.opcode == EngineCallbackOpcode::EngineStarted {
                    thread::sleep(Duration::from_millis(200));
                }
            }
        }

        let engine = Arc::new(StubEngine::default());
        engine.subscribe(Arc::new(SlowStart));
        let recorder = Arc::new(Recorder::default());
        engine.subscribe(recorder.clone());

        let init = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.engine_init("Dummy", "race"))
        };
        thread::sleep(Duration::from_millis(50));
        let close = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.engine_close())
        };
        assert!(init.join().unwrap());
        assert!(close.join().unwrap());

        assert!(!engine.is_engine_running());
        assert_eq!(
            recorder.opcodes(),
            vec![
                EngineCallbackOpcode::EngineStarted,
                EngineCallbackOpcode::EngineStopped
            ]
        );
    }

    #[test]
    fn panicking_sink_does_not_wedge_later_calls() {
        struct Exploding;
        impl EngineEventSink for Exploding {
            fn on_event(&self, event: &EngineEvent) {
                if event.opcode == EngineCallbackOpcode::EngineStarted {
                    panic!("sink failure");
                }
            }
        }

        let engine = StubEngine::default();
        engine.subscribe(Arc::new(Exploding));
        let outcome =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| engine.engine_init("Dummy", "x")));
        assert!(outcome.is_err());

        assert!(engine.is_engine_running());
        assert!(engine.engine_close());
    }

    #[test]
    fn unsubscribed_sink_stops_receiving() {
        let engine = StubEngine::default();
        let recorder = Arc::new(Recorder::default());
        let id = engine.subscribe(recorder.clone());
        assert!(engine.unsubscribe(id));
        assert!(!engine.unsubscribe(id));

        engine.engine_init("Dummy", "test");
        assert!(recorder.opcodes().is_empty());
    }

    #[test]
    fn file_request_without_registering_sink_has_no_id() {
        let engine = StubEngine::default();
        let recorder = Arc::new(Recorder::default());
        engine.subscribe(recorder);
        let id = engine.request_file(FileRequest {
            opcode: FileCallbackOpcode::Open,
            is_dir: false,
            title: "Open".to_string(),
            filter: "*.wav".to_string(),
        });
        assert_eq!(id, None);
    }
}
