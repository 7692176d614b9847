//! Lookup operations against an engine that has nothing to report
//!
//! The engine here reports non-zero counts, so every request passes range
//! validation and reaches the lookup itself, which always comes back empty.
//! Each such operation must answer a client error with a plain text body.

use std::sync::Arc;

use axum::http::StatusCode;
use hostbridge::control::respond;
use hostbridge::engine::backend::{
    DriverApi, EngineDriverDeviceInfo, EngineLifecycle, ParameterApi, ParameterInfo,
    ParameterRanges, PatchbayApi, PluginApi, PluginDescriptor, PluginInfo, PortCountInfo,
    TransportApi, TransportInfo,
};
use hostbridge::engine::{EngineEventSink, SubscriptionId};
use hostbridge::{BridgeConfig, BridgeHandle, ControlRequest};

/// Running engine with two drivers, two plugins of two parameters each, and
/// no answer to any lookup.
struct BlankEngine;

impl EngineLifecycle for BlankEngine {
    fn engine_init(&self, _: &str, _: &str) -> bool {
        true
    }
    fn engine_close(&self) -> bool {
        true
    }
    fn engine_idle(&self) {}
    fn is_engine_running(&self) -> bool {
        true
    }
    fn set_engine_about_to_close(&self) -> bool {
        true
    }
    fn last_error(&self) -> String {
        "nothing to report".to_string()
    }
    fn buffer_size(&self) -> u32 {
        256
    }
    fn sample_rate(&self) -> f64 {
        44_100.0
    }
    fn load_file(&self, _: &str) -> bool {
        false
    }
    fn load_project(&self, _: &str) -> bool {
        false
    }
    fn save_project(&self, _: &str) -> bool {
        false
    }
    fn subscribe(&self, _: Arc<dyn EngineEventSink>) -> SubscriptionId {
        SubscriptionId(1)
    }
    fn unsubscribe(&self, _: SubscriptionId) -> bool {
        true
    }
}

impl DriverApi for BlankEngine {
    fn engine_driver_count(&self) -> u32 {
        2
    }
    fn engine_driver_name(&self, _: u32) -> Option<String> {
        None
    }
    fn engine_driver_device_names(&self, _: u32) -> Option<Vec<String>> {
        None
    }
    fn engine_driver_device_info(&self, _: u32, _: &str) -> Option<EngineDriverDeviceInfo> {
        None
    }
}

impl PluginApi for BlankEngine {
    fn current_plugin_count(&self) -> u32 {
        2
    }
    fn max_plugin_number(&self) -> u32 {
        99
    }
    fn add_plugin(&self, _: &PluginDescriptor) -> bool {
        false
    }
    fn remove_plugin(&self, _: u32) -> bool {
        false
    }
    fn remove_all_plugins(&self) -> bool {
        false
    }
    fn rename_plugin(&self, _: u32, _: &str) -> Option<String> {
        None
    }
    fn clone_plugin(&self, _: u32) -> bool {
        false
    }
    fn switch_plugins(&self, _: u32, _: u32) -> bool {
        false
    }
    fn load_plugin_state(&self, _: u32, _: &str) -> bool {
        false
    }
    fn save_plugin_state(&self, _: u32, _: &str) -> bool {
        false
    }
    fn plugin_info(&self, _: u32) -> Option<PluginInfo> {
        None
    }
    fn audio_port_count_info(&self, _: u32) -> Option<PortCountInfo> {
        None
    }
    fn set_active(&self, _: u32, _: bool) {}
    fn set_volume(&self, _: u32, _: f32) {}
    fn set_drywet(&self, _: u32, _: f32) {}
    fn set_panning(&self, _: u32, _: f32) {}
    fn send_midi_note(&self, _: u32, _: u8, _: u8, _: u8) {}
}

impl ParameterApi for BlankEngine {
    fn parameter_count(&self, _: u32) -> u32 {
        2
    }
    fn parameter_info(&self, _: u32, _: u32) -> Option<ParameterInfo> {
        None
    }
    fn parameter_ranges(&self, _: u32, _: u32) -> Option<ParameterRanges> {
        None
    }
    fn current_parameter_value(&self, _: u32, _: u32) -> f32 {
        0.0
    }
    fn set_parameter_value(&self, _: u32, _: u32, _: f32) {}
    fn reset_parameters(&self, _: u32) {}
    fn randomize_parameters(&self, _: u32) {}
}

impl TransportApi for BlankEngine {
    fn transport_play(&self) {}
    fn transport_pause(&self) {}
    fn transport_bpm(&self, _: f64) {}
    fn transport_relocate(&self, _: u64) {}
    fn current_transport_frame(&self) -> u64 {
        0
    }
    fn transport_info(&self) -> Option<TransportInfo> {
        None
    }
}

impl PatchbayApi for BlankEngine {
    fn patchbay_connect(&self, _: u32, _: u32, _: u32, _: u32) -> bool {
        false
    }
    fn patchbay_disconnect(&self, _: u32) -> bool {
        false
    }
    fn patchbay_refresh(&self, _: bool) -> bool {
        false
    }
}

const LOOKUPS: &[(&str, &[(&str, &str)])] = &[
    ("get-engine-driver-name", &[("index", "1")]),
    ("get-engine-driver-device-names", &[("index", "1")]),
    ("get-engine-driver-device-info", &[("index", "0"), ("name", "Default")]),
    ("get-transport-info", &[]),
    ("get-plugin-info", &[("pluginId", "1")]),
    ("get-audio-port-count-info", &[("pluginId", "0")]),
    ("get-parameter-info", &[("pluginId", "0"), ("parameterId", "1")]),
    ("get-parameter-ranges", &[("pluginId", "1"), ("parameterId", "0")]),
    ("rename-plugin", &[("pluginId", "0"), ("newName", "Renamed")]),
];

fn request(operation: &str, params: &[(&str, &str)]) -> ControlRequest {
    ControlRequest::new(
        operation,
        params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    )
}

#[test]
fn test_every_empty_lookup_is_client_error_without_json() {
    let bridge = BridgeHandle::new(BridgeConfig::default(), Arc::new(BlankEngine));

    for (operation, params) in LOOKUPS {
        let response = respond(&bridge, request(operation, params));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", operation);
        assert_ne!(
            response.content_type(),
            Some("application/json"),
            "{}",
            operation
        );
        assert!(
            serde_json::from_slice::<serde_json::Value>(response.body()).is_err(),
            "{} body: {}",
            operation,
            response.body_text()
        );
    }
}

#[test]
fn test_lookup_table_covers_every_lookup_operation() {
    let table = hostbridge::CommandTable::global();
    for (operation, _) in LOOKUPS {
        assert!(table.resolve(operation).is_ok(), "{}", operation);
    }
}

#[test]
fn test_counts_still_answer_when_lookups_are_empty() {
    let bridge = BridgeHandle::new(BridgeConfig::default(), Arc::new(BlankEngine));
    let count = respond(&bridge, request("get-current-plugin-count", &[]));
    assert_eq!(count.status(), StatusCode::OK);
    assert_eq!(count.body_text(), "2");

    let running = respond(&bridge, request("is-engine-running", &[]));
    assert_eq!(running.status(), StatusCode::OK);
    assert_eq!(running.body_text(), "true");
}
