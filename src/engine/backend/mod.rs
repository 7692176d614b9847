//! Collaborator interface to the plugin-hosting engine.
//!
//! The engine surface is split by resource into capability traits and
//! recombined as [`HostEngine`]. Boolean returns are success flags (details
//! via [`EngineLifecycle::last_error`]); `Option` returns are lookups that
//! yield `None` when the engine has nothing to report.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::engine::events::{EngineEventSink, SubscriptionId};

mod stub;
pub use stub::{StubEngine, StubMixer, StubSnapshot, STUB_DRIVERS};

/// Capability info for one device of an engine driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineDriverDeviceInfo {
    pub hints: u32,
    pub buffer_sizes: Vec<u32>,
    pub sample_rates: Vec<f64>,
}

/// Driver device hint bits.
pub const DEVICE_CAN_TRIGGER_CONTROL_PANEL: u32 = 0x1;
pub const DEVICE_HAS_DYNAMIC_BUFFER_SIZE: u32 = 0x2;
pub const DEVICE_HAS_DYNAMIC_SAMPLE_RATE: u32 = 0x4;

/// Plugin formats the engine can host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginType {
    Internal,
    Ladspa,
    Dssi,
    Lv2,
    Vst2,
    Vst3,
    Au,
    Sf2,
    Sfz,
}

impl FromStr for PluginType {
    type Err = ();

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "internal" => Ok(PluginType::Internal),
            "ladspa" => Ok(PluginType::Ladspa),
            "dssi" => Ok(PluginType::Dssi),
            "lv2" => Ok(PluginType::Lv2),
            "vst2" | "vst" => Ok(PluginType::Vst2),
            "vst3" => Ok(PluginType::Vst3),
            "au" => Ok(PluginType::Au),
            "sf2" => Ok(PluginType::Sf2),
            "sfz" => Ok(PluginType::Sfz),
            _ => Err(()),
        }
    }
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PluginType::Internal => "internal",
            PluginType::Ladspa => "ladspa",
            PluginType::Dssi => "dssi",
            PluginType::Lv2 => "lv2",
            PluginType::Vst2 => "vst2",
            PluginType::Vst3 => "vst3",
            PluginType::Au => "au",
            PluginType::Sf2 => "sf2",
            PluginType::Sfz => "sfz",
        };
        f.write_str(name)
    }
}

/// Everything needed to ask the engine for a new plugin instance.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginDescriptor {
    pub plugin_type: PluginType,
    pub filename: Option<String>,
    pub name: Option<String>,
    pub label: Option<String>,
    pub unique_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginInfo {
    #[serde(rename = "type")]
    pub plugin_type: PluginType,
    pub hints: u32,
    pub name: String,
    pub label: String,
    pub filename: String,
    pub maker: String,
    pub unique_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortCountInfo {
    pub ins: u32,
    pub outs: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterInfo {
    pub name: String,
    pub symbol: String,
    pub unit: String,
    pub scale_point_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterRanges {
    pub def: f32,
    pub min: f32,
    pub max: f32,
    pub step: f32,
    pub step_small: f32,
    pub step_large: f32,
}

impl ParameterRanges {
    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransportInfo {
    pub playing: bool,
    pub frame: u64,
    pub bar: i32,
    pub beat: i32,
    pub tick: i32,
    pub bpm: f64,
}

/// Engine lifecycle, session files and event subscriptions.
pub trait EngineLifecycle: Send + Sync {
    fn engine_init(&self, driver_name: &str, client_name: &str) -> bool;
    fn engine_close(&self) -> bool;
    /// Non-blocking advance of pending engine work.
    fn engine_idle(&self);
    fn is_engine_running(&self) -> bool;
    fn set_engine_about_to_close(&self) -> bool;
    fn last_error(&self) -> String;
    fn buffer_size(&self) -> u32;
    fn sample_rate(&self) -> f64;

    fn load_file(&self, filename: &str) -> bool;
    fn load_project(&self, filename: &str) -> bool;
    fn save_project(&self, filename: &str) -> bool;

    fn subscribe(&self, sink: Arc<dyn EngineEventSink>) -> SubscriptionId;
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

/// Audio driver discovery.
pub trait DriverApi: Send + Sync {
    fn engine_driver_count(&self) -> u32;
    fn engine_driver_name(&self, index: u32) -> Option<String>;
    fn engine_driver_device_names(&self, index: u32) -> Option<Vec<String>>;
    fn engine_driver_device_info(&self, index: u32, name: &str)
        -> Option<EngineDriverDeviceInfo>;
}

/// Plugin rack management.
pub trait PluginApi: Send + Sync {
    fn current_plugin_count(&self) -> u32;
    fn max_plugin_number(&self) -> u32;
    fn add_plugin(&self, descriptor: &PluginDescriptor) -> bool;
    fn remove_plugin(&self, plugin_id: u32) -> bool;
    fn remove_all_plugins(&self) -> bool;
    /// Returns the name actually applied, which may differ from the request.
    fn rename_plugin(&self, plugin_id: u32, new_name: &str) -> Option<String>;
    fn clone_plugin(&self, plugin_id: u32) -> bool;
    fn switch_plugins(&self, plugin_id_a: u32, plugin_id_b: u32) -> bool;
    fn load_plugin_state(&self, plugin_id: u32, filename: &str) -> bool;
    fn save_plugin_state(&self, plugin_id: u32, filename: &str) -> bool;
    fn plugin_info(&self, plugin_id: u32) -> Option<PluginInfo>;
    fn audio_port_count_info(&self, plugin_id: u32) -> Option<PortCountInfo>;
    fn set_active(&self, plugin_id: u32, on_off: bool);
    fn set_volume(&self, plugin_id: u32, value: f32);
    fn set_drywet(&self, plugin_id: u32, value: f32);
    fn set_panning(&self, plugin_id: u32, value: f32);
    fn send_midi_note(&self, plugin_id: u32, channel: u8, note: u8, velocity: u8);
}

/// Per-plugin parameter access.
pub trait ParameterApi: Send + Sync {
    fn parameter_count(&self, plugin_id: u32) -> u32;
    fn parameter_info(&self, plugin_id: u32, parameter_id: u32) -> Option<ParameterInfo>;
    fn parameter_ranges(&self, plugin_id: u32, parameter_id: u32) -> Option<ParameterRanges>;
    fn current_parameter_value(&self, plugin_id: u32, parameter_id: u32) -> f32;
    fn set_parameter_value(&self, plugin_id: u32, parameter_id: u32, value: f32);
    fn reset_parameters(&self, plugin_id: u32);
    fn randomize_parameters(&self, plugin_id: u32);
}

/// Transport control.
pub trait TransportApi: Send + Sync {
    fn transport_play(&self);
    fn transport_pause(&self);
    fn transport_bpm(&self, bpm: f64);
    fn transport_relocate(&self, frame: u64);
    fn current_transport_frame(&self) -> u64;
    fn transport_info(&self) -> Option<TransportInfo>;
}

/// Patchbay graph edits.
pub trait PatchbayApi: Send + Sync {
    fn patchbay_connect(
        &self,
        group_id_a: u32,
        port_id_a: u32,
        group_id_b: u32,
        port_id_b: u32,
    ) -> bool;
    fn patchbay_disconnect(&self, connection_id: u32) -> bool;
    fn patchbay_refresh(&self, external: bool) -> bool;
}

/// The full capability set the bridge drives.
pub trait HostEngine:
    EngineLifecycle + DriverApi + PluginApi + ParameterApi + TransportApi + PatchbayApi
{
}

impl<T> HostEngine for T where
    T: EngineLifecycle + DriverApi + PluginApi + ParameterApi + TransportApi + PatchbayApi
{
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plugin_type_parses_case_insensitively() {
        assert_eq!("LV2".parse::<PluginType>(), Ok(PluginType::Lv2));
        assert_eq!("vst".parse::<PluginType>(), Ok(PluginType::Vst2));
        assert!("wasm".parse::<PluginType>().is_err());
        assert_eq!(PluginType::Sfz.to_string(), "sfz");
    }

    #[test]
    fn device_info_serializes_with_stable_field_names() {
        let info = EngineDriverDeviceInfo {
            hints: DEVICE_HAS_DYNAMIC_BUFFER_SIZE,
            buffer_sizes: vec![256, 512],
            sample_rates: vec![48000.0],
        };
        let json = serde_json::to_string(&info).unwrap();
        assert_eq!(
            json,
            r#"{"hints":2,"bufferSizes":[256,512],"sampleRates":[48000.0]}"#
        );
    }
}
