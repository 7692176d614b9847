//! Events the engine emits from its own execution context, and the sink
//! abstraction through which it emits them.

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

/// Engine callback opcodes.
///
/// Numeric values are what travels on the notification line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum EngineCallbackOpcode {
    Debug = 0,
    PluginAdded = 1,
    PluginRemoved = 2,
    PluginRenamed = 3,
    PluginUnavailable = 4,
    ParameterValueChanged = 5,
    ParameterDefaultChanged = 6,
    ParameterMidiCcChanged = 7,
    ParameterMidiChannelChanged = 8,
    OptionChanged = 9,
    ProgramChanged = 10,
    MidiProgramChanged = 11,
    UiStateChanged = 12,
    NoteOn = 13,
    NoteOff = 14,
    Update = 15,
    ReloadInfo = 16,
    ReloadParameters = 17,
    ReloadPrograms = 18,
    ReloadAll = 19,
    PatchbayClientAdded = 20,
    PatchbayClientRemoved = 21,
    PatchbayClientRenamed = 22,
    PatchbayClientDataChanged = 23,
    PatchbayPortAdded = 24,
    PatchbayPortRemoved = 25,
    PatchbayPortChanged = 26,
    PatchbayConnectionAdded = 27,
    PatchbayConnectionRemoved = 28,
    EngineStarted = 29,
    EngineStopped = 30,
    ProcessModeChanged = 31,
    TransportModeChanged = 32,
    BufferSizeChanged = 33,
    SampleRateChanged = 34,
    CancelableAction = 35,
    ProjectLoadFinished = 36,
    Nsm = 37,
    Idle = 38,
    Info = 39,
    Error = 40,
    Quit = 41,
}

impl EngineCallbackOpcode {
    const ALL: [EngineCallbackOpcode; 42] = [
        Self::Debug,
        Self::PluginAdded,
        Self::PluginRemoved,
        Self::PluginRenamed,
        Self::PluginUnavailable,
        Self::ParameterValueChanged,
        Self::ParameterDefaultChanged,
        Self::ParameterMidiCcChanged,
        Self::ParameterMidiChannelChanged,
        Self::OptionChanged,
        Self::ProgramChanged,
        Self::MidiProgramChanged,
        Self::UiStateChanged,
        Self::NoteOn,
        Self::NoteOff,
        Self::Update,
        Self::ReloadInfo,
        Self::ReloadParameters,
        Self::ReloadPrograms,
        Self::ReloadAll,
        Self::PatchbayClientAdded,
        Self::PatchbayClientRemoved,
        Self::PatchbayClientRenamed,
        Self::PatchbayClientDataChanged,
        Self::PatchbayPortAdded,
        Self::PatchbayPortRemoved,
        Self::PatchbayPortChanged,
        Self::PatchbayConnectionAdded,
        Self::PatchbayConnectionRemoved,
        Self::EngineStarted,
        Self::EngineStopped,
        Self::ProcessModeChanged,
        Self::TransportModeChanged,
        Self::BufferSizeChanged,
        Self::SampleRateChanged,
        Self::CancelableAction,
        Self::ProjectLoadFinished,
        Self::Nsm,
        Self::Idle,
        Self::Info,
        Self::Error,
        Self::Quit,
    ];

    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }
}

/// One event produced by the engine.
///
/// Immutable once built; the relay consumes it exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineEvent {
    pub opcode: EngineCallbackOpcode,
    pub plugin_id: u32,
    pub value1: i32,
    pub value2: i32,
    pub value3: f32,
    pub payload: Option<String>,
}

impl EngineEvent {
    pub fn new(opcode: EngineCallbackOpcode) -> Self {
        Self {
            opcode,
            plugin_id: 0,
            value1: 0,
            value2: 0,
            value3: 0.0,
            payload: None,
        }
    }

    pub fn plugin(mut self, plugin_id: u32) -> Self {
        self.plugin_id = plugin_id;
        self
    }

    pub fn values(mut self, value1: i32, value2: i32, value3: f32) -> Self {
        self.value1 = value1;
        self.value2 = value2;
        self.value3 = value3;
        self
    }

    pub fn payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }
}

/// Kind of file dialog the engine asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum FileCallbackOpcode {
    Debug = 0,
    Open = 1,
    Save = 2,
}

/// A request from the engine for a human or external decision.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRequest {
    pub opcode: FileCallbackOpcode,
    pub is_dir: bool,
    pub title: String,
    pub filter: String,
}

/// Result of polling a [`FileRequestTicket`].
#[derive(Debug, Clone, PartialEq)]
pub enum TicketStatus {
    Pending,
    /// The control plane answered; `None` means no file was chosen.
    Answered(Option<String>),
}

/// Handle the engine keeps while a file request is outstanding.
///
/// The engine polls it from its own context (typically during idle) instead
/// of blocking in the callback.
#[derive(Debug)]
pub struct FileRequestTicket {
    id: Option<u64>,
    reply: oneshot::Receiver<Option<String>>,
}

impl FileRequestTicket {
    pub(crate) fn pending(id: u64, reply: oneshot::Receiver<Option<String>>) -> Self {
        Self {
            id: Some(id),
            reply,
        }
    }

    /// A ticket already answered with "no file".
    pub fn unanswered() -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(None);
        Self { id: None, reply: rx }
    }

    /// Correlation id, absent when the request was never registered.
    pub fn id(&self) -> Option<u64> {
        self.id
    }

    pub fn poll(&mut self) -> TicketStatus {
        match self.reply.try_recv() {
            Ok(answer) => TicketStatus::Answered(answer),
            Err(TryRecvError::Empty) => TicketStatus::Pending,
            // reply side dropped without answering
            Err(TryRecvError::Closed) => TicketStatus::Answered(None),
        }
    }
}

/// Subscriber for engine events.
///
/// Called synchronously from the engine's execution context: implementations
/// must return quickly and never block.
pub trait EngineEventSink: Send + Sync {
    fn on_event(&self, event: &EngineEvent);

    fn on_file_request(&self, request: &FileRequest) -> FileRequestTicket {
        let _ = request;
        FileRequestTicket::unanswered()
    }
}

/// Identifies one sink registration on an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);
