//! BridgeHandle: shared orchestration layer between the engine and the
//! control plane.
//!
//! One handle owns the engine collaborator, the running-state cell, the
//! callback relay, the notification hub and the idle pump. It is shared by
//! every request-handling session and by the HTTP and CLI entry points.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

use crate::config::BridgeConfig;
use crate::engine::backend::{HostEngine, StubEngine};
use crate::engine::events::{EngineEventSink, SubscriptionId};
use crate::engine::idle::IdlePump;
use crate::engine::state::{EngineState, EngineStateCell};
use crate::managers::NotificationHub;
use crate::relay::{EngineCallbackRelay, PendingFileRequests};

pub struct BridgeHandle {
    config: BridgeConfig,
    engine: Arc<dyn HostEngine>,
    state: Arc<EngineStateCell>,
    notifications: Arc<NotificationHub>,
    pending_files: Arc<PendingFileRequests>,
    relay: Arc<EngineCallbackRelay>,
    idle_pump: Arc<IdlePump>,
    subscription: Mutex<Option<SubscriptionId>>,
    shut_down: AtomicBool,
    start_instant: Instant,
}

impl BridgeHandle {
    /// Wire a bridge around `engine`. Callbacks are not installed yet.
    pub fn new(config: BridgeConfig, engine: Arc<dyn HostEngine>) -> Self {
        let state = Arc::new(EngineStateCell::new());
        let notifications = Arc::new(NotificationHub::new(
            config.notifications.channel_capacity,
        ));
        let pending_files = Arc::new(PendingFileRequests::new(
            config.notifications.max_pending_file_requests,
        ));
        let relay = Arc::new(EngineCallbackRelay::new(
            Arc::clone(&state),
            Arc::clone(&notifications),
            Arc::clone(&pending_files),
            config.notifications.max_line_bytes,
        ));
        let idle_pump = Arc::new(IdlePump::new(Arc::clone(&engine), Arc::clone(&state)));

        Self {
            config,
            engine,
            state,
            notifications,
            pending_files,
            relay,
            idle_pump,
            subscription: Mutex::new(None),
            shut_down: AtomicBool::new(false),
            start_instant: Instant::now(),
        }
    }

    /// Bridge around the in-memory [`StubEngine`], returned alongside it.
    pub fn with_stub_engine(config: BridgeConfig) -> (Self, Arc<StubEngine>) {
        let engine = Arc::new(StubEngine::new(config.engine.max_plugins));
        let bridge = Self::new(config, engine.clone());
        (bridge, engine)
    }

    // ====== ACCESSORS ======

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn engine(&self) -> &dyn HostEngine {
        self.engine.as_ref()
    }

    pub fn engine_state(&self) -> EngineState {
        self.state.get()
    }

    pub fn notifications(&self) -> &Arc<NotificationHub> {
        &self.notifications
    }

    pub fn pending_file_requests(&self) -> &PendingFileRequests {
        &self.pending_files
    }

    pub fn relay(&self) -> &Arc<EngineCallbackRelay> {
        &self.relay
    }

    pub fn idle_pump(&self) -> &Arc<IdlePump> {
        &self.idle_pump
    }

    pub fn uptime_ms(&self) -> u64 {
        self.start_instant.elapsed().as_millis() as u64
    }

    // ====== CALLBACK INSTALLATION ======

    /// Subscribe the relay to the engine. Safe to call repeatedly; only the
    /// first call subscribes. Returns true when this call installed it.
    pub fn install_callbacks(&self) -> bool {
        let mut subscription = match self.subscription.lock() {
            Ok(guard) => guard,
            Err(_) => {
                log::error!("[BridgeHandle] subscription lock poisoned");
                return false;
            }
        };
        if subscription.is_some() {
            return false;
        }

        let sink: Arc<dyn EngineEventSink> = self.relay.clone();
        let id = self.engine.subscribe(sink);
        *subscription = Some(id);
        log::info!("[BridgeHandle] engine callbacks installed ({:?})", id);
        true
    }

    pub fn callbacks_installed(&self) -> bool {
        self.subscription
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    // ====== BACKGROUND WORK ======

    /// Start the idle pump at the configured period.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_idle_pump(&self) -> JoinHandle<()> {
        let period = Duration::from_millis(self.config.idle.interval_ms);
        Arc::clone(&self.idle_pump).spawn(period)
    }

    /// Stop a running engine, cancel outstanding file requests and remove the
    /// relay subscription. Idempotent.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        if self.engine.is_engine_running() {
            log::info!("[BridgeHandle] closing engine on shutdown");
            self.engine.set_engine_about_to_close();
            if !self.engine.engine_close() {
                log::warn!(
                    "[BridgeHandle] engine close failed: {}",
                    self.engine.last_error()
                );
            }
        }

        let cancelled = self.pending_files.cancel_all();
        if cancelled > 0 {
            log::info!("[BridgeHandle] cancelled {} pending file requests", cancelled);
        }

        let taken = self
            .subscription
            .lock()
            .ok()
            .and_then(|mut guard| guard.take());
        if let Some(id) = taken {
            self.engine.unsubscribe(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::backend::{EngineLifecycle, PluginApi, PluginDescriptor, PluginType};

    fn bridge() -> (BridgeHandle, Arc<StubEngine>) {
        BridgeHandle::with_stub_engine(BridgeConfig::default())
    }

    #[test]
    fn install_callbacks_is_idempotent() {
        let (bridge, engine) = bridge();
        assert!(bridge.install_callbacks());
        assert!(!bridge.install_callbacks());

        let mut rx = bridge.notifications().subscribe();
        assert!(engine.engine_init("Dummy", "test"));
        // a second subscription would have produced a duplicate line
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn state_follows_engine_through_relay() {
        let (bridge, engine) = bridge();
        bridge.install_callbacks();
        assert_eq!(bridge.engine_state(), EngineState::Stopped);

        assert!(engine.engine_init("Dummy", "test"));
        assert_eq!(bridge.engine_state(), EngineState::Running);

        assert!(engine.engine_close());
        assert_eq!(bridge.engine_state(), EngineState::Stopped);
    }

    #[test]
    fn shutdown_closes_engine_and_unsubscribes() {
        let (bridge, engine) = bridge();
        bridge.install_callbacks();
        assert!(engine.engine_init("Dummy", "test"));
        assert!(engine.add_plugin(&PluginDescriptor {
            plugin_type: PluginType::Lv2,
            filename: None,
            name: Some("Delay".to_string()),
            label: None,
            unique_id: 0,
        }));

        bridge.shutdown();
        assert!(!engine.is_engine_running());
        assert_eq!(bridge.engine_state(), EngineState::Stopped);
        assert!(!bridge.callbacks_installed());

        // relay is detached; further engine activity is not observed
        let before = bridge.relay().stats().events;
        assert!(engine.engine_init("Dummy", "test"));
        assert_eq!(bridge.relay().stats().events, before);

        bridge.shutdown();
    }
}
