//! Periodic, non-blocking idle pump.
//!
//! Each tick gives a running engine one chance to advance pending work. The
//! pump only reads the shared [`EngineStateCell`]; state changes arrive
//! through the callback relay.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::engine::backend::HostEngine;
use crate::engine::state::EngineStateCell;

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleTick {
    /// Engine stopped; no engine call was made.
    Stopped,
    /// `engine_idle` was called once.
    Advanced,
    /// A previous tick was still in flight.
    Busy,
}

/// Counters reported on the health endpoint.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct IdleStats {
    pub advanced: u64,
    pub skipped_stopped: u64,
    pub skipped_busy: u64,
}

/// Clears the in-flight flag when a tick ends, including by unwinding.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct IdlePump {
    engine: Arc<dyn HostEngine>,
    state: Arc<EngineStateCell>,
    in_flight: AtomicBool,
    advanced: AtomicU64,
    skipped_stopped: AtomicU64,
    skipped_busy: AtomicU64,
}

impl IdlePump {
    pub fn new(engine: Arc<dyn HostEngine>, state: Arc<EngineStateCell>) -> Self {
        Self {
            engine,
            state,
            in_flight: AtomicBool::new(false),
            advanced: AtomicU64::new(0),
            skipped_stopped: AtomicU64::new(0),
            skipped_busy: AtomicU64::new(0),
        }
    }

    /// Run one tick. Overlapping calls are skipped, never queued.
    pub fn tick(&self) -> IdleTick {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.skipped_busy.fetch_add(1, Ordering::Relaxed);
            return IdleTick::Busy;
        }
        let _in_flight = InFlight(&self.in_flight);

        if self.state.is_running() {
            self.engine.engine_idle();
            self.advanced.fetch_add(1, Ordering::Relaxed);
            IdleTick::Advanced
        } else {
            self.skipped_stopped.fetch_add(1, Ordering::Relaxed);
            IdleTick::Stopped
        }
    }

    pub fn stats(&self) -> IdleStats {
        IdleStats {
            advanced: self.advanced.load(Ordering::Relaxed),
            skipped_stopped: self.skipped_stopped.load(Ordering::Relaxed),
            skipped_busy: self.skipped_busy.load(Ordering::Relaxed),
        }
    }

    /// Drive the pump on a fixed period from the current tokio runtime.
    ///
    /// Missed deadlines are skipped, so a slow tick never causes a burst.
    pub fn spawn(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        let period = period.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            log::info!("[IdlePump] started with period {:?}", period);
            loop {
                interval.tick().await;
                let pump = Arc::clone(&self);
                // engine_idle is non-blocking but still engine code; keep it
                // off the async workers
                match tokio::task::spawn_blocking(move || pump.tick()).await {
                    Ok(IdleTick::Busy) => log::trace!("[IdlePump] tick skipped, previous in flight"),
                    Ok(_) => {}
                    Err(err) => log::error!("[IdlePump] tick aborted: {}", err),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::backend::{
        EngineLifecycle, ParameterApi, PluginApi, PluginDescriptor, PluginType, StubEngine,
    };
    use crate::engine::events::{EngineCallbackOpcode, EngineEvent, EngineEventSink};
    use crate::engine::state::EngineState;

    fn pump() -> (Arc<StubEngine>, Arc<EngineStateCell>, IdlePump) {
        let engine = Arc::new(StubEngine::default());
        let state = Arc::new(EngineStateCell::new());
        let pump = IdlePump::new(engine.clone(), state.clone());
        (engine, state, pump)
    }

    #[test]
    fn stopped_engine_receives_no_idle_calls() {
        let (engine, _state, pump) = pump();
        for _ in 0..100 {
            assert_eq!(pump.tick(), IdleTick::Stopped);
        }
        assert_eq!(engine.idle_calls(), 0);
        assert_eq!(pump.stats().skipped_stopped, 100);
    }

    #[test]
    fn running_engine_gets_one_idle_per_tick() {
        let (engine, state, pump) = pump();
        state.transition(EngineState::Running);
        for _ in 0..5 {
            assert_eq!(pump.tick(), IdleTick::Advanced);
        }
        assert_eq!(engine.idle_calls(), 5);
        assert_eq!(pump.stats().advanced, 5);
    }

    #[test]
    fn pump_never_writes_state() {
        let (engine, state, pump) = pump();
        assert!(engine.engine_init("Dummy", "test"));
        // no relay installed, so the cell still reads stopped
        pump.tick();
        assert_eq!(state.get(), EngineState::Stopped);
        assert_eq!(engine.idle_calls(), 0);
    }

    #[test]
    fn overlapping_tick_is_skipped() {
        let (engine, state, pump) = pump();
        state.transition(EngineState::Running);

        // simulate a tick still running on another thread
        pump.in_flight.store(true, Ordering::SeqCst);
        assert_eq!(pump.tick(), IdleTick::Busy);
        assert_eq!(engine.idle_calls(), 0);

        pump.in_flight.store(false, Ordering::SeqCst);
        assert_eq!(pump.tick(), IdleTick::Advanced);

        let stats = pump.stats();
        assert_eq!(stats.advanced, 1);
        assert_eq!(stats.skipped_busy, 1);
    }

    #[test]
    fn panicking_tick_releases_the_pump() {
        struct FailingSink;
        impl EngineEventSink for FailingSink {
            fn on_event(&self, event: &EngineEvent) {
                if event.opcode == EngineCallbackOpcode::ParameterValueChanged {
                    panic!("sink rejected parameter change");
                }
            }
        }

        let (engine, state, pump) = pump();
        engine.subscribe(Arc::new(FailingSink));
        assert!(engine.engine_init("Dummy", "test"));
        assert!(engine.add_plugin(&PluginDescriptor {
            plugin_type: PluginType::Lv2,
            filename: None,
            name: Some("Gain".to_string()),
            label: None,
            unique_id: 0,
        }));
        state.transition(EngineState::Running);

        engine.randomize_parameters(0);
        let first = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| pump.tick()));
        assert!(first.is_err());

        for _ in 0..3 {
            assert_eq!(pump.tick(), IdleTick::Advanced);
        }
        assert_eq!(engine.idle_calls(), 4);
        assert_eq!(pump.stats().skipped_busy, 0);
    }

    #[test]
    fn concurrent_ticks_never_overlap() {
        use std::thread;

        let (engine, state, pump) = pump();
        state.transition(EngineState::Running);
        let pump = Arc::new(pump);

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let pump = Arc::clone(&pump);
                thread::spawn(move || {
                    for _ in 0..250 {
                        pump.tick();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let stats = pump.stats();
        assert_eq!(stats.advanced + stats.skipped_busy, 1000);
        assert_eq!(engine.idle_calls(), stats.advanced);
    }

    #[tokio::test]
    async fn spawned_pump_ticks_on_interval() {
        let (engine, state, pump) = pump();
        state.transition(EngineState::Running);
        let handle = Arc::new(pump).spawn(Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.abort();
        assert!(engine.idle_calls() >= 2);
    }
}
