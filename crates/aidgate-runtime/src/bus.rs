#![forbid(unsafe_code)]

//! Signal bus: every source of re-evaluation triggers.
//!
//! The bus is the only thing that causes the gate to re-decide its mode.
//! Each trigger source is wired independently and torn down independently;
//! all of them funnel into one mpsc channel, and every message is handled
//! by the same reconciliation entry point. There is no per-trigger
//! special-casing of the mode decision.
//!
//! # How it works
//!
//! 1. Built-in sources ([`Heartbeat`], [`StoreWatch`]) run on background
//!    threads and send [`Trigger`]s through the channel.
//! 2. Host-observed events (navigation, visibility, history restore) are
//!    injected through a cloneable [`TriggerHandle`].
//! 3. The gate drains the channel on its single loop, strictly in arrival
//!    order.
//!
//! A source that cannot be wired (missing platform facility) is simply
//! absent; the heartbeat fallback still guarantees eventual correctness.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::store::SignalStore;

/// A reconciliation trigger delivered by the bus.
///
/// Triggers carry no payload: the gate re-reads every signal fresh when it
/// handles one, so a stale or duplicated trigger is harmless.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// First evaluation, exactly once, before the first render.
    Startup,
    /// The URL's admin/whitelist markers may have changed.
    Navigation,
    /// The shared flag changed in another tab or process.
    StoreChanged,
    /// The page regained foreground visibility.
    VisibilityRegained,
    /// The page was restored from the back/forward history cache.
    HistoryRestore,
    /// Fixed-period fallback tick.
    Heartbeat,
    /// The tab is going away; tear everything down.
    Unload,
}

/// A unique identifier for a wired trigger source.
pub type SourceId = u64;

/// A trigger source that runs until torn down.
///
/// Sources run on background threads and send triggers through the
/// provided channel. The registry manages their lifecycle.
pub trait SignalSource: Send {
    /// Unique identifier, used for targeted teardown and deduplication.
    fn id(&self) -> SourceId;

    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Run the source, sending triggers until the channel is disconnected
    /// or the stop signal is raised.
    fn run(&self, sender: mpsc::Sender<Trigger>, stop: StopSignal);
}

// ─────────────────────────────────────────────────────────────────────────────
// Stop signalling
// ─────────────────────────────────────────────────────────────────────────────

/// Signal for stopping a source.
///
/// The registry raises it on teardown; the source checks it between waits
/// and exits its run loop when set.
#[derive(Clone)]
pub struct StopSignal {
    inner: Arc<(std::sync::Mutex<bool>, std::sync::Condvar)>,
}

impl StopSignal {
    fn new() -> (Self, StopTrigger) {
        let inner = Arc::new((std::sync::Mutex::new(false), std::sync::Condvar::new()));
        let signal = Self {
            inner: inner.clone(),
        };
        (signal, StopTrigger { inner })
    }

    /// Check whether teardown has been requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap()
    }

    /// Wait for either teardown or a timeout.
    ///
    /// Returns `true` if stopped, `false` if the timeout elapsed. Blocks
    /// efficiently on a condition variable; loops to absorb spurious
    /// wakeups.
    pub fn wait_timeout(&self, duration: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let mut stopped = lock.lock().unwrap();
        if *stopped {
            return true;
        }

        let start = std::time::Instant::now();
        let mut remaining = duration;

        loop {
            let (guard, result) = cvar.wait_timeout(stopped, remaining).unwrap();
            stopped = guard;
            if *stopped {
                return true;
            }
            if result.timed_out() {
                return false;
            }
            let elapsed = start.elapsed();
            if elapsed >= duration {
                return false;
            }
            remaining = duration - elapsed;
        }
    }
}

/// Registry-side handle that raises the stop signal.
struct StopTrigger {
    inner: Arc<(std::sync::Mutex<bool>, std::sync::Condvar)>,
}

impl StopTrigger {
    fn stop(&self) {
        let (lock, cvar) = &*self.inner;
        let mut stopped = lock.lock().unwrap();
        *stopped = true;
        cvar.notify_all();
    }
}

/// A wired, running source.
struct WiredSource {
    id: SourceId,
    trigger: StopTrigger,
    thread: Option<thread::JoinHandle<()>>,
}

impl WiredSource {
    fn stop(mut self) {
        self.trigger.stop();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for WiredSource {
    fn drop(&mut self) {
        self.trigger.stop();
        // No join in drop to avoid blocking.
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Trigger handle (host-injected events)
// ─────────────────────────────────────────────────────────────────────────────

/// Cloneable handle for injecting triggers from the host.
///
/// The host's navigation, visibility, and history hooks call
/// [`TriggerHandle::notify`]; the gate handles them on its own loop.
#[derive(Clone)]
pub struct TriggerHandle {
    sender: mpsc::Sender<Trigger>,
}

impl TriggerHandle {
    /// Deliver a trigger. Returns `false` if the gate is gone.
    pub fn notify(&self, trigger: Trigger) -> bool {
        self.sender.send(trigger).is_ok()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Source registry
// ─────────────────────────────────────────────────────────────────────────────

/// Owns the trigger channel and the lifecycle of every wired source.
pub struct SourceRegistry {
    wired: Vec<WiredSource>,
    sender: mpsc::Sender<Trigger>,
    receiver: mpsc::Receiver<Trigger>,
}

impl SourceRegistry {
    /// Create an empty registry with a fresh trigger channel.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            wired: Vec::new(),
            sender,
            receiver,
        }
    }

    /// A handle for host-injected triggers.
    #[must_use]
    pub fn handle(&self) -> TriggerHandle {
        TriggerHandle {
            sender: self.sender.clone(),
        }
    }

    /// Wire a source, starting its background thread.
    ///
    /// A source whose id is already wired is ignored (deduplication); the
    /// existing source keeps running.
    pub fn wire(&mut self, source: Box<dyn SignalSource>) -> SourceId {
        let id = source.id();
        if self.wired.iter().any(|w| w.id == id) {
            tracing::debug!(source = source.name(), id, "source already wired, skipping");
            return id;
        }
        tracing::debug!(source = source.name(), id, "wiring trigger source");
        let (signal, trigger) = StopSignal::new();
        let sender = self.sender.clone();
        let thread = thread::spawn(move || {
            source.run(sender, signal);
        });
        self.wired.push(WiredSource {
            id,
            trigger,
            thread: Some(thread),
        });
        id
    }

    /// Tear down one source by id. Other sources are untouched.
    pub fn teardown(&mut self, id: SourceId) {
        if let Some(index) = self.wired.iter().position(|w| w.id == id) {
            tracing::debug!(id, "tearing down trigger source");
            self.wired.swap_remove(index).stop();
        }
    }

    /// Tear down every source (unload path).
    pub fn teardown_all(&mut self) {
        for wired in self.wired.drain(..) {
            wired.stop();
        }
    }

    /// Number of currently wired sources.
    #[must_use]
    pub fn wired_count(&self) -> usize {
        self.wired.len()
    }

    /// Drain all pending triggers without blocking, in arrival order.
    pub fn drain(&self) -> Vec<Trigger> {
        let mut triggers = Vec::new();
        while let Ok(trigger) = self.receiver.try_recv() {
            triggers.push(trigger);
        }
        triggers
    }

    /// Block until the next trigger arrives.
    ///
    /// Never disconnects while the registry is alive (it keeps its own
    /// sender), so the gate's exit path is an explicit [`Trigger::Unload`].
    pub fn recv(&self) -> Trigger {
        self.receiver
            .recv()
            .expect("registry holds a sender; channel cannot disconnect")
    }

    /// Block for at most `timeout` waiting for the next trigger.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Trigger> {
        self.receiver.recv_timeout(timeout).ok()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SourceRegistry {
    fn drop(&mut self) {
        self.teardown_all();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Built-in sources
// ─────────────────────────────────────────────────────────────────────────────

/// Stable id of the heartbeat source.
fn heartbeat_id(period: Duration) -> SourceId {
    period.as_nanos() as u64 ^ 0x4245_4154 // "BEAT"
}

/// Stable id of the store watcher source.
pub const STORE_WATCH_SOURCE: SourceId = 0x5354_4F52; // "STOR"

/// Fixed-period fallback trigger.
///
/// Guarantees eventual convergence even if every push-style notification
/// is missed: within one period of a flag change, some heartbeat tick
/// re-reads it.
pub struct Heartbeat {
    id: SourceId,
    period: Duration,
}

impl Heartbeat {
    /// Create a heartbeat with the given period.
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self {
            id: heartbeat_id(period),
            period,
        }
    }
}

impl SignalSource for Heartbeat {
    fn id(&self) -> SourceId {
        self.id
    }

    fn name(&self) -> &str {
        "Heartbeat"
    }

    fn run(&self, sender: mpsc::Sender<Trigger>, stop: StopSignal) {
        loop {
            if stop.wait_timeout(self.period) {
                break;
            }
            if sender.send(Trigger::Heartbeat).is_err() {
                break;
            }
        }
    }
}

/// Watches the shared store for flag changes made elsewhere.
///
/// The cross-tab `storage` event analog: polls the flag and emits
/// [`Trigger::StoreChanged`] only on an observed value change, so a quiet
/// store produces no trigger traffic beyond the heartbeat.
pub struct StoreWatch {
    store: Arc<dyn SignalStore>,
    key: String,
    period: Duration,
}

impl StoreWatch {
    /// Watch `key` on `store`, sampling at `period`.
    #[must_use]
    pub fn new(store: Arc<dyn SignalStore>, key: impl Into<String>, period: Duration) -> Self {
        Self {
            store,
            key: key.into(),
            period,
        }
    }
}

impl SignalSource for StoreWatch {
    fn id(&self) -> SourceId {
        STORE_WATCH_SOURCE
    }

    fn name(&self) -> &str {
        "StoreWatch"
    }

    fn run(&self, sender: mpsc::Sender<Trigger>, stop: StopSignal) {
        // Failed reads degrade to false here exactly as they do in the
        // snapshot path, so watcher and reconciler always agree.
        let mut last = self.store.read_flag_or_default(&self.key);
        loop {
            if stop.wait_timeout(self.period) {
                break;
            }
            let current = self.store.read_flag_or_default(&self.key);
            if current != last {
                last = current;
                tracing::debug!(key = %self.key, value = current, "shared flag changed");
                if sender.send(Trigger::StoreChanged).is_err() {
                    break;
                }
            }
        }
    }
}

/// A scripted source for tests: sends its triggers immediately, then stops.
pub struct MockSource {
    id: SourceId,
    triggers: Vec<Trigger>,
}

impl MockSource {
    /// Create a mock source that sends the given triggers.
    #[must_use]
    pub fn new(id: SourceId, triggers: Vec<Trigger>) -> Self {
        Self { id, triggers }
    }
}

impl SignalSource for MockSource {
    fn id(&self) -> SourceId {
        self.id
    }

    fn name(&self) -> &str {
        "MockSource"
    }

    fn run(&self, sender: mpsc::Sender<Trigger>, _stop: StopSignal) {
        for trigger in &self.triggers {
            if sender.send(*trigger).is_err() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, MAINTENANCE_FLAG_KEY};

    #[test]
    fn stop_signal_starts_unraised() {
        let (signal, _trigger) = StopSignal::new();
        assert!(!signal.is_stopped());
    }

    #[test]
    fn stop_signal_raised_after_trigger() {
        let (signal, trigger) = StopSignal::new();
        trigger.stop();
        assert!(signal.is_stopped());
        assert!(signal.wait_timeout(Duration::from_millis(100)));
    }

    #[test]
    fn stop_signal_wait_times_out() {
        let (signal, _trigger) = StopSignal::new();
        assert!(!signal.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn stop_signal_wait_is_interrupted_by_teardown() {
        let (signal, trigger) = StopSignal::new();
        let waiter = signal.clone();
        let handle = thread::spawn(move || waiter.wait_timeout(Duration::from_secs(10)));
        thread::sleep(Duration::from_millis(20));
        trigger.stop();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn handle_delivers_triggers_in_order() {
        let registry = SourceRegistry::new();
        let handle = registry.handle();
        assert!(handle.notify(Trigger::Navigation));
        assert!(handle.notify(Trigger::VisibilityRegained));
        assert_eq!(
            registry.drain(),
            vec![Trigger::Navigation, Trigger::VisibilityRegained]
        );
    }

    #[test]
    fn wire_dedupes_by_id() {
        let mut registry = SourceRegistry::new();
        registry.wire(Box::new(MockSource::new(7, vec![Trigger::Heartbeat])));
        registry.wire(Box::new(MockSource::new(7, vec![Trigger::Navigation])));
        assert_eq!(registry.wired_count(), 1);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(registry.drain(), vec![Trigger::Heartbeat]);
    }

    #[test]
    fn teardown_stops_only_the_named_source() {
        let mut registry = SourceRegistry::new();
        let hb = registry.wire(Box::new(Heartbeat::new(Duration::from_millis(5))));
        let other = registry.wire(Box::new(Heartbeat::new(Duration::from_millis(7))));
        assert_eq!(registry.wired_count(), 2);

        registry.teardown(hb);
        assert_eq!(registry.wired_count(), 1);

        registry.teardown(other);
        assert_eq!(registry.wired_count(), 0);
    }

    #[test]
    fn teardown_all_stops_everything() {
        let mut registry = SourceRegistry::new();
        registry.wire(Box::new(Heartbeat::new(Duration::from_millis(5))));
        registry.wire(Box::new(StoreWatch::new(
            Arc::new(MemoryStore::new()),
            MAINTENANCE_FLAG_KEY,
            Duration::from_millis(5),
        )));
        registry.teardown_all();
        assert_eq!(registry.wired_count(), 0);

        // No further triggers after teardown (drain the in-flight window first).
        let _ = registry.drain();
        thread::sleep(Duration::from_millis(30));
        assert!(registry.drain().is_empty());
    }

    #[test]
    fn heartbeat_ticks_at_its_period() {
        let mut registry = SourceRegistry::new();
        registry.wire(Box::new(Heartbeat::new(Duration::from_millis(10))));
        thread::sleep(Duration::from_millis(55));
        let ticks = registry.drain();
        assert!(!ticks.is_empty(), "expected at least one tick");
        assert!(ticks.iter().all(|t| *t == Trigger::Heartbeat));
    }

    #[test]
    fn heartbeat_id_is_stable_per_period() {
        assert_eq!(
            Heartbeat::new(Duration::from_secs(1)).id(),
            Heartbeat::new(Duration::from_secs(1)).id()
        );
        assert_ne!(
            Heartbeat::new(Duration::from_secs(1)).id(),
            Heartbeat::new(Duration::from_secs(2)).id()
        );
    }

    #[test]
    fn store_watch_fires_only_on_change() {
        let store = Arc::new(MemoryStore::new());
        let mut registry = SourceRegistry::new();
        registry.wire(Box::new(StoreWatch::new(
            store.clone(),
            MAINTENANCE_FLAG_KEY,
            Duration::from_millis(5),
        )));

        // Quiet store: no triggers.
        thread::sleep(Duration::from_millis(30));
        assert!(registry.drain().is_empty());

        // Flip the flag from "another tab".
        store.write_flag(MAINTENANCE_FLAG_KEY, true).unwrap();
        thread::sleep(Duration::from_millis(30));
        let triggers = registry.drain();
        assert_eq!(triggers, vec![Trigger::StoreChanged]);

        // Stable value again: no repeat triggers.
        thread::sleep(Duration::from_millis(30));
        assert!(registry.drain().is_empty());
    }

    #[test]
    fn store_watch_reports_flip_back() {
        let store = Arc::new(MemoryStore::new());
        let mut registry = SourceRegistry::new();
        registry.wire(Box::new(StoreWatch::new(
            store.clone(),
            MAINTENANCE_FLAG_KEY,
            Duration::from_millis(5),
        )));

        store.write_flag(MAINTENANCE_FLAG_KEY, true).unwrap();
        thread::sleep(Duration::from_millis(30));
        store.write_flag(MAINTENANCE_FLAG_KEY, false).unwrap();
        thread::sleep(Duration::from_millis(30));

        let triggers = registry.drain();
        assert_eq!(
            triggers,
            vec![Trigger::StoreChanged, Trigger::StoreChanged]
        );
    }

    #[test]
    fn registry_drop_stops_sources() {
        let store = Arc::new(MemoryStore::new());
        {
            let mut registry = SourceRegistry::new();
            registry.wire(Box::new(StoreWatch::new(
                store.clone(),
                MAINTENANCE_FLAG_KEY,
                Duration::from_millis(5),
            )));
            thread::sleep(Duration::from_millis(20));
            // Registry drops here; its watcher must stop.
        }
        // The only remaining Arc owner is this test.
        thread::sleep(Duration::from_millis(30));
        assert_eq!(Arc::strong_count(&store), 1);
    }
}
