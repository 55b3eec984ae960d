#![forbid(unsafe_code)]

//! The access gate driver: one loop, one entry point, one decision.
//!
//! Every trigger, whatever its source, flows through [`AccessGate::apply`]:
//! capture a fresh snapshot (URL markers first, synchronously, then the
//! shared flag, then the session credential), reconcile it, and route.
//! The snapshot is read exactly once per cycle and passed by value, so a
//! single decision can never observe two different values for the same
//! signal.

use std::sync::Arc;
use std::time::Duration;

use aidgate_core::{AccessState, LocationState, Mode, SignalSnapshot};

use crate::bus::{
    Heartbeat, SignalSource, SourceId, SourceRegistry, StoreWatch, Trigger, TriggerHandle,
};
use crate::recovery::{Navigator, RecoveryMonitor};
use crate::router::{ExitToNormal, ModeRouter, Page, Views};
use crate::session::SessionHandle;
use crate::store::{SignalStore, MAINTENANCE_FLAG_KEY};

/// Tunables for the gate's trigger sources.
#[derive(Clone, Debug)]
pub struct GateConfig {
    /// Fallback tick period. One heartbeat bounds the staleness window.
    pub heartbeat_period: Duration,
    /// Sampling period of the shared-flag watcher.
    pub store_watch_period: Duration,
    /// Key of the shared maintenance flag.
    pub maintenance_key: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            heartbeat_period: Duration::from_secs(1),
            store_watch_period: Duration::from_millis(250),
            maintenance_key: MAINTENANCE_FLAG_KEY.to_string(),
        }
    }
}

/// Per-tab access gate: signals in, exactly one view out.
pub struct AccessGate {
    navigator: Arc<dyn Navigator>,
    store: Arc<dyn SignalStore>,
    session: SessionHandle,
    registry: SourceRegistry,
    router: ModeRouter,
    recovery: Option<RecoveryMonitor>,
    state: AccessState,
    config: GateConfig,
    stopped: bool,
}

impl AccessGate {
    /// Create the gate and perform the startup reconciliation.
    ///
    /// The first decision happens here, synchronously, before any trigger
    /// source is wired and before the caller can render anything: the URL
    /// markers are already in the first snapshot, so the first mounted
    /// view is the correct one (no flash of wrong content).
    #[must_use]
    pub fn new(
        navigator: Arc<dyn Navigator>,
        store: Arc<dyn SignalStore>,
        views: Views,
        config: GateConfig,
    ) -> Self {
        let mut gate = Self {
            navigator,
            store,
            session: SessionHandle::new(),
            registry: SourceRegistry::new(),
            router: ModeRouter::new(views),
            recovery: None,
            state: AccessState::derive(SignalSnapshot::default()),
            config,
            stopped: false,
        };
        gate.apply(Trigger::Startup);
        gate
    }

    /// Wire the built-in trigger sources (heartbeat, store watcher).
    ///
    /// Separate from [`AccessGate::new`] so deterministic tests can drive
    /// the gate with injected triggers only. Host-level sources
    /// (navigation, visibility, history restore) are injected through
    /// [`AccessGate::handle`].
    pub fn wire_default_sources(&mut self) {
        self.registry
            .wire(Box::new(Heartbeat::new(self.config.heartbeat_period)));
        self.registry.wire(Box::new(StoreWatch::new(
            self.store.clone(),
            self.config.maintenance_key.clone(),
            self.config.store_watch_period,
        )));
    }

    /// Wire an additional trigger source.
    pub fn wire_source(&mut self, source: Box<dyn SignalSource>) -> SourceId {
        self.registry.wire(source)
    }

    /// Tear down one trigger source; every other source keeps running.
    pub fn teardown_source(&mut self, id: SourceId) {
        self.registry.teardown(id);
    }

    /// Handle for injecting host-observed triggers.
    #[must_use]
    pub fn handle(&self) -> TriggerHandle {
        self.registry.handle()
    }

    /// The tab's admin session credential.
    #[must_use]
    pub fn session(&self) -> SessionHandle {
        self.session.clone()
    }

    /// The current mode.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.state.mode
    }

    /// The current mode plus the snapshot that produced it.
    #[must_use]
    pub fn state(&self) -> &AccessState {
        &self.state
    }

    /// Sub-navigation within the normal app.
    #[must_use]
    pub fn page(&self) -> Page {
        self.router.page()
    }

    /// Select a page within the normal app.
    pub fn show(&mut self, page: Page) {
        self.router.show(page);
    }

    /// The manual refresh affordance on the maintenance view.
    ///
    /// Reloads the current URL immediately, for visitors who prefer not
    /// to wait for automatic recovery. Does not consume the recovery
    /// monitor's one-shot: the cache-busted redirect stays reserved for
    /// the flag-drop transition.
    pub fn manual_refresh(&self) {
        let url = self.navigator.current_url();
        tracing::info!(%url, "manual refresh requested");
        self.navigator.reload(&url);
    }

    fn exit_to_normal(&self) -> ExitToNormal {
        ExitToNormal::new(self.navigator.clone(), self.registry.handle())
    }

    /// Capture all four signals atomically, URL markers first.
    fn capture_snapshot(&self) -> SignalSnapshot {
        let location = LocationState::parse(&self.navigator.current_url());
        let maintenance_active = self
            .store
            .read_flag_or_default(&self.config.maintenance_key);
        SignalSnapshot::capture(location, maintenance_active, self.session.is_valid())
    }

    /// The single reconciliation entry point.
    ///
    /// All trigger kinds take the same path; there is no per-trigger
    /// special-casing of the mode decision. [`Trigger::Unload`] is the
    /// one exception: it tears the gate down instead of reconciling.
    pub fn apply(&mut self, trigger: Trigger) {
        if self.stopped {
            return;
        }
        if trigger == Trigger::Unload {
            self.shutdown();
            return;
        }

        let snapshot = self.capture_snapshot();

        // Recovery side path, active only while the lockout view shows.
        if self.router.current() == Some(Mode::Maintenance) {
            if let Some(monitor) = self.recovery.as_mut() {
                if monitor.observe(snapshot.maintenance_active, self.navigator.as_ref()) {
                    // Hard reload issued; no soft switch out of lockout.
                    return;
                }
                if monitor.is_recovering() {
                    return;
                }
            }
        }

        let next = AccessState::derive(snapshot);
        if Some(next.mode) != self.router.current() {
            tracing::info!(?trigger, from = ?self.router.current(), to = %next.mode, "mode transition");
            let exit = self.exit_to_normal();
            self.router.route(next.mode, &exit);
            self.recovery = match next.mode {
                Mode::Maintenance => Some(RecoveryMonitor::new()),
                Mode::Admin | Mode::Normal => None,
            };
        }
        self.state = next;
    }

    /// Drain and apply every pending trigger, in arrival order.
    ///
    /// Returns the number of triggers handled. Non-blocking; the test
    /// and embedded-host driving surface.
    pub fn pump(&mut self) -> usize {
        let triggers = self.registry.drain();
        let count = triggers.len();
        for trigger in triggers {
            self.apply(trigger);
        }
        count
    }

    /// Block on the trigger channel until [`Trigger::Unload`] arrives.
    pub fn run(&mut self) {
        loop {
            let trigger = self.registry.recv();
            let unload = trigger == Trigger::Unload;
            self.apply(trigger);
            if unload {
                break;
            }
        }
    }

    /// Tear down every trigger source and unmount the current view.
    ///
    /// A dangling listener writing mode state after the view that would
    /// render it is gone is a bug, not a recoverable condition: once the
    /// gate is down it ignores every later trigger.
    pub fn shutdown(&mut self) {
        tracing::debug!("gate shutting down");
        self.stopped = true;
        self.registry.teardown_all();
        self.router.teardown();
        self.session.clear();
    }
}
