#![forbid(unsafe_code)]

//! Runtime: the event-driven half of the Allowance Aid access gate.
//!
//! Wires the pure decision core (`aidgate-core`) to the world: a shared
//! flag store, a per-tab session credential, the signal bus that produces
//! re-evaluation triggers, the mode router that mounts exactly one view,
//! and the recovery monitor that hard-reloads when lockout lifts.

pub mod bus;
pub mod gate;
pub mod recovery;
pub mod router;
pub mod session;
pub mod store;

pub use bus::{
    Heartbeat, SignalSource, SourceId, SourceRegistry, StopSignal, StoreWatch, Trigger,
    TriggerHandle,
};
pub use gate::{AccessGate, GateConfig};
pub use recovery::{Navigator, RecoveryMonitor};
pub use router::{ExitToNormal, GateView, ModeRouter, Page, Views};
pub use session::SessionHandle;
pub use store::{FileStore, MemoryStore, SignalStore, StoreError, StoreResult, MAINTENANCE_FLAG_KEY};
