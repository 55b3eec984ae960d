#![forbid(unsafe_code)]

//! Core: access modes, signal snapshots, and the reconciliation rules.
//!
//! This crate is the pure half of the gate. It knows nothing about stores,
//! timers, or views: it turns a [`SignalSnapshot`] into a [`Mode`] and
//! derives URL markers from an href. All I/O and event wiring live in
//! `aidgate-runtime`.

pub mod location;
pub mod mode;
pub mod reconcile;
pub mod snapshot;

pub use location::LocationState;
pub use mode::Mode;
pub use reconcile::reconcile;
pub use snapshot::{AccessState, SignalSnapshot};
