#![forbid(unsafe_code)]

//! Atomic signal snapshots and the per-tab access state.

use crate::location::LocationState;
use crate::mode::Mode;
use crate::reconcile::reconcile;

/// All four access signals, captured atomically at reconciliation time.
///
/// A snapshot is read exactly once per reconciliation cycle and passed by
/// value; the decision never re-reads a signal mid-computation, so a single
/// decision can never observe two different values for the same flag.
///
/// The URL-derived fields come from [`LocationState`] and are available
/// synchronously, before any store read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SignalSnapshot {
    /// The URL marks this request as the admin entry point.
    pub is_admin_location: bool,
    /// The URL marks this request as exempt from lockout.
    pub is_whitelisted_location: bool,
    /// The shared flag: a system-wide lockout has been requested.
    pub maintenance_active: bool,
    /// This tab holds a validated admin credential.
    pub admin_session_valid: bool,
}

impl SignalSnapshot {
    /// Assemble a snapshot from the three signal sources.
    #[must_use]
    pub fn capture(
        location: LocationState,
        maintenance_active: bool,
        admin_session_valid: bool,
    ) -> Self {
        Self {
            is_admin_location: location.is_admin,
            is_whitelisted_location: location.is_whitelisted,
            maintenance_active,
            admin_session_valid,
        }
    }
}

/// The last computed [`Mode`] together with the snapshot it came from.
///
/// Created at startup, replaced wholesale on every trigger, discarded on
/// unload. Never partially mutated: a fresh value is always produced by
/// the reconciler from a new snapshot, which rules out torn-state bugs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccessState {
    /// The mode currently shown.
    pub mode: Mode,
    /// The snapshot that produced it.
    pub snapshot: SignalSnapshot,
}

impl AccessState {
    /// Reconcile a snapshot into a fresh access state.
    #[must_use]
    pub fn derive(snapshot: SignalSnapshot) -> Self {
        Self {
            mode: reconcile(snapshot),
            snapshot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_copies_location_markers() {
        let location = LocationState {
            is_admin: true,
            is_whitelisted: false,
        };
        let snapshot = SignalSnapshot::capture(location, true, false);
        assert!(snapshot.is_admin_location);
        assert!(!snapshot.is_whitelisted_location);
        assert!(snapshot.maintenance_active);
        assert!(!snapshot.admin_session_valid);
    }

    #[test]
    fn derive_pairs_mode_with_its_snapshot() {
        let snapshot = SignalSnapshot {
            maintenance_active: true,
            ..SignalSnapshot::default()
        };
        let state = AccessState::derive(snapshot);
        assert_eq!(state.mode, Mode::Maintenance);
        assert_eq!(state.snapshot, snapshot);
    }

    #[test]
    fn derive_is_whole_value_replacement() {
        let first = AccessState::derive(SignalSnapshot::default());
        let second = AccessState::derive(SignalSnapshot {
            is_admin_location: true,
            ..SignalSnapshot::default()
        });
        assert_eq!(first.mode, Mode::Normal);
        assert_eq!(second.mode, Mode::Admin);
        assert_ne!(first, second);
    }
}
