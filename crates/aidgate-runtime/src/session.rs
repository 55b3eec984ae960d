#![forbid(unsafe_code)]

//! Per-tab admin session credential.
//!
//! The `sessionStorage` analog: one validated-credential bit, scoped to
//! this tab, set by the out-of-scope login form after password
//! verification and cleared on logout. It is never written to the shared
//! store, so a login in one tab does not unlock another.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Well-known key of the per-tab admin credential.
pub const ADMIN_SESSION_KEY: &str = "adminAuth";

/// Cloneable handle to the tab's admin credential.
///
/// Reads are synchronous and lock-free; the gate samples this once per
/// reconciliation cycle when capturing a snapshot.
#[derive(Clone, Default)]
pub struct SessionHandle {
    valid: Arc<AtomicBool>,
}

impl SessionHandle {
    /// Create a handle with no validated credential.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this tab holds a validated admin credential.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Mark the credential validated (called by the login collaborator).
    pub fn validate(&self) {
        self.valid.store(true, Ordering::Release);
        tracing::info!(key = ADMIN_SESSION_KEY, "admin session validated");
    }

    /// Clear the credential (logout, or tab teardown).
    pub fn clear(&self) {
        self.valid.store(false, Ordering::Release);
        tracing::info!(key = ADMIN_SESSION_KEY, "admin session cleared");
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("valid", &self.is_valid())
            .finish()
    }
}
