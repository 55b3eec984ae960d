#![forbid(unsafe_code)]

//! Recovery from lockout: the one-shot cache-busting reload.
//!
//! While the gate shows the maintenance view, this monitor re-reads the
//! shared flag on every trigger. The instant it observes `false` it
//! performs a full document reload to a cache-busted URL rather than a
//! soft in-memory mode switch: a client that sat idle through an outage
//! of unknown duration must re-fetch current assets, not resume stale
//! cached code. The transition is one-way; repeated `false` observations
//! never issue a second reload.

use std::time::{SystemTime, UNIX_EPOCH};

/// Query parameter announcing the system is back.
pub const RECOVERY_STATUS_KEY: &str = "status";

/// Value of [`RECOVERY_STATUS_KEY`] on the recovery redirect.
pub const RECOVERY_STATUS_VALUE: &str = "active";

/// Cache-defeating query parameter carrying a unique token.
pub const RECOVERY_TOKEN_KEY: &str = "t";

/// Host seam for URL access and full document reloads.
///
/// The gate never touches the address bar directly; the embedding shell
/// implements this against whatever navigation facility it has.
pub trait Navigator: Send + Sync {
    /// The full current href, query and fragment included.
    fn current_url(&self) -> String;

    /// Clear the URL fragment (drops the admin marker on exit).
    fn clear_fragment(&self);

    /// Perform a full document reload to `url`, abandoning this session.
    fn reload(&self, url: &str);
}

/// Build the recovery redirect path for a given token.
///
/// Matches the shape `/?status=active&t=<token>`; the token makes every
/// redirect URL unique so no cache layer can serve the stale app shell.
#[must_use]
pub fn recovery_url(token: u128) -> String {
    format!("/?{RECOVERY_STATUS_KEY}={RECOVERY_STATUS_VALUE}&{RECOVERY_TOKEN_KEY}={token}")
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// Where the monitor is in its one-way lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    /// Lockout is showing; watching for the flag to drop.
    Waiting,
    /// The reload has been issued. Terminal for this session.
    Recovering,
}

/// Two-state recovery machine, created on entry into maintenance.
#[derive(Debug)]
pub struct RecoveryMonitor {
    phase: Phase,
}

impl RecoveryMonitor {
    /// Start waiting for the flag to drop.
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: Phase::Waiting,
        }
    }

    /// Whether the reload has already been issued.
    #[must_use]
    pub fn is_recovering(&self) -> bool {
        self.phase == Phase::Recovering
    }

    /// Feed one observation of the shared flag.
    ///
    /// On the first `false` while waiting, issues the recovery reload and
    /// becomes terminal. Returns `true` only on the trigger that issued
    /// the reload; any number of later `false` observations return `false`
    /// and do nothing.
    pub fn observe(&mut self, maintenance_active: bool, navigator: &dyn Navigator) -> bool {
        match self.phase {
            Phase::Waiting if !maintenance_active => {
                self.phase = Phase::Recovering;
                let url = recovery_url(unix_millis());
                tracing::info!(%url, "lockout lifted, issuing recovery reload");
                navigator.reload(&url);
                true
            }
            _ => false,
        }
    }
}

impl Default for RecoveryMonitor {
    fn default() -> Self {
        Self::new()
    }
}
