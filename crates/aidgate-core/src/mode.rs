#![forbid(unsafe_code)]

//! The top-level view selection.

use std::fmt;

/// Which of the three mutually exclusive top-level views a session sees.
///
/// A `Mode` is derived, never stored: it is recomputed from a fresh
/// [`SignalSnapshot`](crate::SignalSnapshot) on every trigger, and no
/// intermediate or transitional value is ever observable by a view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Mode {
    /// The administrative control surface. Reachable from the admin entry
    /// point even while lockout is active (admin immunity).
    Admin,
    /// The hard maintenance lockout screen.
    Maintenance,
    /// The normal public application.
    Normal,
}

impl Mode {
    /// Whether this mode is the maintenance lockout.
    #[must_use]
    pub fn is_locked_out(self) -> bool {
        matches!(self, Mode::Maintenance)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Admin => "admin",
            Mode::Maintenance => "maintenance",
            Mode::Normal => "normal",
        };
        f.write_str(name)
    }
}
