#![forbid(unsafe_code)]

//! The reconciliation rules: one pure function from signals to mode.
//!
//! Every mode-affecting decision in the gate goes through [`reconcile`].
//! The rules are an ordered list; each rule short-circuits and later rules
//! never override earlier ones. Keeping the priority explicit in one place
//! (rather than as independent flags updated by separate effects) is what
//! prevents the "admin got kicked to maintenance" class of defect.

use crate::mode::Mode;
use crate::snapshot::SignalSnapshot;

/// Decide the top-level mode for a signal snapshot.
///
/// Deterministic, total over all sixteen combinations, no I/O.
///
/// Rule order:
/// 1. Admin entry point wins over everything, including an active lockout.
///    The admin surface must never be lockable out, or operators could
///    never turn lockout off again.
/// 2. Lockout applies unless the URL is whitelisted or this tab already
///    holds a validated admin credential. The credential exemption covers
///    an operator who navigates off the admin entry point without logging
///    out.
/// 3. Otherwise the normal public application.
#[must_use]
pub fn reconcile(snapshot: SignalSnapshot) -> Mode {
    if snapshot.is_admin_location {
        return Mode::Admin;
    }
    if snapshot.maintenance_active
        && !(snapshot.is_whitelisted_location || snapshot.admin_session_valid)
    {
        return Mode::Maintenance;
    }
    Mode::Normal
}
