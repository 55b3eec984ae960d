#![forbid(unsafe_code)]

//! URL-derived access markers.
//!
//! The admin and whitelist markers are computed from the current URL alone,
//! synchronously, before any store read. This ordering is what guarantees
//! the very first render cannot briefly show the wrong view.

use url::Url;

/// Fragment token that marks a request as the administrative entry point.
///
/// Matched as a substring of the fragment so that "dirty" URLs such as
/// `/?fbclid=...#/secure-admin-login` still resolve to the admin surface.
pub const ADMIN_FRAGMENT_MARKER: &str = "secure-admin-login";

/// Query parameter that marks a request as exempt from lockout.
pub const WHITELIST_QUERY_KEY: &str = "bypass";

/// Value required for [`WHITELIST_QUERY_KEY`] to take effect.
pub const WHITELIST_QUERY_VALUE: &str = "1";

/// Read-only view of the access markers carried by the current URL.
///
/// Both fields are independent of the shared store and the session
/// credential; they answer only "what does the URL itself claim".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct LocationState {
    /// The URL marks this request as the admin entry point.
    pub is_admin: bool,
    /// The URL marks this request as exempt from lockout.
    ///
    /// A superset notion distinct from `is_admin`: both exempt from
    /// lockout, but only the admin marker selects the admin surface.
    pub is_whitelisted: bool,
}

impl LocationState {
    /// Derive the markers from an already-parsed URL.
    #[must_use]
    pub fn from_url(url: &Url) -> Self {
        let is_admin = url
            .fragment()
            .is_some_and(|fragment| fragment.contains(ADMIN_FRAGMENT_MARKER));
        let is_whitelisted = url
            .query_pairs()
            .any(|(key, value)| key == WHITELIST_QUERY_KEY && value == WHITELIST_QUERY_VALUE);
        Self {
            is_admin,
            is_whitelisted,
        }
    }

    /// Derive the markers from an href string.
    ///
    /// An unparseable href yields the all-false default: a malformed URL
    /// must degrade to the public application, never to the admin surface.
    #[must_use]
    pub fn parse(href: &str) -> Self {
        match Url::parse(href) {
            Ok(url) => Self::from_url(&url),
            Err(_) => Self::default(),
        }
    }
}
