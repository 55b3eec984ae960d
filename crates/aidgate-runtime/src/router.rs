#![forbid(unsafe_code)]

//! Mode routing: exactly one top-level view at a time.
//!
//! Transitions between views are unconditional replacements. The outgoing
//! view's effects are fully torn down before the incoming view mounts, so
//! a listener registered by a view can never fire after that view is gone.

use aidgate_core::Mode;
use std::sync::Arc;

use crate::bus::{Trigger, TriggerHandle};
use crate::recovery::Navigator;

/// Sub-navigation within the normal public application.
///
/// The gate only tracks and resets this selection; page content belongs to
/// the view collaborators.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Page {
    /// The landing page (hero, options, FAQ).
    #[default]
    Landing,
    /// Terms and conditions.
    Terms,
    /// How-it-works explainer.
    HowItWorks,
    /// The loan application form.
    Application,
    /// The payment form.
    Payment,
}

/// Callback handed to views for requesting return to the normal app.
///
/// Clears the admin URL marker, then raises a navigation trigger so the
/// reconciler re-decides from the updated URL. If lockout is active the
/// caller lands on the maintenance view, not the normal app; the decision
/// always belongs to the reconciler.
#[derive(Clone)]
pub struct ExitToNormal {
    navigator: Arc<dyn Navigator>,
    handle: TriggerHandle,
}

impl ExitToNormal {
    /// Build the callback over the host seams.
    #[must_use]
    pub fn new(navigator: Arc<dyn Navigator>, handle: TriggerHandle) -> Self {
        Self { navigator, handle }
    }

    /// Request return to the normal application.
    pub fn request(&self) {
        self.navigator.clear_fragment();
        self.handle.notify(Trigger::Navigation);
    }
}

/// A top-level view collaborator.
///
/// Views are invoked with nothing beyond the return-to-normal callback;
/// everything else they need (store handles, session handles) is their
/// own wiring concern.
pub trait GateView {
    /// Mount the view. Called after the previous view is fully unmounted.
    fn mount(&mut self, exit: &ExitToNormal);

    /// Tear down every effect this view registered.
    fn unmount(&mut self);
}

/// The three view collaborators, one per mode.
pub struct Views {
    /// The administrative control surface.
    pub admin: Box<dyn GateView>,
    /// The hard maintenance lockout.
    pub maintenance: Box<dyn GateView>,
    /// The normal public application root.
    pub normal: Box<dyn GateView>,
}

/// Maps the current mode to exactly one mounted view.
pub struct ModeRouter {
    views: Views,
    current: Option<Mode>,
    page: Page,
}

impl ModeRouter {
    /// Create a router with nothing mounted yet.
    #[must_use]
    pub fn new(views: Views) -> Self {
        Self {
            views,
            current: None,
            page: Page::default(),
        }
    }

    /// The currently mounted mode, if any.
    #[must_use]
    pub fn current(&self) -> Option<Mode> {
        self.current
    }

    /// The sub-navigation selection within the normal app.
    #[must_use]
    pub fn page(&self) -> Page {
        self.page
    }

    fn view_mut(&mut self, mode: Mode) -> &mut Box<dyn GateView> {
        match mode {
            Mode::Admin => &mut self.views.admin,
            Mode::Maintenance => &mut self.views.maintenance,
            Mode::Normal => &mut self.views.normal,
        }
    }

    /// Mount the view for `mode`, replacing whatever is showing.
    ///
    /// Idempotent for an unchanged mode. Entering the normal app resets
    /// sub-navigation to the landing page. Returns `true` if the mounted
    /// view changed.
    pub fn route(&mut self, mode: Mode, exit: &ExitToNormal) -> bool {
        if self.current == Some(mode) {
            return false;
        }
        if let Some(previous) = self.current {
            // Full teardown before the next view mounts.
            self.view_mut(previous).unmount();
        }
        if mode == Mode::Normal {
            self.page = Page::default();
        }
        self.current = Some(mode);
        self.view_mut(mode).mount(exit);
        tracing::debug!(%mode, "view mounted");
        true
    }

    /// Select a page within the normal app.
    ///
    /// Ignored outside normal mode: sub-navigation has no meaning on the
    /// admin or maintenance surfaces.
    pub fn show(&mut self, page: Page) {
        if self.current == Some(Mode::Normal) {
            self.page = page;
        } else {
            tracing::debug!(?page, current = ?self.current, "sub-navigation ignored outside normal mode");
        }
    }

    /// Unmount whatever is showing (unload path).
    pub fn teardown(&mut self) {
        if let Some(mode) = self.current.take() {
            self.view_mut(mode).unmount();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::SourceRegistry;
    use std::sync::Mutex;

    #[derive(Default)]
    struct NullNavigator {
        cleared: Mutex<u32>,
    }

    impl Navigator for NullNavigator {
        fn current_url(&self) -> String {
            "https://allowanceaid.example/".to_string()
        }

        fn clear_fragment(&self) {
            *self.cleared.lock().unwrap() += 1;
        }

        fn reload(&self, _url: &str) {}
    }

    /// View that appends mount/unmount events to a shared log.
    struct RecordingView {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl GateView for RecordingView {
        fn mount(&mut self, _exit: &ExitToNormal) {
            self.log.lock().unwrap().push(format!("mount {}", self.label));
        }

        fn unmount(&mut self) {
            self.log.lock().unwrap().push(format!("unmount {}", self.label));
        }
    }

    fn recording_router() -> (ModeRouter, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let view = |label| {
            Box::new(RecordingView {
                label,
                log: log.clone(),
            })
        };
        let router = ModeRouter::new(Views {
            admin: view("admin"),
            maintenance: view("maintenance"),
            normal: view("normal"),
        });
        (router, log)
    }

    fn exit() -> ExitToNormal {
        let registry = SourceRegistry::new();
        ExitToNormal::new(Arc::new(NullNavigator::default()), registry.handle())
    }

    #[test]
    fn first_route_mounts_without_unmount() {
        let (mut router, log) = recording_router();
        assert!(router.route(Mode::Normal, &exit()));
        assert_eq!(*log.lock().unwrap(), vec!["mount normal"]);
        assert_eq!(router.current(), Some(Mode::Normal));
    }

    #[test]
    fn unchanged_mode_is_a_no_op() {
        let (mut router, log) = recording_router();
        router.route(Mode::Normal, &exit());
        assert!(!router.route(Mode::Normal, &exit()));
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn transition_unmounts_before_mounting() {
        let (mut router, log) = recording_router();
        router.route(Mode::Normal, &exit());
        router.route(Mode::Maintenance, &exit());
        assert_eq!(
            *log.lock().unwrap(),
            vec!["mount normal", "unmount normal", "mount maintenance"]
        );
    }

    #[test]
    fn entering_normal_resets_sub_navigation() {
        let (mut router, _log) = recording_router();
        router.route(Mode::Normal, &exit());
        router.show(Page::Application);
        assert_eq!(router.page(), Page::Application);

        router.route(Mode::Admin, &exit());
        router.route(Mode::Normal, &exit());
        assert_eq!(router.page(), Page::Landing);
    }

    #[test]
    fn sub_navigation_ignored_outside_normal() {
        let (mut router, _log) = recording_router();
        router.route(Mode::Maintenance, &exit());
        router.show(Page::Payment);
        assert_eq!(router.page(), Page::Landing);
    }

    #[test]
    fn teardown_unmounts_current_view() {
        let (mut router, log) = recording_router();
        router.route(Mode::Admin, &exit());
        router.teardown();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["mount admin", "unmount admin"]
        );
        assert_eq!(router.current(), None);
    }

    #[test]
    fn exit_callback_clears_fragment_and_raises_navigation() {
        let registry = SourceRegistry::new();
        let navigator = Arc::new(NullNavigator::default());
        let exit = ExitToNormal::new(navigator.clone(), registry.handle());

        exit.request();

        assert_eq!(*navigator.cleared.lock().unwrap(), 1);
        assert_eq!(registry.drain(), vec![Trigger::Navigation]);
    }
}
