//! UI runtime seam and routing surface.
//!
//! The session core never renders anything; it tells a `UiRuntime` what to
//! show and where to navigate.

use crate::model::app_state::AppState;
use crate::model::session::{Session, SessionId, WindowLayout};
use log::info;

pub const SELECT_DATA_SOURCE_PAGE_PATH: &str = "/page/selectDataSource";
pub const LANDING_PAGE_PATH: &str = "/page/landing";

/// Top-level pages of the primary surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    SelectDataSource,
    Landing,
}

impl Route {
    /// Landing once running, the data-source picker otherwise.
    pub fn for_state(state: Option<AppState>) -> Self {
        match state {
            Some(AppState::Running) => Self::Landing,
            _ => Self::SelectDataSource,
        }
    }

    pub fn path(self) -> &'static str {
        match self {
            Self::SelectDataSource => SELECT_DATA_SOURCE_PAGE_PATH,
            Self::Landing => LANDING_PAGE_PATH,
        }
    }
}

/// Presentation runtime driven by the shell from the owning thread.
pub trait UiRuntime {
    /// Shows a newly created journal window.
    fn show_session(&mut self, session: &Session, layout: WindowLayout);
    /// Raises an already open journal window.
    fn bring_to_front(&mut self, session: &Session);
    fn navigate(&mut self, route: Route);
    /// Terminates the UI runtime; called once, last, during shutdown.
    fn exit(&mut self);
}

/// Action recorded by `HeadlessUi`.
#[derive(Debug, Clone, PartialEq)]
pub enum UiAction {
    Show {
        session: SessionId,
        title: String,
        layout: WindowLayout,
    },
    Focus {
        session: SessionId,
    },
    Navigate(Route),
    Exit,
}

/// Windowless runtime that logs and records every request.
#[derive(Debug, Default)]
pub struct HeadlessUi {
    actions: Vec<UiAction>,
}

impl HeadlessUi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actions(&self) -> &[UiAction] {
        &self.actions
    }

    pub fn exit_count(&self) -> usize {
        self.actions
            .iter()
            .filter(|action| **action == UiAction::Exit)
            .count()
    }
}

impl UiRuntime for HeadlessUi {
    fn show_session(&mut self, session: &Session, layout: WindowLayout) {
        info!(
            "event=ui_show module=ui status=ok folder={} maximized={}",
            session.folder,
            layout == WindowLayout::Maximized
        );
        self.actions.push(UiAction::Show {
            session: session.id,
            title: session.title.clone(),
            layout,
        });
    }

    fn bring_to_front(&mut self, session: &Session) {
        info!("event=ui_focus module=ui status=ok folder={}", session.folder);
        self.actions.push(UiAction::Focus {
            session: session.id,
        });
    }

    fn navigate(&mut self, route: Route) {
        info!("event=ui_navigate module=ui status=ok path={}", route.path());
        self.actions.push(UiAction::Navigate(route));
    }

    fn exit(&mut self) {
        info!("event=ui_exit module=ui status=ok");
        self.actions.push(UiAction::Exit);
    }
}
