use tokio::sync::{mpsc, watch};
use tracing::debug;

use super::stats::SessionView;

/// Requests from the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserIntent {
    Start,
    Stop,
    ToggleRecording,
    ToggleHistoryView,
    /// Release everything and end the controller task
    Shutdown,
}

/// Cloneable handle to a running [`SessionController`](super::SessionController)
///
/// Intents are queued and handled in order by the controller task; the
/// current state is observable through [`SessionHandle::view`] or a
/// [`watch::Receiver`] from [`SessionHandle::subscribe`].
#[derive(Clone)]
pub struct SessionHandle {
    intents: mpsc::UnboundedSender<UserIntent>,
    view: watch::Receiver<SessionView>,
}

impl SessionHandle {
    pub(crate) fn new(
        intents: mpsc::UnboundedSender<UserIntent>,
        view: watch::Receiver<SessionView>,
    ) -> Self {
        Self { intents, view }
    }

    pub fn start(&self) -> bool {
        self.send(UserIntent::Start)
    }

    pub fn stop(&self) -> bool {
        self.send(UserIntent::Stop)
    }

    pub fn toggle_recording(&self) -> bool {
        self.send(UserIntent::ToggleRecording)
    }

    pub fn toggle_history_view(&self) -> bool {
        self.send(UserIntent::ToggleHistoryView)
    }

    pub fn shutdown(&self) -> bool {
        self.send(UserIntent::Shutdown)
    }

    /// Queue an intent. Returns `false` if the controller has exited.
    pub fn send(&self, intent: UserIntent) -> bool {
        let sent = self.intents.send(intent).is_ok();
        if !sent {
            debug!("Controller gone, dropping {:?}", intent);
        }
        sent
    }

    /// Snapshot of the current state
    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    /// Whether the controller task is still accepting intents
    pub fn is_running(&self) -> bool {
        !self.intents.is_closed()
    }
}
