use std::sync::Arc;
use tether_types::{SessionState, StreamConfig, StreamSession};
use tokio::sync::watch;

/// Shared view of one session's identity and lifecycle.
///
/// Cloning is cheap; every clone observes the same state.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    info: Arc<StreamSession>,
    state: Arc<watch::Sender<SessionState>>,
}

impl SessionHandle {
    pub(crate) fn new(info: StreamSession) -> Self {
        let (state, _) = watch::channel(SessionState::Active);
        Self {
            info: Arc::new(info),
            state: Arc::new(state),
        }
    }

    /// Request id
    pub fn id(&self) -> &str {
        &self.info.request_id
    }

    pub fn info(&self) -> &StreamSession {
        &self.info
    }

    pub fn config(&self) -> &StreamConfig {
        &self.info.config
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Move out of `Active` into `terminal`.
    ///
    /// Returns `false` when the session had already reached a terminal state;
    /// the first caller wins and later calls change nothing.
    pub(crate) fn finish(&self, terminal: SessionState) -> bool {
        self.state.send_if_modified(|state| {
            if state.is_terminal() {
                return false;
            }
            *state = terminal;
            true
        })
    }

    /// Resolves once the session has reached a terminal state.
    pub async fn wait_terminal(&self) -> SessionState {
        let mut rx = self.state.subscribe();
        rx.wait_for(SessionState::is_terminal)
            .await
            .map(|state| *state)
            .unwrap_or_else(|_| self.state())
    }
}
