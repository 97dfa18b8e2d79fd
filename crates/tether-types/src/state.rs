use crate::config::StreamConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a streaming session.
///
/// `Active` is the only non-terminal state. Once a session leaves it, the
/// state never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    /// `Done` delivered after natural upstream completion
    Completed,
    /// Upstream, transport or provider error surfaced as `Error` + `Done`
    Failed,
    /// Hard deadline elapsed before completion
    TimedOut,
    /// Consumer went away
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// Per-request context of one streaming session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSession {
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub model: String,
    pub config: StreamConfig,
    pub started_at: DateTime<Utc>,
}

impl StreamSession {
    pub fn new(model: impl Into<String>, config: StreamConfig) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            user_id: None,
            model: model.into(),
            config,
            started_at: Utc::now(),
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}
