use crate::connection::ConnectionError;
use crate::domain_model::*;
use crate::session_port::HistoryFetchError;

/// Why a session reached its terminal `Failed` state.
#[derive(Debug, thiserror::Error)]
pub enum SessionFault {
    #[error(transparent)]
    Connect(ConnectionError),
    #[error("subscribe failed: {0}")]
    Subscribe(String),
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    #[error("connection closed by gateway")]
    RemoteClosed,
}

/// Callbacks into the embedding UI. Invoked from the session's own task;
/// implementations must not block.
pub trait SessionObserver: Send + Sync {
    /// The merged timeline changed; `snapshot` is the full chronological view.
    fn timeline_changed(&self, snapshot: &[ChatMessage]);

    /// Terminal failure. Fired at most once per session run; the session must
    /// be restarted explicitly afterwards.
    fn session_failed(&self, fault: &SessionFault);

    /// History could not be loaded; the session continues with live messages
    /// only and the UI should show a partial-data warning.
    fn history_unavailable(&self, reason: &HistoryFetchError);
}

/// Observer that ignores everything. Useful for tools that only poll
/// `snapshot()`.
pub struct NullObserver;

impl SessionObserver for NullObserver {
    fn timeline_changed(&self, _snapshot: &[ChatMessage]) {}
    fn session_failed(&self, _fault: &SessionFault) {}
    fn history_unavailable(&self, _reason: &HistoryFetchError) {}
}
