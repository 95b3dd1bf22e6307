//! Session lifecycle notifications emitted by the gateway.

use tokio::sync::broadcast;

/// Capacity of the session event channel. Receivers that fall further behind
/// than this only miss intermediate events, never the latest termination.
pub const EVENT_CAPACITY: usize = 16;

/// Why the gateway ended the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// No refresh token was stored when one was needed.
    MissingRefreshToken,
    /// The refresh endpoint rejected the refresh token or could not be reached.
    RefreshFailed,
    /// The request was rejected again after a successful refresh.
    RetryRejected,
}

/// A change to the session made beneath the session store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A new access token was stored after a refresh.
    TokenRefreshed,
    /// Durable session state was cleared because it could not be recovered.
    Terminated { reason: TerminationReason },
}

/// Creates a new event channel sender.
#[must_use]
pub fn channel() -> broadcast::Sender<SessionEvent> {
    broadcast::channel(EVENT_CAPACITY).0
}
