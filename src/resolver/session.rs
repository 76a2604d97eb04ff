//! SessionResolver trait — maps focused window to a clippy session.

use crate::ipc::protocol::SessionDescriptor;

use super::ResolverError;

/// Resolves which registered session owns the currently focused window.
///
/// Platform adapters implement this to abstract focus detection
/// (X11 `_NET_ACTIVE_WINDOW` + process tree walk, or other window
/// managers' equivalents) behind a single query against the broker's
/// session list.
pub trait SessionResolver: Send + Sync {
    /// Return the session ID that owns the focused window, or `None`
    /// if no registered session is focused.
    ///
    /// Returns `Err` if resolution is ambiguous (multiple sessions
    /// match) or the platform query itself fails.
    fn focused_session(
        &self,
        sessions: &[SessionDescriptor],
    ) -> Result<Option<String>, ResolverError>;
}
