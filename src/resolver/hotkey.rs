//! HotkeyProvider trait — global key registration and event delivery.

use tokio::sync::mpsc::UnboundedReceiver;

use super::ResolverError;

/// A user-specified key binding, e.g. `"Super+Shift+C"`.
///
/// Parsing and validation are the provider's responsibility — this
/// type just carries the raw spec across the trait boundary.
#[derive(Debug, Clone)]
pub struct KeyBinding {
    pub spec: String,
}

/// Actions the hotkey client can request from the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyEvent {
    /// Capture the focused session's latest turn into the relay buffer.
    Capture,
    /// Paste the relay buffer into the focused session.
    Paste,
}

/// Result of registering hotkeys with a provider.
pub struct HotkeyRegistration {
    /// Channel of classified hotkey events, fed by the provider's
    /// platform-specific event loop.
    pub events: UnboundedReceiver<HotkeyEvent>,
    /// Number of bindings that were successfully grabbed (0, 1, or 2).
    pub bindings_ok: u32,
}

/// Registers global hotkeys and delivers classified events.
///
/// Platform adapters implement this to abstract key-grab mechanics
/// (X11 `XGrabKey`, or other display protocols) behind a uniform
/// capture/paste event stream.
pub trait HotkeyProvider: Send {
    /// Register the capture and paste bindings.
    ///
    /// Individual binding failures (e.g. grab conflicts) are logged
    /// and reflected in `HotkeyRegistration::bindings_ok` rather than
    /// failing the whole call — only a connection-level error returns
    /// `Err`.
    fn register(
        &mut self,
        capture: &KeyBinding,
        paste: &KeyBinding,
    ) -> Result<HotkeyRegistration, ResolverError>;

    /// Release all key grabs and stop the event loop. Called on shutdown.
    fn unregister(&mut self);
}
