//! ClipboardProvider trait — system clipboard read/write abstraction.

use super::ResolverError;

/// Reads and writes the system clipboard.
///
/// Platform adapters implement this trait to abstract clipboard access,
/// so a future clipboard-delivery consumer can call `write()` instead of
/// manipulating platform-specific clipboard mechanisms directly.
///
/// `Send + Sync` is required because the broker may invoke clipboard
/// operations from async task contexts.
#[allow(dead_code)]
pub trait ClipboardProvider: Send + Sync {
    /// Set the system clipboard content to the given bytes.
    fn write(&self, content: &[u8]) -> Result<(), ResolverError>;

    /// Read the current system clipboard content.
    fn read(&self) -> Result<Vec<u8>, ResolverError>;
}
