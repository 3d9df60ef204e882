//! Write-observation hook.
//!
//! The one seam the engine exposes to replication glue: an observer
//! registered via [`crate::Store::set_observer`] is told about every
//! successful local write, synchronously and under the write mutex, so
//! external publication happens-after local commit in write order. A slow
//! observer therefore sits on the write path; buffering is the observer's
//! business, not the engine's.

/// Callbacks invoked after each successful append.
///
/// All methods default to doing nothing, so implementors override only the
/// operations they forward. Errors are logged by the engine and never fail
/// the originating write.
pub trait WriteObserver: Send {
    /// A key-value pair was written.
    fn on_put(&mut self, _key: &[u8], _value: &[u8]) -> anyhow::Result<()> {
        Ok(())
    }

    /// A key was deleted. Not invoked for deletes of absent keys, which
    /// append nothing.
    fn on_delete(&mut self, _key: &[u8]) -> anyhow::Result<()> {
        Ok(())
    }

    /// A batch of key-value pairs was written. Invoked once per batch, after
    /// the last entry is appended.
    fn on_batch_put(&mut self, _entries: &[(Vec<u8>, Vec<u8>)]) -> anyhow::Result<()> {
        Ok(())
    }
}
