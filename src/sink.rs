//! Finalization hook so a builder can mark its own output read-only once
//! it's done writing (§4.4 step 4, §4.5 step 5: "close, then set file
//! permissions to read-only"), without forcing every sink type a builder
//! might be handed to be backed by a path on disk.
//!
//! A builder is generic over its sink (`W: Write`) so tests can drain it
//! into a plain `Vec<u8>` instead of touching a filesystem. [`FinalizeSink`]
//! gives both cases a single call after the footer is flushed: a real
//! `std::fs::File` seals itself via its own file descriptor (no path lookup
//! needed), while an in-memory sink is a no-op.

use std::io::Result;

/// Called exactly once, after a builder has written its last byte. The
/// default is a no-op; only [`std::fs::File`] overrides it.
pub trait FinalizeSink {
    fn finalize(&self) -> Result<()> {
        Ok(())
    }
}

impl FinalizeSink for std::fs::File {
    fn finalize(&self) -> Result<()> {
        let mut perms = self.metadata()?.permissions();
        perms.set_readonly(true);
        self.set_permissions(perms)
    }
}

impl FinalizeSink for Vec<u8> {}
