//! Cooperative cancellation for export jobs.
//!
//! A [`CancelFlag`] is cloned into every long-running stage. Stages check it
//! at their boundaries (between pulls, before a save, between pipeline steps,
//! before archiving); in-flight subprocesses are not interrupted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{ExportError, Result};

#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Visible to every clone of this flag.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fail with [`ExportError::Cancelled`] if cancellation was requested.
    pub fn check(&self, before: &str) -> Result<()> {
        if self.is_cancelled() {
            tracing::warn!(stage = before, "export cancelled");
            return Err(ExportError::Cancelled(before.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(flag.check("pull").is_ok());

        other.cancel();

        assert!(flag.is_cancelled());
        let err = flag.check("pull").unwrap_err();
        assert_eq!(err.to_string(), "export cancelled before pull");
    }
}
