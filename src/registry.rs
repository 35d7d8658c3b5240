//! Registry capability consumed by the traversal.
//!
//! The registry owns all install state: which version of a package is
//! present, whether an install is in flight, and where packages land on
//! disk. The traversal only reads that state and asks for installs; it never
//! performs one itself. Implementations delegate to whatever actually
//! installs packages - see [`crate::adapters::CommandRegistry`] for the
//! bundled command-template adapter.
//!
//! `is_installing` is advisory: it reports installs started outside this
//! process. Within one process the traversal's own in-flight set is the
//! authoritative guard, because a separate query can never be atomic with
//! the decision to start an install. Closing that gap across processes is
//! the implementation's concern.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::error::Result;

#[async_trait]
pub trait Registry: Send + Sync {
    /// Refresh registry metadata. Idempotent and cheap when cached.
    async fn refresh(&self) -> Result<()>;

    /// Currently installed version of `name`, or `None` if absent.
    async fn installed_version(&self, name: &str) -> Result<Option<String>>;

    /// Latest available version of `name`.
    async fn latest_version(&self, name: &str) -> Result<String>;

    /// Whether an install of `name` started outside this process is in
    /// flight.
    async fn is_installing(&self, name: &str) -> bool;

    /// Start installing `name` at `version`. The returned handle streams
    /// installer diagnostics and fires a single terminal closed event; it
    /// says nothing about success - callers re-read the installed version
    /// once the handle closes.
    async fn install(&self, name: &str, version: &str) -> Result<InstallHandle>;

    /// Where `name` is (or will be) installed. Used as the working
    /// directory for post-install command hooks.
    fn install_dir(&self, name: &str) -> PathBuf;
}

/// Consumer half of a running install: a diagnostic line stream plus a
/// single terminal closed event.
#[derive(Debug)]
pub struct InstallHandle {
    diagnostics: mpsc::UnboundedReceiver<String>,
    closed: oneshot::Receiver<()>,
}

impl InstallHandle {
    /// Build a connected producer/consumer pair. Registry implementations
    /// keep the [`InstallProgress`] half and hand the handle to the caller.
    pub fn channel() -> (InstallProgress, InstallHandle) {
        let (diag_tx, diag_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = oneshot::channel();
        (
            InstallProgress {
                diagnostics: diag_tx,
                closed: closed_tx,
            },
            InstallHandle {
                diagnostics: diag_rx,
                closed: closed_rx,
            },
        )
    }

    /// Drain the diagnostic stream, await the closed event, and return the
    /// accumulated diagnostic text.
    pub async fn wait(mut self) -> String {
        let mut captured = String::new();
        while let Some(line) = self.diagnostics.recv().await {
            captured.push_str(&line);
            captured.push('\n');
        }
        // The producer may drop without an explicit close; a dropped sender
        // is the same terminal event.
        let _ = self.closed.await;
        captured
    }
}

/// Producer half of a running install.
#[derive(Debug)]
pub struct InstallProgress {
    diagnostics: mpsc::UnboundedSender<String>,
    closed: oneshot::Sender<()>,
}

impl InstallProgress {
    /// Emit one diagnostic line. Silently dropped if the consumer is gone.
    pub fn diagnostic(&self, line: impl Into<String>) {
        let _ = self.diagnostics.send(line.into());
    }

    /// Fire the terminal closed event, consuming the producer.
    pub fn close(self) {
        let _ = self.closed.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_accumulates_diagnostics() {
        let (progress, handle) = InstallHandle::channel();
        progress.diagnostic("fetching archive");
        progress.diagnostic("checksum mismatch");
        progress.close();
        let captured = handle.wait().await;
        assert_eq!(captured, "fetching archive\nchecksum mismatch\n");
    }

    #[tokio::test]
    async fn test_wait_finishes_when_producer_is_dropped() {
        let (progress, handle) = InstallHandle::channel();
        progress.diagnostic("partial output");
        drop(progress);
        let captured = handle.wait().await;
        assert_eq!(captured, "partial output\n");
    }

    #[tokio::test]
    async fn test_wait_with_no_diagnostics() {
        let (progress, handle) = InstallHandle::channel();
        progress.close();
        assert_eq!(handle.wait().await, "");
    }
}
