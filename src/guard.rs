//! Install guard: the only component that mutates install state.
//!
//! Wraps the registry's opaque single-package install with re-entrancy
//! deduplication, version-delta change detection, and hook dispatch. Every
//! failure collapses to a boolean [`Outcome`] here; nothing propagates as an
//! error to the traversal above.

use std::sync::Arc;

use crate::hooks::HookRunner;
use crate::inflight::InFlight;
use crate::outcome::Outcome;
use crate::package::PackageNode;
use crate::process::ProcessRunner;
use crate::registry::Registry;

pub struct InstallGuard {
    registry: Arc<dyn Registry>,
    hooks: HookRunner,
    inflight: InFlight,
}

impl InstallGuard {
    pub fn new(registry: Arc<dyn Registry>, process: Arc<dyn ProcessRunner>) -> Self {
        Self {
            registry,
            hooks: HookRunner::new(process),
            inflight: InFlight::new(),
        }
    }

    /// Ensure `node` is installed at its target version.
    ///
    /// A duplicate request while an install for the same name is in flight
    /// is a successful no-op: it reports `(true, false)` immediately, it
    /// does not queue and it does not error.
    pub async fn ensure_installed(&self, node: &PackageNode) -> Outcome {
        // Atomic check-and-claim; the token releases the name on every exit
        // path, including after hooks.
        let Some(_token) = self.inflight.begin(&node.name) else {
            tracing::debug!(package = %node.name, "install already in flight, skipping");
            return Outcome::ok();
        };

        // Advisory flag for installs started outside this process.
        if self.registry.is_installing(&node.name).await {
            tracing::debug!(package = %node.name, "registry reports external install in flight");
            return Outcome::ok();
        }

        let previous = match self.registry.installed_version(&node.name).await {
            Ok(version) => version,
            Err(err) => {
                tracing::error!(package = %node.name, error = %err, "failed to read installed version");
                return Outcome::fail();
            }
        };

        if previous.as_deref() == Some(node.version.as_str()) {
            tracing::debug!(package = %node.name, version = %node.version, "already at target version");
            return Outcome::ok();
        }

        let handle = match self.registry.install(&node.name, &node.version).await {
            Ok(handle) => handle,
            Err(err) => {
                tracing::error!(package = %node.name, error = %err, "failed to start install");
                return Outcome::fail();
            }
        };

        let diagnostics = handle.wait().await;

        let current = match self.registry.installed_version(&node.name).await {
            Ok(version) => version,
            Err(err) => {
                tracing::error!(package = %node.name, error = %err, "failed to re-read installed version");
                None
            }
        };

        // Report the observed delta, not the installer's claim: a failed
        // install may still have changed state.
        let changed = previous != current;

        match current {
            None => {
                tracing::error!(
                    package = %node.name,
                    version = %node.version,
                    diagnostics = %diagnostics.trim_end(),
                    "install failed, package not present"
                );
                Outcome::new(false, changed)
            }
            Some(current) => {
                tracing::info!(
                    package = %node.name,
                    from = %previous.as_deref().unwrap_or("none"),
                    to = %current,
                    "installed"
                );
                let hooks_ok = self
                    .hooks
                    .run(node, &self.registry.install_dir(&node.name))
                    .await;
                Outcome::new(hooks_ok, changed)
            }
        }
    }
}
