//! Tree orchestrator: the recursive `ensure_all` traversal.
//!
//! One traversal per root per call: refresh registry metadata, resolve all
//! dependencies concurrently, then install the node itself. Results flow
//! bottom-up as [`Outcome`]s; every fan-in fires exactly once, after all
//! children have reported - an early dependency failure never cancels its
//! siblings, it only stops the dependent's own install.

use std::sync::Arc;

use futures::future::{BoxFuture, join_all};

use crate::guard::InstallGuard;
use crate::outcome::Outcome;
use crate::package::PackageNode;
use crate::process::ProcessRunner;
use crate::registry::Registry;

pub struct Installer {
    registry: Arc<dyn Registry>,
    guard: InstallGuard,
}

impl Installer {
    pub fn new(registry: Arc<dyn Registry>, process: Arc<dyn ProcessRunner>) -> Self {
        let guard = InstallGuard::new(registry.clone(), process);
        Self { registry, guard }
    }

    /// Ensure `node` and its transitive dependency closure are installed at
    /// their target versions. Reports exactly one terminal [`Outcome`];
    /// there are no automatic retries.
    pub async fn ensure_all(&self, node: &PackageNode) -> Outcome {
        self.ensure_node(node).await
    }

    // Recursion through dependency trees needs a boxed future.
    fn ensure_node<'a>(&'a self, node: &'a PackageNode) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            // Refresh per node, not per traversal; the registry keeps it
            // idempotent and cheap when cached.
            if let Err(err) = self.registry.refresh().await {
                tracing::error!(package = %node.name, error = %err, "registry refresh failed");
                return Outcome::fail();
            }

            let deps = self.ensure_dependencies(node).await;
            if !deps.success {
                tracing::warn!(package = %node.name, "skipping install, a dependency failed");
                return Outcome::new(false, deps.changed);
            }

            let own = self.guard.ensure_installed(node).await;
            Outcome::new(own.success, deps.changed || own.changed)
        })
    }

    /// Resolve all dependencies of `node` concurrently. Fan-in fires after
    /// every dependency reaches a terminal state: success is the AND across
    /// dependencies, changed the OR. Sibling order is unconstrained.
    async fn ensure_dependencies(&self, node: &PackageNode) -> Outcome {
        if node.dependencies.is_empty() {
            return Outcome::ok();
        }

        let results = join_all(
            node.dependencies
                .iter()
                .map(|dependency| self.ensure_node(dependency)),
        )
        .await;

        Outcome::all(results)
    }
}
