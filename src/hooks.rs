//! Post-install hook execution.
//!
//! All of a package's hooks start concurrently and every one runs to
//! completion - a failing hook never aborts its siblings. The runner's
//! result is the AND across per-hook outcomes, reported once, after the
//! last hook finishes.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::sync::Arc;

use futures::future::join_all;

use crate::package::{Hook, PackageNode};
use crate::process::ProcessRunner;

pub struct HookRunner {
    process: Arc<dyn ProcessRunner>,
}

impl HookRunner {
    pub fn new(process: Arc<dyn ProcessRunner>) -> Self {
        Self { process }
    }

    /// Run every hook of `node` concurrently with `cwd` as the working
    /// directory for command hooks. Returns the AND of all hook outcomes;
    /// an empty hook list succeeds immediately.
    pub async fn run(&self, node: &PackageNode, cwd: &Path) -> bool {
        if node.hooks.is_empty() {
            return true;
        }

        let results = join_all(
            node.hooks
                .iter()
                .map(|hook| self.run_hook(hook, node, cwd)),
        )
        .await;

        results.into_iter().all(|ok| ok)
    }

    async fn run_hook(&self, hook: &Hook, node: &PackageNode, cwd: &Path) -> bool {
        match hook {
            Hook::Command(argv) => match self.process.run(argv, cwd).await {
                Ok(output) if output.success() => true,
                Ok(output) => {
                    tracing::error!(
                        package = %node.name,
                        command = ?argv,
                        code = ?output.code,
                        stdout = %output.stdout.trim_end(),
                        stderr = %output.stderr.trim_end(),
                        "post-install command failed"
                    );
                    false
                }
                Err(err) => {
                    tracing::error!(
                        package = %node.name,
                        command = ?argv,
                        error = %err,
                        "failed to spawn post-install command"
                    );
                    false
                }
            },
            Hook::Callback(callback) => {
                // A panicking callback counts as a failed hook; the panic
                // never crosses the traversal's async boundary.
                match catch_unwind(AssertUnwindSafe(|| callback(node))) {
                    Ok(verdict) => {
                        if !verdict.passed() {
                            tracing::error!(package = %node.name, "post-install callback failed");
                        }
                        verdict.passed()
                    }
                    Err(payload) => {
                        let message = panic_message(&payload);
                        tracing::error!(
                            package = %node.name,
                            error = %message,
                            "post-install callback panicked"
                        );
                        false
                    }
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
