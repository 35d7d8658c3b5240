//! Quartermaster - dependency-aware installer orchestrator.
//!
//! Given a declarative tree of named packages (each with a target version,
//! dependencies, and post-install hooks), [`Installer::ensure_all`] makes
//! sure every package and its transitive dependency closure end up
//! installed at the target version: dependencies install in parallel before
//! their dependents, post-install hooks run after success, and the caller
//! gets back a single `(success, changed)` [`Outcome`] per root.
//!
//! The actual install mechanism is external: the traversal talks to it
//! through the [`Registry`] capability, and the bundled [`CommandRegistry`]
//! adapter delegates every operation to user-configured commands.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use quartermaster::{CommandRegistry, Installer, Manifest, TokioProcessRunner, build_tree};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let manifest = Manifest::load("quartermaster.toml".as_ref())?;
//!     let process = Arc::new(TokioProcessRunner);
//!     let registry = Arc::new(CommandRegistry::new(manifest.registry.clone(), process.clone())?);
//!     let installer = Installer::new(registry.clone(), process);
//!
//!     let tree = build_tree(&manifest, "lua-language-server", registry.as_ref()).await?;
//!     let outcome = installer.ensure_all(&tree).await;
//!     println!("success={} changed={}", outcome.success, outcome.changed);
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod ensure;
pub mod error;
pub mod guard;
pub mod hooks;
pub mod inflight;
pub mod manifest;
pub mod outcome;
pub mod package;
pub mod process;
pub mod registry;

// Re-export the main entry points
pub use adapters::CommandRegistry;
pub use ensure::Installer;
pub use error::{QmError, Result};
pub use manifest::{Manifest, PackageSpec, RegistryConfig, build_tree};
pub use outcome::Outcome;
pub use package::{Hook, HookFn, HookVerdict, PackageNode};
pub use process::{ProcessOutput, ProcessRunner, TokioProcessRunner};
pub use registry::{InstallHandle, InstallProgress, Registry};
