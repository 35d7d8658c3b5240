//! Package tree data model.
//!
//! A [`PackageNode`] names one target package at one target version, with an
//! ordered list of dependency nodes and an ordered list of post-install
//! hooks. Trees are built once (from a manifest or by hand), are immutable
//! for the duration of a traversal, and may be reused across traversals -
//! each traversal re-reads live install state from the registry.
//!
//! The same dependency name may appear under multiple parents; each
//! occurrence is an independent node. Install state is keyed by package name
//! inside the registry collaborator, never stored on the node.

use std::fmt;
use std::sync::Arc;

/// In-process post-install logic. Receives the node it ran for.
pub type HookFn = Arc<dyn Fn(&PackageNode) -> HookVerdict + Send + Sync>;

/// Result of a callback hook.
///
/// `Unspecified` counts as success: a callback that has nothing to report
/// passes. Only an explicit `Fail` (or a panic, caught by the hook runner)
/// counts against the package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HookVerdict {
    Pass,
    Fail,
    #[default]
    Unspecified,
}

impl HookVerdict {
    /// Collapse to a boolean at the hook-runner boundary.
    pub fn passed(self) -> bool {
        !matches!(self, HookVerdict::Fail)
    }
}

/// One post-install action.
#[derive(Clone)]
pub enum Hook {
    /// Spawn a process with this argv, cwd = the package's install
    /// directory. Success iff the exit status is zero.
    Command(Vec<String>),
    /// Run in-process logic against the node.
    Callback(HookFn),
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hook::Command(argv) => f.debug_tuple("Command").field(argv).finish(),
            Hook::Callback(_) => f.debug_tuple("Callback").field(&"<fn>").finish(),
        }
    }
}

/// One entry in the package dependency tree.
#[derive(Debug, Clone)]
pub struct PackageNode {
    /// Unique identifier within the target registry.
    pub name: String,
    /// Target version, fixed at construction. A manifest entry without a
    /// pinned version resolves "latest" through the registry at
    /// tree-construction time, never during traversal.
    pub version: String,
    /// Dependencies, installed before this node.
    pub dependencies: Vec<PackageNode>,
    /// Post-install hooks, run after a successful install of this node.
    pub hooks: Vec<Hook>,
    /// Opaque activation metadata for the triggering layer. The traversal
    /// never inspects it.
    pub trigger: Option<toml::Value>,
}

impl PackageNode {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            dependencies: Vec::new(),
            hooks: Vec::new(),
            trigger: None,
        }
    }

    /// Builder-style dependency attachment, used by tests and by callers
    /// assembling trees without a manifest.
    pub fn with_dependencies(mut self, dependencies: Vec<PackageNode>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_hooks(mut self, hooks: Vec<Hook>) -> Self {
        self.hooks = hooks;
        self
    }
}
