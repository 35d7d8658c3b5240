//! Declarative manifest: parsing, validation, and lowering to package trees.
//!
//! A manifest is a TOML document with a `[registry]` table describing how to
//! reach the external installer and one `[packages.<name>]` table per
//! declared package:
//!
//! ```toml
//! [registry]
//! root = "~/.local/share/quartermaster/packages"
//! installed = ["tool-shed", "query", "{name}"]
//! latest = ["tool-shed", "latest", "{name}"]
//! install = ["tool-shed", "install", "{name}", "{version}"]
//! refresh = ["tool-shed", "refresh"]
//!
//! [packages.lua-language-server]
//! version = "3.9.0"
//! dependencies = ["stylua"]
//! run = [["./install-helpers", "--quiet"]]
//!
//! [packages.stylua]
//! # no version pin: resolves to the registry's latest at tree build time
//! ```
//!
//! Validation happens before any tree is built; the traversal consumes an
//! already-validated tree. Manifest hooks are always command hooks;
//! callback hooks exist only on the library API.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use serde::Deserialize;

use crate::error::{QmError, Result};
use crate::package::{Hook, PackageNode};
use crate::registry::Registry;

/// Command templates for the bundled registry adapter. `{name}` and
/// `{version}` placeholders are substituted per call.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryConfig {
    /// Directory packages are installed under, one subdirectory per name.
    pub root: Option<PathBuf>,
    /// Prints the installed version of `{name}` on stdout; non-zero exit or
    /// empty output means not installed.
    pub installed: Option<Vec<String>>,
    /// Prints the latest available version of `{name}` on stdout.
    pub latest: Option<Vec<String>>,
    /// Installs `{name}` at `{version}`.
    pub install: Option<Vec<String>>,
    /// Refreshes registry metadata; optional.
    pub refresh: Option<Vec<String>>,
}

/// One `[packages.<name>]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageSpec {
    /// Target version; omitted means latest, resolved at tree build time.
    pub version: Option<String>,
    /// Names of other declared packages, installed before this one.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Post-install commands, each an argv array.
    #[serde(default)]
    pub run: Vec<Vec<String>>,
    /// Opaque activation metadata, passed through to the triggering layer.
    pub trigger: Option<toml::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub packages: BTreeMap<String, PackageSpec>,
}

impl Manifest {
    pub fn parse(text: &str) -> Result<Self> {
        let manifest: Manifest = toml::from_str(text)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Structural validation: every dependency must name a declared package,
    /// the dependency graph must be acyclic, hook argvs and version pins
    /// must be non-empty.
    pub fn validate(&self) -> Result<()> {
        for (name, spec) in &self.packages {
            if name.is_empty() {
                return Err(QmError::ManifestError("empty package name".to_string()));
            }
            if let Some(version) = &spec.version {
                if version.is_empty() {
                    return Err(QmError::ManifestError(format!(
                        "package {name} has an empty version pin"
                    )));
                }
            }
            for argv in &spec.run {
                if argv.is_empty() || argv[0].is_empty() {
                    return Err(QmError::ManifestError(format!(
                        "package {name} has a post-install command with no executable"
                    )));
                }
            }
            for dep in &spec.dependencies {
                if !self.packages.contains_key(dep) {
                    return Err(QmError::ManifestError(format!(
                        "package {name} depends on undeclared package {dep}"
                    )));
                }
            }
        }

        self.check_acyclic()
    }

    /// Kahn's algorithm over the declared dependency graph; anything left
    /// unordered is part of a cycle.
    fn check_acyclic(&self) -> Result<()> {
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

        for (name, spec) in &self.packages {
            in_degree.entry(name).or_insert(0);
            for dep in &spec.dependencies {
                dependents.entry(dep).or_default().push(name);
                *in_degree.entry(name).or_insert(0) += 1;
            }
        }

        let mut queue: Vec<&str> = in_degree
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut ordered = 0usize;

        while let Some(name) = queue.pop() {
            ordered += 1;
            if let Some(children) = dependents.get(name) {
                for &child in children {
                    let count = in_degree.get_mut(child).expect("declared package");
                    *count -= 1;
                    if *count == 0 {
                        queue.push(child);
                    }
                }
            }
        }

        if ordered != self.packages.len() {
            let mut stuck: Vec<&str> = in_degree
                .iter()
                .filter(|(_, count)| **count > 0)
                .map(|(name, _)| *name)
                .collect();
            stuck.sort_unstable();
            return Err(QmError::ManifestError(format!(
                "dependency cycle involving: {}",
                stuck.join(", ")
            )));
        }

        Ok(())
    }

    /// Declared packages that no other package depends on. These are the
    /// default targets of `qm ensure`.
    pub fn roots(&self) -> Vec<&str> {
        let depended_on: HashSet<&str> = self
            .packages
            .values()
            .flat_map(|spec| spec.dependencies.iter().map(String::as_str))
            .collect();
        self.packages
            .keys()
            .map(String::as_str)
            .filter(|name| !depended_on.contains(name))
            .collect()
    }
}

/// Lower one declared package into a [`PackageNode`] tree.
///
/// Each dependency edge gets its own independent node, so a package
/// appearing under multiple parents is materialized once per occurrence.
/// Unpinned versions resolve to the registry's latest here, never during a
/// traversal.
pub async fn build_tree(
    manifest: &Manifest,
    name: &str,
    registry: &dyn Registry,
) -> Result<PackageNode> {
    build_node(manifest, name, registry).await
}

fn build_node<'a>(
    manifest: &'a Manifest,
    name: &'a str,
    registry: &'a dyn Registry,
) -> BoxFuture<'a, Result<PackageNode>> {
    Box::pin(async move {
        let spec = manifest
            .packages
            .get(name)
            .ok_or_else(|| QmError::PackageNotFound(name.to_string()))?;

        let version = match &spec.version {
            Some(version) => version.clone(),
            None => registry.latest_version(name).await?,
        };

        let mut dependencies = Vec::with_capacity(spec.dependencies.len());
        for dep in &spec.dependencies {
            dependencies.push(build_node(manifest, dep, registry).await?);
        }

        let hooks = spec
            .run
            .iter()
            .map(|argv| Hook::Command(argv.clone()))
            .collect();

        Ok(PackageNode {
            name: name.to_string(),
            version,
            dependencies,
            hooks,
            trigger: spec.trigger.clone(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [registry]
        install = ["tool-shed", "install", "{name}", "{version}"]
        installed = ["tool-shed", "query", "{name}"]

        [packages.lua-language-server]
        version = "3.9.0"
        dependencies = ["stylua"]
        run = [["./post-install", "--quiet"]]

        [packages.stylua]
        version = "0.20.0"

        [packages.shellcheck]
        version = "0.10.0"
        trigger = { filetypes = ["sh", "bash"] }
    "#;

    #[test]
    fn test_parse_sample() {
        let manifest = Manifest::parse(SAMPLE).unwrap();
        assert_eq!(manifest.packages.len(), 3);
        let lls = &manifest.packages["lua-language-server"];
        assert_eq!(lls.version.as_deref(), Some("3.9.0"));
        assert_eq!(lls.dependencies, vec!["stylua"]);
        assert_eq!(lls.run.len(), 1);
        assert!(manifest.packages["shellcheck"].trigger.is_some());
    }

    #[test]
    fn test_roots_exclude_depended_on_packages() {
        let manifest = Manifest::parse(SAMPLE).unwrap();
        let roots = manifest.roots();
        assert!(roots.contains(&"lua-language-server"));
        assert!(roots.contains(&"shellcheck"));
        assert!(!roots.contains(&"stylua"));
    }

    #[test]
    fn test_undeclared_dependency_is_rejected() {
        let err = Manifest::parse(
            r#"
            [packages.a]
            dependencies = ["missing"]
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("undeclared"));
    }

    #[test]
    fn test_dependency_cycle_is_rejected() {
        let err = Manifest::parse(
            r#"
            [packages.a]
            dependencies = ["b"]
            [packages.b]
            dependencies = ["c"]
            [packages.c]
            dependencies = ["a"]
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_shared_dependency_is_not_a_cycle() {
        // Diamond: a -> b, a -> c, b -> d, c -> d.
        Manifest::parse(
            r#"
            [packages.a]
            dependencies = ["b", "c"]
            [packages.b]
            dependencies = ["d"]
            [packages.c]
            dependencies = ["d"]
            [packages.d]
            "#,
        )
        .unwrap();
    }

    #[test]
    fn test_empty_hook_argv_is_rejected() {
        let err = Manifest::parse(
            r#"
            [packages.a]
            run = [[]]
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("no executable"));
    }

    #[test]
    fn test_empty_version_pin_is_rejected() {
        let err = Manifest::parse(
            r#"
            [packages.a]
            version = ""
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("empty version"));
    }
}
