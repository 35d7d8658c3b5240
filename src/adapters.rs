//! Bundled [`Registry`] implementation that delegates to external commands.
//!
//! Quartermaster never installs anything itself. This adapter reaches the
//! real installer through the command templates configured in the
//! manifest's `[registry]` table, substituting `{name}` and `{version}` per
//! call. Version queries run through the [`ProcessRunner`] capability;
//! `install` spawns the child directly so its stderr can be streamed into
//! the [`InstallHandle`] line by line.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::{QmError, Result};
use crate::manifest::RegistryConfig;
use crate::process::ProcessRunner;
use crate::registry::{InstallHandle, Registry};

/// Substitute `{name}`/`{version}` placeholders into a command template.
fn render(template: &[String], name: &str, version: &str) -> Vec<String> {
    template
        .iter()
        .map(|token| token.replace("{name}", name).replace("{version}", version))
        .collect()
}

/// Default install root: `$QUARTERMASTER_ROOT`, then the platform data dir.
fn default_root() -> PathBuf {
    if let Ok(root) = std::env::var("QUARTERMASTER_ROOT") {
        return PathBuf::from(root);
    }
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("quartermaster")
        .join("packages")
}

pub struct CommandRegistry {
    installed: Vec<String>,
    latest: Option<Vec<String>>,
    install: Vec<String>,
    refresh: Option<Vec<String>>,
    root: PathBuf,
    process: Arc<dyn ProcessRunner>,
    installing: Arc<Mutex<HashSet<String>>>,
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("installed", &self.installed)
            .field("latest", &self.latest)
            .field("install", &self.install)
            .field("refresh", &self.refresh)
            .field("root", &self.root)
            .field("installing", &self.installing)
            .finish_non_exhaustive()
    }
}

impl CommandRegistry {
    pub fn new(config: RegistryConfig, process: Arc<dyn ProcessRunner>) -> Result<Self> {
        let installed = config.installed.ok_or_else(|| {
            QmError::ManifestError("registry.installed command template is required".to_string())
        })?;
        let install = config.install.ok_or_else(|| {
            QmError::ManifestError("registry.install command template is required".to_string())
        })?;
        if installed.is_empty() || install.is_empty() {
            return Err(QmError::ManifestError(
                "registry command templates must not be empty".to_string(),
            ));
        }

        Ok(Self {
            installed,
            latest: config.latest,
            install,
            refresh: config.refresh,
            root: config.root.unwrap_or_else(default_root),
            process,
            installing: Arc::new(Mutex::new(HashSet::new())),
        })
    }
}

#[async_trait]
impl Registry for CommandRegistry {
    async fn refresh(&self) -> Result<()> {
        let Some(template) = &self.refresh else {
            return Ok(());
        };
        // Queries run from the current directory; the install root may not
        // exist until the first install.
        let output = self.process.run(template, Path::new(".")).await?;
        if output.success() {
            Ok(())
        } else {
            Err(QmError::RegistryError(format!(
                "refresh command failed: {}",
                output.stderr.trim_end()
            )))
        }
    }

    async fn installed_version(&self, name: &str) -> Result<Option<String>> {
        let argv = render(&self.installed, name, "");
        let output = self.process.run(&argv, Path::new(".")).await?;
        if !output.success() {
            return Ok(None);
        }
        let version = output.stdout.trim();
        if version.is_empty() {
            Ok(None)
        } else {
            Ok(Some(version.to_string()))
        }
    }

    async fn latest_version(&self, name: &str) -> Result<String> {
        let Some(template) = &self.latest else {
            return Err(QmError::RegistryError(format!(
                "no registry.latest command template configured, pin a version for {name}"
            )));
        };
        let argv = render(template, name, "");
        let output = self.process.run(&argv, Path::new(".")).await?;
        if !output.success() {
            return Err(QmError::RegistryError(format!(
                "latest-version query failed for {name}: {}",
                output.stderr.trim_end()
            )));
        }
        let version = output.stdout.trim();
        if version.is_empty() {
            return Err(QmError::RegistryError(format!(
                "latest-version query returned nothing for {name}"
            )));
        }
        Ok(version.to_string())
    }

    async fn is_installing(&self, name: &str) -> bool {
        self.installing
            .lock()
            .expect("installing lock poisoned")
            .contains(name)
    }

    async fn install(&self, name: &str, version: &str) -> Result<InstallHandle> {
        let argv = render(&self.install, name, version);
        let (program, args) = argv.split_first().ok_or_else(|| {
            QmError::ManifestError("registry.install command template is empty".to_string())
        })?;

        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                QmError::RegistryError(format!("failed to spawn installer for {name}: {err}"))
            })?;

        self.installing
            .lock()
            .expect("installing lock poisoned")
            .insert(name.to_string());

        let (progress, handle) = InstallHandle::channel();
        let stderr = child.stderr.take();
        let installing = self.installing.clone();
        let name = name.to_string();

        tokio::spawn(async move {
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    progress.diagnostic(line);
                }
            }
            match child.wait().await {
                Ok(status) if !status.success() => {
                    progress.diagnostic(format!("installer exited with {status}"));
                }
                Err(err) => {
                    progress.diagnostic(format!("failed to wait for installer: {err}"));
                }
                Ok(_) => {}
            }
            installing
                .lock()
                .expect("installing lock poisoned")
                .remove(&name);
            progress.close();
        });

        Ok(handle)
    }

    fn install_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::TokioProcessRunner;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    fn config() -> RegistryConfig {
        RegistryConfig {
            root: Some(PathBuf::from("/tmp")),
            installed: Some(argv(&["echo", "1.0.0"])),
            latest: Some(argv(&["echo", "2.0.0"])),
            install: Some(argv(&["true", "{name}", "{version}"])),
            refresh: None,
        }
    }

    #[test]
    fn test_render_substitutes_placeholders() {
        let rendered = render(
            &argv(&["tool-shed", "install", "{name}", "{version}"]),
            "stylua",
            "0.20.0",
        );
        assert_eq!(rendered, argv(&["tool-shed", "install", "stylua", "0.20.0"]));
    }

    #[test]
    fn test_missing_install_template_is_rejected() {
        let mut config = config();
        config.install = None;
        let err = CommandRegistry::new(config, Arc::new(TokioProcessRunner)).unwrap_err();
        assert!(err.to_string().contains("registry.install"));
    }

    #[tokio::test]
    async fn test_installed_version_trims_stdout() {
        let registry = CommandRegistry::new(config(), Arc::new(TokioProcessRunner)).unwrap();
        let version = registry.installed_version("stylua").await.unwrap();
        assert_eq!(version.as_deref(), Some("1.0.0"));
    }

    #[tokio::test]
    async fn test_failed_query_means_not_installed() {
        let mut config = config();
        config.installed = Some(argv(&["false"]));
        let registry = CommandRegistry::new(config, Arc::new(TokioProcessRunner)).unwrap();
        assert_eq!(registry.installed_version("stylua").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_latest_template_is_an_error() {
        let mut config = config();
        config.latest = None;
        let registry = CommandRegistry::new(config, Arc::new(TokioProcessRunner)).unwrap();
        assert!(registry.latest_version("stylua").await.is_err());
    }

    #[tokio::test]
    async fn test_install_streams_stderr_and_closes() {
        let mut config = config();
        config.install = Some(argv(&["sh", "-c", "echo downloading {name} >&2; exit 1"]));
        let registry = CommandRegistry::new(config, Arc::new(TokioProcessRunner)).unwrap();
        let handle = registry.install("stylua", "0.20.0").await.unwrap();
        let captured = handle.wait().await;
        assert!(captured.contains("downloading stylua"));
        assert!(captured.contains("installer exited with"));
        assert!(!registry.is_installing("stylua").await);
    }

    #[test]
    fn test_install_dir_is_per_package() {
        let registry = CommandRegistry::new(config(), Arc::new(TokioProcessRunner)).unwrap();
        assert_eq!(
            registry.install_dir("stylua"),
            PathBuf::from("/tmp/stylua")
        );
    }
}
