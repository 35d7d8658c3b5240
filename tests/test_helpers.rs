// Test helpers for isolated testing
// Provides an in-memory fake registry so tests never touch a real installer

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use quartermaster::{InstallHandle, QmError, Registry, Result};
use tempfile::TempDir;

#[derive(Default)]
struct Inner {
    root: PathBuf,
    installed: Mutex<HashMap<String, String>>,
    latest: Mutex<HashMap<String, String>>,
    failing: Mutex<HashSet<String>>,
    externally_installing: Mutex<HashSet<String>>,
    install_calls: Mutex<Vec<String>>,
    refresh_calls: AtomicUsize,
    install_delay: Mutex<Duration>,
}

/// In-memory [`Registry`] with scriptable install state.
///
/// Installs run on a spawned task (optionally delayed) so re-entrancy and
/// fan-in behavior can be exercised. A name marked failing ends up absent
/// after its install completes, wiping any previously installed version -
/// the "failed install still changed state" edge.
pub struct FakeRegistry {
    inner: Arc<Inner>,
    // Keeps the install root alive for the registry's lifetime
    _root: TempDir,
}

impl FakeRegistry {
    pub fn new() -> Self {
        let root = TempDir::new().expect("failed to create temp install root");
        let inner = Arc::new(Inner {
            root: root.path().to_path_buf(),
            ..Inner::default()
        });
        Self { inner, _root: root }
    }

    pub fn set_installed(&self, name: &str, version: &str) {
        self.inner
            .installed
            .lock()
            .unwrap()
            .insert(name.to_string(), version.to_string());
        std::fs::create_dir_all(self.inner.root.join(name)).unwrap();
    }

    pub fn set_latest(&self, name: &str, version: &str) {
        self.inner
            .latest
            .lock()
            .unwrap()
            .insert(name.to_string(), version.to_string());
    }

    /// Installs of `name` complete but leave the package absent.
    pub fn fail_install(&self, name: &str) {
        self.inner.failing.lock().unwrap().insert(name.to_string());
    }

    /// Report `name` as being installed by some other process.
    pub fn set_externally_installing(&self, name: &str) {
        self.inner
            .externally_installing
            .lock()
            .unwrap()
            .insert(name.to_string());
    }

    pub fn set_install_delay(&self, delay: Duration) {
        *self.inner.install_delay.lock().unwrap() = delay;
    }

    /// Names passed to `install`, in invocation order.
    pub fn install_calls(&self) -> Vec<String> {
        self.inner.install_calls.lock().unwrap().clone()
    }

    pub fn refresh_calls(&self) -> usize {
        self.inner.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn installed_now(&self, name: &str) -> Option<String> {
        self.inner.installed.lock().unwrap().get(name).cloned()
    }
}

#[async_trait]
impl Registry for FakeRegistry {
    async fn refresh(&self) -> Result<()> {
        self.inner.refresh_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn installed_version(&self, name: &str) -> Result<Option<String>> {
        Ok(self.inner.installed.lock().unwrap().get(name).cloned())
    }

    async fn latest_version(&self, name: &str) -> Result<String> {
        self.inner
            .latest
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| QmError::RegistryError(format!("no latest version for {name}")))
    }

    async fn is_installing(&self, name: &str) -> bool {
        self.inner
            .externally_installing
            .lock()
            .unwrap()
            .contains(name)
    }

    async fn install(&self, name: &str, version: &str) -> Result<InstallHandle> {
        self.inner
            .install_calls
            .lock()
            .unwrap()
            .push(name.to_string());

        let (progress, handle) = InstallHandle::channel();
        let inner = self.inner.clone();
        let name = name.to_string();
        let version = version.to_string();

        tokio::spawn(async move {
            let delay = *inner.install_delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            if inner.failing.lock().unwrap().contains(&name) {
                inner.installed.lock().unwrap().remove(&name);
                progress.diagnostic(format!("simulated install failure for {name}"));
            } else {
                inner
                    .installed
                    .lock()
                    .unwrap()
                    .insert(name.clone(), version);
                let _ = std::fs::create_dir_all(inner.root.join(&name));
            }
            progress.close();
        });

        Ok(handle)
    }

    fn install_dir(&self, name: &str) -> PathBuf {
        self.inner.root.join(name)
    }
}
