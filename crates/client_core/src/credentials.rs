use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result};
use tracing::{debug, warn};

pub trait TokenStore: Send + Sync {
    fn load(&self) -> Option<String>;
    fn save(&self, token: &str) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryTokenStore {
    slot: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            slot: Mutex::new(Some(token.into())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<String> {
        let guard = self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.clone()
    }

    fn save(&self, token: &str) -> Result<()> {
        let mut guard = self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some(token.to_string());
        Ok(())
    }
}

pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Option<String> {
        let raw = fs::read_to_string(&self.path).ok()?;
        let token = raw.trim();
        (!token.is_empty()).then(|| token.to_string())
    }

    fn save(&self, token: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create token directory '{}'", parent.display())
            })?;
        }
        fs::write(&self.path, format!("{token}\n"))
            .with_context(|| format!("failed to write token file '{}'", self.path.display()))
    }
}

pub struct CredentialProvider {
    explicit: Option<String>,
    volatile: Arc<dyn TokenStore>,
    durable: Arc<dyn TokenStore>,
}

impl CredentialProvider {
    pub fn new(
        explicit: Option<String>,
        volatile: Arc<dyn TokenStore>,
        durable: Arc<dyn TokenStore>,
    ) -> Self {
        Self {
            explicit: explicit.filter(|token| !token.trim().is_empty()),
            volatile,
            durable,
        }
    }

    pub fn from_token(token: Option<String>) -> Self {
        Self::new(
            token,
            Arc::new(MemoryTokenStore::new()),
            Arc::new(MemoryTokenStore::new()),
        )
    }

    pub fn resolve(&self) -> Option<String> {
        if let Some(token) = &self.explicit {
            if let Err(err) = self.volatile.save(token) {
                warn!(%err, "credentials: failed to cache explicit token");
            }
            debug!("credentials: using explicit token");
            return Some(token.clone());
        }

        if let Some(token) = self.volatile.load() {
            if self.durable.load().as_deref() != Some(token.as_str()) {
                if let Err(err) = self.durable.save(&token) {
                    warn!(%err, "credentials: failed to backfill durable token store");
                }
            }
            debug!("credentials: using volatile token");
            return Some(token);
        }

        let token = self.durable.load();
        if token.is_some() {
            debug!("credentials: using durable token");
        }
        token
    }
}

#[cfg(test)]
#[path = "tests/credentials_tests.rs"]
mod tests;
