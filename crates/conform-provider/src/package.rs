use std::collections::BTreeMap;

use crate::error::ProviderError;

pub trait PackageManager {
    /// Installed version of `name`, or `None` when not installed.
    fn version(&self, name: &str) -> Result<Option<String>, ProviderError>;

    /// Install (or change to) the given version; `None` means latest.
    fn install(&mut self, name: &str, version: Option<&str>) -> Result<(), ProviderError>;

    fn remove(&mut self, name: &str) -> Result<(), ProviderError>;
}

/// In-memory package manager. `candidates` holds the version an
/// unpinned install resolves to.
#[derive(Debug, Clone, Default)]
pub struct MemoryPackages {
    installed: BTreeMap<String, String>,
    candidates: BTreeMap<String, String>,
}

impl MemoryPackages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_installed(&mut self, name: impl Into<String>, version: impl Into<String>) {
        self.installed.insert(name.into(), version.into());
    }

    pub fn set_candidate(&mut self, name: impl Into<String>, version: impl Into<String>) {
        self.candidates.insert(name.into(), version.into());
    }
}

impl PackageManager for MemoryPackages {
    fn version(&self, name: &str) -> Result<Option<String>, ProviderError> {
        Ok(self.installed.get(name).cloned())
    }

    fn install(&mut self, name: &str, version: Option<&str>) -> Result<(), ProviderError> {
        let resolved = match version {
            Some(v) => v.to_string(),
            None => self
                .candidates
                .get(name)
                .cloned()
                .ok_or_else(|| {
                    ProviderError::new("package install", format!("no candidate for '{}'", name))
                })?,
        };
        self.installed.insert(name.to_string(), resolved);
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<(), ProviderError> {
        self.installed
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| {
                ProviderError::new("package remove", format!("'{}' is not installed", name))
            })
    }
}
