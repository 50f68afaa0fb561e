use std::collections::BTreeSet;

use crate::error::ProviderError;

pub trait ServiceManager {
    fn running(&self, name: &str) -> Result<bool, ProviderError>;
    fn enabled(&self, name: &str) -> Result<bool, ProviderError>;
    fn start(&mut self, name: &str) -> Result<(), ProviderError>;
    fn stop(&mut self, name: &str) -> Result<(), ProviderError>;
    fn enable(&mut self, name: &str) -> Result<(), ProviderError>;
    fn disable(&mut self, name: &str) -> Result<(), ProviderError>;
    fn reload(&mut self, name: &str) -> Result<(), ProviderError>;
}

/// In-memory service manager. Reloads are recorded so tests can assert
/// that a notification actually turned into one.
#[derive(Debug, Clone, Default)]
pub struct MemoryServices {
    running: BTreeSet<String>,
    enabled: BTreeSet<String>,
    reloads: Vec<String>,
}

impl MemoryServices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_running(&mut self, name: impl Into<String>) {
        self.running.insert(name.into());
    }

    pub fn set_enabled(&mut self, name: impl Into<String>) {
        self.enabled.insert(name.into());
    }

    pub fn reloaded(&self) -> &[String] {
        &self.reloads
    }
}

impl ServiceManager for MemoryServices {
    fn running(&self, name: &str) -> Result<bool, ProviderError> {
        Ok(self.running.contains(name))
    }

    fn enabled(&self, name: &str) -> Result<bool, ProviderError> {
        Ok(self.enabled.contains(name))
    }

    fn start(&mut self, name: &str) -> Result<(), ProviderError> {
        self.running.insert(name.to_string());
        Ok(())
    }

    fn stop(&mut self, name: &str) -> Result<(), ProviderError> {
        self.running.remove(name);
        Ok(())
    }

    fn enable(&mut self, name: &str) -> Result<(), ProviderError> {
        self.enabled.insert(name.to_string());
        Ok(())
    }

    fn disable(&mut self, name: &str) -> Result<(), ProviderError> {
        self.enabled.remove(name);
        Ok(())
    }

    fn reload(&mut self, name: &str) -> Result<(), ProviderError> {
        if !self.running.contains(name) {
            return Err(ProviderError::new(
                "service reload",
                format!("'{}' is not running", name),
            ));
        }
        self.reloads.push(name.to_string());
        Ok(())
    }
}
