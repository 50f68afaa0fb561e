use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::debug;

use crate::error::ProviderError;

/// Live kernel tunables. Parameters use dotted names (`vm.swappiness`).
pub trait KernelParams {
    fn read(&self, param: &str) -> Result<String, ProviderError>;
    fn write(&mut self, param: &str, value: &str) -> Result<(), ProviderError>;
}

/// Reads and writes kernel parameters through `/proc/sys`, mapping dots in
/// the parameter name to path separators.
#[derive(Debug, Clone, Default)]
pub struct ProcSysctl;

impl ProcSysctl {
    pub fn new() -> Self {
        Self
    }

    fn path(param: &str) -> PathBuf {
        PathBuf::from(format!("/proc/sys/{}", param.replace('.', "/")))
    }
}

/// Normalize a raw `/proc/sys` read: tabs become spaces, the value ends at
/// the first newline.
fn normalize(raw: &str) -> String {
    let line = raw.split('\n').next().unwrap_or("");
    line.replace('\t', " ")
}

impl KernelParams for ProcSysctl {
    fn read(&self, param: &str) -> Result<String, ProviderError> {
        let raw = std::fs::read_to_string(Self::path(param))
            .map_err(|e| ProviderError::new("sysctl read", format!("{}: {}", param, e)))?;
        Ok(normalize(&raw))
    }

    fn write(&mut self, param: &str, value: &str) -> Result<(), ProviderError> {
        let path = Self::path(param);
        debug!(param, value, path = %path.display(), "writing kernel parameter");
        std::fs::write(path, value)
            .map_err(|e| ProviderError::new("sysctl write", format!("{}: {}", param, e)))
    }
}

/// In-memory kernel parameters for tests and the simulated host.
#[derive(Debug, Clone, Default)]
pub struct MemorySysctl {
    params: BTreeMap<String, String>,
}

impl MemorySysctl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, param: impl Into<String>, value: impl Into<String>) {
        self.params.insert(param.into(), value.into());
    }
}

impl KernelParams for MemorySysctl {
    fn read(&self, param: &str) -> Result<String, ProviderError> {
        self.params
            .get(param)
            .cloned()
            .ok_or_else(|| ProviderError::new("sysctl read", format!("no such parameter '{}'", param)))
    }

    fn write(&mut self, param: &str, value: &str) -> Result<(), ProviderError> {
        self.params.insert(param.to_string(), value.to_string());
        Ok(())
    }
}
