use std::io::Read;

use conform_domain::Facts;

use crate::group::{GroupDb, GshadowDb, MemoryGroups, MemoryGshadow};
use crate::package::{MemoryPackages, PackageManager};
use crate::passwd::{MemoryPasswd, MemoryShadow, PasswdDb, ShadowDb};
use crate::service::{MemoryServices, ServiceManager};
use crate::sysctl::{KernelParams, MemorySysctl};
use crate::tree::{MemoryTree, TreeEditor};

/// A sized byte stream holding the master copy of the file currently being
/// reconciled. Reading fewer than `len` bytes is a failed content fix.
pub struct FileSource<'a> {
    pub reader: &'a mut dyn Read,
    pub len: u64,
}

/// The provider handles a resource may touch during `stat` and `fixup`.
///
/// Borrowed mutably by the driver for a whole run; providers must not
/// retain references to resources across calls.
pub struct ResourceEnv<'a> {
    pub passwd: &'a mut dyn PasswdDb,
    pub shadow: &'a mut dyn ShadowDb,
    pub groups: &'a mut dyn GroupDb,
    pub gshadow: &'a mut dyn GshadowDb,
    pub packages: &'a mut dyn PackageManager,
    pub services: &'a mut dyn ServiceManager,
    pub hosts: &'a mut dyn TreeEditor,
    pub kernel: &'a mut dyn KernelParams,
    pub source: Option<FileSource<'a>>,
    pub facts: &'a Facts,
}

/// One of every in-memory provider: a simulated host.
///
/// Used by tests and by the CLI for the account, package, service and
/// host-table providers (the real OS shims live outside this workspace).
#[derive(Debug, Default)]
pub struct SimulatedHost {
    pub passwd: MemoryPasswd,
    pub shadow: MemoryShadow,
    pub groups: MemoryGroups,
    pub gshadow: MemoryGshadow,
    pub packages: MemoryPackages,
    pub services: MemoryServices,
    pub hosts: MemoryTree,
    pub kernel: MemorySysctl,
    pub facts: Facts,
}

impl SimulatedHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn env(&mut self) -> ResourceEnv<'_> {
        ResourceEnv {
            passwd: &mut self.passwd,
            shadow: &mut self.shadow,
            groups: &mut self.groups,
            gshadow: &mut self.gshadow,
            packages: &mut self.packages,
            services: &mut self.services,
            hosts: &mut self.hosts,
            kernel: &mut self.kernel,
            source: None,
            facts: &self.facts,
        }
    }
}
