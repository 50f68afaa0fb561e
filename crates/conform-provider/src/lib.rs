pub mod env;
pub mod error;
pub mod group;
pub mod package;
pub mod passwd;
pub mod service;
pub mod sysctl;
pub mod template;
pub mod tree;

pub use env::{FileSource, ResourceEnv, SimulatedHost};
pub use error::ProviderError;
pub use group::{GrEntry, GroupDb, GshadowDb, MemoryGroups, MemoryGshadow, SgEntry};
pub use package::{MemoryPackages, PackageManager};
pub use passwd::{MemoryPasswd, MemoryShadow, PasswdDb, PwEntry, ShadowDb, SpEntry};
pub use service::{MemoryServices, ServiceManager};
pub use sysctl::{KernelParams, MemorySysctl, ProcSysctl};
pub use template::{FileTemplates, TemplateRenderer};
pub use tree::{MemoryTree, TreeEditor};
