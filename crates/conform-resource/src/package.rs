use bitflags::bitflags;
use conform_domain::{Packer, ResourceKind, Unpacker};
use conform_provider::ResourceEnv;
use conform_report::{ActionOutcome, Report};

use crate::error::ResourceError;
use crate::resource::truthy;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PackageFlags: u32 {
        const ABSENT = 1 << 0;
    }
}

/// An installed software package. Without a pinned version, install the
/// latest when missing and leave upgrades alone; with one, install or
/// upgrade until the installed version matches exactly.
#[derive(Debug, Clone)]
pub struct PackageRes {
    key: String,
    enforced: PackageFlags,
    different: PackageFlags,

    name: String,
    version: Option<String>,

    // observed state
    installed: Option<String>,
}

impl PackageRes {
    pub fn new(key: &str) -> Self {
        let mut rp = PackageRes {
            key: key.to_string(),
            enforced: PackageFlags::empty(),
            different: PackageFlags::empty(),
            name: String::new(),
            version: None,
            installed: None,
        };
        if !key.is_empty() {
            let _ = rp.set("name", key);
        }
        rp
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn set(&mut self, name: &str, value: &str) -> Result<(), ResourceError> {
        match name {
            "name" => {
                self.name = value.to_string();
            }
            "version" => {
                self.version = Some(value.to_string());
            }
            "installed" => {
                if truthy(value) {
                    self.enforced -= PackageFlags::ABSENT;
                } else {
                    self.enforced |= PackageFlags::ABSENT;
                }
            }
            _ => {
                return Err(ResourceError::InvalidAttribute {
                    kind: ResourceKind::Package,
                    name: name.to_string(),
                })
            }
        }
        Ok(())
    }

    pub fn matches(&self, name: &str, value: &str) -> bool {
        match name {
            "name" => self.name == value,
            _ => false,
        }
    }

    pub fn stat(&mut self, env: &mut ResourceEnv) -> Result<(), ResourceError> {
        self.installed = env.packages.version(&self.name)?;
        self.different = PackageFlags::empty();
        Ok(())
    }

    pub fn fixup(&mut self, dryrun: bool, env: &mut ResourceEnv) -> Report {
        let mut report = Report::new(ResourceKind::Package, &self.name);

        if self.enforced.contains(PackageFlags::ABSENT) {
            if self.installed.is_some() {
                if dryrun {
                    report.action("uninstall package", ActionOutcome::Skipped);
                } else if env.packages.remove(&self.name).is_ok() {
                    self.installed = None;
                    report.action("uninstall package", ActionOutcome::Succeeded);
                } else {
                    report.action("uninstall package", ActionOutcome::Failed);
                }
            }

            return report;
        }

        if self.installed.is_none() {
            let action = match &self.version {
                Some(v) => format!("install package v{}", v),
                None => "install package (latest version)".to_string(),
            };

            if dryrun {
                report.action(action, ActionOutcome::Skipped);
            } else if env.packages.install(&self.name, self.version.as_deref()).is_ok() {
                self.installed = env.packages.version(&self.name).ok().flatten();
                report.action(action, ActionOutcome::Succeeded);
            } else {
                report.action(action, ActionOutcome::Failed);
            }

            return report;
        }

        if let Some(version) = &self.version {
            if self.installed.as_deref() != Some(version.as_str()) {
                let action = format!("upgrade to v{}", version);

                if dryrun {
                    report.action(action, ActionOutcome::Skipped);
                } else if env.packages.install(&self.name, Some(version)).is_ok() {
                    self.installed = Some(version.clone());
                    report.action(action, ActionOutcome::Succeeded);
                } else {
                    report.action(action, ActionOutcome::Failed);
                }
            }
        }

        report
    }

    // field order: key, enforced, name, version ("" = unpinned)
    pub fn pack(&self) -> String {
        Packer::new(ResourceKind::Package.wire_tag())
            .str(&self.key)
            .u32(self.enforced.bits())
            .str(&self.name)
            .str(self.version.as_deref().unwrap_or(""))
            .finish()
    }

    pub fn unpack(packed: &str) -> Result<Self, ResourceError> {
        let mut u = Unpacker::new(packed, ResourceKind::Package.wire_tag())?;

        let mut rp = PackageRes::new("");
        rp.key = u.str()?;
        rp.enforced = PackageFlags::from_bits_truncate(u.u32()?);
        rp.name = u.str()?;
        rp.version = Some(u.str()?).filter(|s| !s.is_empty());
        u.finish()?;

        Ok(rp)
    }
}
