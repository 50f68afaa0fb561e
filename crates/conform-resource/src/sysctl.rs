use bitflags::bitflags;
use conform_domain::{Packer, ResourceKind, Unpacker};
use conform_provider::ResourceEnv;
use conform_report::{ActionOutcome, Report};

use crate::error::ResourceError;
use crate::resource::truthy;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SysctlFlags: u32 {
        const VALUE   = 1 << 0;
        const PERSIST = 1 << 1;
    }
}

const SYSCTL_TREE: &str = "/files/etc/sysctl.conf";

/// A kernel tunable: the live value under `/proc/sys` and, by default,
/// the persisted value in the sysctl configuration. The two are diffed
/// and fixed independently.
#[derive(Debug, Clone)]
pub struct SysctlRes {
    key: String,
    enforced: SysctlFlags,
    different: SysctlFlags,

    param: String,
    value: String,
    persist: bool,
}

impl SysctlRes {
    pub fn new(key: &str) -> Self {
        let mut rs = SysctlRes {
            key: key.to_string(),
            // persist values by default
            enforced: SysctlFlags::PERSIST,
            different: SysctlFlags::empty(),
            param: String::new(),
            value: String::new(),
            persist: true,
        };
        if !key.is_empty() {
            let _ = rs.set("param", key);
        }
        rs
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn conf_path(&self) -> String {
        format!("{}/{}", SYSCTL_TREE, self.param)
    }

    pub fn set(&mut self, name: &str, value: &str) -> Result<(), ResourceError> {
        match name {
            "param" => {
                self.param = value.to_string();
            }
            "value" => {
                self.value = value.to_string();
                self.enforced |= SysctlFlags::VALUE;
            }
            "persist" => {
                self.persist = truthy(value);
                if self.persist {
                    self.enforced |= SysctlFlags::PERSIST;
                } else {
                    self.enforced -= SysctlFlags::PERSIST;
                }
            }
            _ => {
                return Err(ResourceError::InvalidAttribute {
                    kind: ResourceKind::Sysctl,
                    name: name.to_string(),
                })
            }
        }
        Ok(())
    }

    pub fn matches(&self, name: &str, value: &str) -> bool {
        match name {
            "param" => self.param == value,
            _ => false,
        }
    }

    pub fn stat(&mut self, env: &mut ResourceEnv) -> Result<(), ResourceError> {
        self.different = SysctlFlags::empty();

        if self.enforced.contains(SysctlFlags::VALUE) {
            let live = env.kernel.read(&self.param)?;
            if live != self.value {
                self.different |= SysctlFlags::VALUE;
            }

            if self.enforced.contains(SysctlFlags::PERSIST) {
                let stored = env.hosts.get(&self.conf_path())?;
                if stored.as_deref() != Some(self.value.as_str()) {
                    self.different |= SysctlFlags::PERSIST;
                }
            }
        }

        Ok(())
    }

    pub fn fixup(&mut self, dryrun: bool, env: &mut ResourceEnv) -> Report {
        let mut report = Report::new(ResourceKind::Sysctl, &self.param);

        if self.different.contains(SysctlFlags::VALUE) {
            let action = format!("set kernel param to '{}' via /proc/sys", self.value);

            if dryrun {
                report.action(action, ActionOutcome::Skipped);
            } else if env.kernel.write(&self.param, &self.value).is_ok() {
                report.action(action, ActionOutcome::Succeeded);
            } else {
                report.action(action, ActionOutcome::Failed);
            }
        }

        if self.different.contains(SysctlFlags::PERSIST) {
            let action = "save setting in /etc/sysctl.conf";

            if dryrun {
                report.action(action, ActionOutcome::Skipped);
            } else if env.hosts.set(&self.conf_path(), &self.value).is_ok() {
                report.action(action, ActionOutcome::Succeeded);
            } else {
                report.action(action, ActionOutcome::Failed);
            }
        }

        report
    }

    // field order: key, enforced, param, value, persist
    pub fn pack(&self) -> String {
        Packer::new(ResourceKind::Sysctl.wire_tag())
            .str(&self.key)
            .u32(self.enforced.bits())
            .str(&self.param)
            .str(&self.value)
            .u32(self.persist as u32)
            .finish()
    }

    pub fn unpack(packed: &str) -> Result<Self, ResourceError> {
        let mut u = Unpacker::new(packed, ResourceKind::Sysctl.wire_tag())?;

        let mut rs = SysctlRes::new("");
        rs.key = u.str()?;
        rs.enforced = SysctlFlags::from_bits_truncate(u.u32()?);
        rs.param = u.str()?;
        rs.value = u.str()?;
        rs.persist = u.u32()? != 0;
        u.finish()?;

        Ok(rs)
    }
}
