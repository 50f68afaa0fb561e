use bitflags::bitflags;
use conform_domain::{Packer, ResourceId, ResourceKind, Unpacker};
use conform_provider::ResourceEnv;
use conform_report::{ActionOutcome, Report};
use tracing::debug;

use crate::error::ResourceError;
use crate::resource::truthy;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ServiceFlags: u32 {
        const RUNNING  = 1 << 0;
        const STOPPED  = 1 << 1;
        const ENABLED  = 1 << 2;
        const DISABLED = 1 << 3;
    }
}

/// A managed service. RUNNING/STOPPED and ENABLED/DISABLED are mutually
/// exclusive pairs; setting one side withdraws the other. A notification
/// from a reconciled dependency schedules a reload on the next fixup.
#[derive(Debug, Clone)]
pub struct ServiceRes {
    key: String,
    enforced: ServiceFlags,
    different: ServiceFlags,

    service: String,

    // observed state
    running: bool,
    enabled: bool,
    notified: bool,
}

impl ServiceRes {
    pub fn new(key: &str) -> Self {
        let mut rs = ServiceRes {
            key: key.to_string(),
            enforced: ServiceFlags::empty(),
            different: ServiceFlags::empty(),
            service: String::new(),
            running: false,
            enabled: false,
            notified: false,
        };
        if !key.is_empty() {
            let _ = rs.set("service", key);
        }
        rs
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn set(&mut self, name: &str, value: &str) -> Result<(), ResourceError> {
        match name {
            "name" | "service" => {
                self.service = value.to_string();
            }
            "running" => {
                if truthy(value) {
                    self.enforced -= ServiceFlags::STOPPED;
                    self.enforced |= ServiceFlags::RUNNING;
                } else {
                    self.enforced -= ServiceFlags::RUNNING;
                    self.enforced |= ServiceFlags::STOPPED;
                }
            }
            "stopped" => {
                if truthy(value) {
                    self.enforced -= ServiceFlags::RUNNING;
                    self.enforced |= ServiceFlags::STOPPED;
                } else {
                    self.enforced -= ServiceFlags::STOPPED;
                    self.enforced |= ServiceFlags::RUNNING;
                }
            }
            "enabled" => {
                if truthy(value) {
                    self.enforced -= ServiceFlags::DISABLED;
                    self.enforced |= ServiceFlags::ENABLED;
                } else {
                    self.enforced -= ServiceFlags::ENABLED;
                    self.enforced |= ServiceFlags::DISABLED;
                }
            }
            "disabled" => {
                if truthy(value) {
                    self.enforced -= ServiceFlags::ENABLED;
                    self.enforced |= ServiceFlags::DISABLED;
                } else {
                    self.enforced -= ServiceFlags::DISABLED;
                    self.enforced |= ServiceFlags::ENABLED;
                }
            }
            _ => {
                return Err(ResourceError::InvalidAttribute {
                    kind: ResourceKind::Service,
                    name: name.to_string(),
                })
            }
        }
        Ok(())
    }

    pub fn matches(&self, name: &str, value: &str) -> bool {
        match name {
            "name" | "service" => self.service == value,
            _ => false,
        }
    }

    pub fn stat(&mut self, env: &mut ResourceEnv) -> Result<(), ResourceError> {
        self.enabled = env.services.enabled(&self.service)?;
        self.running = env.services.running(&self.service)?;
        self.different = ServiceFlags::empty();
        Ok(())
    }

    pub fn fixup(&mut self, dryrun: bool, env: &mut ResourceEnv) -> Report {
        let mut report = Report::new(ResourceKind::Service, &self.service);

        if self.enforced.contains(ServiceFlags::ENABLED) && !self.enabled {
            if dryrun {
                report.action("enable service", ActionOutcome::Skipped);
            } else if env.services.enable(&self.service).is_ok() {
                self.enabled = true;
                report.action("enable service", ActionOutcome::Succeeded);
            } else {
                report.action("enable service", ActionOutcome::Failed);
            }
        } else if self.enforced.contains(ServiceFlags::DISABLED) && self.enabled {
            if dryrun {
                report.action("disable service", ActionOutcome::Skipped);
            } else if env.services.disable(&self.service).is_ok() {
                self.enabled = false;
                report.action("disable service", ActionOutcome::Succeeded);
            } else {
                report.action("disable service", ActionOutcome::Failed);
            }
        }

        if self.enforced.contains(ServiceFlags::RUNNING) && !self.running {
            if dryrun {
                report.action("start service", ActionOutcome::Skipped);
            } else if env.services.start(&self.service).is_ok() {
                self.running = true;
                report.action("start service", ActionOutcome::Succeeded);
            } else {
                report.action("start service", ActionOutcome::Failed);
            }
        } else if self.enforced.contains(ServiceFlags::STOPPED) && self.running {
            if dryrun {
                report.action("stop service", ActionOutcome::Skipped);
            } else if env.services.stop(&self.service).is_ok() {
                self.running = false;
                report.action("stop service", ActionOutcome::Succeeded);
            } else {
                report.action("stop service", ActionOutcome::Failed);
            }
        } else if self.running && self.notified {
            let action = "reload service (via dependency)";
            if dryrun {
                report.action(action, ActionOutcome::Skipped);
            } else if env.services.reload(&self.service).is_ok() {
                report.action(action, ActionOutcome::Succeeded);
            } else {
                report.action(action, ActionOutcome::Failed);
            }
        }

        self.notified = false;

        report
    }

    // field order: key, enforced, service name
    pub fn pack(&self) -> String {
        Packer::new(ResourceKind::Service.wire_tag())
            .str(&self.key)
            .u32(self.enforced.bits())
            .str(&self.service)
            .finish()
    }

    pub fn unpack(packed: &str) -> Result<Self, ResourceError> {
        let mut u = Unpacker::new(packed, ResourceKind::Service.wire_tag())?;

        let mut rs = ServiceRes::new("");
        rs.key = u.str()?;
        rs.enforced = ServiceFlags::from_bits_truncate(u.u32()?);
        rs.service = u.str()?;
        u.finish()?;

        Ok(rs)
    }

    /// A dependency changed: reload on the next fixup, even when already
    /// running.
    pub fn notify(&mut self, provider: &ResourceId) {
        debug!(service = %self.service, provider = %provider, "reload scheduled");
        self.notified = true;
    }
}
