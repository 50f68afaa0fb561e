use bitflags::bitflags;
use conform_domain::{Dependency, Packer, ResourceId, ResourceKind, Unpacker};
use conform_provider::ResourceEnv;
use conform_report::{ActionOutcome, Report};

use crate::error::ResourceError;
use crate::file::PathMeta;
use crate::resource::{parse_mode, path_dependencies, truthy, Catalog};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DirFlags: u32 {
        const UID    = 1 << 0;
        const GID    = 1 << 1;
        const MODE   = 1 << 2;
        const ABSENT = 1 << 3;
    }
}

/// A managed directory: existence, ownership and permission bits.
#[derive(Debug, Clone)]
pub struct DirRes {
    key: String,
    enforced: DirFlags,
    different: DirFlags,

    path: String,
    owner: Option<String>,
    group: Option<String>,
    mode: u32,

    // observed / derived state
    uid: Option<u32>,
    gid: Option<u32>,
    exists: bool,
    st: Option<PathMeta>,
}

impl DirRes {
    pub fn new(key: &str) -> Self {
        let mut rd = DirRes {
            key: key.to_string(),
            enforced: DirFlags::empty(),
            different: DirFlags::empty(),
            path: String::new(),
            owner: None,
            group: None,
            mode: 0o700,
            uid: None,
            gid: None,
            exists: false,
            st: None,
        };
        if !key.is_empty() {
            let _ = rd.set("path", key);
        }
        rd
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn set(&mut self, name: &str, value: &str) -> Result<(), ResourceError> {
        match name {
            "owner" => {
                self.owner = Some(value.to_string());
                self.enforced |= DirFlags::UID;
            }
            "group" => {
                self.group = Some(value.to_string());
                self.enforced |= DirFlags::GID;
            }
            "mode" => {
                self.mode = parse_mode(name, value)?;
                self.enforced |= DirFlags::MODE;
            }
            "path" => {
                self.path = value.to_string();
            }
            "present" => {
                if truthy(value) {
                    self.enforced -= DirFlags::ABSENT;
                } else {
                    self.enforced |= DirFlags::ABSENT;
                }
            }
            _ => {
                return Err(ResourceError::InvalidAttribute {
                    kind: ResourceKind::Dir,
                    name: name.to_string(),
                })
            }
        }
        Ok(())
    }

    pub fn matches(&self, name: &str, value: &str) -> bool {
        match name {
            "path" => self.path == value,
            _ => false,
        }
    }

    /// Same dependency shape as files: owner, group, ancestor directories.
    pub fn norm(&self, catalog: &dyn Catalog) -> Result<Vec<Dependency>, ResourceError> {
        let id = ResourceId::new(ResourceKind::Dir, &self.key);
        let mut deps = Vec::new();

        if self.enforced.contains(DirFlags::UID) {
            if let Some(owner) = &self.owner {
                if let Some(provider) = catalog.find(ResourceKind::User, "username", owner) {
                    deps.push(Dependency::new(id.clone(), provider));
                }
            }
        }
        if self.enforced.contains(DirFlags::GID) {
            if let Some(group) = &self.group {
                if let Some(provider) = catalog.find(ResourceKind::Group, "name", group) {
                    deps.push(Dependency::new(id.clone(), provider));
                }
            }
        }

        deps.extend(path_dependencies(&id, &self.path, catalog));
        Ok(deps)
    }

    pub fn stat(&mut self, env: &mut ResourceEnv) -> Result<(), ResourceError> {
        if self.uid.is_none() {
            if let Some(owner) = &self.owner {
                self.uid = env.passwd.lookup_uid(owner)?;
            }
        }
        if self.gid.is_none() {
            if let Some(group) = &self.group {
                self.gid = env.groups.lookup_gid(group)?;
            }
        }

        let Some(st) = PathMeta::read(&self.path)? else {
            // new directory
            self.different = self.enforced;
            self.exists = false;
            self.st = None;
            return Ok(());
        };
        self.exists = true;
        self.st = Some(st);

        self.different = DirFlags::empty();

        if self.enforced.contains(DirFlags::UID) && self.uid != Some(st.uid) {
            self.different |= DirFlags::UID;
        }
        if self.enforced.contains(DirFlags::GID) && self.gid != Some(st.gid) {
            self.different |= DirFlags::GID;
        }
        if self.enforced.contains(DirFlags::MODE) && st.mode != self.mode {
            self.different |= DirFlags::MODE;
        }

        Ok(())
    }

    pub fn fixup(&mut self, dryrun: bool, _env: &mut ResourceEnv) -> Report {
        use std::os::unix::fs::PermissionsExt;

        let mut report = Report::new(ResourceKind::Dir, &self.path);
        let mut new_dir = false;

        if self.enforced.contains(DirFlags::ABSENT) {
            if self.exists {
                if dryrun {
                    report.action("remove directory", ActionOutcome::Skipped);
                } else if std::fs::remove_dir(&self.path).is_ok() {
                    self.exists = false;
                    report.action("remove directory", ActionOutcome::Succeeded);
                } else {
                    report.action("remove directory", ActionOutcome::Failed);
                }
            }

            return report;
        }

        if !self.exists {
            new_dir = true;

            if dryrun {
                report.action("create directory", ActionOutcome::Skipped);
            } else if std::fs::create_dir_all(&self.path).is_ok() {
                self.exists = true;
                report.action("create directory", ActionOutcome::Succeeded);
            } else {
                report.action("create directory", ActionOutcome::Failed);
                return report;
            }

            self.different = self.enforced;
        }

        if self.different.contains(DirFlags::UID) {
            let owner = self.owner.as_deref().unwrap_or("");
            let action = if new_dir {
                format!("set owner to {}({})", owner, self.uid.unwrap_or(0))
            } else {
                format!(
                    "change owner from {} to {}({})",
                    self.st.map_or(0, |s| s.uid),
                    owner,
                    self.uid.unwrap_or(0)
                )
            };

            if dryrun {
                report.action(action, ActionOutcome::Skipped);
            } else {
                let changed = self
                    .uid
                    .ok_or(())
                    .and_then(|uid| std::os::unix::fs::chown(&self.path, Some(uid), None).map_err(|_| ()));
                report.action(action, if changed.is_ok() { ActionOutcome::Succeeded } else { ActionOutcome::Failed });
            }
        }

        if self.different.contains(DirFlags::GID) {
            let group = self.group.as_deref().unwrap_or("");
            let action = if new_dir {
                format!("set group to {}({})", group, self.gid.unwrap_or(0))
            } else {
                format!(
                    "change group from {} to {}({})",
                    self.st.map_or(0, |s| s.gid),
                    group,
                    self.gid.unwrap_or(0)
                )
            };

            if dryrun {
                report.action(action, ActionOutcome::Skipped);
            } else {
                let changed = self
                    .gid
                    .ok_or(())
                    .and_then(|gid| std::os::unix::fs::chown(&self.path, None, Some(gid)).map_err(|_| ()));
                report.action(action, if changed.is_ok() { ActionOutcome::Succeeded } else { ActionOutcome::Failed });
            }
        }

        if self.different.contains(DirFlags::MODE) {
            let action = format!(
                "change permissions from {:04o} to {:04o}",
                self.st.map_or(0, |s| s.mode),
                self.mode
            );

            if dryrun {
                report.action(action, ActionOutcome::Skipped);
            } else if std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(self.mode)).is_ok()
            {
                report.action(action, ActionOutcome::Succeeded);
            } else {
                report.action(action, ActionOutcome::Failed);
            }
        }

        report
    }

    // field order: key, enforced, path, owner, group, mode
    pub fn pack(&self) -> String {
        Packer::new(ResourceKind::Dir.wire_tag())
            .str(&self.key)
            .u32(self.enforced.bits())
            .str(&self.path)
            .str(self.owner.as_deref().unwrap_or(""))
            .str(self.group.as_deref().unwrap_or(""))
            .u32(self.mode)
            .finish()
    }

    pub fn unpack(packed: &str) -> Result<Self, ResourceError> {
        let mut u = Unpacker::new(packed, ResourceKind::Dir.wire_tag())?;

        let mut rd = DirRes::new("");
        rd.key = u.str()?;
        rd.enforced = DirFlags::from_bits_truncate(u.u32()?);
        rd.path = u.str()?;
        rd.owner = Some(u.str()?).filter(|s| !s.is_empty());
        rd.group = Some(u.str()?).filter(|s| !s.is_empty());
        rd.mode = u.u32()?;
        u.finish()?;

        Ok(rd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conform_provider::SimulatedHost;

    #[test]
    fn creates_missing_directories_recursively() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("srv/www/htdocs");

        let mut sim = SimulatedHost::new();
        let mut rd = DirRes::new(target.to_str().unwrap());
        rd.set("mode", "0755").unwrap();

        rd.stat(&mut sim.env()).unwrap();
        assert_eq!(rd.different, rd.enforced);

        let report = rd.fixup(false, &mut sim.env());
        assert_eq!(
            report.summaries(),
            ["create directory", "change permissions from 0000 to 0755"]
        );
        assert!(report.compliant());
        assert!(target.is_dir());

        rd.stat(&mut sim.env()).unwrap();
        assert!(rd.different.is_empty());
    }

    #[test]
    fn mode_drift_is_corrected() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("data");
        std::fs::create_dir(&target).unwrap();
        std::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o777)).unwrap();

        let mut sim = SimulatedHost::new();
        let mut rd = DirRes::new(target.to_str().unwrap());
        rd.set("mode", "0750").unwrap();

        rd.stat(&mut sim.env()).unwrap();
        assert_eq!(rd.different, DirFlags::MODE);

        let report = rd.fixup(false, &mut sim.env());
        assert_eq!(report.summaries(), ["change permissions from 0777 to 0750"]);
        assert_eq!(PathMeta::read(target.to_str().unwrap()).unwrap().unwrap().mode, 0o750);
    }

    #[test]
    fn absent_directory_is_removed() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("obsolete");
        std::fs::create_dir(&target).unwrap();

        let mut sim = SimulatedHost::new();
        let mut rd = DirRes::new(target.to_str().unwrap());
        rd.set("present", "no").unwrap();

        rd.stat(&mut sim.env()).unwrap();
        let report = rd.fixup(false, &mut sim.env());
        assert_eq!(report.summaries(), ["remove directory"]);
        assert!(!target.exists());
    }

    #[test]
    fn dry_run_does_not_create() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("wanted");

        let mut sim = SimulatedHost::new();
        let mut rd = DirRes::new(target.to_str().unwrap());

        rd.stat(&mut sim.env()).unwrap();
        let report = rd.fixup(true, &mut sim.env());
        assert_eq!(report.summaries(), ["create directory"]);
        assert_eq!(report.actions[0].outcome, ActionOutcome::Skipped);
        assert!(!target.exists());
    }

    #[test]
    fn pack_round_trips() {
        let mut rd = DirRes::new("/srv/www");
        rd.set("owner", "web").unwrap();
        rd.set("mode", "0755").unwrap();

        let packed = rd.pack();
        let back = DirRes::unpack(&packed).unwrap();
        assert_eq!(back.key, "/srv/www");
        assert_eq!(back.enforced, rd.enforced);
        assert_eq!(back.owner.as_deref(), Some("web"));
        assert_eq!(back.group, None);
        assert_eq!(back.mode, 0o755);
        assert_eq!(back.pack(), packed);
    }
}
