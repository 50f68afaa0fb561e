use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::Path;

use bitflags::bitflags;
use conform_domain::{ContentHash, Dependency, Facts, Packer, ResourceKind, Unpacker};
use conform_provider::{ResourceEnv, TemplateRenderer};
use conform_report::{ActionOutcome, Report};
use tracing::debug;

use crate::error::ResourceError;
use crate::resource::{parse_mode, path_dependencies, truthy, Catalog};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FileFlags: u32 {
        const UID    = 1 << 0;
        const GID    = 1 << 1;
        const MODE   = 1 << 2;
        const SHA1   = 1 << 3;
        const ABSENT = 1 << 4;
    }
}

/// Observed permission bits and ownership of an existing path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PathMeta {
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
}

impl PathMeta {
    pub(crate) fn read(path: &str) -> std::io::Result<Option<PathMeta>> {
        use std::os::unix::fs::MetadataExt;
        match std::fs::metadata(path) {
            Ok(md) => Ok(Some(PathMeta {
                uid: md.uid(),
                gid: md.gid(),
                mode: md.mode() & 0o7777,
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// A managed file: ownership, permission bits, and content pinned to the
/// SHA-1 of a master copy or a rendered template.
#[derive(Debug, Clone)]
pub struct FileRes {
    key: String,
    enforced: FileFlags,
    different: FileFlags,

    path: String,
    owner: Option<String>,
    group: Option<String>,
    mode: u32,
    source: Option<String>,
    template: Option<String>,
    rhash: ContentHash,

    // observed / derived state
    uid: Option<u32>,
    gid: Option<u32>,
    lhash: ContentHash,
    rendered: Option<Vec<u8>>,
    exists: bool,
    st: Option<PathMeta>,
}

impl FileRes {
    pub fn new(key: &str) -> Self {
        let mut rf = FileRes {
            key: key.to_string(),
            enforced: FileFlags::empty(),
            different: FileFlags::empty(),
            path: String::new(),
            owner: None,
            group: None,
            mode: 0o600,
            source: None,
            template: None,
            rhash: ContentHash::default(),
            uid: None,
            gid: None,
            lhash: ContentHash::default(),
            rendered: None,
            exists: false,
            st: None,
        };
        if !key.is_empty() {
            let _ = rf.set("path", key);
        }
        rf
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn set(&mut self, name: &str, value: &str) -> Result<(), ResourceError> {
        match name {
            "owner" => {
                self.owner = Some(value.to_string());
                self.enforced |= FileFlags::UID;
            }
            "group" => {
                self.group = Some(value.to_string());
                self.enforced |= FileFlags::GID;
            }
            "mode" => {
                self.mode = parse_mode(name, value)?;
                self.enforced |= FileFlags::MODE;
            }
            "source" => {
                self.template = None;
                self.source = Some(value.to_string());
                self.enforced |= FileFlags::SHA1;
            }
            "template" => {
                self.source = None;
                self.template = Some(value.to_string());
                self.enforced |= FileFlags::SHA1;
            }
            "path" => {
                self.path = value.to_string();
            }
            "present" => {
                if truthy(value) {
                    self.enforced -= FileFlags::ABSENT;
                } else {
                    self.enforced |= FileFlags::ABSENT;
                }
            }
            _ => {
                return Err(ResourceError::InvalidAttribute {
                    kind: ResourceKind::File,
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

    /// Files depend on their owner user, their group, and every dir
    /// resource between them and the root.
    pub fn norm(&self, catalog: &dyn Catalog) -> Result<Vec<Dependency>, ResourceError> {
        let id = conform_domain::ResourceId::new(ResourceKind::File, &self.key);
        let mut deps = Vec::new();

        if self.enforced.contains(FileFlags::UID) {
            if let Some(owner) = &self.owner {
                if let Some(provider) = catalog.find(ResourceKind::User, "username", owner) {
                    deps.push(Dependency::new(id.clone(), provider));
                }
            }
        }
        if self.enforced.contains(FileFlags::GID) {
            if let Some(group) = &self.group {
                if let Some(provider) = catalog.find(ResourceKind::Group, "name", group) {
                    deps.push(Dependency::new(id.clone(), provider));
                }
            }
        }

        deps.extend(path_dependencies(&id, &self.path, catalog));
        Ok(deps)
    }

    /// Precompute the desired content hash from the master copy or the
    /// rendered template.
    pub fn prepare(
        &mut self,
        facts: &Facts,
        templates: &dyn TemplateRenderer,
    ) -> Result<(), ResourceError> {
        if let Some(source) = &self.source {
            self.rhash = ContentHash::of_file(Path::new(source))?;
        } else if let Some(template) = &self.template {
            let bytes = templates.render(Path::new(template), facts)?;
            self.rhash = ContentHash::of(&bytes);
            self.rendered = Some(bytes);
        }
        Ok(())
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
            // new file
            self.different = self.enforced;
            self.exists = false;
            self.st = None;
            return Ok(());
        };
        self.exists = true;
        self.st = Some(st);

        // checksums are only worth computing when content is enforced
        if self.enforced.contains(FileFlags::SHA1) {
            self.lhash = ContentHash::of_file(Path::new(&self.path))?;
        }

        self.different = FileFlags::empty();

        if self.enforced.contains(FileFlags::UID) && self.uid != Some(st.uid) {
            self.different |= FileFlags::UID;
        }
        if self.enforced.contains(FileFlags::GID) && self.gid != Some(st.gid) {
            self.different |= FileFlags::GID;
        }
        if self.enforced.contains(FileFlags::MODE) && st.mode != self.mode {
            self.different |= FileFlags::MODE;
        }
        if self.enforced.contains(FileFlags::SHA1) && self.rhash != self.lhash {
            self.different |= FileFlags::SHA1;
        }

        Ok(())
    }

    pub fn fixup(&mut self, dryrun: bool, env: &mut ResourceEnv) -> Report {
        use std::os::unix::fs::OpenOptionsExt;
        use std::os::unix::fs::PermissionsExt;

        let mut report = Report::new(ResourceKind::File, &self.path);
        let mut new_file = false;

        if self.enforced.contains(FileFlags::ABSENT) {
            if self.exists {
                if dryrun {
                    report.action("remove file", ActionOutcome::Skipped);
                } else if std::fs::remove_file(&self.path).is_ok() {
                    self.exists = false;
                    report.action("remove file", ActionOutcome::Succeeded);
                } else {
                    report.action("remove file", ActionOutcome::Failed);
                }
            }

            return report;
        }

        if !self.exists {
            new_file = true;

            if dryrun {
                report.action("create file", ActionOutcome::Skipped);
            } else {
                let created = Path::new(&self.path)
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map_or(Ok(()), std::fs::create_dir_all)
                    .and_then(|_| {
                        OpenOptions::new()
                            .write(true)
                            .create(true)
                            .truncate(true)
                            .mode(self.mode)
                            .open(&self.path)
                    });
                match created {
                    Ok(_) => {
                        self.exists = true;
                        report.action("create file", ActionOutcome::Succeeded);
                    }
                    Err(e) => {
                        debug!(path = %self.path, error = %e, "file creation failed");
                        report.action("create file", ActionOutcome::Failed);
                        return report;
                    }
                }
            }

            self.different = self.enforced;
            // created with the target mode already
            self.different -= FileFlags::MODE;
        }

        if self.different.contains(FileFlags::SHA1) {
            let action = "update content from master copy";

            if dryrun {
                report.action(action, ActionOutcome::Skipped);
            } else if self.write_content(env).is_ok() {
                self.lhash = self.rhash;
                report.action(action, ActionOutcome::Succeeded);
            } else {
                report.action(action, ActionOutcome::Failed);
            }
        }

        if self.different.contains(FileFlags::UID) {
            let owner = self.owner.as_deref().unwrap_or("");
            let action = if new_file {
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

        if self.different.contains(FileFlags::GID) {
            let group = self.group.as_deref().unwrap_or("");
            let action = if new_file {
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

        if self.different.contains(FileFlags::MODE) {
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

    /// Replace the local file's bytes from the best available source: the
    /// environment's sized stream, the rendered template, or the master
    /// copy on disk. A short stream is an error.
    fn write_content(&mut self, env: &mut ResourceEnv) -> Result<(), ResourceError> {
        let mut local = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)?;

        if let Some(src) = env.source.as_mut() {
            let mut limited = (&mut *src.reader).take(src.len);
            let copied = std::io::copy(&mut limited, &mut local)?;
            if copied != src.len {
                return Err(ResourceError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("short read from master copy: {} of {} bytes", copied, src.len),
                )));
            }
            return Ok(());
        }

        if let Some(bytes) = &self.rendered {
            local.write_all(bytes)?;
            return Ok(());
        }

        if let Some(source) = &self.source {
            let mut master = std::fs::File::open(source)?;
            std::io::copy(&mut master, &mut local)?;
            return Ok(());
        }

        Err(ResourceError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no master copy available for content update",
        )))
    }

    // field order: key, enforced, path, source hash (hex), owner, group, mode
    pub fn pack(&self) -> String {
        Packer::new(ResourceKind::File.wire_tag())
            .str(&self.key)
            .u32(self.enforced.bits())
            .str(&self.path)
            .str(&self.rhash.to_string())
            .str(self.owner.as_deref().unwrap_or(""))
            .str(self.group.as_deref().unwrap_or(""))
            .u32(self.mode)
            .finish()
    }

    pub fn unpack(packed: &str) -> Result<Self, ResourceError> {
        let mut u = Unpacker::new(packed, ResourceKind::File.wire_tag())?;

        let mut rf = FileRes::new("");
        rf.key = u.str()?;
        rf.enforced = FileFlags::from_bits_truncate(u.u32()?);
        rf.path = u.str()?;
        let hex = u.str()?;
        rf.rhash = ContentHash::from_hex(&hex).ok_or(conform_domain::CodecError::Malformed {
            what: "content hash",
            found: hex,
        })?;
        rf.owner = Some(u.str()?).filter(|s| !s.is_empty());
        rf.group = Some(u.str()?).filter(|s| !s.is_empty());
        rf.mode = u.u32()?;
        u.finish()?;

        Ok(rf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conform_provider::{FileSource, FileTemplates, SimulatedHost};

    fn write(path: &Path, content: &str) {
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn content_drift_is_detected_and_fixed() {
        let tmp = tempfile::tempdir().unwrap();
        let master = tmp.path().join("motd.master");
        let local = tmp.path().join("motd");
        write(&master, "all systems nominal\n");
        write(&local, "stale banner\n");

        let mut sim = SimulatedHost::new();
        let mut rf = FileRes::new(local.to_str().unwrap());
        rf.set("source", master.to_str().unwrap()).unwrap();

        rf.prepare(&sim.facts.clone(), &FileTemplates::new()).unwrap();
        rf.stat(&mut sim.env()).unwrap();
        assert_eq!(rf.different, FileFlags::SHA1);

        let report = rf.fixup(false, &mut sim.env());
        assert_eq!(report.summaries(), ["update content from master copy"]);
        assert!(report.compliant());
        assert_eq!(std::fs::read_to_string(&local).unwrap(), "all systems nominal\n");

        // converged
        rf.stat(&mut sim.env()).unwrap();
        assert!(rf.different.is_empty());
        assert!(rf.fixup(false, &mut sim.env()).actions.is_empty());
    }

    #[test]
    fn content_streams_from_the_environment_source() {
        let tmp = tempfile::tempdir().unwrap();
        let local = tmp.path().join("issue");
        write(&local, "old\n");

        let payload = b"conform managed\n";
        let mut sim = SimulatedHost::new();
        let mut rf = FileRes::new(local.to_str().unwrap());
        rf.set("source", "/dev/null").unwrap();
        rf.rhash = ContentHash::of(payload);

        rf.stat(&mut sim.env()).unwrap();
        assert!(rf.different.contains(FileFlags::SHA1));

        let mut reader: &[u8] = payload;
        let mut env = sim.env();
        env.source = Some(FileSource { reader: &mut reader, len: payload.len() as u64 });
        let report = rf.fixup(false, &mut env);

        assert!(report.compliant());
        assert_eq!(std::fs::read(&local).unwrap(), payload);
    }

    #[test]
    fn short_source_stream_fails_the_action() {
        let tmp = tempfile::tempdir().unwrap();
        let local = tmp.path().join("issue");
        write(&local, "old\n");

        let payload = b"too short";
        let mut sim = SimulatedHost::new();
        let mut rf = FileRes::new(local.to_str().unwrap());
        rf.set("source", "/dev/null").unwrap();
        rf.rhash = ContentHash::of(b"expected content");

        rf.stat(&mut sim.env()).unwrap();

        let mut reader: &[u8] = payload;
        let mut env = sim.env();
        env.source = Some(FileSource { reader: &mut reader, len: 1000 });
        let report = rf.fixup(false, &mut env);

        assert_eq!(report.actions[0].outcome, ActionOutcome::Failed);
    }

    #[test]
    fn mode_is_not_reapplied_to_a_freshly_created_file() {
        let tmp = tempfile::tempdir().unwrap();
        let local = tmp.path().join("sub/app.conf");
        let master = tmp.path().join("app.conf.master");
        write(&master, "key = value\n");

        let mut sim = SimulatedHost::new();
        let mut rf = FileRes::new(local.to_str().unwrap());
        rf.set("mode", "0640").unwrap();
        rf.set("source", master.to_str().unwrap()).unwrap();

        rf.prepare(&sim.facts.clone(), &FileTemplates::new()).unwrap();
        rf.stat(&mut sim.env()).unwrap();

        let report = rf.fixup(false, &mut sim.env());
        assert_eq!(report.summaries(), ["create file", "update content from master copy"]);
        assert!(report.compliant());

        let meta = PathMeta::read(local.to_str().unwrap()).unwrap().unwrap();
        assert_eq!(meta.mode, 0o640);
    }

    #[test]
    fn mode_drift_on_an_existing_file() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let local = tmp.path().join("script.sh");
        write(&local, "#!/bin/sh\n");
        std::fs::set_permissions(&local, std::fs::Permissions::from_mode(0o644)).unwrap();

        let mut sim = SimulatedHost::new();
        let mut rf = FileRes::new(local.to_str().unwrap());
        rf.set("mode", "0755").unwrap();

        rf.stat(&mut sim.env()).unwrap();
        assert_eq!(rf.different, FileFlags::MODE);

        let report = rf.fixup(false, &mut sim.env());
        assert_eq!(report.summaries(), ["change permissions from 0644 to 0755"]);
        assert_eq!(PathMeta::read(local.to_str().unwrap()).unwrap().unwrap().mode, 0o755);
    }

    #[test]
    fn absent_file_is_removed() {
        let tmp = tempfile::tempdir().unwrap();
        let local = tmp.path().join("stale.conf");
        write(&local, "x");

        let mut sim = SimulatedHost::new();
        let mut rf = FileRes::new(local.to_str().unwrap());
        rf.set("present", "no").unwrap();

        rf.stat(&mut sim.env()).unwrap();
        let report = rf.fixup(false, &mut sim.env());
        assert_eq!(report.summaries(), ["remove file"]);
        assert!(!local.exists());
    }

    #[test]
    fn template_content_renders_through_facts() {
        let tmp = tempfile::tempdir().unwrap();
        let template = tmp.path().join("motd.tpl");
        let local = tmp.path().join("motd");
        write(&template, "welcome to {{ sys.hostname }}\n");

        let mut sim = SimulatedHost::new();
        sim.facts.set("sys.hostname", "web01");

        let mut rf = FileRes::new(local.to_str().unwrap());
        rf.set("template", template.to_str().unwrap()).unwrap();

        rf.prepare(&sim.facts.clone(), &FileTemplates::new()).unwrap();
        rf.stat(&mut sim.env()).unwrap();
        let report = rf.fixup(false, &mut sim.env());

        assert!(report.compliant(), "{:?}", report);
        assert_eq!(std::fs::read_to_string(&local).unwrap(), "welcome to web01\n");
    }

    #[test]
    fn dry_run_reports_without_touching_the_filesystem() {
        let tmp = tempfile::tempdir().unwrap();
        let local = tmp.path().join("new.conf");

        let mut sim = SimulatedHost::new();
        let mut rf = FileRes::new(local.to_str().unwrap());
        rf.set("mode", "0600").unwrap();

        rf.stat(&mut sim.env()).unwrap();
        let report = rf.fixup(true, &mut sim.env());

        assert_eq!(report.summaries(), ["create file"]);
        assert!(report.actions.iter().all(|a| a.outcome == ActionOutcome::Skipped));
        assert!(!local.exists());
    }

    #[test]
    fn pack_round_trips_the_declared_fields() {
        let tmp = tempfile::tempdir().unwrap();
        let master = tmp.path().join("m");
        write(&master, "content");

        let mut rf = FileRes::new("/etc/motd");
        rf.set("owner", "root").unwrap();
        rf.set("group", "wheel").unwrap();
        rf.set("mode", "0644").unwrap();
        rf.set("source", master.to_str().unwrap()).unwrap();
        rf.prepare(&Facts::new(), &FileTemplates::new()).unwrap();

        let packed = rf.pack();
        let back = FileRes::unpack(&packed).unwrap();
        assert_eq!(back.key, "/etc/motd");
        assert_eq!(back.enforced, rf.enforced);
        assert_eq!(back.path, rf.path);
        assert_eq!(back.rhash, rf.rhash);
        assert_eq!(back.owner.as_deref(), Some("root"));
        assert_eq!(back.group.as_deref(), Some("wheel"));
        assert_eq!(back.mode, 0o644);
        assert_eq!(back.pack(), packed);
    }
}
