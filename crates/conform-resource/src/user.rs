use std::path::Path;

use bitflags::bitflags;
use conform_domain::{Packer, ResourceKind, Unpacker};
use conform_provider::{PwEntry, ResourceEnv, SpEntry};
use conform_report::{ActionOutcome, Report};

use crate::error::ResourceError;
use crate::resource::{parse_u32, truthy};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct UserFlags: u32 {
        const NAME   = 1 << 0;
        const PASSWD = 1 << 1;
        const UID    = 1 << 2;
        const GID    = 1 << 3;
        const GECOS  = 1 << 4;
        const DIR    = 1 << 5;
        const SHELL  = 1 << 6;
        const MKHOME = 1 << 7;
        const LOCK   = 1 << 8;
        const PWMIN  = 1 << 9;
        const PWMAX  = 1 << 10;
        const PWWARN = 1 << 11;
        const INACT  = 1 << 12;
        const EXPIRE = 1 << 13;
        const ABSENT = 1 << 14;
    }
}

/// A local user account, enforced across the password and shadow
/// databases. `uid`/`gid` of `None` mean "let the database pick".
#[derive(Debug, Clone)]
pub struct UserRes {
    key: String,
    enforced: UserFlags,
    different: UserFlags,

    name: String,
    passwd: String,
    uid: Option<u32>,
    gid: Option<u32>,
    gecos: String,
    dir: String,
    shell: String,
    mkhome: bool,
    skel: Option<String>,
    lock: bool,
    pwmin: u32,
    pwmax: u32,
    pwwarn: u32,
    inact: u32,
    expire: u32,

    // observed state, populated by stat
    pw: Option<PwEntry>,
    sp: Option<SpEntry>,
}

// Wire sentinel for an unset uid/gid.
const NO_ID: u32 = u32::MAX;

impl UserRes {
    pub fn new(key: &str) -> Self {
        let mut ru = Self::blank(key);
        if !key.is_empty() {
            // setting the username cannot fail
            let _ = ru.set("username", key);
        }
        ru
    }

    fn blank(key: &str) -> Self {
        UserRes {
            key: key.to_string(),
            enforced: UserFlags::empty(),
            different: UserFlags::empty(),
            name: String::new(),
            passwd: String::new(),
            uid: None,
            gid: None,
            gecos: String::new(),
            dir: String::new(),
            shell: String::new(),
            mkhome: false,
            skel: None,
            lock: true,
            pwmin: 0,
            pwmax: 0,
            pwwarn: 0,
            inact: 0,
            expire: 0,
            pw: None,
            sp: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn set(&mut self, name: &str, value: &str) -> Result<(), ResourceError> {
        match name {
            "uid" => {
                self.uid = Some(parse_u32(name, value)?);
                self.enforced |= UserFlags::UID;
            }
            "gid" => {
                self.gid = Some(parse_u32(name, value)?);
                self.enforced |= UserFlags::GID;
            }
            "username" => {
                self.name = value.to_string();
                self.enforced |= UserFlags::NAME;
            }
            "home" => {
                self.dir = value.to_string();
                self.enforced |= UserFlags::DIR;
            }
            "present" => {
                if truthy(value) {
                    self.enforced -= UserFlags::ABSENT;
                } else {
                    self.enforced |= UserFlags::ABSENT;
                }
            }
            "locked" => {
                self.lock = truthy(value);
                self.enforced |= UserFlags::LOCK;
            }
            "gecos" | "comment" => {
                self.gecos = value.to_string();
                self.enforced |= UserFlags::GECOS;
            }
            "shell" => {
                self.shell = value.to_string();
                self.enforced |= UserFlags::SHELL;
            }
            "pwhash" | "password" => {
                self.passwd = value.to_string();
                self.enforced |= UserFlags::PASSWD;
            }
            "pwmin" => {
                self.pwmin = parse_u32(name, value)?;
                self.enforced |= UserFlags::PWMIN;
            }
            "pwmax" => {
                self.pwmax = parse_u32(name, value)?;
                self.enforced |= UserFlags::PWMAX;
            }
            "pwwarn" => {
                self.pwwarn = parse_u32(name, value)?;
                self.enforced |= UserFlags::PWWARN;
            }
            "inact" => {
                self.inact = parse_u32(name, value)?;
                self.enforced |= UserFlags::INACT;
            }
            "expiry" | "expiration" => {
                self.expire = parse_u32(name, value)?;
                self.enforced |= UserFlags::EXPIRE;
            }
            "skeleton" | "makehome" => {
                self.enforced |= UserFlags::MKHOME;
                self.skel = None;
                self.mkhome = truthy(value);
                if self.mkhome {
                    self.skel = Some(if value == "yes" { "/etc/skel".to_string() } else { value.to_string() });
                }
            }
            _ => {
                return Err(ResourceError::InvalidAttribute {
                    kind: ResourceKind::User,
                    name: name.to_string(),
                })
            }
        }
        Ok(())
    }

    pub fn matches(&self, name: &str, value: &str) -> bool {
        match name {
            "uid" => self.uid.map_or(false, |u| u.to_string() == value),
            "gid" => self.gid.map_or(false, |g| g.to_string() == value),
            "username" => self.name == value,
            "home" => self.dir == value,
            _ => false,
        }
    }

    pub fn stat(&mut self, env: &mut ResourceEnv) -> Result<(), ResourceError> {
        self.pw = env.passwd.get(&self.name)?;
        self.sp = env.shadow.get(&self.name)?;
        let (Some(pw), Some(sp)) = (&self.pw, &self.sp) else {
            // new account
            self.different = self.enforced;
            return Ok(());
        };

        let locked = sp.passwd.starts_with('!');
        self.different = UserFlags::empty();

        let e = self.enforced;
        if e.contains(UserFlags::NAME) && self.name != pw.name {
            self.different |= UserFlags::NAME;
        }
        if e.contains(UserFlags::PASSWD) && self.passwd != sp.passwd {
            self.different |= UserFlags::PASSWD;
        }
        if e.contains(UserFlags::UID) && self.uid != Some(pw.uid) {
            self.different |= UserFlags::UID;
        }
        if e.contains(UserFlags::GID) && self.gid != Some(pw.gid) {
            self.different |= UserFlags::GID;
        }
        if e.contains(UserFlags::GECOS) && self.gecos != pw.gecos {
            self.different |= UserFlags::GECOS;
        }
        if e.contains(UserFlags::DIR) && self.dir != pw.dir {
            self.different |= UserFlags::DIR;
        }
        if e.contains(UserFlags::SHELL) && self.shell != pw.shell {
            self.different |= UserFlags::SHELL;
        }
        if self.mkhome && e.contains(UserFlags::MKHOME) && !Path::new(&self.dir).is_dir() {
            self.different |= UserFlags::MKHOME;
        }
        if e.contains(UserFlags::PWMIN) && self.pwmin != sp.min {
            self.different |= UserFlags::PWMIN;
        }
        if e.contains(UserFlags::PWMAX) && self.pwmax != sp.max {
            self.different |= UserFlags::PWMAX;
        }
        if e.contains(UserFlags::PWWARN) && self.pwwarn != sp.warn {
            self.different |= UserFlags::PWWARN;
        }
        if e.contains(UserFlags::INACT) && self.inact != sp.inact {
            self.different |= UserFlags::INACT;
        }
        if e.contains(UserFlags::EXPIRE) && self.expire != sp.expire {
            self.different |= UserFlags::EXPIRE;
        }
        if e.contains(UserFlags::LOCK) && self.lock != locked {
            self.different |= UserFlags::LOCK;
        }

        Ok(())
    }

    pub fn fixup(&mut self, dryrun: bool, env: &mut ResourceEnv) -> Report {
        let mut report = Report::new(ResourceKind::User, &self.name);
        let mut new_user = false;

        // Remove the account entirely?
        if self.enforced.contains(UserFlags::ABSENT) {
            if self.pw.is_some() || self.sp.is_some() {
                if dryrun {
                    report.action("remove user", ActionOutcome::Skipped);
                    return report;
                }

                let pw_ok = self.pw.is_none() || env.passwd.remove(&self.name).is_ok();
                let sp_ok = self.sp.is_none() || env.shadow.remove(&self.name).is_ok();
                if pw_ok && sp_ok {
                    self.pw = None;
                    self.sp = None;
                    report.action("remove user", ActionOutcome::Succeeded);
                } else {
                    report.action("remove user", ActionOutcome::Failed);
                }
            }

            return report;
        }

        if self.pw.is_none() || self.sp.is_none() {
            new_user = true;

            if dryrun {
                report.action("create user", ActionOutcome::Skipped);
            } else {
                if self.pw.is_none() {
                    self.pw = env
                        .passwd
                        .create(&self.name, self.uid.unwrap_or(0), self.gid.unwrap_or(0))
                        .ok();
                }
                if self.sp.is_none() {
                    self.sp = env.shadow.create(&self.name).ok();
                }

                if self.pw.is_some() && self.sp.is_some() {
                    report.action("create user", ActionOutcome::Succeeded);
                } else {
                    report.action("create user", ActionOutcome::Failed);
                    return report;
                }
            }
        }

        if self.different.contains(UserFlags::PASSWD) {
            let action = if new_user { "set user password".to_string() } else { "change user password".to_string() };

            if dryrun {
                report.action(action, ActionOutcome::Skipped);
            } else {
                let pw = self.pw.as_mut().expect("present after create");
                let sp = self.sp.as_mut().expect("present after create");
                pw.passwd = "x".to_string();
                sp.passwd = self.passwd.clone();
                report.action(action, ActionOutcome::Succeeded);
            }
        }

        if self.different.contains(UserFlags::UID) {
            let uid = self.uid.unwrap_or(0);
            let action = if new_user {
                format!("set uid to {}", uid)
            } else {
                format!("change uid from {} to {}", self.pw.as_ref().map_or(0, |p| p.uid), uid)
            };

            if dryrun {
                report.action(action, ActionOutcome::Skipped);
            } else {
                self.pw.as_mut().expect("present after create").uid = uid;
                report.action(action, ActionOutcome::Succeeded);
            }
        }

        if self.different.contains(UserFlags::GID) {
            let gid = self.gid.unwrap_or(0);
            let action = if new_user {
                format!("set gid to {}", gid)
            } else {
                format!("change gid from {} to {}", self.pw.as_ref().map_or(0, |p| p.gid), gid)
            };

            if dryrun {
                report.action(action, ActionOutcome::Skipped);
            } else {
                self.pw.as_mut().expect("present after create").gid = gid;
                report.action(action, ActionOutcome::Succeeded);
            }
        }

        if self.different.contains(UserFlags::GECOS) {
            let action = if new_user {
                format!("set GECOS to {}", self.gecos)
            } else {
                format!("change GECOS to {}", self.gecos)
            };

            if dryrun {
                report.action(action, ActionOutcome::Skipped);
            } else {
                self.pw.as_mut().expect("present after create").gecos = self.gecos.clone();
                report.action(action, ActionOutcome::Succeeded);
            }
        }

        if self.different.contains(UserFlags::DIR) {
            let action = if new_user {
                format!("set home directory to {}", self.dir)
            } else {
                format!(
                    "change home from {} to {}",
                    self.pw.as_ref().map_or("", |p| p.dir.as_str()),
                    self.dir
                )
            };

            if dryrun {
                report.action(action, ActionOutcome::Skipped);
            } else {
                self.pw.as_mut().expect("present after create").dir = self.dir.clone();
                report.action(action, ActionOutcome::Succeeded);
            }
        }

        if self.different.contains(UserFlags::MKHOME) && self.mkhome {
            let action = format!("create home directory {}", self.dir);

            if dryrun {
                report.action(action, ActionOutcome::Skipped);
            } else if make_home(&self.dir, self.pw.as_ref()).is_ok() {
                report.action(action, ActionOutcome::Succeeded);
            } else {
                report.action(action, ActionOutcome::Failed);
            }

            if let Some(skel) = self.skel.clone() {
                let action = format!("populate home directory from {}", skel);

                if dryrun {
                    report.action(action, ActionOutcome::Skipped);
                } else if populate_home(Path::new(&self.dir), Path::new(&skel), self.pw.as_ref()).is_ok() {
                    report.action(action, ActionOutcome::Succeeded);
                } else {
                    report.action(action, ActionOutcome::Failed);
                }
            }
        }

        if self.different.contains(UserFlags::SHELL) {
            let action = if new_user {
                format!("set login shell to {}", self.shell)
            } else {
                format!(
                    "change shell from {} to {}",
                    self.pw.as_ref().map_or("", |p| p.shell.as_str()),
                    self.shell
                )
            };

            if dryrun {
                report.action(action, ActionOutcome::Skipped);
            } else {
                self.pw.as_mut().expect("present after create").shell = self.shell.clone();
                report.action(action, ActionOutcome::Succeeded);
            }
        }

        if self.different.contains(UserFlags::PWMIN) {
            let action = if new_user {
                format!("set password minimum age to {} days", self.pwmin)
            } else {
                format!("change password minimum age to {} days", self.pwmin)
            };

            if dryrun {
                report.action(action, ActionOutcome::Skipped);
            } else {
                self.sp.as_mut().expect("present after create").min = self.pwmin;
                report.action(action, ActionOutcome::Succeeded);
            }
        }

        if self.different.contains(UserFlags::PWMAX) {
            let action = if new_user {
                format!("set password maximum age to {} days", self.pwmax)
            } else {
                format!("change password maximum age to {} days", self.pwmax)
            };

            if dryrun {
                report.action(action, ActionOutcome::Skipped);
            } else {
                self.sp.as_mut().expect("present after create").max = self.pwmax;
                report.action(action, ActionOutcome::Succeeded);
            }
        }

        if self.different.contains(UserFlags::PWWARN) {
            let action = if new_user {
                format!("set password expiry warning to {} days", self.pwwarn)
            } else {
                format!("change password expiry warning to {} days", self.pwwarn)
            };

            if dryrun {
                report.action(action, ActionOutcome::Skipped);
            } else {
                self.sp.as_mut().expect("present after create").warn = self.pwwarn;
                report.action(action, ActionOutcome::Succeeded);
            }
        }

        if self.different.contains(UserFlags::INACT) {
            let action = if self.inact != 0 { "deactivate account" } else { "activate account" };

            if dryrun {
                report.action(action, ActionOutcome::Skipped);
            } else {
                self.sp.as_mut().expect("present after create").inact = self.inact;
                report.action(action, ActionOutcome::Succeeded);
            }
        }

        if self.different.contains(UserFlags::EXPIRE) {
            let action = if new_user {
                format!("set account expiration to {}", self.expire)
            } else {
                format!("change account expiration to {}", self.expire)
            };

            if dryrun {
                report.action(action, ActionOutcome::Skipped);
            } else {
                self.sp.as_mut().expect("present after create").expire = self.expire;
                report.action(action, ActionOutcome::Succeeded);
            }
        }

        if self.different.contains(UserFlags::LOCK) {
            let action = if self.lock { "lock account" } else { "unlock account" };

            if dryrun {
                report.action(action, ActionOutcome::Skipped);
            } else {
                let sp = self.sp.as_mut().expect("present after create");
                if self.lock {
                    if !sp.passwd.starts_with('!') {
                        sp.passwd.insert(0, '!');
                    }
                } else if sp.passwd.starts_with('!') {
                    sp.passwd.remove(0);
                }
                report.action(action, ActionOutcome::Succeeded);
            }
        }

        if !dryrun {
            let pw_ok = self.pw.as_ref().map_or(true, |pw| env.passwd.put(pw).is_ok());
            let sp_ok = self.sp.as_ref().map_or(true, |sp| env.shadow.put(sp).is_ok());
            if !pw_ok || !sp_ok {
                report.action("write password database", ActionOutcome::Failed);
            }
        }

        report
    }

    // field order: key, enforced, name, passwd, uid, gid, gecos, shell,
    // dir, mkhome, skel, lock, pwmin, pwmax, pwwarn, inact, expire
    pub fn pack(&self) -> String {
        Packer::new(ResourceKind::User.wire_tag())
            .str(&self.key)
            .u32(self.enforced.bits())
            .str(&self.name)
            .str(&self.passwd)
            .u32(self.uid.unwrap_or(NO_ID))
            .u32(self.gid.unwrap_or(NO_ID))
            .str(&self.gecos)
            .str(&self.shell)
            .str(&self.dir)
            .bool(self.mkhome)
            .str(self.skel.as_deref().unwrap_or(""))
            .bool(self.lock)
            .u32(self.pwmin)
            .u32(self.pwmax)
            .u32(self.pwwarn)
            .u32(self.inact)
            .u32(self.expire)
            .finish()
    }

    pub fn unpack(packed: &str) -> Result<Self, ResourceError> {
        let mut u = Unpacker::new(packed, ResourceKind::User.wire_tag())?;

        let mut ru = Self::blank("");
        ru.key = u.str()?;
        ru.enforced = UserFlags::from_bits_truncate(u.u32()?);
        ru.name = u.str()?;
        ru.passwd = u.str()?;
        ru.uid = Some(u.u32()?).filter(|&v| v != NO_ID);
        ru.gid = Some(u.u32()?).filter(|&v| v != NO_ID);
        ru.gecos = u.str()?;
        ru.shell = u.str()?;
        ru.dir = u.str()?;
        ru.mkhome = u.bool()?;
        ru.skel = Some(u.str()?).filter(|s| !s.is_empty());
        ru.lock = u.bool()?;
        ru.pwmin = u.u32()?;
        ru.pwmax = u.u32()?;
        ru.pwwarn = u.u32()?;
        ru.inact = u.u32()?;
        ru.expire = u.u32()?;
        u.finish()?;

        Ok(ru)
    }
}

fn make_home(dir: &str, pw: Option<&PwEntry>) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::create_dir_all(dir)?;
    std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
    if let Some(pw) = pw {
        // needs privilege; the action outcome tracks mkdir only
        let _ = std::os::unix::fs::chown(dir, Some(pw.uid), Some(pw.gid));
    }
    Ok(())
}

/// Copy the skeleton tree into a freshly created home directory.
fn populate_home(home: &Path, skel: &Path, pw: Option<&PwEntry>) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    for entry in std::fs::read_dir(skel)? {
        let entry = entry?;
        let target = home.join(entry.file_name());
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            std::fs::create_dir_all(&target)?;
            std::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o755))?;
            populate_home(&target, &entry.path(), pw)?;
        } else if file_type.is_file() {
            std::fs::copy(entry.path(), &target)?;
        }

        if let Some(pw) = pw {
            let _ = std::os::unix::fs::chown(&target, Some(pw.uid), Some(pw.gid));
        }
    }
    Ok(())
}
