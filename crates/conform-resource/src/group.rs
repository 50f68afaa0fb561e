use bitflags::bitflags;
use conform_domain::{NameList, Packer, ResourceKind, Unpacker};
use conform_provider::{GrEntry, ResourceEnv, SgEntry};
use conform_report::{ActionOutcome, Report};

use crate::error::ResourceError;
use crate::resource::{parse_u32, truthy};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct GroupFlags: u32 {
        const NAME    = 1 << 0;
        const PASSWD  = 1 << 1;
        const GID     = 1 << 2;
        const MEMBERS = 1 << 3;
        const ADMINS  = 1 << 4;
        const ABSENT  = 1 << 5;
    }
}

/// A local group, enforced across the group and gshadow databases.
///
/// Membership is declared incrementally: `member=x` queues an addition,
/// `member=!x` a removal. The additive and subtractive pending sets stay
/// disjoint; queuing a name on one side withdraws it from the other.
#[derive(Debug, Clone)]
pub struct GroupRes {
    key: String,
    enforced: GroupFlags,
    different: GroupFlags,

    name: String,
    passwd: String,
    gid: u32,
    mem_add: NameList,
    mem_rm: NameList,
    adm_add: NameList,
    adm_rm: NameList,

    // populated by stat: the member/admin sets the group should end up with
    mem: NameList,
    adm: NameList,

    // observed state
    gr: Option<GrEntry>,
    sg: Option<SgEntry>,
}

/// Queue `user` on `add`, withdrawing any pending entry on `rm`.
fn pending_update(add: &mut NameList, rm: &mut NameList, user: &str) {
    if !add.contains(user) {
        add.push(user);
    }
    rm.remove(user);
}

impl GroupRes {
    pub fn new(key: &str) -> Self {
        let mut rg = GroupRes {
            key: key.to_string(),
            enforced: GroupFlags::empty(),
            different: GroupFlags::empty(),
            name: String::new(),
            passwd: String::new(),
            gid: 0,
            mem_add: NameList::new(),
            mem_rm: NameList::new(),
            adm_add: NameList::new(),
            adm_rm: NameList::new(),
            mem: NameList::new(),
            adm: NameList::new(),
            gr: None,
            sg: None,
        };
        if !key.is_empty() {
            let _ = rg.set("name", key);
        }
        rg
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn set(&mut self, name: &str, value: &str) -> Result<(), ResourceError> {
        match name {
            "gid" => {
                self.gid = parse_u32(name, value)?;
                self.enforced |= GroupFlags::GID;
            }
            "name" => {
                self.name = value.to_string();
                self.enforced |= GroupFlags::NAME;
            }
            "present" => {
                if truthy(value) {
                    self.enforced -= GroupFlags::ABSENT;
                } else {
                    self.enforced |= GroupFlags::ABSENT;
                }
            }
            "member" => match value.strip_prefix('!') {
                Some(user) => self.remove_member(user),
                None => self.add_member(value),
            },
            "admin" => match value.strip_prefix('!') {
                Some(user) => self.remove_admin(user),
                None => self.add_admin(value),
            },
            "pwhash" | "password" => {
                self.passwd = value.to_string();
                self.enforced |= GroupFlags::PASSWD;
            }
            _ => {
                return Err(ResourceError::InvalidAttribute {
                    kind: ResourceKind::Group,
                    name: name.to_string(),
                })
            }
        }
        Ok(())
    }

    pub fn add_member(&mut self, user: &str) {
        self.enforced |= GroupFlags::MEMBERS;
        pending_update(&mut self.mem_add, &mut self.mem_rm, user);
    }

    pub fn remove_member(&mut self, user: &str) {
        self.enforced |= GroupFlags::MEMBERS;
        pending_update(&mut self.mem_rm, &mut self.mem_add, user);
    }

    pub fn add_admin(&mut self, user: &str) {
        self.enforced |= GroupFlags::ADMINS;
        pending_update(&mut self.adm_add, &mut self.adm_rm, user);
    }

    pub fn remove_admin(&mut self, user: &str) {
        self.enforced |= GroupFlags::ADMINS;
        pending_update(&mut self.adm_rm, &mut self.adm_add, user);
    }

    pub fn matches(&self, name: &str, value: &str) -> bool {
        match name {
            "gid" => self.gid.to_string() == value,
            "name" => self.name == value,
            _ => false,
        }
    }

    pub fn stat(&mut self, env: &mut ResourceEnv) -> Result<(), ResourceError> {
        self.gr = env.groups.get(&self.name)?;
        self.sg = env.gshadow.get(&self.name)?;
        let (Some(gr), Some(sg)) = (&self.gr, &self.sg) else {
            // new group: the target sets are just the additions
            self.different = self.enforced;
            self.mem = self.mem_add.clone();
            self.adm = self.adm_add.clone();
            return Ok(());
        };

        // the member set we want: (current ∪ additions) \ removals
        self.mem = gr.members.clone();
        self.mem.add_all(&self.mem_add);
        self.mem.remove_all(&self.mem_rm);
        self.mem.uniq();

        self.adm = sg.admins.clone();
        self.adm.add_all(&self.adm_add);
        self.adm.remove_all(&self.adm_rm);
        self.adm.uniq();

        self.different = GroupFlags::empty();

        if self.enforced.contains(GroupFlags::NAME) && self.name != gr.name {
            self.different |= GroupFlags::NAME;
        }
        if self.enforced.contains(GroupFlags::PASSWD) && self.passwd != sg.passwd {
            self.different |= GroupFlags::PASSWD;
        }
        if self.enforced.contains(GroupFlags::GID) && self.gid != gr.gid {
            self.different |= GroupFlags::GID;
        }
        if self.enforced.contains(GroupFlags::MEMBERS) && gr.members.differs(&self.mem) {
            self.different |= GroupFlags::MEMBERS;
        }
        if self.enforced.contains(GroupFlags::ADMINS) && sg.admins.differs(&self.adm) {
            self.different |= GroupFlags::ADMINS;
        }

        Ok(())
    }

    pub fn fixup(&mut self, dryrun: bool, env: &mut ResourceEnv) -> Report {
        let mut report = Report::new(ResourceKind::Group, &self.name);
        let mut new_group = false;

        if self.enforced.contains(GroupFlags::ABSENT) {
            if self.gr.is_some() || self.sg.is_some() {
                if dryrun {
                    report.action("remove group", ActionOutcome::Skipped);
                } else {
                    let gr_ok = self.gr.is_none() || env.groups.remove(&self.name).is_ok();
                    let sg_ok = self.sg.is_none() || env.gshadow.remove(&self.name).is_ok();
                    if gr_ok && sg_ok {
                        self.gr = None;
                        self.sg = None;
                        report.action("remove group", ActionOutcome::Succeeded);
                    } else {
                        report.action("remove group", ActionOutcome::Failed);
                    }
                }
            }

            return report;
        }

        if self.gr.is_none() || self.sg.is_none() {
            new_group = true;

            if dryrun {
                report.action("create group", ActionOutcome::Skipped);
            } else {
                if self.gr.is_none() {
                    self.gr = env.groups.create(&self.name, self.gid).ok();
                }
                if self.sg.is_none() {
                    self.sg = env.gshadow.create(&self.name).ok();
                }

                if self.gr.is_some() && self.sg.is_some() {
                    report.action("create group", ActionOutcome::Succeeded);
                } else {
                    report.action("create group", ActionOutcome::Failed);
                    return report;
                }
            }
        }

        if self.different.contains(GroupFlags::PASSWD) {
            let action = if new_group {
                "set group membership password"
            } else {
                "change group membership password"
            };

            if dryrun {
                report.action(action, ActionOutcome::Skipped);
            } else {
                let gr = self.gr.as_mut().expect("present after create");
                let sg = self.sg.as_mut().expect("present after create");
                gr.passwd = "x".to_string();
                sg.passwd = self.passwd.clone();
                report.action(action, ActionOutcome::Succeeded);
            }
        }

        if self.different.contains(GroupFlags::GID) {
            let action = if new_group {
                format!("set gid to {}", self.gid)
            } else {
                format!(
                    "change gid from {} to {}",
                    self.gr.as_ref().map_or(0, |g| g.gid),
                    self.gid
                )
            };

            if dryrun {
                report.action(action, ActionOutcome::Skipped);
            } else {
                self.gr.as_mut().expect("present after create").gid = self.gid;
                report.action(action, ActionOutcome::Succeeded);
            }
        }

        if self.enforced.contains(GroupFlags::MEMBERS) && self.different.contains(GroupFlags::MEMBERS) {
            let orig = self.gr.as_ref().map(|g| g.members.clone()).unwrap_or_default();

            let mut to_add = self.mem_add.clone();
            to_add.remove_all(&orig);
            let to_remove = orig.intersect(&self.mem_rm);

            if !dryrun {
                let gr = self.gr.as_mut().expect("present after create");
                let sg = self.sg.as_mut().expect("present after create");
                gr.members = self.mem.clone();
                sg.members = self.mem.clone();
            }

            let outcome = if dryrun { ActionOutcome::Skipped } else { ActionOutcome::Succeeded };
            for user in to_add.iter() {
                report.action(format!("add {}", user), outcome);
            }
            for user in to_remove.iter() {
                report.action(format!("remove {}", user), outcome);
            }
        }

        if self.enforced.contains(GroupFlags::ADMINS) && self.different.contains(GroupFlags::ADMINS) {
            let orig = self.sg.as_ref().map(|s| s.admins.clone()).unwrap_or_default();

            let mut to_add = self.adm_add.clone();
            to_add.remove_all(&orig);
            let to_remove = orig.intersect(&self.adm_rm);

            if !dryrun {
                self.sg.as_mut().expect("present after create").admins = self.adm.clone();
            }

            let outcome = if dryrun { ActionOutcome::Skipped } else { ActionOutcome::Succeeded };
            for user in to_add.iter() {
                report.action(format!("grant admin rights to {}", user), outcome);
            }
            for user in to_remove.iter() {
                report.action(format!("revoke admin rights from {}", user), outcome);
            }
        }

        if !dryrun {
            let gr_ok = self.gr.as_ref().map_or(true, |gr| env.groups.put(gr).is_ok());
            let sg_ok = self.sg.as_ref().map_or(true, |sg| env.gshadow.put(sg).is_ok());
            if !gr_ok || !sg_ok {
                report.action("write group database", ActionOutcome::Failed);
            }
        }

        report
    }

    // field order: key, enforced, name, passwd, gid, mem_add, mem_rm,
    // adm_add, adm_rm (pending sets joined with ".")
    pub fn pack(&self) -> String {
        Packer::new(ResourceKind::Group.wire_tag())
            .str(&self.key)
            .u32(self.enforced.bits())
            .str(&self.name)
            .str(&self.passwd)
            .u32(self.gid)
            .str(&self.mem_add.join("."))
            .str(&self.mem_rm.join("."))
            .str(&self.adm_add.join("."))
            .str(&self.adm_rm.join("."))
            .finish()
    }

    pub fn unpack(packed: &str) -> Result<Self, ResourceError> {
        let mut u = Unpacker::new(packed, ResourceKind::Group.wire_tag())?;

        let mut rg = GroupRes::new("");
        rg.key = u.str()?;
        rg.enforced = GroupFlags::from_bits_truncate(u.u32()?);
        rg.name = u.str()?;
        rg.passwd = u.str()?;
        rg.gid = u.u32()?;
        rg.mem_add = NameList::split(&u.str()?, ".");
        rg.mem_rm = NameList::split(&u.str()?, ".");
        rg.adm_add = NameList::split(&u.str()?, ".");
        rg.adm_rm = NameList::split(&u.str()?, ".");
        u.finish()?;

        Ok(rg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conform_domain::NameList;
    use conform_provider::{GroupDb, GshadowDb, SimulatedHost};

    fn seeded_group(members: &[&str]) -> SimulatedHost {
        let mut sim = SimulatedHost::new();
        let mut gr = sim.groups.create("admins", 901).unwrap();
        gr.members = members.iter().copied().collect();
        sim.groups.put(&gr).unwrap();
        let mut sg = sim.gshadow.create("admins").unwrap();
        sg.members = gr.members.clone();
        sim.gshadow.put(&sg).unwrap();
        sim
    }

    #[test]
    fn pending_sets_stay_disjoint() {
        let mut g = GroupRes::new("admins");
        g.set("member", "b").unwrap();
        g.set("member", "!b").unwrap();
        assert!(!g.mem_add.contains("b"));
        assert!(g.mem_rm.contains("b"));

        g.set("member", "b").unwrap();
        assert!(g.mem_add.contains("b"));
        assert!(!g.mem_rm.contains("b"));
    }

    #[test]
    fn membership_edit_adds_then_removes() {
        let mut sim = seeded_group(&["a", "b", "c"]);

        let mut g = GroupRes::new("admins");
        g.set("member", "x").unwrap();
        g.set("member", "!b").unwrap();

        g.stat(&mut sim.env()).unwrap();
        assert_eq!(g.different, GroupFlags::MEMBERS);
        assert_eq!(g.mem, ["a", "c", "x"].iter().copied().collect::<NameList>());

        let report = g.fixup(false, &mut sim.env());
        assert_eq!(report.summaries(), ["add x", "remove b"]);

        let stored = sim.groups.get("admins").unwrap().unwrap();
        assert!(!stored.members.differs(&["a", "c", "x"].iter().copied().collect()));
    }

    #[test]
    fn converged_membership_produces_no_actions() {
        let mut sim = seeded_group(&["a", "b"]);

        let mut g = GroupRes::new("admins");
        g.set("member", "a").unwrap();

        g.stat(&mut sim.env()).unwrap();
        assert!(g.different.is_empty());
        let report = g.fixup(false, &mut sim.env());
        assert!(report.actions.is_empty());
    }

    #[test]
    fn admin_revocation_intersects_the_subtractive_set() {
        let mut sim = SimulatedHost::new();
        sim.groups.create("ops", 902).unwrap();
        let mut sg = sim.gshadow.create("ops").unwrap();
        sg.admins = ["root", "eve"].iter().copied().collect();
        sim.gshadow.put(&sg).unwrap();

        let mut g = GroupRes::new("ops");
        g.set("admin", "alice").unwrap();
        g.set("admin", "!eve").unwrap();

        g.stat(&mut sim.env()).unwrap();
        let report = g.fixup(false, &mut sim.env());
        assert_eq!(
            report.summaries(),
            ["grant admin rights to alice", "revoke admin rights from eve"]
        );

        let stored = sim.gshadow.get("ops").unwrap().unwrap();
        assert!(!stored.admins.differs(&["alice", "root"].iter().copied().collect()));
    }

    #[test]
    fn creates_a_missing_group() {
        let mut sim = SimulatedHost::new();

        let mut g = GroupRes::new("web");
        g.set("gid", "33").unwrap();
        g.set("member", "www-data").unwrap();

        g.stat(&mut sim.env()).unwrap();
        let report = g.fixup(false, &mut sim.env());
        assert_eq!(report.summaries(), ["create group", "set gid to 33", "add www-data"]);

        let stored = sim.groups.get("web").unwrap().unwrap();
        assert_eq!(stored.gid, 33);
        assert!(stored.members.contains("www-data"));
    }

    #[test]
    fn dry_run_leaves_the_databases_alone() {
        let mut sim = seeded_group(&["a"]);

        let mut g = GroupRes::new("admins");
        g.set("member", "x").unwrap();

        g.stat(&mut sim.env()).unwrap();
        let report = g.fixup(true, &mut sim.env());
        assert_eq!(report.summaries(), ["add x"]);
        assert!(report.actions.iter().all(|a| a.outcome == ActionOutcome::Skipped));

        let stored = sim.groups.get("admins").unwrap().unwrap();
        assert!(!stored.members.contains("x"));
    }

    #[test]
    fn pack_round_trips_pending_sets() {
        let mut g = GroupRes::new("admins");
        g.set("gid", "901").unwrap();
        g.set("member", "x").unwrap();
        g.set("member", "!b").unwrap();
        g.set("admin", "alice").unwrap();

        let packed = g.pack();
        let back = GroupRes::unpack(&packed).unwrap();
        assert_eq!(back.key, g.key);
        assert_eq!(back.enforced, g.enforced);
        assert_eq!(back.gid, 901);
        assert_eq!(back.mem_add, g.mem_add);
        assert_eq!(back.mem_rm, g.mem_rm);
        assert_eq!(back.adm_add, g.adm_add);
        assert!(back.adm_rm.is_empty());
        assert_eq!(back.pack(), packed);
    }
}
