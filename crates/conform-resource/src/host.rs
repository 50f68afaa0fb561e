use bitflags::bitflags;
use conform_domain::{NameList, Packer, ResourceKind, Unpacker};
use conform_provider::{ResourceEnv, TreeEditor};
use conform_report::{ActionOutcome, Report};
use tracing::debug;

use crate::error::ResourceError;
use crate::resource::truthy;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct HostFlags: u32 {
        const ALIASES = 1 << 0;
        const ABSENT  = 1 << 1;
    }
}

const HOSTS_TREE: &str = "/files/etc/hosts";

/// One host-table entry, identified by the (ip, hostname) pair within the
/// host-file editor's tree.
#[derive(Debug, Clone)]
pub struct HostRes {
    key: String,
    enforced: HostFlags,
    different: HostFlags,

    hostname: String,
    ip: String,
    aliases: NameList,

    // observed state: the tree node holding this entry, if any
    node: Option<String>,
}

impl HostRes {
    pub fn new(key: &str) -> Self {
        let mut rh = HostRes {
            key: key.to_string(),
            enforced: HostFlags::empty(),
            different: HostFlags::empty(),
            hostname: String::new(),
            ip: String::new(),
            aliases: NameList::new(),
            node: None,
        };
        if !key.is_empty() {
            let _ = rh.set("hostname", key);
        }
        rh
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn set(&mut self, name: &str, value: &str) -> Result<(), ResourceError> {
        match name {
            "hostname" => {
                self.hostname = value.to_string();
            }
            "ip" | "address" => {
                self.ip = value.to_string();
            }
            "aliases" | "alias" => {
                self.aliases.add_all(&NameList::split(value, " "));
                self.enforced |= HostFlags::ALIASES;
            }
            "present" => {
                if truthy(value) {
                    self.enforced -= HostFlags::ABSENT;
                } else {
                    self.enforced |= HostFlags::ABSENT;
                }
            }
            _ => {
                return Err(ResourceError::InvalidAttribute {
                    kind: ResourceKind::Host,
                    name: name.to_string(),
                })
            }
        }
        Ok(())
    }

    pub fn matches(&self, name: &str, value: &str) -> bool {
        match name {
            "hostname" => self.hostname == value,
            "ip" | "address" => self.ip == value,
            _ => false,
        }
    }

    pub fn stat(&mut self, env: &mut ResourceEnv) -> Result<(), ResourceError> {
        self.node = None;
        self.different = HostFlags::empty();

        for entry in env.hosts.matches(&format!("{}/*", HOSTS_TREE))? {
            let ip = env.hosts.get(&format!("{}/ipaddr", entry))?;
            if ip.as_deref() != Some(self.ip.as_str()) {
                continue;
            }
            let canonical = env.hosts.get(&format!("{}/canonical", entry))?;
            if canonical.as_deref() == Some(self.hostname.as_str()) {
                debug!(hostname = %self.hostname, node = %entry, "host entry found");
                self.node = Some(entry);
                break;
            }
        }

        if self.enforced.contains(HostFlags::ALIASES) {
            match &self.node {
                Some(node) => {
                    let real = env.hosts.get_all(&format!("{}/alias", node))?;
                    let real: NameList = real.iter().map(String::as_str).collect();
                    if self.aliases.differs(&real) {
                        self.different |= HostFlags::ALIASES;
                    }
                }
                None => {
                    self.different |= HostFlags::ALIASES;
                }
            }
        }

        Ok(())
    }

    pub fn fixup(&mut self, dryrun: bool, env: &mut ResourceEnv) -> Report {
        let mut report = Report::new(ResourceKind::Host, &self.hostname);
        let mut just_created = false;

        // presence is decided first and short-circuits
        if self.enforced.contains(HostFlags::ABSENT) {
            if let Some(node) = self.node.clone() {
                if dryrun {
                    report.action("remove host entry", ActionOutcome::Skipped);
                } else if env.hosts.rm(&node).is_ok() {
                    self.node = None;
                    report.action("remove host entry", ActionOutcome::Succeeded);
                } else {
                    report.action("remove host entry", ActionOutcome::Failed);
                }
            }

            return report;
        }

        if self.node.is_none() {
            if dryrun {
                report.action("create host entry", ActionOutcome::Skipped);
            } else {
                let node = alloc_node(env.hosts);
                let set = env
                    .hosts
                    .set(&format!("{}/ipaddr", node), &self.ip)
                    .and_then(|_| env.hosts.set(&format!("{}/canonical", node), &self.hostname));

                if set.is_ok() {
                    self.node = Some(node);
                    just_created = true;
                    report.action("create host entry", ActionOutcome::Succeeded);
                } else {
                    report.action("create host entry", ActionOutcome::Failed);
                }
            }
        }

        if self.different.contains(HostFlags::ALIASES) {
            if dryrun && !just_created {
                report.action("setting host aliases", ActionOutcome::Skipped);
            } else if let Some(node) = self.node.clone() {
                // replace the whole alias list, in declared order
                let mut failed = env.hosts.rm(&format!("{}/alias", node)).is_err();
                for (i, alias) in self.aliases.iter().enumerate() {
                    if env.hosts.set(&format!("{}/alias[{}]", node, i + 1), alias).is_err() {
                        failed = true;
                    }
                }
                report.action(
                    "setting host aliases",
                    if failed { ActionOutcome::Failed } else { ActionOutcome::Succeeded },
                );
            }
        }

        report
    }

    // field order: key, enforced, hostname, ip, aliases (space-joined)
    pub fn pack(&self) -> String {
        Packer::new(ResourceKind::Host.wire_tag())
            .str(&self.key)
            .u32(self.enforced.bits())
            .str(&self.hostname)
            .str(&self.ip)
            .str(&self.aliases.join(" "))
            .finish()
    }

    pub fn unpack(packed: &str) -> Result<Self, ResourceError> {
        let mut u = Unpacker::new(packed, ResourceKind::Host.wire_tag())?;

        let mut rh = HostRes::new("");
        rh.key = u.str()?;
        rh.enforced = HostFlags::from_bits_truncate(u.u32()?);
        rh.hostname = u.str()?;
        rh.ip = u.str()?;
        rh.aliases = NameList::split(&u.str()?, " ");
        u.finish()?;

        Ok(rh)
    }
}

/// Allocate the next free numeric child under the hosts tree.
fn alloc_node(tree: &mut dyn TreeEditor) -> String {
    let next = tree
        .matches(&format!("{}/*", HOSTS_TREE))
        .unwrap_or_default()
        .iter()
        .filter_map(|path| path.rsplit('/').next()?.parse::<u32>().ok())
        .max()
        .unwrap_or(0)
        + 1;
    format!("{}/{}", HOSTS_TREE, next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use conform_provider::SimulatedHost;

    fn seeded_host() -> SimulatedHost {
        let mut sim = SimulatedHost::new();
        sim.hosts.insert("/files/etc/hosts/1/ipaddr", "127.0.0.1");
        sim.hosts.insert("/files/etc/hosts/1/canonical", "localhost");
        sim
    }

    #[test]
    fn creates_a_missing_entry_with_aliases() {
        let mut sim = seeded_host();

        let mut rh = HostRes::new("db01");
        rh.set("ip", "10.0.0.5").unwrap();
        rh.set("aliases", "db postgres").unwrap();

        rh.stat(&mut sim.env()).unwrap();
        assert!(rh.node.is_none());
        assert_eq!(rh.different, HostFlags::ALIASES);

        let report = rh.fixup(false, &mut sim.env());
        assert_eq!(report.summaries(), ["create host entry", "setting host aliases"]);
        assert!(report.compliant());

        assert_eq!(sim.hosts.get("/files/etc/hosts/2/ipaddr").unwrap().as_deref(), Some("10.0.0.5"));
        assert_eq!(sim.hosts.get("/files/etc/hosts/2/canonical").unwrap().as_deref(), Some("db01"));
        assert_eq!(
            sim.hosts.get_all("/files/etc/hosts/2/alias").unwrap(),
            ["db", "postgres"]
        );

        // converged
        rh.stat(&mut sim.env()).unwrap();
        assert!(rh.node.is_some());
        assert!(rh.different.is_empty());
        assert!(rh.fixup(false, &mut sim.env()).actions.is_empty());
    }

    #[test]
    fn identity_is_the_ip_hostname_pair() {
        let mut sim = seeded_host();
        // same hostname, different address — not the same entry
        sim.hosts.insert("/files/etc/hosts/2/ipaddr", "10.0.0.9");
        sim.hosts.insert("/files/etc/hosts/2/canonical", "db01");

        let mut rh = HostRes::new("db01");
        rh.set("ip", "10.0.0.5").unwrap();

        rh.stat(&mut sim.env()).unwrap();
        assert!(rh.node.is_none());
    }

    #[test]
    fn rewrites_aliases_in_declared_order() {
        let mut sim = seeded_host();
        sim.hosts.insert("/files/etc/hosts/1/alias[1]", "stale");

        let mut rh = HostRes::new("localhost");
        rh.set("ip", "127.0.0.1").unwrap();
        rh.set("aliases", "loopback lo").unwrap();

        rh.stat(&mut sim.env()).unwrap();
        assert_eq!(rh.different, HostFlags::ALIASES);

        let report = rh.fixup(false, &mut sim.env());
        assert_eq!(report.summaries(), ["setting host aliases"]);
        assert_eq!(
            sim.hosts.get_all("/files/etc/hosts/1/alias").unwrap(),
            ["loopback", "lo"]
        );
    }

    #[test]
    fn removes_an_absent_entry() {
        let mut sim = seeded_host();

        let mut rh = HostRes::new("localhost");
        rh.set("ip", "127.0.0.1").unwrap();
        rh.set("present", "no").unwrap();

        rh.stat(&mut sim.env()).unwrap();
        assert!(rh.node.is_some());

        let report = rh.fixup(false, &mut sim.env());
        assert_eq!(report.summaries(), ["remove host entry"]);
        assert_eq!(report.actions[0].outcome, ActionOutcome::Succeeded);
        assert!(sim.hosts.matches("/files/etc/hosts/*").unwrap().is_empty());
    }

    #[test]
    fn dry_run_changes_nothing() {
        let mut sim = seeded_host();
        let before = sim.hosts.len();

        let mut rh = HostRes::new("db01");
        rh.set("ip", "10.0.0.5").unwrap();
        rh.set("aliases", "db").unwrap();

        rh.stat(&mut sim.env()).unwrap();
        let report = rh.fixup(true, &mut sim.env());
        assert_eq!(report.summaries(), ["create host entry", "setting host aliases"]);
        assert!(report.actions.iter().all(|a| a.outcome == ActionOutcome::Skipped));
        assert_eq!(sim.hosts.len(), before);
    }

    #[test]
    fn pack_round_trips_aliases() {
        let mut rh = HostRes::new("db01");
        rh.set("ip", "10.0.0.5").unwrap();
        rh.set("aliases", "db postgres").unwrap();

        let packed = rh.pack();
        let back = HostRes::unpack(&packed).unwrap();
        assert_eq!(back.hostname, "db01");
        assert_eq!(back.ip, "10.0.0.5");
        assert_eq!(back.aliases, rh.aliases);
        assert_eq!(back.enforced, rh.enforced);
        assert_eq!(back.pack(), packed);

        let bare = HostRes::new("plain");
        let back = HostRes::unpack(&bare.pack()).unwrap();
        assert!(back.aliases.is_empty(), "empty alias list round-trips empty");
    }
}
