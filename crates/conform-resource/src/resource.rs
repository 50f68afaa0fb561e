use std::path::Path;

use conform_domain::{Dependency, Facts, ResourceId, ResourceKind};
use conform_provider::{ResourceEnv, TemplateRenderer};
use conform_report::Report;

use crate::dir::DirRes;
use crate::error::ResourceError;
use crate::file::FileRes;
use crate::group::GroupRes;
use crate::host::HostRes;
use crate::package::PackageRes;
use crate::service::ServiceRes;
use crate::sysctl::SysctlRes;
use crate::user::UserRes;

/// Lookup view of a policy, used by resources to resolve back-references
/// ("owner=alice" → the user resource whose username is alice) while
/// synthesizing implicit dependencies.
pub trait Catalog {
    fn find(&self, kind: ResourceKind, attr: &str, value: &str) -> Option<ResourceId>;
}

/// A typed resource: desired state, enforcement bits, and the observed
/// state cached by `stat`. The set of kinds is closed; dispatch is by
/// `match` on this enum.
#[derive(Debug, Clone)]
pub enum Resource {
    User(UserRes),
    Group(GroupRes),
    File(FileRes),
    Dir(DirRes),
    Package(PackageRes),
    Service(ServiceRes),
    Host(HostRes),
    Sysctl(SysctlRes),
}

impl Resource {
    /// Construct a resource of `kind`, with `key` also setting the kind's
    /// natural primary attribute (username, path, …).
    pub fn new(kind: ResourceKind, key: &str) -> Resource {
        match kind {
            ResourceKind::User => Resource::User(UserRes::new(key)),
            ResourceKind::Group => Resource::Group(GroupRes::new(key)),
            ResourceKind::File => Resource::File(FileRes::new(key)),
            ResourceKind::Dir => Resource::Dir(DirRes::new(key)),
            ResourceKind::Package => Resource::Package(PackageRes::new(key)),
            ResourceKind::Service => Resource::Service(ServiceRes::new(key)),
            ResourceKind::Host => Resource::Host(HostRes::new(key)),
            ResourceKind::Sysctl => Resource::Sysctl(SysctlRes::new(key)),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::User(_) => ResourceKind::User,
            Resource::Group(_) => ResourceKind::Group,
            Resource::File(_) => ResourceKind::File,
            Resource::Dir(_) => ResourceKind::Dir,
            Resource::Package(_) => ResourceKind::Package,
            Resource::Service(_) => ResourceKind::Service,
            Resource::Host(_) => ResourceKind::Host,
            Resource::Sysctl(_) => ResourceKind::Sysctl,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Resource::User(r) => r.key(),
            Resource::Group(r) => r.key(),
            Resource::File(r) => r.key(),
            Resource::Dir(r) => r.key(),
            Resource::Package(r) => r.key(),
            Resource::Service(r) => r.key(),
            Resource::Host(r) => r.key(),
            Resource::Sysctl(r) => r.key(),
        }
    }

    /// The unique `kind:key` identity of this resource.
    pub fn id(&self) -> ResourceId {
        ResourceId::new(self.kind(), self.key())
    }

    /// Parse and store one attribute; sets the matching enforcement bit.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), ResourceError> {
        match self {
            Resource::User(r) => r.set(name, value),
            Resource::Group(r) => r.set(name, value),
            Resource::File(r) => r.set(name, value),
            Resource::Dir(r) => r.set(name, value),
            Resource::Package(r) => r.set(name, value),
            Resource::Service(r) => r.set(name, value),
            Resource::Host(r) => r.set(name, value),
            Resource::Sysctl(r) => r.set(name, value),
        }
    }

    /// Whether this resource's current value for `name` equals `value`.
    pub fn matches(&self, name: &str, value: &str) -> bool {
        match self {
            Resource::User(r) => r.matches(name, value),
            Resource::Group(r) => r.matches(name, value),
            Resource::File(r) => r.matches(name, value),
            Resource::Dir(r) => r.matches(name, value),
            Resource::Package(r) => r.matches(name, value),
            Resource::Service(r) => r.matches(name, value),
            Resource::Host(r) => r.matches(name, value),
            Resource::Sysctl(r) => r.matches(name, value),
        }
    }

    /// Synthesize implicit dependencies (file → owner user, group, and
    /// every dir resource on the path to the root). Runs once, before
    /// reconciliation.
    pub fn norm(&self, catalog: &dyn Catalog) -> Result<Vec<Dependency>, ResourceError> {
        match self {
            Resource::File(r) => r.norm(catalog),
            Resource::Dir(r) => r.norm(catalog),
            _ => Ok(Vec::new()),
        }
    }

    /// Precompute derived desired state (template/source content hashes).
    /// Runs once, after `norm`, before reconciliation.
    pub fn prepare(
        &mut self,
        facts: &Facts,
        templates: &dyn TemplateRenderer,
    ) -> Result<(), ResourceError> {
        match self {
            Resource::File(r) => r.prepare(facts, templates),
            _ => Ok(()),
        }
    }

    /// Read observed state from the host and compute the `different` bits.
    /// Never mutates the host.
    pub fn stat(&mut self, env: &mut ResourceEnv) -> Result<(), ResourceError> {
        match self {
            Resource::User(r) => r.stat(env),
            Resource::Group(r) => r.stat(env),
            Resource::File(r) => r.stat(env),
            Resource::Dir(r) => r.stat(env),
            Resource::Package(r) => r.stat(env),
            Resource::Service(r) => r.stat(env),
            Resource::Host(r) => r.stat(env),
            Resource::Sysctl(r) => r.stat(env),
        }
    }

    /// Apply (or, under `dryrun`, simulate) the minimum corrective actions.
    pub fn fixup(&mut self, dryrun: bool, env: &mut ResourceEnv) -> Report {
        match self {
            Resource::User(r) => r.fixup(dryrun, env),
            Resource::Group(r) => r.fixup(dryrun, env),
            Resource::File(r) => r.fixup(dryrun, env),
            Resource::Dir(r) => r.fixup(dryrun, env),
            Resource::Package(r) => r.fixup(dryrun, env),
            Resource::Service(r) => r.fixup(dryrun, env),
            Resource::Host(r) => r.fixup(dryrun, env),
            Resource::Sysctl(r) => r.fixup(dryrun, env),
        }
    }

    /// Serialize to the wire format. Observed-state caches are not shipped.
    pub fn pack(&self) -> String {
        match self {
            Resource::User(r) => r.pack(),
            Resource::Group(r) => r.pack(),
            Resource::File(r) => r.pack(),
            Resource::Dir(r) => r.pack(),
            Resource::Package(r) => r.pack(),
            Resource::Service(r) => r.pack(),
            Resource::Host(r) => r.pack(),
            Resource::Sysctl(r) => r.pack(),
        }
    }

    /// Inverse of [`Resource::pack`], dispatching on the tag prefix.
    pub fn unpack(packed: &str) -> Result<Resource, ResourceError> {
        let kind = ResourceKind::from_wire(packed).ok_or(conform_domain::CodecError::Tag {
            expected: "a res_*:: tag".to_string(),
        })?;
        Ok(match kind {
            ResourceKind::User => Resource::User(UserRes::unpack(packed)?),
            ResourceKind::Group => Resource::Group(GroupRes::unpack(packed)?),
            ResourceKind::File => Resource::File(FileRes::unpack(packed)?),
            ResourceKind::Dir => Resource::Dir(DirRes::unpack(packed)?),
            ResourceKind::Package => Resource::Package(PackageRes::unpack(packed)?),
            ResourceKind::Service => Resource::Service(ServiceRes::unpack(packed)?),
            ResourceKind::Host => Resource::Host(HostRes::unpack(packed)?),
            ResourceKind::Sysctl => Resource::Sysctl(SysctlRes::unpack(packed)?),
        })
    }

    /// A dependency provider of this resource was actually changed by its
    /// fixup. Only services care (they schedule a reload).
    pub fn notify(&mut self, provider: &ResourceId) {
        if let Resource::Service(r) = self {
            r.notify(provider);
        }
    }
}

// ── Shared attribute parsing ──────────────────────────────────────────────────

/// Attribute truthiness: anything but "no" is yes.
pub(crate) fn truthy(value: &str) -> bool {
    value != "no"
}

pub(crate) fn parse_u32(name: &str, value: &str) -> Result<u32, ResourceError> {
    value.parse().map_err(|_| ResourceError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
    })
}

/// Parse a permission mode with C `strtol(_, _, 0)` prefix rules
/// (`0x…` hex, `0…` octal, otherwise decimal); only the low 12 bits kept.
pub(crate) fn parse_mode(name: &str, value: &str) -> Result<u32, ResourceError> {
    let invalid = || ResourceError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
    };
    let parsed = if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|_| invalid())?
    } else if value.len() > 1 && value.starts_with('0') {
        u32::from_str_radix(&value[1..], 8).map_err(|_| invalid())?
    } else {
        value.parse().map_err(|_| invalid())?
    };
    Ok(parsed & 0o7777)
}

/// Dependencies on every `Dir` resource lying between `path` and the
/// filesystem root.
pub(crate) fn path_dependencies(
    dependent: &ResourceId,
    path: &str,
    catalog: &dyn Catalog,
) -> Vec<Dependency> {
    let mut deps = Vec::new();
    for ancestor in Path::new(path).ancestors().skip(1) {
        if ancestor == Path::new("/") || ancestor.as_os_str().is_empty() {
            break;
        }
        let ancestor = ancestor.to_string_lossy();
        if let Some(provider) = catalog.find(ResourceKind::Dir, "path", &ancestor) {
            deps.push(Dependency::new(dependent.clone(), provider));
        }
    }
    deps
}
