use serde::{Deserialize, Serialize};

// ── Resource kinds ────────────────────────────────────────────────────────────

/// The closed set of resource kinds the engine reconciles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    User,
    Group,
    File,
    Dir,
    Package,
    Service,
    Host,
    Sysctl,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 8] = [
        ResourceKind::User,
        ResourceKind::Group,
        ResourceKind::File,
        ResourceKind::Dir,
        ResourceKind::Package,
        ResourceKind::Service,
        ResourceKind::Host,
        ResourceKind::Sysctl,
    ];

    /// Tag prefixing this kind's wire encoding.
    pub fn wire_tag(&self) -> &'static str {
        match self {
            ResourceKind::User => "res_user::",
            ResourceKind::Group => "res_group::",
            ResourceKind::File => "res_file::",
            ResourceKind::Dir => "res_dir::",
            ResourceKind::Package => "res_package::",
            ResourceKind::Service => "res_service::",
            ResourceKind::Host => "res_host::",
            ResourceKind::Sysctl => "res_sysctl::",
        }
    }

    /// Recover the kind from a wire encoding's tag prefix.
    pub fn from_wire(packed: &str) -> Option<Self> {
        ResourceKind::ALL
            .into_iter()
            .find(|k| packed.starts_with(k.wire_tag()))
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResourceKind::User => "user",
            ResourceKind::Group => "group",
            ResourceKind::File => "file",
            ResourceKind::Dir => "dir",
            ResourceKind::Package => "package",
            ResourceKind::Service => "service",
            ResourceKind::Host => "host",
            ResourceKind::Sysctl => "sysctl",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(ResourceKind::User),
            "group" => Ok(ResourceKind::Group),
            "file" => Ok(ResourceKind::File),
            "dir" | "directory" => Ok(ResourceKind::Dir),
            "package" => Ok(ResourceKind::Package),
            "service" => Ok(ResourceKind::Service),
            "host" => Ok(ResourceKind::Host),
            "sysctl" => Ok(ResourceKind::Sysctl),
            other => Err(format!("unknown resource kind '{}'", other)),
        }
    }
}

// ── Identifiers ───────────────────────────────────────────────────────────────

/// Unique identity of a resource within a policy: `kind:key`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId(pub String);

impl ResourceId {
    pub fn new(kind: ResourceKind, key: &str) -> Self {
        ResourceId(format!("{}:{}", kind, key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Dependencies ──────────────────────────────────────────────────────────────

/// Directed edge "dependent depends on provider": the provider must be
/// reconciled before the dependent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub dependent: ResourceId,
    pub provider: ResourceId,
}

impl Dependency {
    pub fn new(dependent: ResourceId, provider: ResourceId) -> Self {
        Dependency { dependent, provider }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_renders_kind_and_key() {
        let id = ResourceId::new(ResourceKind::User, "alice");
        assert_eq!(id.as_str(), "user:alice");
        assert_eq!(ResourceId::new(ResourceKind::File, "/etc/motd").as_str(), "file:/etc/motd");
    }

    #[test]
    fn wire_tag_round_trips() {
        for kind in ResourceKind::ALL {
            let packed = format!("{}{{}}", kind.wire_tag());
            assert_eq!(ResourceKind::from_wire(&packed), Some(kind));
        }
        assert_eq!(ResourceKind::from_wire("res_widget::{}"), None);
    }

    #[test]
    fn kind_parses_from_manifest_names() {
        assert_eq!("dir".parse::<ResourceKind>().unwrap(), ResourceKind::Dir);
        assert_eq!("directory".parse::<ResourceKind>().unwrap(), ResourceKind::Dir);
        assert!("router".parse::<ResourceKind>().is_err());
    }
}
