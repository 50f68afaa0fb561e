use std::path::Path;

use anyhow::{bail, Context, Result};
use conform_domain::{Dependency, ResourceId, ResourceKind};
use conform_policy::Policy;
use conform_resource::Resource;
use serde::Deserialize;
use tracing::debug;

/// Raw YAML shape of a policy manifest.
///
/// The manifest is a direct serialization of the data model: resources are
/// `kind` + `key` + attribute/value pairs handed verbatim to `set`, with
/// optional explicit dependency edges. The loader interprets nothing.
#[derive(Debug, Deserialize)]
pub struct RawPolicy {
    #[serde(default)]
    pub resources: Vec<RawResource>,
    #[serde(default)]
    pub dependencies: Vec<RawDependency>,
}

#[derive(Debug, Deserialize)]
pub struct RawResource {
    pub kind: String,
    pub key: String,
    /// Attribute values; a sequence value repeats the attribute in order
    /// (e.g. `member: [x, "!b"]`).
    #[serde(default)]
    pub attributes: serde_yaml::Mapping,
}

#[derive(Debug, Deserialize)]
pub struct RawDependency {
    /// `kind:key` of the dependent resource.
    pub resource: String,
    /// `kind:key` of the resource it requires.
    pub requires: String,
}

pub fn load_policy(path: &Path) -> Result<Policy> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading policy manifest {}", path.display()))?;
    let raw: RawPolicy = serde_yaml::from_str(&content)
        .with_context(|| format!("parsing policy manifest {}", path.display()))?;

    let mut policy = Policy::new();

    for raw_res in raw.resources {
        let kind: ResourceKind = raw_res
            .kind
            .parse()
            .map_err(|e: String| anyhow::anyhow!("{}: {}", path.display(), e))?;
        debug!(kind = %kind, key = %raw_res.key, "loading resource");

        let mut resource = Resource::new(kind, &raw_res.key);
        for (name, value) in &raw_res.attributes {
            let Some(name) = name.as_str() else {
                bail!("{}: non-string attribute name on {}:{}", path.display(), kind, raw_res.key);
            };
            match value {
                serde_yaml::Value::Sequence(values) => {
                    for value in values {
                        resource
                            .set(name, &scalar_to_string(name, value)?)
                            .with_context(|| format!("on resource {}:{}", kind, raw_res.key))?;
                    }
                }
                other => {
                    resource
                        .set(name, &scalar_to_string(name, other)?)
                        .with_context(|| format!("on resource {}:{}", kind, raw_res.key))?;
                }
            }
        }

        policy
            .add(resource)
            .with_context(|| format!("in policy manifest {}", path.display()))?;
    }

    for raw_dep in raw.dependencies {
        policy.add_dependency(Dependency::new(
            ResourceId(raw_dep.resource),
            ResourceId(raw_dep.requires),
        ));
    }

    Ok(policy)
}

/// Render one YAML scalar the way `set` expects it: booleans become the
/// yes/no convention, numbers their decimal form.
fn scalar_to_string(name: &str, value: &serde_yaml::Value) -> Result<String> {
    match value {
        serde_yaml::Value::String(s) => Ok(s.clone()),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(true) => Ok("yes".to_string()),
        serde_yaml::Value::Bool(false) => Ok("no".to_string()),
        other => bail!("attribute '{}' has unsupported value {:?}", name, other),
    }
}
