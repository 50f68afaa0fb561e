use conform_domain::{Dependency, Facts, ResourceId, ResourceKind};
use conform_provider::TemplateRenderer;
use conform_resource::{Catalog, Resource};
use tracing::debug;

use crate::error::PolicyError;
use crate::graph;

/// A policy: the resources declared for one host plus the dependency
/// edges between them. Resources keep insertion order, which doubles as
/// the tie-breaker for topological sorting.
#[derive(Debug, Default)]
pub struct Policy {
    resources: Vec<Resource>,
    deps: Vec<Dependency>,
    normalized: bool,
}

impl Policy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource. The `(kind, key)` identity must be unique.
    pub fn add(&mut self, resource: Resource) -> Result<(), PolicyError> {
        let id = resource.id();
        if self.resources.iter().any(|r| r.id() == id) {
            return Err(PolicyError::DuplicateResource(id));
        }
        self.resources.push(resource);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn resource(&self, index: usize) -> &Resource {
        &self.resources[index]
    }

    pub fn resource_mut(&mut self, index: usize) -> &mut Resource {
        &mut self.resources[index]
    }

    pub fn index_of(&self, id: &ResourceId) -> Option<usize> {
        self.resources.iter().position(|r| &r.id() == id)
    }

    /// First resource of `kind` whose `attr` equals `value`.
    pub fn find_resource(&self, kind: ResourceKind, attr: &str, value: &str) -> Option<&Resource> {
        self.resources
            .iter()
            .filter(|r| r.kind() == kind)
            .find(|r| r.matches(attr, value))
    }

    /// Insert a dependency edge; duplicates are collapsed.
    pub fn add_dependency(&mut self, dep: Dependency) {
        if !self.deps.contains(&dep) {
            debug!(dependent = %dep.dependent, provider = %dep.provider, "dependency added");
            self.deps.push(dep);
        }
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.deps
    }

    /// Resources that declared a dependency on `provider`.
    pub fn dependents_of(&self, provider: &ResourceId) -> Vec<ResourceId> {
        self.deps
            .iter()
            .filter(|d| &d.provider == provider)
            .map(|d| d.dependent.clone())
            .collect()
    }

    /// Run each resource's `norm` (synthesizing implicit dependencies) and
    /// `prepare` (content hashes) exactly once, then topologically sort.
    ///
    /// Returns resource indices in reconcile order. Calling again re-sorts
    /// without re-normalizing.
    pub fn normalize(
        &mut self,
        facts: &Facts,
        templates: &dyn TemplateRenderer,
    ) -> Result<Vec<usize>, PolicyError> {
        if !self.normalized {
            let mut synthesized = Vec::new();
            for resource in &self.resources {
                synthesized.extend(resource.norm(self)?);
            }
            for dep in synthesized {
                self.add_dependency(dep);
            }

            for resource in &mut self.resources {
                resource.prepare(facts, templates)?;
            }

            self.normalized = true;
        }

        graph::order(&self.resources, &self.deps)
    }
}

impl Catalog for Policy {
    fn find(&self, kind: ResourceKind, attr: &str, value: &str) -> Option<ResourceId> {
        self.find_resource(kind, attr, value).map(|r| r.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conform_provider::FileTemplates;

    fn user(name: &str) -> Resource {
        Resource::new(ResourceKind::User, name)
    }

    fn normalize(policy: &mut Policy) -> Vec<usize> {
        policy.normalize(&Facts::new(), &FileTemplates::new()).unwrap()
    }

    #[test]
    fn duplicate_identities_are_rejected() {
        let mut policy = Policy::new();
        policy.add(user("alice")).unwrap();
        assert!(matches!(
            policy.add(user("alice")),
            Err(PolicyError::DuplicateResource(_))
        ));
        // same key, different kind is fine
        policy.add(Resource::new(ResourceKind::Group, "alice")).unwrap();
    }

    #[test]
    fn find_resource_scans_by_kind_and_attribute() {
        let mut policy = Policy::new();
        policy.add(user("alice")).unwrap();
        let mut bob = user("bob");
        bob.set("uid", "1002").unwrap();
        policy.add(bob).unwrap();

        let found = policy.find_resource(ResourceKind::User, "uid", "1002").unwrap();
        assert_eq!(found.key(), "bob");
        assert!(policy.find_resource(ResourceKind::Group, "name", "alice").is_none());
        assert!(policy.find_resource(ResourceKind::User, "uid", "9999").is_none());
    }

    #[test]
    fn normalize_synthesizes_ownership_and_path_dependencies() {
        let mut policy = Policy::new();

        let mut file = Resource::new(ResourceKind::File, "/srv/www/index.html");
        file.set("owner", "web").unwrap();
        policy.add(file).unwrap();

        let mut dir = Resource::new(ResourceKind::Dir, "/srv/www");
        dir.set("owner", "web").unwrap();
        policy.add(dir).unwrap();

        policy.add(user("web")).unwrap();

        let order = normalize(&mut policy);
        let keys: Vec<&str> = order.iter().map(|&i| policy.resource(i).key()).collect();
        assert_eq!(keys, ["web", "/srv/www", "/srv/www/index.html"]);

        // file → user, file → dir, dir → user
        assert_eq!(policy.dependencies().len(), 3);
    }

    #[test]
    fn normalize_runs_norm_only_once() {
        let mut policy = Policy::new();
        let mut file = Resource::new(ResourceKind::File, "/srv/www/index.html");
        file.set("owner", "web").unwrap();
        policy.add(file).unwrap();
        policy.add(user("web")).unwrap();

        normalize(&mut policy);
        let deps = policy.dependencies().len();
        normalize(&mut policy);
        assert_eq!(policy.dependencies().len(), deps, "re-normalizing must not duplicate edges");
    }

    #[test]
    fn explicit_dependencies_order_the_walk() {
        let mut policy = Policy::new();
        let pkg = Resource::new(ResourceKind::Package, "nginx");
        let svc = Resource::new(ResourceKind::Service, "nginx");
        let (pkg_id, svc_id) = (pkg.id(), svc.id());
        policy.add(svc).unwrap();
        policy.add(pkg).unwrap();
        policy.add_dependency(Dependency::new(svc_id.clone(), pkg_id.clone()));

        let order = normalize(&mut policy);
        let kinds: Vec<ResourceKind> = order.iter().map(|&i| policy.resource(i).kind()).collect();
        assert_eq!(kinds, [ResourceKind::Package, ResourceKind::Service]);

        assert_eq!(policy.dependents_of(&pkg_id), [svc_id]);
    }

    #[test]
    fn dependency_cycles_fail_normalization() {
        let mut policy = Policy::new();
        let a = Resource::new(ResourceKind::Service, "a");
        let b = Resource::new(ResourceKind::Service, "b");
        let (a_id, b_id) = (a.id(), b.id());
        policy.add(a).unwrap();
        policy.add(b).unwrap();
        policy.add_dependency(Dependency::new(a_id.clone(), b_id.clone()));
        policy.add_dependency(Dependency::new(b_id, a_id));

        assert!(matches!(
            policy.normalize(&Facts::new(), &FileTemplates::new()),
            Err(PolicyError::CyclicDependency(_))
        ));
    }
}
