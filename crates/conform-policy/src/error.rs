use conform_domain::ResourceId;
use conform_resource::ResourceError;
use thiserror::Error;

fn cycle_string(cycle: &[ResourceId]) -> String {
    cycle.iter().map(|id| id.as_str()).collect::<Vec<_>>().join(" -> ")
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("duplicate resource {0}")]
    DuplicateResource(ResourceId),

    #[error("dependency references unknown resource {0}")]
    UnknownDependency(ResourceId),

    #[error("cyclic dependency: {}", cycle_string(.0))]
    CyclicDependency(Vec<ResourceId>),

    #[error(transparent)]
    Resource(#[from] ResourceError),
}
