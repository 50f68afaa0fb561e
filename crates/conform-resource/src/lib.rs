pub mod dir;
pub mod error;
pub mod file;
pub mod group;
pub mod host;
pub mod package;
pub mod resource;
pub mod service;
pub mod sysctl;
pub mod user;

pub use dir::DirRes;
pub use error::ResourceError;
pub use file::FileRes;
pub use group::GroupRes;
pub use host::HostRes;
pub use package::PackageRes;
pub use resource::{Catalog, Resource};
pub use service::ServiceRes;
pub use sysctl::SysctlRes;
pub use user::UserRes;
