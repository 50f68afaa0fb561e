pub mod error;
pub mod facts;
pub mod hash;
pub mod kind;
pub mod names;
pub mod pack;

pub use error::CodecError;
pub use facts::Facts;
pub use hash::ContentHash;
pub use kind::{Dependency, ResourceId, ResourceKind};
pub use names::NameList;
pub use pack::{Packer, Unpacker};
