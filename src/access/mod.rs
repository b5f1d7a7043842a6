pub mod attachment;
pub mod error;
pub mod resolver;
pub mod scope;
pub mod store;

pub use attachment::AttachmentPolicy;
pub use error::AccessError;
pub use resolver::{AccessDecision, AccessRequest, AccessResolver, Denial};
pub use scope::CachedScope;
pub use store::{AccessStore, CatalogStore, MetadataStore};
