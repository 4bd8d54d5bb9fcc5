pub mod error;
pub mod manifest;
pub mod store;

pub use error::StoreError;
pub use manifest::{ArtifactManifest, ManifestEntry};
pub use store::OutputStore;
