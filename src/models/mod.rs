pub mod downloader;
pub mod registry;
pub mod source;
pub mod types;

pub use downloader::ModelProvisioner;
pub use registry::{ModelCatalog, DEFAULT_MODEL};
pub use source::{ArtifactSource, Download, HttpSource};
pub use types::{InstallationRecord, ModelDescriptor};
