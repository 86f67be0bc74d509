//! Provisioning and application of the RELION class ranker.
//!
//! A named model is looked up in the [`ModelCatalog`], downloaded and
//! verified once into a local cache by the [`ModelProvisioner`], read back as
//! a [`Checkpoint`], assembled into a [`ClassRanker`] and then used to score
//! per-particle feature/image pairs.

pub mod error;
pub mod models;
pub mod project;
pub mod scoring;
pub mod settings;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{Error, Result};
pub use models::{ArtifactSource, ModelCatalog, ModelDescriptor, ModelProvisioner};
pub use project::{load_project, ProjectArrays};
pub use scoring::{
    assemble, score, Checkpoint, ClassRanker, DeviceSpec, InferenceRunner, ModelDefinition,
    ScoreVector,
};
pub use settings::Settings;

use candle_core::Device;
use std::path::PathBuf;
use tracing::info;

/// An assembled model together with the artifact it was built from.
#[derive(Debug)]
pub struct LoadedModel {
    pub model: ClassRanker,
    pub path: PathBuf,
}

/// Installs `name` if needed, then loads and assembles it on `device`.
///
/// Returns `Ok(None)` when the catalog has no model called `name`.
pub fn install_and_load<S: ArtifactSource>(
    provisioner: &ModelProvisioner<S>,
    name: &str,
    device: &Device,
) -> Result<Option<LoadedModel>> {
    let Some(path) = provisioner.ensure_installed(name)? else {
        return Ok(None);
    };

    let checkpoint = Checkpoint::load(&path)?;
    let model = assemble(checkpoint, device)?;

    info!(model = %name, path = %path.display(), "Model loaded successfully from checkpoint");

    Ok(Some(LoadedModel { model, path }))
}
