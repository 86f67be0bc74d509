//! Installed artifact format: a safetensors container whose tensors are the
//! trained parameters and whose header metadata carries the JSON
//! [`ModelDefinition`] under [`DEFINITION_KEY`].

use super::definition::ModelDefinition;
use crate::error::{Error, Result};
use candle_core::{Device, Tensor};
use safetensors::SafeTensors;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;

pub const DEFINITION_KEY: &str = "model_definition";

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const PICKLE_PROTO: u8 = 0x80;

#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub model_definition: ModelDefinition,
    pub model_state: HashMap<String, Tensor>,
}

impl Checkpoint {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| Error::storage(path, e))?;
        debug!(path = %path.display(), bytes = bytes.len(), "Read checkpoint");
        Self::from_bytes(&bytes, path)
    }

    /// Parses checkpoint bytes; `origin` is only used in error messages.
    pub fn from_bytes(bytes: &[u8], origin: &Path) -> Result<Self> {
        let model_definition = Self::read_definition(bytes, origin)?;

        let model_state = candle_core::safetensors::load_buffer(bytes, &Device::Cpu)
            .map_err(|e| Error::corrupt(origin, format!("unreadable model_state: {e}")))?;
        if model_state.is_empty() {
            return Err(Error::corrupt(origin, "missing model_state"));
        }

        Ok(Self {
            model_definition,
            model_state,
        })
    }

    /// Reads and validates the header definition without materializing tensors.
    pub fn read_definition(bytes: &[u8], origin: &Path) -> Result<ModelDefinition> {
        let (_, metadata) = SafeTensors::read_metadata(bytes).map_err(|e| {
            if bytes.starts_with(ZIP_MAGIC) || bytes.first() == Some(&PICKLE_PROTO) {
                Error::corrupt(
                    origin,
                    "legacy pickled checkpoint; executable model definitions are not supported",
                )
            } else {
                Error::corrupt(origin, format!("not a safetensors checkpoint: {e}"))
            }
        })?;

        let definition_json = metadata
            .metadata()
            .as_ref()
            .and_then(|m| m.get(DEFINITION_KEY))
            .ok_or_else(|| Error::corrupt(origin, format!("missing {DEFINITION_KEY}")))?;

        let model_definition: ModelDefinition = serde_json::from_str(definition_json)
            .map_err(|e| Error::corrupt(origin, format!("unreadable {DEFINITION_KEY}: {e}")))?;
        model_definition
            .validate()
            .map_err(|reason| Error::corrupt(origin, format!("invalid {DEFINITION_KEY}: {reason}")))?;

        Ok(model_definition)
    }

    pub fn to_safetensors_bytes(&self) -> Result<Vec<u8>> {
        let definition =
            serde_json::to_string(&self.model_definition).map_err(candle_core::Error::wrap)?;
        let metadata = Some(HashMap::from([(DEFINITION_KEY.to_string(), definition)]));

        let mut tensors: Vec<(&str, &Tensor)> = self
            .model_state
            .iter()
            .map(|(name, tensor)| (name.as_str(), tensor))
            .collect();
        tensors.sort_by_key(|(name, _)| *name);

        safetensors::serialize(tensors, &metadata)
            .map_err(|e| Error::Tensor(candle_core::Error::wrap(e)))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = self.to_safetensors_bytes()?;
        fs::write(path, bytes).map_err(|e| Error::storage(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{probe_checkpoint, random_checkpoint};
    use tempfile::TempDir;

    #[test]
    fn saved_checkpoint_loads_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.ckpt");
        let original = random_checkpoint(7, 3);
        original.save(&path).unwrap();

        let loaded = Checkpoint::load(&path).unwrap();
        assert_eq!(loaded.model_definition, original.model_definition);
        assert_eq!(loaded.model_state.len(), original.model_state.len());

        let name = "image_encoder.conv1.weight";
        let before = original.model_state[name].flatten_all().unwrap().to_vec1::<f32>().unwrap();
        let after = loaded.model_state[name].flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn missing_definition_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bare.ckpt");
        let state = probe_checkpoint(1.0, &[0.0], 0.0).model_state;
        candle_core::safetensors::save(&state, &path).unwrap();

        let err = Checkpoint::load(&path).unwrap_err();
        assert!(matches!(err, Error::CorruptArtifact { ref reason, .. } if reason.contains(DEFINITION_KEY)));
    }

    #[test]
    fn empty_state_is_corrupt() {
        let mut checkpoint = probe_checkpoint(1.0, &[0.0], 0.0);
        checkpoint.model_state.clear();
        let bytes = checkpoint.to_safetensors_bytes().unwrap();

        let err = Checkpoint::from_bytes(&bytes, Path::new("empty.ckpt")).unwrap_err();
        assert!(matches!(err, Error::CorruptArtifact { ref reason, .. } if reason.contains("model_state")));
    }

    #[test]
    fn legacy_pickle_is_rejected() {
        let err = Checkpoint::from_bytes(b"PK\x03\x04archive/data.pkl", Path::new("v1.0.ckpt"))
            .unwrap_err();
        assert!(matches!(err, Error::CorruptArtifact { ref reason, .. } if reason.contains("legacy")));
    }

    #[test]
    fn garbage_is_corrupt() {
        let err = Checkpoint::from_bytes(b"\x01\x02\x03", Path::new("junk.ckpt")).unwrap_err();
        assert!(matches!(err, Error::CorruptArtifact { .. }));
    }

    #[test]
    fn unsupported_format_version_is_corrupt() {
        let mut checkpoint = probe_checkpoint(1.0, &[0.0], 0.0);
        checkpoint.model_definition.format_version = 9;
        let bytes = checkpoint.to_safetensors_bytes().unwrap();

        let err = Checkpoint::from_bytes(&bytes, Path::new("future.ckpt")).unwrap_err();
        assert!(matches!(err, Error::CorruptArtifact { ref reason, .. } if reason.contains("format_version")));
    }
}
