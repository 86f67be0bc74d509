pub mod assembler;
pub mod checkpoint;
pub mod definition;
pub mod device;
pub mod inference;
pub mod network;

pub use assembler::assemble;
pub use checkpoint::{Checkpoint, DEFINITION_KEY};
pub use definition::{Activation, HeadSpec, ImageEncoderSpec, ModelDefinition, FORMAT_VERSION};
pub use device::DeviceSpec;
pub use inference::{score, InferenceRunner, ScoreVector, DEFAULT_BATCH_SIZE};
pub use network::ClassRanker;
