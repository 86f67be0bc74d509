use super::checkpoint::Checkpoint;
use super::definition::ModelDefinition;
use super::network::ClassRanker;
use crate::error::{Error, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use std::collections::{HashMap, HashSet};
use tracing::info;

/// Builds the compiled network described by `checkpoint` and loads its
/// parameters onto `device`.
///
/// The state must match the definition exactly: every expected parameter
/// present with the expected shape, and nothing else.
pub fn assemble(checkpoint: Checkpoint, device: &Device) -> Result<ClassRanker> {
    let Checkpoint {
        model_definition,
        model_state,
    } = checkpoint;

    model_definition.validate().map_err(Error::ModelMismatch)?;
    check_state(&model_definition, &model_state)?;

    let parameters = model_state.len();
    let vb = VarBuilder::from_tensors(model_state, DType::F32, device);
    let model = ClassRanker::new(model_definition, vb)?;

    info!(
        parameters,
        device = ?device,
        conv_layers = model.definition().image_encoder.conv_channels.len(),
        hidden_layers = model.definition().head.hidden.len(),
        "Model assembled"
    );

    Ok(model)
}

fn check_state(definition: &ModelDefinition, state: &HashMap<String, Tensor>) -> Result<()> {
    let expected = definition.parameter_shapes();
    let mut problems = Vec::new();

    for (name, shape) in &expected {
        match state.get(name) {
            None => problems.push(format!("missing {name}")),
            Some(tensor) if tensor.dims() != shape.as_slice() => problems.push(format!(
                "{name} has shape {:?}, expected {shape:?}",
                tensor.dims()
            )),
            Some(_) => {}
        }
    }

    let known: HashSet<&str> = expected.iter().map(|(name, _)| name.as_str()).collect();
    let mut unexpected: Vec<&str> = state
        .keys()
        .map(String::as_str)
        .filter(|name| !known.contains(name))
        .collect();
    unexpected.sort_unstable();
    problems.extend(unexpected.into_iter().map(|name| format!("unexpected {name}")));

    if problems.is_empty() {
        Ok(())
    } else {
        Err(Error::ModelMismatch(problems.join("; ")))
    }
}
