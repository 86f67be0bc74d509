use super::definition::ModelDefinition;
use candle_core::{Device, Result, Tensor};
use candle_nn::{Conv2d, Conv2dConfig, Linear, VarBuilder};

/// Particle scoring network.
///
/// Images pass through same-padded convolutions (each followed by the
/// encoder activation and max pooling) and a global average pool. The pooled
/// embedding is concatenated with the per-particle features and fed through
/// the fully connected head, which ends in a single output unit.
///
/// Parameters are plain tensors rather than `Var`s and the network has no
/// train-time layers, so it is always in inference mode.
#[derive(Debug)]
pub struct ClassRanker {
    definition: ModelDefinition,
    convs: Vec<Conv2d>,
    hidden: Vec<Linear>,
    out: Linear,
    device: Device,
}

impl ClassRanker {
    pub fn new(definition: ModelDefinition, vb: VarBuilder) -> Result<Self> {
        let encoder = &definition.image_encoder;
        let cfg = Conv2dConfig {
            padding: encoder.kernel_size / 2,
            ..Default::default()
        };

        let mut convs = Vec::with_capacity(encoder.conv_channels.len());
        let mut in_channels = 1;
        for (i, &out_channels) in encoder.conv_channels.iter().enumerate() {
            convs.push(candle_nn::conv2d(
                in_channels,
                out_channels,
                encoder.kernel_size,
                cfg,
                vb.pp(format!("image_encoder.conv{i}")),
            )?);
            in_channels = out_channels;
        }

        let mut hidden = Vec::with_capacity(definition.head.hidden.len());
        let mut width = definition.embedding_dim() + definition.feature_dim;
        for (i, &units) in definition.head.hidden.iter().enumerate() {
            hidden.push(candle_nn::linear(width, units, vb.pp(format!("head.fc{i}")))?);
            width = units;
        }
        let out = candle_nn::linear(width, 1, vb.pp("head.out"))?;

        Ok(Self {
            device: vb.device().clone(),
            definition,
            convs,
            hidden,
            out,
        })
    }

    pub fn definition(&self) -> &ModelDefinition {
        &self.definition
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// `images` is `[N, 1, H, W]`, `features` is `[N, F]`; returns `[N, 1]`.
    pub fn forward(&self, images: &Tensor, features: &Tensor) -> Result<Tensor> {
        let encoder = &self.definition.image_encoder;

        let mut xs = images.clone();
        for conv in &self.convs {
            xs = encoder.activation.apply(&xs.apply(conv)?)?;
            if encoder.pool > 1 {
                xs = xs.max_pool2d(encoder.pool)?;
            }
        }
        let embedding = xs.mean((2, 3))?;

        let mut xs = Tensor::cat(&[&embedding, features], 1)?;
        for layer in &self.hidden {
            xs = self.definition.head.activation.apply(&xs.apply(layer)?)?;
        }
        self.definition.output_activation.apply(&xs.apply(&self.out)?)
    }
}
