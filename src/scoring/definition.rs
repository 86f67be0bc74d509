//! Versioned architecture schema stored inside a checkpoint.
//!
//! A checkpoint carries only layer sizes and activations chosen from a closed
//! set. The network itself is compiled into this crate, see
//! [`crate::scoring::network`].

use candle_core::Tensor;
use serde::{Deserialize, Serialize};

pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Identity,
    Relu,
    Gelu,
    Silu,
    Tanh,
    Sigmoid,
}

impl Activation {
    pub fn apply(self, xs: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            Activation::Identity => Ok(xs.clone()),
            Activation::Relu => xs.relu(),
            Activation::Gelu => xs.gelu_erf(),
            Activation::Silu => xs.silu(),
            Activation::Tanh => xs.tanh(),
            Activation::Sigmoid => candle_nn::ops::sigmoid(xs),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ImageEncoderSpec {
    #[serde(default)]
    pub conv_channels: Vec<usize>,
    #[serde(default = "default_kernel_size")]
    pub kernel_size: usize,
    #[serde(default = "default_pool")]
    pub pool: usize,
    #[serde(default)]
    pub activation: Activation,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct HeadSpec {
    #[serde(default)]
    pub hidden: Vec<usize>,
    #[serde(default)]
    pub activation: Activation,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ModelDefinition {
    pub format_version: u32,
    pub feature_dim: usize,
    pub image_encoder: ImageEncoderSpec,
    #[serde(default)]
    pub head: HeadSpec,
    #[serde(default)]
    pub output_activation: Activation,
}

fn default_kernel_size() -> usize {
    3
}

fn default_pool() -> usize {
    1
}

impl ModelDefinition {
    /// Structural checks that do not depend on the stored parameters.
    pub fn validate(&self) -> Result<(), String> {
        if self.format_version != FORMAT_VERSION {
            return Err(format!(
                "unsupported format_version {} (expected {FORMAT_VERSION})",
                self.format_version
            ));
        }
        let encoder = &self.image_encoder;
        if encoder.kernel_size == 0 || encoder.kernel_size % 2 == 0 {
            return Err(format!("kernel_size must be odd, got {}", encoder.kernel_size));
        }
        if encoder.pool == 0 {
            return Err("pool must be at least 1".to_string());
        }
        if encoder.conv_channels.contains(&0) || self.head.hidden.contains(&0) {
            return Err("layer widths must be positive".to_string());
        }
        if self.min_image_side().is_none() {
            return Err("pooling stack is too deep".to_string());
        }
        Ok(())
    }

    /// Width of the pooled image embedding fed into the head.
    pub fn embedding_dim(&self) -> usize {
        self.image_encoder.conv_channels.last().copied().unwrap_or(1)
    }

    /// Smallest image side that survives every pooling stage.
    pub fn min_image_side(&self) -> Option<usize> {
        let layers = u32::try_from(self.image_encoder.conv_channels.len()).ok()?;
        self.image_encoder.pool.checked_pow(layers)
    }

    /// Every parameter the network expects, with its shape, in layer order.
    pub fn parameter_shapes(&self) -> Vec<(String, Vec<usize>)> {
        let encoder = &self.image_encoder;
        let k = encoder.kernel_size;
        let mut shapes = Vec::new();

        let mut in_channels = 1;
        for (i, &out_channels) in encoder.conv_channels.iter().enumerate() {
            shapes.push((
                format!("image_encoder.conv{i}.weight"),
                vec![out_channels, in_channels, k, k],
            ));
            shapes.push((format!("image_encoder.conv{i}.bias"), vec![out_channels]));
            in_channels = out_channels;
        }

        let mut width = self.embedding_dim() + self.feature_dim;
        for (i, &hidden) in self.head.hidden.iter().enumerate() {
            shapes.push((format!("head.fc{i}.weight"), vec![hidden, width]));
            shapes.push((format!("head.fc{i}.bias"), vec![hidden]));
            width = hidden;
        }
        shapes.push(("head.out.weight".to_string(), vec![1, width]));
        shapes.push(("head.out.bias".to_string(), vec![1]));

        shapes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> ModelDefinition {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn defaults_fill_optional_fields() {
        let def = parse(r#"{"format_version": 1, "feature_dim": 4, "image_encoder": {}}"#);
        assert_eq!(def.image_encoder.kernel_size, 3);
        assert_eq!(def.image_encoder.pool, 1);
        assert_eq!(def.output_activation, Activation::Identity);
        assert!(def.head.hidden.is_empty());
        assert!(def.validate().is_ok());
    }

    #[test]
    fn parameter_shapes_follow_layer_widths() {
        let def = parse(
            r#"{
                "format_version": 1,
                "feature_dim": 5,
                "image_encoder": {"conv_channels": [4, 8], "kernel_size": 3, "pool": 2, "activation": "relu"},
                "head": {"hidden": [16], "activation": "gelu"},
                "output_activation": "sigmoid"
            }"#,
        );

        let shapes = def.parameter_shapes();
        assert_eq!(
            shapes,
            vec![
                ("image_encoder.conv0.weight".to_string(), vec![4, 1, 3, 3]),
                ("image_encoder.conv0.bias".to_string(), vec![4]),
                ("image_encoder.conv1.weight".to_string(), vec![8, 4, 3, 3]),
                ("image_encoder.conv1.bias".to_string(), vec![8]),
                ("head.fc0.weight".to_string(), vec![16, 13]),
                ("head.fc0.bias".to_string(), vec![16]),
                ("head.out.weight".to_string(), vec![1, 16]),
                ("head.out.bias".to_string(), vec![1]),
            ]
        );
        assert_eq!(def.min_image_side(), Some(4));
    }

    #[test]
    fn validation_rejects_bad_structure() {
        let mut def = parse(r#"{"format_version": 1, "feature_dim": 2, "image_encoder": {"kernel_size": 4}}"#);
        assert!(def.validate().unwrap_err().contains("odd"));

        def.image_encoder.kernel_size = 3;
        def.format_version = 2;
        assert!(def.validate().unwrap_err().contains("format_version"));

        def.format_version = 1;
        def.head.hidden = vec![8, 0];
        assert!(def.validate().is_err());
    }

    #[test]
    fn unknown_activation_does_not_parse() {
        let result: Result<ModelDefinition, _> = serde_json::from_str(
            r#"{"format_version": 1, "feature_dim": 2, "image_encoder": {"activation": "exec"}}"#,
        );
        assert!(result.is_err());
    }
}
