//! Fixtures shared by unit tests.

use crate::error::{Error, Result};
use crate::models::{ArtifactSource, Download};
use crate::scoring::{Activation, Checkpoint, HeadSpec, ImageEncoderSpec, ModelDefinition};
use candle_core::{Device, Tensor};
use flate2::write::GzEncoder;
use flate2::Compression;
use rand::{rngs::StdRng, Rng, SeedableRng};
use sha2::{Digest, Sha256};
use std::cell::Cell;
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::rc::Rc;

/// Serves a fixed body and counts how often it was asked to.
pub(crate) struct MemorySource {
    pub body: Vec<u8>,
    pub fetches: Rc<Cell<usize>>,
    pub offline: bool,
}

impl MemorySource {
    pub fn new(body: Vec<u8>) -> (Self, Rc<Cell<usize>>) {
        let fetches = Rc::new(Cell::new(0));
        let source = Self {
            body,
            fetches: fetches.clone(),
            offline: false,
        };
        (source, fetches)
    }
}

impl ArtifactSource for MemorySource {
    fn open(&self, url: &str) -> Result<Download> {
        self.fetches.set(self.fetches.get() + 1);
        if self.offline {
            return Err(Error::network(url, "connection refused"));
        }
        Ok(Download {
            total: Some(self.body.len() as u64),
            body: Box::new(Cursor::new(self.body.clone())),
        })
    }
}

pub(crate) fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Linear probe with no convolutions or hidden layers:
/// `score = image_weight * mean(image) + feature_weights . features + bias`.
pub(crate) fn probe_checkpoint(image_weight: f32, feature_weights: &[f32], bias: f32) -> Checkpoint {
    let model_definition = ModelDefinition {
        format_version: 1,
        feature_dim: feature_weights.len(),
        image_encoder: ImageEncoderSpec {
            conv_channels: Vec::new(),
            kernel_size: 3,
            pool: 1,
            activation: Activation::Identity,
        },
        head: HeadSpec::default(),
        output_activation: Activation::Identity,
    };

    let mut weights = vec![image_weight];
    weights.extend_from_slice(feature_weights);
    let width = weights.len();

    let model_state = HashMap::from([
        (
            "head.out.weight".to_string(),
            Tensor::from_vec(weights, (1, width), &Device::Cpu).unwrap(),
        ),
        (
            "head.out.bias".to_string(),
            Tensor::from_vec(vec![bias], 1, &Device::Cpu).unwrap(),
        ),
    ]);

    Checkpoint {
        model_definition,
        model_state,
    }
}

/// Two conv stages (pool 2), one hidden layer, sigmoid output, seeded weights.
pub(crate) fn random_checkpoint(seed: u64, feature_dim: usize) -> Checkpoint {
    let model_definition = ModelDefinition {
        format_version: 1,
        feature_dim,
        image_encoder: ImageEncoderSpec {
            conv_channels: vec![2, 4],
            kernel_size: 3,
            pool: 2,
            activation: Activation::Relu,
        },
        head: HeadSpec {
            hidden: vec![8],
            activation: Activation::Tanh,
        },
        output_activation: Activation::Sigmoid,
    };

    let mut rng = StdRng::seed_from_u64(seed);
    let model_state = model_definition
        .parameter_shapes()
        .into_iter()
        .map(|(name, shape)| {
            let len = shape.iter().product();
            let values: Vec<f32> = (0..len).map(|_| rng.gen_range(-0.5f32..0.5)).collect();
            let tensor = Tensor::from_vec(values, shape, &Device::Cpu).unwrap();
            (name, tensor)
        })
        .collect();

    Checkpoint {
        model_definition,
        model_state,
    }
}
