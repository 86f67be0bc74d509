use super::network::ClassRanker;
use crate::error::{Error, Result};
use candle_core::{DType, Tensor};
use ndarray::{s, ArrayView2, ArrayView3, Axis};
use std::fmt;
use tracing::debug;

pub const DEFAULT_BATCH_SIZE: usize = 256;

/// One score per input sample, in input order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScoreVector(Vec<f32>);

impl ScoreVector {
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.0
    }
}

/// Space-terminated scores on one line, the format RELION reads back.
impl fmt::Display for ScoreVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for score in &self.0 {
            write!(f, "{score} ")?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct InferenceRunner {
    batch_size: usize,
}

impl Default for InferenceRunner {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl InferenceRunner {
    /// A `batch_size` of 0 scores everything in a single batch.
    pub fn new(batch_size: usize) -> Self {
        Self { batch_size }
    }

    pub fn score(
        &self,
        model: &ClassRanker,
        features: ArrayView2<'_, f32>,
        images: ArrayView3<'_, f32>,
    ) -> Result<ScoreVector> {
        let samples = features.nrows();
        let image_count = images.len_of(Axis(0));
        if samples != image_count {
            return Err(Error::Shape(format!(
                "{samples} feature rows but {image_count} images"
            )));
        }

        let definition = model.definition();
        let feature_dim = features.ncols();
        if feature_dim != definition.feature_dim {
            return Err(Error::Shape(format!(
                "model expects {} features per sample, got {feature_dim}",
                definition.feature_dim
            )));
        }

        if samples == 0 {
            return Ok(ScoreVector::default());
        }

        let (_, height, width) = images.dim();
        let min_side = definition.min_image_side().unwrap_or(usize::MAX);
        if height < min_side || width < min_side {
            return Err(Error::Shape(format!(
                "images are {height}x{width}, model needs at least {min_side}x{min_side}"
            )));
        }

        let batch = match self.batch_size {
            0 => samples,
            n => n.min(samples),
        };
        let device = model.device();
        let mut scores = Vec::with_capacity(samples);

        for start in (0..samples).step_by(batch) {
            let end = (start + batch).min(samples);
            let count = end - start;

            let features_t = Tensor::from_iter(
                features.slice(s![start..end, ..]).iter().copied(),
                device,
            )?
            .reshape((count, feature_dim))?;
            let images_t = Tensor::from_iter(
                images.slice(s![start..end, .., ..]).iter().copied(),
                device,
            )?
            .reshape((count, height, width))?
            .unsqueeze(1)?;

            let output = model.forward(&images_t, &features_t)?.detach();
            if output.elem_count() != count {
                return Err(Error::ModelMismatch(format!(
                    "model produced {} values for {count} samples",
                    output.elem_count()
                )));
            }
            scores.extend(output.flatten_all()?.to_dtype(DType::F32)?.to_vec1::<f32>()?);

            debug!(start, end, "Scored batch");
        }

        Ok(ScoreVector(scores))
    }
}

/// Scores with the default batch size.
pub fn score(
    model: &ClassRanker,
    features: ArrayView2<'_, f32>,
    images: ArrayView3<'_, f32>,
) -> Result<ScoreVector> {
    InferenceRunner::default().score(model, features, images)
}
