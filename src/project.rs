use crate::error::{Error, Result};
use ndarray::{Array, Array2, Array3, Dimension};
use ndarray_npy::{ReadNpyError, ReadNpyExt};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::info;

pub const FEATURES_FILE: &str = "features.npy";
pub const IMAGES_FILE: &str = "images.npy";

/// Per-particle inputs exported by RELION for one project.
#[derive(Debug, Clone)]
pub struct ProjectArrays {
    pub features: Array2<f32>,
    pub images: Array3<f32>,
}

pub fn load_project(project_dir: &Path) -> Result<ProjectArrays> {
    let features: Array2<f32> = read_npy(&project_dir.join(FEATURES_FILE))?;
    let images: Array3<f32> = read_npy(&project_dir.join(IMAGES_FILE))?;

    info!(
        project = %project_dir.display(),
        samples = features.nrows(),
        features = features.ncols(),
        image_shape = ?images.shape(),
        "Loaded project arrays"
    );

    Ok(ProjectArrays { features, images })
}

/// Reads a float32 or float64 `.npy` file as f32.
fn read_npy<D: Dimension>(path: &Path) -> Result<Array<f32, D>> {
    let open = || {
        File::open(path)
            .map(BufReader::new)
            .map_err(|e| Error::storage(path, e))
    };

    match Array::<f32, D>::read_npy(open()?) {
        Ok(array) => Ok(array),
        Err(ReadNpyError::WrongDescriptor(_)) => Array::<f64, D>::read_npy(open()?)
            .map(|array| array.mapv(|v| v as f32))
            .map_err(|e| npy_error(path, e)),
        Err(e) => Err(npy_error(path, e)),
    }
}

fn npy_error(path: &Path, err: ReadNpyError) -> Error {
    match err {
        ReadNpyError::WrongNdim(expected, actual) => Error::Shape(format!(
            "{} has {actual} dimensions, expected {}",
            path.display(),
            expected.map_or_else(|| "any".to_string(), |n| n.to_string())
        )),
        ReadNpyError::Io(e) => Error::storage(path, e),
        other => Error::Input {
            path: path.to_path_buf(),
            message: other.to_string(),
        },
    }
}
