//! Labelled images listed in a metadata CSV.

use std::path::{Path, PathBuf};

use instafly_core::{
    prelude::Cpu,
    tensor::Tensor,
};
use serde::Deserialize;
use tracing::info;

use crate::{image_io::load_image_tensor, model::ImageSize, Error};

/// One row of the metadata CSV. Other columns are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Metadata {
    /// Relative to the image directory.
    pub path: PathBuf,
    pub like_rate: f32,
}

/// Reads every row of a CSV with (at least) `path` and `like_rate` columns.
pub fn read_metadata<P: AsRef<Path>>(csv_path: P) -> Result<Vec<Metadata>, Error> {
    let mut reader = csv::Reader::from_path(csv_path.as_ref())?;
    let rows = reader
        .deserialize()
        .collect::<Result<Vec<Metadata>, csv::Error>>()?;
    Ok(rows)
}

/// Images and their target scores, kept as flat buffers so that batches can be
/// gathered in any order.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub size: ImageSize,
    images: Vec<f32>,
    scores: Vec<f32>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn scores(&self) -> &[f32] {
        &self.scores
    }

    /// Gathers the samples at `indices` into a `(n, height, width, 3)` image
    /// batch and a `(n, 1)` score batch.
    pub fn batch(&self, device: &Cpu, indices: &[usize]) -> Result<(Tensor, Tensor), Error> {
        let per_image = self.size.batch_shape(1).num_elements();
        let mut images = Vec::with_capacity(indices.len() * per_image);
        let mut scores = Vec::with_capacity(indices.len());
        for &i in indices {
            images.extend_from_slice(&self.images[i * per_image..(i + 1) * per_image]);
            scores.push(self.scores[i]);
        }
        let n = indices.len();
        Ok((
            device.try_tensor_from_vec(images, self.size.batch_shape(n))?,
            device.try_tensor_from_vec(scores, [n, 1])?,
        ))
    }
}

/// Loads every image listed in `csv_path`, resized to `size` and scaled into
/// `[0, 1]`.
pub fn load_dataset<P: AsRef<Path>, Q: AsRef<Path>>(
    device: &Cpu,
    csv_path: P,
    image_dir: Q,
    size: ImageSize,
) -> Result<Dataset, Error> {
    let rows = read_metadata(csv_path.as_ref())?;
    if rows.is_empty() {
        return Err(Error::EmptyDataset(csv_path.as_ref().to_path_buf()));
    }
    let mut images = Vec::with_capacity(rows.len() * size.batch_shape(1).num_elements());
    let mut scores = Vec::with_capacity(rows.len());
    for row in rows {
        let img = load_image_tensor(device, image_dir.as_ref().join(&row.path), size)?;
        images.extend_from_slice(img.as_slice());
        scores.push(row.like_rate);
    }
    info!(samples = scores.len(), "loaded dataset");
    Ok(Dataset {
        size,
        images,
        scores,
    })
}
