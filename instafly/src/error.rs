use std::path::PathBuf;

use instafly_core::shapes::Shape;

use crate::dump::DumpError;

/// Everything that can go wrong while collecting, training or visualizing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] instafly_core::tensor::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed traffic dump: {0}")]
    Dump(#[from] DumpError),

    /// A tensor that should hold a single RGB image does not.
    #[error("expected an image tensor of shape (1, height, width, 3), found {0:?}")]
    NotAnImage(Shape),

    #[error("no samples listed in {0}")]
    EmptyDataset(PathBuf),
}
