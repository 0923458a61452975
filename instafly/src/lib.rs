//! # instafly
//!
//! Collects post thumbnails and their like counts from recorded proxy
//! traffic, trains a small convolutional network to predict how well an image
//! does, and then asks the trained network what it likes best by running
//! gradient ascent directly on the pixels of an image.
//!
//! The pieces, in the order a typical session uses them:
//! - [dump] reads a traffic dump and exports users, posts and thumbnails
//! - [dataset] and [train] fit a [model::ScoreNet] to the exported posts
//! - [visualizer] runs a [instafly_core::optim::Minimizer] on the input of the
//!   trained network and [image_io] writes the result back out as an image

pub mod dataset;
pub mod dump;
pub mod error;
pub mod image_io;
pub mod model;
pub mod train;
pub mod visualizer;

pub use error::Error;
