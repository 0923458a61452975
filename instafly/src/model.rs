//! The image scoring network.

use std::path::Path;

use instafly_core::prelude::*;

/// Width and height images are resized to before they reach the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSize {
    pub width: usize,
    pub height: usize,
}

impl Default for ImageSize {
    fn default() -> Self {
        Self {
            width: 64,
            height: 64,
        }
    }
}

impl ImageSize {
    /// Channels last shape of a batch of RGB images of this size.
    pub fn batch_shape(&self, batch: usize) -> Shape {
        Shape::from([batch, self.height, self.width, 3])
    }
}

const CONV1_CHAN: usize = 8;
const CONV2_CHAN: usize = 16;
const HIDDEN: usize = 16;

fn conv_out(len: usize) -> Option<usize> {
    // kernel 3, stride 2, padding 1
    len.checked_sub(1).map(|l| l / 2 + 1)
}

/// Describes a [ScoreNet] for images of `size`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreNetConfig {
    pub size: ImageSize,
}

type Features = (Conv2D, ReLU, Conv2D, ReLU, Flatten);
type Head = (Linear, ReLU, Linear);

/// A convolutional regressor from a `(batch, height, width, 3)` image batch to
/// one non-negative score per image.
///
/// ```text
/// conv 3x3/2 (3 -> 8) -> relu -> conv 3x3/2 (8 -> 16) -> relu -> flatten
///   -> linear (-> 16) -> relu -> linear (16 -> 1)   raw score
///   -> relu                                          score
/// ```
///
/// Parameters are stored under `features.*` and `head.*`.
#[derive(Debug, Clone)]
pub struct ScoreNet {
    pub size: ImageSize,
    pub features: Features,
    pub head: Head,
}

impl BuildOnDevice for ScoreNetConfig {
    type Built = ScoreNet;
    fn try_build_on_device(&self, device: &Cpu) -> Result<ScoreNet, Error> {
        let conv = |i, o| Conv2DConfig::new(i, o, 3).with_stride(2).with_padding(1);
        let out = |len| conv_out(len).and_then(conv_out);
        let flat = out(self.size.height)
            .zip(out(self.size.width))
            .and_then(|(h, w)| h.checked_mul(w)?.checked_mul(CONV2_CHAN))
            .ok_or_else(|| Error::InvalidShape(self.size.batch_shape(1)))?;
        let features = device.try_build_module((
            conv(3, CONV1_CHAN),
            ReLU,
            conv(CONV1_CHAN, CONV2_CHAN),
            ReLU,
            Flatten,
        ))?;
        let head = device.try_build_module((
            LinearConfig::new(flat, HIDDEN),
            ReLU,
            LinearConfig::new(HIDDEN, 1),
        ))?;
        Ok(ScoreNet {
            size: self.size,
            features,
            head,
        })
    }
}

impl ScoreNet {
    /// Builds a network for `size` and overwrites its parameters with the ones
    /// stored in the safetensors file at `path`.
    pub fn try_load<P: AsRef<Path>>(device: &Cpu, size: ImageSize, path: P) -> Result<Self, Error> {
        let mut model = device.try_build_module(ScoreNetConfig { size })?;
        model.load_safetensors(path)?;
        Ok(model)
    }

    /// Shape of a single input image.
    pub fn input_shape(&self) -> Shape {
        self.size.batch_shape(1)
    }

    /// The output of the last linear layer, before the final clip. Shape
    /// `(batch, 1)`.
    pub fn try_raw_score<T: Tape>(&self, x: Tensor<T>) -> Result<Tensor<T>, Error> {
        let x = self.features.try_forward(x)?;
        self.head.try_forward(x)
    }
}

impl<T: Tape> Module<Tensor<T>> for ScoreNet {
    type Output = Tensor<T>;

    /// The raw score clipped at zero.
    fn try_forward(&self, x: Tensor<T>) -> Result<Self::Output, Error> {
        self.try_raw_score(x)?.try_relu()
    }
}

impl TensorCollection for ScoreNet {
    fn try_visit(
        &self,
        prefix: &str,
        f: &mut dyn FnMut(&str, &Tensor) -> Result<(), Error>,
    ) -> Result<(), Error> {
        self.features.try_visit(&join(prefix, "features"), f)?;
        self.head.try_visit(&join(prefix, "head"), f)
    }

    fn try_visit_mut(
        &mut self,
        prefix: &str,
        f: &mut dyn FnMut(&str, &mut Tensor) -> Result<(), Error>,
    ) -> Result<(), Error> {
        self.features.try_visit_mut(&join(prefix, "features"), f)?;
        self.head.try_visit_mut(&join(prefix, "head"), f)
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}
