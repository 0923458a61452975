use std::{collections::BTreeMap, path::Path};

use memmap2::MmapOptions;
use safetensors::{
    serialize_to_file,
    tensor::{Dtype as SDtype, SafeTensors, TensorView},
};

use super::{Error, Tensor};
use crate::{nn::TensorCollection, shapes::Shape};

struct TensorData {
    shape: Vec<usize>,
    data: Vec<u8>,
}

/// Collects named tensors and writes them out as one `.safetensors` file.
#[derive(Default)]
pub(crate) struct Writer {
    tensors: BTreeMap<String, TensorData>,
}

impl Writer {
    pub(crate) fn add(&mut self, key: String, tensor: &Tensor) {
        let shape = tensor.shape().dims().to_vec();
        let data: Vec<u8> = tensor.as_slice().iter().flat_map(|f| f.to_le_bytes()).collect();
        self.tensors.insert(key, TensorData { shape, data });
    }

    pub(crate) fn save(&self, path: &Path) -> Result<(), Error> {
        let mut views: BTreeMap<String, TensorView> = BTreeMap::new();
        for (k, tensor) in self.tensors.iter() {
            let view = TensorView::new(SDtype::F32, tensor.shape.clone(), &tensor.data)?;
            views.insert(k.clone(), view);
        }
        serialize_to_file(&views, &None, path)?;
        Ok(())
    }
}

impl Tensor {
    /// Overwrites this tensor's data with the tensor stored under `key`.
    /// The stored tensor must be f32 and have exactly this tensor's shape.
    pub(crate) fn load_safetensor(
        &mut self,
        tensors: &SafeTensors,
        key: &str,
    ) -> Result<(), Error> {
        let view = tensors.tensor(key)?;
        if view.dtype() != SDtype::F32 {
            return Err(Error::UnsupportedDtype {
                name: key.to_string(),
                dtype: format!("{:?}", view.dtype()),
            });
        }
        let found = Shape::from(view.shape());
        if &found != self.shape() {
            return Err(Error::ShapeMismatch {
                expected: self.shape().clone(),
                found,
            });
        }
        let values: Vec<f32> = view
            .data()
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        *self.make_mut() = values;
        Ok(())
    }
}

/// Something that can be saved to a `.safetensors`.
///
/// Every [TensorCollection] can, with its parameters stored under their
/// dotted paths (e.g. `head.0.weight`).
pub trait SaveToSafetensors: TensorCollection {
    /// Save this object into the `.safetensors` file located at `path`.
    fn save_safetensors<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let mut w = Writer::default();
        self.try_visit("", &mut |name, t| {
            w.add(name.to_string(), t);
            Ok(())
        })?;
        w.save(path.as_ref())
    }
}

impl<T: TensorCollection> SaveToSafetensors for T {}

/// Something that can be loaded from a `.safetensors` file.
pub trait LoadFromSafetensors: TensorCollection {
    /// Loads data from a `.safetensors` at the specified `path`. Every
    /// parameter must be present with a matching shape.
    fn load_safetensors<P: AsRef<Path>>(&mut self, path: P) -> Result<(), Error> {
        let f = std::fs::File::open(path)?;
        // SAFETY: the mapping is only read while `f` is open and is dropped
        // before returning.
        let buffer = unsafe { MmapOptions::new().map(&f)? };
        let tensors = SafeTensors::deserialize(&buffer)?;
        self.try_visit_mut("", &mut |name, t| t.load_safetensor(&tensors, name))
    }
}

impl<T: TensorCollection> LoadFromSafetensors for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{nn::*, tests::*};
    use tempfile::NamedTempFile;

    #[test]
    fn test_save_load_linear() {
        let dev: TestDevice = Default::default();
        let arch = (LinearConfig::new(5, 3), ReLU, LinearConfig::new(3, 2));
        let saved = dev.try_build_module(arch).unwrap();
        let mut loaded = Cpu::seed_from_u64(1).try_build_module(arch).unwrap();

        let x = dev.sample_uniform([4, 5]);
        let y = saved.try_forward(x.clone()).unwrap();
        assert_ne!(loaded.try_forward(x.clone()).unwrap().as_vec(), y.as_vec());

        let file = NamedTempFile::new().expect("failed to create tempfile");
        saved.save_safetensors(file.path()).expect("");
        loaded.load_safetensors(file.path()).expect("");

        assert_eq!(loaded.try_forward(x).unwrap().as_vec(), y.as_vec());
    }

    #[test]
    fn test_load_rejects_wrong_shape() {
        let dev: TestDevice = Default::default();
        let saved = dev.try_build_module(LinearConfig::new(5, 3)).unwrap();
        let mut loaded = dev.try_build_module(LinearConfig::new(4, 3)).unwrap();

        let file = NamedTempFile::new().expect("failed to create tempfile");
        saved.save_safetensors(file.path()).expect("");
        let err = loaded.load_safetensors(file.path()).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn test_load_reports_missing_tensor() {
        let dev: TestDevice = Default::default();
        let saved = dev.try_build_module(LinearConfig::new(2, 2)).unwrap();
        let mut loaded = dev
            .try_build_module((LinearConfig::new(2, 2), LinearConfig::new(2, 2)))
            .unwrap();

        let file = NamedTempFile::new().expect("failed to create tempfile");
        saved.save_safetensors(file.path()).expect("");
        let err = loaded.load_safetensors(file.path()).unwrap_err();
        assert!(matches!(err, Error::Safetensors(_)));
    }
}
