use super::{join_path, BuildOnDevice, Module, TensorCollection};
use crate::tensor::{Cpu, Error, Tensor};

macro_rules! tuple_impls {
    ([$($name:ident),+] [$($idx:tt),+], $last:ident, [$($rev_tail:ident),*]) => {
        impl<$($name: BuildOnDevice),+> BuildOnDevice for ($($name,)+) {
            type Built = ($($name::Built, )+);
            fn try_build_on_device(&self, device: &Cpu) -> Result<Self::Built, Error> {
                Ok(($(
                    self.$idx.try_build_on_device(device)?,
                )+))
            }
        }

        impl<$($name: TensorCollection),+> TensorCollection for ($($name,)+) {
            fn try_visit(
                &self,
                prefix: &str,
                f: &mut dyn FnMut(&str, &Tensor) -> Result<(), Error>,
            ) -> Result<(), Error> {
                $(self.$idx.try_visit(&join_path(prefix, stringify!($idx)), f)?;)+
                Ok(())
            }

            fn try_visit_mut(
                &mut self,
                prefix: &str,
                f: &mut dyn FnMut(&str, &mut Tensor) -> Result<(), Error>,
            ) -> Result<(), Error> {
                $(self.$idx.try_visit_mut(&join_path(prefix, stringify!($idx)), f)?;)+
                Ok(())
            }
        }

        impl<
            Input,
            $last:
            $(Module::<$rev_tail ::Output>, $rev_tail: )*
            Module<Input>
        > Module<Input> for ($($name,)+) {
            type Output = $last ::Output;

            /// Calls forward sequentially on each module in the tuple.
            fn try_forward(&self, x: Input) -> Result<Self::Output, Error> {
                $(let x = self.$idx.try_forward(x)?;)+
                Ok(x)
            }
        }
    };
}

tuple_impls!([M1][0], M1, []);
tuple_impls!([M1, M2] [0, 1], M2, [M1]);
tuple_impls!([M1, M2, M3] [0, 1, 2], M3, [M2, M1]);
tuple_impls!([M1, M2, M3, M4] [0, 1, 2, 3], M4, [M3, M2, M1]);
tuple_impls!([M1, M2, M3, M4, M5] [0, 1, 2, 3, 4], M5, [M4, M3, M2, M1]);
tuple_impls!([M1, M2, M3, M4, M5, M6] [0, 1, 2, 3, 4, 5], M6, [M5, M4, M3, M2, M1]);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{nn::*, tests::*};

    #[test]
    fn test_2_tuple_forward_matches_manual() {
        let dev: TestDevice = Default::default();
        let model = dev
            .try_build_module((LinearConfig::new(3, 4), ReLU))
            .unwrap();
        let x = dev.sample_uniform([2, 3]);
        let y = model.try_forward(x.clone()).unwrap();
        let expected = model.0.try_forward(x).unwrap().try_relu().unwrap();
        assert_eq!(y.as_vec(), expected.as_vec());
    }

    #[test]
    fn test_6_tuple_builds_and_runs() {
        let dev: TestDevice = Default::default();
        let model = dev
            .try_build_module((
                LinearConfig::new(3, 4),
                ReLU,
                LinearConfig::new(4, 4),
                ReLU,
                LinearConfig::new(4, 2),
                ReLU,
            ))
            .unwrap();
        let y = model.try_forward(dev.sample_uniform([5, 3])).unwrap();
        assert_eq!(y.shape().dims(), &[5, 2]);
        assert!(y.as_slice().iter().all(|&v| v >= 0.0));
    }
}
