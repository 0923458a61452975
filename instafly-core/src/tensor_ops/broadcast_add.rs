use crate::{
    shapes::Shape,
    tensor::{Error, Merge, Tape, Tensor},
};

impl<LTape: Tape> Tensor<LTape> {
    /// Adds a 1d `bias` along the last axis, broadcasting it over all leading
    /// axes. This is how linear and (channels last) convolution layers add
    /// their bias.
    pub fn try_broadcast_add<RTape>(self, bias: Tensor<RTape>) -> Result<Self, Error>
    where
        LTape: Merge<RTape>,
    {
        let c = match self.shape.dims().last() {
            Some(&c) if bias.shape.dims() == [c] => c,
            _ => {
                let expected = Shape::from(self.shape.dims().last().map(|&c| vec![c]).unwrap_or_default());
                return Err(Error::ShapeMismatch {
                    expected,
                    found: bias.shape.clone(),
                });
            }
        };

        let (lhs, ltape) = self.split_tape();
        let (bias, rtape) = bias.split_tape();
        let mut tape = ltape.merge(rtape);

        let out = lhs.new_like(
            lhs.data
                .iter()
                .zip(bias.data.iter().cycle())
                .map(|(x, b)| x + b)
                .collect(),
        );
        let phantom_out = out.clone();
        tape.try_alloc_grad(&lhs)?;
        tape.try_alloc_grad(&bias)?;
        tape.try_alloc_grad(&out)?;
        tape.add_backward_op(move |grads| {
            grads.backprop2(&lhs, &bias, &phantom_out, |grad_lhs, grad_bias, grad_out| {
                for (i, &go) in grad_out.iter().enumerate() {
                    grad_lhs[i] += go;
                    grad_bias[i % c] += go;
                }
            })
        });
        Ok(out.put_tape(tape))
    }
}
