use crate::{
    shapes::Shape,
    tensor::{Error, Tape, Tensor},
};

fn try_scaled_sum<T: Tape>(inp: Tensor<T>, scale: f32) -> Result<Tensor<T>, Error> {
    let (inp, mut tape) = inp.split_tape();
    let total = inp.data.iter().sum::<f32>() * scale;
    let out = inp.device.upgrade(vec![total], Shape::scalar());
    let phantom_out = out.clone();
    tape.try_alloc_grad(&inp)?;
    tape.try_alloc_grad(&out)?;
    tape.add_backward_op(move |grads| {
        grads.backprop(&inp, &phantom_out, |grad_inp, grad_out| {
            let g = grad_out[0] * scale;
            for x in grad_inp.iter_mut() {
                *x += g;
            }
        })
    });
    Ok(out.put_tape(tape))
}

impl<T: Tape> Tensor<T> {
    /// Sums all elements into a single element tensor of shape `()`.
    pub fn try_sum(self) -> Result<Self, Error> {
        try_scaled_sum(self, 1.0)
    }

    /// Average of all elements as a tensor of shape `()`.
    pub fn try_mean(self) -> Result<Self, Error> {
        let n = self.shape.num_elements() as f32;
        try_scaled_sum(self, 1.0 / n)
    }
}
