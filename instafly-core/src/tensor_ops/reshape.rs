use crate::{
    shapes::Shape,
    tensor::{unique_id, Error, Tape, Tensor},
};

impl<T: Tape> Tensor<T> {
    /// Changes the shape without moving any data. The number of elements must
    /// stay the same.
    pub fn try_reshape(self, shape: impl Into<Shape>) -> Result<Self, Error> {
        let shape = shape.into();
        if shape.num_elements() != self.shape.num_elements() {
            return Err(Error::WrongNumElements {
                expected: self.shape.num_elements(),
                found: shape.num_elements(),
            });
        }
        let (inp, mut tape) = self.split_tape();
        let out = Tensor {
            id: unique_id(),
            data: inp.data.clone(),
            shape,
            device: inp.device.clone(),
            tape: Default::default(),
        };
        let phantom_out: Tensor = out.clone();
        tape.try_alloc_grad(&inp)?;
        tape.try_alloc_grad(&out)?;
        tape.add_backward_op(move |grads| {
            grads.backprop(&inp, &phantom_out, |grad_inp, grad_out| {
                for (g, &go) in grad_inp.iter_mut().zip(grad_out) {
                    *g += go;
                }
            })
        });
        Ok(out.put_tape(tape))
    }
}
