use crate::{
    shapes::Shape,
    tensor::{Error, Merge, Tape, Tensor},
};

fn matrix_dims(shape: &Shape) -> Option<(usize, usize)> {
    match shape.dims() {
        &[m, n] => Some((m, n)),
        _ => None,
    }
}

impl<LTape: Tape> Tensor<LTape> {
    /// Matrix multiplication of a `(m, k)` tensor with a `(k, n)` tensor.
    pub fn try_matmul<RTape>(self, rhs: Tensor<RTape>) -> Result<Self, Error>
    where
        LTape: Merge<RTape>,
    {
        let dims = matrix_dims(&self.shape).zip(matrix_dims(&rhs.shape));
        let (m, k, n) = match dims {
            Some(((m, k), (k2, n))) if k == k2 => (m, k, n),
            _ => {
                let k = self.shape.dims().last().copied().unwrap_or(0);
                let n = rhs.shape.dims().last().copied().unwrap_or(0);
                return Err(Error::ShapeMismatch {
                    expected: Shape::from([k, n]),
                    found: rhs.shape.clone(),
                });
            }
        };

        let (lhs, ltape) = self.split_tape();
        let (rhs, rtape) = rhs.split_tape();
        let mut tape = ltape.merge(rtape);

        let mut out = vec![0.0; m * n];
        for i in 0..m {
            for p in 0..k {
                let a = lhs.data[i * k + p];
                let b_row = &rhs.data[p * n..(p + 1) * n];
                for (o, &b) in out[i * n..(i + 1) * n].iter_mut().zip(b_row) {
                    *o += a * b;
                }
            }
        }
        let out = lhs.device.upgrade(out, Shape::from([m, n]));

        let phantom_out = out.clone();
        tape.try_alloc_grad(&lhs)?;
        tape.try_alloc_grad(&rhs)?;
        tape.try_alloc_grad(&out)?;
        tape.add_backward_op(move |grads| {
            grads.backprop2(&lhs, &rhs, &phantom_out, |grad_lhs, grad_rhs, grad_out| {
                for i in 0..m {
                    for p in 0..k {
                        let a = lhs.data[i * k + p];
                        let mut acc = 0.0;
                        for j in 0..n {
                            let go = grad_out[i * n + j];
                            acc += go * rhs.data[p * n + j];
                            grad_rhs[p * n + j] += a * go;
                        }
                        grad_lhs[i * k + p] += acc;
                    }
                }
            })
        });
        Ok(out.put_tape(tape))
    }
}
