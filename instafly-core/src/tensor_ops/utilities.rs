use crate::tensor::{Error, Merge, Tape, Tensor};

/// An elementwise function together with its derivative.
pub(crate) trait UnaryDerivative: 'static + Copy {
    /// Whether [UnaryDerivative::df] wants `f(x)` instead of `x`.
    const DF_USES_FX: bool;
    fn f(&self, x: f32) -> f32;
    /// Receives `f(x)` if [UnaryDerivative::DF_USES_FX] is true, otherwise `x`.
    fn df(&self, x: f32) -> f32;
}

/// An elementwise function of two arguments with its partial derivatives.
pub(crate) trait BinaryDerivative: 'static + Copy {
    fn f(&self, x: f32, y: f32) -> f32;
    fn dfdx(&self, x: f32, y: f32) -> f32;
    fn dfdy(&self, x: f32, y: f32) -> f32;
}

pub(crate) fn try_unary_op<Op: UnaryDerivative, T: Tape>(
    op: Op,
    inp: Tensor<T>,
) -> Result<Tensor<T>, Error> {
    let (inp, mut tape) = inp.split_tape();
    let out = inp.new_like(inp.data.iter().map(|&x| op.f(x)).collect());
    let phantom_out = out.clone();
    tape.try_alloc_grad(&inp)?;
    tape.try_alloc_grad(&out)?;
    tape.add_backward_op(move |grads| {
        grads.backprop(&inp, &phantom_out, |grad_inp, grad_out| {
            let xs = if Op::DF_USES_FX {
                phantom_out.as_slice()
            } else {
                inp.as_slice()
            };
            for ((g, &x), &go) in grad_inp.iter_mut().zip(xs).zip(grad_out) {
                *g += op.df(x) * go;
            }
        })
    });
    Ok(out.put_tape(tape))
}

pub(crate) fn try_binary_op<Op: BinaryDerivative, LhsTape: Tape + Merge<RhsTape>, RhsTape>(
    op: Op,
    lhs: Tensor<LhsTape>,
    rhs: Tensor<RhsTape>,
) -> Result<Tensor<LhsTape>, Error> {
    if lhs.shape() != rhs.shape() {
        return Err(Error::ShapeMismatch {
            expected: lhs.shape().clone(),
            found: rhs.shape().clone(),
        });
    }
    let (lhs, ltape) = lhs.split_tape();
    let (rhs, rtape) = rhs.split_tape();
    let mut tape = ltape.merge(rtape);
    let out = lhs.new_like(
        lhs.data
            .iter()
            .zip(rhs.data.iter())
            .map(|(&x, &y)| op.f(x, y))
            .collect(),
    );
    let phantom_out = out.clone();
    tape.try_alloc_grad(&lhs)?;
    tape.try_alloc_grad(&rhs)?;
    tape.try_alloc_grad(&out)?;
    tape.add_backward_op(move |grads| {
        grads.backprop2(&lhs, &rhs, &phantom_out, |grad_lhs, grad_rhs, grad_out| {
            for (i, &go) in grad_out.iter().enumerate() {
                let (x, y) = (lhs.data[i], rhs.data[i]);
                grad_lhs[i] += op.dfdx(x, y) * go;
                grad_rhs[i] += op.dfdy(x, y) * go;
            }
        })
    });
    Ok(out.put_tape(tape))
}
