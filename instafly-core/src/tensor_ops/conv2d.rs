use crate::{
    shapes::Shape,
    tensor::{Error, Merge, Tape, Tensor},
};

/// Geometry of a channels last 2d convolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Conv2DOp {
    stride: usize,
    padding: usize,
    kernel: usize,
    batch: usize,
    chan_in: usize,
    chan_out: usize,
    h_in: usize,
    w_in: usize,
    h_out: usize,
    w_out: usize,
}

impl Conv2DOp {
    fn new(img: &Shape, filters: &Shape, stride: usize, padding: usize) -> Result<Self, Error> {
        let (batch, h_in, w_in, chan_in) = match img.dims() {
            &[b, h, w, c] => (b, h, w, c),
            _ => {
                return Err(Error::ShapeMismatch {
                    expected: Shape::from([1, 1, 1, filters.dim(2).unwrap_or(1)]),
                    found: img.clone(),
                })
            }
        };
        let (kernel, chan_out) = match filters.dims() {
            &[k, k2, c, o] if k == k2 && c == chan_in && k > 0 => (k, o),
            _ => {
                let k = filters.dim(0).unwrap_or(1);
                let o = filters.dim(3).unwrap_or(1);
                return Err(Error::ShapeMismatch {
                    expected: Shape::from([k, k, chan_in, o]),
                    found: filters.clone(),
                });
            }
        };
        let stride = stride.max(1);
        if h_in + 2 * padding < kernel || w_in + 2 * padding < kernel {
            return Err(Error::ShapeMismatch {
                expected: Shape::from([batch, kernel, kernel, chan_in]),
                found: img.clone(),
            });
        }
        Ok(Self {
            stride,
            padding,
            kernel,
            batch,
            chan_in,
            chan_out,
            h_in,
            w_in,
            h_out: (h_in + 2 * padding - kernel) / stride + 1,
            w_out: (w_in + 2 * padding - kernel) / stride + 1,
        })
    }

    fn out_shape(&self) -> Shape {
        Shape::from([self.batch, self.h_out, self.w_out, self.chan_out])
    }

    /// Calls `f(img_index, filter_index, out_index)` for every multiply-add of the
    /// convolution, skipping positions that fall into the zero padding.
    fn for_each_tap(&self, mut f: impl FnMut(usize, usize, usize)) {
        let (k, s, p) = (self.kernel, self.stride, self.padding);
        for b in 0..self.batch {
            for oh in 0..self.h_out {
                for ow in 0..self.w_out {
                    let out_base = ((b * self.h_out + oh) * self.w_out + ow) * self.chan_out;
                    for kh in 0..k {
                        let y = (oh * s + kh).wrapping_sub(p);
                        if y >= self.h_in {
                            continue;
                        }
                        for kw in 0..k {
                            let x = (ow * s + kw).wrapping_sub(p);
                            if x >= self.w_in {
                                continue;
                            }
                            let img_base = ((b * self.h_in + y) * self.w_in + x) * self.chan_in;
                            let filter_base = (kh * k + kw) * self.chan_in * self.chan_out;
                            for ci in 0..self.chan_in {
                                for co in 0..self.chan_out {
                                    f(
                                        img_base + ci,
                                        filter_base + ci * self.chan_out + co,
                                        out_base + co,
                                    );
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

impl<LTape: Tape> Tensor<LTape> {
    /// 2d convolution over a channels last image batch.
    ///
    /// - `self` has shape `(batch, height, width, chan_in)`
    /// - `filters` has shape `(kernel, kernel, chan_in, chan_out)`
    /// - the result has shape `(batch, height_out, width_out, chan_out)` where
    ///   `height_out = (height + 2 * padding - kernel) / stride + 1`
    pub fn try_conv2d<RTape>(
        self,
        filters: Tensor<RTape>,
        stride: usize,
        padding: usize,
    ) -> Result<Self, Error>
    where
        LTape: Merge<RTape>,
    {
        let op = Conv2DOp::new(&self.shape, &filters.shape, stride, padding)?;

        let (img, ltape) = self.split_tape();
        let (filters, rtape) = filters.split_tape();
        let mut tape = ltape.merge(rtape);

        let out_shape = op.out_shape();
        let mut out = vec![0.0; out_shape.num_elements()];
        op.for_each_tap(|i, f, o| out[o] += img.data[i] * filters.data[f]);
        let out = img.device.upgrade(out, out_shape);

        let phantom_out = out.clone();
        tape.try_alloc_grad(&img)?;
        tape.try_alloc_grad(&filters)?;
        tape.try_alloc_grad(&out)?;
        tape.add_backward_op(move |grads| {
            grads.backprop2(&img, &filters, &phantom_out, |grad_img, grad_filters, grad_out| {
                op.for_each_tap(|i, f, o| {
                    grad_img[i] += filters.data[f] * grad_out[o];
                    grad_filters[f] += img.data[i] * grad_out[o];
                })
            })
        });
        Ok(out.put_tape(tape))
    }
}
