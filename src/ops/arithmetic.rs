// src/ops/arithmetic.rs
use crate::autograd::{is_no_grad, Tensor, TensorData};
use ndarray::{ArrayD, ArrayViewD, Zip};
use std::cell::RefCell;
use std::ops::{Add, Sub};
use std::rc::Rc;

/// 把 broadcast 后的梯度归约回 target_shape：
/// 多出来的前导维度 sum 掉，target 为 1 的维度 sum 后再补回
fn reduce_gradient(grad: ArrayViewD<'_, f32>, target_shape: &[usize]) -> ArrayD<f32> {
    if grad.shape() == target_shape {
        return grad.to_owned();
    }

    let mut res = grad.to_owned();
    let g_ndim = res.ndim();
    let t_ndim = target_shape.len();

    if g_ndim > t_ndim {
        for _ in 0..(g_ndim - t_ndim) {
            res = res.sum_axis(ndarray::Axis(0));
        }
    }

    for i in 0..res.ndim() {
        if target_shape[i] == 1 && res.shape()[i] > 1 {
            let summed = res.sum_axis(ndarray::Axis(i));
            res = summed.insert_axis(ndarray::Axis(i));
        } else if target_shape[i] != res.shape()[i] {
            panic!(
                "Gradient reduction mismatch. Grad: {:?}, Target: {:?}",
                grad.shape(),
                target_shape
            );
        }
    }

    res
}

fn binary_op(
    lhs: &Tensor,
    rhs: &Tensor,
    data: ArrayD<f32>,
    negate_rhs: bool,
) -> Tensor {
    let build_graph = !is_no_grad() && (lhs.requires_grad() || rhs.requires_grad());
    if !build_graph {
        return Tensor::from_data_no_grad(data);
    }

    let l = lhs.clone();
    let r = rhs.clone();

    Tensor(Rc::new(RefCell::new(TensorData {
        data,
        grad: None,
        parents: vec![lhs.clone(), rhs.clone()],
        backward_op: Some(Box::new(move |grad| {
            if l.requires_grad() {
                let l_shape = l.data_ref().shape().to_vec();
                l.add_grad(reduce_gradient(grad.view(), &l_shape));
            }
            if r.requires_grad() {
                let r_shape = r.data_ref().shape().to_vec();
                if negate_rhs {
                    let grad_neg = Zip::from(grad).par_map_collect(|&x| -x);
                    r.add_grad(reduce_gradient(grad_neg.view(), &r_shape));
                } else {
                    r.add_grad(reduce_gradient(grad.view(), &r_shape));
                }
            }
        })),
        requires_grad: true,
    })))
}

impl Add for Tensor {
    type Output = Tensor;
    fn add(self, rhs: Tensor) -> Tensor {
        // ndarray 广播 rhs（bias [N] + 输出 [B,N] 即走这里）
        let data = (&*self.data_ref() + &*rhs.data_ref()).into_dyn();
        binary_op(&self, &rhs, data, false)
    }
}

impl<'a, 'b> Add<&'b Tensor> for &'a Tensor {
    type Output = Tensor;
    fn add(self, rhs: &'b Tensor) -> Tensor {
        self.clone() + rhs.clone()
    }
}

impl Sub for Tensor {
    type Output = Tensor;
    fn sub(self, rhs: Tensor) -> Tensor {
        let data = (&*self.data_ref() - &*rhs.data_ref()).into_dyn();
        binary_op(&self, &rhs, data, true)
    }
}

impl<'a, 'b> Sub<&'b Tensor> for &'a Tensor {
    type Output = Tensor;
    fn sub(self, rhs: &'b Tensor) -> Tensor {
        self.clone() - rhs.clone()
    }
}
