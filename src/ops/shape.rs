// src/ops/shape.rs
use crate::autograd::{is_no_grad, Tensor, TensorData};
use std::cell::RefCell;
use std::rc::Rc;

/// 解析 -1 通配符（最多一个），其余维度必须整除
fn resolve_shape(total: usize, shape: &[i32]) -> Vec<usize> {
    let wildcard_count = shape.iter().filter(|&&x| x == -1).count();
    assert!(
        wildcard_count <= 1,
        "Reshape accepts at most one -1, got {:?}",
        shape
    );

    let known: usize = shape
        .iter()
        .filter(|&&x| x != -1)
        .map(|&x| {
            assert!(x > 0, "Invalid reshape dim {} in {:?}", x, shape);
            x as usize
        })
        .product();

    shape
        .iter()
        .map(|&x| {
            if x == -1 {
                assert!(
                    known != 0 && total % known == 0,
                    "Cannot infer -1: total {} not divisible by {:?}",
                    total,
                    shape
                );
                total / known
            } else {
                x as usize
            }
        })
        .collect()
}

pub fn reshape(input: &Tensor, shape: Vec<i32>) -> Tensor {
    let new_shape = resolve_shape(input.data_ref().len(), &shape);

    let reshaped = {
        let data = input.data_ref();
        // stride 不兼容时 as_standard_layout 会退化为一次 copy
        data.as_standard_layout()
            .to_owned()
            .into_shape(new_shape)
            .expect("Reshape failed: total element count mismatch")
            .into_dyn()
    };

    if is_no_grad() || !input.requires_grad() {
        return Tensor::from_data_no_grad(reshaped);
    }

    let input_clone = input.clone();
    Tensor(Rc::new(RefCell::new(TensorData {
        data: reshaped,
        grad: None,
        parents: vec![input.clone()],
        backward_op: Some(Box::new(move |grad| {
            let old_shape = input_clone.data_ref().shape().to_vec();
            let grad_reshaped = grad
                .as_standard_layout()
                .to_owned()
                .into_shape(old_shape)
                .expect("Backward reshape failed")
                .into_dyn();
            input_clone.add_grad(grad_reshaped);
        })),
        requires_grad: true,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, ArrayD};

    #[test]
    fn reshape_infers_wildcard() {
        let t = Tensor::parameter(Array::from_iter(0..12).mapv(|x| x as f32).into_dyn());
        let r = reshape(&t, vec![-1, 6]);
        assert_eq!(r.shape(), vec![2, 6]);
        let r2 = r.reshape(vec![3, -1]);
        assert_eq!(r2.shape(), vec![3, 4]);
    }

    #[test]
    fn reshape_backward_restores_shape() {
        let t = Tensor::parameter(ArrayD::ones(vec![2, 3, 2]));
        let r = reshape(&t, vec![2, 6]);
        r.backward();
        let g = t.grad().unwrap();
        assert_eq!(g.shape(), &[2, 3, 2]);
        assert_eq!(g, ArrayD::ones(vec![2, 3, 2]));
    }

    #[test]
    #[should_panic(expected = "at most one -1")]
    fn reshape_rejects_double_wildcard() {
        let t = Tensor::parameter(ArrayD::ones(vec![4]));
        reshape(&t, vec![-1, -1]);
    }
}
