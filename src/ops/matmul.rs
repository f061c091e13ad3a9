// src/ops/matmul.rs
use crate::autograd::{is_no_grad, Tensor, TensorData};
use ndarray::linalg::general_mat_mul;
use ndarray::{Array2, Ix2};
use std::cell::RefCell;
use std::rc::Rc;

// A[..., K] @ B^T, where B is [N(out), K(in)]
// output: [..., N]
pub fn matmul(a: &Tensor, b: &Tensor) -> Tensor {
    let build_graph = !is_no_grad() && (a.requires_grad() || b.requires_grad());

    let (a_shape, b_shape, a_len) = {
        let ad = a.0.borrow();
        let bd = b.0.borrow();
        (
            ad.data.shape().to_vec(),
            bd.data.shape().to_vec(),
            ad.data.len(),
        )
    };

    if b_shape.len() != 2 {
        panic!("MatMul RHS must be 2D, got {:?}", b_shape);
    }

    // b: [N, K]
    let k_dim_a = a_shape[a_shape.len() - 1];
    let n_dim = b_shape[0];
    let k_dim_b = b_shape[1];

    if k_dim_a != k_dim_b {
        panic!(
            "MatMul shape mismatch: a {:?} (K={}) vs b {:?} (K={})",
            a_shape, k_dim_a, b_shape, k_dim_b
        );
    }

    let m_dim = a_len / k_dim_a;

    let res_2d = {
        let ad = a.0.borrow();
        let bd = b.0.borrow();

        let b_2d = bd.data.view().into_dimensionality::<Ix2>().unwrap(); // [N,K]
        let mut res = Array2::<f32>::zeros((m_dim, n_dim));

        // 尝试 view，失败（非连续内存）则 copy
        if let Ok(a_2d_view) = ad.data.view().into_shape((m_dim, k_dim_a)) {
            general_mat_mul(1.0, &a_2d_view, &b_2d.t(), 0.0, &mut res);
        } else {
            let a_2d_owned = ad
                .data
                .to_owned()
                .into_shape((m_dim, k_dim_a))
                .expect("Reshape A failed");
            general_mat_mul(1.0, &a_2d_owned, &b_2d.t(), 0.0, &mut res);
        }

        res
    };

    // 恢复输出形状: [..., N]
    let mut out_shape = a_shape.clone();
    let last_idx = out_shape.len() - 1;
    out_shape[last_idx] = n_dim;

    let result = res_2d.into_shape(out_shape).unwrap().into_dyn();

    if !build_graph {
        return Tensor::from_data_no_grad(result);
    }

    let a_clone = a.clone();
    let b_clone = b.clone();

    Tensor(Rc::new(RefCell::new(TensorData {
        data: result,
        grad: None,
        parents: vec![a_clone.clone(), b_clone.clone()],
        requires_grad: true,
        backward_op: Some(Box::new(move |grad| {
            // grad: [..., N] -> [M,N]
            let g_len = grad.len();
            let g_m = g_len / n_dim;

            let grad_contig = grad.as_standard_layout();
            let grad_2d = grad_contig
                .view()
                .into_shape((g_m, n_dim))
                .expect("Grad reshape failed");

            // Backward 需 clone 数据以避免 RefCell 借用冲突（仅训练时触发）
            let (a_data, b_data) = {
                let ad = a_clone.0.borrow();
                let bd = b_clone.0.borrow();
                (ad.data.clone(), bd.data.clone())
            };

            // B -> [N,K]
            let b_2d = b_data.view().into_dimensionality::<Ix2>().unwrap();

            if a_clone.requires_grad() {
                // dA = dY @ B  -> [M,K]
                let mut da_2d = Array2::<f32>::zeros((m_dim, k_dim_a));
                general_mat_mul(1.0, &grad_2d, &b_2d, 0.0, &mut da_2d);
                a_clone.add_grad(da_2d.into_shape(a_data.shape()).unwrap().into_dyn());
            }

            if b_clone.requires_grad() {
                // A -> [M,K]
                let a_contig = a_data.as_standard_layout();
                let a_2d = a_contig
                    .view()
                    .into_shape((m_dim, k_dim_a))
                    .expect("Reshape A failed in backward");

                // dB = dY^T @ A -> [N,K]
                let mut db_2d = Array2::<f32>::zeros((n_dim, k_dim_a));
                general_mat_mul(1.0, &grad_2d.t(), &a_2d, 0.0, &mut db_2d);
                b_clone.add_grad(db_2d.into_dyn());
            }
        })),
    })))
}
