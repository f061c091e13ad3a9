// src/loss.rs
use crate::autograd::{is_no_grad, Tensor, TensorData};
use ndarray::{arr0, Array2, Zip};
use rayon::prelude::*; // Zip::into_par_iter 的并行组合子
use std::cell::RefCell;
use std::rc::Rc;

// --- Cross Entropy Loss ---
// logits: [Batch, Classes]，labels: [Batch] 的类别下标（f32 存储）
// 行级并行：每行做 max-shift softmax，loss 为 batch 平均的 -log p[label]
pub struct CrossEntropyLoss;

impl CrossEntropyLoss {
    pub fn apply(logits: &Tensor, labels: &Tensor) -> Tensor {
        let (loss_val, softmax_output, batch_size) = {
            let logits_ref = logits.data_ref();
            let labels_ref = labels.data_ref();

            assert_eq!(
                logits_ref.ndim(),
                2,
                "CrossEntropy expects [Batch, Classes] logits, got {:?}",
                logits_ref.shape()
            );
            let batch_size = logits_ref.shape()[0];
            let dim = logits_ref.shape()[1];
            assert_eq!(
                labels_ref.len(),
                batch_size,
                "Label count {} != batch size {}",
                labels_ref.len(),
                batch_size
            );

            let logits_2d = logits_ref
                .view()
                .into_dimensionality::<ndarray::Ix2>()
                .unwrap();
            let labels_contig = labels_ref.as_standard_layout();
            let labels_flat = labels_contig.view().into_shape(batch_size).unwrap();

            // 分配内存存 softmax 结果供 backward 使用
            let mut softmax_out = Array2::<f32>::zeros((batch_size, dim));

            let total_loss: f32 = Zip::from(softmax_out.outer_iter_mut())
                .and(logits_2d.outer_iter())
                .and(&labels_flat)
                .into_par_iter()
                .map(|(mut sm_row, l_row, &label_f32)| {
                    let label = label_f32 as usize;
                    assert!(
                        label < dim,
                        "Label {} out of range for {} classes",
                        label,
                        dim
                    );

                    // --- row-wise softmax（减 max 防溢出）---
                    let max_val = l_row.fold(f32::NEG_INFINITY, |a, &b| a.max(b));
                    let mut sum_exp = 0.0f32;
                    for (s_val, &l_val) in sm_row.iter_mut().zip(l_row.iter()) {
                        let e = (l_val - max_val).exp();
                        *s_val = e;
                        sum_exp += e;
                    }

                    let inv_sum = 1.0 / sum_exp;
                    for s_val in sm_row.iter_mut() {
                        *s_val *= inv_sum;
                    }

                    // -log p[label]
                    let epsilon = 1e-9;
                    -(sm_row[label] + epsilon).ln()
                })
                .sum();

            (
                total_loss / batch_size as f32,
                softmax_out,
                batch_size,
            )
        };

        let result = arr0(loss_val).into_dyn();

        if is_no_grad() || !logits.requires_grad() {
            return Tensor::from_data_no_grad(result);
        }

        let logits_clone = logits.clone();
        let labels_clone = labels.clone();
        let softmax_cache = softmax_output;

        Tensor(Rc::new(RefCell::new(TensorData {
            data: result,
            grad: None,
            parents: vec![logits.clone()],
            backward_op: Some(Box::new(move |grad_output| {
                let grad_val = grad_output.first().copied().unwrap_or(0.0);
                let factor = grad_val / batch_size as f32;

                // Backward: (p - onehot) / N * grad
                let labels_ref = labels_clone.data_ref();
                let labels_contig = labels_ref.as_standard_layout();
                let labels_flat = labels_contig.view().into_shape(batch_size).unwrap();

                let mut grad_logits = softmax_cache.clone();
                Zip::from(grad_logits.outer_iter_mut())
                    .and(&labels_flat)
                    .par_for_each(|mut g_row, &label_f32| {
                        let label = label_f32 as usize;
                        g_row[label] -= 1.0;
                        g_row.mapv_inplace(|v| v * factor);
                    });

                logits_clone.add_grad(grad_logits.into_dyn());
            })),
            requires_grad: true,
        })))
    }
}
