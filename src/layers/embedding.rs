// src/layers/embedding.rs
use crate::autograd::{is_no_grad, Tensor, TensorData};
use crate::init::randn;
use crate::module::Module;
use ndarray::{Array, Zip};
use rand::rngs::StdRng;
use std::cell::RefCell;
use std::ops::AddAssign;
use std::rc::Rc;

pub struct Embedding {
    pub weight: Tensor, // [vocab_size, embed_dim]
    pub vocab_size: usize,
    pub embed_dim: usize,
}

impl Embedding {
    pub fn new(vocab_size: usize, embed_dim: usize, rng: &mut StdRng) -> Self {
        let weight = randn(&[vocab_size, embed_dim], rng);
        Self {
            weight,
            vocab_size,
            embed_dim,
        }
    }

    /// indices: 任意形状的 f32 id 张量，输出形状 indices.shape + [embed_dim]
    pub fn forward(&self, indices: &Tensor) -> Tensor {
        let e_dim = self.embed_dim;
        let v_size = self.vocab_size;

        let out = {
            // 并行闭包中不能捕获 Ref<'_>（不是 Sync），这里引用保持在调用栈上，
            // Zip 只把 &f32 交给工作线程
            let w_ref = self.weight.data_ref();
            let idx_ref = indices.data_ref();

            let mut out_shape = idx_ref.shape().to_vec();
            out_shape.push(e_dim);
            let mut out = Array::zeros(out_shape);

            let num_elements = idx_ref.len();
            let idx_contig = idx_ref.as_standard_layout();
            let idx_flat = idx_contig
                .view()
                .into_shape(num_elements)
                .expect("Flatten indices failed");
            let mut out_flat = out
                .view_mut()
                .into_shape((num_elements, e_dim))
                .expect("Flatten output failed");

            let w_2d = w_ref
                .view()
                .into_dimensionality::<ndarray::Ix2>()
                .expect("Embedding weight must be 2D");

            Zip::from(out_flat.outer_iter_mut())
                .and(&idx_flat)
                .par_for_each(|mut out_row, &idx_f32| {
                    let idx = idx_f32 as usize;
                    if idx < v_size {
                        out_row.assign(&w_2d.slice(ndarray::s![idx, ..]));
                    } else {
                        panic!("Embedding index out of bounds: {} >= {}", idx, v_size);
                    }
                });

            out
        };

        let build_graph = !is_no_grad() && self.weight.requires_grad();
        if !build_graph {
            return Tensor::from_data_no_grad(out.into_dyn());
        }

        let num_elements = indices.data_ref().len();
        let indices_clone = indices.clone();
        let w_clone = self.weight.clone();
        let v_snap = v_size;
        let e_snap = e_dim;

        Tensor(Rc::new(RefCell::new(TensorData {
            data: out.into_dyn(),
            grad: None,
            parents: vec![indices.clone(), self.weight.clone()],
            backward_op: Some(Box::new(move |grad| {
                // 只对 weight 做 scatter-add，离散索引没有梯度
                let binding = indices_clone.data_ref();
                let idx_contig = binding.as_standard_layout();
                let idx_flat = idx_contig.view().into_shape(num_elements).unwrap();
                let g_contig = grad.as_standard_layout();
                let grad_2d = g_contig.view().into_shape((num_elements, e_snap)).unwrap();

                let mut d_w = Array::zeros((v_snap, e_snap));
                for (i, &idx_f32) in idx_flat.iter().enumerate() {
                    let idx = idx_f32 as usize;
                    if idx < v_snap {
                        d_w.slice_mut(ndarray::s![idx, ..])
                            .add_assign(&grad_2d.slice(ndarray::s![i, ..]));
                    }
                }
                w_clone.add_grad(d_w.into_dyn());
            })),
            requires_grad: true,
        })))
    }
}

impl Module for Embedding {
    fn forward(&self, x: Tensor) -> Tensor {
        self.forward(&x)
    }
    fn parameters(&self) -> Vec<Tensor> {
        vec![self.weight.clone()]
    }
}
