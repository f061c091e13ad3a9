// src/layers/activation.rs
use crate::autograd::{is_no_grad, Tensor, TensorData};
use crate::module::Module;
use ndarray::Zip;
use std::cell::RefCell;
use std::rc::Rc;

// --- Tanh ---
pub struct Tanh;
impl Tanh {
    pub fn new() -> Self {
        Tanh
    }
}

impl Default for Tanh {
    fn default() -> Self {
        Tanh::new()
    }
}

impl Module for Tanh {
    fn forward(&self, input: Tensor) -> Tensor {
        // Forward: tanh(x)
        let data = {
            let input_ref = input.data_ref();
            Zip::from(&*input_ref).par_map_collect(|&x| x.tanh())
        };

        if is_no_grad() || !input.requires_grad() {
            return Tensor::from_data_no_grad(data);
        }

        let output_data = data.clone();
        let input_clone = input.clone();

        Tensor(Rc::new(RefCell::new(TensorData {
            data,
            grad: None,
            parents: vec![input.clone()],
            backward_op: Some(Box::new(move |grad| {
                let mut grad_input = grad.clone();
                // Backward: grad * (1 - y^2)
                Zip::from(&mut grad_input)
                    .and(&output_data)
                    .par_for_each(|g, &y| {
                        *g = *g * (1.0 - y * y);
                    });
                input_clone.add_grad(grad_input);
            })),
            requires_grad: true,
        })))
    }

    fn parameters(&self) -> Vec<Tensor> {
        vec![]
    }
}
