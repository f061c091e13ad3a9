// src/layers/linear.rs
use crate::autograd::Tensor;
use crate::init::randn;
use crate::module::Module;
use crate::ops::matmul::matmul;
use rand::rngs::StdRng;

pub struct Linear {
    pub weight: Tensor,       // shape: [out_features, in_features]
    pub bias: Option<Tensor>, // shape: [out_features]
}

impl Linear {
    /// 注意：为对齐 nn.Linear.weight 的布局，weight 存成 [out, in]；
    /// 权重与 bias 都用 N(0,1) 初始化，随机序列由传入的 RNG 决定
    pub fn new(in_features: usize, out_features: usize, rng: &mut StdRng) -> Self {
        let weight = randn(&[out_features, in_features], rng);
        let bias = randn(&[out_features], rng);

        Linear {
            weight,
            bias: Some(bias),
        }
    }

    pub fn new_no_bias(in_features: usize, out_features: usize, rng: &mut StdRng) -> Self {
        let weight = randn(&[out_features, in_features], rng);
        Linear { weight, bias: None }
    }
}

impl Module for Linear {
    fn forward(&self, input: Tensor) -> Tensor {
        let y = matmul(&input, &self.weight);

        if let Some(bias) = &self.bias {
            y + bias.clone() // bias: [out]，按 batch 广播
        } else {
            y
        }
    }

    fn parameters(&self) -> Vec<Tensor> {
        let mut params = vec![self.weight.clone()];
        if let Some(b) = &self.bias {
            params.push(b.clone());
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;
    use rand::SeedableRng;

    #[test]
    fn forward_is_affine() {
        let mut rng = StdRng::seed_from_u64(1);
        let layer = Linear::new(3, 2, &mut rng);
        let x = Tensor::from_data_no_grad(arr2(&[[1.0f32, 2.0, 3.0]]).into_dyn());
        let y = layer.forward(x);
        assert_eq!(y.shape(), vec![1, 2]);

        let w = layer.weight.data();
        let b = layer.bias.as_ref().unwrap().data();
        let expected0 = w[[0, 0]] + 2.0 * w[[0, 1]] + 3.0 * w[[0, 2]] + b[[0]];
        assert!((y.data()[[0, 0]] - expected0).abs() < 1e-5);
    }

    #[test]
    fn backward_populates_weight_and_bias_grads() {
        let mut rng = StdRng::seed_from_u64(1);
        let layer = Linear::new(3, 2, &mut rng);
        let x = Tensor::from_data_no_grad(arr2(&[[1.0f32, 2.0, 3.0], [0.5, 0.5, 0.5]]).into_dyn());
        let y = layer.forward(x);
        y.backward();

        // dW = dY^T @ X，全 1 种子 => 每行为列和
        let wg = layer.weight.grad().unwrap();
        assert!((wg[[0, 0]] - 1.5).abs() < 1e-5);
        assert!((wg[[1, 2]] - 3.5).abs() < 1e-5);

        // db = 按 batch 求和的 dY
        let bg = layer.bias.as_ref().unwrap().grad().unwrap();
        assert_eq!(bg.shape(), &[2]);
        assert!((bg[[0]] - 2.0).abs() < 1e-5);
    }

    #[test]
    fn no_bias_variant_has_single_parameter() {
        let mut rng = StdRng::seed_from_u64(1);
        let layer = Linear::new_no_bias(4, 4, &mut rng);
        assert_eq!(layer.parameters().len(), 1);
    }
}
