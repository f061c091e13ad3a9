// src/init.rs
use crate::autograd::Tensor;
use ndarray::{Array, IxDyn};
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand_distr::Normal;

/// 标准正态初始化（N(0,1)），由外部传入的 RNG 决定随机序列，
/// 同一个种子下参数构造顺序固定，整个模型可复现
pub fn randn(shape: &[usize], rng: &mut StdRng) -> Tensor {
    let dist = Normal::new(0.0f32, 1.0).unwrap();
    let data = Array::random_using(IxDyn(shape), dist, rng);
    Tensor::parameter(data)
}
