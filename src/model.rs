// src/model.rs
//
// Character-level n-gram MLP for next-character prediction:
// embedding lookup → flatten context window → affine → tanh → affine → logits.

use crate::autograd::Tensor;
use crate::data::{Batch, VOCAB_SIZE};
use crate::layers::{Embedding, Linear, Tanh};
use crate::loss::CrossEntropyLoss;
use crate::metrics::MeanMetric;
use crate::module::Module;
use ndarray::Zip;
use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Debug, Clone)]
pub struct NgramConfig {
    pub vocab_size: usize,
    pub context_size: usize,
    pub embed_dim: usize,
    pub hidden_dim: usize,
    pub lr: f32,
    pub seed: u64,
}

impl Default for NgramConfig {
    fn default() -> Self {
        Self {
            vocab_size: VOCAB_SIZE,
            context_size: 3,
            embed_dim: 2,
            hidden_dim: 100,
            lr: 0.1,
            seed: 42,
        }
    }
}

/// 五个可学习参数：embedding 表 [V,E]、两个权重矩阵、两个 bias 向量
pub struct NgramModel {
    pub config: NgramConfig,
    embedding: Embedding,
    hidden: Linear,
    output: Linear,
    act: Tanh,
    pub train_loss: MeanMetric,
    pub val_loss: MeanMetric,
    pub test_loss: MeanMetric,
}

impl NgramModel {
    /// 参数全部用 N(0,1) 初始化，随机序列由 config.seed 固定：
    /// 构造顺序 enc → W1 → b1 → W2 → b2
    pub fn new(config: NgramConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let flat_dim = config.context_size * config.embed_dim;

        let embedding = Embedding::new(config.vocab_size, config.embed_dim, &mut rng);
        let hidden = Linear::new(flat_dim, config.hidden_dim, &mut rng);
        let output = Linear::new(config.hidden_dim, config.vocab_size, &mut rng);

        Self {
            config,
            embedding,
            hidden,
            output,
            act: Tanh::new(),
            train_loss: MeanMetric::new(),
            val_loss: MeanMetric::new(),
            test_loss: MeanMetric::new(),
        }
    }

    /// ngrams [B, T] → logits [B, V]
    pub fn forward(&self, ngrams: &Tensor) -> Tensor {
        let flat_dim = (self.config.context_size * self.config.embed_dim) as i32;

        let enc = self.embedding.forward(ngrams); // [B, T, E]
        let flat = enc.reshape(vec![-1, flat_dim]); // [B, T*E]
        let hidden = self.act.forward(self.hidden.forward(flat)); // [B, H]
        self.output.forward(hidden) // [B, V]
    }

    /// 一个 batch 的 loss（标量张量）
    pub fn model_step(&self, batch: &Batch) -> Tensor {
        let logits = self.forward(&batch.ngrams);
        CrossEntropyLoss::apply(&logits, &batch.labels)
    }

    /// 训练一步：backward 后手动做 w -= lr * grad 并清空梯度
    pub fn training_step(&mut self, batch: &Batch) -> f32 {
        let loss = self.model_step(batch);
        loss.backward();

        let lr = self.config.lr;
        for param in self.parameters() {
            let mut inner = param.0.borrow_mut();
            let inner = &mut *inner;
            // take() 既取出梯度又完成清零
            let Some(grad) = inner.grad.take() else {
                continue;
            };
            Zip::from(inner.data.view_mut())
                .and(grad.view())
                .for_each(|w, g| {
                    *w -= lr * g;
                });
        }

        let value = loss.item();
        self.train_loss.update(value);
        value
    }

    pub fn validation_step(&mut self, batch: &Batch) -> f32 {
        let value = self.model_step(batch).item();
        self.val_loss.update(value);
        value
    }

    pub fn test_step(&mut self, batch: &Batch) -> f32 {
        let value = self.model_step(batch).item();
        self.test_loss.update(value);
        value
    }
}

impl Module for NgramModel {
    fn forward(&self, input: Tensor) -> Tensor {
        NgramModel::forward(self, &input)
    }

    fn parameters(&self) -> Vec<Tensor> {
        let mut params = self.embedding.parameters();
        params.extend(self.hidden.parameters());
        params.extend(self.output.parameters());
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::no_grad;
    use ndarray::{arr1, arr2, ArrayD};

    fn tiny_config() -> NgramConfig {
        NgramConfig {
            hidden_dim: 16,
            ..NgramConfig::default()
        }
    }

    fn fixture_batch() -> Batch {
        // "..e→m", ".em→m" 类型的两个窗口
        Batch {
            ngrams: Tensor::from_data_no_grad(
                arr2(&[[0.0f32, 0.0, 5.0], [0.0, 5.0, 13.0]]).into_dyn(),
            ),
            labels: Tensor::from_data_no_grad(arr1(&[13.0f32, 13.0]).into_dyn()),
        }
    }

    fn snapshot(model: &NgramModel) -> Vec<ArrayD<f32>> {
        model.parameters().iter().map(|p| p.data()).collect()
    }

    #[test]
    fn model_has_five_parameters_with_expected_shapes() {
        let model = NgramModel::new(NgramConfig::default());
        let params = model.parameters();
        assert_eq!(params.len(), 5);
        assert_eq!(params[0].shape(), vec![27, 2]); // enc
        assert_eq!(params[1].shape(), vec![100, 6]); // W1 [out,in]
        assert_eq!(params[2].shape(), vec![100]); // b1
        assert_eq!(params[3].shape(), vec![27, 100]); // W2
        assert_eq!(params[4].shape(), vec![27]); // b2
    }

    #[test]
    fn forward_produces_logits_per_class() {
        let model = NgramModel::new(tiny_config());
        let batch = fixture_batch();
        let logits = model.forward(&batch.ngrams);
        assert_eq!(logits.shape(), vec![2, 27]);
        assert!(logits.data().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn training_step_updates_parameters_and_records_finite_loss() {
        let mut model = NgramModel::new(tiny_config());
        let batch = fixture_batch();
        let before = snapshot(&model);

        let loss = model.training_step(&batch);
        assert!(loss.is_finite());
        assert!(loss >= 0.0);
        assert_eq!(model.train_loss.count(), 1);

        let after = snapshot(&model);
        for (i, (b, a)) in before.iter().zip(after.iter()).enumerate() {
            assert_ne!(b, a, "parameter {} unchanged after a training step", i);
        }

        // 梯度已清空
        for p in model.parameters() {
            assert!(p.grad().is_none());
        }
    }

    #[test]
    fn same_seed_same_parameters() {
        let a = NgramModel::new(NgramConfig::default());
        let b = NgramModel::new(NgramConfig::default());
        for (pa, pb) in a.parameters().iter().zip(b.parameters().iter()) {
            assert_eq!(pa.data(), pb.data());
        }
    }

    #[test]
    fn eval_mode_disables_graph_building() {
        let mut model = NgramModel::new(tiny_config());
        let batch = fixture_batch();

        model.eval_mode();
        let logits = model.forward(&batch.ngrams);
        assert!(!logits.requires_grad());
        let loss = model.model_step(&batch);
        loss.backward();
        for p in model.parameters() {
            assert!(p.grad().is_none());
        }

        model.train_mode();
        let logits = model.forward(&batch.ngrams);
        assert!(logits.requires_grad());
    }

    #[test]
    fn evaluation_under_no_grad_mutates_nothing() {
        let mut model = NgramModel::new(tiny_config());
        let batch = fixture_batch();
        let before = snapshot(&model);

        let loss = no_grad(|| model.test_step(&batch));
        assert!(loss.is_finite());

        let after = snapshot(&model);
        for (b, a) in before.iter().zip(after.iter()) {
            assert_eq!(b, a);
        }
        for p in model.parameters() {
            assert!(p.grad().is_none());
        }
        assert_eq!(model.test_loss.count(), 1);
    }
}
