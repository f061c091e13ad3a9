// src/metrics.rs
//
// Running-mean accumulator for scalar losses. Sum is kept in f64 so that
// many small f32 losses do not lose precision over long epochs.

#[derive(Debug, Default, Clone)]
pub struct MeanMetric {
    sum: f64,
    count: usize,
}

impl MeanMetric {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, value: f32) {
        self.sum += value as f64;
        self.count += 1;
    }

    /// 当前均值；空状态返回 0.0
    pub fn compute(&self) -> f32 {
        if self.count == 0 {
            0.0
        } else {
            (self.sum / self.count as f64) as f32
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// 回到空状态（epoch 边界调用）
    pub fn reset(&mut self) {
        self.sum = 0.0;
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_of_literals_matches() {
        let mut m = MeanMetric::new();
        for v in [1.0f32, 2.0, 3.0, 4.0] {
            m.update(v);
        }
        assert_eq!(m.count(), 4);
        assert!((m.compute() - 2.5).abs() < 1e-7);
    }

    #[test]
    fn reset_returns_to_empty_state() {
        let mut m = MeanMetric::new();
        m.update(10.0);
        assert!(!m.is_empty());
        m.reset();
        assert!(m.is_empty());
        assert_eq!(m.compute(), 0.0);

        // reset 后重新累计从零开始
        m.update(4.0);
        m.update(6.0);
        assert!((m.compute() - 5.0).abs() < 1e-7);
    }

    #[test]
    fn empty_metric_computes_zero() {
        let m = MeanMetric::new();
        assert_eq!(m.compute(), 0.0);
    }
}
