// src/data.rs
//
// Thin data module over a plain-text file of newline-separated names.
// Builds fixed-width n-gram context windows with '.' as the boundary
// symbol, shuffles whole names with a seeded RNG and splits 80/10/10.

use crate::autograd::Tensor;
use anyhow::{bail, Context, Result};
use ndarray::{s, Array1, Array2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fs;
use std::path::Path;

/// '.' + 'a'..'z'
pub const VOCAB_SIZE: usize = 27;
pub const BOUNDARY: char = '.';

pub fn encode_char(c: char) -> Option<usize> {
    match c {
        BOUNDARY => Some(0),
        'a'..='z' => Some(c as usize - 'a' as usize + 1),
        _ => None,
    }
}

pub fn decode_id(id: usize) -> char {
    match id {
        0 => BOUNDARY,
        1..=26 => (b'a' + (id as u8 - 1)) as char,
        _ => panic!("Symbol id {} out of vocabulary", id),
    }
}

/// 一个 mini-batch：ngrams [B, T]，labels [B]，都是 no-grad 常量张量
pub struct Batch {
    pub ngrams: Tensor,
    pub labels: Tensor,
}

/// 一个数据划分的全部样本（按行存放的窗口与标签）
#[derive(Debug)]
pub struct Split {
    contexts: Array2<f32>,
    labels: Array1<f32>,
}

impl Split {
    fn from_windows(windows: &[(Vec<usize>, usize)], context_size: usize) -> Split {
        let n = windows.len();
        let mut contexts = Array2::<f32>::zeros((n, context_size));
        let mut labels = Array1::<f32>::zeros(n);
        for (i, (ctx, label)) in windows.iter().enumerate() {
            for (j, &id) in ctx.iter().enumerate() {
                contexts[[i, j]] = id as f32;
            }
            labels[i] = *label as f32;
        }
        Split { contexts, labels }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// batch_size = 0 表示全量单批
    pub fn num_batches(&self, batch_size: usize) -> usize {
        if self.is_empty() {
            return 0;
        }
        if batch_size == 0 {
            return 1;
        }
        (self.len() + batch_size - 1) / batch_size
    }

    pub fn batches(&self, batch_size: usize) -> impl Iterator<Item = Batch> + '_ {
        let n = self.len();
        let step = if batch_size == 0 { n.max(1) } else { batch_size };
        (0..n).step_by(step).map(move |start| {
            let end = (start + step).min(n);
            let ngrams = self.contexts.slice(s![start..end, ..]).to_owned();
            let labels = self.labels.slice(s![start..end]).to_owned();
            Batch {
                ngrams: Tensor::from_data_no_grad(ngrams.into_dyn()),
                labels: Tensor::from_data_no_grad(labels.into_dyn()),
            }
        })
    }
}

#[derive(Debug)]
pub struct NamesData {
    pub train: Split,
    pub val: Split,
    pub test: Split,
    pub context_size: usize,
}

impl NamesData {
    pub fn load(path: impl AsRef<Path>, context_size: usize, seed: u64) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read names file {}", path.display()))?;

        let names: Vec<String> = raw
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();

        tracing::info!("Loaded {} names from {}", names.len(), path.display());
        Self::from_names(&names, context_size, seed)
    }

    pub fn from_names(names: &[String], context_size: usize, seed: u64) -> Result<Self> {
        if names.is_empty() {
            bail!("Names dataset is empty");
        }
        if context_size == 0 {
            bail!("Context size must be at least 1");
        }

        // 按整个名字洗牌再切分，同一个名字的窗口不会跨越 train/val/test
        let mut shuffled: Vec<&String> = names.iter().collect();
        let mut rng = StdRng::seed_from_u64(seed);
        shuffled.shuffle(&mut rng);

        let n = shuffled.len();
        let idx1 = n * 8 / 10;
        let idx2 = n * 9 / 10;

        let build = |subset: &[&String]| -> Result<Split> {
            let mut windows = Vec::new();
            for name in subset {
                windows_for(name, context_size, &mut windows)?;
            }
            Ok(Split::from_windows(&windows, context_size))
        };

        let train = build(&shuffled[..idx1])?;
        let val = build(&shuffled[idx1..idx2])?;
        let test = build(&shuffled[idx2..])?;

        tracing::info!(
            "Split sizes (windows): train={}, val={}, test={}",
            train.len(),
            val.len(),
            test.len()
        );

        Ok(NamesData {
            train,
            val,
            test,
            context_size,
        })
    }
}

/// 对单个名字滑出 (context, label) 窗口：
/// "emma", T=3 => ...→e, ..e→m, .em→m, emm→a, mma→.
fn windows_for(
    name: &str,
    context_size: usize,
    out: &mut Vec<(Vec<usize>, usize)>,
) -> Result<()> {
    let mut context = vec![0usize; context_size];
    for c in name.chars().chain(std::iter::once(BOUNDARY)) {
        let Some(id) = encode_char(c) else {
            bail!("Name {:?} contains unsupported character {:?}", name, c);
        };
        out.push((context.clone(), id));
        context.rotate_left(1);
        context[context_size - 1] = id;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn vocab_roundtrip() {
        assert_eq!(encode_char('.'), Some(0));
        assert_eq!(encode_char('a'), Some(1));
        assert_eq!(encode_char('z'), Some(26));
        assert_eq!(encode_char('A'), None);
        for id in 0..VOCAB_SIZE {
            assert_eq!(encode_char(decode_id(id)), Some(id));
        }
    }

    #[test]
    fn windows_match_hand_derived_sequence() {
        let mut w = Vec::new();
        windows_for("emma", 3, &mut w).unwrap();
        // e=5, m=13, a=1
        let expected = [
            (vec![0, 0, 0], 5),
            (vec![0, 0, 5], 13),
            (vec![0, 5, 13], 13),
            (vec![5, 13, 13], 1),
            (vec![13, 13, 1], 0),
        ];
        assert_eq!(w.len(), expected.len());
        for (got, want) in w.iter().zip(expected.iter()) {
            assert_eq!(got.0, want.0);
            assert_eq!(got.1, want.1);
        }
    }

    #[test]
    fn rejects_unsupported_characters() {
        let err = NamesData::from_names(&names(&["e-mma"]), 3, 0).unwrap_err();
        assert!(err.to_string().contains("unsupported character"));
    }

    #[test]
    fn split_sizes_are_80_10_10_by_names() {
        let many: Vec<String> = (0..20)
            .map(|i| {
                let c = (b'a' + (i % 26) as u8) as char;
                format!("{}{}{}", c, c, c)
            })
            .collect();
        let data = NamesData::from_names(&many, 3, 42).unwrap();
        // 每个名字 4 个窗口（3 字符 + 终止符）
        assert_eq!(data.train.len(), 16 * 4);
        assert_eq!(data.val.len(), 2 * 4);
        assert_eq!(data.test.len(), 2 * 4);
    }

    #[test]
    fn same_seed_gives_same_split() {
        let ns = names(&[
            "emma", "olivia", "ava", "isabella", "sophia", "charlotte", "mia", "amelia",
            "harper", "evelyn",
        ]);
        let a = NamesData::from_names(&ns, 3, 42).unwrap();
        let b = NamesData::from_names(&ns, 3, 42).unwrap();
        let batch_a = a.train.batches(0).next().unwrap();
        let batch_b = b.train.batches(0).next().unwrap();
        assert_eq!(batch_a.ngrams.data(), batch_b.ngrams.data());
        assert_eq!(batch_a.labels.data(), batch_b.labels.data());
    }

    #[test]
    fn batches_cover_split_exactly() {
        let ns = names(&["emma", "olivia", "ava", "mia", "zoe", "ida", "eva", "lea", "amy", "joy"]);
        let data = NamesData::from_names(&ns, 3, 1).unwrap();

        let total: usize = data
            .train
            .batches(8)
            .map(|b| b.ngrams.shape()[0])
            .sum();
        assert_eq!(total, data.train.len());
        assert_eq!(data.train.num_batches(8), data.train.batches(8).count());

        // batch_size 0 退化为全量单批
        let full: Vec<Batch> = data.train.batches(0).collect();
        assert_eq!(full.len(), 1);
        assert_eq!(full[0].ngrams.shape(), vec![data.train.len(), 3]);
        assert_eq!(full[0].labels.shape(), vec![data.train.len()]);
        assert!(!full[0].ngrams.requires_grad());
    }
}
