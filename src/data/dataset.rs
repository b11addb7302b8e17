//! Windowed training samples and batching

use std::collections::{HashMap, HashSet};

use burn::data::dataset::Dataset;
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::features::windows::{one_hot_features, ExtractedWindows};
use crate::{MatchId, Result, SplitStrategy, TrylineError};

/// One encoded window and whether a try followed it
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSample {
    pub codes: Vec<u32>,
    pub label: u8,
    pub match_id: MatchId,
}

/// Fixed-length windows sharing one `maxlen` and one code space
#[derive(Debug, Clone)]
pub struct WindowDataset {
    samples: Vec<WindowSample>,
    maxlen: usize,
    num_codes: usize,
}

impl WindowDataset {
    /// Build from extractor output, checking every window has length `maxlen`
    pub fn from_windows(extracted: ExtractedWindows, maxlen: usize, num_codes: usize) -> Result<Self> {
        let ExtractedWindows {
            windows,
            labels,
            match_ids,
        } = extracted;

        let mut samples = Vec::with_capacity(windows.len());
        for ((codes, label), match_id) in windows.into_iter().zip(labels).zip(match_ids) {
            if codes.len() != maxlen {
                return Err(TrylineError::WindowLength {
                    expected: maxlen,
                    found: codes.len(),
                });
            }
            samples.push(WindowSample {
                codes,
                label,
                match_id,
            });
        }

        Ok(WindowDataset {
            samples,
            maxlen,
            num_codes,
        })
    }

    fn with_samples(&self, samples: Vec<WindowSample>) -> Self {
        WindowDataset {
            samples,
            maxlen: self.maxlen,
            num_codes: self.num_codes,
        }
    }

    pub fn samples(&self) -> &[WindowSample] {
        &self.samples
    }

    pub fn maxlen(&self) -> usize {
        self.maxlen
    }

    pub fn num_codes(&self) -> usize {
        self.num_codes
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn windows(&self) -> Vec<Vec<u32>> {
        self.samples.iter().map(|s| s.codes.clone()).collect()
    }

    pub fn labels(&self) -> Vec<u8> {
        self.samples.iter().map(|s| s.label).collect()
    }

    pub fn positives(&self) -> usize {
        self.samples.iter().filter(|s| s.label == 1).count()
    }

    /// Split off a held-out fraction.
    ///
    /// `Random` shuffles individual windows, so overlapping windows from the
    /// same match usually land on both sides. `Grouped` assigns whole
    /// matches to one side. Returns `(train, test)`.
    pub fn split(&self, test_fraction: f32, strategy: SplitStrategy, seed: u64) -> (Self, Self) {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let n = self.samples.len();
        let target = test_size(n, test_fraction);

        let (train, test) = match strategy {
            SplitStrategy::Random => {
                let mut samples = self.samples.clone();
                samples.shuffle(&mut rng);
                let test = samples.split_off(n - target);
                (samples, test)
            }
            SplitStrategy::Grouped => {
                let mut per_match: HashMap<MatchId, usize> = HashMap::new();
                let mut order: Vec<MatchId> = Vec::new();
                for sample in &self.samples {
                    let count = per_match.entry(sample.match_id).or_insert_with(|| {
                        order.push(sample.match_id);
                        0
                    });
                    *count += 1;
                }
                order.shuffle(&mut rng);

                let mut test_matches = HashSet::new();
                let mut taken = 0;
                // keep at least one match for training
                for match_id in order.iter().take(order.len().saturating_sub(1)) {
                    if taken >= target {
                        break;
                    }
                    taken += per_match[match_id];
                    test_matches.insert(*match_id);
                }

                self.samples
                    .iter()
                    .cloned()
                    .partition(|s| !test_matches.contains(&s.match_id))
            }
        };

        log::info!(
            "Split {} windows ({:?}): train={}, test={}",
            n,
            strategy,
            train.len(),
            test.len()
        );

        (self.with_samples(train), self.with_samples(test))
    }

    /// Hold back the last `fraction` of samples, without shuffling
    pub fn split_tail(&self, fraction: f32) -> (Self, Self) {
        let n = self.samples.len();
        let tail = ((n as f32 * fraction) as usize).min(n.saturating_sub(1));
        let (head, rest) = self.samples.split_at(n - tail);
        (self.with_samples(head.to_vec()), self.with_samples(rest.to_vec()))
    }
}

/// Held-out size: rounded up, but never the whole set
fn test_size(n: usize, fraction: f32) -> usize {
    if n < 2 {
        return 0;
    }
    ((n as f32 * fraction).ceil() as usize).clamp(1, n - 1)
}

impl Dataset<WindowSample> for WindowDataset {
    fn get(&self, index: usize) -> Option<WindowSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// Integer code tensor `[batch, maxlen]`
pub fn codes_tensor<B: Backend>(windows: &[Vec<u32>], maxlen: usize, device: &B::Device) -> Tensor<B, 2, Int> {
    let data: Vec<i32> = windows
        .iter()
        .flat_map(|w| w.iter().map(|&c| c as i32))
        .collect();
    Tensor::<B, 1, Int>::from_ints(data.as_slice(), device).reshape([windows.len(), maxlen])
}

/// Per-position one-hot tensor `[batch, maxlen * num_codes]`
pub fn one_hot_tensor<B: Backend>(
    windows: &[Vec<u32>],
    maxlen: usize,
    num_codes: usize,
    device: &B::Device,
) -> Tensor<B, 2> {
    let data: Vec<f32> = windows
        .iter()
        .flat_map(|w| one_hot_features(w, num_codes))
        .collect();
    Tensor::<B, 1>::from_floats(data.as_slice(), device).reshape([windows.len(), maxlen * num_codes])
}

/// Batch of windows for training
#[derive(Debug, Clone)]
pub struct WindowBatch<B: Backend> {
    /// Raw codes: [batch, maxlen]
    pub codes: Tensor<B, 2, Int>,
    /// One-hot features: [batch, maxlen * num_codes]
    pub one_hot: Tensor<B, 2>,
    /// Labels as floats for BCE: [batch]
    pub labels: Tensor<B, 1>,
    /// Labels as class indices for cross-entropy: [batch]
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher for creating training batches
#[derive(Clone)]
pub struct WindowBatcher<B: Backend> {
    device: B::Device,
    maxlen: usize,
    num_codes: usize,
}

impl<B: Backend> WindowBatcher<B> {
    pub fn new(device: B::Device, maxlen: usize, num_codes: usize) -> Self {
        WindowBatcher {
            device,
            maxlen,
            num_codes,
        }
    }
}

impl<B: Backend> burn::data::dataloader::batcher::Batcher<B, WindowSample, WindowBatch<B>>
    for WindowBatcher<B>
{
    fn batch(&self, items: Vec<WindowSample>, _device: &B::Device) -> WindowBatch<B> {
        let windows: Vec<Vec<u32>> = items.iter().map(|s| s.codes.clone()).collect();
        let label_floats: Vec<f32> = items.iter().map(|s| s.label as f32).collect();
        let label_ints: Vec<i32> = items.iter().map(|s| s.label as i32).collect();

        WindowBatch {
            codes: codes_tensor(&windows, self.maxlen, &self.device),
            one_hot: one_hot_tensor(&windows, self.maxlen, self.num_codes, &self.device),
            labels: Tensor::<B, 1>::from_floats(label_floats.as_slice(), &self.device),
            targets: Tensor::<B, 1, Int>::from_ints(label_ints.as_slice(), &self.device),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::data::dataloader::batcher::Batcher;

    type TestBackend = NdArray<f32>;

    fn dataset(matches: usize, per_match: usize) -> WindowDataset {
        let mut extracted = ExtractedWindows::default();
        for m in 0..matches {
            for i in 0..per_match {
                extracted.windows.push(vec![1, 2, (i % 3) as u32]);
                extracted.labels.push(u8::from(i % 4 == 0));
                extracted.match_ids.push(MatchId(m as i64));
            }
        }
        WindowDataset::from_windows(extracted, 3, 51).unwrap()
    }

    #[test]
    fn test_rejects_wrong_length() {
        let extracted = ExtractedWindows {
            windows: vec![vec![1, 2]],
            labels: vec![0],
            match_ids: vec![MatchId(1)],
        };
        assert!(matches!(
            WindowDataset::from_windows(extracted, 3, 51),
            Err(TrylineError::WindowLength { expected: 3, found: 2 })
        ));
    }

    #[test]
    fn test_random_split_sizes() {
        let data = dataset(5, 10);
        let (train, test) = data.split(0.2, SplitStrategy::Random, 42);
        assert_eq!(test.len(), 10);
        assert_eq!(train.len(), 40);

        let (train2, test2) = data.split(0.2, SplitStrategy::Random, 42);
        assert_eq!(train.samples(), train2.samples());
        assert_eq!(test.samples(), test2.samples());
    }

    #[test]
    fn test_grouped_split_keeps_matches_whole() {
        let data = dataset(10, 7);
        let (train, test) = data.split(0.2, SplitStrategy::Grouped, 7);
        assert!(!train.is_empty());
        assert!(!test.is_empty());
        assert_eq!(train.len() + test.len(), 70);

        let train_matches: HashSet<MatchId> = train.samples().iter().map(|s| s.match_id).collect();
        assert!(test.samples().iter().all(|s| !train_matches.contains(&s.match_id)));
    }

    #[test]
    fn test_grouped_split_single_match_stays_in_train() {
        let data = dataset(1, 5);
        let (train, test) = data.split(0.2, SplitStrategy::Grouped, 1);
        assert_eq!(train.len(), 5);
        assert!(test.is_empty());
    }

    #[test]
    fn test_split_tail_keeps_order() {
        let data = dataset(1, 10);
        let (head, tail) = data.split_tail(0.2);
        assert_eq!(head.len(), 8);
        assert_eq!(tail.samples(), &data.samples()[8..]);
    }

    #[test]
    fn test_batch_shapes() {
        let device = Default::default();
        let data = dataset(1, 4);
        let batcher = WindowBatcher::<TestBackend>::new(device, 3, 51);
        let batch = batcher.batch(data.samples().to_vec(), &Default::default());

        assert_eq!(batch.codes.dims(), [4, 3]);
        assert_eq!(batch.one_hot.dims(), [4, 3 * 51]);
        assert_eq!(batch.labels.dims(), [4]);
        assert_eq!(batch.targets.dims(), [4]);

        let total: f32 = batch.one_hot.sum().into_scalar();
        assert_eq!(total, 12.0);
    }
}
