//! In-memory training data.
//!
//! A [`Dataset`] stores inputs and targets as two tensors sharing a leading
//! sample axis, and hands them out in fixed-size mini-batches.

use crate::error::{Error, Result};
use crate::tensors::Tensor;
use log::warn;
use rand::Rng;
use rand::seq::SliceRandom;

/// Ordered `(input, target)` pairs plus a mini-batch size.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    xs: Tensor,
    ys: Tensor,
    batch_size: usize,
}

impl Dataset {
    /// # Errors
    /// [`Error::InvalidArgument`] if the sample counts differ, either tensor
    /// lacks a sample axis, or `batch_size` is 0.
    pub fn new(xs: Tensor, ys: Tensor, batch_size: usize) -> Result<Self> {
        let (Some(&nx), Some(&ny)) = (xs.shape().first(), ys.shape().first()) else {
            return Err(Error::invalid("dataset tensors need a leading sample axis"));
        };
        if nx != ny {
            return Err(Error::invalid(format!(
                "batch size mismatch: {nx} inputs but {ny} targets"
            )));
        }
        if batch_size == 0 {
            return Err(Error::invalid("mini-batch size must be at least 1"));
        }
        Ok(Self { xs, ys, batch_size })
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.xs.shape()[0]
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of mini-batches; the last one may be short.
    #[must_use]
    pub fn num_batches(&self) -> usize {
        self.len().div_ceil(self.batch_size)
    }

    #[must_use]
    pub fn xs(&self) -> &Tensor {
        &self.xs
    }

    /// All targets, leading axis first.
    #[must_use]
    pub fn ys(&self) -> &Tensor {
        &self.ys
    }

    /// The `i`-th `(input, target)` pair.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] when `i` is out of range.
    pub fn sample(&self, i: usize) -> Result<(Tensor, Tensor)> {
        Ok((self.xs.index_axis0(i)?, self.ys.index_axis0(i)?))
    }

    /// Mini-batches in order, each keeping the leading sample axis.
    pub fn batch_iter(&self) -> impl Iterator<Item = (Tensor, Tensor)> + '_ {
        (0..self.num_batches()).map(move |b| {
            let start = b * self.batch_size;
            let end = (start + self.batch_size).min(self.len());
            (rows(&self.xs, start, end), rows(&self.ys, start, end))
        })
    }

    /// Cuts the dataset into `n` contiguous shards of near-equal size; the
    /// first `len % n` shards hold one extra sample.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] for `n == 0`.
    pub fn split(&self, n: usize) -> Result<Vec<Dataset>> {
        if n == 0 {
            return Err(Error::invalid("cannot split a dataset into 0 shards"));
        }
        let len = self.len();
        if n > len {
            warn!("splitting {len} samples into {n} shards leaves {} empty", n - len);
        }
        let (base, extra) = (len / n, len % n);
        let mut start = 0;
        Ok((0..n)
            .map(|i| {
                let end = start + base + usize::from(i < extra);
                let shard = Dataset {
                    xs: rows(&self.xs, start, end),
                    ys: rows(&self.ys, start, end),
                    batch_size: self.batch_size,
                };
                start = end;
                shard
            })
            .collect())
    }

    /// Permutes the samples in place, keeping inputs paired with targets.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.shuffle(rng);
        self.xs = gather(&self.xs, &order);
        self.ys = gather(&self.ys, &order);
    }
}

fn row_len(t: &Tensor) -> usize {
    t.shape()[1..].iter().product()
}

/// Samples `start..end` along the leading axis.
fn rows(t: &Tensor, start: usize, end: usize) -> Tensor {
    let step = row_len(t);
    let mut shape = t.shape().to_vec();
    shape[0] = end - start;
    Tensor::new(shape, t.data()[start * step..end * step].to_vec())
}

fn gather(t: &Tensor, order: &[usize]) -> Tensor {
    let step = row_len(t);
    let mut data = Vec::with_capacity(t.len());
    for &i in order {
        data.extend_from_slice(&t.data()[i * step..(i + 1) * step]);
    }
    Tensor::new(t.shape().to_vec(), data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn counting(n: usize, batch: usize) -> Dataset {
        let xs = Tensor::new(vec![n, 2], (0..2 * n).map(|v| v as f64).collect());
        let ys = Tensor::new(vec![n, 1], (0..n).map(|v| v as f64).collect());
        Dataset::new(xs, ys, batch).unwrap()
    }

    #[test]
    fn last_batch_may_be_short() {
        let d = counting(5, 2);
        assert_eq!(d.num_batches(), 3);
        let sizes: Vec<usize> = d.batch_iter().map(|(x, _)| x.shape()[0]).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn split_is_contiguous_and_balanced() {
        let shards = counting(7, 3).split(3).unwrap();
        let lens: Vec<usize> = shards.iter().map(Dataset::len).collect();
        assert_eq!(lens, vec![3, 2, 2]);
        assert_eq!(shards[1].ys().data(), &[3.0, 4.0]);
        assert_eq!(counting(2, 1).split(4).unwrap().iter().filter(|s| s.is_empty()).count(), 2);
    }

    #[test]
    fn mismatched_sample_counts_are_rejected() {
        let err = Dataset::new(Tensor::zeros(&[3, 2]), Tensor::zeros(&[2, 1]), 1).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn shuffle_keeps_pairs_together() {
        let mut d = counting(6, 2);
        d.shuffle(&mut StdRng::seed_from_u64(7));
        for i in 0..6 {
            let (x, y) = d.sample(i).unwrap();
            assert_eq!(x.data()[0], 2.0 * y.data()[0]);
        }
    }
}
