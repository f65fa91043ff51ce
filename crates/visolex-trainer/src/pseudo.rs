//! # Pseudo-labeled Dataset
//!
//! The unlabeled pool seen through two independent partitions: the teacher's
//! view (pseudo-labels written by the teacher in weakly supervised mode) and
//! the student's view (its own predictions in semi-supervised mode). Rows are
//! downsampled, relabeled and filtered in place once per iteration, so the two
//! partitions may diverge in membership.

use std::collections::HashSet;

use oorandom::Rand64;
use tracing::{debug, info};
use visolex_core::sampling::sample_without_replacement;
use visolex_core::{Example, Prediction};

/// One of the two views of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    Teacher,
    Student,
}

/// Row column a [`PseudoDataset::drop`] filters on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Labels,
    IsNsw,
}

impl Column {
    fn matches(self, row: &Example, value: i64) -> bool {
        match self {
            Self::Labels => row.has_label(value),
            Self::IsNsw => row.has_nsw_flag(value),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PseudoDataset {
    teacher: Vec<Example>,
    student: Vec<Example>,
    rng: Rand64,
}

impl PseudoDataset {
    /// Builds both partitions from the same pool. `seed` drives every downsampling.
    pub fn new(pool: Vec<Example>, seed: u64) -> Self {
        Self {
            teacher: pool.clone(),
            student: pool,
            rng: Rand64::new(u128::from(seed)),
        }
    }

    pub fn partition(&self, partition: Partition) -> &[Example] {
        match partition {
            Partition::Teacher => &self.teacher,
            Partition::Student => &self.student,
        }
    }

    fn partition_mut(&mut self, partition: Partition) -> &mut Vec<Example> {
        match partition {
            Partition::Teacher => &mut self.teacher,
            Partition::Student => &mut self.student,
        }
    }

    pub fn len(&self, partition: Partition) -> usize {
        self.partition(partition).len()
    }

    pub fn is_empty(&self, partition: Partition) -> bool {
        self.partition(partition).is_empty()
    }

    /// Keeps at most `budget` rows per partition, sampled uniformly without replacement.
    ///
    /// Surviving rows keep their relative order.
    pub fn downsample(&mut self, budget: usize) {
        for partition in [Partition::Teacher, Partition::Student] {
            let n = self.len(partition);
            if n <= budget {
                continue;
            }
            let keep: HashSet<usize> = sample_without_replacement(n, budget, &mut self.rng)
                .into_iter()
                .collect();
            let rows = std::mem::take(self.partition_mut(partition));
            *self.partition_mut(partition) = rows
                .into_iter()
                .enumerate()
                .filter(|(i, _)| keep.contains(i))
                .map(|(_, row)| row)
                .collect();
            debug!(?partition, from = n, to = budget, "downsampled");
        }
    }

    /// Replaces a partition's rows with fresh predictions.
    ///
    /// Labels and distributions are overwritten and every row's weights are
    /// recomputed from its distributions.
    pub fn write_predictions(&mut self, partition: Partition, predictions: Vec<Prediction>) {
        info!(?partition, rows = predictions.len(), "updating pseudo-labels");
        *self.partition_mut(partition) = predictions
            .into_iter()
            .map(Prediction::into_example)
            .collect();
    }

    /// Removes every row of `partition` whose `column` contains `value`.
    ///
    /// Returns the number of rows removed. The other partition is untouched.
    pub fn drop(&mut self, column: Column, value: i64, partition: Partition) -> usize {
        let rows = self.partition_mut(partition);
        let before = rows.len();
        rows.retain(|row| !column.matches(row, value));
        let removed = before - rows.len();
        if removed > 0 {
            info!(?partition, ?column, value, removed, "dropped rows");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use visolex_core::{IGNORE_LABEL, SENTINEL_INVALID};

    fn pool(n: u64) -> Vec<Example> {
        (0..n)
            .map(|id| Example::unlabeled(id, vec![0, 10 + id as u32, 2], vec![0, 0, 0]))
            .collect()
    }

    fn prediction(id: u64, preds: Vec<i64>, proba: Vec<Vec<f32>>) -> Prediction {
        Prediction {
            id,
            input_ids: vec![0, 10, 2],
            is_nsw: vec![0, 0, 0],
            align_index: vec![0, 0, 0],
            preds,
            proba,
        }
    }

    #[test]
    fn downsample_10k_to_500() {
        let mut dataset = PseudoDataset::new(pool(10_000), 42);
        dataset.downsample(500);

        for partition in [Partition::Teacher, Partition::Student] {
            let ids: HashSet<u64> = dataset.partition(partition).iter().map(|r| r.id).collect();
            assert_eq!(dataset.len(partition), 500);
            assert_eq!(ids.len(), 500);
            assert!(ids.iter().all(|&id| id < 10_000));
        }
    }

    #[test]
    fn downsample_is_deterministic_and_noop_under_budget() {
        let mut a = PseudoDataset::new(pool(100), 7);
        let mut b = PseudoDataset::new(pool(100), 7);
        a.downsample(10);
        b.downsample(10);
        assert_eq!(a.partition(Partition::Teacher), b.partition(Partition::Teacher));

        let mut small = PseudoDataset::new(pool(5), 7);
        small.downsample(10);
        assert_eq!(small.len(Partition::Student), 5);
    }

    #[test]
    fn weights_follow_written_distributions() {
        let mut dataset = PseudoDataset::new(pool(2), 1);
        dataset.write_predictions(Partition::Teacher, vec![
            prediction(0, vec![0, 11, 2], vec![vec![1.0], vec![0.7, 0.2, 0.1], vec![1.0]]),
            prediction(1, vec![0, 12, 2], vec![vec![0.9, 0.1], vec![0.4, 0.6], vec![1.0]]),
        ]);

        let rows = dataset.partition(Partition::Teacher);
        for row in rows {
            for (weight, dist) in row.weights().iter().zip(row.proba()) {
                assert_eq!(*weight, dist.iter().copied().fold(0.0, f32::max));
            }
        }
        assert_eq!(rows[1].weights(), &[0.9, 0.6, 1.0]);
        assert!(dataset.partition(Partition::Student)[0].proba().is_empty());
    }

    #[test]
    fn drop_only_touches_one_partition() {
        let mut dataset = PseudoDataset::new(pool(3), 1);
        dataset.write_predictions(Partition::Teacher, vec![
            prediction(0, vec![0, 11, 2], vec![vec![1.0]; 3]),
            prediction(1, vec![0, SENTINEL_INVALID, 2], vec![vec![0.3]; 3]),
            prediction(2, vec![0, 13, 2], vec![vec![1.0]; 3]),
        ]);

        let removed = dataset.drop(Column::Labels, SENTINEL_INVALID, Partition::Teacher);
        assert_eq!(removed, 1);
        let ids: Vec<u64> = dataset.partition(Partition::Teacher).iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![0, 2]);
        assert_eq!(dataset.len(Partition::Student), 3);

        assert_eq!(dataset.drop(Column::Labels, SENTINEL_INVALID, Partition::Student), 0);
        assert_eq!(dataset.drop(Column::Labels, IGNORE_LABEL, Partition::Student), 3);
        assert!(dataset.is_empty(Partition::Student));
    }

    #[test]
    fn drop_by_nsw_flag() {
        let mut rows = pool(2);
        rows[1].is_nsw = vec![0, 1, 0];
        let mut dataset = PseudoDataset::new(rows, 1);
        assert_eq!(dataset.drop(Column::IsNsw, 1, Partition::Student), 1);
        assert_eq!(dataset.len(Partition::Teacher), 2);
    }
}
