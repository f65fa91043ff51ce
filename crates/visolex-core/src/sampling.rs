//! Seeded sampling helpers.

use oorandom::Rand64;

/// Draws `k` distinct indices from `0..n` uniformly, in draw order.
///
/// Returns all of `0..n` (shuffled) when `k >= n`.
pub fn sample_without_replacement(n: usize, k: usize, rng: &mut Rand64) -> Vec<usize> {
    let k = k.min(n);
    let mut indices: Vec<usize> = (0..n).collect();
    // Partial Fisher-Yates: the first k slots end up holding the sample.
    for i in 0..k {
        let j = i + rng.rand_range(0..(n - i) as u64) as usize;
        indices.swap(i, j);
    }
    indices.truncate(k);
    indices
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn sample_is_distinct_and_in_range() {
        let mut rng = Rand64::new(42);
        let sample = sample_without_replacement(10_000, 500, &mut rng);
        assert_eq!(sample.len(), 500);
        let unique: HashSet<_> = sample.iter().copied().collect();
        assert_eq!(unique.len(), 500);
        assert!(sample.iter().all(|&i| i < 10_000));
    }

    #[test]
    fn sample_is_deterministic_per_seed() {
        let a = sample_without_replacement(100, 10, &mut Rand64::new(7));
        let b = sample_without_replacement(100, 10, &mut Rand64::new(7));
        let c = sample_without_replacement(100, 10, &mut Rand64::new(8));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn oversized_budget_keeps_everything() {
        let mut sample = sample_without_replacement(5, 50, &mut Rand64::new(1));
        sample.sort_unstable();
        assert_eq!(sample, vec![0, 1, 2, 3, 4]);
        assert!(sample_without_replacement(0, 3, &mut Rand64::new(1)).is_empty());
    }
}
