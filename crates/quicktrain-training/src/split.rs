use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Share of each class carved out for validation when none is supplied.
pub const DEFAULT_HOLDOUT_FRACTION: f64 = 0.2;

/// How a collection is shuffled and split into kept and held-out parts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitPolicy {
    pub fraction: f64,
    /// Fixed seed for a reproducible split; `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl Default for SplitPolicy {
    fn default() -> Self {
        Self { fraction: DEFAULT_HOLDOUT_FRACTION, seed: None }
    }
}

impl SplitPolicy {
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self { seed: Some(seed), ..Self::default() }
    }

    /// Number of items held out of `total`, rounded to nearest.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn holdout_count(&self, total: usize) -> usize {
        let fraction = self.fraction.clamp(0.0, 1.0);
        ((total as f64) * fraction).round() as usize
    }

    /// Shuffles `items` and returns `(kept, held_out)`.
    #[must_use]
    pub fn partition<T>(&self, mut items: Vec<T>) -> (Vec<T>, Vec<T>) {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        items.shuffle(&mut rng);
        let holdout = self.holdout_count(items.len());
        let held_out = items.split_off(items.len() - holdout);
        (items, held_out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_holdout_count_rounds() {
        let policy = SplitPolicy::default();
        assert_eq!(policy.holdout_count(0), 0);
        assert_eq!(policy.holdout_count(2), 0);
        assert_eq!(policy.holdout_count(3), 1);
        assert_eq!(policy.holdout_count(10), 2);
        assert_eq!(policy.holdout_count(13), 3);
    }

    #[test]
    fn test_partition_is_disjoint_and_exhaustive() {
        let items: Vec<u32> = (0..50).collect();
        let (kept, held_out) = SplitPolicy::default().partition(items.clone());

        assert_eq!(held_out.len(), 10);
        let mut all: Vec<u32> = kept.into_iter().chain(held_out).collect();
        all.sort_unstable();
        assert_eq!(all, items);
    }

    #[test]
    fn test_seeded_partition_is_reproducible() {
        let items: Vec<u32> = (0..100).collect();
        let a = SplitPolicy::seeded(42).partition(items.clone());
        let b = SplitPolicy::seeded(42).partition(items);
        assert_eq!(a, b);
    }
}
