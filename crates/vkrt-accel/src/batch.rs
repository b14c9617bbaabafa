//! Batch planning for bottom-level builds.

use std::ops::Range;

/// Split meshes, in order, into contiguous build batches.
///
/// `sizes[k]` is the queried structure size of mesh `k`. A batch is flushed
/// before mesh `k` joins it when the batch is non-empty and its total plus
/// `sizes[k]` would exceed `budget`. The last batch is always flushed.
///
/// Every mesh lands in exactly one batch. A batch only exceeds the budget
/// when it holds a single mesh that is larger than the budget on its own.
pub fn plan_batches(sizes: &[u64], budget: u64) -> Vec<Range<usize>> {
    let mut batches = Vec::new();
    let mut start = 0;
    let mut total: u64 = 0;

    for (k, &size) in sizes.iter().enumerate() {
        if k > start && total.saturating_add(size) > budget {
            batches.push(start..k);
            start = k;
            total = 0;
        }
        total = total.saturating_add(size);
    }

    if start < sizes.len() {
        batches.push(start..sizes.len());
    }

    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1_000_000;
    const BUDGET: u64 = 256 * MB;

    /// Small xorshift64 generator for reproducible sweeps.
    struct XorShift(u64);

    impl XorShift {
        fn next(&mut self) -> u64 {
            let mut x = self.0;
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            self.0 = x;
            x
        }

        fn below(&mut self, bound: u64) -> u64 {
            self.next() % bound
        }
    }

    #[test]
    fn three_hundred_megabyte_meshes_split_two_and_one() {
        let batches = plan_batches(&[100 * MB, 100 * MB, 100 * MB], BUDGET);
        assert_eq!(batches, vec![0..2, 2..3]);
    }

    #[test]
    fn everything_fits_in_one_batch() {
        assert_eq!(plan_batches(&[MB, 2 * MB, 3 * MB], BUDGET), vec![0..3]);
    }

    #[test]
    fn exact_budget_does_not_flush() {
        assert_eq!(plan_batches(&[128 * MB, 128 * MB], BUDGET), vec![0..2]);
        assert_eq!(plan_batches(&[128 * MB, 128 * MB + 1], BUDGET), vec![0..1, 1..2]);
    }

    #[test]
    fn oversized_mesh_gets_its_own_batch() {
        let batches = plan_batches(&[10 * MB, 300 * MB, 10 * MB], BUDGET);
        assert_eq!(batches, vec![0..1, 1..2, 2..3]);
    }

    #[test]
    fn empty_input_has_no_batches() {
        assert!(plan_batches(&[], BUDGET).is_empty());
    }

    #[test]
    fn single_mesh_is_one_batch() {
        assert_eq!(plan_batches(&[1], BUDGET), vec![0..1]);
        assert_eq!(plan_batches(&[u64::MAX], BUDGET), vec![0..1]);
    }

    #[test]
    fn zero_sized_meshes_never_flush() {
        assert_eq!(plan_batches(&[0; 5], 0), vec![0..5]);
    }

    #[test]
    fn random_sweep_covers_every_mesh_once_within_budget() {
        let mut rng = XorShift(0x9E37_79B9_7F4A_7C15);

        for _ in 0..500 {
            let count = rng.below(40) as usize;
            let budget = 1 + rng.below(1000);
            let sizes: Vec<u64> = (0..count).map(|_| rng.below(budget * 2)).collect();

            let batches = plan_batches(&sizes, budget);

            // Contiguous, ordered, covering 0..count exactly once.
            let mut expected_start = 0;
            for batch in &batches {
                assert_eq!(batch.start, expected_start);
                assert!(batch.end > batch.start);
                expected_start = batch.end;
            }
            assert_eq!(expected_start, count);

            for batch in &batches {
                let total: u64 = sizes[batch.clone()].iter().sum();
                assert!(
                    total <= budget || batch.len() == 1,
                    "batch {batch:?} totals {total} over budget {budget}"
                );
            }

            // Greedy: a batch is only flushed when the next mesh would not fit.
            for pair in batches.windows(2) {
                let total: u64 = sizes[pair[0].clone()].iter().sum();
                assert!(total + sizes[pair[1].start] > budget);
            }
        }
    }
}
