use rand::rngs::StdRng;
use rand::SeedableRng;

const SAMPLE_SEED: u64 = 42;

/// Choose `n` of `len` row positions reproducibly with a fixed-seed RNG.
/// Returned in ascending order so sampled rows keep their file order.
pub fn sample_indices(len: usize, n: usize) -> Vec<usize> {
    if n >= len {
        return (0..len).collect();
    }

    let mut rng = StdRng::seed_from_u64(SAMPLE_SEED);
    let mut picked = rand::seq::index::sample(&mut rng, len, n).into_vec();
    picked.sort_unstable();
    picked
}
