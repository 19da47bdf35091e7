//! Seed material for the GPU Monte Carlo sampler.

use rand::Rng;

/// Minimum valid seed for the GPU generator; the Tausworthe lanes lose state
/// bits below this value.
pub const MIN_SEED: u32 = 128;

/// Draw 8 seeds per event, two 4-lane generator states. Values below
/// [`MIN_SEED`] are resampled. Seeds are fresh every call; runs are not
/// reproducible by design.
pub fn generate_seeds(num_events_rounded: u32) -> Vec<u32> {
    let mut rng = rand::thread_rng();
    let mut seeds = vec![0u32; num_events_rounded as usize * 8];
    for s in seeds.iter_mut() {
        while *s < MIN_SEED {
            *s = rng.gen();
        }
    }
    seeds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eight_seeds_per_event_above_floor() {
        let seeds = generate_seeds(256);
        assert_eq!(seeds.len(), 256 * 8);
        assert!(seeds.iter().all(|&s| s >= MIN_SEED));
    }
}
