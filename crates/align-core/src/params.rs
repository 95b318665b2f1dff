//! Process-wide analysis parameters.

use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use std::path::{Path, PathBuf};

/// Seed of the shared random generator.
pub const DEFAULT_SEED: u64 = 12345;

/// Repetitions used by resampling analyses.
pub const N_ITER: usize = 100;

/// Generator type shared by every randomized step of one run.
pub type AnalysisRng = Xoshiro256PlusPlus;

/// Create the process generator. Call once and pass it down explicitly;
/// results depend on the order in which randomized steps draw from it.
pub fn seeded_rng(seed: u64) -> AnalysisRng {
    Xoshiro256PlusPlus::seed_from_u64(seed)
}

/// Default root of the recording files: `~/data/monkey-data`.
pub fn default_data_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("data")
        .join("monkey-data")
}

/// Directory figures are written to, relative to a working directory.
pub fn figure_dir(repo: &Path) -> PathBuf {
    repo.join("figures")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_seeded_rng_is_reproducible() {
        let mut a = seeded_rng(DEFAULT_SEED);
        let mut b = seeded_rng(DEFAULT_SEED);
        let xs: Vec<u32> = (0..8).map(|_| a.gen()).collect();
        let ys: Vec<u32> = (0..8).map(|_| b.gen()).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn test_different_seeds_differ() {
        let mut a = seeded_rng(1);
        let mut b = seeded_rng(2);
        assert_ne!(a.gen::<u64>(), b.gen::<u64>());
    }

    #[test]
    fn test_figure_dir() {
        assert_eq!(figure_dir(Path::new("/repo")), PathBuf::from("/repo/figures"));
    }
}
