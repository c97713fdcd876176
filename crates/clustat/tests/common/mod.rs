// the reason this is named mod.rs has to do with some complexities of how
// testing is handled
//
// we are following the advice of the rust book
// https://doc.rust-lang.org/book/ch11-03-test-organization.html#submodules-in-integration-tests

#![allow(dead_code)]

use clustat::{CatalogueSource, Particle, ParticleCatalogue};
use rand::distr::{Distribution, Uniform};
use rand_xoshiro::Xoshiro256PlusPlus;
use rand_xoshiro::rand_core::SeedableRng;
use std::io::Write;
use std::path::{Path, PathBuf};

// based on numpy!
// https://numpy.org/doc/stable/reference/generated/numpy.isclose.html
pub fn isclose(actual: f64, ref_val: f64, rtol: f64, atol: f64) -> bool {
    let actual_nan = actual.is_nan();
    let ref_nan = ref_val.is_nan();
    if actual_nan || ref_nan {
        actual_nan && ref_nan
    } else {
        (actual - ref_val).abs() <= (atol + rtol * ref_val.abs())
    }
}

/// `n` weighted particles drawn uniformly from `[lo, hi)` along every axis,
/// with weights in `[0.5, 1.5)`
pub fn random_particles(seed: u64, n: usize, lo: f64, hi: f64) -> Vec<Particle> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let position_dist = Uniform::new(lo, hi).unwrap();
    let weight_dist = Uniform::new(0.5, 1.5).unwrap();
    (0..n)
        .map(|_| Particle {
            position: [
                position_dist.sample(&mut rng),
                position_dist.sample(&mut rng),
                position_dist.sample(&mut rng),
            ],
            weight: weight_dist.sample(&mut rng),
        })
        .collect()
}

pub fn random_catalogue(
    source: CatalogueSource,
    seed: u64,
    n: usize,
    lo: f64,
    hi: f64,
) -> ParticleCatalogue {
    ParticleCatalogue::new(source, random_particles(seed, n, lo, hi)).unwrap()
}

/// write `x y z w` rows (plus a header line) to `dir/name`
pub fn write_catalogue(dir: &Path, name: &str, particles: &[Particle]) -> PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "# x y z w").unwrap();
    for p in particles {
        let [x, y, z] = p.position;
        writeln!(file, "{x} {y} {z} {}", p.weight).unwrap();
    }
    path
}
