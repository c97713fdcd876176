//! Particle catalogues and the geometric transforms used to align them with
//! the measurement box.
//!
//! A [`ParticleCatalogue`] is never empty, so its bounding box is always
//! defined. Every transform recomputes the cached bounds before returning.

use crate::error::Error;
use crate::params::CatalogueFormat;
use clustat_internal::Vec3;
use rayon::prelude::*;
use std::io::BufRead;
use std::path::Path;

/// number of particles per partial weight sum
const WEIGHT_SUM_CHUNK: usize = 4096;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Particle {
    pub position: Vec3,
    pub weight: f64,
}

impl Particle {
    /// finite coordinates and a finite, non-negative weight
    pub fn is_valid(&self) -> bool {
        self.position.iter().all(|x| x.is_finite()) && self.weight.is_finite() && self.weight >= 0.0
    }
}

/// which role a catalogue plays in a measurement
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CatalogueSource {
    Data,
    Random,
}

impl core::fmt::Display for CatalogueSource {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            CatalogueSource::Data => f.write_str("data"),
            CatalogueSource::Random => f.write_str("random"),
        }
    }
}

/// an axis-aligned bounding box
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    pub fn extent(&self) -> Vec3 {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }

    pub fn midpoint(&self) -> Vec3 {
        [
            0.5 * (self.min[0] + self.max[0]),
            0.5 * (self.min[1] + self.max[1]),
            0.5 * (self.min[2] + self.max[2]),
        ]
    }

    /// the smallest box holding both `self` and `other`
    pub fn union(&self, other: &Bounds) -> Bounds {
        let mut out = *self;
        for axis in 0..3 {
            out.min[axis] = out.min[axis].min(other.min[axis]);
            out.max[axis] = out.max[axis].max(other.max[axis]);
        }
        out
    }

    /// whether the box lies within `[0, boxsize)` along every axis
    pub fn fits_in_box(&self, boxsize: &Vec3) -> bool {
        (0..3).all(|axis| self.min[axis] >= 0.0 && self.max[axis] < boxsize[axis])
    }
}

#[derive(Clone, Debug)]
pub struct ParticleCatalogue {
    source: CatalogueSource,
    particles: Vec<Particle>,
    bounds: Bounds,
    total_weight: f64,
    /// where the coordinate origin of the input file now sits
    observer: Vec3,
}

impl ParticleCatalogue {
    pub fn new(
        source: CatalogueSource,
        particles: Vec<Particle>,
    ) -> Result<ParticleCatalogue, Error> {
        let who = format!("{source} catalogue");
        if particles.is_empty() {
            return Err(Error::invalid_configuration(
                &who,
                "a catalogue must hold at least one particle".to_owned(),
            ));
        }
        if let Some(i) = particles.iter().position(|p| !p.is_valid()) {
            return Err(Error::invalid_configuration(
                &who,
                format!("particle {i} has a non-finite position or an invalid weight"),
            ));
        }

        let mut catalogue = ParticleCatalogue {
            source,
            particles,
            bounds: Bounds {
                min: [0.0; 3],
                max: [0.0; 3],
            },
            total_weight: 0.0,
            observer: [0.0; 3],
        };
        catalogue.bounds = catalogue.compute_bounds();
        catalogue.total_weight = catalogue.sum_weights();
        Ok(catalogue)
    }

    /// Read a whitespace-separated ASCII catalogue.
    ///
    /// Rows that don't hold exactly the number of numeric fields expected
    /// by `format` (headers, comments, truncated lines) are skipped, as are
    /// rows with a non-finite value or a negative weight.
    pub fn load(
        path: &Path,
        format: CatalogueFormat,
        source: CatalogueSource,
    ) -> Result<ParticleCatalogue, Error> {
        let file = std::fs::File::open(path).map_err(|e| Error::io(path, e.to_string()))?;
        let reader = std::io::BufReader::new(file);

        let n_fields = format.n_fields();
        let mut fields = Vec::with_capacity(n_fields);
        let mut particles = Vec::new();
        let mut n_skipped = 0_usize;
        for line in reader.lines() {
            let line = line.map_err(|e| Error::io(path, e.to_string()))?;
            fields.clear();
            let mut parsed_all = true;
            for token in line.split_whitespace() {
                match token.parse::<f64>() {
                    Ok(v) => fields.push(v),
                    Err(_) => {
                        parsed_all = false;
                        break;
                    }
                }
            }
            if !parsed_all || fields.len() != n_fields {
                n_skipped += 1;
                continue;
            }
            let particle = Particle {
                position: [fields[0], fields[1], fields[2]],
                weight: if n_fields == 4 { fields[3] } else { 1.0 },
            };
            // `parse` accepts "nan" and "inf"
            if !particle.is_valid() {
                n_skipped += 1;
                continue;
            }
            particles.push(particle);
        }

        if particles.is_empty() {
            return Err(Error::io(path, "the file holds no valid particle rows".to_owned()));
        }
        log::debug!(
            "read {} particles from {} ({} rows skipped)",
            particles.len(),
            path.display(),
            n_skipped
        );
        ParticleCatalogue::new(source, particles)
    }

    pub fn source(&self) -> CatalogueSource {
        self.source
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    /// always false; kept for symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    pub fn observer(&self) -> &Vec3 {
        &self.observer
    }

    /// rough size of the particle storage, for the memory ledger
    pub fn memory_bytes(&self) -> usize {
        self.particles.len() * core::mem::size_of::<Particle>()
    }

    /// `(position, weight)` pairs, the form taken by mesh assignment
    pub fn weighted_positions(&self) -> impl Iterator<Item = (Vec3, f64)> + '_ {
        self.particles.iter().map(|p| (p.position, p.weight))
    }

    /// sum of squared weights
    pub fn sum_squared_weights(&self) -> f64 {
        self.particles
            .par_chunks(WEIGHT_SUM_CHUNK)
            .map(|chunk| chunk.iter().map(|p| p.weight * p.weight).sum::<f64>())
            .collect::<Vec<f64>>()
            .iter()
            .sum()
    }

    /// Scan the particles for the exact per-axis extrema.
    pub fn compute_bounds(&self) -> Bounds {
        let mut bounds = Bounds {
            min: self.particles[0].position,
            max: self.particles[0].position,
        };
        for p in &self.particles[1..] {
            for axis in 0..3 {
                bounds.min[axis] = bounds.min[axis].min(p.position[axis]);
                bounds.max[axis] = bounds.max[axis].max(p.position[axis]);
            }
        }
        bounds
    }

    // partial sums over fixed chunks are reduced serially, in order, so the
    // result doesn't depend on how rayon schedules the chunks
    fn sum_weights(&self) -> f64 {
        self.particles
            .par_chunks(WEIGHT_SUM_CHUNK)
            .map(|chunk| chunk.iter().map(|p| p.weight).sum::<f64>())
            .collect::<Vec<f64>>()
            .iter()
            .sum()
    }

    /// Subtract `delta` from every position.
    pub fn offset(&mut self, delta: &Vec3) {
        let delta = *delta;
        self.particles.par_iter_mut().for_each(|p| {
            for axis in 0..3 {
                p.position[axis] -= delta[axis];
            }
        });
        for axis in 0..3 {
            self.observer[axis] -= delta[axis];
        }
        self.bounds = self.compute_bounds();
    }

    /// Fold positions back into `[0, boxsize)` with a single shift per axis.
    ///
    /// Positions are assumed to lie within one box length of the box. A
    /// negative coordinate too small to survive the shift lands on 0.
    pub fn wrap_periodic(&mut self, boxsize: &Vec3) {
        let boxsize = *boxsize;
        self.particles.par_iter_mut().for_each(|p| {
            for axis in 0..3 {
                if p.position[axis] >= boxsize[axis] {
                    p.position[axis] -= boxsize[axis];
                } else if p.position[axis] < 0.0 {
                    p.position[axis] += boxsize[axis];
                    // `-tiny + L` can round up to exactly `L`
                    if p.position[axis] >= boxsize[axis] {
                        p.position[axis] = 0.0;
                    }
                }
            }
        });
        self.bounds = self.compute_bounds();
    }

    /// Translate so the bounding-box midpoint lands on the box centre.
    pub fn centre_in_box(&mut self, boxsize: &Vec3) {
        let delta = centring_offset(&self.bounds, boxsize);
        self.offset(&delta);
    }

    /// Translate so the bounding-box minimum sits `margin` (physical units)
    /// inside the box.
    pub fn pad_in_box(&mut self, margin: &Vec3) {
        let delta = padding_offset(&self.bounds, margin);
        self.offset(&delta);
    }

    /// Like [`Self::pad_in_box`], with the margin counted in grid cells.
    pub fn pad_grids(&mut self, boxsize: &Vec3, ngrid: &[usize; 3], pad_cells: &Vec3) {
        let margin = grid_margin(boxsize, ngrid, pad_cells);
        self.pad_in_box(&margin);
    }
}

fn centring_offset(bounds: &Bounds, boxsize: &Vec3) -> Vec3 {
    let mid = bounds.midpoint();
    [
        mid[0] - 0.5 * boxsize[0],
        mid[1] - 0.5 * boxsize[1],
        mid[2] - 0.5 * boxsize[2],
    ]
}

fn padding_offset(bounds: &Bounds, margin: &Vec3) -> Vec3 {
    [
        bounds.min[0] - margin[0],
        bounds.min[1] - margin[1],
        bounds.min[2] - margin[2],
    ]
}

/// physical size of `pad_cells` grid cells along each axis
pub fn grid_margin(boxsize: &Vec3, ngrid: &[usize; 3], pad_cells: &Vec3) -> Vec3 {
    [
        pad_cells[0] * boxsize[0] / ngrid[0] as f64,
        pad_cells[1] * boxsize[1] / ngrid[1] as f64,
        pad_cells[2] * boxsize[2] / ngrid[2] as f64,
    ]
}

/// Centre a data/random pair on their joint bounding box, moving both
/// catalogues by the same amount.
pub fn centre_pair_in_box(
    data: &mut ParticleCatalogue,
    rand: &mut ParticleCatalogue,
    boxsize: &Vec3,
) {
    let joint = data.bounds().union(rand.bounds());
    let delta = centring_offset(&joint, boxsize);
    data.offset(&delta);
    rand.offset(&delta);
}

/// Pad a data/random pair by `margin` using their joint bounding box.
pub fn pad_pair_in_box(data: &mut ParticleCatalogue, rand: &mut ParticleCatalogue, margin: &Vec3) {
    let joint = data.bounds().union(rand.bounds());
    let delta = padding_offset(&joint, margin);
    data.offset(&delta);
    rand.offset(&delta);
}

/// `sum(data weights) / sum(rand weights)`
pub fn alpha_ratio(data: &ParticleCatalogue, rand: &ParticleCatalogue) -> Result<f64, Error> {
    let rand_weight = rand.total_weight();
    if rand_weight == 0.0 {
        return Err(Error::invalid_configuration(
            "random catalogue",
            "the total weight is zero, so alpha is undefined".to_owned(),
        ));
    }
    Ok(data.total_weight() / rand_weight)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    fn catalogue(source: CatalogueSource, points: &[(Vec3, f64)]) -> ParticleCatalogue {
        let particles = points
            .iter()
            .map(|&(position, weight)| Particle { position, weight })
            .collect();
        ParticleCatalogue::new(source, particles).unwrap()
    }

    fn positions(cat: &ParticleCatalogue) -> Vec<Vec3> {
        cat.particles().iter().map(|p| p.position).collect()
    }

    #[test]
    fn empty_and_invalid_catalogues() {
        let err = ParticleCatalogue::new(CatalogueSource::Data, Vec::new()).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::InvalidConfiguration);

        let negative = vec![Particle {
            position: [0.0; 3],
            weight: -1.0,
        }];
        assert!(ParticleCatalogue::new(CatalogueSource::Data, negative).is_err());
    }

    #[test]
    fn bounds_and_weights() {
        let cat = catalogue(
            CatalogueSource::Data,
            &[([1.0, -2.0, 3.0], 0.5), ([-1.0, 4.0, 0.0], 0.0), ([0.0, 0.0, 7.0], 2.0)],
        );
        assert_eq!(cat.bounds().min, [-1.0, -2.0, 0.0]);
        assert_eq!(cat.bounds().max, [1.0, 4.0, 7.0]);
        assert_eq!(cat.total_weight(), 2.5);
        assert_eq!(cat.sum_squared_weights(), 4.25);
        assert_eq!(cat.len(), 3);
    }

    #[test]
    fn offset_moves_particles_and_observer() {
        let mut cat = catalogue(CatalogueSource::Data, &[([1.0, 2.0, 3.0], 1.0)]);
        cat.offset(&[1.0, 1.0, -1.0]);
        assert_eq!(positions(&cat), vec![[0.0, 1.0, 4.0]]);
        assert_eq!(cat.observer(), &[-1.0, -1.0, 1.0]);
        assert_eq!(cat.bounds().min, [0.0, 1.0, 4.0]);
    }

    #[test]
    fn wrap_periodic_is_idempotent() {
        let boxsize = [10.0, 10.0, 10.0];
        let mut cat = catalogue(
            CatalogueSource::Data,
            &[([-1.0, 10.0, 5.0], 1.0), ([12.5, 0.0, 9.999], 1.0)],
        );
        cat.wrap_periodic(&boxsize);
        let once = positions(&cat);
        assert_eq!(once, vec![[9.0, 0.0, 5.0], [2.5, 0.0, 9.999]]);
        cat.wrap_periodic(&boxsize);
        assert_eq!(positions(&cat), once);
        assert!(cat.bounds().fits_in_box(&boxsize));
    }

    #[test]
    fn wrap_tiny_negative_lands_on_zero() {
        let boxsize = [100.0, 100.0, 100.0];
        let mut cat = catalogue(CatalogueSource::Data, &[([-1e-20, 50.0, 50.0], 1.0)]);
        cat.wrap_periodic(&boxsize);
        let once = positions(&cat);
        assert_eq!(once, vec![[0.0, 50.0, 50.0]]);
        assert!(cat.bounds().fits_in_box(&boxsize));
        cat.wrap_periodic(&boxsize);
        assert_eq!(positions(&cat), once);
    }

    #[test]
    fn centre_in_box() {
        let mut cat = catalogue(
            CatalogueSource::Data,
            &[([-4.0, 0.0, 1.0], 1.0), ([0.0, 2.0, 3.0], 1.0)],
        );
        cat.centre_in_box(&[20.0, 20.0, 20.0]);
        assert_eq!(cat.bounds().midpoint(), [10.0, 10.0, 10.0]);
    }

    #[test]
    fn padding_conventions_agree() {
        let boxsize = [200.0, 100.0, 50.0];
        let ngrid = [64, 32, 16];
        let points = [([13.0, -7.5, 2.25], 1.0), ([101.0, 30.0, 21.0], 2.0)];

        let mut by_cells = catalogue(CatalogueSource::Random, &points);
        by_cells.pad_grids(&boxsize, &ngrid, &[3.0, 3.0, 3.0]);

        let mut by_margin = catalogue(CatalogueSource::Random, &points);
        let margin = [3.0 * 200.0 / 64.0, 3.0 * 100.0 / 32.0, 3.0 * 50.0 / 16.0];
        by_margin.pad_in_box(&margin);

        for (a, b) in positions(&by_cells).iter().zip(positions(&by_margin).iter()) {
            for axis in 0..3 {
                assert!((a[axis] - b[axis]).abs() <= 1e-9 * a[axis].abs().max(1.0));
            }
        }
        assert!((by_cells.bounds().min[0] - margin[0]).abs() < 1e-12);
    }

    #[test]
    fn pairs_move_together() {
        let mut data = catalogue(CatalogueSource::Data, &[([0.0, 0.0, 0.0], 1.0)]);
        let mut rand = catalogue(
            CatalogueSource::Random,
            &[([-2.0, 0.0, 0.0], 1.0), ([2.0, 4.0, 6.0], 1.0)],
        );
        centre_pair_in_box(&mut data, &mut rand, &[10.0, 10.0, 10.0]);
        assert_eq!(positions(&data), vec![[5.0, 3.0, 2.0]]);
        assert_eq!(data.observer(), rand.observer());

        pad_pair_in_box(&mut data, &mut rand, &[1.0, 1.0, 1.0]);
        assert_eq!(rand.bounds().min, [1.0, 1.0, 1.0]);
        assert_eq!(positions(&data), vec![[3.0, 1.0, 1.0]]);
    }

    #[test]
    fn alpha() {
        let pos = [0.0; 3];
        let data = catalogue(CatalogueSource::Data, &[(pos, 1.0), (pos, 1.0), (pos, 1.0)]);
        let rand = catalogue(
            CatalogueSource::Random,
            &[(pos, 2.0), (pos, 2.0), (pos, 2.0), (pos, 2.0)],
        );
        assert_eq!(alpha_ratio(&data, &rand).unwrap(), 0.375);

        let weightless = catalogue(CatalogueSource::Random, &[(pos, 0.0)]);
        assert!(alpha_ratio(&data, &weightless).is_err());
    }
}
