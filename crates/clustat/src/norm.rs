//! Normalisation factors and the convention that selects among them.

use crate::catalogue::ParticleCatalogue;
use crate::error::Error;
use crate::params::NPoint;
use clustat_internal::{AssignmentKernel, MeshGrid, Vec3, integrate_power, integrate_product};
use core::str::FromStr;
use serde::Deserialize;

/// Fractional padding of the internal mesh used by the mixed-mesh
/// normalisation. Not user-configurable, so the factor doesn't depend on how
/// a run aligns its catalogues.
pub const MIXED_MESH_PADDING: f64 = 0.1;

/// Cell size of the internal mixed-mesh grid (in catalogue length units).
pub const MIXED_MESH_CELLSIZE: f64 = 10.0;

/// Assignment kernel of the internal mixed-mesh grid.
pub const MIXED_MESH_ASSIGNMENT: AssignmentKernel = AssignmentKernel::Cic;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum NormConvention {
    /// report the raw, unnormalised statistic
    #[serde(rename = "none")]
    None,
    #[serde(rename = "particle")]
    Particle,
    #[serde(rename = "mesh")]
    Mesh,
    #[serde(rename = "mesh-mixed")]
    MeshMixed,
}

impl FromStr for NormConvention {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(NormConvention::None),
            "particle" => Ok(NormConvention::Particle),
            "mesh" => Ok(NormConvention::Mesh),
            "mesh-mixed" => Ok(NormConvention::MeshMixed),
            _ => Err(Error::invalid_configuration(
                "norm_convention",
                format!("\"{s}\" is not a known normalisation convention"),
            )),
        }
    }
}

impl core::fmt::Display for NormConvention {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let name = match self {
            NormConvention::None => "none",
            NormConvention::Particle => "particle",
            NormConvention::Mesh => "mesh",
            NormConvention::MeshMixed => "mesh-mixed",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NormalizationFactors {
    pub particle: f64,
    pub mesh: f64,
    /// zero unless the run pairs data with randoms for a two-point statistic
    pub mixed_mesh: f64,
    /// the only factor estimators consume
    pub selected: f64,
}

impl NormalizationFactors {
    /// choose the active factor according to `convention`
    pub fn resolve(
        particle: f64,
        mesh: f64,
        mixed_mesh: f64,
        convention: NormConvention,
    ) -> NormalizationFactors {
        let selected = match convention {
            NormConvention::None => 1.0,
            NormConvention::Particle => particle,
            NormConvention::Mesh => mesh,
            NormConvention::MeshMixed => mixed_mesh,
        };
        NormalizationFactors {
            particle,
            mesh,
            mixed_mesh,
            selected,
        }
    }

    /// Compute every factor and resolve the active one.
    ///
    /// `active` is the random catalogue when one is loaded (otherwise the
    /// data catalogue) and `alpha` is the matching weight ratio. `pair`
    /// holds the data/random catalogues of a survey run.
    #[allow(clippy::too_many_arguments)]
    pub fn compute(
        convention: NormConvention,
        npoint: NPoint,
        volume: f64,
        grid: &MeshGrid,
        kernel: AssignmentKernel,
        active: &ParticleCatalogue,
        alpha: f64,
        pair: Option<(&ParticleCatalogue, &ParticleCatalogue)>,
    ) -> Result<NormalizationFactors, Error> {
        let particle = particle_normalisation(volume, active.total_weight(), alpha, npoint)?;
        let mesh = mesh_normalisation(grid, kernel, active, alpha, npoint);
        let mixed_mesh = match (npoint, pair) {
            (NPoint::Two, Some((data, rand))) => mixed_mesh_normalisation(data, rand)?,
            _ => 0.0,
        };
        let factors = NormalizationFactors::resolve(particle, mesh, mixed_mesh, convention);
        log::info!(
            "Normalisation factors: {:.6e} (particle), {:.6e} (mesh), {:.6e} (mesh-mixed); \"{}\" used.",
            factors.particle,
            factors.mesh,
            factors.mixed_mesh,
            convention
        );
        let usable = factors.selected.is_finite() && factors.selected > 0.0;
        if convention != NormConvention::None && !usable {
            return Err(Error::invalid_configuration(
                "norm_convention",
                format!(
                    "the \"{convention}\" normalisation factor ({}) is unusable",
                    factors.selected
                ),
            ));
        }
        Ok(factors)
    }
}

/// `V / (alpha sum(w))^2` for two-point statistics and the nested division
/// `(V / (alpha sum(w)) / (alpha sum(w))) * (V / (alpha sum(w)))` for
/// three-point ones.
pub fn particle_normalisation(
    volume: f64,
    total_weight: f64,
    alpha: f64,
    npoint: NPoint,
) -> Result<f64, Error> {
    let weight = alpha * total_weight;
    if !(weight > 0.0) {
        return Err(Error::invalid_configuration(
            "catalogue",
            format!("the weighted particle count ({weight}) must be positive"),
        ));
    }
    let factor = match npoint {
        NPoint::Two => volume / weight / weight,
        NPoint::Three => (volume / weight / weight) * (volume / weight),
    };
    Ok(factor)
}

/// `1 / int (alpha n)^k dV` with the number density `n` painted on `grid`
pub fn mesh_normalisation(
    grid: &MeshGrid,
    kernel: AssignmentKernel,
    catalogue: &ParticleCatalogue,
    alpha: f64,
    npoint: NPoint,
) -> f64 {
    let order = match npoint {
        NPoint::Two => 2,
        NPoint::Three => 3,
    };
    let field = grid.assign(kernel, catalogue.weighted_positions());
    let integral = alpha.powi(order) * integrate_power(&field, order, grid.cell_volume());
    1.0 / integral
}

/// the internal grid of the mixed-mesh normalisation and the shift that
/// centres the joint bounding box of both catalogues in it
fn mixed_mesh_layout(
    data: &ParticleCatalogue,
    rand: &ParticleCatalogue,
) -> Result<(MeshGrid, Vec3), Error> {
    let joint = data.bounds().union(rand.bounds());
    let extent = joint.extent();
    let mut ngrid = [0_usize; 3];
    let mut boxsize = [0.0; 3];
    for axis in 0..3 {
        let padded = extent[axis] * (1.0 + MIXED_MESH_PADDING);
        let mut n = (padded / MIXED_MESH_CELLSIZE).ceil().max(2.0) as usize;
        n += n % 2;
        ngrid[axis] = n;
        boxsize[axis] = n as f64 * MIXED_MESH_CELLSIZE;
    }
    let grid = MeshGrid::new(boxsize, ngrid).map_err(Error::internal_legacy_adhoc)?;
    let mid = joint.midpoint();
    let shift = [
        mid[0] - 0.5 * boxsize[0],
        mid[1] - 0.5 * boxsize[1],
        mid[2] - 0.5 * boxsize[2],
    ];
    Ok((grid, shift))
}

/// `1 / (alpha int n_d n_r dV)` on a fixed internal grid, with
/// `alpha = sum(w_d) / sum(w_r)`
pub fn mixed_mesh_normalisation(
    data: &ParticleCatalogue,
    rand: &ParticleCatalogue,
) -> Result<f64, Error> {
    let alpha = crate::catalogue::alpha_ratio(data, rand)?;
    let (grid, shift) = mixed_mesh_layout(data, rand)?;
    log::debug!(
        "mixed-mesh normalisation grid: {:?} cells spanning {:?}",
        grid.ngrid(),
        grid.boxsize()
    );
    let shifted = |cat: &ParticleCatalogue| {
        cat.particles()
            .iter()
            .map(|p| {
                let pos = [
                    p.position[0] - shift[0],
                    p.position[1] - shift[1],
                    p.position[2] - shift[2],
                ];
                (pos, p.weight)
            })
            .collect::<Vec<_>>()
    };
    let n_data = grid.assign(MIXED_MESH_ASSIGNMENT, shifted(data));
    let n_rand = grid.assign(MIXED_MESH_ASSIGNMENT, shifted(rand));
    let integral = integrate_product(&n_data, &n_rand, grid.cell_volume())
        .map_err(Error::internal_legacy_adhoc)?;
    Ok(1.0 / (alpha * integral))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{CatalogueSource, Particle};
    use crate::error::ErrorCategory;

    fn catalogue(source: CatalogueSource, points: &[(Vec3, f64)]) -> ParticleCatalogue {
        let particles = points
            .iter()
            .map(|&(position, weight)| Particle { position, weight })
            .collect();
        ParticleCatalogue::new(source, particles).unwrap()
    }

    #[test]
    fn convention_resolution() {
        let f = NormalizationFactors::resolve(2.0, 3.0, 4.0, NormConvention::None);
        assert_eq!(f.selected, 1.0);
        assert_eq!(f.particle, 2.0);
        let f = NormalizationFactors::resolve(2.0, 3.0, 4.0, NormConvention::Particle);
        assert_eq!(f.selected, 2.0);
        let f = NormalizationFactors::resolve(2.0, 3.0, 4.0, NormConvention::Mesh);
        assert_eq!(f.selected, 3.0);
        let f = NormalizationFactors::resolve(2.0, 3.0, 4.0, NormConvention::MeshMixed);
        assert_eq!(f.selected, 4.0);

        assert_eq!(
            "mesh-mixed".parse::<NormConvention>().unwrap(),
            NormConvention::MeshMixed
        );
        let err = "pypower".parse::<NormConvention>().unwrap_err();
        assert_eq!(err.category(), ErrorCategory::InvalidConfiguration);
    }

    #[test]
    fn particle_factors() {
        let two = particle_normalisation(1000.0, 50.0, 0.5, NPoint::Two).unwrap();
        assert!((two - 1000.0 / 625.0).abs() < 1e-12);
        let three = particle_normalisation(1000.0, 50.0, 0.5, NPoint::Three).unwrap();
        assert!((three - 1000.0 * 1000.0 / 25.0f64.powi(3)).abs() < 1e-9);
        assert!(particle_normalisation(1000.0, 0.0, 1.0, NPoint::Two).is_err());
    }

    #[test]
    fn mesh_factor_of_uniform_lattice() {
        // one unit-weight particle on every node gives n = 1 / cell_volume
        let grid = MeshGrid::new([8.0, 8.0, 8.0], [4, 4, 4]).unwrap();
        let mut points = Vec::new();
        for i in 0..4 {
            for j in 0..4 {
                for k in 0..4 {
                    points.push(([2.0 * i as f64, 2.0 * j as f64, 2.0 * k as f64], 1.0));
                }
            }
        }
        let cat = catalogue(CatalogueSource::Data, &points);
        let factor = mesh_normalisation(&grid, AssignmentKernel::Cic, &cat, 1.0, NPoint::Two);
        // int n^2 dV = N_cells * (1/8)^2 * 8 = 8
        assert!((factor - 0.125).abs() < 1e-12);
    }

    #[test]
    fn mixed_mesh_is_translation_invariant() {
        let points: Vec<(Vec3, f64)> = (0..40)
            .map(|i| {
                let t = i as f64;
                ([7.0 * t % 95.0, 13.0 * t % 80.0, 29.0 * t % 70.0], 1.0 + (i % 3) as f64)
            })
            .collect();
        let data = catalogue(CatalogueSource::Data, &points[..25]);
        let rand = catalogue(CatalogueSource::Random, &points[10..]);
        let reference = mixed_mesh_normalisation(&data, &rand).unwrap();
        assert!(reference.is_finite() && reference > 0.0);

        let mut moved_data = data.clone();
        let mut moved_rand = rand.clone();
        let delta = [-123.0, 40.0, 3000.0];
        moved_data.offset(&delta);
        moved_rand.offset(&delta);
        let moved = mixed_mesh_normalisation(&moved_data, &moved_rand).unwrap();
        assert!((moved - reference).abs() <= 1e-9 * reference);
    }
}
