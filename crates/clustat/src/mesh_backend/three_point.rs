//! Bispectrum, three-point correlation function and three-point window
//! multipoles.
//!
//! Both statistics share one construction. The first two points are shell
//! averages of the compensated density around the third,
//! `I_b(x) = sum_s K_b(s) F(x + s) / n_b`, where the kernel `K_b` selects the
//! wavevectors (bispectrum) or separations (correlation function) of bin `b`
//! and carries the harmonic `Y_lm` of that vector. The third point carries
//! `Y_LM` of each particle's line of sight, or of the z axis in a simulation
//! box. Orders are coupled with real Gaunt coefficients scaled by `(4 pi)^2`,
//! which turns `l1 = l2 = L = 0` into the plain shell-averaged estimator.
//!
//! The Poisson shot noise collects the terms where points coincide: the
//! first two (`sum_s K_1 K_2 <N_2 G>(s)`), either of them with the third
//! (the zero-lag kernel times `sum_s K <F Q>(s)`), minus twice the term where
//! all three do. `N_2` and `Q` are painted with squared weights.
//!
//! For the wide-angle window terms the kernels pick up `|s|^i` and `|s|^j`,
//! and the third point `d^-(i+j)` with `d` its distance to the observer.

use super::{MeshWorkspace, WeightedSource, paint, sim_density, survey_sources, weight_moment};
use crate::binning::{BinSpace, Binning};
use crate::catalogue::ParticleCatalogue;
use crate::error::Error;
use crate::estimator::{BinRecord, EstimatorInputs, EstimatorKind, Measurement};
use crate::los::LineOfSight;
use crate::params::Form;
use clustat_internal::{
    Complex64, MeshGrid, Vec3, norm, real_gaunt, real_spherical_harmonic,
};
use core::f64::consts::PI;
use ndarray::{Array3, Zip};

/// Gaunt coefficients this small are selection-rule zeros
const GAUNT_TOLERANCE: f64 = 1e-12;

/// the `(first, second)` bin pairs covered by a three-point form
pub(super) fn bin_pairs(form: Form, idx_bin: usize, n_bins: usize) -> Vec<(usize, usize)> {
    match form {
        Form::Full => (0..n_bins)
            .flat_map(|i| (0..n_bins).map(move |j| (i, j)))
            .collect(),
        Form::Diag => (0..n_bins).map(|i| (i, i)).collect(),
        Form::OffDiag => (0..n_bins.saturating_sub(idx_bin))
            .map(|i| (i, i + idx_bin))
            .collect(),
        Form::Row => (0..n_bins).map(|j| (idx_bin, j)).collect(),
    }
}

/// number of distinct bins each leg needs for `pairs`
fn distinct_bins(pairs: &[(usize, usize)], n_bins: usize) -> [usize; 2] {
    let mut seen = [vec![false; n_bins], vec![false; n_bins]];
    for &(a, b) in pairs {
        seen[0][a] = true;
        seen[1][b] = true;
    }
    seen.map(|s| s.iter().filter(|&&x| x).count())
}

/// complex meshes held at once by a three-point measurement
pub(super) fn live_meshes(inputs: &EstimatorInputs<'_>) -> usize {
    let params = inputs.params;
    let n_bins = inputs.binning.num_bins();
    let pairs = bin_pairs(params.form, params.idx_bin, n_bins);
    let [first, second] = distinct_bins(&pairs, n_bins);
    // a shell field and a kernel per order and bin, three meshes per order
    // of the third point, the two density fields and one scratch mesh
    let legs = 2 * first * (2 * params.ell1 as usize + 1)
        + 2 * second * (2 * params.ell2 as usize + 1);
    legs + 3 * (2 * params.ell as usize + 1) + 3
}

pub(super) fn measure(
    ws: &mut MeshWorkspace,
    inputs: &EstimatorInputs<'_>,
) -> Result<Measurement, Error> {
    let params = inputs.params;
    let binning = inputs.binning;
    let (space, coordinates) = match inputs.kind {
        EstimatorKind::BispecSurvey | EstimatorKind::BispecSim => {
            (BinSpace::Fourier, vec!["k1", "k2"])
        }
        _ => (BinSpace::Config, vec!["r1", "r2"]),
    };
    let powers = if inputs.kind == EstimatorKind::ThreePcfWindowWideAngle {
        [params.i_wa as i32, params.j_wa as i32]
    } else {
        [0, 0]
    };

    let fields = match inputs.kind {
        EstimatorKind::BispecSim | EstimatorKind::ThreePcfSim => {
            DensityFields::sim(ws, inputs.data()?, params.ell)?
        }
        EstimatorKind::BispecSurvey | EstimatorKind::ThreePcfSurvey => {
            DensityFields::survey(ws, &survey_sources(inputs)?, params.ell, 0)?
        }
        EstimatorKind::ThreePcfWindow | EstimatorKind::ThreePcfWindowWideAngle => {
            let sources = [WeightedSource {
                catalogue: inputs.rand()?,
                los: inputs.los_rand()?,
                scale: inputs.alpha,
            }];
            DensityFields::survey(ws, &sources, params.ell, powers[0] + powers[1])?
        }
        _ => {
            return Err(Error::internal_legacy_adhoc(
                "a two-point estimator reached the three-point kernels",
            ));
        }
    };
    let thirds = fields.third_points(ws)?;

    let n_bins = binning.num_bins();
    let pairs = bin_pairs(params.form, params.idx_bin, n_bins);
    let first = LegShell::build_all(
        ws,
        &fields.density,
        Shell { space, ell: params.ell1, power: powers[0] },
        binning,
        pairs.iter().map(|&(a, _)| a),
    )?;
    let second = LegShell::build_all(
        ws,
        &fields.density,
        Shell { space, ell: params.ell2, power: powers[1] },
        binning,
        pairs.iter().map(|&(_, b)| b),
    )?;

    let volume = ws.grid.volume();
    let dv = ws.grid.cell_volume();
    let transform = match space {
        BinSpace::Fourier => volume * volume,
        BinSpace::Config => 1.0,
    };
    let scale = transform * (4.0 * PI).powi(2) * inputs.norm.selected;
    let degrees = [params.ell1, params.ell2, params.ell];

    let zero = Complex64::new(0.0, 0.0);
    let centres = binning.centres();
    let mut records = Vec::with_capacity(pairs.len());
    for (a, b) in pairs {
        let (Some(s1), Some(s2)) = (first[a].as_ref(), second[b].as_ref()) else {
            return Err(Error::internal_legacy_adhoc("a shell of a bin pair wasn't built"));
        };
        let record = if s1.count == 0 || s2.count == 0 {
            BinRecord {
                centres: vec![centres[a], centres[b]],
                effective: vec![s1.effective, s2.effective],
                count: 0,
                value: zero,
                shotnoise: zero,
            }
        } else {
            let (signal, shot) = combine(s1, s2, &thirds, degrees, dv);
            BinRecord {
                centres: vec![centres[a], centres[b]],
                effective: vec![s1.effective, s2.effective],
                count: s1.count * s2.count,
                value: signal * scale,
                shotnoise: shot * scale,
            }
        };
        records.push(record);
    }
    Ok(Measurement {
        kind: inputs.kind,
        coordinates,
        records,
    })
}

/// compensated Fourier fields of the tracers, `dV FFT[.] / W`
struct DensityFields {
    /// `F(k)`
    density: Array3<Complex64>,
    /// `N_2(k)`, painted with squared weights
    squared: Array3<Complex64>,
    /// the third point's weightings, one per order `M`
    weighted: Vec<WeightedField>,
}

struct WeightedField {
    order: i32,
    /// `G_LM(k)`
    linear: Array3<Complex64>,
    /// `Q_LM(k)`, painted with squared weights
    squared: Array3<Complex64>,
    /// `sum_i w_i^3 Y_LM(n_i)`
    cubed: f64,
}

impl DensityFields {
    fn survey(
        ws: &mut MeshWorkspace,
        sources: &[WeightedSource<'_>],
        ell: u32,
        distance_power: i32,
    ) -> Result<DensityFields, Error> {
        let painted = paint(ws, sources, 1, |_| 1.0);
        let density = ws.compensated(&painted)?;
        let painted = paint(ws, sources, 2, |_| 1.0);
        let squared = ws.compensated(&painted)?;

        let ell_i = ell as i32;
        let mut weighted = Vec::with_capacity(2 * ell as usize + 1);
        for m in -ell_i..=ell_i {
            let weight = |los: &LineOfSight| {
                real_spherical_harmonic(ell, m, &los.direction) * los.distance.powi(-distance_power)
            };
            let painted = paint(ws, sources, 1, weight);
            let linear = ws.compensated(&painted)?;
            let painted = paint(ws, sources, 2, weight);
            let squared = ws.compensated(&painted)?;
            weighted.push(WeightedField {
                order: m,
                linear,
                squared,
                cubed: weight_moment(sources, 3, weight),
            });
        }
        Ok(DensityFields {
            density,
            squared,
            weighted,
        })
    }

    /// plane-parallel along z, where only the `M = 0` order survives
    fn sim(
        ws: &mut MeshWorkspace,
        data: &ParticleCatalogue,
        ell: u32,
    ) -> Result<DensityFields, Error> {
        let painted = sim_density(ws, data);
        let density = ws.compensated(&painted)?;
        let painted = ws.grid.assign(
            ws.kernel,
            data.particles()
                .iter()
                .map(|p| (p.position, p.weight * p.weight)),
        );
        let squared = ws.compensated(&painted)?;

        let y = real_spherical_harmonic(ell, 0, &[0.0, 0.0, 1.0]);
        let cubed: f64 = data.particles().iter().map(|p| p.weight.powi(3)).sum();
        let weighted = vec![WeightedField {
            order: 0,
            linear: density.mapv(|v| v * y),
            squared: squared.mapv(|v| v * y),
            cubed: y * cubed,
        }];
        Ok(DensityFields {
            density,
            squared,
            weighted,
        })
    }

    fn third_points(&self, ws: &mut MeshWorkspace) -> Result<Vec<ThirdPoint>, Error> {
        let inv_dv = 1.0 / ws.grid.cell_volume();
        self.weighted
            .iter()
            .map(|w| {
                let field = ws.correlate(w.linear.clone())?;
                let pairs = Zip::from(&self.squared)
                    .and(&w.linear)
                    .map_collect(|a, b| a * b.conj() * inv_dv);
                let pair_lag = ws.correlate(pairs)?;
                let crossed = Zip::from(&self.density)
                    .and(&w.squared)
                    .map_collect(|a, b| a * b.conj() * inv_dv);
                let cross_lag = ws.correlate(crossed)?;
                Ok(ThirdPoint {
                    order: w.order,
                    field,
                    pair_lag,
                    cross_lag,
                    cubed: w.cubed,
                })
            })
            .collect()
    }
}

/// the third point at one order `M`, in configuration space
struct ThirdPoint {
    order: i32,
    /// `G_LM(x)`
    field: Array3<Complex64>,
    /// `sum_x N_2(x + s) G_LM(x)`
    pair_lag: Array3<Complex64>,
    /// `sum_x F(x + s) Q_LM(x)`
    cross_lag: Array3<Complex64>,
    cubed: f64,
}

/// the shape shared by every bin of one leg
#[derive(Clone, Copy)]
struct Shell {
    space: BinSpace,
    ell: u32,
    /// power of `|s|` multiplying the kernel
    power: i32,
}

/// one order `m` of one leg in one bin
struct Leg {
    /// `I(x) = sum_s K(s) F(x + s) / n`
    field: Array3<Complex64>,
    /// `K(s)`
    kernel: Array3<Complex64>,
}

/// every order of one leg in one bin
struct LegShell {
    /// indexed by `m + ell`; empty when the bin holds no cells
    orders: Vec<Leg>,
    /// number of wavevectors or separations in the bin
    count: usize,
    effective: f64,
}

fn coordinate(grid: &MeshGrid, space: BinSpace, idx: [usize; 3]) -> Vec3 {
    match space {
        BinSpace::Fourier => grid.wavevector(idx),
        BinSpace::Config => grid.separation(idx),
    }
}

impl LegShell {
    /// build the shells of `bins`, leaving the other slots empty
    fn build_all<I>(
        ws: &mut MeshWorkspace,
        density: &Array3<Complex64>,
        shell: Shell,
        binning: &Binning,
        bins: I,
    ) -> Result<Vec<Option<LegShell>>, Error>
    where
        I: Iterator<Item = usize>,
    {
        let mut shells: Vec<Option<LegShell>> = (0..binning.num_bins()).map(|_| None).collect();
        for bin in bins {
            if shells[bin].is_none() {
                shells[bin] = Some(LegShell::build(ws, density, shell, binning, bin)?);
            }
        }
        Ok(shells)
    }

    fn build(
        ws: &mut MeshWorkspace,
        density: &Array3<Complex64>,
        shell: Shell,
        binning: &Binning,
        bin: usize,
    ) -> Result<LegShell, Error> {
        let grid = ws.grid.clone();
        let in_bin = |idx: [usize; 3]| -> Option<(Vec3, f64)> {
            let v = coordinate(&grid, shell.space, idx);
            let mag = norm(&v);
            (binning.bin_index(mag) == Some(bin)).then_some((v, mag))
        };

        let mut count = 0;
        let mut coord_sum = 0.0;
        for ((i, j, k), _) in density.indexed_iter() {
            if let Some((_, mag)) = in_bin([i, j, k]) {
                count += 1;
                coord_sum += mag;
            }
        }
        if count == 0 {
            return Ok(LegShell {
                orders: Vec::new(),
                count,
                effective: binning.centres()[bin],
            });
        }

        let ell_i = shell.ell as i32;
        let mut orders = Vec::with_capacity(2 * shell.ell as usize + 1);
        for m in -ell_i..=ell_i {
            let mut values = Array3::<Complex64>::zeros(density.raw_dim());
            Zip::indexed(&mut values).for_each(|(i, j, k), v| {
                if let Some((vec, mag)) = in_bin([i, j, k]) {
                    let y = real_spherical_harmonic(shell.ell, m, &vec);
                    *v = Complex64::new(y * mag.powi(shell.power), 0.0);
                }
            });
            let (filter, kernel) = match shell.space {
                BinSpace::Fourier => {
                    let kernel = ws.kernel_from_filter(values.clone())?;
                    (values, kernel)
                }
                BinSpace::Config => {
                    let filter = ws.filter_from_kernel(values.clone())?;
                    (filter, values)
                }
            };
            let mut field = ws.correlate(density * &filter)?;
            let inv_count = 1.0 / count as f64;
            field.mapv_inplace(|v| v * inv_count);
            orders.push(Leg { field, kernel });
        }
        Ok(LegShell {
            orders,
            count,
            effective: coord_sum / count as f64,
        })
    }
}

/// the Gaunt-weighted signal `dV sum_x I_1 I_2 G` and shot noise of one
/// bin pair, before scaling
fn combine(
    first: &LegShell,
    second: &LegShell,
    thirds: &[ThirdPoint],
    [l1, l2, ell]: [u32; 3],
    dv: f64,
) -> (Complex64, Complex64) {
    let zero = Complex64::new(0.0, 0.0);
    let origin = [0, 0, 0];
    let mut signal = zero;
    let mut shot = zero;
    for (i1, leg1) in first.orders.iter().enumerate() {
        let m1 = i1 as i32 - l1 as i32;
        for (i2, leg2) in second.orders.iter().enumerate() {
            let m2 = i2 as i32 - l2 as i32;
            for third in thirds {
                let gaunt = real_gaunt(l1, m1, l2, m2, ell, third.order);
                if gaunt.abs() < GAUNT_TOLERANCE {
                    continue;
                }
                let triplet = Zip::from(&leg1.field)
                    .and(&leg2.field)
                    .and(&third.field)
                    .fold(zero, |acc, &a, &b, &c| acc + a * b * c);
                let paired = Zip::from(&leg1.kernel)
                    .and(&leg2.kernel)
                    .and(&third.pair_lag)
                    .fold(zero, |acc, &a, &b, &c| acc + a * b * c);
                let crossed_second = Zip::from(&leg2.kernel)
                    .and(&third.cross_lag)
                    .fold(zero, |acc, &a, &b| acc + a * b);
                let crossed_first = Zip::from(&leg1.kernel)
                    .and(&third.cross_lag)
                    .fold(zero, |acc, &a, &b| acc + a * b);
                let k1 = leg1.kernel[origin];
                let k2 = leg2.kernel[origin];
                let coincident = k1 * k2 * (third.cubed / (dv * dv));

                signal += triplet * (gaunt * dv);
                shot += (paired + k1 * crossed_second + k2 * crossed_first - coincident * 2.0)
                    * gaunt;
            }
        }
    }
    let pairs = (first.count * second.count) as f64;
    (signal, shot / pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forms_pick_bin_pairs() {
        assert_eq!(bin_pairs(Form::Diag, 0, 3), vec![(0, 0), (1, 1), (2, 2)]);
        assert_eq!(bin_pairs(Form::OffDiag, 1, 3), vec![(0, 1), (1, 2)]);
        assert_eq!(bin_pairs(Form::Row, 2, 3), vec![(2, 0), (2, 1), (2, 2)]);
        let full = bin_pairs(Form::Full, 0, 3);
        assert_eq!(full.len(), 9);
        assert_eq!(full[5], (1, 2));

        assert_eq!(distinct_bins(&bin_pairs(Form::Row, 1, 4), 4), [1, 4]);
        assert_eq!(distinct_bins(&bin_pairs(Form::OffDiag, 2, 4), 4), [2, 2]);
    }

    fn constant_leg(value: f64, count: usize) -> LegShell {
        let field = Array3::from_elem((2, 2, 2), Complex64::new(value, 0.0));
        LegShell {
            orders: vec![Leg {
                field: field.clone(),
                kernel: field,
            }],
            count,
            effective: 1.0,
        }
    }

    #[test]
    fn coincident_terms_of_constant_fields() {
        // 8 cells of unit volume, monopole legs
        let leg = constant_leg(1.0, 2);
        let ones = Array3::from_elem((2, 2, 2), Complex64::new(1.0, 0.0));
        let third = ThirdPoint {
            order: 0,
            field: ones.mapv(|v| v * 3.0),
            pair_lag: ones.clone(),
            cross_lag: ones.mapv(|v| v * 0.5),
            cubed: 2.0,
        };
        let (signal, shot) = combine(&leg, &leg, &[third], [0, 0, 0], 1.0);
        let gaunt = 1.0 / (4.0 * PI).sqrt();
        // 8 cells of 1 * 1 * 3
        assert!((signal.re - 24.0 * gaunt).abs() < 1e-12);
        // (8 + 4 + 4 - 2 * 2) / (2 * 2)
        assert!((shot.re - 3.0 * gaunt).abs() < 1e-12);
        assert_eq!(signal.im, 0.0);
    }
}
