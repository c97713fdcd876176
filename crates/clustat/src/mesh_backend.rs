//! The built-in FFT-based estimators.
//!
//! Fourier conventions: a painted number-density field `F(x)` is transformed
//! as `F(k) = dV sum_x F(x) exp(-i k.x)`, so `|F(k)|^2` carries units of
//! squared weight and the particle normalisation `V / (sum w)^2` turns it
//! into a power spectrum. Correlators are recovered with the unnormalised
//! inverse transform divided by the box volume. Every mode is compensated for
//! the assignment window, and the shot noise carries the matching aliasing
//! factor so that it can be subtracted before compensation.
//!
//! Survey-type multipoles are built from real spherical harmonics of each
//! particle's line of sight (`sum_m 4pi/(2l+1) Y_lm(a) Y_lm(b) = L_l(a.b)`);
//! simulation-box multipoles use the global plane-parallel approximation
//! along the z axis. The three-point statistics live in `three_point`.

mod three_point;

use crate::binning::Binning;
use crate::catalogue::ParticleCatalogue;
use crate::context::RunContext;
use crate::error::Error;
use crate::estimator::{
    BinRecord, EstimatorInputs, EstimatorKind, Measurement, MeasurementBackend,
};
use crate::los::LineOfSight;
use crate::params::NPoint;
use clustat_internal::{
    AssignmentKernel, Complex64, Fft3d, MeshGrid, Vec3, legendre, norm,
    real_spherical_harmonic, to_complex_field,
};
use core::f64::consts::PI;
use ndarray::{Array3, Zip};

/// number of complex meshes a two-point measurement holds at once
const TWO_POINT_MESHES: usize = 3;

/// Measures power spectra and correlation functions on the run's mesh.
#[derive(Clone, Debug, Default)]
pub struct MeshBackend;

impl MeshBackend {
    pub fn new() -> Self {
        MeshBackend
    }
}

impl MeasurementBackend for MeshBackend {
    fn measure(
        &mut self,
        inputs: &EstimatorInputs<'_>,
        ctx: &mut RunContext,
    ) -> Result<Measurement, Error> {
        let mut ws = MeshWorkspace::new(inputs)?;
        let live_meshes = match inputs.kind.npoint() {
            NPoint::Two => TWO_POINT_MESHES,
            NPoint::Three => three_point::live_meshes(inputs),
        };
        let bytes = live_meshes * ws.grid.n_cells() * core::mem::size_of::<Complex64>();
        ctx.memory_mut().allocate(bytes);

        log::info!("Measuring the {} on a {:?} mesh.", inputs.kind, ws.grid.ngrid());
        let result = measure_on_mesh(&mut ws, inputs);

        let (n_forward, n_inverse) = ws.fft.counts();
        ctx.record_ffts(n_forward, n_inverse);
        ctx.memory_mut().release(bytes);
        result
    }
}

fn measure_on_mesh(
    ws: &mut MeshWorkspace,
    inputs: &EstimatorInputs<'_>,
) -> Result<Measurement, Error> {
    let ell = inputs.params.ell;
    let factor = (2 * ell + 1) as f64 * inputs.norm.selected;
    let (coordinate, shells) = match inputs.kind {
        EstimatorKind::PowspecSurvey => {
            let sources = survey_sources(inputs)?;
            ("k", survey_powspec(ws, &sources, ell, inputs.binning)?)
        }
        EstimatorKind::TwoPcfSurvey => {
            let sources = survey_sources(inputs)?;
            ("r", survey_corrfunc(ws, &sources, ell, inputs.binning)?)
        }
        EstimatorKind::TwoPcfWindow => {
            let sources = [WeightedSource {
                catalogue: inputs.rand()?,
                los: inputs.los_rand()?,
                scale: inputs.alpha,
            }];
            ("r", survey_corrfunc(ws, &sources, ell, inputs.binning)?)
        }
        EstimatorKind::PowspecSim => ("k", sim_powspec(ws, inputs.data()?, ell, inputs.binning)?),
        EstimatorKind::TwoPcfSim => ("r", sim_corrfunc(ws, inputs.data()?, ell, inputs.binning)?),
        EstimatorKind::BispecSurvey
        | EstimatorKind::BispecSim
        | EstimatorKind::ThreePcfSurvey
        | EstimatorKind::ThreePcfSim
        | EstimatorKind::ThreePcfWindow
        | EstimatorKind::ThreePcfWindowWideAngle => return three_point::measure(ws, inputs),
    };
    Ok(Measurement {
        kind: inputs.kind,
        coordinates: vec![coordinate],
        records: shells.finish(inputs.binning, factor),
    })
}

struct MeshWorkspace {
    grid: MeshGrid,
    kernel: AssignmentKernel,
    fft: Fft3d,
}

impl MeshWorkspace {
    fn new(inputs: &EstimatorInputs<'_>) -> Result<MeshWorkspace, Error> {
        let grid = inputs.params.mesh_grid()?;
        let fft = Fft3d::new(*grid.ngrid()).map_err(Error::internal_legacy_adhoc)?;
        Ok(MeshWorkspace {
            grid,
            kernel: inputs.params.assignment.kernel(),
            fft,
        })
    }

    /// `dV * FFT[field]`
    fn fourier(&mut self, field: &Array3<f64>) -> Result<Array3<Complex64>, Error> {
        let mut out = to_complex_field(field);
        self.fft
            .forward(&mut out)
            .map_err(Error::internal_legacy_adhoc)?;
        let dv = self.grid.cell_volume();
        out.mapv_inplace(|v| v * dv);
        Ok(out)
    }

    /// `dV * FFT[field] / W`, compensated for the assignment window
    fn compensated(&mut self, field: &Array3<f64>) -> Result<Array3<Complex64>, Error> {
        let mut out = self.fourier(field)?;
        let grid = &self.grid;
        let kernel = self.kernel;
        Zip::indexed(&mut out).for_each(|(i, j, k), v| {
            *v /= grid.assignment_window([i, j, k], kernel);
        });
        Ok(out)
    }

    /// `K(s) = (1/N) sum_k filter(k) exp(-i k.s)`
    fn kernel_from_filter(
        &mut self,
        mut filter: Array3<Complex64>,
    ) -> Result<Array3<Complex64>, Error> {
        self.fft
            .forward(&mut filter)
            .map_err(Error::internal_legacy_adhoc)?;
        let inv_cells = 1.0 / self.grid.n_cells() as f64;
        filter.mapv_inplace(|v| v * inv_cells);
        Ok(filter)
    }

    /// `filter(k) = sum_s K(s) exp(i k.s)`
    fn filter_from_kernel(
        &mut self,
        mut kernel: Array3<Complex64>,
    ) -> Result<Array3<Complex64>, Error> {
        self.fft
            .inverse(&mut kernel)
            .map_err(Error::internal_legacy_adhoc)?;
        Ok(kernel)
    }

    /// `IFFT[field] / V`
    fn correlate(&mut self, mut field: Array3<Complex64>) -> Result<Array3<Complex64>, Error> {
        self.fft
            .inverse(&mut field)
            .map_err(Error::internal_legacy_adhoc)?;
        let inv_volume = 1.0 / self.grid.volume();
        field.mapv_inplace(|v| v * inv_volume);
        Ok(field)
    }

    fn window_squared(&self, idx: [usize; 3]) -> f64 {
        self.grid.assignment_window(idx, self.kernel).powi(2)
    }

    fn aliasing(&self, idx: [usize; 3]) -> f64 {
        self.grid.shot_noise_aliasing(idx, self.kernel)
    }
}

/// a catalogue, its lines of sight and the factor its density enters with
struct WeightedSource<'a> {
    catalogue: &'a ParticleCatalogue,
    los: &'a [LineOfSight],
    scale: f64,
}

/// `n_d - alpha n_r`
fn survey_sources<'a>(inputs: &EstimatorInputs<'a>) -> Result<[WeightedSource<'a>; 2], Error> {
    Ok([
        WeightedSource {
            catalogue: inputs.data()?,
            los: inputs.los_data()?,
            scale: 1.0,
        },
        WeightedSource {
            catalogue: inputs.rand()?,
            los: inputs.los_rand()?,
            scale: -inputs.alpha,
        },
    ])
}

/// paint `sum_sources scale^p * sum_i w_i^p f(los_i) delta(x - x_i)`
fn paint<F>(ws: &MeshWorkspace, sources: &[WeightedSource<'_>], power: i32, f: F) -> Array3<f64>
where
    F: Fn(&LineOfSight) -> f64,
{
    let [nx, ny, nz] = *ws.grid.ngrid();
    let mut total = Array3::<f64>::zeros((nx, ny, nz));
    for source in sources {
        let points = source
            .catalogue
            .weighted_positions()
            .zip(source.los.iter())
            .map(|((pos, w), los)| (pos, w.powi(power) * f(los)));
        let field = ws.grid.assign(ws.kernel, points);
        total.scaled_add(source.scale.powi(power), &field);
    }
    total
}

/// `sum_sources scale^p * sum_i w_i^p f(los_i)`; `p = 2` is the shot noise
/// of a two-point statistic
fn weight_moment<F>(sources: &[WeightedSource<'_>], power: i32, f: F) -> f64
where
    F: Fn(&LineOfSight) -> f64,
{
    sources
        .iter()
        .map(|source| {
            let sum: f64 = source
                .catalogue
                .particles()
                .iter()
                .zip(source.los.iter())
                .map(|(p, los)| p.weight.powi(power) * f(los))
                .sum();
            source.scale.powi(power) * sum
        })
        .sum()
}

fn survey_powspec(
    ws: &mut MeshWorkspace,
    sources: &[WeightedSource<'_>],
    ell: u32,
    binning: &Binning,
) -> Result<ShellAccumulator, Error> {
    let field = paint(ws, sources, 1, |_| 1.0);
    let f0 = ws.fourier(&field)?;
    let mut a_ell = Array3::<Complex64>::zeros(f0.raw_dim());
    let mut shot = Array3::<f64>::zeros(f0.raw_dim());
    let prefactor = 4.0 * PI / (2 * ell + 1) as f64;

    let ell_i = ell as i32;
    for m in -ell_i..=ell_i {
        let ylm = |los: &LineOfSight| real_spherical_harmonic(ell, m, &los.direction);
        let field = paint(ws, sources, 1, ylm);
        let f_lm = ws.fourier(&field)?;
        let n_lm = weight_moment(sources, 2, ylm);
        let grid = &ws.grid;
        Zip::indexed(&mut a_ell)
            .and(&mut shot)
            .and(&f_lm)
            .for_each(|(i, j, k), a, s, f| {
                let y = prefactor * real_spherical_harmonic(ell, m, &grid.wavevector([i, j, k]));
                *a += *f * y;
                *s += y * n_lm;
            });
    }

    let mut shells = ShellAccumulator::new(binning.num_bins());
    for ((i, j, k), f) in f0.indexed_iter() {
        let idx = [i, j, k];
        let kmag = norm(&ws.grid.wavevector(idx));
        if let Some(bin) = binning.bin_index(kmag) {
            let w2 = ws.window_squared(idx);
            let value = a_ell[idx] * f.conj() / w2;
            let shotnoise = shot[idx] * ws.aliasing(idx) / w2;
            shells.add(bin, kmag, value, Complex64::new(shotnoise, 0.0));
        }
    }
    Ok(shells)
}

fn survey_corrfunc(
    ws: &mut MeshWorkspace,
    sources: &[WeightedSource<'_>],
    ell: u32,
    binning: &Binning,
) -> Result<ShellAccumulator, Error> {
    let field = paint(ws, sources, 1, |_| 1.0);
    let f0 = ws.fourier(&field)?;
    let mut xi = Array3::<Complex64>::zeros(f0.raw_dim());
    let prefactor = 4.0 * PI / (2 * ell + 1) as f64;

    let ell_i = ell as i32;
    for m in -ell_i..=ell_i {
        let ylm = |los: &LineOfSight| real_spherical_harmonic(ell, m, &los.direction);
        let field = paint(ws, sources, 1, ylm);
        let f_lm = ws.fourier(&field)?;
        let n_lm = weight_moment(sources, 2, ylm);

        let mut cross = Array3::<Complex64>::zeros(f0.raw_dim());
        Zip::indexed(&mut cross)
            .and(&f_lm)
            .and(&f0)
            .for_each(|(i, j, k), c, a, b| {
                let idx = [i, j, k];
                *c = (*a * b.conj() - n_lm * ws.aliasing(idx)) / ws.window_squared(idx);
            });
        let g_lm = ws.correlate(cross)?;

        let grid = &ws.grid;
        Zip::indexed(&mut xi).and(&g_lm).for_each(|(i, j, k), x, g| {
            let y = prefactor * real_spherical_harmonic(ell, m, &grid.separation([i, j, k]));
            *x += *g * y;
        });
    }
    Ok(config_shells(&ws.grid, &xi, binning, |_| 1.0))
}

/// the mean-subtracted density of a periodic box
fn sim_density(ws: &MeshWorkspace, data: &ParticleCatalogue) -> Array3<f64> {
    let mut field = ws.grid.assign(ws.kernel, data.weighted_positions());
    let mean = data.total_weight() / ws.grid.volume();
    field.mapv_inplace(|v| v - mean);
    field
}

/// cosine of the angle to the z axis, 0 for the zero vector
fn mu_z(v: &Vec3) -> f64 {
    let r = norm(v);
    if r == 0.0 { 0.0 } else { v[2] / r }
}

fn sim_powspec(
    ws: &mut MeshWorkspace,
    data: &ParticleCatalogue,
    ell: u32,
    binning: &Binning,
) -> Result<ShellAccumulator, Error> {
    let density = sim_density(ws, data);
    let fk = ws.fourier(&density)?;
    let sum_w2 = data.sum_squared_weights();

    let mut shells = ShellAccumulator::new(binning.num_bins());
    for ((i, j, k), f) in fk.indexed_iter() {
        let idx = [i, j, k];
        let kvec = ws.grid.wavevector(idx);
        let kmag = norm(&kvec);
        if let Some(bin) = binning.bin_index(kmag) {
            let w2 = ws.window_squared(idx);
            let l = legendre(ell, mu_z(&kvec));
            shells.add(
                bin,
                kmag,
                Complex64::new(f.norm_sqr() / w2 * l, 0.0),
                Complex64::new(sum_w2 * ws.aliasing(idx) / w2 * l, 0.0),
            );
        }
    }
    Ok(shells)
}

fn sim_corrfunc(
    ws: &mut MeshWorkspace,
    data: &ParticleCatalogue,
    ell: u32,
    binning: &Binning,
) -> Result<ShellAccumulator, Error> {
    let density = sim_density(ws, data);
    let fk = ws.fourier(&density)?;
    let sum_w2 = data.sum_squared_weights();

    let mut power = Array3::<Complex64>::zeros(fk.raw_dim());
    Zip::indexed(&mut power).and(&fk).for_each(|(i, j, k), p, f| {
        let idx = [i, j, k];
        let raw = f.norm_sqr() - sum_w2 * ws.aliasing(idx);
        *p = Complex64::new(raw / ws.window_squared(idx), 0.0);
    });
    let xi = ws.correlate(power)?;
    Ok(config_shells(&ws.grid, &xi, binning, |r| {
        legendre(ell, mu_z(r))
    }))
}

/// average a configuration-space field over separation shells, weighting
/// each cell by `weight(separation)`
fn config_shells<W>(
    grid: &MeshGrid,
    field: &Array3<Complex64>,
    binning: &Binning,
    weight: W,
) -> ShellAccumulator
where
    W: Fn(&Vec3) -> f64,
{
    let mut shells = ShellAccumulator::new(binning.num_bins());
    let zero = Complex64::new(0.0, 0.0);
    for ((i, j, k), v) in field.indexed_iter() {
        let rvec = grid.separation([i, j, k]);
        let rmag = norm(&rvec);
        if let Some(bin) = binning.bin_index(rmag) {
            shells.add(bin, rmag, *v * weight(&rvec), zero);
        }
    }
    shells
}

/// running sums over the modes or cells falling in each bin
struct ShellAccumulator {
    count: Vec<usize>,
    coord_sum: Vec<f64>,
    value_sum: Vec<Complex64>,
    shot_sum: Vec<Complex64>,
}

impl ShellAccumulator {
    fn new(n_bins: usize) -> ShellAccumulator {
        let zero = Complex64::new(0.0, 0.0);
        ShellAccumulator {
            count: vec![0; n_bins],
            coord_sum: vec![0.0; n_bins],
            value_sum: vec![zero; n_bins],
            shot_sum: vec![zero; n_bins],
        }
    }

    fn add(&mut self, bin: usize, coord: f64, value: Complex64, shot: Complex64) {
        self.count[bin] += 1;
        self.coord_sum[bin] += coord;
        self.value_sum[bin] += value;
        self.shot_sum[bin] += shot;
    }

    /// Average each bin and scale the averages by `factor`. Empty bins
    /// report their nominal centre with zero values.
    fn finish(self, binning: &Binning, factor: f64) -> Vec<BinRecord> {
        let zero = Complex64::new(0.0, 0.0);
        binning
            .centres()
            .iter()
            .enumerate()
            .map(|(bin, &centre)| {
                let count = self.count[bin];
                if count == 0 {
                    return BinRecord {
                        centres: vec![centre],
                        effective: vec![centre],
                        count: 0,
                        value: zero,
                        shotnoise: zero,
                    };
                }
                let n = count as f64;
                BinRecord {
                    centres: vec![centre],
                    effective: vec![self.coord_sum[bin] / n],
                    count,
                    value: self.value_sum[bin] * (factor / n),
                    shotnoise: self.shot_sum[bin] * (factor / n),
                }
            })
            .collect()
    }
}
