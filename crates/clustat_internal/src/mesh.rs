//! Implements a regular periodic mesh ([`MeshGrid`]) together with the
//! B-spline mass-assignment kernels ([`AssignmentKernel`]) used to paint
//! weighted points onto it.
//!
//! Mesh nodes sit at integer multiples of the cell size along each axis and
//! node indices wrap periodically. Painted fields are number densities: each
//! point deposits `weight / cell_volume` spread over the kernel stencil, so
//! the sum of the field times the cell volume equals the summed weight.

use crate::vec3::Vec3;
use ndarray::Array3;

/// The largest stencil (PCS) touches 4 nodes per axis
const MAX_STENCIL: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignmentKernel {
    /// nearest grid point
    Ngp,
    /// cloud in cell
    Cic,
    /// triangular shaped cloud
    Tsc,
    /// piecewise cubic spline
    Pcs,
}

impl AssignmentKernel {
    /// order of the B-spline (also the exponent of the window in Fourier
    /// space)
    pub fn order(&self) -> i32 {
        match self {
            AssignmentKernel::Ngp => 1,
            AssignmentKernel::Cic => 2,
            AssignmentKernel::Tsc => 3,
            AssignmentKernel::Pcs => 4,
        }
    }

    /// Fill `indices` and `weights` with the (unwrapped) node indices and
    /// 1D weights for a coordinate `s` measured in units of the cell size.
    /// Returns the number of populated entries.
    fn stencil(
        &self,
        s: f64,
        indices: &mut [isize; MAX_STENCIL],
        weights: &mut [f64; MAX_STENCIL],
    ) -> usize {
        match self {
            AssignmentKernel::Ngp => {
                indices[0] = (s + 0.5).floor() as isize;
                weights[0] = 1.0;
                1
            }
            AssignmentKernel::Cic => {
                let i0 = s.floor();
                let frac = s - i0;
                indices[0] = i0 as isize;
                indices[1] = i0 as isize + 1;
                weights[0] = 1.0 - frac;
                weights[1] = frac;
                2
            }
            AssignmentKernel::Tsc => {
                let ic = (s + 0.5).floor();
                let d = s - ic;
                indices[0] = ic as isize - 1;
                indices[1] = ic as isize;
                indices[2] = ic as isize + 1;
                weights[0] = 0.5 * (0.5 - d) * (0.5 - d);
                weights[1] = 0.75 - d * d;
                weights[2] = 0.5 * (0.5 + d) * (0.5 + d);
                3
            }
            AssignmentKernel::Pcs => {
                let i0 = s.floor();
                for j in 0..MAX_STENCIL {
                    let node = i0 + (j as f64) - 1.0;
                    let t = (s - node).abs();
                    indices[j] = node as isize;
                    weights[j] = if t < 1.0 {
                        (4.0 - 6.0 * t * t + 3.0 * t * t * t) / 6.0
                    } else if t < 2.0 {
                        (2.0 - t) * (2.0 - t) * (2.0 - t) / 6.0
                    } else {
                        0.0
                    };
                }
                MAX_STENCIL
            }
        }
    }
}

/// describes a periodic cuboid box discretised into `ngrid` cells per axis
#[derive(Clone, Debug, PartialEq)]
pub struct MeshGrid {
    boxsize: Vec3,
    ngrid: [usize; 3],
}

impl MeshGrid {
    pub fn new(boxsize: Vec3, ngrid: [usize; 3]) -> Result<MeshGrid, &'static str> {
        if ngrid.contains(&0) {
            Err("ngrid must not hold 0")
        } else if boxsize.iter().any(|&l| !(l.is_finite() && l > 0.0)) {
            Err("boxsize must hold positive finite values")
        } else {
            Ok(MeshGrid { boxsize, ngrid })
        }
    }

    pub fn boxsize(&self) -> &Vec3 {
        &self.boxsize
    }

    pub fn ngrid(&self) -> &[usize; 3] {
        &self.ngrid
    }

    pub fn n_cells(&self) -> usize {
        self.ngrid[0] * self.ngrid[1] * self.ngrid[2]
    }

    pub fn cell_size(&self) -> Vec3 {
        [
            self.boxsize[0] / self.ngrid[0] as f64,
            self.boxsize[1] / self.ngrid[1] as f64,
            self.boxsize[2] / self.ngrid[2] as f64,
        ]
    }

    pub fn cell_volume(&self) -> f64 {
        let h = self.cell_size();
        h[0] * h[1] * h[2]
    }

    pub fn volume(&self) -> f64 {
        self.boxsize[0] * self.boxsize[1] * self.boxsize[2]
    }

    /// the signed (fftfreq-style) index along `axis`: indices past the
    /// midpoint map to negative frequencies, the Nyquist index included
    pub fn signed_index(&self, axis: usize, i: usize) -> isize {
        let n = self.ngrid[axis];
        if 2 * i < n {
            i as isize
        } else {
            i as isize - n as isize
        }
    }

    /// wavevector of the Fourier mode stored at `idx`
    pub fn wavevector(&self, idx: [usize; 3]) -> Vec3 {
        let mut k = [0.0; 3];
        for axis in 0..3 {
            let fundamental = 2.0 * core::f64::consts::PI / self.boxsize[axis];
            k[axis] = fundamental * self.signed_index(axis, idx[axis]) as f64;
        }
        k
    }

    /// minimum-image separation vector of the configuration-space cell at
    /// `idx` relative to the origin cell
    pub fn separation(&self, idx: [usize; 3]) -> Vec3 {
        let h = self.cell_size();
        let mut r = [0.0; 3];
        for axis in 0..3 {
            r[axis] = h[axis] * self.signed_index(axis, idx[axis]) as f64;
        }
        r
    }

    /// Fourier-space window of the assignment kernel for the mode at `idx`,
    /// i.e. `prod_i sinc(pi n_i / N_i)^p`
    pub fn assignment_window(&self, idx: [usize; 3], kernel: AssignmentKernel) -> f64 {
        let mut window = 1.0;
        for axis in 0..3 {
            let arg = core::f64::consts::PI * self.signed_index(axis, idx[axis]) as f64
                / self.ngrid[axis] as f64;
            let sinc = if arg == 0.0 { 1.0 } else { arg.sin() / arg };
            window *= sinc.powi(kernel.order());
        }
        window
    }

    /// Sum of the squared assignment window over all aliased images of the
    /// mode at `idx`.
    ///
    /// This is the factor that multiplies the Poisson shot noise of a field
    /// painted with `kernel` (Jing 2005). It never falls below the squared
    /// window of the mode itself.
    pub fn shot_noise_aliasing(&self, idx: [usize; 3], kernel: AssignmentKernel) -> f64 {
        let mut aliasing = 1.0;
        for axis in 0..3 {
            let arg = core::f64::consts::PI * self.signed_index(axis, idx[axis]) as f64
                / self.ngrid[axis] as f64;
            let s2 = arg.sin().powi(2);
            aliasing *= match kernel {
                AssignmentKernel::Ngp => 1.0,
                AssignmentKernel::Cic => 1.0 - 2.0 / 3.0 * s2,
                AssignmentKernel::Tsc => 1.0 - s2 + 2.0 / 15.0 * s2 * s2,
                AssignmentKernel::Pcs => {
                    1.0 - 4.0 / 3.0 * s2 + 2.0 / 5.0 * s2 * s2 - 4.0 / 315.0 * s2 * s2 * s2
                }
            };
        }
        aliasing
    }

    /// Paint weighted points onto a new density field.
    ///
    /// Positions outside of `[0, boxsize)` are folded back periodically at
    /// the level of node indices.
    pub fn assign<I>(&self, kernel: AssignmentKernel, points: I) -> Array3<f64>
    where
        I: IntoIterator<Item = (Vec3, f64)>,
    {
        let mut field = Array3::<f64>::zeros((self.ngrid[0], self.ngrid[1], self.ngrid[2]));
        let h = self.cell_size();
        let inv_cell_volume = 1.0 / self.cell_volume();

        let mut idx = [[0_isize; MAX_STENCIL]; 3];
        let mut wgt = [[0.0_f64; MAX_STENCIL]; 3];
        let mut len = [0_usize; 3];

        for (pos, weight) in points {
            if weight == 0.0 {
                continue;
            }
            for axis in 0..3 {
                len[axis] = kernel.stencil(pos[axis] / h[axis], &mut idx[axis], &mut wgt[axis]);
            }
            let amplitude = weight * inv_cell_volume;
            for a in 0..len[0] {
                let ix = idx[0][a].rem_euclid(self.ngrid[0] as isize) as usize;
                for b in 0..len[1] {
                    let iy = idx[1][b].rem_euclid(self.ngrid[1] as isize) as usize;
                    let wxy = wgt[0][a] * wgt[1][b];
                    for c in 0..len[2] {
                        let iz = idx[2][c].rem_euclid(self.ngrid[2] as isize) as usize;
                        field[[ix, iy, iz]] += amplitude * wxy * wgt[2][c];
                    }
                }
            }
        }
        field
    }
}

/// `sum_cells field^order * cell_volume`, i.e. the volume integral of a
/// power of the field
pub fn integrate_power(field: &Array3<f64>, order: i32, cell_volume: f64) -> f64 {
    field.iter().map(|v| v.powi(order)).sum::<f64>() * cell_volume
}

/// `sum_cells a * b * cell_volume`
pub fn integrate_product(
    a: &Array3<f64>,
    b: &Array3<f64>,
    cell_volume: f64,
) -> Result<f64, &'static str> {
    if a.shape() != b.shape() {
        return Err("fields must share the same shape");
    }
    let sum: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    Ok(sum * cell_volume)
}
