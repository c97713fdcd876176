//! 3D complex FFTs assembled from 1D `rustfft` plans applied along each axis
//!
//! Conventions:
//! - forward: `F(k) = sum_x f(x) exp(-i k.x)`
//! - inverse: `f(x) = sum_k F(k) exp(+i k.x)` (no `1/N` factor)

use ndarray::{Array3, Axis};
use rustfft::{Fft, FftPlanner, num_complex::Complex64};
use std::sync::Arc;

/// Wraps the forward and inverse plans for a fixed mesh shape and counts the
/// transforms it performs.
pub struct Fft3d {
    shape: [usize; 3],
    forward: [Arc<dyn Fft<f64>>; 3],
    inverse: [Arc<dyn Fft<f64>>; 3],
    scratch: Vec<Complex64>,
    lane: Vec<Complex64>,
    n_forward: usize,
    n_inverse: usize,
}

impl core::fmt::Debug for Fft3d {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Fft3d")
            .field("shape", &self.shape)
            .field("n_forward", &self.n_forward)
            .field("n_inverse", &self.n_inverse)
            .finish()
    }
}

impl Fft3d {
    pub fn new(shape: [usize; 3]) -> Result<Fft3d, &'static str> {
        if shape.contains(&0) {
            return Err("FFT shape must not hold 0");
        }
        let mut planner = FftPlanner::<f64>::new();
        let forward = [
            planner.plan_fft_forward(shape[0]),
            planner.plan_fft_forward(shape[1]),
            planner.plan_fft_forward(shape[2]),
        ];
        let inverse = [
            planner.plan_fft_inverse(shape[0]),
            planner.plan_fft_inverse(shape[1]),
            planner.plan_fft_inverse(shape[2]),
        ];
        let scratch_len = forward
            .iter()
            .chain(inverse.iter())
            .map(|plan| plan.get_inplace_scratch_len())
            .max()
            .unwrap_or(0);
        let max_len = shape.iter().copied().max().unwrap_or(0);
        Ok(Fft3d {
            shape,
            forward,
            inverse,
            scratch: vec![Complex64::new(0.0, 0.0); scratch_len],
            lane: Vec::with_capacity(max_len),
            n_forward: 0,
            n_inverse: 0,
        })
    }

    pub fn forward(&mut self, field: &mut Array3<Complex64>) -> Result<(), &'static str> {
        self.check_shape(field)?;
        let plans = self.forward.clone();
        self.transform(field, &plans);
        self.n_forward += 1;
        Ok(())
    }

    pub fn inverse(&mut self, field: &mut Array3<Complex64>) -> Result<(), &'static str> {
        self.check_shape(field)?;
        let plans = self.inverse.clone();
        self.transform(field, &plans);
        self.n_inverse += 1;
        Ok(())
    }

    /// number of (forward, inverse) 3D transforms performed so far
    pub fn counts(&self) -> (usize, usize) {
        (self.n_forward, self.n_inverse)
    }

    fn check_shape(&self, field: &Array3<Complex64>) -> Result<(), &'static str> {
        if field.shape() != &self.shape[..] {
            Err("field shape doesn't match the planned FFT shape")
        } else {
            Ok(())
        }
    }

    fn transform(&mut self, field: &mut Array3<Complex64>, plans: &[Arc<dyn Fft<f64>>; 3]) {
        for (axis, plan) in plans.iter().enumerate() {
            for mut lane in field.lanes_mut(Axis(axis)) {
                self.lane.clear();
                self.lane.extend(lane.iter().copied());
                plan.process_with_scratch(&mut self.lane, &mut self.scratch);
                for (dst, src) in lane.iter_mut().zip(self.lane.iter()) {
                    *dst = *src;
                }
            }
        }
    }
}

/// promote a real field to a complex one
pub fn to_complex_field(field: &Array3<f64>) -> Array3<Complex64> {
    field.mapv(|v| Complex64::new(v, 0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_transforms_to_constant() {
        let mut field = Array3::from_elem((4, 6, 2), Complex64::new(0.0, 0.0));
        field[[0, 0, 0]] = Complex64::new(1.0, 0.0);
        let mut fft = Fft3d::new([4, 6, 2]).unwrap();
        fft.forward(&mut field).unwrap();
        for v in field.iter() {
            assert!((v.re - 1.0).abs() < 1e-14 && v.im.abs() < 1e-14);
        }
        assert_eq!(fft.counts(), (1, 0));
    }

    #[test]
    fn forward_inverse_roundtrip_scales_by_n() {
        let shape = [3, 4, 5];
        let original = Array3::from_shape_fn((3, 4, 5), |(i, j, k)| {
            Complex64::new((i * 20 + j * 5 + k) as f64, (i as f64) - (k as f64))
        });
        let mut field = original.clone();
        let mut fft = Fft3d::new(shape).unwrap();
        fft.forward(&mut field).unwrap();
        fft.inverse(&mut field).unwrap();
        let n = 60.0;
        for (a, b) in field.iter().zip(original.iter()) {
            assert!((*a / n - *b).norm() < 1e-10);
        }
        assert_eq!(fft.counts(), (1, 1));
    }

    #[test]
    fn shape_mismatch() {
        let mut fft = Fft3d::new([2, 2, 2]).unwrap();
        let mut field = Array3::from_elem((2, 2, 3), Complex64::new(0.0, 0.0));
        assert!(fft.forward(&mut field).is_err());
        assert!(Fft3d::new([2, 0, 2]).is_err());
    }
}
