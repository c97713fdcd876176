//! Numerical building blocks shared by the `clustat` crate.
//!
//! Nothing in here knows about catalogues, parameter files or output
//! formats. Fallible functions report problems with `&'static str` messages;
//! the public crate wraps those into its own error type.

mod fft;
mod harmonics;
mod mesh;
mod vec3;

pub use fft::{Fft3d, to_complex_field};
pub use harmonics::{legendre, real_gaunt, real_spherical_harmonic};
pub use mesh::{AssignmentKernel, MeshGrid, integrate_power, integrate_product};
pub use rustfft::num_complex::Complex64;
pub use vec3::{Vec3, max_component, norm};
