//! Legendre polynomials and real spherical harmonics
//!
//! The real harmonics are built from the (Condon-Shortley phased) associated
//! Legendre functions:
//! - `m > 0`: `sqrt(2) K_lm P_l^m(cos theta) cos(m phi)`
//! - `m = 0`: `K_l0 P_l(cos theta)`
//! - `m < 0`: `sqrt(2) K_l|m| P_l^|m|(cos theta) sin(|m| phi)`
//!
//! so that `sum_m Y_lm(a) Y_lm(b) = (2l+1)/(4 pi) P_l(a.b)` for unit vectors.
//!
//! Three-point multipoles couple harmonics through the real Gaunt
//! coefficients `int Y_l1m1 Y_l2m2 Y_l3m3 dOmega`, evaluated by quadrature
//! that is exact for the band limit of the integrand.

use crate::vec3::{Vec3, norm};
use core::f64::consts::PI;

/// Legendre polynomial `P_ell(mu)` via the Bonnet recurrence
pub fn legendre(ell: u32, mu: f64) -> f64 {
    if ell == 0 {
        return 1.0;
    }
    let mut p_prev = 1.0;
    let mut p_curr = mu;
    for l in 2..=ell {
        let l = l as f64;
        let p_next = ((2.0 * l - 1.0) * mu * p_curr - (l - 1.0) * p_prev) / l;
        p_prev = p_curr;
        p_curr = p_next;
    }
    p_curr
}

/// associated Legendre function `P_l^m(x)` for `0 <= m <= l`
fn assoc_legendre(l: u32, m: u32, x: f64) -> f64 {
    let mut pmm = 1.0;
    if m > 0 {
        let somx2 = ((1.0 - x) * (1.0 + x)).max(0.0).sqrt();
        let mut fact = 1.0;
        for _ in 0..m {
            pmm *= -fact * somx2;
            fact += 2.0;
        }
    }
    if l == m {
        return pmm;
    }
    let mut pmmp1 = x * (2 * m + 1) as f64 * pmm;
    if l == m + 1 {
        return pmmp1;
    }
    let mut pll = 0.0;
    for ll in (m + 2)..=l {
        pll = (x * (2 * ll - 1) as f64 * pmmp1 - (ll + m - 1) as f64 * pmm) / (ll - m) as f64;
        pmm = pmmp1;
        pmmp1 = pll;
    }
    pll
}

/// `sqrt((2l+1)/(4 pi) (l-m)!/(l+m)!)`
fn normalisation(l: u32, m: u32) -> f64 {
    let mut ratio = 1.0;
    for j in (l - m + 1)..=(l + m) {
        ratio /= j as f64;
    }
    ((2 * l + 1) as f64 / (4.0 * PI) * ratio).sqrt()
}

/// Real spherical harmonic `Y_ell^m` evaluated along the direction of `v`.
///
/// `v` need not be normalised. For a zero vector the direction is undefined:
/// the monopole keeps its constant value and every `ell > 0` harmonic is 0.
///
/// # Panics
/// If `|m| > ell`.
pub fn real_spherical_harmonic(ell: u32, m: i32, v: &Vec3) -> f64 {
    assert!(m.unsigned_abs() <= ell, "|m| must not exceed ell");
    let r = norm(v);
    if r == 0.0 {
        return if ell == 0 { normalisation(0, 0) } else { 0.0 };
    }
    let cos_theta = (v[2] / r).clamp(-1.0, 1.0);
    let abs_m = m.unsigned_abs();
    let base = normalisation(ell, abs_m) * assoc_legendre(ell, abs_m, cos_theta);
    if m == 0 {
        base
    } else {
        let phi = v[1].atan2(v[0]);
        let angular = if m > 0 {
            (abs_m as f64 * phi).cos()
        } else {
            (abs_m as f64 * phi).sin()
        };
        core::f64::consts::SQRT_2 * base * angular
    }
}

/// Gauss-Legendre nodes and weights on `[-1, 1]`
fn gauss_legendre(n: usize) -> (Vec<f64>, Vec<f64>) {
    let mut nodes = vec![0.0; n];
    let mut weights = vec![0.0; n];
    let order = n as f64;
    for i in 0..n {
        let mut x = (PI * (i as f64 + 0.75) / (order + 0.5)).cos();
        let mut derivative = 1.0;
        for _ in 0..100 {
            let mut p_prev = 1.0;
            let mut p_curr = x;
            for l in 2..=n {
                let l = l as f64;
                let p_next = ((2.0 * l - 1.0) * x * p_curr - (l - 1.0) * p_prev) / l;
                p_prev = p_curr;
                p_curr = p_next;
            }
            derivative = order * (x * p_curr - p_prev) / (x * x - 1.0);
            let step = p_curr / derivative;
            x -= step;
            if step.abs() < 1e-15 {
                break;
            }
        }
        nodes[i] = x;
        weights[i] = 2.0 / ((1.0 - x * x) * derivative * derivative);
    }
    (nodes, weights)
}

/// Real Gaunt coefficient `int Y_l1m1 Y_l2m2 Y_l3m3 dOmega`.
///
/// Vanishes unless `l1 + l2 + l3` is even and the degrees satisfy the
/// triangle inequality.
///
/// # Panics
/// If any `|m| > l`.
pub fn real_gaunt(l1: u32, m1: i32, l2: u32, m2: i32, l3: u32, m3: i32) -> f64 {
    assert!(
        m1.unsigned_abs() <= l1 && m2.unsigned_abs() <= l2 && m3.unsigned_abs() <= l3,
        "|m| must not exceed ell"
    );
    let degree = (l1 + l2 + l3) as usize;
    if degree % 2 == 1 || l1 > l2 + l3 || l2 > l1 + l3 || l3 > l1 + l2 {
        return 0.0;
    }
    // the integrand is a polynomial of `degree` in cos(theta) and a
    // trigonometric polynomial of at most `degree` in phi
    let (nodes, weights) = gauss_legendre(degree / 2 + 1);
    let n_phi = degree + 1;
    let dphi = 2.0 * PI / n_phi as f64;

    let mut total = 0.0;
    for (&mu, &weight) in nodes.iter().zip(weights.iter()) {
        let sin_theta = (1.0 - mu * mu).max(0.0).sqrt();
        let mut ring = 0.0;
        for j in 0..n_phi {
            let phi = (j as f64 + 0.5) * dphi;
            let v = [sin_theta * phi.cos(), sin_theta * phi.sin(), mu];
            ring += real_spherical_harmonic(l1, m1, &v)
                * real_spherical_harmonic(l2, m2, &v)
                * real_spherical_harmonic(l3, m3, &v);
        }
        total += weight * ring * dphi;
    }
    total
}
