//! Per-particle lines of sight.

use crate::catalogue::ParticleCatalogue;
use crate::context::{RunContext, Warning};
use clustat_internal::{Vec3, norm};
use rayon::prelude::*;

/// unit vector from the observer towards a particle
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineOfSight {
    pub direction: Vec3,
    /// distance from the observer (1 for a particle on the observer)
    pub distance: f64,
}

/// Compute the line of sight of every particle, measured from the
/// catalogue's observer.
///
/// A particle sitting exactly on the observer gets the zero vector and a
/// warning is recorded; its slot in the output is kept.
pub fn compute_lines_of_sight(
    catalogue: &ParticleCatalogue,
    ctx: &mut RunContext,
) -> Vec<LineOfSight> {
    let observer = *catalogue.observer();
    let (lines, degenerate): (Vec<LineOfSight>, Vec<Option<usize>>) = catalogue
        .particles()
        .par_iter()
        .enumerate()
        .map(|(i, p)| {
            let rel = [
                p.position[0] - observer[0],
                p.position[1] - observer[1],
                p.position[2] - observer[2],
            ];
            let mut mag = norm(&rel);
            let flagged = if mag == 0.0 {
                mag = 1.0;
                Some(i)
            } else {
                None
            };
            let los = LineOfSight {
                direction: [rel[0] / mag, rel[1] / mag, rel[2] / mag],
                distance: mag,
            };
            (los, flagged)
        })
        .unzip();

    for index in degenerate.into_iter().flatten() {
        ctx.warn(Warning::OriginCoincidentParticle {
            source: catalogue.source(),
            index,
        });
    }
    lines
}
