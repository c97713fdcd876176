//! The measurement orchestrator.
//!
//! A run is strictly sequenced: validate the parameters, select the
//! estimator, load the catalogues it needs, build the bins, align the
//! catalogues with the box, derive lines of sight, compute alpha and the
//! normalisation factors, and only then hand everything to a
//! [`MeasurementBackend`].

use crate::binning::Binning;
use crate::catalogue::{
    CatalogueSource, ParticleCatalogue, alpha_ratio, centre_pair_in_box, grid_margin,
    pad_pair_in_box,
};
use crate::context::{RunContext, Warning};
use crate::error::Error;
use crate::estimator::{EstimatorInputs, EstimatorKind, Measurement, MeasurementBackend};
use crate::los::{LineOfSight, compute_lines_of_sight};
use crate::mesh_backend::MeshBackend;
use crate::norm::NormalizationFactors;
use crate::output::{output_path, write_measurement};
use crate::params::{Alignment, CatalogueType, PadScale, ParameterSet};
use std::path::PathBuf;

/// particle count and summed weight of a catalogue used in a run
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CatalogueSummary {
    pub n_particles: usize,
    pub total_weight: f64,
}

impl CatalogueSummary {
    fn of(catalogue: &ParticleCatalogue) -> CatalogueSummary {
        CatalogueSummary {
            n_particles: catalogue.len(),
            total_weight: catalogue.total_weight(),
        }
    }
}

/// the outcome of a run, ready to be written out
#[derive(Clone, Debug)]
pub struct MeasurementRecord {
    pub measurement: Measurement,
    pub norm: NormalizationFactors,
    pub alpha: f64,
    pub data: Option<CatalogueSummary>,
    pub rand: Option<CatalogueSummary>,
}

/// Carry out a full measurement with `backend`.
///
/// Memory recorded in the run context for catalogues and lines of sight is
/// released before returning, whether or not the run succeeded.
pub fn run_measurement<B: MeasurementBackend>(
    params: &ParameterSet,
    backend: &mut B,
    ctx: &mut RunContext,
) -> Result<MeasurementRecord, Error> {
    let mut tracked_bytes = 0;
    let result = run_stages(params, backend, ctx, &mut tracked_bytes);
    ctx.memory_mut().release(tracked_bytes);
    result
}

/// Run the built-in mesh estimators and write the result to the
/// measurement directory. Returns the path of the written file.
pub fn run_and_save(params: &ParameterSet, ctx: &mut RunContext) -> Result<PathBuf, Error> {
    let record = run_measurement(params, &mut MeshBackend::new(), ctx)?;
    let path = output_path(params);
    write_measurement(&path, params, &record)?;
    ctx.finalise();
    Ok(path)
}

fn track(ctx: &mut RunContext, tracked_bytes: &mut usize, bytes: usize) {
    ctx.memory_mut().allocate(bytes);
    *tracked_bytes += bytes;
}

fn load(
    params: &ParameterSet,
    source: CatalogueSource,
    ctx: &mut RunContext,
    tracked_bytes: &mut usize,
) -> Result<ParticleCatalogue, Error> {
    let (path, key) = match source {
        CatalogueSource::Data => (params.data_catalogue_path(), "data_catalogue_file"),
        CatalogueSource::Random => (params.rand_catalogue_path(), "rand_catalogue_file"),
    };
    let path = path.ok_or_else(|| {
        Error::invalid_configuration(key, format!("a {source} catalogue is required"))
    })?;
    let catalogue = ParticleCatalogue::load(path, params.catalogue_format, source)?;
    track(ctx, tracked_bytes, catalogue.memory_bytes());
    log::info!(
        "Loaded the {source} catalogue: {} particles of total sum weight {:.3}.",
        catalogue.len(),
        catalogue.total_weight()
    );
    Ok(catalogue)
}

fn run_stages<B: MeasurementBackend>(
    params: &ParameterSet,
    backend: &mut B,
    ctx: &mut RunContext,
    tracked_bytes: &mut usize,
) -> Result<MeasurementRecord, Error> {
    params.validate()?;
    let kind = EstimatorKind::select(params.catalogue_type, params.statistic_type)?;
    let required = kind.required_inputs();
    log::info!("[A] Selected the {kind} estimator.");

    let mut data = if required.data {
        Some(load(params, CatalogueSource::Data, ctx, tracked_bytes)?)
    } else {
        None
    };
    let mut rand = if required.rand {
        Some(load(params, CatalogueSource::Random, ctx, tracked_bytes)?)
    } else {
        None
    };
    log::info!("[B.1] Catalogues loaded.");

    let binning = Binning::from_params(params)?;
    log::info!(
        "[B.2] Built {} {:?} bins in {:?} space.",
        binning.num_bins(),
        binning.scheme(),
        binning.space()
    );

    align_catalogues(params, kind, data.as_mut(), rand.as_mut(), ctx);
    log::info!("[B.3] Catalogues aligned inside the measurement box.");

    let los_data = match (&data, required.los_data) {
        (Some(cat), true) => Some(lines_of_sight(cat, ctx, tracked_bytes)),
        _ => None,
    };
    let los_rand = match (&rand, required.los_rand) {
        (Some(cat), true) => Some(lines_of_sight(cat, ctx, tracked_bytes)),
        _ => None,
    };

    let alpha = match (&data, &rand) {
        (Some(d), Some(r)) => alpha_ratio(d, r)?,
        _ => 1.0,
    };
    log::info!("Alpha contrast: {alpha:.6e}.");

    let (active, alpha_for_norm) = match (&data, &rand) {
        (_, Some(r)) => (r, alpha),
        (Some(d), None) => (d, 1.0),
        (None, None) => {
            return Err(Error::internal_legacy_adhoc(
                "no catalogue is available for the normalisation",
            ));
        }
    };
    let pair = match (&data, &rand) {
        (Some(d), Some(r)) if params.catalogue_type == CatalogueType::Survey => Some((d, r)),
        _ => None,
    };
    let norm = NormalizationFactors::compute(
        params.norm_convention,
        kind.npoint(),
        params.survey_volume(),
        &params.mesh_grid()?,
        params.assignment.kernel(),
        active,
        alpha_for_norm,
        pair,
    )?;
    log::info!("[B.4] Normalisation computed.");

    let inputs = EstimatorInputs {
        kind,
        params,
        binning: &binning,
        data: data.as_ref(),
        rand: rand.as_ref(),
        los_data: los_data.as_deref(),
        los_rand: los_rand.as_deref(),
        alpha,
        norm: &norm,
    };
    let measurement = backend.measure(&inputs, ctx)?;
    log::info!("[C] Measurement completed.");

    Ok(MeasurementRecord {
        measurement,
        norm,
        alpha,
        data: data.as_ref().map(CatalogueSummary::of),
        rand: rand.as_ref().map(CatalogueSummary::of),
    })
}

fn lines_of_sight(
    catalogue: &ParticleCatalogue,
    ctx: &mut RunContext,
    tracked_bytes: &mut usize,
) -> Vec<LineOfSight> {
    let lines = compute_lines_of_sight(catalogue, ctx);
    track(
        ctx,
        tracked_bytes,
        lines.len() * core::mem::size_of::<LineOfSight>(),
    );
    lines
}

/// the padding margin in physical units
fn padding_margin(params: &ParameterSet) -> [f64; 3] {
    match params.padscale {
        PadScale::Grid => grid_margin(&params.boxsize, &params.ngrid, &[params.padfactor; 3]),
        PadScale::Box => params.box_padding(),
    }
}

/// Place the catalogues in the measurement box: periodic boxes are wrapped,
/// everything else is padded or centred (pairs on their joint extent).
fn align_catalogues(
    params: &ParameterSet,
    kind: EstimatorKind,
    data: Option<&mut ParticleCatalogue>,
    rand: Option<&mut ParticleCatalogue>,
    ctx: &mut RunContext,
) {
    let boxsize = params.boxsize;
    let margin = padding_margin(params);
    let mut check_extent = |cat: &ParticleCatalogue| {
        if !cat.bounds().fits_in_box(&boxsize) {
            ctx.warn(Warning::CatalogueExceedsBox {
                source: cat.source(),
            });
        }
    };
    match (data, rand) {
        (Some(data), Some(rand)) => {
            match params.alignment {
                Alignment::Pad => pad_pair_in_box(data, rand, &margin),
                Alignment::Centre => centre_pair_in_box(data, rand, &boxsize),
            }
            check_extent(&*data);
            check_extent(&*rand);
        }
        (Some(cat), None) | (None, Some(cat)) => {
            if kind.is_periodic() {
                cat.wrap_periodic(&boxsize);
            } else {
                match params.alignment {
                    Alignment::Pad => cat.pad_in_box(&margin),
                    Alignment::Centre => cat.centre_in_box(&boxsize),
                }
            }
            check_extent(&*cat);
        }
        (None, None) => {}
    }
}
