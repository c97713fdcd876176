//! Estimator selection and the [`MeasurementBackend`] seam.
//!
//! The pairing of a catalogue type with a statistic type picks exactly one
//! [`EstimatorKind`]; the kind fixes which catalogues and lines of sight the
//! estimator receives. A backend then turns those inputs into a
//! [`Measurement`].

use crate::binning::Binning;
use crate::catalogue::ParticleCatalogue;
use crate::context::RunContext;
use crate::error::Error;
use crate::los::LineOfSight;
use crate::norm::NormalizationFactors;
use crate::params::{CatalogueType, NPoint, ParameterSet, StatisticType};
use clustat_internal::Complex64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EstimatorKind {
    PowspecSurvey,
    PowspecSim,
    TwoPcfSurvey,
    TwoPcfSim,
    TwoPcfWindow,
    BispecSurvey,
    BispecSim,
    ThreePcfSurvey,
    ThreePcfSim,
    ThreePcfWindow,
    ThreePcfWindowWideAngle,
}

/// the inputs an estimator reads
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequiredInputs {
    pub data: bool,
    pub rand: bool,
    pub los_data: bool,
    pub los_rand: bool,
}

impl EstimatorKind {
    /// pick the estimator for a catalogue/statistic pairing
    pub fn select(
        catalogue_type: CatalogueType,
        statistic_type: StatisticType,
    ) -> Result<EstimatorKind, Error> {
        use CatalogueType as C;
        use StatisticType as S;
        let kind = match (catalogue_type, statistic_type) {
            (C::Survey, S::Powspec) => EstimatorKind::PowspecSurvey,
            (C::Sim, S::Powspec) => EstimatorKind::PowspecSim,
            (C::Survey, S::TwoPcf) => EstimatorKind::TwoPcfSurvey,
            (C::Sim, S::TwoPcf) => EstimatorKind::TwoPcfSim,
            (C::Survey, S::Bispec) => EstimatorKind::BispecSurvey,
            (C::Sim, S::Bispec) => EstimatorKind::BispecSim,
            (C::Survey, S::ThreePcf) => EstimatorKind::ThreePcfSurvey,
            (C::Sim, S::ThreePcf) => EstimatorKind::ThreePcfSim,
            (C::Survey | C::Random, S::TwoPcfWindow) => EstimatorKind::TwoPcfWindow,
            (C::Survey | C::Random, S::ThreePcfWindow) => EstimatorKind::ThreePcfWindow,
            (C::Survey | C::Random, S::ThreePcfWindowWideAngle) => {
                EstimatorKind::ThreePcfWindowWideAngle
            }
            (cat, stat) => {
                return Err(Error::invalid_configuration(
                    "catalogue_type/statistic_type",
                    format!("no estimator measures \"{stat}\" from a {cat:?} catalogue"),
                ));
            }
        };
        Ok(kind)
    }

    pub fn required_inputs(&self) -> RequiredInputs {
        match self {
            EstimatorKind::PowspecSurvey
            | EstimatorKind::TwoPcfSurvey
            | EstimatorKind::BispecSurvey
            | EstimatorKind::ThreePcfSurvey => RequiredInputs {
                data: true,
                rand: true,
                los_data: true,
                los_rand: true,
            },
            EstimatorKind::PowspecSim
            | EstimatorKind::TwoPcfSim
            | EstimatorKind::BispecSim
            | EstimatorKind::ThreePcfSim => RequiredInputs {
                data: true,
                rand: false,
                los_data: false,
                los_rand: false,
            },
            EstimatorKind::TwoPcfWindow
            | EstimatorKind::ThreePcfWindow
            | EstimatorKind::ThreePcfWindowWideAngle => RequiredInputs {
                data: false,
                rand: true,
                los_data: false,
                los_rand: true,
            },
        }
    }

    pub fn npoint(&self) -> NPoint {
        match self {
            EstimatorKind::PowspecSurvey
            | EstimatorKind::PowspecSim
            | EstimatorKind::TwoPcfSurvey
            | EstimatorKind::TwoPcfSim
            | EstimatorKind::TwoPcfWindow => NPoint::Two,
            _ => NPoint::Three,
        }
    }

    /// whether the estimator works in a periodic box
    pub fn is_periodic(&self) -> bool {
        matches!(
            self,
            EstimatorKind::PowspecSim
                | EstimatorKind::TwoPcfSim
                | EstimatorKind::BispecSim
                | EstimatorKind::ThreePcfSim
        )
    }
}

impl core::fmt::Display for EstimatorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let name = match self {
            EstimatorKind::PowspecSurvey => "survey-type power spectrum",
            EstimatorKind::PowspecSim => "simulation-box power spectrum",
            EstimatorKind::TwoPcfSurvey => "survey-type two-point correlation function",
            EstimatorKind::TwoPcfSim => "simulation-box two-point correlation function",
            EstimatorKind::TwoPcfWindow => "two-point correlation function window",
            EstimatorKind::BispecSurvey => "survey-type bispectrum",
            EstimatorKind::BispecSim => "simulation-box bispectrum",
            EstimatorKind::ThreePcfSurvey => "survey-type three-point correlation function",
            EstimatorKind::ThreePcfSim => "simulation-box three-point correlation function",
            EstimatorKind::ThreePcfWindow => "three-point correlation function window",
            EstimatorKind::ThreePcfWindowWideAngle => {
                "three-point correlation function window (wide-angle)"
            }
        };
        f.write_str(name)
    }
}

/// Everything an estimator may read. Only the fields listed by
/// [`EstimatorKind::required_inputs`] are populated.
#[derive(Clone, Copy, Debug)]
pub struct EstimatorInputs<'a> {
    pub kind: EstimatorKind,
    pub params: &'a ParameterSet,
    pub binning: &'a Binning,
    pub data: Option<&'a ParticleCatalogue>,
    pub rand: Option<&'a ParticleCatalogue>,
    pub los_data: Option<&'a [LineOfSight]>,
    pub los_rand: Option<&'a [LineOfSight]>,
    pub alpha: f64,
    pub norm: &'a NormalizationFactors,
}

impl<'a> EstimatorInputs<'a> {
    pub fn data(&self) -> Result<&'a ParticleCatalogue, Error> {
        self.data
            .ok_or_else(|| Error::internal_legacy_adhoc("the data catalogue wasn't provided"))
    }

    pub fn rand(&self) -> Result<&'a ParticleCatalogue, Error> {
        self.rand
            .ok_or_else(|| Error::internal_legacy_adhoc("the random catalogue wasn't provided"))
    }

    pub fn los_data(&self) -> Result<&'a [LineOfSight], Error> {
        self.los_data
            .ok_or_else(|| Error::internal_legacy_adhoc("data lines of sight weren't provided"))
    }

    pub fn los_rand(&self) -> Result<&'a [LineOfSight], Error> {
        self.los_rand
            .ok_or_else(|| Error::internal_legacy_adhoc("random lines of sight weren't provided"))
    }
}

/// one row of a measured statistic
#[derive(Clone, Debug, PartialEq)]
pub struct BinRecord {
    /// nominal bin centre along each coordinate
    pub centres: Vec<f64>,
    /// average coordinate of the contributing modes or separations
    pub effective: Vec<f64>,
    /// number of contributing modes or separation cells
    pub count: usize,
    pub value: Complex64,
    pub shotnoise: Complex64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Measurement {
    pub kind: EstimatorKind,
    /// coordinate names, e.g. `["k"]` or `["r1", "r2"]`
    pub coordinates: Vec<&'static str>,
    pub records: Vec<BinRecord>,
}

/// Computes a statistic from prepared, aligned and normalised inputs.
pub trait MeasurementBackend {
    fn measure(
        &mut self,
        inputs: &EstimatorInputs<'_>,
        ctx: &mut RunContext,
    ) -> Result<Measurement, Error>;
}
