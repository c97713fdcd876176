//! The run configuration ([`ParameterSet`]), read from a TOML parameter file.
//!
//! Every enumerated option is a closed enum. Unknown option strings are
//! rejected while parsing, so nothing downstream ever needs a fallback arm.

use crate::binning::{BinScheme, BinSpace};
use crate::error::Error;
use crate::estimator::EstimatorKind;
use crate::norm::NormConvention;
use clustat_internal::{AssignmentKernel, MeshGrid, Vec3};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogueType {
    /// a data catalogue paired with a random catalogue
    Survey,
    /// a data catalogue in a periodic simulation box
    Sim,
    /// a random catalogue on its own (window measurements)
    Random,
    /// no catalogue
    None,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum StatisticType {
    #[serde(rename = "powspec")]
    Powspec,
    #[serde(rename = "2pcf")]
    TwoPcf,
    #[serde(rename = "2pcf-win")]
    TwoPcfWindow,
    #[serde(rename = "bispec")]
    Bispec,
    #[serde(rename = "3pcf")]
    ThreePcf,
    #[serde(rename = "3pcf-win")]
    ThreePcfWindow,
    #[serde(rename = "3pcf-win-wa")]
    ThreePcfWindowWideAngle,
}

/// whether a statistic is built from pairs or from triplets
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NPoint {
    Two,
    Three,
}

impl StatisticType {
    pub fn npoint(&self) -> NPoint {
        match self {
            StatisticType::Powspec | StatisticType::TwoPcf | StatisticType::TwoPcfWindow => {
                NPoint::Two
            }
            StatisticType::Bispec
            | StatisticType::ThreePcf
            | StatisticType::ThreePcfWindow
            | StatisticType::ThreePcfWindowWideAngle => NPoint::Three,
        }
    }

    /// the coordinate space a statistic is naturally binned in
    pub fn default_space(&self) -> BinSpace {
        match self {
            StatisticType::Powspec | StatisticType::Bispec => BinSpace::Fourier,
            _ => BinSpace::Config,
        }
    }
}

impl core::fmt::Display for StatisticType {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let name = match self {
            StatisticType::Powspec => "powspec",
            StatisticType::TwoPcf => "2pcf",
            StatisticType::TwoPcfWindow => "2pcf-win",
            StatisticType::Bispec => "bispec",
            StatisticType::ThreePcf => "3pcf",
            StatisticType::ThreePcfWindow => "3pcf-win",
            StatisticType::ThreePcfWindowWideAngle => "3pcf-win-wa",
        };
        f.write_str(name)
    }
}

/// the column layout of catalogue files
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogueFormat {
    /// `x y z w`
    Weighted,
    /// `x y z` (every weight is 1)
    Unweighted,
}

impl CatalogueFormat {
    pub fn n_fields(&self) -> usize {
        match self {
            CatalogueFormat::Weighted => 4,
            CatalogueFormat::Unweighted => 3,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    Pad,
    Centre,
}

impl core::fmt::Display for Alignment {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let name = match self {
            Alignment::Pad => "pad",
            Alignment::Centre => "centre",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PadScale {
    /// `padfactor` counts grid cells
    Grid,
    /// `padfactor` is a fraction of the box size
    Box,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Assignment {
    Ngp,
    Cic,
    Tsc,
    Pcs,
}

impl core::fmt::Display for Assignment {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let name = match self {
            Assignment::Ngp => "ngp",
            Assignment::Cic => "cic",
            Assignment::Tsc => "tsc",
            Assignment::Pcs => "pcs",
        };
        f.write_str(name)
    }
}

impl Assignment {
    pub fn kernel(&self) -> AssignmentKernel {
        match self {
            Assignment::Ngp => AssignmentKernel::Ngp,
            Assignment::Cic => AssignmentKernel::Cic,
            Assignment::Tsc => AssignmentKernel::Tsc,
            Assignment::Pcs => AssignmentKernel::Pcs,
        }
    }
}

/// which slice of a three-point statistic gets measured
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Form {
    Full,
    Diag,
    OffDiag,
    Row,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParameterSet {
    pub catalogue_type: CatalogueType,
    pub statistic_type: StatisticType,
    pub data_catalogue_file: String,
    pub rand_catalogue_file: String,
    pub catalogue_format: CatalogueFormat,
    pub measurement_dir: PathBuf,
    pub output_tag: String,

    pub boxsize: Vec3,
    pub ngrid: [usize; 3],
    pub alignment: Alignment,
    pub padscale: PadScale,
    pub padfactor: f64,
    pub assignment: Assignment,
    pub norm_convention: NormConvention,
    /// survey volume used by the particle-based normalisation; defaults to
    /// the box volume
    pub volume: Option<f64>,

    pub binning: BinScheme,
    pub space: Option<BinSpace>,
    pub bin_min: f64,
    pub bin_max: f64,
    pub num_bins: usize,
    pub num_bins_pad: usize,

    pub ell1: u32,
    pub ell2: u32,
    #[serde(rename = "ELL")]
    pub ell: u32,
    pub i_wa: u32,
    pub j_wa: u32,
    pub form: Form,
    pub idx_bin: usize,
}

impl Default for ParameterSet {
    fn default() -> Self {
        ParameterSet {
            catalogue_type: CatalogueType::None,
            statistic_type: StatisticType::Powspec,
            data_catalogue_file: String::new(),
            rand_catalogue_file: String::new(),
            catalogue_format: CatalogueFormat::Weighted,
            measurement_dir: PathBuf::from("."),
            output_tag: String::new(),
            boxsize: [0.0; 3],
            ngrid: [0; 3],
            alignment: Alignment::Centre,
            padscale: PadScale::Box,
            padfactor: 0.0,
            assignment: Assignment::Tsc,
            norm_convention: NormConvention::Particle,
            volume: None,
            binning: BinScheme::Lin,
            space: None,
            bin_min: 0.0,
            bin_max: 0.0,
            num_bins: 0,
            num_bins_pad: 5,
            ell1: 0,
            ell2: 0,
            ell: 0,
            i_wa: 0,
            j_wa: 0,
            form: Form::Diag,
            idx_bin: 0,
        }
    }
}

/// a path is only considered set if it holds something besides whitespace
fn path_if_set(path: &str) -> Option<&Path> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(Path::new(trimmed))
    }
}

impl ParameterSet {
    /// read, parse and validate a parameter file
    pub fn from_file(path: &Path) -> Result<ParameterSet, Error> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| Error::io(path, e.to_string()))?;
        Self::from_toml_str(&contents)
    }

    /// parse and validate parameters from a TOML document
    pub fn from_toml_str(contents: &str) -> Result<ParameterSet, Error> {
        let params: ParameterSet = toml::from_str(contents)
            .map_err(|e| Error::invalid_configuration("parameter file", e.message().to_owned()))?;
        params.validate()?;
        Ok(params)
    }

    pub fn npoint(&self) -> NPoint {
        self.statistic_type.npoint()
    }

    pub fn space(&self) -> BinSpace {
        self.space
            .unwrap_or_else(|| self.statistic_type.default_space())
    }

    pub fn data_catalogue_path(&self) -> Option<&Path> {
        path_if_set(&self.data_catalogue_file)
    }

    pub fn rand_catalogue_path(&self) -> Option<&Path> {
        path_if_set(&self.rand_catalogue_file)
    }

    pub fn box_volume(&self) -> f64 {
        self.boxsize[0] * self.boxsize[1] * self.boxsize[2]
    }

    /// the volume entering the particle-based normalisation
    pub fn survey_volume(&self) -> f64 {
        self.volume.unwrap_or_else(|| self.box_volume())
    }

    pub fn mesh_grid(&self) -> Result<MeshGrid, Error> {
        MeshGrid::new(self.boxsize, self.ngrid).map_err(Error::internal_legacy_adhoc)
    }

    /// the padding margin in physical units when `padscale = "box"`
    pub fn box_padding(&self) -> Vec3 {
        [
            self.padfactor * self.boxsize[0],
            self.padfactor * self.boxsize[1],
            self.padfactor * self.boxsize[2],
        ]
    }

    /// check that the parameters are internally consistent
    pub fn validate(&self) -> Result<(), Error> {
        if self.boxsize.iter().any(|&l| !(l.is_finite() && l > 0.0)) {
            return Err(Error::invalid_configuration(
                "boxsize",
                format!("{:?} must hold positive finite values", self.boxsize),
            ));
        }
        if self.ngrid.contains(&0) {
            return Err(Error::invalid_configuration(
                "ngrid",
                format!("{:?} must hold positive values", self.ngrid),
            ));
        }
        if self.num_bins == 0 {
            return Err(Error::invalid_configuration(
                "num_bins",
                "must be positive".to_owned(),
            ));
        }
        if !(self.padfactor.is_finite() && self.padfactor >= 0.0) {
            return Err(Error::invalid_configuration(
                "padfactor",
                format!("{} must be finite and non-negative", self.padfactor),
            ));
        }
        if let Some(volume) = self.volume {
            if !(volume.is_finite() && volume > 0.0) {
                return Err(Error::invalid_configuration(
                    "volume",
                    format!("{volume} must be positive"),
                ));
            }
        }

        let kind = EstimatorKind::select(self.catalogue_type, self.statistic_type)?;
        let inputs = kind.required_inputs();
        if inputs.data && self.data_catalogue_path().is_none() {
            return Err(Error::invalid_configuration(
                "data_catalogue_file",
                format!("{kind} needs a data-source catalogue"),
            ));
        }
        if inputs.rand && self.rand_catalogue_path().is_none() {
            return Err(Error::invalid_configuration(
                "rand_catalogue_file",
                format!("{kind} needs a random-source catalogue"),
            ));
        }

        // the mixed-mesh factor pairs the data catalogue with the randoms
        if self.norm_convention == NormConvention::MeshMixed
            && !(self.catalogue_type == CatalogueType::Survey
                && self.npoint() == NPoint::Two
                && inputs.data)
        {
            return Err(Error::invalid_configuration(
                "norm_convention",
                format!(
                    "\"mesh-mixed\" is only defined for two-point statistics measured from \
                     paired data and random catalogues, not for the {kind}"
                ),
            ));
        }

        if self.npoint() == NPoint::Three
            && matches!(self.form, Form::OffDiag | Form::Row)
            && self.idx_bin >= self.num_bins
        {
            return Err(Error::invalid_configuration(
                "idx_bin",
                format!("{} must be smaller than num_bins ({})", self.idx_bin, self.num_bins),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    const SIM_POWSPEC: &str = r#"
        catalogue_type = "sim"
        statistic_type = "powspec"
        data_catalogue_file = "data.txt"
        boxsize = [100.0, 100.0, 100.0]
        ngrid = [16, 16, 16]
        binning = "lin"
        bin_min = 0.01
        bin_max = 0.2
        num_bins = 10
        norm_convention = "none"
        ELL = 2
    "#;

    #[test]
    fn parse_sim_powspec() {
        let params = ParameterSet::from_toml_str(SIM_POWSPEC).unwrap();
        assert_eq!(params.catalogue_type, CatalogueType::Sim);
        assert_eq!(params.statistic_type, StatisticType::Powspec);
        assert_eq!(params.norm_convention, NormConvention::None);
        assert_eq!(params.ell, 2);
        assert_eq!(params.space(), BinSpace::Fourier);
        assert_eq!(params.npoint(), NPoint::Two);
        assert_eq!(params.survey_volume(), 1.0e6);
        assert_eq!(params.data_catalogue_path(), Some(Path::new("data.txt")));
        assert_eq!(params.rand_catalogue_path(), None);
    }

    #[test]
    fn unknown_option_strings_are_rejected() {
        let bad_norm = SIM_POWSPEC.replace("\"none\"", "\"sugiyama\"");
        let err = ParameterSet::from_toml_str(&bad_norm).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::InvalidConfiguration);

        let bad_stat = SIM_POWSPEC.replace("\"powspec\"", "\"modes\"");
        assert!(ParameterSet::from_toml_str(&bad_stat).is_err());

        let unknown_key = format!("{SIM_POWSPEC}\nnot_a_parameter = 1\n");
        assert!(ParameterSet::from_toml_str(&unknown_key).is_err());
    }

    #[test]
    fn validation_errors() {
        let no_box = SIM_POWSPEC.replace("boxsize = [100.0, 100.0, 100.0]", "");
        assert!(ParameterSet::from_toml_str(&no_box).is_err());

        let blank_path = SIM_POWSPEC.replace("\"data.txt\"", "\"   \"");
        assert!(ParameterSet::from_toml_str(&blank_path).is_err());

        // window statistics can't be measured from a simulation box
        let sim_window = SIM_POWSPEC.replace("\"powspec\"", "\"2pcf-win\"");
        let err = ParameterSet::from_toml_str(&sim_window).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::InvalidConfiguration);

        let sim_mixed = SIM_POWSPEC.replace("\"none\"", "\"mesh-mixed\"");
        assert!(ParameterSet::from_toml_str(&sim_mixed).is_err());
    }

    #[test]
    fn mesh_mixed_needs_a_data_catalogue() {
        let survey = SIM_POWSPEC.replace("\"sim\"", "\"survey\"").replace(
            "data_catalogue_file = \"data.txt\"",
            "data_catalogue_file = \"data.txt\"\nrand_catalogue_file = \"rand.txt\"",
        );
        let mixed = survey.replace("\"none\"", "\"mesh-mixed\"");
        let params = ParameterSet::from_toml_str(&mixed).unwrap();
        assert_eq!(params.norm_convention, NormConvention::MeshMixed);

        // a survey window only loads the randoms
        let window = mixed.replace("\"powspec\"", "\"2pcf-win\"");
        let err = ParameterSet::from_toml_str(&window).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::InvalidConfiguration);
        assert!(err.to_string().contains("mesh-mixed"));
    }

    #[test]
    fn option_names_match_the_parameter_file() {
        assert_eq!(Alignment::Pad.to_string(), "pad");
        assert_eq!(Alignment::Centre.to_string(), "centre");
        let names: Vec<String> = [Assignment::Ngp, Assignment::Cic, Assignment::Tsc, Assignment::Pcs]
            .iter()
            .map(|a| a.to_string())
            .collect();
        assert_eq!(names, ["ngp", "cic", "tsc", "pcs"]);
    }

    #[test]
    fn three_point_form_index() {
        let base = SIM_POWSPEC.replace("\"powspec\"", "\"bispec\"");
        let row_ok = format!("{base}\nform = \"row\"\nidx_bin = 9\n");
        let params = ParameterSet::from_toml_str(&row_ok).unwrap();
        assert_eq!(params.form, Form::Row);
        assert_eq!(params.npoint(), NPoint::Three);

        let row_bad = format!("{base}\nform = \"off-diag\"\nidx_bin = 10\n");
        assert!(ParameterSet::from_toml_str(&row_bad).is_err());
    }
}
