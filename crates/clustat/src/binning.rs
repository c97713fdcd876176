//! The binning engine: ordered bin edges, centres and widths in either
//! configuration or Fourier space.

use crate::error::Error;
use crate::params::ParameterSet;
use clustat_internal::max_component;
use core::str::FromStr;
use serde::Deserialize;

/// relative enlargement of the padding bin width, which keeps the padded bins
/// clear of round-off at the grid scale
const PAD_WIDTH_EPSILON: f64 = 5.0e-3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinScheme {
    Lin,
    Log,
    LinPad,
    LogPad,
    Custom,
}

impl FromStr for BinScheme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lin" => Ok(BinScheme::Lin),
            "log" => Ok(BinScheme::Log),
            "linpad" => Ok(BinScheme::LinPad),
            "logpad" => Ok(BinScheme::LogPad),
            "custom" => Ok(BinScheme::Custom),
            _ => Err(Error::invalid_configuration(
                "binning",
                format!("\"{s}\" is not a known binning scheme"),
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinSpace {
    Config,
    Fourier,
}

impl FromStr for BinSpace {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "config" => Ok(BinSpace::Config),
            "fourier" => Ok(BinSpace::Fourier),
            _ => Err(Error::invalid_configuration(
                "space",
                format!("\"{s}\" is not a known coordinate space"),
            )),
        }
    }
}

/// Widths of the padding bins used by `linpad` and `logpad`, one per space
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PadWidths {
    pub config: f64,
    pub fourier: f64,
}

impl PadWidths {
    /// Derive the widths from the discretisation: the coarsest cell size in
    /// configuration space and the smallest fundamental wavenumber in Fourier
    /// space.
    pub fn from_grid(boxsize: &[f64; 3], ngrid: &[usize; 3]) -> PadWidths {
        let max_boxsize = max_component(boxsize);
        let min_ngrid = ngrid.iter().copied().min().unwrap_or(1).max(1);
        PadWidths {
            config: (1.0 + PAD_WIDTH_EPSILON) * max_boxsize / min_ngrid as f64,
            fourier: (1.0 + PAD_WIDTH_EPSILON) * 2.0 * core::f64::consts::PI / max_boxsize,
        }
    }

    fn for_space(&self, space: BinSpace) -> f64 {
        match space {
            BinSpace::Config => self.config,
            BinSpace::Fourier => self.fourier,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Binning {
    scheme: BinScheme,
    space: BinSpace,
    bin_min: f64,
    bin_max: f64,
    num_bins: usize,
    pad_bins: usize,
    pad_widths: PadWidths,
    edges: Vec<f64>,
    centres: Vec<f64>,
    widths: Vec<f64>,
}

/// append `n` uniform bins spanning `[lo, hi]`
fn push_lin_bins(edges: &mut Vec<f64>, centres: &mut Vec<f64>, lo: f64, hi: f64, n: usize) {
    let dbin = (hi - lo) / n as f64;
    for i in 0..n {
        let left = lo + dbin * i as f64;
        edges.push(left);
        centres.push(left + dbin / 2.0);
    }
}

/// append `n` logarithmically uniform bins spanning `[lo, hi]`
fn push_log_bins(edges: &mut Vec<f64>, centres: &mut Vec<f64>, lo: f64, hi: f64, n: usize) {
    let dln = (hi.ln() - lo.ln()) / n as f64;
    for i in 0..n {
        let left = lo * (dln * i as f64).exp();
        let right = lo * (dln * (i + 1) as f64).exp();
        edges.push(left);
        centres.push((left + right) / 2.0);
    }
}

impl Binning {
    /// Construct the bins of a given scheme.
    ///
    /// `pad_bins` and `pad_widths` only matter to the padded schemes.
    pub fn construct(
        scheme: BinScheme,
        space: BinSpace,
        bin_min: f64,
        bin_max: f64,
        num_bins: usize,
        pad_bins: usize,
        pad_widths: PadWidths,
    ) -> Result<Binning, Error> {
        let invalid = |what: String| Error::invalid_configuration("binning", what);

        if !(bin_min.is_finite() && bin_max.is_finite()) {
            return Err(invalid("bin range must be finite".to_owned()));
        } else if bin_min < 0.0 {
            return Err(invalid(format!("bin_min ({bin_min}) is negative")));
        } else if num_bins == 0 {
            return Err(invalid("num_bins must be positive".to_owned()));
        } else if bin_max <= bin_min {
            return Err(invalid(format!(
                "bin_max ({bin_max}) must exceed bin_min ({bin_min})"
            )));
        }

        let mut edges = Vec::with_capacity(num_bins + 1);
        let mut centres = Vec::with_capacity(num_bins);
        match scheme {
            BinScheme::Lin => push_lin_bins(&mut edges, &mut centres, bin_min, bin_max, num_bins),
            BinScheme::Log => {
                if bin_min == 0.0 {
                    return Err(invalid(
                        "logarithmic binning needs a positive bin_min".to_owned(),
                    ));
                }
                push_log_bins(&mut edges, &mut centres, bin_min, bin_max, num_bins)
            }
            BinScheme::LinPad | BinScheme::LogPad => {
                if pad_bins >= num_bins {
                    return Err(invalid(format!(
                        "num_bins_pad ({pad_bins}) must be smaller than num_bins ({num_bins})"
                    )));
                }
                let dpad = pad_widths.for_space(space);
                if !(dpad.is_finite() && dpad > 0.0) {
                    return Err(invalid(format!("padding bin width ({dpad}) is invalid")));
                }
                let pad_max = dpad * pad_bins as f64;
                if pad_max >= bin_max {
                    return Err(invalid(format!(
                        "the padded range ends at {pad_max}, beyond bin_max ({bin_max})"
                    )));
                }
                push_lin_bins(&mut edges, &mut centres, 0.0, pad_max, pad_bins);
                let n_rest = num_bins - pad_bins;
                if scheme == BinScheme::LinPad {
                    push_lin_bins(&mut edges, &mut centres, pad_max, bin_max, n_rest);
                } else if pad_max == 0.0 {
                    return Err(invalid(
                        "logarithmic padding needs at least one padding bin".to_owned(),
                    ));
                } else {
                    push_log_bins(&mut edges, &mut centres, pad_max, bin_max, n_rest);
                }
            }
            BinScheme::Custom => return Err(Error::unimplemented("custom binning".to_owned())),
        }
        // pin the final edge instead of accumulating round-off
        edges.push(bin_max);

        let widths: Vec<f64> = edges.windows(2).map(|pair| pair[1] - pair[0]).collect();
        if widths.iter().any(|&w| !(w > 0.0)) {
            return Err(invalid("bin edges must be strictly increasing".to_owned()));
        }

        Ok(Binning {
            scheme,
            space,
            bin_min,
            bin_max,
            num_bins,
            pad_bins,
            pad_widths,
            edges,
            centres,
            widths,
        })
    }

    /// builds the bins requested by a run configuration
    pub fn from_params(params: &ParameterSet) -> Result<Binning, Error> {
        Binning::construct(
            params.binning,
            params.space(),
            params.bin_min,
            params.bin_max,
            params.num_bins,
            params.num_bins_pad,
            PadWidths::from_grid(&params.boxsize, &params.ngrid),
        )
    }

    pub fn scheme(&self) -> BinScheme {
        self.scheme
    }

    pub fn space(&self) -> BinSpace {
        self.space
    }

    pub fn bin_min(&self) -> f64 {
        self.bin_min
    }

    pub fn bin_max(&self) -> f64 {
        self.bin_max
    }

    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    pub fn pad_bins(&self) -> usize {
        self.pad_bins
    }

    pub fn pad_widths(&self) -> PadWidths {
        self.pad_widths
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn centres(&self) -> &[f64] {
        &self.centres
    }

    pub fn widths(&self) -> &[f64] {
        &self.widths
    }

    /// index of the bin holding `value`; bins are closed on the left
    pub fn bin_index(&self, value: f64) -> Option<usize> {
        if !(value >= self.edges[0] && value < self.bin_max) {
            return None;
        }
        // the first edge always passes, so the count is at least one
        Some(self.edges.partition_point(|&edge| edge <= value) - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    fn pads() -> PadWidths {
        PadWidths::from_grid(&[1000.0, 1000.0, 1000.0], &[100, 100, 100])
    }

    #[test]
    fn pad_widths_follow_the_largest_box_side() {
        let widths = PadWidths::from_grid(&[500.0, 2000.0, 1000.0], &[64, 128, 32]);
        let scale = 1.0 + PAD_WIDTH_EPSILON;
        assert!((widths.config - scale * 2000.0 / 32.0).abs() < 1e-12);
        let fourier = scale * 2.0 * core::f64::consts::PI / 2000.0;
        assert!((widths.fourier - fourier).abs() < 1e-15);
    }

    fn check_invariants(binning: &Binning) {
        let n = binning.num_bins();
        assert_eq!(binning.edges().len(), n + 1);
        assert_eq!(binning.centres().len(), n);
        assert_eq!(binning.widths().len(), n);
        assert_eq!(*binning.edges().last().unwrap(), binning.bin_max());
        for i in 0..n {
            let (lo, hi) = (binning.edges()[i], binning.edges()[i + 1]);
            assert!(lo < hi);
            assert!(lo < binning.centres()[i] && binning.centres()[i] < hi);
            assert_eq!(binning.widths()[i], hi - lo);
        }
    }

    #[test]
    fn lin_bins() {
        let binning =
            Binning::construct(BinScheme::Lin, BinSpace::Fourier, 0.005, 0.105, 10, 0, pads())
                .unwrap();
        check_invariants(&binning);
        assert_eq!(binning.edges()[0], 0.005);
        for w in binning.widths() {
            assert!((w - 0.01).abs() < 1e-15);
        }
        assert!((binning.centres()[0] - 0.01).abs() < 1e-15);
    }

    #[test]
    fn log_bins() {
        let binning =
            Binning::construct(BinScheme::Log, BinSpace::Config, 1.0, 1000.0, 3, 0, pads())
                .unwrap();
        check_invariants(&binning);
        assert!((binning.edges()[1] - 10.0).abs() < 1e-12);
        assert!((binning.edges()[2] - 100.0).abs() < 1e-10);
        // arithmetic, not geometric, midpoints
        assert!((binning.centres()[0] - 5.5).abs() < 1e-12);

        let err = Binning::construct(BinScheme::Log, BinSpace::Config, 0.0, 10.0, 3, 0, pads())
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::InvalidConfiguration);
    }

    #[test]
    fn padded_bins() {
        let pads = pads();
        assert!((pads.config - 10.05).abs() < 1e-12);

        let binning =
            Binning::construct(BinScheme::LinPad, BinSpace::Config, 0.0, 200.0, 15, 5, pads)
                .unwrap();
        check_invariants(&binning);
        assert_eq!(binning.edges()[0], 0.0);
        for i in 0..5 {
            assert!((binning.widths()[i] - pads.config).abs() < 1e-12);
        }
        assert!((binning.edges()[5] - 5.0 * pads.config).abs() < 1e-12);

        let binning =
            Binning::construct(BinScheme::LogPad, BinSpace::Fourier, 0.0, 0.5, 20, 3, pads)
                .unwrap();
        check_invariants(&binning);
        assert!((binning.widths()[0] - pads.fourier).abs() < 1e-15);
    }

    #[test]
    fn invalid_construction() {
        let space = BinSpace::Config;
        // negative minimum
        assert!(Binning::construct(BinScheme::Lin, space, -1.0, 10.0, 5, 0, pads()).is_err());
        // no bins
        assert!(Binning::construct(BinScheme::Lin, space, 0.0, 10.0, 0, 0, pads()).is_err());
        // degenerate range
        assert!(Binning::construct(BinScheme::Lin, space, 10.0, 10.0, 5, 0, pads()).is_err());
        // padding covers every bin
        assert!(Binning::construct(BinScheme::LinPad, space, 0.0, 200.0, 5, 5, pads()).is_err());
        // padding runs past bin_max
        assert!(Binning::construct(BinScheme::LinPad, space, 0.0, 40.0, 10, 5, pads()).is_err());
        // log padding without padding bins
        assert!(Binning::construct(BinScheme::LogPad, space, 0.0, 40.0, 10, 0, pads()).is_err());

        let err = Binning::construct(BinScheme::Custom, space, 0.0, 10.0, 5, 0, pads())
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Unimplemented);
    }

    #[test]
    fn scheme_strings() {
        assert_eq!("logpad".parse::<BinScheme>().unwrap(), BinScheme::LogPad);
        assert_eq!("fourier".parse::<BinSpace>().unwrap(), BinSpace::Fourier);
        let err = "quadratic".parse::<BinScheme>().unwrap_err();
        assert_eq!(err.category(), ErrorCategory::InvalidConfiguration);
    }

    #[test]
    fn bin_lookup() {
        let binning =
            Binning::construct(BinScheme::Lin, BinSpace::Config, 0.0, 10.0, 5, 0, pads())
                .unwrap();
        assert_eq!(binning.bin_index(-0.5), None);
        assert_eq!(binning.bin_index(0.0), Some(0));
        assert_eq!(binning.bin_index(-0.0), Some(0));
        assert_eq!(binning.bin_index(2.0), Some(1));
        assert_eq!(binning.bin_index(9.99), Some(4));
        assert_eq!(binning.bin_index(10.0), None);
        assert_eq!(binning.bin_index(f64::NAN), None);
    }
}
