//! Output file naming and the measurement file writer.

use crate::error::Error;
use crate::params::{Form, NPoint, ParameterSet, StatisticType};
use crate::pipeline::MeasurementRecord;
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};

/// the statistic's short name with its multipole degrees, e.g. `pk0`,
/// `xiw2` or `zeta110`
pub fn statistic_label(params: &ParameterSet) -> String {
    let (l1, l2, ell) = (params.ell1, params.ell2, params.ell);
    match params.statistic_type {
        StatisticType::Powspec => format!("pk{ell}"),
        StatisticType::TwoPcf => format!("xi{ell}"),
        StatisticType::TwoPcfWindow => format!("xiw{ell}"),
        StatisticType::Bispec => format!("bk{l1}{l2}{ell}"),
        StatisticType::ThreePcf => format!("zeta{l1}{l2}{ell}"),
        StatisticType::ThreePcfWindow | StatisticType::ThreePcfWindowWideAngle => {
            format!("zetaw{l1}{l2}{ell}")
        }
    }
}

fn form_label(form: Form, idx_bin: usize) -> String {
    match form {
        Form::Full => "full".to_owned(),
        Form::Diag => "diag".to_owned(),
        Form::OffDiag => format!("offdiag{idx_bin}"),
        Form::Row => format!("row{idx_bin}"),
    }
}

/// file name of a measurement, without the directory
pub fn output_file_name(params: &ParameterSet) -> String {
    let mut name = statistic_label(params);
    if params.statistic_type == StatisticType::ThreePcfWindowWideAngle {
        // infallible for `String`
        let _ = write!(name, "_wa{}{}", params.i_wa, params.j_wa);
    }
    if params.npoint() == NPoint::Three {
        name.push('_');
        name.push_str(&form_label(params.form, params.idx_bin));
    }
    name.push_str(&params.output_tag);
    name
}

/// where a measurement gets written
pub fn output_path(params: &ParameterSet) -> PathBuf {
    params.measurement_dir.join(output_file_name(params))
}

fn header(params: &ParameterSet, record: &MeasurementRecord) -> String {
    let mut out = String::new();
    // `write!` into a `String` can't fail
    let _ = writeln!(out, "# Estimator: {}", record.measurement.kind);
    for (label, summary) in [("Data", &record.data), ("Random", &record.rand)] {
        if let Some(summary) = summary {
            let _ = writeln!(
                out,
                "# {label} catalogue: {} particles of total sum weight {:.3}",
                summary.n_particles, summary.total_weight
            );
        }
    }
    let [lx, ly, lz] = params.boxsize;
    let [nx, ny, nz] = params.ngrid;
    let _ = writeln!(out, "# Box size: [{lx:.3}, {ly:.3}, {lz:.3}]");
    let _ = writeln!(out, "# Mesh number: [{nx}, {ny}, {nz}]");
    let _ = writeln!(out, "# Alignment: {}", params.alignment);
    let _ = writeln!(out, "# Particle-mesh assignment: {}", params.assignment);
    let _ = writeln!(out, "# Alpha contrast: {:.6e}", record.alpha);
    let norm = &record.norm;
    let _ = writeln!(
        out,
        "# Normalisation factor: {:.6e} (particle), {:.6e} (mesh), {:.6e} (mesh-mixed); \
         {:.6e} ({} used)",
        norm.particle, norm.mesh, norm.mixed_mesh, norm.selected, params.norm_convention
    );

    let label = statistic_label(params);
    let mut columns = Vec::new();
    for coord in &record.measurement.coordinates {
        columns.push(format!("{coord}_cen"));
        columns.push(format!("{coord}_eff"));
    }
    columns.push("count".to_owned());
    columns.push(format!("Re{{{label}}}"));
    columns.push(format!("Im{{{label}}}"));
    columns.push(format!("Re{{{label}_shot}}"));
    columns.push(format!("Im{{{label}_shot}}"));
    let listed: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("[{i}] {c}"))
        .collect();
    let _ = writeln!(out, "# {}", listed.join(", "));
    out
}

fn table(record: &MeasurementRecord) -> String {
    let mut out = String::new();
    for row in &record.measurement.records {
        for (centre, effective) in row.centres.iter().zip(row.effective.iter()) {
            let _ = write!(out, "{centre:.9e}\t{effective:.9e}\t");
        }
        let _ = writeln!(
            out,
            "{:10}\t{:>17.9e}\t{:>17.9e}\t{:>17.9e}\t{:>17.9e}",
            row.count, row.value.re, row.value.im, row.shotnoise.re, row.shotnoise.im
        );
    }
    out
}

/// Write a measurement to `path`, creating the parent directory if needed.
pub fn write_measurement(
    path: &Path,
    params: &ParameterSet,
    record: &MeasurementRecord,
) -> Result<(), Error> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e.to_string()))?;
        }
    }
    let mut file = std::fs::File::create(path).map_err(|e| Error::io(path, e.to_string()))?;
    file.write_all(header(params, record).as_bytes())
        .and_then(|_| file.write_all(table(record).as_bytes()))
        .map_err(|e| Error::io(path, e.to_string()))?;
    log::info!("Measurements saved to {}.", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::{BinRecord, EstimatorKind, Measurement};
    use crate::norm::{NormConvention, NormalizationFactors};
    use crate::params::{Alignment, Assignment};
    use crate::pipeline::CatalogueSummary;
    use clustat_internal::Complex64;

    fn params(statistic_type: StatisticType) -> ParameterSet {
        ParameterSet {
            statistic_type,
            measurement_dir: PathBuf::from("out"),
            output_tag: "_test".to_owned(),
            ell1: 1,
            ell2: 1,
            ell: 0,
            ..ParameterSet::default()
        }
    }

    #[test]
    fn two_point_names() {
        assert_eq!(output_file_name(&params(StatisticType::Powspec)), "pk0_test");
        assert_eq!(output_file_name(&params(StatisticType::TwoPcf)), "xi0_test");
        assert_eq!(
            output_path(&params(StatisticType::TwoPcfWindow)),
            Path::new("out").join("xiw0_test")
        );
    }

    #[test]
    fn three_point_names() {
        let mut p = params(StatisticType::Bispec);
        assert_eq!(output_file_name(&p), "bk110_diag_test");

        p.statistic_type = StatisticType::ThreePcf;
        p.form = Form::OffDiag;
        p.idx_bin = 3;
        assert_eq!(output_file_name(&p), "zeta110_offdiag3_test");

        p.statistic_type = StatisticType::ThreePcfWindow;
        p.form = Form::Full;
        assert_eq!(output_file_name(&p), "zetaw110_full_test");

        p.statistic_type = StatisticType::ThreePcfWindowWideAngle;
        p.form = Form::Row;
        p.i_wa = 1;
        p.j_wa = 0;
        p.idx_bin = 12;
        p.output_tag.clear();
        assert_eq!(output_file_name(&p), "zetaw110_wa10_row12");
    }

    #[test]
    fn header_uses_parameter_file_names() {
        let mut p = params(StatisticType::Bispec);
        p.alignment = Alignment::Pad;
        p.assignment = Assignment::Tsc;
        let record = MeasurementRecord {
            measurement: Measurement {
                kind: EstimatorKind::BispecSim,
                coordinates: vec!["k1", "k2"],
                records: vec![BinRecord {
                    centres: vec![0.05, 0.15],
                    effective: vec![0.051, 0.149],
                    count: 12,
                    value: Complex64::new(1.5, -0.5),
                    shotnoise: Complex64::new(0.25, 0.0),
                }],
            },
            norm: NormalizationFactors::resolve(2.0, 3.0, 0.0, NormConvention::Particle),
            alpha: 1.0,
            data: Some(CatalogueSummary {
                n_particles: 10,
                total_weight: 10.0,
            }),
            rand: None,
        };
        let text = header(&p, &record);
        assert!(text.contains("# Alignment: pad\n"));
        assert!(text.contains("# Particle-mesh assignment: tsc\n"));
        assert!(text.contains("2.000000e0 (particle used)"));
        assert!(text.contains("[0] k1_cen, [1] k1_eff, [2] k2_cen, [3] k2_eff, [4] count"));
        assert!(text.contains("Re{bk110}"));

        let rows = table(&record);
        assert_eq!(rows.lines().count(), 1);
        assert_eq!(rows.split_whitespace().count(), 9);
    }
}
