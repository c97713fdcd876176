/*!
Measures two- and three-point clustering statistics (power spectra,
correlation functions and their window counterparts) from particle
catalogues.

# Overview

A measurement is described by a [`ParameterSet`], usually read from a TOML
parameter file. [`run_measurement`] then

1. selects the estimator for the catalogue/statistic pairing
   ([`EstimatorKind`]),
2. loads the catalogues that estimator needs ([`ParticleCatalogue`]),
3. builds the bins ([`Binning`]),
4. aligns the catalogues with the measurement box (padding, centring or
   periodic wrapping),
5. derives per-particle lines of sight ([`compute_lines_of_sight`]),
6. computes the normalisation factors and resolves the active one
   ([`NormalizationFactors`]),
7. hands everything to a [`MeasurementBackend`].

[`MeshBackend`] is the built-in backend; it implements every estimator
with FFTs on the run's mesh. Non-fatal conditions, FFT counts and a memory
estimate are collected in a [`RunContext`].

# Developer Guide

Numerical building blocks that know nothing about catalogues or parameter
files (meshes, assignment kernels, FFTs, spherical harmonics) live in
[`clustat_internal`].
*/

#![deny(rustdoc::broken_intra_doc_links)]

// inform build-system of the crates in this package
mod binning;
mod catalogue;
mod context;
mod error;
mod estimator;
mod los;
mod mesh_backend;
mod norm;
mod output;
mod params;
mod pipeline;

// pull in symbols that visible outside of the package
pub use binning::{BinScheme, BinSpace, Binning, PadWidths};
pub use catalogue::{
    Bounds, CatalogueSource, Particle, ParticleCatalogue, alpha_ratio, centre_pair_in_box,
    grid_margin, pad_pair_in_box,
};
pub use context::{MemoryLedger, RunContext, Warning};
pub use error::{Error, ErrorCategory};
pub use estimator::{
    BinRecord, EstimatorInputs, EstimatorKind, Measurement, MeasurementBackend, RequiredInputs,
};
pub use los::{LineOfSight, compute_lines_of_sight};
pub use mesh_backend::MeshBackend;
pub use norm::{
    MIXED_MESH_ASSIGNMENT, MIXED_MESH_CELLSIZE, MIXED_MESH_PADDING, NormConvention,
    NormalizationFactors, mesh_normalisation, mixed_mesh_normalisation, particle_normalisation,
};
pub use output::{output_file_name, output_path, statistic_label, write_measurement};
pub use params::{
    Alignment, Assignment, CatalogueFormat, CatalogueType, Form, NPoint, PadScale, ParameterSet,
    StatisticType,
};
pub use pipeline::{CatalogueSummary, MeasurementRecord, run_and_save, run_measurement};

pub use clustat_internal::Complex64;
