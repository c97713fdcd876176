//! Run-wide bookkeeping ([`RunContext`]): recorded warnings, FFT counts and
//! a rough memory ledger. One context is created per measurement run and is
//! threaded explicitly through the components that need it.

use crate::catalogue::CatalogueSource;

const BYTES_PER_GIBIBYTE: f64 = 1024. * 1024. * 1024.;

/// A non-fatal condition that was encountered during a run
#[derive(Clone, Debug, PartialEq)]
pub enum Warning {
    /// a particle sits exactly on the observer, so its line of sight was
    /// replaced by the zero vector
    OriginCoincidentParticle {
        source: CatalogueSource,
        index: usize,
    },
    /// the aligned catalogue extends outside of `[0, boxsize)`
    CatalogueExceedsBox { source: CatalogueSource },
    /// memory tracked by the ledger was never released
    UnclearedMemory { gibibytes: f64 },
}

impl core::fmt::Display for Warning {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Warning::OriginCoincidentParticle { source, index } => write!(
                f,
                "{source}-catalogue particle {index} coincides with the origin"
            ),
            Warning::CatalogueExceedsBox { source } => write!(
                f,
                "{source}-catalogue extent exceeds the measurement box"
            ),
            Warning::UnclearedMemory { gibibytes } => write!(
                f,
                "uncleared dynamically allocated memory: {gibibytes:.1} gibibytes"
            ),
        }
    }
}

/// Tracks an estimate of the memory held by large arrays
#[derive(Clone, Debug, Default)]
pub struct MemoryLedger {
    current_bytes: f64,
    peak_bytes: f64,
}

impl MemoryLedger {
    pub fn allocate(&mut self, bytes: usize) {
        self.current_bytes += bytes as f64;
        self.peak_bytes = self.peak_bytes.max(self.current_bytes);
    }

    pub fn release(&mut self, bytes: usize) {
        self.current_bytes -= bytes as f64;
    }

    pub fn current_gibibytes(&self) -> f64 {
        self.current_bytes / BYTES_PER_GIBIBYTE
    }

    pub fn peak_gibibytes(&self) -> f64 {
        self.peak_bytes / BYTES_PER_GIBIBYTE
    }
}

#[derive(Clone, Debug, Default)]
pub struct RunContext {
    warnings: Vec<Warning>,
    n_fft_forward: usize,
    n_fft_inverse: usize,
    memory: MemoryLedger,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// logs the warning and keeps a record of it
    pub fn warn(&mut self, warning: Warning) {
        log::warn!("{warning}");
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn record_ffts(&mut self, n_forward: usize, n_inverse: usize) {
        self.n_fft_forward += n_forward;
        self.n_fft_inverse += n_inverse;
    }

    /// number of (forward, inverse) FFTs performed during the run
    pub fn fft_counts(&self) -> (usize, usize) {
        (self.n_fft_forward, self.n_fft_inverse)
    }

    pub fn memory(&self) -> &MemoryLedger {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut MemoryLedger {
        &mut self.memory
    }

    /// reports the run summary and flags memory that was never released
    pub fn finalise(&mut self) {
        if self.n_fft_forward > 0 || self.n_fft_inverse > 0 {
            log::info!(
                "Number of FFTs: {} forward, {} backward.",
                self.n_fft_forward,
                self.n_fft_inverse
            );
        }
        log::info!(
            "Minimal estimate of peak memory usage: {:.1} gibibytes.",
            self.memory.peak_gibibytes()
        );
        if self.memory.current_bytes > 0.0 {
            let gibibytes = self.memory.current_gibibytes();
            self.warn(Warning::UnclearedMemory { gibibytes });
        }
    }
}
