//! Configuration for the solver and its change protocol.

use chrono::Duration;
#[cfg(feature = "python")]
use pyo3::prelude::*;

/// Default prolong quantum in seconds.
pub const DEFAULT_PROLONG_QUANTUM_SECS: i64 = 60;

/// Configuration for the mutation coordinator and the built-in search.
#[cfg_attr(feature = "python", pyclass)]
#[derive(Clone, Debug)]
pub struct SolverConfig {
    /// Verbosity level: 0=silent, 1=changes, 2=checks, 3=debug.
    #[cfg_attr(feature = "python", pyo3(get, set))]
    pub verbosity: u8,
    /// Seconds added by a prolong request that carries no explicit extra time.
    #[cfg_attr(feature = "python", pyo3(get, set))]
    pub prolong_quantum_secs: i64,
    /// Cap on candidate positions evaluated per search step (None = all).
    #[cfg_attr(feature = "python", pyo3(get, set))]
    pub max_positions_per_step: Option<usize>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            prolong_quantum_secs: DEFAULT_PROLONG_QUANTUM_SECS,
            max_positions_per_step: None,
        }
    }
}

impl SolverConfig {
    /// Saturates when the configured seconds exceed what a `Duration` holds.
    pub fn prolong_quantum(&self) -> Duration {
        match Duration::try_seconds(self.prolong_quantum_secs) {
            Some(quantum) => quantum,
            None if self.prolong_quantum_secs < 0 => Duration::MIN,
            None => Duration::MAX,
        }
    }
}

#[cfg(feature = "python")]
#[pymethods]
impl SolverConfig {
    #[new]
    #[pyo3(signature = (verbosity=None, prolong_quantum_secs=None, max_positions_per_step=None))]
    fn py_new(
        verbosity: Option<u8>,
        prolong_quantum_secs: Option<i64>,
        max_positions_per_step: Option<usize>,
    ) -> Self {
        let defaults = Self::default();
        Self {
            verbosity: verbosity.unwrap_or(defaults.verbosity),
            prolong_quantum_secs: prolong_quantum_secs.unwrap_or(defaults.prolong_quantum_secs),
            max_positions_per_step: max_positions_per_step.or(defaults.max_positions_per_step),
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "SolverConfig(verbosity={}, prolong_quantum_secs={}, max_positions_per_step={:?})",
            self.verbosity, self.prolong_quantum_secs, self.max_positions_per_step
        )
    }
}
