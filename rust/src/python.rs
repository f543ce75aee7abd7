//! Python bindings for a running solver.

use chrono::Duration;
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use crate::chain::Schedule;
use crate::changes::ProblemChange;
use crate::config::SolverConfig;
use crate::models::{Server, Task};
use crate::snapshot::ScheduleRecord;
use crate::solver::{CoordinatorError, MutationCoordinator};

fn runtime_error(e: CoordinatorError) -> PyErr {
    PyRuntimeError::new_err(e.to_string())
}

fn seconds(name: &str, secs: i64) -> PyResult<Duration> {
    Duration::try_seconds(secs)
        .ok_or_else(|| PyValueError::new_err(format!("{name} out of range: {secs}")))
}

/// A solver running on its own worker thread.
///
/// Every mutation is queued and returns immediately. Read `snapshot_json`
/// to see whether a change has taken effect.
#[pyclass(name = "Solver")]
pub struct PySolver {
    inner: Option<MutationCoordinator>,
}

impl PySolver {
    fn start(schedule: Schedule, config: Option<SolverConfig>) -> PyResult<Self> {
        let coordinator = MutationCoordinator::start_default(schedule, config.unwrap_or_default())
            .map_err(runtime_error)?;
        Ok(Self {
            inner: Some(coordinator),
        })
    }

    fn coordinator(&self) -> PyResult<&MutationCoordinator> {
        self.inner
            .as_ref()
            .ok_or_else(|| runtime_error(CoordinatorError::WorkerStopped))
    }

    fn submit(&self, change: ProblemChange) -> PyResult<()> {
        self.coordinator()?.submit_change(change).map_err(runtime_error)
    }
}

#[pymethods]
impl PySolver {
    /// Start solving an empty schedule over the given `(id, skills, lead_time_secs)` servers.
    #[new]
    #[pyo3(signature = (servers, config=None))]
    fn new(servers: Vec<(String, Vec<String>, i64)>, config: Option<SolverConfig>) -> PyResult<Self> {
        let servers = servers
            .into_iter()
            .map(|(id, skills, lead)| {
                Ok(Server::new(id, skills).with_lead_time(seconds("lead_time_secs", lead)?))
            })
            .collect::<PyResult<Vec<_>>>()?;
        let schedule =
            Schedule::with_servers(servers).map_err(|e| PyValueError::new_err(e.to_string()))?;
        Self::start(schedule, config)
    }

    /// Resume solving from a schedule previously returned by `snapshot_json`.
    #[staticmethod]
    #[pyo3(signature = (json, config=None))]
    fn from_snapshot_json(json: &str, config: Option<SolverConfig>) -> PyResult<Self> {
        let schedule = ScheduleRecord::from_json(json)
            .and_then(|record| record.rebuild())
            .map_err(|e| PyValueError::new_err(e.to_string()))?;
        Self::start(schedule, config)
    }

    fn add_task(&self, id: String, skills: Vec<String>, duration_secs: i64) -> PyResult<()> {
        let duration = seconds("duration_secs", duration_secs)?;
        self.submit(ProblemChange::AddTask(Task::new(id, skills, duration)))
    }

    fn remove_task(&self, id: String) -> PyResult<()> {
        self.submit(ProblemChange::RemoveTask(id))
    }

    #[pyo3(signature = (id, extra_secs=None))]
    fn prolong_task(&self, id: String, extra_secs: Option<i64>) -> PyResult<()> {
        let extra = extra_secs
            .map(|secs| seconds("extra_secs", secs))
            .transpose()?;
        self.submit(ProblemChange::ProlongTask { id, extra })
    }

    fn pin_task(&self, id: String) -> PyResult<()> {
        self.submit(ProblemChange::PinTask(id))
    }

    fn unpin_task(&self, id: String) -> PyResult<()> {
        self.submit(ProblemChange::UnpinTask(id))
    }

    #[getter]
    fn is_solving(&self) -> bool {
        self.inner.as_ref().is_some_and(|c| c.is_solving())
    }

    /// Latest published best solution as JSON.
    fn snapshot_json(&self) -> PyResult<String> {
        self.coordinator()?
            .current_best_snapshot()
            .to_json()
            .map_err(|e| PyRuntimeError::new_err(e.to_string()))
    }

    /// Apply everything queued so far, stop the worker and return the final
    /// schedule as JSON.
    fn stop(&mut self, py: Python<'_>) -> PyResult<String> {
        let coordinator = self
            .inner
            .take()
            .ok_or_else(|| runtime_error(CoordinatorError::WorkerStopped))?;
        let schedule = py.allow_threads(|| coordinator.stop()).map_err(runtime_error)?;
        ScheduleRecord::capture(&schedule)
            .to_json()
            .map_err(|e| PyRuntimeError::new_err(e.to_string()))
    }

    fn __repr__(&self) -> String {
        format!("Solver(is_solving={})", self.is_solving())
    }
}
