use numpy::{PyArray1, PyReadonlyArray1};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::bootstrap::{Bootstrap, SeededIndexSource, DEFAULT_RESAMPLES};
use crate::energy;
use crate::error::RateError;
use crate::estimator::{point_estimate, EstimatorMode, RateTarget};
use crate::outcome::ResultsBatch;

impl From<RateError> for PyErr {
    fn from(err: RateError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

fn batch_from_columns(
    tags: Vec<String>,
    collision_rates: PyReadonlyArray1<f64>,
    times: PyReadonlyArray1<f64>,
) -> PyResult<ResultsBatch> {
    let collision_rates = collision_rates
        .as_slice()
        .map_err(|e| PyValueError::new_err(e.to_string()))?;
    let times = times
        .as_slice()
        .map_err(|e| PyValueError::new_err(e.to_string()))?;
    Ok(ResultsBatch::from_columns(&tags, collision_rates, times)?)
}

fn mode_of(first_passage: bool) -> EstimatorMode {
    if first_passage {
        EstimatorMode::FirstPassage
    } else {
        EstimatorMode::FirstStep
    }
}

/// Bootstrap distribution of k_eff (or k1) over the trials of one run.
#[pyclass(name = "Bootstrap")]
pub struct PyBootstrap {
    inner: Bootstrap,
}

#[pymethods]
impl PyBootstrap {
    #[new]
    #[pyo3(signature = (tags, collision_rates, times, n=DEFAULT_RESAMPLES, concentration=None, compute_k1=false, first_passage=false, seed=None))]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tags: Vec<String>,
        collision_rates: PyReadonlyArray1<f64>,
        times: PyReadonlyArray1<f64>,
        n: usize,
        concentration: Option<f64>,
        compute_k1: bool,
        first_passage: bool,
        seed: Option<u64>,
    ) -> PyResult<Self> {
        let batch = batch_from_columns(tags, collision_rates, times)?;
        let target = RateTarget::from_request(concentration, compute_k1)?;
        let mut source = SeededIndexSource::new(seed);
        let inner = Bootstrap::new(&batch, target, n, mode_of(first_passage), &mut source)?;
        Ok(PyBootstrap { inner })
    }

    pub fn ninety_five_percentiles(&self) -> (f64, f64) {
        self.inner.ninety_five_percentiles()
    }

    pub fn log_std(&self) -> PyResult<f64> {
        Ok(self.inner.log_std()?)
    }

    pub fn effective_rates<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<f64>> {
        PyArray1::from_slice(py, self.inner.effective_rates())
    }
}

/// Effective rate constant (/M/s) at `concentration`.
#[pyfunction]
#[pyo3(signature = (tags, collision_rates, times, concentration, first_passage=false))]
fn k_eff(
    tags: Vec<String>,
    collision_rates: PyReadonlyArray1<f64>,
    times: PyReadonlyArray1<f64>,
    concentration: f64,
    first_passage: bool,
) -> PyResult<f64> {
    let batch = batch_from_columns(tags, collision_rates, times)?;
    Ok(point_estimate(
        &batch,
        RateTarget::at(concentration),
        mode_of(first_passage),
    )?)
}

/// Successful collision rate k1 (/M/s) of a first-step run.
#[pyfunction]
fn k1(
    tags: Vec<String>,
    collision_rates: PyReadonlyArray1<f64>,
    times: PyReadonlyArray1<f64>,
) -> PyResult<f64> {
    let batch = batch_from_columns(tags, collision_rates, times)?;
    Ok(point_estimate(
        &batch,
        RateTarget::ConcentrationIndependent,
        EstimatorMode::FirstStep,
    )?)
}

#[pyfunction]
fn reverse_complement(sequence: &str) -> PyResult<String> {
    Ok(energy::reverse_complement(sequence)?)
}

/// A Python module implemented in Rust.
#[pymodule]
fn strandrate_rust(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyBootstrap>()?;
    m.add_function(wrap_pyfunction!(k_eff, m)?)?;
    m.add_function(wrap_pyfunction!(k1, m)?)?;
    m.add_function(wrap_pyfunction!(reverse_complement, m)?)?;
    Ok(())
}
