use log::debug;
use rand::rngs::SmallRng;
use rand::Rng;
use rand::SeedableRng;
use statrs::statistics::Statistics;

use crate::error::{RateError, Result};
use crate::estimator::{contribution, point_estimate, EstimatorMode, RateTarget};
use crate::flame;
use crate::outcome::ResultsBatch;

/// Number of resamples drawn when the caller does not say otherwise.
pub const DEFAULT_RESAMPLES: usize = 1000;

const LOW_PERCENTILE: f64 = 0.025;
const HIGH_PERCENTILE: f64 = 0.975;

/// Source of the indices used to pick trials when resampling.
pub trait IndexSource {
    /// Returns an index uniformly distributed in `[0, n)`. Callers never pass `n == 0`.
    fn next_index(&mut self, n: usize) -> usize;
}

/// [`IndexSource`] backed by a `SmallRng`, seeded for reproducible runs or
/// from entropy otherwise.
pub struct SeededIndexSource {
    rng: SmallRng,
}

impl SeededIndexSource {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = if let Some(s) = seed {
            SmallRng::seed_from_u64(s)
        } else {
            SmallRng::from_entropy()
        };
        SeededIndexSource { rng }
    }
}

impl IndexSource for SeededIndexSource {
    fn next_index(&mut self, n: usize) -> usize {
        self.rng.gen_range(0..n)
    }
}

/// Draws `batch.len()` trials uniformly with replacement into `out`.
pub fn resample_into<S: IndexSource + ?Sized>(
    batch: &ResultsBatch,
    source: &mut S,
    out: &mut ResultsBatch,
) {
    let n = batch.len();
    let trials = batch.trials();
    out.refill((0..n).map(|_| trials[source.next_index(n)]));
}

/// A fresh resample of `batch`, same size, drawn with replacement.
pub fn resample<S: IndexSource + ?Sized>(batch: &ResultsBatch, source: &mut S) -> ResultsBatch {
    let mut out = ResultsBatch::new(Vec::with_capacity(batch.len()));
    resample_into(batch, source, &mut out);
    out
}

/// 95% percentile interval and log10 spread of a bootstrap distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceInterval {
    pub low: f64,
    pub high: f64,
    /// Population standard deviation of log10 of the resampled rates.
    pub log_std: f64,
}

/// The sorted bootstrap distribution of a rate constant.
#[derive(Debug, Clone)]
pub struct Bootstrap {
    effective_rates: Vec<f64>,
    target: RateTarget,
    mode: EstimatorMode,
}

impl Bootstrap {
    pub fn new<S: IndexSource + ?Sized>(
        batch: &ResultsBatch,
        target: RateTarget,
        resample_count: usize,
        mode: EstimatorMode,
        source: &mut S,
    ) -> Result<Self> {
        if resample_count == 0 {
            return Err(RateError::invalid("resample count must be positive"));
        }
        let original = point_estimate(batch, target, mode)?;
        if original <= 0.0 || !original.is_finite() {
            return Err(RateError::degenerate(format!(
                "every trial contributes a zero rate ({batch})"
            )));
        }
        let first = contribution(&batch.trials()[0], target, mode);
        if batch.iter().all(|t| contribution(t, target, mode) == first) {
            return Err(RateError::degenerate(format!(
                "all {} trials contribute the same rate, resampling has no spread",
                batch.len()
            )));
        }

        flame::start("bootstrap_resample");
        let mut scratch = ResultsBatch::new(Vec::with_capacity(batch.len()));
        let mut effective_rates = Vec::with_capacity(resample_count);
        for _ in 0..resample_count {
            resample_into(batch, source, &mut scratch);
            effective_rates.push(point_estimate(&scratch, target, mode)?);
        }
        flame::end("bootstrap_resample");

        effective_rates.sort_by(|a, b| a.total_cmp(b));
        debug!(
            "bootstrap of {} trials, {} resamples: min {:e}, max {:e}",
            batch.len(),
            resample_count,
            effective_rates[0],
            effective_rates[resample_count - 1]
        );

        Ok(Bootstrap {
            effective_rates,
            target,
            mode,
        })
    }

    /// Resampled rates in ascending order.
    pub fn effective_rates(&self) -> &[f64] {
        &self.effective_rates
    }

    pub fn target(&self) -> RateTarget {
        self.target
    }

    pub fn mode(&self) -> EstimatorMode {
        self.mode
    }

    fn percentile(&self, p: f64) -> f64 {
        let n = self.effective_rates.len();
        let index = ((p * n as f64) as usize).min(n - 1);
        self.effective_rates[index]
    }

    /// The 2.5th and 97.5th percentiles of the resampled rates.
    pub fn ninety_five_percentiles(&self) -> (f64, f64) {
        (self.percentile(LOW_PERCENTILE), self.percentile(HIGH_PERCENTILE))
    }

    /// Standard deviation of log10 of the resampled rates. Resamples that lost
    /// every success have rate 0 and no logarithm, so they are left out.
    pub fn log_std(&self) -> Result<f64> {
        let logs: Vec<f64> = self
            .effective_rates
            .iter()
            .filter(|&&k| k > 0.0)
            .map(|k| k.log10())
            .collect();
        if logs.is_empty() {
            return Err(RateError::degenerate("no resample produced a positive rate"));
        }
        Ok(logs.iter().population_std_dev())
    }

    pub fn interval(&self) -> Result<ConfidenceInterval> {
        let (low, high) = self.ninety_five_percentiles();
        Ok(ConfidenceInterval {
            low,
            high,
            log_std: self.log_std()?,
        })
    }
}

/// Bootstrap 95% confidence interval of the rate constant of `batch`.
pub fn confidence_interval<S: IndexSource + ?Sized>(
    batch: &ResultsBatch,
    target: RateTarget,
    resample_count: usize,
    mode: EstimatorMode,
    source: &mut S,
) -> Result<ConfidenceInterval> {
    Bootstrap::new(batch, target, resample_count, mode, source)?.interval()
}
