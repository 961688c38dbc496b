//! Point estimates of effective rate constants from a batch of trials.
//!
//! Two estimators are supported, one per sampling mode of the simulator:
//!
//! * First-step mode: every trajectory starts right after a bimolecular
//!   collision sampled from the Boltzmann distribution of initial contacts.
//!   From the collision fluxes and the unimolecular completion times we get
//!   `k1` (successful collisions), `k1'` (unproductive collisions) and the mean
//!   times `dT_f`, `dT_r`. Treating association as a renewal process, the
//!   expected time to hybridize at concentration `z` is
//!
//!   `T(z) = (k1'/k1) (dT_coll + dT_r) + dT_coll + dT_f`, with `dT_coll = 1 / ((k1 + k1') z)`
//!
//!   and `k_eff(z) = 1 / (T(z) z)`.
//!
//! * First-passage mode: every trajectory is run from separated strands to
//!   the hybridized state at a fixed join concentration. Successes are treated
//!   as events of an exponential process and every trajectory's time as
//!   exposure, so `k_eff = n_success / (sum of times * z)`.

use crate::error::{RateError, Result};
use crate::outcome::{OutcomeTag, ResultsBatch, TrialOutcome};

/// Which estimator formula to apply to a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimatorMode {
    FirstStep,
    FirstPassage,
}

/// Which rate constant to report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateTarget {
    /// Effective bimolecular rate constant (/M/s) at a concentration (M).
    Bimolecular { concentration: f64 },
    /// Concentration-independent constant: `k1` (/M/s) in first-step mode,
    /// the first-order success rate (/s) in first-passage mode.
    ConcentrationIndependent,
}

impl RateTarget {
    pub fn at(concentration: f64) -> Self {
        RateTarget::Bimolecular { concentration }
    }

    /// The target for a caller that either asks for the concentration
    /// independent constant or names a concentration. Asking for neither is
    /// an error rather than a silent fallback.
    pub fn from_request(concentration: Option<f64>, concentration_independent: bool) -> Result<Self> {
        match (concentration_independent, concentration) {
            (true, _) => Ok(RateTarget::ConcentrationIndependent),
            (false, Some(z)) => {
                let target = RateTarget::at(z);
                target.validate()?;
                Ok(target)
            }
            (false, None) => Err(RateError::invalid(
                "a concentration is required unless the concentration independent rate is requested",
            )),
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if let RateTarget::Bimolecular { concentration } = *self {
            if !concentration.is_finite() || concentration <= 0.0 {
                return Err(RateError::invalid(format!(
                    "concentration must be positive, got {concentration}"
                )));
            }
        }
        Ok(())
    }
}

/// Rate constants recovered from a first-step mode batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FirstStepRates {
    /// Successful collision rate (/M/s).
    pub k1: f64,
    /// Unproductive collision rate (/M/s).
    pub k1_prime: f64,
    /// Mean unimolecular time of successful trajectories (s).
    pub dt_forward: f64,
    /// Mean unimolecular time of failed trajectories (s), 0 without failures.
    pub dt_reverse: f64,
    pub n_forward: usize,
    pub n_reverse: usize,
    pub n_total: usize,
}

impl FirstStepRates {
    pub fn from_batch(batch: &ResultsBatch) -> Result<Self> {
        if batch.is_empty() {
            return Err(RateError::invalid("cannot estimate a rate from an empty batch"));
        }
        let mut n_forward = 0usize;
        let mut n_reverse = 0usize;
        let mut collision_forward = 0.0;
        let mut collision_reverse = 0.0;
        let mut time_forward = 0.0;
        let mut time_reverse = 0.0;
        for trial in batch {
            match trial.tag {
                OutcomeTag::Success => {
                    n_forward += 1;
                    collision_forward += trial.collision_rate;
                    time_forward += trial.time;
                }
                OutcomeTag::Failure => {
                    n_reverse += 1;
                    collision_reverse += trial.collision_rate;
                    time_reverse += trial.time;
                }
                // timeouts and trials without initial moves only dilute k1 and k1'
                OutcomeTag::Timeout | OutcomeTag::NoInitialMoves => {}
            }
        }
        let n_total = batch.len();
        Ok(FirstStepRates {
            k1: collision_forward / n_total as f64,
            k1_prime: collision_reverse / n_total as f64,
            dt_forward: if n_forward > 0 {
                time_forward / n_forward as f64
            } else {
                0.0
            },
            dt_reverse: if n_reverse > 0 {
                time_reverse / n_reverse as f64
            } else {
                0.0
            },
            n_forward,
            n_reverse,
            n_total,
        })
    }

    /// Mean unimolecular rate of successful trajectories (/s).
    pub fn k2(&self) -> f64 {
        if self.dt_forward > 0.0 {
            1.0 / self.dt_forward
        } else {
            f64::INFINITY
        }
    }

    /// Mean unimolecular rate of failed trajectories (/s).
    pub fn k2_prime(&self) -> f64 {
        if self.dt_reverse > 0.0 {
            1.0 / self.dt_reverse
        } else {
            f64::INFINITY
        }
    }

    pub fn k_eff(&self, concentration: f64) -> f64 {
        if self.n_forward == 0 || self.k1 <= 0.0 {
            return 0.0;
        }
        let dt_collision = 1.0 / ((self.k1 + self.k1_prime) * concentration);
        let expected_failures = self.k1_prime / self.k1;
        let time = expected_failures * (dt_collision + self.dt_reverse)
            + dt_collision
            + self.dt_forward;
        1.0 / (time * concentration)
    }

    pub fn rate(&self, target: RateTarget) -> f64 {
        match target {
            RateTarget::Bimolecular { concentration } => self.k_eff(concentration),
            RateTarget::ConcentrationIndependent => {
                if self.n_forward == 0 {
                    0.0
                } else {
                    self.k1
                }
            }
        }
    }
}

/// Successes and exposure time from a first-passage mode batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FirstPassageRates {
    pub n_success: usize,
    pub total_time: f64,
    pub n_total: usize,
}

impl FirstPassageRates {
    pub fn from_batch(batch: &ResultsBatch) -> Result<Self> {
        if batch.is_empty() {
            return Err(RateError::invalid("cannot estimate a rate from an empty batch"));
        }
        Ok(FirstPassageRates {
            n_success: batch.count(OutcomeTag::Success),
            total_time: batch.iter().map(|t| t.time).sum(),
            n_total: batch.len(),
        })
    }

    /// First-order success rate (/s).
    pub fn first_order_rate(&self) -> f64 {
        if self.n_success == 0 || self.total_time <= 0.0 {
            return 0.0;
        }
        self.n_success as f64 / self.total_time
    }

    pub fn k_eff(&self, concentration: f64) -> f64 {
        self.first_order_rate() / concentration
    }

    pub fn rate(&self, target: RateTarget) -> f64 {
        match target {
            RateTarget::Bimolecular { concentration } => self.k_eff(concentration),
            RateTarget::ConcentrationIndependent => self.first_order_rate(),
        }
    }
}

/// The fields of `trial` the estimator reads for `target` in `mode`. Trials
/// with equal contributions are interchangeable in any resample.
pub(crate) fn contribution(
    trial: &TrialOutcome,
    target: RateTarget,
    mode: EstimatorMode,
) -> (Option<OutcomeTag>, f64, f64) {
    match (mode, trial.tag) {
        (EstimatorMode::FirstStep, OutcomeTag::Success) => match target {
            RateTarget::Bimolecular { .. } => (Some(trial.tag), trial.collision_rate, trial.time),
            RateTarget::ConcentrationIndependent => (Some(trial.tag), trial.collision_rate, 0.0),
        },
        (EstimatorMode::FirstStep, OutcomeTag::Failure) => match target {
            RateTarget::Bimolecular { .. } => (Some(trial.tag), trial.collision_rate, trial.time),
            RateTarget::ConcentrationIndependent => (None, 0.0, 0.0),
        },
        (EstimatorMode::FirstStep, _) => (None, 0.0, 0.0),
        (EstimatorMode::FirstPassage, OutcomeTag::Success) => (Some(trial.tag), 0.0, trial.time),
        (EstimatorMode::FirstPassage, _) => (None, 0.0, trial.time),
    }
}

/// Deterministic point estimate of the requested rate constant.
pub fn point_estimate(batch: &ResultsBatch, target: RateTarget, mode: EstimatorMode) -> Result<f64> {
    target.validate()?;
    let rate = match mode {
        EstimatorMode::FirstStep => FirstStepRates::from_batch(batch)?.rate(target),
        EstimatorMode::FirstPassage => FirstPassageRates::from_batch(batch)?.rate(target),
    };
    Ok(rate)
}
