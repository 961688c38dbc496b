use std::collections::HashMap;
use std::time::{Duration, Instant};

use log::{debug, info};
use rand::rngs::SmallRng;
use rand::Rng;
use rand::SeedableRng;
use rand_distr::{Distribution, Exp};
use serde::{Deserialize, Serialize};

use crate::error::{RateError, Result};
use crate::flame;
use crate::outcome::{OutcomeTag, ResultsBatch, TrialOutcome};

/// How the simulator samples trajectories.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamplingMode {
    /// Start each trajectory right after a Boltzmann-sampled collision and
    /// stop at the forward or reverse state. With `leak` set the run is only
    /// used for its collision rate `k1`.
    FirstStep { leak: bool },
    /// Start from separated strands at `concentration` (M) and run until the
    /// strands hybridize.
    FirstPassage { concentration: f64 },
}

/// Everything the simulator needs for one run. Passed by value to each run
/// instead of living in shared coordinator state.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationRequest {
    pub sequence: String,
    pub trials: usize,
    /// Degrees Celsius.
    pub temperature: f64,
    /// Simulated seconds before a trajectory is cut off.
    pub timeout: f64,
    pub mode: SamplingMode,
}

impl SimulationRequest {
    pub fn validate(&self) -> Result<()> {
        if self.trials == 0 {
            return Err(RateError::invalid("a simulation needs at least one trial"));
        }
        if !(self.timeout > 0.0) {
            return Err(RateError::invalid(format!(
                "timeout must be positive, got {}",
                self.timeout
            )));
        }
        if let SamplingMode::FirstPassage { concentration } = self.mode {
            if !concentration.is_finite() || concentration <= 0.0 {
                return Err(RateError::invalid(format!(
                    "join concentration must be positive, got {concentration}"
                )));
            }
        }
        Ok(())
    }
}

/// The outcome of one simulation run.
#[derive(Debug, Clone)]
pub struct SimulationRun {
    pub batch: ResultsBatch,
    /// Wall-clock time spent simulating.
    pub run_time: Duration,
}

/// A trajectory simulator. The real engine lives outside this crate.
pub trait TrialSimulator {
    fn run(&mut self, request: &SimulationRequest) -> Result<SimulationRun>;
}

/// Kinetic parameters the synthetic simulator draws trajectories from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyntheticKinetics {
    /// Total collision rate of the two strands (/M/s).
    pub collision_rate: f64,
    /// Probability that a collision leads to the hybridized state.
    pub success_probability: f64,
    /// Rate of completing a successful collision (/s).
    pub forward_rate: f64,
    /// Rate of falling apart after an unproductive collision (/s).
    pub reverse_rate: f64,
}

impl SyntheticKinetics {
    fn validate(&self, sequence: &str) -> Result<()> {
        let positive = |x: f64| x.is_finite() && x > 0.0;
        if !positive(self.collision_rate) || !positive(self.forward_rate) || !positive(self.reverse_rate) {
            return Err(RateError::Simulation(format!(
                "kinetics for {sequence} need positive rates"
            )));
        }
        if !(self.success_probability > 0.0 && self.success_probability <= 1.0) {
            return Err(RateError::Simulation(format!(
                "success probability for {sequence} must lie in (0, 1], got {}",
                self.success_probability
            )));
        }
        Ok(())
    }

    /// Effective rate constant (/M/s) the estimators should recover at `concentration`.
    pub fn expected_k_eff(&self, concentration: f64) -> f64 {
        let p = self.success_probability;
        let dt_collision = 1.0 / (self.collision_rate * concentration);
        let time = (1.0 - p) / p * (dt_collision + 1.0 / self.reverse_rate)
            + dt_collision
            + 1.0 / self.forward_rate;
        1.0 / (time * concentration)
    }
}

/// Stand-in for the trajectory simulator: trials are drawn from a two-step
/// model where collisions happen at `collision_rate * z`, each collision
/// succeeds with `success_probability`, and the unimolecular steps are
/// exponentially distributed.
pub struct SyntheticSimulator {
    kinetics: HashMap<String, SyntheticKinetics>,
    rng: SmallRng,
}

impl SyntheticSimulator {
    pub fn new(kinetics: HashMap<String, SyntheticKinetics>, seed: Option<u64>) -> Self {
        let rng = if let Some(s) = seed {
            SmallRng::seed_from_u64(s)
        } else {
            SmallRng::from_entropy()
        };
        SyntheticSimulator { kinetics, rng }
    }

    fn kinetics_for(&self, sequence: &str) -> Result<SyntheticKinetics> {
        let kinetics = self.kinetics.get(sequence).copied().ok_or_else(|| {
            RateError::Simulation(format!("no kinetics configured for sequence {sequence}"))
        })?;
        kinetics.validate(sequence)?;
        Ok(kinetics)
    }

    fn first_step_trial(&mut self, k: &SyntheticKinetics, timeout: f64) -> Result<TrialOutcome> {
        let success = self.rng.gen_bool(k.success_probability);
        let (tag, rate) = if success {
            (OutcomeTag::Success, k.forward_rate)
        } else {
            (OutcomeTag::Failure, k.reverse_rate)
        };
        let time = sample_exponential(&mut self.rng, rate)?;
        if time > timeout {
            return TrialOutcome::new(OutcomeTag::Timeout, k.collision_rate, timeout);
        }
        TrialOutcome::new(tag, k.collision_rate, time)
    }

    fn first_passage_trial(
        &mut self,
        k: &SyntheticKinetics,
        concentration: f64,
        timeout: f64,
    ) -> Result<TrialOutcome> {
        let mut time = 0.0;
        loop {
            time += sample_exponential(&mut self.rng, k.collision_rate * concentration)?;
            let success = self.rng.gen_bool(k.success_probability);
            let rate = if success { k.forward_rate } else { k.reverse_rate };
            time += sample_exponential(&mut self.rng, rate)?;
            if time > timeout {
                return TrialOutcome::new(OutcomeTag::Timeout, 0.0, timeout);
            }
            if success {
                return TrialOutcome::new(OutcomeTag::Success, 0.0, time);
            }
        }
    }
}

impl TrialSimulator for SyntheticSimulator {
    fn run(&mut self, request: &SimulationRequest) -> Result<SimulationRun> {
        request.validate()?;
        let kinetics = self.kinetics_for(&request.sequence)?;
        let start_time = Instant::now();
        flame::start("synthetic_run");
        let mut trials = Vec::with_capacity(request.trials);
        for _ in 0..request.trials {
            let trial = match request.mode {
                SamplingMode::FirstStep { .. } => self.first_step_trial(&kinetics, request.timeout)?,
                SamplingMode::FirstPassage { concentration } => {
                    self.first_passage_trial(&kinetics, concentration, request.timeout)?
                }
            };
            trials.push(trial);
        }
        flame::end("synthetic_run");
        let batch = ResultsBatch::new(trials);
        let run_time = start_time.elapsed();
        info!("{} ({:?}): {}", request.sequence, request.mode, batch);
        debug!("simulated in {:.3} s", run_time.as_secs_f64());
        Ok(SimulationRun { batch, run_time })
    }
}

pub fn sample_exponential(rng: &mut SmallRng, rate: f64) -> Result<f64> {
    let exp = Exp::new(rate)
        .map_err(|e| RateError::Simulation(format!("exponential with rate {rate}: {e:?}")))?;
    Ok(exp.sample(rng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::{point_estimate, EstimatorMode, RateTarget};

    const SEQ: &str = "TCGATG";

    fn kinetics() -> SyntheticKinetics {
        SyntheticKinetics {
            collision_rate: 3.0e6,
            success_probability: 0.4,
            forward_rate: 2.0e3,
            reverse_rate: 5.0e4,
        }
    }

    fn simulator(seed: u64) -> SyntheticSimulator {
        SyntheticSimulator::new(HashMap::from([(SEQ.to_string(), kinetics())]), Some(seed))
    }

    fn request(mode: SamplingMode, trials: usize) -> SimulationRequest {
        SimulationRequest {
            sequence: SEQ.to_string(),
            trials,
            temperature: 20.0,
            timeout: 100.0,
            mode,
        }
    }

    #[test]
    fn run_returns_requested_trial_count() {
        let run = simulator(1)
            .run(&request(SamplingMode::FirstStep { leak: false }, 250))
            .unwrap();
        assert_eq!(run.batch.len(), 250);
    }

    #[test]
    fn unknown_sequence_is_a_simulation_error() {
        let mut req = request(SamplingMode::FirstStep { leak: false }, 10);
        req.sequence = "GGGG".to_string();
        assert!(matches!(simulator(1).run(&req), Err(RateError::Simulation(_))));
    }

    #[test]
    fn zero_trials_is_invalid() {
        let req = request(SamplingMode::FirstStep { leak: false }, 0);
        assert!(matches!(simulator(1).run(&req), Err(RateError::InvalidInput(_))));
    }

    #[test]
    fn first_step_recovers_configured_rate() {
        let run = simulator(99)
            .run(&request(SamplingMode::FirstStep { leak: false }, 20_000))
            .unwrap();
        let z = 1e-3;
        let k = point_estimate(&run.batch, RateTarget::at(z), EstimatorMode::FirstStep).unwrap();
        let expected = kinetics().expected_k_eff(z);
        assert!((k - expected).abs() / expected < 0.1, "{k} vs {expected}");
    }

    #[test]
    fn first_passage_recovers_configured_rate() {
        let z = 1e-6;
        let run = simulator(5)
            .run(&request(SamplingMode::FirstPassage { concentration: z }, 5_000))
            .unwrap();
        let k = point_estimate(&run.batch, RateTarget::at(z), EstimatorMode::FirstPassage).unwrap();
        let expected = kinetics().expected_k_eff(z);
        assert!((k - expected).abs() / expected < 0.1, "{k} vs {expected}");
    }

    #[test]
    fn short_timeout_censors_trials() {
        let mut req = request(SamplingMode::FirstPassage { concentration: 1e-9 }, 50);
        req.timeout = 1e-3;
        let run = simulator(2).run(&req).unwrap();
        assert_eq!(run.batch.count(OutcomeTag::Timeout), 50);
        assert!(run.batch.iter().all(|t| t.time == 1e-3));
    }
}
