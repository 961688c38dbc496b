//! The hybridization case study: first-step versus first-passage estimates
//! of k_eff across concentrations, and the leak-rate slowdown comparison.

use log::{info, warn};
use ndarray::Array2;
use rayon::prelude::*;
use rayon::ThreadPool;

use crate::bootstrap::{confidence_interval, ConfidenceInterval, SeededIndexSource};
use crate::config::StudyConfig;
use crate::energy::{reverse_rate, FreeEnergyModel};
use crate::error::{RateError, Result};
use crate::estimator::{point_estimate, EstimatorMode, RateTarget};
use crate::outcome::ResultsBatch;
use crate::report::concentration_string;
use crate::simulator::{SamplingMode, SimulationRequest, TrialSimulator};

/// One rate estimate with its bootstrap interval, on the log10 scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StudyPoint {
    pub concentration: f64,
    /// Linear rate constant.
    pub k_eff: f64,
    /// `None` when the batch was degenerate.
    pub interval: Option<ConfidenceInterval>,
}

impl StudyPoint {
    pub fn log10_k_eff(&self) -> f64 {
        self.k_eff.log10()
    }

    pub fn log10_low(&self) -> f64 {
        self.interval.map_or(f64::NAN, |ci| ci.low.log10())
    }

    pub fn log10_high(&self) -> f64 {
        self.interval.map_or(f64::NAN, |ci| ci.high.log10())
    }

    pub fn log_std(&self) -> f64 {
        self.interval.map_or(f64::NAN, |ci| ci.log_std)
    }
}

/// Estimates for one sequence in one sampling mode.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeResult {
    pub sequence: String,
    pub mode: EstimatorMode,
    pub points: Vec<StudyPoint>,
    /// log10 of the wall-clock seconds behind each point.
    pub log10_run_times: Vec<f64>,
    /// Dissociation constant from detailed balance (first-step mode only).
    pub reverse_rate: Option<f64>,
}

/// Both modes for every sequence, over a shared concentration ladder.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceReport {
    pub trials: usize,
    pub sequences: Vec<String>,
    pub concentrations: Vec<f64>,
    pub first_step: Vec<ModeResult>,
    pub first_passage: Vec<ModeResult>,
}

/// Which column of a [`StudyPoint`] to pull into a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Log10KEff,
    Log10Low,
    Log10High,
    LogStd,
    Log10RunTime,
}

impl InferenceReport {
    pub fn results(&self, mode: EstimatorMode) -> &[ModeResult] {
        match mode {
            EstimatorMode::FirstStep => &self.first_step,
            EstimatorMode::FirstPassage => &self.first_passage,
        }
    }

    /// Sequence x concentration grid of one column.
    pub fn grid(&self, mode: EstimatorMode, column: Column) -> Array2<f64> {
        let results = self.results(mode);
        Array2::from_shape_fn((results.len(), self.concentrations.len()), |(i, j)| {
            let result = &results[i];
            let point = &result.points[j];
            match column {
                Column::Log10KEff => point.log10_k_eff(),
                Column::Log10Low => point.log10_low(),
                Column::Log10High => point.log10_high(),
                Column::LogStd => point.log_std(),
                Column::Log10RunTime => result.log10_run_times[j],
            }
        })
    }
}

/// Leak-rate ratio of one sequence against the reference.
#[derive(Debug, Clone, PartialEq)]
pub struct SlowdownFactor {
    pub sequence: String,
    pub factor: f64,
    pub deviation: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlowdownReport {
    pub points: Vec<(String, StudyPoint)>,
    pub factors: Vec<SlowdownFactor>,
}

/// How far the reference sequence is slowed relative to `other`, with a
/// deviation from the summed log10 standard deviations.
pub fn slowdown_factor(reference: &StudyPoint, other: &StudyPoint) -> Result<(f64, f64)> {
    let (Some(a), Some(b)) = (reference.interval, other.interval) else {
        return Err(RateError::degenerate(
            "slowdown factors need bootstrap intervals for both sequences",
        ));
    };
    let diff = reference.log10_k_eff() - other.log10_k_eff();
    let factor = 10f64.powf(diff);
    let deviation = 10f64.powf(diff + a.log_std + b.log_std) - factor;
    Ok((factor, deviation))
}

pub struct CaseStudy<S, E> {
    simulator: S,
    energy: E,
    temperature: f64,
    timeout: f64,
    resamples: usize,
    seed: Option<u64>,
    analyses: u64,
    pool: ThreadPool,
}

impl<S: TrialSimulator, E: FreeEnergyModel> CaseStudy<S, E> {
    pub fn new(simulator: S, energy: E, config: &StudyConfig) -> Result<Self> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .build()
            .map_err(|e| RateError::invalid(format!("cannot build thread pool: {e}")))?;
        Ok(CaseStudy {
            simulator,
            energy,
            temperature: config.temperature,
            timeout: config.timeout,
            resamples: config.resamples,
            seed: config.seed,
            analyses: 0,
            pool,
        })
    }

    fn request(&self, sequence: &str, trials: usize, mode: SamplingMode) -> SimulationRequest {
        SimulationRequest {
            sequence: sequence.to_string(),
            trials,
            temperature: self.temperature,
            timeout: self.timeout,
            mode,
        }
    }

    /// Point estimates plus bootstrap intervals for each target, the
    /// bootstraps running in parallel with one index source apiece.
    fn estimate_all(
        &mut self,
        batch: &ResultsBatch,
        targets: &[(f64, RateTarget)],
        mode: EstimatorMode,
    ) -> Result<Vec<StudyPoint>> {
        let base_seed = self
            .seed
            .map(|s| s.wrapping_add(self.analyses.wrapping_mul(1 << 20)));
        self.analyses += 1;
        let resamples = self.resamples;
        self.pool.install(|| {
            targets
                .par_iter()
                .enumerate()
                .map(|(i, &(concentration, target))| {
                    let k_eff = point_estimate(batch, target, mode)?;
                    let mut source =
                        SeededIndexSource::new(base_seed.map(|s| s.wrapping_add(i as u64)));
                    let interval =
                        match confidence_interval(batch, target, resamples, mode, &mut source) {
                            Ok(ci) => Some(ci),
                            Err(RateError::DegenerateBatch(msg)) => {
                                warn!(
                                    "no interval at {}: {msg}",
                                    concentration_string(concentration)
                                );
                                None
                            }
                            Err(e) => return Err(e),
                        };
                    Ok(StudyPoint {
                        concentration,
                        k_eff,
                        interval,
                    })
                })
                .collect()
        })
    }

    /// One first-step run, evaluated at every concentration. In leak mode
    /// the concentration-independent `k1` is reported instead of `k_eff`.
    pub fn first_step_mode(
        &mut self,
        sequence: &str,
        concentrations: &[f64],
        trials: usize,
        leak: bool,
    ) -> Result<ModeResult> {
        info!("Running first step mode simulations for {sequence} (with Boltzmann sampling)...");
        let request = self.request(sequence, trials, SamplingMode::FirstStep { leak });
        let run = self.simulator.run(&request)?;

        let targets: Vec<(f64, RateTarget)> = concentrations
            .iter()
            .map(|&z| {
                let target = if leak {
                    RateTarget::ConcentrationIndependent
                } else {
                    RateTarget::at(z)
                };
                (z, target)
            })
            .collect();
        let points = self.estimate_all(&run.batch, &targets, EstimatorMode::FirstStep)?;
        for p in &points {
            info!("keff = {:e} /M/s at {}", p.k_eff, concentration_string(p.concentration));
        }

        let reverse = match points.last() {
            Some(last) => {
                info!("Calculating dissociation rate constant from partition function energies and first step k_eff...");
                let krev = reverse_rate(&self.energy, sequence, last.k_eff, self.temperature)?;
                info!("krev = {krev:e} /s");
                Some(krev)
            }
            None => None,
        };

        let log10_run_time = run.run_time.as_secs_f64().log10();
        Ok(ModeResult {
            sequence: sequence.to_string(),
            mode: EstimatorMode::FirstStep,
            points,
            log10_run_times: vec![log10_run_time; concentrations.len()],
            reverse_rate: reverse,
        })
    }

    /// One first-passage run per concentration.
    pub fn first_passage_association(
        &mut self,
        sequence: &str,
        concentrations: &[f64],
        trials: usize,
    ) -> Result<ModeResult> {
        let mut points = Vec::with_capacity(concentrations.len());
        let mut log10_run_times = Vec::with_capacity(concentrations.len());
        for &z in concentrations {
            info!(
                "Running first passage time simulations for association of {sequence} at {}...",
                concentration_string(z)
            );
            let request =
                self.request(sequence, trials, SamplingMode::FirstPassage { concentration: z });
            let run = self.simulator.run(&request)?;
            let mut point =
                self.estimate_all(&run.batch, &[(z, RateTarget::at(z))], EstimatorMode::FirstPassage)?;
            let point = point.remove(0);
            info!("keff = {:e} /M/s at {}", point.k_eff, concentration_string(z));
            points.push(point);
            log10_run_times.push(run.run_time.as_secs_f64().log10());
        }
        Ok(ModeResult {
            sequence: sequence.to_string(),
            mode: EstimatorMode::FirstPassage,
            points,
            log10_run_times,
            reverse_rate: None,
        })
    }

    /// Both modes for every sequence.
    pub fn do_inference(
        &mut self,
        sequences: &[String],
        concentrations: &[f64],
        trials: usize,
    ) -> Result<InferenceReport> {
        let mut first_step = Vec::with_capacity(sequences.len());
        let mut first_passage = Vec::with_capacity(sequences.len());
        for sequence in sequences {
            first_step.push(self.first_step_mode(sequence, concentrations, trials, false)?);
            first_passage.push(self.first_passage_association(sequence, concentrations, trials)?);
        }
        Ok(InferenceReport {
            trials,
            sequences: sequences.to_vec(),
            concentrations: concentrations.to_vec(),
            first_step,
            first_passage,
        })
    }

    /// Leak rates of each sequence at `concentration`, and how much slower
    /// the first sequence is than each of the others.
    pub fn slowdown_study(
        &mut self,
        sequences: &[String],
        concentration: f64,
        trials: usize,
    ) -> Result<SlowdownReport> {
        if sequences.len() < 2 {
            return Err(RateError::invalid(
                "the slowdown study compares at least two sequences",
            ));
        }
        let mut points = Vec::with_capacity(sequences.len());
        for sequence in sequences {
            let mut result = self.first_step_mode(sequence, &[concentration], trials, true)?;
            points.push((sequence.clone(), result.points.remove(0)));
        }
        let reference = points[0].1;
        let factors = points[1..]
            .iter()
            .map(|(sequence, point)| {
                let (factor, deviation) = slowdown_factor(&reference, point)?;
                Ok(SlowdownFactor {
                    sequence: sequence.clone(),
                    factor,
                    deviation,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(SlowdownReport { points, factors })
    }

    pub fn simulator(&self) -> &S {
        &self.simulator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::{OutcomeTag, TrialOutcome};
    use crate::simulator::SimulationRun;
    use approx::assert_relative_eq;
    use std::time::Duration;

    /// Replays a fixed batch and records the requests it sees.
    struct Replay {
        batch: ResultsBatch,
        requests: Vec<SimulationRequest>,
    }

    impl TrialSimulator for Replay {
        fn run(&mut self, request: &SimulationRequest) -> Result<SimulationRun> {
            self.requests.push(request.clone());
            Ok(SimulationRun {
                batch: self.batch.clone(),
                run_time: Duration::from_millis(250),
            })
        }
    }

    struct FlatEnergy;

    impl FreeEnergyModel for FlatEnergy {
        fn pfunc(&self, strands: &[&str], _temperature: f64) -> Result<f64> {
            Ok(if strands.len() == 2 { -6.0 } else { 0.0 })
        }
    }

    fn batch() -> ResultsBatch {
        (0..40)
            .map(|i| {
                let tag = if i % 4 == 0 {
                    OutcomeTag::Failure
                } else {
                    OutcomeTag::Success
                };
                TrialOutcome::new(tag, 1.0e6 + 2.0e4 * i as f64, 1.0e-4 * (1 + i % 7) as f64)
                    .unwrap()
            })
            .collect()
    }

    fn config() -> StudyConfig {
        StudyConfig {
            resamples: 200,
            seed: Some(4),
            threads: 2,
            ..StudyConfig::default()
        }
    }

    fn study() -> CaseStudy<Replay, FlatEnergy> {
        let replay = Replay {
            batch: batch(),
            requests: Vec::new(),
        };
        CaseStudy::new(replay, FlatEnergy, &config()).unwrap()
    }

    #[test]
    fn first_step_runs_once_and_reports_every_concentration() {
        let mut study = study();
        let zs = [1e-3, 1e-5];
        let result = study.first_step_mode("TCGATG", &zs, 40, false).unwrap();
        assert_eq!(study.simulator().requests.len(), 1);
        assert_eq!(
            study.simulator().requests[0],
            SimulationRequest {
                sequence: "TCGATG".to_string(),
                trials: 40,
                temperature: 20.0,
                timeout: 100.0,
                mode: SamplingMode::FirstStep { leak: false },
            }
        );
        assert_eq!(result.points.len(), 2);
        for (p, &z) in result.points.iter().zip(&zs) {
            let expected = point_estimate(&batch(), RateTarget::at(z), EstimatorMode::FirstStep).unwrap();
            assert_eq!(p.k_eff, expected);
            let ci = p.interval.unwrap();
            assert!(ci.low <= ci.high);
        }
        assert_relative_eq!(result.log10_run_times[0], 0.25f64.log10());

        let last = result.points[1].k_eff;
        let expected_krev = last * (-6.0f64 / (1.987e-3 * 293.15)).exp();
        assert_relative_eq!(result.reverse_rate.unwrap(), expected_krev, max_relative = 1e-12);
    }

    #[test]
    fn first_passage_runs_per_concentration() {
        let mut study = study();
        let zs = [1e-2, 1e-3, 1e-4];
        let result = study.first_passage_association("TCGATG", &zs, 40).unwrap();
        assert_eq!(study.simulator().requests.len(), 3);
        assert_eq!(
            study.simulator().requests[1].mode,
            SamplingMode::FirstPassage { concentration: 1e-3 }
        );
        assert_eq!(result.points.len(), 3);
        assert!(result.reverse_rate.is_none());
    }

    #[test]
    fn seeded_study_is_reproducible() {
        let a = study().first_step_mode("TCGATG", &[1e-4, 1e-6], 40, false).unwrap();
        let b = study().first_step_mode("TCGATG", &[1e-4, 1e-6], 40, false).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn degenerate_batch_keeps_point_without_interval() {
        let failures: ResultsBatch = (0..5)
            .map(|_| TrialOutcome::new(OutcomeTag::Failure, 1.0e6, 1.0e-4).unwrap())
            .collect();
        let replay = Replay {
            batch: failures,
            requests: Vec::new(),
        };
        let mut study = CaseStudy::new(replay, FlatEnergy, &config()).unwrap();
        let result = study.first_passage_association("TCGATG", &[1e-3], 5).unwrap();
        assert_eq!(result.points[0].k_eff, 0.0);
        assert!(result.points[0].interval.is_none());
        assert!(result.points[0].log10_low().is_nan());
    }

    #[test]
    fn inference_grid_has_sequence_by_concentration_shape() {
        let mut study = study();
        let seqs = vec!["TCGATG".to_string(), "TCGATGC".to_string()];
        let zs = [1e-1, 1e-3, 1e-5];
        let report = study.do_inference(&seqs, &zs, 40).unwrap();
        let grid = report.grid(EstimatorMode::FirstPassage, Column::Log10KEff);
        assert_eq!(grid.dim(), (2, 3));
        assert_relative_eq!(grid[[1, 2]], report.first_passage[1].points[2].log10_k_eff());
        let times = report.grid(EstimatorMode::FirstStep, Column::Log10RunTime);
        assert_relative_eq!(times[[0, 1]], 0.25f64.log10());
    }

    #[test]
    fn leak_mode_reports_k1_regardless_of_concentration() {
        let mut study = study();
        let result = study.first_step_mode("TCGATG", &[1e-6], 40, true).unwrap();
        let k1 = point_estimate(
            &batch(),
            RateTarget::ConcentrationIndependent,
            EstimatorMode::FirstStep,
        )
        .unwrap();
        assert_eq!(result.points[0].k_eff, k1);
    }

    #[test]
    fn slowdown_factor_formula() {
        let point = |k: f64, s: f64| StudyPoint {
            concentration: 1e-6,
            k_eff: k,
            interval: Some(ConfidenceInterval {
                low: k,
                high: k,
                log_std: s,
            }),
        };
        let (factor, deviation) = slowdown_factor(&point(1.0e6, 0.05), &point(1.0e4, 0.1)).unwrap();
        assert_relative_eq!(factor, 100.0, max_relative = 1e-12);
        assert_relative_eq!(deviation, 10f64.powf(2.15) - 100.0, max_relative = 1e-12);
    }

    #[test]
    fn slowdown_needs_two_sequences() {
        let mut study = study();
        let err = study
            .slowdown_study(&["TCGATG".to_string()], 1e-6, 40)
            .unwrap_err();
        assert!(matches!(err, RateError::InvalidInput(_)));
    }
}
