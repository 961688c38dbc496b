use std::collections::HashMap;

use strandrate_rust::config::StudyConfig;
use strandrate_rust::estimator::{point_estimate, EstimatorMode, RateTarget};
use strandrate_rust::report;
use strandrate_rust::simulator::{SamplingMode, SimulationRequest, SyntheticSimulator, TrialSimulator};
use strandrate_rust::study::{CaseStudy, Column};
use strandrate_rust::{confidence_interval, RateError, SeededIndexSource};

fn config(seed: u64) -> StudyConfig {
    StudyConfig {
        resamples: 200,
        seed: Some(seed),
        threads: 2,
        concentrations: vec![1e-2, 1e-4],
        ..StudyConfig::default()
    }
}

fn simulator(config: &StudyConfig) -> SyntheticSimulator {
    let kinetics: HashMap<_, _> = config
        .sequences
        .iter()
        .map(|s| (s.sequence.clone(), s.kinetics))
        .collect();
    SyntheticSimulator::new(kinetics, config.seed)
}

fn study(config: &StudyConfig) -> CaseStudy<SyntheticSimulator, strandrate_rust::energy::TabulatedEnergyModel> {
    CaseStudy::new(simulator(config), config.energy_model().unwrap(), config).unwrap()
}

#[test]
fn inference_writes_series_for_every_sequence() {
    let cfg = config(2017);
    let mut study = study(&cfg);
    let report = study
        .do_inference(&cfg.sequence_names(), &cfg.concentrations, 400)
        .unwrap();

    assert_eq!(report.first_step.len(), 3);
    assert_eq!(report.first_passage.len(), 3);
    let grid = report.grid(EstimatorMode::FirstStep, Column::Log10KEff);
    assert_eq!(grid.dim(), (3, 2));
    for result in report.first_step.iter().chain(&report.first_passage) {
        for p in &result.points {
            let ci = p.interval.expect("synthetic batches are not degenerate");
            assert!(ci.low <= ci.high);
            assert!(ci.log_std >= 0.0);
        }
    }
    assert!(report.first_step.iter().all(|r| r.reverse_rate.unwrap() > 0.0));

    let dir = tempfile::tempdir().unwrap();
    let paths = report::write_inference(&report, dir.path()).unwrap();
    assert_eq!(paths.len(), 3);
    let scatter = std::fs::read_to_string(dir.path().join("scatter1.tsv")).unwrap();
    assert_eq!(scatter.lines().count(), 1 + cfg.concentrations.len());
    assert!(scatter.starts_with("log10_concentration\tfs_TCGATG"));
}

#[test]
fn both_modes_agree_on_k_eff() {
    let cfg = config(11);
    let mut sim = simulator(&cfg);
    let sequence = "AGTCCTTTTTGG";
    let z = 1e-3;
    let request = |mode| SimulationRequest {
        sequence: sequence.to_string(),
        trials: 4000,
        temperature: cfg.temperature,
        timeout: cfg.timeout,
        mode,
    };

    let first_step = sim.run(&request(SamplingMode::FirstStep { leak: false })).unwrap();
    let first_passage = sim
        .run(&request(SamplingMode::FirstPassage { concentration: z }))
        .unwrap();
    let k_fs = point_estimate(&first_step.batch, RateTarget::at(z), EstimatorMode::FirstStep).unwrap();
    let k_fp =
        point_estimate(&first_passage.batch, RateTarget::at(z), EstimatorMode::FirstPassage).unwrap();
    assert!((k_fs - k_fp).abs() / k_fp < 0.15, "{k_fs} vs {k_fp}");

    let expected = cfg.sequence(sequence).unwrap().kinetics.expected_k_eff(z);
    let ci = confidence_interval(
        &first_step.batch,
        RateTarget::at(z),
        1000,
        EstimatorMode::FirstStep,
        &mut SeededIndexSource::new(Some(3)),
    )
    .unwrap();
    assert!(ci.low < expected * 1.1 && ci.high > expected * 0.9);
}

#[test]
fn slowdown_study_compares_against_reference() {
    let cfg = config(5);
    let mut study = study(&cfg);
    let report = study
        .slowdown_study(&cfg.slowdown_sequences, cfg.slowdown_concentration, 2000)
        .unwrap();
    assert_eq!(report.points.len(), 3);
    assert_eq!(report.factors.len(), 2);
    for f in &report.factors {
        assert!(f.factor > 0.0);
        assert!(f.deviation > 0.0);
    }

    let dir = tempfile::tempdir().unwrap();
    let path = report::write_slowdown(&report, dir.path()).unwrap();
    let text = std::fs::read_to_string(path).unwrap();
    assert!(text.contains("factor TCGATGC"));
}

#[test]
fn unknown_sequence_surfaces_simulation_error() {
    let cfg = config(1);
    let mut study = study(&cfg);
    let err = study
        .first_step_mode("GATTACA", &[1e-3], 10, false)
        .unwrap_err();
    assert!(matches!(err, RateError::Simulation(_)));
}
