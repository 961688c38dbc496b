use std::fmt::Write as _;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use num_format::{Locale, ToFormattedString};
use stybulate::{Cell, Headers, Style, Table};

use crate::error::Result;
use crate::estimator::EstimatorMode;
use crate::study::{Column, InferenceReport, SlowdownReport};

const UNITS: [(&str, f64); 5] = [("M", 1.0), ("mM", 1e-3), ("uM", 1e-6), ("nM", 1e-9), ("pM", 1e-12)];

/// Human readable concentration, e.g. `100 uM` for `1e-4`.
pub fn concentration_string(concentration: f64) -> String {
    let (unit, scale) = UNITS
        .iter()
        .copied()
        .find(|&(_, scale)| concentration >= scale * (1.0 - 1e-9))
        .unwrap_or(UNITS[UNITS.len() - 1]);
    let value = concentration / scale;
    let mut s = format!("{value:.3}");
    while s.contains('.') && s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.pop();
    }
    format!("{s} {unit}")
}

fn mode_name(mode: EstimatorMode) -> &'static str {
    match mode {
        EstimatorMode::FirstStep => "first step",
        EstimatorMode::FirstPassage => "first passage",
    }
}

pub fn inference_title(trials: usize) -> String {
    format!(
        "Estimated hybridization rate ({} trajectories)",
        trials.to_formatted_string(&Locale::en)
    )
}

pub fn run_time_title(trials: usize) -> String {
    format!(
        "Computation time for {} trajectories",
        trials.to_formatted_string(&Locale::en)
    )
}

/// Table of every estimate in the report, both modes.
pub fn inference_table(report: &InferenceReport) -> String {
    let mut entries = Vec::new();
    for mode in [EstimatorMode::FirstStep, EstimatorMode::FirstPassage] {
        for result in report.results(mode) {
            for (point, run_time) in result.points.iter().zip(&result.log10_run_times) {
                let label = concentration_string(point.concentration);
                entries.push((result.sequence.as_str(), mode, label, point, *run_time));
            }
        }
    }
    let rows = entries
        .iter()
        .map(|(sequence, mode, label, point, run_time)| {
            vec![
                Cell::from(*sequence),
                Cell::from(mode_name(*mode)),
                Cell::from(label.as_str()),
                Cell::Float(point.log10_k_eff()),
                Cell::Float(point.log10_low()),
                Cell::Float(point.log10_high()),
                Cell::Float(point.log_std()),
                Cell::Float(*run_time),
            ]
        })
        .collect();
    let table = Table::new(
        Style::Fancy,
        rows,
        Some(Headers::from(vec![
            "sequence",
            "mode",
            "concentration",
            "log10 k_eff",
            "log10 low",
            "log10 high",
            "log std",
            "log10 time (s)",
        ])),
    )
    .tabulate();
    format!("{}\n{}", inference_title(report.trials), table)
}

/// Reverse rate constants from the first-step runs.
pub fn reverse_rate_table(report: &InferenceReport) -> String {
    let rows = report
        .first_step
        .iter()
        .filter_map(|r| r.reverse_rate.map(|k| (r, k)))
        .map(|(r, k)| vec![Cell::from(r.sequence.as_str()), Cell::Float(k)])
        .collect();
    Table::new(
        Style::Fancy,
        rows,
        Some(Headers::from(vec!["sequence", "krev (/s)"])),
    )
    .tabulate()
}

fn tsv_writer<W: io::Write>(out: W) -> csv::Writer<W> {
    csv::WriterBuilder::new().delimiter(b'\t').from_writer(out)
}

/// Tab separated series for one column, one row per concentration and one
/// column per sequence and mode.
fn write_series<W: io::Write>(
    report: &InferenceReport,
    column: Column,
    wtr: &mut csv::Writer<W>,
) -> Result<()> {
    let first_step = report.grid(EstimatorMode::FirstStep, column);
    let first_passage = report.grid(EstimatorMode::FirstPassage, column);

    let mut header = vec!["log10_concentration".to_string()];
    for (prefix, results) in [("fs", &report.first_step), ("fp", &report.first_passage)] {
        header.extend(results.iter().map(|r| format!("{prefix}_{}", r.sequence)));
    }
    wtr.write_record(&header)?;
    for (j, z) in report.concentrations.iter().enumerate() {
        let mut row = vec![z.log10().to_string()];
        for grid in [&first_step, &first_passage] {
            row.extend(grid.column(j).iter().map(f64::to_string));
        }
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_intervals<W: io::Write>(report: &InferenceReport, wtr: &mut csv::Writer<W>) -> Result<()> {
    wtr.write_record([
        "sequence",
        "mode",
        "log10_concentration",
        "log10_k_eff",
        "log10_low",
        "log10_high",
        "log_std",
    ])?;
    for mode in [EstimatorMode::FirstStep, EstimatorMode::FirstPassage] {
        for result in report.results(mode) {
            for p in &result.points {
                wtr.write_record([
                    result.sequence.clone(),
                    mode_name(mode).to_string(),
                    p.concentration.log10().to_string(),
                    p.log10_k_eff().to_string(),
                    p.log10_low().to_string(),
                    p.log10_high().to_string(),
                    p.log_std().to_string(),
                ])?;
            }
        }
    }
    wtr.flush()?;
    Ok(())
}

/// Writes the scatter and run-time series under `dir`, returning the paths.
pub fn write_inference(report: &InferenceReport, dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let scatter = dir.join("scatter1.tsv");
    write_series(report, Column::Log10KEff, &mut tsv_writer(File::create(&scatter)?))?;
    let intervals = dir.join("intervals1.tsv");
    write_intervals(report, &mut tsv_writer(File::create(&intervals)?))?;
    let run_times = dir.join("runTime1.tsv");
    write_series(report, Column::Log10RunTime, &mut tsv_writer(File::create(&run_times)?))?;
    Ok(vec![scatter, intervals, run_times])
}

pub fn slowdown_text(report: &SlowdownReport) -> String {
    let mut out = String::new();
    for (sequence, p) in &report.points {
        let _ = writeln!(
            out,
            "{sequence}: log10 k1 {}  log10 low {}  log10 high {}  log std {}",
            p.log10_k_eff(),
            p.log10_low(),
            p.log10_high(),
            p.log_std()
        );
    }
    for f in &report.factors {
        let _ = writeln!(out, "factor {} {}  {}", f.sequence, f.factor, f.deviation);
    }
    out
}

pub fn write_slowdown(report: &SlowdownReport, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join("relRates.txt");
    fs::write(&path, slowdown_text(report))?;
    Ok(path)
}
