mod cli;

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use strandrate_rust::config::StudyConfig;
use strandrate_rust::flame;
use strandrate_rust::report;
use strandrate_rust::simulator::SyntheticSimulator;
use strandrate_rust::study::CaseStudy;

use cli::{Args, Command};

fn write_profile(filename: &str) -> Result<()> {
    if flame::spans().is_empty() {
        println!("No profiling data available since flame_profiling feature disabled.");
        return Ok(());
    }
    let file = File::create(filename).with_context(|| format!("creating {filename}"))?;
    flame::dump_html(file)?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = StudyConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config))?;
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    config.validate()?;

    let kinetics: HashMap<_, _> = config
        .sequences
        .iter()
        .map(|s| (s.sequence.clone(), s.kinetics))
        .collect();
    let simulator = SyntheticSimulator::new(kinetics, config.seed);
    let energy = config.energy_model()?;
    let mut study = CaseStudy::new(simulator, energy, &config)?;
    let output_dir = Path::new(&config.output_dir);

    match args.command {
        Command::Plots { trials } => {
            let report = study.do_inference(&config.sequence_names(), &config.concentrations, trials)?;
            println!("{}", report::inference_table(&report));
            println!("{}", report::reverse_rate_table(&report));
            for path in report::write_inference(&report, output_dir)? {
                info!("wrote {}", path.display());
            }
        }
        Command::SlowDownStudy { trials } => {
            let report = study.slowdown_study(
                &config.slowdown_sequences,
                config.slowdown_concentration,
                trials,
            )?;
            print!("{}", report::slowdown_text(&report));
            let path = report::write_slowdown(&report, output_dir)?;
            info!("wrote {}", path.display());
        }
    }

    if let Some(filename) = &args.profile {
        write_profile(filename)?;
    }
    Ok(())
}
