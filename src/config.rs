use std::fs;
use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::bootstrap::DEFAULT_RESAMPLES;
use crate::energy::{reverse_complement, TabulatedEnergyModel};
use crate::error::{RateError, Result};
use crate::simulator::SyntheticKinetics;

/// Free energies (kcal/mol) of a sequence, its complement and their duplex.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SequenceEnergies {
    pub top: f64,
    pub bottom: f64,
    pub duplex: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceConfig {
    pub sequence: String,
    pub kinetics: SyntheticKinetics,
    pub energies: SequenceEnergies,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyConfig {
    /// Degrees Celsius.
    #[serde(default = "StudyConfig::default_temperature")]
    pub temperature: f64,
    /// Simulated seconds before a trajectory is cut off.
    #[serde(default = "StudyConfig::default_timeout")]
    pub timeout: f64,
    #[serde(default = "StudyConfig::default_resamples")]
    pub resamples: usize,
    /// Base seed for the simulator and the bootstrap; entropy when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "StudyConfig::default_threads")]
    pub threads: usize,
    #[serde(default = "StudyConfig::default_output_dir")]
    pub output_dir: String,
    /// Join concentrations (M) of the inference study.
    #[serde(default = "StudyConfig::default_concentrations")]
    pub concentrations: Vec<f64>,
    /// Concentration (M) of the slowdown study.
    #[serde(default = "StudyConfig::default_slowdown_concentration")]
    pub slowdown_concentration: f64,
    /// Sequences compared in the slowdown study; the first is the reference.
    #[serde(default = "StudyConfig::default_slowdown_sequences")]
    pub slowdown_sequences: Vec<String>,
    #[serde(default = "StudyConfig::default_sequences")]
    pub sequences: Vec<SequenceConfig>,
}

impl StudyConfig {
    fn default_temperature() -> f64 {
        20.0
    }
    fn default_timeout() -> f64 {
        100.0
    }
    fn default_resamples() -> usize {
        DEFAULT_RESAMPLES
    }
    fn default_threads() -> usize {
        8
    }
    fn default_output_dir() -> String {
        "Hybridization_F1".to_string()
    }
    fn default_concentrations() -> Vec<f64> {
        vec![1e0, 1e-1, 1e-2, 1e-3, 1e-4, 1e-5]
    }
    fn default_slowdown_concentration() -> f64 {
        1e-6
    }
    fn default_slowdown_sequences() -> Vec<String> {
        Self::default_sequences()
            .into_iter()
            .map(|s| s.sequence)
            .collect()
    }
    // Synthetic kinetics and energies for the stand-in simulator; replace
    // with measured values when driving a real engine.
    fn default_sequences() -> Vec<SequenceConfig> {
        vec![
            SequenceConfig {
                sequence: "TCGATG".to_string(),
                kinetics: SyntheticKinetics {
                    collision_rate: 4.0e6,
                    success_probability: 0.05,
                    forward_rate: 2.0e4,
                    reverse_rate: 1.0e6,
                },
                energies: SequenceEnergies {
                    top: -0.2,
                    bottom: -0.1,
                    duplex: -5.9,
                },
            },
            SequenceConfig {
                sequence: "TCGATGC".to_string(),
                kinetics: SyntheticKinetics {
                    collision_rate: 4.2e6,
                    success_probability: 0.12,
                    forward_rate: 1.5e4,
                    reverse_rate: 8.0e5,
                },
                energies: SequenceEnergies {
                    top: -0.2,
                    bottom: -0.3,
                    duplex: -7.6,
                },
            },
            SequenceConfig {
                sequence: "AGTCCTTTTTGG".to_string(),
                kinetics: SyntheticKinetics {
                    collision_rate: 5.0e6,
                    success_probability: 0.6,
                    forward_rate: 5.0e3,
                    reverse_rate: 4.0e5,
                },
                energies: SequenceEnergies {
                    top: -0.4,
                    bottom: -0.5,
                    duplex: -13.1,
                },
            },
        ]
    }

    pub fn load_or_default(path: &str) -> Result<Self> {
        let path_obj = Path::new(path);
        if path_obj.exists() {
            let contents = fs::read_to_string(path_obj)?;
            let cfg: StudyConfig = toml::from_str(&contents)?;
            cfg.validate()?;
            info!("loaded configuration from {path}");
            return Ok(cfg);
        }

        // File does not exist: write defaults and return them.
        let default_cfg = Self::default();
        match toml::to_string_pretty(&default_cfg) {
            Ok(text) => {
                if let Err(err) = fs::write(path_obj, text) {
                    warn!("failed to write default config to {path}: {err}");
                } else {
                    info!("wrote default configuration to {path}");
                }
            }
            Err(err) => warn!("failed to serialize default config: {err}"),
        }
        Ok(default_cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.resamples == 0 {
            return Err(RateError::invalid("resamples must be positive"));
        }
        if self.threads == 0 {
            return Err(RateError::invalid("threads must be positive"));
        }
        let concentrations = self
            .concentrations
            .iter()
            .chain(std::iter::once(&self.slowdown_concentration));
        for &z in concentrations {
            if !z.is_finite() || z <= 0.0 {
                return Err(RateError::invalid(format!(
                    "concentrations must be positive, got {z}"
                )));
            }
        }
        for name in &self.slowdown_sequences {
            if self.sequence(name).is_none() {
                return Err(RateError::invalid(format!(
                    "slowdown sequence {name} is not configured"
                )));
            }
        }
        Ok(())
    }

    pub fn sequence(&self, sequence: &str) -> Option<&SequenceConfig> {
        self.sequences.iter().find(|s| s.sequence == sequence)
    }

    pub fn sequence_names(&self) -> Vec<String> {
        self.sequences.iter().map(|s| s.sequence.clone()).collect()
    }

    /// Free energy table covering every configured sequence.
    pub fn energy_model(&self) -> Result<TabulatedEnergyModel> {
        let mut model = TabulatedEnergyModel::default();
        for s in &self.sequences {
            let complement = reverse_complement(&s.sequence)?;
            model.insert(&[s.sequence.as_str()], s.energies.top);
            model.insert(&[complement.as_str()], s.energies.bottom);
            model.insert(&[s.sequence.as_str(), complement.as_str()], s.energies.duplex);
        }
        Ok(model)
    }
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            temperature: Self::default_temperature(),
            timeout: Self::default_timeout(),
            resamples: Self::default_resamples(),
            seed: None,
            threads: Self::default_threads(),
            output_dir: Self::default_output_dir(),
            concentrations: Self::default_concentrations(),
            slowdown_concentration: Self::default_slowdown_concentration(),
            slowdown_sequences: Self::default_slowdown_sequences(),
            sequences: Self::default_sequences(),
        }
    }
}
