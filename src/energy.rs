//! Reverse rate constants from partition-function free energies.
//!
//! Detailed balance relates the forward and reverse constants of
//! `top + bottom <-> duplex`:
//!
//! `krev = k_eff * exp((dG_duplex - dG_top - dG_bottom) / RT)`

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{RateError, Result};

/// Gas constant in kcal/(mol K).
pub const GAS_CONSTANT: f64 = 1.987e-3;
pub const ZERO_CELSIUS: f64 = 273.15;

/// A partition-function calculator: free energy (kcal/mol) of the complex
/// formed by `strands` at `temperature` (degrees Celsius).
pub trait FreeEnergyModel {
    fn pfunc(&self, strands: &[&str], temperature: f64) -> Result<f64>;
}

/// RT in kcal/mol at a temperature in degrees Celsius.
pub fn rt(temperature: f64) -> f64 {
    GAS_CONSTANT * (ZERO_CELSIUS + temperature)
}

/// Watson-Crick reverse complement of a DNA sequence.
pub fn reverse_complement(sequence: &str) -> Result<String> {
    sequence
        .chars()
        .rev()
        .map(|c| match c.to_ascii_uppercase() {
            'A' => Ok('T'),
            'T' => Ok('A'),
            'C' => Ok('G'),
            'G' => Ok('C'),
            other => Err(RateError::invalid(format!(
                "'{other}' is not a DNA base in {sequence}"
            ))),
        })
        .collect()
}

/// Free energy of duplex formation minus that of both single strands.
pub fn net_free_energy<E: FreeEnergyModel + ?Sized>(
    model: &E,
    sequence: &str,
    temperature: f64,
) -> Result<f64> {
    let complement = reverse_complement(sequence)?;
    let dg_top = model.pfunc(&[sequence], temperature)?;
    let dg_bottom = model.pfunc(&[complement.as_str()], temperature)?;
    let dg_duplex = model.pfunc(&[sequence, complement.as_str()], temperature)?;
    Ok(dg_duplex - dg_top - dg_bottom)
}

/// Dissociation rate constant (/s) implied by `k_eff` (/M/s) and the
/// partition functions of `sequence` and its complement.
pub fn reverse_rate<E: FreeEnergyModel + ?Sized>(
    model: &E,
    sequence: &str,
    k_eff: f64,
    temperature: f64,
) -> Result<f64> {
    let dg_net = net_free_energy(model, sequence, temperature)?;
    Ok(k_eff * (dg_net / rt(temperature)).exp())
}

/// One tabulated free energy, keyed by its strands joined with `+`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyEntry {
    pub strands: Vec<String>,
    pub dg: f64,
}

/// Free energies looked up from a table, for runs without a partition-function
/// calculator at hand. Temperature is not interpolated: the table is assumed
/// to be computed at the study temperature.
#[derive(Debug, Clone, Default)]
pub struct TabulatedEnergyModel {
    table: HashMap<String, f64>,
}

impl TabulatedEnergyModel {
    pub fn new(entries: &[EnergyEntry]) -> Self {
        let table = entries
            .iter()
            .map(|e| (Self::key(e.strands.iter().map(String::as_str)), e.dg))
            .collect();
        TabulatedEnergyModel { table }
    }

    pub fn insert(&mut self, strands: &[&str], dg: f64) {
        self.table.insert(Self::key(strands.iter().copied()), dg);
    }

    fn key<'a>(strands: impl Iterator<Item = &'a str>) -> String {
        strands
            .map(|s| s.to_ascii_uppercase())
            .collect::<Vec<_>>()
            .join("+")
    }
}

impl FreeEnergyModel for TabulatedEnergyModel {
    fn pfunc(&self, strands: &[&str], _temperature: f64) -> Result<f64> {
        let key = Self::key(strands.iter().copied());
        self.table
            .get(&key)
            .copied()
            .ok_or_else(|| RateError::Energy(format!("no free energy tabulated for {key}")))
    }
}
