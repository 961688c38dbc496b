pub mod bootstrap;
pub mod config;
pub mod energy;
pub mod error;
pub mod estimator;
pub mod outcome;
pub mod report;
pub mod simulator;
pub mod study;

#[cfg(feature = "python")]
mod python;

pub use bootstrap::{confidence_interval, Bootstrap, ConfidenceInterval, IndexSource, SeededIndexSource};
pub use error::{RateError, Result};
pub use estimator::{point_estimate, EstimatorMode, RateTarget};
pub use outcome::{OutcomeTag, ResultsBatch, TrialOutcome};

// In a file like src/profiling.rs
#[cfg(feature = "flm")]
pub use flame;

// mock crate with no-op functions when not profiling
#[cfg(not(feature = "flm"))]
pub mod flame {
    use std::io::Write;

    #[derive(Debug, Clone)]
    pub struct Span {
        pub name: String,
        pub delta: u64,
        pub children: Vec<Span>,
    }
    // Define no-op versions of the flame functions you use
    pub fn start(_name: &str) {}
    pub fn end(_name: &str) {}
    pub fn spans() -> Vec<Span> {
        vec![]
    }
    pub fn dump_html<W: Write>(_out: W) -> std::io::Result<()> {
        Ok(())
    }
}
