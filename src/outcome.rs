use std::fmt;
use std::str::FromStr;

use crate::error::{RateError, Result};

/// How a single simulated trajectory ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeTag {
    /// Reached the forward (hybridized) stop state.
    Success,
    /// Reached the reverse (dissociated) stop state.
    Failure,
    /// Ran out of simulated time before any stop state.
    Timeout,
    /// The initial state had no moves available, so no collision happened.
    NoInitialMoves,
}

impl FromStr for OutcomeTag {
    type Err = RateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "SUCCESS" | "success" | "forward" => Ok(OutcomeTag::Success),
            "FAILURE" | "failure" | "reverse" => Ok(OutcomeTag::Failure),
            "timeout" | "TIMEOUT" => Ok(OutcomeTag::Timeout),
            "noinitial" | "NO_INITIAL_MOVES" => Ok(OutcomeTag::NoInitialMoves),
            other => Err(RateError::invalid(format!(
                "unrecognized outcome tag '{other}'"
            ))),
        }
    }
}

impl fmt::Display for OutcomeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutcomeTag::Success => "SUCCESS",
            OutcomeTag::Failure => "FAILURE",
            OutcomeTag::Timeout => "timeout",
            OutcomeTag::NoInitialMoves => "noinitial",
        };
        write!(f, "{s}")
    }
}

/// The result of one trajectory.
///
/// In first-step mode `time` is the unimolecular time from the initial
/// collision to the stop state and `collision_rate` is the bimolecular join
/// flux (/M/s) of the sampled initial state. In first-passage mode `time` is
/// the full first-passage time and `collision_rate` is unused.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialOutcome {
    pub tag: OutcomeTag,
    pub collision_rate: f64,
    pub time: f64,
}

impl TrialOutcome {
    pub fn new(tag: OutcomeTag, collision_rate: f64, time: f64) -> Result<Self> {
        if !collision_rate.is_finite() || collision_rate < 0.0 {
            return Err(RateError::invalid(format!(
                "collision rate must be finite and non-negative, got {collision_rate}"
            )));
        }
        if !time.is_finite() || time < 0.0 {
            return Err(RateError::invalid(format!(
                "trial time must be finite and non-negative, got {time}"
            )));
        }
        Ok(TrialOutcome {
            tag,
            collision_rate,
            time,
        })
    }

    /// Builds an outcome from the simulator's string tag.
    pub fn parse(tag: &str, collision_rate: f64, time: f64) -> Result<Self> {
        Self::new(tag.parse()?, collision_rate, time)
    }

    pub fn is_success(&self) -> bool {
        self.tag == OutcomeTag::Success
    }
}

/// Trial outcomes from one simulation run, all under identical parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultsBatch {
    trials: Vec<TrialOutcome>,
}

impl ResultsBatch {
    pub fn new(trials: Vec<TrialOutcome>) -> Self {
        ResultsBatch { trials }
    }

    /// Zips parallel arrays of tags, collision rates and times, the layout the
    /// simulator hands back.
    pub fn from_columns(tags: &[String], collision_rates: &[f64], times: &[f64]) -> Result<Self> {
        if tags.len() != collision_rates.len() || tags.len() != times.len() {
            return Err(RateError::invalid(format!(
                "column lengths differ: {} tags, {} collision rates, {} times",
                tags.len(),
                collision_rates.len(),
                times.len()
            )));
        }
        let trials = tags
            .iter()
            .zip(collision_rates)
            .zip(times)
            .map(|((tag, &rate), &time)| TrialOutcome::parse(tag, rate, time))
            .collect::<Result<Vec<_>>>()?;
        Ok(ResultsBatch { trials })
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    pub fn trials(&self) -> &[TrialOutcome] {
        &self.trials
    }

    pub fn get(&self, index: usize) -> Option<&TrialOutcome> {
        self.trials.get(index)
    }

    pub fn count(&self, tag: OutcomeTag) -> usize {
        self.trials.iter().filter(|t| t.tag == tag).count()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TrialOutcome> {
        self.trials.iter()
    }

    /// Replaces the contents, keeping the allocation.
    pub(crate) fn refill<I: IntoIterator<Item = TrialOutcome>>(&mut self, trials: I) {
        self.trials.clear();
        self.trials.extend(trials);
    }
}

impl FromIterator<TrialOutcome> for ResultsBatch {
    fn from_iter<I: IntoIterator<Item = TrialOutcome>>(iter: I) -> Self {
        ResultsBatch {
            trials: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ResultsBatch {
    type Item = &'a TrialOutcome;
    type IntoIter = std::slice::Iter<'a, TrialOutcome>;

    fn into_iter(self) -> Self::IntoIter {
        self.trials.iter()
    }
}

impl fmt::Display for ResultsBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} trials: {} successes, {} failures, {} timeouts, {} without initial moves",
            self.len(),
            self.count(OutcomeTag::Success),
            self.count(OutcomeTag::Failure),
            self.count(OutcomeTag::Timeout),
            self.count(OutcomeTag::NoInitialMoves),
        )
    }
}
