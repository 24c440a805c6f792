//! The four swarm coordination patterns, per spec §4.10.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a swarm's workers are coordinated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwarmPattern {
    /// All workers run simultaneously on the original subtask.
    Parallel,
    /// Workers run sequentially; each sees the previous worker's output.
    Pipeline,
    /// Workers run in rounds, each seeing every other's previous round.
    Debate,
    /// One author drafts, reviewers critique, the author revises.
    Review,
}

impl fmt::Display for SwarmPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SwarmPattern::Parallel => "parallel",
            SwarmPattern::Pipeline => "pipeline",
            SwarmPattern::Debate => "debate",
            SwarmPattern::Review => "review",
        };
        f.write_str(s)
    }
}

/// Returned when a pattern string doesn't match one of the four known
/// coordination patterns.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid swarm pattern")]
pub struct SwarmPatternParseError;

impl FromStr for SwarmPattern {
    type Err = SwarmPatternParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "parallel" => Ok(SwarmPattern::Parallel),
            "pipeline" => Ok(SwarmPattern::Pipeline),
            "debate" => Ok(SwarmPattern::Debate),
            "review" => Ok(SwarmPattern::Review),
            _ => Err(SwarmPatternParseError),
        }
    }
}
