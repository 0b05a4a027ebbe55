use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::context::BeadType;

/// Lifecycle states of a bead.
///
/// Implementation beads flow `draft -> execute -> verify -> complete`, with
/// `recover` holding failed verification attempts and `failed` ending a bead
/// whose retry budget ran out. Spike beads may complete straight from
/// `execute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    Draft,
    Execute,
    Verify,
    Recover,
    Complete,
    Failed,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Draft => write!(f, "draft"),
            State::Execute => write!(f, "execute"),
            State::Verify => write!(f, "verify"),
            State::Recover => write!(f, "recover"),
            State::Complete => write!(f, "complete"),
            State::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for State {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "draft" => Ok(State::Draft),
            "execute" => Ok(State::Execute),
            "verify" => Ok(State::Verify),
            "recover" => Ok(State::Recover),
            "complete" => Ok(State::Complete),
            "failed" => Ok(State::Failed),
            _ => Err(()),
        }
    }
}

impl State {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Complete | State::Failed)
    }

    /// The transition table. `execute -> complete` is the spike-only
    /// shortcut; every other edge is independent of the bead type.
    pub fn can_transition_to(self, target: State, bead_type: BeadType) -> bool {
        match (self, target) {
            (State::Draft, State::Execute) => true,
            (State::Execute, State::Verify) => true,
            (State::Execute, State::Complete) => bead_type == BeadType::Spike,
            (State::Verify, State::Complete | State::Recover) => true,
            (State::Recover, State::Execute | State::Failed) => true,
            _ => false,
        }
    }
}
