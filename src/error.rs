use std::path::PathBuf;

use thiserror::Error;

use crate::state_machine::{State, VerificationTier};

#[derive(Debug, Error)]
pub enum AbacusError {
    #[error("No active bead. Run `abacus init <bead_id>` first.")]
    NotInitialized,

    #[error("Invalid state: {0}")]
    UnknownState(String),

    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: State, to: State },

    #[error("Cannot complete an implementation bead straight from execute. Run `abacus verify` first.")]
    VerifyRequired,

    #[error("Cannot complete: verification not passed (tier {tier})")]
    IntegrityGate { tier: VerificationTier },

    #[error("Incomplete dependencies: {}. Complete these beads first.", .0.join(", "))]
    DependenciesUnmet(Vec<String>),

    #[error("Bead requires {expected}, running {actual}. Switch models before proceeding.")]
    ModelMismatch { expected: String, actual: String },

    #[error("No verification command provided")]
    MissingVerificationCommand,

    #[error("Command not found (exit 127): {0}")]
    CommandNotFound(String),

    #[error("Phase {0:02} is not closed yet. Close it before starting the next phase.")]
    PhaseNotClosed(u32),

    #[error("Invalid {field} in bead definition: {value}")]
    InvalidBeadField { field: &'static str, value: String },

    #[error("Ledger not found: {}", .0.display())]
    LedgerNotFound(PathBuf),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}
