use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::State;
use crate::error::AbacusError;
use crate::persist;
use crate::ui;

/// Marker written into the persisted context so humans leave it alone.
const EDIT_WARNING: &str = "Managed by abacus - never edit by hand";

/// Kind of work a bead represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BeadType {
    #[default]
    Implementation,
    Spike,
}

impl fmt::Display for BeadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BeadType::Implementation => write!(f, "implementation"),
            BeadType::Spike => write!(f, "spike"),
        }
    }
}

impl FromStr for BeadType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "implementation" => Ok(BeadType::Implementation),
            "spike" => Ok(BeadType::Spike),
            _ => Err(()),
        }
    }
}

/// How completion of a bead is verified: automatically, by a manual
/// checklist, or not at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerificationTier {
    Auto,
    Manual,
    None,
}

impl fmt::Display for VerificationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationTier::Auto => write!(f, "AUTO"),
            VerificationTier::Manual => write!(f, "MANUAL"),
            VerificationTier::None => write!(f, "NONE"),
        }
    }
}

impl FromStr for VerificationTier {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "AUTO" => Ok(VerificationTier::Auto),
            "MANUAL" => Ok(VerificationTier::Manual),
            "NONE" => Ok(VerificationTier::None),
            _ => Err(()),
        }
    }
}

impl VerificationTier {
    /// Default tier when the bead definition names none: spikes skip
    /// verification, everything else verifies automatically.
    pub fn default_for(bead_type: BeadType) -> Self {
        match bead_type {
            BeadType::Spike => VerificationTier::None,
            BeadType::Implementation => VerificationTier::Auto,
        }
    }
}

/// Persistent execution context of the active bead. Exactly one exists at a
/// time, from `init` until `reset` or the next `init`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeadContext {
    pub bead_id: String,
    pub current_state: State,
    pub retry_count: u32,
    /// HEAD at `init` time; immutable for the life of the context and used
    /// as the rollback target.
    pub initial_commit_sha: String,
    #[serde(default)]
    pub verification_cmd: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Set true only by a passing verification run.
    #[serde(default)]
    pub last_verification_passed: bool,
    #[serde(default)]
    pub bead_type: BeadType,
    pub verification_tier: VerificationTier,
    #[serde(default)]
    pub bead_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BeadContext {
    pub fn new(
        bead_id: String,
        initial_commit_sha: String,
        bead_type: BeadType,
        verification_tier: VerificationTier,
    ) -> Self {
        let now = Utc::now();
        Self {
            bead_id,
            current_state: State::Draft,
            retry_count: 0,
            initial_commit_sha,
            verification_cmd: None,
            model: None,
            last_verification_passed: false,
            bead_type,
            verification_tier,
            bead_path: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Phase component of a `PHASE-SEQ` bead id ("06-01" -> 6).
pub fn phase_number(bead_id: &str) -> Option<u32> {
    let (phase, _) = bead_id.split_once('-')?;
    phase.parse().ok()
}

/// On-disk shape of the context, tolerant of fields that did not exist when
/// the file was written. [`StoredContext::into_context`] is the one-shot
/// migration that fills current-version defaults.
#[derive(Deserialize)]
struct StoredContext {
    bead_id: String,
    current_state: State,
    retry_count: u32,
    initial_commit_sha: String,
    #[serde(default)]
    verification_cmd: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    last_verification_passed: bool,
    #[serde(default)]
    bead_type: BeadType,
    #[serde(default)]
    verification_tier: Option<VerificationTier>,
    #[serde(default)]
    bead_path: Option<PathBuf>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

impl StoredContext {
    fn into_context(self) -> BeadContext {
        let now = Utc::now();
        let verification_tier = self
            .verification_tier
            .unwrap_or_else(|| VerificationTier::default_for(self.bead_type));
        BeadContext {
            bead_id: self.bead_id,
            current_state: self.current_state,
            retry_count: self.retry_count,
            initial_commit_sha: self.initial_commit_sha,
            verification_cmd: self.verification_cmd,
            model: self.model,
            last_verification_passed: self.last_verification_passed,
            bead_type: self.bead_type,
            verification_tier,
            bead_path: self.bead_path,
            created_at: self.created_at.unwrap_or(now),
            updated_at: self.updated_at.unwrap_or(now),
        }
    }
}

/// Loads, saves and clears the persisted context at a configured path.
pub struct ContextStore {
    path: PathBuf,
}

impl ContextStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load the persisted context. A corrupted or unreadable file is
    /// reported and treated as if no context exists.
    pub fn load(&self) -> Option<BeadContext> {
        if !self.path.exists() {
            return None;
        }
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) => {
                ui::warn(format!("State file unreadable: {err}"));
                return None;
            }
        };
        match serde_json::from_str::<StoredContext>(&raw) {
            Ok(stored) => Some(stored.into_context()),
            Err(err) => {
                ui::warn(format!("State file corrupted: {err}"));
                None
            }
        }
    }

    /// Persist the context atomically, tagged with the do-not-edit marker.
    pub fn save(&self, context: &BeadContext) -> Result<(), AbacusError> {
        #[derive(Serialize)]
        struct Tagged<'a> {
            #[serde(rename = "_warning")]
            warning: &'static str,
            #[serde(flatten)]
            context: &'a BeadContext,
        }

        let json = serde_json::to_string_pretty(&Tagged {
            warning: EDIT_WARNING,
            context,
        })?;
        persist::write_atomic(&self.path, &json)?;
        Ok(())
    }

    /// Remove the persisted context if present.
    pub fn clear(&self) -> Result<(), AbacusError> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}
