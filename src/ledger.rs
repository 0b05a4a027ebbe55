//! The durable project ledger and its synchronizer.
//!
//! The ledger is the cross-session record that external tooling (status
//! displays, dashboards) reads: project metadata, the phase roadmap, one
//! entry per bead, and the active-bead pointer. [`LedgerSync`] projects the
//! state machine context onto it after every state change; it never drives
//! the machine in the other direction.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::AbacusError;
use crate::persist;
use crate::state_machine::{BeadContext, State, phase_number};
use crate::ui;

/// Status of a bead as recorded in the ledger: `pending` before work starts,
/// a mirror of the machine state while in progress, `complete`/`failed` at
/// the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BeadStatus {
    Pending,
    Draft,
    Execute,
    Verify,
    Recover,
    Complete,
    Failed,
}

impl From<State> for BeadStatus {
    fn from(state: State) -> Self {
        match state {
            State::Draft => BeadStatus::Draft,
            State::Execute => BeadStatus::Execute,
            State::Verify => BeadStatus::Verify,
            State::Recover => BeadStatus::Recover,
            State::Complete => BeadStatus::Complete,
            State::Failed => BeadStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub number: u32,
    pub name: String,
    pub status: PhaseStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeadRecord {
    pub status: BeadStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub phase: String,
}

/// Bead entries in insertion order, serialized as a JSON object keyed by
/// bead id. Order matters: auto-queueing picks the first pending entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BeadTable(Vec<(String, BeadRecord)>);

impl BeadTable {
    #[allow(dead_code)]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<&BeadRecord> {
        self.0
            .iter()
            .find(|(entry_id, _)| entry_id == id)
            .map(|(_, record)| record)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut BeadRecord> {
        self.0
            .iter_mut()
            .find(|(entry_id, _)| entry_id == id)
            .map(|(_, record)| record)
    }

    /// Insert or replace, preserving the position of an existing entry.
    pub fn insert(&mut self, id: String, record: BeadRecord) {
        match self.get_mut(&id) {
            Some(existing) => *existing = record,
            None => self.0.push((id, record)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BeadRecord)> {
        self.0.iter().map(|(id, record)| (id.as_str(), record))
    }

    /// First bead, in insertion order, still waiting to be worked.
    pub fn first_pending(&self) -> Option<&str> {
        self.0
            .iter()
            .find(|(_, record)| record.status == BeadStatus::Pending)
            .map(|(id, _)| id.as_str())
    }
}

impl Serialize for BeadTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (id, record) in &self.0 {
            map.serialize_entry(id, record)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for BeadTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = BeadTable;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of bead id to bead record")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<BeadTable, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((id, record)) = access.next_entry::<String, BeadRecord>()? {
                    entries.push((id, record));
                }
                Ok(BeadTable(entries))
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}

/// The durable project record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    pub project: ProjectInfo,
    #[serde(default)]
    pub roadmap: Vec<PhaseRecord>,
    #[serde(default)]
    pub beads: BeadTable,
    #[serde(default)]
    pub active_bead: Option<String>,
}

impl Ledger {
    pub fn load(path: &Path) -> Result<Self, AbacusError> {
        if !path.exists() {
            return Err(AbacusError::LedgerNotFound(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), AbacusError> {
        let json = serde_json::to_string_pretty(self)?;
        persist::write_atomic(path, &json)?;
        Ok(())
    }

    pub fn is_phase_closed(&self, number: u32) -> bool {
        self.roadmap
            .iter()
            .any(|phase| phase.number == number && phase.status == PhaseStatus::Closed)
    }

    /// Structural consistency check. Returns a list of problems; empty means
    /// the ledger is sound.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if let Some(active) = &self.active_bead
            && !self.beads.contains(active)
        {
            problems.push(format!("active bead {active} has no entry in the bead table"));
        }

        for (id, record) in self.beads.iter() {
            let known = self
                .roadmap
                .iter()
                .any(|phase| format!("{:02}", phase.number) == record.phase);
            if !known {
                problems.push(format!("bead {id} references unknown phase {}", record.phase));
            }
        }

        problems
    }
}

/// Projects the machine context onto the persisted ledger.
pub struct LedgerSync {
    path: PathBuf,
    max_retries: u32,
}

impl LedgerSync {
    pub fn new(path: PathBuf, max_retries: u32) -> Self {
        Self { path, max_retries }
    }

    /// Idempotent projection of `context` onto the ledger file. A missing or
    /// malformed ledger is an error and leaves the file untouched.
    pub fn sync(&self, context: &BeadContext) -> Result<(), AbacusError> {
        let mut ledger = Ledger::load(&self.path)?;
        let state = context.current_state;
        let bead_id = &context.bead_id;

        let previous = ledger.beads.get(bead_id).map(|record| record.status);
        if previous.is_none() {
            ui::warn(format!("Bead {bead_id} is not in the ledger, adding entry"));
            ledger.beads.insert(
                bead_id.clone(),
                BeadRecord {
                    status: state.into(),
                    model: context.model.clone(),
                    phase: phase_of_id(bead_id),
                },
            );
        } else if let Some(record) = ledger.beads.get_mut(bead_id) {
            record.status = state.into();
        }
        if state == State::Complete && previous != Some(BeadStatus::Complete) {
            ui::ok(format!("Marked bead {bead_id} complete in ledger"));
        }

        if state.is_terminal() {
            let next = ledger.beads.first_pending().map(str::to_string);

            if state == State::Complete
                && let Some(finished_phase) = phase_number(bead_id)
                && next.as_deref().and_then(phase_number) != Some(finished_phase)
            {
                ui::ok(format!(
                    "Phase {finished_phase:02} complete: all beads verified and committed"
                ));
                ui::detail("Close the phase before planning the next one");
            }

            match &next {
                Some(id) => ui::ok(format!("Auto-queued: bead {id}")),
                None => ui::detail("No pending beads remain"),
            }
            ledger.active_bead = next;
        } else {
            ledger.active_bead = Some(bead_id.clone());
            if context.retry_count > 0 {
                ui::detail(format!("Retry {}/{}", context.retry_count, self.max_retries));
            }
        }

        ledger.save(&self.path)?;
        ui::ok(format!("Ledger synced: bead {bead_id} -> {state}"));
        Ok(())
    }
}

/// Phase label of a bead id, as recorded in ledger entries ("06-01" -> "06").
fn phase_of_id(bead_id: &str) -> String {
    bead_id.split('-').next().unwrap_or(bead_id).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::{BeadType, VerificationTier};
    use tempfile::TempDir;

    fn record(status: BeadStatus, phase: &str) -> BeadRecord {
        BeadRecord {
            status,
            model: None,
            phase: phase.to_string(),
        }
    }

    fn sample_ledger() -> Ledger {
        let mut beads = BeadTable::new();
        beads.insert("01-01".to_string(), record(BeadStatus::Pending, "01"));
        beads.insert("01-02".to_string(), record(BeadStatus::Pending, "01"));
        beads.insert("02-01".to_string(), record(BeadStatus::Pending, "02"));
        Ledger {
            project: ProjectInfo {
                name: "demo".to_string(),
                description: "demo project".to_string(),
            },
            roadmap: vec![
                PhaseRecord {
                    number: 1,
                    name: "Foundation".to_string(),
                    status: PhaseStatus::Open,
                },
                PhaseRecord {
                    number: 2,
                    name: "Features".to_string(),
                    status: PhaseStatus::Open,
                },
            ],
            beads,
            active_bead: Some("01-01".to_string()),
        }
    }

    fn context_in(state: State, bead_id: &str) -> BeadContext {
        let mut context = BeadContext::new(
            bead_id.to_string(),
            "0123456789abcdef0123456789abcdef01234567".to_string(),
            BeadType::Implementation,
            VerificationTier::Auto,
        );
        context.current_state = state;
        context
    }

    fn sync_in(tmp: &TempDir) -> (LedgerSync, PathBuf) {
        let path = tmp.path().join("ledger.json");
        sample_ledger().save(&path).unwrap();
        (LedgerSync::new(path.clone(), 3), path)
    }

    // --- BeadTable tests ---

    #[test]
    fn bead_table_preserves_insertion_order() {
        let ledger = sample_ledger();
        let ids: Vec<&str> = ledger.beads.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["01-01", "01-02", "02-01"]);

        let json = serde_json::to_string(&ledger).unwrap();
        let reloaded: Ledger = serde_json::from_str(&json).unwrap();
        let ids: Vec<&str> = reloaded.beads.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["01-01", "01-02", "02-01"]);
    }

    #[test]
    fn bead_table_insert_replaces_in_place() {
        let mut table = BeadTable::new();
        table.insert("01-01".to_string(), record(BeadStatus::Pending, "01"));
        table.insert("01-02".to_string(), record(BeadStatus::Pending, "01"));
        table.insert("01-01".to_string(), record(BeadStatus::Complete, "01"));

        assert_eq!(table.len(), 2);
        let ids: Vec<&str> = table.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["01-01", "01-02"]);
        assert_eq!(table.get("01-01").unwrap().status, BeadStatus::Complete);
    }

    #[test]
    fn first_pending_respects_order_and_status() {
        let mut table = BeadTable::new();
        table.insert("01-01".to_string(), record(BeadStatus::Complete, "01"));
        table.insert("01-02".to_string(), record(BeadStatus::Pending, "01"));
        table.insert("01-03".to_string(), record(BeadStatus::Pending, "01"));

        assert_eq!(table.first_pending(), Some("01-02"));
    }

    #[test]
    fn first_pending_empty_when_none_left() {
        let mut table = BeadTable::new();
        table.insert("01-01".to_string(), record(BeadStatus::Failed, "01"));
        assert_eq!(table.first_pending(), None);
    }

    // --- Ledger tests ---

    #[test]
    fn load_missing_ledger_is_a_distinct_error() {
        let tmp = TempDir::new().unwrap();
        let err = Ledger::load(&tmp.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, AbacusError::LedgerNotFound(_)));
    }

    #[test]
    fn load_malformed_ledger_reports_json_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ledger.json");
        std::fs::write(&path, "{ broken").unwrap();

        let err = Ledger::load(&path).unwrap_err();
        assert!(matches!(err, AbacusError::Json(_)));
    }

    #[test]
    fn save_leaves_no_temp_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ledger.json");
        sample_ledger().save(&path).unwrap();
        assert!(path.exists());
        assert!(!tmp.path().join("ledger.tmp").exists());
    }

    #[test]
    fn is_phase_closed_checks_roadmap() {
        let mut ledger = sample_ledger();
        assert!(!ledger.is_phase_closed(1));
        ledger.roadmap[0].status = PhaseStatus::Closed;
        assert!(ledger.is_phase_closed(1));
        assert!(!ledger.is_phase_closed(9));
    }

    #[test]
    fn validate_flags_unknown_active_bead() {
        let mut ledger = sample_ledger();
        ledger.active_bead = Some("09-09".to_string());
        let problems = ledger.validate();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("09-09"));
    }

    #[test]
    fn validate_flags_unknown_phase() {
        let mut ledger = sample_ledger();
        ledger
            .beads
            .insert("07-01".to_string(), record(BeadStatus::Pending, "07"));
        let problems = ledger.validate();
        assert!(problems.iter().any(|p| p.contains("unknown phase 07")));
    }

    #[test]
    fn validate_accepts_sound_ledger() {
        assert!(sample_ledger().validate().is_empty());
    }

    // --- LedgerSync tests ---

    #[test]
    fn sync_in_progress_mirrors_state_and_sets_active() {
        let tmp = TempDir::new().unwrap();
        let (sync, path) = sync_in(&tmp);

        sync.sync(&context_in(State::Execute, "01-02")).unwrap();

        let ledger = Ledger::load(&path).unwrap();
        assert_eq!(ledger.active_bead.as_deref(), Some("01-02"));
        assert_eq!(ledger.beads.get("01-02").unwrap().status, BeadStatus::Execute);
        // Untouched entries keep their status.
        assert_eq!(ledger.beads.get("01-01").unwrap().status, BeadStatus::Pending);
    }

    #[test]
    fn sync_complete_marks_entry_and_advances_active() {
        let tmp = TempDir::new().unwrap();
        let (sync, path) = sync_in(&tmp);

        sync.sync(&context_in(State::Complete, "01-01")).unwrap();

        let ledger = Ledger::load(&path).unwrap();
        assert_eq!(ledger.beads.get("01-01").unwrap().status, BeadStatus::Complete);
        assert_eq!(ledger.active_bead.as_deref(), Some("01-02"));
    }

    #[test]
    fn sync_failed_advances_active_without_completing() {
        let tmp = TempDir::new().unwrap();
        let (sync, path) = sync_in(&tmp);

        sync.sync(&context_in(State::Failed, "01-01")).unwrap();

        let ledger = Ledger::load(&path).unwrap();
        assert_eq!(ledger.beads.get("01-01").unwrap().status, BeadStatus::Failed);
        assert_eq!(ledger.active_bead.as_deref(), Some("01-02"));
    }

    #[test]
    fn sync_terminal_with_no_pending_clears_active() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ledger.json");
        let mut ledger = sample_ledger();
        ledger.beads.get_mut("01-02").unwrap().status = BeadStatus::Complete;
        ledger.beads.get_mut("02-01").unwrap().status = BeadStatus::Complete;
        ledger.save(&path).unwrap();
        let sync = LedgerSync::new(path.clone(), 3);

        sync.sync(&context_in(State::Complete, "01-01")).unwrap();

        let ledger = Ledger::load(&path).unwrap();
        assert_eq!(ledger.active_bead, None);
    }

    #[test]
    fn sync_unknown_bead_creates_entry() {
        let tmp = TempDir::new().unwrap();
        let (sync, path) = sync_in(&tmp);

        sync.sync(&context_in(State::Execute, "09-01")).unwrap();

        let ledger = Ledger::load(&path).unwrap();
        let entry = ledger.beads.get("09-01").unwrap();
        assert_eq!(entry.status, BeadStatus::Execute);
        assert_eq!(entry.phase, "09");
    }

    #[test]
    fn sync_twice_is_byte_identical() {
        let tmp = TempDir::new().unwrap();
        let (sync, path) = sync_in(&tmp);
        let context = context_in(State::Execute, "01-01");

        sync.sync(&context).unwrap();
        let first = std::fs::read(&path).unwrap();
        sync.sync(&context).unwrap();
        let second = std::fs::read(&path).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn sync_missing_ledger_fails_without_creating_it() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ledger.json");
        let sync = LedgerSync::new(path.clone(), 3);

        let err = sync.sync(&context_in(State::Execute, "01-01")).unwrap_err();
        assert!(matches!(err, AbacusError::LedgerNotFound(_)));
        assert!(!path.exists());
    }

    #[test]
    fn sync_malformed_ledger_leaves_file_untouched() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ledger.json");
        std::fs::write(&path, "{ broken").unwrap();
        let sync = LedgerSync::new(path.clone(), 3);

        let err = sync.sync(&context_in(State::Execute, "01-01")).unwrap_err();
        assert!(matches!(err, AbacusError::Json(_)));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ broken");
    }
}
