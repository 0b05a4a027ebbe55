//! Bead definition files.
//!
//! A bead definition is a small markdown document carrying a handful of
//! machine-read lines next to the prose:
//!
//! ```text
//! # Bead 06-01: Wire up the session store
//! **Goal**: persist sessions across restarts
//! model: sonnet
//! type: implementation
//! verification_tier: AUTO
//! verification_cmd: "cargo test session"
//! depends_on: [05-01, 05-02]
//! <context_files>
//! mandatory:
//!   - src/session.rs
//! reference:
//!   - docs/sessions.md
//! </context_files>
//! ```
//!
//! Parsed with an explicit line scanner into a typed [`BeadSpec`]. Unknown
//! keys and prose are ignored; invalid values for the closed fields are
//! errors.

use std::path::{Path, PathBuf};

use crate::error::AbacusError;
use crate::state_machine::{BeadType, VerificationTier};

/// Typed view of a bead definition file. Absent fields stay `None`/empty and
/// are defaulted by the state machine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BeadSpec {
    pub title: Option<String>,
    pub goal: Option<String>,
    pub model: Option<String>,
    pub verification_cmd: Option<String>,
    pub bead_type: Option<BeadType>,
    pub verification_tier: Option<VerificationTier>,
    pub depends_on: Vec<String>,
    pub scope_files: Vec<PathBuf>,
}

/// Scanner position while walking the document.
enum Section {
    Body,
    ContextFiles { mandatory: bool },
}

impl BeadSpec {
    pub fn load(path: &Path) -> Result<Self, AbacusError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, AbacusError> {
        let mut spec = BeadSpec::default();
        let mut section = Section::Body;

        for line in content.lines() {
            let trimmed = line.trim();

            match section {
                Section::ContextFiles { mandatory } => {
                    if trimmed == "</context_files>" {
                        section = Section::Body;
                    } else if trimmed == "mandatory:" {
                        section = Section::ContextFiles { mandatory: true };
                    } else if trimmed == "reference:" {
                        section = Section::ContextFiles { mandatory: false };
                    } else if mandatory
                        && let Some(entry) = trimmed.strip_prefix("- ")
                    {
                        let entry = entry.trim();
                        // Skip template placeholders and the ledger itself.
                        if !entry.starts_with('[') && !entry.contains("ledger.json") {
                            spec.scope_files.push(PathBuf::from(entry));
                        }
                    }
                }
                Section::Body => {
                    if trimmed == "<context_files>" {
                        section = Section::ContextFiles { mandatory: false };
                        continue;
                    }
                    if let Some(heading) = trimmed.strip_prefix('#') {
                        let heading = heading.trim_start();
                        if spec.title.is_none()
                            && heading.starts_with("Bead ")
                            && let Some((_, title)) = heading.split_once(':')
                        {
                            spec.title = Some(title.trim().to_string());
                        }
                        continue;
                    }
                    if let Some(rest) = trimmed.strip_prefix("**Goal**") {
                        let goal = rest.trim_start().trim_start_matches(':').trim();
                        if spec.goal.is_none() && !goal.is_empty() {
                            spec.goal = Some(goal.to_string());
                        }
                        continue;
                    }
                    if let Some((key, value)) = trimmed.split_once(':') {
                        spec.apply_field(key.trim(), value.trim())?;
                    }
                }
            }
        }

        Ok(spec)
    }

    fn apply_field(&mut self, key: &str, value: &str) -> Result<(), AbacusError> {
        let value = unquote(value);
        if value.is_empty() {
            return Ok(());
        }
        match key.to_ascii_lowercase().as_str() {
            "model" => self.model = Some(value.to_lowercase()),
            "verification_cmd" => self.verification_cmd = Some(value.to_string()),
            "type" => {
                self.bead_type = Some(value.parse().map_err(|()| {
                    AbacusError::InvalidBeadField {
                        field: "type",
                        value: value.to_string(),
                    }
                })?);
            }
            "verification_tier" => {
                self.verification_tier = Some(value.parse().map_err(|()| {
                    AbacusError::InvalidBeadField {
                        field: "verification_tier",
                        value: value.to_string(),
                    }
                })?);
            }
            "depends_on" => {
                let Some(list) = value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) else {
                    return Err(AbacusError::InvalidBeadField {
                        field: "depends_on",
                        value: value.to_string(),
                    });
                };
                self.depends_on = list
                    .split(',')
                    .map(|dep| unquote(dep.trim()).to_string())
                    .filter(|dep| !dep.is_empty())
                    .collect();
            }
            _ => {} // prose or an unknown key
        }
        Ok(())
    }
}

/// Strip one layer of matching single or double quotes.
fn unquote(value: &str) -> &str {
    let value = value.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"# Bead 06-01: Wire up the session store

**Goal**: persist sessions across restarts

model: Sonnet
type: implementation
verification_tier: AUTO
verification_cmd: "cargo test session"
depends_on: [05-01, 05-02-followup]

<context_files>
mandatory:
  - src/session.rs
  - src/store.rs
  - [add more files here]
  - .abacus/ledger.json
reference:
  - docs/sessions.md
</context_files>

Some free-form notes: these lines are ignored.
"#;

    #[test]
    fn parses_all_fields() {
        let spec = BeadSpec::parse(FULL).unwrap();
        assert_eq!(spec.title.as_deref(), Some("Wire up the session store"));
        assert_eq!(spec.goal.as_deref(), Some("persist sessions across restarts"));
        assert_eq!(spec.model.as_deref(), Some("sonnet"));
        assert_eq!(spec.bead_type, Some(BeadType::Implementation));
        assert_eq!(spec.verification_tier, Some(VerificationTier::Auto));
        assert_eq!(spec.verification_cmd.as_deref(), Some("cargo test session"));
        assert_eq!(spec.depends_on, vec!["05-01", "05-02-followup"]);
    }

    #[test]
    fn scope_takes_mandatory_entries_only() {
        let spec = BeadSpec::parse(FULL).unwrap();
        assert_eq!(
            spec.scope_files,
            vec![PathBuf::from("src/session.rs"), PathBuf::from("src/store.rs")]
        );
    }

    #[test]
    fn empty_document_is_all_defaults() {
        let spec = BeadSpec::parse("").unwrap();
        assert_eq!(spec, BeadSpec::default());
    }

    #[test]
    fn unquoted_command_is_accepted() {
        let spec = BeadSpec::parse("verification_cmd: cargo test\n").unwrap();
        assert_eq!(spec.verification_cmd.as_deref(), Some("cargo test"));
    }

    #[test]
    fn spike_type_parses() {
        let spec = BeadSpec::parse("type: Spike\n").unwrap();
        assert_eq!(spec.bead_type, Some(BeadType::Spike));
    }

    #[test]
    fn invalid_type_is_an_error() {
        let err = BeadSpec::parse("type: experiment\n").unwrap_err();
        assert!(matches!(
            err,
            AbacusError::InvalidBeadField { field: "type", .. }
        ));
    }

    #[test]
    fn invalid_tier_is_an_error() {
        let err = BeadSpec::parse("verification_tier: SOMETIMES\n").unwrap_err();
        assert!(matches!(
            err,
            AbacusError::InvalidBeadField {
                field: "verification_tier",
                ..
            }
        ));
    }

    #[test]
    fn depends_on_requires_bracket_list() {
        let err = BeadSpec::parse("depends_on: 05-01\n").unwrap_err();
        assert!(matches!(
            err,
            AbacusError::InvalidBeadField {
                field: "depends_on",
                ..
            }
        ));
    }

    #[test]
    fn empty_depends_on_list_is_empty() {
        let spec = BeadSpec::parse("depends_on: []\n").unwrap();
        assert!(spec.depends_on.is_empty());
    }

    #[test]
    fn quoted_dependency_ids_are_unquoted() {
        let spec = BeadSpec::parse("depends_on: [\"05-01\", '05-02']\n").unwrap();
        assert_eq!(spec.depends_on, vec!["05-01", "05-02"]);
    }

    #[test]
    fn prose_with_colons_is_ignored() {
        let spec = BeadSpec::parse("Note: remember to check http://example.com\n").unwrap();
        assert_eq!(spec, BeadSpec::default());
    }

    #[test]
    fn load_reads_from_disk() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("06-01.md");
        std::fs::write(&path, "model: opus\n").unwrap();

        let spec = BeadSpec::load(&path).unwrap();
        assert_eq!(spec.model.as_deref(), Some("opus"));
    }
}
