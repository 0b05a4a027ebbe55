//! The bead lifecycle state machine.
//!
//! Owns the persisted [`BeadContext`], guards every transition, runs the
//! verification gate and the bounded-retry circuit breaker, and projects each
//! state change onto the ledger. Version control and command execution are
//! injected capability seams, so the whole lifecycle can be driven by fakes
//! in tests.
//!
//! Each CLI invocation is a fresh process: the machine reloads persisted
//! state on construction and writes it back before returning.

use std::path::{Path, PathBuf};

use chrono::Utc;

use super::context::{BeadContext, BeadType, ContextStore, VerificationTier, phase_number};
use super::state::State;
use crate::bead::BeadSpec;
use crate::config::AbacusConfig;
use crate::error::AbacusError;
use crate::git::VersionControl;
use crate::ledger::{BeadStatus, Ledger, LedgerSync};
use crate::router::ModelTier;
use crate::runner::CommandRunner;
use crate::ui;

/// Arguments accepted by [`BeadMachine::init`].
#[derive(Debug, Clone, Default)]
pub struct InitArgs {
    pub bead_id: String,
    pub verification_cmd: Option<String>,
    pub model: Option<String>,
    pub active_model: Option<String>,
    pub bead_path: Option<PathBuf>,
}

/// Result of a verification run.
#[derive(Debug, Clone, PartialEq)]
pub enum VerifyOutcome {
    /// Command exited 0 and the commit step succeeded. `commit` is the short
    /// hash, absent when the working tree had nothing to commit.
    Passed { commit: Option<String> },
    /// Command failed; the attempt was counted against the retry budget.
    /// `escalated` is set when the circuit breaker tripped to `failed`.
    Failed { exit_code: i32, escalated: bool },
}

impl VerifyOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, VerifyOutcome::Passed { .. })
    }
}

pub struct BeadMachine {
    config: AbacusConfig,
    store: ContextStore,
    ledger: LedgerSync,
    context: Option<BeadContext>,
}

impl BeadMachine {
    /// Create a machine over the configured paths, loading any persisted
    /// context. Corrupted state is discarded with a warning.
    pub fn load(config: AbacusConfig) -> Self {
        let store = ContextStore::new(config.state_file.clone());
        let ledger = LedgerSync::new(config.ledger_file.clone(), config.max_retries);
        let context = store.load();
        Self {
            config,
            store,
            ledger,
            context,
        }
    }

    pub fn context(&self) -> Option<&BeadContext> {
        self.context.as_ref()
    }

    /// Initialize execution of a new bead and auto-transition it to
    /// `execute`. Fails without creating any context when dependencies are
    /// unmet, the previous phase is still open, or the model guard trips.
    pub fn init(
        &mut self,
        vcs: &impl VersionControl,
        args: InitArgs,
    ) -> Result<(), AbacusError> {
        let spec = load_spec(args.bead_path.as_deref())?;

        self.guard_phase_boundary(&args.bead_id)?;
        self.check_dependencies(&spec)?;

        // Bead definition fields override CLI arguments.
        let model = spec
            .model
            .clone()
            .or(args.model.as_deref().map(str::to_lowercase));
        let verification_cmd = spec.verification_cmd.clone().or(args.verification_cmd);
        let bead_type = spec.bead_type.unwrap_or_default();
        let verification_tier = spec
            .verification_tier
            .unwrap_or_else(|| VerificationTier::default_for(bead_type));

        enforce_model_guard(args.active_model.as_deref(), model.as_deref())?;

        let initial_sha = vcs.head_sha()?;
        let mut context = BeadContext::new(
            args.bead_id.clone(),
            initial_sha.clone(),
            bead_type,
            verification_tier,
        );
        context.verification_cmd = verification_cmd;
        context.model = model;
        context.bead_path = args.bead_path;
        self.store.save(&context)?;
        ui::ok(format!(
            "Initialized: bead {} ({})",
            context.bead_id,
            short(&initial_sha)
        ));

        // Draft is observable only transiently: a fresh bead starts
        // executing immediately.
        context.current_state = State::Execute;
        context.updated_at = Utc::now();
        self.store.save(&context)?;
        self.context = Some(context);
        ui::ok("Auto-transitioned to execute");
        self.sync_ledger_soft();

        self.print_summary(&spec, args.active_model.as_deref());
        Ok(())
    }

    /// Transition the active bead to the named state.
    pub fn transition(&mut self, target: &str) -> Result<(), AbacusError> {
        let target: State = target
            .parse()
            .map_err(|()| AbacusError::UnknownState(target.to_string()))?;
        self.transition_to(target)
    }

    /// Transition the active bead, enforcing the table and the integrity
    /// gate. Violations leave both the context and the ledger untouched.
    pub fn transition_to(&mut self, target: State) -> Result<(), AbacusError> {
        let context = self.context.as_ref().ok_or(AbacusError::NotInitialized)?;
        let current = context.current_state;

        if current == State::Execute
            && target == State::Complete
            && context.bead_type != BeadType::Spike
        {
            return Err(AbacusError::VerifyRequired);
        }
        if !current.can_transition_to(target, context.bead_type) {
            return Err(AbacusError::InvalidTransition {
                from: current,
                to: target,
            });
        }
        if target == State::Complete && !context.last_verification_passed {
            if context.verification_tier == VerificationTier::None {
                ui::ok("Verification tier NONE: verification requirement waived");
            } else {
                return Err(AbacusError::IntegrityGate {
                    tier: context.verification_tier,
                });
            }
        }

        self.set_state(target)?;
        ui::ok(format!("Transition: {current} -> {target}"));
        self.sync_ledger_soft();
        Ok(())
    }

    /// Run the verification command and drive the lifecycle from its exit
    /// code. Only this path can set `last_verification_passed`.
    pub fn verify(
        &mut self,
        vcs: &impl VersionControl,
        runner: &impl CommandRunner,
        cmd: Option<&str>,
    ) -> Result<VerifyOutcome, AbacusError> {
        let context = self.context.as_ref().ok_or(AbacusError::NotInitialized)?;
        let cmd = cmd
            .map(str::to_string)
            .or_else(|| context.verification_cmd.clone())
            .ok_or(AbacusError::MissingVerificationCommand)?;

        let spinner = ui::VerifySpinner::start(&cmd);
        let result = runner.run(&cmd);
        spinner.finish();
        let output = result?;

        if output.success() {
            return self.complete_verified(vcs);
        }

        if output.command_not_found() {
            // Environment error: the retry budget stays untouched.
            return Err(AbacusError::CommandNotFound(cmd));
        }

        ui::failure(format!("Verification FAILED (exit {})", output.code));
        let diagnostics = if output.stderr.trim().is_empty() {
            output.stdout.trim()
        } else {
            output.stderr.trim()
        };
        if !diagnostics.is_empty() {
            ui::detail(diagnostics);
        }
        self.record_failed_attempt(output.code)
    }

    /// Hard-reset the working tree to the bead's initial commit and return
    /// the context to `draft`, preserving the retry count.
    pub fn rollback(&mut self, vcs: &impl VersionControl) -> Result<(), AbacusError> {
        let context = self.context.as_ref().ok_or(AbacusError::NotInitialized)?;
        let initial_sha = context.initial_commit_sha.clone();
        ui::warn(format!("Rolling back to {}", short(&initial_sha)));

        // Nothing is persisted until both git operations succeed; on failure
        // the prior context is retained untouched.
        vcs.hard_reset(&initial_sha)?;
        vcs.clean_untracked(&self.config.protected_paths)?;

        let context = self.context.as_mut().ok_or(AbacusError::NotInitialized)?;
        context.current_state = State::Draft;
        context.last_verification_passed = false;
        context.updated_at = Utc::now();
        self.store.save(context)?;
        ui::ok("Rollback complete: state reset to draft, retry count preserved");
        self.sync_ledger_soft();
        Ok(())
    }

    /// Print the current context. Read-only.
    pub fn status(&self) {
        match &self.context {
            Some(context) => ui::print_status(context, self.config.max_retries),
            None => println!("No active bead"),
        }
    }

    /// Unconditionally discard the persisted context.
    pub fn reset(&mut self) -> Result<(), AbacusError> {
        self.store.clear()?;
        self.context = None;
        ui::ok("State cleared");
        Ok(())
    }

    /// Project the current context onto the ledger.
    pub fn sync_ledger(&self) -> Result<(), AbacusError> {
        let context = self.context.as_ref().ok_or(AbacusError::NotInitialized)?;
        self.ledger.sync(context)
    }

    /// Ledger projection after an internal state change. A sync failure is
    /// reported but does not undo the state change that triggered it; only
    /// the explicit `sync-ledger` command surfaces it as a failure exit.
    fn sync_ledger_soft(&self) {
        if let Err(err) = self.sync_ledger() {
            ui::warn(format!("Ledger sync failed: {err}"));
        }
    }

    fn state_is(&self, state: State) -> bool {
        self.context
            .as_ref()
            .is_some_and(|context| context.current_state == state)
    }

    /// Persist a state change. Used by guarded transitions and by the
    /// circuit breaker, which forces `recover`/`failed` outside the table.
    fn set_state(&mut self, target: State) -> Result<(), AbacusError> {
        let context = self.context.as_mut().ok_or(AbacusError::NotInitialized)?;
        context.current_state = target;
        context.updated_at = Utc::now();
        self.store.save(context)?;
        Ok(())
    }

    fn complete_verified(
        &mut self,
        vcs: &impl VersionControl,
    ) -> Result<VerifyOutcome, AbacusError> {
        {
            let context = self.context.as_mut().ok_or(AbacusError::NotInitialized)?;
            context.last_verification_passed = true;
            context.updated_at = Utc::now();
            self.store.save(context)?;
        }
        ui::ok("Verification PASSED");

        let commit = match self.commit_verified(vcs) {
            Ok(commit) => commit,
            Err(err) => {
                // Verification is not complete until the commit lands.
                let context = self.context.as_mut().ok_or(AbacusError::NotInitialized)?;
                context.last_verification_passed = false;
                context.updated_at = Utc::now();
                self.store.save(context)?;
                ui::failure("Auto-commit failed: bead remains in execute");
                ui::detail("Fix the git issue and re-run: abacus verify");
                return Err(err);
            }
        };

        // Walk the remaining table edges; a pass out of recover first
        // returns to execute.
        if self.state_is(State::Recover) {
            self.transition_to(State::Execute)?;
        }
        if self.state_is(State::Execute) {
            self.transition_to(State::Verify)?;
        }
        self.transition_to(State::Complete)?;
        Ok(VerifyOutcome::Passed { commit })
    }

    /// Stage the bead's scope files (or every modified tracked file) and
    /// commit. Returns the short hash, or `None` when the tree was clean.
    fn commit_verified(
        &self,
        vcs: &impl VersionControl,
    ) -> Result<Option<String>, AbacusError> {
        let context = self.context.as_ref().ok_or(AbacusError::NotInitialized)?;
        let spec = load_spec(context.bead_path.as_deref())?;

        let existing: Vec<PathBuf> = spec
            .scope_files
            .iter()
            .filter(|path| path.exists())
            .cloned()
            .collect();
        if spec.scope_files.is_empty() {
            ui::warn("No scope defined: staging all changed tracked files");
            vcs.stage_modified()?;
        } else if existing.is_empty() {
            ui::warn("No scope files found on disk: staging all changed tracked files");
            vcs.stage_modified()?;
        } else {
            ui::detail(format!("Staging {} scope file(s)", existing.len()));
            vcs.stage_paths(&existing)?;
        }

        if !vcs.has_staged_changes()? {
            ui::warn("Nothing staged: working tree already clean, skipping commit");
            return Ok(None);
        }

        let title = spec.title.unwrap_or_else(|| context.bead_id.clone());
        let message = format!("bead({}): {}", context.bead_id, title);
        let sha = vcs.commit(&message)?;
        ui::ok(format!("Committed: {message} ({sha})"));
        Ok(Some(sha))
    }

    fn record_failed_attempt(&mut self, exit_code: i32) -> Result<VerifyOutcome, AbacusError> {
        let max_retries = self.config.max_retries;
        let advice_threshold = self.config.rollback_advice_threshold;

        let retries = {
            let context = self.context.as_mut().ok_or(AbacusError::NotInitialized)?;
            context.retry_count += 1;
            context.last_verification_passed = false;
            context.updated_at = Utc::now();
            self.store.save(context)?;
            context.retry_count
        };

        let escalated = retries >= max_retries;
        if escalated {
            ui::failure(format!("Circuit breaker: {retries}/{max_retries} attempts"));
            self.set_state(State::Failed)?;
        } else {
            ui::warn(format!("Retry {retries}/{max_retries}: entering recover"));
            self.set_state(State::Recover)?;
            if retries >= advice_threshold {
                ui::warn("Consider rollback: abacus rollback");
            }
        }
        self.sync_ledger_soft();
        Ok(VerifyOutcome::Failed {
            exit_code,
            escalated,
        })
    }

    // Phase boundary protection: the previous phase must be closed before a
    // bead of the next phase can start.
    fn guard_phase_boundary(&self, bead_id: &str) -> Result<(), AbacusError> {
        let Some(phase) = phase_number(bead_id) else {
            return Ok(());
        };
        if phase <= 1 {
            return Ok(());
        }
        let ledger = match Ledger::load(&self.config.ledger_file) {
            Ok(ledger) => ledger,
            Err(_) => {
                ui::warn("Cannot check the phase boundary: ledger not readable");
                return Ok(());
            }
        };
        let previous = phase - 1;
        let known = ledger.roadmap.iter().any(|p| p.number == previous);
        if known && !ledger.is_phase_closed(previous) {
            return Err(AbacusError::PhaseNotClosed(previous));
        }
        Ok(())
    }

    fn check_dependencies(&self, spec: &BeadSpec) -> Result<(), AbacusError> {
        if spec.depends_on.is_empty() {
            return Ok(());
        }
        let ledger = match Ledger::load(&self.config.ledger_file) {
            Ok(ledger) => ledger,
            Err(_) => {
                ui::warn("Cannot validate dependencies: ledger not readable");
                return Ok(());
            }
        };

        let unmet: Vec<String> = spec
            .depends_on
            .iter()
            .map(|dep| normalize_dep_id(dep))
            .filter(|dep_id| {
                !ledger
                    .beads
                    .get(dep_id)
                    .is_some_and(|record| record.status == BeadStatus::Complete)
            })
            .collect();

        if unmet.is_empty() {
            ui::ok(format!(
                "Dependencies satisfied ({} beads)",
                spec.depends_on.len()
            ));
            Ok(())
        } else {
            Err(AbacusError::DependenciesUnmet(unmet))
        }
    }

    fn print_summary(&self, spec: &BeadSpec, active_model: Option<&str>) {
        let context = match &self.context {
            Some(context) => context,
            None => return,
        };

        let phase_progress = match (
            phase_number(&context.bead_id),
            Ledger::load(&self.config.ledger_file),
        ) {
            (Some(n), Ok(ledger)) if !ledger.roadmap.is_empty() => {
                format!("{n} of {}", ledger.roadmap.len())
            }
            (Some(n), _) => n.to_string(),
            (None, _) => "?".to_string(),
        };

        let model_label = active_model
            .or(context.model.as_deref())
            .map(normalize_model)
            .unwrap_or_else(|| "any".to_string());

        let verify = context
            .verification_cmd
            .clone()
            .unwrap_or_else(|| format!("{} tier", context.verification_tier));

        ui::print_bead_summary(&ui::BeadSummary {
            bead_id: context.bead_id.clone(),
            title: spec.title.clone(),
            goal: spec.goal.clone(),
            scope: spec.scope_files.clone(),
            verify,
            phase_progress,
            model: model_label,
            tier: context.verification_tier,
            spike: context.bead_type == BeadType::Spike,
        });
    }
}

/// Load the bead definition when a path is known. A missing file is only a
/// warning; the machine falls back to CLI arguments and defaults.
fn load_spec(path: Option<&Path>) -> Result<BeadSpec, AbacusError> {
    let Some(path) = path else {
        return Ok(BeadSpec::default());
    };
    if !path.exists() {
        ui::warn(format!("Bead definition not found: {}", path.display()));
        return Ok(BeadSpec::default());
    }
    BeadSpec::load(path)
}

// Iron Lock: refuse to run a bead under the wrong model.
fn enforce_model_guard(
    active: Option<&str>,
    required: Option<&str>,
) -> Result<(), AbacusError> {
    let (Some(active), Some(required)) = (active, required) else {
        return Ok(());
    };
    let actual = normalize_model(active);
    let expected = normalize_model(required);
    if actual == expected {
        ui::ok(format!("Model guard passed: {active}"));
        Ok(())
    } else {
        Err(AbacusError::ModelMismatch { expected, actual })
    }
}

/// Reduce a model label to its base tier name when it contains one.
fn normalize_model(label: &str) -> String {
    match ModelTier::from_label(label) {
        Some(tier) => tier.to_string(),
        None => label.to_lowercase(),
    }
}

/// Dependency ids may carry a descriptive suffix; only the `PHASE-SEQ`
/// prefix is recorded in the ledger ("05-02-followup" -> "05-02").
fn normalize_dep_id(dep: &str) -> String {
    dep.split('-').take(2).collect::<Vec<_>>().join("-")
}

fn short(sha: &str) -> &str {
    &sha[..8.min(sha.len())]
}
