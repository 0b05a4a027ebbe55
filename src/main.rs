mod bead;
mod cli;
mod config;
mod error;
mod git;
mod ledger;
mod persist;
mod router;
mod runner;
mod state_machine;
mod ui;

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;

use cli::{Cli, Command};
use config::AbacusConfig;
use error::AbacusError;
use git::GitWorkspace;
use ledger::Ledger;
use router::ModelRouter;
use runner::ShellRunner;
use state_machine::{BeadMachine, InitArgs};

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            ui::failure(&err);
            if let Some(AbacusError::CommandNotFound(_)) = err.downcast_ref::<AbacusError>() {
                ui::detail("Install the missing tool or check the environment");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = AbacusConfig::load_from(&cli.config)?;
    let mut machine = BeadMachine::load(config.clone());

    match cli.command {
        Command::Init {
            bead_id,
            model,
            verify,
            active_model,
            bead,
        } => {
            let vcs = GitWorkspace::open(Path::new("."))?;
            machine.init(
                &vcs,
                InitArgs {
                    bead_id,
                    verification_cmd: verify,
                    model,
                    active_model,
                    bead_path: bead,
                },
            )?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Transition { state } => {
            machine.transition(&state)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Verify { cmd } => {
            let vcs = GitWorkspace::open(Path::new("."))?;
            let outcome = machine.verify(&vcs, &ShellRunner, cmd.as_deref())?;
            Ok(if outcome.passed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Rollback => {
            let vcs = GitWorkspace::open(Path::new("."))?;
            machine.rollback(&vcs)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Status => {
            machine.status();
            Ok(ExitCode::SUCCESS)
        }
        Command::Reset => {
            machine.reset()?;
            Ok(ExitCode::SUCCESS)
        }
        Command::SyncLedger => {
            machine.sync_ledger()?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Route { intent } => {
            ui::print_routing(&intent, &ModelRouter::explain(&intent));
            Ok(ExitCode::SUCCESS)
        }
        Command::Validate => {
            let ledger = Ledger::load(&config.ledger_file)?;
            let problems = ledger.validate();
            if problems.is_empty() {
                ui::ok(format!(
                    "Ledger structure valid ({} beads, {} phases)",
                    ledger.beads.len(),
                    ledger.roadmap.len()
                ));
                Ok(ExitCode::SUCCESS)
            } else {
                for problem in &problems {
                    ui::failure(problem);
                }
                Ok(ExitCode::FAILURE)
            }
        }
    }
}
