//! Interface de linha de comando do abacus baseada em clap.
//!
//! Define a struct [`Cli`] com os subcomandos [`Command`] que espelham as
//! operações da máquina de estados (init, transition, verify, rollback,
//! status, reset, sync-ledger) mais os utilitários route e validate.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// abacus: rastreador de execução de beads com verificação obrigatória.
#[derive(Debug, Parser)]
#[command(name = "abacus", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração.
    #[arg(long, global = true, default_value = "abacus.toml")]
    pub config: PathBuf,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Inicializa a execução de um novo bead.
    Init {
        /// Identificador do bead no formato FASE-SEQ (ex.: 06-01).
        bead_id: String,

        /// Modelo requerido para executar o bead.
        #[arg(long)]
        model: Option<String>,

        /// Comando de verificação a executar no `verify`.
        #[arg(long)]
        verify: Option<String>,

        /// Modelo atualmente ativo, conferido contra o requerido.
        #[arg(long)]
        active_model: Option<String>,

        /// Caminho do arquivo de definição do bead.
        #[arg(long)]
        bead: Option<PathBuf>,
    },

    /// Transiciona o bead ativo para o estado dado.
    Transition {
        /// Estado alvo (draft, execute, verify, recover, complete, failed).
        state: String,
    },

    /// Roda o comando de verificação e avança o ciclo em caso de sucesso.
    Verify {
        /// Comando a executar; usa o armazenado no contexto se omitido.
        cmd: Option<String>,
    },

    /// Restaura a árvore de trabalho ao commit inicial do bead.
    Rollback,

    /// Mostra o contexto do bead ativo.
    Status,

    /// Descarta incondicionalmente o contexto persistido.
    Reset,

    /// Projeta o contexto atual sobre o ledger.
    SyncLedger,

    /// Recomenda um modelo para a intenção de bead dada.
    Route {
        /// Descrição da tarefa a executar.
        intent: String,
    },

    /// Valida a consistência estrutural do ledger.
    Validate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_init_with_flags() {
        let cli = Cli::parse_from([
            "abacus",
            "init",
            "06-01",
            "--model",
            "opus",
            "--verify",
            "cargo test",
            "--active-model",
            "claude-opus-4-6",
            "--bead",
            ".planning/phases/06/06-01.md",
        ]);
        match cli.command {
            Command::Init {
                bead_id,
                model,
                verify,
                active_model,
                bead,
            } => {
                assert_eq!(bead_id, "06-01");
                assert_eq!(model.as_deref(), Some("opus"));
                assert_eq!(verify.as_deref(), Some("cargo test"));
                assert_eq!(active_model.as_deref(), Some("claude-opus-4-6"));
                assert_eq!(bead.unwrap(), PathBuf::from(".planning/phases/06/06-01.md"));
            }
            _ => panic!("expected Init command"),
        }
    }

    #[test]
    fn cli_parses_transition_state() {
        let cli = Cli::parse_from(["abacus", "transition", "complete"]);
        match cli.command {
            Command::Transition { state } => assert_eq!(state, "complete"),
            _ => panic!("expected Transition command"),
        }
    }

    #[test]
    fn cli_verify_command_is_optional() {
        let cli = Cli::parse_from(["abacus", "verify"]);
        match cli.command {
            Command::Verify { cmd } => assert!(cmd.is_none()),
            _ => panic!("expected Verify command"),
        }

        let cli = Cli::parse_from(["abacus", "verify", "make check"]);
        match cli.command {
            Command::Verify { cmd } => assert_eq!(cmd.as_deref(), Some("make check")),
            _ => panic!("expected Verify command"),
        }
    }

    #[test]
    fn cli_parses_sync_ledger_kebab_case() {
        let cli = Cli::parse_from(["abacus", "sync-ledger"]);
        assert!(matches!(cli.command, Command::SyncLedger));
    }

    #[test]
    fn cli_parses_global_config_flag() {
        let cli = Cli::parse_from(["abacus", "--config", "other.toml", "status"]);
        assert_eq!(cli.config, PathBuf::from("other.toml"));
        assert!(matches!(cli.command, Command::Status));
    }

    #[test]
    fn cli_parses_route_intent() {
        let cli = Cli::parse_from(["abacus", "route", "refactor the auth module"]);
        match cli.command {
            Command::Route { intent } => assert_eq!(intent, "refactor the auth module"),
            _ => panic!("expected Route command"),
        }
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
