//! Saída de terminal do abacus: marcadores coloridos e spinner de verificação.
//!
//! Usa a crate `console` para estilização com cores e `indicatif` para o
//! spinner exibido enquanto o comando de verificação bloqueia o processo.
//! Os marcadores seguem a convenção ✓ (sucesso), ✗ (falha) e ⚠ (aviso).

use std::fmt::Display;
use std::path::PathBuf;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::router::RoutingDecision;
use crate::state_machine::{BeadContext, VerificationTier};

/// Imprime uma mensagem de sucesso com marcador verde.
pub fn ok(msg: impl Display) {
    println!("{} {msg}", Style::new().green().bold().apply_to("✓"));
}

/// Imprime uma mensagem de falha com marcador vermelho.
pub fn failure(msg: impl Display) {
    eprintln!("{} {msg}", Style::new().red().bold().apply_to("✗"));
}

/// Imprime um aviso com marcador amarelo.
pub fn warn(msg: impl Display) {
    println!("{} {msg}", Style::new().yellow().apply_to("⚠"));
}

/// Imprime uma linha de detalhe indentada e esmaecida.
pub fn detail(msg: impl Display) {
    println!("  {}", Style::new().dim().apply_to(msg.to_string()));
}

/// Spinner exibido enquanto o comando de verificação roda.
pub struct VerifySpinner {
    pb: ProgressBar,
}

impl VerifySpinner {
    /// Inicia o spinner com o comando sendo executado.
    pub fn start(cmd: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .expect("invalid template"),
        );
        pb.set_message(format!("Verifying: {cmd}"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        Self { pb }
    }

    /// Finaliza e limpa o spinner.
    pub fn finish(self) {
        self.pb.finish_and_clear();
    }
}

/// Resumo exibido após `init`: tudo que o agente precisa para executar o bead.
pub struct BeadSummary {
    pub bead_id: String,
    pub title: Option<String>,
    pub goal: Option<String>,
    pub scope: Vec<PathBuf>,
    pub verify: String,
    pub phase_progress: String,
    pub model: String,
    pub tier: VerificationTier,
    pub spike: bool,
}

/// Imprime o resumo do bead pronto para execução.
pub fn print_bead_summary(summary: &BeadSummary) {
    let bold = Style::new().bold();
    let header = match &summary.title {
        Some(title) => format!("Bead ready: {} ({title})", summary.bead_id),
        None => format!("Bead ready: {}", summary.bead_id),
    };

    println!();
    println!(
        "{} {}",
        Style::new().green().bold().apply_to("✓"),
        bold.apply_to(header)
    );
    if let Some(goal) = &summary.goal {
        println!("  Goal   : {goal}");
    }
    if !summary.scope.is_empty() {
        let scope = summary
            .scope
            .iter()
            .map(|path| path.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        println!("  Scope  : {scope}");
    }
    println!("  Verify : {}", summary.verify);
    println!(
        "  Phase  : {}  |  Model: {}  |  Tier: {}",
        summary.phase_progress, summary.model, summary.tier
    );
    if summary.spike {
        println!("  Spike bead: exploration mode, no verification required");
    }
    println!();
}

/// Imprime o contexto atual (comando `status`).
pub fn print_status(context: &BeadContext, max_retries: u32) {
    println!("Bead: {}", context.bead_id);
    println!("State: {}", context.current_state);
    println!("Retry: {}/{max_retries}", context.retry_count);
    let sha = &context.initial_commit_sha;
    println!("Initial commit: {}", &sha[..8.min(sha.len())]);
    println!(
        "Type: {} | Tier: {}",
        context.bead_type, context.verification_tier
    );
    if let Some(model) = &context.model {
        println!("Model: {model}");
    }
    if let Some(cmd) = &context.verification_cmd {
        println!("Verification: {cmd}");
    }
}

/// Imprime a recomendação de modelo para uma intenção de bead.
pub fn print_routing(intent: &str, decision: &RoutingDecision) {
    println!(
        "Recommended model: {}",
        Style::new().bold().apply_to(decision.tier.to_string())
    );
    println!("Intent: {intent}");
    println!("Rationale: {}", decision.rationale);
    if let Some(keyword) = decision.matched {
        println!("Matched keyword: {keyword}");
    }
}
