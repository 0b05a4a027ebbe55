//! Configuração do abacus carregada a partir de `abacus.toml`.
//!
//! A struct [`AbacusConfig`] contém todos os parâmetros configuráveis,
//! incluindo os caminhos dos arquivos de estado e ledger, injetados na
//! máquina de estados na construção em vez de fixos em constantes globais.
//! Valores não presentes no arquivo usam defaults sensíveis.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::AbacusError;

/// Configuração de nível superior carregada de `abacus.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct AbacusConfig {
    /// Caminho do arquivo de contexto persistido da máquina de estados.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    /// Caminho do arquivo de ledger do projeto.
    #[serde(default = "default_ledger_file")]
    pub ledger_file: PathBuf,

    /// Máximo de tentativas de verificação antes de marcar o bead como falho.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Número de tentativas a partir do qual o rollback é recomendado.
    #[serde(default = "default_rollback_advice_threshold")]
    pub rollback_advice_threshold: u32,

    /// Caminhos preservados na limpeza do rollback.
    #[serde(default = "default_protected_paths")]
    pub protected_paths: Vec<String>,
}

// Valor padrão para o arquivo de estado.
fn default_state_file() -> PathBuf {
    PathBuf::from(".abacus/state.json")
}

// Valor padrão para o arquivo de ledger.
fn default_ledger_file() -> PathBuf {
    PathBuf::from(".abacus/ledger.json")
}

// Valor padrão para retentativas máximas: 3.
fn default_max_retries() -> u32 {
    3
}

// Valor padrão para o limiar de recomendação de rollback: 2.
fn default_rollback_advice_threshold() -> u32 {
    2
}

// Diretórios do próprio framework, intocados pelo rollback.
fn default_protected_paths() -> Vec<String> {
    vec![".abacus/".to_string(), ".planning/".to_string()]
}

impl Default for AbacusConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
            ledger_file: default_ledger_file(),
            max_retries: default_max_retries(),
            rollback_advice_threshold: default_rollback_advice_threshold(),
            protected_paths: default_protected_paths(),
        }
    }
}

impl AbacusConfig {
    /// Carrega a configuração do caminho dado.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load_from(path: &Path) -> Result<Self, AbacusError> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }
}
