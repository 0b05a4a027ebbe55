//! Integração com Git via libgit2 para captura de revisão, commits
//! verificados e rollback determinístico.
//!
//! O trait [`VersionControl`] é a fronteira de capacidade usada pela máquina
//! de estados; [`GitWorkspace`] é a implementação real sobre libgit2.

use std::path::{Path, PathBuf};

use git2::{Repository, ResetType, Signature, Status, StatusOptions};

use crate::error::AbacusError;

/// Operações de controle de versão exigidas pela máquina de estados.
pub trait VersionControl {
    /// SHA completo do commit em HEAD.
    fn head_sha(&self) -> Result<String, AbacusError>;

    /// Reset hard da árvore de trabalho para o commit dado.
    fn hard_reset(&self, sha: &str) -> Result<(), AbacusError>;

    /// Remove arquivos não rastreados, preservando os prefixos dados.
    fn clean_untracked(&self, keep: &[String]) -> Result<(), AbacusError>;

    /// Adiciona os caminhos dados (relativos à raiz do repositório) ao stage.
    fn stage_paths(&self, paths: &[PathBuf]) -> Result<(), AbacusError>;

    /// Adiciona ao stage todos os arquivos rastreados modificados.
    fn stage_modified(&self) -> Result<(), AbacusError>;

    /// Indica se há alterações staged em relação a HEAD.
    fn has_staged_changes(&self) -> Result<bool, AbacusError>;

    /// Cria um commit com a mensagem dada e retorna o hash curto.
    fn commit(&self, message: &str) -> Result<String, AbacusError>;
}

// Arquivos excluídos do staging por segurança.
const STAGE_EXCLUDED: &[&str] = &["abacus.toml", ".env", ".env.local"];

fn stage_excluded(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    STAGE_EXCLUDED.contains(&name) || name.ends_with(".key")
}

/// Verifica se um caminho relativo cai sob um dos prefixos preservados.
fn is_protected(rel: &str, keep: &[String]) -> bool {
    let rel = rel.trim_end_matches('/');
    keep.iter().any(|prefix| {
        let prefix = prefix.trim_end_matches('/');
        rel == prefix
            || rel
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    })
}

/// Área de trabalho git usando a biblioteca libgit2.
pub struct GitWorkspace {
    repo: Repository,
}

impl GitWorkspace {
    /// Abre um repositório git existente no caminho fornecido.
    pub fn open(path: &Path) -> Result<Self, AbacusError> {
        let repo = Repository::open(path)?;
        Ok(Self { repo })
    }

    fn workdir(&self) -> PathBuf {
        self.repo
            .workdir()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }
}

impl VersionControl for GitWorkspace {
    fn head_sha(&self) -> Result<String, AbacusError> {
        Ok(self.repo.head()?.peel_to_commit()?.id().to_string())
    }

    fn hard_reset(&self, sha: &str) -> Result<(), AbacusError> {
        let object = self.repo.revparse_single(sha)?;
        self.repo.reset(&object, ResetType::Hard, None)?;
        Ok(())
    }

    fn clean_untracked(&self, keep: &[String]) -> Result<(), AbacusError> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true);
        let statuses = self.repo.statuses(Some(&mut opts))?;
        let workdir = self.workdir();

        for entry in statuses.iter() {
            if !entry.status().contains(Status::WT_NEW) {
                continue;
            }
            let Some(rel) = entry.path() else { continue };
            if is_protected(rel, keep) {
                continue;
            }
            let absolute = workdir.join(rel);
            if absolute.is_dir() {
                std::fs::remove_dir_all(&absolute)?;
            } else if absolute.exists() {
                std::fs::remove_file(&absolute)?;
            }
        }
        Ok(())
    }

    fn stage_paths(&self, paths: &[PathBuf]) -> Result<(), AbacusError> {
        let mut index = self.repo.index()?;
        for path in paths {
            if stage_excluded(path) {
                continue;
            }
            index.add_path(path)?;
        }
        index.write()?;
        Ok(())
    }

    fn stage_modified(&self) -> Result<(), AbacusError> {
        let mut index = self.repo.index()?;
        index.update_all(
            ["*"].iter(),
            Some(&mut |path: &Path, _: &[u8]| -> i32 {
                if stage_excluded(path) { 1 } else { 0 }
            }),
        )?;
        index.write()?;
        Ok(())
    }

    fn has_staged_changes(&self) -> Result<bool, AbacusError> {
        let head_tree = self.repo.head()?.peel_to_tree()?;
        let index = self.repo.index()?;
        let diff = self
            .repo
            .diff_tree_to_index(Some(&head_tree), Some(&index), None)?;
        Ok(diff.deltas().count() > 0)
    }

    fn commit(&self, message: &str) -> Result<String, AbacusError> {
        let mut index = self.repo.index()?;
        let tree_oid = index.write_tree()?;
        let tree = self.repo.find_tree(tree_oid)?;

        let sig = self
            .repo
            .signature()
            .or_else(|_| Signature::now("abacus", "abacus@localhost"))?;

        let parent = self.repo.head()?.peel_to_commit()?;
        let commit_oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])?;

        let short = &commit_oid.to_string()[..7];
        Ok(short.to_string())
    }
}
