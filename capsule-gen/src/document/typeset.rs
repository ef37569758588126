//! PDF production through pdflatex, with a plain-text fallback.

use super::latex::{render_document, DocumentMeta};
use super::layout::DocumentBody;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// What `typeset` actually produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypesetOutcome {
    Pdf(PathBuf),
    /// pdflatex missing or failing; a `.txt` was written next to the requested PDF
    TextFallback(PathBuf),
}

impl TypesetOutcome {
    pub fn path(&self) -> &Path {
        match self {
            TypesetOutcome::Pdf(p) | TypesetOutcome::TextFallback(p) => p,
        }
    }
}

/// Runs pdflatex on a generated document.
#[derive(Debug, Clone)]
pub struct Typesetter {
    program: String,
    passes: usize,
}

impl Typesetter {
    /// `passes` is clamped to at least one; two resolve the table of contents.
    pub fn new(program: impl Into<String>, passes: usize) -> Self {
        Self {
            program: program.into(),
            passes: passes.max(1),
        }
    }

    pub fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Produce `output_pdf`, or a text file beside it when LaTeX cannot.
    ///
    /// Only an I/O failure on the fallback itself is an error.
    pub fn typeset(
        &self,
        meta: &DocumentMeta,
        body: &DocumentBody,
        duration_estimate: &str,
        output_pdf: &Path,
    ) -> Result<TypesetOutcome> {
        if !self.is_available() {
            log::warn!("{} not available, writing text document instead", self.program);
        } else {
            match self.compile(&render_document(meta, body), output_pdf) {
                Ok(()) => {
                    log::info!("PDF written to {}", output_pdf.display());
                    return Ok(TypesetOutcome::Pdf(output_pdf.to_path_buf()));
                }
                Err(e) => log::error!("LaTeX compilation failed: {:#}", e),
            }
        }

        let text_path = write_text_fallback(meta, body, duration_estimate, output_pdf)?;
        Ok(TypesetOutcome::TextFallback(text_path))
    }

    fn compile(&self, source: &str, output_pdf: &Path) -> Result<()> {
        let temp_dir = TempDir::new()?;
        let tex_file = temp_dir.path().join("capsule.tex");
        std::fs::write(&tex_file, source).context("Failed to write LaTeX source")?;

        for pass in 1..=self.passes {
            let output = Command::new(&self.program)
                .arg("-interaction=nonstopmode")
                .arg("-output-directory")
                .arg(temp_dir.path())
                .arg(&tex_file)
                .output()
                .with_context(|| format!("Failed to run {}", self.program))?;

            // Later passes only refine references; their exit status is not fatal
            if pass == 1 && !output.status.success() {
                let log_file = temp_dir.path().join("capsule.log");
                if let Ok(latex_log) = std::fs::read_to_string(&log_file) {
                    log::debug!("LaTeX log:\n{}", latex_log);
                }
                anyhow::bail!(
                    "{} exited with {}: {}",
                    self.program,
                    output.status,
                    tail_lines(&String::from_utf8_lossy(&output.stdout), 10)
                );
            }
        }

        let pdf = temp_dir.path().join("capsule.pdf");
        if !pdf.exists() {
            anyhow::bail!("{} produced no PDF", self.program);
        }
        std::fs::copy(&pdf, output_pdf)
            .with_context(|| format!("Failed to copy PDF to {}", output_pdf.display()))?;
        Ok(())
    }
}

fn tail_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(count)..].join("\n")
}

impl Default for Typesetter {
    fn default() -> Self {
        Self::new("pdflatex", 2)
    }
}

/// Write the document as plain text next to `output_pdf` (same stem, `.txt`).
pub fn write_text_fallback(
    meta: &DocumentMeta,
    body: &DocumentBody,
    duration_estimate: &str,
    output_pdf: &Path,
) -> Result<PathBuf> {
    let text_path = output_pdf.with_extension("txt");

    let content = format!(
        "CAPSULE D'APPRENTISSAGE - SANTE PUBLIQUE\n\
         ========================================\n\n\
         Titre: {}\n\
         Competence: {}\n\
         Thematique: {}\n\
         Date: {}\n\n\
         CONTENU\n\
         =======\n\n\
         {}\n\n\
         INFORMATIONS\n\
         ============\n\n\
         Duree estimee: {}\n\
         Nombre de QCM: {}\n",
        meta.title,
        meta.competence,
        meta.theme,
        meta.date,
        body.to_plain_text(),
        duration_estimate,
        body.quizzes().count(),
    );

    std::fs::write(&text_path, content)
        .with_context(|| format!("Failed to write {}", text_path.display()))?;
    log::info!("Text document written to {}", text_path.display());
    Ok(text_path)
}
