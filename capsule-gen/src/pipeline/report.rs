//! Batch bookkeeping and `summary_report.txt`.

use super::CapsuleOutput;
use crate::document::TypesetOutcome;
use crate::manifest::{or_unspecified, CapsuleRow};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

pub const REPORT_FILE: &str = "summary_report.txt";

/// Result of one manifest row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowOutcome {
    pub index: usize,
    pub subject: String,
    pub theme: String,
    pub dir: Option<PathBuf>,
    pub error: Option<String>,
    /// The PDF was replaced by its text version
    pub pdf_fallback: bool,
    /// The MP3 was replaced by a placeholder note
    pub audio_placeholder: bool,
}

impl RowOutcome {
    pub fn success(row: &CapsuleRow, output: &CapsuleOutput) -> Self {
        Self {
            index: row.index,
            subject: row.subject.clone(),
            theme: row.theme.clone(),
            dir: Some(output.dir.clone()),
            error: None,
            pdf_fallback: matches!(output.document, TypesetOutcome::TextFallback(_)),
            audio_placeholder: output.audio.is_placeholder(),
        }
    }

    pub fn failure(row: &CapsuleRow, error: &anyhow::Error) -> Self {
        Self {
            index: row.index,
            subject: row.subject.clone(),
            theme: row.theme.clone(),
            dir: None,
            error: Some(format!("{:#}", error)),
            pdf_fallback: false,
            audio_placeholder: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    fn is_degraded(&self) -> bool {
        self.pdf_fallback || self.audio_placeholder
    }
}

#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub workbook: PathBuf,
    pub output_dir: PathBuf,
    pub outcomes: Vec<RowOutcome>,
}

impl BatchSummary {
    pub fn new(workbook: &Path, output_dir: &Path) -> Self {
        Self {
            workbook: workbook.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            outcomes: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: RowOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn successes(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failures(&self) -> usize {
        self.total() - self.successes()
    }

    /// Percentage of successful rows; 0 for an empty batch.
    pub fn success_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            0.0
        } else {
            self.successes() as f64 * 100.0 / self.total() as f64
        }
    }

    /// Rows per theme, every attempted row counted.
    pub fn themes(&self) -> BTreeMap<String, usize> {
        let mut themes = BTreeMap::new();
        for outcome in &self.outcomes {
            *themes.entry(or_unspecified(&outcome.theme)).or_default() += 1;
        }
        themes
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        // Writing to a String cannot fail
        let _ = writeln!(out, "=== RAPPORT DE GÉNÉRATION DES CAPSULES ===\n");
        let _ = writeln!(out, "Fichier source: {}", self.workbook.display());
        let _ = writeln!(out, "Nombre total de lignes: {}", self.total());
        let _ = writeln!(out, "Capsules générées avec succès: {}", self.successes());
        let _ = writeln!(out, "Erreurs: {}", self.failures());
        let _ = writeln!(out, "Taux de réussite: {:.1}%", self.success_rate());
        let _ = writeln!(out, "Répertoire de sortie: {}\n", self.output_dir.display());

        let _ = writeln!(out, "=== RÉPARTITION PAR THÉMATIQUES ===");
        for (theme, count) in self.themes() {
            let _ = writeln!(out, "- {}: {} capsules", theme, count);
        }

        let degraded: Vec<&RowOutcome> =
            self.outcomes.iter().filter(|o| o.is_degraded()).collect();
        if !degraded.is_empty() {
            let _ = writeln!(out, "\n=== SORTIES DÉGRADÉES ===");
            for o in degraded {
                let mut what = Vec::new();
                if o.pdf_fallback {
                    what.push("PDF remplacé par un texte");
                }
                if o.audio_placeholder {
                    what.push("audio non généré");
                }
                let _ = writeln!(out, "- {:03} {}: {}", o.index, o.subject, what.join(", "));
            }
        }

        let failed: Vec<&RowOutcome> = self.outcomes.iter().filter(|o| !o.is_success()).collect();
        if !failed.is_empty() {
            let _ = writeln!(out, "\n=== ERREURS ===");
            for o in failed {
                let _ = writeln!(
                    out,
                    "- {:03} {}: {}",
                    o.index,
                    o.subject,
                    o.error.as_deref().unwrap_or_default()
                );
            }
        }

        out
    }

    /// Write the report into the output directory.
    pub fn write_report(&self) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("Failed to create {}", self.output_dir.display()))?;
        let path = self.output_dir.join(REPORT_FILE);
        std::fs::write(&path, self.render())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(index: usize, theme: &str, error: Option<&str>) -> RowOutcome {
        RowOutcome {
            index,
            subject: format!("Sujet {}", index),
            theme: theme.into(),
            dir: None,
            error: error.map(str::to_string),
            pdf_fallback: false,
            audio_placeholder: false,
        }
    }

    fn summary() -> BatchSummary {
        let mut summary = BatchSummary::new(Path::new("capsules.xlsx"), Path::new("out"));
        summary.record(outcome(1, "RGPD", None));
        summary.record(outcome(2, "RGPD", Some("no link")));
        summary.record(RowOutcome {
            audio_placeholder: true,
            ..outcome(3, "Éthique", None)
        });
        summary.record(outcome(4, "", None));
        summary
    }

    #[test]
    fn test_counts() {
        let summary = summary();
        assert_eq!(summary.total(), 4);
        assert_eq!(summary.successes(), 3);
        assert_eq!(summary.failures(), 1);
        assert_eq!(summary.success_rate(), 75.0);
    }

    #[test]
    fn test_empty_batch_rate() {
        let summary = BatchSummary::new(Path::new("x.xlsx"), Path::new("out"));
        assert_eq!(summary.success_rate(), 0.0);
        assert!(summary.render().contains("Taux de réussite: 0.0%"));
    }

    #[test]
    fn test_render() {
        let report = summary().render();
        assert!(report.contains("Nombre total de lignes: 4"));
        assert!(report.contains("Capsules générées avec succès: 3"));
        assert!(report.contains("Taux de réussite: 75.0%"));
        assert!(report.contains("- RGPD: 2 capsules"));
        assert!(report.contains("- Non spécifié: 1 capsules"));
        assert!(report.contains("- 003 Sujet 3: audio non généré"));
        assert!(report.contains("- 002 Sujet 2: no link"));
    }

    #[test]
    fn test_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let mut summary = summary();
        summary.output_dir = dir.path().join("nested");
        let path = summary.write_report().unwrap();
        assert_eq!(path, dir.path().join("nested").join(REPORT_FILE));
        assert!(std::fs::read_to_string(path).unwrap().starts_with("=== RAPPORT"));
    }
}
