//! Rebuild audio and PDF from hand-edited `script.txt` files.

use super::{AudioOutcome, CapsuleRenderer, METADATA_FILE, PDF_FILE, SCRIPT_FILE};
use crate::content::CapsuleMetadata;
use crate::document::TypesetOutcome;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Which artefacts to rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegenerateScope {
    Both,
    AudioOnly,
    PdfOnly,
}

impl RegenerateScope {
    pub fn from_flags(audio_only: bool, pdf_only: bool) -> Self {
        match (audio_only, pdf_only) {
            (true, _) => RegenerateScope::AudioOnly,
            (false, true) => RegenerateScope::PdfOnly,
            (false, false) => RegenerateScope::Both,
        }
    }

    fn audio(self) -> bool {
        self != RegenerateScope::PdfOnly
    }

    fn pdf(self) -> bool {
        self != RegenerateScope::AudioOnly
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegenerateResult {
    pub capsule: String,
    pub errors: Vec<String>,
}

impl RegenerateResult {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

fn is_complete(dir: &Path) -> bool {
    dir.join(SCRIPT_FILE).is_file() && dir.join(METADATA_FILE).is_file()
}

/// Capsule folders holding both a script and its metadata, sorted by name.
pub fn find_capsule_dirs(output_dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(output_dir)
        .with_context(|| format!("Output directory not found: {}", output_dir.display()))?;

    let mut dirs = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_capsule = path.is_dir()
            && path
                .file_name()
                .is_some_and(|n| n.to_string_lossy().starts_with("capsule_"));
        if !is_capsule {
            continue;
        }
        if is_complete(&path) {
            dirs.push(path);
        } else {
            log::warn!("Incomplete capsule skipped: {}", path.display());
        }
    }

    dirs.sort();
    Ok(dirs)
}

/// The folder of capsule `number` (`7`, `07` and `007` are the same).
pub fn find_capsule(output_dir: &Path, number: &str) -> Result<Option<PathBuf>> {
    let prefix = format!("capsule_{:0>3}_", number.trim());
    Ok(find_capsule_dirs(output_dir)?.into_iter().find(|dir| {
        dir.file_name()
            .is_some_and(|n| n.to_string_lossy().starts_with(&prefix))
    }))
}

/// Rebuild the requested artefacts of one capsule from its files.
pub async fn regenerate_capsule(
    renderer: &CapsuleRenderer,
    dir: &Path,
    scope: RegenerateScope,
) -> RegenerateResult {
    let capsule = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.display().to_string());
    log::info!("Regenerating {}", capsule);

    let mut result = RegenerateResult {
        capsule,
        errors: Vec::new(),
    };

    let (script, metadata) = match load_capsule(dir) {
        Ok(loaded) => loaded,
        Err(e) => {
            result.errors.push(format!("{:#}", e));
            return result;
        }
    };

    if scope.audio() {
        match renderer.render_audio(dir, &script).await {
            Ok(AudioOutcome::Mp3 { .. }) => {}
            Ok(AudioOutcome::Placeholder { reason, .. }) => {
                result.errors.push(format!("Audio not generated: {}", reason))
            }
            Err(e) => result.errors.push(format!("Audio: {:#}", e)),
        }
    }

    if scope.pdf() {
        let pdf = dir.join(PDF_FILE);
        if pdf.exists() {
            if let Err(e) = fs::remove_file(&pdf) {
                log::warn!("Could not remove old {}: {}", pdf.display(), e);
            }
        }
        match renderer.render_document(dir, &metadata, &script) {
            Ok(TypesetOutcome::Pdf(_)) => {}
            Ok(TypesetOutcome::TextFallback(path)) => result
                .errors
                .push(format!("PDF replaced by text version: {}", path.display())),
            Err(e) => result.errors.push(format!("PDF: {:#}", e)),
        }
    }

    result
}

fn load_capsule(dir: &Path) -> Result<(String, CapsuleMetadata)> {
    let script_path = dir.join(SCRIPT_FILE);
    let script = fs::read_to_string(&script_path)
        .with_context(|| format!("Failed to read {}", script_path.display()))?;

    let metadata_path = dir.join(METADATA_FILE);
    let metadata = fs::read_to_string(&metadata_path)
        .with_context(|| format!("Failed to read {}", metadata_path.display()))?;
    let metadata: CapsuleMetadata = serde_json::from_str(&metadata)
        .with_context(|| format!("Invalid {}", metadata_path.display()))?;

    Ok((script, metadata))
}

/// Regenerate one capsule by number, or all of them.
pub async fn regenerate(
    renderer: &CapsuleRenderer,
    output_dir: &Path,
    capsule: Option<&str>,
    scope: RegenerateScope,
) -> Result<Vec<RegenerateResult>> {
    let dirs = match capsule {
        Some(number) => vec![find_capsule(output_dir, number)?
            .with_context(|| format!("Capsule {} not found in {}", number, output_dir.display()))?],
        None => find_capsule_dirs(output_dir)?,
    };

    if dirs.is_empty() {
        log::warn!("No capsule found in {}", output_dir.display());
    }

    let mut results = Vec::with_capacity(dirs.len());
    for dir in &dirs {
        let result = regenerate_capsule(renderer, dir, scope).await;
        if result.is_success() {
            log::info!("[OK] {}", result.capsule);
        } else {
            log::error!("[ERROR] {}: {}", result.capsule, result.errors.join(", "));
        }
        results.push(result);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::super::tests::{metadata, offline_renderer, NARRATIVE};
    use super::super::{write_capsule_files, AUDIO_FILE, AUDIO_PLACEHOLDER_FILE};
    use super::*;
    use crate::tts::mock::MockTtsBackend;

    fn capsule_tree() -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        for name in ["capsule_001_Acces", "capsule_002_Secret"] {
            let dir = root.path().join(name);
            fs::create_dir(&dir).unwrap();
            write_capsule_files(&dir, NARRATIVE, &metadata()).unwrap();
        }
        fs::create_dir(root.path().join("capsule_003_Incomplete")).unwrap();
        fs::write(root.path().join("summary_report.txt"), "").unwrap();
        root
    }

    #[test]
    fn test_scope_from_flags() {
        assert_eq!(RegenerateScope::from_flags(false, false), RegenerateScope::Both);
        assert_eq!(RegenerateScope::from_flags(true, false), RegenerateScope::AudioOnly);
        assert_eq!(RegenerateScope::from_flags(false, true), RegenerateScope::PdfOnly);
    }

    #[test]
    fn test_find_capsule_dirs_skips_incomplete() {
        let root = capsule_tree();
        let dirs = find_capsule_dirs(root.path()).unwrap();
        assert_eq!(dirs.len(), 2);
        assert!(dirs[0].ends_with("capsule_001_Acces"));
    }

    #[test]
    fn test_find_capsule_pads_number() {
        let root = capsule_tree();
        let dir = find_capsule(root.path(), "2").unwrap().unwrap();
        assert!(dir.ends_with("capsule_002_Secret"));
        assert!(find_capsule(root.path(), "003").unwrap().is_none());
    }

    #[test]
    fn test_missing_output_dir() {
        assert!(find_capsule_dirs(Path::new("/nonexistent/capsules")).is_err());
    }

    #[tokio::test]
    async fn test_audio_only_regeneration() {
        let root = capsule_tree();
        let renderer = offline_renderer(Some(Box::new(MockTtsBackend::default())));

        let results = regenerate(&renderer, root.path(), Some("1"), RegenerateScope::AudioOnly)
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert!(results[0].is_success(), "{:?}", results[0].errors);
        let dir = root.path().join("capsule_001_Acces");
        assert!(dir.join(AUDIO_FILE).exists());
        assert!(!dir.join("capsule.txt").exists());
    }

    #[tokio::test]
    async fn test_degraded_outputs_are_reported() {
        let root = capsule_tree();
        let renderer = offline_renderer(None);

        let results = regenerate(&renderer, root.path(), None, RegenerateScope::Both)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        for result in &results {
            assert_eq!(result.errors.len(), 2);
        }
        let dir = root.path().join("capsule_002_Secret");
        assert!(dir.join(AUDIO_PLACEHOLDER_FILE).exists());
        assert!(dir.join("capsule.txt").exists());
    }

    #[tokio::test]
    async fn test_unknown_capsule_is_an_error() {
        let root = capsule_tree();
        let renderer = offline_renderer(None);
        assert!(regenerate(&renderer, root.path(), Some("42"), RegenerateScope::Both)
            .await
            .is_err());
    }
}
