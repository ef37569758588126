//! Orchestration: manifest row → sources → script → PDF and narration.

pub mod regenerate;
pub mod report;

pub use report::{BatchSummary, RowOutcome};

use crate::audio::{AssemblyMode, AudioAssembler};
use crate::config::CapsuleConfig;
use crate::content::{CapsuleMetadata, ContentGenerator};
use crate::document::{self, DocumentMeta, TypesetOutcome, Typesetter};
use crate::manifest::CapsuleRow;
use crate::retry::RetryPolicy;
use crate::scrape::Scraper;
use crate::text::{normalize_for_speech, process_narrative};
use crate::tts::{self, GoogleTtsBackend, TtsBackend, TtsOptions};
use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};

pub const SCRIPT_FILE: &str = "script.txt";
pub const METADATA_FILE: &str = "metadata.json";
pub const PDF_FILE: &str = "capsule.pdf";
pub const AUDIO_FILE: &str = "capsule.mp3";
/// Written instead of the MP3; distinct from the PDF's text fallback
pub const AUDIO_PLACEHOLDER_FILE: &str = "capsule_audio.txt";

const MAX_DIR_SUBJECT_CHARS: usize = 50;

/// `capsule_007_Secret médical`
pub fn capsule_dir_name(index: usize, subject: &str) -> String {
    format!("capsule_{:03}_{}", index, sanitize_subject(subject))
}

/// Replace characters Windows forbids in file names and cap the length.
pub fn sanitize_subject(subject: &str) -> String {
    subject
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c => c,
        })
        .take(MAX_DIR_SUBJECT_CHARS)
        .collect()
}

/// What happened to the narration of one capsule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioOutcome {
    Mp3 {
        path: PathBuf,
        mode: AssemblyMode,
        segments: usize,
    },
    /// Synthesis unavailable or failed; a `.txt` note was written instead
    Placeholder { path: PathBuf, reason: String },
}

impl AudioOutcome {
    pub fn path(&self) -> &Path {
        match self {
            AudioOutcome::Mp3 { path, .. } | AudioOutcome::Placeholder { path, .. } => path,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, AudioOutcome::Placeholder { .. })
    }
}

/// Produces the PDF and the narration from a finished script.
///
/// Shared by the batch run and by regeneration from edited scripts.
pub struct CapsuleRenderer {
    typesetter: Typesetter,
    assembler: AudioAssembler,
    speech: Option<Box<dyn TtsBackend>>,
    tts_options: TtsOptions,
    segment_budget: usize,
    retry: RetryPolicy,
    show_progress: bool,
}

impl CapsuleRenderer {
    pub fn new(
        typesetter: Typesetter,
        assembler: AudioAssembler,
        speech: Option<Box<dyn TtsBackend>>,
        tts_options: TtsOptions,
        segment_budget: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            typesetter,
            assembler,
            speech,
            tts_options,
            segment_budget,
            retry,
            show_progress: false,
        }
    }

    /// Build from configuration. A missing speech key is not an error: the
    /// narration then falls back to a placeholder note.
    pub fn from_config(config: &CapsuleConfig) -> Self {
        let speech: Option<Box<dyn TtsBackend>> = match GoogleTtsBackend::from_settings(
            config.speech.api_key.as_deref(),
            config.speech.base_url.as_deref(),
        ) {
            Ok(backend) => Some(Box::new(backend)),
            Err(e) => {
                log::warn!("Speech synthesis disabled: {}", e);
                None
            }
        };

        Self::new(
            Typesetter::new(config.typeset.program.clone(), config.typeset.passes),
            AudioAssembler::new(config.audio.ffmpeg.clone(), config.speech.pause_ms),
            speech,
            config.speech.tts_options(),
            config.speech.segment_budget,
            config.retry.clone(),
        )
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Typeset `capsule.pdf` in `dir`, or its text fallback.
    pub fn render_document(
        &self,
        dir: &Path,
        metadata: &CapsuleMetadata,
        narrative: &str,
    ) -> Result<TypesetOutcome> {
        let body = document::format_document(narrative);
        let meta = DocumentMeta::new(&metadata.subject, &metadata.competence, &metadata.theme);
        self.typesetter.typeset(
            &meta,
            &body,
            &metadata.duration_estimate,
            &dir.join(PDF_FILE),
        )
    }

    /// Synthesize `capsule.mp3` in `dir`. Any synthesis failure leaves a
    /// placeholder note instead; only writing that note can fail.
    pub async fn render_audio(&self, dir: &Path, narrative: &str) -> Result<AudioOutcome> {
        let output = dir.join(AUDIO_FILE);

        let Some(backend) = self.speech.as_deref() else {
            return write_audio_placeholder(&output, "speech synthesis is not configured");
        };

        match self.synthesize(backend, narrative, &output).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                log::error!("Audio generation failed: {:#}", e);
                write_audio_placeholder(&output, &format!("{:#}", e))
            }
        }
    }

    async fn synthesize(
        &self,
        backend: &dyn TtsBackend,
        narrative: &str,
        output: &Path,
    ) -> Result<AudioOutcome> {
        let speech = normalize_for_speech(narrative);
        let segments = process_narrative(&speech, self.segment_budget);
        if segments.is_empty() {
            bail!("Nothing to narrate");
        }
        log::info!(
            "Synthesizing {} segment(s) with {}",
            segments.len(),
            backend.name()
        );

        let pb = if self.show_progress {
            let pb = ProgressBar::new(segments.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
                    .progress_chars("#>-"),
            );
            pb.set_message("narration");
            Some(pb)
        } else {
            None
        };

        let parts = tts::synthesize_segments(
            backend,
            &segments,
            &self.tts_options,
            &self.retry,
            pb.as_ref(),
        )
        .await;
        if let Some(pb) = &pb {
            pb.finish_and_clear();
        }
        let parts = parts?;

        if output.exists() {
            fs::remove_file(output)
                .with_context(|| format!("Failed to remove old {}", output.display()))?;
        }
        let mode = self.assembler.assemble(&parts, output)?;
        log::info!("Audio written: {} ({:?})", output.display(), mode);

        let stale = output.with_file_name(AUDIO_PLACEHOLDER_FILE);
        if stale.exists() {
            fs::remove_file(&stale)
                .with_context(|| format!("Failed to remove {}", stale.display()))?;
        }

        Ok(AudioOutcome::Mp3 {
            path: output.to_path_buf(),
            mode,
            segments: segments.len(),
        })
    }
}

fn write_audio_placeholder(output: &Path, reason: &str) -> Result<AudioOutcome> {
    let path = output.with_file_name(AUDIO_PLACEHOLDER_FILE);
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let text = format!(
        "Fichier audio placeholder pour la capsule.\n\n\
         L'audio n'a pas pu être généré automatiquement.\n\
         Cause: {}\n\n\
         Consultez les logs pour plus de détails.\n\
         Fichier attendu: {}\n",
        reason, name
    );
    fs::write(&path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    log::warn!("Audio placeholder written: {}", path.display());

    Ok(AudioOutcome::Placeholder {
        path,
        reason: reason.to_string(),
    })
}

/// Files produced for one capsule.
#[derive(Debug)]
pub struct CapsuleOutput {
    pub dir: PathBuf,
    pub document: TypesetOutcome,
    pub audio: AudioOutcome,
}

/// Runs the whole chain for manifest rows.
pub struct CapsuleRunner {
    scraper: Scraper,
    generator: ContentGenerator,
    renderer: CapsuleRenderer,
    output_dir: PathBuf,
}

impl CapsuleRunner {
    pub fn new(
        scraper: Scraper,
        generator: ContentGenerator,
        renderer: CapsuleRenderer,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            scraper,
            generator,
            renderer,
            output_dir,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Generate every artefact of one capsule.
    pub async fn process_row(&self, row: &CapsuleRow) -> Result<CapsuleOutput> {
        log::info!("Capsule {}: {}", row.index, row.subject);

        if row.links().is_empty() {
            bail!("Row {}: no external link found", row.sheet_row);
        }

        let sources = self.scraper.gather(row.links()).await;
        if sources.is_empty() {
            bail!("Row {}: no content could be fetched from the links", row.sheet_row);
        }
        log::info!("{} source(s) fetched", sources.len());

        let script = self.generator.generate(row, &sources).await?;

        let dir = self.output_dir.join(capsule_dir_name(row.index, &row.subject));
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let metadata = CapsuleMetadata::new(row, &script);
        write_capsule_files(&dir, &script.script, &metadata)?;

        let document = self.renderer.render_document(&dir, &metadata, &script.script)?;
        let audio = self.renderer.render_audio(&dir, &script.script).await?;

        log::info!("Capsule {} done: {}", row.index, dir.display());
        Ok(CapsuleOutput {
            dir,
            document,
            audio,
        })
    }

    /// Process every row; one failing row does not stop the others.
    /// The summary is written to `summary_report.txt`.
    pub async fn run_batch(&self, rows: &[CapsuleRow], workbook: &Path) -> Result<BatchSummary> {
        let mut summary = BatchSummary::new(workbook, &self.output_dir);

        let pb = ProgressBar::new(rows.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
                .progress_chars("#>-"),
        );

        for row in rows {
            pb.set_message(row.subject.clone());
            let outcome = match self.process_row(row).await {
                Ok(output) => RowOutcome::success(row, &output),
                Err(e) => {
                    log::error!("Capsule {} failed: {:#}", row.index, e);
                    RowOutcome::failure(row, &e)
                }
            };
            summary.record(outcome);
            pb.inc(1);
        }
        pb.finish_with_message("done");

        let report = summary.write_report()?;
        log::info!("Summary report: {}", report.display());
        Ok(summary)
    }
}

/// Write `script.txt` and `metadata.json`.
pub fn write_capsule_files(dir: &Path, script: &str, metadata: &CapsuleMetadata) -> Result<()> {
    let script_path = dir.join(SCRIPT_FILE);
    fs::write(&script_path, script)
        .with_context(|| format!("Failed to write {}", script_path.display()))?;

    let metadata_path = dir.join(METADATA_FILE);
    let json = serde_json::to_string_pretty(metadata)?;
    fs::write(&metadata_path, json)
        .with_context(|| format!("Failed to write {}", metadata_path.display()))?;

    log::debug!("Script and metadata written to {}", dir.display());
    Ok(())
}
