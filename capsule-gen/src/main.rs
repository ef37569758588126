//! capsules - Generate learning capsules (script, narrated audio, PDF) from a spreadsheet

mod audio;
mod config;
mod content;
mod document;
mod manifest;
mod pipeline;
mod quiz;
mod retry;
mod scrape;
mod text;
mod tts;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::CapsuleConfig;
use content::ContentGenerator;
use pipeline::regenerate::{self, RegenerateScope};
use pipeline::{CapsuleRenderer, CapsuleRunner};
use scrape::Scraper;
use std::path::{Path, PathBuf};
use text::MAX_SEGMENT_BUDGET;

const DEFAULT_OUTPUT_DIR: &str = "capsules_output";

#[derive(Parser, Debug)]
#[command(name = "capsules")]
#[command(about = "Generate learning capsules (script, narrated audio, PDF) from a spreadsheet", long_about = None)]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
struct Args {
    /// Path to the workbook (xlsx, xls or ods)
    workbook: Option<PathBuf>,

    /// Output directory
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
    output: PathBuf,

    /// Process a single row (1-based, among rows with a subject)
    #[arg(short, long)]
    single: Option<usize>,

    /// Enable debug output
    #[arg(short, long, default_value_t = false)]
    debug: bool,

    /// Subcommands
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Rebuild audio and PDF from edited script.txt files
    Regenerate {
        /// Output directory holding the capsule folders
        #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
        output: PathBuf,

        /// Capsule number, e.g. 001
        #[arg(long)]
        capsule: Option<String>,

        /// Only rebuild the audio
        #[arg(long, conflicts_with = "pdf_only")]
        audio_only: bool,

        /// Only rebuild the PDF
        #[arg(long)]
        pdf_only: bool,

        /// Enable debug output
        #[arg(short, long, default_value_t = false)]
        debug: bool,
    },
    /// Show what a script becomes, offline
    Preview {
        /// Path to a script.txt
        script: PathBuf,

        /// Show the speech segments instead of the document body
        #[arg(long)]
        speech: bool,

        /// Segment budget in characters (default from config)
        #[arg(long)]
        budget: Option<usize>,
    },
    /// List the voices available for a language
    Voices {
        /// Language code
        #[arg(long, default_value = "fr-FR")]
        language: String,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Set the narration voice
    SetVoice {
        /// Voice name, e.g. fr-FR-Standard-B
        name: String,
    },
    /// Set the speech segment budget
    SetBudget {
        /// Characters per synthesis request (max 5000)
        value: usize,
    },
    /// Set the LLM model
    SetModel {
        /// Model name, e.g. gemini-1.5-pro
        model: String,
    },
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .target(env_logger::Target::Stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle subcommands
    match &args.command {
        Some(Commands::Config { action }) => {
            return handle_config_command(action);
        }
        Some(Commands::Preview {
            script,
            speech,
            budget,
        }) => {
            return handle_preview(script, *speech, *budget);
        }
        Some(Commands::Voices { language }) => {
            init_logging(args.debug);
            return handle_voices(language).await;
        }
        Some(Commands::Regenerate {
            output,
            capsule,
            audio_only,
            pdf_only,
            debug,
        }) => {
            init_logging(*debug);
            let scope = RegenerateScope::from_flags(*audio_only, *pdf_only);
            return handle_regenerate(output, capsule.as_deref(), scope).await;
        }
        None => {}
    }

    init_logging(args.debug);

    let workbook = args
        .workbook
        .clone()
        .ok_or_else(|| anyhow::anyhow!("Workbook path is required. Run 'capsules --help' for usage."))?;

    if !workbook.exists() {
        anyhow::bail!("Workbook not found: {}", workbook.display());
    }

    let config = CapsuleConfig::load().context("Failed to load configuration")?;

    if args.debug {
        eprintln!("Workbook: {}", workbook.display());
        eprintln!("Output: {}", args.output.display());
        eprintln!("Model: {}", config.llm.model);
        eprintln!("Voice: {}", config.speech.voice);
        eprintln!("Segment budget: {}", config.speech.segment_budget);
    }

    let rows = manifest::read_workbook(&workbook)?;
    let stats = manifest::summary_stats(&rows);
    eprintln!(
        "Rows: {}, with links: {}, links: {}",
        stats.total_rows, stats.rows_with_links, stats.total_links
    );
    for row in &rows {
        for problem in row.validate() {
            log::warn!("Row {}: {}", row.sheet_row, problem);
        }
    }

    let provider = llm_client::get_provider(&config.llm).context("Failed to set up the LLM provider")?;
    let generator = ContentGenerator::new(provider, config.retry.clone());
    let scraper = Scraper::new(config.scrape.clone(), config.retry.clone())?;
    let renderer = CapsuleRenderer::from_config(&config).with_progress(args.single.is_some());
    let runner = CapsuleRunner::new(scraper, generator, renderer, args.output.clone());

    std::fs::create_dir_all(runner.output_dir())
        .with_context(|| format!("Failed to create {}", runner.output_dir().display()))?;

    if let Some(n) = args.single {
        let row = n
            .checked_sub(1)
            .and_then(|i| rows.get(i))
            .ok_or_else(|| anyhow::anyhow!("Invalid row number {} (1-{})", n, rows.len()))?;

        let output = runner.process_row(row).await?;
        eprintln!("Capsule written to {}", output.dir.display());
        eprintln!("  document: {}", output.document.path().display());
        eprintln!("  audio: {}", output.audio.path().display());
        return Ok(());
    }

    let summary = runner.run_batch(&rows, &workbook).await?;
    eprintln!(
        "\nCompleted: {}, Failed: {} ({:.1}%)",
        summary.successes(),
        summary.failures(),
        summary.success_rate()
    );
    eprintln!(
        "Report: {}",
        runner.output_dir().join(pipeline::report::REPORT_FILE).display()
    );

    Ok(())
}

async fn handle_regenerate(output: &Path, capsule: Option<&str>, scope: RegenerateScope) -> Result<()> {
    if !output.is_dir() {
        anyhow::bail!("Output directory not found: {}", output.display());
    }

    let config = CapsuleConfig::load().context("Failed to load configuration")?;
    let renderer = CapsuleRenderer::from_config(&config).with_progress(true);
    let results = regenerate::regenerate(&renderer, output, capsule, scope).await?;

    println!("{}", "=".repeat(60));
    println!("REGENERATION SUMMARY");
    println!("{}", "=".repeat(60));
    let ok = results.iter().filter(|r| r.is_success()).count();
    println!("Capsules: {}", results.len());
    println!("Succeeded: {}", ok);
    println!("Failed: {}", results.len() - ok);
    for result in &results {
        let status = if result.is_success() { "OK" } else { "ERROR" };
        println!("  [{}] {}", status, result.capsule);
        for error in &result.errors {
            println!("    - {}", error);
        }
    }

    if ok < results.len() {
        anyhow::bail!("{} capsule(s) could not be fully regenerated", results.len() - ok);
    }
    Ok(())
}

fn handle_preview(script: &Path, speech: bool, budget: Option<usize>) -> Result<()> {
    let narrative = std::fs::read_to_string(script)
        .with_context(|| format!("Failed to read {}", script.display()))?;

    if speech {
        let budget = match budget {
            Some(b) => b,
            None => CapsuleConfig::load()?.speech.segment_budget,
        };
        let normalized = text::normalize_for_speech(&narrative);
        let segments = text::process_narrative(&normalized, budget);
        for segment in &segments {
            println!(
                "--- segment {}/{} ({} chars) ---",
                segment.index + 1,
                segments.len(),
                segment.text.chars().count()
            );
            println!("{}\n", segment.text);
        }
    } else {
        let body = document::format_document(&narrative);
        println!("{}", body.to_plain_text());
        eprintln!("\n{} block(s), {} QCM", body.blocks.len(), body.quizzes().count());
    }
    Ok(())
}

async fn handle_voices(language: &str) -> Result<()> {
    let config = CapsuleConfig::load()?;
    let backend = tts::GoogleTtsBackend::from_settings(
        config.speech.api_key.as_deref(),
        config.speech.base_url.as_deref(),
    )?;

    let voices = backend.list_voices(language).await?;
    if voices.is_empty() {
        println!("No voice found for {}", language);
    }
    for voice in voices {
        let marker = if voice.name == config.speech.voice { " *" } else { "" };
        println!("{:<28} {:<8} {}{}", voice.name, voice.ssml_gender, voice.language_codes.join(","), marker);
    }
    Ok(())
}

fn handle_config_command(action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = CapsuleConfig::load()?;
            println!("Configuration file: {:?}", CapsuleConfig::config_path()?);
            println!();
            println!("[speech]");
            println!("voice = \"{}\"", config.speech.voice);
            println!("gender = {}", config.speech.gender.as_str());
            println!("speaking_rate = {}", config.speech.speaking_rate);
            println!("pitch = {}", config.speech.pitch);
            println!("segment_budget = {}", config.speech.segment_budget);
            println!("pause_ms = {}", config.speech.pause_ms);
            println!(
                "api_key = {}",
                if config.speech.api_key.is_some() { "(set)" } else { "(from environment)" }
            );
            println!();
            println!("[llm]");
            println!("provider = \"{}\"", config.llm.provider);
            println!("model = \"{}\"", config.llm.model);
            println!("temperature = {}", config.llm.temperature);
            println!();
            println!("[retry]");
            println!("max_attempts = {}", config.retry.max_attempts);
            println!("initial_delay_ms = {}", config.retry.initial_delay_ms);
            println!();
            println!("[typeset]");
            println!("program = \"{}\"", config.typeset.program);
            println!();
            println!("[audio]");
            println!("ffmpeg = \"{}\"", config.audio.ffmpeg);
        }
        ConfigAction::SetVoice { name } => {
            let mut config = CapsuleConfig::load()?;
            config.speech.voice = name.clone();
            config.save()?;
            println!("Default voice set to: {}", name);
        }
        ConfigAction::SetBudget { value } => {
            let mut config = CapsuleConfig::load()?;
            config.speech.segment_budget = (*value).clamp(1, MAX_SEGMENT_BUDGET);
            config.save()?;
            println!("Segment budget set to: {}", config.speech.segment_budget);
        }
        ConfigAction::SetModel { model } => {
            let mut config = CapsuleConfig::load()?;
            config.llm.model = model.clone();
            config.save()?;
            println!("Model set to: {}", model);
        }
    }
    Ok(())
}
