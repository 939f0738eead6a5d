//! pdf2audio - Convert a folder of PDFs into narrated MP3 audiobooks

mod audio;
mod batch;
mod bootstrap;
mod config;
mod extract;
mod text;
mod tts;

use anyhow::{Context, Result};
use batch::{BatchDriver, Document, discover_inputs};
use bootstrap::Capabilities;
use clap::{Parser, Subcommand};
use config::{BatchSettings, ConverterConfig};
use extract::DocumentExtractor;
use extract::ocr::{OcrEngine, TesseractOcr};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};
use std::sync::Arc;
use tts::Voice;

#[derive(Parser, Debug)]
#[command(name = "pdf2audio")]
#[command(about = "Convert a folder of PDFs into MP3 audiobooks using Kokoro TTS", long_about = None)]
#[command(version)]
struct Args {
    /// Directory to scan for PDFs and images (default: input/)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Directory for the generated MP3s (default: output/)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also look for documents in subdirectories
    #[arg(short, long, default_value_t = false)]
    recursive: bool,

    /// Voice to narrate with (overrides config)
    #[arg(long, value_enum)]
    voice: Option<Voice>,

    /// Write a JSON summary of the run to this file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long, default_value_t = false)]
    debug: bool,

    /// Subcommands
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Download Python, FFmpeg and Kokoro TTS
    Setup {
        /// Don't ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Show installed components and capabilities
    Status,
    /// Remove everything installed by setup
    Uninstall {
        /// Also remove cached Kokoro model weights
        #[arg(long)]
        models: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Set default voice
    SetVoice {
        #[arg(value_enum)]
        voice: Voice,
    },
    /// Set default speaking rate
    SetSpeed {
        /// Value (0.5-2.0)
        value: f32,
    },
    /// Set the character budget per chunk
    SetChunkSize {
        value: usize,
    },
    /// Set the pause between chunks
    SetSilence {
        /// Milliseconds
        ms: u64,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.debug);

    #[cfg(feature = "kokoro")]
    if args.command.is_none() {
        if let Some(home) = tts::kokoro::missing_python_home() {
            return relaunch_with_python_home(&home);
        }
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(run(args));
    // Abandoned extractions may still occupy blocking threads.
    runtime.shutdown_background();

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Run this binary again with `PYTHONHOME` set and pass on its exit status.
#[cfg_attr(not(feature = "kokoro"), allow(dead_code))]
fn relaunch_with_python_home(home: &Path) -> ExitCode {
    let status = std::env::current_exe().and_then(|exe| {
        log::debug!("Relaunching with PYTHONHOME={}", home.display());
        relaunch_command(&exe, std::env::args_os().skip(1), home).status()
    });

    match status {
        Ok(status) if status.success() => ExitCode::SUCCESS,
        Ok(status) => ExitCode::from(status.code().unwrap_or(1) as u8),
        Err(e) => {
            eprintln!("Error: failed to start with the bundled Python: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg_attr(not(feature = "kokoro"), allow(dead_code))]
fn relaunch_command(
    exe: &Path,
    args: impl IntoIterator<Item = std::ffi::OsString>,
    home: &Path,
) -> Command {
    let mut cmd = Command::new(exe);
    cmd.args(args).env("PYTHONHOME", home);
    cmd
}

fn init_logging(debug: bool) {
    let default_filter = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

async fn run(args: Args) -> Result<ExitCode> {
    match &args.command {
        Some(Commands::Config { action }) => {
            handle_config_command(action)?;
            return Ok(ExitCode::SUCCESS);
        }
        Some(Commands::Setup { yes }) => {
            bootstrap::run_setup(*yes).await?;
            return Ok(ExitCode::SUCCESS);
        }
        Some(Commands::Status) => {
            print!("{}", bootstrap::get_info()?);
            return Ok(ExitCode::SUCCESS);
        }
        Some(Commands::Uninstall { models }) => {
            handle_uninstall(*models)?;
            return Ok(ExitCode::SUCCESS);
        }
        None => {}
    }

    convert(&args).await
}

async fn convert(args: &Args) -> Result<ExitCode> {
    let config = ConverterConfig::load().context("Failed to load configuration")?;

    let caps = Capabilities::probe();
    caps.require_pipeline()?;
    if !caps.ocr {
        log::warn!(
            "OCR unavailable (install tesseract and poppler-utils); scanned PDFs and images will be skipped"
        );
    }

    let mut settings = BatchSettings::from_config(&config, caps.ocr);
    if let Some(input) = &args.input {
        settings.input_dir = input.clone();
    }
    if let Some(output) = &args.output {
        settings.output_dir = output.clone();
    }
    if let Some(voice) = args.voice {
        settings.synthesis = settings.synthesis.with_voice(voice);
    }
    settings.recursive = args.recursive;

    if args.debug {
        eprintln!("Input: {}", settings.input_dir.display());
        eprintln!("Output: {}", settings.output_dir.display());
        eprintln!("Voice: {}", settings.synthesis.voice);
        eprintln!("Speed: {}", settings.synthesis.speed);
        eprintln!("Chunk size: {}", settings.max_chunk_chars);
    }

    let documents: Vec<Document> =
        discover_inputs(&settings.input_dir, settings.recursive, settings.ocr_available)?
            .into_iter()
            .map(Document::new)
            .collect();

    if documents.is_empty() {
        if settings.input_dir.is_dir() {
            let kinds = if settings.ocr_available { "PDF or image" } else { "PDF" };
            eprintln!("No {} files found in {}", kinds, settings.input_dir.display());
        } else {
            eprintln!(
                "Input directory {} does not exist. Create it and add some PDFs.",
                settings.input_dir.display()
            );
        }
        return Ok(ExitCode::SUCCESS);
    }

    eprintln!(
        "Found {} document(s) in {}",
        documents.len(),
        settings.input_dir.display()
    );

    let ocr = settings
        .ocr_available
        .then(|| Arc::new(TesseractOcr::new(&config.ocr_language)) as Arc<dyn OcrEngine>);
    let extractor = DocumentExtractor::new(config.min_text_chars, ocr);

    eprintln!("Loading Kokoro TTS ({})...", config.device);
    let synthesizer = tts::create_backend(&config.device)?;
    log::debug!("TTS backend: {}", synthesizer.name());

    let driver = BatchDriver::new(
        Arc::new(extractor),
        Arc::from(synthesizer),
        Arc::new(audio::FfmpegMp3Encoder::new()),
        settings,
    );
    let summary = driver.run(&documents).await?;

    eprintln!();
    eprintln!(
        "Done in {}s: {} succeeded, {} failed",
        summary.elapsed().num_seconds(),
        summary.succeeded(),
        summary.failed()
    );
    for failure in summary.failures() {
        if let batch::DocumentOutcome::Failed { reason, .. } = &failure.outcome {
            eprintln!("  {}: {}", failure.name, reason);
        }
    }

    if let Some(report) = &args.report {
        summary.write_report(report)?;
        eprintln!("Report written to {}", report.display());
    }

    Ok(if summary.failed() == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn handle_config_command(action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = ConverterConfig::load()?;
            println!("Configuration file: {:?}", ConverterConfig::config_path()?);
            println!();
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::SetVoice { voice } => {
            let mut config = ConverterConfig::load()?;
            config.voice = *voice;
            config.save()?;
            println!("Default voice set to: {}", voice);
        }
        ConfigAction::SetSpeed { value } => {
            let mut config = ConverterConfig::load()?;
            config.speed = value.clamp(tts::MIN_SPEED, tts::MAX_SPEED);
            config.save()?;
            println!("Default speed set to: {}", config.speed);
        }
        ConfigAction::SetChunkSize { value } => {
            if *value == 0 {
                anyhow::bail!("Chunk size must be greater than zero");
            }
            let mut config = ConverterConfig::load()?;
            config.max_chunk_chars = *value;
            config.save()?;
            println!("Chunk size set to: {} characters", value);
        }
        ConfigAction::SetSilence { ms } => {
            let mut config = ConverterConfig::load()?;
            config.silence_ms = *ms;
            config.save()?;
            println!("Silence between chunks set to: {} ms", ms);
        }
    }
    Ok(())
}

fn handle_uninstall(models: bool) -> Result<()> {
    let stats = bootstrap::clean_all(models)?;
    if !stats.data_removed && !stats.models_removed {
        eprintln!("Nothing to remove.");
        return Ok(());
    }

    eprintln!(
        "Removed {}",
        bootstrap::download::format_bytes(stats.total_size())
    );
    if !models {
        eprintln!("Kokoro model weights were kept; use --models to remove them too.");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_no_arguments_converts() {
        let args = Args::try_parse_from(["pdf2audio"]).unwrap();
        assert!(args.command.is_none());
        assert!(args.input.is_none());
        assert!(!args.recursive);
    }

    #[test]
    fn test_parse_flags() {
        let args = Args::try_parse_from([
            "pdf2audio",
            "--input",
            "papers",
            "--output",
            "books",
            "--recursive",
            "--voice",
            "bm_george",
            "--report",
            "run.json",
        ])
        .unwrap();
        assert_eq!(args.input, Some(PathBuf::from("papers")));
        assert_eq!(args.output, Some(PathBuf::from("books")));
        assert!(args.recursive);
        assert_eq!(args.voice, Some(Voice::BmGeorge));
        assert_eq!(args.report, Some(PathBuf::from("run.json")));
    }

    #[test]
    fn test_parse_config_subcommand() {
        let args = Args::try_parse_from(["pdf2audio", "config", "set-voice", "af_sky"]).unwrap();
        assert!(matches!(
            args.command,
            Some(Commands::Config {
                action: ConfigAction::SetVoice {
                    voice: Voice::AfSky
                }
            })
        ));
    }

    #[test]
    fn test_relaunch_sets_python_home_and_forwards_args() {
        let cmd = relaunch_command(
            Path::new("/opt/pdf2audio"),
            ["--input", "papers"].map(std::ffi::OsString::from),
            Path::new("/data/python"),
        );

        assert_eq!(cmd.get_program(), "/opt/pdf2audio");
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args, vec!["--input", "papers"]);
        let home = cmd
            .get_envs()
            .find(|(key, _)| *key == "PYTHONHOME")
            .and_then(|(_, value)| value);
        assert_eq!(home, Some(std::ffi::OsStr::new("/data/python")));
    }

    #[test]
    fn test_unknown_voice_rejected() {
        assert!(Args::try_parse_from(["pdf2audio", "--voice", "robot"]).is_err());
    }
}
