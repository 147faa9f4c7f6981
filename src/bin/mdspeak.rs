//! `mdspeak`: speak Markdown documents aloud or export them to MP3.
//!
//! Usage:
//!   mdspeak convert notes.md intro.txt [-o speech.txt]
//!   mdspeak play notes.md [--rate 160] [--volume 0.8]
//!   mdspeak export notes.md -o notes.mp3 [--chunk-chars 180] [--backend ssml]
//!
//! While `play` runs, commands are read from stdin one per line:
//! `stop`, `play`, `status`, `rate N`, `volume V`, `quit`.
//!
//! Logging goes to stderr; set `RUST_LOG` (default `mdspeak=info`).

use std::{
    io::BufRead,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::{
        mpsc::{self, RecvTimeoutError, TryRecvError},
        Arc,
    },
    thread,
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use mdspeak::{
    synth, Backend, Conversion, DocumentSet, EspeakCommand, Exporter, PlaybackDriver,
    PlaybackEvent, PlaybackState, Settings, SpeakError,
};

#[derive(Parser)]
#[command(name = "mdspeak")]
#[command(about = "Speak Markdown and text documents aloud, or export them to MP3")]
#[command(version)]
struct Cli {
    /// Settings file (JSON); defaults to $MDSPEAK_CONFIG
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the formatted speech text and its language
    Convert {
        /// .md / .markdown / .txt files, in reading order
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Write the text to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Speak the documents through the local speech engine
    Play {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Words per minute (100–300)
        #[arg(long)]
        rate: Option<u32>,
        /// Volume (0–1)
        #[arg(long)]
        volume: Option<f32>,
    },
    /// Synthesize the documents into one MP3 file
    Export {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Destination file
        #[arg(short, long)]
        output: PathBuf,
        /// Characters per synthesis request
        #[arg(long)]
        chunk_chars: Option<usize>,
        #[arg(long, value_enum)]
        backend: Option<Backend>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("mdspeak=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Convert { files, output } => {
            let conversion = convert(&files, &settings)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &conversion.text)
                        .with_context(|| format!("Cannot write '{}'", path.display()))?;
                    println!("Wrote {} (language: {})", path.display(), conversion.language);
                }
                None => {
                    eprintln!("language: {}", conversion.language);
                    println!("{}", conversion.text);
                }
            }
        }
        Commands::Play { files, rate, volume } => {
            if let Some(rate) = rate {
                settings.playback.rate = rate;
            }
            if let Some(volume) = volume {
                settings.playback.volume = volume;
            }
            settings.validate()?;
            let conversion = convert(&files, &settings)?;
            play(&conversion, &settings)?;
        }
        Commands::Export { files, output, chunk_chars, backend } => {
            if let Some(n) = chunk_chars {
                settings.export.chunk_chars = n;
            }
            if let Some(b) = backend {
                settings.synth.backend = b;
            }
            settings.validate()?;
            let conversion = convert(&files, &settings)?;
            export(&conversion, &settings, &output)?;
        }
    }
    Ok(())
}

/// State conflicts are warnings; everything else is an error.
fn report(err: &anyhow::Error) {
    match err.downcast_ref::<SpeakError>() {
        Some(e) if e.is_warning() => eprintln!("warning: {}", e),
        _ => eprintln!("error: {:#}", err),
    }
}

fn convert(files: &[PathBuf], settings: &Settings) -> Result<Conversion> {
    let mut docs = DocumentSet::new();
    for file in files {
        docs.add(file)?;
    }
    Ok(docs.convert(&settings.formatter(), &settings.detector())?)
}

fn export(conversion: &Conversion, settings: &Settings, output: &Path) -> Result<()> {
    let synth = synth::from_settings(&settings.synth)?;
    let report = Exporter::new(synth.as_ref())
        .with_chunk_chars(settings.export.chunk_chars)
        .export(&conversion.text, &conversion.language, output)?;
    println!(
        "Exported {} chunk(s), {} bytes → {}",
        report.chunks,
        report.bytes,
        report.path.display()
    );
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Interactive playback
// ─────────────────────────────────────────────────────────────────────────────

const TICK: Duration = Duration::from_millis(50);

enum Flow {
    Continue,
    Quit,
}

fn play(conversion: &Conversion, settings: &Settings) -> Result<()> {
    let engine = EspeakCommand::new(settings.playback.engine.clone());
    if !engine.is_available() {
        return Err(SpeakError::EngineUnavailable(format!(
            "'{}' not found on $PATH (install espeak-ng)",
            engine.program()
        ))
        .into());
    }

    let (driver, events) = PlaybackDriver::new(Arc::new(engine));
    let mut driver = driver
        .with_voices(settings.playback.voices.clone())
        .with_pause(settings.playback.pause());
    driver.set_rate(settings.playback.rate);
    driver.set_volume(settings.playback.volume);
    driver.start(&conversion.text, &conversion.language)?;

    let (line_tx, lines) = mpsc::channel::<String>();
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });

    let mut stdin_open = true;
    loop {
        match events.recv_timeout(TICK) {
            Ok(PlaybackEvent::Started { language }) => println!("playing ({})", language),
            Ok(PlaybackEvent::Stopped) => println!("stopped"),
            Ok(PlaybackEvent::Finished) => {
                println!("finished");
                return Ok(());
            }
            Ok(PlaybackEvent::Failed(message)) => return Err(anyhow!("playback failed: {}", message)),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return Ok(()),
        }

        match lines.try_recv() {
            Ok(line) => {
                if let Flow::Quit = command(&mut driver, conversion, line.trim()) {
                    return Ok(());
                }
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                // Nobody can restart playback once stdin is gone.
                if stdin_open {
                    info!("stdin closed; waiting for playback to end");
                    stdin_open = false;
                }
                if driver.status() == PlaybackState::Idle {
                    return Ok(());
                }
            }
        }
    }
}

fn command(driver: &mut PlaybackDriver, conversion: &Conversion, line: &str) -> Flow {
    let mut words = line.split_whitespace();
    let result: Result<()> = match (words.next(), words.next()) {
        (None, _) => Ok(()),
        (Some("stop"), None) => driver.stop().map_err(Into::into),
        (Some("play"), None) => driver.start(&conversion.text, &conversion.language).map_err(Into::into),
        (Some("status"), None) => {
            let prosody = driver.prosody();
            println!(
                "{:?} (rate {} wpm, volume {:.2})",
                driver.status(),
                prosody.rate,
                prosody.volume
            );
            Ok(())
        }
        (Some("rate"), Some(n)) => n
            .parse::<u32>()
            .map(|wpm| driver.set_rate(wpm))
            .with_context(|| format!("invalid rate '{}'", n)),
        (Some("volume"), Some(v)) => v
            .parse::<f32>()
            .map(|vol| driver.set_volume(vol))
            .with_context(|| format!("invalid volume '{}'", v)),
        (Some("quit" | "exit"), None) => return Flow::Quit,
        _ => Err(anyhow!("unknown command '{}' (stop, play, status, rate N, volume V, quit)", line)),
    };
    if let Err(e) = result {
        report(&e);
    }
    Flow::Continue
}
