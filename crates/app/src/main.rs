use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;
use tuneviz_core::{metadata, AudioChunk, AudioEngine, Config, EngineEvent, Track, VisualizerManager};

/// Upper bound on waiting for buffered audio after the decoder finishes.
const DRAIN_LIMIT: Duration = Duration::from_secs(2);

fn main() -> tuneviz_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Play(args) => run_play(args),
        Commands::Visualizers => {
            let manager = VisualizerManager::new();
            for name in manager.list() {
                println!("{name}");
            }
            Ok(())
        }
    }
}

fn run_play(args: PlayArgs) -> tuneviz_core::Result<()> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(kind) = &args.visualizer {
        config.visualizer.kind = kind.clone();
    }
    if args.no_visualizer {
        config.visualizer.enabled = false;
    }

    let tracks = collect_tracks(&args.paths);
    if tracks.is_empty() {
        return Err("no playable files found".into());
    }
    tracing::info!(tracks = tracks.len(), "starting playback");

    let mut engine = if args.headless {
        AudioEngine::headless(config.audio.clone())
    } else {
        AudioEngine::new(config.audio.clone())
    };
    if let Some(volume) = args.volume {
        engine.set_volume(f32::from(volume.min(100)) / 100.0);
    }

    let latest: Arc<Mutex<Option<AudioChunk>>> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&latest);
    engine.register_callback(move |chunk: &AudioChunk| {
        // Never wait on the UI from the audio thread.
        if let Some(mut slot) = sink.try_lock() {
            *slot = Some(chunk.clone());
        }
    });
    let events = engine.subscribe();

    let mut player = Player {
        manager: VisualizerManager::with_config(&config.visualizer),
        show_visualizer: config.visualizer.enabled,
        interval: config.visualizer.frame_interval(),
        width: args.width,
        height: args.height,
        latest,
        data: Vec::new(),
    };

    for track in tracks {
        let title = track.title.clone();
        if !engine.load(track) {
            continue;
        }
        if !engine.play() {
            tracing::warn!(title = %title, "skipping unplayable track");
            continue;
        }
        tracing::info!(title = %title, "now playing");

        let mut drain_started: Option<Instant> = None;
        'playing: loop {
            for event in events.try_iter() {
                match event {
                    EngineEvent::EndOfTrack => drain_started = Some(Instant::now()),
                    EngineEvent::DecodeFailed(reason) => {
                        tracing::warn!(title = %title, %reason, "decode failed; moving on");
                        break 'playing;
                    }
                    EngineEvent::Position { .. } => {}
                }
            }
            if let Some(started) = drain_started {
                if engine.buffered_chunks() == 0 || started.elapsed() >= DRAIN_LIMIT {
                    break;
                }
            }
            player.draw(&engine)?;
            thread::sleep(player.interval);
        }
        engine.stop();
    }

    engine.shutdown();
    println!();
    Ok(())
}

/// Redraw state owned by the UI loop.
struct Player {
    manager: VisualizerManager,
    show_visualizer: bool,
    interval: Duration,
    width: usize,
    height: usize,
    latest: Arc<Mutex<Option<AudioChunk>>>,
    data: Vec<f32>,
}

impl Player {
    fn draw(&mut self, engine: &AudioEngine) -> std::io::Result<()> {
        let status = status_line(engine);
        let mut out = std::io::stdout().lock();

        if !self.show_visualizer {
            write!(out, "\r{status}\x1b[K")?;
            return out.flush();
        }

        if let Some(chunk) = self.latest.lock().take() {
            let sample_rate = engine.current_track().map_or(44_100, |t| t.sample_rate);
            if let Some(data) = self.manager.process(&chunk, sample_rate) {
                self.data = data;
            }
        }
        let rows = self.manager.render(&self.data, self.width, self.height);

        write!(out, "\x1b[H")?;
        for row in rows {
            writeln!(out, "{row}")?;
        }
        writeln!(out, "{status}\x1b[K")?;
        out.flush()
    }
}

fn status_line(engine: &AudioEngine) -> String {
    let title = engine
        .current_track()
        .map(|track| match track.artist.as_str() {
            "" => track.title.clone(),
            artist => format!("{artist} - {}", track.title),
        })
        .unwrap_or_default();
    let volume = if engine.is_muted() {
        "muted".to_string()
    } else {
        format!("{:.0}%", engine.volume() * 100.0)
    };
    format!(
        "{title}  {} / {}  [{volume}]",
        metadata::format_duration(engine.position()),
        metadata::format_duration(engine.duration()),
    )
}

/// Expands directories into their audio files; files are taken as given.
fn collect_tracks(paths: &[PathBuf]) -> Vec<Track> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            match scan_dir(path) {
                Ok(found) => files.extend(found),
                Err(err) => tracing::warn!(path = %path.display(), %err, "cannot read directory"),
            }
        } else {
            files.push(path.clone());
        }
    }
    files.into_iter().map(metadata::extract).collect()
}

fn scan_dir(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && metadata::is_audio_file(&path) {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Terminal music player with audio visualizers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play files or directories of audio in order.
    Play(PlayArgs),
    /// List the available visualizers.
    Visualizers,
}

#[derive(clap::Args, Debug)]
struct PlayArgs {
    /// Audio files or directories to play.
    #[arg(required = true)]
    paths: Vec<PathBuf>,
    /// JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Initial volume, 0-100.
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    volume: Option<u8>,
    /// Visualizer shown at startup.
    #[arg(long)]
    visualizer: Option<String>,
    /// Only print the status line.
    #[arg(long)]
    no_visualizer: bool,
    /// Decode and pace playback without opening an audio device.
    #[arg(long)]
    headless: bool,
    #[arg(long, default_value_t = 80)]
    width: usize,
    #[arg(long, default_value_t = 20)]
    height: usize,
}
