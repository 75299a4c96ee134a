//! Command-line front end.
//!
//! Every command works on a project file: it is loaded into a fresh session,
//! the command runs, and the project is written back when something changed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use singsong_core::{
    EngineConfig, EqSettings, ExportKind, Role, Session, SongId, TrackId, load_project_metadata,
};
use singsong_engine::{CpalCapture, OfflineOutput};

#[derive(Parser)]
#[command(name = "singsong", about = "Record, shape and mix songs one track at a time")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty project
    New {
        project: PathBuf,
        #[arg(short, long)]
        title: Option<String>,
    },
    /// Record a new track from the default input device
    Record {
        project: PathBuf,
        #[arg(short, long)]
        role: Option<Role>,
        #[arg(short, long)]
        name: Option<String>,
        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(short, long)]
        seconds: Option<f64>,
    },
    /// Add a track from an audio file, shaped as if it had been recorded
    Import {
        project: PathBuf,
        file: PathBuf,
        #[arg(short, long)]
        role: Option<Role>,
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Summarize a project without decoding its audio
    Info { project: PathBuf },
    /// List tracks and their mix settings
    Tracks { project: PathBuf },
    /// Change a track's mix settings
    Mix {
        project: PathBuf,
        track: TrackId,
        #[arg(long)]
        volume: Option<f32>,
        #[arg(long, allow_hyphen_values = true)]
        pan: Option<f32>,
        #[arg(long, allow_hyphen_values = true)]
        bass: Option<f32>,
        #[arg(long, allow_hyphen_values = true)]
        mids: Option<f32>,
        #[arg(long, allow_hyphen_values = true)]
        treble: Option<f32>,
        #[arg(long)]
        compressor: Option<bool>,
        /// Flip the mute flag
        #[arg(long)]
        toggle_mute: bool,
        /// Flip the solo flag
        #[arg(long)]
        toggle_solo: bool,
    },
    /// Rename the song
    Rename { project: PathBuf, title: String },
    /// Invite a collaborator and print the share link
    Invite {
        project: PathBuf,
        handle: String,
        #[arg(long, default_value = "https://singsong.app/")]
        base: String,
    },
    /// Export the mix (wav, mp3) or the project file (aff)
    Export {
        project: PathBuf,
        #[arg(short, long, default_value = "mp3")]
        format: ExportKind,
        /// Directory to write into
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
    /// Play one track, or every audible track
    Play {
        project: PathBuf,
        #[arg(short, long)]
        track: Option<TrackId>,
    },
    /// Run the metronome
    Metronome {
        #[arg(short, long, default_value_t = 10.0)]
        seconds: f64,
    },
    /// Print the engine settings in effect
    Config {
        /// Write them to the user config file
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = EngineConfig::load();

    match cli.command {
        Commands::New { project, title } => {
            let session = offline_session(config);
            let song = session.create_song(title.as_deref());
            session.save_project(song, &project).await?;
            println!("created {}", project.display());
        }
        Commands::Record {
            project,
            role,
            name,
            seconds,
        } => {
            let session = Session::with_default_devices(config)?;
            let song = open(&session, &project).await?;
            record(&session, song, role, name, seconds).await?;
            session.save_project(song, &project).await?;
        }
        Commands::Import {
            project,
            file,
            role,
            name,
        } => {
            let session = offline_session(config);
            let song = open(&session, &project).await?;
            let bytes = std::fs::read(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let extension = file
                .extension()
                .and_then(|ext| ext.to_str())
                .map(str::to_string);
            let track = session
                .import_capture(song, role, name, bytes, extension)
                .await?;
            session.save_project(song, &project).await?;
            println!("added track {track}");
        }
        Commands::Info { project } => {
            let meta = load_project_metadata(&project)
                .with_context(|| format!("failed to read {}", project.display()))?;
            println!("{}", meta.title);
            println!("tracks:  {}", meta.track_count);
            println!("invited: {}", meta.invited_count);
            println!("updated: {}", meta.updated_at.format("%Y-%m-%d %H:%M UTC"));
        }
        Commands::Tracks { project } => {
            let session = offline_session(config);
            let song = open(&session, &project).await?;
            print_tracks(&session, song)?;
        }
        Commands::Mix {
            project,
            track,
            volume,
            pan,
            bass,
            mids,
            treble,
            compressor,
            toggle_mute,
            toggle_solo,
        } => {
            let session = offline_session(config);
            let song = open(&session, &project).await?;

            if let Some(volume) = volume {
                session.set_volume(song, track, volume)?;
            }
            if let Some(pan) = pan {
                session.set_pan(song, track, pan)?;
            }
            if bass.is_some() || mids.is_some() || treble.is_some() {
                let snapshot = session.song(song)?;
                let current = snapshot
                    .track(track)
                    .map(|t| t.eq)
                    .unwrap_or_default();
                let eq = EqSettings::new(
                    bass.unwrap_or(current.bass),
                    mids.unwrap_or(current.mids),
                    treble.unwrap_or(current.treble),
                );
                session.set_eq(song, track, eq)?;
            }
            if let Some(on) = compressor {
                session.set_compressor(song, track, on)?;
            }
            if toggle_mute {
                session.toggle_mute(song, track)?;
            }
            if toggle_solo {
                session.toggle_solo(song, track)?;
            }

            session.save_project(song, &project).await?;
            print_tracks(&session, song)?;
        }
        Commands::Rename { project, title } => {
            let session = offline_session(config);
            let song = open(&session, &project).await?;
            session.rename_song(song, &title)?;
            session.save_project(song, &project).await?;
        }
        Commands::Invite {
            project,
            handle,
            base,
        } => {
            let session = offline_session(config);
            let song = open(&session, &project).await?;
            session.invite(song, &handle)?;
            session.save_project(song, &project).await?;
            println!("{}", session.invite_link(song, &base)?);
        }
        Commands::Export {
            project,
            format,
            out,
        } => {
            let session = offline_session(config);
            let song = open(&session, &project).await?;
            let export = session.export(song, format).await?;
            let path = out.join(&export.file_name);
            std::fs::write(&path, &export.bytes)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("wrote {} ({})", path.display(), export.mime_type());
        }
        Commands::Play { project, track } => {
            let session = Session::with_default_devices(config)?;
            let song = open(&session, &project).await?;
            play(&session, song, track).await?;
        }
        Commands::Metronome { seconds } => {
            let session = Session::with_default_devices(config)?;
            session.toggle_metronome();
            wait(Some(seconds)).await?;
            session.toggle_metronome();
        }
        Commands::Config { save } => {
            print!("{}", toml::to_string_pretty(&config)?);
            if save {
                let path = config.save()?;
                println!("saved {}", path.display());
            }
        }
    }

    Ok(())
}

/// A session without an output device, for commands that never make sound.
fn offline_session(config: EngineConfig) -> Session {
    Session::new(
        config,
        Arc::new(OfflineOutput::new(44100, 2)),
        Arc::new(CpalCapture),
    )
}

async fn open(session: &Session, project: &Path) -> Result<SongId> {
    let loaded = session
        .load_project(project)
        .await
        .with_context(|| format!("failed to open {}", project.display()))?;
    for offline in &loaded.offline_tracks {
        eprintln!(
            "warning: track '{}' is offline ({}): {}",
            offline.name, offline.reference, offline.error
        );
    }
    Ok(loaded.id)
}

async fn wait(seconds: Option<f64>) -> Result<()> {
    match seconds {
        Some(seconds) => tokio::time::sleep(Duration::from_secs_f64(seconds.max(0.0))).await,
        None => tokio::signal::ctrl_c().await?,
    }
    Ok(())
}

async fn record(
    session: &Session,
    song: SongId,
    role: Option<Role>,
    name: Option<String>,
    seconds: Option<f64>,
) -> Result<()> {
    let capture = session.start_capture(song, role, name).await?;
    println!("Recording: {} ({})", capture.name(), capture.role());

    let mut levels = capture.levels();
    let meter = tokio::spawn(async move {
        while levels.changed().await.is_ok() {
            let peak = levels.borrow_and_update().peak;
            let width = (peak.min(1.0) * 40.0) as usize;
            eprint!("\r[{:<40}]", "#".repeat(width));
        }
    });

    wait(seconds).await?;
    let track = capture.stop().await?;
    meter.abort();
    eprintln!();
    println!("added track {track}");
    Ok(())
}

async fn play(session: &Session, song: SongId, track: Option<TrackId>) -> Result<()> {
    let snapshot = session.song(song)?;
    let started = match track {
        Some(track) => usize::from(session.play_track(song, track).await?),
        None => session.play_all(song).await?,
    };
    if started == 0 {
        println!("nothing to play");
        return Ok(());
    }

    let longest = snapshot
        .tracks()
        .iter()
        .filter(|t| track.is_none_or(|id| id == t.id))
        .map(|t| t.processed_audio.pcm.duration_secs())
        .fold(0.0, f64::max);
    tokio::time::sleep(Duration::from_secs_f64(longest + 0.2)).await;
    Ok(())
}

fn print_tracks(session: &Session, song: SongId) -> Result<()> {
    let snapshot = session.song(song)?;
    let active = session.active_tracks(song)?;

    println!("{} ({} tracks)", snapshot.title(), snapshot.tracks().len());
    for track in snapshot.tracks() {
        let flags = format!(
            "{}{}{}",
            if track.mute { "M" } else { "-" },
            if track.solo { "S" } else { "-" },
            if track.compressor_on { "C" } else { "-" },
        );
        println!(
            "{} {} {:<20} {:<6} vol {:.2} pan {:+.2} eq {:+.1}/{:+.1}/{:+.1} {:.1}s{}",
            track.id,
            flags,
            track.name,
            track.role.as_str(),
            track.volume,
            track.pan,
            track.eq.bass,
            track.eq.mids,
            track.eq.treble,
            track.processed_audio.pcm.duration_secs(),
            if active.contains(&track.id) { "  audible" } else { "" },
        );
    }
    Ok(())
}
