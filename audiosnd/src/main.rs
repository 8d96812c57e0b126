//! AudioSND command-line tool
//!
//! Inspect, generate, mix and play WAV files, and list audio devices.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use audiosnd::config::ToolConfig;
use audiosnd::device::AudioDevice;
use audiosnd::format::utils::format_from_name;
use audiosnd::generator::{generate, GeneratorConfig, WaveType};
use audiosnd::mixer::mix_tracks;
use audiosnd::{AudioEngine, Source, TrackStatus};

/// Command-line arguments for audiosnd
#[derive(Parser, Debug)]
#[command(name = "audiosnd")]
#[command(about = "Embeddable audio engine tool")]
#[command(version)]
struct Args {
    /// Tool configuration file
    #[arg(short, long, default_value = "audiosnd.toml", env = "AUDIOSND_CONFIG")]
    config: PathBuf,

    /// Log filter, overrides the configured level
    #[arg(long, env = "AUDIOSND_LOG")]
    log: Option<String>,

    /// Native library (audio-snd, null)
    #[arg(long)]
    lib: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the format and duration of a WAV file
    Info { file: PathBuf },

    /// Write a generated waveform to a WAV file
    Generate {
        output: PathBuf,

        #[arg(long, default_value = "sine")]
        wave: String,

        #[arg(long, default_value_t = 440.0)]
        frequency: f64,

        #[arg(long, default_value_t = 0.5)]
        amplitude: f64,

        /// Length in milliseconds
        #[arg(long, default_value_t = 1000)]
        millis: u64,

        /// Format name (cd_quality, dvd_audio, studio_24_96, telephone, ...)
        #[arg(long, default_value = "cd_quality")]
        format: String,
    },

    /// Mix WAV files into one
    Mix {
        output: PathBuf,

        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[arg(long, default_value = "cd_quality")]
        format: String,
    },

    /// Play a WAV file on the first suitable output device
    Play {
        file: PathBuf,

        /// Volume between 0 and 1
        #[arg(long, default_value_t = 1.0)]
        volume: f32,
    },

    /// List input and output devices
    Devices,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut tool = ToolConfig::load(&args.config).context("Failed to load tool config")?;
    if let Some(lib) = &args.lib {
        tool.engine.native_lib = Some(lib.clone());
    }

    // Initialize tracing
    let filter = args.log.clone().unwrap_or_else(|| tool.log_filter());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_new(&filter)
                .unwrap_or_else(|_| "audiosnd=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let engine = AudioEngine::new().context("Failed to create audio engine")?;
    engine
        .init(tool.engine_config().context("Failed to load engine settings")?)
        .context("Failed to initialize audio engine")?;

    let result = run(&engine, args.command);
    engine.close().context("Failed to close audio engine")?;
    result
}

fn run(engine: &AudioEngine, command: Command) -> Result<()> {
    match command {
        Command::Info { file } => {
            let track = engine
                .load_track(Source::from(file.as_path()))
                .with_context(|| format!("Failed to load {}", file.display()))?;
            let format = track.format();
            println!("File:        {}", file.display());
            println!("Format:      {}", format);
            println!("Channels:    {}", format.channels());
            println!("Sample rate: {} Hz", format.sample_rate());
            println!("Bit depth:   {}", format.bits_per_sample());
            println!("Bit rate:    {} bps", format.bit_rate());
            println!("Frames:      {}", track.frame_count());
            println!("Duration:    {:.3} s", track.duration().as_secs_f64());
        }

        Command::Generate {
            output,
            wave,
            frequency,
            amplitude,
            millis,
            format,
        } => {
            let format = format_from_name(&format);
            let wave: WaveType = wave.parse()?;
            let config = GeneratorConfig::builder()
                .channels(format.channels())
                .frequency(frequency)
                .amplitude(amplitude)
                .wave_type(wave)
                .build();
            let track = generate(Duration::from_millis(millis), &format, &config)?;
            engine
                .export_track_to_path(&track, &output)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            info!("Wrote {} ({}, {} ms)", output.display(), wave, millis);
        }

        Command::Mix {
            output,
            inputs,
            format,
        } => {
            let mut tracks = Vec::with_capacity(inputs.len());
            for input in &inputs {
                let track = engine
                    .load_track(Source::from(input.as_path()))
                    .with_context(|| format!("Failed to load {}", input.display()))?;
                tracks.push(Arc::new(track));
            }
            let mixed = mix_tracks(&tracks, &format_from_name(&format))?;
            engine
                .export_track_to_path(&mixed, &output)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            info!("Mixed {} tracks into {}", tracks.len(), output.display());
        }

        Command::Play { file, volume } => {
            let track = engine
                .load_track(Source::from(file.as_path()))
                .with_context(|| format!("Failed to load {}", file.display()))?;
            let limit = track.duration() + Duration::from_secs(5);
            let player = engine.get_track_player(Arc::new(track))?;
            player.set_volume(volume)?;
            info!(
                "Playing {} on '{}'",
                file.display(),
                player.device().device_info().name
            );
            player.play()?;

            let started = Instant::now();
            while player.status() == TrackStatus::Playing {
                if started.elapsed() > limit {
                    player.close()?;
                    bail!("Playback did not finish within {:?}", limit);
                }
                thread::sleep(Duration::from_millis(50));
            }
            player.close()?;
        }

        Command::Devices => {
            println!("Output devices:");
            for device in engine.available_output_devices()? {
                println!("  {}", device.device_info());
            }
            println!("Input devices:");
            for device in engine.available_input_devices()? {
                println!("  {}", device.device_info());
            }
        }
    }
    Ok(())
}
