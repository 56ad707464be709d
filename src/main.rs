use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use alfred::voice::{
    AudioSink, MicrophoneStream, OutputDevice, PLAYBACK_SAMPLE_RATE, calculate_energy,
};
use alfred::{Config, Coordinator};

/// Alfred - wake-word voice assistant
#[derive(Parser)]
#[command(name = "alfred", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the assistant (default)
    Run,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Speak text through the synthesis backend
    Say {
        /// Text to speak
        #[arg(default_value = "Good evening, sir. All systems are operational.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,alfred=info",
        1 => "info,alfred=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let config = Config::load()?;
            tracing::debug!(?config, "loaded configuration");
            Coordinator::new(config).run().await?;
            Ok(())
        }
        Command::TestMic { duration } => test_mic(duration).await,
        Command::TestSpeaker => test_speaker().await,
        Command::Say { text } => say(&text).await,
    }
}

/// Test microphone input
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut microphone = MicrophoneStream::open()?;
    println!("Sample rate: {} Hz", microphone.sample_rate());
    println!("---");

    for i in 0..duration {
        let mut samples = Vec::new();
        let window = tokio::time::sleep(Duration::from_secs(1));
        tokio::pin!(window);
        loop {
            tokio::select! {
                () = &mut window => break,
                block = microphone.recv() => match block {
                    Some(block) => samples.extend(block),
                    None => anyhow::bail!("microphone stopped delivering audio"),
                },
            }
        }

        let energy = calculate_energy(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    println!("\n---");
    println!("Speech should push RMS above the segmenter threshold (0.03).");
    println!("A flat meter usually means the wrong default source.");
    println!("Check `pactl info` or `arecord -l`.");

    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let mut device = OutputDevice::open()?;

    let frequency = 440.0_f32;
    let num_samples = PLAYBACK_SAMPLE_RATE as usize * 2;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / PLAYBACK_SAMPLE_RATE as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {PLAYBACK_SAMPLE_RATE} Hz...", samples.len());

    device.write(&samples)?;
    device.drain(Duration::from_secs(5)).await;

    println!("\n---");
    println!("No tone? Check the default sink with `pactl info` or `pactl list sinks short`.");

    Ok(())
}

/// Speak text through synthesis and playback
async fn say(text: &str) -> anyhow::Result<()> {
    println!("Speaking: \"{text}\"\n");

    let config = Config::load()?;
    let mut device = OutputDevice::open()?;
    alfred::pipeline::speak(&config.synthesis, text, &mut device).await?;

    println!("\n---");
    println!("Synthesis and playback are working.");

    Ok(())
}
