use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc, watch};
use tracing_subscriber::EnvFilter;

use npc_voice::audio::{self, ScratchDecoder};
use npc_voice::presentation::run_presenter;
use npc_voice::{
    AudioEncoding, Config, DialogueEvent, DialogueMode, DialogueOrchestrator, NullSink,
    PlaybackSink, PresentationState, PresentationStateMachine, RawAudioPayload, SampleBuffer,
    SpeakerSink, TtsProviderKind, TurnOutcome,
};

/// NPC Voice - talk to an NPC and hear it answer
#[derive(Parser)]
#[command(name = "npc-voice", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file (defaults to ~/.config/npc-voice/config.toml)
    #[arg(long, env = "NPC_CONFIG")]
    config: Option<PathBuf>,

    /// TTS provider ("google" or "openai")
    #[arg(long)]
    provider: Option<String>,

    /// TTS voice
    #[arg(long)]
    voice: Option<String>,

    /// TTS model (`OpenAI` only, e.g. "tts-1-hd")
    #[arg(long)]
    model: Option<String>,

    /// Language code (Google only, e.g. "en-GB")
    #[arg(long)]
    language: Option<String>,

    /// Speak input as typed instead of asking the LLM
    #[arg(long)]
    recite: bool,

    /// Discard audio instead of opening an output device
    #[arg(long, env = "NPC_NO_AUDIO")]
    no_audio: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Read lines from stdin and speak the replies (default)
    Chat,
    /// Run a single turn
    Say {
        /// Text to send
        text: String,
    },
    /// Test speaker output
    TestSpeaker,
    /// Decode a local audio file
    Decode {
        /// WAV or MP3 file
        file: PathBuf,
        /// Treat the file as compressed audio regardless of extension
        #[arg(long)]
        compressed: bool,
        /// Write the decoded samples as 16-bit WAV
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,npc_voice=info",
        1 => "info,npc_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
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
    match cli.command {
        Some(Command::Decode {
            ref file,
            compressed,
            ref out,
        }) => decode_file(file, compressed, out.as_deref()).await,
        Some(Command::TestSpeaker) => test_speaker(cli.no_audio).await,
        Some(Command::Say { ref text }) => {
            let config = load_config(&cli)?;
            say(&config, cli.no_audio, text).await
        }
        Some(Command::Chat) | None => {
            let config = load_config(&cli)?;
            chat(&config, cli.no_audio).await
        }
    }
}

/// Load configuration and apply command-line overrides
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;

    if let Some(provider) = &cli.provider {
        config.set_provider(provider.parse::<TtsProviderKind>()?);
    }
    if let Some(voice) = &cli.voice {
        config.tts.voice.voice_id.clone_from(voice);
    }
    if let Some(model) = &cli.model {
        config.tts.voice.model.clone_from(model);
    }
    if let Some(language) = &cli.language {
        config.tts.voice.language_code = Some(language.clone());
    }
    if cli.recite {
        config.mode = DialogueMode::Recite;
    }

    tracing::debug!(
        provider = %config.tts.provider,
        voice = %config.tts.voice.voice_id,
        mode = ?config.mode,
        settle = ?config.playback.settle,
        "loaded configuration"
    );

    Ok(config)
}

fn open_sink(no_audio: bool) -> anyhow::Result<Box<dyn PlaybackSink>> {
    if no_audio {
        tracing::info!("audio disabled, using null sink");
        return Ok(Box::new(NullSink::new()));
    }
    Ok(Box::new(SpeakerSink::new()?))
}

/// Print replies and errors as they arrive
fn print_events(mut events: broadcast::Receiver<DialogueEvent>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(DialogueEvent::Reply { text, .. }) => println!("npc: {text}"),
                Ok(DialogueEvent::Error { kind, detail, .. }) => {
                    eprintln!("error ({kind}): {detail}");
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Interactive loop over stdin
async fn chat(config: &Config, no_audio: bool) -> anyhow::Result<()> {
    let sink = open_sink(no_audio)?;
    let orchestrator = Arc::new(DialogueOrchestrator::from_config(config, sink)?);

    let (state_tx, mut state_rx) = watch::channel(PresentationState::Idle);
    let (input_tx, input_rx) = mpsc::channel::<String>(16);
    let presenter = tokio::spawn(run_presenter(
        PresentationStateMachine::new(config.playback.settle),
        orchestrator.subscribe(),
        input_rx,
        state_tx,
    ));
    let printer = print_events(orchestrator.subscribe());
    tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            let state = *state_rx.borrow_and_update();
            println!("[{state}]");
        }
    });

    println!("Type a message and press enter (ctrl-d to quit)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut turns = Vec::new();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        // The presenter only needs to see that the input changed
        let _ = input_tx.send(line.clone()).await;
        turns.retain(|turn: &tokio::task::JoinHandle<_>| !turn.is_finished());
        turns.push(orchestrator.submit(line));
    }

    // Let the final reply finish speaking; older turns are superseded by then
    if let Some(last) = turns.pop() {
        let _ = last.await;
    }
    for turn in &turns {
        turn.abort();
    }
    for turn in turns {
        let _ = turn.await;
    }

    drop(input_tx);
    drop(orchestrator);
    let _ = presenter.await;
    let _ = printer.await;

    Ok(())
}

/// Run one turn and wait for it to settle
async fn say(config: &Config, no_audio: bool, text: &str) -> anyhow::Result<()> {
    let sink = open_sink(no_audio)?;
    let orchestrator = DialogueOrchestrator::from_config(config, sink)?;
    let printer = print_events(orchestrator.subscribe());

    let outcome = orchestrator.handle_user_input(text).await;
    drop(orchestrator);
    let _ = printer.await;

    match outcome? {
        TurnOutcome::Ignored => println!("Nothing to say"),
        TurnOutcome::Settled { .. } | TurnOutcome::Superseded { .. } => {}
    }
    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker(no_audio: bool) -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let mut sink = open_sink(no_audio)?;

    // Generate 2 seconds of 440Hz sine wave at 24kHz sample rate
    let sample_rate = 24000_u32;
    let frequency = 440.0_f32;
    let duration_secs = 2.0_f32;
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let num_samples = (sample_rate as f32 * duration_secs) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);

    let buffer = SampleBuffer::new(1, sample_rate, samples)?;
    let handle = sink.load(buffer)?;
    sink.play(handle)?;
    while sink.is_playing(handle) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");
    println!("  3. Try: pavucontrol (to check output levels)");

    Ok(())
}

/// Decode a local file and report its shape
async fn decode_file(path: &Path, compressed: bool, out: Option<&Path>) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(path).await?;

    let is_mp3 = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("mp3"));
    let encoding = if compressed || is_mp3 {
        AudioEncoding::Compressed
    } else {
        AudioEncoding::Pcm16Wav
    };

    let payload = RawAudioPayload::new(bytes, encoding);
    let buffer = audio::decode(payload, &ScratchDecoder::new()).await?;

    println!("File:        {}", path.display());
    println!("Encoding:    {encoding}");
    println!("Channels:    {}", buffer.channels());
    println!("Sample rate: {} Hz", buffer.sample_rate());
    println!("Samples:     {}", buffer.samples().len());
    println!("Duration:    {:.3}s", buffer.duration().as_secs_f64());

    if let Some(out) = out {
        let wav = audio::encode_pcm16_wav(&buffer)?;
        tokio::fs::write(out, wav).await?;
        println!("Wrote {}", out.display());
    }

    Ok(())
}
