//! Dialogue orchestration
//!
//! Drives one turn through chat completion, synthesis, decode and playback.
//! Turns are numbered; starting a new turn supersedes the previous one. A
//! superseded turn's in-flight calls run to completion but their results are
//! dropped at the next checkpoint, so only the newest turn ever reaches the
//! sink or emits signals.
//!
//! ```text
//! Idle ─▶ AwaitingCompletion ─▶ AwaitingSynthesis ─▶ Decoding ─▶ Playing ─▶ Idle
//!              (converse only)
//! ```

mod events;

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, Notify, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::audio::{self, AudioEncoding, RecordingArchive, ScratchDecoder};
use crate::config::{Config, DEFAULT_SYSTEM_PROMPT, SettlePolicy};
use crate::error::ProviderStatus;
use crate::llm::{ChatCompletion, OpenAiChat};
use crate::playback::{PlaybackHandle, PlaybackSink};
use crate::tts::{self, SpeechSynthesizer, SynthesisRequest, TtsProviderKind, VoiceConfig};
use crate::{Error, Result};

pub use events::{DialogueEvent, DialoguePhase, TurnOutcome};

/// Channel capacity for dialogue events
const EVENT_CAPACITY: usize = 64;

/// Whether user input goes through the LLM first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DialogueMode {
    /// Ask the LLM, speak its reply
    #[default]
    Converse,
    /// Speak the input as typed
    Recite,
}

/// Orchestrator settings
#[derive(Debug, Clone)]
pub struct DialogueOptions {
    pub voice: VoiceConfig,
    pub system_prompt: String,
    pub mode: DialogueMode,
    pub settle: SettlePolicy,
    /// Upper bound for each network call
    pub call_timeout: Duration,
    pub decoder: ScratchDecoder,
    pub archive: Option<RecordingArchive>,
}

impl Default for DialogueOptions {
    fn default() -> Self {
        Self {
            voice: VoiceConfig {
                language_code: Some("en-US".to_string()),
                voice_id: TtsProviderKind::Google.default_voice().to_string(),
                audio_encoding: AudioEncoding::Pcm16Wav,
                model: "tts-1".to_string(),
            },
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            mode: DialogueMode::Converse,
            settle: SettlePolicy::default(),
            call_timeout: Duration::from_secs(30),
            decoder: ScratchDecoder::new(),
            archive: None,
        }
    }
}

impl DialogueOptions {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            voice: config.tts.voice.clone(),
            system_prompt: config.llm.system_prompt.clone(),
            mode: config.mode,
            settle: config.playback.settle,
            call_timeout: config.request_timeout,
            decoder: config
                .scratch_dir
                .as_ref()
                .map_or_else(ScratchDecoder::new, ScratchDecoder::in_dir),
            archive: config.recordings_dir.as_ref().map(RecordingArchive::new),
        }
    }
}

/// Coordinates chat, synthesis, decode and playback for a conversation
pub struct DialogueOrchestrator {
    chat: Option<Arc<dyn ChatCompletion>>,
    synth: Arc<dyn SpeechSynthesizer>,
    sink: Mutex<Box<dyn PlaybackSink>>,
    options: DialogueOptions,
    latest_turn: AtomicU64,
    superseded: Notify,
    phase: watch::Sender<DialoguePhase>,
    events: broadcast::Sender<DialogueEvent>,
}

impl DialogueOrchestrator {
    /// Create an orchestrator from its capabilities
    ///
    /// # Errors
    ///
    /// Returns `Config` if converse mode is selected without a chat client
    pub fn new(
        chat: Option<Arc<dyn ChatCompletion>>,
        synth: Arc<dyn SpeechSynthesizer>,
        sink: Box<dyn PlaybackSink>,
        options: DialogueOptions,
    ) -> Result<Self> {
        if options.mode == DialogueMode::Converse && chat.is_none() {
            return Err(Error::Config(
                "converse mode requires a chat completion client".to_string(),
            ));
        }

        let (phase, _) = watch::channel(DialoguePhase::Idle);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            chat,
            synth,
            sink: Mutex::new(sink),
            options,
            latest_turn: AtomicU64::new(0),
            superseded: Notify::new(),
            phase,
            events,
        })
    }

    /// Build the HTTP-backed orchestrator described by `config`
    ///
    /// # Errors
    ///
    /// Returns `Config` if a required API key is missing
    pub fn from_config(config: &Config, sink: Box<dyn PlaybackSink>) -> Result<Self> {
        config.validate()?;

        let chat: Option<Arc<dyn ChatCompletion>> = match config.mode {
            DialogueMode::Converse => Some(Arc::new(OpenAiChat::from_config(
                &config.llm,
                config.request_timeout,
            )?)),
            DialogueMode::Recite => None,
        };
        let synth = tts::from_config(&config.tts, config.request_timeout)?;

        Self::new(chat, synth, sink, DialogueOptions::from_config(config))
    }

    /// Subscribe to lifecycle signals
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DialogueEvent> {
        self.events.subscribe()
    }

    /// Watch the live turn's phase
    #[must_use]
    pub fn watch_phase(&self) -> watch::Receiver<DialoguePhase> {
        self.phase.subscribe()
    }

    #[must_use]
    pub fn phase(&self) -> DialoguePhase {
        *self.phase.borrow()
    }

    /// Number of the most recently started turn (0 before the first)
    #[must_use]
    pub fn latest_turn(&self) -> u64 {
        self.latest_turn.load(Ordering::SeqCst)
    }

    /// Run `handle_user_input` on a background task
    pub fn submit(self: &Arc<Self>, text: impl Into<String>) -> JoinHandle<Result<TurnOutcome>> {
        let this = Arc::clone(self);
        let text = text.into();
        tokio::spawn(async move { this.handle_user_input(&text).await })
    }

    /// Run one turn for `text`
    ///
    /// Blank input is ignored. Returns once the turn has settled, failed, or
    /// been superseded by a newer turn.
    ///
    /// # Errors
    ///
    /// Returns the failure of the live turn; the same failure is also emitted
    /// as [`DialogueEvent::Error`] and the phase returns to idle
    pub async fn handle_user_input(&self, text: &str) -> Result<TurnOutcome> {
        let text = text.trim();
        if text.is_empty() {
            tracing::warn!("input is empty, ignoring");
            return Ok(TurnOutcome::Ignored);
        }

        let turn = self.begin_turn();
        tracing::info!(turn, chars = text.len(), "turn started");

        match self.run_turn(turn, text).await {
            Ok(outcome) => Ok(outcome),
            Err(e) if !self.is_current(turn) => {
                tracing::debug!(turn, error = %e, "superseded turn failed, ignoring");
                Ok(TurnOutcome::Superseded { turn })
            }
            Err(e) => {
                tracing::warn!(turn, error = %e, "turn failed");
                self.set_phase(turn, DialoguePhase::Idle);
                self.emit(DialogueEvent::Error {
                    turn,
                    kind: e.kind(),
                    detail: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn begin_turn(&self) -> u64 {
        let turn = self.latest_turn.fetch_add(1, Ordering::SeqCst) + 1;
        self.superseded.notify_waiters();
        turn
    }

    fn is_current(&self, turn: u64) -> bool {
        self.latest_turn.load(Ordering::SeqCst) == turn
    }

    fn set_phase(&self, turn: u64, phase: DialoguePhase) {
        // The turn check runs under the watch lock so a stale turn can never
        // overwrite a newer turn's phase
        self.phase.send_if_modified(|current| {
            if self.is_current(turn) && *current != phase {
                tracing::trace!(turn, from = %current, to = %phase, "phase");
                *current = phase;
                true
            } else {
                false
            }
        });
    }

    fn emit(&self, event: DialogueEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn superseded_at(&self, turn: u64, step: &str) -> TurnOutcome {
        tracing::debug!(turn, latest = self.latest_turn(), step, "discarding superseded result");
        TurnOutcome::Superseded { turn }
    }

    /// Bound a network call by the configured timeout
    async fn bounded<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        let limit = self.options.call_timeout;
        tokio::time::timeout(limit, call).await.map_err(|_| {
            Error::provider(ProviderStatus::Timeout, format!("no response within {limit:?}"))
        })?
    }

    async fn run_turn(&self, turn: u64, text: &str) -> Result<TurnOutcome> {
        let reply = match (&self.chat, self.options.mode) {
            (Some(chat), DialogueMode::Converse) => {
                self.set_phase(turn, DialoguePhase::AwaitingCompletion);
                let reply = self
                    .bounded(chat.complete(&self.options.system_prompt, text))
                    .await?;
                if !self.is_current(turn) {
                    return Ok(self.superseded_at(turn, "completion"));
                }
                self.emit(DialogueEvent::Reply {
                    turn,
                    text: reply.clone(),
                });
                reply
            }
            _ => text.to_string(),
        };

        self.set_phase(turn, DialoguePhase::AwaitingSynthesis);
        let request = SynthesisRequest::new(reply, self.options.voice.clone())?;
        let payload = self.bounded(self.synth.synthesize(&request)).await?;
        if !self.is_current(turn) {
            return Ok(self.superseded_at(turn, "synthesis"));
        }
        tracing::debug!(
            turn,
            provider = self.synth.name(),
            bytes = payload.bytes.len(),
            encoding = %payload.encoding,
            "synthesis received"
        );

        if let Some(archive) = &self.options.archive
            && let Err(e) = archive.save(&payload).await
        {
            tracing::warn!(turn, error = %e, "failed to archive recording");
        }

        // Exclusive sink access from decode through handoff keeps the
        // pipeline single-buffered
        let (handle, length) = {
            let mut sink = self.sink.lock().await;
            if !self.is_current(turn) {
                return Ok(self.superseded_at(turn, "decode"));
            }

            self.set_phase(turn, DialoguePhase::Decoding);
            let buffer = audio::decode(payload, &self.options.decoder).await?;
            if !self.is_current(turn) {
                return Ok(self.superseded_at(turn, "decode"));
            }

            let length = buffer.duration();
            tracing::debug!(
                turn,
                channels = buffer.channels(),
                sample_rate = buffer.sample_rate(),
                frames = buffer.frames(),
                "decoded"
            );

            let handle = sink.load(buffer)?;
            sink.play(handle)?;
            (handle, length)
        };

        self.set_phase(turn, DialoguePhase::Playing);
        self.emit(DialogueEvent::PlaybackStarted { turn });
        tracing::info!(turn, ?length, "playback started");

        self.settle(turn, handle, length).await
    }

    /// Wait for playback to finish according to the settle policy
    ///
    /// A turn superseded here has already announced playback, so it still
    /// reports [`DialogueEvent::PlaybackSettled`]. The phase is left to the
    /// newer turn.
    async fn settle(
        &self,
        turn: u64,
        handle: PlaybackHandle,
        length: Duration,
    ) -> Result<TurnOutcome> {
        let superseded = self.superseded.notified();
        tokio::pin!(superseded);
        superseded.as_mut().enable();
        if !self.is_current(turn) {
            self.emit(DialogueEvent::PlaybackSettled { turn });
            return Ok(self.superseded_at(turn, "playback"));
        }

        match self.options.settle {
            SettlePolicy::FixedTimer(wait) => {
                tokio::select! {
                    () = tokio::time::sleep(wait) => {}
                    () = &mut superseded => {}
                }
            }
            SettlePolicy::PlaybackCompletion { poll, fallback } => {
                let deadline = Instant::now() + length + fallback;
                loop {
                    tokio::select! {
                        () = tokio::time::sleep(poll) => {}
                        () = &mut superseded => break,
                    }
                    if !self.is_current(turn) || !self.sink.lock().await.is_playing(handle) {
                        break;
                    }
                    if Instant::now() >= deadline {
                        tracing::warn!(turn, "playback did not report completion, settling");
                        break;
                    }
                }
            }
        }

        if !self.is_current(turn) {
            self.emit(DialogueEvent::PlaybackSettled { turn });
            return Ok(self.superseded_at(turn, "settle"));
        }

        self.set_phase(turn, DialoguePhase::Idle);
        self.emit(DialogueEvent::PlaybackSettled { turn });
        tracing::info!(turn, "turn settled");
        Ok(TurnOutcome::Settled { turn })
    }
}
