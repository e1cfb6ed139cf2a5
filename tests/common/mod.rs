//! Shared test utilities
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, mpsc};

use npc_voice::audio::ScratchDecoder;
use npc_voice::dialogue::DialogueOptions;
use npc_voice::{
    AudioEncoding, ChatCompletion, Error, PlaybackHandle, PlaybackSink, RawAudioPayload, Result,
    SampleBuffer, SettlePolicy, SpeechSynthesizer, SynthesisRequest, VoiceConfig,
};

/// Build a 16-bit PCM WAV file with hound
#[must_use]
pub fn wav_fixture(channels: u16, sample_rate: u32, samples: &[i16]) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).expect("failed to create wav writer");
        for &sample in samples {
            writer.write_sample(sample).expect("failed to write sample");
        }
        writer.finalize().expect("failed to finalize wav");
    }
    cursor.into_inner()
}

/// Silent MPEG-1 Layer III stream: `count` mono 44.1 kHz frames of 1152 samples
#[must_use]
pub fn mp3_fixture(count: usize) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(count * 417);
    for _ in 0..count {
        bytes.extend_from_slice(&[0xFF, 0xFB, 0x90, 0xC4]);
        bytes.extend_from_slice(&[0; 413]);
    }
    bytes
}

/// Default voice for tests
#[must_use]
pub fn test_voice() -> VoiceConfig {
    VoiceConfig {
        language_code: Some("en-US".to_string()),
        voice_id: "en-US-Wavenet-D".to_string(),
        audio_encoding: AudioEncoding::Pcm16Wav,
        model: "tts-1".to_string(),
    }
}

/// Orchestrator options with a short fixed settle timer
#[must_use]
pub fn test_options(scratch: &std::path::Path) -> DialogueOptions {
    DialogueOptions {
        voice: test_voice(),
        settle: SettlePolicy::FixedTimer(Duration::from_millis(100)),
        call_timeout: Duration::from_secs(5),
        decoder: ScratchDecoder::in_dir(scratch),
        ..DialogueOptions::default()
    }
}

type Responder = Box<dyn Fn(&str) -> Result<String> + Send + Sync>;

/// Chat completion driven by a closure
pub struct ScriptedChat {
    respond: Responder,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedChat {
    pub fn new(respond: impl Fn(&str) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with `reply`
    pub fn replying(reply: &str) -> Self {
        let reply = reply.to_string();
        Self::new(move |_| Ok(reply.clone()))
    }

    /// Answer "reply to <input>"
    pub fn echoing() -> Self {
        Self::new(|input| Ok(format!("reply to {input}")))
    }

    /// (system prompt, user message) pairs seen so far
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatCompletion for ScriptedChat {
    async fn complete(&self, system_prompt: &str, user_message: &str) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((system_prompt.to_string(), user_message.to_string()));
        (self.respond)(user_message)
    }
}

/// Chat completion that never answers
pub struct StalledChat;

#[async_trait]
impl ChatCompletion for StalledChat {
    async fn complete(&self, _system_prompt: &str, _user_message: &str) -> Result<String> {
        std::future::pending().await
    }
}

/// Synthesizer returning a fixed payload, optionally held back per text
pub struct GatedSynth {
    payload: std::result::Result<RawAudioPayload, fn() -> Error>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    failures: Mutex<HashMap<String, fn() -> Error>>,
    requests: Mutex<Vec<SynthesisRequest>>,
    started: mpsc::UnboundedSender<String>,
    calls: AtomicUsize,
}

impl GatedSynth {
    /// Synthesizer that returns `payload`; the receiver sees each text as
    /// synthesis starts
    pub fn new(payload: RawAudioPayload) -> (Self, mpsc::UnboundedReceiver<String>) {
        Self::build(Ok(payload))
    }

    /// Synthesizer that fails every request
    pub fn failing(error: fn() -> Error) -> (Self, mpsc::UnboundedReceiver<String>) {
        Self::build(Err(error))
    }

    fn build(
        payload: std::result::Result<RawAudioPayload, fn() -> Error>,
    ) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (started, rx) = mpsc::unbounded_channel();
        let synth = Self {
            payload,
            gates: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            started,
            calls: AtomicUsize::new(0),
        };
        (synth, rx)
    }

    /// Hold synthesis of `text` until the returned gate is notified
    pub fn gate(&self, text: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates
            .lock()
            .unwrap()
            .insert(text.to_string(), Arc::clone(&gate));
        gate
    }

    /// Fail synthesis of `text` with `error`
    pub fn fail_on(&self, text: &str, error: fn() -> Error) {
        self.failures
            .lock()
            .unwrap()
            .insert(text.to_string(), error);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<SynthesisRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for GatedSynth {
    fn name(&self) -> &'static str {
        "gated"
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<RawAudioPayload> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let _ = self.started.send(request.text().to_string());

        let gate = self.gates.lock().unwrap().get(request.text()).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let failure = self.failures.lock().unwrap().get(request.text()).copied();
        if let Some(error) = failure {
            return Err(error());
        }

        match &self.payload {
            Ok(payload) => Ok(payload.clone()),
            Err(error) => Err(error()),
        }
    }
}

/// Call recorded by [`RecordingSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Load {
        channels: u16,
        sample_rate: u32,
        samples: usize,
    },
    Play(PlaybackHandle),
}

/// Sink that records calls and finishes playback immediately
#[derive(Clone, Default)]
pub struct RecordingSink {
    calls: Arc<Mutex<Vec<SinkCall>>>,
    next_id: u64,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn loads(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, SinkCall::Load { .. }))
            .count()
    }
}

impl PlaybackSink for RecordingSink {
    fn load(&mut self, buffer: SampleBuffer) -> Result<PlaybackHandle> {
        self.next_id += 1;
        self.calls.lock().unwrap().push(SinkCall::Load {
            channels: buffer.channels(),
            sample_rate: buffer.sample_rate(),
            samples: buffer.samples().len(),
        });
        Ok(PlaybackHandle::new(self.next_id))
    }

    fn play(&mut self, handle: PlaybackHandle) -> Result<()> {
        self.calls.lock().unwrap().push(SinkCall::Play(handle));
        Ok(())
    }

    fn is_playing(&self, _handle: PlaybackHandle) -> bool {
        false
    }
}
