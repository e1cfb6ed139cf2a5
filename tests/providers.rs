//! Provider integration tests
//!
//! Runs the HTTP clients against loopback axum servers

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use base64::Engine;
use secrecy::SecretString;
use serde_json::{Value, json};

use npc_voice::dialogue::DialogueOptions;
use npc_voice::llm::OpenAiChat;
use npc_voice::tts::{GoogleTts, OpenAiTts};
use npc_voice::{
    AudioEncoding, ChatCompletion, DialogueEvent, DialogueOrchestrator, Error, ErrorKind,
    NullSink, ProviderStatus, SettlePolicy, SpeechSynthesizer, SynthesisRequest, TurnOutcome,
    VoiceConfig,
};

mod common;

use common::wav_fixture;

/// What the server saw
#[derive(Debug, Default, Clone)]
struct Captured {
    query: HashMap<String, String>,
    authorization: Option<String>,
    body: Value,
}

type Capture = Arc<Mutex<Option<Captured>>>;

fn record(capture: &Capture, query: HashMap<String, String>, headers: &HeaderMap, body: Value) {
    *capture.lock().unwrap() = Some(Captured {
        query,
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string),
        body,
    });
}

/// Serve `router` on an ephemeral loopback port
async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

fn key(value: &str) -> SecretString {
    SecretString::from(value.to_string())
}

fn google_voice(encoding: AudioEncoding) -> VoiceConfig {
    VoiceConfig {
        language_code: Some("en-GB".to_string()),
        voice_id: "en-GB-Wavenet-B".to_string(),
        audio_encoding: encoding,
        model: "tts-1".to_string(),
    }
}

/// Google-style endpoint answering with `audio_content`
async fn google_server(audio_content: String) -> (SocketAddr, Capture) {
    let capture = Capture::default();

    let router = Router::new()
        .route(
            "/synthesize",
            post(
                |State((capture, audio)): State<(Capture, String)>,
                 Query(query): Query<HashMap<String, String>>,
                 headers: HeaderMap,
                 Json(body): Json<Value>| async move {
                    record(&capture, query, &headers, body);
                    Json(json!({ "audioContent": audio }))
                },
            ),
        )
        .with_state((capture.clone(), audio_content));

    (serve(router).await, capture)
}

/// Endpoint that always fails with `status`
async fn failing_server(status: StatusCode) -> SocketAddr {
    let router = Router::new().route(
        "/",
        post(move || async move { (status, Json(json!({ "error": { "message": "denied" } }))) }),
    );
    serve(router).await
}

#[tokio::test]
async fn test_google_returns_decoded_audio() {
    let wav = wav_fixture(1, 22050, &[0, 16384, -16384, 32767]);
    let encoded = base64::engine::general_purpose::STANDARD.encode(&wav);
    let (addr, capture) = google_server(encoded).await;

    let url = format!("http://{addr}/synthesize");
    let tts = GoogleTts::new(client(), key("g-key"), Some(url)).unwrap();
    let voice = google_voice(AudioEncoding::Pcm16Wav);
    let request = SynthesisRequest::new("Hi \"there\"!", voice).unwrap();
    let payload = tts.synthesize(&request).await.unwrap();

    assert_eq!(payload.bytes, wav);
    assert_eq!(payload.encoding, AudioEncoding::Pcm16Wav);

    let seen = capture.lock().unwrap().clone().unwrap();
    assert_eq!(seen.query.get("key").map(String::as_str), Some("g-key"));
    assert_eq!(seen.authorization, None);
    assert_eq!(
        seen.body,
        json!({
            "input": { "text": "Hi \"there\"!" },
            "voice": { "languageCode": "en-GB", "name": "en-GB-Wavenet-B" },
            "audioConfig": { "audioEncoding": "LINEAR16" }
        })
    );
}

#[tokio::test]
async fn test_google_compressed_mode() {
    let encoded = base64::engine::general_purpose::STANDARD.encode(b"ID3 mp3 bytes");
    let (addr, capture) = google_server(encoded).await;

    let url = format!("http://{addr}/synthesize");
    let tts = GoogleTts::new(client(), key("g-key"), Some(url)).unwrap();
    let request = SynthesisRequest::new("Hello", google_voice(AudioEncoding::Compressed)).unwrap();
    let payload = tts.synthesize(&request).await.unwrap();

    assert_eq!(payload.bytes, b"ID3 mp3 bytes");
    assert_eq!(payload.encoding, AudioEncoding::Compressed);

    let seen = capture.lock().unwrap().clone().unwrap();
    assert_eq!(seen.body["audioConfig"]["audioEncoding"], "MP3");
}

#[tokio::test]
async fn test_google_invalid_base64_is_malformed() {
    let (addr, _capture) = google_server("not base64 at all!".to_string()).await;

    let url = format!("http://{addr}/synthesize");
    let tts = GoogleTts::new(client(), key("g-key"), Some(url)).unwrap();
    let request = SynthesisRequest::new("Hello", google_voice(AudioEncoding::Pcm16Wav)).unwrap();
    let err = tts.synthesize(&request).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MalformedAudio);
}

#[tokio::test]
async fn test_google_rejection_carries_status() {
    let addr = failing_server(StatusCode::UNAUTHORIZED).await;

    let tts = GoogleTts::new(client(), key("bad"), Some(format!("http://{addr}/"))).unwrap();
    let request = SynthesisRequest::new("Hello", google_voice(AudioEncoding::Pcm16Wav)).unwrap();
    let err = tts.synthesize(&request).await.unwrap_err();

    assert_eq!(err.provider_status(), Some(ProviderStatus::Http(401)));
    assert!(err.to_string().contains("denied"), "{err}");
}

#[tokio::test]
async fn test_openai_tts_returns_raw_bytes() {
    let capture = Capture::default();
    let router = Router::new()
        .route(
            "/v1/audio/speech",
            post(
                |State(capture): State<Capture>,
                 headers: HeaderMap,
                 Json(body): Json<Value>| async move {
                    record(&capture, HashMap::new(), &headers, body);
                    vec![0xFF_u8, 0xFB, 0x90, 0x64].into_response()
                },
            ),
        )
        .with_state(capture.clone());
    let addr = serve(router).await;

    let tts = OpenAiTts::new(
        client(),
        key("sk-test"),
        Some(format!("http://{addr}/v1/audio/speech")),
    )
    .unwrap();
    let voice = VoiceConfig {
        language_code: None,
        voice_id: "nova".to_string(),
        audio_encoding: AudioEncoding::Compressed,
        model: "tts-1-hd".to_string(),
    };
    let request = SynthesisRequest::new("Hello", voice).unwrap();
    let payload = tts.synthesize(&request).await.unwrap();

    assert_eq!(payload.bytes, vec![0xFF, 0xFB, 0x90, 0x64]);
    assert_eq!(payload.encoding, AudioEncoding::Compressed);

    let seen = capture.lock().unwrap().clone().unwrap();
    assert_eq!(seen.authorization.as_deref(), Some("Bearer sk-test"));
    assert_eq!(
        seen.body,
        json!({ "model": "tts-1-hd", "input": "Hello", "voice": "nova" })
    );
}

#[tokio::test]
async fn test_openai_tts_server_error() {
    let addr = failing_server(StatusCode::INTERNAL_SERVER_ERROR).await;

    let tts = OpenAiTts::new(client(), key("sk-test"), Some(format!("http://{addr}/"))).unwrap();
    let request = SynthesisRequest::new("Hello", google_voice(AudioEncoding::Compressed)).unwrap();
    let err = tts.synthesize(&request).await.unwrap_err();

    assert_eq!(err.provider_status(), Some(ProviderStatus::Http(500)));
}

/// Chat endpoint answering with `response`
async fn chat_server(response: Value) -> (SocketAddr, Capture) {
    let capture = Capture::default();
    let router = Router::new()
        .route(
            "/v1/chat/completions",
            post(
                |State((capture, response)): State<(Capture, Value)>,
                 headers: HeaderMap,
                 Json(body): Json<Value>| async move {
                    record(&capture, HashMap::new(), &headers, body);
                    Json(response)
                },
            ),
        )
        .with_state((capture.clone(), response));

    (serve(router).await, capture)
}

fn chat_client(addr: SocketAddr) -> OpenAiChat {
    OpenAiChat::new(
        client(),
        key("sk-test"),
        "gpt-4o".to_string(),
        Some(format!("http://{addr}/v1/chat/completions")),
    )
    .unwrap()
}

#[tokio::test]
async fn test_chat_returns_first_choice() {
    let (addr, capture) = chat_server(json!({
        "choices": [
            { "message": { "role": "assistant", "content": "Hi there!" } },
            { "message": { "role": "assistant", "content": "ignored" } }
        ]
    }))
    .await;

    let reply = chat_client(addr)
        .complete("answer any question", "Hello")
        .await
        .unwrap();
    assert_eq!(reply, "Hi there!");

    let seen = capture.lock().unwrap().clone().unwrap();
    assert_eq!(seen.authorization.as_deref(), Some("Bearer sk-test"));
    assert_eq!(
        seen.body,
        json!({
            "model": "gpt-4o",
            "messages": [
                { "role": "system", "content": "answer any question" },
                { "role": "user", "content": "Hello" }
            ]
        })
    );
}

#[tokio::test]
async fn test_chat_without_choices_is_empty() {
    for response in [
        json!({ "choices": [] }),
        json!({ "choices": [{ "message": { "content": null } }] }),
        json!({ "choices": [{ "message": { "content": "   " } }] }),
    ] {
        let (addr, _capture) = chat_server(response.clone()).await;
        let err = chat_client(addr).complete("sys", "Hello").await.unwrap_err();
        assert!(matches!(err, Error::EmptyCompletion), "{response}: {err:?}");
    }
}

#[tokio::test]
async fn test_chat_rate_limited() {
    let addr = failing_server(StatusCode::TOO_MANY_REQUESTS).await;
    let chat = OpenAiChat::new(
        client(),
        key("sk-test"),
        "gpt-4o".to_string(),
        Some(format!("http://{addr}/")),
    )
    .unwrap();

    let err = chat.complete("sys", "Hello").await.unwrap_err();
    assert_eq!(err.provider_status(), Some(ProviderStatus::Http(429)));
}

#[tokio::test]
async fn test_slow_provider_times_out() {
    let router = Router::new().route(
        "/",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            StatusCode::OK
        }),
    );
    let addr = serve(router).await;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(100))
        .build()
        .unwrap();
    let tts = OpenAiTts::new(client, key("sk-test"), Some(format!("http://{addr}/"))).unwrap();
    let request = SynthesisRequest::new("Hello", google_voice(AudioEncoding::Compressed)).unwrap();
    let err = tts.synthesize(&request).await.unwrap_err();

    assert_eq!(err.provider_status(), Some(ProviderStatus::Timeout));
}

#[tokio::test]
async fn test_unreachable_provider_is_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = chat_client(addr).complete("sys", "Hello").await.unwrap_err();
    assert_eq!(err.provider_status(), Some(ProviderStatus::Transport));
}

#[tokio::test]
async fn test_full_turn_over_http() {
    let (chat_addr, _chat_capture) = chat_server(json!({
        "choices": [{ "message": { "content": "Hi there!" } }]
    }))
    .await;
    let wav = wav_fixture(1, 22050, &[0, 16384, -16384, 32767]);
    let (tts_addr, tts_capture) =
        google_server(base64::engine::general_purpose::STANDARD.encode(&wav)).await;

    let chat = Arc::new(chat_client(chat_addr));
    let tts = Arc::new(
        GoogleTts::new(
            client(),
            key("g-key"),
            Some(format!("http://{tts_addr}/synthesize")),
        )
        .unwrap(),
    );
    let options = DialogueOptions {
        voice: google_voice(AudioEncoding::Pcm16Wav),
        settle: SettlePolicy::FixedTimer(Duration::from_millis(10)),
        ..DialogueOptions::default()
    };

    let orchestrator =
        DialogueOrchestrator::new(Some(chat), tts, Box::new(NullSink::new()), options).unwrap();
    let mut events = orchestrator.subscribe();

    let outcome = orchestrator.handle_user_input("Hello").await.unwrap();
    assert_eq!(outcome, TurnOutcome::Settled { turn: 1 });

    let seen = tts_capture.lock().unwrap().clone().unwrap();
    assert_eq!(seen.body["input"]["text"], "Hi there!");

    let started = std::iter::from_fn(|| events.try_recv().ok())
        .filter(|e| matches!(e, DialogueEvent::PlaybackStarted { .. }))
        .count();
    assert_eq!(started, 1);
}

#[tokio::test]
async fn test_openai_rejection_over_http() {
    let (chat_addr, _chat_capture) = chat_server(json!({
        "choices": [{ "message": { "content": "Hi there!" } }]
    }))
    .await;
    let tts_addr = failing_server(StatusCode::UNAUTHORIZED).await;

    let chat = Arc::new(chat_client(chat_addr));
    let tts = Arc::new(
        OpenAiTts::new(client(), key("sk-bad"), Some(format!("http://{tts_addr}/"))).unwrap(),
    );
    let options = DialogueOptions {
        voice: VoiceConfig {
            language_code: None,
            voice_id: "alloy".to_string(),
            audio_encoding: AudioEncoding::Compressed,
            model: "tts-1".to_string(),
        },
        ..DialogueOptions::default()
    };

    let orchestrator =
        DialogueOrchestrator::new(Some(chat), tts, Box::new(NullSink::new()), options).unwrap();
    let mut events = orchestrator.subscribe();

    let err = orchestrator.handle_user_input("Hello").await.unwrap_err();
    assert_eq!(err.provider_status(), Some(ProviderStatus::Http(401)));

    let events: Vec<DialogueEvent> = std::iter::from_fn(|| events.try_recv().ok()).collect();
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, DialogueEvent::PlaybackStarted { .. }))
    );
    assert!(matches!(
        events.last(),
        Some(DialogueEvent::Error {
            kind: ErrorKind::Provider,
            ..
        })
    ));
    assert_eq!(orchestrator.phase(), npc_voice::DialoguePhase::Idle);
}
