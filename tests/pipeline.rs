//! Pipeline controller against a mocked agent backend and fake audio devices.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use adk_stream::client::{Client, Config};
use adk_stream::pipeline::{
    self, PipelineEvent, PipelineHandle, AUDIO_STOPPED, CONNECTION_CLOSED,
    TEXT_DISABLED_IN_AUDIO_MODE, TEXT_DISABLED_WHILE_DISCONNECTED,
};
use adk_stream::reassembler::Role;
use adk_stream::types::{MimeType, SessionId};
use adk_stream::utils::audio::{decode_bytes, encode_bytes, f32_to_pcm16_bytes};
use adk_stream::utils::{MediaBackend, MediaError, MediaStreams, NoMedia, PlaybackConsumer};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::timeout;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EVENTS_PATH: &str = "/events/pipeline-session";
const SEND_PATH: &str = "/send/pipeline-session";

#[derive(Clone, Default)]
struct FakeDevices {
    log: Arc<Mutex<Vec<&'static str>>>,
    frames: Arc<Mutex<Option<mpsc::Sender<Vec<f32>>>>>,
    playback: Arc<Mutex<Option<PlaybackConsumer>>>,
}

impl FakeDevices {
    fn log(&self) -> Vec<&'static str> {
        self.log.lock().unwrap().clone()
    }

    fn frame_sender(&self) -> Option<mpsc::Sender<Vec<f32>>> {
        self.frames.lock().unwrap().clone()
    }

    fn queued_playback(&self) -> usize {
        self.playback
            .lock()
            .unwrap()
            .as_ref()
            .map_or(0, PlaybackConsumer::pending)
    }

    fn pull_playback(&self, count: usize) -> Vec<f32> {
        self.playback
            .lock()
            .unwrap()
            .as_mut()
            .expect("playback never opened")
            .pull(count)
    }

    async fn wait_until_open(&self) -> mpsc::Sender<Vec<f32>> {
        for _ in 0..100 {
            if let Some(frames) = self.frame_sender() {
                return frames;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("audio mode never started");
    }

    async fn wait_for_playback<F>(&self, mut done: F)
    where
        F: FnMut(usize) -> bool,
    {
        for _ in 0..250 {
            if done(self.queued_playback()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("playback never reached the expected level");
    }
}

struct FakeBackend(FakeDevices);

impl MediaBackend for FakeBackend {
    fn open(
        &mut self,
        playback: PlaybackConsumer,
        frames: mpsc::Sender<Vec<f32>>,
    ) -> Result<Box<dyn MediaStreams>, MediaError> {
        *self.0.frames.lock().unwrap() = Some(frames);
        *self.0.playback.lock().unwrap() = Some(playback);
        self.0.log.lock().unwrap().push("open");
        Ok(Box::new(FakeStreams(self.0.clone())))
    }
}

struct FakeStreams(FakeDevices);

impl MediaStreams for FakeStreams {
    fn capture_sample_rate(&self) -> u32 {
        16000
    }

    fn playback_sample_rate(&self) -> u32 {
        24000
    }

    fn stop_capture(&mut self) {
        self.0.frames.lock().unwrap().take();
        self.0.log.lock().unwrap().push("stop_capture");
    }

    fn stop_playback(&mut self) {
        self.0.log.lock().unwrap().push("stop_playback");
    }
}

fn client_for(server: &MockServer) -> Client {
    let config = Config::builder()
        .with_base_url(&server.uri())
        .with_reconnect_delay(Duration::from_secs(60))
        .with_batch_period(Duration::from_secs(10))
        .build();
    Client::with_session(config, SessionId::from("pipeline-session"))
}

fn audio_frame(samples: &[f32]) -> String {
    format!(
        "data: {}\n\n",
        json!({"mime_type": "audio/pcm", "data": encode_bytes(&f32_to_pcm16_bytes(samples))})
    )
}

async fn mount_idle_backend(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(EVENTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

async fn wait_for_event<F>(handle: &mut PipelineHandle, mut predicate: F) -> PipelineEvent
where
    F: FnMut(&PipelineEvent) -> bool,
{
    timeout(Duration::from_secs(5), async {
        loop {
            let event = handle.next_event().await.expect("pipeline stopped");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for a pipeline event")
}

async fn wait_for_sends(server: &MockServer, count: usize) -> Vec<Value> {
    for _ in 0..100 {
        let sends: Vec<Value> = server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|request| request.url.path() == SEND_PATH)
            .map(|request| serde_json::from_slice(&request.body).unwrap())
            .collect();
        if sends.len() >= count {
            return sends;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("expected {} sends", count);
}

async fn event_queries(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|request| request.url.path() == EVENTS_PATH)
        .filter_map(|request| request.url.query().map(str::to_string))
        .collect()
}

async fn wait_for_queries<F>(server: &MockServer, mut done: F) -> Vec<String>
where
    F: FnMut(&[String]) -> bool,
{
    for _ in 0..100 {
        let queries = event_queries(server).await;
        if done(&queries) {
            return queries;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("push stream requests never matched");
}

#[tokio::test]
async fn test_text_conversation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(EVENTS_PATH))
        .and(query_param("is_audio", "false"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "data: {\"mime_type\":\"text/plain\",\"data\":\"Hi\"}\n\n\
             data: {\"mime_type\":\"text/plain\",\"data\":\" there\"}\n\n\
             data: {\"turn_complete\":true}\n\n",
        ))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut handle = pipeline::spawn(client_for(&server), NoMedia);
    handle.submit_text("hello").await.unwrap();

    let mut user_seen = false;
    let mut closed_seen = false;
    let mut assistant = Vec::new();
    timeout(Duration::from_secs(5), async {
        while !(user_seen && closed_seen) {
            match handle.next_event().await.expect("pipeline stopped") {
                PipelineEvent::MessageStarted(message) if message.role() == Role::User => {
                    assert_eq!(message.text(), "hello");
                    user_seen = true;
                }
                PipelineEvent::MessageStarted(message) | PipelineEvent::MessageUpdated(message) => {
                    assistant.push(message)
                }
                PipelineEvent::Notice(notice) if notice == CONNECTION_CLOSED => closed_seen = true,
                _ => {}
            }
        }
    })
    .await
    .expect("timed out waiting for the conversation");

    let texts: Vec<&str> = assistant.iter().map(|message| message.text()).collect();
    assert_eq!(texts, vec!["Hi", "Hi there"]);
    assert!(assistant.iter().all(|m| m.id() == assistant[0].id()));

    let sends = wait_for_sends(&server, 1).await;
    assert_eq!(sends[0], json!({"mime_type": "text/plain", "data": "hello"}));
    handle.shutdown().await;
}

#[tokio::test]
async fn test_media_failure_keeps_text_mode() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(EVENTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut handle = pipeline::spawn(client_for(&server), NoMedia);
    handle.start_audio().await.unwrap();
    let event = wait_for_event(&mut handle, |event| {
        matches!(event, PipelineEvent::MediaUnavailable(_))
    })
    .await;
    assert!(matches!(
        event,
        PipelineEvent::MediaUnavailable(MediaError::DeviceUnavailable(_))
    ));

    handle.submit_text("still here").await.unwrap();
    wait_for_event(&mut handle, |event| {
        matches!(event, PipelineEvent::MessageStarted(m) if m.text() == "still here")
    })
    .await;
    wait_for_sends(&server, 1).await;

    assert!(event_queries(&server)
        .await
        .iter()
        .all(|query| query == "is_audio=false"));
    handle.shutdown().await;
}

#[tokio::test]
async fn test_deliberate_stop_sends_final_batch() {
    let server = MockServer::start().await;
    mount_idle_backend(&server).await;

    let devices = FakeDevices::default();
    let mut handle = pipeline::spawn(client_for(&server), FakeBackend(devices.clone()));
    handle.start_audio().await.unwrap();

    let frames = devices.wait_until_open().await;
    wait_for_queries(&server, |queries| queries.iter().any(|query| query == "is_audio=true")).await;

    let frame = vec![0.5f32; 1600];
    frames.send(frame.clone()).await.unwrap();

    handle.stop_audio().await.unwrap();
    wait_for_event(&mut handle, |event| {
        *event == PipelineEvent::Notice(AUDIO_STOPPED.to_string())
    })
    .await;
    assert_eq!(devices.log(), vec!["open", "stop_capture", "stop_playback"]);

    let sends = wait_for_sends(&server, 1).await;
    assert_eq!(sends[0]["mime_type"], "audio/pcm");
    let audio = decode_bytes(sends[0]["data"].as_str().unwrap()).unwrap();
    assert_eq!(audio, f32_to_pcm16_bytes(&frame));

    // the text-mode stream is reopened after the audio one
    let queries = wait_for_queries(&server, |queries| {
        queries.last().map(String::as_str) == Some("is_audio=false")
    })
    .await;
    let audio_at = queries
        .iter()
        .position(|query| query == "is_audio=true")
        .unwrap();
    assert_eq!(queries.len(), audio_at + 2);
    handle.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_discards_pending_capture() {
    let server = MockServer::start().await;
    mount_idle_backend(&server).await;

    let devices = FakeDevices::default();
    let handle = pipeline::spawn(client_for(&server), FakeBackend(devices.clone()));
    handle.start_audio().await.unwrap();

    let frames = devices.wait_until_open().await;
    frames.send(vec![0.25f32; 800]).await.unwrap();

    handle.shutdown().await;
    assert_eq!(devices.log(), vec!["open", "stop_capture", "stop_playback"]);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let sends = server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|request| request.url.path() == SEND_PATH)
        .count();
    assert_eq!(sends, 0);
}

#[tokio::test]
async fn test_agent_audio_plays_until_interrupted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(EVENTS_PATH))
        .and(query_param("is_audio", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_string(audio_frame(&[0.5; 480])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(EVENTS_PATH))
        .and(query_param("is_audio", "true"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("data: {\"interrupted\":true}\n\n"),
        )
        .mount(&server)
        .await;
    mount_idle_backend(&server).await;

    let config = Config::builder()
        .with_base_url(&server.uri())
        .with_reconnect_delay(Duration::from_millis(300))
        .with_batch_period(Duration::from_secs(10))
        .build();
    let client = Client::with_session(config, SessionId::from("pipeline-session"));
    let devices = FakeDevices::default();
    let handle = pipeline::spawn(client, FakeBackend(devices.clone()));
    handle.start_audio().await.unwrap();
    devices.wait_until_open().await;

    devices.wait_for_playback(|queued| queued >= 480).await;
    assert_eq!(devices.pull_playback(4), vec![0.5; 4]);

    // the reconnected stream carries the interruption
    devices.wait_for_playback(|queued| queued == 0).await;
    assert_eq!(devices.pull_playback(4), vec![0.0; 4]);
    handle.shutdown().await;
}

#[tokio::test]
async fn test_text_mode_audio_is_kept_for_playback() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(EVENTS_PATH))
        .and(query_param("is_audio", "false"))
        .respond_with(ResponseTemplate::new(200).set_body_string(audio_frame(&[0.5; 480])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_idle_backend(&server).await;

    let devices = FakeDevices::default();
    let mut handle = pipeline::spawn(client_for(&server), FakeBackend(devices.clone()));
    wait_for_event(&mut handle, |event| {
        *event == PipelineEvent::Notice(CONNECTION_CLOSED.to_string())
    })
    .await;

    handle.start_audio().await.unwrap();
    devices.wait_until_open().await;
    devices.wait_for_playback(|queued| queued == 480).await;
    assert_eq!(devices.pull_playback(480), vec![0.5; 480]);
    handle.shutdown().await;
}

#[tokio::test]
async fn test_text_is_rejected_in_audio_mode() {
    let server = MockServer::start().await;
    mount_idle_backend(&server).await;

    let devices = FakeDevices::default();
    let mut handle = pipeline::spawn(client_for(&server), FakeBackend(devices.clone()));
    handle.start_audio().await.unwrap();
    devices.wait_until_open().await;

    handle.submit_text("typed while talking").await.unwrap();
    let event = wait_for_event(&mut handle, |event| {
        matches!(event, PipelineEvent::SendFailed { .. })
    })
    .await;
    assert_eq!(
        event,
        PipelineEvent::SendFailed {
            mime_type: MimeType::TextPlain,
            reason: TEXT_DISABLED_IN_AUDIO_MODE.to_string(),
        }
    );

    tokio::time::sleep(Duration::from_millis(100)).await;
    let sends = server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|request| request.url.path() == SEND_PATH)
        .count();
    assert_eq!(sends, 0);
    handle.shutdown().await;
}

#[tokio::test]
async fn test_text_is_rejected_while_disconnected() {
    let server = MockServer::start().await;
    mount_idle_backend(&server).await;

    let mut handle = pipeline::spawn(client_for(&server), NoMedia);
    wait_for_event(&mut handle, |event| {
        *event == PipelineEvent::Notice(CONNECTION_CLOSED.to_string())
    })
    .await;

    handle.submit_text("anyone there?").await.unwrap();
    let event = wait_for_event(&mut handle, |event| {
        matches!(
            event,
            PipelineEvent::SendFailed { .. } | PipelineEvent::MessageStarted(_)
        )
    })
    .await;
    assert_eq!(
        event,
        PipelineEvent::SendFailed {
            mime_type: MimeType::TextPlain,
            reason: TEXT_DISABLED_WHILE_DISCONNECTED.to_string(),
        }
    );
    handle.shutdown().await;
}
