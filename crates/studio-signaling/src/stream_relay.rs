//! The streaming relay: a connection's `start-stream`/`stream-chunk`/
//! `stop-stream` sequence turned into a shoutcast-style `PUT` against the
//! configured sink, with reconnect-with-backoff if the sink drops the
//! connection mid-stream.
//!
//! Chunks are fanned out on an internal broadcast channel so that a
//! reconnect attempt can resubscribe and keep receiving new audio without
//! replaying (or buffering) what arrived during the outage, the way a live
//! relay is expected to behave. The request plumbing itself —
//! `reqwest::Body::wrap_stream` over a `tokio_stream` wrapper — is the same
//! "ecosystem way" used for asynchronous request bodies generally.

use std::convert::Infallible;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use bytes::Bytes;
use std::collections::HashSet;
use tokio::sync::{broadcast, RwLock};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use studio_common::config::SinkConfig;
use studio_common::error::SignalingError;

const INITIAL_BACKOFF: Duration = Duration::from_secs(5);
const MAX_BACKOFF: Duration = Duration::from_secs(60);
const MAX_ATTEMPTS: u32 = 10;
const CHUNK_BUS_CAPACITY: usize = 64;

/// Tracks which sink mountpoints currently have a live stream, so a second
/// `start-stream` to the same mountpoint is rejected rather than silently
/// interleaving two sources — mixing multiple sources into one mountpoint
/// is out of scope.
#[derive(Clone, Default)]
pub struct StreamRegistry {
    active_mountpoints: Arc<RwLock<HashSet<String>>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    async fn try_acquire(&self, mountpoint: &str) -> bool {
        self.active_mountpoints.write().await.insert(mountpoint.to_string())
    }

    async fn release(&self, mountpoint: &str) {
        self.active_mountpoints.write().await.remove(mountpoint);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StreamState {
    Connecting = 0,
    Active = 1,
    Stopped = 2,
}

/// A single connection's streaming relay session. Dropping or calling
/// [`StreamRelay::stop`] tears down the background PUT task and frees the
/// mountpoint for the next stream.
pub struct StreamRelay {
    mountpoint: String,
    registry: StreamRegistry,
    chunk_bus: broadcast::Sender<Bytes>,
    state: Arc<AtomicU8>,
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

impl StreamRelay {
    /// Start relaying to the configured sink. Fails immediately if another
    /// stream already owns the mountpoint.
    pub async fn start(sink: SinkConfig, registry: StreamRegistry) -> Result<Self, SignalingError> {
        let mountpoint = sink.mountpoint.clone();
        if !registry.try_acquire(&mountpoint).await {
            return Err(SignalingError::StreamRejected(format!(
                "mountpoint \"{mountpoint}\" already has an active stream"
            )));
        }

        let (chunk_bus, _) = broadcast::channel(CHUNK_BUS_CAPACITY);
        let state = Arc::new(AtomicU8::new(StreamState::Connecting as u8));
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run(
            sink,
            chunk_bus.clone(),
            state.clone(),
            cancel.clone(),
        ));

        Ok(Self { mountpoint, registry, chunk_bus, state, cancel, task })
    }

    /// Queue a base64-encoded chunk from a `stream-chunk` frame. Decoding
    /// failures are reported to the caller as malformed input; a chunk that
    /// has nowhere to go (no active HTTP request yet, or the bus is briefly
    /// full) is dropped rather than buffered — relaying live audio, not
    /// archiving it.
    pub fn push_chunk(&self, base64_chunk: &str, max_chunk_bytes: usize) -> Result<(), SignalingError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(base64_chunk)
            .map_err(|e| SignalingError::MalformedFrame(format!("invalid base64 chunk: {e}")))?;

        if bytes.len() > max_chunk_bytes {
            return Err(SignalingError::MessageTooLarge { limit: max_chunk_bytes });
        }

        let _ = self.chunk_bus.send(Bytes::from(bytes));
        Ok(())
    }

    pub fn state(&self) -> StreamState {
        match self.state.load(Ordering::Relaxed) {
            0 => StreamState::Connecting,
            1 => StreamState::Active,
            _ => StreamState::Stopped,
        }
    }

    /// Stop relaying and release the mountpoint.
    pub async fn stop(self) {
        self.cancel.cancel();
        self.task.abort();
        self.registry.release(&self.mountpoint).await;
    }
}

async fn run(
    sink: SinkConfig,
    chunk_bus: broadcast::Sender<Bytes>,
    state: Arc<AtomicU8>,
    cancel: CancellationToken,
) {
    let client = reqwest::Client::new();
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return;
        }

        state.store(StreamState::Connecting as u8, Ordering::Relaxed);

        let rx = chunk_bus.subscribe();
        let body_stream = BroadcastStream::new(rx).filter_map(|item| match item {
            Ok(bytes) => Some(Ok::<Bytes, Infallible>(bytes)),
            Err(_lagged) => None,
        });

        let request = client
            .put(sink.url())
            .basic_auth(&sink.username, Some(&sink.password))
            .header("Content-Type", &sink.content_type)
            .header("Ice-Public", if sink.public { "1" } else { "0" })
            .header("Ice-Description", &sink.description)
            .body(reqwest::Body::wrap_stream(body_stream));

        tracing::info!(mountpoint = %sink.mountpoint, attempt, "connecting to stream sink");

        let outcome = tokio::select! {
            _ = cancel.cancelled() => break,
            result = request.send() => result,
        };

        match outcome {
            Ok(response) if response.status().is_success() => {
                state.store(StreamState::Active as u8, Ordering::Relaxed);
                attempt = 0;
                // The request future above only resolves once the body
                // stream ends (the connection dropped or we were
                // cancelled) or the sink closed the response early; either
                // way we fall through to the backoff/retry logic below.
                tracing::warn!(mountpoint = %sink.mountpoint, "stream sink connection ended");
            }
            Ok(response)
                if response.status() == reqwest::StatusCode::UNAUTHORIZED
                    || response.status() == reqwest::StatusCode::FORBIDDEN =>
            {
                tracing::error!(
                    mountpoint = %sink.mountpoint,
                    status = %response.status(),
                    "stream sink rejected credentials, aborting"
                );
                break;
            }
            Ok(response) => {
                tracing::warn!(
                    mountpoint = %sink.mountpoint,
                    status = %response.status(),
                    "stream sink returned an error status"
                );
            }
            Err(err) => {
                tracing::warn!(mountpoint = %sink.mountpoint, error = %err, "stream sink connection failed");
            }
        }

        attempt += 1;
        if attempt >= MAX_ATTEMPTS {
            tracing::error!(mountpoint = %sink.mountpoint, "giving up on stream sink after max attempts");
            break;
        }

        let backoff = INITIAL_BACKOFF
            .saturating_mul(1 << (attempt - 1))
            .min(MAX_BACKOFF);
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(backoff) => {}
        }
    }

    state.store(StreamState::Stopped as u8, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_sink() -> SinkConfig {
        SinkConfig {
            host: "127.0.0.1".into(),
            port: 8000,
            mountpoint: "/live".into(),
            username: "source".into(),
            password: "hackme".into(),
            content_type: "audio/webm".into(),
            public: false,
            description: String::new(),
        }
    }

    #[tokio::test]
    async fn a_second_start_on_the_same_mountpoint_is_rejected() {
        let registry = StreamRegistry::new();
        let first = StreamRelay::start(test_sink(), registry.clone()).await.unwrap();
        let err = StreamRelay::start(test_sink(), registry).await.unwrap_err();
        assert!(matches!(err, SignalingError::StreamRejected(_)));
        first.stop().await;
    }

    #[tokio::test]
    async fn mountpoint_is_freed_after_stop() {
        let registry = StreamRegistry::new();
        let relay = StreamRelay::start(test_sink(), registry.clone()).await.unwrap();
        relay.stop().await;
        let second = StreamRelay::start(test_sink(), registry).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn oversized_chunk_is_rejected() {
        let registry = StreamRegistry::new();
        let relay = StreamRelay::start(test_sink(), registry).await.unwrap();
        let big = base64::engine::general_purpose::STANDARD.encode(vec![0u8; 128]);
        let err = relay.push_chunk(&big, 64).unwrap_err();
        assert_eq!(err, SignalingError::MessageTooLarge { limit: 64 });
        relay.stop().await;
    }
}
