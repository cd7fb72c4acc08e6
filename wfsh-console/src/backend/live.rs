//! Live update channel consumer
//!
//! Long-lived SSE subscription to the backend's flowsheet stream. Each frame
//! carries one `LiveUpdate` which is handed to the reconciliation engine. On
//! any stream failure the engine is flipped to degraded and the connection is
//! retried with exponential backoff; every successful (re)connect triggers a
//! full resync before frames are consumed.

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use wfsh_common::events::LiveUpdate;

use crate::error::{Error, Result};
use crate::flowsheet::FlowsheetEngine;

/// A silent stream is dead: the backend sends keepalive comments well inside
/// this window.
const IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// SSE consumer driving the reconciliation engine's remote side.
pub struct LiveChannel {
    client: reqwest::Client,
    url: String,
    engine: Arc<FlowsheetEngine>,
    initial_delay: Duration,
    max_delay: Duration,
}

impl LiveChannel {
    /// Build a channel consumer for the backend at `backend_url`.
    ///
    /// The client deliberately has no request timeout; the subscription is
    /// long-lived and staleness is detected via `IDLE_TIMEOUT` instead.
    pub fn new(
        backend_url: &str,
        engine: Arc<FlowsheetEngine>,
        initial_delay: Duration,
        max_delay: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("wfsh-console/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Internal(format!("building HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: format!(
                "{}/api/v1/flowsheet/events",
                backend_url.trim_end_matches('/')
            ),
            engine,
            initial_delay,
            max_delay,
        })
    }

    /// Run the subscription loop until the process shuts down.
    pub async fn run(self) {
        let mut retry_count: u32 = 0;
        let mut delay = self.initial_delay;

        loop {
            match self.connect_and_consume().await {
                Ok(()) => {
                    // Server closed the stream cleanly; reconnect promptly.
                    info!("Live update stream ended, reconnecting");
                    retry_count = 0;
                    delay = self.initial_delay;
                }
                Err(err) => {
                    retry_count += 1;
                    self.engine.channel_degraded(retry_count).await;

                    warn!(
                        retry_count,
                        delay_ms = delay.as_millis() as u64,
                        "Live update channel failed: {err}"
                    );

                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(self.max_delay);
                }
            }
        }
    }

    /// One subscription: connect, resync, then consume frames until the
    /// stream errors or ends.
    ///
    /// The stream is opened before the resync so pushes landing during the
    /// resync window queue in the connection instead of being missed; the
    /// engine only sees them once it is live again.
    async fn connect_and_consume(&self) -> Result<()> {
        debug!(url = %self.url, "Connecting to live update channel");

        let response = self
            .client
            .get(&self.url)
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| Error::backend_transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::backend(
                status.as_u16(),
                "subscribe_failed",
                format!("live channel subscription returned HTTP {status}"),
            ));
        }

        self.engine.resync().await?;
        info!("Live update channel connected");

        let mut stream = response.bytes_stream();
        let mut decoder = FrameDecoder::new();

        loop {
            let chunk = match tokio::time::timeout(IDLE_TIMEOUT, stream.next()).await {
                Ok(Some(Ok(chunk))) => chunk,
                Ok(Some(Err(e))) => return Err(Error::backend_transport(e.to_string())),
                Ok(None) => return Ok(()),
                Err(_) => {
                    return Err(Error::backend_transport(format!(
                        "no traffic on live channel for {}s",
                        IDLE_TIMEOUT.as_secs()
                    )))
                }
            };

            for payload in decoder.push(&chunk) {
                match serde_json::from_str::<LiveUpdate>(&payload) {
                    Ok(update) => self.engine.apply_live_update(update).await,
                    // Malformed pushes are dropped; the stream stays up.
                    Err(e) => warn!("Dropping unparseable live update: {e}"),
                }
            }
        }
    }
}

/// Incremental SSE frame decoder.
///
/// Accumulates raw bytes and yields the `data:` payload of each completed
/// frame. Comment lines (keepalives) and frames tagged with an unrelated
/// event name are discarded.
struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Feed a chunk; returns the data payloads of any frames it completed.
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        // CR never occurs inside a multi-byte UTF-8 sequence, so dropping it
        // here normalizes CRLF streams without corrupting characters that
        // straddle chunk boundaries.
        self.buffer
            .extend(chunk.iter().copied().filter(|&b| b != b'\r'));

        let mut payloads = Vec::new();
        while let Some(end) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let frame: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(payload) = decode_frame(&String::from_utf8_lossy(&frame)) {
                payloads.push(payload);
            }
        }
        payloads
    }
}

/// Extract the joined `data:` payload from one SSE frame.
///
/// Frames with an `event:` tag other than `flowsheet` (and frames with no
/// data at all) yield `None`.
fn decode_frame(frame: &str) -> Option<String> {
    let mut event: Option<&str> = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in frame.lines() {
        if line.starts_with(':') {
            continue;
        }
        if let Some(value) = line.strip_prefix("event:") {
            event = Some(value.trim_start_matches(' '));
        } else if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.trim_start_matches(' '));
        }
    }

    if data_lines.is_empty() {
        return None;
    }
    match event {
        None | Some("flowsheet") => Some(data_lines.join("\n")),
        Some(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_single_frame() {
        let mut decoder = FrameDecoder::new();
        let payloads = decoder.push(b"event: flowsheet\ndata: {\"a\":1}\n\n");
        assert_eq!(payloads, vec!["{\"a\":1}".to_string()]);
    }

    #[test]
    fn reassembles_frames_split_across_chunks() {
        let mut decoder = FrameDecoder::new();

        assert!(decoder.push(b"event: flowsheet\nda").is_empty());
        assert!(decoder.push(b"ta: {\"a\":").is_empty());
        let payloads = decoder.push(b"1}\n\nevent: flowsheet\ndata: {\"b\":2}\n\n");

        assert_eq!(
            payloads,
            vec!["{\"a\":1}".to_string(), "{\"b\":2}".to_string()]
        );
    }

    #[test]
    fn keepalive_comments_yield_nothing() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b": keepalive 1755800000\n\n").is_empty());
    }

    #[test]
    fn unrelated_event_names_are_skipped() {
        let mut decoder = FrameDecoder::new();
        let payloads = decoder.push(b"event: metrics\ndata: {\"cpu\":99}\n\n");
        assert!(payloads.is_empty());
    }

    #[test]
    fn untagged_frames_are_accepted() {
        let mut decoder = FrameDecoder::new();
        let payloads = decoder.push(b"data: {\"a\":1}\n\n");
        assert_eq!(payloads, vec!["{\"a\":1}".to_string()]);
    }

    #[test]
    fn multi_line_data_is_joined() {
        let mut decoder = FrameDecoder::new();
        let payloads = decoder.push(b"data: {\ndata: \"a\": 1\ndata: }\n\n");
        assert_eq!(payloads, vec!["{\n\"a\": 1\n}".to_string()]);
    }

    #[test]
    fn crlf_line_endings_are_tolerated() {
        let mut decoder = FrameDecoder::new();
        let payloads = decoder.push(b"event: flowsheet\r\ndata: {\"a\":1}\r\n\r\n");
        assert_eq!(payloads, vec!["{\"a\":1}".to_string()]);
    }
}
