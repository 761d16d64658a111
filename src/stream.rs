use std::time::Duration;

use iced::futures::{SinkExt, Stream, StreamExt};

use crate::protocol::Snapshot;

/// Reconnect attempts before the connection is declared dead.
pub const MAX_RETRIES: u32 = 10;
/// First backoff step; doubled per attempt.
const BASE_DELAY: Duration = Duration::from_secs(1);
/// Backoff ceiling.
const DELAY_CAP: Duration = Duration::from_secs(30);

const CHANNEL_CAPACITY: usize = 64;

/// Lifecycle of the push connection, as surfaced in the status indicator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Connecting,
    Connected,
    Retrying {
        attempt: u32,
    },
    /// Retry budget exhausted. Terminal until the user reconnects manually.
    Failed,
}

impl ConnectionState {
    pub fn is_failed(&self) -> bool {
        matches!(self, ConnectionState::Failed)
    }
}

/// Events pushed from the connection worker to the coordinator.
#[derive(Clone, Debug)]
pub enum Event {
    Connecting,
    Connected,
    Update(Box<Snapshot>),
    Retrying { attempt: u32, delay: Duration },
    Failed,
}

// ─── BACKOFF SCHEDULE ───────────────────────────────────────────

/// Pure reconnect schedule, kept separate from the transport so the
/// timing contract is testable without a socket.
#[derive(Clone, Copy, Debug, Default)]
pub struct RetryPolicy {
    attempt: u32,
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay before the next reconnect attempt, or None once the retry
    /// budget is spent. `min(base * 2^attempt, cap)` with the attempt
    /// counter incremented first.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= MAX_RETRIES {
            return None;
        }
        self.attempt += 1;
        Some((BASE_DELAY * (1u32 << self.attempt)).min(DELAY_CAP))
    }

    /// A successful handshake clears the counter.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

// ─── SSE FRAMING ────────────────────────────────────────────────

/// Incremental decoder for `text/event-stream` bodies.
///
/// Transport chunks carry no framing guarantees; bytes are buffered until
/// a complete line exists. `data:` lines accumulate until the blank line
/// that terminates an event, multi-line payloads joined with `\n`.
/// Comments and fields this feed does not use (`event:`, `id:`, `retry:`)
/// are skipped.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Consume one transport chunk, returning any completed event payloads.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                if !self.data.is_empty() {
                    out.push(self.data.join("\n"));
                    self.data.clear();
                }
            } else if let Some(rest) = line.strip_prefix("data:") {
                self.data
                    .push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
            }
        }
        out
    }
}

// ─── CONNECTION WORKER ──────────────────────────────────────────

/// Open the push stream and keep it alive, reporting every state
/// transition and decoded snapshot through the subscription channel.
///
/// This worker is the sole owner of the transport. Malformed frames are
/// dropped and logged without touching connection state; once the retry
/// budget is exhausted a final [`Event::Failed`] is emitted and the worker
/// parks until the subscription itself is torn down and rebuilt.
pub fn subscribe(endpoint: String) -> impl Stream<Item = Event> {
    iced::stream::channel(CHANNEL_CAPACITY, |mut output| async move {
        let client = reqwest::Client::new();
        let mut policy = RetryPolicy::new();

        loop {
            let _ = output.send(Event::Connecting).await;

            match open(&client, &endpoint).await {
                Ok(response) => {
                    tracing::info!(%endpoint, "push stream connected");
                    policy.reset();
                    let _ = output.send(Event::Connected).await;

                    let mut decoder = SseDecoder::default();
                    let mut body = response.bytes_stream();
                    loop {
                        match body.next().await {
                            Some(Ok(chunk)) => {
                                for payload in decoder.feed(&chunk) {
                                    match serde_json::from_str::<Snapshot>(&payload) {
                                        Ok(snapshot) => {
                                            let _ =
                                                output.send(Event::Update(Box::new(snapshot))).await;
                                        }
                                        Err(err) => {
                                            tracing::warn!(%err, "dropping malformed stream message");
                                        }
                                    }
                                }
                            }
                            Some(Err(err)) => {
                                tracing::warn!(%err, "push stream read error");
                                break;
                            }
                            None => {
                                tracing::info!("push stream closed by server");
                                break;
                            }
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(%err, "push stream connect failed");
                }
            }

            match policy.next_delay() {
                Some(delay) => {
                    let attempt = policy.attempt();
                    tracing::info!(attempt, ?delay, "reconnecting to push stream");
                    let _ = output.send(Event::Retrying { attempt, delay }).await;
                    tokio::time::sleep(delay).await;
                }
                None => {
                    tracing::error!("push stream retry budget exhausted");
                    let _ = output.send(Event::Failed).await;
                    iced::futures::future::pending::<()>().await;
                }
            }
        }
    })
}

async fn open(
    client: &reqwest::Client,
    endpoint: &str,
) -> Result<reqwest::Response, reqwest::Error> {
    client
        .get(endpoint)
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .send()
        .await?
        .error_for_status()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_and_cap() {
        let mut policy = RetryPolicy::new();
        let mut delays = Vec::new();
        while let Some(d) = policy.next_delay() {
            delays.push(d);
        }
        assert_eq!(delays.len(), MAX_RETRIES as usize);
        assert_eq!(delays[0], Duration::from_secs(2));
        assert_eq!(delays[1], Duration::from_secs(4));
        assert_eq!(delays[2], Duration::from_secs(8));
        // non-decreasing throughout, capped at the ceiling
        for pair in delays.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        assert!(delays.iter().all(|d| *d <= Duration::from_secs(30)));
        assert_eq!(*delays.last().unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn budget_exhaustion_is_terminal() {
        let mut policy = RetryPolicy::new();
        for _ in 0..MAX_RETRIES {
            assert!(policy.next_delay().is_some());
        }
        assert!(policy.next_delay().is_none());
        assert!(policy.next_delay().is_none());
    }

    #[test]
    fn reset_clears_the_counter() {
        let mut policy = RetryPolicy::new();
        policy.next_delay();
        policy.next_delay();
        policy.next_delay();
        assert_eq!(policy.attempt(), 3);
        policy.reset();
        assert_eq!(policy.attempt(), 0);
        // schedule restarts from the first step
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn decoder_single_event() {
        let mut dec = SseDecoder::default();
        let out = dec.feed(b"data: {\"a\":1}\n\n");
        assert_eq!(out, vec![String::from("{\"a\":1}")]);
    }

    #[test]
    fn decoder_reassembles_across_chunks() {
        let mut dec = SseDecoder::default();
        assert!(dec.feed(b"da").is_empty());
        assert!(dec.feed(b"ta: {\"a\"").is_empty());
        assert!(dec.feed(b":1}\n").is_empty());
        let out = dec.feed(b"\n");
        assert_eq!(out, vec![String::from("{\"a\":1}")]);
    }

    #[test]
    fn decoder_multiple_events_per_chunk() {
        let mut dec = SseDecoder::default();
        let out = dec.feed(b"data: one\n\ndata: two\n\n");
        assert_eq!(out, vec![String::from("one"), String::from("two")]);
    }

    #[test]
    fn decoder_joins_multiline_data() {
        let mut dec = SseDecoder::default();
        let out = dec.feed(b"data: {\ndata: }\n\n");
        assert_eq!(out, vec![String::from("{\n}")]);
    }

    #[test]
    fn decoder_skips_comments_and_unused_fields() {
        let mut dec = SseDecoder::default();
        let out = dec.feed(b": keep-alive\nevent: update\nid: 7\nretry: 500\ndata: x\n\n");
        assert_eq!(out, vec![String::from("x")]);
    }

    #[test]
    fn decoder_handles_crlf() {
        let mut dec = SseDecoder::default();
        let out = dec.feed(b"data: x\r\n\r\n");
        assert_eq!(out, vec![String::from("x")]);
    }

    #[test]
    fn decoder_blank_line_without_data_is_noise() {
        let mut dec = SseDecoder::default();
        assert!(dec.feed(b"\n\n\n").is_empty());
    }
}
