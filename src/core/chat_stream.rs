use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, Stream, StreamExt};
use memchr::memchr;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::{ChatRequest, ChatResponse};
use crate::core::session::{ChatBackend, FragmentStream, SessionAdapter, SessionError};
use crate::utils::url::construct_api_url;

pub type SharedAdapter = Arc<Mutex<SessionAdapter>>;

#[derive(Clone, Debug)]
pub enum StreamMessage {
    Chunk(String),
    Error(SessionError),
    End,
}

#[derive(Debug, PartialEq)]
enum SseEvent {
    Fragment(String),
    Error(String),
    Done,
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

fn parse_data_payload(payload: &str) -> Option<SseEvent> {
    if payload == "[DONE]" {
        return Some(SseEvent::Done);
    }

    match serde_json::from_str::<ChatResponse>(payload) {
        Ok(response) => response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|content| !content.is_empty())
            .map(SseEvent::Fragment),
        Err(_) => {
            if payload.trim().is_empty() {
                return None;
            }
            Some(SseEvent::Error(format_api_error(payload)))
        }
    }
}

fn parse_sse_line(line: &str) -> Option<SseEvent> {
    extract_data_payload(line).and_then(parse_data_payload)
}

/// Incremental decoder for a `text/event-stream` body.
#[derive(Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(newline_pos) = memchr(b'\n', &self.buffer) {
            match std::str::from_utf8(&self.buffer[..newline_pos]) {
                Ok(line) => events.extend(parse_sse_line(line.trim())),
                Err(e) => warn!("Invalid UTF-8 in stream: {e}"),
            }
            self.buffer.drain(..=newline_pos);
        }

        events
    }

    /// Flush a trailing line that was not newline-terminated.
    fn finish(&mut self) -> Vec<SseEvent> {
        if self.buffer.is_empty() {
            return Vec::new();
        }
        self.buffer.push(b'\n');
        self.push(&[])
    }
}

struct SseState<S> {
    source: Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<SseEvent>,
    exhausted: bool,
}

/// Turn a raw byte stream into a stream of text fragments.
///
/// `[DONE]` ends the stream. An error payload or a transport failure yields
/// one error item and then ends the stream.
fn sse_fragments<S, B, E>(source: S) -> impl Stream<Item = Result<String, SessionError>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let state = SseState {
        source: Box::pin(source),
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        exhausted: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                match event {
                    SseEvent::Fragment(text) => return Some((Ok(text), state)),
                    SseEvent::Done => return None,
                    SseEvent::Error(message) => {
                        state.pending.clear();
                        state.exhausted = true;
                        return Some((
                            Err(SessionError::Api {
                                status: None,
                                message,
                            }),
                            state,
                        ));
                    }
                }
            }

            if state.exhausted {
                return None;
            }

            match state.source.next().await {
                Some(Ok(chunk)) => {
                    let events = state.decoder.push(chunk.as_ref());
                    state.pending.extend(events);
                }
                Some(Err(e)) => {
                    state.exhausted = true;
                    return Some((Err(SessionError::Transport(e.to_string())), state));
                }
                None => {
                    state.exhausted = true;
                    let events = state.decoder.finish();
                    state.pending.extend(events);
                }
            }
        }
    })
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value
                .get("error")
                .and_then(|v| v.as_str().map(str::to_owned))
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Render an error body from the service as a readable log line.
pub fn format_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();

    if trimmed.is_empty() {
        return "API Error: <empty>".to_string();
    }

    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(summary) = extract_error_summary(&json_value).filter(|s| !s.is_empty()) {
            return format!("API Error: {summary}");
        }
        return format!("API Error: {json_value}");
    }

    let collapsed = trimmed.split_whitespace().collect::<Vec<_>>().join(" ");
    format!("API Error: {collapsed}")
}

/// [`ChatBackend`] speaking the OpenAI-compatible `chat/completions` protocol.
#[derive(Clone)]
pub struct OpenAiBackend {
    client: reqwest::Client,
    base_url: String,
}

impl OpenAiBackend {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    async fn stream_chat(
        &self,
        api_key: &str,
        request: ChatRequest,
    ) -> Result<FragmentStream, SessionError> {
        let chat_url = construct_api_url(&self.base_url, "chat/completions");
        let response = self
            .client
            .post(chat_url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&request)
            .send()
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(SessionError::Api {
                status: Some(status),
                message: format_api_error(&error_text),
            });
        }

        Ok(sse_fragments(response.bytes_stream()).boxed())
    }
}

/// Runs turns on background tasks and reports their progress over a channel.
///
/// Every message carries the id of the turn it belongs to.
#[derive(Clone)]
pub struct ChatStreamService {
    tx: mpsc::UnboundedSender<(StreamMessage, u64)>,
}

impl ChatStreamService {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(StreamMessage, u64)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn spawn_turn(
        &self,
        adapter: SharedAdapter,
        text: String,
        turn_id: u64,
    ) -> JoinHandle<()> {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let mut adapter = adapter.lock().await;
            let mut stream = match adapter.send_and_stream(&text).await {
                Ok(stream) => stream,
                Err(err) => {
                    let _ = tx.send((StreamMessage::Error(err), turn_id));
                    let _ = tx.send((StreamMessage::End, turn_id));
                    return;
                }
            };

            let mut fragments = 0usize;
            while let Some(item) = stream.next().await {
                match item {
                    Ok(fragment) => {
                        fragments += 1;
                        let _ = tx.send((StreamMessage::Chunk(fragment), turn_id));
                    }
                    Err(err) => {
                        let _ = tx.send((StreamMessage::Error(err), turn_id));
                        let _ = tx.send((StreamMessage::End, turn_id));
                        return;
                    }
                }
            }

            debug!(turn_id, fragments, "chat stream finished");
            let _ = tx.send((StreamMessage::End, turn_id));
        })
    }

    #[cfg(test)]
    pub fn send_for_test(&self, message: StreamMessage, turn_id: u64) {
        let _ = self.tx.send((message, turn_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::{create_test_adapter, FakeBackend, ScriptedReply};

    #[test]
    fn parse_sse_line_handles_spacing_variants() {
        let variants = [
            (
                r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#,
                "Hello",
                "data: [DONE]",
            ),
            (
                r#"data:{"choices":[{"delta":{"content":"World"}}]}"#,
                "World",
                "data:[DONE]",
            ),
        ];

        for (chunk_line, expected_chunk, done_line) in variants {
            assert_eq!(
                parse_sse_line(chunk_line),
                Some(SseEvent::Fragment(expected_chunk.to_string()))
            );
            assert_eq!(parse_sse_line(done_line), Some(SseEvent::Done));
        }
    }

    #[test]
    fn parse_sse_line_ignores_comments_and_empty_deltas() {
        assert_eq!(parse_sse_line(": keep-alive"), None);
        assert_eq!(parse_sse_line("event: message"), None);
        assert_eq!(parse_sse_line("data: "), None);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":""}}]}"#),
            None
        );
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#),
            None
        );
    }

    #[test]
    fn parse_sse_line_routes_stream_errors() {
        let error_line = r#"data: {"error":{"message":"internal   server error"}}"#;
        assert_eq!(
            parse_sse_line(error_line),
            Some(SseEvent::Error("API Error: internal server error".to_string()))
        );
    }

    #[test]
    fn decoder_reassembles_lines_split_across_chunks() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"choices\":[{\"delta\":").is_empty());
        let events = decoder.push(b"{\"content\":\"Hi\"}}]}\n\ndata: [DO");
        assert_eq!(events, vec![SseEvent::Fragment("Hi".to_string())]);
        assert_eq!(decoder.push(b"NE]\n"), vec![SseEvent::Done]);
    }

    #[test]
    fn decoder_flushes_unterminated_final_line() {
        let mut decoder = SseDecoder::default();
        assert!(decoder
            .push(br#"data: {"choices":[{"delta":{"content":"tail"}}]}"#)
            .is_empty());
        assert_eq!(
            decoder.finish(),
            vec![SseEvent::Fragment("tail".to_string())]
        );
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn decoder_skips_invalid_utf8_lines() {
        let mut decoder = SseDecoder::default();
        let mut bytes = vec![0xff, 0xfe, b'\n'];
        bytes.extend_from_slice(b"data: [DONE]\n");
        assert_eq!(decoder.push(&bytes), vec![SseEvent::Done]);
    }

    #[tokio::test]
    async fn sse_fragments_stop_at_done() {
        let chunks: Vec<Result<&[u8], String>> = vec![
            Ok(&b"data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n"[..]),
            Ok(&b"data: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\ndata: [DONE]\n"[..]),
            Ok(&b"data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n"[..]),
        ];

        let fragments: Vec<_> = sse_fragments(stream::iter(chunks)).collect().await;
        assert_eq!(
            fragments,
            vec![Ok("Hello".to_string()), Ok(" world".to_string())]
        );
    }

    #[tokio::test]
    async fn sse_fragments_surface_transport_errors_once() {
        let chunks: Vec<Result<&[u8], String>> = vec![
            Ok(&b"data: {\"choices\":[{\"delta\":{\"content\":\"par\"}}]}\n"[..]),
            Err("connection reset".to_string()),
            Ok(&b"data: {\"choices\":[{\"delta\":{\"content\":\"never\"}}]}\n"[..]),
        ];

        let items: Vec<_> = sse_fragments(stream::iter(chunks)).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Ok("par".to_string()));
        assert_eq!(
            items[1],
            Err(SessionError::Transport("connection reset".to_string()))
        );
    }

    #[tokio::test]
    async fn sse_fragments_end_after_error_payload() {
        let chunks: Vec<Result<&[u8], String>> = vec![Ok(
            &b"data: {\"error\":{\"message\":\"overloaded\"}}\ndata: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n"[..],
        )];

        let items: Vec<_> = sse_fragments(stream::iter(chunks)).collect().await;
        assert_eq!(
            items,
            vec![Err(SessionError::Api {
                status: None,
                message: "API Error: overloaded".to_string(),
            })]
        );
    }

    #[test]
    fn format_api_error_summarizes_json() {
        let raw = r#"{"error":{"message":"model overloaded","type":"invalid_request_error"}}"#;
        assert_eq!(format_api_error(raw), "API Error: model overloaded");
        assert_eq!(
            format_api_error(r#"{"error":"quota exceeded"}"#),
            "API Error: quota exceeded"
        );
    }

    #[test]
    fn format_api_error_handles_json_without_summary() {
        assert_eq!(
            format_api_error(r#"{"status":"failed"}"#),
            r#"API Error: {"status":"failed"}"#
        );
    }

    #[test]
    fn format_api_error_handles_plaintext_and_empty() {
        assert_eq!(format_api_error("  api\n failure "), "API Error: api failure");
        assert_eq!(format_api_error("   "), "API Error: <empty>");
    }

    #[tokio::test]
    async fn spawn_turn_forwards_fragments_then_end() {
        let backend = Arc::new(FakeBackend::new());
        backend.push_reply(ScriptedReply::fragments(["Correction:", " fine"]));
        let mut adapter = create_test_adapter(backend.clone(), Some("key"));
        adapter.initialize().expect("initialize");
        let adapter = Arc::new(Mutex::new(adapter));

        let (service, mut rx) = ChatStreamService::new();
        service
            .spawn_turn(adapter.clone(), "hello".into(), 7)
            .await
            .expect("join");

        let mut received = Vec::new();
        while let Ok(message) = rx.try_recv() {
            received.push(message);
        }
        assert_eq!(received.len(), 3);
        assert!(received.iter().all(|(_, id)| *id == 7));
        assert!(matches!(&received[0].0, StreamMessage::Chunk(text) if text == "Correction:"));
        assert!(matches!(&received[1].0, StreamMessage::Chunk(text) if text == " fine"));
        assert!(matches!(received[2].0, StreamMessage::End));
        assert_eq!(
            adapter.lock().await.session().expect("session").turn_count(),
            1
        );
    }

    #[tokio::test]
    async fn spawn_turn_reports_missing_credential() {
        let backend = Arc::new(FakeBackend::new());
        let adapter = Arc::new(Mutex::new(create_test_adapter(backend.clone(), None)));

        let (service, mut rx) = ChatStreamService::new();
        service
            .spawn_turn(adapter, "hello".into(), 1)
            .await
            .expect("join");

        let (first, _) = rx.try_recv().expect("error message");
        assert!(matches!(first, StreamMessage::Error(SessionError::MissingCredential)));
        let (second, _) = rx.try_recv().expect("end message");
        assert!(matches!(second, StreamMessage::End));
        assert_eq!(backend.request_count(), 0);
    }
}
