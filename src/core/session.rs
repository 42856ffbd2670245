//! Session adapter around the remote chat-completion service.
//!
//! [`SessionAdapter`] owns at most one [`ChatSession`] handle at a time and
//! turns each user turn into a stream of response fragments. The remote
//! service itself sits behind the [`ChatBackend`] trait so the adapter can be
//! driven by an in-memory backend in tests.

use std::error::Error;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};
use tracing::debug;

use crate::api::{ChatMessage, ChatRequest};
use crate::core::constants::{DEFAULT_MODEL, SYSTEM_INSTRUCTION, TEMPERATURE};

/// Fragments of one streamed reply, in arrival order.
pub type FragmentStream = BoxStream<'static, Result<String, SessionError>>;

/// Failures surfaced by the session adapter and its backends.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// No API key is configured. Detected before any network call.
    MissingCredential,

    /// A turn was sent before [`SessionAdapter::initialize`] succeeded.
    Uninitialized,

    /// The request could not be sent or the connection dropped mid-stream.
    Transport(String),

    /// The service rejected the request or reported an error in the stream.
    Api {
        /// HTTP status when the error came from the response head.
        status: Option<u16>,
        /// Formatted error body.
        message: String,
    },
}

impl SessionError {
    pub fn is_missing_credential(&self) -> bool {
        matches!(self, SessionError::MissingCredential)
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::MissingCredential => write!(f, "no API key configured"),
            SessionError::Uninitialized => write!(f, "chat session has not been initialized"),
            SessionError::Transport(detail) => write!(f, "transport error: {detail}"),
            SessionError::Api {
                status: Some(status),
                message,
            } => write!(f, "API request failed with status {status}: {message}"),
            SessionError::Api {
                status: None,
                message,
            } => write!(f, "{message}"),
        }
    }
}

impl Error for SessionError {}

/// Remote chat-completion service.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Open a streamed completion for `request`.
    ///
    /// Errors raised before the first byte (connection failures, non-2xx
    /// statuses) are returned directly; later failures arrive as stream items.
    async fn stream_chat(
        &self,
        api_key: &str,
        request: ChatRequest,
    ) -> Result<FragmentStream, SessionError>;
}

/// Fixed parameters applied to every new session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub model: String,
    pub system_instruction: String,
    pub temperature: f32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            system_instruction: SYSTEM_INSTRUCTION.to_string(),
            temperature: TEMPERATURE,
        }
    }
}

impl SessionSettings {
    pub fn with_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }
}

/// One ongoing conversation with the remote model.
#[derive(Debug, Clone)]
pub struct ChatSession {
    settings: SessionSettings,
    history: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            settings,
            history: Vec::new(),
        }
    }

    /// Completed exchanges, oldest first, excluding the system instruction.
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn turn_count(&self) -> usize {
        self.history.len() / 2
    }

    fn build_request(&self, user_text: &str) -> ChatRequest {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(ChatMessage::system(self.settings.system_instruction.clone()));
        messages.extend(self.history.iter().cloned());
        messages.push(ChatMessage::user(user_text));

        ChatRequest {
            model: self.settings.model.clone(),
            messages,
            stream: true,
            temperature: self.settings.temperature,
        }
    }

    fn record_exchange(&mut self, user_text: String, reply: String) {
        self.history.push(ChatMessage::user(user_text));
        self.history.push(ChatMessage::assistant(reply));
    }
}

pub struct SessionAdapter {
    backend: Arc<dyn ChatBackend>,
    credential: Option<String>,
    settings: SessionSettings,
    session: Option<ChatSession>,
}

impl SessionAdapter {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        credential: Option<String>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            backend,
            credential,
            settings,
            session: None,
        }
    }

    fn credential(&self) -> Option<&str> {
        self.credential
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    pub fn has_credential(&self) -> bool {
        self.credential().is_some()
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    pub fn session(&self) -> Option<&ChatSession> {
        self.session.as_ref()
    }

    /// Replace the current session handle with a fresh one.
    ///
    /// The previous handle is dropped even when this fails, so a failed
    /// reset never leaves stale history behind.
    pub fn initialize(&mut self) -> Result<(), SessionError> {
        self.session = None;
        if !self.has_credential() {
            return Err(SessionError::MissingCredential);
        }
        self.session = Some(ChatSession::new(self.settings.clone()));
        debug!(model = %self.settings.model, "chat session initialized");
        Ok(())
    }

    /// Send one user turn and stream the reply.
    ///
    /// The session history advances by one exchange only once the returned
    /// stream has been drained without error.
    pub async fn send_and_stream(&mut self, message: &str) -> Result<TurnStream<'_>, SessionError> {
        let api_key = self
            .credential()
            .ok_or(SessionError::MissingCredential)?
            .to_string();
        let session = self.session.as_mut().ok_or(SessionError::Uninitialized)?;

        let request = session.build_request(message);
        debug!(
            model = %request.model,
            history_messages = session.history.len(),
            "opening chat stream"
        );
        let inner = self.backend.stream_chat(&api_key, request).await?;

        Ok(TurnStream {
            inner,
            session,
            user_text: message.to_string(),
            reply: String::new(),
            finished: false,
        })
    }
}

/// Fragment stream for a single turn.
///
/// Empty fragments are skipped. The first error ends the stream.
pub struct TurnStream<'a> {
    inner: FragmentStream,
    session: &'a mut ChatSession,
    user_text: String,
    reply: String,
    finished: bool,
}

impl Stream for TurnStream<'_> {
    type Item = Result<String, SessionError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        loop {
            match this.inner.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(fragment))) => {
                    if fragment.is_empty() {
                        continue;
                    }
                    this.reply.push_str(&fragment);
                    return Poll::Ready(Some(Ok(fragment)));
                }
                Poll::Ready(Some(Err(err))) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(None) => {
                    this.finished = true;
                    let user_text = std::mem::take(&mut this.user_text);
                    let reply = std::mem::take(&mut this.reply);
                    this.session.record_exchange(user_text, reply);
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
