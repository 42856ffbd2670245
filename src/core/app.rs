//! Application state shared by the TUI event loop.
//!
//! [`App`] pairs the conversation view-model with the shared session adapter.
//! Input handlers turn key presses into [`AppAction`]s; handling an action
//! mutates state synchronously and may return an [`AppCommand`] that the
//! event loop executes (spawning a turn, resetting the session).

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::core::chat_stream::{ChatStreamService, SharedAdapter, StreamMessage};
use crate::core::conversation::Conversation;
use crate::core::session::{SessionAdapter, SessionError};
use crate::utils::logging::LoggingState;

#[derive(Debug, Clone, PartialEq)]
pub enum AppAction {
    InsertChar(char),
    Backspace,
    Submit,
    ScrollUp(u16),
    ScrollDown(u16),
    /// Ask for confirmation before starting over.
    RequestReset,
    ConfirmReset,
    CancelReset,
    Quit,
    StreamChunk { content: String, turn_id: u64 },
    StreamErrored { error: SessionError, turn_id: u64 },
    StreamCompleted { turn_id: u64 },
}

impl AppAction {
    pub fn from_stream_message(message: StreamMessage, turn_id: u64) -> Self {
        match message {
            StreamMessage::Chunk(content) => AppAction::StreamChunk { content, turn_id },
            StreamMessage::Error(error) => AppAction::StreamErrored { error, turn_id },
            StreamMessage::End => AppAction::StreamCompleted { turn_id },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    SpawnTurn { text: String, turn_id: u64 },
    ResetSession,
}

#[derive(Debug, Default)]
pub struct UiState {
    /// Lines scrolled up from the bottom of the transcript; 0 follows new output.
    pub scroll_from_bottom: u16,
    /// Furthest `scroll_from_bottom` can go for the last drawn frame.
    pub max_scroll: u16,
    pub confirm_reset: bool,
    pub exit_requested: bool,
}

pub struct App {
    pub conversation: Conversation,
    pub ui: UiState,
    adapter: SharedAdapter,
    model: String,
    logging: LoggingState,
}

impl App {
    pub fn new(adapter: SessionAdapter, greeting: &str, logging: Option<LoggingState>) -> Self {
        let model = adapter.model().to_string();
        Self {
            conversation: Conversation::new(greeting),
            ui: UiState::default(),
            adapter: Arc::new(Mutex::new(adapter)),
            model,
            logging: logging.unwrap_or_else(LoggingState::disabled),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn adapter(&self) -> SharedAdapter {
        self.adapter.clone()
    }

    pub fn logging_status(&self) -> String {
        self.logging.get_status_string()
    }

    /// Create the first session. Failures are logged, never fatal.
    pub async fn initialize_session(&self) {
        let mut adapter = self.adapter.lock().await;
        match adapter.initialize() {
            Ok(()) => info!(model = %self.model, "chat session ready"),
            Err(err) => warn!(error = %err, "chat session initialization failed"),
        }
    }

    /// Start over: fresh session handle, single greeting, empty input.
    ///
    /// Returns `false` without changing anything while a turn is in flight.
    pub async fn reset_conversation(&mut self) -> bool {
        if self.conversation.is_busy() {
            return false;
        }
        self.initialize_session().await;
        self.conversation.reset();
        self.ui.scroll_from_bottom = 0;
        if let Err(e) = self.logging.log_message("## New conversation") {
            warn!("Failed to log message: {e}");
        }
        true
    }

    pub fn handle_action(&mut self, action: AppAction) -> Option<AppCommand> {
        match action {
            AppAction::InsertChar(ch) => {
                self.conversation.push_input_char(ch);
                None
            }
            AppAction::Backspace => {
                self.conversation.pop_input_char();
                None
            }
            AppAction::Submit => self.submit(),
            AppAction::ScrollUp(lines) => {
                self.ui.scroll_from_bottom = self
                    .ui
                    .scroll_from_bottom
                    .saturating_add(lines)
                    .min(self.ui.max_scroll);
                None
            }
            AppAction::ScrollDown(lines) => {
                self.ui.scroll_from_bottom = self.ui.scroll_from_bottom.saturating_sub(lines);
                None
            }
            AppAction::RequestReset => {
                self.ui.confirm_reset = !self.conversation.is_busy();
                None
            }
            AppAction::ConfirmReset => {
                let confirmed = std::mem::take(&mut self.ui.confirm_reset);
                confirmed.then_some(AppCommand::ResetSession)
            }
            AppAction::CancelReset => {
                self.ui.confirm_reset = false;
                None
            }
            AppAction::Quit => {
                self.ui.exit_requested = true;
                None
            }
            AppAction::StreamChunk { content, turn_id } => {
                self.conversation.apply_fragment(turn_id, &content);
                None
            }
            AppAction::StreamErrored { error, turn_id } => {
                if self.conversation.fail_stream(turn_id, &error) {
                    warn!(turn_id, error = %error, "chat turn failed");
                }
                None
            }
            AppAction::StreamCompleted { turn_id } => {
                if let Some(reply) = self.conversation.finish_stream(turn_id) {
                    debug!(turn_id, empty = reply.is_none(), "chat turn completed");
                    if let Some(reply) = reply {
                        if let Err(e) = self.logging.log_message(&reply) {
                            warn!("Failed to log message: {e}");
                        }
                    }
                }
                None
            }
        }
    }

    fn submit(&mut self) -> Option<AppCommand> {
        let turn = self.conversation.submit()?;
        if let Err(e) = self.logging.log_message(&format!("You: {}", turn.text)) {
            warn!("Failed to log message: {e}");
        }
        self.ui.scroll_from_bottom = 0;
        self.conversation.begin_stream(turn.turn_id);
        Some(AppCommand::SpawnTurn {
            text: turn.text,
            turn_id: turn.turn_id,
        })
    }

    pub async fn execute_command(
        &mut self,
        command: AppCommand,
        stream_service: &ChatStreamService,
    ) {
        match command {
            AppCommand::SpawnTurn { text, turn_id } => {
                stream_service.spawn_turn(self.adapter(), text, turn_id);
            }
            AppCommand::ResetSession => {
                self.reset_conversation().await;
            }
        }
    }
}
