//! Conversation view-model.
//!
//! Owns the ordered list of chat messages and the per-turn state machine:
//! `Idle -> UserSubmitted -> Streaming { active: None | Some(id) } -> Idle`.
//! All mutations happen on the event-loop task; the busy flag is derived from
//! the turn phase rather than guarded by a lock.

use std::collections::VecDeque;

use crate::core::constants::{GENERIC_APOLOGY, MISSING_CREDENTIAL_APOLOGY};
use crate::core::message::{Message, MessageId};
use crate::core::session::SessionError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    UserSubmitted {
        turn_id: u64,
    },
    Streaming {
        turn_id: u64,
        /// The model bubble receiving fragments, once the first one arrived.
        active: Option<MessageId>,
    },
}

/// A submitted turn that still has to be sent to the session adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTurn {
    pub turn_id: u64,
    pub text: String,
}

/// User-facing text for a failed turn.
pub fn apology_for(error: &SessionError) -> &'static str {
    if error.is_missing_credential() {
        MISSING_CREDENTIAL_APOLOGY
    } else {
        GENERIC_APOLOGY
    }
}

pub struct Conversation {
    messages: VecDeque<Message>,
    input: String,
    phase: TurnPhase,
    greeting: String,
    next_turn_id: u64,
}

impl Conversation {
    pub fn new(greeting: impl Into<String>) -> Self {
        let greeting = greeting.into();
        let mut messages = VecDeque::new();
        messages.push_back(Message::model(greeting.clone()));
        Self {
            messages,
            input: String::new(),
            phase: TurnPhase::Idle,
            greeting,
            next_turn_id: 1,
        }
    }

    pub fn messages(&self) -> &VecDeque<Message> {
        &self.messages
    }

    pub fn phase(&self) -> &TurnPhase {
        &self.phase
    }

    pub fn is_busy(&self) -> bool {
        self.phase != TurnPhase::Idle
    }

    fn current_turn_id(&self) -> Option<u64> {
        match self.phase {
            TurnPhase::Idle => None,
            TurnPhase::UserSubmitted { turn_id } | TurnPhase::Streaming { turn_id, .. } => {
                Some(turn_id)
            }
        }
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    pub fn push_input_char(&mut self, ch: char) {
        self.input.push(ch);
    }

    pub fn pop_input_char(&mut self) {
        self.input.pop();
    }

    /// Start a turn from the pending input.
    ///
    /// Returns `None` without touching any state when the trimmed input is
    /// empty or another turn is still in flight.
    pub fn submit(&mut self) -> Option<PendingTurn> {
        if self.is_busy() {
            return None;
        }
        let text = self.input.trim().to_string();
        if text.is_empty() {
            return None;
        }

        self.messages.push_back(Message::user(text.clone()));
        self.input.clear();

        let turn_id = self.next_turn_id;
        self.next_turn_id += 1;
        self.phase = TurnPhase::UserSubmitted { turn_id };
        Some(PendingTurn { turn_id, text })
    }

    /// Mark the adapter call for `turn_id` as started.
    pub fn begin_stream(&mut self, turn_id: u64) -> bool {
        match self.phase {
            TurnPhase::UserSubmitted { turn_id: current } if current == turn_id => {
                self.phase = TurnPhase::Streaming {
                    turn_id,
                    active: None,
                };
                true
            }
            _ => false,
        }
    }

    /// Apply one streamed fragment. The first fragment creates the model
    /// bubble; later ones are concatenated onto it.
    pub fn apply_fragment(&mut self, turn_id: u64, fragment: &str) -> bool {
        if fragment.is_empty() {
            return false;
        }
        let TurnPhase::Streaming {
            turn_id: current,
            active,
        } = &mut self.phase
        else {
            return false;
        };
        if *current != turn_id {
            return false;
        }

        match active {
            Some(id) => {
                let Some(message) = self.messages.iter_mut().rev().find(|m| m.id == *id) else {
                    return false;
                };
                message.content.push_str(fragment);
            }
            None => {
                let message = Message::model(fragment);
                *active = Some(message.id.clone());
                self.messages.push_back(message);
            }
        }
        true
    }

    /// Finish `turn_id` successfully.
    ///
    /// Returns `None` when `turn_id` is not the turn in flight, otherwise the
    /// full reply text (`None` inside when no fragment arrived, in which case
    /// no bubble was added).
    pub fn finish_stream(&mut self, turn_id: u64) -> Option<Option<String>> {
        if self.current_turn_id() != Some(turn_id) {
            return None;
        }

        let reply = match &self.phase {
            TurnPhase::Streaming {
                active: Some(id), ..
            } => self
                .messages
                .iter()
                .rev()
                .find(|m| &m.id == id)
                .map(|m| m.content.clone()),
            _ => None,
        };
        self.phase = TurnPhase::Idle;
        Some(reply)
    }

    /// Fail `turn_id`: append a new error bubble and return to idle.
    ///
    /// A partially streamed model bubble stays as it was.
    pub fn fail_stream(&mut self, turn_id: u64, error: &SessionError) -> bool {
        if self.current_turn_id() != Some(turn_id) {
            return false;
        }
        self.messages.push_back(Message::error(apology_for(error)));
        self.phase = TurnPhase::Idle;
        true
    }

    /// Replace the transcript with a fresh greeting and clear the input.
    ///
    /// Refused while a turn is in flight.
    pub fn reset(&mut self) -> bool {
        if self.is_busy() {
            return false;
        }
        self.messages.clear();
        self.messages.push_back(Message::model(self.greeting.clone()));
        self.input.clear();
        true
    }
}
