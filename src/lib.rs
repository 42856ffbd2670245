//! gramfix is a terminal chat client that streams grammar corrections for
//! English sentences from an OpenAI-compatible chat-completion API.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the session adapter around the remote API, the
//!   conversation view-model that reconciles streamed fragments into chat
//!   messages, configuration, and the shared application state.
//! - [`ui`] renders the terminal interface and runs the interactive event
//!   loop that drives user input and display updates.
//! - [`api`] defines the chat-completion wire payloads.
//! - [`auth`] resolves and stores the API key.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod auth;
pub mod cli;
pub mod core;
pub mod ui;
pub mod utils;
