//! Terminal user interface: rendering and the interactive event loop.

pub mod chat_loop;
pub mod renderer;
