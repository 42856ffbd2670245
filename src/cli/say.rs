//! TUI-less "say" command

use std::error::Error;
use std::io::{self, Write};

use futures_util::StreamExt;
use tracing::warn;

use crate::core::conversation::apology_for;
use crate::core::session::{SessionAdapter, SessionError};

pub async fn run_say(
    prompt: Vec<String>,
    mut adapter: SessionAdapter,
) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        eprintln!("Usage: gramfix say <sentence>");
        std::process::exit(1);
    }

    if let Err(err) = adapter.initialize() {
        warn!(error = %err, "chat session initialization failed");
    }

    if let Err(err) = stream_reply(&mut adapter, prompt.trim(), &mut io::stdout()).await {
        warn!(error = %err, "turn failed");
        eprintln!("\n❌ {}", apology_for(&err));
        std::process::exit(1);
    }

    Ok(())
}

/// Write fragments to `out` as they arrive, followed by a newline on success.
async fn stream_reply<W: Write>(
    adapter: &mut SessionAdapter,
    prompt: &str,
    out: &mut W,
) -> Result<(), SessionError> {
    let mut stream = adapter.send_and_stream(prompt).await?;
    while let Some(fragment) = stream.next().await {
        let fragment = fragment?;
        write_fragment(out, &fragment)?;
    }
    writeln!(out).map_err(|e| SessionError::Transport(e.to_string()))?;
    Ok(())
}

fn write_fragment<W: Write>(out: &mut W, fragment: &str) -> Result<(), SessionError> {
    out.write_all(fragment.as_bytes())
        .and_then(|_| out.flush())
        .map_err(|e| SessionError::Transport(e.to_string()))
}
