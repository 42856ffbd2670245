//! Main chat event loop
//!
//! Polls terminal input, drains stream progress from background turns, and
//! redraws. Every mutation of the transcript happens on this task; turns run
//! on spawned tasks and report back through [`ChatStreamService`].

mod keybindings;
mod lifecycle;

use std::{error::Error, time::Duration};

use ratatui::crossterm::event::{self, Event, KeyEventKind};
use tokio::sync::mpsc;

use self::keybindings::key_to_action;
use self::lifecycle::{restore_terminal, setup_terminal, ChatTerminal};
use crate::core::app::{App, AppAction};
use crate::core::chat_stream::{ChatStreamService, StreamMessage};
use crate::ui::renderer::{max_scroll, ui};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub async fn run_chat(mut app: App) -> Result<(), Box<dyn Error>> {
    app.initialize_session().await;

    let (stream_service, mut rx) = ChatStreamService::new();
    let mut terminal = setup_terminal()?;

    let result = event_loop(&mut terminal, &mut app, &stream_service, &mut rx).await;

    restore_terminal(&mut terminal)?;
    result
}

/// Apply every stream message that has arrived since the last frame.
fn drain_stream_messages(
    app: &mut App,
    rx: &mut mpsc::UnboundedReceiver<(StreamMessage, u64)>,
) {
    while let Ok((message, turn_id)) = rx.try_recv() {
        app.handle_action(AppAction::from_stream_message(message, turn_id));
    }
}

async fn event_loop(
    terminal: &mut ChatTerminal,
    app: &mut App,
    stream_service: &ChatStreamService,
    rx: &mut mpsc::UnboundedReceiver<(StreamMessage, u64)>,
) -> Result<(), Box<dyn Error>> {
    loop {
        drain_stream_messages(app, rx);
        let area = terminal.draw(|f| ui(f, app))?.area;
        app.ui.max_scroll = max_scroll(app, area);

        if event::poll(POLL_INTERVAL)? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                if let Some(action) = key_to_action(&key, app.ui.confirm_reset) {
                    if let Some(command) = app.handle_action(action) {
                        app.execute_command(command, stream_service).await;
                    }
                }
            }
        } else {
            tokio::task::yield_now().await;
        }

        if app.ui.exit_requested {
            return Ok(());
        }
    }
}
