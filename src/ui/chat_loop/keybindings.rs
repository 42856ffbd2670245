//! Key press to [`AppAction`] mapping.
//!
//! While the reset confirmation is showing, only y/n/Esc are meaningful.

use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::core::app::AppAction;

const PAGE_LINES: u16 = 10;

pub fn key_to_action(key: &KeyEvent, confirm_pending: bool) -> Option<AppAction> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    if ctrl && key.code == KeyCode::Char('c') {
        return Some(AppAction::Quit);
    }

    if confirm_pending {
        return match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => Some(AppAction::ConfirmReset),
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => Some(AppAction::CancelReset),
            _ => None,
        };
    }

    match key.code {
        KeyCode::Char('n') if ctrl => Some(AppAction::RequestReset),
        KeyCode::Char(_) if ctrl => None,
        KeyCode::Char(ch) => Some(AppAction::InsertChar(ch)),
        KeyCode::Backspace => Some(AppAction::Backspace),
        KeyCode::Enter => Some(AppAction::Submit),
        KeyCode::Up => Some(AppAction::ScrollUp(1)),
        KeyCode::Down => Some(AppAction::ScrollDown(1)),
        KeyCode::PageUp => Some(AppAction::ScrollUp(PAGE_LINES)),
        KeyCode::PageDown => Some(AppAction::ScrollDown(PAGE_LINES)),
        KeyCode::End => Some(AppAction::ScrollDown(u16::MAX)),
        _ => None,
    }
}
