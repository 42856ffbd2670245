use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};
use unicode_width::UnicodeWidthStr;

use crate::core::app::App;
use crate::core::message::Message;

const USER_PREFIX: &str = "You: ";

fn message_style(message: &Message) -> Style {
    if message.is_error {
        Style::default().fg(Color::Red)
    } else if message.is_user() {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    }
}

/// Transcript lines for every message, with a blank line after each.
pub fn build_display_lines<'a>(
    messages: impl IntoIterator<Item = &'a Message>,
) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    for message in messages {
        let style = message_style(message);
        let mut content_lines = message.content.lines();

        if message.is_user() {
            let first = content_lines.next().unwrap_or_default();
            lines.push(Line::from(vec![
                Span::styled(USER_PREFIX, style.add_modifier(Modifier::BOLD)),
                Span::styled(first.to_string(), style),
            ]));
        }
        for content_line in content_lines {
            lines.push(Line::from(Span::styled(content_line.to_string(), style)));
        }
        lines.push(Line::from(""));
    }

    lines
}

fn transcript_paragraph(lines: Vec<Line<'static>>) -> Paragraph<'static> {
    Paragraph::new(lines).wrap(Wrap { trim: false })
}

/// Rows the transcript occupies at `width` columns, using the paragraph's own word wrapping.
fn wrapped_line_count(paragraph: &Paragraph<'_>, width: u16) -> u16 {
    u16::try_from(paragraph.line_count(width)).unwrap_or(u16::MAX)
}

fn scroll_offset(total_lines: u16, available_height: u16, scroll_from_bottom: u16) -> u16 {
    let max_offset = total_lines.saturating_sub(available_height);
    max_offset.saturating_sub(scroll_from_bottom)
}

/// Transcript pane above, three-row input box below.
fn chat_layout(area: Rect) -> (Rect, Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(3)])
        .split(area);
    (chunks[0], chunks[1])
}

/// How far the transcript can scroll up from the bottom in a frame of `area`.
pub fn max_scroll(app: &App, area: Rect) -> u16 {
    let (transcript_area, _) = chat_layout(area);
    let paragraph = transcript_paragraph(build_display_lines(app.conversation.messages()));
    let total_lines = wrapped_line_count(&paragraph, transcript_area.width);
    scroll_offset(total_lines, transcript_area.height.saturating_sub(1), 0)
}

pub fn ui(f: &mut Frame, app: &App) {
    let (transcript_area, input_area) = chat_layout(f.area());

    let paragraph = transcript_paragraph(build_display_lines(app.conversation.messages()));
    let total_lines = wrapped_line_count(&paragraph, transcript_area.width);
    let available_height = transcript_area.height.saturating_sub(1);
    let offset = scroll_offset(total_lines, available_height, app.ui.scroll_from_bottom);

    let busy = if app.conversation.is_busy() {
        " • checking…"
    } else {
        ""
    };
    let title = format!(
        "gramfix v{} - {} • Log: {}{}",
        env!("CARGO_PKG_VERSION"),
        app.model(),
        app.logging_status(),
        busy
    );

    let transcript = paragraph
        .block(Block::default().title(title))
        .scroll((offset, 0));
    f.render_widget(transcript, transcript_area);

    let input_title = if app.conversation.is_busy() {
        "Waiting for the reply… (Ctrl+C to quit)"
    } else {
        "Type a sentence (Enter to send, Ctrl+N new conversation, Ctrl+C to quit)"
    };
    let input = Paragraph::new(app.conversation.input())
        .style(Style::default().fg(Color::Cyan))
        .block(Block::default().borders(Borders::ALL).title(input_title));
    f.render_widget(input, input_area);

    if !app.ui.confirm_reset {
        let input_width = u16::try_from(app.conversation.input().width()).unwrap_or(u16::MAX);
        let cursor_x = input_area
            .x
            .saturating_add(1)
            .saturating_add(input_width)
            .min(input_area.right().saturating_sub(2));
        f.set_cursor_position((cursor_x, input_area.y.saturating_add(1)));
    }

    if app.ui.confirm_reset {
        let area = f.area();
        let width = 44.min(area.width);
        let popup = Rect {
            x: area.x + (area.width - width) / 2,
            y: area.y + area.height.saturating_sub(3) / 2,
            width,
            height: 3.min(area.height),
        };
        f.render_widget(Clear, popup);
        f.render_widget(
            Paragraph::new("Start a new conversation? (y/n)")
                .style(Style::default().fg(Color::Yellow))
                .block(Block::default().borders(Borders::ALL)),
            popup,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::create_test_app;
    use ratatui::{backend::TestBackend, Terminal};

    #[test]
    fn user_messages_get_prefix_and_spacing() {
        let messages = [
            Message::user("I go home"),
            Message::model("Correction:\nI went home."),
        ];
        let lines = build_display_lines(messages.iter());

        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0].spans[0].content, USER_PREFIX);
        assert_eq!(lines[0].spans[1].content, "I go home");
        assert!(lines[1].spans.iter().all(|span| span.content.is_empty()));
        assert_eq!(lines[2].spans[0].content, "Correction:");
        assert_eq!(lines[3].spans[0].content, "I went home.");
    }

    #[test]
    fn error_messages_render_red() {
        let messages = [Message::error("Sorry")];
        let lines = build_display_lines(messages.iter());
        assert_eq!(lines[0].spans[0].style.fg, Some(Color::Red));
    }

    fn render(app: &App, width: u16, height: u16) -> Terminal<TestBackend> {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).expect("terminal");
        terminal.draw(|f| ui(f, app)).expect("draw");
        terminal
    }

    fn screen_text(terminal: &Terminal<TestBackend>) -> String {
        let buffer = terminal.backend().buffer();
        let mut text = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                text.push_str(buffer[(x, y)].symbol());
            }
            text.push('\n');
        }
        text
    }

    fn app_streaming(reply: &str) -> App {
        let (mut app, _) = create_test_app();
        app.conversation.set_input("hi");
        let turn = app.conversation.submit().expect("turn");
        app.conversation.begin_stream(turn.turn_id);
        app.conversation.apply_fragment(turn.turn_id, reply);
        app
    }

    #[test]
    fn wrapped_count_follows_word_boundaries() {
        let paragraph = transcript_paragraph(vec![Line::from("aaaaa bbbbb ccccc")]);
        assert_eq!(wrapped_line_count(&paragraph, 10), 3);
        assert_eq!(wrapped_line_count(&paragraph, 40), 1);
    }

    #[test]
    fn newest_reply_text_stays_visible_in_narrow_terminal() {
        let reply = format!("{}LASTWORD", "aaaaa bbbbb ccccc\n".repeat(6));
        let app = app_streaming(&reply);

        for width in [10, 12, 30] {
            let terminal = render(&app, width, 12);
            assert!(
                screen_text(&terminal).contains("LASTWORD"),
                "latest text hidden at width {width}"
            );
        }
    }

    #[test]
    fn max_scroll_reaches_exactly_the_top_of_the_transcript() {
        let reply = format!("{}LASTWORD", "aaaaa bbbbb ccccc\n".repeat(6));
        let mut app = app_streaming(&reply);
        let max = max_scroll(&app, Rect::new(0, 0, 10, 12));
        assert!(max > 0);

        app.ui.scroll_from_bottom = max;
        assert!(screen_text(&render(&app, 10, 12)).contains("Hello"));

        app.ui.scroll_from_bottom = max - 1;
        assert!(!screen_text(&render(&app, 10, 12)).contains("Hello"));
    }

    #[test]
    fn very_long_input_keeps_cursor_inside_input_box() {
        let (mut app, _) = create_test_app();
        app.conversation.set_input("a".repeat(usize::from(u16::MAX)));

        let mut terminal = render(&app, 10, 12);
        let cursor = terminal.get_cursor_position().expect("cursor");
        assert_eq!(cursor.x, 8);
        assert_eq!(cursor.y, 10);
    }

    #[test]
    fn scroll_offset_follows_bottom_and_clamps() {
        assert_eq!(scroll_offset(50, 20, 0), 30);
        assert_eq!(scroll_offset(50, 20, 10), 20);
        assert_eq!(scroll_offset(50, 20, 100), 0);
        assert_eq!(scroll_offset(5, 20, 0), 0);
    }
}
