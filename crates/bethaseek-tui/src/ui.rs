use ratatui::{
    Frame,
    layout::{Constraint, Flex, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};
use crate::app::{App, InputMode};
use crate::render::{conversation_lines, wrap_lines};

const SIDEBAR_WIDTH: u16 = 32;

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    let [sidebar_area, chat_area] = Layout::horizontal([
        Constraint::Length(SIDEBAR_WIDTH),
        Constraint::Min(0),
    ])
    .areas(body_area);

    render_header(app, frame, header_area);
    render_sidebar(app, frame, sidebar_area);
    render_chat(app, frame, chat_area);
    render_footer(app, frame, footer_area);

    if app.confirm_delete {
        render_confirm_delete(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let (health, color) = match app.backend_healthy {
        Some(true) => ("● online", Color::Green),
        Some(false) => ("● offline", Color::Red),
        None => ("● ...", Color::DarkGray),
    };

    let header = Line::from(vec![
        Span::styled(" BethaSeek ", Style::default().fg(Color::Black).bg(Color::Cyan).bold()),
        Span::raw(" "),
        Span::styled(app.api.base_url().to_string(), Style::default().fg(Color::DarkGray)),
        Span::raw(" "),
        Span::styled(health, Style::default().fg(color)),
    ]);

    frame.render_widget(Paragraph::new(header), area);
}

fn render_sidebar(app: &mut App, frame: &mut Frame, area: Rect) {
    let width = area.width.saturating_sub(4) as usize;
    let items: Vec<ListItem> = app
        .store
        .collection()
        .conversations()
        .iter()
        .map(|conversation| {
            let title = clip(&conversation.title, width);
            let preview = clip(&conversation.last_message_preview, width);
            let mut title_style = Style::default().add_modifier(Modifier::BOLD);
            if conversation.is_awaiting() {
                title_style = title_style.fg(Color::Yellow);
            }
            ListItem::new(Text::from(vec![
                Line::from(Span::styled(title, title_style)),
                Line::from(Span::styled(preview, Style::default().fg(Color::DarkGray))),
            ]))
        })
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Conversas ");

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut app.sidebar_state);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let [transcript_area, status_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(if app.status.is_some() { 1 } else { 0 }),
        Constraint::Length(3),
    ])
    .areas(area);

    let (title, lines) = match app.active_conversation() {
        Some(conversation) => (
            format!(" {} ", conversation.title),
            conversation_lines(conversation, app.animation_frame),
        ),
        None => (" Chat ".to_string(), Vec::new()),
    };

    // Inner size minus borders; rows are wrapped here so scrolling can count them
    let inner_width = transcript_area.width.saturating_sub(2);
    let inner_height = transcript_area.height.saturating_sub(2);
    let rows = wrap_lines(&lines, inner_width);
    let row_count = rows.len().min(u16::MAX as usize) as u16;
    app.update_transcript_metrics(row_count, inner_height);

    let transcript = Paragraph::new(Text::from(rows))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(title),
        )
        .scroll((app.transcript_scroll, 0));
    frame.render_widget(transcript, transcript_area);

    if let Some(status) = &app.status {
        frame.render_widget(
            Paragraph::new(Span::styled(status.clone(), Style::default().fg(Color::Red))),
            status_area,
        );
    }

    render_input(app, frame, input_area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let border_color = if editing { Color::Yellow } else { Color::DarkGray };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Mensagem (Enter envia) ");

    // Calculate visible portion of input with horizontal scrolling
    let inner_width = area.width.saturating_sub(2) as usize;
    let scroll_offset = if inner_width == 0 {
        0
    } else {
        (app.cursor + 1).saturating_sub(inner_width)
    };

    let visible_text: String = app
        .input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(block);
    frame.render_widget(input, area);

    if editing {
        let cursor_x = (app.cursor - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let hints = match app.input_mode {
        InputMode::Editing => " Enter enviar | Esc sair da edição | Ctrl-C sair",
        InputMode::Normal => {
            " i escrever | n nova | d apagar | j/k conversas | PgUp/PgDn rolar | y copiar código | q sair"
        }
    };
    frame.render_widget(
        Paragraph::new(Span::styled(hints, Style::default().fg(Color::DarkGray))),
        area,
    );
}

fn render_confirm_delete(app: &App, frame: &mut Frame, area: Rect) {
    let title = app
        .active_conversation()
        .map(|c| c.title.clone())
        .unwrap_or_default();

    let popup = centered_rect(area, 50, 5);
    frame.render_widget(Clear, popup);

    let text = Text::from(vec![
        Line::from(format!("Apagar \"{}\"?", title)),
        Line::default(),
        Line::from(Span::styled("y confirmar | n cancelar", Style::default().fg(Color::DarkGray))),
    ]);
    let dialog = Paragraph::new(text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Red))
                .title(" Apagar conversa "),
        )
        .wrap(Wrap { trim: true });
    frame.render_widget(dialog, popup);
}

fn centered_rect(area: Rect, width: u16, height: u16) -> Rect {
    let [row] = Layout::vertical([Constraint::Length(height)])
        .flex(Flex::Center)
        .areas(area);
    let [popup] = Layout::horizontal([Constraint::Length(width.min(area.width))])
        .flex(Flex::Center)
        .areas(row);
    popup
}

/// Cut `text` to `width` characters, marking the cut with an ellipsis.
fn clip(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(width.saturating_sub(1)).collect();
    clipped.push('…');
    clipped
}

#[cfg(test)]
mod tests {
    use super::*;
    use bethaseek_core::{begin_turn, finish_turn, ApiClient, MemoryStore, SessionStore};
    use ratatui::{backend::TestBackend, Terminal};
    use tokio::sync::mpsc;

    fn buffer_text(terminal: &Terminal<TestBackend>) -> String {
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn draws_sidebar_transcript_and_popup() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let store = SessionStore::load(Box::new(MemoryStore::new()));
        let mut app = App::new(store, ApiClient::new("http://127.0.0.1:9"), tx);

        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|frame| render(&mut app, frame)).unwrap();
        let screen = buffer_text(&terminal);
        assert!(screen.contains("Conversas"));
        assert!(screen.contains("Nova Conversa"));
        assert!(screen.contains("Como posso ajudar"));

        app.request_delete();
        terminal.draw(|frame| render(&mut app, frame)).unwrap();
        assert!(buffer_text(&terminal).contains("Apagar conversa"));
    }

    #[test]
    fn end_of_long_reply_can_be_scrolled_into_view() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let store = SessionStore::load(Box::new(MemoryStore::new()));
        let mut app = App::new(store, ApiClient::new("http://127.0.0.1:9"), tx);

        let id = app.store.collection().active_id().cloned().unwrap();
        let turn = begin_turn(&mut app.store, &id, "explique").unwrap();
        let mut reply: String = (0..30).map(|n| format!("palavra{n} comprida ")).collect();
        reply.push_str("\nFIMDAQUI");
        finish_turn(&mut app.store, &turn, Ok(reply)).unwrap();

        let mut terminal = Terminal::new(TestBackend::new(60, 14)).unwrap();
        terminal.draw(|frame| render(&mut app, frame)).unwrap();
        app.scroll_up(u16::MAX);
        terminal.draw(|frame| render(&mut app, frame)).unwrap();
        assert!(!buffer_text(&terminal).contains("FIMDAQUI"));

        app.scroll_down(u16::MAX);
        terminal.draw(|frame| render(&mut app, frame)).unwrap();
        assert!(buffer_text(&terminal).contains("FIMDAQUI"));
    }

    #[test]
    fn clip_marks_truncation() {
        assert_eq!(clip("curto", 10), "curto");
        assert_eq!(clip("um texto bem longo", 6), "um te…");
    }
}
