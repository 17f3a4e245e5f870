use bethaseek_core::{
    begin_turn, finish_turn, ApiClient, ChatError, Conversation, ConversationId, GenerateError,
    Generator, SessionStore, Turn,
};
use ratatui::widgets::ListState;
use std::io::{self, Write};
use std::process::{Command, Stdio};
use tokio::sync::mpsc;

use crate::render::code_blocks_for_copy;
use crate::tui::AppEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub confirm_delete: bool,
    pub status: Option<String>,

    // Input box
    pub input: String,
    pub cursor: usize, // cursor position in chars

    // Sidebar
    pub sidebar_state: ListState,

    // Transcript scrolling, dimensions updated during render
    pub transcript_scroll: u16,
    pub transcript_height: u16,
    pub transcript_rows: u16,
    pub follow_tail: bool,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    pub backend_healthy: Option<bool>,

    // Data
    pub store: SessionStore,
    pub api: ApiClient,
    events: mpsc::UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(store: SessionStore, api: ApiClient, events: mpsc::UnboundedSender<AppEvent>) -> Self {
        let mut app = Self {
            should_quit: false,
            input_mode: InputMode::Normal,
            confirm_delete: false,
            status: None,
            input: String::new(),
            cursor: 0,
            sidebar_state: ListState::default(),
            transcript_scroll: 0,
            transcript_height: 0,
            transcript_rows: 0,
            follow_tail: true,
            animation_frame: 0,
            backend_healthy: None,
            store,
            api,
            events,
        };
        app.sync_sidebar();
        app
    }

    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.store.collection().active()
    }

    fn active_id(&self) -> Option<ConversationId> {
        self.store.collection().active_id().cloned()
    }

    /// Point the sidebar highlight at the active conversation.
    fn sync_sidebar(&mut self) {
        let collection = self.store.collection();
        let index = collection
            .active_id()
            .and_then(|id| collection.conversations().iter().position(|c| &c.id == id));
        self.sidebar_state.select(index);
    }

    /// Ask the backend whether it is up, reporting back through the event loop.
    pub fn spawn_health_check(&self) {
        let api = self.api.clone();
        let tx = self.events.clone();
        tokio::spawn(async move {
            let healthy = api.health_check().await;
            let _ = tx.send(AppEvent::Health(healthy));
        });
    }

    /// Send the input box to the active conversation.
    pub fn submit(&mut self) {
        let Some(id) = self.active_id() else {
            return;
        };

        match begin_turn(&mut self.store, &id, &self.input) {
            Ok(turn) => {
                self.input.clear();
                self.cursor = 0;
                self.input_mode = InputMode::Normal;
                self.status = None;
                self.follow_tail = true;
                self.spawn_generation(turn);
            }
            Err(ChatError::EmptyMessage) => {}
            Err(e @ ChatError::Busy(_)) => {
                tracing::debug!(error = %e, "send ignored");
                self.status = Some("Aguarde a resposta anterior".to_string());
            }
            Err(e) => {
                tracing::warn!(error = %e, "send rejected");
                self.status = Some(e.to_string());
            }
        }
    }

    fn spawn_generation(&self, turn: Turn) {
        let api = self.api.clone();
        let tx = self.events.clone();
        tokio::spawn(async move {
            let outcome = api.generate(&turn.query).await;
            let _ = tx.send(AppEvent::Generated { turn, outcome });
        });
    }

    pub fn apply_generation(&mut self, turn: Turn, outcome: Result<String, GenerateError>) {
        match finish_turn(&mut self.store, &turn, outcome) {
            Ok(()) => {
                if self.active_id().as_ref() == Some(&turn.conversation_id) {
                    self.follow_tail = true;
                }
            }
            Err(ChatError::Generation(_)) => {
                self.status = Some("Falha ao obter resposta. Tente novamente.".to_string());
            }
            Err(e) => tracing::debug!(error = %e, "response arrived for a removed conversation"),
        }
    }

    pub fn new_conversation(&mut self) {
        self.store.create_conversation();
        self.reset_view();
    }

    pub fn request_delete(&mut self) {
        if self.active_id().is_some() {
            self.confirm_delete = true;
        }
    }

    pub fn confirm_delete(&mut self) {
        self.confirm_delete = false;
        if let Some(id) = self.active_id() {
            if let Err(e) = self.store.delete_conversation(&id) {
                tracing::warn!(error = %e, "delete failed");
            }
        }
        self.reset_view();
    }

    pub fn cancel_delete(&mut self) {
        self.confirm_delete = false;
    }

    pub fn select_next(&mut self) {
        self.select_offset(1);
    }

    pub fn select_prev(&mut self) {
        self.select_offset(-1);
    }

    fn select_offset(&mut self, delta: isize) {
        let collection = self.store.collection();
        let len = collection.len();
        if len == 0 {
            return;
        }
        let current = self.sidebar_state.selected().unwrap_or(0) as isize;
        let next = (current + delta).clamp(0, len as isize - 1) as usize;
        let id = collection.conversations()[next].id.clone();
        if self.store.select_conversation(&id).is_ok() {
            self.reset_view();
        }
    }

    fn reset_view(&mut self) {
        self.sync_sidebar();
        self.status = None;
        self.follow_tail = true;
    }

    pub fn scroll_up(&mut self, rows: u16) {
        self.follow_tail = false;
        self.transcript_scroll = self.transcript_scroll.saturating_sub(rows);
    }

    pub fn scroll_down(&mut self, rows: u16) {
        let max = self.max_scroll();
        self.transcript_scroll = self.transcript_scroll.saturating_add(rows).min(max);
        self.follow_tail = self.transcript_scroll >= max;
    }

    pub fn max_scroll(&self) -> u16 {
        self.transcript_rows.saturating_sub(self.transcript_height)
    }

    /// Called by render once the transcript has been measured.
    pub fn update_transcript_metrics(&mut self, rows: u16, height: u16) {
        self.transcript_rows = rows;
        self.transcript_height = height;
        if self.follow_tail {
            self.transcript_scroll = self.max_scroll();
        } else {
            self.transcript_scroll = self.transcript_scroll.min(self.max_scroll());
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.active_conversation().is_some_and(|c| c.is_awaiting()) {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    /// Copy the code blocks of the latest reply in the active conversation.
    pub fn copy_last_code(&mut self) {
        let code = self
            .active_conversation()
            .and_then(|c| c.last_assistant_message())
            .and_then(|m| code_blocks_for_copy(&m.content));

        self.status = Some(match code {
            Some(code) => match copy_to_clipboard(&code) {
                Ok(()) => "Código copiado".to_string(),
                Err(e) => {
                    tracing::warn!(error = %e, "clipboard copy failed");
                    "Não foi possível copiar".to_string()
                }
            },
            None => "Nenhum bloco de código na última resposta".to_string(),
        });
    }
}

/// Pipe text into the first clipboard tool that is available.
fn copy_to_clipboard(text: &str) -> io::Result<()> {
    let tools: [(&str, &[&str]); 3] = [
        ("pbcopy", &[]),
        ("wl-copy", &[]),
        ("xclip", &["-selection", "clipboard"]),
    ];

    let mut last_err = io::Error::new(io::ErrorKind::NotFound, "no clipboard tool found");
    for (tool, args) in tools {
        let mut command = Command::new(tool);
        command.args(args);
        match pipe_into(command, text) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => last_err = e,
            result => return result,
        }
    }
    Err(last_err)
}

/// Feed `text` to the command's stdin and reap it, even when the write fails.
fn pipe_into(mut command: Command, text: &str) -> io::Result<()> {
    let mut child = command.stdin(Stdio::piped()).stdout(Stdio::null()).spawn()?;
    // stdin is dropped at the end of the match so the tool sees EOF
    let written = match child.stdin.take() {
        Some(mut stdin) => stdin.write_all(text.as_bytes()),
        None => Ok(()),
    };
    let status = child.wait();
    written?;
    status?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bethaseek_core::MemoryStore;

    fn test_app() -> (App, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let store = SessionStore::load(Box::new(MemoryStore::new()));
        // Nothing listens on port 9 locally, so requests fail fast.
        let api = ApiClient::new("http://127.0.0.1:9");
        (App::new(store, api, tx), rx)
    }

    #[test]
    fn sidebar_follows_active_conversation() {
        let (mut app, _rx) = test_app();
        assert_eq!(app.sidebar_state.selected(), Some(0));

        app.new_conversation();
        assert_eq!(app.store.collection().len(), 2);
        assert_eq!(app.sidebar_state.selected(), Some(0));

        app.select_next();
        assert_eq!(app.sidebar_state.selected(), Some(1));
        assert_eq!(
            app.store.collection().active_id(),
            Some(&app.store.collection().conversations()[1].id)
        );

        app.select_next();
        assert_eq!(app.sidebar_state.selected(), Some(1));
    }

    #[test]
    fn delete_needs_confirmation() {
        let (mut app, _rx) = test_app();
        app.new_conversation();

        app.request_delete();
        assert!(app.confirm_delete);
        app.cancel_delete();
        assert_eq!(app.store.collection().len(), 2);

        app.request_delete();
        app.confirm_delete();
        assert!(!app.confirm_delete);
        assert_eq!(app.store.collection().len(), 1);
        assert_eq!(app.sidebar_state.selected(), Some(0));
    }

    #[tokio::test]
    async fn failed_generation_removes_placeholder() {
        let (mut app, mut rx) = test_app();
        let id = app.store.collection().active_id().cloned().unwrap();
        app.input = "como ler um arquivo?".to_string();

        app.submit();
        assert!(app.input.is_empty());
        assert!(app.active_conversation().unwrap().is_awaiting());

        // A second submit while waiting changes nothing.
        app.input = "outra".to_string();
        app.submit();
        assert_eq!(app.store.collection().get(&id).unwrap().messages.len(), 3);
        assert_eq!(app.input, "outra");

        let event = loop {
            match rx.recv().await {
                Some(AppEvent::Generated { turn, outcome }) => break (turn, outcome),
                Some(_) => continue,
                None => panic!("channel closed"),
            }
        };
        assert!(event.1.is_err());
        app.apply_generation(event.0, event.1);

        let conversation = app.store.collection().get(&id).unwrap();
        assert_eq!(conversation.messages.len(), 2);
        assert!(!conversation.is_awaiting());
        assert!(app.status.is_some());
    }

    #[cfg(unix)]
    #[test]
    fn pipe_reports_write_failure_after_reaping_child() {
        let mut cat = Command::new("cat");
        cat.stderr(Stdio::null());
        assert!(pipe_into(cat, "def x = 1").is_ok());

        // `true` exits without reading, so a large write hits a closed pipe.
        let big = "x".repeat(1 << 20);
        let err = pipe_into(Command::new("true"), &big).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn scrolling_stops_following_tail() {
        let (mut app, _rx) = test_app();
        app.update_transcript_metrics(50, 10);
        assert_eq!(app.transcript_scroll, 40);

        app.scroll_up(5);
        assert!(!app.follow_tail);
        app.update_transcript_metrics(60, 10);
        assert_eq!(app.transcript_scroll, 35);

        app.scroll_down(100);
        assert!(app.follow_tail);
        assert_eq!(app.transcript_scroll, 50);
    }
}
