//! Key event handling

use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::capture::CaptureBackend;
use crate::model::MediaSource;

use super::AppController;

impl<M: MediaSource, B: CaptureBackend> AppController<M, B> {
    pub async fn handle_terminal_event(&mut self, event: Event) {
        match event {
            Event::Key(key) => self.handle_key_event(key).await,
            Event::Resize(width, height) => {
                tracing::trace!(width, height, "Terminal resized");
            }
            _ => {}
        }
    }

    pub async fn handle_key_event(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }

        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
            return;
        }

        // Error message blocks all other interactions
        if self.ui.has_error() {
            if matches!(key.code, KeyCode::Esc | KeyCode::Enter) {
                self.ui.clear_error();
            }
            return;
        }

        if self.ui.show_help_popup {
            if matches!(key.code, KeyCode::Esc | KeyCode::Char('h') | KeyCode::Char('H')) {
                self.ui.show_help_popup = false;
            }
            return;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Char('Q') => {
                tracing::info!("Quit requested");
                self.should_quit = true;
            }
            KeyCode::Char(' ') => self.toggle_playback().await,
            KeyCode::Left => {
                self.skip_backward().await;
            }
            KeyCode::Right => {
                self.skip_forward().await;
            }
            KeyCode::Home | KeyCode::Char('0') => self.reset().await,
            KeyCode::Char('r') | KeyCode::Char('R') => self.toggle_recording().await,
            KeyCode::Char('h') | KeyCode::Char('H') => self.ui.show_help_popup = true,
            KeyCode::Esc => self.ui.notice = None,
            _ => {}
        }
    }
}
