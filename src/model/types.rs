//! Core type definitions for the application

use std::time::Instant;

/// UI state for the application
#[derive(Clone, Debug, Default)]
pub struct UiState {
    pub error_message: Option<String>,
    pub error_timestamp: Option<Instant>,
    pub show_help_popup: bool,
    /// Short notice shown in the status line (e.g. where a recording was saved)
    pub notice: Option<String>,
}

impl UiState {
    pub fn set_error(&mut self, message: String) {
        self.error_message = Some(message);
        self.error_timestamp = Some(Instant::now());
    }

    pub fn clear_error(&mut self) {
        self.error_message = None;
        self.error_timestamp = None;
    }

    pub fn has_error(&self) -> bool {
        self.error_message.is_some()
    }

    /// Drop errors older than five seconds.
    pub fn auto_clear_old_errors(&mut self) {
        if let Some(timestamp) = self.error_timestamp {
            if timestamp.elapsed().as_secs() > 5 {
                self.clear_error();
            }
        }
    }
}
