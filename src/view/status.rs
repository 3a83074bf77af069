//! Status line (recording indicator, notices)

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use crate::capture::CaptureStatus;

use super::utils::{format_bytes, format_duration};
use super::ViewState;

pub fn render_status_line(frame: &mut Frame, area: Rect, state: &ViewState) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(area);

    frame.render_widget(Paragraph::new(recording_line(state)), chunks[0]);

    let notice = state
        .ui
        .notice
        .clone()
        .or_else(|| state.last_saved.map(|path| format!("Last saved: {}", path.display())))
        .unwrap_or_else(|| "h: help ".to_string());
    let notice = Paragraph::new(Line::from(notice).right_aligned())
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(notice, chunks[1]);
}

fn recording_line(state: &ViewState) -> Line<'static> {
    let recording = &state.recording;
    if !recording.enabled {
        return Line::from(Span::styled(" Recording disabled", Style::default().fg(Color::DarkGray)));
    }

    match recording.status {
        CaptureStatus::Recording => {
            let elapsed = recording
                .elapsed
                .map(|elapsed| format_duration(elapsed.as_secs_f64()))
                .unwrap_or_default();
            let format = recording.format.as_deref().unwrap_or("?");
            Line::from(vec![
                Span::styled(
                    " ● REC ",
                    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                ),
                Span::raw(format!(
                    "{} | {} chunks | {} | {}",
                    elapsed,
                    recording.chunk_count,
                    format_bytes(recording.buffered_bytes),
                    format
                )),
            ])
        }
        CaptureStatus::Requesting => Line::from(Span::styled(
            " ◌ Requesting capture…",
            Style::default().fg(Color::Yellow),
        )),
        CaptureStatus::Finalizing => Line::from(Span::styled(
            " ◌ Finalizing recording…",
            Style::default().fg(Color::Yellow),
        )),
        CaptureStatus::Failed => Line::from(Span::styled(
            " ✗ Recording failed (r to retry)",
            Style::default().fg(Color::Red),
        )),
        CaptureStatus::Done => Line::from(Span::styled(
            " ✓ Recording saved (r to record again)",
            Style::default().fg(Color::Green),
        )),
        CaptureStatus::Idle => Line::from(Span::styled(
            " ○ r: record",
            Style::default().fg(Color::DarkGray),
        )),
    }
}
