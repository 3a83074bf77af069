//! Progress bar rendering

use ratatui::{
    layout::Rect,
    style::{Color, Style},
    text::Line,
    widgets::{Block, Borders, Gauge},
    Frame,
};

use super::utils::format_duration;
use super::ViewState;

pub fn render_progress_bar(frame: &mut Frame, area: Rect, state: &ViewState) {
    let playback = &state.playback;

    let status_text = if playback.has_ended {
        " ■ Finished".to_string()
    } else if playback.is_playing {
        " ▶ Playing".to_string()
    } else {
        " ⏸  Paused".to_string()
    };

    let section = state
        .sync
        .current
        .map(|cue| format!(" | {}", cue.section_label))
        .unwrap_or_default();

    let cue_position = match state.sync.active_index {
        Some(index) => format!("Cue {}/{}", index + 1, state.timeline.len()),
        None => format!("Cue -/{}", state.timeline.len()),
    };
    let auto_text = if state.recording.auto_record {
        "Auto-record: On"
    } else {
        "Auto-record: Off"
    };

    let time_str = format!(
        "{} / {}",
        format_duration(playback.position_secs),
        if playback.duration_known() {
            format_duration(playback.duration_secs)
        } else {
            format_duration(f64::NAN)
        }
    );

    let title = format!("{}{} ", status_text, section);
    let controls_info = format!(" {} | {} ", cue_position, auto_text);

    let gauge = Gauge::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(title)
                .title_bottom(Line::from(controls_info).right_aligned()),
        )
        .gauge_style(Style::default().fg(Color::Green))
        .ratio(playback.progress_ratio())
        .label(time_str);

    frame.render_widget(gauge, area);
}
