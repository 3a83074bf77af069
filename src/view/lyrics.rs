//! Lyric panel rendering
//!
//! While a transition runs the outgoing line is drawn above the incoming one
//! and both fade according to the transition style.

use ratatui::{
    layout::{Alignment, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Padding, Paragraph, Wrap},
    Frame,
};

use crate::transition::{TransitionState, TransitionStyle};

use super::utils::{fade, format_duration, truncate_string};
use super::ViewState;

/// Dimmest grey still readable on black.
const MIN_VISIBLE: f32 = 0.25;

pub fn render_lyrics(frame: &mut Frame, area: Rect, state: &ViewState) {
    let title = match state.transition.active_style {
        Some(style) => format!(" Karaoke ✦ {} ", style.label()),
        None => " Karaoke ".to_string(),
    };

    let current = state
        .transition
        .current_cue
        .and_then(|index| state.timeline.get(index));

    let footer = current
        .map(|cue| cue.visual_url(state.visual_template))
        .map(|url| truncate_string(&url, area.width.saturating_sub(4) as usize))
        .unwrap_or_default();

    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .title_bottom(Line::from(footer).style(Style::default().fg(Color::DarkGray)))
        .padding(Padding::horizontal(2));

    let Some(cue) = current else {
        render_waiting(frame, area, block, state);
        return;
    };

    let inner_height = area.height.saturating_sub(2);
    let mut lines: Vec<Line> = Vec::new();

    // Content is 6 lines tall; the slide offset is added on top of the centering
    let top_pad = inner_height.saturating_sub(6) / 2 + slide_offset(&state.transition);
    lines.extend((0..top_pad).map(|_| Line::from("")));

    lines.push(Line::from(Span::styled(
        format!(" {} ", cue.section_label.to_uppercase()),
        Style::default()
            .fg(Color::Black)
            .bg(Color::Magenta)
            .add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(""));

    let previous = state
        .transition
        .previous_cue
        .and_then(|index| state.timeline.get(index));
    match previous {
        Some(previous) if state.transition.exit_opacity() > 0.0 => {
            lines.push(Line::from(Span::styled(
                previous.text.clone(),
                Style::default().fg(fade(state.transition.exit_opacity())),
            )));
        }
        _ => lines.push(Line::from("")),
    }

    let mut current_style = Style::default().fg(fade(entering_opacity(&state.transition)));
    if state.transition.progress >= 0.5 || !state.transition.is_transitioning {
        current_style = current_style.add_modifier(Modifier::BOLD);
    }
    lines.push(Line::from(Span::styled(cue.text.clone(), current_style)));
    lines.push(Line::from(""));

    let next = match state.sync.next {
        Some(next) => Span::styled(
            format!("… {} …", next.text),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        ),
        None => Span::styled("♪", Style::default().fg(Color::DarkGray)),
    };
    lines.push(Line::from(next));

    let paragraph = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(block);
    frame.render_widget(paragraph, area);
}

fn render_waiting(frame: &mut Frame, area: Rect, block: Block, state: &ViewState) {
    let first = state.timeline.first();
    let until_first = (first.timestamp_seconds - state.playback.position_secs).max(0.0);

    let inner_height = area.height.saturating_sub(2);
    let mut lines: Vec<Line> = (0..inner_height.saturating_sub(4) / 2)
        .map(|_| Line::from(""))
        .collect();

    let prompt = if state.playback.is_playing {
        format!("♪ Get ready… {} ♪", format_duration(until_first))
    } else {
        "Press Space to start".to_string()
    };
    lines.push(Line::from(Span::styled(
        prompt,
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        format!("… {} …", first.text),
        Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
    )));

    let paragraph = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(block);
    frame.render_widget(paragraph, area);
}

/// Opacity of the incoming line, shaped by the transition style.
fn entering_opacity(transition: &TransitionState) -> f32 {
    if !transition.is_transitioning {
        return 1.0;
    }
    let opacity = match transition.active_style {
        // Fade through black: nothing during the first half
        Some(TransitionStyle::DipToBlack) => ((transition.progress - 0.5) * 2.0).max(0.0),
        _ => transition.enter_opacity(),
    };
    opacity.max(MIN_VISIBLE)
}

/// Rows the incoming line sits below its resting place.
fn slide_offset(transition: &TransitionState) -> u16 {
    match transition.active_style {
        Some(TransitionStyle::SlideUp) if transition.is_transitioning => {
            ((1.0 - transition.enter_opacity()) * 3.0).round() as u16
        }
        _ => 0,
    }
}
