//! Rendered buffer to capture frame

use ratatui::buffer::Buffer;

use crate::capture::terminal::ScreenFrame;

/// Plain-text copy of a rendered buffer, one string per row.
pub fn snapshot_frame(buffer: &Buffer, caption: Option<String>) -> ScreenFrame {
    let area = buffer.area;
    let rows = (area.top()..area.bottom())
        .map(|y| {
            let row: String = (area.left()..area.right())
                .map(|x| buffer[(x, y)].symbol())
                .collect();
            row.trim_end().to_string()
        })
        .collect();

    ScreenFrame {
        width: area.width,
        height: area.height,
        rows,
        caption,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::layout::Rect;
    use ratatui::style::Style;

    #[test]
    fn test_snapshot_copies_rows() {
        let mut buffer = Buffer::empty(Rect::new(0, 0, 12, 2));
        buffer.set_string(0, 0, "Noche de paz", Style::default());
        buffer.set_string(0, 1, "0:05", Style::default());

        let frame = snapshot_frame(&buffer, Some("Noche de paz".to_string()));
        assert_eq!(frame.width, 12);
        assert_eq!(frame.height, 2);
        assert_eq!(frame.rows, vec!["Noche de paz".to_string(), "0:05".to_string()]);
    }
}
