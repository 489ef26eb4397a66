//! Terminal rendering: the text grid, peer cursor highlights, and the
//! status bar.
//!
//! Pure draw-to-writer; the session decides when a redraw happens and
//! hands in the output (stdout in raw mode, a buffer in tests).

use std::io::{self, Write};

use crossterm::{
    cursor,
    style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor},
    terminal::{Clear, ClearType},
    QueueableCommand,
};

use crate::color::color_for_username;
use crate::editor::Editor;

impl Editor {
    /// Redraw the whole surface: text grid, status bar, connection
    /// indicator, hardware cursor.
    pub fn draw(&self, out: &mut impl Write) -> io::Result<()> {
        let (_, height) = self.size();
        let (row_offset, col_offset) = self.viewport();

        out.queue(cursor::Hide)?;
        out.queue(Clear(ClearType::All))?;

        let y_end = row_offset + height.saturating_sub(1); // last row is the status bar
        let (mut x, mut y) = (0usize, 0usize);
        for (i, &ch) in self.text().iter().enumerate() {
            if y >= y_end {
                break;
            }
            if ch == '\n' {
                x = 0;
                y += 1;
                continue;
            }

            if x >= col_offset && y >= row_offset {
                out.queue(cursor::MoveTo(
                    (x - col_offset) as u16,
                    (y - row_offset) as u16,
                ))?;
                let highlight = self
                    .peer_positions
                    .values()
                    .find(|p| p.position == i as isize)
                    .map(|p| p.color);
                match highlight {
                    Some(bg) => {
                        out.queue(SetBackgroundColor(bg))?;
                        out.queue(Print(ch))?;
                        out.queue(ResetColor)?;
                    }
                    None => {
                        out.queue(Print(ch))?;
                    }
                }
            }
            x += 1;
        }

        self.draw_status_bar(out)?;

        // Hardware cursor, viewport-relative.
        let (mut cx, mut cy) = self.calc_xy(self.cursor() as isize);
        if cx > col_offset {
            cx -= col_offset;
        }
        if cy > row_offset {
            cy -= row_offset;
        }
        out.queue(cursor::MoveTo(
            cx.saturating_sub(1) as u16,
            cy.saturating_sub(1) as u16,
        ))?;
        out.queue(cursor::Show)?;
        out.flush()
    }

    fn draw_status_bar(&self, out: &mut impl Write) -> io::Result<()> {
        let (width, height) = self.size();
        if height == 0 {
            return Ok(());
        }
        let bar_row = (height - 1) as u16;

        match self.status() {
            Some(msg) => {
                out.queue(cursor::MoveTo(0, bar_row))?;
                out.queue(Print(msg))?;
            }
            None => self.draw_info_bar(out, bar_row)?,
        }

        // Connection indicator in the bottom-right cell.
        let indicator = if self.connected {
            Color::Green
        } else {
            Color::Red
        };
        out.queue(cursor::MoveTo(width.saturating_sub(1) as u16, bar_row))?;
        out.queue(SetBackgroundColor(indicator))?;
        out.queue(Print(' '))?;
        out.queue(ResetColor)?;
        Ok(())
    }

    /// Usernames in their colors, then the cursor diagnostics.
    fn draw_info_bar(&self, out: &mut impl Write, bar_row: u16) -> io::Result<()> {
        out.queue(cursor::MoveTo(0, bar_row))?;
        for user in &self.users {
            let color = color_for_username(user, &self.users);
            out.queue(SetForegroundColor(color))?;
            out.queue(Print(user))?;
            out.queue(ResetColor)?;
            out.queue(Print(' '))?;
        }

        let (cx, cy) = self.calc_xy(self.cursor() as isize);
        out.queue(Print(format!(
            " x={cx}, y={cy}, cursor={}, len(text)={}",
            self.cursor(),
            self.text_len()
        )))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::EditorConfig;

    fn editor(text: &str) -> Editor {
        let mut e = Editor::new(EditorConfig {
            scroll_enabled: false,
            username: "me".to_string(),
        });
        e.set_size(40, 10);
        e.set_text(text);
        e
    }

    #[test]
    fn draw_emits_the_text() {
        let e = editor("hello\nworld");
        let mut out = Vec::new();
        e.draw(&mut out).unwrap();
        let rendered = String::from_utf8_lossy(&out);
        assert!(rendered.contains('h'));
        assert!(rendered.contains('w'));
    }

    #[test]
    fn status_message_takes_over_the_bar() {
        let mut e = editor("x");
        e.set_status("Saved document to out.txt");
        let mut out = Vec::new();
        e.draw(&mut out).unwrap();
        assert!(String::from_utf8_lossy(&out).contains("Saved document to out.txt"));

        e.clear_status();
        out.clear();
        e.draw(&mut out).unwrap();
        assert!(String::from_utf8_lossy(&out).contains("cursor=0"));
    }

    #[test]
    fn draw_handles_a_zero_sized_surface() {
        let mut e = editor("text");
        e.set_size(0, 0);
        let mut out = Vec::new();
        e.draw(&mut out).unwrap();
    }
}
