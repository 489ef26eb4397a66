//! Editor state: the rendered text, the local cursor, the viewport, and
//! the decorations (peer cursors, user list, status line).
//!
//! The buffer here is a plain projection of the replica; all CRDT state
//! lives in `pairpad-crdt`. Cursor positions are 0-based indices into the
//! projection, clamped to `[0, len]`.

use std::collections::HashMap;

use crossterm::style::Color;

/// Construction-time options for the editor.
#[derive(Debug, Clone, Default)]
pub struct EditorConfig {
    pub scroll_enabled: bool,
    pub username: String,
}

/// A remote participant's caret: 0-based index into the projection plus
/// its display color. Kept as `isize` because the shift arithmetic can
/// push a caret transiently below zero; negative positions simply never
/// match a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerCursor {
    pub position: isize,
    pub color: Color,
}

/// One terminal editing surface.
#[derive(Debug)]
pub struct Editor {
    text: Vec<char>,
    cursor: usize,
    width: usize,
    height: usize,
    row_offset: usize,
    col_offset: usize,

    pub username: String,
    /// All usernames in the session, as last reported by the coordinator.
    pub users: Vec<String>,
    /// username → remote caret.
    pub peer_positions: HashMap<String, PeerCursor>,

    pub connected: bool,
    scroll_enabled: bool,

    show_msg: bool,
    status_msg: String,
}

impl Editor {
    pub fn new(config: EditorConfig) -> Self {
        Editor {
            text: Vec::new(),
            cursor: 0,
            width: 0,
            height: 0,
            row_offset: 0,
            col_offset: 0,
            username: config.username,
            users: Vec::new(),
            peer_positions: HashMap::new(),
            connected: false,
            scroll_enabled: config.scroll_enabled,
            show_msg: false,
            status_msg: String::new(),
        }
    }

    pub fn text(&self) -> &[char] {
        &self.text
    }

    pub fn text_len(&self) -> usize {
        self.text.len()
    }

    /// Replace the buffer with a fresh projection. The cursor is clamped,
    /// not reset; remote edits move it separately.
    pub fn set_text(&mut self, text: &str) {
        self.text = text.chars().collect();
        if self.cursor > self.text.len() {
            self.cursor = self.text.len();
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn set_cursor(&mut self, cursor: usize) {
        self.cursor = cursor.min(self.text.len());
    }

    pub fn set_size(&mut self, width: usize, height: usize) {
        self.width = width;
        self.height = height;
    }

    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub(crate) fn viewport(&self) -> (usize, usize) {
        (self.row_offset, self.col_offset)
    }

    pub fn set_status(&mut self, msg: impl Into<String>) {
        self.status_msg = msg.into();
        self.show_msg = true;
    }

    /// Fall back from the transient status message to the info bar.
    pub fn clear_status(&mut self) {
        self.show_msg = false;
    }

    pub(crate) fn status(&self) -> Option<&str> {
        self.show_msg.then_some(self.status_msg.as_str())
    }

    /// Move the cursor by `dx` columns, or to the column-preserving
    /// neighbor line when `dy` is nonzero, keeping it inside the viewport
    /// when scrolling is enabled.
    pub fn move_cursor(&mut self, dx: isize, dy: isize) {
        if self.text.is_empty() && self.cursor == 0 {
            return;
        }

        let mut new_cursor = self.cursor as isize + dx;
        if dy > 0 {
            new_cursor = self.cursor_down_position() as isize;
        }
        if dy < 0 {
            new_cursor = self.cursor_up_position() as isize;
        }

        if self.scroll_enabled {
            let (cx, cy) = self.calc_xy(new_cursor);

            let row_start = self.row_offset;
            let row_end = self.row_offset + self.height.saturating_sub(1);
            if cy <= row_start {
                self.row_offset = cy.saturating_sub(1);
            }
            if cy > row_end {
                self.row_offset += cy - row_end;
            }

            let col_start = self.col_offset;
            let col_end = self.col_offset + self.width;
            if cx <= col_start {
                self.col_offset = cx.saturating_sub(1);
            }
            if cx > col_end {
                self.col_offset += cx - col_end;
            }
        }

        self.cursor = new_cursor.clamp(0, self.text.len() as isize) as usize;
    }

    /// Jump to the first column of the current line.
    pub fn move_to_line_start(&mut self) {
        let mut pos = self.cursor;
        while pos > 0 && self.text[pos - 1] != '\n' {
            pos -= 1;
        }
        self.move_cursor(pos as isize - self.cursor as isize, 0);
    }

    /// Jump past the last character of the current line.
    pub fn move_to_line_end(&mut self) {
        let mut pos = self.cursor;
        while pos < self.text.len() && self.text[pos] != '\n' {
            pos += 1;
        }
        self.move_cursor(pos as isize - self.cursor as isize, 0);
    }

    /// Screen position of a buffer index, both 1-based. Out-of-range
    /// indices clamp.
    pub fn calc_xy(&self, index: isize) -> (usize, usize) {
        if index < 0 {
            return (1, 1);
        }
        let index = (index as usize).min(self.text.len());

        let mut x = 1;
        let mut y = 1;
        for &ch in &self.text[..index] {
            if ch == '\n' {
                x = 1;
                y += 1;
            } else {
                x += 1;
            }
        }
        (x, y)
    }

    fn cursor_up_position(&self) -> usize {
        let len = self.text.len() as isize;
        let mut pos = self.cursor as isize;
        let mut offset: isize = 0;

        if pos == len || self.text[pos as usize] == '\n' {
            offset += 1;
            pos -= 1;
        }
        if pos < 0 {
            pos = 0;
        }

        let mut start = pos;
        while start > 0 && self.text[start as usize] != '\n' {
            start -= 1;
        }
        if start == 0 {
            return 0;
        }

        let mut prev_start = start - 1;
        while prev_start >= 0 && self.text[prev_start as usize] != '\n' {
            prev_start -= 1;
        }

        offset += pos - start;
        if offset <= start - prev_start {
            (prev_start + offset).max(0) as usize
        } else {
            start as usize
        }
    }

    fn cursor_down_position(&self) -> usize {
        let len = self.text.len() as isize;
        let mut pos = self.cursor as isize;
        let mut offset: isize = 0;

        if pos == len || self.text[pos as usize] == '\n' {
            offset += 1;
            pos -= 1;
        }
        if pos < 0 {
            pos = 0;
        }

        let mut start = pos;
        while start > 0 && self.text[start as usize] != '\n' {
            start -= 1;
        }
        // The first line has no leading newline to land on.
        if start == 0 && self.text[start as usize] != '\n' {
            offset += 1;
        }

        let mut end = pos;
        while end < len && self.text[end as usize] != '\n' {
            end += 1;
        }
        if self.text[pos as usize] == '\n' && self.cursor != 0 {
            end += 1;
        }
        if end == len {
            return len as usize;
        }

        let mut next_end = end + 1;
        while next_end < len && self.text[next_end as usize] != '\n' {
            next_end += 1;
        }

        offset += pos - start;
        if offset < next_end - end {
            (end + offset) as usize
        } else {
            next_end as usize
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn editor(text: &str) -> Editor {
        let mut e = Editor::new(EditorConfig {
            scroll_enabled: false,
            username: "me".to_string(),
        });
        e.set_text(text);
        e
    }

    #[test]
    fn calc_xy_counts_lines_and_columns() {
        let e = editor("abc\nde");
        assert_eq!(e.calc_xy(0), (1, 1));
        assert_eq!(e.calc_xy(3), (4, 1));
        assert_eq!(e.calc_xy(4), (1, 2));
        assert_eq!(e.calc_xy(5), (2, 2));
        // Clamped on both sides.
        assert_eq!(e.calc_xy(-3), (1, 1));
        assert_eq!(e.calc_xy(99), (3, 2));
    }

    #[test]
    fn horizontal_moves_clamp_to_the_buffer() {
        let mut e = editor("ab");
        e.move_cursor(1, 0);
        assert_eq!(e.cursor(), 1);
        e.move_cursor(5, 0);
        assert_eq!(e.cursor(), 2);
        e.move_cursor(-10, 0);
        assert_eq!(e.cursor(), 0);
    }

    #[test]
    fn cursor_up_preserves_the_column() {
        let mut e = editor("abc\ndefgh\nxy");
        e.set_cursor(6); // line 2, third column
        e.move_cursor(0, -1);
        assert_eq!(e.cursor(), 2); // line 1, third column

        e.set_cursor(11); // line 3, second column
        e.move_cursor(0, -1);
        assert_eq!(e.cursor(), 5); // line 2, second column
    }

    #[test]
    fn cursor_up_clamps_to_shorter_lines() {
        let mut e = editor("ab\nlonger");
        e.set_cursor(8);
        e.move_cursor(0, -1);
        assert_eq!(e.cursor(), 2); // end of "ab"
    }

    #[test]
    fn cursor_up_from_the_first_line_goes_home() {
        let mut e = editor("abc\nde");
        e.set_cursor(2);
        e.move_cursor(0, -1);
        assert_eq!(e.cursor(), 0);
    }

    #[test]
    fn cursor_down_preserves_the_column() {
        let mut e = editor("ab\nlonger");
        e.set_cursor(1);
        e.move_cursor(0, 1);
        assert_eq!(e.cursor(), 4); // line 2, same column
    }

    #[test]
    fn cursor_down_from_the_last_line_goes_to_the_end() {
        let mut e = editor("ab\ncd");
        e.set_cursor(4);
        e.move_cursor(0, 1);
        assert_eq!(e.cursor(), 5);
    }

    #[test]
    fn cursor_down_over_an_empty_line() {
        let mut e = editor("a\n\nb");
        e.set_cursor(2);
        e.move_cursor(0, 1);
        assert_eq!(e.cursor(), 3); // lands on "b"
    }

    #[test]
    fn line_start_and_end() {
        let mut e = editor("abc\ndefgh");
        e.set_cursor(6);
        e.move_to_line_start();
        assert_eq!(e.cursor(), 4);
        e.move_to_line_end();
        assert_eq!(e.cursor(), 9);

        e.set_cursor(2);
        e.move_to_line_end();
        assert_eq!(e.cursor(), 3); // stops at the newline
    }

    #[test]
    fn moves_on_an_empty_buffer_are_noops() {
        let mut e = editor("");
        e.move_cursor(1, 0);
        e.move_cursor(0, 1);
        e.move_cursor(0, -1);
        assert_eq!(e.cursor(), 0);
    }

    #[test]
    fn scrolling_follows_the_cursor() {
        let mut e = Editor::new(EditorConfig {
            scroll_enabled: true,
            username: "me".to_string(),
        });
        e.set_text("a\nb\nc\nd\ne");
        e.set_size(10, 3); // two text rows plus the status bar

        e.move_cursor(0, 1);
        e.move_cursor(0, 1);
        e.move_cursor(0, 1); // now on line 4
        assert_eq!(e.viewport().0, 2);

        e.move_cursor(0, -1);
        e.move_cursor(0, -1);
        e.move_cursor(0, -1); // back on line 1
        assert_eq!(e.viewport().0, 0);
    }

    #[test]
    fn set_text_clamps_the_cursor() {
        let mut e = editor("hello");
        e.set_cursor(5);
        e.set_text("hi");
        assert_eq!(e.cursor(), 2);
    }
}
