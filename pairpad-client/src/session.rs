//! The editing session: one replica, one editor, one connection.
//!
//! A single task owns all mutable state and drains three streams — terminal
//! events, inbound messages, and status-expiry ticks — redrawing after each
//! one. Keystrokes become local CRDT mutations plus outgoing operations;
//! inbound operations are applied through the visible-position wrapper and
//! nudge the local and peer cursors.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::bail;
use crossterm::event::{Event as TermEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tokio::sync::mpsc;

use pairpad_collab::{EditOperation, Event, Message, MessageType, OperationKind};
use pairpad_crdt::Replica;
use pairpad_editor::{color_for_username, Editor, PeerCursor};

/// Prefix of the error that signals a clean user-requested exit rather
/// than a failure.
pub const EXIT_MARKER: &str = "pairpad";

/// How long a status message owns the bar before the info line returns.
const STATUS_LINGER: Duration = Duration::from_secs(6);

pub struct Session {
    replica: Replica,
    editor: Editor,
    outbound: mpsc::UnboundedSender<Message>,
    file: Option<PathBuf>,
    debug: bool,

    // Status messages expire by epoch so a fresh message is not wiped by
    // an older message's timer.
    status_epoch: u64,
    expiry_tx: mpsc::UnboundedSender<u64>,
    expiry_rx: mpsc::UnboundedReceiver<u64>,
}

impl Session {
    pub fn new(
        replica: Replica,
        editor: Editor,
        outbound: mpsc::UnboundedSender<Message>,
        file: Option<PathBuf>,
        debug: bool,
    ) -> Self {
        let (expiry_tx, expiry_rx) = mpsc::unbounded_channel();
        Session {
            replica,
            editor,
            outbound,
            file,
            debug,
            status_epoch: 0,
            expiry_tx,
            expiry_rx,
        }
    }

    /// Drive the session until the user exits or the terminal goes away.
    pub async fn run(
        mut self,
        mut messages: mpsc::UnboundedReceiver<Event>,
        mut keys: mpsc::UnboundedReceiver<TermEvent>,
    ) -> anyhow::Result<()> {
        self.editor.set_text(&self.replica.content());
        self.draw()?;

        let mut wire_open = true;
        loop {
            tokio::select! {
                key = keys.recv() => match key {
                    Some(event) => self.handle_terminal_event(event)?,
                    None => bail!("terminal input closed"),
                },
                message = messages.recv(), if wire_open => match message {
                    Some(Event::Message(msg)) => self.handle_message(msg),
                    Some(Event::Disconnected) | None => {
                        wire_open = false;
                        self.editor.connected = false;
                        self.set_status("lost connection!");
                    }
                },
                Some(epoch) = self.expiry_rx.recv() => {
                    if epoch == self.status_epoch {
                        self.editor.clear_status();
                    }
                }
            }
            self.draw()?;
        }
    }

    fn draw(&self) -> io::Result<()> {
        let mut out = io::stdout();
        self.editor.draw(&mut out)
    }

    fn handle_terminal_event(&mut self, event: TermEvent) -> anyhow::Result<()> {
        match event {
            TermEvent::Key(key) if key.kind != KeyEventKind::Release => self.handle_key(key)?,
            TermEvent::Resize(width, height) => {
                self.editor.set_size(width as usize, height as usize);
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_key(&mut self, key: KeyEvent) -> anyhow::Result<()> {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => bail!("{EXIT_MARKER}: exiting"),
            KeyCode::Char('c') if ctrl => bail!("{EXIT_MARKER}: exiting"),
            KeyCode::Char('s') if ctrl => self.save_file(),

            KeyCode::Left => self.editor.move_cursor(-1, 0),
            KeyCode::Char('b') if ctrl => self.editor.move_cursor(-1, 0),
            KeyCode::Right => self.editor.move_cursor(1, 0),
            KeyCode::Char('f') if ctrl => self.editor.move_cursor(1, 0),
            KeyCode::Up => self.editor.move_cursor(0, -1),
            KeyCode::Char('p') if ctrl => self.editor.move_cursor(0, -1),
            KeyCode::Down => self.editor.move_cursor(0, 1),
            KeyCode::Char('n') if ctrl => self.editor.move_cursor(0, 1),
            KeyCode::Home => self.editor.move_to_line_start(),
            KeyCode::End => self.editor.move_to_line_end(),

            KeyCode::Backspace | KeyCode::Delete => self.local_delete(),
            KeyCode::Enter => self.local_insert('\n'),
            KeyCode::Tab => {
                for _ in 0..4 {
                    self.local_insert(' ');
                }
            }
            KeyCode::Char(ch) if !ctrl => self.local_insert(ch),
            _ => {}
        }
        Ok(())
    }

    /// Insert at the cursor, advance it, nudge peer carets right of it,
    /// and announce the edit.
    fn local_insert(&mut self, ch: char) {
        let cursor = self.editor.cursor();
        log::debug!("local insert {ch:?} at cursor {cursor}");

        match self.replica.insert(cursor + 1, ch.to_string()) {
            Ok(text) => self.editor.set_text(&text),
            Err(e) => {
                log::error!("CRDT error: {e}");
                return;
            }
        }
        self.editor.move_cursor(1, 0);

        // The post-move cursor is the 1-based visible position of the new
        // character; that is what goes on the wire.
        let position = self.editor.cursor();
        let username = self.editor.username.clone();
        for (name, peer) in self.editor.peer_positions.iter_mut() {
            if *name != username && (position as isize) < peer.position {
                peer.position += 1;
            }
        }

        self.send(Message::operation(
            username,
            EditOperation::insert(position, ch.to_string()),
        ));
    }

    /// Delete the character left of the cursor and announce the edit with
    /// the pre-move cursor position.
    fn local_delete(&mut self) {
        let cursor = self.editor.cursor();
        if cursor == 0 {
            return;
        }
        log::debug!("local delete at cursor {cursor}");

        let text = self.replica.delete(cursor);
        self.editor.set_text(&text);

        let username = self.editor.username.clone();
        for (name, peer) in self.editor.peer_positions.iter_mut() {
            if *name != username && (cursor as isize) < peer.position {
                peer.position -= 1;
            }
        }

        self.send(Message::operation(username, EditOperation::delete(cursor)));
        self.editor.move_cursor(-1, 0);
    }

    fn handle_message(&mut self, msg: Message) {
        match msg.kind {
            MessageType::DocSync => {
                log::info!("snapshot received, replacing local document");
                self.replica.replace_document(msg.document);
                self.editor.set_cursor(0);
                let text = self.replica.content();
                self.editor.set_text(&text);
            }
            MessageType::DocReq => {
                log::info!("snapshot requested, sending local document to {}", msg.id);
                self.send(Message::doc_sync(self.replica.document.clone(), msg.id));
            }
            MessageType::SiteId => match msg.text.parse::<u64>() {
                Ok(site_id) => {
                    self.replica.set_site_id(site_id);
                    log::info!("assigned site id {site_id}");
                }
                Err(e) => log::error!("failed to parse site id {:?}: {e}", msg.text),
            },
            MessageType::Join => {
                self.set_status(format!("{} has joined the session!", msg.username));
            }
            MessageType::Users => {
                self.editor.users = msg.text.split(',').map(str::to_string).collect();
            }
            MessageType::Operation => match msg.operation.kind {
                OperationKind::Insert => {
                    self.remote_insert(&msg.username, msg.operation.position, &msg.operation.value)
                }
                OperationKind::Delete => {
                    self.remote_delete(&msg.username, msg.operation.position, &msg.operation.value)
                }
                OperationKind::None => log::warn!("operation message without a kind"),
            },
            MessageType::Unknown => log::warn!("unknown message type"),
        }

        if self.debug {
            self.dump_document();
        }
    }

    fn remote_insert(&mut self, sender: &str, position: usize, value: &str) {
        log::debug!("remote insert {value:?} at position {position}");
        match self.replica.insert(position, value) {
            Ok(text) => self.editor.set_text(&text),
            Err(e) => {
                log::error!("failed to apply remote insert: {e}");
                return;
            }
        }

        if position as isize - 1 <= self.editor.cursor() as isize {
            self.editor.move_cursor(value.chars().count() as isize, 0);
        }

        let color = color_for_username(sender, &self.editor.users);
        self.editor.peer_positions.insert(
            sender.to_string(),
            PeerCursor {
                position: position as isize - 1,
                color,
            },
        );
        for (name, peer) in self.editor.peer_positions.iter_mut() {
            if name != sender && (position as isize) < peer.position {
                peer.position += 1;
            }
        }
    }

    fn remote_delete(&mut self, sender: &str, position: usize, value: &str) {
        log::debug!("remote delete at position {position}");
        let text = self.replica.delete(position);
        self.editor.set_text(&text);

        if position as isize - 1 <= self.editor.cursor() as isize {
            self.editor
                .move_cursor(-(value.chars().count() as isize), 0);
        }

        let color = color_for_username(sender, &self.editor.users);
        self.editor.peer_positions.insert(
            sender.to_string(),
            PeerCursor {
                position: position as isize - 2,
                color,
            },
        );
        for (name, peer) in self.editor.peer_positions.iter_mut() {
            if name != sender && (position as isize) < peer.position {
                peer.position -= 1;
            }
        }
    }

    /// Write the projection to the configured file, `content.txt` when none
    /// was given. Failures land in the status bar, never kill the session.
    fn save_file(&mut self) {
        let path = self
            .file
            .clone()
            .unwrap_or_else(|| PathBuf::from("content.txt"));
        match pairpad_crdt::save(&path, &self.replica.document) {
            Ok(()) => self.set_status(format!("Saved document to {}", path.display())),
            Err(e) => {
                log::error!("failed to save to {}: {e}", path.display());
                self.set_status(format!("Failed to save to {}", path.display()));
            }
        }
    }

    fn set_status(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        log::info!("status: {msg}");
        self.editor.set_status(msg);

        self.status_epoch += 1;
        let epoch = self.status_epoch;
        let expiry = self.expiry_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(STATUS_LINGER).await;
            let _ = expiry.send(epoch);
        });
    }

    fn send(&mut self, msg: Message) {
        if !self.editor.connected {
            return;
        }
        if self.outbound.send(msg).is_err() {
            self.editor.connected = false;
            self.set_status("lost connection!");
        }
    }

    /// Full document state to the debug log, one line per character.
    fn dump_document(&self) {
        log::debug!("---DOCUMENT STATE---");
        for (i, c) in self.replica.document.characters.iter().enumerate() {
            log::debug!(
                "index: {i}  value: {:?}  ID: {}  IDPrev: {}  IDNext: {}",
                c.value,
                c.id,
                c.id_previous,
                c.id_next
            );
        }
    }
}
