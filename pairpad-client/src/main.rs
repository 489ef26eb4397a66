//! Terminal client: parse flags, pick a username, dial the coordinator,
//! then hand everything to the session loop.

mod session;

use std::io::{self, Write};
use std::path::PathBuf;
use std::thread;

use anyhow::Context;
use clap::Parser;
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use rand::Rng;
use tokio::sync::mpsc;

use pairpad_collab::{ConnectConfig, Connection, Message};
use pairpad_crdt::Replica;
use pairpad_editor::{Editor, EditorConfig};
use session::{Session, EXIT_MARKER};

#[derive(Parser, Debug)]
#[command(name = "pairpad", about = "Collaborative plain-text editing in the terminal")]
struct Args {
    /// The network address of the server
    #[arg(long, default_value = "localhost:8080")]
    server: String,

    /// Enable a secure WebSocket connection (wss://)
    #[arg(long)]
    secure: bool,

    /// Prompt for a username instead of generating one
    #[arg(long)]
    login: bool,

    /// The file to load the pairpad content from; enables Ctrl-S saving
    #[arg(long)]
    file: Option<PathBuf>,

    /// Enable debugging mode to show more verbose logs
    #[arg(long)]
    debug: bool,

    /// Enable scrolling with the cursor
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    scroll: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    setup_logger(args.debug).context("failed to set up the logger")?;

    let username = if args.login {
        prompt_username()?
    } else {
        random_username()
    };

    let conn_config = ConnectConfig {
        server: args.server.clone(),
        secure: args.secure,
    };
    let mut conn = match Connection::connect(&conn_config).await {
        Ok(conn) => conn,
        Err(e) => {
            eprintln!("Connection error, exiting: {e}");
            std::process::exit(1);
        }
    };
    let messages = conn.take_events().expect("fresh connection has its event stream");
    conn.send(Message::join(&username))?;

    let mut replica = Replica::new();
    if let Some(path) = &args.file {
        replica
            .load(path)
            .with_context(|| format!("failed to load document from {}", path.display()))?;
    }

    let mut editor = Editor::new(EditorConfig {
        scroll_enabled: args.scroll,
        username: username.clone(),
    });
    editor.connected = true;
    let (width, height) = terminal::size().context("not a terminal")?;
    editor.set_size(width as usize, height as usize);

    let (key_tx, key_rx) = mpsc::unbounded_channel();
    spawn_input_thread(key_tx);

    let _guard = TerminalGuard::new()?;
    let session = Session::new(replica, editor, conn.sender(), args.file.clone(), args.debug);
    match session.run(messages, key_rx).await {
        Ok(()) => Ok(()),
        Err(e) if e.to_string().starts_with(EXIT_MARKER) => {
            drop(_guard);
            println!("exiting session.");
            Ok(())
        }
        Err(e) => {
            drop(_guard);
            eprintln!("TUI error, exiting: {e}");
            std::process::exit(1);
        }
    }
}

/// The client owns the terminal, so logs go to a file instead of stderr.
fn setup_logger(debug: bool) -> io::Result<()> {
    let (path, level) = if debug {
        ("pairpad-debug.log", log::LevelFilter::Debug)
    } else {
        ("pairpad.log", log::LevelFilter::Info)
    };
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    env_logger::Builder::new()
        .filter_level(level)
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
    Ok(())
}

fn prompt_username() -> io::Result<String> {
    print!("Enter your name: ");
    io::stdout().flush()?;
    let mut name = String::new();
    io::stdin().read_line(&mut name)?;
    Ok(name.trim().to_string())
}

const ADJECTIVES: [&str; 12] = [
    "Brave", "Calm", "Clever", "Eager", "Gentle", "Jolly", "Keen", "Lively", "Merry", "Quick",
    "Silent", "Witty",
];

const ANIMALS: [&str; 12] = [
    "Badger", "Crane", "Dolphin", "Falcon", "Heron", "Lynx", "Marmot", "Otter", "Puffin", "Raven",
    "Stoat", "Wren",
];

fn random_username() -> String {
    let mut rng = rand::thread_rng();
    format!(
        "{}{}",
        ADJECTIVES[rng.gen_range(0..ADJECTIVES.len())],
        ANIMALS[rng.gen_range(0..ANIMALS.len())]
    )
}

/// Raw mode plus the alternate screen, restored on drop so a panic or an
/// error path still leaves the shell usable.
struct TerminalGuard;

impl TerminalGuard {
    fn new() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        crossterm::execute!(io::stdout(), EnterAlternateScreen)?;
        Ok(TerminalGuard)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = crossterm::execute!(io::stdout(), LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

/// Blocking crossterm reads on a plain thread, forwarded into the async
/// session.
fn spawn_input_thread(tx: mpsc::UnboundedSender<crossterm::event::Event>) -> thread::JoinHandle<()> {
    thread::spawn(move || loop {
        match crossterm::event::read() {
            Ok(event) => {
                if tx.send(event).is_err() {
                    break;
                }
            }
            Err(e) => {
                log::error!("terminal input error: {e}");
                break;
            }
        }
    })
}
