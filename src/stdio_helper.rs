//! Stdio Helper
//!
//! Handles Terminal init and de-init
//! Handles key input for the command console
//! Handles Ctrl+C hook
//! Keeps a persistent bottom bar with link status, input line and history

#![allow(unused_must_use)]

pub use std::collections::VecDeque;
pub use std::io::{self, Write};
pub use std::time::Duration;

pub use crossterm::event::{self, Event, KeyCode};
pub use crossterm::style::Stylize;
pub use crossterm::{ExecutableCommand, QueueableCommand, cursor, terminal};

#[cfg(target_os = "linux")]
use termios::{ECHO, ICANON, TCSADRAIN, Termios};

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                             Globals
// —————————————————————————————————————————————————————————————————————————————————————————————————

pub const DEBUG: bool = false;
pub const TERM_PADDED_LINES: u16 = 2;
pub const HISTORY_LEN: usize = 64;

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                             Macros
// —————————————————————————————————————————————————————————————————————————————————————————————————

#[macro_export]
macro_rules! terminal_start {
    () => {
        $crate::stdio_helper::stdout_init()
    };
}

#[macro_export]
macro_rules! terminal_exit {
    () => {
        $crate::terminal_exit!(0);
    };
    ($code:expr) => {{
        $crate::stdio_helper::stdout_de_init();
        if $code != 0 {
            println!("Exiting with code: {}\n", $code);
        }
        else {
            println!("Exiting...\n");
        }
        std::process::exit($code);
    }};
}

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                             Console
// —————————————————————————————————————————————————————————————————————————————————————————————————

/// Raw line editor with history for the bottom input bar
///
/// Example:
/// ```no_run
/// use copley_serial_link::stdio_helper::Console;
///
/// let mut console = Console::new("COPLEY");
/// loop {
///     if let Some(line) = console.poll_line().unwrap() {
///         println!("{line}");
///     }
///     console.render("Disconnected");
/// }
/// ```
#[derive(Debug, Default)]
pub struct Console {
    prefix:     String,
    input:      String,
    history:    VecDeque<String>,
    scroll_pos: usize,
}

impl Console {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            ..Self::default()
        }
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    /// Drains pending key events without blocking. Returns a line once Enter is pressed.
    pub fn poll_line(&mut self) -> io::Result<Option<String>> {
        const CTRL: event::KeyModifiers = event::KeyModifiers::CONTROL;

        while event::poll(Duration::from_millis(0))? {
            let event_in = event::read()?;

            if DEBUG {
                println!("\n>>> Event: {:?}", event_in); // Debug key events
            }

            let Event::Key(key_event) = event_in
            else {
                continue;
            };
            if key_event.kind != event::KeyEventKind::Press {
                continue;
            }

            match (key_event.code, key_event.modifiers) {
                // Ctrl-C
                (KeyCode::Char('c'), CTRL) => {
                    terminal_exit!();
                }
                // Enter
                (KeyCode::Enter, _) | (KeyCode::Char('j'), CTRL) => {
                    let line = std::mem::take(&mut self.input);
                    self.remember(&line);
                    self.scroll_pos = 0;
                    return Ok(Some(line));
                }
                // Backspace
                (KeyCode::Backspace, _) => {
                    self.input.pop();
                }
                // Ctrl + u - Clear
                (KeyCode::Char('u'), CTRL) | (KeyCode::Esc, _) => {
                    self.input.clear();
                    self.scroll_pos = 0;
                }
                // Up
                (KeyCode::Up, _) => {
                    if let Some(item) = self.history.get(self.scroll_pos) {
                        self.input = item.clone();
                        self.scroll_pos += 1;
                    }
                }
                // Down
                (KeyCode::Down, _) => {
                    if self.scroll_pos <= 1 {
                        self.input.clear();
                        self.scroll_pos = 0;
                    }
                    else if let Some(item) = self.history.get(self.scroll_pos - 2) {
                        self.input = item.clone();
                        self.scroll_pos -= 1;
                    }
                }
                // Character Input
                (KeyCode::Char(char), _) => {
                    self.input.push(char);
                }
                // Any
                _ => {}
            }
        }

        Ok(None)
    }

    /// Bottom bar: `[status] PREFIX >>: input`
    pub fn render(&self, status: &str) {
        let status_bar_msg = format!(
            "{} {} {} {}",
            format!("[{status}]").yellow(),
            self.prefix.as_str().red(),
            ">>:".green(),
            self.input.as_str().blue()
        );
        print_input_bar(&status_bar_msg);
    }

    fn remember(&mut self, line: &str) {
        if line.trim().is_empty() || self.history.front().map(String::as_str) == Some(line) {
            return;
        }
        self.history.push_front(line.to_string());
        self.history.truncate(HISTORY_LEN);
    }
}

// —————————————————————————————————————————— Input Bar ————————————————————————————————————————————

pub fn print_input_bar(status_bar_msg: &str) {
    let mut stdout = std::io::stdout();
    let Ok((_cols, rows)) = terminal::size() else {
        return;
    };

    stdout.queue(cursor::SavePosition);
    stdout.queue(cursor::MoveTo(0, rows)); // Move to bottom
    stdout.queue(terminal::Clear(terminal::ClearType::CurrentLine)); // Clear

    stdout.write_all(status_bar_msg.as_bytes()); // Print status bar

    stdout.queue(cursor::MoveUp(TERM_PADDED_LINES)); // Move up to scroll region
    stdout.execute(cursor::RestorePosition);
}

// ———————————————————————————————————————————— Init ———————————————————————————————————————————————

/// Init Terminal
pub fn stdout_init() -> io::Result<()> {
    ctrlc::set_handler(move || {
        terminal_exit!();
    })
    .map_err(io::Error::other)?;

    // On Linux we disable canonical mode (instead of raw mode) to gain access to non buffered input
    #[cfg(target_os = "linux")]
    {
        use std::os::unix::io::AsRawFd;

        let fd = io::stdin().as_raw_fd();
        let mut termios = Termios::from_fd(fd)?;

        // Keep the other terminal modes, drop line buffering and echo
        termios.c_lflag &= !(ICANON | ECHO);
        termios.c_cc[termios::VMIN] = 1;
        termios.c_cc[termios::VTIME] = 0;

        termios::tcsetattr(fd, TCSADRAIN, &termios)?;
    }

    let mut stdout = std::io::stdout();
    let (_cols, rows) = terminal::size()?;

    stdout.queue(cursor::Hide)?;
    stdout.queue(cursor::SavePosition)?;

    print!("\x1b[0m"); // Reset Style
    print!("{}", "\n".repeat(TERM_PADDED_LINES as usize + 1)); // PAD previous output
    print!("\x1b[r"); // Reset scrollable region
    print!("\x1b[{};{}r", 0, rows.saturating_sub(TERM_PADDED_LINES)); // Set scrollable region

    stdout.queue(cursor::RestorePosition)?;
    stdout.execute(cursor::MoveToRow(rows.saturating_sub(TERM_PADDED_LINES + 1)))?;
    Ok(())
}

// ——————————————————————————————————————————— De-Init —————————————————————————————————————————————

pub fn stdout_de_init() {
    let mut stdout = std::io::stdout();
    let rows = terminal::size().map(|(_, rows)| rows).unwrap_or(0);

    crossterm::terminal::disable_raw_mode(); // Takes care of restoring termios canonical mode

    print!("\x1b[r"); // Reset scrollable region
    print!("\x1b[0m"); // Reset Style

    stdout.queue(cursor::MoveTo(0, rows)); // Move to bottom
    stdout.queue(terminal::Clear(terminal::ClearType::CurrentLine)); // Clear
    stdout.execute(cursor::Show);
}
