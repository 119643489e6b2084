//! Terminal presentation helpers
//!
//! ANSI color wrappers, phase banners, the recording countdown, and the
//! stdin prompts the session controller blocks on. Colors degrade to plain
//! text when stdout is not a terminal.

use std::io::{self, BufRead, IsTerminal, Write};
use std::thread;
use std::time::Duration;

const BANNER_WIDTH: usize = 60;

fn supports_color() -> bool {
    io::stdout().is_terminal()
}

fn wrap(code: &str, text: &str) -> String {
    if supports_color() {
        format!("\x1b[{code}m{text}\x1b[0m")
    } else {
        text.to_string()
    }
}

pub fn red(text: &str) -> String {
    wrap("91", text)
}

pub fn green(text: &str) -> String {
    wrap("92", text)
}

pub fn yellow(text: &str) -> String {
    wrap("93", text)
}

pub fn cyan(text: &str) -> String {
    wrap("96", text)
}

pub fn bold(text: &str) -> String {
    wrap("1", text)
}

pub fn dim(text: &str) -> String {
    wrap("2", text)
}

/// Print a phase banner.
pub fn banner(text: &str) {
    let line = "=".repeat(BANNER_WIDTH);
    println!();
    println!("{}", cyan(&line));
    println!("{}", cyan(&format!("  {text}")));
    println!("{}", cyan(&line));
    println!();
}

pub fn separator() {
    println!("{}", dim(&"-".repeat(BANNER_WIDTH)));
}

/// Countdown displayed before a capture starts.
pub fn countdown(seconds: u32) {
    for i in (1..=seconds).rev() {
        print!("  {}... ", bold(&i.to_string()));
        let _ = io::stdout().flush();
        thread::sleep(Duration::from_secs(1));
    }
    println!("{}", red(&bold("RECORDING")));
    println!();
}

/// Print `message` and block until the operator answers.
///
/// Returns `None` on EOF (operator closed stdin), which callers treat as a
/// session cancel.
pub fn prompt(message: &str) -> Option<String> {
    print!("{message}");
    let _ = io::stdout().flush();
    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) => None,
        Ok(_) => Some(line.trim().to_string()),
        Err(_) => None,
    }
}

/// Wait for Enter. Returns false on EOF.
pub fn wait_for_enter(message: &str) -> bool {
    prompt(&dim(message)).is_some()
}

/// y/N confirmation. EOF counts as "no".
pub fn confirm(message: &str) -> bool {
    matches!(prompt(message), Some(answer) if answer.eq_ignore_ascii_case("y"))
}

/// Color a formatted dBFS readout by how hot the level is.
pub fn level_readout(level_dbfs: f64) -> String {
    let text = format!("{level_dbfs:6.1} dBFS");
    if level_dbfs > -3.0 {
        red(&text)
    } else if level_dbfs > -12.0 {
        yellow(&text)
    } else {
        green(&text)
    }
}
