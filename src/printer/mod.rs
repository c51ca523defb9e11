//! Printers: status lines (owo-colors) and markdown reports (termimad).

use owo_colors::OwoColorize;
use termimad::MadSkin;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Info,
    Warn,
    Error,
}

pub fn status(kind: Status, text: &str) {
    match kind {
        Status::Ok => println!("{}", text.green()),
        Status::Info => println!("{}", text.cyan()),
        Status::Warn => println!("{}", text.yellow()),
        Status::Error => eprintln!("{}", text.red()),
    }
}

pub struct MarkdownPrinter {
    pub skin: MadSkin,
    pub enabled: bool,
}

impl MarkdownPrinter {
    pub fn new(enabled: bool) -> Self {
        Self {
            skin: MadSkin::default(),
            enabled,
        }
    }

    pub fn print(&self, text: &str) {
        if self.enabled {
            self.skin.print_text(text);
        } else {
            println!("{}", text);
        }
    }
}
