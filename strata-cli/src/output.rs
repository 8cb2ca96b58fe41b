//! Terminal output for the `strata` commands.
//!
//! Everything goes to stdout except [`error`]. Change lines share one
//! layout: two spaces, a one-character [`Mark`], the change label.

use std::fmt;

use owo_colors::OwoColorize;

/// Leading mark of a change line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    Deployed,
    Reverted,
    Pending,
    Verified,
    Failed,
}

impl Mark {
    fn symbol(self) -> char {
        match self {
            Self::Deployed => '+',
            Self::Reverted => '-',
            Self::Pending => '~',
            Self::Verified => '=',
            Self::Failed => '!',
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = self.symbol();
        match self {
            Self::Deployed | Self::Verified => write!(f, "{}", symbol.green().bold()),
            Self::Reverted | Self::Failed => write!(f, "{}", symbol.red().bold()),
            Self::Pending => write!(f, "{}", symbol.yellow().bold()),
        }
    }
}

/// Command title, underlined.
pub fn header(text: &str) {
    println!();
    println!("{}", text.bold().cyan());
    println!("{}", "=".repeat(text.chars().count()).dimmed());
}

pub fn section(text: &str) {
    println!("{}", text.bold());
}

/// `key: value`, padded so consecutive pairs line up.
pub fn kv(key: &str, value: &str) {
    println!("  {:<10} {}", format!("{}:", key).dimmed(), value);
}

/// One change line.
pub fn change(mark: Mark, label: &str) {
    println!("  {} {}", mark, label);
}

/// A change line with a trailing note, such as why it failed.
pub fn change_note(mark: Mark, label: &str, note: &str) {
    println!("  {} {} {}", mark, label, note.dimmed());
}

/// Count of changes left as they were.
pub fn unchanged(count: usize) {
    println!("  {}", format!("{} unchanged", count).dimmed());
}

pub fn list_item(text: &str) {
    println!("  {} {}", '*'.dimmed(), text);
}

pub fn numbered_item(number: usize, text: &str) {
    println!("  {:>3} {}", number.dimmed(), text);
}

pub fn success(text: &str) {
    println!("{} {}", "done".green().bold(), text);
}

pub fn info(text: &str) {
    println!("{} {}", "note".blue().bold(), text);
}

pub fn warn(text: &str) {
    println!("{} {}", "warning".yellow().bold(), text);
}

/// Print to stderr.
pub fn error(text: &str) {
    eprintln!("{} {}", "error:".red().bold(), text);
}

pub fn newline() {
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_marks_are_distinct() {
        let marks = [
            Mark::Deployed,
            Mark::Reverted,
            Mark::Pending,
            Mark::Verified,
            Mark::Failed,
        ];
        let symbols: HashSet<char> = marks.iter().map(|m| m.symbol()).collect();
        assert_eq!(symbols.len(), marks.len());
        assert!(Mark::Reverted.to_string().contains('-'));
    }
}
