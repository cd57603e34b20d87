//! Console output helpers.
//!
//! Structured diagnostics go through `tracing`; these helpers are the
//! operator-facing progress lines.

use colored::{ColoredString, Colorize};

const RULE_WIDTH: usize = 70;

fn line(marker: ColoredString, message: impl std::fmt::Display) {
    println!("{marker} {message}");
}

/// Print a section header.
pub fn print_section(title: &str) {
    let rule = "─".repeat(RULE_WIDTH);
    println!();
    println!("{}", rule.bright_black());
    println!("  {}", title.cyan().bold());
    println!("{}", rule.bright_black());
}

/// Print a step indicator with message.
pub fn print_step(message: &str) {
    line("▶".cyan(), message.bold());
}

/// Print a phase header with its ordinal.
pub fn print_progress_step(current: u8, total: u8, message: &str) {
    println!();
    line(format!("[{current:>2}/{total}]").bright_black(), message.bold());
}

pub fn print_success(message: &str) {
    line("✓".green().bold(), message.green());
}

pub fn print_warning(message: &str) {
    line("⚠".yellow().bold(), message.yellow());
}

/// Errors go to stderr so they survive `> log` redirection.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message.red());
}

pub fn print_info(message: &str) {
    line("ℹ".blue().bold(), message);
}

/// Print an indented action line, prefixed when it was only planned.
pub fn print_action(message: &str, planned: bool) {
    let marker = if planned { "[dry-run]".magenta() } else { "→".cyan() };
    println!("  {marker} {message}");
}

/// Print an aligned key/value line.
pub fn print_kv(key: &str, value: &str) {
    println!("  {:<22} {value}", format!("{key}:").bright_black());
}

pub fn print_list_item(item: &str) {
    println!("    - {item}");
}

/// A resource that was already in the desired state.
pub fn print_unchanged(name: &str, detail: Option<&str>) {
    match detail {
        Some(detail) => println!("  {} {name} {}", "=".bright_black(), format!("({detail})").bright_black()),
        None => println!("  {} {name}", "=".bright_black()),
    }
}
