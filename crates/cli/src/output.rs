//! CLI output formatting.
//!
//! Status lines go to stdout, problems to stderr. Project errors render as
//! `path:row:col message` so editors can jump to them.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

use busy_lib::{ErrorInfo, ErrorItem};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
}

/// Kind of a one-line status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
  Success,
  Error,
  Warning,
  Info,
}

impl Status {
  fn symbol(self) -> &'static str {
    match self {
      Status::Success => symbols::SUCCESS,
      Status::Error => symbols::ERROR,
      Status::Warning => symbols::WARNING,
      Status::Info => symbols::INFO,
    }
  }

  fn to_stderr(self) -> bool {
    matches!(self, Status::Error | Status::Warning)
  }
}

fn status_line(status: Status, message: &str) {
  let stream = if status.to_stderr() { Stream::Stderr } else { Stream::Stdout };
  let symbol_text = status.symbol();
  let symbol = symbol_text.if_supports_color(stream, |s| match status {
    Status::Success => s.green().to_string(),
    Status::Error => s.red().to_string(),
    Status::Warning => s.yellow().to_string(),
    Status::Info => s.blue().to_string(),
  });
  if status.to_stderr() {
    eprintln!("{} {}", symbol, message);
  } else {
    println!("{} {}", symbol, message);
  }
}

/// Millisecond precision, e.g. `1s 500ms`.
pub fn format_duration(duration: Duration) -> String {
  let millis = Duration::from_millis(duration.as_millis() as u64);
  humantime::format_duration(millis).to_string()
}

pub fn print_success(message: &str) {
  status_line(Status::Success, message);
}

pub fn print_error(message: &str) {
  status_line(Status::Error, message);
}

pub fn print_info(message: &str) {
  status_line(Status::Info, message);
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

/// An operation as it starts, e.g. `COMPILE /src/main.c`.
pub fn print_command(highlight: &str, message: &str) {
  println!(
    "{} {}",
    highlight.if_supports_color(Stream::Stdout, |s| s.cyan()),
    message
  );
}

fn render_item(item: &ErrorItem) -> String {
  match &item.loc {
    Some(loc) => format!(
      "{} {}",
      loc.if_supports_color(Stream::Stderr, |l| l.bold()),
      item.msg
    ),
    None => item.msg.clone(),
  }
}

pub fn print_error_items(errors: &ErrorInfo) {
  for item in &errors.errors {
    status_line(Status::Error, &render_item(item));
  }
}

pub fn print_warning_items(warnings: &ErrorInfo) {
  for item in &warnings.errors {
    status_line(Status::Warning, &render_item(item));
  }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}
