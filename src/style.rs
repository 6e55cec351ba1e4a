//! Terminal styling for interactive update prompts.
//!
//! Respects the `NO_COLOR` environment variable and terminal capabilities.

use std::{
   io::{self, Write},
   sync::OnceLock,
};

use owo_colors::OwoColorize;

static COLOR_ENABLED: OnceLock<bool> = OnceLock::new();

/// Whether color output is enabled (cached on first call).
pub fn colors_enabled() -> bool {
   *COLOR_ENABLED.get_or_init(|| {
      if std::env::var("NO_COLOR").is_ok() {
         return false;
      }
      supports_color::on(supports_color::Stream::Stdout).is_some_and(|level| level.has_basic)
   })
}

pub fn success(s: &str) -> String {
   if colors_enabled() { s.green().bold().to_string() } else { s.to_string() }
}

pub fn warning(s: &str) -> String {
   if colors_enabled() { s.yellow().to_string() } else { s.to_string() }
}

pub fn removed(s: &str) -> String {
   if colors_enabled() { s.red().to_string() } else { format!("-{s}") }
}

pub fn added(s: &str) -> String {
   if colors_enabled() { s.green().to_string() } else { format!("+{s}") }
}

pub fn info(s: &str) -> String {
   if colors_enabled() { s.cyan().to_string() } else { s.to_string() }
}

pub fn dim(s: &str) -> String {
   if colors_enabled() { s.dimmed().to_string() } else { s.to_string() }
}

/// Prints an existing/fresh diff for `field` and reads a y/n confirmation
/// from stdin, defaulting to "keep existing" on empty input or EOF.
pub fn confirm_keep_existing(field: &str, existing: &str, fresh: &str) -> bool {
   println!("{} {field}", info("conflict:"));
   println!("  {} {existing}", removed("existing"));
   println!("  {} {fresh}", added("fresh"));
   print!("{} ", warning("keep existing value? [Y/n]"));
   io::stdout().flush().ok();

   let mut line = String::new();
   if io::stdin().read_line(&mut line).is_err() {
      return true;
   }
   let answer = line.trim().to_lowercase();
   answer.is_empty() || answer == "y" || answer == "yes"
}
